//! Finite State Machine Scheme Rewriting
//!
//! Rewrites every `https://` into `http://` one character at a time.
//! The machine keeps the longest matched prefix of `https://` between calls,
//! so a scheme split across any number of chunks is still rewritten.
//!
//! - O(1) per character
//! - At most 7 characters held back between chunks
//! - Case-sensitive, lowercase ASCII only

/// The literal being searched for
pub const SECURE_SCHEME: &str = "https://";

/// What a full match is replaced with
pub const PLAIN_SCHEME: &str = "http://";

/// Longest prefix of `https://` matched so far
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchState {
    /// Nothing held back
    #[default]
    Empty,
    H,
    Ht,
    Htt,
    Http,
    Https,
    HttpsColon,
    HttpsColonSlash,
}

impl MatchState {
    /// Character that extends the match from this state
    pub fn expected(self) -> char {
        match self {
            MatchState::Empty => 'h',
            MatchState::H | MatchState::Ht => 't',
            MatchState::Htt => 'p',
            MatchState::Http => 's',
            MatchState::Https => ':',
            MatchState::HttpsColon | MatchState::HttpsColonSlash => '/',
        }
    }

    /// State after consuming `expected()`, `None` once the scheme is complete
    fn advance(self) -> Option<MatchState> {
        match self {
            MatchState::Empty => Some(MatchState::H),
            MatchState::H => Some(MatchState::Ht),
            MatchState::Ht => Some(MatchState::Htt),
            MatchState::Htt => Some(MatchState::Http),
            MatchState::Http => Some(MatchState::Https),
            MatchState::Https => Some(MatchState::HttpsColon),
            MatchState::HttpsColon => Some(MatchState::HttpsColonSlash),
            MatchState::HttpsColonSlash => None,
        }
    }
}

/// Per-body rewriting machine.
///
/// `pending` always equals the prefix of `https://` implied by `state`.
/// Output for the chunk in progress is accumulated in `output` and handed
/// back by [`SchemeRewriter::rewrite_chunk`].
#[derive(Debug, Default)]
pub struct SchemeRewriter {
    state: MatchState,
    pending: String,
    output: String,
    /// Completed `https://` matches
    rewrites: usize,
}

impl SchemeRewriter {
    /// Create a machine in the `Empty` state
    pub fn new() -> Self {
        Self {
            state: MatchState::Empty,
            pending: String::with_capacity(SECURE_SCHEME.len()),
            output: String::new(),
            rewrites: 0,
        }
    }

    /// Rewrite one chunk.
    ///
    /// Match state carries over to the next call; anything still held back
    /// at the end of `chunk` is not part of the returned text.
    pub fn rewrite_chunk(&mut self, chunk: &str) -> String {
        self.output = String::with_capacity(chunk.len());
        for c in chunk.chars() {
            self.process_char(c);
        }
        std::mem::take(&mut self.output)
    }

    /// Advance the machine by one character.
    ///
    /// A character that does not extend the current match is written out
    /// together with everything held back, and matching restarts on the
    /// character after it. The failing character is never itself a new
    /// match start, so `hhttps://` is left untouched.
    pub fn process_char(&mut self, c: char) {
        if c != self.state.expected() {
            self.flush(c);
            return;
        }

        match self.state.advance() {
            Some(next) => {
                self.pending.push(c);
                self.state = next;
            }
            None => self.complete(),
        }
    }

    /// Current match state
    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Characters held back for the match in progress
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Number of `https://` occurrences rewritten so far
    pub fn rewrites(&self) -> usize {
        self.rewrites
    }

    /// Give up on the match in progress and return its characters as literal text
    pub fn take_pending(&mut self) -> String {
        self.state = MatchState::Empty;
        std::mem::take(&mut self.pending)
    }

    fn flush(&mut self, c: char) {
        self.output.push_str(&self.pending);
        self.output.push(c);
        self.pending.clear();
        self.state = MatchState::Empty;
    }

    fn complete(&mut self) {
        self.output.push_str(PLAIN_SCHEME);
        self.pending.clear();
        self.state = MatchState::Empty;
        self.rewrites += 1;
    }
}
