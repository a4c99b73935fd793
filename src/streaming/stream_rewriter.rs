//! Lazy chunk-sequence adapters
//!
//! Wraps a pull-based source of text chunks and yields one rewritten chunk
//! per source chunk, in order. Nothing is pulled ahead: asking for output
//! chunk `i` pulls exactly source chunk `i`.

use super::scheme_fsm::SchemeRewriter;

/// Machine plus chunk counter shared by both adapters
#[derive(Debug, Default)]
struct ChunkDriver {
    machine: SchemeRewriter,
    chunks_rewritten: usize,
}

impl ChunkDriver {
    fn rewrite(&mut self, chunk: &str) -> String {
        self.chunks_rewritten += 1;
        self.machine.rewrite_chunk(chunk)
    }
}

/// Rewriting adapter over an infallible chunk source
pub struct StreamRewriter<I> {
    chunks: I,
    driver: ChunkDriver,
}

impl<I> StreamRewriter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    /// Wrap a chunk source; the machine starts in `Empty`
    pub fn new<S>(chunks: S) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Self {
            chunks: chunks.into_iter(),
            driver: ChunkDriver::default(),
        }
    }
}

impl<I> StreamRewriter<I> {
    /// Number of chunks produced so far
    pub fn chunks_rewritten(&self) -> usize {
        self.driver.chunks_rewritten
    }

    /// Partial match currently held back
    pub fn pending(&self) -> &str {
        self.driver.machine.pending()
    }

    /// Consume the adapter and return the partial match still held back.
    ///
    /// Iteration alone never emits this text once the source ends; callers
    /// that want it flushed append it after the last chunk.
    pub fn into_trailing(mut self) -> String {
        self.driver.machine.take_pending()
    }
}

impl<I> Iterator for StreamRewriter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let chunk = self.chunks.next()?;
        Some(self.driver.rewrite(chunk.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

/// Rewriting adapter over a chunk source whose pulls can fail.
///
/// Errors are handed to the consumer unchanged and leave the match state
/// as it was before the failed pull.
pub struct TryStreamRewriter<I> {
    chunks: I,
    driver: ChunkDriver,
}

impl<I, T, E> TryStreamRewriter<I>
where
    I: Iterator<Item = Result<T, E>>,
    T: AsRef<str>,
{
    /// Wrap a fallible chunk source
    pub fn new<S>(chunks: S) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Self {
            chunks: chunks.into_iter(),
            driver: ChunkDriver::default(),
        }
    }
}

impl<I> TryStreamRewriter<I> {
    /// Number of chunks successfully produced so far
    pub fn chunks_rewritten(&self) -> usize {
        self.driver.chunks_rewritten
    }

    /// Partial match currently held back
    pub fn pending(&self) -> &str {
        self.driver.machine.pending()
    }

    /// Consume the adapter and return the partial match still held back
    pub fn into_trailing(mut self) -> String {
        self.driver.machine.take_pending()
    }
}

impl<I, T, E> Iterator for TryStreamRewriter<I>
where
    I: Iterator<Item = Result<T, E>>,
    T: AsRef<str>,
{
    type Item = Result<String, E>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.chunks.next()?.map(|chunk| self.driver.rewrite(chunk.as_ref())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

/// Wrap `chunks` in a [`StreamRewriter`]
pub fn rewrite_stream<S>(chunks: S) -> StreamRewriter<S::IntoIter>
where
    S: IntoIterator,
    S::Item: AsRef<str>,
{
    StreamRewriter::new(chunks)
}
