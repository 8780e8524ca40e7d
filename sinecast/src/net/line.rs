//! Newline framing for the JSON-lines protocol.

/// Longest line accepted before the buffered bytes are discarded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Accumulates bytes from a stream and yields complete `\n`-terminated lines.
///
/// Bytes after the last newline are kept until more data arrives. A partial
/// line that grows past [`MAX_LINE_LEN`] is dropped as soon as it crosses the
/// limit, and the rest of that line is skipped up to its newline.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes of `buf` already handed out as lines.
    consumed: usize,
    /// Skipping the remainder of an oversized line.
    discarding: bool,
    /// Bytes dropped since the last [`take_discarded`](Self::take_discarded).
    discarded: usize,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes read from the stream.
    ///
    /// The buffered partial line never exceeds [`MAX_LINE_LEN`] after this
    /// returns.
    pub fn extend(&mut self, mut bytes: &[u8]) {
        if self.discarding {
            let Some(nl) = bytes.iter().position(|&b| b == b'\n') else {
                self.discarded += bytes.len();
                return;
            };
            self.discarded += nl + 1;
            self.discarding = false;
            bytes = &bytes[nl + 1..];
        }

        self.compact();
        self.buf.extend_from_slice(bytes);

        let pending = &self.buf[self.consumed..];
        let tail_start = pending
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |nl| nl + 1);
        let tail = pending.len() - tail_start;
        if tail > MAX_LINE_LEN {
            self.buf.truncate(self.consumed + tail_start);
            self.discarded += tail;
            self.discarding = true;
            self.buf.shrink_to(MAX_LINE_LEN);
        }
    }

    /// Returns the next complete line without its terminator, if any.
    pub fn next_line(&mut self) -> Option<&[u8]> {
        let pending = &self.buf[self.consumed..];
        let nl = pending.iter().position(|&b| b == b'\n')?;
        let start = self.consumed;
        self.consumed += nl + 1;
        Some(&self.buf[start..start + nl])
    }

    /// Number of buffered bytes not yet returned as a line.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len() - self.consumed
    }

    /// Allocated size of the internal buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Returns how many bytes of oversized lines were dropped since the last
    /// call, and resets the count.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.consumed = 0;
        }
    }
}
