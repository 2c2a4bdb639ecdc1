/// Incremental line framer for a chunked response body.
///
/// Bytes are buffered until a `\n` arrives and only then decoded, so a
/// multi-byte character split across two chunks is reassembled before
/// decoding. Invalid UTF-8 inside a line is replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed, in order.
    ///
    /// The `\n` terminator (and a `\r` right before it) is stripped. An
    /// empty chunk returns nothing and leaves the buffer untouched.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        // `pending` never holds a terminator between calls, so only the new
        // bytes need scanning.
        let mut search_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.pending[search_from..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let line_end = search_from + offset;
            lines.push(decode_line(&self.pending[line_start..line_end]));
            line_start = line_end + 1;
            search_from = line_start;
        }
        if line_start > 0 {
            self.pending.drain(..line_start);
        }
        lines
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Consumes the reader, returning unterminated trailing data as one
    /// final line.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(decode_line(&self.pending))
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
