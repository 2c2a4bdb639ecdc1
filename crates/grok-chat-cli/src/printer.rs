use std::io::Write;

/// Prints a growing reply by writing only the part not yet shown.
///
/// Replies only ever grow at the end (annotations included), so each
/// snapshot's new suffix is all that needs printing.
pub struct TerminalPrinter<W: Write> {
    out: W,
    printed: usize,
}

impl<W: Write> TerminalPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    pub fn update(&mut self, content: &str) -> std::io::Result<()> {
        if content.len() <= self.printed || !content.is_char_boundary(self.printed) {
            return Ok(());
        }
        self.out.write_all(content[self.printed..].as_bytes())?;
        self.out.flush()?;
        self.printed = content.len();
        Ok(())
    }

    /// Ends the reply with a newline if anything was printed.
    pub fn finish(mut self) -> std::io::Result<W> {
        if self.printed > 0 {
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(self.out)
    }
}
