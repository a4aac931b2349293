use vte::{Parser, Perform};

/// Incremental filter from raw PTY bytes to plain text.
///
/// Keeps printable characters and the three layout controls that carry line
/// structure (`\r`, `\n`, `\t`). Everything else is dropped: CSI, OSC, DCS and
/// bare ESC sequences, BEL, backspace, and the remaining C0 controls.
///
/// Parser state is kept between calls to [`Sanitizer::feed`], so an escape
/// sequence or a multi-byte UTF-8 character split across two reads is still
/// handled as one unit.
pub struct Sanitizer {
    parser: Parser,
}

struct TextSink<'a> {
    out: &'a mut String,
}

impl Perform for TextSink<'_> {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\r' | b'\n' | b'\t') {
            self.out.push(byte as char);
        }
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Feed the next chunk of output and return the text it contributed.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len());
        self.feed_into(bytes, &mut out);
        out
    }

    /// Like [`Sanitizer::feed`], appending to an existing buffer.
    pub fn feed_into(&mut self, bytes: &[u8], out: &mut String) {
        let mut sink = TextSink { out };
        self.parser.advance(&mut sink, bytes);
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot sanitizing of a complete byte string.
pub fn sanitize(bytes: &[u8]) -> String {
    Sanitizer::new().feed(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(sanitize(b"ls /etc/pas"), "ls /etc/pas");
    }

    #[test]
    fn test_line_structure_is_kept() {
        assert_eq!(sanitize(b"swd\r\npasswd\r\npasswd-\r\n"), "swd\r\npasswd\r\npasswd-\r\n");
        assert_eq!(sanitize(b"a\tb"), "a\tb");
    }

    #[test]
    fn test_csi_sequences_removed() {
        // Bracketed paste toggles around a prompt, and a color reset.
        assert_eq!(sanitize(b"\x1b[?2004h@/\x1b[0mls"), "@/ls");
        assert_eq!(sanitize(b"\x1b[01;34mdir\x1b[0m/"), "dir/");
    }

    #[test]
    fn test_osc_title_removed() {
        assert_eq!(sanitize(b"\x1b]0;user@host: ~\x07@/"), "@/");
    }

    #[test]
    fn test_bell_and_backspace_removed() {
        assert_eq!(sanitize(b"git chec\x07\x08k"), "git check");
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut sanitizer = Sanitizer::new();
        let mut text = sanitizer.feed(b"before\x1b[");
        text.push_str(&sanitizer.feed(b"?2004lafter"));
        assert_eq!(text, "beforeafter");
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let bytes = "caf\u{e9}".as_bytes();
        let mut sanitizer = Sanitizer::new();
        let mut text = String::new();
        sanitizer.feed_into(&bytes[..4], &mut text);
        sanitizer.feed_into(&bytes[4..], &mut text);
        assert_eq!(text, "caf\u{e9}");
    }

    #[test]
    fn test_echoed_interrupt_is_text() {
        // Readline echoes ^C as two printable characters.
        assert_eq!(sanitize(b"^C\r\n@/"), "^C\r\n@/");
    }
}
