//! Newline framing for per-client command buffers.
//!
//! Bytes from each read are appended to a `CommandBuffer`. Complete
//! commands are cut off the front one `\n` at a time; whatever follows the
//! last terminator stays buffered until a later read completes it.
//!
//! Terminators are counted as bytes arrive, so each byte is scanned once on
//! append and at most once more when its command is cut.

use bytes::{Buf, Bytes, BytesMut};

const TERMINATOR: u8 = b'\n';

/// Accumulated, not yet dispatched bytes for one client.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    buf: BytesMut,
    /// Terminators currently in `buf`.
    terminators: usize,
    /// Bytes after the last terminator.
    partial: usize,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the client.
    pub fn extend(&mut self, data: &[u8]) {
        match data.iter().rposition(|&b| b == TERMINATOR) {
            Some(last) => {
                self.terminators += data[..=last].iter().filter(|&&b| b == TERMINATOR).count();
                self.partial = data.len() - last - 1;
            }
            None => self.partial += data.len(),
        }
        self.buf.extend_from_slice(data);
    }

    /// Number of complete commands currently buffered.
    #[cfg(test)]
    pub fn terminator_count(&self) -> usize {
        self.terminators
    }

    pub fn has_command(&self) -> bool {
        self.terminators > 0
    }

    /// Length of the unterminated command at the end of the buffer.
    pub fn partial_len(&self) -> usize {
        self.partial
    }

    /// Remove and return the first complete command.
    ///
    /// The terminator and any trailing `\r` are stripped. Returns `None`
    /// while no terminator has arrived, leaving the partial command intact.
    pub fn next_command(&mut self) -> Option<Bytes> {
        if self.terminators == 0 {
            return None;
        }
        let pos = self.buf.iter().position(|&b| b == TERMINATOR)?;
        let mut line = self.buf.split_to(pos);
        self.buf.advance(1);
        self.terminators -= 1;

        while line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }

    /// Bytes received but not dispatched yet.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut CommandBuffer) -> Vec<Bytes> {
        std::iter::from_fn(|| buffer.next_command()).collect()
    }

    fn feed(chunks: &[&[u8]]) -> (Vec<Bytes>, Vec<u8>) {
        let mut buffer = CommandBuffer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            buffer.extend(chunk);
            out.extend(drain(&mut buffer));
        }
        (out, buffer.pending().to_vec())
    }

    #[test]
    fn test_partial_command_retained() {
        let mut buffer = CommandBuffer::new();
        buffer.extend(b"hel");
        assert_eq!(buffer.terminator_count(), 0);
        assert_eq!(buffer.next_command(), None);
        assert_eq!(buffer.pending(), b"hel");

        buffer.extend(b"lo\n");
        assert_eq!(buffer.next_command(), Some(Bytes::from_static(b"hello")));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_commands_in_one_read() {
        let (commands, rest) = feed(&[b"hello\nmenu\n"]);
        assert_eq!(commands, vec!["hello", "menu"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_trailing_partial_after_complete() {
        let mut buffer = CommandBuffer::new();
        buffer.extend(b"1\n2\nme");
        assert_eq!(buffer.terminator_count(), 2);
        assert_eq!(buffer.partial_len(), 2);

        let commands = drain(&mut buffer);
        assert_eq!(commands, vec!["1", "2"]);
        assert_eq!(buffer.pending(), b"me");
        assert_eq!(buffer.terminator_count(), 0);
        assert!(!buffer.has_command());

        buffer.extend(b"nu\n");
        assert_eq!(buffer.partial_len(), 0);
        assert_eq!(drain(&mut buffer), vec!["menu"]);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let stream: &[u8] = b"hello\n3\nexit now\n\nmenu\n";
        let (whole, _) = feed(&[stream]);
        assert_eq!(whole, vec!["hello", "3", "exit now", "", "menu"]);

        for split in 1..stream.len() {
            let (a, b) = stream.split_at(split);
            assert_eq!(feed(&[a, b]).0, whole, "split at {split}");
        }

        let bytes: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(feed(&bytes).0, whole);
    }

    #[test]
    fn test_crlf_stripped() {
        let (commands, _) = feed(&[b"hello\r\n", b"2\r", b"\n"]);
        assert_eq!(commands, vec!["hello", "2"]);
    }

    #[test]
    fn test_invalid_utf8_kept_verbatim() {
        let (commands, _) = feed(&[b"\xff\xfe", b"ok\n"]);
        assert_eq!(commands, vec![Bytes::from_static(b"\xff\xfeok")]);
    }

    #[test]
    fn test_len_tracks_partial() {
        let mut buffer = CommandBuffer::new();
        buffer.extend(b"dangling");
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.partial_len(), 8);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.next_command(), None);
        assert_eq!(buffer.len(), 8);
    }

    #[test]
    fn test_partial_len_grows_across_unterminated_reads() {
        let mut buffer = CommandBuffer::new();
        buffer.extend(b"exit\nab");
        buffer.extend(b"cd");
        buffer.extend(b"ef");
        assert_eq!(buffer.partial_len(), 6);
        assert_eq!(buffer.terminator_count(), 1);

        // Holding back complete commands does not change the partial tail
        buffer.extend(b"\nxy");
        assert_eq!(buffer.terminator_count(), 2);
        assert_eq!(buffer.partial_len(), 2);
        assert_eq!(buffer.next_command(), Some(Bytes::from_static(b"exit")));
        assert_eq!(buffer.partial_len(), 2);
        assert_eq!(buffer.next_command(), Some(Bytes::from_static(b"abcdef")));
        assert_eq!(buffer.next_command(), None);
        assert_eq!(buffer.pending(), b"xy");
    }
}
