//! Menu protocol parser.

use bytes::Bytes;

/// Parsed menu command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `hello`
    Hello,
    /// `exit`: close the connection without a reply.
    Exit,
    /// `menu`
    Menu,
    /// `passwd` (placeholder, not implemented).
    Passwd,
    /// Numeric command `1`.
    ClientIp,
    /// Numeric command `2`.
    ClientPort,
    /// Numeric commands `3`, `4` and `5`.
    Graphic(u8),
    /// Anything else, carrying the command bytes as received.
    Unknown(Bytes),
}

/// Classify one command line (terminator already stripped).
///
/// Keyword matches are exact and case-sensitive. Everything else goes
/// through [`leading_int`], so `"3abc"` is command 3 and `"abc"` is 0.
pub fn parse(line: Bytes) -> Command {
    match &line[..] {
        b"hello" => Command::Hello,
        b"exit" => Command::Exit,
        b"menu" => Command::Menu,
        b"passwd" => Command::Passwd,
        _ => match leading_int(&line) {
            1 => Command::ClientIp,
            2 => Command::ClientPort,
            n @ 3..=5 => Command::Graphic(n as u8),
            _ => Command::Unknown(line),
        },
    }
}

/// `atoi`-style integer prefix: leading whitespace, optional sign, then the
/// longest run of ASCII digits. No digits yields 0; overflow saturates.
pub fn leading_int(input: &[u8]) -> i64 {
    let start = input
        .iter()
        .position(|&b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c))
        .unwrap_or(input.len());
    let s = &input[start..];
    let (negative, digits) = match s.first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }

    if negative {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(line: &str) -> Command {
        parse(Bytes::copy_from_slice(line.as_bytes()))
    }

    fn unknown(line: &str) -> Command {
        Command::Unknown(Bytes::copy_from_slice(line.as_bytes()))
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_str("hello"), Command::Hello);
        assert_eq!(parse_str("exit"), Command::Exit);
        assert_eq!(parse_str("menu"), Command::Menu);
        assert_eq!(parse_str("passwd"), Command::Passwd);
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(parse_str("HELLO"), unknown("HELLO"));
        assert_eq!(parse_str("Exit"), unknown("Exit"));
        assert_eq!(parse_str("hello "), unknown("hello "));
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_str("1"), Command::ClientIp);
        assert_eq!(parse_str("2"), Command::ClientPort);
        assert_eq!(parse_str("3"), Command::Graphic(3));
        assert_eq!(parse_str("4"), Command::Graphic(4));
        assert_eq!(parse_str("5"), Command::Graphic(5));
        assert_eq!(parse_str("  5"), Command::Graphic(5));
        assert_eq!(parse_str("3abc"), Command::Graphic(3));
    }

    #[test]
    fn test_parse_unknown() {
        for s in ["", "0", "6", "-1", "42", "abc", "quit", "99999999999999999999999"] {
            assert_eq!(parse_str(s), unknown(s), "input {s:?}");
        }
    }

    #[test]
    fn test_parse_non_utf8() {
        let raw = Bytes::from_static(b"\xff4");
        assert_eq!(parse(raw.clone()), Command::Unknown(raw));
        assert_eq!(parse(Bytes::from_static(b"4\xff")), Command::Graphic(4));
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int(b"12"), 12);
        assert_eq!(leading_int(b"  +7x"), 7);
        assert_eq!(leading_int(b"-3"), -3);
        assert_eq!(leading_int(b"x3"), 0);
        assert_eq!(leading_int(b"-"), 0);
        assert_eq!(leading_int(b""), 0);
        assert_eq!(leading_int(b"99999999999999999999999"), i64::MAX);
    }
}
