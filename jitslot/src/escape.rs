//! Byte-level escape resolution for raw field text.
//!
//! A lone escape character drops itself and keeps the following byte
//! literally; two escape characters in a row collapse to one literal escape
//! character. Output is bounded by the destination buffer and never errors:
//! an undersized destination silently truncates.

/// Unescape `src` into `dst`, returning the number of bytes written.
///
/// The output bound is `max_len` when positive, otherwise `src.len()`, and in
/// either case never more than `dst.len()`.
pub fn unescape(src: &[u8], escape_char: u8, dst: &mut [u8], max_len: i64) -> usize {
    let bound = if max_len > 0 {
        usize::try_from(max_len).unwrap_or(usize::MAX)
    } else {
        src.len()
    };
    let bound = bound.min(dst.len());

    let mut escaping = false;
    let mut written = 0;
    for &c in src {
        if written >= bound {
            break;
        }
        if c == escape_char {
            escaping = !escaping;
        } else {
            escaping = false;
        }
        if !escaping {
            dst[written] = c;
            written += 1;
        }
    }
    written
}

/// Unescape into a freshly allocated buffer sized for the worst case.
pub fn unescape_to_vec(src: &[u8], escape_char: u8, max_len: i64) -> Vec<u8> {
    let cap = if max_len > 0 {
        src.len().min(usize::try_from(max_len).unwrap_or(usize::MAX))
    } else {
        src.len()
    };
    let mut out = vec![0u8; cap];
    let n = unescape(src, escape_char, &mut out, max_len);
    out.truncate(n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_escape_collapses() {
        assert_eq!(unescape_to_vec(b"a\\\\b", b'\\', 0), b"a\\b");
    }

    #[test]
    fn test_escape_keeps_next_byte() {
        let mut dst = [0u8; 8];
        let n = unescape(b"x\\n", b'\\', &mut dst, 0);
        assert_eq!(n, 2);
        assert_eq!(&dst[..n], b"xn");
    }

    #[test]
    fn test_escaped_delimiter() {
        assert_eq!(unescape_to_vec(b"a\\,b", b'\\', 0), b"a,b");
    }

    #[test]
    fn test_trailing_escape_dropped() {
        assert_eq!(unescape_to_vec(b"ab\\", b'\\', 0), b"ab");
    }

    #[test]
    fn test_triple_escape() {
        // Pair collapses, third escapes the 'n'.
        assert_eq!(unescape_to_vec(b"\\\\\\n", b'\\', 0), b"\\n");
    }

    #[test]
    fn test_truncates_to_max_len() {
        let mut dst = [0u8; 8];
        let n = unescape(b"hello", b'\\', &mut dst, 2);
        assert_eq!(n, 2);
        assert_eq!(&dst[..n], b"he");
    }

    #[test]
    fn test_truncates_to_dst_len() {
        let mut dst = [0u8; 3];
        let n = unescape(b"hello", b'\\', &mut dst, 0);
        assert_eq!(n, 3);
        assert_eq!(&dst, b"hel");
    }

    #[test]
    fn test_identity_without_escape_char() {
        let inputs: [&[u8]; 5] = [b"", b"plain", b"tab\there", b"\x00\xff\x10", b"N/A"];
        for input in inputs {
            let once = unescape_to_vec(input, b'\\', 0);
            assert_eq!(once, input);
            assert_eq!(unescape_to_vec(&once, b'\\', 0), once);
        }
    }

    #[test]
    fn test_custom_escape_char() {
        assert_eq!(unescape_to_vec(b"a^|b^^", b'^', 0), b"a|b^");
    }
}
