// Identity slug codec
// Turns arbitrary identity bytes into text that is safe as a single path
// segment or URL segment, and back again.

/// The one directory name the engine layout reserves for itself.
pub const RESERVED_NAME: &[u8] = b"shared";

/// What `encode` emits for the reserved name instead of passing it through.
pub const RESERVED_SLUG: &str = "share%64";

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Encode identity bytes as a slug.
///
/// Digits, lowercase letters and `_` pass through anywhere. `-` and `.`
/// pass through only in interior positions. `%` doubles to `%%`, and
/// every other byte becomes `%XX` with uppercase hex digits.
pub fn encode(src: &[u8]) -> String {
    if src == RESERVED_NAME {
        return RESERVED_SLUG.to_string();
    }

    let last = src.len().saturating_sub(1);
    let mut dst = String::with_capacity(src.len());
    for (i, &c) in src.iter().enumerate() {
        let interior = i > 0 && i < last;
        match c {
            b'0'..=b'9' | b'a'..=b'z' | b'_' => dst.push(c as char),
            b'-' | b'.' if interior => dst.push(c as char),
            b'%' => dst.push_str("%%"),
            _ => {
                dst.push('%');
                dst.push(HEX_UPPER[usize::from(c >> 4)] as char);
                dst.push(HEX_UPPER[usize::from(c & 0xF)] as char);
            }
        }
    }
    dst
}

// Escape automaton state
enum Escape {
    None,
    Percent,
    HighNibble { value: u8, source: char },
}

/// Decode a slug back into bytes.
///
/// Never fails. A malformed escape is copied through literally, so a
/// partially damaged slug still decodes to something close to the
/// original identity.
pub fn decode(src: &str) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len());
    let mut state = Escape::None;

    for c in src.chars() {
        state = match state {
            Escape::None => {
                if c == '%' {
                    Escape::Percent
                } else {
                    push_char(&mut dst, c);
                    Escape::None
                }
            }
            Escape::Percent => {
                if c == '%' {
                    dst.push(b'%');
                    Escape::None
                } else if let Some(v) = hex_value(c) {
                    Escape::HighNibble { value: v << 4, source: c }
                } else {
                    dst.push(b'%');
                    push_char(&mut dst, c);
                    Escape::None
                }
            }
            Escape::HighNibble { value, source } => {
                if let Some(v) = hex_value(c) {
                    dst.push(value | v);
                } else {
                    dst.push(b'%');
                    push_char(&mut dst, source);
                    push_char(&mut dst, c);
                }
                Escape::None
            }
        };
    }

    // Input ended mid-escape
    match state {
        Escape::None => {}
        Escape::Percent => dst.push(b'%'),
        Escape::HighNibble { source, .. } => {
            dst.push(b'%');
            push_char(&mut dst, source);
        }
    }

    dst
}

/// Lossy UTF-8 rendering of identity bytes, for display only.
pub fn display(src: &[u8]) -> String {
    String::from_utf8_lossy(src).into_owned()
}

/// Decode a slug and render it for display.
pub fn slug_to_display(slug: &str) -> String {
    display(&decode(slug))
}

fn hex_value(c: char) -> Option<u8> {
    c.to_digit(16).map(|v| v as u8)
}

fn push_char(dst: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    dst.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}
