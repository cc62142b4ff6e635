//! Hex text ⇄ protocol primitives
//!
//! Every SysEx payload is handled as lowercase hex text. Multi-byte integers
//! use the MIDI-safe 14-bit "word" packing: two 7-bit bytes, least
//! significant first, so `0x0105` travels as `05 02`.
//!
//! Nothing here validates its input. Malformed hex decodes to zeros or to a
//! shorter result; rejecting bad payloads is the grammar matcher's job.

/// Largest value a protocol word can carry
pub const WORD_MAX: u16 = 0x3FFF;

/// Parse one hex pair, treating anything unparsable as zero
fn parse_pair(hex: &str) -> u8 {
    u8::from_str_radix(hex, 16).unwrap_or(0)
}

/// Encode a single byte as two lowercase hex digits
pub fn byte_to_hex(value: u8) -> String {
    format!("{:02x}", value)
}

/// Decode the first two hex digits of `hex`
pub fn hex_to_byte(hex: &str) -> u8 {
    hex.get(0..2).map(parse_pair).unwrap_or(0)
}

/// Encode a 14-bit value as two 7-bit bytes, low byte first
///
/// Bits above 14 are dropped.
pub fn word_to_hex(value: u16) -> String {
    let mut out = byte_to_hex((value & 0x7F) as u8);
    out.push_str(&byte_to_hex(((value >> 7) & 0x7F) as u8));
    out
}

/// Decode a 4-digit hex word (low byte first)
pub fn hex_to_word(hex: &str) -> u16 {
    let low = hex.get(0..2).map(parse_pair).unwrap_or(0) as u16;
    let high = hex.get(2..4).map(parse_pair).unwrap_or(0) as u16;
    (high << 7) + low
}

/// Encode text as one byte per character into a fixed `max_len` field
///
/// The last slot is always a terminator, so at most `max_len - 1` characters
/// are kept. Characters outside 7-bit ASCII become `?`.
pub fn ascii_to_hex(text: &str, max_len: usize) -> String {
    let mut chars = text.chars();
    (0..max_len)
        .map(|i| {
            let code = if i + 1 < max_len {
                chars.next().map(ascii_code).unwrap_or(0)
            } else {
                0
            };
            byte_to_hex(code)
        })
        .collect()
}

fn ascii_code(c: char) -> u8 {
    if c.is_ascii() {
        c as u8
    } else {
        b'?'
    }
}

/// Decode one-byte-per-character text, stopping at the first zero byte
pub fn hex_to_ascii(hex: &str) -> String {
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| std::str::from_utf8(pair).map(parse_pair).unwrap_or(0))
        .take_while(|&code| code != 0)
        .map(char::from)
        .collect()
}

/// Encode text as one word per character into a fixed `max_len` field
///
/// Same termination rule as [`ascii_to_hex`].
pub fn unicode_to_hex(text: &str, max_len: usize) -> String {
    words_to_hex(&string_to_words(text, max_len))
}

/// Decode one-word-per-character text, stopping at the first zero word
pub fn hex_to_unicode(hex: &str) -> String {
    words_to_string(&hex_to_words(hex))
}

/// Concatenate word encodings
pub fn words_to_hex(values: &[u16]) -> String {
    values.iter().map(|&v| word_to_hex(v)).collect()
}

/// Split hex text into 4-digit groups and decode each as a word
///
/// A trailing partial group, or any group containing non-hex characters,
/// is skipped.
pub fn hex_to_words(hex: &str) -> Vec<u16> {
    hex.as_bytes()
        .chunks_exact(4)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter(|chunk| chunk.chars().all(|c| c.is_ascii_hexdigit()))
        .map(hex_to_word)
        .collect()
}

/// Text to a fixed-length, zero-terminated word array
///
/// Characters that do not fit in 14 bits become `?`.
pub fn string_to_words(text: &str, max_len: usize) -> Vec<u16> {
    let mut chars = text.chars();
    (0..max_len)
        .map(|i| {
            if i + 1 < max_len {
                chars.next().map(unicode_code).unwrap_or(0)
            } else {
                0
            }
        })
        .collect()
}

fn unicode_code(c: char) -> u16 {
    let code = c as u32;
    if code <= WORD_MAX as u32 {
        code as u16
    } else {
        b'?' as u16
    }
}

/// Word array back to text, stopping at the first zero word
pub fn words_to_string(words: &[u16]) -> String {
    words
        .iter()
        .take_while(|&&w| w != 0)
        .map(|&w| char::from_u32(w as u32).unwrap_or('?'))
        .collect()
}

/// Raw wire bytes to lowercase hex
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_to_hex(b)).collect()
}

/// Hex text to raw wire bytes (pairs that fail to parse become zero)
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| std::str::from_utf8(pair).map(parse_pair).unwrap_or(0))
        .collect()
}

/// Format hex for log output: upper case, space-separated pairs
pub fn pretty_hex(hex: &str) -> String {
    let compact: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}
