//! Atom codec combinators
//!
//! An [`Atom`] is one reusable field codec: a regex fragment matching its
//! encoded form, plus decode/encode functions between hex text and a
//! [`Value`]. Grammars string atoms together positionally.
//!
//! Atom fragments never contain capturing groups; the grammar wraps each one
//! in exactly one capture so decode can consume groups in order.

use crate::hex;
use std::fmt;
use std::sync::Arc;

/// Number of slots in a group's preset list
pub const PRESET_SLOTS: usize = 30;

/// Word value filling both halves of an empty preset slot
///
/// A populated slot whose program index is itself 0xFF still decodes
/// correctly because its second word is zero; an index pair of
/// (0xFF, 0xFF) cannot be told apart from an empty slot.
pub const EMPTY_SLOT: u16 = 0xFF;

/// Raw code that word-or-off fields use for "Off"
pub const OFF_CODE: u16 = 0xFF;

/// A decoded field value flowing between atoms and records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Byte(u8),
    Word(u16),
    Text(String),
    Bytes(Vec<u8>),
    Words(Vec<u16>),
    /// Words where [`OFF_CODE`] means "off"
    Levels(Vec<Option<u16>>),
    Symbol(Symbol),
    /// `None` when the encoded flag matched neither literal
    Flag(Option<bool>),
    /// Populated preset slots only
    Presets(Vec<u16>),
}

impl Value {
    /// Short variant name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Byte(_) => "byte",
            Value::Word(_) => "word",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Words(_) => "words",
            Value::Levels(_) => "levels",
            Value::Symbol(_) => "symbol",
            Value::Flag(_) => "flag",
            Value::Presets(_) => "presets",
        }
    }
}

/// Result of a choice lookup: a known name, or the raw code when unmapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Named(&'static str),
    Raw(u16),
}

impl Default for Symbol {
    fn default() -> Self {
        Symbol::Raw(0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Named(name) => f.write_str(name),
            Symbol::Raw(code) => write!(f, "{}", code),
        }
    }
}

/// A finite name ⇄ code mapping
#[derive(Debug)]
pub struct ChoiceTable {
    pub name: &'static str,
    pub entries: &'static [(&'static str, u16)],
}

impl ChoiceTable {
    pub const fn new(name: &'static str, entries: &'static [(&'static str, u16)]) -> Self {
        Self { name, entries }
    }

    /// Total lookup: unmapped codes come back as [`Symbol::Raw`]
    pub fn symbol_for(&self, code: u16) -> Symbol {
        self.entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| Symbol::Named(*name))
            .unwrap_or(Symbol::Raw(code))
    }

    /// Case-insensitive name lookup
    pub fn named(&self, name: &str) -> Option<Symbol> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, _)| Symbol::Named(*n))
    }

    /// Code for a symbol; `None` for a name this table does not know
    pub fn code_for(&self, symbol: &Symbol) -> Option<u16> {
        match symbol {
            Symbol::Named(name) => self
                .entries
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, code)| *code),
            Symbol::Raw(code) => Some(*code),
        }
    }

    /// Position of a name in the table (used by assignable fields)
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

type DecodeFn = dyn Fn(&str) -> Value + Send + Sync;
type EncodeFn = dyn Fn(&Value) -> Option<String> + Send + Sync;

/// One field codec: matcher fragment, decoder, encoder
#[derive(Clone)]
pub struct Atom {
    name: &'static str,
    pattern: String,
    decode: Arc<DecodeFn>,
    encode: Arc<EncodeFn>,
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl Atom {
    pub fn new(
        name: &'static str,
        pattern: impl Into<String>,
        decode: impl Fn(&str) -> Value + Send + Sync + 'static,
        encode: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            pattern: pattern.into(),
            decode: Arc::new(decode),
            encode: Arc::new(encode),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Regex fragment (no capture groups) matching the encoded form
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn decode(&self, hex: &str) -> Value {
        (self.decode)(hex)
    }

    /// Encode a value; `None` when the value is the wrong variant for this atom
    pub fn encode(&self, value: &Value) -> Option<String> {
        (self.encode)(value)
    }
}

fn hex_digits(count: usize) -> String {
    format!("[0-9a-fA-F]{{{}}}", count)
}

/// SysEx data bytes carry 7 bits; anything larger would read as a status byte
fn data_byte(value: u8) -> Option<String> {
    (value <= 0x7F).then(|| hex::byte_to_hex(value))
}

fn data_word(value: u16) -> Option<String> {
    (value <= hex::WORD_MAX).then(|| hex::word_to_hex(value))
}

fn data_words(values: &[u16]) -> Option<String> {
    values.iter().map(|&w| data_word(w)).collect()
}

/// A single unpacked byte
pub fn byte() -> Atom {
    Atom::new(
        "byte",
        hex_digits(2),
        |h| Value::Byte(hex::hex_to_byte(h)),
        |v| match v {
            Value::Byte(b) => data_byte(*b),
            _ => None,
        },
    )
}

/// A 14-bit word
pub fn word() -> Atom {
    Atom::new(
        "word",
        hex_digits(4),
        |h| Value::Word(hex::hex_to_word(h)),
        |v| match v {
            Value::Word(w) => data_word(*w),
            _ => None,
        },
    )
}

/// Fixed-width, zero-terminated one-byte-per-character text
pub fn ascii(len: usize) -> Atom {
    Atom::new(
        "ascii",
        hex_digits(2 * len),
        |h| Value::Text(hex::hex_to_ascii(h)),
        move |v| match v {
            Value::Text(s) => Some(hex::ascii_to_hex(s, len)),
            _ => None,
        },
    )
}

/// Fixed-width, zero-terminated one-word-per-character text
pub fn unicode(len: usize) -> Atom {
    Atom::new(
        "unicode",
        hex_digits(4 * len),
        |h| Value::Text(hex::hex_to_unicode(h)),
        move |v| match v {
            Value::Text(s) => Some(hex::unicode_to_hex(s, len)),
            _ => None,
        },
    )
}

/// Exactly `count` raw bytes; short input is zero padded, long input truncated
pub fn bytes(count: usize) -> Atom {
    Atom::new(
        "bytes",
        hex_digits(2 * count),
        |h| Value::Bytes(hex::hex_to_bytes(h)),
        move |v| match v {
            Value::Bytes(b) => (0..count)
                .map(|i| data_byte(b.get(i).copied().unwrap_or(0)))
                .collect(),
            _ => None,
        },
    )
}

/// Exactly `count` words; short input is zero padded, long input truncated
pub fn words(count: usize) -> Atom {
    Atom::new(
        "words",
        hex_digits(4 * count),
        |h| Value::Words(hex::hex_to_words(h)),
        move |v| match v {
            Value::Words(w) => (0..count)
                .map(|i| data_word(w.get(i).copied().unwrap_or(0)))
                .collect(),
            _ => None,
        },
    )
}

/// Any number of words, including none
pub fn word_list() -> Atom {
    Atom::new(
        "word_list",
        "(?:[0-9a-fA-F]{4})*",
        |h| Value::Words(hex::hex_to_words(h)),
        |v| match v {
            Value::Words(w) => data_words(w),
            _ => None,
        },
    )
}

/// Exactly `count` words where [`OFF_CODE`] decodes to `None`
pub fn levels(count: usize) -> Atom {
    Atom::new(
        "levels",
        hex_digits(4 * count),
        |h| {
            Value::Levels(
                hex::hex_to_words(h)
                    .into_iter()
                    .map(|w| (w != OFF_CODE).then_some(w))
                    .collect(),
            )
        },
        move |v| match v {
            Value::Levels(levels) => (0..count)
                .map(|i| data_word(levels.get(i).copied().flatten().unwrap_or(OFF_CODE)))
                .collect(),
            _ => None,
        },
    )
}

/// Named constants over a 1-byte (`width_bytes == 1`) or word-sized code
///
/// Unmapped codes decode to [`Symbol::Raw`], so decoding never fails.
pub fn choice(table: &'static ChoiceTable, width_bytes: usize) -> Atom {
    let wide = width_bytes > 1;
    Atom::new(
        table.name,
        hex_digits(if wide { 4 } else { 2 }),
        move |h| {
            let code = if wide {
                hex::hex_to_word(h)
            } else {
                hex::hex_to_byte(h) as u16
            };
            Value::Symbol(table.symbol_for(code))
        },
        move |v| match v {
            Value::Symbol(symbol) => {
                let code = table.code_for(symbol)?;
                if wide {
                    data_word(code)
                } else {
                    u8::try_from(code).ok().and_then(data_byte)
                }
            }
            _ => None,
        },
    )
}

/// Binary flag over two literal hex patterns
///
/// Any other encoded value decodes to `Flag(None)`. Encoding `Flag(None)`
/// writes the off literal.
pub fn flag(on_hex: &'static str, off_hex: &'static str) -> Atom {
    debug_assert_eq!(on_hex.len(), off_hex.len());
    Atom::new(
        "flag",
        hex_digits(on_hex.len()),
        move |h| {
            Value::Flag(if h.eq_ignore_ascii_case(on_hex) {
                Some(true)
            } else if h.eq_ignore_ascii_case(off_hex) {
                Some(false)
            } else {
                None
            })
        },
        move |v| match v {
            Value::Flag(Some(true)) => Some(on_hex.to_string()),
            Value::Flag(_) => Some(off_hex.to_string()),
            _ => None,
        },
    )
}

/// The 30-slot (index, 0) pair list used by groups
pub fn preset_indices() -> Atom {
    Atom::new(
        "preset_indices",
        hex_digits(4 * 2 * PRESET_SLOTS),
        |h| Value::Presets(decode_preset_slots(&hex::hex_to_words(h))),
        |v| match v {
            Value::Presets(p) => data_words(&encode_preset_slots(p)),
            _ => None,
        },
    )
}

/// Keep the first word of every pair whose second word is exactly zero
pub fn decode_preset_slots(words: &[u16]) -> Vec<u16> {
    words
        .chunks_exact(2)
        .filter(|pair| pair[1] == 0)
        .map(|pair| pair[0])
        .collect()
}

/// Lay out up to [`PRESET_SLOTS`] indices as (index, 0) pairs, rest [`EMPTY_SLOT`]
///
/// Indices past the 30th are dropped.
pub fn encode_preset_slots(presets: &[u16]) -> Vec<u16> {
    if presets.len() > PRESET_SLOTS {
        log::warn!(
            "encode_preset_slots: {} presets given, keeping the first {}",
            presets.len(),
            PRESET_SLOTS
        );
    }
    let mut slots = vec![EMPTY_SLOT; PRESET_SLOTS * 2];
    for (i, &preset) in presets.iter().take(PRESET_SLOTS).enumerate() {
        slots[i * 2] = preset;
        slots[i * 2 + 1] = 0;
    }
    slots
}
