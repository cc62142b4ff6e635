//! Word-offset field table for program and group buffers
//!
//! Every field is one [`FieldDef`] row: name, word offset, width in words and
//! a [`FieldKind`] that knows how to turn the slice into a [`FieldValue`] and
//! back. Zone fields are striped: zone `i` of a field lives at
//! `offset + i * width`, so the same field of all four zones is contiguous.

use crate::atom::{self, ChoiceTable, Symbol, OFF_CODE};
use crate::hex::{self, WORD_MAX};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Number of sound layers in a program
pub const ZONE_COUNT: usize = 4;

pub static ZONE_ENABLE_MODES: ChoiceTable =
    ChoiceTable::new("enabled", &[("Disabled", 0), ("Off", 1), ("On", 2)]);

pub static ZONE_MIDI_PORTS: ChoiceTable = ChoiceTable::new(
    "midi_port",
    &[("USB", 0), ("Midi1", 1), ("Midi2", 2), ("BT", 3)],
);

/// Packed velocity-curve codes
///
/// Bit 7 selects fixed velocity, bit 6 the user bank; bits 2..5 pick the
/// user curve and bits 0..1 the factory curve.
pub static ZONE_CURVE_TYPES: ChoiceTable = ChoiceTable::new(
    "curve_type",
    &[
        ("Linear", 0x14),
        ("HillCurve", 0x15),
        ("RampCurve", 0x16),
        ("Fixed", 0x96),
        ("User1", 0x42),
        ("User2", 0x46),
        ("User3", 0x4a),
        ("User4", 0x4e),
        ("User5", 0x52),
        ("User6", 0x56),
    ],
);

/// Joystick axis assignments; codes past the table are CC numbers
pub static STICK_ASSIGNMENTS: ChoiceTable = ChoiceTable::new(
    "stick",
    &[("Off", 0), ("Pitchbend", 1), ("Aftertouch", 2)],
);

/// Pedal assignments; codes past the table are CC numbers
pub static PEDAL_ASSIGNMENTS: ChoiceTable =
    ChoiceTable::new("pedal", &[("Off", 0), ("Aftertouch", 1)]);

/// Error reading or writing an overlay field
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("field '{field}' cannot store {value}")]
    Kind { field: &'static str, value: String },

    #[error("field '{field}' has no choice named '{name}'")]
    UnknownName { field: &'static str, name: String },

    #[error("field '{field}' value {value} is outside {min}..={max}")]
    Range {
        field: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("update at offset {offset:#04x} with {length} words exceeds the buffer")]
    OutOfBounds { offset: usize, length: usize },

    #[error("zone {0} does not exist")]
    NoSuchZone(usize),

    /// The new value is already in the local buffer; only the send failed
    #[error("value stored locally, but the live update failed: {0}")]
    Device(#[from] crate::device::DeviceError),
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Number(i32),
    /// The "off" sentinel of word-or-off fields
    Off,
    Symbol(Symbol),
    Presets(Vec<u16>),
    Flag(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Symbol name, if this is a named choice
    pub fn as_name(&self) -> Option<&'static str> {
        match self {
            FieldValue::Symbol(Symbol::Named(name)) => Some(*name),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Off => f.write_str("Off"),
            FieldValue::Symbol(symbol) => write!(f, "{}", symbol),
            FieldValue::Presets(presets) => write!(f, "{:?}", presets),
            FieldValue::Flag(flag) => write!(f, "{}", flag),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(n)
    }
}

impl From<Symbol> for FieldValue {
    fn from(symbol: Symbol) -> Self {
        FieldValue::Symbol(symbol)
    }
}

impl From<bool> for FieldValue {
    fn from(flag: bool) -> Self {
        FieldValue::Flag(flag)
    }
}

/// How a field's words map to a [`FieldValue`]
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// One character per word, zero terminated
    Text,
    Word,
    /// Word where [`OFF_CODE`] reads as [`FieldValue::Off`]
    WordOrOff,
    /// Stored as `value + shift`, clamped to `min..=max` on write
    Shifted { shift: i32, min: i32, max: i32 },
    /// Named codes; unmapped codes read as raw symbols
    Choice(&'static ChoiceTable),
    /// Table position for named entries, `n + table length` for CC `n`
    Assign(&'static ChoiceTable),
    CurveType,
    /// Sentinel-pair preset slots
    Presets,
    /// `on` reads as true, anything else as false
    Flag { on: u16, off: u16 },
}

/// One registered field
#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn new(name: &'static str, offset: usize, width: usize, kind: FieldKind) -> Self {
        Self {
            name,
            offset,
            width,
            kind,
        }
    }

    pub const fn word(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self::new(name, offset, 1, kind)
    }

    /// Buffer offset of this field in `zone` (stride = width)
    pub fn zone_offset(&self, zone: usize) -> usize {
        self.offset + zone * self.width
    }

    /// Decode exactly `width` words
    pub fn decode(&self, words: &[u16]) -> FieldValue {
        let first = words.first().copied().unwrap_or(0);
        match self.kind {
            FieldKind::Text => FieldValue::Text(hex::words_to_string(words)),
            FieldKind::Word => FieldValue::Number(first as i32),
            FieldKind::WordOrOff if first == OFF_CODE => FieldValue::Off,
            FieldKind::WordOrOff => FieldValue::Number(first as i32),
            FieldKind::Shifted { shift, .. } => FieldValue::Number(first as i32 - shift),
            FieldKind::Choice(table) => FieldValue::Symbol(table.symbol_for(first)),
            FieldKind::Assign(table) => match table.entries.get(first as usize) {
                Some((name, _)) => FieldValue::Symbol(Symbol::Named(*name)),
                None => FieldValue::Number(first as i32 - table.entries.len() as i32),
            },
            FieldKind::CurveType => FieldValue::Symbol(decode_curve_type(first)),
            FieldKind::Presets => FieldValue::Presets(atom::decode_preset_slots(words)),
            FieldKind::Flag { on, .. } => FieldValue::Flag(first == on),
        }
    }

    /// Encode `value` into exactly `width` words
    pub fn encode(&self, value: &FieldValue) -> Result<Vec<u16>, PatchError> {
        let mut words = match (self.kind, value) {
            (FieldKind::Text, FieldValue::Text(s)) => hex::string_to_words(s, self.width),
            (FieldKind::Word, FieldValue::Number(n)) => vec![self.word_in_range(*n)?],
            (FieldKind::WordOrOff, FieldValue::Off) => vec![OFF_CODE],
            (FieldKind::WordOrOff, FieldValue::Number(n)) => vec![self.word_in_range(*n)?],
            (FieldKind::Shifted { shift, min, max }, FieldValue::Number(n)) => {
                vec![((*n).clamp(min, max) + shift) as u16]
            }
            (FieldKind::Choice(table), _) => vec![self.choice_code(table, value)?],
            (FieldKind::Assign(table), _) => vec![self.assign_code(table, value)?],
            (FieldKind::CurveType, _) => vec![self.choice_code(&ZONE_CURVE_TYPES, value)?],
            (FieldKind::Presets, FieldValue::Presets(p)) => {
                for &preset in p {
                    self.word_in_range(preset as i32)?;
                }
                atom::encode_preset_slots(p)
            }
            (FieldKind::Flag { on, off }, FieldValue::Flag(flag)) => {
                vec![if *flag { on } else { off }]
            }
            _ => return Err(self.kind_error(value)),
        };
        words.resize(self.width, 0);
        Ok(words)
    }

    fn word_in_range(&self, n: i32) -> Result<u16, PatchError> {
        if (0..=WORD_MAX as i32).contains(&n) {
            Ok(n as u16)
        } else {
            Err(PatchError::Range {
                field: self.name,
                value: n,
                min: 0,
                max: WORD_MAX as i32,
            })
        }
    }

    fn choice_code(&self, table: &ChoiceTable, value: &FieldValue) -> Result<u16, PatchError> {
        match value {
            FieldValue::Symbol(symbol) => {
                let code = table.code_for(symbol).ok_or_else(|| PatchError::UnknownName {
                    field: self.name,
                    name: symbol.to_string(),
                })?;
                self.word_in_range(code as i32)
            }
            FieldValue::Text(name) => table
                .named(name)
                .and_then(|symbol| table.code_for(&symbol))
                .ok_or_else(|| PatchError::UnknownName {
                    field: self.name,
                    name: name.clone(),
                }),
            FieldValue::Number(n) => self.word_in_range(*n),
            _ => Err(self.kind_error(value)),
        }
    }

    fn assign_code(&self, table: &ChoiceTable, value: &FieldValue) -> Result<u16, PatchError> {
        let named = |name: &str| {
            table
                .index_of(name)
                .map(|i| i as u16)
                .ok_or_else(|| PatchError::UnknownName {
                    field: self.name,
                    name: name.to_string(),
                })
        };
        match value {
            FieldValue::Off => named("Off"),
            FieldValue::Symbol(Symbol::Named(name)) => named(name),
            FieldValue::Symbol(Symbol::Raw(code)) => self.word_in_range(*code as i32),
            FieldValue::Text(name) => named(name),
            FieldValue::Number(cc) => {
                let base = table.entries.len() as i32;
                if (0..=127).contains(cc) {
                    Ok((cc + base) as u16)
                } else {
                    Err(PatchError::Range {
                        field: self.name,
                        value: *cc,
                        min: 0,
                        max: 127,
                    })
                }
            }
            _ => Err(self.kind_error(value)),
        }
    }

    fn kind_error(&self, value: &FieldValue) -> PatchError {
        PatchError::Kind {
            field: self.name,
            value: value.to_string(),
        }
    }
}

/// Reduce a stored curve code to its canonical symbol
///
/// Codes that do not reduce to a known curve come back raw.
pub fn decode_curve_type(raw: u16) -> Symbol {
    let code = if raw & 0x80 != 0 {
        0x96
    } else if raw & 0x40 != 0 {
        let user = ((raw & 0x3F) >> 2) + 1;
        if user > 6 {
            return Symbol::Raw(raw);
        }
        0x42 + (user - 1) * 4
    } else {
        match raw & 0x03 {
            0 => 0x14,
            1 => 0x15,
            2 => 0x16,
            _ => return Symbol::Raw(raw),
        }
    };
    ZONE_CURVE_TYPES.symbol_for(code)
}

/// Program name (not striped)
pub static PATCH_NAME: FieldDef = FieldDef::new("name", 0x01, 14, FieldKind::Text);

/// Zone fields, indexed by [`ZoneField`]
pub static ZONE_FIELDS: [FieldDef; 28] = [
    FieldDef::new("instrument", 0x18, 12, FieldKind::Text),
    FieldDef::new("sound", 0x48, 11, FieldKind::Text),
    FieldDef::word("enabled", 0x74, FieldKind::Choice(&ZONE_ENABLE_MODES)),
    FieldDef::word("midi_port", 0x78, FieldKind::Choice(&ZONE_MIDI_PORTS)),
    FieldDef::word("midi_channel", 0x7c, FieldKind::Word),
    FieldDef::word("volume", 0x80, FieldKind::Word),
    FieldDef::word("program_change", 0x84, FieldKind::WordOrOff),
    FieldDef::word("bank_msb", 0x88, FieldKind::WordOrOff),
    FieldDef::word("bank_lsb", 0x8c, FieldKind::WordOrOff),
    FieldDef::word("low_key", 0x90, FieldKind::Word),
    FieldDef::word("high_key", 0x94, FieldKind::Word),
    FieldDef::word("curve_type", 0x98, FieldKind::CurveType),
    FieldDef::word("low_velocity", 0x9c, FieldKind::Word),
    FieldDef::word("high_velocity", 0xa0, FieldKind::Word),
    FieldDef::word(
        "octave",
        0xa4,
        FieldKind::Shifted {
            shift: 3,
            min: -3,
            max: 3,
        },
    ),
    FieldDef::word(
        "transpose",
        0xa8,
        FieldKind::Shifted {
            shift: 12,
            min: -12,
            max: 12,
        },
    ),
    FieldDef::word("after_touch", 0xac, FieldKind::Word),
    FieldDef::word("fixed_velocity", 0xb0, FieldKind::Word),
    FieldDef::word("stick1_x", 0xb4, FieldKind::Assign(&STICK_ASSIGNMENTS)),
    FieldDef::word("stick1_y", 0xb8, FieldKind::Assign(&STICK_ASSIGNMENTS)),
    FieldDef::word("stick2_x", 0xbc, FieldKind::Assign(&STICK_ASSIGNMENTS)),
    FieldDef::word("stick2_y", 0xc0, FieldKind::Assign(&STICK_ASSIGNMENTS)),
    FieldDef::word("stick3_x", 0xc4, FieldKind::Assign(&STICK_ASSIGNMENTS)),
    FieldDef::word("stick3_y", 0xc8, FieldKind::Assign(&STICK_ASSIGNMENTS)),
    FieldDef::word("pedal1", 0xd0, FieldKind::Assign(&PEDAL_ASSIGNMENTS)),
    FieldDef::word("pedal2", 0xd4, FieldKind::Assign(&PEDAL_ASSIGNMENTS)),
    FieldDef::word("pedal3", 0xd8, FieldKind::Assign(&PEDAL_ASSIGNMENTS)),
    FieldDef::word("pedal4", 0xdc, FieldKind::Assign(&PEDAL_ASSIGNMENTS)),
];

/// Typed index into [`ZONE_FIELDS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneField {
    Instrument,
    Sound,
    Enabled,
    MidiPort,
    MidiChannel,
    Volume,
    ProgramChange,
    BankMsb,
    BankLsb,
    LowKey,
    HighKey,
    CurveType,
    LowVelocity,
    HighVelocity,
    Octave,
    Transpose,
    AfterTouch,
    FixedVelocity,
    Stick1X,
    Stick1Y,
    Stick2X,
    Stick2Y,
    Stick3X,
    Stick3Y,
    Pedal1,
    Pedal2,
    Pedal3,
    Pedal4,
}

impl ZoneField {
    pub const ALL: [ZoneField; 28] = [
        ZoneField::Instrument,
        ZoneField::Sound,
        ZoneField::Enabled,
        ZoneField::MidiPort,
        ZoneField::MidiChannel,
        ZoneField::Volume,
        ZoneField::ProgramChange,
        ZoneField::BankMsb,
        ZoneField::BankLsb,
        ZoneField::LowKey,
        ZoneField::HighKey,
        ZoneField::CurveType,
        ZoneField::LowVelocity,
        ZoneField::HighVelocity,
        ZoneField::Octave,
        ZoneField::Transpose,
        ZoneField::AfterTouch,
        ZoneField::FixedVelocity,
        ZoneField::Stick1X,
        ZoneField::Stick1Y,
        ZoneField::Stick2X,
        ZoneField::Stick2Y,
        ZoneField::Stick3X,
        ZoneField::Stick3Y,
        ZoneField::Pedal1,
        ZoneField::Pedal2,
        ZoneField::Pedal3,
        ZoneField::Pedal4,
    ];

    pub fn def(self) -> &'static FieldDef {
        &ZONE_FIELDS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.def().name
    }

    /// Look up a field by its table name (`"octave"`, `"stick1_x"`, ...)
    pub fn from_name(name: &str) -> Option<ZoneField> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

static FIELD_NAMES: Lazy<HashMap<usize, String>> = Lazy::new(|| {
    let mut names = HashMap::new();
    names.insert(PATCH_NAME.offset, PATCH_NAME.name.to_string());
    for def in &ZONE_FIELDS {
        for zone in 0..ZONE_COUNT {
            names.insert(def.zone_offset(zone), format!("zone {}.{}", zone, def.name));
        }
    }
    names
});

/// Name of the program field starting at `offset`, e.g. `"zone 2.octave"`
pub fn field_name_at(offset: usize) -> Option<&'static str> {
    FIELD_NAMES.get(&offset).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_field_index_matches_table() {
        for (i, field) in ZoneField::ALL.iter().enumerate() {
            assert_eq!(*field as usize, i);
            assert_eq!(ZoneField::from_name(field.name()), Some(*field));
        }
        assert_eq!(ZoneField::Octave.def().offset, 0xa4);
        assert_eq!(ZoneField::from_name("tempo"), None);
    }

    #[test]
    fn test_zone_ranges_do_not_overlap() {
        let mut owner = vec![None; 256];
        for def in &ZONE_FIELDS {
            for zone in 0..ZONE_COUNT {
                let start = def.zone_offset(zone);
                for slot in &mut owner[start..start + def.width] {
                    assert_eq!(*slot, None, "{} zone {} overlaps", def.name, zone);
                    *slot = Some((def.name, zone));
                }
            }
        }
        for slot in &owner[PATCH_NAME.offset..PATCH_NAME.offset + PATCH_NAME.width] {
            assert_eq!(*slot, None);
        }
    }

    #[test]
    fn test_field_name_at() {
        assert_eq!(field_name_at(0xa6), Some("zone 2.octave"));
        assert_eq!(field_name_at(0x18 + 12), Some("zone 1.instrument"));
        assert_eq!(field_name_at(0x01), Some("name"));
        assert_eq!(field_name_at(0x19), None);
    }

    #[test]
    fn test_shifted_clamps() {
        let octave = ZoneField::Octave.def();
        assert_eq!(octave.encode(&FieldValue::Number(3)).unwrap(), vec![6]);
        assert_eq!(octave.encode(&FieldValue::Number(9)).unwrap(), vec![6]);
        assert_eq!(octave.encode(&FieldValue::Number(-7)).unwrap(), vec![0]);
        assert_eq!(octave.decode(&[6]), FieldValue::Number(3));
        assert_eq!(ZoneField::Transpose.def().decode(&[12]), FieldValue::Number(0));
    }

    #[test]
    fn test_word_or_off() {
        let pc = ZoneField::ProgramChange.def();
        assert_eq!(pc.decode(&[OFF_CODE]), FieldValue::Off);
        assert_eq!(pc.decode(&[12]), FieldValue::Number(12));
        assert_eq!(pc.encode(&FieldValue::Off).unwrap(), vec![OFF_CODE]);
        assert!(matches!(
            pc.encode(&FieldValue::Number(-1)),
            Err(PatchError::Range { .. })
        ));
    }

    #[test]
    fn test_choice_by_name_symbol_or_code() {
        let enabled = ZoneField::Enabled.def();
        assert_eq!(enabled.encode(&"off".into()).unwrap(), vec![1]);
        assert_eq!(
            enabled.encode(&Symbol::Named("On").into()).unwrap(),
            vec![2]
        );
        assert_eq!(enabled.decode(&[9]), FieldValue::Symbol(Symbol::Raw(9)));
        assert_eq!(enabled.encode(&FieldValue::Number(9)).unwrap(), vec![9]);
        assert!(matches!(
            enabled.encode(&"Maybe".into()),
            Err(PatchError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_stick_and_pedal_assignments() {
        let stick = ZoneField::Stick1X.def();
        assert_eq!(stick.decode(&[1]).as_name(), Some("Pitchbend"));
        assert_eq!(stick.decode(&[75]), FieldValue::Number(72));
        assert_eq!(stick.encode(&FieldValue::Number(1)).unwrap(), vec![4]);
        assert_eq!(stick.encode(&FieldValue::Off).unwrap(), vec![0]);

        let pedal = ZoneField::Pedal1.def();
        assert_eq!(pedal.decode(&[1]).as_name(), Some("Aftertouch"));
        assert_eq!(pedal.encode(&FieldValue::Number(64)).unwrap(), vec![66]);
        assert_eq!(pedal.decode(&[66]), FieldValue::Number(64));
        assert!(pedal.encode(&"Pitchbend".into()).is_err());
    }

    #[test]
    fn test_raw_codes_past_a_word_are_rejected() {
        let stick = ZoneField::Stick1X.def();
        assert_eq!(stick.encode(&Symbol::Raw(0x3fff).into()).unwrap(), vec![0x3fff]);
        assert!(matches!(
            stick.encode(&Symbol::Raw(0x4000).into()),
            Err(PatchError::Range { value: 0x4000, .. })
        ));
        assert!(matches!(
            ZoneField::Enabled.def().encode(&Symbol::Raw(0x8000).into()),
            Err(PatchError::Range { .. })
        ));
    }

    #[test]
    fn test_curve_type_reduction() {
        assert_eq!(decode_curve_type(0x14), Symbol::Named("Linear"));
        assert_eq!(decode_curve_type(0), Symbol::Named("Linear"));
        assert_eq!(decode_curve_type(1), Symbol::Named("HillCurve"));
        assert_eq!(decode_curve_type(0x16), Symbol::Named("RampCurve"));
        assert_eq!(decode_curve_type(0x80), Symbol::Named("Fixed"));
        assert_eq!(decode_curve_type(0x42), Symbol::Named("User1"));
        assert_eq!(decode_curve_type(0x56), Symbol::Named("User6"));
        assert_eq!(decode_curve_type(0x5a), Symbol::Raw(0x5a));
        assert_eq!(decode_curve_type(0x03), Symbol::Raw(0x03));
    }

    #[test]
    fn test_curve_type_round_trip() {
        let curve = ZoneField::CurveType.def();
        for (name, code) in ZONE_CURVE_TYPES.entries {
            let words = curve.encode(&FieldValue::Text(name.to_string())).unwrap();
            assert_eq!(words, vec![*code]);
            assert_eq!(curve.decode(&words).as_name(), Some(*name));
        }
    }

    #[test]
    fn test_text_pads_to_width() {
        let sound = ZoneField::Sound.def();
        let words = sound.encode(&"Rhodes".into()).unwrap();
        assert_eq!(words.len(), 11);
        assert_eq!(sound.decode(&words), FieldValue::Text("Rhodes".into()));
    }

    #[test]
    fn test_kind_mismatch() {
        assert!(matches!(
            ZoneField::Volume.def().encode(&"loud".into()),
            Err(PatchError::Kind { field: "volume", .. })
        ));
    }
}
