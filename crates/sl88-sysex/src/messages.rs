//! SL88 SysEx message catalog
//!
//! Each record below is registered with its grammar once, and [`Catalog`]
//! keeps them in a fixed order for first-match-wins decoding. All payloads
//! are the hex between the device preamble and terminator.
//!
//! # Precedence
//!
//! The catalog tries grammars in declaration order and returns the first
//! structural match. Opcodes that prefix one another (`0a`/`000a`,
//! `10`/`0010`, `7f`/`007f`, `01` dumps with and without checksum) are kept
//! apart by anchoring and fixed field widths, and [`Catalog::overlaps`]
//! checks that no grammar's sample payload is claimed by another one.

use crate::atom::{self, ChoiceTable, Symbol, Value};
use crate::grammar::{
    field, lit, FieldError, Fields, GrammarError, MessageGrammar, SysexMessage, Token,
};
use crate::group::GROUP_NAME_LEN;
use crate::patch::PATCH_WORDS;
use once_cell::sync::Lazy;
use std::fmt;

/// Characters (including terminator) in a program name dump
pub const PROGRAM_NAME_LEN: usize = 15;

/// Characters (including terminator) in a velocity curve name
pub const CURVE_NAME_LEN: usize = 10;

/// Control points carried by a velocity curve (x/y pairs, word-or-off)
pub const CURVE_POINTS: usize = 6;

/// Velocity table entries in a curve
pub const VELOCITY_STEPS: usize = 127;

/// Encoded "active" literal of a group
pub const GROUP_ACTIVE_HEX: &str = "0200";

/// Encoded "inactive" literal of a group
pub const GROUP_INACTIVE_HEX: &str = "0000";

/// Curve bank stored with a velocity curve
pub static VELOCITY_CURVE_BANKS: ChoiceTable =
    ChoiceTable::new("curve_bank", &[("Factory", 0x00), ("User", 0x55)]);

macro_rules! opcode_message {
    ($(#[$doc:meta])* $name:ident => $hex:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl SysexMessage for $name {
            fn grammar() -> &'static MessageGrammar<Self> {
                static GRAMMAR: Lazy<MessageGrammar<$name>> = Lazy::new(|| {
                    MessageGrammar::new(stringify!($name), vec![lit($hex)])
                        .expect("valid opcode grammar")
                });
                &GRAMMAR
            }

            fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
                Fields::new(values, 0).map(|_| Self)
            }

            fn to_values(&self) -> Vec<Value> {
                Vec::new()
            }
        }
    };
}

opcode_message!(
    /// Host → device: open an editor session
    InitiateConnection => "000500"
);
opcode_message!(
    /// Device → host: session accepted
    ConfirmConnection => "0500"
);
opcode_message!(
    /// Keep-alive probe
    CheckAttached => "007f"
);
opcode_message!(
    /// Keep-alive answer
    ConfirmAttached => "7f"
);
opcode_message!(
    /// Ask the device for every program name
    RequestProgramNameDump => "0010"
);
opcode_message!(EndOfProgramNameDump => "10");
opcode_message!(BeginDumpIn => "0011");
opcode_message!(EndProgramDump => "11");
opcode_message!(EndOfDump => "000a");

/// One entry of a program name dump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramName {
    pub program: u16,
    pub name: String,
}

static PROGRAM_NAME: Lazy<MessageGrammar<ProgramName>> = Lazy::new(|| {
    MessageGrammar::new(
        "ProgramName",
        vec![
            lit("0a"),
            field("program", atom::word()),
            field("name", atom::ascii(PROGRAM_NAME_LEN)),
        ],
    )
    .expect("valid ProgramName grammar")
});

impl SysexMessage for ProgramName {
    fn grammar() -> &'static MessageGrammar<Self> {
        &PROGRAM_NAME
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 2)?;
        Ok(Self {
            program: f.word("program")?,
            name: f.text("name")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Word(self.program), Value::Text(self.name.clone())]
    }
}

/// Full program dump received from the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramIn {
    pub program: u16,
    pub data: Vec<u16>,
    /// Carried verbatim; not verified
    pub checksum: u8,
}

static PROGRAM_IN: Lazy<MessageGrammar<ProgramIn>> = Lazy::new(|| {
    MessageGrammar::new(
        "ProgramIn",
        vec![
            lit("01"),
            field("program", atom::word()),
            field("data", atom::words(PATCH_WORDS)),
            field("checksum", atom::byte()),
        ],
    )
    .expect("valid ProgramIn grammar")
});

impl SysexMessage for ProgramIn {
    fn grammar() -> &'static MessageGrammar<Self> {
        &PROGRAM_IN
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 3)?;
        Ok(Self {
            program: f.word("program")?,
            data: f.words("data")?,
            checksum: f.byte("checksum")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Word(self.program),
            Value::Words(self.data.clone()),
            Value::Byte(self.checksum),
        ]
    }
}

/// Full program dump sent to the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramOut {
    pub program: u16,
    pub data: Vec<u16>,
}

static PROGRAM_OUT: Lazy<MessageGrammar<ProgramOut>> = Lazy::new(|| {
    MessageGrammar::new(
        "ProgramOut",
        vec![
            lit("01"),
            field("program", atom::word()),
            field("data", atom::words(PATCH_WORDS)),
        ],
    )
    .expect("valid ProgramOut grammar")
});

impl SysexMessage for ProgramOut {
    fn grammar() -> &'static MessageGrammar<Self> {
        &PROGRAM_OUT
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 2)?;
        Ok(Self {
            program: f.word("program")?,
            data: f.words("data")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Word(self.program), Value::Words(self.data.clone())]
    }
}

/// Single-field update of the program being edited
///
/// `offset` is the absolute word offset into the program buffer and
/// `length` the number of words that follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramParam {
    pub offset: u16,
    pub length: u8,
    pub values: Vec<u16>,
}

static PROGRAM_PARAM: Lazy<MessageGrammar<ProgramParam>> = Lazy::new(|| {
    MessageGrammar::new(
        "ProgramParam",
        vec![
            lit("02"),
            field("offset", atom::word()),
            field("length", atom::byte()),
            field("values", atom::word_list()),
        ],
    )
    .expect("valid ProgramParam grammar")
});

impl SysexMessage for ProgramParam {
    fn grammar() -> &'static MessageGrammar<Self> {
        &PROGRAM_PARAM
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 3)?;
        let offset = f.word("offset")?;
        let length = f.byte("length")?;
        let values = f.words("values")?;
        if values.len() != length as usize {
            return Err(FieldError::Range {
                field: "values",
                detail: format!("{} words for declared length {}", values.len(), length),
            });
        }
        Ok(Self {
            offset,
            length,
            values,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Word(self.offset),
            Value::Byte(self.length),
            Value::Words(self.values.clone()),
        ]
    }
}

/// Group (patch set) dump received from the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDumpIn {
    pub group: u16,
    pub name: String,
    pub presets: Vec<u16>,
    pub active: Option<bool>,
    /// Carried verbatim; not verified
    pub checksum: u8,
}

static GROUP_DUMP_IN: Lazy<MessageGrammar<GroupDumpIn>> = Lazy::new(|| {
    MessageGrammar::new(
        "GroupDumpIn",
        vec![
            lit("03"),
            field("group", atom::word()),
            field("name", atom::unicode(GROUP_NAME_LEN)),
            field("presets", atom::preset_indices()),
            field("active", atom::flag(GROUP_ACTIVE_HEX, GROUP_INACTIVE_HEX)),
            field("checksum", atom::byte()),
        ],
    )
    .expect("valid GroupDumpIn grammar")
});

impl SysexMessage for GroupDumpIn {
    fn grammar() -> &'static MessageGrammar<Self> {
        &GROUP_DUMP_IN
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 5)?;
        Ok(Self {
            group: f.word("group")?,
            name: f.text("name")?,
            presets: f.presets("presets")?,
            active: f.flag("active")?,
            checksum: f.byte("checksum")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Word(self.group),
            Value::Text(self.name.clone()),
            Value::Presets(self.presets.clone()),
            Value::Flag(self.active),
            Value::Byte(self.checksum),
        ]
    }
}

/// Group (patch set) sent to the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDumpOut {
    pub group: u16,
    pub name: String,
    pub presets: Vec<u16>,
    pub active: Option<bool>,
}

static GROUP_DUMP_OUT: Lazy<MessageGrammar<GroupDumpOut>> = Lazy::new(|| {
    MessageGrammar::new(
        "GroupDumpOut",
        vec![
            lit("03"),
            field("group", atom::word()),
            field("name", atom::unicode(GROUP_NAME_LEN)),
            field("presets", atom::preset_indices()),
            field("active", atom::flag(GROUP_ACTIVE_HEX, GROUP_INACTIVE_HEX)),
        ],
    )
    .expect("valid GroupDumpOut grammar")
});

impl SysexMessage for GroupDumpOut {
    fn grammar() -> &'static MessageGrammar<Self> {
        &GROUP_DUMP_OUT
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 4)?;
        Ok(Self {
            group: f.word("group")?,
            name: f.text("name")?,
            presets: f.presets("presets")?,
            active: f.flag("active")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Word(self.group),
            Value::Text(self.name.clone()),
            Value::Presets(self.presets.clone()),
            Value::Flag(self.active),
        ]
    }
}

/// Switch the keyboard to a stored program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecallProgram {
    pub program: u16,
}

static RECALL_PROGRAM: Lazy<MessageGrammar<RecallProgram>> = Lazy::new(|| {
    MessageGrammar::new(
        "RecallProgram",
        vec![lit("06"), field("program", atom::word())],
    )
    .expect("valid RecallProgram grammar")
});

impl SysexMessage for RecallProgram {
    fn grammar() -> &'static MessageGrammar<Self> {
        &RECALL_PROGRAM
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 1)?;
        Ok(Self {
            program: f.word("program")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Word(self.program)]
    }
}

/// Persist the program being edited into a slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreProgram {
    pub program: u16,
}

static STORE_PROGRAM: Lazy<MessageGrammar<StoreProgram>> = Lazy::new(|| {
    MessageGrammar::new("StoreProgram", vec![lit("09"), field("program", atom::word())])
        .expect("valid StoreProgram grammar")
});

impl SysexMessage for StoreProgram {
    fn grammar() -> &'static MessageGrammar<Self> {
        &STORE_PROGRAM
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 1)?;
        Ok(Self {
            program: f.word("program")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Word(self.program)]
    }
}

/// Velocity curve as dumped by the device (carries a trailer byte)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetVelocityCurve {
    pub curve: u8,
    pub bank: Symbol,
    pub name: String,
    /// `None` marks an unused point
    pub points: Vec<Option<u16>>,
    pub velocities: Vec<u8>,
    pub trailer: u8,
}

/// Velocity curve sent to the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetVelocityCurve {
    pub curve: u8,
    pub bank: Symbol,
    pub name: String,
    pub points: Vec<Option<u16>>,
    pub velocities: Vec<u8>,
}

fn velocity_curve_tokens(opcode: &'static str) -> Vec<Token> {
    vec![
        lit(opcode),
        field("curve", atom::byte()),
        field("bank", atom::choice(&VELOCITY_CURVE_BANKS, 1)),
        field("name", atom::ascii(CURVE_NAME_LEN)),
        field("points", atom::levels(CURVE_POINTS)),
        field("velocities", atom::bytes(VELOCITY_STEPS)),
    ]
}

static GET_VELOCITY_CURVE: Lazy<MessageGrammar<GetVelocityCurve>> = Lazy::new(|| {
    let mut tokens = velocity_curve_tokens("0700");
    tokens.push(field("trailer", atom::byte()));
    MessageGrammar::new("GetVelocityCurve", tokens).expect("valid GetVelocityCurve grammar")
});

static SET_VELOCITY_CURVE: Lazy<MessageGrammar<SetVelocityCurve>> = Lazy::new(|| {
    MessageGrammar::new("SetVelocityCurve", velocity_curve_tokens("0701"))
        .expect("valid SetVelocityCurve grammar")
});

impl SysexMessage for GetVelocityCurve {
    fn grammar() -> &'static MessageGrammar<Self> {
        &GET_VELOCITY_CURVE
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 6)?;
        Ok(Self {
            curve: f.byte("curve")?,
            bank: f.symbol("bank")?,
            name: f.text("name")?,
            points: f.levels("points")?,
            velocities: f.bytes("velocities")?,
            trailer: f.byte("trailer")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Byte(self.curve),
            Value::Symbol(self.bank),
            Value::Text(self.name.clone()),
            Value::Levels(self.points.clone()),
            Value::Bytes(self.velocities.clone()),
            Value::Byte(self.trailer),
        ]
    }
}

impl SysexMessage for SetVelocityCurve {
    fn grammar() -> &'static MessageGrammar<Self> {
        &SET_VELOCITY_CURVE
    }

    fn from_values(values: Vec<Value>) -> Result<Self, FieldError> {
        let mut f = Fields::new(values, 5)?;
        Ok(Self {
            curve: f.byte("curve")?,
            bank: f.symbol("bank")?,
            name: f.text("name")?,
            points: f.levels("points")?,
            velocities: f.bytes("velocities")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Byte(self.curve),
            Value::Symbol(self.bank),
            Value::Text(self.name.clone()),
            Value::Levels(self.points.clone()),
            Value::Bytes(self.velocities.clone()),
        ]
    }
}

impl From<GetVelocityCurve> for SetVelocityCurve {
    fn from(curve: GetVelocityCurve) -> Self {
        Self {
            curve: curve.curve,
            bank: curve.bank,
            name: curve.name,
            points: curve.points,
            velocities: curve.velocities,
        }
    }
}

/// One catalog slot
struct CatalogEntry {
    name: &'static str,
    decode: fn(&str) -> Option<Message>,
    sample: fn() -> Option<String>,
}

fn decode_as<T: SysexMessage + Into<Message>>(hex: &str) -> Option<Message> {
    T::decode(hex).map(Into::into)
}

fn sample_of<T: SysexMessage + Default>() -> Option<String> {
    T::default().encode().ok()
}

impl CatalogEntry {
    fn of<T: SysexMessage + Default + Into<Message>>() -> Self {
        Self {
            name: T::grammar().name(),
            decode: decode_as::<T>,
            sample: sample_of::<T>,
        }
    }
}

macro_rules! catalog {
    ($($name:ident),* $(,)?) => {
        /// Any message the catalog can decode
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $($name($name)),*
        }

        $(
            impl From<$name> for Message {
                fn from(message: $name) -> Self {
                    Message::$name(message)
                }
            }
        )*

        impl Message {
            /// Grammar name of the wrapped record
            pub fn name(&self) -> &'static str {
                match self {
                    $(Message::$name(_) => stringify!($name)),*
                }
            }

            /// Payload hex of the wrapped record
            pub fn encode(&self) -> Result<String, GrammarError> {
                match self {
                    $(Message::$name(message) => message.encode()),*
                }
            }
        }

        static CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog {
            entries: vec![$(CatalogEntry::of::<$name>()),*],
        });
    };
}

catalog!(
    InitiateConnection,
    ConfirmConnection,
    CheckAttached,
    ConfirmAttached,
    RequestProgramNameDump,
    EndOfProgramNameDump,
    BeginDumpIn,
    EndProgramDump,
    EndOfDump,
    ProgramName,
    ProgramIn,
    ProgramOut,
    ProgramParam,
    GroupDumpIn,
    GroupDumpOut,
    RecallProgram,
    StoreProgram,
    GetVelocityCurve,
    SetVelocityCurve,
);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::ProgramIn(dump) => write!(
                f,
                "ProgramIn {{ program: {}, name: {:?} }}",
                dump.program,
                crate::patch::name_of_words(&dump.data)
            ),
            Message::ProgramOut(dump) => write!(
                f,
                "ProgramOut {{ program: {}, name: {:?} }}",
                dump.program,
                crate::patch::name_of_words(&dump.data)
            ),
            Message::ProgramParam(param) => {
                match crate::fields::field_name_at(param.offset as usize) {
                    Some(name) => write!(f, "ProgramParam {{ {}: {:?} }}", name, param.values),
                    None => write!(
                        f,
                        "ProgramParam {{ offset {:#04x}: {:?} }}",
                        param.offset, param.values
                    ),
                }
            }
            Message::GetVelocityCurve(curve) => write!(
                f,
                "GetVelocityCurve {{ curve: {}, bank: {}, name: {:?} }}",
                curve.curve, curve.bank, curve.name
            ),
            Message::SetVelocityCurve(curve) => write!(
                f,
                "SetVelocityCurve {{ curve: {}, bank: {}, name: {:?} }}",
                curve.curve, curve.bank, curve.name
            ),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Ordered, append-once list of every registered grammar
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// The process-wide catalog
    pub fn global() -> &'static Catalog {
        &CATALOG
    }

    /// Decode with the first grammar that matches, in registration order
    pub fn try_decode(&self, hex: &str) -> Option<Message> {
        self.entries.iter().find_map(|entry| (entry.decode)(hex))
    }

    /// Pairs `(a, b)` where grammar `b` also decodes the sample payload of `a`
    pub fn overlaps(&self) -> Vec<(&'static str, &'static str)> {
        let mut found = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let Some(sample) = (entry.sample)() else {
                log::warn!("Catalog: {} has no encodable sample", entry.name);
                continue;
            };
            for (j, other) in self.entries.iter().enumerate() {
                if i != j && (other.decode)(&sample).is_some() {
                    found.push((entry.name, other.name));
                }
            }
        }
        found
    }
}

/// Decode a payload with the global catalog
pub fn try_decode(hex: &str) -> Option<Message> {
    Catalog::global().try_decode(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex;

    #[test]
    fn test_recall_program_encoding() {
        assert_eq!(RecallProgram { program: 5 }.encode().unwrap(), "060500");
        assert_eq!(
            try_decode("060500"),
            Some(Message::RecallProgram(RecallProgram { program: 5 }))
        );
    }

    fn decoded_name(hex: &str) -> Option<&'static str> {
        try_decode(hex).map(|m| m.name())
    }

    #[test]
    fn test_opcode_messages() {
        assert_eq!(decoded_name("000500"), Some("InitiateConnection"));
        assert_eq!(decoded_name("0500"), Some("ConfirmConnection"));
        assert_eq!(decoded_name("007f"), Some("CheckAttached"));
        assert_eq!(decoded_name("7f"), Some("ConfirmAttached"));
        assert_eq!(decoded_name("10"), Some("EndOfProgramNameDump"));
        assert_eq!(decoded_name("0010"), Some("RequestProgramNameDump"));
        assert_eq!(decoded_name("0011"), Some("BeginDumpIn"));
        assert_eq!(decoded_name("11"), Some("EndProgramDump"));
        assert_eq!(decoded_name("000a"), Some("EndOfDump"));
        assert_eq!(InitiateConnection.encode().unwrap(), "000500");
    }

    #[test]
    fn test_unrecognized_payload() {
        assert_eq!(try_decode("0e1234"), None);
        assert_eq!(try_decode(""), None);
    }

    #[test]
    fn test_program_name() {
        let message = ProgramName {
            program: 3,
            name: "INIT PROGRAM".into(),
        };
        let hex = message.encode().unwrap();
        assert_eq!(hex.len(), 2 + 4 + PROGRAM_NAME_LEN * 2);
        assert!(hex.ends_with("000000"));
        assert_eq!(try_decode(&hex), Some(Message::ProgramName(message)));
    }

    #[test]
    fn test_program_dumps_split_on_checksum() {
        let data: Vec<u16> = (0..PATCH_WORDS as u16).collect();
        let out = ProgramOut { program: 7, data: data.clone() };
        let out_hex = out.encode().unwrap();
        assert_eq!(try_decode(&out_hex), Some(Message::ProgramOut(out)));

        let dump = ProgramIn { program: 7, data, checksum: 0x2a };
        let in_hex = dump.encode().unwrap();
        assert_eq!(in_hex.len(), out_hex.len() + 2);
        assert_eq!(try_decode(&in_hex), Some(Message::ProgramIn(dump)));
    }

    #[test]
    fn test_program_param() {
        let param = ProgramParam { offset: 0xa6, length: 1, values: vec![6] };
        let hex = param.encode().unwrap();
        assert_eq!(hex, "022601010600");
        assert_eq!(try_decode(&hex), Some(Message::ProgramParam(param)));
    }

    #[test]
    fn test_program_param_length_mismatch_is_no_match() {
        // Declares two words but carries one
        assert_eq!(ProgramParam::decode("022601020600"), None);
        assert_eq!(try_decode("022601020600"), None);
    }

    #[test]
    fn test_group_dump_round_trip() {
        let out = GroupDumpOut {
            group: 2,
            name: "Live set".into(),
            presets: vec![1, 5, 9],
            active: Some(true),
        };
        let hex = out.encode().unwrap();
        assert_eq!(try_decode(&hex), Some(Message::GroupDumpOut(out)));

        let with_checksum = format!("{}11", hex);
        match try_decode(&with_checksum) {
            Some(Message::GroupDumpIn(dump)) => {
                assert_eq!(dump.presets, vec![1, 5, 9]);
                assert_eq!(dump.checksum, 0x11);
                assert_eq!(dump.active, Some(true));
            }
            other => panic!("Expected GroupDumpIn, got {:?}", other),
        }
    }

    #[test]
    fn test_group_unknown_active_literal() {
        let out = GroupDumpOut::default();
        let hex = out.encode().unwrap();
        let tampered = format!("{}0100", &hex[..hex.len() - 4]);
        match try_decode(&tampered) {
            Some(Message::GroupDumpOut(dump)) => assert_eq!(dump.active, None),
            other => panic!("Expected GroupDumpOut, got {:?}", other),
        }
    }

    #[test]
    fn test_velocity_curves() {
        let set = SetVelocityCurve {
            curve: 2,
            bank: Symbol::Named("User"),
            name: "Soft".into(),
            points: vec![Some(0), Some(0), Some(64), Some(40), None, None],
            velocities: (1..=VELOCITY_STEPS as u8).collect(),
        };
        let hex = set.encode().unwrap();
        assert!(hex.starts_with("07010255"));
        assert!(hex.contains("7f017f01"));
        assert_eq!(try_decode(&hex), Some(Message::SetVelocityCurve(set.clone())));

        let dump_hex = format!("0700{}00", &hex[4..]);
        match try_decode(&dump_hex) {
            Some(Message::GetVelocityCurve(dump)) => {
                assert_eq!(SetVelocityCurve::from(dump), set);
            }
            other => panic!("Expected GetVelocityCurve, got {:?}", other),
        }
    }

    #[test]
    fn test_velocity_past_seven_bits_is_rejected() {
        let set = SetVelocityCurve {
            velocities: vec![200; VELOCITY_STEPS],
            ..Default::default()
        };
        match set.encode() {
            Err(GrammarError::Encode { field, .. }) => assert_eq!(field, "velocities"),
            other => panic!("Expected an encode error, got {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_curve_bank_is_raw() {
        let set = SetVelocityCurve {
            bank: Symbol::Raw(0x12),
            ..Default::default()
        };
        let hex = set.encode().unwrap();
        assert_eq!(SetVelocityCurve::decode(&hex).unwrap().bank, Symbol::Raw(0x12));
    }

    #[test]
    fn test_catalog_has_no_overlaps() {
        assert_eq!(Catalog::global().overlaps(), Vec::<(&str, &str)>::new());
    }

    #[test]
    fn test_every_grammar_round_trips_its_sample() {
        let catalog = Catalog::global();
        for entry in &catalog.entries {
            let sample = (entry.sample)().expect("sample encodes");
            let decoded = catalog.try_decode(&sample).expect("sample decodes");
            assert_eq!(decoded.name(), entry.name);
            assert_eq!(decoded.encode().unwrap(), sample);
        }
    }

    #[test]
    fn test_decode_is_deterministic() {
        let hex = ProgramName { program: 1, name: "A".into() }.encode().unwrap();
        assert_eq!(try_decode(&hex), try_decode(&hex));
    }

    #[test]
    fn test_uppercase_hex_matches() {
        let hex = hex::words_to_hex(&[0x7f]).to_uppercase();
        assert_eq!(
            try_decode(&format!("06{}", hex)),
            Some(Message::RecallProgram(RecallProgram { program: 0x7f }))
        );
    }
}
