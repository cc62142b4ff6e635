//! Declarative message grammars
//!
//! A grammar is an ordered list of literal opcode tokens and atom-bound
//! fields. From that one definition [`MessageGrammar`] derives:
//! - an anchored matcher over the SysEx payload (preamble already stripped),
//! - a decoder that builds the typed record from the captures in order,
//! - an encoder that emits literals verbatim and atom-encodes each field.
//!
//! Records plug in through [`SysexMessage`], which maps them to and from the
//! positional [`Value`] list.

use crate::atom::{Atom, Value};
use regex::Regex;
use std::collections::HashSet;
use std::marker::PhantomData;

/// Error building a record from decoded values
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("expected {expected} values, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("field '{field}' expected a {expected} value, got {actual}")]
    Kind {
        field: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("field '{field}' value out of range: {detail}")]
    Range { field: &'static str, detail: String },
}

/// Error encoding a record with its grammar
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("{grammar}: record produced {actual} values for {expected} fields")]
    Arity {
        grammar: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{grammar}: field '{field}' cannot encode a {kind} value")]
    Encode {
        grammar: &'static str,
        field: &'static str,
        kind: &'static str,
    },

    #[error("{grammar}: duplicate field '{field}'")]
    DuplicateField {
        grammar: &'static str,
        field: &'static str,
    },

    #[error("invalid matcher pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One grammar token
#[derive(Debug, Clone)]
pub enum Token {
    /// Fixed protocol hex, matched and emitted verbatim
    Literal(&'static str),
    /// A named field encoded by an atom
    Field(&'static str, Atom),
}

/// Shorthand for a literal token
pub fn lit(hex: &'static str) -> Token {
    Token::Literal(hex)
}

/// Shorthand for a field token
pub fn field(name: &'static str, atom: Atom) -> Token {
    Token::Field(name, atom)
}

/// A record type with a registered grammar
pub trait SysexMessage: Sized + Send + 'static {
    /// The grammar describing this record on the wire
    fn grammar() -> &'static MessageGrammar<Self>;

    /// Build the record from field values in declared order
    fn from_values(values: Vec<Value>) -> Result<Self, FieldError>;

    /// Field values in declared order
    fn to_values(&self) -> Vec<Value>;

    /// Decode a payload if it is an instance of this message
    fn decode(hex: &str) -> Option<Self> {
        Self::grammar().decode(hex)
    }

    /// Canonical payload hex for this record
    fn encode(&self) -> Result<String, GrammarError> {
        Self::grammar().encode(self)
    }
}

/// Matcher, decoder and encoder derived from one token list
#[derive(Debug)]
pub struct MessageGrammar<T> {
    name: &'static str,
    tokens: Vec<Token>,
    matcher: Regex,
    _record: PhantomData<fn() -> T>,
}

impl<T: SysexMessage> MessageGrammar<T> {
    /// Build a grammar from its tokens
    ///
    /// Field names must be unique within the grammar.
    pub fn new(name: &'static str, tokens: Vec<Token>) -> Result<Self, GrammarError> {
        let mut seen = HashSet::new();
        let mut pattern = String::from("^");
        for token in &tokens {
            match token {
                Token::Literal(hex) => pattern.push_str(&regex::escape(hex)),
                Token::Field(field, atom) => {
                    if !seen.insert(*field) {
                        return Err(GrammarError::DuplicateField {
                            grammar: name,
                            field: *field,
                        });
                    }
                    pattern.push('(');
                    pattern.push_str(atom.pattern());
                    pattern.push(')');
                }
            }
        }
        pattern.push('$');

        Ok(Self {
            name,
            tokens,
            matcher: Regex::new(&pattern)?,
            _record: PhantomData,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Field names in declared order
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tokens.iter().filter_map(|t| match t {
            Token::Field(name, _) => Some(*name),
            Token::Literal(_) => None,
        })
    }

    /// Whether `hex` is structurally an instance of this message
    pub fn matches(&self, hex: &str) -> bool {
        self.matcher.is_match(hex)
    }

    /// Decode `hex`, or `None` when it does not match
    ///
    /// A payload that matches but fails record construction is logged and
    /// treated as no match, so a catalog scan never aborts on it.
    pub fn decode(&self, hex: &str) -> Option<T> {
        let captures = self.matcher.captures(hex)?;
        let groups: Vec<&str> = captures
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str()).unwrap_or(""))
            .collect();

        let values: Vec<Value> = self
            .tokens
            .iter()
            .filter_map(|t| match t {
                Token::Field(_, atom) => Some(atom),
                Token::Literal(_) => None,
            })
            .zip(&groups)
            .map(|(atom, group)| atom.decode(group))
            .collect();

        match T::from_values(values) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!(
                    "{}: failed to construct record from {} (groups {:?}): {}",
                    self.name,
                    hex,
                    groups,
                    e
                );
                None
            }
        }
    }

    /// Encode a record: literals verbatim, fields through their atoms
    pub fn encode(&self, record: &T) -> Result<String, GrammarError> {
        let values = record.to_values();
        let field_count = self.field_names().count();
        if values.len() != field_count {
            return Err(GrammarError::Arity {
                grammar: self.name,
                expected: field_count,
                actual: values.len(),
            });
        }

        let mut values = values.iter();
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(hex) => out.push_str(hex),
                Token::Field(field, atom) => {
                    // Arity was checked above
                    let Some(value) = values.next() else { break };
                    let encoded = atom.encode(value).ok_or(GrammarError::Encode {
                        grammar: self.name,
                        field: *field,
                        kind: value.kind(),
                    })?;
                    out.push_str(&encoded);
                }
            }
        }
        Ok(out)
    }
}

/// Positional reader used by `from_values` implementations
pub struct Fields {
    values: std::vec::IntoIter<Value>,
}

impl Fields {
    /// Check arity and start reading
    pub fn new(values: Vec<Value>, expected: usize) -> Result<Self, FieldError> {
        if values.len() != expected {
            return Err(FieldError::Arity {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            values: values.into_iter(),
        })
    }

    fn next(&mut self, field: &'static str, expected: &'static str) -> Result<Value, FieldError> {
        self.values.next().ok_or(FieldError::Kind {
            field,
            expected,
            actual: "nothing",
        })
    }

    pub fn byte(&mut self, field: &'static str) -> Result<u8, FieldError> {
        match self.next(field, "byte")? {
            Value::Byte(b) => Ok(b),
            other => Err(mismatch(field, "byte", &other)),
        }
    }

    pub fn word(&mut self, field: &'static str) -> Result<u16, FieldError> {
        match self.next(field, "word")? {
            Value::Word(w) => Ok(w),
            other => Err(mismatch(field, "word", &other)),
        }
    }

    pub fn text(&mut self, field: &'static str) -> Result<String, FieldError> {
        match self.next(field, "text")? {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(field, "text", &other)),
        }
    }

    pub fn bytes(&mut self, field: &'static str) -> Result<Vec<u8>, FieldError> {
        match self.next(field, "bytes")? {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch(field, "bytes", &other)),
        }
    }

    pub fn words(&mut self, field: &'static str) -> Result<Vec<u16>, FieldError> {
        match self.next(field, "words")? {
            Value::Words(w) => Ok(w),
            other => Err(mismatch(field, "words", &other)),
        }
    }

    pub fn levels(&mut self, field: &'static str) -> Result<Vec<Option<u16>>, FieldError> {
        match self.next(field, "levels")? {
            Value::Levels(l) => Ok(l),
            other => Err(mismatch(field, "levels", &other)),
        }
    }

    pub fn symbol(&mut self, field: &'static str) -> Result<crate::atom::Symbol, FieldError> {
        match self.next(field, "symbol")? {
            Value::Symbol(s) => Ok(s),
            other => Err(mismatch(field, "symbol", &other)),
        }
    }

    pub fn flag(&mut self, field: &'static str) -> Result<Option<bool>, FieldError> {
        match self.next(field, "flag")? {
            Value::Flag(f) => Ok(f),
            other => Err(mismatch(field, "flag", &other)),
        }
    }

    pub fn presets(&mut self, field: &'static str) -> Result<Vec<u16>, FieldError> {
        match self.next(field, "presets")? {
            Value::Presets(p) => Ok(p),
            other => Err(mismatch(field, "presets", &other)),
        }
    }
}

fn mismatch(field: &'static str, expected: &'static str, actual: &Value) -> FieldError {
    FieldError::Kind {
        field,
        expected,
        actual: actual.kind(),
    }
}
