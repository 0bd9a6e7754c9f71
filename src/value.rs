use std::borrow::Cow;
use std::collections::HashSet;
use ordered_float::OrderedFloat;
use crate::heap::{layout::*, Heap, Position, Tag, NONE};
use crate::{expect, LispError, Result};

/// Handle to a record in the [`Heap`].
///
/// A handle is only a position: it stays valid until the next allocation,
/// which may run a collection and move the record. Values that must outlive
/// an allocation belong in a root slot (see [`Heap::push_root`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LispValue(pub(crate) Position);

impl LispValue {
    pub const NULL: LispValue = LispValue(0);
    pub const TRUE: LispValue = LispValue(5);
    pub const FALSE: LispValue = LispValue(10);
    pub const EOF: LispValue = LispValue(15);

    pub fn boolean(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }
    /// Only `#f` is false.
    pub fn truthiness(self) -> bool {
        self != Self::FALSE
    }
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
    pub fn position(self) -> Position {
        self.0
    }
}

/// Decoded view of a record, copied out of the heap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Object {
    Integer(i64),
    Float(f64),
    Symbol,
    Pair { car: LispValue, cdr: LispValue },
    String { len: u32 },
    Boolean(bool),
    Char(char),
    Null,
    Eof,
    Vector { len: u32 },
    Procedure(Procedure),
    Environment { outer: Option<LispValue> },
    // a node of a frame's binding tree; evaluation never yields one
    Binding,
    Tagged { marker: LispValue, value: LispValue },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Procedure {
    Builtin { name: LispValue, index: u32 },
    Closure(Closure),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Closure {
    pub name: LispValue,
    /// Proper list of parameter symbols; with `rest` set the last one
    /// collects the surplus arguments.
    pub formals: LispValue,
    pub arity: u32,
    pub rest: bool,
    pub env: LispValue,
    pub body: LispValue,
}

fn optional(pos: Position) -> Option<LispValue> {
    if pos == NONE { None } else { Some(LispValue(pos)) }
}

fn checked_index(len: u32, index: i64) -> Result<u32> {
    expect!(index >= 0 && (index as u64) < len as u64, LispError::IndexOutOfRange(index));
    Ok(index as u32)
}

impl Heap {
    pub fn object(&self, value: LispValue) -> Object {
        let pos = value.0;
        match self.tag(pos) {
            Tag::Integer => Object::Integer(self.read_u64(pos + PAYLOAD) as i64),
            Tag::Float => Object::Float(f64::from_bits(self.read_u64(pos + PAYLOAD))),
            Tag::Symbol => Object::Symbol,
            Tag::Pair => Object::Pair {
                car: LispValue(self.read_u32(pos + CAR)),
                cdr: LispValue(self.read_u32(pos + CDR)),
            },
            Tag::String => Object::String { len: self.read_u32(pos + LENGTH) },
            Tag::True => Object::Boolean(true),
            Tag::False => Object::Boolean(false),
            Tag::Char => Object::Char(
                char::from_u32(self.read_u32(pos + PAYLOAD)).unwrap_or(char::REPLACEMENT_CHARACTER)
            ),
            Tag::Null => Object::Null,
            Tag::Eof => Object::Eof,
            Tag::Vector => Object::Vector { len: self.read_u32(pos + LENGTH) },
            Tag::Builtin => Object::Procedure(Procedure::Builtin {
                name: LispValue(self.read_u32(pos + BUILTIN_NAME)),
                index: self.read_u32(pos + BUILTIN_INDEX),
            }),
            Tag::Closure => Object::Procedure(Procedure::Closure(Closure {
                name: LispValue(self.read_u32(pos + CLOSURE_NAME)),
                formals: LispValue(self.read_u32(pos + CLOSURE_FORMALS)),
                arity: self.read_u32(pos + CLOSURE_ARITY),
                rest: self.read_u8(pos + CLOSURE_REST) != 0,
                env: LispValue(self.read_u32(pos + CLOSURE_ENV)),
                body: LispValue(self.read_u32(pos + CLOSURE_BODY)),
            })),
            Tag::Environment => Object::Environment { outer: optional(self.read_u32(pos + ENV_OUTER)) },
            Tag::Binding => Object::Binding,
            Tag::Tagged => Object::Tagged {
                marker: LispValue(self.read_u32(pos + TAGGED_MARKER)),
                value: LispValue(self.read_u32(pos + TAGGED_VALUE)),
            },
        }
    }

    pub fn type_of(&self, value: LispValue) -> &'static str {
        match self.tag(value.0) {
            Tag::Integer => "integer",
            Tag::Float => "float",
            Tag::Symbol => "symbol",
            Tag::Pair => "pair",
            Tag::String => "string",
            Tag::True | Tag::False => "boolean",
            Tag::Char => "char",
            Tag::Null => "null",
            Tag::Eof => "eof",
            Tag::Vector => "vector",
            Tag::Builtin | Tag::Closure => "procedure",
            Tag::Environment => "environment",
            Tag::Binding => "binding",
            Tag::Tagged => "tag",
        }
    }

    pub fn is_symbol(&self, value: LispValue) -> bool {
        self.tag(value.0) == Tag::Symbol
    }
    pub fn is_pair(&self, value: LispValue) -> bool {
        self.tag(value.0) == Tag::Pair
    }

    fn expect_tag(&self, value: LispValue, tag: Tag, expected: &'static str) -> Result<Position> {
        expect!(self.tag(value.0) == tag, LispError::InvalidDataType(expected, self.type_of(value)));
        Ok(value.0)
    }

    pub fn car(&self, pair: LispValue) -> Result<LispValue> {
        let pos = self.expect_tag(pair, Tag::Pair, "pair")?;
        Ok(LispValue(self.read_u32(pos + CAR)))
    }
    pub fn cdr(&self, pair: LispValue) -> Result<LispValue> {
        let pos = self.expect_tag(pair, Tag::Pair, "pair")?;
        Ok(LispValue(self.read_u32(pos + CDR)))
    }
    pub fn set_car(&mut self, pair: LispValue, value: LispValue) -> Result<()> {
        let pos = self.expect_tag(pair, Tag::Pair, "pair")?;
        self.write_u32(pos + CAR, value.0);
        Ok(())
    }
    pub fn set_cdr(&mut self, pair: LispValue, value: LispValue) -> Result<()> {
        let pos = self.expect_tag(pair, Tag::Pair, "pair")?;
        self.write_u32(pos + CDR, value.0);
        Ok(())
    }

    pub fn expect_integer(&self, value: LispValue) -> Result<i64> {
        let pos = self.expect_tag(value, Tag::Integer, "integer")?;
        Ok(self.read_u64(pos + PAYLOAD) as i64)
    }
    pub fn expect_char(&self, value: LispValue) -> Result<char> {
        match self.object(value) {
            Object::Char(c) => Ok(c),
            _ => Err(LispError::InvalidDataType("char", self.type_of(value))),
        }
    }
    pub fn expect_symbol(&self, value: LispValue) -> Result<LispValue> {
        self.expect_tag(value, Tag::Symbol, "symbol").map(LispValue)
    }

    pub fn symbol_name(&self, symbol: LispValue) -> Result<Cow<'_, str>> {
        let pos = self.expect_tag(symbol, Tag::Symbol, "symbol")?;
        Ok(String::from_utf8_lossy(self.symbol_bytes(pos)))
    }

    pub fn string_len(&self, string: LispValue) -> Result<u32> {
        let pos = self.expect_tag(string, Tag::String, "string")?;
        Ok(self.read_u32(pos + LENGTH))
    }
    pub fn string_ref(&self, string: LispValue, index: i64) -> Result<char> {
        let index = checked_index(self.string_len(string)?, index)?;
        let code = self.read_u32(string.0 + ELEMENTS + 4 * index);
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }
    pub fn string_set(&mut self, string: LispValue, index: i64, c: char) -> Result<()> {
        let index = checked_index(self.string_len(string)?, index)?;
        self.write_u32(string.0 + ELEMENTS + 4 * index, c as u32);
        Ok(())
    }
    pub fn string_value(&self, string: LispValue) -> Result<String> {
        let len = self.string_len(string)?;
        Ok((0..len)
            .map(|i| self.read_u32(string.0 + ELEMENTS + 4 * i))
            .map(|code| char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }

    pub fn vector_len(&self, vector: LispValue) -> Result<u32> {
        let pos = self.expect_tag(vector, Tag::Vector, "vector")?;
        Ok(self.read_u32(pos + LENGTH))
    }
    pub fn vector_ref(&self, vector: LispValue, index: i64) -> Result<LispValue> {
        let index = checked_index(self.vector_len(vector)?, index)?;
        Ok(LispValue(self.read_u32(vector.0 + ELEMENTS + 4 * index)))
    }
    pub fn vector_set(&mut self, vector: LispValue, index: i64, value: LispValue) -> Result<()> {
        let index = checked_index(self.vector_len(vector)?, index)?;
        self.write_u32(vector.0 + ELEMENTS + 4 * index, value.0);
        Ok(())
    }

    pub fn closure_view(&self, value: LispValue) -> Result<Closure> {
        match self.object(value) {
            Object::Procedure(Procedure::Closure(closure)) => Ok(closure),
            _ => Err(LispError::InvalidDataType("closure", self.type_of(value))),
        }
    }

    /// Name a procedure was created under.
    pub fn procedure_name(&self, value: LispValue) -> Result<Cow<'_, str>> {
        match self.object(value) {
            Object::Procedure(Procedure::Builtin { name, .. }) => self.symbol_name(name),
            Object::Procedure(Procedure::Closure(closure)) => self.symbol_name(closure.name),
            _ => Err(LispError::InvalidDataType("procedure", self.type_of(value))),
        }
    }

    /// Length of a proper list. Dotted and cyclic lists are rejected.
    pub fn list_length(&self, list: LispValue) -> Result<usize> {
        let mut slow = list;
        let mut fast = list;
        let mut len = 0;
        loop {
            match self.object(fast) {
                Object::Null => return Ok(len),
                Object::Pair { cdr, .. } => fast = cdr,
                _ => break,
            }
            len += 1;
            match self.object(fast) {
                Object::Null => return Ok(len),
                Object::Pair { cdr, .. } => fast = cdr,
                _ => break,
            }
            len += 1;
            slow = self.cdr(slow)?;
            if slow == fast {
                break;
            }
        }
        Err(LispError::InvalidDataType("proper list", self.type_of(list)))
    }

    /// Copies a value out of the heap into an owned tree.
    pub fn datum(&self, value: LispValue) -> Result<Datum> {
        self.datum_in(value, &mut HashSet::new())
    }

    fn datum_in(&self, value: LispValue, path: &mut HashSet<Position>) -> Result<Datum> {
        let datum = match self.object(value) {
            Object::Integer(i) => Datum::Integer(i),
            Object::Float(x) => Datum::Float(OrderedFloat(x)),
            Object::Symbol => Datum::Symbol(self.symbol_name(value)?.into_owned()),
            Object::String { .. } => Datum::String(self.string_value(value)?),
            Object::Boolean(b) => Datum::Boolean(b),
            Object::Char(c) => Datum::Char(c),
            Object::Null => Datum::Null,
            Object::Eof => Datum::Eof,
            Object::Pair { car, cdr } => {
                expect!(path.insert(value.0), LispError::InvalidDataType("acyclic list", "cyclic list"));
                let pair = Datum::Pair(Box::new(self.datum_in(car, path)?), Box::new(self.datum_in(cdr, path)?));
                path.remove(&value.0);
                pair
            },
            Object::Vector { len } => {
                expect!(path.insert(value.0), LispError::InvalidDataType("acyclic vector", "cyclic vector"));
                let elements = (0..len)
                    .map(|i| self.datum_in(LispValue(self.read_u32(value.0 + ELEMENTS + 4 * i)), path))
                    .collect::<Result<Vec<Datum>>>()?;
                path.remove(&value.0);
                Datum::Vector(elements)
            },
            Object::Procedure(_) => Datum::Procedure(self.procedure_name(value)?.into_owned()),
            Object::Environment { .. } | Object::Binding => Datum::Environment,
            Object::Tagged { marker, value } => Datum::Tagged(
                Box::new(self.datum_in(marker, path)?),
                Box::new(self.datum_in(value, path)?),
            ),
        };
        Ok(datum)
    }
}

/// Owned copy of an acyclic heap value, compared structurally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Datum {
    Integer(i64),
    Float(OrderedFloat<f64>),
    Symbol(String),
    String(String),
    Boolean(bool),
    Char(char),
    Null,
    Eof,
    Pair(Box<Datum>, Box<Datum>),
    Vector(Vec<Datum>),
    Procedure(String),
    Environment,
    Tagged(Box<Datum>, Box<Datum>),
}

impl Datum {
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.to_owned())
    }
    pub fn string(text: &str) -> Self {
        Self::String(text.to_owned())
    }
    pub fn list(items: Vec<Datum>) -> Self {
        Self::dotted(items, Datum::Null)
    }
    pub fn dotted(items: Vec<Datum>, tail: Datum) -> Self {
        items.into_iter().rev().fold(tail, |cdr, car| Datum::Pair(Box::new(car), Box::new(cdr)))
    }
}

impl From<i64> for Datum {
    fn from(item: i64) -> Self {
        Self::Integer(item)
    }
}
impl From<i32> for Datum {
    fn from(item: i32) -> Self {
        Self::Integer(item as i64)
    }
}
impl From<f64> for Datum {
    fn from(item: f64) -> Self {
        Self::Float(OrderedFloat(item))
    }
}
impl From<bool> for Datum {
    fn from(item: bool) -> Self {
        Self::Boolean(item)
    }
}
impl From<char> for Datum {
    fn from(item: char) -> Self {
        Self::Char(item)
    }
}
