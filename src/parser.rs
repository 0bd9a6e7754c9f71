use std::iter::Peekable;
use std::str::Chars;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1, hex_digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};
use phf::phf_map;
use crate::heap::Heap;
use crate::specials::Keywords;
use crate::{expect, LispError, LispValue, Result};

static CHAR_NAMES: phf::Map<&'static str, char> = phf_map! {
    "newline" => '\n',
    "cr" => '\r',
    "tab" => '\t',
    "space" => ' ',
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Number {
    Integer(i64),
    Float(f64),
}

fn sign(input: &str) -> IResult<&str, Option<char>> {
    opt(one_of("+-"))(input)
}
fn integer(input: &str) -> IResult<&str, &str> {
    recognize(pair(sign, digit1))(input)
}
fn decimal(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        sign,
        alt((
            recognize(tuple((digit1, char('.'), digit0))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(input)
}
fn hexadecimal(input: &str) -> IResult<&str, (Option<char>, &str)> {
    preceded(tag("#x"), pair(sign, hex_digit1))(input)
}

/// Classifies a token as a number. Integers are tried before decimals, and
/// an integer too wide for 64 bits becomes a float.
pub(crate) fn parse_number(token: &str) -> Option<Number> {
    if let Ok((_, digits)) = all_consuming(integer)(token) {
        return match digits.parse::<i64>() {
            Ok(i) => Some(Number::Integer(i)),
            Err(_) => digits.parse::<f64>().ok().map(Number::Float),
        };
    }
    if let Ok((_, digits)) = all_consuming(decimal)(token) {
        return digits.parse::<f64>().ok().map(Number::Float);
    }
    if let Ok((_, (sign, digits))) = all_consuming(hexadecimal)(token) {
        let magnitude = i64::from_str_radix(digits, 16).ok()?;
        return Some(Number::Integer(if sign == Some('-') { -magnitude } else { magnitude }));
    }
    None
}

enum Item {
    Datum(LispValue),
    /// a `)`; never escapes the reader
    Close,
}

/// Reader over one source text. It holds no heap handles between calls, so
/// collections may run freely between reads.
#[derive(Clone, Debug)]
pub struct LispParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> LispParser<'a> {
    pub fn new(source: &'a str) -> Self {
        LispParser { chars: source.chars().peekable() }
    }

    /// Reads exactly one form. At the end of input this returns
    /// [`LispValue::EOF`], or fails with `UnexpectedEof` when `fail_on_end`
    /// is set.
    pub(crate) fn read(&mut self, heap: &mut Heap, keywords: &Keywords, fail_on_end: bool) -> Result<LispValue> {
        match self.read_item(heap, keywords, fail_on_end)? {
            Item::Datum(value) => Ok(value),
            Item::Close => Err(LispError::UnexpectedDelimiter(')')),
        }
    }

    fn skip_atmosphere(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == ';' {
                while !matches!(self.chars.next(), Some('\n') | None) {}
            } else if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn read_item(&mut self, heap: &mut Heap, keywords: &Keywords, fail_on_end: bool) -> Result<Item> {
        self.skip_atmosphere();
        let Some(&c) = self.chars.peek() else {
            expect!(!fail_on_end, LispError::UnexpectedEof);
            return Ok(Item::Datum(LispValue::EOF));
        };
        let value = match c {
            '\'' | '`' | ',' => {
                self.chars.next();
                let prefix = match c {
                    '\'' => keywords.quote,
                    '`' => keywords.quasiquote,
                    _ => keywords.unquote,
                };
                let datum = self.read(heap, keywords, true)?;
                let tail = heap.cons(datum, LispValue::NULL)?;
                heap.cons(prefix, tail)?
            },
            '(' => {
                self.chars.next();
                self.read_list(heap, keywords)?
            },
            ')' => {
                self.chars.next();
                return Ok(Item::Close);
            },
            '"' => {
                self.chars.next();
                self.read_string(heap)?
            },
            '#' => {
                self.chars.next();
                match self.chars.peek() {
                    Some('(') => {
                        self.chars.next();
                        self.read_vector(heap, keywords)?
                    },
                    Some('\\') => {
                        self.chars.next();
                        self.read_char(heap)?
                    },
                    Some(_) => self.read_atom(heap, String::from("#"))?,
                    None => return Err(LispError::UnexpectedEof),
                }
            },
            _ => self.read_atom(heap, String::new())?,
        };
        Ok(Item::Datum(value))
    }

    fn read_list(&mut self, heap: &mut Heap, keywords: &Keywords) -> Result<LispValue> {
        let base = heap.root_mark();
        loop {
            match self.read_item(heap, keywords, true)? {
                Item::Close => return heap.list_from_roots(base, LispValue::NULL),
                Item::Datum(dot) if dot == keywords.dot => {
                    expect!(heap.root_mark() > base, LispError::InvalidDottedList);
                    let tail = self.read(heap, keywords, true)?;
                    let tail_slot = heap.push_root(tail);
                    expect!(
                        matches!(self.read_item(heap, keywords, true)?, Item::Close),
                        LispError::InvalidDottedList
                    );
                    let tail = heap.root(tail_slot);
                    heap.release_roots(tail_slot);
                    return heap.list_from_roots(base, tail);
                },
                Item::Datum(value) => {
                    heap.push_root(value);
                },
            }
        }
    }

    fn read_vector(&mut self, heap: &mut Heap, keywords: &Keywords) -> Result<LispValue> {
        let base = heap.root_mark();
        loop {
            match self.read_item(heap, keywords, true)? {
                Item::Close => return heap.vector_from_roots(base),
                Item::Datum(dot) if dot == keywords.dot => return Err(LispError::DotInVector),
                Item::Datum(value) => {
                    heap.push_root(value);
                },
            }
        }
    }

    fn read_string(&mut self, heap: &mut Heap) -> Result<LispValue> {
        let mut text = String::new();
        loop {
            match self.chars.next().ok_or(LispError::UnexpectedEof)? {
                '"' => break,
                '\\' => text.push(match self.chars.next().ok_or(LispError::UnexpectedEof)? {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    c => c,
                }),
                c => text.push(c),
            }
        }
        heap.string(&text)
    }

    fn read_char(&mut self, heap: &mut Heap) -> Result<LispValue> {
        let first = self.chars.next().ok_or(LispError::UnexpectedEof)?;
        if !first.is_alphabetic() {
            return heap.character(first);
        }
        let mut name = String::from(first);
        self.take_token(&mut name);
        let c = if name.chars().count() == 1 {
            first
        } else {
            *CHAR_NAMES.get(name.as_str()).ok_or(LispError::InvalidCharName(name))?
        };
        heap.character(c)
    }

    fn take_token(&mut self, token: &mut String) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == ')' {
                break;
            }
            token.push(c);
            self.chars.next();
        }
    }

    fn read_atom(&mut self, heap: &mut Heap, mut token: String) -> Result<LispValue> {
        self.take_token(&mut token);
        match token.as_str() {
            "#t" => return Ok(LispValue::TRUE),
            "#f" => return Ok(LispValue::FALSE),
            _ => {},
        }
        match parse_number(&token) {
            Some(Number::Integer(i)) => heap.integer(i),
            Some(Number::Float(x)) => heap.float(x),
            None => heap.intern(&token),
        }
    }
}
