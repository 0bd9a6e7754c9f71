use std::collections::HashSet;
use std::fmt;
use crate::heap::{Heap, Position};
use crate::value::{Object, Procedure};
use crate::LispValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// strings and characters appear as their raw text
    Display,
    /// strings and characters appear as the literals that read back
    Write,
}

/// External representation of a heap value.
///
/// A pair or vector already being printed further up shows as `...`, so
/// cyclic structures terminate.
pub struct Printer<'h> {
    heap: &'h Heap,
    value: LispValue,
    mode: Mode,
}

impl<'h> Printer<'h> {
    pub fn display(heap: &'h Heap, value: LispValue) -> Self {
        Printer { heap, value, mode: Mode::Display }
    }
    pub fn write(heap: &'h Heap, value: LispValue) -> Self {
        Printer { heap, value, mode: Mode::Write }
    }

    fn print(&self, f: &mut fmt::Formatter<'_>, value: LispValue, path: &mut HashSet<Position>) -> fmt::Result {
        match self.heap.object(value) {
            Object::Integer(i) => write!(f, "{}", i),
            Object::Float(x) => write_float(f, x),
            Object::Symbol => f.write_str(&self.name(value)),
            Object::String { .. } => {
                let text = self.heap.string_value(value).unwrap_or_default();
                match self.mode {
                    Mode::Display => f.write_str(&text),
                    Mode::Write => write_escaped(f, &text),
                }
            },
            Object::Boolean(true) => f.write_str("#t"),
            Object::Boolean(false) => f.write_str("#f"),
            Object::Char(c) => match self.mode {
                Mode::Display => write!(f, "{}", c),
                Mode::Write => match c {
                    '\n' => f.write_str("#\\newline"),
                    '\r' => f.write_str("#\\cr"),
                    '\t' => f.write_str("#\\tab"),
                    ' ' => f.write_str("#\\space"),
                    c => write!(f, "#\\{}", c),
                },
            },
            Object::Null => f.write_str("()"),
            Object::Eof => f.write_str("<EOF>"),
            Object::Pair { .. } => self.print_list(f, value, path),
            Object::Vector { len } => {
                if !path.insert(value.0) {
                    return f.write_str("...");
                }
                f.write_str("#(")?;
                for i in 0..len as i64 {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    let element = self.heap.vector_ref(value, i).map_err(|_| fmt::Error)?;
                    self.print(f, element, path)?;
                }
                path.remove(&value.0);
                f.write_str(")")
            },
            Object::Procedure(Procedure::Builtin { name, .. }) => write!(f, "<procedure {}>", self.name(name)),
            Object::Procedure(Procedure::Closure(closure)) => write!(f, "<procedure {}>", self.name(closure.name)),
            Object::Environment { .. } => f.write_str("<environment>"),
            Object::Binding => f.write_str("<binding>"),
            Object::Tagged { value, .. } => {
                f.write_str("<tag ")?;
                self.print(f, value, path)?;
                f.write_str(">")
            },
        }
    }

    fn print_list(&self, f: &mut fmt::Formatter<'_>, list: LispValue, path: &mut HashSet<Position>) -> fmt::Result {
        if path.contains(&list.0) {
            return f.write_str("...");
        }
        let mut spine = vec![];
        let mut cursor = list;
        f.write_str("(")?;
        while let Object::Pair { car, cdr } = self.heap.object(cursor) {
            if !spine.is_empty() {
                f.write_str(" ")?;
            }
            path.insert(cursor.0);
            spine.push(cursor.0);
            self.print(f, car, path)?;
            match self.heap.object(cdr) {
                Object::Null => break,
                Object::Pair { .. } if path.contains(&cdr.0) => {
                    f.write_str(" . ...")?;
                    break;
                },
                Object::Pair { .. } => cursor = cdr,
                _ => {
                    f.write_str(" . ")?;
                    self.print(f, cdr, path)?;
                    break;
                },
            }
        }
        for pos in spine {
            path.remove(&pos);
        }
        f.write_str(")")
    }

    fn name(&self, symbol: LispValue) -> String {
        self.heap.symbol_name(symbol).map(|name| name.into_owned()).unwrap_or_default()
    }
}

impl fmt::Display for Printer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f, self.value, &mut HashSet::new())
    }
}

// always keep a decimal point and never use an exponent, so the text reads
// back as the same float
fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    let text = x.to_string();
    if x.is_finite() && !text.contains('.') {
        write!(f, "{}.0", text)
    } else {
        f.write_str(&text)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}
