use derivative::Derivative;
use crate::eval::Step;
use crate::parser::{parse_number, Number};
use crate::value::Object;
use crate::{Interpreter, LispError, LispValue, Result};

pub type BuiltinFunc = fn(&mut Interpreter, &[LispValue]) -> Result<Step>;

/// A native procedure. Its arguments are copies of rooted handles, so a
/// builtin may allocate at most once, and everything it allocates from must
/// go through that allocation (which protects its own inputs).
#[derive(Derivative, Clone, Copy)]
#[derivative(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    #[derivative(Debug = "ignore")]
    pub func: BuiltinFunc,
}

fn arguments<const N: usize>(args: &[LispValue]) -> Result<[LispValue; N]> {
    <[LispValue; N]>::try_from(args).map_err(|_| LispError::IncorrectArguments(N, args.len()))
}

fn undefined(interp: &Interpreter) -> Result<Step> {
    Ok(Step::Done(interp.keywords.undefined))
}

fn lisp_car(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [pair] = arguments(args)?;
    Ok(interp.heap.car(pair)?.into())
}

fn lisp_cdr(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [pair] = arguments(args)?;
    Ok(interp.heap.cdr(pair)?.into())
}

fn lisp_cons(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [car, cdr] = arguments(args)?;
    Ok(interp.heap.cons(car, cdr)?.into())
}

fn lisp_set_car(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [pair, value] = arguments(args)?;
    interp.heap.set_car(pair, value)?;
    undefined(interp)
}

fn lisp_set_cdr(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [pair, value] = arguments(args)?;
    interp.heap.set_cdr(pair, value)?;
    undefined(interp)
}

fn lisp_eq(_interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [a, b] = arguments(args)?;
    Ok(LispValue::boolean(a == b).into())
}

// the call runs in the caller's loop, exactly like a direct application
fn lisp_apply(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [procedure, list] = arguments(args)?;
    interp.apply_step(procedure, list)
}

impl Number {
    fn as_float(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(x) => x,
        }
    }
}

fn number(interp: &Interpreter, value: LispValue) -> Result<Number> {
    match interp.heap.object(value) {
        Object::Integer(i) => Ok(Number::Integer(i)),
        Object::Float(x) => Ok(Number::Float(x)),
        _ => Err(LispError::InvalidDataType("number", interp.heap.type_of(value))),
    }
}

fn store(interp: &mut Interpreter, number: Number) -> Result<Step> {
    let value = match number {
        Number::Integer(i) => interp.heap.integer(i)?,
        Number::Float(x) => interp.heap.float(x)?,
    };
    Ok(value.into())
}

/// Integer operands stay exact unless `exact` overflows; anything involving
/// a float is computed in floating point.
fn arithmetic(
    interp: &mut Interpreter,
    args: &[LispValue],
    exact: fn(i64, i64) -> Option<i64>,
    inexact: fn(f64, f64) -> f64,
) -> Result<Step> {
    let [a, b] = arguments(args)?;
    let result = match (number(interp, a)?, number(interp, b)?) {
        (Number::Integer(a), Number::Integer(b)) => match exact(a, b) {
            Some(i) => Number::Integer(i),
            None => Number::Float(inexact(a as f64, b as f64)),
        },
        (a, b) => Number::Float(inexact(a.as_float(), b.as_float())),
    };
    store(interp, result)
}

fn lisp_plus(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    arithmetic(interp, args, i64::checked_add, |a, b| a + b)
}

fn lisp_minus(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    arithmetic(interp, args, i64::checked_sub, |a, b| a - b)
}

fn lisp_times(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    arithmetic(interp, args, i64::checked_mul, |a, b| a * b)
}

fn lisp_divide(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [numerator, denominator] = arguments(args)?;
    let numerator = number(interp, numerator)?.as_float();
    let denominator = number(interp, denominator)?.as_float();
    if denominator == 0.0 {
        return Err(LispError::DivisionByZero);
    }
    store(interp, Number::Float(numerator / denominator))
}

fn integer_operands(interp: &Interpreter, args: &[LispValue]) -> Result<(i64, i64)> {
    let [a, b] = arguments(args)?;
    let a = interp.heap.expect_integer(a)?;
    let b = interp.heap.expect_integer(b)?;
    if b == 0 {
        return Err(LispError::DivisionByZero);
    }
    Ok((a, b))
}

fn lisp_quotient(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let (a, b) = integer_operands(interp, args)?;
    let result = match a.checked_div(b) {
        Some(i) => Number::Integer(i),
        None => Number::Float(-(a as f64)),
    };
    store(interp, result)
}

fn lisp_remainder(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let (a, b) = integer_operands(interp, args)?;
    store(interp, Number::Integer(a.checked_rem(b).unwrap_or(0)))
}

fn compare(interp: &Interpreter, args: &[LispValue]) -> Result<std::cmp::Ordering> {
    let [a, b] = arguments(args)?;
    let ordering = match (number(interp, a)?, number(interp, b)?) {
        (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
        (a, b) => a.as_float().partial_cmp(&b.as_float()),
    };
    // NaN is unordered; treat it as unequal to everything
    Ok(ordering.unwrap_or(std::cmp::Ordering::Greater))
}

fn lisp_lt(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    Ok(LispValue::boolean(compare(interp, args)?.is_lt()).into())
}

fn lisp_num_eq(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    Ok(LispValue::boolean(compare(interp, args)?.is_eq()).into())
}

fn lisp_exact_to_inexact(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [n] = arguments(args)?;
    let x = number(interp, n)?.as_float();
    store(interp, Number::Float(x))
}

fn lisp_inexact_to_exact(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [n] = arguments(args)?;
    match number(interp, n)? {
        Number::Integer(_) => Ok(n.into()),
        Number::Float(x) if x.is_finite() && x.abs() < i64::MAX as f64 => {
            store(interp, Number::Integer(x.trunc() as i64))
        },
        Number::Float(_) => Err(LispError::InvalidDataType("finite float", "float")),
    }
}

macro_rules! predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
            let [value] = arguments(args)?;
            Ok(LispValue::boolean(matches!(interp.heap.object(value), $pattern)).into())
        }
    };
}

predicate!(lisp_integerq, Object::Integer(_));
predicate!(lisp_floatq, Object::Float(_));
predicate!(lisp_symbolq, Object::Symbol);
predicate!(lisp_pairq, Object::Pair { .. });
predicate!(lisp_stringq, Object::String { .. });
predicate!(lisp_booleanq, Object::Boolean(_));
predicate!(lisp_charq, Object::Char(_));
predicate!(lisp_nullq, Object::Null);
predicate!(lisp_procedureq, Object::Procedure(_));
predicate!(lisp_vectorq, Object::Vector { .. });
predicate!(lisp_eofq, Object::Eof);
predicate!(lisp_tagq, Object::Tagged { .. });

fn lisp_type(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [value] = arguments(args)?;
    let name = interp.heap.type_of(value);
    Ok(interp.heap.intern(name)?.into())
}

fn lisp_integer_to_char(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [code] = arguments(args)?;
    let code = interp.heap.expect_integer(code)?;
    let c = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or(LispError::InvalidDataType("character code", "integer"))?;
    Ok(interp.heap.character(c)?.into())
}

fn lisp_char_to_integer(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [c] = arguments(args)?;
    let c = interp.heap.expect_char(c)?;
    Ok(interp.heap.integer(c as i64)?.into())
}

fn lisp_string_length(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [string] = arguments(args)?;
    let len = interp.heap.string_len(string)?;
    Ok(interp.heap.integer(len as i64)?.into())
}

fn lisp_string_ref(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [string, index] = arguments(args)?;
    let index = interp.heap.expect_integer(index)?;
    let c = interp.heap.string_ref(string, index)?;
    Ok(interp.heap.character(c)?.into())
}

fn lisp_string_set(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [string, index, c] = arguments(args)?;
    let index = interp.heap.expect_integer(index)?;
    let c = interp.heap.expect_char(c)?;
    interp.heap.string_set(string, index, c)?;
    undefined(interp)
}

fn length(interp: &Interpreter, len: LispValue) -> Result<u32> {
    let len = interp.heap.expect_integer(len)?;
    u32::try_from(len).map_err(|_| LispError::IndexOutOfRange(len))
}

fn lisp_make_string(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [len] = arguments(args)?;
    let len = length(interp, len)?;
    Ok(interp.heap.make_string(len, ' ')?.into())
}

fn lisp_string_to_symbol(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [string] = arguments(args)?;
    let name = interp.heap.string_value(string)?;
    Ok(interp.heap.intern(&name)?.into())
}

fn lisp_symbol_to_string(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [symbol] = arguments(args)?;
    let name = interp.heap.symbol_name(symbol)?.into_owned();
    Ok(interp.heap.string(&name)?.into())
}

fn radix(interp: &Interpreter, base: LispValue) -> Result<u32> {
    match interp.heap.expect_integer(base)? {
        base @ (2 | 8 | 10 | 16) => Ok(base as u32),
        base => Err(LispError::UnsupportedBase(base)),
    }
}

fn lisp_string_to_number(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [string, base] = arguments(args)?;
    let text = interp.heap.string_value(string)?;
    let parsed = match radix(interp, base)? {
        10 => parse_number(&text),
        base => i64::from_str_radix(&text, base).ok().map(Number::Integer),
    };
    match parsed {
        Some(number) => store(interp, number),
        None => Ok(LispValue::FALSE.into()),
    }
}

fn lisp_number_to_string(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [n, base] = arguments(args)?;
    let text = match (number(interp, n)?, radix(interp, base)?) {
        (_, 10) => interp.display(n).to_string(),
        (Number::Integer(i), base) => {
            let sign = if i < 0 { "-" } else { "" };
            let magnitude = i.unsigned_abs();
            match base {
                2 => format!("{}{:b}", sign, magnitude),
                8 => format!("{}{:o}", sign, magnitude),
                _ => format!("{}{:x}", sign, magnitude),
            }
        },
        (Number::Float(_), _) => return Err(LispError::InvalidDataType("integer", "float")),
    };
    Ok(interp.heap.string(&text)?.into())
}

fn lisp_vector_length(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [vector] = arguments(args)?;
    let len = interp.heap.vector_len(vector)?;
    Ok(interp.heap.integer(len as i64)?.into())
}

fn lisp_vector_ref(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [vector, index] = arguments(args)?;
    let index = interp.heap.expect_integer(index)?;
    Ok(interp.heap.vector_ref(vector, index)?.into())
}

fn lisp_vector_set(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [vector, index, value] = arguments(args)?;
    let index = interp.heap.expect_integer(index)?;
    interp.heap.vector_set(vector, index, value)?;
    undefined(interp)
}

fn lisp_make_vector(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [len] = arguments(args)?;
    let len = length(interp, len)?;
    let fill = interp.keywords.undefined;
    Ok(interp.heap.make_vector(len, fill)?.into())
}

fn lisp_tag(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [marker, value] = arguments(args)?;
    Ok(interp.heap.tagged(marker, value)?.into())
}

fn lisp_untag(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [tagged] = arguments(args)?;
    match interp.heap.object(tagged) {
        Object::Tagged { value, .. } => Ok(value.into()),
        _ => Err(LispError::InvalidDataType("tag", interp.heap.type_of(tagged))),
    }
}

fn lisp_tag_marker(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let [tagged] = arguments(args)?;
    match interp.heap.object(tagged) {
        Object::Tagged { marker, .. } => Ok(marker.into()),
        _ => Err(LispError::InvalidDataType("tag", interp.heap.type_of(tagged))),
    }
}

fn lisp_global_environment(interp: &mut Interpreter, _args: &[LispValue]) -> Result<Step> {
    Ok(interp.global().into())
}

macro_rules! builtin {
    ($name:expr, $arity:expr, $f:expr) => {
        Builtin { name: $name, arity: $arity, func: $f }
    };
}

pub(crate) const BUILTINS: &[Builtin] = &[
    builtin!("car", 1, lisp_car),
    builtin!("cdr", 1, lisp_cdr),
    builtin!("cons", 2, lisp_cons),
    builtin!("set-car!", 2, lisp_set_car),
    builtin!("set-cdr!", 2, lisp_set_cdr),
    builtin!("eq?", 2, lisp_eq),
    builtin!("apply", 2, lisp_apply),
    builtin!("+", 2, lisp_plus),
    builtin!("-", 2, lisp_minus),
    builtin!("*", 2, lisp_times),
    builtin!("/", 2, lisp_divide),
    builtin!("quotient", 2, lisp_quotient),
    builtin!("remainder", 2, lisp_remainder),
    builtin!("<", 2, lisp_lt),
    builtin!("=", 2, lisp_num_eq),
    builtin!("exact->inexact", 1, lisp_exact_to_inexact),
    builtin!("inexact->exact", 1, lisp_inexact_to_exact),
    builtin!("integer?", 1, lisp_integerq),
    builtin!("float?", 1, lisp_floatq),
    builtin!("symbol?", 1, lisp_symbolq),
    builtin!("pair?", 1, lisp_pairq),
    builtin!("string?", 1, lisp_stringq),
    builtin!("boolean?", 1, lisp_booleanq),
    builtin!("char?", 1, lisp_charq),
    builtin!("null?", 1, lisp_nullq),
    builtin!("procedure?", 1, lisp_procedureq),
    builtin!("vector?", 1, lisp_vectorq),
    builtin!("eof-object?", 1, lisp_eofq),
    builtin!("tag?", 1, lisp_tagq),
    builtin!("type", 1, lisp_type),
    builtin!("integer->char", 1, lisp_integer_to_char),
    builtin!("char->integer", 1, lisp_char_to_integer),
    builtin!("string-length", 1, lisp_string_length),
    builtin!("string-ref", 2, lisp_string_ref),
    builtin!("string-set!", 3, lisp_string_set),
    builtin!("make-string", 1, lisp_make_string),
    builtin!("string->symbol", 1, lisp_string_to_symbol),
    builtin!("symbol->string", 1, lisp_symbol_to_string),
    builtin!("sys:string->number", 2, lisp_string_to_number),
    builtin!("sys:number->string", 2, lisp_number_to_string),
    builtin!("vector-length", 1, lisp_vector_length),
    builtin!("vector-ref", 2, lisp_vector_ref),
    builtin!("vector-set!", 3, lisp_vector_set),
    builtin!("make-vector", 1, lisp_make_vector),
    builtin!("tag", 2, lisp_tag),
    builtin!("untag", 1, lisp_untag),
    builtin!("tag-marker", 1, lisp_tag_marker),
    builtin!("global-environment", 0, lisp_global_environment),
];

cfg_if::cfg_if! {
    if #[cfg(feature = "io-stdlib")] {
        use std::io::Write;

        fn lisp_display_string(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
            let [string] = arguments(args)?;
            let text = interp.heap.string_value(string)?;
            let mut stdout = std::io::stdout();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            undefined(interp)
        }

        fn lisp_display(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
            let [value] = arguments(args)?;
            let mut stdout = std::io::stdout();
            write!(stdout, "{}", interp.display(value))?;
            stdout.flush()?;
            undefined(interp)
        }

        fn lisp_exit(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
            let [code] = arguments(args)?;
            Err(LispError::Exit(interp.heap.expect_integer(code)?))
        }

        pub(crate) const IO_BUILTINS: &[Builtin] = &[
            builtin!("display-string", 1, lisp_display_string),
            builtin!("display", 1, lisp_display),
            builtin!("exit", 1, lisp_exit),
        ];
    } else {
        pub(crate) const IO_BUILTINS: &[Builtin] = &[];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = BUILTINS.iter().chain(IO_BUILTINS).map(|b| b.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn debug_skips_the_function_pointer() {
        let text = format!("{:?}", BUILTINS[0]);
        assert_eq!(text, r#"Builtin { name: "car", arity: 1 }"#);
    }
}
