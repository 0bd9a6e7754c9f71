#![allow(unused)]

pub use compact_scheme::{Datum, Interpreter, LispError, LispValue, Result};

pub const BOOTSTRAP: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/init.scm");

/// A fresh interpreter with the base library loaded.
pub fn testing_interp() -> Interpreter {
    let mut interp = Interpreter::new().unwrap();
    interp.load_file(BOOTSTRAP).unwrap();
    interp
}

/// Evaluates `input` in a fresh interpreter and copies the result out.
#[inline]
pub fn eval_str(input: &str) -> Result<Datum> {
    let mut interp = testing_interp();
    eval_str_in(input, &mut interp)
}

#[inline]
pub fn eval_str_in(input: &str, interp: &mut Interpreter) -> Result<Datum> {
    let value = interp.eval_str(input)?;
    interp.datum(value)
}

/// Display-mode text of the result, as the REPL would print it.
pub fn print_str_in(input: &str, interp: &mut Interpreter) -> String {
    let value = interp.eval_str(input).unwrap();
    interp.display(value).to_string()
}

#[macro_export]
macro_rules! eval {
    ($code:expr) => {
        eval_str($code).unwrap()
    };
    ($code:expr, $interp:expr) => {
        eval_str_in($code, $interp).unwrap()
    };
}
