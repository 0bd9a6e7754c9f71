#![forbid(unsafe_code)]

extern crate cfg_if;
extern crate derivative;
extern crate log;
extern crate nom;
extern crate ordered_float;
extern crate phf;
extern crate thiserror;

// Every value lives in one relocatable byte arena (see `heap`), so handles
// are plain positions and the whole object graph is owned by the
// `Interpreter`. Cycles through `set-car!` or captured frames are fine;
// the collector's mark bit doubles as the visited set.

pub mod util;
pub use crate::util::{LispError, Result};
pub mod value;
pub use crate::value::{Closure, Datum, LispValue, Object, Procedure};
pub mod heap;
pub use crate::heap::Heap;
pub mod printer;
pub use crate::printer::Printer;
pub mod parser;
pub use crate::parser::LispParser;
pub mod eval;
pub use crate::eval::{Interpreter, Step};
mod env;
mod macros;
pub mod builtins;
pub use crate::builtins::Builtin;
mod specials;
pub use crate::specials::SpecialForm;
