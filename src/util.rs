use thiserror::Error;

#[macro_export]
macro_rules! expect {
    ($cond:expr, $err:expr) => {
        if !$cond {
            Err($err)?;
        }
    }
}

pub type Result<T> = std::result::Result<T, LispError>;

#[derive(Error, Debug)]
pub enum LispError {
    // reader
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected delimiter '{0}'")]
    UnexpectedDelimiter(char),
    #[error("invalid dotted list")]
    InvalidDottedList,
    #[error("'.' is not allowed inside a vector literal")]
    DotInVector,
    #[error("unknown character name `{0}`")]
    InvalidCharName(String),

    // evaluation
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),
    #[error("cannot redefine special form `{0}`")]
    CannotRedefineSpecialForm(String),
    #[error("invalid data type. expected {0}, received {1}")]
    InvalidDataType(&'static str, &'static str),
    #[error("unexpected arguments. expected {0}, received {1}")]
    IncorrectArguments(usize, usize),
    #[error("too few arguments. expected at least {0}, received {1}")]
    TooFewArguments(usize, usize),
    #[error("`{0}` is not a procedure")]
    NotCallable(String),
    #[error("invalid form: {0}")]
    InvalidForm(&'static str),
    #[error("index {0} out of range")]
    IndexOutOfRange(i64),
    #[error("division by zero")]
    DivisionByZero,
    #[error("unsupported numeric base {0}")]
    UnsupportedBase(i64),

    // host
    #[error("execution stopped with exit code {0}")]
    Exit(i64),
    #[error("cannot allocate a single record of {0} bytes")]
    AllocationTooLarge(u64),
    #[error("heap exhausted while requesting {0} bytes")]
    HeapExhausted(u64),
    #[error("corrupt heap: {0}")]
    CorruptHeap(String),

    #[cfg(feature = "io-stdlib")]
    #[error("error calling into native function: {0}")]
    OSFailure(#[from] std::io::Error),
}

impl LispError {
    /// Conditions after which the heap can no longer be trusted. Everything
    /// else only aborts the current top-level form.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HeapExhausted(_) | Self::CorruptHeap(_))
    }
}
