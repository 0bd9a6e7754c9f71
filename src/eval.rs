use log::trace;
use crate::builtins::{self, Builtin};
use crate::heap::{Heap, Slot};
use crate::printer::Printer;
use crate::specials::Keywords;
use crate::value::{Datum, Object, Procedure};
use crate::{expect, LispError, LispParser, LispValue, Result};

pub const DEFAULT_HEAP_SIZE: u32 = 1 << 20;

/// What a special form or a procedure call wants the evaluator to do next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Done(LispValue),
    /// Continue the evaluation loop with this form in this frame.
    TailCall { form: LispValue, env: LispValue },
}
impl From<LispValue> for Step {
    fn from(item: LispValue) -> Self {
        Step::Done(item)
    }
}

/// One interpreter instance: the heap plus the registries created at
/// startup (keyword symbols, builtin table, global frame, macro table).
#[derive(Debug)]
pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) builtins: Vec<Builtin>,
    pub(crate) keywords: Keywords,
    global: LispValue,
    macros: LispValue,
}

impl Interpreter {
    pub fn new() -> Result<Self> {
        Self::with_heap_size(DEFAULT_HEAP_SIZE)
    }

    pub fn with_heap_size(bytes: u32) -> Result<Self> {
        let mut heap = Heap::new(bytes);
        // everything created here is pinned, and so never moves
        heap.set_permanent(true);
        let keywords = Keywords::intern(&mut heap)?;
        let global = heap.environment(None)?;
        let macros = heap.environment(None)?;
        let mut interp = Interpreter {
            heap,
            builtins: Vec::new(),
            keywords,
            global,
            macros,
        };
        for builtin in builtins::BUILTINS.iter().chain(builtins::IO_BUILTINS) {
            interp.define_builtin(*builtin)?;
        }
        interp.heap.set_permanent(false);
        Ok(interp)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }
    pub fn global(&self) -> LispValue {
        self.global
    }
    pub(crate) fn macros(&self) -> LispValue {
        self.macros
    }

    /// Registers a native procedure in the global frame.
    pub fn define_builtin(&mut self, builtin: Builtin) -> Result<LispValue> {
        let index = self.builtins.len() as u32;
        self.builtins.push(builtin);
        let name = self.heap.intern(builtin.name)?;
        let name = self.heap.push_root(name);
        let procedure = self.heap.builtin(self.heap.root(name), index)?;
        let procedure = self.heap.push_root(procedure);
        let result = self.heap.define(self.global, self.heap.root(name), self.heap.root(procedure));
        let procedure = self.heap.root(procedure);
        self.heap.release_roots(name);
        result.map(|_| procedure)
    }

    pub fn lookup_global(&mut self, name: &str) -> Result<LispValue> {
        let symbol = self.heap.intern(name)?;
        self.heap.get(self.global, symbol)
    }

    pub fn display(&self, value: LispValue) -> Printer<'_> {
        Printer::display(&self.heap, value)
    }
    pub fn write(&self, value: LispValue) -> Printer<'_> {
        Printer::write(&self.heap, value)
    }
    pub fn datum(&self, value: LispValue) -> Result<Datum> {
        self.heap.datum(value)
    }
    pub fn collect(&mut self) -> Result<()> {
        self.heap.collect()
    }

    /// Reads one form from `parser`; see [`LispParser::read`].
    pub fn read(&mut self, parser: &mut LispParser, fail_on_end: bool) -> Result<LispValue> {
        parser.read(&mut self.heap, &self.keywords, fail_on_end)
    }

    /// Reads, expands and evaluates every form in `source`, returning the
    /// value of the last one (the empty list when there are none).
    pub fn eval_str(&mut self, source: &str) -> Result<LispValue> {
        let mark = self.heap.root_mark();
        let result = self.eval_source(source);
        self.heap.release_roots(mark);
        result
    }

    fn eval_source(&mut self, source: &str) -> Result<LispValue> {
        let mut parser = LispParser::new(source);
        let last = self.heap.push_root(LispValue::NULL);
        loop {
            let form = self.read(&mut parser, false)?;
            if form == LispValue::EOF {
                break Ok(self.heap.root(last));
            }
            let value = self.eval_form(form)?;
            self.heap.set_root(last, value);
        }
    }

    #[cfg(feature = "io-stdlib")]
    pub fn load_file<P: AsRef<std::path::Path>>(&mut self, path: P) -> Result<LispValue> {
        let source = std::fs::read_to_string(path)?;
        self.eval_str(&source)
    }

    /// Expands one top-level form and evaluates it in the global frame.
    pub fn eval_form(&mut self, form: LispValue) -> Result<LispValue> {
        let form = self.expand(form)?;
        trace!("eval: {}", self.write(form));
        self.evaluate(form, self.global)
    }

    /// Evaluates `form` in `env`. Calls in tail position loop here instead of
    /// recursing, so they run in constant native stack.
    pub fn evaluate(&mut self, form: LispValue, env: LispValue) -> Result<LispValue> {
        let mark = self.heap.root_mark();
        let result = self.eval_loop(form, env);
        self.heap.release_roots(mark);
        result
    }

    fn eval_loop(&mut self, form: LispValue, env: LispValue) -> Result<LispValue> {
        let form_slot = self.heap.push_root(form);
        let env_slot = self.heap.push_root(env);
        let base = self.heap.root_mark();
        loop {
            self.heap.release_roots(base);
            let form = self.heap.root(form_slot);
            let step = match self.heap.object(form) {
                Object::Null => return Err(LispError::InvalidForm("cannot evaluate the empty list")),
                Object::Vector { .. } => return Err(LispError::InvalidForm("vector literals must be quoted")),
                Object::Symbol => return self.heap.get(self.heap.root(env_slot), form),
                Object::Pair { car, .. } => match self.keywords.special_form(car) {
                    Some(special) => self.eval_special(special, form_slot, env_slot)?,
                    None => self.eval_application(form_slot, env_slot)?,
                },
                _ => return Ok(form),
            };
            match step {
                Step::Done(value) => break Ok(value),
                Step::TailCall { form, env } => {
                    self.heap.set_root(form_slot, form);
                    self.heap.set_root(env_slot, env);
                },
            }
        }
    }

    fn eval_application(&mut self, form_slot: Slot, env_slot: Slot) -> Result<Step> {
        let head = self.heap.car(self.heap.root(form_slot))?;
        let operator = self.evaluate(head, self.heap.root(env_slot))?;
        let operator = self.heap.push_root(operator);
        let operands = self.heap.cdr(self.heap.root(form_slot))?;
        let cursor = self.heap.push_root(operands);
        let args = self.heap.root_mark();
        loop {
            match self.heap.object(self.heap.root(cursor)) {
                Object::Null => break,
                Object::Pair { car, .. } => {
                    let value = self.evaluate(car, self.heap.root(env_slot))?;
                    self.heap.push_root(value);
                    let next = self.heap.cdr(self.heap.root(cursor))?;
                    self.heap.set_root(cursor, next);
                },
                _ => return Err(LispError::InvalidForm("procedure call with a dotted argument list")),
            }
        }
        self.invoke(operator, args)
    }

    /// Calls the procedure in `operator` with the arguments rooted from
    /// `args` to the top of the root stack. Builtins run to completion;
    /// closures hand their body back to the caller's loop.
    pub(crate) fn invoke(&mut self, operator: Slot, args: Slot) -> Result<Step> {
        let procedure = self.heap.root(operator);
        match self.heap.object(procedure) {
            Object::Procedure(Procedure::Builtin { index, .. }) => {
                let builtin = self.builtins[index as usize];
                let args = self.heap.roots_from(args);
                expect!(args.len() == builtin.arity, LispError::IncorrectArguments(builtin.arity, args.len()));
                (builtin.func)(self, &args)
            },
            Object::Procedure(Procedure::Closure(closure)) => {
                let env = self.heap.extend(closure.env, closure.formals, closure.arity, closure.rest, args)?;
                // extend may have moved the closure
                let body = self.heap.closure_view(self.heap.root(operator))?.body;
                Ok(Step::TailCall { form: body, env })
            },
            _ => Err(LispError::NotCallable(self.display(procedure).to_string())),
        }
    }

    /// Calls `procedure` with the elements of the proper list `arguments`.
    pub fn apply(&mut self, procedure: LispValue, arguments: LispValue) -> Result<LispValue> {
        let mark = self.heap.root_mark();
        let result = match self.apply_step(procedure, arguments) {
            Ok(Step::Done(value)) => Ok(value),
            Ok(Step::TailCall { form, env }) => self.evaluate(form, env),
            Err(err) => Err(err),
        };
        self.heap.release_roots(mark);
        result
    }

    pub(crate) fn apply_step(&mut self, procedure: LispValue, arguments: LispValue) -> Result<Step> {
        let len = self.heap.list_length(arguments)?;
        let operator = self.heap.push_root(procedure);
        let args = self.heap.root_mark();
        let mut cursor = arguments;
        for _ in 0..len {
            self.heap.push_root(self.heap.car(cursor)?);
            cursor = self.heap.cdr(cursor)?;
        }
        self.invoke(operator, args)
    }
}
