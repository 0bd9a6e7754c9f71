use phf::phf_map;
use crate::eval::Step;
use crate::heap::{Heap, Slot};
use crate::value::Object;
use crate::{expect, Interpreter, LispError, LispValue, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    If,
    Begin,
    Define,
    Set,
    Lambda,
    Defmacro,
}

/// Names that can never be bound as variables.
pub(crate) static SPECIAL_FORMS: phf::Map<&'static str, SpecialForm> = phf_map! {
    "quote" => SpecialForm::Quote,
    "if" => SpecialForm::If,
    "begin" => SpecialForm::Begin,
    "define" => SpecialForm::Define,
    "set!" => SpecialForm::Set,
    "lambda" => SpecialForm::Lambda,
    "defmacro" => SpecialForm::Defmacro,
};

/// Symbols the reader, evaluator and expander compare against. They are
/// interned while the heap is pinning, so the handles stay valid forever.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Keywords {
    pub quote: LispValue,
    pub quasiquote: LispValue,
    pub unquote: LispValue,
    pub begin: LispValue,
    pub lambda: LispValue,
    pub defmacro: LispValue,
    pub dot: LispValue,
    pub undefined: LispValue,
    forms: [(LispValue, SpecialForm); 7],
}

impl Keywords {
    pub fn intern(heap: &mut Heap) -> Result<Self> {
        let mut forms = [(LispValue::NULL, SpecialForm::Quote); 7];
        for (entry, (name, form)) in forms.iter_mut().zip(SPECIAL_FORMS.entries()) {
            *entry = (heap.intern(name)?, *form);
        }
        Ok(Keywords {
            quote: heap.intern("quote")?,
            quasiquote: heap.intern("quasiquote")?,
            unquote: heap.intern("unquote")?,
            begin: heap.intern("begin")?,
            lambda: heap.intern("lambda")?,
            defmacro: heap.intern("defmacro")?,
            dot: heap.intern(".")?,
            undefined: heap.intern("undefined")?,
            forms,
        })
    }

    pub fn special_form(&self, head: LispValue) -> Option<SpecialForm> {
        self.forms.iter().find(|(symbol, _)| *symbol == head).map(|(_, form)| *form)
    }
}

impl Interpreter {
    /// Splits a proper list of exactly `N` operands.
    pub(crate) fn operands<const N: usize>(&self, list: LispValue, form: &'static str) -> Result<[LispValue; N]> {
        let mut operands = [LispValue::NULL; N];
        let mut cursor = list;
        for operand in operands.iter_mut() {
            match self.heap.object(cursor) {
                Object::Pair { car, cdr } => {
                    *operand = car;
                    cursor = cdr;
                },
                _ => return Err(LispError::InvalidForm(form)),
            }
        }
        expect!(cursor.is_null(), LispError::InvalidForm(form));
        Ok(operands)
    }

    pub(crate) fn eval_special(&mut self, special: SpecialForm, form: Slot, env: Slot) -> Result<Step> {
        let operands = self.heap.cdr(self.heap.root(form))?;
        match special {
            SpecialForm::Quote => {
                let [datum] = self.operands(operands, "quote takes exactly one operand")?;
                Ok(Step::Done(datum))
            },
            SpecialForm::If => {
                let [test, _, _] = self.operands(operands, "if takes a test and two branches")?;
                let test = self.evaluate(test, self.heap.root(env))?;
                let operands = self.heap.cdr(self.heap.root(form))?;
                let [_, then, otherwise] = self.operands(operands, "if takes a test and two branches")?;
                Ok(Step::TailCall {
                    form: if test.truthiness() { then } else { otherwise },
                    env: self.heap.root(env),
                })
            },
            SpecialForm::Begin => {
                let body = self.heap.push_root(operands);
                self.eval_sequence(body, env)
            },
            SpecialForm::Define => self.eval_define(form, env),
            SpecialForm::Set => {
                let [target, expr] = self.operands(operands, "set! takes a symbol and one expression")?;
                self.heap.expect_symbol(target)?;
                let value = self.evaluate(expr, self.heap.root(env))?;
                let operands = self.heap.cdr(self.heap.root(form))?;
                let target = self.heap.car(operands)?;
                self.heap.set(self.heap.root(env), target, value)?;
                Ok(Step::Done(self.keywords.undefined))
            },
            SpecialForm::Lambda => {
                let Object::Pair { car: formals, cdr: body } = self.heap.object(operands) else {
                    return Err(LispError::InvalidForm("lambda needs a parameter list"));
                };
                let closure = self.make_closure(self.keywords.lambda, formals, body, self.heap.root(env))?;
                Ok(Step::Done(closure))
            },
            SpecialForm::Defmacro => Err(LispError::InvalidForm("defmacro is only allowed at top level")),
        }
    }

    /// Evaluates each form of the list in `body` for effect and hands the
    /// last one back as a tail call.
    fn eval_sequence(&mut self, body: Slot, env: Slot) -> Result<Step> {
        loop {
            let (expr, rest) = match self.heap.object(self.heap.root(body)) {
                Object::Pair { car, cdr } => (car, cdr),
                Object::Null => return Err(LispError::InvalidForm("begin needs at least one expression")),
                _ => return Err(LispError::InvalidForm("begin with a dotted body")),
            };
            if rest.is_null() {
                return Ok(Step::TailCall { form: expr, env: self.heap.root(env) });
            }
            self.evaluate(expr, self.heap.root(env))?;
            let rest = self.heap.cdr(self.heap.root(body))?;
            self.heap.set_root(body, rest);
        }
    }

    fn eval_define(&mut self, form: Slot, env: Slot) -> Result<Step> {
        let operands = self.heap.cdr(self.heap.root(form))?;
        let Object::Pair { car: target, cdr: body } = self.heap.object(operands) else {
            return Err(LispError::InvalidForm("define needs a target"));
        };
        match self.heap.object(target) {
            Object::Symbol => {
                let [expr] = self.operands(body, "define takes exactly one expression")?;
                let value = self.evaluate(expr, self.heap.root(env))?;
                // the form may have moved while evaluating
                let operands = self.heap.cdr(self.heap.root(form))?;
                let target = self.heap.car(operands)?;
                self.heap.define(self.heap.root(env), target, value)?;
            },
            Object::Pair { car: name, cdr: formals } => {
                self.heap.expect_symbol(name)?;
                let closure = self.make_closure(name, formals, body, self.heap.root(env))?;
                let closure = self.heap.push_root(closure);
                let operands = self.heap.cdr(self.heap.root(form))?;
                let name = self.heap.car(self.heap.car(operands)?)?;
                self.heap.define(self.heap.root(env), name, self.heap.root(closure))?;
            },
            _ => return Err(LispError::InvalidForm("define target must be a symbol or a signature")),
        }
        Ok(Step::Done(self.keywords.undefined))
    }

    /// Builds a closure from a `lambda`-style parameter spec (a symbol, the
    /// empty list, or a possibly dotted list of symbols) and a body list.
    pub(crate) fn make_closure(
        &mut self,
        name: LispValue,
        formals: LispValue,
        body: LispValue,
        env: LispValue,
    ) -> Result<LispValue> {
        expect!(!body.is_null(), LispError::InvalidForm("procedure body is empty"));
        let mark = self.heap.root_mark();
        let name = self.heap.push_root(name);
        let body = self.heap.push_root(body);
        let env = self.heap.push_root(env);

        let names = self.heap.root_mark();
        let mut cursor = formals;
        let rest = loop {
            match self.heap.object(cursor) {
                Object::Null => break false,
                Object::Symbol => {
                    self.heap.push_root(cursor);
                    break true;
                },
                Object::Pair { car, cdr } if self.heap.is_symbol(car) => {
                    self.heap.push_root(car);
                    cursor = cdr;
                },
                _ => return Err(LispError::InvalidForm("parameters must be symbols")),
            }
        };
        let arity = (self.heap.root_mark() - names) as u32;
        let formals = self.heap.list_from_roots(names, LispValue::NULL)?;
        let formals = self.heap.push_root(formals);
        let body = self.heap.cons(self.keywords.begin, self.heap.root(body))?;
        let closure = self.heap.closure(
            self.heap.root(name),
            self.heap.root(formals),
            self.heap.root(env),
            body,
            arity,
            rest,
        )?;
        self.heap.release_roots(mark);
        Ok(closure)
    }
}
