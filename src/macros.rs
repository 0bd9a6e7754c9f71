//! Top-level macro expansion.
//!
//! Transformers live in their own frame, apart from variables. Before a
//! top-level form is evaluated it is rewritten until a full scan finds no
//! call to a registered macro: the scan is depth first and left to right,
//! visits a form's sub-forms before the form itself, never enters `quote`,
//! and starts over from the top after every replacement.

use std::collections::HashSet;
use log::trace;
use crate::heap::{Position, Slot};
use crate::specials::SPECIAL_FORMS;
use crate::value::Object;
use crate::{expect, Interpreter, LispError, LispValue, Result};

/// A macro call found by [`Interpreter::find_call`], together with the pair
/// whose car holds it (`None` when the call is the whole form).
type Call = (Option<LispValue>, LispValue);

impl Interpreter {
    /// Expands every macro call in a top-level form. A `defmacro` form
    /// registers its transformer here and becomes `#t`.
    pub fn expand(&mut self, form: LispValue) -> Result<LispValue> {
        let mark = self.heap.root_mark();
        let result = self.expand_top(form);
        self.heap.release_roots(mark);
        result
    }

    fn expand_top(&mut self, form: LispValue) -> Result<LispValue> {
        if let Object::Pair { car, .. } = self.heap.object(form) {
            if car == self.keywords.defmacro {
                let form = self.heap.push_root(form);
                self.define_macro(form)?;
                return Ok(LispValue::TRUE);
            }
        }
        let form = self.heap.push_root(form);
        self.expand_in(form)?;
        Ok(self.heap.root(form))
    }

    /// Rewrites the form held in `form` in place until no call remains.
    fn expand_in(&mut self, form: Slot) -> Result<()> {
        while let Some((parent, call)) = self.find_call(self.heap.root(form)) {
            let mark = self.heap.root_mark();
            let parent = parent.map(|pair| self.heap.push_root(pair));
            let expansion = self.expand_call(call)?;
            match parent {
                Some(pair) => self.heap.set_car(self.heap.root(pair), expansion)?,
                None => self.heap.set_root(form, expansion),
            }
            self.heap.release_roots(mark);
        }
        Ok(())
    }

    /// Applies the transformer named by the head of `call` to the call's
    /// unevaluated operands.
    fn expand_call(&mut self, call: LispValue) -> Result<LispValue> {
        let name = self.heap.car(call)?;
        let transformer = self.heap.get(self.macros(), name)?;
        let operands = self.heap.cdr(call)?;
        trace!("expanding macro {}", self.display(name));
        self.apply(transformer, operands)
    }

    fn find_call(&self, form: LispValue) -> Option<Call> {
        self.scan(form, None, &mut HashSet::new())
    }

    fn scan(&self, form: LispValue, parent: Option<LispValue>, visited: &mut HashSet<Position>) -> Option<Call> {
        let Object::Pair { car: head, .. } = self.heap.object(form) else {
            return None;
        };
        if head == self.keywords.quote || !visited.insert(form.0) {
            return None;
        }
        let mut cursor = form;
        while let Object::Pair { car, cdr } = self.heap.object(cursor) {
            if let Some(call) = self.scan(car, Some(cursor), visited) {
                return Some(call);
            }
            if !self.heap.is_pair(cdr) || !visited.insert(cdr.0) {
                break;
            }
            cursor = cdr;
        }
        self.is_macro(head).then_some((parent, form))
    }

    fn is_macro(&self, head: LispValue) -> bool {
        self.heap.is_symbol(head) && self.heap.find_binding(self.macros(), head).is_some()
    }

    /// `(defmacro name params body...)`: expands the body, closes it over
    /// the global frame and registers it under `name`.
    fn define_macro(&mut self, form: Slot) -> Result<()> {
        let operands = self.heap.cdr(self.heap.root(form))?;
        let Object::Pair { car: name, cdr: rest } = self.heap.object(operands) else {
            return Err(LispError::InvalidForm("defmacro needs a name"));
        };
        let name = self.heap.expect_symbol(name)?;
        let spelled = self.heap.symbol_name(name)?.into_owned();
        if SPECIAL_FORMS.contains_key(spelled.as_str()) {
            return Err(LispError::CannotRedefineSpecialForm(spelled));
        }
        let Object::Pair { cdr: body, .. } = self.heap.object(rest) else {
            return Err(LispError::InvalidForm("defmacro needs a parameter list"));
        };
        expect!(self.heap.is_pair(body), LispError::InvalidForm("defmacro needs a body"));

        let cursor = self.heap.push_root(body);
        while let Object::Pair { car, .. } = self.heap.object(self.heap.root(cursor)) {
            let element = self.heap.push_root(car);
            self.expand_in(element)?;
            self.heap.set_car(self.heap.root(cursor), self.heap.root(element))?;
            self.heap.release_roots(element);
            let next = self.heap.cdr(self.heap.root(cursor))?;
            self.heap.set_root(cursor, next);
        }

        // re-read everything: expansion may have moved the form
        let operands = self.heap.cdr(self.heap.root(form))?;
        let name = self.heap.car(operands)?;
        let rest = self.heap.cdr(operands)?;
        let params = self.heap.car(rest)?;
        let body = self.heap.cdr(rest)?;
        let transformer = self.make_closure(name, params, body, self.global())?;
        let transformer = self.heap.push_root(transformer);
        let name = self.heap.car(self.heap.cdr(self.heap.root(form))?)?;
        self.heap.bind(self.macros(), name, self.heap.root(transformer))
    }
}
