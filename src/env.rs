//! Environment frames.
//!
//! A frame is an `Environment` record: a link to its outer frame and the root
//! of a binary tree of `Binding` records (symbol, value, left, right). Trees
//! are ordered by the symbol's name hash, then by its position; compaction
//! never reorders records, so the order survives collections.

use crate::heap::{layout::*, Heap, Position, Slot, Tag, BINDING_SIZE, NONE};
use crate::specials::SPECIAL_FORMS;
use crate::{expect, LispError, LispValue, Result};

impl Heap {
    fn binding_key(&self, symbol: Position) -> (u32, Position) {
        (self.symbol_hash(symbol), symbol)
    }

    fn expect_frame(&self, frame: LispValue) -> Result<()> {
        expect!(
            self.tag(frame.0) == Tag::Environment,
            LispError::InvalidDataType("environment", self.type_of(frame))
        );
        Ok(())
    }

    /// Binding record for `symbol` in `frame` itself, ignoring outer frames.
    pub(crate) fn find_binding(&self, frame: LispValue, symbol: LispValue) -> Option<Position> {
        let key = self.binding_key(symbol.0);
        let mut node = self.read_u32(frame.0 + ENV_ROOT);
        while node != NONE {
            let bound = self.read_u32(node + BINDING_SYMBOL);
            if bound == symbol.0 {
                return Some(node);
            }
            node = if key < self.binding_key(bound) {
                self.read_u32(node + BINDING_LEFT)
            } else {
                self.read_u32(node + BINDING_RIGHT)
            };
        }
        None
    }

    fn find_visible(&self, frame: LispValue, symbol: LispValue) -> Result<Position> {
        self.expect_frame(frame)?;
        self.expect_symbol(symbol)?;
        let mut frame = frame.0;
        while frame != NONE {
            if let Some(node) = self.find_binding(LispValue(frame), symbol) {
                return Ok(node);
            }
            frame = self.read_u32(frame + ENV_OUTER);
        }
        Err(LispError::UndefinedVariable(self.symbol_name(symbol)?.into_owned()))
    }

    /// Installs or overwrites a binding in `frame` only.
    pub fn define(&mut self, frame: LispValue, symbol: LispValue, value: LispValue) -> Result<()> {
        if SPECIAL_FORMS.contains_key(self.symbol_name(symbol)?.as_ref()) {
            return Err(LispError::CannotRedefineSpecialForm(self.symbol_name(symbol)?.into_owned()));
        }
        self.expect_frame(frame)?;
        self.bind(frame, symbol, value)
    }

    /// [`define`](Heap::define) without the keyword check; the macro table
    /// uses it directly.
    pub(crate) fn bind(&mut self, frame: LispValue, symbol: LispValue, value: LispValue) -> Result<()> {
        if let Some(node) = self.find_binding(frame, symbol) {
            self.write_u32(node + BINDING_VALUE, value.0);
            return Ok(());
        }
        let mut refs = [frame, symbol, value];
        let node = self.allocate(Tag::Binding, BINDING_SIZE, &mut refs)?;
        let [frame, symbol, value] = refs;
        self.write_u32(node + BINDING_SYMBOL, symbol.0);
        self.write_u32(node + BINDING_VALUE, value.0);
        self.write_u32(node + BINDING_LEFT, NONE);
        self.write_u32(node + BINDING_RIGHT, NONE);

        let key = self.binding_key(symbol.0);
        let mut link = frame.0 + ENV_ROOT;
        loop {
            let child = self.read_u32(link);
            if child == NONE {
                self.write_u32(link, node);
                return Ok(());
            }
            link = if key < self.binding_key(self.read_u32(child + BINDING_SYMBOL)) {
                child + BINDING_LEFT
            } else {
                child + BINDING_RIGHT
            };
        }
    }

    /// Looks `symbol` up in `frame` and then each outer frame in turn.
    pub fn get(&self, frame: LispValue, symbol: LispValue) -> Result<LispValue> {
        let node = self.find_visible(frame, symbol)?;
        Ok(LispValue(self.read_u32(node + BINDING_VALUE)))
    }

    /// Mutates the nearest existing binding of `symbol`.
    pub fn set(&mut self, frame: LispValue, symbol: LispValue, value: LispValue) -> Result<()> {
        let node = self.find_visible(frame, symbol)?;
        self.write_u32(node + BINDING_VALUE, value.0);
        Ok(())
    }

    /// Creates a child frame of `parent` binding `formals` (a proper list of
    /// `arity` symbols) to the arguments rooted from `args` to the top of the
    /// root stack. With `rest`, the last formal receives a fresh list of the
    /// surplus arguments.
    pub fn extend(
        &mut self,
        parent: LispValue,
        formals: LispValue,
        arity: u32,
        rest: bool,
        args: Slot,
    ) -> Result<LispValue> {
        let args_end = self.root_mark();
        let received = args_end - args;
        let names = arity as usize;
        let fixed = if rest {
            expect!(names > 0, LispError::InvalidForm("rest parameter without a name"));
            expect!(received + 1 >= names, LispError::TooFewArguments(names - 1, received));
            names - 1
        } else {
            expect!(received == names, LispError::IncorrectArguments(names, received));
            names
        };

        let parent_slot = self.push_root(parent);
        let cursor = self.push_root(formals);
        let surplus = if rest {
            self.list_from_range(args + fixed, args_end, LispValue::NULL)?
        } else {
            LispValue::NULL
        };
        let surplus = self.push_root(surplus);
        let frame = self.environment(Some(self.root(parent_slot)))?;
        let frame = self.push_root(frame);

        for i in 0..names {
            let name = self.car(self.root(cursor))?;
            let value = if i < fixed { self.root(args + i) } else { self.root(surplus) };
            self.define(self.root(frame), name, value)?;
            let next = self.cdr(self.root(cursor))?;
            self.set_root(cursor, next);
        }

        let frame = self.root(frame);
        self.release_roots(args_end);
        Ok(frame)
    }
}
