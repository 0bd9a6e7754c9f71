//! The object heap.
//!
//! Every record the interpreter creates lives in one growable byte arena and
//! is addressed by its 32-bit position. References between records are
//! positions too, so the collector can slide live records together and patch
//! every reference afterwards (mark, plan, relocate, slide).
//!
//! A record starts with a one-byte header (live bit, keep-alive bit, 4-bit
//! tag) followed by a 4-byte forwarding field that only means something while
//! a collection runs. All reference fields of a record are stored next to each
//! other, which is what [`Heap::references`] relies on.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use log::debug;
use crate::{expect, LispError, LispValue, Result};

pub type Position = u32;
/// Index into the root stack.
pub type Slot = usize;

/// The absent reference (no outer frame, empty subtree).
pub(crate) const NONE: Position = u32::MAX;
const MAX_HEAP: u64 = u32::MAX as u64;
const MIN_HEAP: u32 = 256;

const LIVE: u8 = 0x80;
const KEEP_ALIVE: u8 = 0x40;
const TAG_MASK: u8 = 0x0f;
const TARGET: u32 = 1;

pub(crate) const HEADER: u32 = 5;

pub(crate) mod layout {
    use super::HEADER;

    pub const PAYLOAD: u32 = HEADER;

    pub const CAR: u32 = HEADER;
    pub const CDR: u32 = HEADER + 4;

    // strings and vectors
    pub const LENGTH: u32 = HEADER;
    pub const ELEMENTS: u32 = HEADER + 4;

    pub const SYMBOL_LEFT: u32 = HEADER;
    pub const SYMBOL_RIGHT: u32 = HEADER + 4;
    pub const SYMBOL_HASH: u32 = HEADER + 8;
    pub const SYMBOL_LEN: u32 = HEADER + 12;
    pub const SYMBOL_NAME: u32 = HEADER + 16;

    pub const BUILTIN_NAME: u32 = HEADER;
    pub const BUILTIN_INDEX: u32 = HEADER + 4;

    pub const CLOSURE_NAME: u32 = HEADER;
    pub const CLOSURE_FORMALS: u32 = HEADER + 4;
    pub const CLOSURE_ENV: u32 = HEADER + 8;
    pub const CLOSURE_BODY: u32 = HEADER + 12;
    pub const CLOSURE_ARITY: u32 = HEADER + 16;
    pub const CLOSURE_REST: u32 = HEADER + 20;

    pub const ENV_OUTER: u32 = HEADER;
    pub const ENV_ROOT: u32 = HEADER + 4;

    pub const BINDING_SYMBOL: u32 = HEADER;
    pub const BINDING_VALUE: u32 = HEADER + 4;
    pub const BINDING_LEFT: u32 = HEADER + 8;
    pub const BINDING_RIGHT: u32 = HEADER + 12;

    pub const TAGGED_MARKER: u32 = HEADER;
    pub const TAGGED_VALUE: u32 = HEADER + 4;
}
use layout::*;

pub const SINGLETON_SIZE: u32 = HEADER;
pub const INTEGER_SIZE: u32 = HEADER + 8;
pub const FLOAT_SIZE: u32 = HEADER + 8;
pub const CHAR_SIZE: u32 = HEADER + 4;
pub const PAIR_SIZE: u32 = HEADER + 8;
pub const BUILTIN_SIZE: u32 = HEADER + 8;
pub const CLOSURE_SIZE: u32 = HEADER + 21;
pub const ENVIRONMENT_SIZE: u32 = HEADER + 8;
pub const BINDING_SIZE: u32 = HEADER + 16;
pub const TAGGED_SIZE: u32 = HEADER + 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Tag {
    Integer,
    Float,
    Symbol,
    Pair,
    String,
    True,
    False,
    Char,
    Null,
    Builtin,
    Closure,
    Vector,
    Eof,
    Environment,
    Binding,
    Tagged,
}

const TAGS: [Tag; 16] = [
    Tag::Integer, Tag::Float, Tag::Symbol, Tag::Pair,
    Tag::String, Tag::True, Tag::False, Tag::Char,
    Tag::Null, Tag::Builtin, Tag::Closure, Tag::Vector,
    Tag::Eof, Tag::Environment, Tag::Binding, Tag::Tagged,
];

fn variable_size(fixed: u32, count: usize, width: u32) -> Result<u32> {
    let size = fixed as u64 + count as u64 * width as u64;
    expect!(size <= MAX_HEAP, LispError::AllocationTooLarge(size));
    Ok(size as u32)
}

fn name_hash(name: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish() as u32
}

#[derive(Debug)]
pub struct Heap {
    bytes: Vec<u8>,
    /// allocation high-water mark
    top: u32,
    /// a collection runs before `top` would pass this
    limit: u32,
    roots: Vec<Position>,
    /// root of the symbol table tree
    symbols: Position,
    permanent: bool,
    collections: usize,
}

impl Heap {
    /// Creates a heap whose first collection happens once `capacity` bytes
    /// are in use. The four singletons are written at fixed positions so
    /// that [`LispValue::NULL`] and friends are constants.
    pub fn new(capacity: u32) -> Self {
        let limit = capacity.max(MIN_HEAP);
        let mut heap = Heap {
            bytes: vec![0; limit as usize],
            top: 0,
            limit,
            roots: Vec::new(),
            symbols: NONE,
            permanent: true,
            collections: 0,
        };
        for tag in [Tag::Null, Tag::True, Tag::False, Tag::Eof] {
            let pos = heap.top;
            heap.write_header(pos, tag);
            heap.top += SINGLETON_SIZE;
        }
        debug_assert_eq!(heap.tag(LispValue::EOF.0), Tag::Eof);
        heap.permanent = false;
        heap
    }

    /// Bytes currently allocated, live or not.
    pub fn used(&self) -> u32 {
        self.top
    }
    pub fn capacity(&self) -> u32 {
        self.limit
    }
    pub fn collections(&self) -> usize {
        self.collections
    }

    /// While set, new records get the keep-alive bit. Only used while the
    /// interpreter starts up, so pinned records form a prefix of the arena
    /// and never move.
    pub(crate) fn set_permanent(&mut self, permanent: bool) {
        self.permanent = permanent;
    }

    #[inline]
    pub(crate) fn read_u8(&self, at: u32) -> u8 {
        self.bytes[at as usize]
    }
    #[inline]
    pub(crate) fn read_u32(&self, at: u32) -> u32 {
        let at = at as usize;
        let mut word = [0; 4];
        word.copy_from_slice(&self.bytes[at..at + 4]);
        u32::from_le_bytes(word)
    }
    #[inline]
    pub(crate) fn write_u32(&mut self, at: u32, value: u32) {
        let at = at as usize;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    #[inline]
    pub(crate) fn read_u64(&self, at: u32) -> u64 {
        let at = at as usize;
        let mut word = [0; 8];
        word.copy_from_slice(&self.bytes[at..at + 8]);
        u64::from_le_bytes(word)
    }
    #[inline]
    fn write_u64(&mut self, at: u32, value: u64) {
        let at = at as usize;
        self.bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }
    #[inline]
    pub(crate) fn tag(&self, pos: Position) -> Tag {
        TAGS[(self.bytes[pos as usize] & TAG_MASK) as usize]
    }
    #[inline]
    fn is_live(&self, pos: Position) -> bool {
        self.bytes[pos as usize] & LIVE != 0
    }

    fn write_header(&mut self, pos: Position, tag: Tag) {
        let flags = if self.permanent { KEEP_ALIVE } else { 0 };
        self.bytes[pos as usize] = tag as u8 | flags;
        self.write_u32(pos + TARGET, 0);
    }

    // root stack

    pub fn push_root(&mut self, value: LispValue) -> Slot {
        self.roots.push(value.0);
        self.roots.len() - 1
    }
    pub fn root(&self, slot: Slot) -> LispValue {
        LispValue(self.roots[slot])
    }
    pub fn set_root(&mut self, slot: Slot, value: LispValue) {
        self.roots[slot] = value.0;
    }
    /// Current height of the root stack; pass it to
    /// [`release_roots`](Heap::release_roots) to drop everything pushed since.
    pub fn root_mark(&self) -> usize {
        self.roots.len()
    }
    pub fn release_roots(&mut self, mark: usize) {
        self.roots.truncate(mark);
    }
    pub(crate) fn roots_from(&self, base: usize) -> Vec<LispValue> {
        self.roots[base..].iter().map(|&pos| LispValue(pos)).collect()
    }

    // allocation

    /// Reserves `size` bytes, collecting (and then growing) when the bound
    /// would be passed. Handles in `protect` are rooted for the duration and
    /// updated in place.
    pub(crate) fn allocate(&mut self, tag: Tag, size: u32, protect: &mut [LispValue]) -> Result<Position> {
        if self.top as u64 + size as u64 > self.limit as u64 {
            let base = self.roots.len();
            self.roots.extend(protect.iter().map(|value| value.0));
            let collected = self.collect();
            for (value, &moved) in protect.iter_mut().zip(&self.roots[base..]) {
                *value = LispValue(moved);
            }
            self.roots.truncate(base);
            collected?;
            self.grow(size)?;
        }
        let pos = self.top;
        self.top += size;
        self.write_header(pos, tag);
        Ok(pos)
    }

    fn grow(&mut self, request: u32) -> Result<()> {
        let needed = self.top as u64 + request as u64;
        expect!(needed <= MAX_HEAP, LispError::HeapExhausted(request as u64));
        let mut limit = self.limit as u64;
        // keep at least half the arena free after a collection
        while limit < needed || limit < 2 * self.top as u64 {
            limit *= 2;
        }
        let limit = limit.min(MAX_HEAP) as u32;
        if limit != self.limit {
            debug!("growing heap from {} to {} bytes", self.limit, limit);
            self.bytes.resize(limit as usize, 0);
            self.limit = limit;
        }
        Ok(())
    }

    pub fn integer(&mut self, value: i64) -> Result<LispValue> {
        let pos = self.allocate(Tag::Integer, INTEGER_SIZE, &mut [])?;
        self.write_u64(pos + PAYLOAD, value as u64);
        Ok(LispValue(pos))
    }

    pub fn float(&mut self, value: f64) -> Result<LispValue> {
        let pos = self.allocate(Tag::Float, FLOAT_SIZE, &mut [])?;
        self.write_u64(pos + PAYLOAD, value.to_bits());
        Ok(LispValue(pos))
    }

    pub fn character(&mut self, c: char) -> Result<LispValue> {
        let pos = self.allocate(Tag::Char, CHAR_SIZE, &mut [])?;
        self.write_u32(pos + PAYLOAD, c as u32);
        Ok(LispValue(pos))
    }

    pub fn cons(&mut self, car: LispValue, cdr: LispValue) -> Result<LispValue> {
        let mut refs = [car, cdr];
        let pos = self.allocate(Tag::Pair, PAIR_SIZE, &mut refs)?;
        let [car, cdr] = refs;
        self.write_u32(pos + CAR, car.0);
        self.write_u32(pos + CDR, cdr.0);
        Ok(LispValue(pos))
    }

    pub fn string(&mut self, text: &str) -> Result<LispValue> {
        let len = text.chars().count();
        let pos = self.allocate(Tag::String, variable_size(ELEMENTS, len, 4)?, &mut [])?;
        self.write_u32(pos + LENGTH, len as u32);
        for (i, c) in text.chars().enumerate() {
            self.write_u32(pos + ELEMENTS + 4 * i as u32, c as u32);
        }
        Ok(LispValue(pos))
    }

    pub fn make_string(&mut self, len: u32, fill: char) -> Result<LispValue> {
        let pos = self.allocate(Tag::String, variable_size(ELEMENTS, len as usize, 4)?, &mut [])?;
        self.write_u32(pos + LENGTH, len);
        for i in 0..len {
            self.write_u32(pos + ELEMENTS + 4 * i, fill as u32);
        }
        Ok(LispValue(pos))
    }

    pub fn make_vector(&mut self, len: u32, fill: LispValue) -> Result<LispValue> {
        let mut refs = [fill];
        let pos = self.allocate(Tag::Vector, variable_size(ELEMENTS, len as usize, 4)?, &mut refs)?;
        self.write_u32(pos + LENGTH, len);
        for i in 0..len {
            self.write_u32(pos + ELEMENTS + 4 * i, refs[0].0);
        }
        Ok(LispValue(pos))
    }

    /// Builds a vector out of every root pushed since `base`, then pops them.
    pub fn vector_from_roots(&mut self, base: usize) -> Result<LispValue> {
        let len = self.roots.len() - base;
        let pos = self.allocate(Tag::Vector, variable_size(ELEMENTS, len, 4)?, &mut [])?;
        self.write_u32(pos + LENGTH, len as u32);
        for i in 0..len {
            self.write_u32(pos + ELEMENTS + 4 * i as u32, self.roots[base + i]);
        }
        self.roots.truncate(base);
        Ok(LispValue(pos))
    }

    /// Builds a list out of every root pushed since `base`, ending in `tail`,
    /// then pops them.
    pub fn list_from_roots(&mut self, base: usize, tail: LispValue) -> Result<LispValue> {
        let list = self.list_from_range(base, self.roots.len(), tail)?;
        self.roots.truncate(base);
        Ok(list)
    }

    pub(crate) fn list_from_range(&mut self, start: Slot, end: Slot, tail: LispValue) -> Result<LispValue> {
        let mut list = tail;
        for slot in (start..end).rev() {
            list = self.cons(self.root(slot), list)?;
        }
        Ok(list)
    }

    pub(crate) fn builtin(&mut self, name: LispValue, index: u32) -> Result<LispValue> {
        let mut refs = [name];
        let pos = self.allocate(Tag::Builtin, BUILTIN_SIZE, &mut refs)?;
        self.write_u32(pos + BUILTIN_NAME, refs[0].0);
        self.write_u32(pos + BUILTIN_INDEX, index);
        Ok(LispValue(pos))
    }

    pub(crate) fn closure(
        &mut self,
        name: LispValue,
        formals: LispValue,
        env: LispValue,
        body: LispValue,
        arity: u32,
        rest: bool,
    ) -> Result<LispValue> {
        let mut refs = [name, formals, env, body];
        let pos = self.allocate(Tag::Closure, CLOSURE_SIZE, &mut refs)?;
        let [name, formals, env, body] = refs;
        self.write_u32(pos + CLOSURE_NAME, name.0);
        self.write_u32(pos + CLOSURE_FORMALS, formals.0);
        self.write_u32(pos + CLOSURE_ENV, env.0);
        self.write_u32(pos + CLOSURE_BODY, body.0);
        self.write_u32(pos + CLOSURE_ARITY, arity);
        self.bytes[(pos + CLOSURE_REST) as usize] = rest as u8;
        Ok(LispValue(pos))
    }

    pub fn environment(&mut self, outer: Option<LispValue>) -> Result<LispValue> {
        let mut refs = [outer.unwrap_or(LispValue::NULL)];
        let pos = self.allocate(Tag::Environment, ENVIRONMENT_SIZE, &mut refs)?;
        let outer = if outer.is_some() { refs[0].0 } else { NONE };
        self.write_u32(pos + ENV_OUTER, outer);
        self.write_u32(pos + ENV_ROOT, NONE);
        Ok(LispValue(pos))
    }

    pub fn tagged(&mut self, marker: LispValue, value: LispValue) -> Result<LispValue> {
        let mut refs = [marker, value];
        let pos = self.allocate(Tag::Tagged, TAGGED_SIZE, &mut refs)?;
        self.write_u32(pos + TAGGED_MARKER, refs[0].0);
        self.write_u32(pos + TAGGED_VALUE, refs[1].0);
        Ok(LispValue(pos))
    }

    // symbols

    pub(crate) fn symbol_bytes(&self, pos: Position) -> &[u8] {
        let len = self.read_u32(pos + SYMBOL_LEN);
        let start = (pos + SYMBOL_NAME) as usize;
        &self.bytes[start..start + len as usize]
    }
    pub(crate) fn symbol_hash(&self, pos: Position) -> u32 {
        self.read_u32(pos + SYMBOL_HASH)
    }

    fn find_symbol(&self, name: &str) -> Option<Position> {
        let mut node = self.symbols;
        while node != NONE {
            node = match name.as_bytes().cmp(self.symbol_bytes(node)) {
                std::cmp::Ordering::Equal => return Some(node),
                std::cmp::Ordering::Less => self.read_u32(node + SYMBOL_LEFT),
                std::cmp::Ordering::Greater => self.read_u32(node + SYMBOL_RIGHT),
            };
        }
        None
    }

    /// Returns the one symbol record named `name`, creating it if needed.
    pub fn intern(&mut self, name: &str) -> Result<LispValue> {
        if let Some(found) = self.find_symbol(name) {
            return Ok(LispValue(found));
        }
        let size = variable_size(SYMBOL_NAME, name.len(), 1)?;
        let pos = self.allocate(Tag::Symbol, size, &mut [])?;
        self.write_u32(pos + SYMBOL_LEFT, NONE);
        self.write_u32(pos + SYMBOL_RIGHT, NONE);
        self.write_u32(pos + SYMBOL_HASH, name_hash(name));
        self.write_u32(pos + SYMBOL_LEN, name.len() as u32);
        let start = (pos + SYMBOL_NAME) as usize;
        self.bytes[start..start + name.len()].copy_from_slice(name.as_bytes());

        // the allocation may have moved the tree, so look for the leaf now
        let mut link = None;
        let mut node = self.symbols;
        while node != NONE {
            let field = if name.as_bytes() < self.symbol_bytes(node) {
                node + SYMBOL_LEFT
            } else {
                node + SYMBOL_RIGHT
            };
            link = Some(field);
            node = self.read_u32(field);
        }
        match link {
            Some(field) => self.write_u32(field, pos),
            None => self.symbols = pos,
        }
        Ok(LispValue(pos))
    }

    // collection

    fn record_size(&self, pos: Position) -> u32 {
        match self.tag(pos) {
            Tag::Null | Tag::True | Tag::False | Tag::Eof => SINGLETON_SIZE,
            Tag::Integer => INTEGER_SIZE,
            Tag::Float => FLOAT_SIZE,
            Tag::Char => CHAR_SIZE,
            Tag::Pair => PAIR_SIZE,
            Tag::Builtin => BUILTIN_SIZE,
            Tag::Closure => CLOSURE_SIZE,
            Tag::Environment => ENVIRONMENT_SIZE,
            Tag::Binding => BINDING_SIZE,
            Tag::Tagged => TAGGED_SIZE,
            Tag::Symbol => SYMBOL_NAME + self.read_u32(pos + SYMBOL_LEN),
            Tag::String | Tag::Vector => ELEMENTS + 4 * self.read_u32(pos + LENGTH),
        }
    }

    /// Position of the first reference field and how many follow it.
    fn references(&self, pos: Position) -> (u32, u32) {
        match self.tag(pos) {
            Tag::Symbol | Tag::Pair | Tag::Environment | Tag::Tagged => (pos + HEADER, 2),
            Tag::Closure | Tag::Binding => (pos + HEADER, 4),
            Tag::Builtin => (pos + HEADER, 1),
            Tag::Vector => (pos + ELEMENTS, self.read_u32(pos + LENGTH)),
            Tag::Integer | Tag::Float | Tag::Char | Tag::String
            | Tag::True | Tag::False | Tag::Null | Tag::Eof => (pos, 0),
        }
    }

    /// Runs a full mark-and-compact collection.
    pub fn collect(&mut self) -> Result<()> {
        let before = self.top;
        self.mark()?;
        let live = self.plan();
        self.relocate()?;
        self.slide();
        self.top = live;
        self.collections += 1;
        debug!(
            "collection #{} reclaimed {} bytes, {} bytes live",
            self.collections, before - live, live,
        );
        Ok(())
    }

    fn mark(&mut self) -> Result<()> {
        let mut pending = self.roots.clone();
        pending.push(self.symbols);
        let mut pos = 0;
        while pos < self.top {
            if self.bytes[pos as usize] & KEEP_ALIVE != 0 {
                pending.push(pos);
            }
            pos += self.record_size(pos);
        }

        while let Some(pos) = pending.pop() {
            if pos == NONE {
                continue;
            }
            expect!(pos < self.top, LispError::CorruptHeap(format!("reference past the end of the heap: {}", pos)));
            if self.is_live(pos) {
                continue;
            }
            self.bytes[pos as usize] |= LIVE;
            let (first, count) = self.references(pos);
            for i in 0..count {
                let referent = self.read_u32(first + 4 * i);
                if referent != NONE {
                    pending.push(referent);
                }
            }
        }
        Ok(())
    }

    /// Gives every live record its new position; returns the live byte count.
    fn plan(&mut self) -> u32 {
        let mut live = 0;
        let mut pos = 0;
        while pos < self.top {
            let size = self.record_size(pos);
            if self.is_live(pos) {
                self.write_u32(pos + TARGET, live);
                live += size;
            }
            pos += size;
        }
        live
    }

    fn forward(&self, pos: Position) -> Result<Position> {
        expect!(
            pos < self.top && self.is_live(pos),
            LispError::CorruptHeap(format!("reference to unmarked record at {}", pos))
        );
        Ok(self.read_u32(pos + TARGET))
    }

    fn relocate(&mut self) -> Result<()> {
        let mut pos = 0;
        while pos < self.top {
            let size = self.record_size(pos);
            if self.is_live(pos) {
                let (first, count) = self.references(pos);
                for field in (0..count).map(|i| first + 4 * i) {
                    let referent = self.read_u32(field);
                    if referent != NONE {
                        let target = self.forward(referent)?;
                        self.write_u32(field, target);
                    }
                }
            }
            pos += size;
        }
        for i in 0..self.roots.len() {
            self.roots[i] = self.forward(self.roots[i])?;
        }
        if self.symbols != NONE {
            self.symbols = self.forward(self.symbols)?;
        }
        Ok(())
    }

    // Keep-alive bits are never cleared here: pinned records stay where
    // they are for the life of the heap.
    fn slide(&mut self) {
        let mut pos = 0;
        while pos < self.top {
            let size = self.record_size(pos);
            if self.is_live(pos) {
                let target = self.read_u32(pos + TARGET);
                self.bytes[pos as usize] &= !LIVE;
                debug_assert!(self.bytes[pos as usize] & KEEP_ALIVE == 0 || target == pos);
                self.bytes.copy_within(pos as usize..(pos + size) as usize, target as usize);
            }
            pos += size;
        }
    }
}
