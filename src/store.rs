use std::mem;

use tracing::{debug, trace};

use crate::arena::{aligned_page_size, PageArena};
use crate::bytes::{ByteArena, ByteSpan};
use crate::config::StoreConfig;
use crate::error::{SchemeError, SchemeResult};
use crate::intern::InternTable;
use crate::value::{
    ClosureId, ConsId, DoubleId, Kind, PrimitiveId, StringId, SymbolId, Value,
};

/// Well-known symbol IDs, pre-interned when the store is created.
/// These must match the order of `WELL_KNOWN` below.
pub mod sym {
    use crate::value::SymbolId;

    pub const QUOTE: SymbolId = SymbolId(0);
    pub const DEFINE: SymbolId = SymbolId(1);
    pub const SET: SymbolId = SymbolId(2);
    pub const IF: SymbolId = SymbolId(3);
    pub const LAMBDA: SymbolId = SymbolId(4);
    pub const BEGIN: SymbolId = SymbolId(5);
    pub const OK: SymbolId = SymbolId(6);
    pub const TRUE: SymbolId = SymbolId(7);
    pub const FALSE: SymbolId = SymbolId(8);
    pub const TRUE_NAME: SymbolId = SymbolId(9);
    pub const FALSE_NAME: SymbolId = SymbolId(10);
}

const WELL_KNOWN: [&str; 11] = [
    "quote", "define", "set!", "if", "lambda", "begin", "ok", "#t", "#f", "true", "false",
];

/// A single cons cell.
#[derive(Clone, Copy, Debug)]
pub struct ConsEntry {
    pub car: Value,
    pub cdr: Value,
}

#[derive(Clone, Copy, Debug)]
pub struct SymbolEntry {
    pub text: ByteSpan,
}

#[derive(Clone, Copy, Debug)]
pub struct StringEntry {
    pub text: ByteSpan,
}

/// A user procedure: parameter list, body sequence and defining environment.
#[derive(Clone, Copy, Debug)]
pub struct ClosureEntry {
    pub params: Value,
    pub body: Value,
    pub env: Value,
}

/// Native procedure signature: evaluated arguments in, one value out.
pub type PrimitiveFn = fn(&mut ValueStore, &[Value]) -> SchemeResult<Value>;

#[derive(Clone, Copy)]
pub struct PrimitiveEntry {
    pub name: ByteSpan,
    pub func: PrimitiveFn,
}

/// Allocation counts per store, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub conses: u64,
    pub symbols: u64,
    pub strings: u64,
    pub closures: u64,
    pub primitives: u64,
    pub doubles: u64,
    pub cons_pages: usize,
    pub interned: usize,
    pub byte_pages: usize,
    pub large_regions: usize,
    /// Symbol and string text bumped out of byte pages.
    pub text_bytes: usize,
}

fn typed_arena<T>(requested: usize) -> SchemeResult<PageArena<T>> {
    PageArena::new(aligned_page_size(requested, mem::size_of::<T>()))
}

fn mismatch(expected: Kind, found: Value) -> SchemeError {
    SchemeError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

/// All runtime values that do not fit inline. One page arena per kind,
/// a byte arena for symbol and string text, and the symbol intern table.
pub struct ValueStore {
    conses: PageArena<ConsEntry>,
    symbols: PageArena<SymbolEntry>,
    strings: PageArena<StringEntry>,
    closures: PageArena<ClosureEntry>,
    primitives: PageArena<PrimitiveEntry>,
    doubles: PageArena<f64>,
    bytes: ByteArena,
    interned: InternTable<SymbolId>,
}

impl ValueStore {
    pub fn new(config: &StoreConfig) -> SchemeResult<Self> {
        let mut store = ValueStore {
            conses: typed_arena(config.cons_page_size)?,
            symbols: typed_arena(config.symbol_page_size)?,
            strings: typed_arena(config.string_page_size)?,
            closures: typed_arena(config.closure_page_size)?,
            primitives: typed_arena(config.primitive_page_size)?,
            doubles: typed_arena(config.double_page_size)?,
            bytes: ByteArena::new(config.byte_page_size)?,
            interned: InternTable::new(config.intern_buckets),
        };

        for (i, name) in WELL_KNOWN.iter().enumerate() {
            let id = store.intern_id(name)?;
            debug_assert_eq!(id, SymbolId(i as u64));
        }
        debug!(
            symbols = WELL_KNOWN.len(),
            buckets = store.interned.bucket_count(),
            large_threshold = store.bytes.large_threshold(),
            "Value store initialised"
        );
        Ok(store)
    }

    // === Cons cells ===

    pub fn allocate_cons(&mut self) -> SchemeResult<(Value, &mut ConsEntry)> {
        let (index, entry) = self.conses.allocate(ConsEntry {
            car: Value::Null,
            cdr: Value::Null,
        })?;
        Ok((Value::Cons(ConsId(index)), entry))
    }

    pub fn cons(&mut self, car: Value, cdr: Value) -> SchemeResult<Value> {
        let (value, entry) = self.allocate_cons()?;
        entry.car = car;
        entry.cdr = cdr;
        Ok(value)
    }

    pub fn cons_entry(&self, value: Value) -> SchemeResult<&ConsEntry> {
        match value {
            Value::Cons(ConsId(index)) => self.conses.get(index),
            other => Err(mismatch(Kind::Cons, other)),
        }
    }

    pub fn cons_entry_mut(&mut self, value: Value) -> SchemeResult<&mut ConsEntry> {
        match value {
            Value::Cons(ConsId(index)) => self.conses.get_mut(index),
            other => Err(mismatch(Kind::Cons, other)),
        }
    }

    #[inline]
    pub fn car(&self, value: Value) -> SchemeResult<Value> {
        Ok(self.cons_entry(value)?.car)
    }

    #[inline]
    pub fn cdr(&self, value: Value) -> SchemeResult<Value> {
        Ok(self.cons_entry(value)?.cdr)
    }

    pub fn set_car(&mut self, pair: Value, value: Value) -> SchemeResult<()> {
        self.cons_entry_mut(pair)?.car = value;
        Ok(())
    }

    pub fn set_cdr(&mut self, pair: Value, value: Value) -> SchemeResult<()> {
        self.cons_entry_mut(pair)?.cdr = value;
        Ok(())
    }

    pub fn cadr(&self, value: Value) -> SchemeResult<Value> {
        self.car(self.cdr(value)?)
    }

    pub fn cddr(&self, value: Value) -> SchemeResult<Value> {
        self.cdr(self.cdr(value)?)
    }

    pub fn caddr(&self, value: Value) -> SchemeResult<Value> {
        self.car(self.cddr(value)?)
    }

    pub fn cdddr(&self, value: Value) -> SchemeResult<Value> {
        self.cdr(self.cddr(value)?)
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> SchemeResult<Value> {
        let mut result = Value::Null;
        for &value in values.iter().rev() {
            result = self.cons(value, result)?;
        }
        Ok(result)
    }

    /// Length of a proper list. Fails on any tail that is not a pair or null.
    pub fn length(&self, list: Value) -> SchemeResult<usize> {
        let mut count = 0;
        let mut current = list;
        loop {
            match current {
                Value::Null => return Ok(count),
                Value::Cons(_) => {
                    count += 1;
                    current = self.cdr(current)?;
                }
                _ => return Err(SchemeError::MalformedList),
            }
        }
    }

    /// Collect a proper list into a Vec.
    pub fn list_to_vec(&self, list: Value) -> SchemeResult<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = list;
        loop {
            match current {
                Value::Null => return Ok(result),
                Value::Cons(_) => {
                    let entry = self.cons_entry(current)?;
                    result.push(entry.car);
                    current = entry.cdr;
                }
                _ => return Err(SchemeError::MalformedList),
            }
        }
    }

    // === Symbols ===

    fn intern_id(&mut self, name: &str) -> SchemeResult<SymbolId> {
        if let Some(id) = self.interned.get(name.as_bytes()) {
            return Ok(id);
        }
        let text = self.bytes.allocate_copy(name.as_bytes())?;
        let (index, _) = self.symbols.allocate(SymbolEntry { text })?;
        let id = SymbolId(index);
        self.interned.set(name.as_bytes(), id);
        trace!(symbol = name, index, "Interned symbol");
        Ok(id)
    }

    /// Intern a symbol name. The same text always yields the same value.
    pub fn intern(&mut self, name: &str) -> SchemeResult<Value> {
        self.intern_id(name).map(Value::Symbol)
    }

    pub fn symbol_entry(&self, value: Value) -> SchemeResult<&SymbolEntry> {
        match value {
            Value::Symbol(SymbolId(index)) => self.symbols.get(index),
            other => Err(mismatch(Kind::Symbol, other)),
        }
    }

    pub fn symbol_text(&self, value: Value) -> SchemeResult<&[u8]> {
        let entry = self.symbol_entry(value)?;
        Ok(self.bytes.bytes(entry.text))
    }

    /// Symbol text as an owned string, for messages and printing.
    pub fn symbol_name(&self, value: Value) -> SchemeResult<String> {
        Ok(String::from_utf8_lossy(self.symbol_text(value)?).into_owned())
    }

    // === Strings ===

    /// Allocate a zero-filled string of `len` bytes for the caller to fill in.
    pub fn allocate_string(&mut self, len: usize) -> SchemeResult<(Value, &mut [u8])> {
        let text = self.bytes.allocate(len)?;
        let (index, _) = self.strings.allocate(StringEntry { text })?;
        Ok((Value::String(StringId(index)), self.bytes.bytes_mut(text)))
    }

    pub fn string(&mut self, text: &str) -> SchemeResult<Value> {
        let (value, bytes) = self.allocate_string(text.len())?;
        bytes.copy_from_slice(text.as_bytes());
        Ok(value)
    }

    pub fn string_entry(&self, value: Value) -> SchemeResult<&StringEntry> {
        match value {
            Value::String(StringId(index)) => self.strings.get(index),
            other => Err(mismatch(Kind::String, other)),
        }
    }

    pub fn string_text(&self, value: Value) -> SchemeResult<&[u8]> {
        let entry = self.string_entry(value)?;
        Ok(self.bytes.bytes(entry.text))
    }

    // === Doubles ===

    pub fn double(&mut self, x: f64) -> SchemeResult<Value> {
        let (index, _) = self.doubles.allocate(x)?;
        Ok(Value::Double(DoubleId(index)))
    }

    pub fn double_value(&self, value: Value) -> SchemeResult<f64> {
        match value {
            Value::Double(DoubleId(index)) => self.doubles.get(index).copied(),
            other => Err(mismatch(Kind::Double, other)),
        }
    }

    // === Closures ===

    pub fn allocate_closure(&mut self) -> SchemeResult<(Value, &mut ClosureEntry)> {
        let (index, entry) = self.closures.allocate(ClosureEntry {
            params: Value::Null,
            body: Value::Null,
            env: Value::Null,
        })?;
        Ok((Value::Closure(ClosureId(index)), entry))
    }

    pub fn closure(&mut self, params: Value, body: Value, env: Value) -> SchemeResult<Value> {
        let (value, entry) = self.allocate_closure()?;
        *entry = ClosureEntry { params, body, env };
        Ok(value)
    }

    pub fn closure_entry(&self, value: Value) -> SchemeResult<&ClosureEntry> {
        match value {
            Value::Closure(ClosureId(index)) => self.closures.get(index),
            other => Err(mismatch(Kind::Closure, other)),
        }
    }

    // === Primitives ===

    /// Register a native procedure. It becomes visible through `primitives()`
    /// so an environment bootstrapper can bind it under `name`.
    pub fn install_primitive(&mut self, name: &str, func: PrimitiveFn) -> SchemeResult<Value> {
        let text = self.bytes.allocate_copy(name.as_bytes())?;
        let (index, _) = self.primitives.allocate(PrimitiveEntry { name: text, func })?;
        debug!(primitive = name, index, "Installed primitive");
        Ok(Value::Primitive(PrimitiveId(index)))
    }

    pub fn primitive_entry(&self, value: Value) -> SchemeResult<&PrimitiveEntry> {
        match value {
            Value::Primitive(PrimitiveId(index)) => self.primitives.get(index),
            other => Err(mismatch(Kind::Primitive, other)),
        }
    }

    pub fn primitive_name(&self, value: Value) -> SchemeResult<String> {
        let entry = self.primitive_entry(value)?;
        Ok(String::from_utf8_lossy(self.bytes.bytes(entry.name)).into_owned())
    }

    /// Every installed primitive with its name, in installation order.
    pub fn primitives(&self) -> Vec<(Value, String)> {
        self.primitives
            .iter()
            .map(|(index, entry)| {
                let name = String::from_utf8_lossy(self.bytes.bytes(entry.name)).into_owned();
                (Value::Primitive(PrimitiveId(index)), name)
            })
            .collect()
    }

    // === Booleans ===

    /// Everything except the `#f` symbol is true.
    #[inline]
    pub fn is_true(&self, value: Value) -> bool {
        value != Value::Symbol(sym::FALSE)
    }

    pub fn boolean(&self, b: bool) -> Value {
        Value::Symbol(if b { sym::TRUE } else { sym::FALSE })
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            conses: self.conses.count(),
            symbols: self.symbols.count(),
            strings: self.strings.count(),
            closures: self.closures.count(),
            primitives: self.primitives.count(),
            doubles: self.doubles.count(),
            cons_pages: self.conses.page_count(),
            interned: self.interned.count(),
            byte_pages: self.bytes.page_count(),
            large_regions: self.bytes.large_count(),
            text_bytes: self.bytes.total_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ValueStore {
        ValueStore::new(&StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_well_known_symbols() {
        let mut store = store();
        assert_eq!(store.intern("quote").unwrap(), Value::Symbol(sym::QUOTE));
        assert_eq!(store.intern("set!").unwrap(), Value::Symbol(sym::SET));
        assert_eq!(store.intern("#f").unwrap(), Value::Symbol(sym::FALSE));
        assert_eq!(store.symbol_text(Value::Symbol(sym::LAMBDA)).unwrap(), b"lambda");
    }

    #[test]
    fn test_interning_is_identity() {
        let mut store = store();
        let a = store.intern("hello").unwrap();
        let owned = String::from("hel") + "lo";
        let b = store.intern(&owned).unwrap();
        let c = store.intern("hellO").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.stats().interned, store.stats().symbols as usize);
    }

    #[test]
    fn test_cons_mutation_is_shared() {
        let mut store = store();
        let one = Value::number(1).unwrap();
        let two = Value::number(2).unwrap();
        let pair = store.cons(one, two).unwrap();
        let alias = pair;
        store.set_car(alias, two).unwrap();
        assert_eq!(store.car(pair).unwrap(), two);
        assert_eq!(store.cdr(pair).unwrap(), two);
    }

    #[test]
    fn test_entry_access_checks_kind() {
        let mut store = store();
        let s = store.intern("x").unwrap();
        assert!(matches!(
            store.car(s),
            Err(SchemeError::TypeMismatch {
                expected: Kind::Cons,
                found: Kind::Symbol
            })
        ));
        assert!(store.symbol_entry(Value::Null).is_err());
        assert!(store.closure_entry(s).is_err());
    }

    #[test]
    fn test_list_helpers() {
        let mut store = store();
        let items: Vec<Value> = (1..=4).map(|n| Value::number(n).unwrap()).collect();
        let list = store.list(&items).unwrap();
        assert_eq!(store.length(list).unwrap(), 4);
        assert_eq!(store.list_to_vec(list).unwrap(), items);
        assert_eq!(store.caddr(list).unwrap(), items[2]);

        let improper = store.cons(items[0], items[1]).unwrap();
        assert!(matches!(store.length(improper), Err(SchemeError::MalformedList)));
    }

    #[test]
    fn test_strings_and_doubles() {
        let mut store = store();
        let s = store.string("héllo").unwrap();
        assert_eq!(store.string_text(s).unwrap(), "héllo".as_bytes());
        let d = store.double(2.5).unwrap();
        assert_eq!(store.double_value(d).unwrap(), 2.5);
        assert!(store.double_value(s).is_err());
    }

    #[test]
    fn test_primitive_registration() {
        fn ident(_: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
            Ok(args[0])
        }
        let mut store = store();
        let p = store.install_primitive("ident", ident).unwrap();
        assert_eq!(store.primitive_name(p).unwrap(), "ident");
        assert_eq!(store.primitives(), vec![(p, "ident".to_string())]);
        let func = store.primitive_entry(p).unwrap().func;
        let one = Value::number(1).unwrap();
        assert_eq!(func(&mut store, &[one]).unwrap(), one);
    }

    #[test]
    fn test_truthiness() {
        let store = store();
        assert!(!store.is_true(Value::Symbol(sym::FALSE)));
        assert!(store.is_true(Value::Symbol(sym::TRUE)));
        assert!(store.is_true(Value::Null));
        assert!(store.is_true(Value::number(0).unwrap()));
    }
}
