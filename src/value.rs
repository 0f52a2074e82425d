use std::fmt;

/// Smallest integer representable inline: -2^60.
pub const FIXNUM_MIN: i64 = -(1 << 60);
/// Largest integer representable inline: 2^60 - 1.
pub const FIXNUM_MAX: i64 = (1 << 60) - 1;

/// Index of a cons cell in the cons store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsId(pub u64);

/// Index of an interned symbol in the symbol store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u64);

/// Index of a string in the string store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(pub u64);

/// Index of a closure in the closure store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureId(pub u64);

/// Index of a primitive in the primitive store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveId(pub u64);

/// Index of a boxed double in the double store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoubleId(pub u64);

/// An inline integer within `[FIXNUM_MIN, FIXNUM_MAX]`.
/// The field is private so the range can only be entered through `new`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fixnum(i64);

impl Fixnum {
    pub fn new(n: i64) -> Option<Self> {
        if (FIXNUM_MIN..=FIXNUM_MAX).contains(&n) {
            Some(Fixnum(n))
        } else {
            None
        }
    }

    #[inline]
    pub fn get(self) -> i64 {
        self.0
    }
}

/// The kind tag of a value. Determines which store an index refers to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Kind {
    Null,
    Number,
    Double,
    String,
    Symbol,
    Cons,
    Closure,
    Primitive,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Number => "number",
            Kind::Double => "double",
            Kind::String => "string",
            Kind::Symbol => "symbol",
            Kind::Cons => "pair",
            Kind::Closure => "closure",
            Kind::Primitive => "primitive",
        };
        f.write_str(name)
    }
}

/// The universal runtime handle. Copy semantics; the data lives in the store
/// selected by the variant, except for `Number` which is inline.
///
/// Equality is identity: two `Cons` values are equal only if they name the
/// same cell, and symbols compare equal because they are interned.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Value {
    #[default]
    Null,
    Number(Fixnum),
    Double(DoubleId),
    String(StringId),
    Symbol(SymbolId),
    Cons(ConsId),
    Closure(ClosureId),
    Primitive(PrimitiveId),
}

impl Value {
    /// Build an inline integer, or `None` if it does not fit in 60 bits.
    pub fn number(n: i64) -> Option<Value> {
        Fixnum::new(n).map(Value::Number)
    }

    pub fn kind(self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Number(_) => Kind::Number,
            Value::Double(_) => Kind::Double,
            Value::String(_) => Kind::String,
            Value::Symbol(_) => Kind::Symbol,
            Value::Cons(_) => Kind::Cons,
            Value::Closure(_) => Kind::Closure,
            Value::Primitive(_) => Kind::Primitive,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_cons(self) -> bool {
        matches!(self, Value::Cons(_))
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    /// Null, numbers, strings and doubles evaluate to themselves.
    pub fn is_self_evaluating(self) -> bool {
        matches!(
            self,
            Value::Null | Value::Number(_) | Value::String(_) | Value::Double(_)
        )
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Number(n) => write!(f, "Number({})", n.get()),
            Value::Double(id) => write!(f, "Double({})", id.0),
            Value::String(id) => write!(f, "String({})", id.0),
            Value::Symbol(id) => write!(f, "Sym({})", id.0),
            Value::Cons(id) => write!(f, "Cons({})", id.0),
            Value::Closure(id) => write!(f, "Closure({})", id.0),
            Value::Primitive(id) => write!(f, "Prim({})", id.0),
        }
    }
}

impl fmt::Debug for Fixnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixnum({})", self.0)
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Debug for ConsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsId({})", self.0)
    }
}

impl fmt::Debug for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringId({})", self.0)
    }
}

impl fmt::Debug for ClosureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClosureId({})", self.0)
    }
}

impl fmt::Debug for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimitiveId({})", self.0)
    }
}

impl fmt::Debug for DoubleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DoubleId({})", self.0)
    }
}
