use crate::error::{SchemeError, SchemeResult};
use crate::store::{PrimitiveFn, ValueStore};
use crate::value::Value;

/// The native procedures bound in every global environment, by name.
pub const PRIMITIVES: &[(&str, PrimitiveFn)] = &[
    ("car", prim_car),
    ("cdr", prim_cdr),
    ("cons", prim_cons),
    ("list", prim_list),
    ("null?", prim_null),
    ("pair?", prim_pair),
    ("eq?", prim_eq),
    ("not", prim_not),
    ("+", prim_add),
    ("-", prim_sub),
    ("*", prim_mul),
    ("/", prim_div),
    ("=", prim_num_eq),
    ("<", prim_lt),
    (">", prim_gt),
    ("<=", prim_le),
    (">=", prim_ge),
];

/// Register every primitive with the store.
pub fn install_all(store: &mut ValueStore) -> SchemeResult<()> {
    for &(name, func) in PRIMITIVES {
        store.install_primitive(name, func)?;
    }
    Ok(())
}

fn expect_args(name: &str, args: &[Value], n: usize) -> SchemeResult<()> {
    if args.len() != n {
        return Err(SchemeError::TypeError(format!(
            "{} expects {} argument{}, got {}",
            name,
            n,
            if n == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

/// (car pair)
fn prim_car(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    expect_args("car", args, 1)?;
    store.car(args[0])
}

/// (cdr pair)
fn prim_cdr(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    expect_args("cdr", args, 1)?;
    store.cdr(args[0])
}

fn prim_cons(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    expect_args("cons", args, 2)?;
    store.cons(args[0], args[1])
}

fn prim_list(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    store.list(args)
}

fn prim_null(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    expect_args("null?", args, 1)?;
    Ok(store.boolean(args[0].is_null()))
}

fn prim_pair(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    expect_args("pair?", args, 1)?;
    Ok(store.boolean(args[0].is_cons()))
}

/// (eq? a b): pairs compare by cell, symbols by interned id.
fn prim_eq(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    expect_args("eq?", args, 2)?;
    Ok(store.boolean(args[0] == args[1]))
}

fn prim_not(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    expect_args("not", args, 1)?;
    Ok(store.boolean(!store.is_true(args[0])))
}

// === Arithmetic ===

#[derive(Clone, Copy, Debug, PartialEq)]
enum Num {
    Int(i64),
    Real(f64),
}

impl Num {
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Real(x) => x,
        }
    }
}

fn to_num(store: &ValueStore, name: &str, value: Value) -> SchemeResult<Num> {
    match value {
        Value::Number(n) => Ok(Num::Int(n.get())),
        Value::Double(_) => Ok(Num::Real(store.double_value(value)?)),
        other => Err(SchemeError::TypeError(format!(
            "{}: expected a number, got {}",
            name,
            other.kind()
        ))),
    }
}

fn from_num(store: &mut ValueStore, op: &str, n: Num) -> SchemeResult<Value> {
    match n {
        Num::Int(i) => Value::number(i)
            .ok_or_else(|| SchemeError::NumericRange(format!("{} overflowed: {}", op, i))),
        Num::Real(x) => store.double(x),
    }
}

fn combine(
    op: &str,
    a: Num,
    b: Num,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> SchemeResult<Num> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(x, y)
            .map(Num::Int)
            .ok_or_else(|| SchemeError::NumericRange(format!("{} overflowed", op))),
        _ => Ok(Num::Real(real_op(a.to_f64(), b.to_f64()))),
    }
}

fn fold_numbers(
    store: &mut ValueStore,
    op: &str,
    args: &[Value],
    identity: i64,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> SchemeResult<Value> {
    let mut acc = Num::Int(identity);
    for &arg in args {
        let n = to_num(store, op, arg)?;
        acc = combine(op, acc, n, int_op, real_op)?;
    }
    from_num(store, op, acc)
}

fn prim_add(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    fold_numbers(store, "+", args, 0, i64::checked_add, |a, b| a + b)
}

fn prim_mul(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    fold_numbers(store, "*", args, 1, i64::checked_mul, |a, b| a * b)
}

/// (- a) negates; (- a b ...) subtracts left to right.
fn prim_sub(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    match args {
        [] => Err(SchemeError::TypeError("- expects at least 1 argument".into())),
        [only] => {
            let n = to_num(store, "-", *only)?;
            let negated = combine("-", Num::Int(0), n, i64::checked_sub, |a, b| a - b)?;
            from_num(store, "-", negated)
        }
        [first, rest @ ..] => {
            let mut acc = to_num(store, "-", *first)?;
            for &arg in rest {
                let n = to_num(store, "-", arg)?;
                acc = combine("-", acc, n, i64::checked_sub, |a, b| a - b)?;
            }
            from_num(store, "-", acc)
        }
    }
}

/// Integer division stays integral when exact, otherwise yields a double.
fn divide(a: Num, b: Num) -> SchemeResult<Num> {
    match (a, b) {
        (Num::Int(_), Num::Int(0)) => Err(SchemeError::NumericRange("division by zero".into())),
        (Num::Int(x), Num::Int(y)) => match x.checked_rem(y) {
            Some(0) => x
                .checked_div(y)
                .map(Num::Int)
                .ok_or_else(|| SchemeError::NumericRange("/ overflowed".into())),
            _ => Ok(Num::Real(x as f64 / y as f64)),
        },
        _ => Ok(Num::Real(a.to_f64() / b.to_f64())),
    }
}

fn prim_div(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    match args {
        [] => Err(SchemeError::TypeError("/ expects at least 1 argument".into())),
        [only] => {
            let n = to_num(store, "/", *only)?;
            let result = divide(Num::Int(1), n)?;
            from_num(store, "/", result)
        }
        [first, rest @ ..] => {
            let mut acc = to_num(store, "/", *first)?;
            for &arg in rest {
                let n = to_num(store, "/", arg)?;
                acc = divide(acc, n)?;
            }
            from_num(store, "/", acc)
        }
    }
}

/// Chain a comparison across all adjacent argument pairs.
fn compare(
    store: &mut ValueStore,
    op: &str,
    args: &[Value],
    test: fn(f64, f64) -> bool,
    int_test: fn(i64, i64) -> bool,
) -> SchemeResult<Value> {
    if args.is_empty() {
        return Err(SchemeError::TypeError(format!(
            "{} expects at least 1 argument",
            op
        )));
    }
    let nums = args
        .iter()
        .map(|&arg| to_num(store, op, arg))
        .collect::<SchemeResult<Vec<_>>>()?;
    let holds = nums.windows(2).all(|pair| match (pair[0], pair[1]) {
        (Num::Int(a), Num::Int(b)) => int_test(a, b),
        (a, b) => test(a.to_f64(), b.to_f64()),
    });
    Ok(store.boolean(holds))
}

fn prim_num_eq(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    compare(store, "=", args, |a, b| a == b, |a, b| a == b)
}

fn prim_lt(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    compare(store, "<", args, |a, b| a < b, |a, b| a < b)
}

fn prim_gt(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    compare(store, ">", args, |a, b| a > b, |a, b| a > b)
}

fn prim_le(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    compare(store, "<=", args, |a, b| a <= b, |a, b| a <= b)
}

fn prim_ge(store: &mut ValueStore, args: &[Value]) -> SchemeResult<Value> {
    compare(store, ">=", args, |a, b| a >= b, |a, b| a >= b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::sym;
    use crate::value::FIXNUM_MAX;

    fn store() -> ValueStore {
        ValueStore::new(&StoreConfig::default()).unwrap()
    }

    fn num(n: i64) -> Value {
        Value::number(n).unwrap()
    }

    const T: Value = Value::Symbol(sym::TRUE);
    const F: Value = Value::Symbol(sym::FALSE);

    #[test]
    fn test_install_all_registers_every_name() {
        let mut store = store();
        install_all(&mut store).unwrap();
        let names: Vec<String> = store.primitives().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names.len(), PRIMITIVES.len());
        assert!(names.iter().any(|n| n == "car"));
        assert!(names.iter().any(|n| n == ">="));
    }

    #[test]
    fn test_pair_primitives() {
        let mut store = store();
        let pair = prim_cons(&mut store, &[num(1), num(2)]).unwrap();
        assert_eq!(prim_car(&mut store, &[pair]).unwrap(), num(1));
        assert_eq!(prim_cdr(&mut store, &[pair]).unwrap(), num(2));
        assert_eq!(prim_pair(&mut store, &[pair]).unwrap(), T);
        assert_eq!(prim_null(&mut store, &[Value::Null]).unwrap(), T);
        assert!(prim_car(&mut store, &[num(1)]).is_err());
        assert!(prim_car(&mut store, &[]).is_err());
    }

    #[test]
    fn test_integer_arithmetic() {
        let mut store = store();
        assert_eq!(prim_add(&mut store, &[num(2), num(3), num(4)]).unwrap(), num(9));
        assert_eq!(prim_add(&mut store, &[]).unwrap(), num(0));
        assert_eq!(prim_sub(&mut store, &[num(10), num(3), num(2)]).unwrap(), num(5));
        assert_eq!(prim_sub(&mut store, &[num(4)]).unwrap(), num(-4));
        assert_eq!(prim_mul(&mut store, &[num(6), num(7)]).unwrap(), num(42));
        assert_eq!(prim_div(&mut store, &[num(12), num(4)]).unwrap(), num(3));
    }

    #[test]
    fn test_inexact_division_and_promotion() {
        let mut store = store();
        let half = prim_div(&mut store, &[num(1), num(2)]).unwrap();
        assert_eq!(store.double_value(half).unwrap(), 0.5);
        let d = store.double(1.5).unwrap();
        let sum = prim_add(&mut store, &[num(1), d]).unwrap();
        assert_eq!(store.double_value(sum).unwrap(), 2.5);
    }

    #[test]
    fn test_numeric_range_is_checked() {
        let mut store = store();
        assert!(matches!(
            prim_add(&mut store, &[num(FIXNUM_MAX), num(1)]),
            Err(SchemeError::NumericRange(_))
        ));
        assert!(matches!(
            prim_div(&mut store, &[num(1), num(0)]),
            Err(SchemeError::NumericRange(_))
        ));
    }

    #[test]
    fn test_comparisons() {
        let mut store = store();
        assert_eq!(prim_num_eq(&mut store, &[num(1), num(1)]).unwrap(), T);
        assert_eq!(prim_lt(&mut store, &[num(1), num(2), num(3)]).unwrap(), T);
        assert_eq!(prim_lt(&mut store, &[num(1), num(3), num(2)]).unwrap(), F);
        assert_eq!(prim_ge(&mut store, &[num(3), num(3)]).unwrap(), T);
        let s = store.intern("a").unwrap();
        assert!(prim_lt(&mut store, &[s, num(1)]).is_err());
    }

    #[test]
    fn test_not_and_eq() {
        let mut store = store();
        assert_eq!(prim_not(&mut store, &[F]).unwrap(), T);
        assert_eq!(prim_not(&mut store, &[Value::Null]).unwrap(), F);
        let a = store.intern("a").unwrap();
        let b = store.intern("a").unwrap();
        assert_eq!(prim_eq(&mut store, &[a, b]).unwrap(), T);
        let p = store.cons(a, a).unwrap();
        let q = store.cons(a, a).unwrap();
        assert_eq!(prim_eq(&mut store, &[p, q]).unwrap(), F);
    }
}
