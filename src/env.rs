use crate::error::{SchemeError, SchemeResult};
use crate::store::{sym, ValueStore};
use crate::value::{Kind, Value};

/// The environment every chain ends in.
pub const EMPTY_ENV: Value = Value::Null;

/// Build a frame `(vars . vals)` and chain it in front of `base`.
/// `vars` and `vals` must be proper lists of the same length.
pub fn extend_environment(
    store: &mut ValueStore,
    vars: Value,
    vals: Value,
    base: Value,
) -> SchemeResult<Value> {
    let nvars = store.length(vars)?;
    let nvals = store.length(vals)?;
    if nvars != nvals {
        return Err(SchemeError::ArityMismatch {
            vars: nvars,
            vals: nvals,
        });
    }
    let frame = store.cons(vars, vals)?;
    store.cons(frame, base)
}

/// Walk one frame looking for `var`.
/// Returns the cell of the values list whose car holds the binding.
fn scan_frame(store: &ValueStore, var: Value, frame: Value) -> SchemeResult<Option<Value>> {
    let entry = store.cons_entry(frame)?;
    let mut vars = entry.car;
    let mut vals = entry.cdr;
    while !vars.is_null() {
        let var_entry = store.cons_entry(vars)?;
        if var_entry.car == var {
            return Ok(Some(vals));
        }
        vars = var_entry.cdr;
        vals = store.cdr(vals)?;
    }
    Ok(None)
}

/// Walk frames outward from `env`; returns the value cell of the nearest binding.
fn scan_environment(store: &ValueStore, var: Value, env: Value) -> SchemeResult<Option<Value>> {
    let mut current = env;
    while current != EMPTY_ENV {
        let entry = store.cons_entry(current)?;
        if let Some(cell) = scan_frame(store, var, entry.car)? {
            return Ok(Some(cell));
        }
        current = entry.cdr;
    }
    Ok(None)
}

/// Look up a binding, innermost frame first. `None` if unbound.
pub fn lookup_variable_value(
    store: &ValueStore,
    var: Value,
    env: Value,
) -> SchemeResult<Option<Value>> {
    if !var.is_symbol() {
        return Err(SchemeError::TypeMismatch {
            expected: Kind::Symbol,
            found: var.kind(),
        });
    }
    match scan_environment(store, var, env)? {
        Some(cell) => Ok(Some(store.car(cell)?)),
        None => Ok(None),
    }
}

/// Bind `var` in the innermost frame of `env`. Rebinding a name already in
/// that frame overwrites it in place; otherwise the binding is prepended.
pub fn define_variable(
    store: &mut ValueStore,
    var: Value,
    val: Value,
    env: Value,
) -> SchemeResult<Value> {
    let frame = store.car(env)?;
    if let Some(cell) = scan_frame(store, var, frame)? {
        store.set_car(cell, val)?;
    } else {
        let entry = *store.cons_entry(frame)?;
        let vars = store.cons(var, entry.car)?;
        let vals = store.cons(val, entry.cdr)?;
        let frame_entry = store.cons_entry_mut(frame)?;
        frame_entry.car = vars;
        frame_entry.cdr = vals;
    }
    Ok(Value::Symbol(sym::OK))
}

/// Overwrite the nearest binding of `var`. Fails if `var` is bound nowhere.
pub fn set_variable_value(
    store: &mut ValueStore,
    var: Value,
    val: Value,
    env: Value,
) -> SchemeResult<Value> {
    match scan_environment(store, var, env)? {
        Some(cell) => {
            store.set_car(cell, val)?;
            Ok(Value::Symbol(sym::OK))
        }
        None => Err(SchemeError::Unbound(store.symbol_name(var)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn num(n: i64) -> Value {
        Value::number(n).unwrap()
    }

    fn setup() -> (ValueStore, Value) {
        let mut store = ValueStore::new(&StoreConfig::default()).unwrap();
        let global = extend_environment(&mut store, Value::Null, Value::Null, EMPTY_ENV).unwrap();
        (store, global)
    }

    #[test]
    fn test_define_and_lookup() {
        let (mut store, global) = setup();
        let x = store.intern("x").unwrap();
        assert_eq!(lookup_variable_value(&store, x, global).unwrap(), None);
        define_variable(&mut store, x, num(1), global).unwrap();
        assert_eq!(lookup_variable_value(&store, x, global).unwrap(), Some(num(1)));
    }

    #[test]
    fn test_define_is_idempotent_per_frame() {
        let (mut store, global) = setup();
        let x = store.intern("x").unwrap();
        define_variable(&mut store, x, num(1), global).unwrap();
        define_variable(&mut store, x, num(2), global).unwrap();
        let frame = store.car(global).unwrap();
        assert_eq!(store.length(store.car(frame).unwrap()).unwrap(), 1);
        assert_eq!(store.length(store.cdr(frame).unwrap()).unwrap(), 1);
        assert_eq!(lookup_variable_value(&store, x, global).unwrap(), Some(num(2)));
    }

    #[test]
    fn test_inner_define_shadows_without_touching_outer() {
        let (mut store, global) = setup();
        let x = store.intern("x").unwrap();
        define_variable(&mut store, x, num(1), global).unwrap();
        let inner = extend_environment(&mut store, Value::Null, Value::Null, global).unwrap();
        define_variable(&mut store, x, num(2), inner).unwrap();
        assert_eq!(lookup_variable_value(&store, x, inner).unwrap(), Some(num(2)));
        assert_eq!(lookup_variable_value(&store, x, global).unwrap(), Some(num(1)));
    }

    #[test]
    fn test_set_mutates_nearest_binding() {
        let (mut store, global) = setup();
        let x = store.intern("x").unwrap();
        define_variable(&mut store, x, num(1), global).unwrap();
        let vars = store.list(&[x]).unwrap();
        let vals = store.list(&[num(2)]).unwrap();
        let middle = extend_environment(&mut store, vars, vals, global).unwrap();
        let inner = extend_environment(&mut store, Value::Null, Value::Null, middle).unwrap();

        set_variable_value(&mut store, x, num(3), inner).unwrap();
        assert_eq!(lookup_variable_value(&store, x, inner).unwrap(), Some(num(3)));
        assert_eq!(lookup_variable_value(&store, x, middle).unwrap(), Some(num(3)));
        assert_eq!(lookup_variable_value(&store, x, global).unwrap(), Some(num(1)));
    }

    #[test]
    fn test_set_unbound_fails() {
        let (mut store, global) = setup();
        let y = store.intern("y").unwrap();
        assert!(matches!(
            set_variable_value(&mut store, y, num(1), global),
            Err(SchemeError::Unbound(name)) if name == "y"
        ));
    }

    #[test]
    fn test_extend_rejects_length_mismatch() {
        let (mut store, global) = setup();
        let a = store.intern("a").unwrap();
        let b = store.intern("b").unwrap();
        let vars = store.list(&[a, b]).unwrap();
        let vals = store.list(&[num(1)]).unwrap();
        assert!(matches!(
            extend_environment(&mut store, vars, vals, global),
            Err(SchemeError::ArityMismatch { vars: 2, vals: 1 })
        ));
    }
}
