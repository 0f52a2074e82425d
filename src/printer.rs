use crate::store::{sym, ValueStore};
use crate::value::Value;

/// Print a value to a string.
pub fn print_val(val: Value, store: &ValueStore) -> String {
    let mut out = String::new();
    print_inner(val, store, &mut out, 0);
    out
}

fn print_inner(val: Value, store: &ValueStore, out: &mut String, depth: usize) {
    if depth > 1000 {
        out.push_str("...");
        return;
    }

    match val {
        Value::Null => out.push_str("()"),
        Value::Number(n) => out.push_str(&n.get().to_string()),
        Value::Double(_) => match store.double_value(val) {
            Ok(x) => out.push_str(&format!("{:?}", x)),
            Err(_) => out.push_str("#<invalid double>"),
        },
        Value::Symbol(_) => match store.symbol_text(val) {
            Ok(text) => out.push_str(&String::from_utf8_lossy(text)),
            Err(_) => out.push_str("#<invalid symbol>"),
        },
        Value::String(_) => match store.string_text(val) {
            Ok(text) => print_string(&String::from_utf8_lossy(text), out),
            Err(_) => out.push_str("#<invalid string>"),
        },
        Value::Closure(_) => out.push_str("#<closure>"),
        Value::Primitive(_) => match store.primitive_name(val) {
            Ok(name) => {
                out.push_str("#<primitive ");
                out.push_str(&name);
                out.push('>');
            }
            Err(_) => out.push_str("#<primitive>"),
        },
        Value::Cons(_) => print_pair(val, store, out, depth),
    }
}

fn print_pair(val: Value, store: &ValueStore, out: &mut String, depth: usize) {
    let Ok(&entry) = store.cons_entry(val) else {
        out.push_str("#<invalid pair>");
        return;
    };

    // (quote x) -> 'x
    if entry.car == Value::Symbol(sym::QUOTE) {
        if let Ok(&rest) = store.cons_entry(entry.cdr) {
            if rest.cdr.is_null() {
                out.push('\'');
                print_inner(rest.car, store, out, depth + 1);
                return;
            }
        }
    }

    out.push('(');
    print_inner(entry.car, store, out, depth + 1);
    let mut current = entry.cdr;
    loop {
        match current {
            Value::Null => break,
            Value::Cons(_) => {
                let Ok(&next) = store.cons_entry(current) else {
                    break;
                };
                out.push(' ');
                print_inner(next.car, store, out, depth + 1);
                current = next.cdr;
            }
            tail => {
                out.push_str(" . ");
                print_inner(tail, store, out, depth + 1);
                break;
            }
        }
    }
    out.push(')');
}

fn print_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}
