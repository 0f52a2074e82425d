use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::InterpreterConfig;
use crate::env::{
    define_variable, extend_environment, lookup_variable_value, set_variable_value, EMPTY_ENV,
};
use crate::error::{SchemeError, SchemeResult};
use crate::primitives;
use crate::reader;
use crate::store::{sym, PrimitiveFn, StoreStats, ValueStore};
use crate::value::{SymbolId, Value};

/// Evaluated operands of one application.
type Operands = SmallVec<[Value; 4]>;

/// Work left pending while a subexpression is evaluated. Each variant
/// receives that subexpression's value when it is popped.
enum Continuation {
    /// `(if ...)` waiting on its predicate.
    Branch { form: Value, env: Value },
    /// Body expressions still to run after the current one.
    Sequence { rest: Value, env: Value },
    /// `(define var ...)` waiting on its value.
    Define { var: Value, env: Value },
    /// `(set! var ...)` waiting on its value.
    Assign { var: Value, env: Value },
    /// Operator waiting to be evaluated, operands untouched.
    Operator { operands: Value, env: Value },
    /// Operand waiting to be evaluated, `args` holding the ones before it.
    Operand {
        op: Value,
        args: Operands,
        rest: Value,
        env: Value,
    },
}

/// Result of a single evaluation step.
enum Step {
    /// Evaluate an expression in an environment.
    Eval(Value, Value),
    /// Hand a value to the innermost pending continuation.
    Return(Value),
}

/// One interpreter session: the value store and the global environment
/// built on top of it.
pub struct Interpreter {
    pub store: ValueStore,
    global_env: Value,
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> SchemeResult<Self> {
        let mut store = ValueStore::new(&config.store)?;
        primitives::install_all(&mut store)?;

        let global_env = extend_environment(&mut store, Value::Null, Value::Null, EMPTY_ENV)?;
        let installed = store.primitives();
        for (value, name) in &installed {
            let var = store.intern(name)?;
            define_variable(&mut store, var, *value, global_env)?;
        }
        define_variable(
            &mut store,
            Value::Symbol(sym::TRUE_NAME),
            Value::Symbol(sym::TRUE),
            global_env,
        )?;
        define_variable(
            &mut store,
            Value::Symbol(sym::FALSE_NAME),
            Value::Symbol(sym::FALSE),
            global_env,
        )?;

        debug!(
            primitives = installed.len(),
            max_operands = config.max_operands,
            max_depth = config.max_depth,
            "Interpreter ready"
        );
        Ok(Interpreter {
            store,
            global_env,
            config,
        })
    }

    pub fn global_env(&self) -> Value {
        self.global_env
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Register a native procedure and bind it in the global environment.
    /// Later evaluations see it like any built-in.
    pub fn install_primitive(&mut self, name: &str, func: PrimitiveFn) -> SchemeResult<Value> {
        let value = self.store.install_primitive(name, func)?;
        let var = self.store.intern(name)?;
        define_variable(&mut self.store, var, value, self.global_env)?;
        Ok(value)
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Evaluate an expression in the global environment.
    pub fn eval(&mut self, expr: Value) -> SchemeResult<Value> {
        self.eval_in(expr, self.global_env)
    }

    /// Read and evaluate every expression in `source`, returning the last
    /// result (Null for empty input).
    pub fn eval_str(&mut self, source: &str) -> SchemeResult<Value> {
        let forms = reader::read_all(source, &mut self.store)?;
        let mut result = Value::Null;
        for form in forms {
            result = self.eval(form)?;
        }
        Ok(result)
    }

    /// The evaluator proper.
    ///
    /// Pending work lives on an explicit continuation stack rather than the
    /// native one. Tail positions (`if` branches, the last expression of a
    /// body, a closure application) push nothing, so tail calls run in
    /// constant space. Non-tail nesting is bounded by `max_depth`.
    pub fn eval_in(&mut self, expr: Value, env: Value) -> SchemeResult<Value> {
        let mut stack: Vec<Continuation> = Vec::new();
        let mut step = Step::Eval(expr, env);
        loop {
            step = match step {
                Step::Eval(expr, env) => self.dispatch(expr, env, &mut stack)?,
                Step::Return(value) => match stack.pop() {
                    Some(k) => self.resume(k, value, &mut stack)?,
                    None => return Ok(value),
                },
            };
        }
    }

    /// Take one step on `expr`: either produce its value or name the next
    /// expression to evaluate.
    fn dispatch(
        &mut self,
        expr: Value,
        env: Value,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        if expr.is_self_evaluating() {
            return Ok(Step::Return(expr));
        }
        match expr {
            Value::Symbol(_) => {
                return match lookup_variable_value(&self.store, expr, env)? {
                    Some(value) => Ok(Step::Return(value)),
                    None => Err(SchemeError::Unbound(self.store.symbol_name(expr)?)),
                };
            }
            Value::Closure(_) | Value::Primitive(_) => {
                return Err(SchemeError::BadForm(format!(
                    "cannot evaluate a {}",
                    expr.kind()
                )));
            }
            _ => {}
        }

        let head = self.store.car(expr)?;
        if let Value::Symbol(id) = head {
            match id {
                sym::QUOTE => return self.eval_quote(expr).map(Step::Return),
                sym::DEFINE => return self.eval_definition(expr, env, stack),
                sym::SET => return self.eval_assignment(expr, env, stack),
                sym::LAMBDA => return self.eval_lambda(expr, env).map(Step::Return),
                sym::IF => return self.eval_if(expr, env, stack),
                sym::BEGIN => {
                    let body = self.store.cdr(expr)?;
                    if body.is_null() {
                        return Err(SchemeError::BadForm("(begin) with no expressions".into()));
                    }
                    return self.eval_sequence(body, env, stack);
                }
                _ => {}
            }
        }

        // Application: operator first, then operands left to right
        let operands = self.store.cdr(expr)?;
        self.push(stack, Continuation::Operator { operands, env })?;
        Ok(Step::Eval(head, env))
    }

    /// Feed `value` to a popped continuation.
    fn resume(
        &mut self,
        k: Continuation,
        value: Value,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        match k {
            Continuation::Branch { form, env } => {
                if self.store.is_true(value) {
                    return Ok(Step::Eval(self.store.caddr(form)?, env));
                }
                let alternative = self.store.cdddr(form)?;
                if alternative.is_null() {
                    Ok(Step::Return(Value::Null))
                } else {
                    Ok(Step::Eval(self.store.car(alternative)?, env))
                }
            }
            Continuation::Sequence { rest, env } => self.eval_sequence(rest, env, stack),
            Continuation::Define { var, env } => {
                define_variable(&mut self.store, var, value, env).map(Step::Return)
            }
            Continuation::Assign { var, env } => {
                set_variable_value(&mut self.store, var, value, env).map(Step::Return)
            }
            Continuation::Operator { operands, env } => {
                self.next_operand(value, Operands::new(), operands, env, stack)
            }
            Continuation::Operand {
                op,
                mut args,
                rest,
                env,
            } => {
                args.push(value);
                self.next_operand(op, args, rest, env, stack)
            }
        }
    }

    fn push(&self, stack: &mut Vec<Continuation>, k: Continuation) -> SchemeResult<()> {
        if stack.len() >= self.config.max_depth {
            return Err(SchemeError::RecursionDepth {
                max: self.config.max_depth,
            });
        }
        stack.push(k);
        Ok(())
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn expect_shape(&self, expr: Value, form: SymbolId, len: usize) -> SchemeResult<()> {
        if self.store.length(expr)? != len {
            return Err(SchemeError::BadForm(format!(
                "malformed ({} ...)",
                self.store.symbol_name(Value::Symbol(form))?
            )));
        }
        Ok(())
    }

    /// (quote x)
    fn eval_quote(&self, expr: Value) -> SchemeResult<Value> {
        self.expect_shape(expr, sym::QUOTE, 2)?;
        self.store.cadr(expr)
    }

    /// (define name expr) or (define (name params...) body...)
    fn eval_definition(
        &mut self,
        expr: Value,
        env: Value,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        let target = self.store.cadr(expr)?;
        match target {
            Value::Symbol(_) => {
                self.expect_shape(expr, sym::DEFINE, 3)?;
                let value_expr = self.store.caddr(expr)?;
                self.push(stack, Continuation::Define { var: target, env })?;
                Ok(Step::Eval(value_expr, env))
            }
            Value::Cons(_) => {
                let name = self.store.car(target)?;
                if !name.is_symbol() {
                    return Err(SchemeError::BadForm(format!(
                        "cannot define a {}",
                        name.kind()
                    )));
                }
                let params = self.store.cdr(target)?;
                let body = self.store.cddr(expr)?;
                let closure = self.make_closure(params, body, env)?;
                define_variable(&mut self.store, name, closure, env).map(Step::Return)
            }
            other => Err(SchemeError::BadForm(format!(
                "cannot define a {}",
                other.kind()
            ))),
        }
    }

    /// (set! name expr)
    fn eval_assignment(
        &mut self,
        expr: Value,
        env: Value,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        self.expect_shape(expr, sym::SET, 3)?;
        let target = self.store.cadr(expr)?;
        if !target.is_symbol() {
            return Err(SchemeError::BadForm(format!(
                "cannot set! a {}",
                target.kind()
            )));
        }
        let value_expr = self.store.caddr(expr)?;
        self.push(stack, Continuation::Assign { var: target, env })?;
        Ok(Step::Eval(value_expr, env))
    }

    /// (lambda (params...) body...)
    fn eval_lambda(&mut self, expr: Value, env: Value) -> SchemeResult<Value> {
        let params = self.store.cadr(expr)?;
        let body = self.store.cddr(expr)?;
        self.make_closure(params, body, env)
    }

    fn make_closure(&mut self, params: Value, body: Value, env: Value) -> SchemeResult<Value> {
        for param in self.store.list_to_vec(params)? {
            if !param.is_symbol() {
                return Err(SchemeError::BadForm(format!(
                    "lambda parameter must be a symbol, got {}",
                    param.kind()
                )));
            }
        }
        if self.store.length(body)? == 0 {
            return Err(SchemeError::BadForm("lambda with an empty body".into()));
        }
        self.store.closure(params, body, env)
    }

    /// (if p c [a]): evaluates the predicate, leaving the branch choice to
    /// `Continuation::Branch`. A missing alternative is Null.
    fn eval_if(
        &mut self,
        expr: Value,
        env: Value,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        let len = self.store.length(expr)?;
        if len != 3 && len != 4 {
            return Err(SchemeError::BadForm("malformed (if ...)".into()));
        }
        let test = self.store.cadr(expr)?;
        self.push(stack, Continuation::Branch { form: expr, env })?;
        Ok(Step::Eval(test, env))
    }

    /// Evaluate a non-empty body. Only expressions with more following them
    /// leave a continuation, so the last one runs in tail position.
    fn eval_sequence(
        &mut self,
        body: Value,
        env: Value,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        if !body.is_cons() {
            return Err(SchemeError::MalformedList);
        }
        let entry = *self.store.cons_entry(body)?;
        if !entry.cdr.is_null() {
            self.push(
                stack,
                Continuation::Sequence {
                    rest: entry.cdr,
                    env,
                },
            )?;
        }
        Ok(Step::Eval(entry.car, env))
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Start on the next operand, or apply `op` once none remain.
    fn next_operand(
        &mut self,
        op: Value,
        args: Operands,
        rest: Value,
        env: Value,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        if rest.is_null() {
            return self.apply(op, args, stack);
        }
        if !rest.is_cons() {
            return Err(SchemeError::MalformedList);
        }
        if args.len() == self.config.max_operands {
            return Err(SchemeError::OperandOverflow {
                max: self.config.max_operands,
            });
        }
        let entry = *self.store.cons_entry(rest)?;
        self.push(
            stack,
            Continuation::Operand {
                op,
                args,
                rest: entry.cdr,
                env,
            },
        )?;
        Ok(Step::Eval(entry.car, env))
    }

    fn apply(
        &mut self,
        op: Value,
        args: Operands,
        stack: &mut Vec<Continuation>,
    ) -> SchemeResult<Step> {
        trace!(op = ?op, argc = args.len(), "Apply");
        match op {
            Value::Closure(_) => {
                let closure = *self.store.closure_entry(op)?;
                let vals = self.store.list(&args)?;
                let env = extend_environment(&mut self.store, closure.params, vals, closure.env)?;
                self.eval_sequence(closure.body, env, stack)
            }
            Value::Primitive(_) => {
                let func = self.store.primitive_entry(op)?.func;
                func(&mut self.store, &args).map(Step::Return)
            }
            other => Err(SchemeError::NotApplicable(other.kind())),
        }
    }
}
