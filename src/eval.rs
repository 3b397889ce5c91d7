use std::collections::HashMap;
use std::fmt;

use crate::ast::{Expression, Instruction};
use crate::error::{EvalError, ParseError};
use crate::ops::{BinaryImpl, Function, Grammar, Logic};
use crate::parser::Parser;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
    Function(Function),
    Null,
}

/// Variable name to value.
pub type Bindings = HashMap<String, Value>;

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Function(_) => true,
            Value::Null => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Null => "null",
        }
    }

    /// Numeric view used by arithmetic operators; booleans count as 0/1.
    pub fn as_number(&self, operator: &str) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(EvalError::type_error(
                operator,
                format!("expected a number, got {}", other.type_name()),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(_) => f.write_str("[map]"),
            Value::Function(func) => write!(f, "[function {}]", func.name()),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// A stack entry: a value, a nested stream not yet run, or a name with no
/// binding. Unbound names only fail once something needs their value.
enum Slot<'c> {
    Value(Value),
    Deferred(&'c [Instruction]),
    Unbound(&'c str),
}

/// Runs instruction streams against one set of bindings.
pub struct Evaluator<'a> {
    grammar: &'a Grammar,
    bindings: &'a Bindings,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(grammar: &'a Grammar, bindings: &'a Bindings) -> Self {
        Self {
            grammar,
            bindings,
            max_depth: grammar.options().max_depth,
        }
    }

    pub fn run(&self, code: &[Instruction]) -> Result<Value, EvalError> {
        self.run_at(code, 0)
    }

    fn run_at(&self, code: &[Instruction], depth: usize) -> Result<Value, EvalError> {
        if depth > self.max_depth {
            return Err(EvalError::TooDeep(self.max_depth));
        }

        let mut stack: Vec<Slot<'_>> = Vec::with_capacity(code.len());
        for ins in code {
            match ins {
                Instruction::Number(n) => stack.push(Slot::Value(Value::Number(*n))),
                Instruction::Str(s) => stack.push(Slot::Value(Value::String(s.clone()))),
                Instruction::Bool(b) => stack.push(Slot::Value(Value::Bool(*b))),
                Instruction::Var(name) => stack.push(match self.lookup(name) {
                    Some(value) => Slot::Value(value),
                    None => Slot::Unbound(name.as_str()),
                }),
                Instruction::Expr(inner) => stack.push(Slot::Deferred(inner)),
                Instruction::Member(name) => {
                    let target = self.pop(&mut stack, depth)?;
                    stack.push(Slot::Value(member(target, name)?));
                }
                Instruction::Index => {
                    let index = self.pop(&mut stack, depth)?;
                    let target = self.pop(&mut stack, depth)?;
                    stack.push(Slot::Value(index_into(target, index)?));
                }
                Instruction::Unary(symbol) => {
                    let op = self
                        .grammar
                        .unary(symbol)
                        .ok_or_else(|| EvalError::UnknownOperator(symbol.clone()))?;
                    let operand = self.pop(&mut stack, depth)?;
                    stack.push(Slot::Value((op.func)(&operand)?));
                }
                Instruction::Binary(symbol) => {
                    let op = self
                        .grammar
                        .binary(symbol)
                        .ok_or_else(|| EvalError::UnknownOperator(symbol.clone()))?;
                    let rhs = pop_slot(&mut stack)?;
                    let lhs = self.pop(&mut stack, depth)?;
                    let value = match &op.imp {
                        BinaryImpl::Eager(f) => f(&lhs, &self.force(rhs, depth)?)?,
                        BinaryImpl::ShortCircuit(Logic::And) => Value::Bool(
                            lhs.is_truthy() && self.force(rhs, depth)?.is_truthy(),
                        ),
                        BinaryImpl::ShortCircuit(Logic::Or) => Value::Bool(
                            lhs.is_truthy() || self.force(rhs, depth)?.is_truthy(),
                        ),
                    };
                    stack.push(Slot::Value(value));
                }
                Instruction::Ternary(_) => {
                    let otherwise = pop_slot(&mut stack)?;
                    let then = pop_slot(&mut stack)?;
                    let cond = self.pop(&mut stack, depth)?;
                    let chosen = if cond.is_truthy() { then } else { otherwise };
                    stack.push(Slot::Value(self.force(chosen, depth)?));
                }
                Instruction::Call(argc) => {
                    let args = self.pop_many(&mut stack, *argc, depth)?;
                    let callee = match pop_slot(&mut stack)? {
                        Slot::Unbound(name) => {
                            return Err(EvalError::UnknownFunction(name.to_string()))
                        }
                        slot => self.force(slot, depth)?,
                    };
                    let Value::Function(func) = callee else {
                        return Err(EvalError::NotCallable(callee.type_name().to_string()));
                    };
                    stack.push(Slot::Value(func.call(&args)?));
                }
                Instruction::Array(len) => {
                    let items = self.pop_many(&mut stack, *len, depth)?;
                    stack.push(Slot::Value(Value::Array(items)));
                }
                Instruction::EndStatement => {
                    self.pop(&mut stack, depth)?;
                }
            }
        }

        if stack.len() != 1 {
            return Err(EvalError::Internal(format!(
                "stream left {} values on the stack",
                stack.len()
            )));
        }
        self.pop(&mut stack, depth)
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(func) = self.grammar.function(name) {
            return Some(Value::Function(func.clone()));
        }
        self.bindings.get(name).cloned()
    }

    fn force(&self, slot: Slot<'_>, depth: usize) -> Result<Value, EvalError> {
        match slot {
            Slot::Value(v) => Ok(v),
            Slot::Deferred(code) => self.run_at(code, depth + 1),
            Slot::Unbound(name) => Err(EvalError::UnboundVariable(name.to_string())),
        }
    }

    fn pop(&self, stack: &mut Vec<Slot<'_>>, depth: usize) -> Result<Value, EvalError> {
        let slot = pop_slot(stack)?;
        self.force(slot, depth)
    }

    fn pop_many(
        &self,
        stack: &mut Vec<Slot<'_>>,
        count: usize,
        depth: usize,
    ) -> Result<Vec<Value>, EvalError> {
        if stack.len() < count {
            return Err(EvalError::Internal("stack underflow".to_string()));
        }
        let slots = stack.split_off(stack.len() - count);
        slots.into_iter().map(|s| self.force(s, depth)).collect()
    }
}

fn pop_slot<'c>(stack: &mut Vec<Slot<'c>>) -> Result<Slot<'c>, EvalError> {
    stack
        .pop()
        .ok_or_else(|| EvalError::Internal("stack underflow".to_string()))
}

fn member(target: Value, name: &str) -> Result<Value, EvalError> {
    match target {
        Value::Map(mut map) => map
            .remove(name)
            .ok_or_else(|| EvalError::MissingMember(name.to_string())),
        Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
        other => Err(EvalError::type_error(
            ".",
            format!("{} has no member {name:?}", other.type_name()),
        )),
    }
}

fn index_into(target: Value, index: Value) -> Result<Value, EvalError> {
    match (target, index) {
        (Value::Map(mut map), Value::String(key)) => {
            map.remove(&key).ok_or(EvalError::MissingMember(key))
        }
        (Value::Array(mut items), Value::Number(n)) => {
            let len = items.len();
            if n < 0.0 || n.fract() != 0.0 || n as usize >= len {
                return Err(EvalError::IndexOutOfBounds {
                    index: n.max(0.0) as usize,
                    len,
                });
            }
            Ok(items.swap_remove(n as usize))
        }
        (target, index) => Err(EvalError::type_error(
            "[]",
            format!("cannot index {} with {}", target.type_name(), index.type_name()),
        )),
    }
}

impl Expression {
    /// Evaluates against `bindings`. Every free variable must be bound.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Value, EvalError> {
        Evaluator::new(&self.grammar, bindings).run(&self.code)
    }

    /// Folds every operation whose operands are known, given `bindings`.
    /// Variables without a binding are left in place.
    pub fn simplify(&self, bindings: &Bindings) -> Expression {
        Expression::new(simplify(&self.code, &self.grammar, bindings), self.grammar.clone())
    }

    /// Replaces every occurrence of the variable `name` with `with`.
    pub fn substitute(&self, name: &str, with: &Expression) -> Expression {
        let replacement = if with.code.contains(&Instruction::EndStatement) {
            vec![Instruction::Expr(with.code.clone())]
        } else {
            with.code.clone()
        };
        Expression::new(substitute(&self.code, name, &replacement), self.grammar.clone())
    }

    /// Like [`Expression::substitute`], parsing `text` with this expression's
    /// grammar.
    pub fn substitute_text(&self, name: &str, text: &str) -> Result<Expression, ParseError> {
        let code = Parser::new(text, &self.grammar).parse()?;
        Ok(self.substitute(name, &Expression::new(code, self.grammar.clone())))
    }

    /// Free variable names in first-use order, excluding functions.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_variables(&self.code, &self.grammar, &mut names);
        names
    }

    /// Pre-simplifies with `partial` and returns a closure taking the values
    /// of `params`, in order.
    pub fn bind(
        &self,
        params: &[&str],
        partial: &Bindings,
    ) -> impl Fn(&[Value]) -> Result<Value, EvalError> {
        let simplified = self.simplify(partial);
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        let partial = partial.clone();
        move |args: &[Value]| {
            if args.len() != params.len() {
                return Err(EvalError::Arity {
                    name: "bound expression".to_string(),
                    expected: crate::error::Arity::Exact(params.len()),
                    found: args.len(),
                });
            }
            let mut bindings = partial.clone();
            for (name, value) in params.iter().zip(args) {
                bindings.insert(name.clone(), value.clone());
            }
            simplified.evaluate(&bindings)
        }
    }
}

fn simplify(code: &[Instruction], grammar: &Grammar, bindings: &Bindings) -> Vec<Instruction> {
    // Each entry is a stream computing one stack value.
    let mut stack: Vec<Vec<Instruction>> = Vec::new();
    let mut done: Vec<Instruction> = Vec::new();
    let empty = Bindings::new();
    let fold = |parts: Vec<Vec<Instruction>>, op: Instruction| -> Vec<Instruction> {
        let all_literal = parts.iter().all(|p| p.len() == 1 && p[0].is_literal());
        let mut merged: Vec<Instruction> = parts.into_iter().flatten().collect();
        merged.push(op);
        if all_literal {
            let folded = Evaluator::new(grammar, &empty)
                .run(&merged)
                .ok()
                .and_then(|v| Instruction::literal(&v));
            if let Some(literal) = folded {
                return vec![literal];
            }
        }
        merged
    };

    for ins in code {
        match ins {
            Instruction::Var(name) if grammar.function(name).is_none() => {
                let literal = bindings.get(name).and_then(Instruction::literal);
                stack.push(vec![literal.unwrap_or_else(|| ins.clone())]);
            }
            Instruction::Expr(inner) => {
                let inner = simplify(inner, grammar, bindings);
                match <[Instruction; 1]>::try_from(inner) {
                    Ok([single]) if single.is_literal() => stack.push(vec![single]),
                    Ok([single]) => stack.push(vec![Instruction::Expr(vec![single])]),
                    Err(inner) => stack.push(vec![Instruction::Expr(inner)]),
                }
            }
            Instruction::Unary(_) | Instruction::Member(_) => {
                let a = stack.pop().unwrap_or_default();
                stack.push(fold(vec![a], ins.clone()));
            }
            Instruction::Binary(_) | Instruction::Index => {
                let b = stack.pop().unwrap_or_default();
                let a = stack.pop().unwrap_or_default();
                stack.push(fold(vec![a, b], ins.clone()));
            }
            Instruction::Ternary(_) => {
                let otherwise = stack.pop().unwrap_or_default();
                let then = stack.pop().unwrap_or_default();
                let cond = stack.pop().unwrap_or_default();
                let known = match cond.as_slice() {
                    [literal] if literal.is_literal() => Evaluator::new(grammar, &empty)
                        .run(&cond)
                        .ok()
                        .map(|v| v.is_truthy()),
                    _ => None,
                };
                match known {
                    Some(true) => stack.push(then),
                    Some(false) => stack.push(otherwise),
                    None => stack.push(fold(vec![cond, then, otherwise], ins.clone())),
                }
            }
            // Calls are never folded: bound callables may not be pure.
            Instruction::Call(argc) => merge(&mut stack, argc + 1, ins),
            Instruction::Array(len) => merge(&mut stack, *len, ins),
            Instruction::EndStatement => {
                done.extend(stack.pop().unwrap_or_default());
                done.push(Instruction::EndStatement);
            }
            _ => stack.push(vec![ins.clone()]),
        }
    }

    done.extend(stack.into_iter().flatten());
    done
}

fn merge(stack: &mut Vec<Vec<Instruction>>, operands: usize, op: &Instruction) {
    let parts = stack.split_off(stack.len().saturating_sub(operands));
    let mut merged: Vec<Instruction> = parts.into_iter().flatten().collect();
    merged.push(op.clone());
    stack.push(merged);
}

fn substitute(code: &[Instruction], name: &str, replacement: &[Instruction]) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(code.len());
    for ins in code {
        match ins {
            Instruction::Var(var) if var == name => out.extend_from_slice(replacement),
            Instruction::Expr(inner) => out.push(Instruction::Expr(substitute(inner, name, replacement))),
            other => out.push(other.clone()),
        }
    }
    out
}

fn collect_variables(code: &[Instruction], grammar: &Grammar, names: &mut Vec<String>) {
    for ins in code {
        match ins {
            Instruction::Var(name) if grammar.function(name).is_none() => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Instruction::Expr(inner) => collect_variables(inner, grammar, names),
            _ => {}
        }
    }
}
