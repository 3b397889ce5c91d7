//! Operator descriptors and the grammar configuration they make up.
//!
//! A [`Grammar`] is plain data: tables of unary, binary and ternary
//! operators (symbol, precedence, associativity, implementation), a function
//! table, named constants and a few tokenizer switches. Parsers hold one in an
//! `Arc` and every expression they produce shares it read-only.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Arity, EvalError};
use crate::eval::Value;

pub type UnaryFn = Arc<dyn Fn(&Value) -> Result<Value, EvalError> + Send + Sync>;
pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, EvalError> + Send + Sync>;
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Binding strengths used by [`Grammar::standard`]. Larger binds tighter.
pub mod precedence {
    pub const TERNARY: u8 = 5;
    pub const OR: u8 = 10;
    pub const AND: u8 = 20;
    pub const COMPARE: u8 = 30;
    pub const ADDITIVE: u8 = 40;
    pub const MULTIPLICATIVE: u8 = 50;
    pub const PREFIX: u8 = 60;
    pub const POWER: u8 = 70;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

/// How a binary operator combines its operands.
#[derive(Clone)]
pub enum BinaryImpl {
    Eager(BinaryFn),
    ShortCircuit(Logic),
}

#[derive(Clone)]
pub struct UnaryOp {
    pub symbol: String,
    pub precedence: u8,
    pub func: UnaryFn,
}

#[derive(Clone)]
pub struct BinaryOp {
    pub symbol: String,
    pub precedence: u8,
    pub assoc: Assoc,
    pub imp: BinaryImpl,
}

impl BinaryOp {
    pub fn is_lazy(&self) -> bool {
        matches!(self.imp, BinaryImpl::ShortCircuit(_))
    }
}

/// `cond ? a : b`. Always right-associative; only the chosen branch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TernaryOp {
    pub symbol: String,
    pub separator: String,
    pub precedence: u8,
}

/// A callable value: an entry of the function table or a caller-supplied
/// binding.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    arity: Arity,
    func: NativeFn,
}

impl Function {
    pub fn new<F>(name: &str, arity: Arity, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            arity,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        if !self.arity.accepts(args.len()) {
            return Err(EvalError::Arity {
                name: self.name.to_string(),
                expected: self.arity,
                found: args.len(),
            });
        }
        (self.func)(args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({}/{})", self.name, self.arity)
    }
}

/// Tokenizer and parser switches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GrammarOptions {
    pub extra_ident_chars: String,
    pub member_access: bool,
    pub array_literals: bool,
    pub max_depth: usize,
}

impl Default for GrammarOptions {
    fn default() -> Self {
        Self {
            extra_ident_chars: "$".to_string(),
            member_access: true,
            array_literals: true,
            max_depth: 64,
        }
    }
}

#[derive(Clone, Default)]
pub struct Grammar {
    unary: HashMap<String, UnaryOp>,
    binary: HashMap<String, BinaryOp>,
    ternary: Option<TernaryOp>,
    functions: HashMap<String, Function>,
    constants: HashMap<String, Value>,
    options: GrammarOptions,
    // Every operator spelling, longest first, for greedy matching.
    symbols: Vec<String>,
}

impl Grammar {
    pub fn empty() -> Self {
        Self::default().reindex()
    }

    /// Arithmetic, comparison, logic, string and math operators with
    /// calculator-style precedence.
    pub fn standard() -> Self {
        use precedence::*;

        let mut g = Self::empty()
            .with_ternary("?", ":", TERNARY)
            .with_short_circuit("or", OR, Logic::Or)
            .with_short_circuit("and", AND, Logic::And)
            .with_binary("==", COMPARE, Assoc::Left, |a, b| Ok(Value::Bool(a == b)))
            .with_binary("!=", COMPARE, Assoc::Left, |a, b| Ok(Value::Bool(a != b)))
            .with_binary("<", COMPARE, Assoc::Left, |a, b| compare("<", a, b, |o| o.is_lt()))
            .with_binary("<=", COMPARE, Assoc::Left, |a, b| compare("<=", a, b, |o| o.is_le()))
            .with_binary(">", COMPARE, Assoc::Left, |a, b| compare(">", a, b, |o| o.is_gt()))
            .with_binary(">=", COMPARE, Assoc::Left, |a, b| compare(">=", a, b, |o| o.is_ge()))
            .with_binary("in", COMPARE, Assoc::Left, contains)
            .with_binary("+", ADDITIVE, Assoc::Left, add)
            .with_binary("-", ADDITIVE, Assoc::Left, arith("-", |a, b| a - b))
            .with_binary("||", ADDITIVE, Assoc::Left, concat)
            .with_binary("*", MULTIPLICATIVE, Assoc::Left, arith("*", |a, b| a * b))
            .with_binary("/", MULTIPLICATIVE, Assoc::Left, arith("/", |a, b| a / b))
            .with_binary("%", MULTIPLICATIVE, Assoc::Left, arith("%", |a, b| a % b))
            .with_binary("^", POWER, Assoc::Right, arith("^", f64::powf))
            .with_unary("-", PREFIX, |v| Ok(Value::Number(-v.as_number("-")?)))
            .with_unary("+", PREFIX, |v| Ok(Value::Number(v.as_number("+")?)))
            .with_unary("!", PREFIX, |v| Ok(Value::Bool(!v.is_truthy())))
            .with_unary("not", PREFIX, |v| Ok(Value::Bool(!v.is_truthy())))
            .with_unary("length", PREFIX, length);

        let math: [(&'static str, fn(f64) -> f64); 19] = [
            ("abs", f64::abs),
            ("ceil", f64::ceil),
            ("floor", f64::floor),
            ("round", f64::round),
            ("trunc", f64::trunc),
            ("sqrt", f64::sqrt),
            ("cbrt", f64::cbrt),
            ("exp", f64::exp),
            ("ln", f64::ln),
            ("log", f64::ln),
            ("log2", f64::log2),
            ("log10", f64::log10),
            ("sign", sign),
            ("sin", f64::sin),
            ("cos", f64::cos),
            ("tan", f64::tan),
            ("asin", f64::asin),
            ("acos", f64::acos),
            ("atan", f64::atan),
        ];
        for (name, f) in math {
            g = g.with_unary(name, PREFIX, move |v| Ok(Value::Number(f(v.as_number(name)?))));
        }

        g.with_function("min", Arity::AtLeast(1), |args| fold_numbers("min", args, f64::min))
            .with_function("max", Arity::AtLeast(1), |args| fold_numbers("max", args, f64::max))
            .with_function("hypot", Arity::AtLeast(1), |args| {
                let sum = args.iter().try_fold(0.0, |acc, v| {
                    v.as_number("hypot").map(|n| acc + n * n)
                })?;
                Ok(Value::Number(sum.sqrt()))
            })
            .with_function("pow", Arity::Exact(2), |args| {
                Ok(Value::Number(args[0].as_number("pow")?.powf(args[1].as_number("pow")?)))
            })
            .with_function("atan2", Arity::Exact(2), |args| {
                Ok(Value::Number(args[0].as_number("atan2")?.atan2(args[1].as_number("atan2")?)))
            })
            .with_function("roundTo", Arity::Exact(2), |args| {
                let value = args[0].as_number("roundTo")?;
                let places = args[1].as_number("roundTo")?;
                let scale = 10f64.powf(places.trunc());
                Ok(Value::Number((value * scale).round() / scale))
            })
            .with_function("clamp", Arity::Exact(3), |args| {
                let value = args[0].as_number("clamp")?;
                let lo = args[1].as_number("clamp")?;
                let hi = args[2].as_number("clamp")?;
                if lo.is_nan() || hi.is_nan() {
                    return Err(EvalError::type_error("clamp", "bounds must be numbers, got NaN"));
                }
                if lo > hi {
                    return Err(EvalError::type_error("clamp", "lower bound exceeds upper bound"));
                }
                Ok(Value::Number(value.clamp(lo, hi)))
            })
            .with_constant("PI", Value::Number(std::f64::consts::PI))
            .with_constant("E", Value::Number(std::f64::consts::E))
            .with_constant("true", Value::Bool(true))
            .with_constant("false", Value::Bool(false))
    }

    pub fn with_options(mut self, options: GrammarOptions) -> Self {
        self.options = options;
        self.reindex()
    }

    pub fn with_unary<F>(mut self, symbol: &str, precedence: u8, func: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.unary.insert(
            symbol.to_string(),
            UnaryOp {
                symbol: symbol.to_string(),
                precedence,
                func: Arc::new(func),
            },
        );
        self.reindex()
    }

    pub fn with_binary<F>(mut self, symbol: &str, precedence: u8, assoc: Assoc, func: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.binary.insert(
            symbol.to_string(),
            BinaryOp {
                symbol: symbol.to_string(),
                precedence,
                assoc,
                imp: BinaryImpl::Eager(Arc::new(func)),
            },
        );
        self.reindex()
    }

    pub fn with_short_circuit(mut self, symbol: &str, precedence: u8, logic: Logic) -> Self {
        self.binary.insert(
            symbol.to_string(),
            BinaryOp {
                symbol: symbol.to_string(),
                precedence,
                assoc: Assoc::Left,
                imp: BinaryImpl::ShortCircuit(logic),
            },
        );
        self.reindex()
    }

    pub fn with_ternary(mut self, symbol: &str, separator: &str, precedence: u8) -> Self {
        self.ternary = Some(TernaryOp {
            symbol: symbol.to_string(),
            separator: separator.to_string(),
            precedence,
        });
        self.reindex()
    }

    pub fn with_function<F>(mut self, name: &str, arity: Arity, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.to_string(), Function::new(name, arity, func));
        self
    }

    pub fn with_constant(mut self, name: &str, value: Value) -> Self {
        self.constants.insert(name.to_string(), value);
        self
    }

    pub fn options(&self) -> &GrammarOptions {
        &self.options
    }

    pub fn unary(&self, symbol: &str) -> Option<&UnaryOp> {
        self.unary.get(symbol)
    }

    pub fn binary(&self, symbol: &str) -> Option<&BinaryOp> {
        self.binary.get(symbol)
    }

    pub fn ternary(&self) -> Option<&TernaryOp> {
        self.ternary.as_ref()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    pub(crate) fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub(crate) fn is_ident_start(&self, c: char) -> bool {
        c.is_alphabetic() || c == '_' || self.options.extra_ident_chars.contains(c)
    }

    pub(crate) fn is_ident_char(&self, c: char) -> bool {
        c.is_alphanumeric() || c == '_' || self.options.extra_ident_chars.contains(c)
    }

    fn reindex(mut self) -> Self {
        let mut symbols: Vec<String> = self
            .unary
            .keys()
            .chain(self.binary.keys())
            .cloned()
            .collect();
        if let Some(t) = &self.ternary {
            symbols.push(t.symbol.clone());
            symbols.push(t.separator.clone());
        }
        if self.options.member_access {
            symbols.push(".".to_string());
        }
        symbols.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        symbols.dedup();
        self.symbols = symbols;
        self
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("symbols", &self.symbols)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

fn sign(n: f64) -> f64 {
    if n == 0.0 || n.is_nan() {
        n
    } else {
        n.signum()
    }
}

fn arith(
    symbol: &'static str,
    f: fn(f64, f64) -> f64,
) -> impl Fn(&Value, &Value) -> Result<Value, EvalError> + Send + Sync + 'static {
    move |a, b| Ok(Value::Number(f(a.as_number(symbol)?, b.as_number(symbol)?)))
}

fn add(a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{x}{y}"))),
        _ => Ok(Value::Number(a.as_number("+")? + b.as_number("+")?)),
    }
}

fn concat(a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            Ok(Value::Array(x.iter().chain(y.iter()).cloned().collect()))
        }
        (Value::Array(_), _) | (_, Value::Array(_)) => {
            Err(EvalError::type_error("||", "cannot concatenate an array with a scalar"))
        }
        _ => Ok(Value::String(format!("{a}{b}"))),
    }
}

fn contains(a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (_, Value::Array(items)) => Ok(Value::Bool(items.contains(a))),
        (Value::String(needle), Value::String(hay)) => Ok(Value::Bool(hay.contains(needle.as_str()))),
        (Value::String(key), Value::Map(map)) => Ok(Value::Bool(map.contains_key(key))),
        _ => Err(EvalError::type_error("in", format!("cannot search in {}", b.type_name()))),
    }
}

fn compare(
    symbol: &str,
    a: &Value,
    b: &Value,
    test: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.as_number(symbol)?.partial_cmp(&b.as_number(symbol)?),
    };
    Ok(Value::Bool(ordering.is_some_and(test)))
}

fn length(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::Array(items) => Ok(Value::Number(items.len() as f64)),
        other => Err(EvalError::type_error(
            "length",
            format!("{} has no length", other.type_name()),
        )),
    }
}

fn fold_numbers(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let mut numbers = args.iter().map(|v| v.as_number(name));
    let first = numbers
        .next()
        .ok_or_else(|| EvalError::type_error(name, "needs at least one argument"))??;
    numbers
        .try_fold(first, |acc, n| n.map(|n| f(acc, n)))
        .map(Value::Number)
}
