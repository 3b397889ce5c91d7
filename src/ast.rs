use std::fmt;
use std::sync::Arc;

use crate::eval::Value;
use crate::ops::Grammar;

/// One step of a postfix instruction stream. Every complete stream pushes
/// exactly one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Number(f64),
    Str(String),
    Bool(bool),
    Var(String),
    Member(String),
    Index,
    /// A nested stream. It is pushed unevaluated and run when an operator
    /// needs its value, so lazy operands only run when chosen.
    Expr(Vec<Instruction>),
    Unary(String),
    Binary(String),
    Ternary(String),
    Call(usize),
    Array(usize),
    EndStatement,
}

impl Instruction {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Instruction::Number(_) | Instruction::Str(_) | Instruction::Bool(_)
        )
    }

    pub fn literal(value: &Value) -> Option<Instruction> {
        match value {
            Value::Number(n) => Some(Instruction::Number(*n)),
            Value::String(s) => Some(Instruction::Str(s.clone())),
            Value::Bool(b) => Some(Instruction::Bool(*b)),
            _ => None,
        }
    }
}

/// A parsed expression: its instruction stream plus the grammar it was
/// parsed with. Transformations return new expressions sharing the grammar.
#[derive(Clone)]
pub struct Expression {
    pub(crate) code: Vec<Instruction>,
    pub(crate) grammar: Arc<Grammar>,
}

impl Expression {
    pub(crate) fn new(code: Vec<Instruction>, grammar: Arc<Grammar>) -> Self {
        Self { code, grammar }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.code).finish()
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

/// Renders fully parenthesised source text that parses back to an
/// equivalent expression under the same grammar.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stringify(&self.code, &self.grammar))
    }
}

fn stringify(code: &[Instruction], grammar: &Grammar) -> String {
    let mut stack: Vec<String> = Vec::new();
    let mut statements: Vec<String> = Vec::new();
    let pop = |stack: &mut Vec<String>| stack.pop().unwrap_or_default();

    for ins in code {
        match ins {
            Instruction::Number(n) => stack.push(number_text(*n)),
            Instruction::Str(s) => stack.push(quote(s)),
            Instruction::Bool(b) => stack.push(b.to_string()),
            Instruction::Var(name) => stack.push(name.clone()),
            Instruction::Member(name) => {
                let target = pop(&mut stack);
                // `5.length` would lex as the number `5.`
                if target.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
                    stack.push(format!("({target}).{name}"));
                } else {
                    stack.push(format!("{target}.{name}"));
                }
            }
            Instruction::Index => {
                let index = pop(&mut stack);
                let target = pop(&mut stack);
                stack.push(format!("{target}[{index}]"));
            }
            Instruction::Expr(inner) => stack.push(format!("({})", stringify(inner, grammar))),
            Instruction::Unary(op) => {
                let operand = pop(&mut stack);
                let wordy = op.chars().any(|c| grammar.is_ident_char(c));
                if wordy {
                    stack.push(format!("({op}({operand}))"));
                } else {
                    stack.push(format!("({op}{operand})"));
                }
            }
            Instruction::Binary(op) => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                stack.push(format!("({lhs} {op} {rhs})"));
            }
            Instruction::Ternary(op) => {
                let separator = grammar
                    .ternary()
                    .map(|t| t.separator.as_str())
                    .unwrap_or(":");
                let otherwise = pop(&mut stack);
                let then = pop(&mut stack);
                let cond = pop(&mut stack);
                stack.push(format!("({cond} {op} {then} {separator} {otherwise})"));
            }
            Instruction::Call(argc) => {
                let args = stack.split_off(stack.len().saturating_sub(*argc));
                let callee = pop(&mut stack);
                stack.push(format!("{callee}({})", args.join(", ")));
            }
            Instruction::Array(len) => {
                let items = stack.split_off(stack.len().saturating_sub(*len));
                stack.push(format!("[{}]", items.join(", ")));
            }
            Instruction::EndStatement => statements.push(pop(&mut stack)),
        }
    }

    statements.extend(stack);
    statements.join("; ")
}

pub(crate) fn number_text(n: f64) -> String {
    if n.is_infinite() {
        if n > 0.0 { "(1 / 0)" } else { "(-1 / 0)" }.to_string()
    } else if n.is_sign_negative() && !n.is_nan() {
        format!("(-{})", -n)
    } else if n.is_nan() {
        "(0 / 0)".to_string()
    } else {
        n.to_string()
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_literals_are_grouped() {
        assert_eq!(number_text(-3.0), "(-3)");
        assert_eq!(number_text(2.5), "2.5");
        assert_eq!(number_text(f64::INFINITY), "(1 / 0)");
    }

    #[test]
    fn members_of_number_literals_are_grouped() {
        let grammar = Grammar::standard();
        let code = vec![Instruction::Number(5.0), Instruction::Member("length".into())];
        assert_eq!(stringify(&code, &grammar), "(5).length");
        let code = vec![Instruction::Var("xs".into()), Instruction::Member("length".into())];
        assert_eq!(stringify(&code, &grammar), "xs.length");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(quote("say \"hi\"\n"), r#""say \"hi\"\n""#);
    }

    #[test]
    fn postfix_stream_renders_infix() {
        let grammar = Grammar::standard();
        let code = vec![
            Instruction::Var("x".into()),
            Instruction::Number(2.0),
            Instruction::Unary("-".into()),
            Instruction::Binary("*".into()),
            Instruction::Var("max".into()),
            Instruction::Number(1.0),
            Instruction::Str("a".into()),
            Instruction::Call(2),
            Instruction::Binary("+".into()),
        ];
        assert_eq!(stringify(&code, &grammar), r#"((x * (-2)) + max(1, "a"))"#);
    }
}
