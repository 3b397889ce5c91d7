use std::collections::VecDeque;
use std::sync::Arc;

use crate::ast::{Expression, Instruction};
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind, Tokenizer};
use crate::ops::{Assoc, Grammar};

/// Parses expression text under one fixed [`Grammar`].
///
/// The grammar is shared by every [`Expression`] this parser produces, so
/// parsing the same text twice yields identical instruction streams.
#[derive(Debug, Clone)]
pub struct ExpressionParser {
    grammar: Arc<Grammar>,
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self::new(Grammar::standard())
    }
}

impl ExpressionParser {
    pub fn new(grammar: Grammar) -> Self {
        Self {
            grammar: Arc::new(grammar),
        }
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    pub fn parse(&self, text: &str) -> Result<Expression, ParseError> {
        let code = Parser::new(text, &self.grammar).parse()?;
        Ok(Expression::new(code, Arc::clone(&self.grammar)))
    }
}

pub(crate) struct Parser<'a> {
    lexer: Tokenizer<'a>,
    buffer: VecDeque<Token>,
    grammar: &'a Grammar,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(input: &'a str, grammar: &'a Grammar) -> Self {
        Self {
            lexer: Tokenizer::new(input, grammar),
            buffer: VecDeque::new(),
            grammar,
            depth: 0,
        }
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.buffer.is_empty() {
            // The lexer yields `Eof` exactly once; `consume` never pops it.
            if let Some(token) = self.lexer.next_token()? {
                self.buffer.push_back(token);
            }
        }
        self.buffer.front().ok_or_else(|| ParseError::Unexpected {
            found: "end of input".to_string(),
            position: 0,
        })
    }

    fn consume(&mut self) -> Result<Token, ParseError> {
        let token = self.peek()?.clone();
        if token.kind != TokenKind::Eof {
            self.buffer.pop_front();
        }
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let token = self.consume()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(expected(&kind.describe(), &token))
        }
    }

    pub(crate) fn parse(&mut self) -> Result<Vec<Instruction>, ParseError> {
        let code = self.statements()?;
        let token = self.peek()?;
        if token.kind != TokenKind::Eof {
            return Err(ParseError::TrailingInput {
                found: token.kind.describe(),
                position: token.position,
            });
        }
        Ok(code)
    }

    /// `expr (; expr)*`. A trailing `;` is allowed.
    fn statements(&mut self) -> Result<Vec<Instruction>, ParseError> {
        let mut code = self.expression(0)?;
        while self.peek()?.kind == TokenKind::Semicolon {
            self.consume()?;
            if matches!(self.peek()?.kind, TokenKind::Eof | TokenKind::RParen) {
                break;
            }
            code.push(Instruction::EndStatement);
            code.extend(self.expression(0)?);
        }
        Ok(code)
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Vec<Instruction>, ParseError> {
        let max = self.grammar.options().max_depth;
        if self.depth >= max {
            let position = self.peek()?.position;
            return Err(ParseError::TooDeep { max, position });
        }
        self.depth += 1;
        let result = self.climb(min_precedence);
        self.depth -= 1;
        result
    }

    fn climb(&mut self, min_precedence: u8) -> Result<Vec<Instruction>, ParseError> {
        let grammar = self.grammar;
        let mut lhs = self.prefix()?;

        loop {
            let TokenKind::Op(symbol) = self.peek()?.kind.clone() else {
                break;
            };

            if let Some(ternary) = grammar.ternary().filter(|t| t.symbol == symbol) {
                if ternary.precedence < min_precedence {
                    break;
                }
                self.consume()?;
                let then = self.expression(0)?;
                self.expect(TokenKind::Op(ternary.separator.clone()))?;
                let otherwise = self.expression(ternary.precedence)?;
                lhs.push(deferred(then));
                lhs.push(deferred(otherwise));
                lhs.push(Instruction::Ternary(symbol));
                continue;
            }

            let Some(op) = grammar.binary(&symbol) else {
                break;
            };
            if op.precedence < min_precedence {
                break;
            }
            self.consume()?;
            let next = match op.assoc {
                Assoc::Left => op.precedence.saturating_add(1),
                Assoc::Right => op.precedence,
            };
            let rhs = self.expression(next)?;
            if op.is_lazy() {
                lhs.push(deferred(rhs));
            } else {
                lhs.extend(rhs);
            }
            lhs.push(Instruction::Binary(symbol));
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Vec<Instruction>, ParseError> {
        let grammar = self.grammar;
        let token = self.consume()?;

        let atom = match token.kind {
            TokenKind::Op(symbol) => {
                let Some(op) = grammar.unary(&symbol) else {
                    return Err(ParseError::MissingOperand {
                        operator: symbol,
                        position: token.position,
                    });
                };
                let mut operand = self.expression(op.precedence)?;
                operand.push(Instruction::Unary(symbol));
                return Ok(operand);
            }
            TokenKind::Number(n) => vec![Instruction::Number(n)],
            TokenKind::Str(s) => vec![Instruction::Str(s)],
            TokenKind::Name(name) => {
                let literal = grammar.constant(&name).and_then(Instruction::literal);
                vec![literal.unwrap_or(Instruction::Var(name))]
            }
            TokenKind::LParen => {
                let inner = self.statements()?;
                self.expect(TokenKind::RParen)?;
                vec![Instruction::Expr(inner)]
            }
            TokenKind::LBracket if grammar.options().array_literals => {
                let (mut items, len) = self.list(TokenKind::RBracket)?;
                items.push(Instruction::Array(len));
                items
            }
            TokenKind::Eof => return Err(expected("expression", &token)),
            kind => {
                return Err(ParseError::Unexpected {
                    found: kind.describe(),
                    position: token.position,
                })
            }
        };

        self.postfix(atom)
    }

    fn postfix(&mut self, mut code: Vec<Instruction>) -> Result<Vec<Instruction>, ParseError> {
        loop {
            match self.peek()?.kind.clone() {
                TokenKind::LParen => {
                    self.consume()?;
                    let (args, argc) = self.list(TokenKind::RParen)?;
                    code.extend(args);
                    code.push(Instruction::Call(argc));
                }
                TokenKind::Op(dot) if dot == "." && self.grammar.options().member_access => {
                    self.consume()?;
                    let token = self.consume()?;
                    match token.kind {
                        TokenKind::Name(name) => code.push(Instruction::Member(name)),
                        // Word operators double as member names: `items.length`.
                        TokenKind::Op(word) if word.chars().all(|c| self.grammar.is_ident_char(c)) => {
                            code.push(Instruction::Member(word))
                        }
                        _ => return Err(expected("member name", &token)),
                    }
                }
                TokenKind::LBracket => {
                    self.consume()?;
                    let index = self.expression(0)?;
                    self.expect(TokenKind::RBracket)?;
                    code.extend(index);
                    code.push(Instruction::Index);
                }
                _ => return Ok(code),
            }
        }
    }

    fn list(&mut self, close: TokenKind) -> Result<(Vec<Instruction>, usize), ParseError> {
        let mut code = Vec::new();
        if self.peek()?.kind == close {
            self.consume()?;
            return Ok((code, 0));
        }
        let mut count = 0;
        loop {
            code.extend(self.expression(0)?);
            count += 1;
            let token = self.consume()?;
            match token.kind {
                TokenKind::Comma => continue,
                ref kind if *kind == close => return Ok((code, count)),
                _ => return Err(expected(&format!("',' or {}", close.describe()), &token)),
            }
        }
    }
}

fn expected(what: &str, token: &Token) -> ParseError {
    ParseError::Expected {
        expected: what.to_string(),
        found: token.kind.describe(),
        position: token.position,
    }
}

fn deferred(code: Vec<Instruction>) -> Instruction {
    match <[Instruction; 1]>::try_from(code) {
        Ok([single]) if single.is_literal() || matches!(single, Instruction::Expr(_)) => single,
        Ok([single]) => Instruction::Expr(vec![single]),
        Err(code) => Instruction::Expr(code),
    }
}
