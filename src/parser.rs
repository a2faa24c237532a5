use std::{iter::Peekable, vec::IntoIter};

use miette::Diagnostic;
use thiserror::Error;

use crate::{
    ast::{Expr, FunctionExpr, Op, Statement},
    scanner::{Token, TokenKind, TokenName},
    source::Location,
};

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected a command word, found {actual:?}")]
    ExpectedCommand { actual: TokenName, at: Location },
    #[error("Unexpected {actual:?} in statement")]
    UnexpectedStatementToken { actual: TokenName, at: Location },
    #[error("Unexpected {actual:?} in expression")]
    UnexpectedExpressionToken { actual: TokenName, at: Location },
    #[error("Expected {expected:?}, found {actual:?}")]
    UnexpectedToken {
        actual: TokenName,
        expected: TokenName,
        at: Location,
    },
}

impl ParseError {
    pub fn location(&self) -> Location {
        match self {
            Self::ExpectedCommand { at, .. }
            | Self::UnexpectedStatementToken { at, .. }
            | Self::UnexpectedExpressionToken { at, .. }
            | Self::UnexpectedToken { at, .. } => *at,
        }
    }
}

/// Incremental ("push") parser. Tokens are fed one at a time; `Ok(None)`
/// means more input is needed, `Ok(Some(..))` hands back a completed
/// statement. After an error the parser discards what it has and
/// resynchronizes on its own at the next end of statement.
pub struct Parser {
    pending: Vec<Token>,
    poisoned: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            poisoned: false,
        }
    }

    pub fn feed(&mut self, token: Token) -> Result<Option<Statement>, ParseError> {
        match token.kind {
            TokenKind::ScanError => {
                // the scanner already reported the failure; swallow the
                // statement without a secondary diagnostic
                self.poisoned = true;
                self.pending.clear();
                Ok(None)
            }
            TokenKind::EndOfStatement => {
                let poisoned = std::mem::take(&mut self.poisoned);
                let tokens = std::mem::take(&mut self.pending);
                if poisoned || tokens.is_empty() {
                    return Ok(None);
                }
                StatementParser::new(tokens, token.at).parse().map(Some)
            }
            _ if self.poisoned => Ok(None),
            _ => {
                self.pending.push(token);
                Ok(None)
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

struct StatementParser {
    tokens: Peekable<IntoIter<Token>>,
    end: Location,
}

impl StatementParser {
    fn new(tokens: Vec<Token>, end: Location) -> Self {
        Self {
            tokens: tokens.into_iter().peekable(),
            end,
        }
    }

    fn parse(mut self) -> Result<Statement, ParseError> {
        let command = match self.tokens.next() {
            Some(Token {
                kind: TokenKind::Word(word),
                ..
            }) => word,
            Some(token) => {
                return Err(ParseError::ExpectedCommand {
                    actual: (&token.kind).into(),
                    at: token.at,
                })
            }
            None => {
                return Err(ParseError::ExpectedCommand {
                    actual: TokenName::EndOfStatement,
                    at: self.end,
                })
            }
        };

        let mut args = Vec::new();
        while self.tokens.peek().is_some() {
            self.parse_arg(&mut args)?;
        }
        Ok(Statement { command, args })
    }

    /// One argument, flattened into `args` per the pairwise layout: keyword,
    /// bridged and checksum forms push a name node then a value node; a bare
    /// expression pushes its value node alone.
    fn parse_arg(&mut self, args: &mut Vec<Expr>) -> Result<(), ParseError> {
        let token = match self.tokens.next() {
            Some(token) => token,
            None => return Ok(()),
        };
        match token.kind {
            TokenKind::Word(word) => match self.tokens.peek().map(|t| &t.kind) {
                Some(TokenKind::Assign) => {
                    self.tokens.next();
                    let value = self.parse_region_body()?;
                    let value = self.parse_glue_chain(value)?;
                    args.push(Expr::str(word));
                    args.push(value);
                }
                Some(TokenKind::Bridge) => {
                    self.tokens.next();
                    let first = self.parse_piece()?;
                    let value = self.parse_glue_chain(first)?;
                    args.push(Expr::str(word));
                    args.push(value);
                }
                _ => args.push(word_value(word)),
            },
            TokenKind::Star => {
                let value = self.parse_region_body()?;
                args.push(Expr::str("*"));
                args.push(value);
            }
            TokenKind::ExprStart => {
                let first = self.parse_region_body()?;
                let value = self.parse_glue_chain(first)?;
                args.push(value);
            }
            kind => {
                return Err(ParseError::UnexpectedStatementToken {
                    actual: (&kind).into(),
                    at: token.at,
                })
            }
        }
        Ok(())
    }

    /// `(BRIDGE piece)*` appended onto `base` with the concat operator.
    fn parse_glue_chain(&mut self, mut base: Expr) -> Result<Expr, ParseError> {
        while self.consume(TokenKind::Bridge).is_some() {
            let piece = self.parse_piece()?;
            base = Expr::op(Op::Concat, vec![base, piece]);
        }
        Ok(base)
    }

    /// A glued word piece is literal text, never a parameter reference.
    fn parse_piece(&mut self) -> Result<Expr, ParseError> {
        match self.tokens.next() {
            Some(Token {
                kind: TokenKind::Word(text),
                ..
            }) => Ok(Expr::Str(text)),
            Some(Token {
                kind: TokenKind::ExprStart,
                ..
            }) => self.parse_region_body(),
            Some(token) => Err(ParseError::UnexpectedStatementToken {
                actual: (&token.kind).into(),
                at: token.at,
            }),
            None => Err(ParseError::UnexpectedExpressionToken {
                actual: TokenName::EndOfStatement,
                at: self.end,
            }),
        }
    }

    /// Expression region whose opener (`ExprStart`, `Assign` or `Star`) has
    /// already been consumed; runs to the matching `ExprEnd`.
    fn parse_region_body(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        self.expect(TokenKind::ExprEnd)?;
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_ternary()
    }

    /// `a if b else c`, right-associative, the loosest-binding form.
    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let then = self.parse_or()?;
        if self.consume(TokenKind::If).is_some() {
            let test = self.parse_or()?;
            self.expect(TokenKind::Else)?;
            let else_ = self.parse_ternary()?;
            Ok(Expr::op(Op::IfElse, vec![then, test, else_]))
        } else {
            Ok(then)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_and()?;
        while self.consume(TokenKind::Or).is_some() {
            let right = self.parse_and()?;
            last = Expr::op(Op::Or, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_equality()?;
        while self.consume(TokenKind::And).is_some() {
            let right = self.parse_equality()?;
            last = Expr::op(Op::And, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_concat()?;
        while self.consume(TokenKind::EqEq).is_some() {
            let right = self.parse_concat()?;
            last = Expr::op(Op::Eq, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_concat(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_additive()?;
        while self.consume(TokenKind::Concat).is_some() {
            let right = self.parse_additive()?;
            last = Expr::op(Op::Concat, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_modulus()?;
        while let Some(op) = self.consume_match(|token| match token.kind {
            TokenKind::Plus => Some(Op::Add),
            TokenKind::Minus => Some(Op::Sub),
            _ => None,
        }) {
            let right = self.parse_modulus()?;
            last = Expr::op(op, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_modulus(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_power()?;
        while self.consume(TokenKind::Percent).is_some() {
            let right = self.parse_power()?;
            last = Expr::op(Op::Mod, vec![last, right]);
        }
        Ok(last)
    }

    // `%` binds looser than `**`, which binds looser than `*` and `/`; a
    // deliberate quirk of the dialect
    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_multiplicative()?;
        while self.consume(TokenKind::StarStar).is_some() {
            let right = self.parse_multiplicative()?;
            last = Expr::op(Op::Pow, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_relational()?;
        while let Some(op) = self.consume_match(|token| match token.kind {
            TokenKind::Times => Some(Op::Mul),
            TokenKind::Slash => Some(Op::Div),
            _ => None,
        }) {
            let right = self.parse_relational()?;
            last = Expr::op(op, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut last = self.parse_unary()?;
        while let Some(op) = self.consume_match(|token| match token.kind {
            TokenKind::Lt => Some(Op::Lt),
            TokenKind::Gt => Some(Op::Gt),
            TokenKind::Le => Some(Op::Le),
            TokenKind::Ge => Some(Op::Ge),
            _ => None,
        }) {
            let right = self.parse_unary()?;
            last = Expr::op(op, vec![last, right]);
        }
        Ok(last)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.consume(TokenKind::Not).is_some() {
            let operand = self.parse_unary()?;
            return Ok(Expr::op(Op::Not, vec![operand]));
        }
        if self.consume(TokenKind::Minus).is_some() {
            let operand = self.parse_unary()?;
            return Ok(Expr::op(Op::Neg, vec![operand]));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.consume(TokenKind::Dot).is_some() {
                let at = self.at();
                let name = self
                    .consume_match(|token| match &token.kind {
                        TokenKind::Ident(name) => Some(name.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| ParseError::UnexpectedToken {
                        actual: self.peek_name(),
                        expected: TokenName::Ident,
                        at,
                    })?;
                expr = Expr::op(Op::Lookup, vec![expr, Expr::Str(name)]);
            } else if self.consume(TokenKind::LBracket).is_some() {
                let key = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::op(Op::Lookup, vec![expr, key]);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = match self.tokens.next() {
            Some(token) => token,
            None => {
                return Err(ParseError::UnexpectedExpressionToken {
                    actual: TokenName::EndOfStatement,
                    at: self.end,
                })
            }
        };
        match token.kind {
            TokenKind::Int(value) => Ok(Expr::Int(value)),
            TokenKind::Float(value) => Ok(Expr::Float(value)),
            TokenKind::Str(value) => Ok(Expr::Str(value)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Nan => Ok(Expr::Float(f64::NAN)),
            TokenKind::Inf => Ok(Expr::Float(f64::INFINITY)),
            TokenKind::KwStr => self.parse_cast(Op::CastStr),
            TokenKind::KwInt => self.parse_cast(Op::CastInt),
            TokenKind::KwFloat => self.parse_cast(Op::CastFloat),
            TokenKind::KwBoolean => self.parse_cast(Op::CastBool),
            TokenKind::Ident(name) => {
                if self.consume(TokenKind::LParen).is_some() {
                    let mut args = Vec::new();
                    if self.consume(TokenKind::RParen).is_none() {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.consume(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                        self.expect(TokenKind::RParen)?;
                    }
                    Ok(Expr::Function(FunctionExpr { name, args }))
                } else {
                    Ok(Expr::Parameter(name))
                }
            }
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            kind => Err(ParseError::UnexpectedExpressionToken {
                actual: (&kind).into(),
                at: token.at,
            }),
        }
    }

    fn parse_cast(&mut self, op: Op) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen)?;
        let operand = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::op(op, vec![operand]))
    }

    fn at(&mut self) -> Location {
        self.tokens.peek().map(|token| token.at).unwrap_or(self.end)
    }

    fn peek_name(&mut self) -> TokenName {
        self.tokens
            .peek()
            .map(|token| (&token.kind).into())
            .unwrap_or(TokenName::EndOfStatement)
    }

    fn consume(&mut self, kind: TokenKind) -> Option<Token> {
        match self.tokens.peek() {
            Some(token) if token.kind == kind => self.tokens.next(),
            _ => None,
        }
    }

    fn consume_match<T, F: Fn(&Token) -> Option<T>>(&mut self, check: F) -> Option<T> {
        match self.tokens.peek() {
            Some(token) => match check(token) {
                Some(value) => {
                    self.tokens.next();
                    Some(value)
                }
                None => None,
            },
            None => None,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        match self.tokens.next() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(ParseError::UnexpectedToken {
                actual: (&token.kind).into(),
                expected: (&kind).into(),
                at: token.at,
            }),
            None => Err(ParseError::UnexpectedToken {
                actual: TokenName::EndOfStatement,
                expected: (&kind).into(),
                at: self.end,
            }),
        }
    }
}

/// A bare word argument is a value expression: a plain number is a literal,
/// anything else is a parameter reference.
fn word_value(text: String) -> Expr {
    if let Ok(value) = text.parse::<i64>() {
        Expr::Int(value)
    } else if let Ok(value) = text.parse::<f64>() {
        Expr::Float(value)
    } else {
        Expr::Parameter(text)
    }
}
