use derive_new::new;
use miette::Diagnostic;
use strum::EnumDiscriminants;
use thiserror::Error;

use crate::source::{Location, LocationTracker};

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("Unexpected character {character:?}")]
    UnexpectedCharacter { character: char, at: Location },
    #[error("Unterminated string")]
    UnterminatedString { at: Location },
    #[error("Unknown escape character {character:?}")]
    UnknownEscape { character: char, at: Location },
    #[error("Malformed number {lexeme:?}")]
    MalformedNumber { lexeme: String, at: Location },
    #[error("Unterminated expression")]
    UnterminatedExpression { at: Location },
}

impl ScanError {
    pub fn location(&self) -> Location {
        match self {
            Self::UnexpectedCharacter { at, .. }
            | Self::UnterminatedString { at }
            | Self::UnknownEscape { at, .. }
            | Self::MalformedNumber { at, .. }
            | Self::UnterminatedExpression { at } => *at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, new)]
pub struct Token {
    pub at: Location,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(TokenName))]
pub enum TokenKind {
    // statement level
    Word(String),
    Assign,
    Star,
    Bridge,
    ExprStart,
    ExprEnd,
    EndOfStatement,
    /// Synthetic marker injected after a lexical error; the parser abandons
    /// the statement in progress and waits for the next terminator.
    ScanError,

    // expression level
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    Nan,
    Inf,
    If,
    Else,
    Or,
    And,
    Not,
    KwStr,
    KwInt,
    KwFloat,
    KwBoolean,
    EqEq,
    Concat,
    Plus,
    Minus,
    Percent,
    StarStar,
    Times,
    Slash,
    Lt,
    Gt,
    Le,
    Ge,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
}

/// How the current expression region ends: at the matching `}` of a brace
/// embedding, or at the first top-level whitespace of an unbraced `NAME=expr`
/// / checksum value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Term {
    Brace,
    Space,
}

#[derive(Debug, PartialEq)]
enum ExprState {
    Idle,
    Ident { text: String, at: Location },
    Number { text: String, at: Location },
    Str { quote: char, value: String, at: Location, escape: bool },
    PendingEq { at: Location },
    PendingLt { at: Location },
    PendingGt { at: Location },
    PendingStar { at: Location },
    PendingDot { at: Location },
}

#[derive(Debug, PartialEq)]
enum Mode {
    /// Statement level, whitespace seen since the last piece.
    Idle,
    /// Statement level, directly after a word piece or `}`; the next piece
    /// glues onto the current argument.
    Glued,
    Word {
        text: String,
        at: Location,
    },
    Comment,
    /// A lexical error poisoned the statement; discard to the terminator.
    Recover,
    Expr {
        term: Term,
        depth: u32,
        started: bool,
        state: ExprState,
    },
}

type ScanItem = Result<Token, ScanError>;

/// Incremental statement scanner. `scan` accepts arbitrarily split input;
/// a token cut in half by a chunk boundary is carried in internal state and
/// completed by the next call. `finish` flushes a trailing unterminated
/// statement as if a newline had been seen.
pub struct Scanner {
    tracker: LocationTracker,
    mode: Mode,
    stmt_open: bool,
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            tracker: LocationTracker::new(),
            mode: Mode::Idle,
            stmt_open: false,
        }
    }

    pub fn scan(&mut self, chunk: &str) -> Vec<ScanItem> {
        let mut out = Vec::new();
        for ch in chunk.chars() {
            self.step(ch, &mut out);
            self.tracker.advance(ch);
        }
        out
    }

    pub fn finish(&mut self) -> Vec<ScanItem> {
        let mut out = Vec::new();
        self.step('\n', &mut out);
        self.tracker.advance('\n');
        out
    }

    fn emit(&mut self, out: &mut Vec<ScanItem>, at: Location, kind: TokenKind) {
        self.stmt_open = !matches!(kind, TokenKind::EndOfStatement);
        out.push(Ok(Token::new(at, kind)));
    }

    fn end_statement(&mut self, out: &mut Vec<ScanItem>, at: Location) {
        if self.stmt_open {
            self.emit(out, at, TokenKind::EndOfStatement);
        }
        self.mode = Mode::Idle;
    }

    fn fail(&mut self, out: &mut Vec<ScanItem>, error: ScanError) {
        let at = error.location();
        out.push(Err(error));
        self.emit(out, at, TokenKind::ScanError);
        self.mode = Mode::Recover;
    }

    /// Process one character. A single character may finish a buffered token
    /// and still need handling itself, so the internal loop re-dispatches
    /// until the character is consumed.
    fn step(&mut self, ch: char, out: &mut Vec<ScanItem>) {
        let at = self.tracker.current();
        loop {
            match &mut self.mode {
                Mode::Idle => match ch {
                    ' ' | '\t' | '\r' => return,
                    '\n' => {
                        self.end_statement(out, at);
                        return;
                    }
                    ';' => {
                        self.mode = Mode::Comment;
                        return;
                    }
                    '=' => {
                        self.emit(out, at, TokenKind::Assign);
                        self.enter_expr(Term::Space);
                        return;
                    }
                    '*' => {
                        self.emit(out, at, TokenKind::Star);
                        self.enter_expr(Term::Space);
                        return;
                    }
                    '{' => {
                        self.emit(out, at, TokenKind::ExprStart);
                        self.enter_expr(Term::Brace);
                        return;
                    }
                    '}' => {
                        self.fail(out, ScanError::UnexpectedCharacter { character: ch, at });
                        return;
                    }
                    _ => {
                        self.mode = Mode::Word {
                            text: ch.to_string(),
                            at,
                        };
                        return;
                    }
                },
                Mode::Glued => match ch {
                    ' ' | '\t' | '\r' => {
                        self.mode = Mode::Idle;
                        return;
                    }
                    '\n' => {
                        self.end_statement(out, at);
                        return;
                    }
                    ';' => {
                        self.mode = Mode::Comment;
                        return;
                    }
                    '=' => {
                        self.emit(out, at, TokenKind::Assign);
                        self.enter_expr(Term::Space);
                        return;
                    }
                    '*' => {
                        self.emit(out, at, TokenKind::Star);
                        self.enter_expr(Term::Space);
                        return;
                    }
                    '{' => {
                        self.emit(out, at, TokenKind::Bridge);
                        self.emit(out, at, TokenKind::ExprStart);
                        self.enter_expr(Term::Brace);
                        return;
                    }
                    '}' => {
                        self.fail(out, ScanError::UnexpectedCharacter { character: ch, at });
                        return;
                    }
                    _ => {
                        self.emit(out, at, TokenKind::Bridge);
                        self.mode = Mode::Word {
                            text: ch.to_string(),
                            at,
                        };
                        return;
                    }
                },
                Mode::Word { text, at: start } => match ch {
                    ' ' | '\t' | '\r' | '\n' | ';' | '=' | '*' | '{' | '}' => {
                        let word = std::mem::take(text);
                        let start = *start;
                        self.mode = Mode::Idle;
                        self.emit(out, start, TokenKind::Word(word));
                        match ch {
                            ' ' | '\t' | '\r' => return,
                            '{' => {
                                // no whitespace between the word and the
                                // embedding: the expression glues on
                                self.emit(out, at, TokenKind::Bridge);
                                self.emit(out, at, TokenKind::ExprStart);
                                self.enter_expr(Term::Brace);
                                return;
                            }
                            _ => continue,
                        }
                    }
                    _ => {
                        text.push(ch);
                        return;
                    }
                },
                Mode::Comment => match ch {
                    '\n' => {
                        self.end_statement(out, at);
                        return;
                    }
                    _ => return,
                },
                Mode::Recover => match ch {
                    '\n' => {
                        self.end_statement(out, at);
                        return;
                    }
                    _ => return,
                },
                Mode::Expr {
                    term: term_slot,
                    depth,
                    started,
                    state,
                } => {
                    let term = *term_slot;
                    match state {
                        ExprState::Idle => match ch {
                            '{' if term == Term::Space && !*started => {
                                // `X={...}`: the brace right after `=` (or
                                // `*`) turns the value into a braced region
                                *term_slot = Term::Brace;
                                return;
                            }
                            ' ' | '\t' | '\r' => {
                                if term == Term::Space && *depth == 0 && *started {
                                    self.emit(out, at, TokenKind::ExprEnd);
                                    self.mode = Mode::Idle;
                                }
                                return;
                            }
                            '\n' => {
                                if term == Term::Space {
                                    self.emit(out, at, TokenKind::ExprEnd);
                                    self.mode = Mode::Idle;
                                    continue;
                                }
                                self.fail(out, ScanError::UnterminatedExpression { at });
                                continue;
                            }
                            '}' => {
                                if term == Term::Brace {
                                    self.emit(out, at, TokenKind::ExprEnd);
                                    self.mode = Mode::Glued;
                                } else {
                                    self.fail(
                                        out,
                                        ScanError::UnexpectedCharacter { character: ch, at },
                                    );
                                }
                                return;
                            }
                            '\'' | '"' => {
                                *started = true;
                                *state = ExprState::Str {
                                    quote: ch,
                                    value: String::new(),
                                    at,
                                    escape: false,
                                };
                                return;
                            }
                            '0'..='9' => {
                                *started = true;
                                *state = ExprState::Number {
                                    text: ch.to_string(),
                                    at,
                                };
                                return;
                            }
                            'a'..='z' | 'A'..='Z' | '_' => {
                                *started = true;
                                *state = ExprState::Ident {
                                    text: ch.to_string(),
                                    at,
                                };
                                return;
                            }
                            '.' => {
                                *started = true;
                                *state = ExprState::PendingDot { at };
                                return;
                            }
                            '=' => {
                                *started = true;
                                *state = ExprState::PendingEq { at };
                                return;
                            }
                            '<' => {
                                *started = true;
                                *state = ExprState::PendingLt { at };
                                return;
                            }
                            '>' => {
                                *started = true;
                                *state = ExprState::PendingGt { at };
                                return;
                            }
                            '*' => {
                                *started = true;
                                *state = ExprState::PendingStar { at };
                                return;
                            }
                            '(' => {
                                *started = true;
                                *depth += 1;
                                self.emit(out, at, TokenKind::LParen);
                                return;
                            }
                            ')' => {
                                *depth = depth.saturating_sub(1);
                                self.emit(out, at, TokenKind::RParen);
                                return;
                            }
                            '[' => {
                                *started = true;
                                *depth += 1;
                                self.emit(out, at, TokenKind::LBracket);
                                return;
                            }
                            ']' => {
                                *depth = depth.saturating_sub(1);
                                self.emit(out, at, TokenKind::RBracket);
                                return;
                            }
                            '+' => {
                                *started = true;
                                self.emit(out, at, TokenKind::Plus);
                                return;
                            }
                            '-' => {
                                *started = true;
                                self.emit(out, at, TokenKind::Minus);
                                return;
                            }
                            '~' => {
                                *started = true;
                                self.emit(out, at, TokenKind::Concat);
                                return;
                            }
                            '%' => {
                                *started = true;
                                self.emit(out, at, TokenKind::Percent);
                                return;
                            }
                            '/' => {
                                *started = true;
                                self.emit(out, at, TokenKind::Slash);
                                return;
                            }
                            ',' => {
                                self.emit(out, at, TokenKind::Comma);
                                return;
                            }
                            _ => {
                                self.fail(out, ScanError::UnexpectedCharacter { character: ch, at });
                                return;
                            }
                        },
                        ExprState::Ident { text, at: start } => {
                            if ch.is_ascii_alphanumeric() || ch == '_' {
                                text.push(ch);
                                return;
                            }
                            let text = std::mem::take(text);
                            let start = *start;
                            *state = ExprState::Idle;
                            self.emit(out, start, keyword_or_ident(text));
                            continue;
                        }
                        ExprState::Number { text, at: start } => {
                            let hex = text.starts_with("0x") || text.starts_with("0X");
                            let continues = ch.is_ascii_alphanumeric()
                                || ch == '.'
                                || ((ch == '+' || ch == '-')
                                    && !hex
                                    && matches!(text.chars().last(), Some('e') | Some('E')));
                            if continues {
                                text.push(ch);
                                return;
                            }
                            let text = std::mem::take(text);
                            let start = *start;
                            *state = ExprState::Idle;
                            match parse_number(&text) {
                                Some(kind) => self.emit(out, start, kind),
                                None => {
                                    self.fail(
                                        out,
                                        ScanError::MalformedNumber {
                                            lexeme: text,
                                            at: start,
                                        },
                                    );
                                    return;
                                }
                            }
                            continue;
                        }
                        ExprState::Str {
                            quote,
                            value,
                            at: start,
                            escape,
                        } => {
                            if *escape {
                                *escape = false;
                                match ch {
                                    'n' => value.push('\n'),
                                    'r' => value.push('\r'),
                                    't' => value.push('\t'),
                                    '0' => value.push('\0'),
                                    '\\' | '\'' | '"' => value.push(ch),
                                    _ => {
                                        self.fail(
                                            out,
                                            ScanError::UnknownEscape { character: ch, at },
                                        );
                                    }
                                }
                                return;
                            }
                            match ch {
                                '\\' => {
                                    *escape = true;
                                    return;
                                }
                                '\n' => {
                                    let start = *start;
                                    self.fail(out, ScanError::UnterminatedString { at: start });
                                    continue;
                                }
                                _ if ch == *quote => {
                                    let value = std::mem::take(value);
                                    let start = *start;
                                    *state = ExprState::Idle;
                                    self.emit(out, start, TokenKind::Str(value));
                                    return;
                                }
                                _ => {
                                    value.push(ch);
                                    return;
                                }
                            }
                        }
                        ExprState::PendingEq { at: start } => {
                            if ch == '=' {
                                let start = *start;
                                *state = ExprState::Idle;
                                self.emit(out, start, TokenKind::EqEq);
                                return;
                            }
                            let start = *start;
                            self.fail(
                                out,
                                ScanError::UnexpectedCharacter {
                                    character: '=',
                                    at: start,
                                },
                            );
                            continue;
                        }
                        ExprState::PendingLt { at: start } => {
                            let start = *start;
                            if ch == '=' {
                                *state = ExprState::Idle;
                                self.emit(out, start, TokenKind::Le);
                                return;
                            }
                            *state = ExprState::Idle;
                            self.emit(out, start, TokenKind::Lt);
                            continue;
                        }
                        ExprState::PendingGt { at: start } => {
                            let start = *start;
                            if ch == '=' {
                                *state = ExprState::Idle;
                                self.emit(out, start, TokenKind::Ge);
                                return;
                            }
                            *state = ExprState::Idle;
                            self.emit(out, start, TokenKind::Gt);
                            continue;
                        }
                        ExprState::PendingStar { at: start } => {
                            let start = *start;
                            if ch == '*' {
                                *state = ExprState::Idle;
                                self.emit(out, start, TokenKind::StarStar);
                                return;
                            }
                            *state = ExprState::Idle;
                            self.emit(out, start, TokenKind::Times);
                            continue;
                        }
                        ExprState::PendingDot { at: start } => {
                            let start = *start;
                            if ch.is_ascii_digit() {
                                *state = ExprState::Number {
                                    text: ".".to_string(),
                                    at: start,
                                };
                                continue;
                            }
                            *state = ExprState::Idle;
                            self.emit(out, start, TokenKind::Dot);
                            continue;
                        }
                    }
                }
            }
        }
    }

    fn enter_expr(&mut self, term: Term) {
        self.mode = Mode::Expr {
            term,
            depth: 0,
            started: false,
            state: ExprState::Idle,
        };
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

fn keyword_or_ident(text: String) -> TokenKind {
    match text.as_str() {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "or" => TokenKind::Or,
        "and" => TokenKind::And,
        "not" => TokenKind::Not,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "nan" => TokenKind::Nan,
        "inf" => TokenKind::Inf,
        "str" => TokenKind::KwStr,
        "int" => TokenKind::KwInt,
        "float" => TokenKind::KwFloat,
        "boolean" => TokenKind::KwBoolean,
        _ => TokenKind::Ident(text),
    }
}

/// Integer literals are decimal, `0x` hex or leading-`0` octal; everything
/// with a decimal point or exponent is a float.
fn parse_number(text: &str) -> Option<TokenKind> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(TokenKind::Int);
    }
    if text.contains(&['.', 'e', 'E'][..]) {
        return text.parse::<f64>().ok().map(TokenKind::Float);
    }
    if text.len() > 1 && text.starts_with('0') {
        return i64::from_str_radix(&text[1..], 8).ok().map(TokenKind::Int);
    }
    text.parse::<i64>().ok().map(TokenKind::Int)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(items: Vec<ScanItem>) -> Vec<TokenKind> {
        items
            .into_iter()
            .map(|item| item.expect("expected a token").kind)
            .collect()
    }

    #[test]
    fn words_and_keyword_args() {
        let mut scanner = Scanner::new();
        assert_eq!(
            kinds(scanner.scan("G1 X=10 Y=-2.5\n")),
            vec![
                TokenKind::Word("G1".to_string()),
                TokenKind::Word("X".to_string()),
                TokenKind::Assign,
                TokenKind::Int(10),
                TokenKind::ExprEnd,
                TokenKind::Word("Y".to_string()),
                TokenKind::Assign,
                TokenKind::Minus,
                TokenKind::Float(2.5),
                TokenKind::ExprEnd,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn bridged_expressions() {
        let mut scanner = Scanner::new();
        assert_eq!(
            kinds(scanner.scan("G1 X{1+2}mm {'a'}\n")),
            vec![
                TokenKind::Word("G1".to_string()),
                TokenKind::Word("X".to_string()),
                TokenKind::Bridge,
                TokenKind::ExprStart,
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::ExprEnd,
                TokenKind::Bridge,
                TokenKind::Word("mm".to_string()),
                TokenKind::ExprStart,
                TokenKind::Str("a".to_string()),
                TokenKind::ExprEnd,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn tokens_survive_chunk_splits() {
        let mut scanner = Scanner::new();
        let mut items = scanner.scan("G1 X{12");
        items.extend(scanner.scan("3+4.5e"));
        items.extend(scanner.scan("2}\n"));
        assert_eq!(
            kinds(items),
            vec![
                TokenKind::Word("G1".to_string()),
                TokenKind::Word("X".to_string()),
                TokenKind::Bridge,
                TokenKind::ExprStart,
                TokenKind::Int(123),
                TokenKind::Plus,
                TokenKind::Float(4.5e2),
                TokenKind::ExprEnd,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn expression_operators_and_radixes() {
        let mut scanner = Scanner::new();
        assert_eq!(
            kinds(scanner.scan("{0x1F + 010 ** 2 == x.y[0] <= .5}\n")),
            vec![
                TokenKind::ExprStart,
                TokenKind::Int(31),
                TokenKind::Plus,
                TokenKind::Int(8),
                TokenKind::StarStar,
                TokenKind::Int(2),
                TokenKind::EqEq,
                TokenKind::Ident("x".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("y".to_string()),
                TokenKind::LBracket,
                TokenKind::Int(0),
                TokenKind::RBracket,
                TokenKind::Le,
                TokenKind::Float(0.5),
                TokenKind::ExprEnd,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let mut scanner = Scanner::new();
        assert_eq!(
            kinds(scanner.scan("{'a\\n' ~ \"b\\\"c\"}\n")),
            vec![
                TokenKind::ExprStart,
                TokenKind::Str("a\n".to_string()),
                TokenKind::Concat,
                TokenKind::Str("b\"c".to_string()),
                TokenKind::ExprEnd,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn checksum_word_and_comment() {
        let mut scanner = Scanner::new();
        assert_eq!(
            kinds(scanner.scan("M105 *71 ; poll temps\n")),
            vec![
                TokenKind::Word("M105".to_string()),
                TokenKind::Star,
                TokenKind::Int(71),
                TokenKind::ExprEnd,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn lexical_errors_poison_to_the_terminator() {
        let mut scanner = Scanner::new();
        let items = scanner.scan("G1 X{1 @ 2} Y=3\nG0\n");
        let error = items
            .iter()
            .find_map(|item| item.as_ref().err())
            .expect("expected a scan error");
        assert_eq!(
            *error,
            ScanError::UnexpectedCharacter {
                character: '@',
                at: Location { line: 1, column: 8 },
            }
        );
        let kinds: Vec<_> = items
            .into_iter()
            .filter_map(|item| item.ok())
            .map(|token| token.kind)
            .collect();
        // everything after the error is discarded up to the newline; the
        // following statement scans normally
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word("G1".to_string()),
                TokenKind::Word("X".to_string()),
                TokenKind::Bridge,
                TokenKind::ExprStart,
                TokenKind::Int(1),
                TokenKind::ScanError,
                TokenKind::EndOfStatement,
                TokenKind::Word("G0".to_string()),
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn finish_flushes_a_trailing_statement() {
        let mut scanner = Scanner::new();
        let mut items = scanner.scan("G28 X=1");
        items.extend(scanner.finish());
        assert_eq!(
            kinds(items),
            vec![
                TokenKind::Word("G28".to_string()),
                TokenKind::Word("X".to_string()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::ExprEnd,
                TokenKind::EndOfStatement,
            ]
        );
        // nothing pending: finish is a no-op
        assert_eq!(scanner.finish(), vec![]);
    }

    #[test]
    fn unterminated_brace_expression_is_an_error() {
        let mut scanner = Scanner::new();
        let items = scanner.scan("G1 X{1+\n");
        assert!(items.iter().any(|item| matches!(
            item,
            Err(ScanError::UnterminatedExpression { .. })
        )));
    }
}
