//! Lexer and recursive-descent parser for the mask grammar.
//!
//! ```text
//! mask      := or_expr
//! or_expr   := and_expr ( '|' and_expr )*
//! and_expr  := unary ( '&' unary )*
//! unary     := '~' unary | primary
//! primary   := '(' or_expr ')' | predicate
//! predicate := column '.str.contains(' string (',' kwarg)* ')'
//!            | column cmp literal
//! column    := 'df' '[' string ']'
//! ```
//!
//! Everything outside this grammar is a parse error, which the caller
//! reports as a failed shape check.

use thiserror::Error;

use crate::ast::{CmpOp, Literal, MaskExpr};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParseError(String);

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Amp,
    Pipe,
    Tilde,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "`{s}`"),
            Token::Str(_) => write!(f, "string literal"),
            Token::Num(n) => write!(f, "number {n}"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::LBracket => write!(f, "`[`"),
            Token::RBracket => write!(f, "`]`"),
            Token::Dot => write!(f, "`.`"),
            Token::Comma => write!(f, "`,`"),
            Token::Amp => write!(f, "`&`"),
            Token::Pipe => write!(f, "`|`"),
            Token::Tilde => write!(f, "`~`"),
            Token::Assign => write!(f, "`=`"),
            Token::Eq => write!(f, "`==`"),
            Token::Ne => write!(f, "`!=`"),
            Token::Lt => write!(f, "`<`"),
            Token::Le => write!(f, "`<=`"),
            Token::Gt => write!(f, "`>`"),
            Token::Ge => write!(f, "`>=`"),
        }
    }
}

fn lex(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '&' => {
                chars.next();
                tokens.push(Token::Amp);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '~' => {
                chars.next();
                tokens.push(Token::Tilde);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(ParseError("expected `=` after `!`".into()));
                }
                tokens.push(Token::Ne);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(esc @ ('\'' | '"' | '\\')) => value.push(esc),
                            Some(other) => {
                                value.push('\\');
                                value.push(other);
                            }
                            None => return Err(ParseError("unterminated string".into())),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => value.push(ch),
                        None => return Err(ParseError("unterminated string".into())),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '-' | '0'..='9' => {
                let mut text = String::new();
                if c == '-' {
                    text.push(c);
                    chars.next();
                    if !matches!(chars.peek(), Some('0'..='9')) {
                        return Err(ParseError("expected digit after `-`".into()));
                    }
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = text
                    .parse()
                    .map_err(|_| ParseError(format!("invalid number `{text}`")))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(ParseError(format!("unexpected character `{other}`"))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token) -> Result<(), ParseError> {
        match self.next() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(ParseError(format!("expected {want}, found {tok}"))),
            None => Err(ParseError(format!("expected {want}, found end of input"))),
        }
    }

    fn expect_ident(&mut self, want: &str) -> Result<(), ParseError> {
        match self.next() {
            Some(Token::Ident(name)) if name == want => Ok(()),
            Some(tok) => Err(ParseError(format!("expected `{want}`, found {tok}"))),
            None => Err(ParseError(format!("expected `{want}`, found end of input"))),
        }
    }

    fn expect_str(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            Some(tok) => Err(ParseError(format!("expected string literal, found {tok}"))),
            None => Err(ParseError("expected string literal, found end of input".into())),
        }
    }

    fn or_expr(&mut self) -> Result<MaskExpr, ParseError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Pipe) {
            self.next();
            let right = self.and_expr()?;
            left = MaskExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<MaskExpr, ParseError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::Amp) {
            self.next();
            let right = self.unary()?;
            left = MaskExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<MaskExpr, ParseError> {
        if self.peek() == Some(&Token::Tilde) {
            self.next();
            return Ok(MaskExpr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<MaskExpr, ParseError> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.or_expr()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<MaskExpr, ParseError> {
        self.expect_ident("df")?;
        self.expect(Token::LBracket)?;
        let column = self.expect_str()?;
        self.expect(Token::RBracket)?;

        match self.next() {
            Some(Token::Dot) => {
                self.expect_ident("str")?;
                self.expect(Token::Dot)?;
                self.expect_ident("contains")?;
                self.expect(Token::LParen)?;
                let pattern = self.expect_str()?;
                let mut case_insensitive = false;
                while self.peek() == Some(&Token::Comma) {
                    self.next();
                    let (name, value) = self.kwarg()?;
                    match name.as_str() {
                        "case" => case_insensitive = !value,
                        // Cells are plain strings and patterns are
                        // alternations of substrings regardless.
                        "na" | "regex" => {}
                        other => {
                            return Err(ParseError(format!("unsupported keyword `{other}`")))
                        }
                    }
                }
                self.expect(Token::RParen)?;
                Ok(MaskExpr::Contains {
                    column,
                    alternatives: pattern.split('|').map(str::to_string).collect(),
                    case_insensitive,
                })
            }
            Some(tok) => {
                let op = match tok {
                    Token::Eq => CmpOp::Eq,
                    Token::Ne => CmpOp::Ne,
                    Token::Lt => CmpOp::Lt,
                    Token::Le => CmpOp::Le,
                    Token::Gt => CmpOp::Gt,
                    Token::Ge => CmpOp::Ge,
                    other => {
                        return Err(ParseError(format!(
                            "expected comparison or `.str.contains`, found {other}"
                        )))
                    }
                };
                let literal = match self.next() {
                    Some(Token::Str(s)) => Literal::Str(s),
                    Some(Token::Num(n)) => Literal::Num(n),
                    Some(other) => {
                        return Err(ParseError(format!("expected literal, found {other}")))
                    }
                    None => return Err(ParseError("expected literal, found end of input".into())),
                };
                Ok(MaskExpr::Compare {
                    column,
                    op,
                    literal,
                })
            }
            None => Err(ParseError("expected predicate, found end of input".into())),
        }
    }

    fn kwarg(&mut self) -> Result<(String, bool), ParseError> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            Some(tok) => return Err(ParseError(format!("expected keyword name, found {tok}"))),
            None => return Err(ParseError("expected keyword name, found end of input".into())),
        };
        self.expect(Token::Assign)?;
        let value = match self.next() {
            Some(Token::Ident(v)) if v == "True" => true,
            Some(Token::Ident(v)) if v == "False" => false,
            Some(tok) => {
                return Err(ParseError(format!("expected True or False, found {tok}")))
            }
            None => return Err(ParseError("expected True or False, found end of input".into())),
        };
        Ok((name, value))
    }
}

/// Parse a bare mask expression (the text between the outer brackets).
pub fn parse_mask(src: &str) -> Result<MaskExpr, ParseError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError(format!("unexpected trailing {extra}")));
    }
    Ok(expr)
}
