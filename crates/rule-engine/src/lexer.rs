//! 规则源码词法分析
//!
//! 将 UTF-8 规则文本切分为带位置的 token 序列。`//` 注释和空白在此阶段去除。

use crate::error::{SyntaxError, SyntaxErrorKind};
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, multispace1, one_of, satisfy};
use nom::combinator::{opt, recognize, value};
use nom::multi::many0;
use nom::sequence::{pair, tuple};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// 点号分隔的字段路径，如 `ChannelAccept.Event.FundingAmt`
    Path(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    OrOr,
    AndAnd,
    Amp,
    EqEq,
    NotEq,
    Ge,
    Le,
    Gt,
    Lt,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "字段 '{}'", path),
            Self::Int(n) => write!(f, "数字 {}", n),
            Self::Float(n) => write!(f, "数字 {:?}", n),
            Self::Str(s) => write!(f, "字符串 {:?}", s),
            Self::True => write!(f, "'true'"),
            Self::False => write!(f, "'false'"),
            Self::OrOr => write!(f, "'||'"),
            Self::AndAnd => write!(f, "'&&'"),
            Self::Amp => write!(f, "'&'"),
            Self::EqEq => write!(f, "'=='"),
            Self::NotEq => write!(f, "'!='"),
            Self::Ge => write!(f, "'>='"),
            Self::Le => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::Lt => write!(f, "'<'"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
        }
    }
}

/// 带 1 起始行列位置的 token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// 字节偏移到行列位置的索引
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    fn locate(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = self.source[self.line_starts[line]..offset].chars().count() + 1;
        (line + 1, column)
    }
}

/// 将规则源码切分为 token 序列
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut rest = source;

    loop {
        if let Ok((remaining, ())) = trivia(rest) {
            rest = remaining;
        }
        if rest.is_empty() {
            break;
        }

        let (line, column) = index.locate(source.len() - rest.len());
        let (remaining, kind) =
            next_token(rest).map_err(|kind| SyntaxError::new(kind, line, column))?;
        tokens.push(Token { kind, line, column });
        rest = remaining;
    }

    Ok(tokens)
}

/// 跳过空白与 `//` 行注释
fn trivia(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(tag("//"), take_while(|c: char| c != '\n'))),
        ))),
    )(input)
}

fn next_token(input: &str) -> Result<(&str, TokenKind), SyntaxErrorKind> {
    let mut chars = input.chars();
    let first = chars.next().ok_or(SyntaxErrorKind::UnexpectedEnd)?;
    let second = chars.next();

    match first {
        '"' | '\'' => string_literal(input),
        c if c.is_ascii_digit() => number_literal(input),
        '-' if second.is_some_and(|c| c.is_ascii_digit()) => number_literal(input),
        c if is_ident_start(c) => {
            let (rest, path) =
                field_path(input).map_err(|_| SyntaxErrorKind::UnexpectedChar(first))?;
            let kind = match path {
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                _ => TokenKind::Path(path.to_string()),
            };
            Ok((rest, kind))
        }
        _ => operator(input).map_err(|_| unknown_operator(first, second)),
    }
}

fn unknown_operator(first: char, second: Option<char>) -> SyntaxErrorKind {
    const OPERATOR_CHARS: &str = "!=|&<>+-*/%^~";
    if !OPERATOR_CHARS.contains(first) {
        return SyntaxErrorKind::UnexpectedChar(first);
    }
    let mut op = first.to_string();
    if let Some(c) = second.filter(|c| OPERATOR_CHARS.contains(*c)) {
        op.push(c);
    }
    SyntaxErrorKind::UnknownOperator(op)
}

fn operator(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::OrOr, tag("||")),
        value(TokenKind::AndAnd, tag("&&")),
        value(TokenKind::Amp, tag("&")),
        value(TokenKind::EqEq, tag("==")),
        value(TokenKind::NotEq, tag("!=")),
        value(TokenKind::Ge, tag(">=")),
        value(TokenKind::Le, tag("<=")),
        value(TokenKind::Gt, tag(">")),
        value(TokenKind::Lt, tag("<")),
        value(TokenKind::LParen, tag("(")),
        value(TokenKind::RParen, tag(")")),
    ))(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// r"[A-Za-z_][A-Za-z0-9_]*"
fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char)))(input)
}

/// r"ident(\.ident)*"
fn field_path(input: &str) -> IResult<&str, &str> {
    recognize(pair(ident, many0(pair(char('.'), ident))))(input)
}

/// r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?"
fn number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn number_literal(input: &str) -> Result<(&str, TokenKind), SyntaxErrorKind> {
    let (rest, text) = number(input).map_err(|_| invalid_number(input))?;

    // 数字后紧跟标识符字符（如 `12abc`）视为非法数字
    if rest.starts_with(is_ident_char) {
        let len = text.len() + rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        return Err(SyntaxErrorKind::InvalidNumber(input[..len].to_string()));
    }

    let kind = if text.contains(['.', 'e', 'E']) {
        TokenKind::Float(text.parse().map_err(|_| invalid_number(text))?)
    } else {
        TokenKind::Int(text.parse().map_err(|_| invalid_number(text))?)
    };
    Ok((rest, kind))
}

fn invalid_number(text: &str) -> SyntaxErrorKind {
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    SyntaxErrorKind::InvalidNumber(text[..end].to_string())
}

/// 单引号或双引号字符串，支持 `\\ \" \' \n \t \r \0` 转义，不允许跨行
fn string_literal(input: &str) -> Result<(&str, TokenKind), SyntaxErrorKind> {
    let mut chars = input.char_indices();
    let (_, quote) = chars.next().ok_or(SyntaxErrorKind::UnterminatedString)?;
    let mut out = String::new();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((&input[i + c.len_utf8()..], TokenKind::Str(out))),
            '\\' => {
                let (_, escaped) = chars.next().ok_or(SyntaxErrorKind::UnterminatedString)?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' | '"' | '\'' => escaped,
                    '\n' => return Err(SyntaxErrorKind::UnterminatedString),
                    other => return Err(SyntaxErrorKind::InvalidEscape(other)),
                });
            }
            '\n' => return Err(SyntaxErrorKind::UnterminatedString),
            c => out.push(c),
        }
    }

    Err(SyntaxErrorKind::UnterminatedString)
}
