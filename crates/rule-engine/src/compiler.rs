//! 规则编译器
//!
//! 将规则文本解析成内存中的表达式树，并预提取字段索引和版本摘要。
//!
//! 优先级（由低到高）：`||`、`&&`、比较、`&`、字段 / 字面量 / 括号。
//! `||`、`&&`、`&` 左结合；比较操作符不可连用（`a < b < c` 为语法错误）。

use crate::error::{Result, RuleError, SyntaxError, SyntaxErrorKind};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::models::{Expr, Literal};
use crate::operators::ComparisonOp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// 表达式树的最大深度（括号嵌套与操作符链共同计入）
pub const MAX_DEPTH: usize = 256;

/// 解析规则文本为表达式树
pub fn parse(source: &str) -> std::result::Result<Expr, SyntaxError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(SyntaxError::new(SyntaxErrorKind::EmptyRule, 1, 1));
    }

    let mut parser = Parser::new(tokens, end_position(source));
    let (expr, _) = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        let kind = match token.kind {
            TokenKind::RParen => SyntaxErrorKind::UnmatchedParen,
            ref other => SyntaxErrorKind::UnexpectedToken(other.to_string()),
        };
        return Err(SyntaxError::new(kind, token.line, token.column));
    }

    Ok(expr)
}

/// 源码末尾的位置，用于报告意外结束
fn end_position(source: &str) -> (usize, usize) {
    let line = source.matches('\n').count() + 1;
    let last_line = source.rsplit('\n').next().unwrap_or_default();
    (line, last_line.chars().count() + 1)
}

type Parsed = std::result::Result<(Expr, usize), SyntaxError>;

/// 递归下降解析器，每个产生式返回子树及其深度
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
    end: (usize, usize),
}

impl Parser {
    fn new(tokens: Vec<Token>, end: (usize, usize)) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(token: &Token, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError::new(kind, token.line, token.column)
    }

    fn unexpected_end(&self) -> SyntaxError {
        SyntaxError::new(SyntaxErrorKind::UnexpectedEnd, self.end.0, self.end.1)
    }

    fn check_depth(depth: usize, token: &Token) -> std::result::Result<usize, SyntaxError> {
        if depth > MAX_DEPTH {
            return Err(Self::error_at(token, SyntaxErrorKind::TooDeep(MAX_DEPTH)));
        }
        Ok(depth)
    }

    fn parse_or(&mut self) -> Parsed {
        let (mut lhs, mut depth) = self.parse_and()?;
        while let Some(TokenKind::OrOr) = self.peek_kind() {
            let op = self.advance().ok_or_else(|| self.unexpected_end())?;
            let (rhs, rhs_depth) = self.parse_and()?;
            depth = Self::check_depth(depth.max(rhs_depth) + 1, &op)?;
            lhs = Expr::or(lhs, rhs);
        }
        Ok((lhs, depth))
    }

    fn parse_and(&mut self) -> Parsed {
        let (mut lhs, mut depth) = self.parse_comparison()?;
        while let Some(TokenKind::AndAnd) = self.peek_kind() {
            let op = self.advance().ok_or_else(|| self.unexpected_end())?;
            let (rhs, rhs_depth) = self.parse_comparison()?;
            depth = Self::check_depth(depth.max(rhs_depth) + 1, &op)?;
            lhs = Expr::and(lhs, rhs);
        }
        Ok((lhs, depth))
    }

    fn parse_comparison(&mut self) -> Parsed {
        let (lhs, depth) = self.parse_bit_and()?;
        let Some(op) = self.peek_kind().and_then(comparison_op) else {
            return Ok((lhs, depth));
        };

        let op_token = self.advance().ok_or_else(|| self.unexpected_end())?;
        let (rhs, rhs_depth) = self.parse_bit_and()?;
        let depth = Self::check_depth(depth.max(rhs_depth) + 1, &op_token)?;

        if let Some(next) = self.peek() {
            if comparison_op(&next.kind).is_some() {
                return Err(Self::error_at(next, SyntaxErrorKind::ChainedComparison));
            }
        }

        Ok((Expr::comparison(op, lhs, rhs), depth))
    }

    fn parse_bit_and(&mut self) -> Parsed {
        let (mut lhs, mut depth) = self.parse_primary()?;
        while let Some(TokenKind::Amp) = self.peek_kind() {
            let op = self.advance().ok_or_else(|| self.unexpected_end())?;
            let (rhs, rhs_depth) = self.parse_primary()?;
            depth = Self::check_depth(depth.max(rhs_depth) + 1, &op)?;
            lhs = Expr::bit_and(lhs, rhs);
        }
        Ok((lhs, depth))
    }

    fn parse_primary(&mut self) -> Parsed {
        let token = self.advance().ok_or_else(|| self.unexpected_end())?;

        let expr = match token.kind {
            TokenKind::Path(ref path) => Expr::field(path.as_str()),
            TokenKind::Int(n) => Expr::literal(Literal::Int(n)),
            TokenKind::Float(n) => Expr::literal(Literal::Float(n)),
            TokenKind::Str(ref s) => Expr::literal(Literal::Str(s.clone())),
            TokenKind::True => Expr::literal(Literal::Bool(true)),
            TokenKind::False => Expr::literal(Literal::Bool(false)),
            TokenKind::LParen => return self.parse_group(&token),
            ref other => {
                return Err(Self::error_at(
                    &token,
                    SyntaxErrorKind::UnexpectedToken(other.to_string()),
                ));
            }
        };

        Ok((expr, 1))
    }

    fn parse_group(&mut self, open: &Token) -> Parsed {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(Self::error_at(open, SyntaxErrorKind::TooDeep(MAX_DEPTH)));
        }

        let (inner, depth) = self.parse_or()?;

        match self.advance() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => {
                self.nesting -= 1;
                let depth = Self::check_depth(depth + 1, open)?;
                Ok((Expr::group(inner), depth))
            }
            Some(other) => Err(Self::error_at(
                &other,
                SyntaxErrorKind::UnexpectedToken(other.kind.to_string()),
            )),
            None => Err(Self::error_at(open, SyntaxErrorKind::UnclosedParen)),
        }
    }
}

fn comparison_op(kind: &TokenKind) -> Option<ComparisonOp> {
    match kind {
        TokenKind::EqEq => Some(ComparisonOp::Eq),
        TokenKind::NotEq => Some(ComparisonOp::Ne),
        TokenKind::Gt => Some(ComparisonOp::Gt),
        TokenKind::Ge => Some(ComparisonOp::Ge),
        TokenKind::Lt => Some(ComparisonOp::Lt),
        TokenKind::Le => Some(ComparisonOp::Le),
        _ => None,
    }
}

/// 编译后的规则，加载后不可变，可在线程间共享
#[derive(Debug, Clone, Serialize)]
pub struct CompiledRule {
    id: String,
    /// 源码 SHA-256 摘要前缀
    version: String,
    source: String,
    root: Expr,
    /// 规则中使用的所有字段路径
    required_fields: BTreeSet<String>,
    /// 编译版本号（编译器内单调递增）
    compile_version: u64,
    compiled_at: DateTime<Utc>,
}

impl CompiledRule {
    /// 获取规则 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 获取根节点
    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn required_fields(&self) -> &BTreeSet<String> {
        &self.required_fields
    }

    pub fn compile_version(&self) -> u64 {
        self.compile_version
    }

    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }
}

/// 规则编译器
#[derive(Debug, Default)]
pub struct RuleCompiler {
    compile_version: u64,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self { compile_version: 0 }
    }

    /// 编译规则文本
    pub fn compile(&mut self, id: &str, source: &str) -> Result<CompiledRule> {
        let root = parse(source)?;
        let required_fields = root.fields();

        self.compile_version += 1;
        let version = source_digest(source);

        debug!(
            rule_id = %id,
            version = %version,
            fields = required_fields.len(),
            "规则编译完成"
        );

        Ok(CompiledRule {
            id: id.to_string(),
            version,
            source: source.to_string(),
            root,
            required_fields,
            compile_version: self.compile_version,
            compiled_at: Utc::now(),
        })
    }

    /// 从文件读取并编译规则
    pub fn compile_file(&mut self, id: &str, path: impl AsRef<Path>) -> Result<CompiledRule> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.compile(id, &source)
    }
}

/// 源码摘要：SHA-256 的前 12 个十六进制字符
fn source_digest(source: &str) -> String {
    Sha256::digest(source.as_bytes())
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}
