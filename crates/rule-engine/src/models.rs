//! 规则引擎领域模型

use crate::operators::ComparisonOp;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// 点号分隔的字段路径，解析时预先切分为段
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw.split('.').map(str::to_string).collect();
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// 规则中的字面量
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            // {:?} 保证浮点数始终带小数点，重新解析后仍是浮点数
            Self::Float(n) => write!(f, "{:?}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        '\0' => f.write_str("\\0")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// 规则表达式树
///
/// 括号分组以 `Group` 节点保留，`Display` 输出规范化的源码文本，
/// 重新解析后得到相同的树。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Field {
        path: FieldPath,
    },
    Literal {
        value: Literal,
    },
    Comparison {
        op: ComparisonOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Or {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    BitAnd {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Group {
        inner: Box<Expr>,
    },
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field {
            path: FieldPath::new(path),
        }
    }

    pub fn literal(value: Literal) -> Self {
        Self::Literal { value }
    }

    pub fn comparison(op: ComparisonOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Comparison {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::And {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Self::Or {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn bit_and(lhs: Expr, rhs: Expr) -> Self {
        Self::BitAnd {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn group(inner: Expr) -> Self {
        Self::Group {
            inner: Box::new(inner),
        }
    }

    /// 表达式引用的所有字段路径
    pub fn fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        match self {
            Self::Field { path } => {
                fields.insert(path.as_str().to_string());
            }
            Self::Literal { .. } => {}
            Self::Comparison { lhs, rhs, .. }
            | Self::And { lhs, rhs }
            | Self::Or { lhs, rhs }
            | Self::BitAnd { lhs, rhs } => {
                lhs.collect_fields(fields);
                rhs.collect_fields(fields);
            }
            Self::Group { inner } => inner.collect_fields(fields),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { path } => write!(f, "{}", path),
            Self::Literal { value } => write!(f, "{}", value),
            Self::Comparison { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Self::And { lhs, rhs } => write!(f, "{} && {}", lhs, rhs),
            Self::Or { lhs, rhs } => write!(f, "{} || {}", lhs, rhs),
            Self::BitAnd { lhs, rhs } => write!(f, "{} & {}", lhs, rhs),
            Self::Group { inner } => write!(f, "({})", inner),
        }
    }
}

/// 规则评估决策
///
/// 不包含耗时等非确定性数据，相同输入总是得到相等的决策。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub accept: bool,
    pub rule_id: String,
    pub rule_version: String,
    /// 导致拒绝的子句（规范化文本）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    /// 评估追踪，仅在开启追踪时填充
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evaluation_trace: Vec<String>,
}

impl Decision {
    pub fn accepted(rule_id: impl Into<String>, rule_version: impl Into<String>) -> Self {
        Self {
            accept: true,
            rule_id: rule_id.into(),
            rule_version: rule_version.into(),
            rejected_by: None,
            evaluation_trace: Vec::new(),
        }
    }

    pub fn rejected(
        rule_id: impl Into<String>,
        rule_version: impl Into<String>,
        rejected_by: impl Into<String>,
    ) -> Self {
        Self {
            accept: false,
            rule_id: rule_id.into(),
            rule_version: rule_version.into(),
            rejected_by: Some(rejected_by.into()),
            evaluation_trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.evaluation_trace = trace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_segments() {
        let path = FieldPath::new("ChannelAccept.OneMl.Noderank.Age");
        assert_eq!(path.segments(), ["ChannelAccept", "OneMl", "Noderank", "Age"]);
        assert_eq!(path.to_string(), "ChannelAccept.OneMl.Noderank.Age");
    }

    #[test]
    fn test_expr_display_preserves_groups() {
        let expr = Expr::and(
            Expr::comparison(
                ComparisonOp::Ge,
                Expr::field("A"),
                Expr::literal(Literal::Int(750000)),
            ),
            Expr::group(Expr::or(
                Expr::field("B"),
                Expr::comparison(
                    ComparisonOp::Eq,
                    Expr::group(Expr::bit_and(Expr::field("C"), Expr::literal(Literal::Int(1)))),
                    Expr::literal(Literal::Int(0)),
                ),
            )),
        );
        assert_eq!(expr.to_string(), "A >= 750000 && (B || (C & 1) == 0)");
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Float(1.0).to_string(), "1.0");
        assert_eq!(Literal::Int(-5).to_string(), "-5");
        assert_eq!(Literal::Str("a\"b\n".to_string()).to_string(), r#""a\"b\n""#);
        assert_eq!(Literal::Bool(true).to_string(), "true");
    }

    #[test]
    fn test_fields_collected_once() {
        let expr = Expr::or(
            Expr::field("A.B"),
            Expr::and(Expr::field("C"), Expr::field("A.B")),
        );
        let fields: Vec<_> = expr.fields().into_iter().collect();
        assert_eq!(fields, vec!["A.B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_expr_serialization() {
        let expr = Expr::comparison(
            ComparisonOp::Gt,
            Expr::field("ChannelAccept.Event.FundingAmt"),
            Expr::literal(Literal::Int(1)),
        );
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["type"], "comparison");
        assert_eq!(json["op"], ">");
        assert_eq!(json["lhs"]["path"], "ChannelAccept.Event.FundingAmt");
        assert_eq!(json["rhs"]["value"], 1);
    }

    #[test]
    fn test_decision_serialization_skips_empty() {
        let decision = Decision::accepted("ChannelAccept", "abc123");
        let json = serde_json::to_value(&decision).unwrap();
        assert!(json.get("rejected_by").is_none());
        assert!(json.get("evaluation_trace").is_none());
        assert_eq!(json["accept"], true);
    }
}
