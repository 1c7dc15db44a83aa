//! Typed PromQL syntax tree.
//!
//! Every node carries a [`Span`] of byte offsets into the text that was parsed. Offsets are
//! relative to the start of that text, so callers that parse a slice of a bigger buffer add
//! the slice start themselves.

use std::{fmt, time::Duration};

/// A half-open byte range `[start, end)` into the parsed text.
#[derive(Debug, Default, Clone, Copy, Hash, Eq, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Check if a byte offset falls within this span (end exclusive).
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Like [`Span::contains`] but also accepts the end offset, which is where the cursor
    /// sits right after typing the last character of a token.
    #[must_use]
    pub fn touches(&self, offset: usize) -> bool {
        offset >= self.start && offset <= self.end
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The type an expression evaluates to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ValueType {
    Scalar,
    Vector,
    Matrix,
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scalar => "scalar",
            Self::Vector => "instant vector",
            Self::Matrix => "range vector",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NumberLiteral(NumberLiteral),
    StringLiteral(StringLiteral),
    VectorSelector(VectorSelector),
    MatrixSelector(MatrixSelector),
    Call(Call),
    BinaryExpr(BinaryExpr),
    AggregateExpr(AggregateExpr),
    ParenExpr(ParenExpr),
    SubqueryExpr(SubqueryExpr),
    UnaryExpr(UnaryExpr),
}

impl Expr {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::NumberLiteral(n) => n.span,
            Self::StringLiteral(s) => s.span,
            Self::VectorSelector(v) => v.span,
            Self::MatrixSelector(m) => m.span,
            Self::Call(c) => c.span,
            Self::BinaryExpr(b) => b.span,
            Self::AggregateExpr(a) => a.span,
            Self::ParenExpr(p) => p.span,
            Self::SubqueryExpr(s) => s.span,
            Self::UnaryExpr(u) => u.span,
        }
    }

    /// Short human readable name of the node kind, used in logs and tests.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NumberLiteral(_) => "NumberLiteral",
            Self::StringLiteral(_) => "StringLiteral",
            Self::VectorSelector(_) => "VectorSelector",
            Self::MatrixSelector(_) => "MatrixSelector",
            Self::Call(_) => "Call",
            Self::BinaryExpr(_) => "BinaryExpr",
            Self::AggregateExpr(_) => "AggregateExpr",
            Self::ParenExpr(_) => "ParenExpr",
            Self::SubqueryExpr(_) => "SubqueryExpr",
            Self::UnaryExpr(_) => "UnaryExpr",
        }
    }

    pub(crate) fn set_span_end(&mut self, end: usize) {
        match self {
            Self::NumberLiteral(n) => n.span.end = end,
            Self::StringLiteral(s) => s.span.end = end,
            Self::VectorSelector(v) => v.span.end = end,
            Self::MatrixSelector(m) => m.span.end = end,
            Self::Call(c) => c.span.end = end,
            Self::BinaryExpr(b) => b.span.end = end,
            Self::AggregateExpr(a) => a.span.end = end,
            Self::ParenExpr(p) => p.span.end = end,
            Self::SubqueryExpr(s) => s.span.end = end,
            Self::UnaryExpr(u) => u.span.end = end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    pub value: f64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MatchOp {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regex => "=~",
            Self::NotRegex => "!~",
        };
        f.write_str(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatcher {
    pub name: String,
    pub name_span: Span,
    pub op: MatchOp,
    pub value: String,
    /// Span of the quoted value, quotes included.
    pub value_span: Span,
    pub span: Span,
}

impl LabelMatcher {
    /// Whether this matcher matches the empty string, in which case it does not restrict
    /// the selection on its own.
    #[must_use]
    pub fn matches_empty(&self) -> bool {
        match self.op {
            MatchOp::Equal => self.value.is_empty(),
            MatchOp::NotEqual => !self.value.is_empty(),
            // A regex like `.*` matches the empty string; `.+` does not. Without a regex
            // engine we only recognise the obvious forms.
            MatchOp::Regex => matches!(self.value.as_str(), "" | ".*"),
            MatchOp::NotRegex => !matches!(self.value.as_str(), "" | ".*"),
        }
    }
}

/// `@` modifier value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtModifier {
    Timestamp(f64),
    Start,
    End,
}

/// `offset` modifier, possibly negative.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Offset {
    pub duration: Duration,
    pub negative: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSelector {
    pub name: Option<String>,
    pub name_span: Option<Span>,
    pub matchers: Vec<LabelMatcher>,
    /// Span of the `{...}` block, braces included.
    pub matchers_span: Option<Span>,
    pub offset: Option<Offset>,
    pub at: Option<AtModifier>,
    pub span: Span,
}

impl VectorSelector {
    /// The metric name, either written before the braces or as a `__name__` matcher.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        self.name.as_deref().or_else(|| {
            self.matchers
                .iter()
                .find(|m| m.name == "__name__" && m.op == MatchOp::Equal)
                .map(|m| m.value.as_str())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSelector {
    /// Always an [`Expr::VectorSelector`].
    pub vector: Box<Expr>,
    pub range: Duration,
    pub span: Span,
}

impl MatrixSelector {
    #[must_use]
    pub fn selector(&self) -> Option<&VectorSelector> {
        match self.vector.as_ref() {
            Expr::VectorSelector(vs) => Some(vs),
            Expr::NumberLiteral(_)
            | Expr::StringLiteral(_)
            | Expr::MatrixSelector(_)
            | Expr::Call(_)
            | Expr::BinaryExpr(_)
            | Expr::AggregateExpr(_)
            | Expr::ParenExpr(_)
            | Expr::SubqueryExpr(_)
            | Expr::UnaryExpr(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: String,
    pub name_span: Span,
    pub args: Vec<Expr>,
    /// Span of the parenthesised argument list, parens included.
    pub args_span: Span,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum BinaryOp {
    Or,
    And,
    Unless,
    Eql,
    Neq,
    Lte,
    Lss,
    Gte,
    Gtr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Atan2,
    Pow,
}

impl BinaryOp {
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eql | Self::Neq | Self::Lte | Self::Lss | Self::Gte | Self::Gtr
        )
    }

    #[must_use]
    pub fn is_set_operator(self) -> bool {
        matches!(self, Self::Or | Self::And | Self::Unless)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Unless => "unless",
            Self::Eql => "==",
            Self::Neq => "!=",
            Self::Lte => "<=",
            Self::Lss => "<",
            Self::Gte => ">=",
            Self::Gtr => ">",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Atan2 => "atan2",
            Self::Pow => "^",
        }
    }

    pub(crate) fn from_comparison(op: &str) -> Option<Self> {
        match op {
            "==" => Some(Self::Eql),
            "!=" => Some(Self::Neq),
            "<=" => Some(Self::Lte),
            "<" => Some(Self::Lss),
            ">=" => Some(Self::Gte),
            ">" => Some(Self::Gtr),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MatchCardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
}

/// `on`/`ignoring` and `group_left`/`group_right` clauses of a binary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatching {
    /// `true` for `on(...)`, `false` for `ignoring(...)`.
    pub on: bool,
    pub labels: Vec<String>,
    pub card: MatchCardinality,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinModifiers {
    pub return_bool: bool,
    pub matching: Option<VectorMatching>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub op_span: Span,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    pub modifiers: BinModifiers,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum AggregateOp {
    Avg,
    Bottomk,
    Count,
    CountValues,
    Group,
    Max,
    Min,
    Quantile,
    Stddev,
    Stdvar,
    Sum,
    Topk,
}

impl AggregateOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Bottomk => "bottomk",
            Self::Count => "count",
            Self::CountValues => "count_values",
            Self::Group => "group",
            Self::Max => "max",
            Self::Min => "min",
            Self::Quantile => "quantile",
            Self::Stddev => "stddev",
            Self::Stdvar => "stdvar",
            Self::Sum => "sum",
            Self::Topk => "topk",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(Self::Avg),
            "bottomk" => Some(Self::Bottomk),
            "count" => Some(Self::Count),
            "count_values" => Some(Self::CountValues),
            "group" => Some(Self::Group),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "quantile" => Some(Self::Quantile),
            "stddev" => Some(Self::Stddev),
            "stdvar" => Some(Self::Stdvar),
            "sum" => Some(Self::Sum),
            "topk" => Some(Self::Topk),
            _ => None,
        }
    }

    /// Type of the leading parameter, for the operators that take one.
    #[must_use]
    pub fn param_type(self) -> Option<ValueType> {
        match self {
            Self::Bottomk | Self::Topk | Self::Quantile => Some(ValueType::Scalar),
            Self::CountValues => Some(ValueType::String),
            Self::Avg
            | Self::Count
            | Self::Group
            | Self::Max
            | Self::Min
            | Self::Stddev
            | Self::Stdvar
            | Self::Sum => None,
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    /// `true` for `without(...)`, `false` for `by(...)`.
    pub without: bool,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub op: AggregateOp,
    pub op_span: Span,
    pub expr: Box<Expr>,
    pub param: Option<Box<Expr>>,
    pub grouping: Option<Grouping>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParenExpr {
    pub expr: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpr {
    pub expr: Box<Expr>,
    pub range: Duration,
    pub step: Option<Duration>,
    pub offset: Option<Offset>,
    pub at: Option<AtModifier>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub expr: Box<Expr>,
    pub span: Span,
}
