//! Position based lookups in a parsed tree.

use crate::ast::Expr;

impl Expr {
    /// Direct children in source order.
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::NumberLiteral(_) | Self::StringLiteral(_) | Self::VectorSelector(_) => Vec::new(),
            Self::MatrixSelector(ms) => vec![ms.vector.as_ref()],
            Self::Call(call) => call.args.iter().collect(),
            Self::BinaryExpr(bin) => vec![bin.lhs.as_ref(), bin.rhs.as_ref()],
            Self::AggregateExpr(agg) => agg
                .param
                .as_deref()
                .into_iter()
                .chain(std::iter::once(agg.expr.as_ref()))
                .collect(),
            Self::ParenExpr(paren) => vec![paren.expr.as_ref()],
            Self::SubqueryExpr(sq) => vec![sq.expr.as_ref()],
            Self::UnaryExpr(unary) => vec![unary.expr.as_ref()],
        }
    }
}

/// The smallest node whose span contains `offset`.
#[must_use]
pub fn node_at(expr: &Expr, offset: usize) -> Option<&Expr> {
    path_at(expr, offset).pop()
}

/// Every node containing `offset`, from the root down to the smallest one.
#[must_use]
pub fn path_at(expr: &Expr, offset: usize) -> Vec<&Expr> {
    let mut path = Vec::new();
    let mut current = Some(expr);
    while let Some(node) = current.filter(|node| node.span().contains(offset)) {
        path.push(node);
        current = node
            .children()
            .into_iter()
            .find(|child| child.span().contains(offset));
    }
    path
}

/// Visit every node in pre-order.
pub fn walk<'a>(expr: &'a Expr, visitor: &mut impl FnMut(&'a Expr)) {
    visitor(expr);
    for child in expr.children() {
        walk(child, visitor);
    }
}
