//! Type checking of a parsed expression.
//!
//! The grammar accepts anything that is syntactically well formed. This pass rejects the
//! expressions Prometheus would refuse to evaluate: unknown functions, wrong argument counts
//! and types, and operators applied to operands they do not support.

use crate::{
    Error,
    ast::{
        AggregateExpr, BinaryExpr, Call, Expr, MatchCardinality, ValueType, VectorSelector,
    },
    functions,
};

/// Check `expr` and return the type it evaluates to.
///
/// # Errors
///
/// Returns the first [`Error::Semantic`] found in a depth first walk of the tree.
pub fn check(expr: &Expr) -> Result<ValueType, Error> {
    match expr {
        Expr::NumberLiteral(_) => Ok(ValueType::Scalar),
        Expr::StringLiteral(_) => Ok(ValueType::String),
        Expr::VectorSelector(vs) => check_selector(vs).map(|()| ValueType::Vector),
        Expr::MatrixSelector(ms) => check(&ms.vector).map(|_| ValueType::Matrix),
        Expr::ParenExpr(paren) => check(&paren.expr),
        Expr::SubqueryExpr(sq) => {
            let inner = check(&sq.expr)?;
            if inner != ValueType::Vector {
                return Err(Error::semantic(
                    sq.span,
                    format!("subquery is only allowed on instant vector, got {inner} instead"),
                ));
            }
            Ok(ValueType::Matrix)
        }
        Expr::UnaryExpr(unary) => {
            let inner = check(&unary.expr)?;
            if matches!(inner, ValueType::Scalar | ValueType::Vector) {
                Ok(inner)
            } else {
                Err(Error::semantic(
                    unary.span,
                    format!(
                        "unary expression only allowed on expressions of type scalar or instant vector, got {inner}"
                    ),
                ))
            }
        }
        Expr::Call(call) => check_call(call),
        Expr::AggregateExpr(agg) => check_aggregate(agg),
        Expr::BinaryExpr(bin) => check_binary(bin),
    }
}

fn check_selector(vs: &VectorSelector) -> Result<(), Error> {
    if vs.name.is_some() && vs.matchers.iter().any(|m| m.name == "__name__") {
        return Err(Error::semantic(
            vs.span,
            format!(
                "metric name must not be set twice: {:?}",
                vs.name.as_deref().unwrap_or_default()
            ),
        ));
    }
    if vs.name.is_none() && vs.matchers.iter().all(crate::ast::LabelMatcher::matches_empty) {
        return Err(Error::semantic(
            vs.span,
            "vector selector must contain at least one non-empty matcher",
        ));
    }
    Ok(())
}

fn check_call(call: &Call) -> Result<ValueType, Error> {
    let Some(func) = functions::function(&call.func) else {
        return Err(Error::semantic(
            call.name_span,
            format!("unknown function with name {:?}", call.func),
        ));
    };

    let given = call.args.len();
    let max = func.params.len();
    if given < func.required() || (!func.variadic && given > max) {
        let expected = if func.variadic {
            format!("at least {}", func.required())
        } else if func.optional > 0 {
            format!("{} to {max}", func.required())
        } else {
            max.to_string()
        };
        return Err(Error::semantic(
            call.span,
            format!(
                "expected {expected} argument(s) in call to {:?}, got {given}",
                call.func
            ),
        ));
    }

    for (idx, arg) in call.args.iter().enumerate() {
        let param = func
            .params
            .get(idx)
            .or_else(|| func.params.last().filter(|_| func.variadic));
        let actual = check(arg)?;
        if let Some(param) = param
            && param.kind != actual
        {
            return Err(Error::semantic(
                arg.span(),
                format!(
                    "expected type {} in call to function {:?}, got {actual}",
                    param.kind, call.func
                ),
            ));
        }
    }
    Ok(func.returns)
}

fn check_aggregate(agg: &AggregateExpr) -> Result<ValueType, Error> {
    let expected_args = if agg.op.param_type().is_some() { 2 } else { 1 };
    let given_args = if agg.param.is_some() { 2 } else { 1 };
    if expected_args != given_args {
        return Err(Error::semantic(
            agg.span,
            format!(
                "wrong number of arguments for aggregate expression provided, expected {expected_args}, got {given_args}"
            ),
        ));
    }

    if let (Some(kind), Some(param)) = (agg.op.param_type(), agg.param.as_deref()) {
        let actual = check(param)?;
        if actual != kind {
            return Err(Error::semantic(
                param.span(),
                format!(
                    "expected type {kind} in aggregation parameter of {}, got {actual}",
                    agg.op
                ),
            ));
        }
    }

    let inner = check(&agg.expr)?;
    if inner != ValueType::Vector {
        return Err(Error::semantic(
            agg.expr.span(),
            format!("expected type instant vector in aggregation expression, got {inner}"),
        ));
    }
    Ok(ValueType::Vector)
}

fn check_binary(bin: &BinaryExpr) -> Result<ValueType, Error> {
    let lhs = check(&bin.lhs)?;
    let rhs = check(&bin.rhs)?;
    let operand_ok = |t: ValueType| matches!(t, ValueType::Scalar | ValueType::Vector);

    if !operand_ok(lhs) || !operand_ok(rhs) {
        return Err(Error::semantic(
            bin.span,
            "binary expression must contain only scalar and instant vector types",
        ));
    }
    if bin.modifiers.return_bool && !bin.op.is_comparison() {
        return Err(Error::semantic(
            bin.op_span,
            "bool modifier can only be used on comparison operators",
        ));
    }
    let both_scalar = lhs == ValueType::Scalar && rhs == ValueType::Scalar;
    if bin.op.is_comparison() && both_scalar && !bin.modifiers.return_bool {
        return Err(Error::semantic(
            bin.span,
            "comparisons between scalars must use BOOL modifier",
        ));
    }
    if bin.op.is_set_operator() && (lhs == ValueType::Scalar || rhs == ValueType::Scalar) {
        return Err(Error::semantic(
            bin.span,
            format!("set operator {:?} not allowed in binary scalar expression", bin.op.as_str()),
        ));
    }
    if let Some(matching) = &bin.modifiers.matching {
        if lhs != ValueType::Vector || rhs != ValueType::Vector {
            return Err(Error::semantic(
                bin.span,
                "vector matching only allowed between instant vectors",
            ));
        }
        if bin.op.is_set_operator() && matching.card != MatchCardinality::OneToOne {
            return Err(Error::semantic(
                bin.op_span,
                format!("no grouping allowed for {:?} operation", bin.op.as_str()),
            ));
        }
    }

    Ok(if both_scalar {
        ValueType::Scalar
    } else {
        ValueType::Vector
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn check_str(input: &str) -> Result<ValueType, Error> {
        check(&parse(input)?)
    }

    #[rstest]
    #[case("1 + 1", ValueType::Scalar)]
    #[case("up", ValueType::Vector)]
    #[case("up[5m]", ValueType::Matrix)]
    #[case("rate(http_requests_total[5m])", ValueType::Vector)]
    #[case("sum by (job) (rate(http_requests_total[5m]))", ValueType::Vector)]
    #[case("topk(5, up)", ValueType::Vector)]
    #[case("count_values(\"version\", build_info)", ValueType::Vector)]
    #[case("time()", ValueType::Scalar)]
    #[case("1 > bool 2", ValueType::Scalar)]
    #[case("up == 1", ValueType::Vector)]
    #[case("max_over_time(up[1h:5m])", ValueType::Vector)]
    #[case("label_join(up, \"dst\", \",\", \"a\", \"b\", \"c\")", ValueType::Vector)]
    #[case("round(up)", ValueType::Vector)]
    #[case("round(up, 10)", ValueType::Vector)]
    #[case("a * on(job) group_left(instance) b", ValueType::Vector)]
    #[case("-up", ValueType::Vector)]
    #[case("\"text\"", ValueType::String)]
    fn test_valid_expressions(#[case] input: &str, #[case] expected: ValueType) {
        assert_eq!(check_str(input), Ok(expected));
    }

    #[rstest]
    #[case("foo(up)", "unknown function with name \"foo\"")]
    #[case("rate(up)", "expected type range vector in call to function \"rate\", got instant vector")]
    #[case("abs(up, up)", "expected 1 argument(s) in call to \"abs\", got 2")]
    #[case("round()", "expected 1 to 2 argument(s) in call to \"round\", got 0")]
    #[case("topk(up)", "wrong number of arguments for aggregate expression provided, expected 2, got 1")]
    #[case("sum(1, up)", "wrong number of arguments for aggregate expression provided, expected 1, got 2")]
    #[case("count_values(1, up)", "expected type string in aggregation parameter of count_values, got scalar")]
    #[case("sum(up[5m])", "expected type instant vector in aggregation expression, got range vector")]
    #[case("1 and up", "set operator \"and\" not allowed in binary scalar expression")]
    #[case("up + bool up", "bool modifier can only be used on comparison operators")]
    #[case("1 == 1", "comparisons between scalars must use BOOL modifier")]
    #[case("1 + on(job) up", "vector matching only allowed between instant vectors")]
    #[case("a and on(job) group_left b", "no grouping allowed for \"and\" operation")]
    #[case("{job=\"\"}", "vector selector must contain at least one non-empty matcher")]
    #[case("up{__name__=\"up\"}", "metric name must not be set twice: \"up\"")]
    #[case("up[5m] + 1", "binary expression must contain only scalar and instant vector types")]
    #[case("-\"a\"", "unary expression only allowed on expressions of type scalar or instant vector, got string")]
    #[case("up[5m][10m:]", "subquery is only allowed on instant vector, got range vector instead")]
    fn test_rejected_expressions(#[case] input: &str, #[case] message: &str) {
        let err = check_str(input).expect_err("expression should be rejected");
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn test_unknown_function_span_is_the_name() {
        let err = check_str("sum(foo(up))").expect_err("unknown function");
        assert_eq!(err.span(), Some(crate::ast::Span::new(4, 7)));
    }
}
