//! PromQL parser producing a typed syntax tree with byte spans.
//!
//! [`parse`] checks syntax only, so editors still get a tree to navigate when an expression
//! is well formed but ill typed. Run [`check`] on the result for Prometheus' type rules.
//!
//! ```
//! let expr = promls_parser::parse("sum by (job) (rate(http_requests_total[5m]))")?;
//! assert_eq!(expr.kind(), "AggregateExpr");
//! promls_parser::check(&expr)?;
//! # Ok::<(), promls_parser::Error>(())
//! ```

mod ast;
mod check;
mod duration;
mod error;
pub mod functions;
mod grammar;
#[cfg(test)]
mod proptests;
mod visit;

pub use ast::{
    AggregateExpr, AggregateOp, AtModifier, BinModifiers, BinaryExpr, BinaryOp, Call, Expr,
    Grouping, LabelMatcher, MatchCardinality, MatchOp, MatrixSelector, NumberLiteral, Offset,
    ParenExpr, Span, StringLiteral, SubqueryExpr, UnaryExpr, UnaryOp, ValueType, VectorMatching,
    VectorSelector,
};
pub use check::check;
pub use duration::parse_duration;
pub use error::Error;
pub use visit::{node_at, path_at, walk};

/// Parse a single PromQL expression.
///
/// # Errors
///
/// Returns [`Error::Syntax`] with the byte offset of the first unexpected character and the
/// set of tokens that would have been accepted there.
#[tracing::instrument(level = "trace")]
pub fn parse(input: &str) -> Result<Expr, Error> {
    grammar::promql::query(input).map_err(|err| {
        tracing::trace!(%err, "failed to parse expression");
        Error::from_peg(input, &err)
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case("1")]
    #[case("0x1F")]
    #[case("1.5e3")]
    #[case(".5")]
    #[case("Inf")]
    #[case("-nan")]
    #[case("\"double\\\"quoted\"")]
    #[case("'single'")]
    #[case("`raw\\string`")]
    #[case("up")]
    #[case("job:request_rate:5m")]
    #[case("up{job=\"api\", instance!~\"10\\\\..*\",}")]
    #[case("{__name__=~\"http_.*\"}")]
    #[case("rate(http_requests_total[5m] offset 1h)")]
    #[case("up offset -5m")]
    #[case("up @ 1609746000")]
    #[case("up @ start()")]
    #[case("rate(up[5m])[30m:1m]")]
    #[case("max_over_time(deriv(rate(up[1m])[5m:])[1h:])")]
    #[case("sum(up) by (job)")]
    #[case("SUM BY (job) (up)")]
    #[case("sum without (instance,) (up)")]
    #[case("topk(3, sum by (job) (up))")]
    #[case("a / on(job) group_left(instance) b")]
    #[case("a > bool ignoring(x) b")]
    #[case("a unless b or c and d")]
    #[case("2 ^ 3 ^ 2")]
    #[case("1 atan2 2")]
    #[case("(up)")]
    #[case("up # trailing comment\n")]
    #[case("  up\n")]
    fn test_parses(#[case] input: &str) {
        assert!(parse(input).is_ok(), "failed to parse {input:?}: {:?}", parse(input));
    }

    #[rstest]
    #[case("")]
    #[case("up{")]
    #[case("sum(")]
    #[case("up[5m")]
    #[case("up[5x]")]
    #[case("1 +")]
    #[case("up offset 5m offset 1m")]
    #[case("(up)[5m]")]
    #[case("up offset 5m[1m]")]
    #[case("sum by (job) (up) by (job)")]
    #[case("\"unterminated")]
    #[case("and")]
    fn test_rejects(#[case] input: &str) {
        assert!(
            matches!(parse(input), Err(Error::Syntax { .. })),
            "expected syntax error for {input:?}, got {:?}",
            parse(input)
        );
    }

    #[test]
    fn test_signed_number_literals() -> Result<(), Error> {
        // The smallest node at offset 4 is the outer `+`.
        let expr = parse("+1 + -2 * 1")?;
        let Expr::BinaryExpr(bin) = &expr else {
            panic!("expected a binary expression, got {expr:?}");
        };
        assert_eq!(bin.op, BinaryOp::Add);
        assert_eq!(bin.op_span, Span::new(3, 4));
        assert_eq!(
            *bin.lhs,
            Expr::NumberLiteral(NumberLiteral {
                value: 1.0,
                span: Span::new(0, 2)
            })
        );
        let Expr::BinaryExpr(rhs) = bin.rhs.as_ref() else {
            panic!("expected a binary right hand side");
        };
        assert_eq!(rhs.op, BinaryOp::Mul);
        assert!(matches!(rhs.lhs.as_ref(), Expr::NumberLiteral(n) if n.value == -2.0));
        assert_eq!(node_at(&expr, 4).map(Expr::kind), Some("BinaryExpr"));
        Ok(())
    }

    #[test]
    fn test_precedence() -> Result<(), Error> {
        let expr = parse("a or b and c + d * e ^ f ^ g")?;
        let Expr::BinaryExpr(or) = &expr else {
            panic!("expected `or` at the root");
        };
        assert_eq!(or.op, BinaryOp::Or);
        let Expr::BinaryExpr(and) = or.rhs.as_ref() else {
            panic!("expected `and` below `or`");
        };
        assert_eq!(and.op, BinaryOp::And);
        let Expr::BinaryExpr(add) = and.rhs.as_ref() else {
            panic!("expected `+` below `and`");
        };
        assert_eq!(add.op, BinaryOp::Add);
        let Expr::BinaryExpr(mul) = add.rhs.as_ref() else {
            panic!("expected `*` below `+`");
        };
        let Expr::BinaryExpr(pow) = mul.rhs.as_ref() else {
            panic!("expected `^` below `*`");
        };
        assert_eq!(pow.op, BinaryOp::Pow);
        // Right associative: e ^ (f ^ g).
        assert!(matches!(pow.rhs.as_ref(), Expr::BinaryExpr(inner) if inner.op == BinaryOp::Pow));
        Ok(())
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() -> Result<(), Error> {
        let expr = parse("-2 ^ 2")?;
        assert_eq!(expr.kind(), "UnaryExpr");
        assert_eq!(expr.span(), Span::new(0, 6));
        Ok(())
    }

    #[test]
    fn test_selector_spans() -> Result<(), Error> {
        let expr = parse("http_requests_total{job=\"api\"}[5m] offset 1h")?;
        let Expr::MatrixSelector(ms) = &expr else {
            panic!("expected a matrix selector, got {expr:?}");
        };
        assert_eq!(ms.range, Duration::from_secs(300));
        assert_eq!(ms.span, Span::new(0, 44));
        let vs = ms.selector().expect("vector selector inside matrix");
        assert_eq!(vs.name.as_deref(), Some("http_requests_total"));
        assert_eq!(vs.name_span, Some(Span::new(0, 19)));
        assert_eq!(vs.matchers_span, Some(Span::new(19, 30)));
        assert_eq!(
            vs.offset,
            Some(Offset {
                duration: Duration::from_secs(3_600),
                negative: false
            })
        );
        let matcher = vs.matchers.first().expect("one matcher");
        assert_eq!(matcher.name, "job");
        assert_eq!(matcher.name_span, Span::new(20, 23));
        assert_eq!(matcher.op, MatchOp::Equal);
        assert_eq!(matcher.value, "api");
        assert_eq!(matcher.value_span, Span::new(24, 29));
        Ok(())
    }

    #[test]
    fn test_call_spans() -> Result<(), Error> {
        let expr = parse("clamp_max(up, 1)")?;
        let Expr::Call(call) = &expr else {
            panic!("expected a call, got {expr:?}");
        };
        assert_eq!(call.func, "clamp_max");
        assert_eq!(call.name_span, Span::new(0, 9));
        assert_eq!(call.args_span, Span::new(9, 16));
        assert_eq!(call.args.len(), 2);
        Ok(())
    }

    #[test]
    fn test_aggregation_with_trailing_grouping() -> Result<(), Error> {
        let expr = parse("count_values(\"v\", build_info) without (instance)")?;
        let Expr::AggregateExpr(agg) = &expr else {
            panic!("expected an aggregation, got {expr:?}");
        };
        assert_eq!(agg.op, AggregateOp::CountValues);
        assert_eq!(agg.op_span, Span::new(0, 12));
        assert!(matches!(agg.param.as_deref(), Some(Expr::StringLiteral(s)) if s.value == "v"));
        assert_eq!(
            agg.grouping,
            Some(Grouping {
                without: true,
                labels: vec!["instance".to_string()]
            })
        );
        assert_eq!(agg.span, Span::new(0, 48));
        Ok(())
    }

    #[test]
    fn test_string_escapes() -> Result<(), Error> {
        let expr = parse("\"a\\tb\\u00e9\"")?;
        assert!(matches!(&expr, Expr::StringLiteral(s) if s.value == "a\tbé"));
        Ok(())
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_syntax_error_offset() {
        let err = parse("sum(rate(up[5m])").expect_err("unclosed call");
        assert_eq!(err.offset(), 16);
        assert!(err.to_string().starts_with("unexpected end of input"));
    }
}
