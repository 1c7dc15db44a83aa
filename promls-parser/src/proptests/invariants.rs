//! Parser invariants checked with property-based testing

use proptest::prelude::*;

use crate::{Expr, check, node_at, parse, walk};

use super::generators::{any_input, expression, token_soup};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        .. ProptestConfig::default()
    })]

    #[test]
    fn parser_never_panics(input in any_input()) {
        let _ = parse(&input);
    }

    #[test]
    fn parser_and_checker_never_panic_on_tokens(input in token_soup()) {
        if let Ok(expr) = parse(&input) {
            let _ = check(&expr);
        }
    }

    #[test]
    fn generated_expressions_parse(input in expression()) {
        prop_assert!(parse(&input).is_ok(), "failed to parse {input:?}");
    }

    #[test]
    fn spans_nest_inside_the_input(input in expression()) {
        let expr = parse(&input).map_err(|err| TestCaseError::fail(err.to_string()))?;
        verify_spans_nested(&expr, input.len())?;
    }

    #[test]
    fn lookup_returns_smallest_surrounding_node(input in expression()) {
        let expr = parse(&input).map_err(|err| TestCaseError::fail(err.to_string()))?;
        let root = expr.span();
        for offset in 0..=input.len() + 1 {
            match node_at(&expr, offset) {
                Some(node) => {
                    prop_assert!(node.span().contains(offset));
                    prop_assert!(
                        node.children().iter().all(|child| !child.span().contains(offset)),
                        "a child of {:?} also covers {offset} in {input:?}",
                        node.kind()
                    );
                }
                None => prop_assert!(!root.contains(offset)),
            }
        }
    }
}

/// Every span lies inside the input and inside its parent's span.
fn verify_spans_nested(expr: &Expr, input_len: usize) -> Result<(), TestCaseError> {
    let mut result = Ok(());
    walk(expr, &mut |node| {
        let span = node.span();
        if result.is_ok() && (span.start > span.end || span.end > input_len) {
            result = Err(TestCaseError::fail(format!(
                "span {span:?} outside input of {input_len} bytes"
            )));
        }
        for child in node.children() {
            let inner = child.span();
            if result.is_ok() && (inner.start < span.start || inner.end > span.end) {
                result = Err(TestCaseError::fail(format!(
                    "child span {inner:?} escapes parent {span:?}"
                )));
            }
        }
    });
    result
}
