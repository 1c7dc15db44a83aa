//! Input generators for property-based testing
#![allow(clippy::expect_used)]
use proptest::prelude::*;

/// Any string, including control characters and multi-byte text.
pub(super) fn any_input() -> impl Strategy<Value = String> {
    prop::string::string_regex(".{0,64}").expect("Failed to create any string strategy")
}

/// Strings built from PromQL tokens, mostly invalid when put together at random.
pub(super) fn token_soup() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("sum"),
            Just("rate"),
            Just("by"),
            Just("("),
            Just(")"),
            Just("{"),
            Just("}"),
            Just("["),
            Just("]"),
            Just("5m"),
            Just(":"),
            Just("="),
            Just("=~"),
            Just("\""),
            Just("'"),
            Just(","),
            Just("+"),
            Just("-"),
            Just("offset"),
            Just("@"),
            Just("#"),
            Just(" "),
            Just("\n"),
            Just("up"),
            Just("1.5"),
            Just("é"),
        ],
        0..24,
    )
    .prop_map(|tokens| tokens.concat())
}

fn metric() -> impl Strategy<Value = String> {
    prop::string::string_regex("m_[a-z0-9_]{0,5}").expect("Failed to create metric strategy")
}

fn selector() -> impl Strategy<Value = String> {
    (metric(), prop::option::of(("l_[a-z]{1,3}", "[a-z0-9 ]{0,4}"))).prop_map(
        |(name, matcher)| match matcher {
            Some((label, value)) => format!("{name}{{{label}=\"{value}\"}}"),
            None => name,
        },
    )
}

/// Syntactically valid expressions. Types are not necessarily consistent.
pub(super) fn expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        selector(),
        "[0-9]{1,3}",
        selector().prop_map(|s| format!("{s}[5m]")),
        selector().prop_map(|s| format!("{s} offset 1h")),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (
                inner.clone(),
                prop_oneof![
                    Just("+"),
                    Just("-"),
                    Just("*"),
                    Just("/"),
                    Just("and"),
                    Just("or"),
                    Just("== bool"),
                ],
                inner.clone()
            )
                .prop_map(|(lhs, op, rhs)| format!("{lhs} {op} {rhs}")),
            inner.clone().prop_map(|e| format!("({e})")),
            inner.clone().prop_map(|e| format!("abs({e})")),
            inner.clone().prop_map(|e| format!("-({e})")),
            inner.clone().prop_map(|e| format!("sum by (job) ({e})")),
            (inner.clone(), inner.clone()).prop_map(|(k, e)| format!("topk({k}, {e})")),
            inner.clone().prop_map(|e| format!("({e})[5m:1m]")),
            selector().prop_map(|s| format!("rate({s}[5m])")),
        ]
    })
}
