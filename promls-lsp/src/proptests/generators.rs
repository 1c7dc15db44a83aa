//! Input generators for property-based testing
use proptest::prelude::*;

/// Text mixing ASCII, two byte and four byte characters with both line ending styles.
pub(super) fn mixed_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("a"),
            Just("{"),
            Just(" "),
            Just("é"),
            Just("😀"),
            Just("\n"),
            Just("\r\n"),
        ],
        0..48,
    )
    .prop_map(|chunks| chunks.concat())
}

/// `(gap, len)` pairs laying out non-overlapping queries one after the other.
pub(super) fn query_layout() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..3, 1usize..6), 1..8)
}

pub(super) fn document_names() -> impl Strategy<Value = std::collections::BTreeSet<String>> {
    prop::collection::btree_set("[a-z]{1,6}", 1..6)
}
