//! Cache invariants checked with property-based testing

use proptest::prelude::*;
use tower_lsp::lsp_types::{TextDocumentItem, Url};

use crate::{
    Error,
    cache::{
        Document, DocumentCache, Language, LineIndex, Query,
        position::{lsp_to_offset, offset_to_lsp},
    },
    capabilities::diagnostics::testing::RecordingSink,
};

use super::generators::{document_names, mixed_text, query_layout};

fn fail(err: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(err.to_string())
}

fn url(name: &str) -> Result<Url, TestCaseError> {
    Url::parse(&format!("file:///{name}.promql")).map_err(fail)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn lsp_positions_round_trip(text in mixed_text(), pick in any::<prop::sample::Index>()) {
        let index = LineIndex::new(&text);
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();
        let offset = *pick.get(&boundaries);

        let position = offset_to_lsp(&text, &index, offset).map_err(fail)?;
        prop_assert_eq!(lsp_to_offset(&text, &index, position), Ok(offset));
        let again = lsp_to_offset(&text, &index, position).map_err(fail)?;
        prop_assert_eq!(offset_to_lsp(&text, &index, again), Ok(position));
    }

    #[test]
    fn every_position_of_a_query_finds_it(layout in query_layout()) {
        let total: usize = layout.iter().map(|(gap, len)| gap + len).sum();
        let doc = Document::new(url("layout")?, Language::PromQl, 0, "x".repeat(total), 0)
            .map_err(fail)?;
        let ctx = doc.context();

        let mut spans = Vec::new();
        let mut cursor = 1;
        for (gap, len) in layout {
            let pos = cursor + gap;
            let end = pos + len;
            spans.push((pos, end));
            doc.push_query(
                &ctx,
                Query {
                    pos,
                    end,
                    expr: None,
                    error: None,
                    record: None,
                },
            )
            .map_err(fail)?;
            cursor = end;
        }

        for (pos, end) in spans {
            for global in pos..end {
                let found = doc.query_at(&ctx, global).map_err(fail)?;
                prop_assert_eq!(found.map(|query| (query.pos, query.end)), Some((pos, end)));
            }
        }
    }

    #[test]
    fn remove_succeeds_once(names in document_names()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(fail)?;
        let _guard = runtime.enter();

        let cache = DocumentCache::new(RecordingSink::new());
        let mut uris = Vec::new();
        for name in &names {
            let uri = url(name)?;
            cache
                .add(TextDocumentItem {
                    uri: uri.clone(),
                    language_id: "promql".to_string(),
                    version: 0,
                    text: name.clone(),
                })
                .map_err(fail)?;
            uris.push(uri);
        }
        for uri in &uris {
            prop_assert_eq!(cache.remove(uri), Ok(()));
            prop_assert_eq!(cache.remove(uri), Err(Error::NotFound(uri.clone())));
        }
        prop_assert!(cache.is_empty());
    }

    #[test]
    fn versions_only_move_forward(first in 0i32..100, second in 0i32..100) {
        let doc = Document::new(url("versions")?, Language::PromQl, 0, "up".to_string(), first)
            .map_err(fail)?;
        let result = doc.set_content("down".to_string(), second);
        if second > first {
            prop_assert!(result.is_ok());
            prop_assert_eq!(doc.version(&doc.context()), Ok(second));
        } else {
            prop_assert_eq!(
                result.err(),
                Some(Error::VersionConflict { current: first, received: second })
            );
            prop_assert_eq!(doc.version(&doc.context()), Ok(first));
        }
    }
}
