//! Completion: suggest metric names, functions, label names and label values

use std::collections::HashMap;

use promls_parser::{
    Expr, MatchOp, VectorSelector,
    functions::{AGGREGATIONS, FUNCTIONS, Param},
};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, InsertTextFormat, MarkupContent,
    MarkupKind,
};

use crate::{
    Error,
    capabilities::Located,
    metadata::{Metadata, MetadataService},
};

/// Keywords whose parenthesised argument is a list of label names.
const LABEL_LIST_KEYWORDS: &[&str] = &[
    "by",
    "without",
    "on",
    "ignoring",
    "group_left",
    "group_right",
];

/// What the cursor is about to complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionContext {
    /// Where a selector may start: metric names, but also functions and aggregations.
    MetricName { prefix: String },
    /// The name of a call that already has its argument list.
    FunctionName { prefix: String },
    LabelName {
        prefix: String,
        /// `name="value"` pairs already present on the selector, metric name included.
        selection: Vec<(String, String)>,
    },
    LabelValue {
        label: String,
        prefix: String,
        /// Whether the cursor is already inside the quotes.
        quoted: bool,
        selection: Vec<(String, String)>,
    },
    None,
}

/// Compute completion items at a resolved position.
///
/// # Errors
///
/// Returns [`Error::Stale`] if the document changed and [`Error::Upstream`] if metadata could
/// not be fetched.
pub async fn compute_completions(
    located: &Located,
    metadata: &dyn MetadataService,
    limit: Option<usize>,
) -> Result<Vec<CompletionItem>, Error> {
    let context = detect_context(located)?;
    tracing::debug!("completion context: {context:?}");

    let mut items = match context {
        CompletionContext::MetricName { prefix } => {
            let metrics = metadata.all_metric_metadata().await?;
            let mut items = complete_metrics(&metrics, &prefix);
            items.extend(complete_functions(&prefix, true));
            items
        }
        CompletionContext::FunctionName { prefix } => complete_functions(&prefix, false),
        CompletionContext::LabelName { prefix, selection } => {
            let names = metadata.label_names(&selection).await?;
            complete_label_names(&names, &prefix)
        }
        CompletionContext::LabelValue {
            label,
            prefix,
            quoted,
            selection,
        } => {
            let values = metadata.label_values(&label, &selection).await?;
            complete_label_values(&values, &prefix, quoted)
        }
        CompletionContext::None => Vec::new(),
    };
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    Ok(items)
}

/// Work out what is being completed, from the syntax tree when the query parsed and from
/// the text before the cursor otherwise.
///
/// # Errors
///
/// Returns [`Error::Stale`] if the document changed.
pub fn detect_context(located: &Located) -> Result<CompletionContext, Error> {
    let (Some(text), Some(cursor)) = (located.query_text()?, located.offset()) else {
        return Ok(CompletionContext::None);
    };
    let cursor = cursor.min(text.len());
    if let Some(context) = located
        .expr()
        .and_then(|expr| context_from_tree(expr, &text, cursor))
    {
        return Ok(context);
    }
    Ok(context_from_text(text.get(..cursor).unwrap_or_default()))
}

/// `None` when the tree does not settle the question.
fn context_from_tree(expr: &Expr, text: &str, cursor: usize) -> Option<CompletionContext> {
    // The character just typed is the one before the cursor.
    let node = promls_parser::node_at(expr, cursor.checked_sub(1)?)?;
    match node {
        Expr::NumberLiteral(_) | Expr::StringLiteral(_) => Some(CompletionContext::None),
        Expr::VectorSelector(vs) => Some(selector_context(vs, text, cursor)),
        Expr::Call(call) if call.name_span.touches(cursor) => {
            Some(CompletionContext::FunctionName {
                prefix: slice(text, call.name_span.start, cursor),
            })
        }
        Expr::AggregateExpr(agg) if agg.op_span.touches(cursor) => {
            Some(CompletionContext::FunctionName {
                prefix: slice(text, agg.op_span.start, cursor),
            })
        }
        Expr::Call(_)
        | Expr::AggregateExpr(_)
        | Expr::MatrixSelector(_)
        | Expr::BinaryExpr(_)
        | Expr::ParenExpr(_)
        | Expr::SubqueryExpr(_)
        | Expr::UnaryExpr(_) => None,
    }
}

fn selector_context(vs: &VectorSelector, text: &str, cursor: usize) -> CompletionContext {
    if let Some(span) = vs.name_span
        && span.touches(cursor)
    {
        return CompletionContext::MetricName {
            prefix: slice(text, span.start, cursor),
        };
    }

    for (idx, matcher) in vs.matchers.iter().enumerate() {
        if matcher.name_span.touches(cursor) {
            return CompletionContext::LabelName {
                prefix: slice(text, matcher.name_span.start, cursor),
                selection: selection(vs, Some(idx)),
            };
        }
        let value = matcher.value_span;
        if value.start < cursor && cursor < value.end {
            return CompletionContext::LabelValue {
                label: matcher.name.clone(),
                prefix: slice(text, value.start + 1, cursor),
                quoted: true,
                selection: selection(vs, Some(idx)),
            };
        }
    }

    let in_braces = vs
        .matchers_span
        .is_some_and(|span| span.start < cursor && cursor < span.end);
    let after_separator = text
        .get(..cursor)
        .is_some_and(|before| before.trim_end().ends_with([',', '{']));
    if in_braces && after_separator {
        CompletionContext::LabelName {
            prefix: String::new(),
            selection: selection(vs, None),
        }
    } else {
        CompletionContext::None
    }
}

/// Equality matchers of a selector, except the one being edited.
fn selection(vs: &VectorSelector, skip: Option<usize>) -> Vec<(String, String)> {
    vs.name
        .iter()
        .map(|name| ("__name__".to_string(), name.clone()))
        .chain(
            vs.matchers
                .iter()
                .enumerate()
                .filter(|(idx, matcher)| Some(*idx) != skip && matcher.op == MatchOp::Equal)
                .map(|(_, matcher)| (matcher.name.clone(), matcher.value.clone())),
        )
        .collect()
}

fn slice(text: &str, start: usize, end: usize) -> String {
    text.get(start..end).unwrap_or_default().to_string()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Identifier ending right at the end of `text`.
fn trailing_ident(text: &str) -> &str {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c))
        .last()
        .map_or(text.len(), |(idx, _)| idx);
    text.get(start..).unwrap_or_default()
}

/// Lexical state at the end of a partial query.
#[derive(Debug, Default)]
struct TextState {
    /// Quote character and position of an unterminated string.
    string: Option<(char, usize)>,
    escaped: bool,
    comment: bool,
    /// Position of an unclosed `{`.
    brace: Option<usize>,
    /// Start of the matcher being typed inside the braces.
    matcher_start: usize,
    /// Positions of unclosed `(`.
    parens: Vec<usize>,
    in_range: bool,
}

impl TextState {
    fn scan(text: &str) -> Self {
        let mut state = Self::default();
        for (idx, c) in text.char_indices() {
            if state.comment {
                state.comment = c != '\n';
                continue;
            }
            if let Some((quote, _)) = state.string {
                if state.escaped {
                    state.escaped = false;
                } else if c == '\\' && quote != '`' {
                    state.escaped = true;
                } else if c == quote {
                    state.string = None;
                }
                continue;
            }
            match c {
                '"' | '\'' | '`' => state.string = Some((c, idx)),
                '#' => state.comment = true,
                '{' => {
                    state.brace = Some(idx);
                    state.matcher_start = idx + 1;
                }
                '}' => state.brace = None,
                ',' if state.brace.is_some() => state.matcher_start = idx + 1,
                '(' => state.parens.push(idx),
                ')' => {
                    state.parens.pop();
                }
                '[' => state.in_range = true,
                ']' => state.in_range = false,
                _ => {}
            }
        }
        state
    }
}

/// Recover the completion context from the text before the cursor of a query that does not
/// parse.
fn context_from_text(before: &str) -> CompletionContext {
    let state = TextState::scan(before);
    if state.comment || state.in_range {
        return CompletionContext::None;
    }

    if let Some(open) = state.brace {
        return matcher_context(before, open, &state);
    }
    if state.string.is_some() {
        return CompletionContext::None;
    }

    if let Some(&open) = state.parens.last() {
        let keyword = trailing_ident(before.get(..open).unwrap_or_default().trim_end());
        if LABEL_LIST_KEYWORDS
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(keyword))
        {
            return CompletionContext::LabelName {
                prefix: trailing_ident(before).to_string(),
                selection: Vec::new(),
            };
        }
    }

    let prefix = trailing_ident(before);
    if prefix.starts_with(|c: char| c.is_ascii_digit()) {
        return CompletionContext::None;
    }
    CompletionContext::MetricName {
        prefix: prefix.to_string(),
    }
}

/// Context inside an unclosed `{`.
fn matcher_context(before: &str, open: usize, state: &TextState) -> CompletionContext {
    let fragment = before.get(state.matcher_start..).unwrap_or_default();
    let label: String = fragment
        .trim_start()
        .chars()
        .take_while(|&c| is_ident_char(c))
        .collect();
    let completed = before.get(open + 1..state.matcher_start).unwrap_or_default();
    let metric = trailing_ident(before.get(..open).unwrap_or_default().trim_end());
    let selection = completed_selection(metric, completed);

    if let Some((_, quote_at)) = state.string {
        return CompletionContext::LabelValue {
            label,
            prefix: before.get(quote_at + 1..).unwrap_or_default().to_string(),
            quoted: true,
            selection,
        };
    }
    let rest = fragment.trim_start().get(label.len()..).unwrap_or_default();
    if rest.contains(['=', '!', '~']) {
        let after_op = rest.trim_start_matches(['=', '!', '~', ' ', '\t']);
        return if after_op.is_empty() {
            CompletionContext::LabelValue {
                label,
                prefix: String::new(),
                quoted: false,
                selection,
            }
        } else {
            CompletionContext::None
        };
    }
    if rest.trim().is_empty() {
        CompletionContext::LabelName {
            prefix: label,
            selection,
        }
    } else {
        CompletionContext::None
    }
}

/// Equality matchers already written inside the braces, plus the metric name.
fn completed_selection(metric: &str, completed: &str) -> Vec<(String, String)> {
    let mut selection = Vec::new();
    if !metric.is_empty() && !metric.starts_with(|c: char| c.is_ascii_digit()) {
        selection.push(("__name__".to_string(), metric.to_string()));
    }
    let matchers = completed.trim().trim_end_matches(',');
    if matchers.is_empty() {
        return selection;
    }
    if let Ok(Expr::VectorSelector(vs)) = promls_parser::parse(&format!("{{{matchers}}}")) {
        selection.extend(
            vs.matchers
                .into_iter()
                .filter(|matcher| matcher.op == MatchOp::Equal)
                .map(|matcher| (matcher.name, matcher.value)),
        );
    }
    selection
}

/// Case sensitive in-order subsequence match, used for the function table.
#[must_use]
pub fn fuzzy_match(prefix: &str, candidate: &str) -> bool {
    let mut candidate = candidate.chars();
    prefix.chars().all(|p| candidate.any(|c| c == p))
}

/// Metric names starting with `prefix`, sorted by name.
#[must_use]
pub fn complete_metrics(
    metrics: &HashMap<String, Vec<Metadata>>,
    prefix: &str,
) -> Vec<CompletionItem> {
    let mut names: Vec<_> = metrics
        .keys()
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    names
        .into_iter()
        .map(|name| {
            let metadata = metrics.get(name).and_then(|entries| entries.first());
            CompletionItem {
                label: name.clone(),
                kind: Some(CompletionItemKind::VARIABLE),
                detail: metadata
                    .map(|m| m.kind.clone())
                    .filter(|kind| !kind.is_empty()),
                documentation: metadata
                    .map(|m| m.help.clone())
                    .filter(|help| !help.is_empty())
                    .map(Documentation::String),
                insert_text: Some(name.clone()),
                ..CompletionItem::default()
            }
        })
        .collect()
}

fn snippet(name: &str, params: &[Param], required: usize) -> String {
    let placeholders = params
        .iter()
        .take(required)
        .enumerate()
        .map(|(idx, param)| format!("${{{}:{}}}", idx + 1, param.name))
        .collect::<Vec<_>>()
        .join(", ");
    if placeholders.is_empty() && !params.is_empty() {
        format!("{name}($0)")
    } else {
        format!("{name}({placeholders})")
    }
}

fn function_item(
    name: &str,
    signature: String,
    doc: &str,
    insert: Option<String>,
) -> CompletionItem {
    let is_snippet = insert.is_some();
    CompletionItem {
        label: name.to_string(),
        kind: Some(CompletionItemKind::FUNCTION),
        detail: Some(signature),
        documentation: Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: doc.to_string(),
        })),
        insert_text: Some(insert.unwrap_or_else(|| name.to_string())),
        insert_text_format: Some(if is_snippet {
            InsertTextFormat::SNIPPET
        } else {
            InsertTextFormat::PLAIN_TEXT
        }),
        ..CompletionItem::default()
    }
}

/// Built-in functions followed by aggregation operators. With `snippets`, the insert text
/// includes the argument list with placeholders for the required arguments.
#[must_use]
pub fn complete_functions(prefix: &str, snippets: bool) -> Vec<CompletionItem> {
    let functions = FUNCTIONS
        .iter()
        .filter(|func| fuzzy_match(prefix, func.name))
        .map(|func| {
            let insert = snippets.then(|| snippet(func.name, func.params, func.required()));
            function_item(func.name, func.signature(), func.doc, insert)
        });
    let aggregations = AGGREGATIONS
        .iter()
        .filter(|agg| fuzzy_match(prefix, agg.op.as_str()))
        .map(|agg| {
            let params = agg.params();
            let insert = snippets.then(|| snippet(agg.op.as_str(), &params, params.len()));
            function_item(agg.op.as_str(), agg.signature(), agg.doc, insert)
        });
    functions.chain(aggregations).collect()
}

#[must_use]
pub fn complete_label_names(names: &[String], prefix: &str) -> Vec<CompletionItem> {
    names
        .iter()
        .filter(|name| name.starts_with(prefix))
        .map(|name| CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::FIELD),
            insert_text: Some(name.clone()),
            ..CompletionItem::default()
        })
        .collect()
}

/// Label values, wrapped in quotes unless the cursor already is inside them.
#[must_use]
pub fn complete_label_values(values: &[String], prefix: &str, quoted: bool) -> Vec<CompletionItem> {
    values
        .iter()
        .filter(|value| value.starts_with(prefix))
        .map(|value| {
            let insert = if quoted {
                value.clone()
            } else {
                format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
            };
            CompletionItem {
                label: value.clone(),
                kind: Some(CompletionItemKind::VALUE),
                insert_text: Some(insert),
                ..CompletionItem::default()
            }
        })
        .collect()
}
