//! Signature help for function calls and aggregations

use promls_parser::{
    AggregateOp, Call, Expr,
    functions::{self, Param},
};
use tower_lsp::lsp_types::{
    Documentation, ParameterInformation, ParameterLabel, SignatureHelp, SignatureInformation,
};

use crate::{Error, capabilities::Located};

/// Signature of the call whose argument list contains the cursor.
///
/// # Errors
///
/// Returns [`Error::Stale`] if the document changed.
pub fn compute_signature_help(located: &Located) -> Result<Option<SignatureHelp>, Error> {
    let (Some(text), Some(cursor)) = (located.query_text()?, located.offset()) else {
        return Ok(None);
    };
    let before = text.get(..cursor.min(text.len())).unwrap_or_default();

    let call = located.expr().and_then(|expr| innermost_call(expr, cursor));
    let found = match call {
        Some(call) => {
            let args = before.get(call.args_span.start..).unwrap_or_default();
            Some((call.func.clone(), top_level_commas(args)))
        }
        None => unclosed_call(before),
    };
    Ok(found.and_then(|(name, active)| signature(&name, active)))
}

/// The innermost call whose parentheses strictly enclose the cursor.
fn innermost_call(expr: &Expr, cursor: usize) -> Option<&Call> {
    let mut found: Option<&Call> = None;
    promls_parser::walk(expr, &mut |node| {
        if let Expr::Call(call) = node
            && call.args_span.start < cursor
            && cursor < call.args_span.end
            && found.is_none_or(|outer| call.args_span.len() < outer.args_span.len())
        {
            found = Some(call);
        }
    });
    found
}

/// Commas of the outermost group in `args`, which starts at its opening parenthesis.
fn top_level_commas(args: &str) -> usize {
    group_stack(args)
        .first()
        .map_or(0, |group| group.commas)
}

#[derive(Debug, Clone, Copy)]
struct Group {
    open: char,
    at: usize,
    commas: usize,
}

/// Groups still open at the end of `text`, outermost first.
fn group_stack(text: &str) -> Vec<Group> {
    let mut stack: Vec<Group> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut comment = false;
    for (at, c) in text.char_indices() {
        if comment {
            comment = c != '\n';
            continue;
        }
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '#' => comment = true,
            '(' | '{' | '[' => stack.push(Group {
                open: c,
                at,
                commas: 0,
            }),
            ')' | '}' | ']' => {
                stack.pop();
            }
            ',' => {
                if let Some(group) = stack.last_mut() {
                    group.commas += 1;
                }
            }
            _ => {}
        }
    }
    stack
}

/// Name and active argument of the innermost unclosed call in text that does not parse.
fn unclosed_call(before: &str) -> Option<(String, usize)> {
    let group = group_stack(before).pop().filter(|group| group.open == '(')?;
    let head = before.get(..group.at)?.trim_end();
    let name = ident_before(head)
        .filter(|name| !name.is_empty())
        .or_else(|| aggregation_before_grouping(head))?;
    Some((name.to_string(), group.commas))
}

fn ident_before(text: &str) -> Option<&str> {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .last()
        .map_or(text.len(), |(idx, _)| idx);
    text.get(start..)
}

/// `sum by (job) (` style heads: the aggregation before a grouping clause.
fn aggregation_before_grouping(head: &str) -> Option<&str> {
    let inner = head.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let head = inner.get(..open)?.trim_end();
    let keyword = ident_before(head)?;
    if !keyword.eq_ignore_ascii_case("by") && !keyword.eq_ignore_ascii_case("without") {
        return None;
    }
    ident_before(head.get(..head.len() - keyword.len())?.trim_end())
}

fn signature(name: &str, active: usize) -> Option<SignatureHelp> {
    let (label, params, doc, variadic) = if let Some(func) = functions::function(name) {
        (func.signature(), func.params.to_vec(), func.doc, func.variadic)
    } else {
        let aggregation = AggregateOp::from_name(name).and_then(functions::aggregation)?;
        (
            aggregation.signature(),
            aggregation.params(),
            aggregation.doc,
            false,
        )
    };
    let active = if variadic {
        active.min(params.len().saturating_sub(1))
    } else {
        active
    };
    let active = u32::try_from(active).ok();
    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label,
            documentation: Some(Documentation::String(doc.to_string())),
            parameters: Some(params.iter().map(parameter).collect()),
            active_parameter: active,
        }],
        active_signature: Some(0),
        active_parameter: active,
    })
}

fn parameter(param: &Param) -> ParameterInformation {
    ParameterInformation {
        label: ParameterLabel::Simple(param.label()),
        documentation: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::located;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn summary(help: Option<&SignatureHelp>) -> Option<(String, Option<u32>)> {
        help.and_then(|help| {
            help.signatures
                .first()
                .map(|sig| (sig.label.clone(), help.active_parameter))
        })
    }

    #[tokio::test]
    async fn test_parsed_call() -> Result<(), Error> {
        let located = located("clamp_max(up, 1)", 0, 14).await?;
        let help = compute_signature_help(&located)?;
        assert_eq!(
            summary(help.as_ref()),
            Some((
                "clamp_max(v instant vector, max scalar) instant vector".to_string(),
                Some(1)
            ))
        );
        let labels: Vec<_> = help
            .iter()
            .flat_map(|help| &help.signatures)
            .flat_map(|sig| sig.parameters.iter().flatten())
            .map(|param| param.label.clone())
            .collect();
        assert_eq!(
            labels,
            vec![
                ParameterLabel::Simple("v instant vector".to_string()),
                ParameterLabel::Simple("max scalar".to_string())
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_nested_call_wins() -> Result<(), Error> {
        let located = located("abs(rate(up[5m]))", 0, 9).await?;
        let help = compute_signature_help(&located)?;
        assert_eq!(
            summary(help.as_ref()).map(|(label, _)| label),
            Some("rate(v range vector) instant vector".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_outside_any_call() -> Result<(), Error> {
        let located = located("rate(up[5m]) + 1", 0, 14).await?;
        assert_eq!(compute_signature_help(&located)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_unclosed_call() -> Result<(), Error> {
        let located = located("label_replace(up{a=\"x,y\"}, ", 0, 27).await?;
        let help = compute_signature_help(&located)?;
        assert_eq!(summary(help.as_ref()).map(|(_, active)| active), Some(Some(1)));
        Ok(())
    }

    #[rstest]
    #[case("rate(", Some(("rate", 0)))]
    #[case("topk(3, ", Some(("topk", 1)))]
    #[case("sum by (job) (", Some(("sum", 0)))]
    #[case("sum without(job)(rate(x[5m]), ", Some(("sum", 1)))]
    #[case("up{a=\"(\"", None)]
    #[case("(1 + ", None)]
    fn test_unclosed_call_heads(#[case] before: &str, #[case] expected: Option<(&str, usize)>) {
        assert_eq!(
            unclosed_call(before),
            expected.map(|(name, active)| (name.to_string(), active))
        );
    }

    #[test]
    fn test_variadic_parameter_stays_on_last() {
        let help = signature("label_join", 6);
        assert_eq!(help.and_then(|help| help.active_parameter), Some(3));
    }
}
