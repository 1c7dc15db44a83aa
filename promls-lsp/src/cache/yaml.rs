//! Extraction of PromQL expressions from Prometheus rule files.
//!
//! The stream is decoded one YAML document at a time so that every document keeps its own
//! tree and the scan can report where each one ends. Markers reported by the YAML parser are
//! relative to the document being decoded: lines are one based, columns count characters.

use yaml_rust2::{
    Event,
    parser::{MarkedEventReceiver, Parser},
    scanner::{Marker, TScalarStyle},
};

/// A location as reported by the YAML parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    /// One based, relative to the YAML document.
    pub line: usize,
    /// Zero based, in characters.
    pub col: usize,
}

impl From<&Marker> for Mark {
    fn from(marker: &Marker) -> Self {
        Self {
            line: marker.line(),
            col: marker.col(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    /// Single or double quoted.
    Quoted,
    /// Literal (`|`) or folded (`>`).
    Block,
}

/// A decoded YAML node with the markers needed to map it back to the text.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar {
        value: String,
        style: ScalarStyle,
        mark: Mark,
    },
    Mapping {
        entries: Vec<(Node, Node)>,
        start: Mark,
        end: Mark,
        flow: bool,
    },
    Sequence {
        items: Vec<Node>,
        start: Mark,
        end: Mark,
    },
    Alias {
        mark: Mark,
    },
}

impl Node {
    #[must_use]
    pub fn mark(&self) -> Mark {
        match self {
            Self::Scalar { mark, .. } | Self::Alias { mark } => *mark,
            Self::Mapping { start, .. } | Self::Sequence { start, .. } => *start,
        }
    }

    /// The value of a scalar node.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar { value, .. } => Some(value),
            Self::Mapping { .. } | Self::Sequence { .. } | Self::Alias { .. } => None,
        }
    }
}

/// An `expr` entry found in a rule mapping.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Embedded {
    pub(crate) start: Mark,
    /// Start of whatever follows the expression inside its mapping.
    pub(crate) end: Mark,
    pub(crate) style: ScalarStyle,
    pub(crate) flow: bool,
    pub(crate) record: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScannedDoc {
    pub(crate) root: Option<Node>,
    /// Byte offset where the document ends.
    pub(crate) end: usize,
    pub(crate) line_offset: usize,
    pub(crate) queries: Vec<Embedded>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScanFailure {
    pub(crate) mark: Mark,
    pub(crate) line_offset: usize,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Scan {
    pub(crate) docs: Vec<ScannedDoc>,
    /// Set when a document failed to decode. Scanning stops there.
    pub(crate) error: Option<ScanFailure>,
}

/// Key paths under which mappings are alerting or recording rules.
const RULE_PATHS: &[&[&str]] = &[&["alerts"], &["groups", "rules"], &["recordingrule"]];

/// Decode every document of `text` and collect the embedded expressions.
pub(crate) fn scan(text: &str) -> Scan {
    // Byte offset of every character, plus one past the end. The YAML parser counts in
    // characters.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len().saturating_sub(1);

    let mut scan = Scan::default();
    let mut start_char = 0;
    let mut line_offset = 0;
    loop {
        let start = offsets.get(start_char).copied().unwrap_or(text.len());
        let Some(rest) = text.get(start..).filter(|rest| !rest.is_empty()) else {
            break;
        };

        let mut builder = Builder::new(text, &offsets, start_char);
        let mut parser = Parser::new(rest.chars());
        if let Err(err) = parser.load(&mut builder, false) {
            scan.error = Some(ScanFailure {
                mark: Mark::from(err.marker()),
                line_offset,
                message: err.info().to_string(),
            });
            break;
        }
        if !builder.seen_document {
            break;
        }

        let end_char = builder
            .end_char
            .map_or(char_count, |end| start_char + end)
            .min(char_count);
        let end = offsets.get(end_char).copied().unwrap_or(text.len());
        let mut queries = Vec::new();
        if let Some(root) = &builder.root {
            collect(root, &mut Vec::new(), &mut queries);
        }
        scan.docs.push(ScannedDoc {
            root: builder.root,
            end,
            line_offset,
            queries,
        });

        if end_char <= start_char {
            break;
        }
        line_offset += text.get(start..end).map_or(0, |doc| doc.matches('\n').count());
        start_char = end_char;
    }
    scan
}

fn is_rule_path(path: &[String]) -> bool {
    RULE_PATHS.iter().any(|suffix| {
        path.len() >= suffix.len()
            && path
                .iter()
                .rev()
                .zip(suffix.iter().rev())
                .all(|(key, expected)| key == expected)
    })
}

fn collect(node: &Node, path: &mut Vec<String>, out: &mut Vec<Embedded>) {
    match node {
        Node::Mapping {
            entries, end, flow, ..
        } => {
            if is_rule_path(path)
                && let Some(embedded) = embedded(entries, *end, *flow)
            {
                out.push(embedded);
            }
            for (key, value) in entries {
                if let Some(key) = key.as_scalar() {
                    path.push(key.to_string());
                    collect(value, path, out);
                    path.pop();
                }
            }
        }
        Node::Sequence { items, .. } => {
            for item in items {
                collect(item, path, out);
            }
        }
        Node::Scalar { .. } | Node::Alias { .. } => {}
    }
}

fn embedded(entries: &[(Node, Node)], mapping_end: Mark, flow: bool) -> Option<Embedded> {
    let idx = entries
        .iter()
        .position(|(key, _)| key.as_scalar() == Some("expr"))?;
    let Some((
        _,
        Node::Scalar {
            style, mark: start, ..
        },
    )) = entries.get(idx)
    else {
        return None;
    };
    let record = entries.iter().find_map(|(key, value)| {
        (key.as_scalar() == Some("record"))
            .then(|| value.as_scalar().map(str::to_string))
            .flatten()
    });
    let end = entries
        .get(idx + 1)
        .map_or(mapping_end, |(key, _)| key.mark());
    let start = match style {
        // The content of a block scalar starts on the line after the indicator.
        ScalarStyle::Block => Mark {
            line: start.line + 1,
            col: 0,
        },
        ScalarStyle::Plain | ScalarStyle::Quoted => *start,
    };
    Some(Embedded {
        start,
        end,
        style: *style,
        flow,
        record,
    })
}

enum Frame {
    Mapping {
        entries: Vec<(Node, Node)>,
        key: Option<Node>,
        start: Mark,
        flow: bool,
    },
    Sequence {
        items: Vec<Node>,
        start: Mark,
    },
}

impl Frame {
    fn close(self, end: Mark) -> Node {
        match self {
            Self::Mapping {
                entries,
                start,
                flow,
                ..
            } => Node::Mapping {
                entries,
                start,
                end,
                flow,
            },
            Self::Sequence { items, start } => Node::Sequence { items, start, end },
        }
    }
}

/// Builds a [`Node`] tree for a single document from parser events.
struct Builder<'a> {
    text: &'a str,
    offsets: &'a [usize],
    start_char: usize,
    stack: Vec<Frame>,
    root: Option<Node>,
    seen_document: bool,
    /// Character index where the document ends, relative to where decoding started.
    end_char: Option<usize>,
}

impl<'a> Builder<'a> {
    fn new(text: &'a str, offsets: &'a [usize], start_char: usize) -> Self {
        Self {
            text,
            offsets,
            start_char,
            stack: Vec::new(),
            root: None,
            seen_document: false,
            end_char: None,
        }
    }

    fn starts_with(&self, marker: &Marker, c: char) -> bool {
        self.offsets
            .get(self.start_char + marker.index())
            .and_then(|&offset| self.text.get(offset..))
            .is_some_and(|rest| rest.starts_with(c))
    }

    fn insert(&mut self, node: Node) {
        match self.stack.last_mut() {
            None => self.root = Some(node),
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping { entries, key, .. }) => match key.take() {
                Some(key) => entries.push((key, node)),
                None => *key = Some(node),
            },
        }
    }
}

fn scalar_style(style: TScalarStyle) -> ScalarStyle {
    #[allow(clippy::wildcard_enum_match_arm)]
    match style {
        TScalarStyle::Plain => ScalarStyle::Plain,
        TScalarStyle::SingleQuoted | TScalarStyle::DoubleQuoted => ScalarStyle::Quoted,
        _ => ScalarStyle::Block,
    }
}

impl MarkedEventReceiver for Builder<'_> {
    #[allow(clippy::wildcard_enum_match_arm)]
    fn on_event(&mut self, event: Event, marker: Marker) {
        let mark = Mark::from(&marker);
        match event {
            Event::DocumentStart { .. } => self.seen_document = true,
            Event::DocumentEnd { .. } => self.end_char = Some(marker.index()),
            Event::Scalar(value, style, ..) => self.insert(Node::Scalar {
                value,
                style: scalar_style(style),
                mark,
            }),
            Event::Alias(..) => self.insert(Node::Alias { mark }),
            Event::SequenceStart(..) => self.stack.push(Frame::Sequence {
                items: Vec::new(),
                start: mark,
            }),
            Event::MappingStart(..) => {
                let flow = self.starts_with(&marker, '{');
                self.stack.push(Frame::Mapping {
                    entries: Vec::new(),
                    key: None,
                    start: mark,
                    flow,
                });
            }
            Event::SequenceEnd | Event::MappingEnd => {
                if let Some(frame) = self.stack.pop() {
                    self.insert(frame.close(mark));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RULES: &str = "groups:
- name: g
  rules:
  - record: job:up
    expr: sum by (job) (up)
  - alert: Down
    expr: |
      up == 0
---
alerts:
  - expr: \"up\"
";

    #[test]
    fn test_flow_rules() {
        let scan = scan(
            "groups: [{rules: [{record: r, expr: a + b}, {alert: A, expr: up == 0}]}]",
        );
        assert_eq!(scan.error, None);
        let [doc] = scan.docs.as_slice() else {
            panic!("expected one document, got {}", scan.docs.len());
        };
        let [first, second] = doc.queries.as_slice() else {
            panic!("expected two queries, got {:?}", doc.queries);
        };
        assert_eq!(
            first,
            &Embedded {
                start: Mark { line: 1, col: 36 },
                end: Mark { line: 1, col: 41 },
                style: ScalarStyle::Plain,
                flow: true,
                record: Some("r".to_string()),
            }
        );
        assert_eq!(second.start, Mark { line: 1, col: 61 });
        assert_eq!(second.record, None);
    }

    #[test]
    fn test_block_rules_across_documents() {
        let scan = scan(RULES);
        assert_eq!(scan.error, None);
        let [first, second] = scan.docs.as_slice() else {
            panic!("expected two documents, got {}", scan.docs.len());
        };

        assert_eq!(first.line_offset, 0);
        assert_eq!(Some(first.end), RULES.find("---"));
        let starts: Vec<_> = first.queries.iter().map(|q| (q.start, q.style)).collect();
        assert_eq!(
            starts,
            vec![
                (Mark { line: 5, col: 10 }, ScalarStyle::Plain),
                (Mark { line: 8, col: 0 }, ScalarStyle::Block),
            ]
        );
        assert_eq!(
            first.queries.first().and_then(|q| q.record.as_deref()),
            Some("job:up")
        );

        assert_eq!(second.line_offset, 8);
        assert_eq!(second.end, RULES.len());
        assert_eq!(
            second.queries.iter().map(|q| q.style).collect::<Vec<_>>(),
            vec![ScalarStyle::Quoted]
        );
    }

    #[test]
    fn test_unrelated_keys_are_ignored() {
        let scan = scan("foo:\n  expr: up\nalerts:\n- expr: [up]\n");
        assert_eq!(scan.docs.len(), 1);
        assert!(scan.docs.iter().all(|doc| doc.queries.is_empty()));
    }

    #[test]
    fn test_syntax_error_stops_the_scan() {
        let scan = scan("alerts:\n- expr: up\n---\nc: [\n");
        assert_eq!(scan.docs.len(), 1);
        let error = scan.error.map(|err| (err.line_offset, err.message.is_empty()));
        assert_eq!(error, Some((2, false)));
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(scan(""), Scan::default());
        assert_eq!(scan("# just a comment\n").docs.len(), 0);
    }

    #[test]
    fn test_rule_paths() {
        let path = |keys: &[&str]| keys.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert!(is_rule_path(&path(&["groups", "rules"])));
        assert!(is_rule_path(&path(&["spec", "groups", "rules"])));
        assert!(is_rule_path(&path(&["alerts"])));
        assert!(!is_rule_path(&path(&["rules"])));
        assert!(!is_rule_path(&path(&["alerts", "labels"])));
    }
}
