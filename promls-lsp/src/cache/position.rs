//! Conversions between the coordinate systems used by the server.
//!
//! - LSP positions: zero based line, zero based UTF-16 column.
//! - YAML markers: one based line, zero based column counted in characters, relative to the
//!   YAML document they belong to.
//! - Byte offsets into the document text.
//!
//! Global positions are byte offsets shifted into the document's slot of the shared position
//! space, see [`crate::cache::Document::lsp_to_global`].

use tower_lsp::lsp_types::Position;

use crate::Error;

/// Byte offsets of the first character of every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self {
            line_starts,
            len: text.len(),
        }
    }

    /// Number of lines, counting the (possibly empty) line after a trailing newline.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    #[must_use]
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Zero based line containing `offset`.
    #[must_use]
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    #[must_use]
    pub fn text_len(&self) -> usize {
        self.len
    }
}

fn to_lsp_u32(val: usize) -> u32 {
    val.try_into().unwrap_or(u32::MAX)
}

/// Walk `units` UTF-16 code units forward from `start`. Running past the end of the line
/// continues on the next one; running past the end of the text stops there.
fn advance_utf16(text: &str, start: usize, units: usize) -> usize {
    let Some(rest) = text.get(start..) else {
        return text.len();
    };
    let mut remaining = units;
    for (idx, c) in rest.char_indices() {
        if remaining == 0 {
            return start + idx;
        }
        remaining = remaining.saturating_sub(c.len_utf16());
    }
    text.len()
}

fn advance_chars(text: &str, start: usize, chars: usize) -> usize {
    text.get(start..)
        .and_then(|rest| rest.char_indices().nth(chars))
        .map_or(text.len(), |(idx, _)| start + idx)
}

/// Byte offset of an LSP position.
///
/// # Errors
///
/// Returns [`Error::Position`] if the line does not exist.
pub fn lsp_to_offset(text: &str, index: &LineIndex, position: Position) -> Result<usize, Error> {
    if text.is_empty() {
        return Ok(0);
    }
    let line_start = index
        .line_start(position.line as usize)
        .ok_or_else(|| Error::Position(format!("line {} does not exist", position.line)))?;
    Ok(advance_utf16(text, line_start, position.character as usize))
}

/// LSP position of a byte offset.
///
/// # Errors
///
/// Returns [`Error::Position`] if the offset lies past the end of the text or inside a
/// multi-byte character.
pub fn offset_to_lsp(text: &str, index: &LineIndex, offset: usize) -> Result<Position, Error> {
    if text.is_empty() {
        return Ok(Position::new(0, 0));
    }
    let line = index.line_of(offset);
    let line_start = index.line_start(line).unwrap_or_default();
    let column = text
        .get(line_start..offset)
        .ok_or_else(|| Error::Position(format!("offset {offset} is not a character boundary")))?
        .encode_utf16()
        .count();
    Ok(Position::new(to_lsp_u32(line), to_lsp_u32(column)))
}

/// Byte offset of a YAML marker. `line_offset` is the number of lines preceding the YAML
/// document the marker belongs to.
///
/// # Errors
///
/// Returns [`Error::Position`] if the line does not exist.
pub fn yaml_to_offset(
    text: &str,
    index: &LineIndex,
    line: usize,
    column: usize,
    line_offset: usize,
) -> Result<usize, Error> {
    if text.is_empty() {
        return Ok(0);
    }
    let effective = line.max(1) - 1 + line_offset;
    let line_start = index
        .line_start(effective)
        .ok_or_else(|| Error::Position(format!("YAML line {line} does not exist")))?;
    Ok(advance_chars(text, line_start, column))
}

/// Start of the line after `position`, used to give point errors a one line range.
#[must_use]
pub fn end_of_line(position: Position) -> Position {
    Position::new(position.line.saturating_add(1), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn round_trip(text: &str, position: Position) -> Result<Position, Error> {
        let index = LineIndex::new(text);
        let offset = lsp_to_offset(text, &index, position)?;
        offset_to_lsp(text, &index, offset)
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.line_start(1), Some(3));
        assert_eq!(index.line_of(0), 0);
        assert_eq!(index.line_of(2), 0);
        assert_eq!(index.line_of(3), 1);
        assert_eq!(index.line_of(6), 2);
    }

    #[rstest]
    #[case("sum(up)", Position::new(0, 4), 4)]
    #[case("a\nbcd", Position::new(1, 2), 4)]
    #[case("é = 1", Position::new(0, 1), 2)]
    // U+1F600 is a surrogate pair: two UTF-16 units, four bytes.
    #[case("😀x", Position::new(0, 2), 4)]
    #[case("ab\ncd", Position::new(0, 5), 5)]
    fn test_lsp_to_offset(#[case] text: &str, #[case] position: Position, #[case] offset: usize) {
        let index = LineIndex::new(text);
        assert_eq!(lsp_to_offset(text, &index, position), Ok(offset));
    }

    #[rstest]
    #[case("sum(up)", Position::new(0, 7))]
    #[case("a\nbcd", Position::new(1, 3))]
    #[case("é😀 = 1\nxyz", Position::new(0, 3))]
    #[case("é😀 = 1\nxyz", Position::new(1, 1))]
    fn test_round_trip(#[case] text: &str, #[case] position: Position) {
        assert_eq!(round_trip(text, position), Ok(position));
    }

    #[test]
    fn test_empty_text_maps_everything_to_origin() {
        let index = LineIndex::new("");
        assert_eq!(lsp_to_offset("", &index, Position::new(7, 3)), Ok(0));
        assert_eq!(offset_to_lsp("", &index, 12), Ok(Position::new(0, 0)));
        assert_eq!(yaml_to_offset("", &index, 4, 2, 1), Ok(0));
    }

    #[test]
    fn test_missing_line_is_an_error() {
        let index = LineIndex::new("up");
        assert!(matches!(
            lsp_to_offset("up", &index, Position::new(3, 0)),
            Err(Error::Position(_))
        ));
    }

    #[test]
    fn test_offset_inside_character_is_an_error() {
        let index = LineIndex::new("é");
        assert!(matches!(
            offset_to_lsp("é", &index, 1),
            Err(Error::Position(_))
        ));
    }

    #[test]
    fn test_yaml_markers() {
        let text = "a: 1\n---\nb: é2\n";
        let index = LineIndex::new(text);
        // Second document starts on line 1 (zero based), its markers restart at line 1.
        assert_eq!(yaml_to_offset(text, &index, 2, 4, 1), Ok(14));
        // Line 0 is clamped to line 1.
        assert_eq!(yaml_to_offset(text, &index, 0, 3, 0), Ok(3));
    }

    #[test]
    fn test_end_of_line() {
        assert_eq!(end_of_line(Position::new(3, 9)), Position::new(4, 0));
    }
}
