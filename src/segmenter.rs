//! Splits OCR text into numbered question/solution units.
//!
//! Pure functions, no async. The same pass runs over the question paper and
//! the answer sheet independently.

use regex::Regex;
use std::sync::OnceLock;

/// One numbered block of source text before shape classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit {
    /// 1-based, dense, assigned during segmentation (source numbering is discarded).
    pub ordinal: usize,
    /// Marker line plus continuation lines, each trimmed, newline-joined.
    pub text: String,
}

impl RawUnit {
    /// `Q<ordinal>`, the label carried into every sheet.
    pub fn label(&self) -> String {
        format!("Q{}", self.ordinal)
    }

    /// Unit text with the leading numbering marker removed.
    pub fn body(&self) -> &str {
        strip_marker(&self.text)
    }
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)^\(?\s*([0-9]+)\s*[).]").expect("valid marker regex"))
}

/// True when `line` opens a new unit, e.g. `1)`, `(2)`, `3.`.
pub fn is_marker_line(line: &str) -> bool {
    marker_regex().is_match(line)
}

/// Remove the numbering marker at the start of `text`, if any.
pub fn strip_marker(text: &str) -> &str {
    match marker_regex().find(text) {
        Some(m) => text[m.end()..].trim_start(),
        None => text,
    }
}

/// Segment raw text into units.
///
/// Blank lines are dropped, content before the first marker is discarded.
pub fn segment(text: &str) -> Vec<RawUnit> {
    let mut units = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_marker_line(line) {
            if let Some(lines) = current.take() {
                units.push(RawUnit {
                    ordinal: units.len() + 1,
                    text: lines.join("\n"),
                });
            }
            current = Some(vec![trimmed]);
        } else if let Some(lines) = current.as_mut() {
            lines.push(trimmed);
        }
    }

    if let Some(lines) = current {
        units.push(RawUnit {
            ordinal: units.len() + 1,
            text: lines.join("\n"),
        });
    }

    tracing::debug!("Segmented {} unit(s) from {} chars", units.len(), text.len());
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_basic() {
        let text = "1) What is 2+2?\na) 3\nb) 4\n\n2. Name a prime\nnumber below ten.\n";
        let units = segment(text);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].ordinal, 1);
        assert_eq!(units[0].text, "1) What is 2+2?\na) 3\nb) 4");
        assert_eq!(units[1].ordinal, 2);
        assert_eq!(units[1].text, "2. Name a prime\nnumber below ten.");
    }

    #[test]
    fn test_preamble_discarded() {
        let text = "Class X Mathematics\nTime: 3 hours\n(1) First question\n";
        let units = segment(text);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "(1) First question");
    }

    #[test]
    fn test_ordinals_ignore_source_numbering() {
        let text = "5) five\n9) nine\n2) two\n";
        let units = segment(text);
        let ordinals: Vec<usize> = units.iter().map(|u| u.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(units[2].label(), "Q3");
    }

    #[test]
    fn test_unit_count_matches_marker_count() {
        let text = "intro\n1) a\n  continuation  \n\n2) b\n3. c\nnot a marker 4)\n(4 ) d\n";
        let markers = text.lines().filter(|l| is_marker_line(l)).count();
        assert_eq!(markers, 4);
        assert_eq!(segment(text).len(), markers);
    }

    #[test]
    fn test_resegment_single_unit_is_identity() {
        let units = segment("1) What is\n   the capital of France?\n\n");
        assert_eq!(units.len(), 1);
        let again = segment(&units[0].text);
        assert_eq!(again, units);
    }

    #[test]
    fn test_strip_marker() {
        assert_eq!(strip_marker("1) What is 2+2?"), "What is 2+2?");
        assert_eq!(strip_marker("( 12 ) Explain"), "Explain");
        assert_eq!(strip_marker("no marker"), "no marker");
    }

    #[test]
    fn test_empty_input() {
        assert!(segment("").is_empty());
        assert!(segment("\n\n   \n").is_empty());
    }
}
