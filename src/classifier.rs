//! Rule-based shape classification of segmented question units.
//!
//! Precedence is fixed and tested:
//! 1. exactly four `a)`..`d)` options → Objective
//! 2. a run of two or more underscores in the residual body → Subjective
//! 3. no options at all → Descriptive
//! 4. anything else (wrong option count, no blank) → Dropped

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::segmenter::{strip_marker, RawUnit};

/// Number of options an Objective question must carry.
pub const OBJECTIVE_OPTION_COUNT: usize = 4;

/// Record schema a question belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Objective,
    Subjective,
    Descriptive,
}

impl Shape {
    pub const ALL: [Shape; 3] = [Shape::Objective, Shape::Subjective, Shape::Descriptive];

    /// Worksheet name for this shape.
    pub fn sheet_name(self) -> &'static str {
        match self {
            Shape::Objective => "Objective",
            Shape::Subjective => "Subjective",
            Shape::Descriptive => "Descriptive",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sheet_name())
    }
}

/// Outcome of classifying one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Objective {
        body: String,
        /// Option texts including their `a) ` prefix, in order of appearance.
        options: [String; OBJECTIVE_OPTION_COUNT],
    },
    Subjective {
        body: String,
        blank_count: usize,
    },
    Descriptive {
        body: String,
    },
    /// Option-like lines were found but not exactly four, and no blank.
    Dropped {
        body: String,
        option_count: usize,
    },
}

impl Classification {
    pub fn shape(&self) -> Option<Shape> {
        match self {
            Classification::Objective { .. } => Some(Shape::Objective),
            Classification::Subjective { .. } => Some(Shape::Subjective),
            Classification::Descriptive { .. } => Some(Shape::Descriptive),
            Classification::Dropped { .. } => None,
        }
    }
}

fn option_regex() -> &'static Regex {
    static OPTION: OnceLock<Regex> = OnceLock::new();
    OPTION.get_or_init(|| Regex::new(r"[a-d]\) ").expect("valid option regex"))
}

fn blank_regex() -> &'static Regex {
    static BLANK: OnceLock<Regex> = OnceLock::new();
    BLANK.get_or_init(|| Regex::new(r"_{2,}").expect("valid blank regex"))
}

fn whitespace_regex() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Byte offsets of option markers in a single line.
/// A marker must sit at line start or follow whitespace.
fn option_starts(line: &str) -> Vec<usize> {
    option_regex()
        .find_iter(line)
        .map(|m| m.start())
        .filter(|&start| {
            line[..start]
                .chars()
                .next_back()
                .map_or(true, char::is_whitespace)
        })
        .collect()
}

/// Split option text out of `text`.
///
/// Each option runs to the next marker on the same line or to end of line.
/// A marker with no text after it is not an option.
/// Returns the residual body (numbering marker stripped) and the options.
pub fn split_options(text: &str) -> (String, Vec<String>) {
    let mut options = Vec::new();
    let mut body_lines = Vec::new();

    for line in strip_marker(text).lines() {
        let starts = option_starts(line);
        let Some(&first) = starts.first() else {
            body_lines.push(line.trim());
            continue;
        };

        body_lines.push(line[..first].trim());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(line.len());
            let option = line[start..end].trim();
            if !option[2..].trim().is_empty() {
                options.push(option.to_string());
            }
        }
    }

    let body = body_lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (body, options)
}

/// Number of fill-in blanks (`__`, `_____`, ...) in `text`.
pub fn count_blanks(text: &str) -> usize {
    blank_regex().find_iter(text).count()
}

/// Collapse every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    whitespace_regex().replace_all(text.trim(), " ").into_owned()
}

/// Classify a segmented question unit.
pub fn classify(unit: &RawUnit) -> Classification {
    let (body, options) = split_options(&unit.text);

    if options.len() == OBJECTIVE_OPTION_COUNT {
        let options: [String; OBJECTIVE_OPTION_COUNT] = match options.try_into() {
            Ok(options) => options,
            Err(_) => unreachable!("length checked above"),
        };
        return Classification::Objective { body, options };
    }

    let blank_count = count_blanks(&body);
    if blank_count > 0 {
        return Classification::Subjective { body, blank_count };
    }

    if options.is_empty() {
        return Classification::Descriptive {
            body: collapse_whitespace(&body),
        };
    }

    Classification::Dropped {
        body,
        option_count: options.len(),
    }
}
