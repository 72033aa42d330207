//! Locates the correct option letter in a free-text explanation and scores
//! the options of an Objective record against it.

use regex::Regex;
use std::sync::OnceLock;

fn answer_regex() -> &'static Regex {
    static ANSWER: OnceLock<Regex> = OnceLock::new();
    ANSWER.get_or_init(|| Regex::new(r"(?i)(?:^|[(\s])([a-d])(?:[)\s]|$)").expect("valid answer regex"))
}

/// First `a`..`d` letter bounded by a parenthesis, whitespace or the ends of
/// the text, lowercased.
pub fn extract_correct_answer(explanation: &str) -> Option<char> {
    answer_regex()
        .captures(explanation)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().chars().next())
        .map(|c| c.to_ascii_lowercase())
}

/// Index of the option whose content starts with `"<letter>)"`.
pub fn correct_index<S: AsRef<str>>(options: &[S], letter: Option<char>) -> Option<usize> {
    let prefix = format!("{})", letter?);
    options
        .iter()
        .position(|content| content.as_ref().starts_with(&prefix))
}

/// Correctness flag and weightage for one option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionScore {
    pub correct: bool,
    pub weightage: f64,
}

/// Score every option: full marks on the correct one, zero elsewhere.
/// A null `marks` scores the correct option at zero.
pub fn score_options(option_count: usize, correct: Option<usize>, marks: Option<f64>) -> Vec<OptionScore> {
    (0..option_count)
        .map(|i| {
            if correct == Some(i) {
                OptionScore {
                    correct: true,
                    weightage: marks.unwrap_or(0.0),
                }
            } else {
                OptionScore {
                    correct: false,
                    weightage: 0.0,
                }
            }
        })
        .collect()
}
