//! Typed sheet records, one struct per question shape.
//!
//! Each record knows its fixed column order and converts to and from a flat
//! row of cells, so every row of a sheet carries the same columns.

use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::answer_key;
use crate::classifier::{Shape, OBJECTIVE_OPTION_COUNT};

pub const QUESTION_LABEL: &str = "Question Label";
pub const QUESTION_CATEGORY: &str = "Question Category";
pub const COGNITIVE_SKILLS: &str = "Cognitive Skills";
pub const QUESTION_SOURCE: &str = "Question Source";
pub const QUESTION_APPEARS_IN: &str = "Question Appears in";
pub const LEVEL_OF_DIFFICULTY: &str = "Level of Difficulty";
pub const QUESTION: &str = "Question";
pub const MARKS: &str = "Marks";

/// Default for the "Question Appears in" column.
pub const DEFAULT_APPEARS_IN: &str = "Pre/Post-Worksheet/Test";

const META_COLUMNS: [&str; 8] = [
    QUESTION_LABEL,
    QUESTION_CATEGORY,
    COGNITIVE_SKILLS,
    QUESTION_SOURCE,
    QUESTION_APPEARS_IN,
    LEVEL_OF_DIFFICULTY,
    QUESTION,
    MARKS,
];

/// A single spreadsheet cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    fn text(value: &str) -> Self {
        Cell::Text(value.to_string())
    }

    fn number(value: Option<f64>) -> Self {
        value.map(Cell::Number).unwrap_or(Cell::Empty)
    }
}

/// Render a number without a trailing ".0" for whole values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Lenient numeric parse: blank or non-numeric text becomes `None`.
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A row read back from a worksheet, addressed by header name.
pub struct SheetRow<'a> {
    index: &'a HashMap<String, usize>,
    values: &'a [String],
}

impl<'a> SheetRow<'a> {
    pub fn new(index: &'a HashMap<String, usize>, values: &'a [String]) -> Self {
        Self { index, values }
    }

    /// Cell text for `column`, empty when the cell is missing.
    pub fn get(&self, column: &str) -> &'a str {
        self.index
            .get(column)
            .and_then(|&i| self.values.get(i))
            .map(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        parse_number(self.get(column))
    }
}

/// Common behaviour of the three sheet record types.
pub trait SheetRecord: Sized + Clone + Send + Sync {
    const SHAPE: Shape;

    /// Fixed column order of the sheet.
    fn columns() -> Vec<String>;

    /// Columns filled positionally from an oracle reply.
    fn required_columns() -> &'static [&'static str];

    fn meta(&self) -> &QuestionMeta;

    fn meta_mut(&mut self) -> &mut QuestionMeta;

    fn to_row(&self) -> Vec<Cell>;

    fn from_row(row: &SheetRow<'_>) -> Result<Self>;

    /// Set a shape-specific text column. Returns false for unknown columns.
    fn set_extra_text(&mut self, column: &str, value: String) -> bool;

    /// Hook run after positional assignment; `overflow` holds the values
    /// that did not map to a required column.
    fn finish_enrichment(self, _overflow: Vec<RubricLine>) -> Self {
        self
    }

    /// Set any text column, shared or shape-specific.
    fn set_text(&mut self, column: &str, value: String) -> bool {
        match self.meta_mut().set_text(column, value) {
            Ok(()) => true,
            Err(value) => self.set_extra_text(column, value),
        }
    }
}

/// Columns shared by every sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionMeta {
    pub label: String,
    pub category: String,
    pub cognitive_skills: String,
    pub source: String,
    pub appears_in: String,
    pub difficulty: String,
    pub question: String,
    pub marks: Option<f64>,
}

impl QuestionMeta {
    pub fn new(label: String, category: &str, question: String) -> Self {
        Self {
            label,
            category: category.to_string(),
            cognitive_skills: String::new(),
            source: String::new(),
            appears_in: DEFAULT_APPEARS_IN.to_string(),
            difficulty: String::new(),
            question,
            marks: Some(1.0),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::text(&self.label),
            Cell::text(&self.category),
            Cell::text(&self.cognitive_skills),
            Cell::text(&self.source),
            Cell::text(&self.appears_in),
            Cell::text(&self.difficulty),
            Cell::text(&self.question),
            Cell::number(self.marks),
        ]
    }

    fn from_row(row: &SheetRow<'_>) -> Self {
        Self {
            label: row.get(QUESTION_LABEL).to_string(),
            category: row.get(QUESTION_CATEGORY).to_string(),
            cognitive_skills: row.get(COGNITIVE_SKILLS).to_string(),
            source: row.get(QUESTION_SOURCE).to_string(),
            appears_in: row.get(QUESTION_APPEARS_IN).to_string(),
            difficulty: row.get(LEVEL_OF_DIFFICULTY).to_string(),
            question: row.get(QUESTION).to_string(),
            marks: row.number(MARKS),
        }
    }

    /// Hands the value back when `column` is not a shared text column.
    fn set_text(&mut self, column: &str, value: String) -> std::result::Result<(), String> {
        let slot = match column {
            QUESTION_LABEL => &mut self.label,
            QUESTION_CATEGORY => &mut self.category,
            COGNITIVE_SKILLS => &mut self.cognitive_skills,
            QUESTION_SOURCE => &mut self.source,
            QUESTION_APPEARS_IN => &mut self.appears_in,
            LEVEL_OF_DIFFICULTY => &mut self.difficulty,
            QUESTION => &mut self.question,
            _ => return Err(value),
        };
        *slot = value;
        Ok(())
    }
}

fn meta_columns() -> Vec<String> {
    META_COLUMNS.iter().map(|c| c.to_string()).collect()
}

// ============================================================================
// Objective
// ============================================================================

/// One multiple-choice option with its scoring columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOption {
    pub answer_type: String,
    pub content: String,
    pub correct: bool,
    pub weightage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveRecord {
    pub meta: QuestionMeta,
    pub options: [AnswerOption; OBJECTIVE_OPTION_COUNT],
    pub explanation: String,
}

impl ObjectiveRecord {
    /// Build a scored record. The correct option is located from the
    /// explanation's answer letter.
    pub fn new(label: String, question: String, options: [String; OBJECTIVE_OPTION_COUNT], explanation: String) -> Self {
        let letter = answer_key::extract_correct_answer(&explanation);
        let correct = answer_key::correct_index(&options, letter);
        let mut record = Self {
            meta: QuestionMeta::new(label, "", question),
            options: options.map(|content| AnswerOption {
                answer_type: "Options".to_string(),
                content,
                correct: false,
                weightage: 0.0,
            }),
            explanation,
        };
        record.rescore(correct);
        record
    }

    /// Index of the option marked correct, if any.
    pub fn correct_index(&self) -> Option<usize> {
        self.options.iter().position(|o| o.correct)
    }

    fn rescore(&mut self, correct: Option<usize>) {
        let scores = answer_key::score_options(self.options.len(), correct, self.meta.marks);
        for (option, score) in self.options.iter_mut().zip(scores) {
            option.correct = score.correct;
            option.weightage = score.weightage;
        }
    }
}

const OBJECTIVE_REQUIRED: &[&str] = &[
    QUESTION_CATEGORY,
    COGNITIVE_SKILLS,
    QUESTION_SOURCE,
    LEVEL_OF_DIFFICULTY,
    MARKS,
];

impl SheetRecord for ObjectiveRecord {
    const SHAPE: Shape = Shape::Objective;

    fn columns() -> Vec<String> {
        let mut columns = meta_columns();
        for i in 1..=OBJECTIVE_OPTION_COUNT {
            columns.push(format!("Answer Type{}", i));
            columns.push(format!("Answer Content{}", i));
            columns.push(format!("Correct Answer{}", i));
            columns.push(format!("Answer Weightage{}", i));
        }
        columns.push("Answer Explanation".to_string());
        columns
    }

    fn required_columns() -> &'static [&'static str] {
        OBJECTIVE_REQUIRED
    }

    fn meta(&self) -> &QuestionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut QuestionMeta {
        &mut self.meta
    }

    fn to_row(&self) -> Vec<Cell> {
        let mut row = self.meta.cells();
        for option in &self.options {
            row.push(Cell::text(&option.answer_type));
            row.push(Cell::text(&option.content));
            row.push(Cell::text(if option.correct { "Yes" } else { "No" }));
            row.push(Cell::Number(option.weightage));
        }
        row.push(Cell::text(&self.explanation));
        row
    }

    fn from_row(row: &SheetRow<'_>) -> Result<Self> {
        let options = std::array::from_fn(|i| {
            let n = i + 1;
            AnswerOption {
                answer_type: row.get(&format!("Answer Type{}", n)).to_string(),
                content: row.get(&format!("Answer Content{}", n)).to_string(),
                correct: row.get(&format!("Correct Answer{}", n)).eq_ignore_ascii_case("yes"),
                weightage: row.number(&format!("Answer Weightage{}", n)).unwrap_or(0.0),
            }
        });

        Ok(Self {
            meta: QuestionMeta::from_row(row),
            options,
            explanation: row.get("Answer Explanation").to_string(),
        })
    }

    fn set_extra_text(&mut self, column: &str, value: String) -> bool {
        match column {
            "Answer Explanation" => {
                self.explanation = value;
                true
            }
            _ => false,
        }
    }

    /// Weights follow the (possibly changed) Marks.
    fn finish_enrichment(mut self, _overflow: Vec<RubricLine>) -> Self {
        let correct = self.correct_index();
        self.rescore(correct);
        self
    }
}

// ============================================================================
// Subjective
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectiveRecord {
    pub meta: QuestionMeta,
    pub answer_type: String,
    /// The solution text.
    pub answer_content: String,
    pub answer_display: String,
    pub answer_weightage: Option<f64>,
    pub answer_option: String,
    pub explanation: String,
}

impl SubjectiveRecord {
    pub fn new(label: String, question: String, solution: String) -> Self {
        Self {
            meta: QuestionMeta::new(label, "Fill in the Blanks", question),
            answer_type: " ".to_string(),
            answer_content: solution.clone(),
            answer_display: "yes".to_string(),
            answer_weightage: Some(1.0),
            answer_option: String::new(),
            explanation: solution,
        }
    }
}

const SUBJECTIVE_REQUIRED: &[&str] = &[
    QUESTION_CATEGORY,
    COGNITIVE_SKILLS,
    QUESTION_SOURCE,
    LEVEL_OF_DIFFICULTY,
    MARKS,
    "answer_type",
];

impl SheetRecord for SubjectiveRecord {
    const SHAPE: Shape = Shape::Subjective;

    fn columns() -> Vec<String> {
        let mut columns = meta_columns();
        columns.extend(
            [
                "answer_type",
                "answer_content",
                "answer_display",
                "answer_weightage",
                "answer_option",
                "answer_explanation",
            ]
            .map(String::from),
        );
        columns
    }

    fn required_columns() -> &'static [&'static str] {
        SUBJECTIVE_REQUIRED
    }

    fn meta(&self) -> &QuestionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut QuestionMeta {
        &mut self.meta
    }

    fn to_row(&self) -> Vec<Cell> {
        let mut row = self.meta.cells();
        row.push(Cell::text(&self.answer_type));
        row.push(Cell::text(&self.answer_content));
        row.push(Cell::text(&self.answer_display));
        row.push(Cell::number(self.answer_weightage));
        row.push(Cell::text(&self.answer_option));
        row.push(Cell::text(&self.explanation));
        row
    }

    fn from_row(row: &SheetRow<'_>) -> Result<Self> {
        Ok(Self {
            meta: QuestionMeta::from_row(row),
            answer_type: row.get("answer_type").to_string(),
            answer_content: row.get("answer_content").to_string(),
            answer_display: row.get("answer_display").to_string(),
            answer_weightage: row.number("answer_weightage"),
            answer_option: row.get("answer_option").to_string(),
            explanation: row.get("answer_explanation").to_string(),
        })
    }

    fn set_extra_text(&mut self, column: &str, value: String) -> bool {
        let slot = match column {
            "answer_type" => &mut self.answer_type,
            "answer_content" => &mut self.answer_content,
            "answer_display" => &mut self.answer_display,
            "answer_option" => &mut self.answer_option,
            "answer_explanation" => &mut self.explanation,
            _ => return false,
        };
        *slot = value;
        true
    }
}

// ============================================================================
// Descriptive
// ============================================================================

fn mark_annotation_regex() -> &'static Regex {
    static MARKS_RE: OnceLock<Regex> = OnceLock::new();
    MARKS_RE.get_or_init(|| {
        Regex::new(r"\((\d+(?:\.\d+)?) Marks?\)").expect("valid mark annotation regex")
    })
}

/// One rubric entry of a descriptive answer, e.g. `Defines the term (1 Mark)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricLine {
    pub rubric: String,
    pub marks: Option<f64>,
}

impl RubricLine {
    /// Parse a rubric line, capturing and removing any `(N Marks)` annotation.
    /// Surrounding ` -"'` characters are trimmed. Returns `None` for blank text.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let marks = mark_annotation_regex()
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_number(m.as_str()));
        let rubric = mark_annotation_regex()
            .replace_all(line, "")
            .trim_matches(|c| matches!(c, ' ' | '-' | '"' | '\''))
            .to_string();

        if rubric.is_empty() {
            return None;
        }
        Some(Self { rubric, marks })
    }
}

impl std::fmt::Display for RubricLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.marks {
            Some(m) if m == 1.0 => write!(f, "{} (1 Mark)", self.rubric),
            Some(m) => write!(f, "{} ({} Marks)", self.rubric, format_number(m)),
            None => f.write_str(&self.rubric),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveRecord {
    pub meta: QuestionMeta,
    pub display_answer: String,
    pub answer_type: String,
    pub answer_weightage: Option<f64>,
    pub answer_content: String,
    pub rubric_lines: Vec<RubricLine>,
    pub explanation: String,
}

impl DescriptiveRecord {
    pub fn new(label: String, question: String, solution: String) -> Self {
        Self {
            meta: QuestionMeta::new(label, "Descriptive", question),
            display_answer: solution.clone(),
            answer_type: String::new(),
            answer_weightage: None,
            answer_content: String::new(),
            rubric_lines: Vec::new(),
            explanation: solution,
        }
    }

    /// Answer Content cell: the content value followed by one rubric per line.
    fn content_cell(&self) -> String {
        if self.rubric_lines.is_empty() {
            return self.answer_content.clone();
        }
        let mut lines = vec![self.answer_content.clone()];
        lines.extend(self.rubric_lines.iter().map(|r| r.to_string()));
        lines.join("\n")
    }
}

const DESCRIPTIVE_REQUIRED: &[&str] = &[
    QUESTION_CATEGORY,
    COGNITIVE_SKILLS,
    QUESTION_SOURCE,
    LEVEL_OF_DIFFICULTY,
    MARKS,
    "Answer Type",
    "Answer Content",
];

impl SheetRecord for DescriptiveRecord {
    const SHAPE: Shape = Shape::Descriptive;

    fn columns() -> Vec<String> {
        let mut columns = meta_columns();
        columns.extend(
            [
                "Display Answer",
                "Answer Type",
                "Answer Weightage",
                "Answer Content",
                "Answer Explanation",
            ]
            .map(String::from),
        );
        columns
    }

    fn required_columns() -> &'static [&'static str] {
        DESCRIPTIVE_REQUIRED
    }

    fn meta(&self) -> &QuestionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut QuestionMeta {
        &mut self.meta
    }

    fn to_row(&self) -> Vec<Cell> {
        let mut row = self.meta.cells();
        row.push(Cell::text(&self.display_answer));
        row.push(Cell::text(&self.answer_type));
        row.push(Cell::number(self.answer_weightage));
        row.push(Cell::Text(self.content_cell()));
        row.push(Cell::text(&self.explanation));
        row
    }

    fn from_row(row: &SheetRow<'_>) -> Result<Self> {
        let mut content_lines = row.get("Answer Content").split('\n');
        let answer_content = content_lines.next().unwrap_or("").to_string();
        let rubric_lines = content_lines.filter_map(RubricLine::parse).collect();

        Ok(Self {
            meta: QuestionMeta::from_row(row),
            display_answer: row.get("Display Answer").to_string(),
            answer_type: row.get("Answer Type").to_string(),
            answer_weightage: row.number("Answer Weightage"),
            answer_content,
            rubric_lines,
            explanation: row.get("Answer Explanation").to_string(),
        })
    }

    fn set_extra_text(&mut self, column: &str, value: String) -> bool {
        let slot = match column {
            "Display Answer" => &mut self.display_answer,
            "Answer Type" => &mut self.answer_type,
            "Answer Content" => &mut self.answer_content,
            "Answer Explanation" => &mut self.explanation,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Overflow lines become the rubric. Weightage totals the marks of the
    /// rubric lines and of the content value when it is itself a rubric.
    fn finish_enrichment(mut self, overflow: Vec<RubricLine>) -> Self {
        self.rubric_lines = overflow;
        let marked: Vec<f64> = RubricLine::parse(&self.answer_content)
            .into_iter()
            .chain(self.rubric_lines.iter().cloned())
            .filter_map(|r| r.marks)
            .collect();
        self.answer_weightage = if marked.is_empty() {
            None
        } else {
            Some(marked.iter().sum())
        };
        self
    }
}

// ============================================================================
// Workbook contents
// ============================================================================

/// The three sheets of a question workbook, rows in ordinal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionSheets {
    pub objective: Vec<ObjectiveRecord>,
    pub subjective: Vec<SubjectiveRecord>,
    pub descriptive: Vec<DescriptiveRecord>,
}

impl QuestionSheets {
    pub fn total_rows(&self) -> usize {
        self.objective.len() + self.subjective.len() + self.descriptive.len()
    }
}
