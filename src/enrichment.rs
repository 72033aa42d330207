//! Oracle enrichment of assembled question sheets.
//!
//! Each row gets one classification call. The reply is read line by line and
//! its values are assigned positionally to the sheet's required columns.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::classifier::Shape;
use crate::config::VocabularyConfig;
use crate::openrouter::ChatOptions;
use crate::oracle::{Oracle, OracleRequest};
use crate::records::{parse_number, QuestionSheets, RubricLine, SheetRecord, MARKS};

/// One value read from an oracle reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEntry {
    /// Text after the first `": "` of a `Key: value` line.
    Field(String),
    /// A rubric continuation line (Descriptive replies only).
    Rubric(RubricLine),
}

impl ReplyEntry {
    /// Rubric entries keep their mark annotation so a rubric landing in a
    /// text column still counts towards the answer weightage.
    fn into_value(self) -> String {
        match self {
            ReplyEntry::Field(value) => value,
            ReplyEntry::Rubric(line) => line.to_string(),
        }
    }

    fn into_rubric(self) -> Option<RubricLine> {
        match self {
            ReplyEntry::Field(value) => RubricLine::parse(&value),
            ReplyEntry::Rubric(line) => Some(line),
        }
    }
}

/// Row counts for one enrichment run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnrichmentReport {
    pub enriched: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl EnrichmentReport {
    fn merge(&mut self, other: EnrichmentReport) {
        self.enriched += other.enriched;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Sampling parameters per sheet.
pub fn chat_options(shape: Shape) -> ChatOptions {
    match shape {
        Shape::Objective => ChatOptions {
            temperature: Some(0.0),
            max_tokens: Some(150),
        },
        Shape::Subjective => ChatOptions {
            temperature: None,
            max_tokens: Some(150),
        },
        Shape::Descriptive => ChatOptions {
            temperature: None,
            max_tokens: Some(300),
        },
    }
}

/// Build the classification request for one question.
pub fn build_request(shape: Shape, question: &str, vocab: &VocabularyConfig) -> OracleRequest {
    let categories = vocab.question_categories.join(", ");
    let skills = vocab.cognitive_skills.join("/");
    let sources = vocab.question_sources.join("/");

    let prompt = match shape {
        Shape::Objective => format!(
            "Based on the following question content, provide the following details:\n\
             1. Question Category: {}\n\
             2. Cognitive Skills: {}\n\
             3. Question Source: {}\n\
             4. Level of Difficulty: {}\n\
             5. Marks: {}\n\n\
             Question Content: {}",
            categories,
            skills,
            sources,
            vocab.difficulty_levels.join("/"),
            vocab.marks.objective,
            question
        ),
        Shape::Subjective => format!(
            "Based on the following question content, provide the following details:\n\
             1. Question Category: {}\n\
             2. Cognitive Skills: {}\n\
             3. Question Source: {}\n\
             4. Level of Difficulty: {}\n\
             5. Marks: {}\n\
             6. answer_type: {}\n\n\
             Question Content: {}",
            categories,
            skills,
            sources,
            vocab.subjective_difficulty_levels.join("/"),
            vocab.marks.subjective,
            vocab.subjective_answer_types.join("/"),
            question
        ),
        Shape::Descriptive => format!(
            "Based on the following question content, provide:\n\
             1. Question Category: {}\n\
             2. Cognitive Skills: {}\n\
             3. Question Source: {}\n\
             4. Level of Difficulty: {}\n\
             5. Marks: {}\n\
             6. Answer Type: {}\n\
             7. Answer Content: Rubrics with marks in format \"'Rubric' ('Mark allotted')\"\n\n\
             Question Content: {}",
            categories,
            skills,
            sources,
            vocab.difficulty_levels.join("/"),
            vocab.marks.descriptive,
            vocab.descriptive_answer_types.join("/"),
            question
        ),
    };

    OracleRequest {
        prompt,
        options: chat_options(shape),
    }
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Split a reply into ordered entries. `Key: value` lines come first, in
/// order; for Descriptive replies the remaining non-empty lines follow as
/// rubric entries.
pub fn parse_reply(reply: &str, shape: Shape) -> Vec<ReplyEntry> {
    let mut fields = Vec::new();
    let mut rubrics = Vec::new();

    for line in reply.lines().map(str::trim) {
        if let Some((_, value)) = line.split_once(": ") {
            fields.push(ReplyEntry::Field(value.trim().to_string()));
        } else if shape == Shape::Descriptive && !line.is_empty() && !line.contains("Answer Content:") {
            if let Some(rubric) = RubricLine::parse(line) {
                rubrics.push(ReplyEntry::Rubric(rubric));
            }
        }
    }

    fields.extend(rubrics);
    fields
}

/// Assign reply entries to the record's required columns, in order.
///
/// Missing entries blank their column (Marks becomes null). Entries beyond
/// the required columns are handed to the record as overflow.
pub fn apply_details<R: SheetRecord>(mut record: R, entries: Vec<ReplyEntry>) -> R {
    let mut entries = entries.into_iter();

    for &column in R::required_columns() {
        let value = entries.next().map(ReplyEntry::into_value);

        if column == MARKS {
            record.meta_mut().marks = value.as_deref().and_then(parse_number);
            continue;
        }

        let text = value
            .as_deref()
            .map(|v| v.trim_matches(|c| c == '"' || c == '\'').to_string())
            .unwrap_or_default();
        if !record.set_text(column, text) {
            warn!("{} sheet has no column '{}'", R::SHAPE, column);
        }
    }

    let overflow = entries.filter_map(ReplyEntry::into_rubric).collect();
    record.finish_enrichment(overflow)
}

// ============================================================================
// Enrichment loop
// ============================================================================

async fn enrich_one<R: SheetRecord>(
    record: &R,
    oracle: &dyn Oracle,
    vocab: &VocabularyConfig,
) -> Result<R> {
    let request = build_request(R::SHAPE, &record.meta().question, vocab);
    let reply = oracle
        .classify(&request)
        .await
        .with_context(|| format!("Oracle call failed for {}", record.meta().label))?;
    debug!("Oracle reply for {}: {}", record.meta().label, reply);

    let entries = parse_reply(&reply, R::SHAPE);
    debug!("Parsed details for {}: {:?}", record.meta().label, entries);

    Ok(apply_details(record.clone(), entries))
}

/// Enrich every row of one sheet. A failed row keeps its prior values.
pub async fn enrich_records<R: SheetRecord>(
    records: &[R],
    oracle: &dyn Oracle,
    vocab: &VocabularyConfig,
) -> (Vec<R>, EnrichmentReport) {
    let mut report = EnrichmentReport::default();
    let mut out = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        if record.meta().question.trim().is_empty() {
            report.skipped += 1;
            out.push(record.clone());
            continue;
        }

        match enrich_one(record, oracle, vocab).await {
            Ok(enriched) => {
                report.enriched += 1;
                out.push(enriched);
            }
            Err(e) => {
                warn!(
                    "Error processing {} question {}: {:#}",
                    R::SHAPE,
                    idx + 1,
                    e
                );
                report.failed += 1;
                out.push(record.clone());
            }
        }
    }

    (out, report)
}

/// Enrich all three sheets, one oracle call per non-empty row.
pub async fn enrich_sheets(
    sheets: &QuestionSheets,
    oracle: &dyn Oracle,
    vocab: &VocabularyConfig,
) -> (QuestionSheets, EnrichmentReport) {
    info!(
        "Enriching {} row(s) with vocabulary '{}'",
        sheets.total_rows(),
        vocab.name
    );

    let mut report = EnrichmentReport::default();

    let (objective, r) = enrich_records(&sheets.objective, oracle, vocab).await;
    report.merge(r);
    let (subjective, r) = enrich_records(&sheets.subjective, oracle, vocab).await;
    report.merge(r);
    let (descriptive, r) = enrich_records(&sheets.descriptive, oracle, vocab).await;
    report.merge(r);

    info!(
        "Enrichment done: {} enriched, {} failed, {} skipped",
        report.enriched, report.failed, report.skipped
    );

    (
        QuestionSheets {
            objective,
            subjective,
            descriptive,
        },
        report,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;
    use crate::records::{DescriptiveRecord, ObjectiveRecord, SubjectiveRecord};

    const DESCRIPTIVE_REPLY: &str = "Question Category: Describe Questions\n\
        Cognitive Skills: Understanding\n\
        Question Source: NCERT\n\
        Level of Difficulty: Moderate\n\
        Marks: 3\n\
        Answer Type: Phrases\n\
        Answer Content: Rubrics\n\
        - 'Defines the term' (1 Mark)\n\
        - 'Gives an example' (2 Marks)";

    fn descriptive(n: usize) -> DescriptiveRecord {
        DescriptiveRecord::new(format!("Q{}", n), format!("Explain concept {}.", n), String::new())
    }

    fn objective() -> ObjectiveRecord {
        ObjectiveRecord::new(
            "Q1".into(),
            "What is 2+2?".into(),
            ["a) 3", "b) 4", "c) 5", "d) 6"].map(String::from),
            "(b) because 2+2=4".into(),
        )
    }

    #[tokio::test]
    async fn test_failure_isolated_to_one_row() {
        let records: Vec<_> = (1..=10).map(descriptive).collect();
        let oracle = ScriptedOracle::replying(DESCRIPTIVE_REPLY).failing_on(&[5]);
        let vocab = VocabularyConfig::default();

        let (out, report) = enrich_records(&records, &oracle, &vocab).await;

        assert_eq!(oracle.calls(), 10);
        assert_eq!(out.len(), 10);
        assert_eq!(report, EnrichmentReport { enriched: 9, failed: 1, skipped: 0 });
        assert_eq!(out[4], records[4]);
        for (i, row) in out.iter().enumerate().filter(|(i, _)| *i != 4) {
            assert_eq!(row.meta.category, "Describe Questions", "row {}", i + 1);
            assert_eq!(row.meta.marks, Some(3.0));
        }
    }

    #[tokio::test]
    async fn test_descriptive_rubric_lines() {
        let oracle = ScriptedOracle::replying(DESCRIPTIVE_REPLY);
        let (out, _) = enrich_records(&[descriptive(1)], &oracle, &VocabularyConfig::default()).await;
        let row = &out[0];

        assert_eq!(row.meta.cognitive_skills, "Understanding");
        assert_eq!(row.meta.source, "NCERT");
        assert_eq!(row.meta.difficulty, "Moderate");
        assert_eq!(row.answer_type, "Phrases");
        assert_eq!(row.answer_content, "Rubrics");
        assert_eq!(
            row.rubric_lines,
            vec![
                RubricLine { rubric: "Defines the term".into(), marks: Some(1.0) },
                RubricLine { rubric: "Gives an example".into(), marks: Some(2.0) },
            ]
        );
        assert_eq!(row.answer_weightage, Some(3.0));
    }

    #[test]
    fn test_rubric_in_content_slot_keeps_marks() {
        let reply = "1. Question Category: Describe Questions\n\
            2. Cognitive Skills: Understanding\n\
            3. Question Source: NCERT\n\
            4. Level of Difficulty: Moderate\n\
            5. Marks: 3\n\
            6. Answer Type: Phrases\n\
            7. Answer Content:\n\
            - 'Defines the term' (1 Mark)\n\
            - 'Gives an example' (2 Marks)";
        let record = apply_details(descriptive(1), parse_reply(reply, Shape::Descriptive));

        assert_eq!(record.answer_content, "Defines the term (1 Mark)");
        assert_eq!(
            record.rubric_lines,
            vec![RubricLine { rubric: "Gives an example".into(), marks: Some(2.0) }]
        );
        assert_eq!(record.answer_weightage, Some(3.0));
        assert_eq!(record.meta.marks, Some(3.0));
    }

    #[tokio::test]
    async fn test_objective_rescored_from_marks() {
        let reply = "Question Category: Multiple Choice Question\n\
            Cognitive Skills: Applying\n\
            Question Source: NCERT\n\
            Level of Difficulty: Less\n\
            Marks: 2";
        let oracle = ScriptedOracle::replying(reply);
        let (out, _) = enrich_records(&[objective()], &oracle, &VocabularyConfig::default()).await;

        assert_eq!(out[0].meta.category, "Multiple Choice Question");
        assert_eq!(out[0].meta.marks, Some(2.0));
        assert_eq!(out[0].options[1].weightage, 2.0);
        assert_eq!(out[0].options[0].weightage, 0.0);

        let requests = oracle.requests.lock().unwrap();
        assert_eq!(requests[0].options.temperature, Some(0.0));
        assert_eq!(requests[0].options.max_tokens, Some(150));
    }

    #[test]
    fn test_non_numeric_marks_become_null() {
        let entries = parse_reply(
            "Question Category: MCQ\nCognitive Skills: Applying\nQuestion Source: NCERT\n\
             Level of Difficulty: Less\nMarks: one",
            Shape::Objective,
        );
        let record = apply_details(objective(), entries);
        assert_eq!(record.meta.marks, None);
        assert!(record.options[1].correct);
        assert_eq!(record.options[1].weightage, 0.0);
    }

    #[test]
    fn test_short_reply_blanks_remaining_columns() {
        let mut record = SubjectiveRecord::new("Q1".into(), "The ____ is blue.".into(), "sky".into());
        record.meta.source = "Selina".into();
        let entries = parse_reply("Question Category: \"Fill in the Blanks\"\nCognitive Skills: Remembering", Shape::Subjective);
        let record = apply_details(record, entries);

        assert_eq!(record.meta.category, "Fill in the Blanks");
        assert_eq!(record.meta.cognitive_skills, "Remembering");
        assert_eq!(record.meta.source, "");
        assert_eq!(record.meta.difficulty, "");
        assert_eq!(record.meta.marks, None);
        assert_eq!(record.answer_type, "");
        assert_eq!(record.answer_content, "sky");
    }

    #[test]
    fn test_parse_reply_ignores_continuations_outside_descriptive() {
        let reply = "Intro line\nQuestion Category: MCQ\n- stray line";
        assert_eq!(
            parse_reply(reply, Shape::Objective),
            vec![ReplyEntry::Field("MCQ".into())]
        );
        assert_eq!(parse_reply(reply, Shape::Descriptive).len(), 3);
    }

    #[test]
    fn test_value_after_first_separator() {
        let entries = parse_reply("Question Category: Ratio: simple", Shape::Objective);
        assert_eq!(entries, vec![ReplyEntry::Field("Ratio: simple".into())]);
    }

    #[tokio::test]
    async fn test_empty_question_skipped() {
        let oracle = ScriptedOracle::replying(DESCRIPTIVE_REPLY);
        let blank = DescriptiveRecord::new("Q1".into(), "   ".into(), String::new());
        let (out, report) = enrich_records(&[blank.clone()], &oracle, &VocabularyConfig::default()).await;
        assert_eq!(oracle.calls(), 0);
        assert_eq!(out, vec![blank]);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_prompts_embed_vocabulary_and_question() {
        let vocab = VocabularyConfig::default();

        let req = build_request(Shape::Subjective, "The ____ is blue.", &vocab);
        assert!(req.prompt.contains("4. Level of Difficulty: Easy/Medium/Hard"));
        assert!(req.prompt.contains("6. answer_type: Words/Numbers/Alpha Numeric/Equations"));
        assert!(req.prompt.ends_with("Question Content: The ____ is blue."));
        assert_eq!(req.options, ChatOptions { temperature: None, max_tokens: Some(150) });

        let req = build_request(Shape::Descriptive, "Explain.", &vocab);
        assert!(req.prompt.contains("5. Marks: 1-6"));
        assert!(req.prompt.contains("6. Answer Type: Equation/Phrases"));
        assert!(req.prompt.contains("Fill in the Blanks"));
        assert_eq!(req.options.max_tokens, Some(300));
    }

    #[tokio::test]
    async fn test_enrich_sheets_covers_all_shapes() {
        let sheets = QuestionSheets {
            objective: vec![objective()],
            subjective: vec![SubjectiveRecord::new("Q2".into(), "__ is blue".into(), "Sky".into())],
            descriptive: vec![descriptive(3)],
        };
        let oracle = ScriptedOracle::replying(DESCRIPTIVE_REPLY);
        let (out, report) = enrich_sheets(&sheets, &oracle, &VocabularyConfig::default()).await;

        assert_eq!(oracle.calls(), 3);
        assert_eq!(report.enriched, 3);
        assert_eq!(out.total_rows(), 3);
        assert_eq!(out.subjective[0].answer_type, "Phrases");
    }
}
