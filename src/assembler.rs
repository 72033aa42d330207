//! Builds the three shape-specific record collections from segmented
//! questions and solutions.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::classifier::{classify, Classification};
use crate::records::{DescriptiveRecord, ObjectiveRecord, QuestionSheets, SubjectiveRecord};
use crate::segmenter::RawUnit;

/// A question unit that landed in no sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedUnit {
    pub label: String,
    pub option_count: usize,
}

/// Sheets for one document pair plus the units that fit none of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub sheets: QuestionSheets,
    pub dropped: Vec<DroppedUnit>,
}

/// Classify each question and join it to the solution with the same ordinal.
/// Questions without a solution get an empty explanation.
pub fn assemble(questions: &[RawUnit], solutions: &[RawUnit]) -> Assembly {
    if questions.len() != solutions.len() {
        warn!(
            "Question/solution count mismatch ({} vs {}); positional join may misalign",
            questions.len(),
            solutions.len()
        );
    }

    let solution_by_ordinal: HashMap<usize, &str> = solutions
        .iter()
        .map(|s| (s.ordinal, s.body()))
        .collect();

    let mut objective: Vec<ObjectiveRecord> = Vec::new();
    let mut subjective: Vec<SubjectiveRecord> = Vec::new();
    let mut descriptive: Vec<DescriptiveRecord> = Vec::new();
    let mut dropped = Vec::new();

    for question in questions {
        let label = question.label();
        let solution = solution_by_ordinal
            .get(&question.ordinal)
            .copied()
            .unwrap_or("")
            .trim()
            .to_string();

        let classification = classify(question);
        debug!("{} classified as {:?}", label, classification.shape());

        match classification {
            Classification::Objective { body, options } => {
                objective.push(ObjectiveRecord::new(label, body, options, solution));
            }
            Classification::Subjective { body, blank_count } => {
                debug!("{} has {} blank(s)", label, blank_count);
                subjective.push(SubjectiveRecord::new(label, body, solution));
            }
            Classification::Descriptive { body } => {
                descriptive.push(DescriptiveRecord::new(label, body, solution));
            }
            Classification::Dropped { option_count, .. } => {
                warn!(
                    "{} has {} option(s), expected 4 and no blank; excluded from every sheet",
                    label, option_count
                );
                dropped.push(DroppedUnit {
                    label,
                    option_count,
                });
            }
        }
    }

    info!(
        "Assembled {} objective, {} subjective, {} descriptive row(s); {} dropped",
        objective.len(),
        subjective.len(),
        descriptive.len(),
        dropped.len()
    );

    Assembly {
        sheets: QuestionSheets {
            objective,
            subjective,
            descriptive,
        },
        dropped,
    }
}
