//! End-to-end processing of one question paper and answer sheet pair.

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::assembler::{assemble, DroppedUnit};
use crate::config::VocabularyConfig;
use crate::enrichment::{enrich_sheets, EnrichmentReport};
use crate::error::ApiError;
use crate::ocr::{OcrInput, OcrPoller, OcrProvider, Sleeper, TokioSleeper};
use crate::oracle::Oracle;
use crate::records::QuestionSheets;
use crate::segmenter::segment;
use crate::workbook::{read_workbook, write_workbook};

pub const INTERMEDIATE_WORKBOOK: &str = "intermediate_output.xlsx";
pub const FINAL_WORKBOOK: &str = "final_output.xlsx";

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: String,
    /// Final workbook bytes.
    pub workbook: Vec<u8>,
    pub dropped: Vec<DroppedUnit>,
    pub enrichment: EnrichmentReport,
}

/// OCR, segmentation, assembly and enrichment wired together.
pub struct Pipeline<S = TokioSleeper> {
    ocr: Arc<dyn OcrProvider>,
    poller: OcrPoller<S>,
    oracle: Arc<dyn Oracle>,
}

impl<S: Sleeper> Pipeline<S> {
    pub fn new(ocr: Arc<dyn OcrProvider>, poller: OcrPoller<S>, oracle: Arc<dyn Oracle>) -> Self {
        Self { ocr, poller, oracle }
    }

    /// Run both documents through the pipeline and return the final workbook.
    ///
    /// Intermediate files live in a per-request temporary directory that is
    /// removed when this returns.
    pub async fn process(
        &self,
        question_paper: &OcrInput,
        answer_sheet: &OcrInput,
        vocab: &VocabularyConfig,
    ) -> Result<PipelineOutput, ApiError> {
        let run_id = format!("run_{}", Uuid::new_v4().simple());
        info!(
            "[{}] Processing {} with answers from {}",
            run_id, question_paper.filename, answer_sheet.filename
        );

        let questions = self.poller.run(self.ocr.as_ref(), question_paper).await?;
        let answers = self.poller.run(self.ocr.as_ref(), answer_sheet).await?;

        info!(
            "[{}] OCR finished via {}: {} (job {}), {} (job {})",
            run_id,
            questions.provider_name,
            questions.filename,
            questions.job_id,
            answers.filename,
            answers.job_id
        );

        let question_units = segment(&questions.text);
        let solution_units = segment(&answers.text);
        info!(
            "Segmented {} question(s) and {} solution(s)",
            question_units.len(),
            solution_units.len()
        );

        let assembly = assemble(&question_units, &solution_units);

        let workdir = tempfile::Builder::new()
            .prefix(&format!("{}-", run_id))
            .tempdir()
            .context("Failed to create working directory")?;

        // Spreadsheet IO is synchronous; keep it off the runtime threads.
        let intermediate_path = workdir.path().join(INTERMEDIATE_WORKBOOK);
        let assembled = assembly.sheets;
        let sheets = tokio::task::spawn_blocking(move || -> anyhow::Result<QuestionSheets> {
            write_workbook(&assembled, &intermediate_path)?;
            read_workbook(&intermediate_path)
        })
        .await
        .context("Intermediate workbook task failed")??;

        let (enriched, report) = enrich_sheets(&sheets, self.oracle.as_ref(), vocab).await;
        let total_rows = enriched.total_rows();

        let final_path = workdir.path().join(FINAL_WORKBOOK);
        let workbook = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            write_workbook(&enriched, &final_path)?;
            std::fs::read(&final_path)
                .with_context(|| format!("Failed to read back {:?}", final_path))
        })
        .await
        .context("Final workbook task failed")??;

        info!(
            "[{}] Pipeline complete: {} row(s), {} dropped, {} bytes",
            run_id,
            total_rows,
            assembly.dropped.len(),
            workbook.len()
        );

        Ok(PipelineOutput {
            run_id,
            workbook,
            dropped: assembly.dropped,
            enrichment: report,
        })
    }
}
