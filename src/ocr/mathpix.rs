//! Mathpix PDF OCR provider (uses Mathpix's asynchronous PDF API).

use super::{JobStatus, OcrInput, OcrProvider};
use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};

const MATHPIX_API_URL: &str = "https://api.mathpix.com/v3/pdf";

pub struct MathpixProvider {
    app_id: String,
    app_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl MathpixProvider {
    pub fn new(client: reqwest::Client, app_id: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_key: app_key.into(),
            base_url: MATHPIX_API_URL.to_string(),
            client,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("app_id", &self.app_id)
            .header("app_key", &self.app_key)
    }
}

// ── Mathpix API request/response types ──────────────────────────────────────

/// Conversion options sent alongside the upload.
fn conversion_options() -> serde_json::Value {
    serde_json::json!({
        "conversion_formats": { "docx": true, "tex.zip": true },
        "math_inline_delimiters": ["$", "$"],
        "rm_spaces": true
    })
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    pdf_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    percent_done: Option<f64>,
}

fn parse_status(response: &StatusResponse) -> JobStatus {
    match response.status.as_str() {
        "completed" => JobStatus::Completed,
        "error" => JobStatus::Failed(
            response
                .error
                .clone()
                .unwrap_or_else(|| "unknown Mathpix error".to_string()),
        ),
        _ => JobStatus::Processing,
    }
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MathpixProvider {
    fn name(&self) -> &str {
        "mathpix"
    }

    async fn submit(&self, input: &OcrInput) -> anyhow::Result<String> {
        use reqwest::multipart::{Form, Part};

        info!(
            "MathpixProvider: uploading {} ({} bytes)",
            input.filename,
            input.data.len()
        );

        let part = Part::bytes(input.data.clone())
            .file_name(input.filename.clone())
            .mime_str(input.content_type.as_deref().unwrap_or("application/pdf"))?;

        let form = Form::new()
            .text("options_json", conversion_options().to_string())
            .part("file", part);

        let resp = self
            .request(self.client.post(&self.base_url))
            .multipart(form)
            .send()
            .await
            .context("Failed to send request to Mathpix")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mathpix API error ({}): {}", status, text);
        }

        let submitted: SubmitResponse = resp
            .json()
            .await
            .context("Failed to parse Mathpix submit response")?;

        match submitted.pdf_id {
            Some(pdf_id) => {
                info!("MathpixProvider: submitted pdf_id={}", pdf_id);
                Ok(pdf_id)
            }
            None => anyhow::bail!(
                "Mathpix returned no pdf_id: {}",
                submitted.error.unwrap_or_default()
            ),
        }
    }

    async fn status(&self, job_id: &str) -> anyhow::Result<JobStatus> {
        let url = format!("{}/{}.json", self.base_url, job_id);
        let response: StatusResponse = self
            .request(self.client.get(&url))
            .send()
            .await
            .context("Failed to query Mathpix status")?
            .error_for_status()
            .context("Mathpix status query returned error")?
            .json()
            .await
            .context("Failed to parse Mathpix status")?;

        debug!(
            "MathpixProvider: {} status={} ({:?}% done)",
            job_id, response.status, response.percent_done
        );
        Ok(parse_status(&response))
    }

    async fn fetch(&self, job_id: &str) -> anyhow::Result<String> {
        let url = format!("{}/{}.mmd", self.base_url, job_id);
        let text = self
            .request(self.client.get(&url))
            .send()
            .await
            .context("Failed to download Mathpix markdown")?
            .error_for_status()
            .context("Mathpix markdown download returned error")?
            .text()
            .await?;

        debug!("MathpixProvider: fetched {} chars for {}", text.len(), job_id);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(json: serde_json::Value) -> JobStatus {
        parse_status(&serde_json::from_value(json).unwrap())
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(status(serde_json::json!({"status": "completed"})), JobStatus::Completed);
        assert_eq!(
            status(serde_json::json!({"status": "split", "percent_done": 40.0})),
            JobStatus::Processing
        );
        assert_eq!(status(serde_json::json!({})), JobStatus::Processing);
        assert_eq!(
            status(serde_json::json!({"status": "error", "error": "bad pdf"})),
            JobStatus::Failed("bad pdf".to_string())
        );
    }

    #[test]
    fn test_conversion_options() {
        let options = conversion_options();
        assert_eq!(options["rm_spaces"], true);
        assert_eq!(options["math_inline_delimiters"], serde_json::json!(["$", "$"]));
    }
}
