//! OCR collaborator abstraction.
//!
//! Providers expose a job-based contract (submit, status, fetch). The
//! [`OcrPoller`] drives one job through the states
//! `Submitted → Polling → {Completed | TimedOut | Failed}` with an injectable
//! [`Sleeper`] so tests run without real delays.

pub mod mathpix;

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::OcrError;

/// Input to an OCR provider.
#[derive(Debug, Clone)]
pub struct OcrInput {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Status reported by a provider for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    Completed,
    Failed(String),
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Submit a document, returning the provider's job id.
    async fn submit(&self, input: &OcrInput) -> anyhow::Result<String>;
    async fn status(&self, job_id: &str) -> anyhow::Result<JobStatus>;
    /// Fetch the recognized text of a completed job.
    async fn fetch(&self, job_id: &str) -> anyhow::Result<String>;
}

/// Delay between polls.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Lifecycle of one OCR job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted { job_id: String },
    Polling { job_id: String, attempt: u32 },
    Completed { job_id: String },
    TimedOut { job_id: String, attempts: u32 },
    Failed { job_id: String, reason: String },
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Completed { .. } | PollState::TimedOut { .. } | PollState::Failed { .. }
        )
    }
}

/// Recognized text of one document.
#[derive(Debug, Clone)]
pub struct OcrDocument {
    pub filename: String,
    pub job_id: String,
    pub text: String,
    pub provider_name: String,
}

/// Drives OCR jobs to completion on a fixed schedule.
pub struct OcrPoller<S = TokioSleeper> {
    policy: PollPolicy,
    sleeper: S,
}

impl OcrPoller<TokioSleeper> {
    pub fn new(policy: PollPolicy) -> Self {
        Self::with_sleeper(policy, TokioSleeper)
    }
}

impl<S: Sleeper> OcrPoller<S> {
    pub fn with_sleeper(policy: PollPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    /// Advance the state machine by one step.
    pub async fn step(&self, provider: &dyn OcrProvider, state: PollState) -> Result<PollState, OcrError> {
        match state {
            PollState::Submitted { job_id } => Ok(PollState::Polling { job_id, attempt: 1 }),
            PollState::Polling { job_id, attempt } => {
                if attempt > self.policy.max_attempts {
                    return Ok(PollState::TimedOut {
                        job_id,
                        attempts: self.policy.max_attempts,
                    });
                }

                info!("Polling attempt {} for OCR job {}", attempt, job_id);
                let status = provider.status(&job_id).await.map_err(|source| OcrError::Poll {
                    job_id: job_id.clone(),
                    source,
                })?;
                debug!("OCR job {} status: {:?}", job_id, status);

                match status {
                    JobStatus::Completed => Ok(PollState::Completed { job_id }),
                    JobStatus::Failed(reason) => Ok(PollState::Failed { job_id, reason }),
                    JobStatus::Processing => {
                        self.sleeper.sleep(self.policy.interval).await;
                        Ok(PollState::Polling {
                            job_id,
                            attempt: attempt + 1,
                        })
                    }
                }
            }
            terminal => Ok(terminal),
        }
    }

    /// Submit, poll and fetch one document.
    pub async fn run(&self, provider: &dyn OcrProvider, input: &OcrInput) -> Result<OcrDocument, OcrError> {
        info!(
            "Submitting {} ({} bytes) to {}",
            input.filename,
            input.data.len(),
            provider.name()
        );

        let job_id = provider
            .submit(input)
            .await
            .map_err(|source| OcrError::Submission {
                filename: input.filename.clone(),
                source,
            })?;

        let mut state = PollState::Submitted { job_id };
        while !state.is_terminal() {
            state = self.step(provider, state).await?;
        }

        let job_id = match state {
            PollState::Completed { job_id } => job_id,
            PollState::TimedOut { job_id, attempts } => {
                warn!("OCR job {} not completed after {} attempts", job_id, attempts);
                return Err(OcrError::TimedOut { job_id, attempts });
            }
            PollState::Failed { job_id, reason } => {
                return Err(OcrError::JobFailed { job_id, reason });
            }
            PollState::Submitted { .. } | PollState::Polling { .. } => {
                unreachable!("loop exits on terminal states only")
            }
        };

        let raw = provider
            .fetch(&job_id)
            .await
            .map_err(|source| OcrError::Fetch {
                job_id: job_id.clone(),
                source,
            })?;

        let text = normalize_text(&raw);
        info!(
            "OCR job {} completed: {} chars for {}",
            job_id,
            text.len(),
            input.filename
        );

        Ok(OcrDocument {
            filename: input.filename.clone(),
            job_id,
            text,
            provider_name: provider.name().to_string(),
        })
    }
}

/// Strip LaTeX grouping braces and `\section*` commands from OCR markup.
pub fn normalize_text(raw: &str) -> String {
    raw.replace(['{', '}'], "").replace("\\section*", "")
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider and sleeper shared by tests across the crate.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records requested sleeps instead of waiting.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait::async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    #[async_trait::async_trait]
    impl<T: Sleeper + ?Sized> Sleeper for std::sync::Arc<T> {
        async fn sleep(&self, duration: Duration) {
            (**self).sleep(duration).await;
        }
    }

    /// Completes each job after `polls_until_done` status calls and returns
    /// the text registered for its filename.
    pub struct ScriptedOcr {
        pub texts: HashMap<String, String>,
        pub polls_until_done: u32,
        pub reject_submission: bool,
        polls: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedOcr {
        pub fn new(texts: &[(&str, &str)]) -> Self {
            Self {
                texts: texts
                    .iter()
                    .map(|(f, t)| (f.to_string(), t.to_string()))
                    .collect(),
                polls_until_done: 1,
                reject_submission: false,
                polls: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl OcrProvider for ScriptedOcr {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn submit(&self, input: &OcrInput) -> anyhow::Result<String> {
            if self.reject_submission {
                anyhow::bail!("rejected");
            }
            Ok(format!("job-{}", input.filename))
        }

        async fn status(&self, job_id: &str) -> anyhow::Result<JobStatus> {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(job_id.to_string()).or_insert(0);
            *count += 1;
            if *count >= self.polls_until_done {
                Ok(JobStatus::Completed)
            } else {
                Ok(JobStatus::Processing)
            }
        }

        async fn fetch(&self, job_id: &str) -> anyhow::Result<String> {
            let filename = job_id.trim_start_matches("job-");
            self.texts
                .get(filename)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown job {}", job_id))
        }
    }
}
