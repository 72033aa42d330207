//! Runtime settings and vocabulary profiles.
//!
//! Settings come from the environment (`.env` is loaded in `main`).
//! Vocabulary profiles are JSON files in the `configs/` directory; a built-in
//! default is used when the directory holds none.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Closed category vocabularies embedded in enrichment prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub question_categories: Vec<String>,
    pub cognitive_skills: Vec<String>,
    pub question_sources: Vec<String>,
    /// Difficulty scale for the Objective and Descriptive sheets.
    pub difficulty_levels: Vec<String>,
    /// Difficulty scale for the Subjective sheet.
    pub subjective_difficulty_levels: Vec<String>,
    pub subjective_answer_types: Vec<String>,
    pub descriptive_answer_types: Vec<String>,
    #[serde(default)]
    pub marks: MarksHints,
}

/// Marks hint shown to the oracle per sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarksHints {
    pub objective: String,
    pub subjective: String,
    pub descriptive: String,
}

impl Default for MarksHints {
    fn default() -> Self {
        Self {
            objective: "1".to_string(),
            subjective: "1".to_string(),
            descriptive: "1-6".to_string(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: "School worksheet and test categories".to_string(),
            question_categories: strings(&[
                "Answer the following correctly",
                "Evaluate the following",
                "Simplify the following expr.",
                "Choose the ODD one Out",
                "Numerical/application based",
                "Very Short Answer Questions",
                "True or False",
                "CBQ with sub questions",
                "LAT with sub questions",
                "LAT Questions",
                "SAT Questions (3 Marks)",
                "SAT Questions (2 Marks)",
                "Dialogues completion",
                "Sentence completion",
                "Rearrange the following words",
                "Identifying the following",
                "Sentence Transformation",
                "Sentence reordering",
                "Editing and Omission",
                "Error correction",
                "Joining Sentences",
                "Fill in the Blanks",
                "Passage based questions",
                "Composition writing",
                "Short Answer Type (3 marks)",
                "Short Answer Type (2 marks)",
                "Extract based question",
                "Choose the correct answers",
                "Locating and Plotting on map",
                "Extract based on Map Survey",
                "Assertion & Reasons Type",
                "Mark Questions",
                "2 Marks Question",
                "5 Mark Question",
                "4 Mark Question",
                "3 Mark Question",
                "1 Mark Question",
                "Match the following Questions",
                "Multiple Choice Question",
                "Describe Questions",
                "Direct Question",
            ]),
            cognitive_skills: strings(&[
                "Remembering",
                "Analyzing",
                "Applying",
                "Evaluating",
                "Learning",
                "Understanding",
            ]),
            question_sources: strings(&["NCERT", "NON-NCERT", "Oswaal", "Selina"]),
            difficulty_levels: strings(&["Less", "Moderate", "Highly"]),
            subjective_difficulty_levels: strings(&["Easy", "Medium", "Hard"]),
            subjective_answer_types: strings(&["Words", "Numbers", "Alpha Numeric", "Equations"]),
            descriptive_answer_types: strings(&["Equation", "Phrases"]),
            marks: MarksHints::default(),
        }
    }
}

/// Loaded vocabulary profiles, keyed by name.
#[derive(Debug)]
pub struct ConfigStore {
    configs: BTreeMap<String, VocabularyConfig>,
    default_config: String,
}

impl ConfigStore {
    /// Load every `*.json` profile in `dir`. Falls back to the built-in
    /// default when the directory is missing or holds no profiles.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut configs = Vec::new();

        if dir.exists() {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();

                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read config: {:?}", path))?;

                    let config: VocabularyConfig = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse config: {:?}", path))?;

                    info!("Loaded vocabulary: {} from {:?}", config.name, path);
                    configs.push(config);
                }
            }
        } else {
            warn!("Config directory does not exist: {:?}", dir);
        }

        if configs.is_empty() {
            warn!("No vocabulary profiles found in {:?}, using built-in default", dir);
            configs.push(VocabularyConfig::default());
        }

        Ok(Self::from_configs(configs))
    }

    /// Build a store from profiles in memory. An empty list yields the
    /// built-in default.
    pub fn from_configs(configs: Vec<VocabularyConfig>) -> Self {
        let mut map: BTreeMap<String, VocabularyConfig> =
            configs.into_iter().map(|c| (c.name.clone(), c)).collect();

        if map.is_empty() {
            let fallback = VocabularyConfig::default();
            map.insert(fallback.name.clone(), fallback);
        }

        let default_config = if map.contains_key("default") {
            "default".to_string()
        } else {
            map.keys().next().cloned().unwrap_or_default()
        };

        Self {
            configs: map,
            default_config,
        }
    }

    /// Profile by name, or the default profile when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Option<&VocabularyConfig> {
        self.configs.get(name.unwrap_or(&self.default_config))
    }

    pub fn list(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }
}

/// OCR polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 8,
        }
    }
}

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub config_dir: PathBuf,
    pub mathpix_app_id: String,
    pub mathpix_api_key: String,
    pub openrouter_api_key: String,
    pub openrouter_model: Option<String>,
    pub poll: PollPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let required = |key: &str| {
            std::env::var(key).with_context(|| format!("{} environment variable not set", key))
        };
        let defaults = PollPolicy::default();

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            config_dir: std::env::var("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("configs")),
            mathpix_app_id: required("MATHPIX_APP_ID")?,
            mathpix_api_key: required("MATHPIX_API_KEY")?,
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            openrouter_model: std::env::var("OPENROUTER_MODEL").ok(),
            poll: PollPolicy {
                interval: env_parse("OCR_POLL_INTERVAL_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.interval),
                max_attempts: env_parse("OCR_MAX_POLLS")?.unwrap_or(defaults.max_attempts),
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}
