use crate::brain::Brain;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_MAX_CONTEXT: usize = 8192;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CHUNK_CHARS: usize = 6000;
pub const DEFAULT_HISTORY_DEPTH: usize = 64;
pub const DEFAULT_STATE_DIR: &str = "~/.lab-cockpit";

const SCRIPTOR_KEYWORDS: &[&str] = &[
    "fix", "implement", "refactor", "debug", "bug", "error", "compile", "function", "code",
    "patch", "rewrite", "test", "rename", "syntax", "traceback", "exception", "method", "class",
];

const MASTER_KEYWORDS: &[&str] = &[
    "plan", "strategy", "design", "architecture", "explain", "why", "compare", "roadmap", "idea",
    "think", "reason", "tradeoff", "overview", "summarize", "should", "vision",
];

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct LabConfig {
    pub engines: Engines,
    pub router: RouterConfig,
    pub feeder: FeederConfig,
    pub state: StateConfig,
}

impl LabConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for brain in Brain::ALL {
            let engine = self.engines.get(brain);
            let section = format!("engines.{brain}");

            if engine.endpoint.as_deref().is_some_and(|e| e.trim().is_empty()) {
                issues.push(ValidationIssue::EmptyField {
                    section: section.clone(),
                    field: "endpoint",
                });
            }
            if engine.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
                issues.push(ValidationIssue::EmptyField {
                    section: section.clone(),
                    field: "model",
                });
            }
            if engine.max_context == 0 {
                issues.push(ValidationIssue::Zero {
                    section: section.clone(),
                    field: "max_context",
                });
            }
            if engine.max_tokens == 0 {
                issues.push(ValidationIssue::Zero {
                    section: section.clone(),
                    field: "max_tokens",
                });
            }
            if engine.timeout_secs == 0 {
                issues.push(ValidationIssue::Zero {
                    section: section.clone(),
                    field: "timeout_secs",
                });
            }
            if let Some(t) = engine.temperature {
                if !(0.0..=2.0).contains(&t) {
                    issues.push(ValidationIssue::OutOfRange {
                        section,
                        field: "temperature",
                        value: t.to_string(),
                        expected: "0.0..=2.0",
                    });
                }
            }
        }

        if self.feeder.chunk_chars == 0 {
            issues.push(ValidationIssue::Zero {
                section: "feeder".to_string(),
                field: "chunk_chars",
            });
        }
        if self.feeder.history_depth == 0 {
            issues.push(ValidationIssue::Zero {
                section: "feeder".to_string(),
                field: "history_depth",
            });
        }

        for keyword in &self.router.scriptor_keywords {
            if keyword.trim().is_empty() {
                issues.push(ValidationIssue::EmptyField {
                    section: "router".to_string(),
                    field: "scriptor_keywords",
                });
                continue;
            }
            if self
                .router
                .master_keywords
                .iter()
                .any(|other| other.eq_ignore_ascii_case(keyword))
            {
                issues.push(ValidationIssue::KeywordConflict {
                    keyword: keyword.clone(),
                });
            }
        }
        if self.router.master_keywords.iter().any(|k| k.trim().is_empty()) {
            issues.push(ValidationIssue::EmptyField {
                section: "router".to_string(),
                field: "master_keywords",
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Engines {
    pub scriptor: EngineConfig,
    pub master: EngineConfig,
}

impl Default for Engines {
    fn default() -> Self {
        Self {
            scriptor: EngineConfig::default(),
            master: EngineConfig::default(),
        }
    }
}

impl Engines {
    pub fn get(&self, brain: Brain) -> &EngineConfig {
        match brain {
            Brain::Scriptor => &self.scriptor,
            Brain::Master => &self.master,
        }
    }
}

/// One engine's backend and sampling settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// OpenAI-compatible server root. `None` selects the fallback backend.
    pub endpoint: Option<String>,
    /// Model path or name sent to the server; `reload` swaps it.
    pub model: Option<String>,
    /// Character budget for windows handed to this engine.
    pub max_context: usize,
    pub max_tokens: u32,
    /// Unset means the brain's default (0.4 scriptor, 0.6 master).
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            max_context: DEFAULT_MAX_CONTEXT,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    pub fn temperature_for(&self, brain: Brain) -> f32 {
        self.temperature.unwrap_or(match brain {
            Brain::Scriptor => 0.4,
            Brain::Master => 0.6,
        })
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    pub scriptor_keywords: Vec<String>,
    pub master_keywords: Vec<String>,
    /// Brain picked when neither keyword list wins.
    pub default_brain: Brain,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            scriptor_keywords: SCRIPTOR_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            master_keywords: MASTER_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            default_brain: Brain::Master,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FeederConfig {
    pub chunk_chars: usize,
    /// Committed versions kept so a late completion is checked against the
    /// text its model saw. Older completions are rejected as stale.
    pub history_depth: usize,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_CHUNK_CHARS,
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    pub dir: Option<String>,
}

impl StateConfig {
    /// State directory with a leading `~/` expanded. `None` if no home
    /// directory can be found for the default.
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        expand_home(self.dir.as_deref().unwrap_or(DEFAULT_STATE_DIR))
    }
}

pub(crate) fn expand_home(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => home::home_dir().map(|home| home.join(rest)),
        None if path == "~" => home::home_dir(),
        None => Some(PathBuf::from(path)),
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    EmptyField {
        section: String,
        field: &'static str,
    },
    Zero {
        section: String,
        field: &'static str,
    },
    OutOfRange {
        section: String,
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    KeywordConflict {
        keyword: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyField { section, field } => {
                write!(f, "[{section}] '{field}' must not be empty")
            }
            ValidationIssue::Zero { section, field } => {
                write!(f, "[{section}] '{field}' must be greater than zero")
            }
            ValidationIssue::OutOfRange {
                section,
                field,
                value,
                expected,
            } => write!(f, "[{section}] '{field}' = {value} is outside {expected}"),
            ValidationIssue::KeywordConflict { keyword } => write!(
                f,
                "[router] keyword '{keyword}' appears in both scriptor_keywords and master_keywords"
            ),
        }
    }
}
