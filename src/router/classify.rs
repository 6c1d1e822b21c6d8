use crate::brain::Brain;
use crate::config::RouterConfig;
use crate::patch::contains_patch;
use regex::Regex;

/// Keyword hit counts for one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scores {
    pub scriptor: usize,
    pub master: usize,
}

/// Deterministic brain selection.
///
/// Code fences and patch markers always go to Scriptor. Otherwise each
/// keyword list is matched on word boundaries, case-insensitively; the
/// higher count wins and a tie goes to the configured default.
#[derive(Debug, Clone)]
pub struct Classifier {
    scriptor: Option<Regex>,
    master: Option<Regex>,
    default_brain: Brain,
}

impl Classifier {
    pub fn new(config: &RouterConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            scriptor: keyword_regex(&config.scriptor_keywords)?,
            master: keyword_regex(&config.master_keywords)?,
            default_brain: config.default_brain,
        })
    }

    pub fn scores(&self, input: &str) -> Scores {
        let count = |re: &Option<Regex>| re.as_ref().map_or(0, |re| re.find_iter(input).count());
        Scores {
            scriptor: count(&self.scriptor),
            master: count(&self.master),
        }
    }

    pub fn classify(&self, input: &str) -> Brain {
        if input.contains("```") || contains_patch(input) {
            return Brain::Scriptor;
        }
        let scores = self.scores(input);
        let brain = match scores.scriptor.cmp(&scores.master) {
            std::cmp::Ordering::Greater => Brain::Scriptor,
            std::cmp::Ordering::Less => Brain::Master,
            std::cmp::Ordering::Equal => self.default_brain,
        };
        tracing::debug!(
            brain = %brain,
            scriptor = scores.scriptor,
            master = scores.master,
            "classified input"
        );
        brain
    }
}

fn keyword_regex(keywords: &[String]) -> Result<Option<Regex>, regex::Error> {
    let alternation = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).map(Some)
}
