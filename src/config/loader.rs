use crate::config::schema::{expand_home, LabConfig, ValidationError};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read cockpit config from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse cockpit config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse cockpit config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid cockpit config ({}): {}", path.display(), source),
                None => write!(f, "invalid cockpit config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// Parse and validate config text. Relative paths inside it resolve against
/// the current directory.
pub fn load_from_str(input: &str) -> Result<LabConfig, ConfigError> {
    parse(input, None)
}

/// Read, parse and validate a config file. Relative paths inside it resolve
/// against the file's directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<LabConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, Some(path))
}

fn parse(input: &str, origin: Option<&Path>) -> Result<LabConfig, ConfigError> {
    let mut config: LabConfig = toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml {
        path: origin.map(Path::to_path_buf),
        source,
    })?;
    config.validate().map_err(|source| ConfigError::Validation {
        path: origin.map(Path::to_path_buf),
        source,
    })?;
    normalize(&mut config, origin.and_then(Path::parent));
    Ok(config)
}

/// Settle values the rest of the cockpit should not have to second-guess:
/// endpoints lose surrounding blanks and trailing slashes, keywords are
/// trimmed lowercase without duplicates, and the state dir becomes an
/// absolute path (`~` expanded, relative paths anchored at `base_dir`).
fn normalize(config: &mut LabConfig, base_dir: Option<&Path>) {
    for engine in [&mut config.engines.scriptor, &mut config.engines.master] {
        if let Some(endpoint) = engine.endpoint.as_mut() {
            *endpoint = endpoint.trim().trim_end_matches('/').to_string();
        }
    }

    for keywords in [
        &mut config.router.scriptor_keywords,
        &mut config.router.master_keywords,
    ] {
        let mut seen = HashSet::new();
        keywords.retain_mut(|keyword| {
            *keyword = keyword.trim().to_lowercase();
            seen.insert(keyword.clone())
        });
    }

    if let Some(dir) = config.state.dir.as_deref() {
        if let Some(mut resolved) = expand_home(dir) {
            if resolved.is_relative() {
                if let Some(base) = base_dir.filter(|b| !b.as_os_str().is_empty()) {
                    resolved = base.join(resolved);
                }
            }
            tracing::debug!(dir = %resolved.display(), "state directory");
            config.state.dir = Some(resolved.display().to_string());
        }
    }
}

/// `~/.lab-cockpit/config.toml`, if a home directory exists.
pub fn default_path() -> Option<PathBuf> {
    expand_home("~/.lab-cockpit/config.toml")
}

/// Load `explicit` if given (it must exist); otherwise the default path if
/// present; otherwise built-in defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<LabConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    match default_path() {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "loading cockpit config");
            load_from_path(path)
        }
        _ => Ok(LabConfig::default()),
    }
}
