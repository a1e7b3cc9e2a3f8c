use anyhow::{Context, Result};
use eigenface_core::{PreprocessOptions, RecognizerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration: TOML file (optional), then `EIGENFACE_*` environment
/// variables, then command-line flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the gallery images and label file.
    pub gallery_dir: PathBuf,
    pub recognizer: RecognizerConfig,
    pub preprocess: PreprocessOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery_dir: default_gallery_dir(),
            recognizer: RecognizerConfig::default(),
            preprocess: PreprocessOptions::default(),
        }
    }
}

impl Config {
    /// Load `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(base.with_env(|key| std::env::var(key).ok()))
    }

    /// Apply `EIGENFACE_*` overrides read through `var`.
    fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = var("EIGENFACE_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(dir);
        }
        let r = &mut self.recognizer;
        r.max_components = parse_or(&var, "EIGENFACE_MAX_COMPONENTS", r.max_components);
        r.epsilon = parse_or(&var, "EIGENFACE_EPSILON", r.epsilon);
        r.distance_threshold =
            parse_or(&var, "EIGENFACE_DISTANCE_THRESHOLD", r.distance_threshold);

        let p = &mut self.preprocess;
        if let Some(size) = var("EIGENFACE_FACE_SIZE").and_then(|v| v.parse().ok()) {
            p.width = size;
            p.height = size;
        }
        if let Some(v) = var("EIGENFACE_EQUALIZE") {
            p.equalize = v != "0";
        }
        self
    }
}

fn default_gallery_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("eigenface")
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable override");
            default
        }),
        None => default,
    }
}
