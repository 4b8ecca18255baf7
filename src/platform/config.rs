//! `workerd-fuzz.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{Entropy, FuzzError, FuzzResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Base directory for generated snippets and draw logs.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Default reporter for CLI commands.
    #[serde(default = "default_reporter")]
    pub reporter: crate::Reporter,

    /// Generation tunables.
    #[serde(default)]
    pub tuning: Tuning,

    /// Overrides applied on top of the built-in workerd profile.
    #[serde(default)]
    pub profile: ProfileOverrides,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".workerd-fuzz")
}

fn default_reporter() -> crate::Reporter {
    crate::Reporter::Pretty
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            reporter: default_reporter(),
            tuning: Tuning::default(),
            profile: ProfileOverrides::default(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn snippets_dir(&self) -> PathBuf {
        self.base_dir.join("snippets")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProfileOverrides {
    #[serde(default)]
    pub binaries: Option<Vec<String>>,
    /// Per-execution timeout, e.g. "250ms".
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub max_execs_before_respawn: Option<u64>,
}

/// How the scenario treats the runtime capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityMode {
    /// Emit the probe and both branches.
    #[default]
    Probe,
    /// Emit only the full scenario, as if the probe had passed.
    AssumePresent,
    /// Emit only the generic fallback, as if the probe had failed.
    AssumeAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub const fn fixed(n: u32) -> Self {
        Self { min: n, max: n }
    }

    pub fn draw(&self, entropy: &mut dyn Entropy) -> u32 {
        entropy.range(i64::from(self.min), i64::from(self.max)) as u32
    }
}

/// Empirically tuned yield parameters. None of these are correctness
/// constraints; only the presence/variant structure they feed is fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Tuning {
    pub capability: CapabilityMode,

    pub element_slot: f64,
    pub comments_slot: f64,
    pub text_slot: f64,
    pub attribute_overwrite: f64,
    pub content_options: f64,

    pub document_handler: f64,
    pub document_end_slot: f64,
    pub document_doctype_slot: f64,
    pub document_comments_slot: f64,
    pub document_text_slot: f64,

    pub extra_header: f64,
    pub response_status: f64,
    pub response_status_text: f64,

    pub handler_count: CountRange,
    pub selector_pool: Vec<String>,

    pub clone_retransform: f64,
    pub read_text: f64,
    pub text_preview: f64,
    pub read_array_buffer: f64,
    pub buffer_catch: f64,
    pub max_follow_ups: u32,

    pub text_slice_max: u32,
    pub preview_slice_max: u32,

    pub prefix_filler: u32,
    pub inner_filler: CountRange,
    pub fallback_filler: u32,
    pub trailing_filler: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            capability: CapabilityMode::Probe,
            element_slot: 0.7,
            comments_slot: 0.5,
            text_slot: 0.5,
            attribute_overwrite: 0.5,
            content_options: 0.3,
            document_handler: 0.7,
            document_end_slot: 1.0,
            document_doctype_slot: 0.4,
            document_comments_slot: 0.3,
            document_text_slot: 0.3,
            extra_header: 0.4,
            response_status: 0.4,
            response_status_text: 0.3,
            handler_count: CountRange::new(1, 4),
            selector_pool: [
                "*",
                "div",
                "p",
                ".content",
                ".items > li",
                "#wrapper",
                "[data-block]",
                "article > *",
                "section:first-child",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            clone_retransform: 0.5,
            read_text: 0.6,
            text_preview: 0.5,
            read_array_buffer: 0.4,
            buffer_catch: 0.5,
            max_follow_ups: 2,
            text_slice_max: 8,
            preview_slice_max: 12,
            prefix_filler: 3,
            inner_filler: CountRange::new(2, 5),
            fallback_filler: 10,
            trailing_filler: 5,
        }
    }
}

impl Tuning {
    /// Reject out-of-range probabilities, inverted ranges and an empty pool.
    pub fn validate(&self) -> FuzzResult<()> {
        let probabilities = [
            ("element_slot", self.element_slot),
            ("comments_slot", self.comments_slot),
            ("text_slot", self.text_slot),
            ("attribute_overwrite", self.attribute_overwrite),
            ("content_options", self.content_options),
            ("document_handler", self.document_handler),
            ("document_end_slot", self.document_end_slot),
            ("document_doctype_slot", self.document_doctype_slot),
            ("document_comments_slot", self.document_comments_slot),
            ("document_text_slot", self.document_text_slot),
            ("extra_header", self.extra_header),
            ("response_status", self.response_status),
            ("response_status_text", self.response_status_text),
            ("clone_retransform", self.clone_retransform),
            ("read_text", self.read_text),
            ("text_preview", self.text_preview),
            ("read_array_buffer", self.read_array_buffer),
            ("buffer_catch", self.buffer_catch),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(FuzzError::Config(format!(
                    "tuning.{name} must be a probability in [0, 1], got {p}"
                )));
            }
        }
        let ranges = [
            ("handler_count", self.handler_count),
            ("inner_filler", self.inner_filler),
        ];
        for (name, range) in ranges {
            if range.min > range.max {
                return Err(FuzzError::Config(format!(
                    "tuning.{name}: min {} exceeds max {}",
                    range.min, range.max
                )));
            }
        }
        if self.selector_pool.is_empty() {
            return Err(FuzzError::Config("tuning.selector_pool must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Tuning::default().validate().expect("defaults are valid");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            base_dir = "out"

            [tuning]
            capability = "assume_present"
            element_slot = 0.9
            handler_count = { min = 2, max = 2 }
            selector_pool = ["div.only"]

            [profile]
            timeout = "1s"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.base_dir, PathBuf::from("out"));
        assert_eq!(cfg.tuning.capability, CapabilityMode::AssumePresent);
        assert_eq!(cfg.tuning.element_slot, 0.9);
        assert_eq!(cfg.tuning.comments_slot, 0.5);
        assert_eq!(cfg.tuning.handler_count, CountRange::fixed(2));
        assert_eq!(cfg.profile.timeout.as_deref(), Some("1s"));
        cfg.tuning.validate().expect("valid");
    }

    #[test]
    fn invalid_tuning_is_a_config_error() {
        let mut t = Tuning::default();
        t.read_text = 1.5;
        assert!(t.validate().unwrap_err().to_string().contains("read_text"));

        let mut t = Tuning::default();
        t.handler_count = CountRange::new(4, 1);
        assert!(t.validate().unwrap_err().to_string().contains("handler_count"));

        let mut t = Tuning::default();
        t.selector_pool.clear();
        assert!(t.validate().is_err());
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = Config::load_optional(Path::new("/definitely/not/here/workerd-fuzz.toml"));
        assert_eq!(cfg.base_dir, default_base_dir());
    }
}
