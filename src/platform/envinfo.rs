//! Version metadata for `workerd-fuzz version`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
    /// Generator behind seeded snippets; draw logs are only portable within one backend.
    pub rng: String,
    pub templates: Vec<String>,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("WORKERD_FUZZ_COMMIT").map(|s| s.to_string()),
        build_date: option_env!("WORKERD_FUZZ_BUILD_DATE").map(|s| s.to_string()),
        rng: "chacha20".to_string(),
        templates: crate::program_templates().iter().map(|t| t.name.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_lists_registered_templates() {
        let info = version_info();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.templates, vec!["HTMLRewriterFuzzer".to_string()]);
    }
}
