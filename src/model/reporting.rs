//! Reporting types and renderers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::CrashVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    Pretty,
    Json,
}

/// One generated program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetRecord {
    pub seed: u64,
    pub template: String,
    /// blake3 of the program text.
    pub hash: String,
    pub lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "drawsPath", skip_serializing_if = "Option::is_none")]
    pub draws_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSummary {
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "outDir", skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,
    pub snippets: Vec<SnippetRecord>,
}

impl GenerationSummary {
    pub fn pretty(&self) -> String {
        let mut out = format!(
            "generated {} snippet(s) in {}ms\n",
            self.snippets.len(),
            self.duration_ms
        );
        if let Some(dir) = &self.out_dir {
            out.push_str(&format!("out={dir}\n"));
        }
        for s in &self.snippets {
            out.push_str(&format!(
                "- {} seed={} lines={} hash={}",
                s.template,
                s.seed,
                s.lines,
                &s.hash[..s.hash.len().min(16)]
            ));
            if let Some(path) = &s.path {
                out.push_str(&format!(" path={path}"));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// `manifest.json` next to generated snippets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    #[serde(rename = "generatedAt")]
    pub generated_at_ms: u64,
    pub snippets: Vec<SnippetRecord>,
}

pub fn write_generation_manifest(
    summary: &GenerationSummary,
    out_dir: &Path,
) -> crate::FuzzResult<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let manifest = GenerationManifest {
        schema_version: "workerd-fuzz.manifest.v1".to_string(),
        generated_at_ms: wall_time_ms(),
        snippets: summary.snippets.clone(),
    };
    let out = out_dir.join("manifest.json");
    std::fs::write(&out, serde_json::to_vec_pretty(&manifest)?)?;
    Ok(out)
}

fn wall_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifySummary {
    pub verdict: CrashVerdict,
    pub signal: i32,
    pub deterministic: bool,
    pub unique: bool,
    pub processor: String,
}

impl ClassifySummary {
    pub fn pretty(&self) -> String {
        format!(
            "verdict={:?} signal={} deterministic={} unique={} processor={}",
            self.verdict, self.signal, self.deterministic, self.unique, self.processor
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusAction {
    Create,
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub action: CorpusAction,
    #[serde(rename = "outputDir")]
    pub output_dir: String,
    pub processed: usize,
    pub written: usize,
    #[serde(rename = "duplicatesSkipped")]
    pub duplicates_skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CorpusFailure>,
}

impl CorpusSummary {
    pub fn pretty(&self) -> String {
        let mut out = format!(
            "corpus {:?}: processed={} written={} duplicates={} failed={} out={}\n",
            self.action,
            self.processed,
            self.written,
            self.duplicates_skipped,
            self.failures.len(),
            self.output_dir
        );
        for f in &self.failures {
            out.push_str(&format!("- {}: {}\n", f.path, f.message));
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_summary_renders_both_ways() {
        let summary = GenerationSummary {
            duration_ms: 3,
            out_dir: Some("out".to_string()),
            snippets: vec![SnippetRecord {
                seed: 7,
                template: "HTMLRewriterFuzzer".to_string(),
                hash: "ab".repeat(32),
                lines: 40,
                path: Some("out/x.js".to_string()),
                draws_path: None,
            }],
        };
        let pretty = summary.pretty();
        assert!(pretty.starts_with("generated 1 snippet(s)"));
        assert!(pretty.contains("seed=7 lines=40 hash=abababababababab path=out/x.js"));

        let json = serde_json::to_value(&summary).expect("json");
        assert_eq!(json["snippets"][0]["seed"], 7);
        assert!(json["snippets"][0].get("drawsPath").is_none());
    }

    #[test]
    fn manifest_is_written_next_to_snippets() {
        let dir = std::env::temp_dir()
            .join(format!("workerd-fuzz-manifest-{}", uuid::Uuid::new_v4()));
        let summary = GenerationSummary {
            duration_ms: 0,
            out_dir: None,
            snippets: Vec::new(),
        };
        let path = write_generation_manifest(&summary, &dir).expect("write");
        let raw = std::fs::read_to_string(path).expect("read");
        assert!(raw.contains("workerd-fuzz.manifest.v1"));
    }
}
