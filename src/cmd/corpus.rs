//! FuzzIL corpus management: compile JavaScript seeds and merge corpora.

use clap::Subcommand;
use rayon::prelude::*;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{
    find_matching_files, unique_destination, CorpusAction, CorpusFailure, CorpusSummary,
    FuzzError, FuzzResult,
};

pub const DEFAULT_COMPILER: &str = "FuzzILTool";

const CORPUS_PATTERNS: &[&str] = &["**/*.protobuf", "**/*.fil"];

#[derive(Debug, Subcommand)]
pub enum CorpusCommand {
    /// Compile every *.js under the input dir into .protobuf programs
    Create {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
        /// FuzzIL compiler binary, invoked as `<tool> --compile <src> --output <dst>`.
        #[arg(long, default_value = DEFAULT_COMPILER)]
        tool: String,
    },
    /// Merge .protobuf/.fil files from several corpora, dropping duplicates
    Merge {
        #[arg(long, num_args = 1.., required = true)]
        corpora: Vec<PathBuf>,
        #[arg(long)]
        output_dir: PathBuf,
    },
}

pub fn corpus_command(command: &CorpusCommand) -> FuzzResult<CorpusSummary> {
    match command {
        CorpusCommand::Create {
            input_dir,
            output_dir,
            tool,
        } => create_corpus(input_dir, output_dir, tool),
        CorpusCommand::Merge { corpora, output_dir } => merge_corpora(corpora, output_dir),
    }
}

/// `<output_root>/<relative path>.protobuf`
pub fn compiled_path(source: &Path, input_root: &Path, output_root: &Path) -> PathBuf {
    let rel = source.strip_prefix(input_root).unwrap_or(source);
    output_root.join(rel).with_extension("protobuf")
}

pub fn create_corpus(input_dir: &Path, output_dir: &Path, tool: &str) -> FuzzResult<CorpusSummary> {
    if !input_dir.is_dir() {
        return Err(FuzzError::InvalidArgument(format!(
            "input directory not found: {}",
            input_dir.display()
        )));
    }
    std::fs::create_dir_all(output_dir)?;
    let sources = find_matching_files(input_dir, &["**/*.js"])?;

    let failures: Vec<CorpusFailure> = sources
        .par_iter()
        .filter_map(|source| {
            let out = compiled_path(source, input_dir, output_dir);
            compile_one(tool, source, &out).err().map(|message| CorpusFailure {
                path: source.display().to_string(),
                message,
            })
        })
        .collect();

    let summary = CorpusSummary {
        action: CorpusAction::Create,
        output_dir: output_dir.display().to_string(),
        processed: sources.len(),
        written: sources.len() - failures.len(),
        duplicates_skipped: 0,
        failures,
    };
    tracing::info!(
        compiled = summary.written,
        failed = summary.failures.len(),
        "corpus create finished"
    );
    Ok(summary)
}

fn compile_one(tool: &str, source: &Path, out: &Path) -> Result<(), String> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let output = Command::new(tool)
        .arg("--compile")
        .arg(source)
        .arg("--output")
        .arg(out)
        .output()
        .map_err(|e| format!("failed to run {tool}: {e}"))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(format!("{tool} exited with {}: {stderr}", output.status))
    }
}

/// Copy every corpus file into `output_dir`, first occurrence of each content wins.
pub fn merge_corpora(corpora: &[PathBuf], output_dir: &Path) -> FuzzResult<CorpusSummary> {
    for corpus in corpora {
        if !corpus.is_dir() {
            return Err(FuzzError::InvalidArgument(format!(
                "corpus directory not found: {}",
                corpus.display()
            )));
        }
    }
    std::fs::create_dir_all(output_dir)?;

    let mut sources = Vec::new();
    for corpus in corpora {
        sources.extend(find_matching_files(corpus, CORPUS_PATTERNS)?);
    }

    let mut seen = HashSet::new();
    let mut written = 0usize;
    let mut duplicates = 0usize;
    for source in &sources {
        let bytes = std::fs::read(source)?;
        if !seen.insert(*blake3::hash(&bytes).as_bytes()) {
            duplicates += 1;
            continue;
        }
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FuzzError::Corpus(format!("unusable file name: {}", source.display())))?;
        std::fs::write(unique_destination(output_dir, name), bytes)?;
        written += 1;
    }

    tracing::info!(written, duplicates, "corpus merge finished");
    Ok(CorpusSummary {
        action: CorpusAction::Merge,
        output_dir: output_dir.display().to_string(),
        processed: sources.len(),
        written,
        duplicates_skipped: duplicates,
        failures: Vec::new(),
    })
}
