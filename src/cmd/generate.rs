//! `workerd-fuzz generate` / `replay` / `classify`.

use serde::Serialize;

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::{
    classify, find_template, gen_seed, pick_template, write_generation_manifest, ClassifySummary,
    Config, CrashBehaviour, DrawLog, FuzzError, FuzzResult, GenerationSummary, Profile,
    ProgramTemplate, ReplayEntropy, SeededEntropy, SnippetRecord,
};

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Fixed template; weighted pick per snippet when absent.
    pub template: Option<String>,
    /// Base seed; snippet `i` uses `seed + i`.
    pub seed: Option<u64>,
    pub count: u32,
    /// Write `<blake3>.js` + `<blake3>.draws.json` here instead of returning text only.
    pub out: Option<PathBuf>,
    /// Write files under `<base_dir>/snippets` when `out` is unset.
    pub save: bool,
}

impl GenerateOptions {
    pub fn output_dir(&self, config: &Config) -> Option<PathBuf> {
        match &self.out {
            Some(dir) => Some(dir.clone()),
            None if self.save => Some(config.snippets_dir()),
            None => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub summary: GenerationSummary,
    pub programs: Vec<String>,
}

pub fn generate(config: &Config, opts: &GenerateOptions) -> FuzzResult<GenerationOutcome> {
    if opts.count == 0 {
        return Err(FuzzError::InvalidArgument("--count must be at least 1".to_string()));
    }
    let fixed = match &opts.template {
        Some(name) => Some(lookup_template(name)?),
        None => None,
    };
    let profile = Profile::workerd(config)?;
    let base_seed = opts.seed.unwrap_or_else(gen_seed);
    // Template picks draw from their own stream so each draw log only covers the program.
    let mut selector = SeededEntropy::new(selector_seed(base_seed));

    let out_dir = opts.output_dir(config);
    if let Some(dir) = &out_dir {
        std::fs::create_dir_all(dir)?;
    }

    let started = Instant::now();
    let mut snippets = Vec::with_capacity(opts.count as usize);
    let mut programs = Vec::with_capacity(opts.count as usize);
    for i in 0..u64::from(opts.count) {
        let template = match fixed {
            Some(t) => t,
            None => pick_template(&mut selector)
                .ok_or_else(|| FuzzError::Config("no program templates registered".to_string()))?,
        };
        let seed = base_seed.wrapping_add(i);
        let mut entropy = SeededEntropy::new(seed);
        let program =
            crate::generate_program(&profile.model, &config.tuning, template, &mut entropy)?;
        let hash = blake3::hash(program.as_bytes()).to_hex().to_string();

        let mut record = SnippetRecord {
            seed,
            template: template.name.to_string(),
            hash: hash.clone(),
            lines: program.lines().count(),
            path: None,
            draws_path: None,
        };
        if let Some(dir) = &out_dir {
            let mut log = entropy.into_log();
            log.template = Some(template.name.to_string());
            let js = dir.join(format!("{hash}.js"));
            let draws = dir.join(format!("{hash}.draws.json"));
            std::fs::write(&js, &program)?;
            log.write_json(&draws)?;
            record.path = Some(js.display().to_string());
            record.draws_path = Some(draws.display().to_string());
        }
        tracing::debug!(seed, template = template.name, hash = %hash, "snippet ready");
        snippets.push(record);
        programs.push(program);
    }

    let summary = GenerationSummary {
        duration_ms: started.elapsed().as_millis() as u64,
        out_dir: out_dir.as_ref().map(|d| d.display().to_string()),
        snippets,
    };
    if let Some(dir) = &out_dir {
        write_generation_manifest(&summary, dir)?;
    }
    tracing::info!(count = summary.snippets.len(), base_seed, "generation finished");
    Ok(GenerationOutcome { summary, programs })
}

fn selector_seed(base_seed: u64) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"workerd-fuzz.template-selector");
    hasher.update(&base_seed.to_le_bytes());
    let mut b = [0u8; 8];
    b.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_le_bytes(b)
}

fn lookup_template(name: &str) -> FuzzResult<&'static ProgramTemplate> {
    find_template(name)
        .ok_or_else(|| FuzzError::InvalidArgument(format!("unknown template {name:?}")))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub hash: String,
    /// Draws that did not match what the generator asked for.
    pub divergences: usize,
    pub program: String,
}

/// Regenerate a snippet from a `.draws.json` log.
pub fn replay(config: &Config, draws_path: &Path) -> FuzzResult<ReplayOutcome> {
    let log = DrawLog::read_json(draws_path)?;
    let name = log.template.as_deref().ok_or_else(|| {
        FuzzError::InvalidArgument(format!("{} does not name a template", draws_path.display()))
    })?;
    let template = lookup_template(name)?;
    let profile = Profile::workerd(config)?;

    let mut entropy = ReplayEntropy::new(&log);
    let program = crate::generate_program(&profile.model, &config.tuning, template, &mut entropy)?;
    let divergences = entropy.divergences();
    if divergences > 0 || entropy.remaining() > 0 {
        tracing::warn!(
            divergences,
            unused = entropy.remaining(),
            "draw log does not match the current generator"
        );
    }
    Ok(ReplayOutcome {
        template: template.name.to_string(),
        seed: log.seed,
        hash: blake3::hash(program.as_bytes()).to_hex().to_string(),
        divergences,
        program,
    })
}

/// Run the workerd crash processor over a captured stderr file.
pub fn classify_stderr(
    config: &Config,
    stderr_file: &Path,
    signal: i32,
    deterministic: bool,
    unique: bool,
) -> FuzzResult<ClassifySummary> {
    let stderr = std::fs::read_to_string(stderr_file)?;
    let profile = Profile::workerd(config)?;
    let behaviour = if deterministic {
        CrashBehaviour::Deterministic
    } else {
        CrashBehaviour::Flaky
    };
    let verdict = classify(signal, &stderr, behaviour, unique);
    Ok(ClassifySummary {
        verdict,
        signal,
        deterministic,
        unique,
        processor: profile.crash_processor.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CrashVerdict, KNOWN_NOISE_SIGNATURE};

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("workerd-fuzz-{tag}-{}", uuid::Uuid::new_v4()))
    }

    fn opts(seed: u64, count: u32, out: Option<PathBuf>) -> GenerateOptions {
        GenerateOptions {
            template: None,
            seed: Some(seed),
            count,
            out,
            save: false,
        }
    }

    #[test]
    fn seeded_batches_are_reproducible() {
        let config = Config::default();
        let a = generate(&config, &opts(11, 3, None)).expect("generate");
        let b = generate(&config, &opts(11, 3, None)).expect("generate");
        assert_eq!(a.programs, b.programs);
        let seeds: Vec<u64> = a.summary.snippets.iter().map(|s| s.seed).collect();
        assert_eq!(seeds, vec![11, 12, 13]);
        assert!(a.summary.snippets.iter().all(|s| s.template == "HTMLRewriterFuzzer"));
    }

    #[test]
    fn written_snippets_replay_byte_for_byte() {
        let dir = temp_dir("generate");
        let config = Config::default();
        let outcome = generate(&config, &opts(5, 2, Some(dir.clone()))).expect("generate");
        assert!(dir.join("manifest.json").exists());

        for (record, program) in outcome.summary.snippets.iter().zip(&outcome.programs) {
            let js = PathBuf::from(record.path.as_ref().expect("path"));
            assert_eq!(js, dir.join(format!("{}.js", record.hash)));
            assert_eq!(&std::fs::read_to_string(&js).expect("read"), program);

            let draws = PathBuf::from(record.draws_path.as_ref().expect("draws"));
            let replayed = replay(&config, &draws).expect("replay");
            assert_eq!(&replayed.program, program);
            assert_eq!(replayed.divergences, 0);
            assert_eq!(replayed.hash, record.hash);
            assert_eq!(replayed.seed, Some(record.seed));
        }
    }

    #[test]
    fn template_selection_does_not_share_the_first_snippet_stream() {
        for seed in [0u64, 1, 42, u64::MAX] {
            let selector = selector_seed(seed);
            assert_ne!(selector, seed);
            assert_eq!(selector, selector_seed(seed));
        }
        assert_ne!(selector_seed(1), selector_seed(2));
    }

    #[test]
    fn save_defaults_to_the_configured_snippets_dir() {
        let mut config = Config::default();
        config.base_dir = temp_dir("base");
        let mut o = opts(9, 1, None);
        assert_eq!(o.output_dir(&config), None);
        o.save = true;
        assert_eq!(o.output_dir(&config), Some(config.base_dir.join("snippets")));
        o.out = Some(PathBuf::from("elsewhere"));
        assert_eq!(o.output_dir(&config), Some(PathBuf::from("elsewhere")));
    }

    #[test]
    fn rejects_unknown_templates_and_empty_batches() {
        let config = Config::default();
        let mut o = opts(1, 1, None);
        o.template = Some("NoSuchTemplate".to_string());
        assert!(matches!(generate(&config, &o), Err(FuzzError::InvalidArgument(_))));
        assert!(generate(&config, &opts(1, 0, None)).is_err());
    }

    #[test]
    fn classify_reads_stderr_files() {
        let dir = temp_dir("classify");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("stderr.txt");
        std::fs::write(&path, format!("  {KNOWN_NOISE_SIGNATURE}\n")).expect("write");

        let config = Config::default();
        let flaky = classify_stderr(&config, &path, 6, false, true).expect("classify");
        assert_eq!(flaky.verdict, CrashVerdict::Discard);
        assert_eq!(flaky.processor, "workerd-fatal-check");
        let det = classify_stderr(&config, &path, 6, true, true).expect("classify");
        assert_eq!(det.verdict, CrashVerdict::Keep);
    }
}
