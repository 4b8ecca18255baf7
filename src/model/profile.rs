//! The workerd fuzzing profile: everything the execution side consumes as-is.

use serde::Serialize;

use std::time::Duration;

use crate::{
    format_duration, parse_duration, program_templates, workerd_surface, Config, CrashProcessor,
    Entropy, FatalCheckFilter, FuzzError, FuzzResult, GeneratorCatalog, ProgramTemplate,
    SurfaceModel,
};

pub const DEFAULT_BINARIES: &[&str] = &[
    "./bin/workerd-fuzzilli-asan",
    "./bin/workerd-fuzzilli-asan-lsan",
    "./bin/workerd-fuzzilli-cfi-ubsan",
    "./bin/workerd-fuzzilli-lsan",
    "./bin/workerd-fuzzilli-tsan",
    "./bin/workerd-fuzzilli-ubsan",
    "./bin/workerd-fuzzilli-ubsan-minimal",
];

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);
const DEFAULT_RESPAWN_THRESHOLD: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EcmaVersion {
    Es5,
    Es6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupExpectation {
    ShouldSucceed,
    ShouldCrash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupTest {
    pub code: String,
    pub expect: StartupExpectation,
}

impl StartupTest {
    fn new(code: impl Into<String>, expect: StartupExpectation) -> Self {
        Self {
            code: code.into(),
            expect,
        }
    }
}

fn startup_tests() -> Vec<StartupTest> {
    use StartupExpectation::{ShouldCrash, ShouldSucceed};

    let mut tests = vec![StartupTest::new("fuzzilli('FUZZILLI_PRINT', 'test')", ShouldSucceed)];
    // 0: immediate crash, 1: CHECK, 2: DCHECK, 3: wild write, 4: use-after-free,
    // 5: hardened OOB, 6: ASan OOB, 7: large-stride write, 8: DEBUG defined.
    tests.extend(
        (0..=8).map(|n| StartupTest::new(format!("fuzzilli('FUZZILLI_CRASH', {n})"), ShouldCrash)),
    );
    for global in ["gc", "HTMLRewriter", "Response"] {
        tests.push(StartupTest::new(
            format!("typeof {global} === 'undefined' && fuzzilli('FUZZILLI_CRASH', 0)"),
            ShouldSucceed,
        ));
    }
    tests.push(StartupTest::new(
        "const r = new HTMLRewriter(); !(r instanceof HTMLRewriter) && fuzzilli('FUZZILLI_CRASH', 0)",
        ShouldSucceed,
    ));
    tests
}

pub struct Profile {
    pub process_args: Vec<String>,
    pub binaries: Vec<String>,
    pub max_execs_before_respawn: u64,
    pub timeout: Duration,
    pub ecma_version: EcmaVersion,
    pub startup_tests: Vec<StartupTest>,
    pub model: SurfaceModel,
    pub generators: GeneratorCatalog,
    pub templates: &'static [ProgramTemplate],
    pub crash_processor: Box<dyn CrashProcessor>,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("process_args", &self.process_args)
            .field("binaries", &self.binaries)
            .field("timeout", &self.timeout)
            .field("crash_processor", &self.crash_processor.name())
            .finish_non_exhaustive()
    }
}

impl Profile {
    /// Built-in workerd profile with `[profile]` overrides applied.
    pub fn workerd(config: &Config) -> FuzzResult<Self> {
        let overrides = &config.profile;
        let binaries = match &overrides.binaries {
            Some(list) if list.is_empty() => {
                return Err(FuzzError::Config("profile.binaries must not be empty".to_string()));
            }
            Some(list) => list.clone(),
            None => DEFAULT_BINARIES.iter().map(|s| s.to_string()).collect(),
        };
        let timeout = match &overrides.timeout {
            Some(raw) => parse_duration(raw)
                .map_err(|e| FuzzError::Config(format!("profile.timeout: {e}")))?,
            None => DEFAULT_TIMEOUT,
        };
        let model = workerd_surface()?;
        let generators = GeneratorCatalog::new(&model)?;
        let templates = program_templates();
        for template in templates {
            template.check(&model)?;
        }
        config.tuning.validate()?;

        Ok(Self {
            process_args: vec!["reprl".to_string()],
            binaries,
            max_execs_before_respawn: overrides
                .max_execs_before_respawn
                .unwrap_or(DEFAULT_RESPAWN_THRESHOLD),
            timeout,
            ecma_version: EcmaVersion::Es6,
            startup_tests: startup_tests(),
            model,
            generators,
            templates,
            crash_processor: Box::new(FatalCheckFilter),
        })
    }

    /// Arguments for the target process. Randomisation adds nothing today.
    pub fn process_args(&self, _randomize: bool) -> Vec<String> {
        self.process_args.clone()
    }

    /// First binary, or a uniform pick when randomising.
    pub fn process_binary(&self, randomize: bool, entropy: &mut dyn Entropy) -> &str {
        if !randomize || self.binaries.len() == 1 {
            return &self.binaries[0];
        }
        &self.binaries[entropy.index(self.binaries.len())]
    }

    pub fn describe(&self) -> ProfileDescription {
        ProfileDescription {
            process_args: self.process_args.clone(),
            binaries: self.binaries.clone(),
            max_execs_before_respawn: self.max_execs_before_respawn,
            timeout: format_duration(self.timeout),
            ecma_version: self.ecma_version,
            startup_tests: self.startup_tests.clone(),
            code_generators: self
                .generators
                .iter()
                .map(|g| WeightedName {
                    name: g.name.to_string(),
                    weight: g.weight,
                })
                .collect(),
            program_templates: self
                .templates
                .iter()
                .map(|t| WeightedName {
                    name: t.name.to_string(),
                    weight: t.weight,
                })
                .collect(),
            builtins: self.model.builtins().map(|(name, _)| name.to_string()).collect(),
            crash_processor: self.crash_processor.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightedName {
    pub name: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDescription {
    pub process_args: Vec<String>,
    pub binaries: Vec<String>,
    pub max_execs_before_respawn: u64,
    pub timeout: String,
    pub ecma_version: EcmaVersion,
    pub startup_tests: Vec<StartupTest>,
    pub code_generators: Vec<WeightedName>,
    pub program_templates: Vec<WeightedName>,
    pub builtins: Vec<String>,
    pub crash_processor: String,
}

impl ProfileDescription {
    pub fn pretty(&self) -> String {
        let mut out = format!(
            "args={:?} timeout={} respawn={} ecma={:?}\n",
            self.process_args, self.timeout, self.max_execs_before_respawn, self.ecma_version
        );
        for bin in &self.binaries {
            out.push_str(&format!("binary {bin}\n"));
        }
        for g in &self.code_generators {
            out.push_str(&format!("generator {} weight={}\n", g.name, g.weight));
        }
        for t in &self.program_templates {
            out.push_str(&format!("template {} weight={}\n", t.name, t.weight));
        }
        for t in &self.startup_tests {
            out.push_str(&format!("startup {:?}: {}\n", t.expect, t.code));
        }
        out.push_str(&format!("crash processor {}", self.crash_processor));
        out
    }
}
