//! Crash classification.
//!
//! One exact-match denylist entry: the V8 fatal check that ASan builds of
//! workerd hit when poisoned memory is touched during isolate setup. Anything
//! else, and every deterministic crash, is kept.

use serde::{Deserialize, Serialize};

/// Stderr of the known-noise crash, compared after trimming whitespace.
pub const KNOWN_NOISE_SIGNATURE: &str = "workerd/jsg/setup.c++:38: fatal: V8 fatal error; location = :0; message = Check failed: __asan_address_is_poisoned(reinterpret_cast<const char*>(address) + i).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashBehaviour {
    Deterministic,
    Flaky,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashVerdict {
    Keep,
    Discard,
}

impl CrashVerdict {
    pub fn is_keep(self) -> bool {
        self == Self::Keep
    }
}

/// Keep or discard a crash. `signal` and `is_unique` are part of the
/// contract but do not influence the verdict.
pub fn classify(
    signal: i32,
    stderr: &str,
    behaviour: CrashBehaviour,
    is_unique: bool,
) -> CrashVerdict {
    let _ = (signal, is_unique);
    if behaviour == CrashBehaviour::Deterministic {
        return CrashVerdict::Keep;
    }
    if stderr.trim() == KNOWN_NOISE_SIGNATURE {
        return CrashVerdict::Discard;
    }
    CrashVerdict::Keep
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgramOrigin {
    Local,
    Corpus,
    Imported { worker: String },
}

/// Everything the execution side knows about a crashing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub signal: i32,
    pub stdout: String,
    pub stderr: String,
    pub behaviour: CrashBehaviour,
    pub is_unique: bool,
    pub exec_time_ms: u64,
    pub origin: ProgramOrigin,
    /// Source of the program that crashed.
    pub program: String,
}

pub trait CrashProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, report: &CrashReport) -> CrashVerdict;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FatalCheckFilter;

impl CrashProcessor for FatalCheckFilter {
    fn name(&self) -> &'static str {
        "workerd-fatal-check"
    }

    fn process(&self, report: &CrashReport) -> CrashVerdict {
        let verdict = classify(report.signal, &report.stderr, report.behaviour, report.is_unique);
        if verdict == CrashVerdict::Discard {
            tracing::debug!(signal = report.signal, "discarding known V8 fatal check crash");
        }
        verdict
    }
}
