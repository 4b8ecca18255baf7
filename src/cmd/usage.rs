//! `workerd-fuzz usage`: a compact "what to use when" guide.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageDoc {
    pub title: String,
    pub items: Vec<UsageItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageItem {
    pub command: String,
    pub when: String,
    pub how: String,
}

impl UsageDoc {
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n\n", self.title));
        for item in &self.items {
            out.push_str(&format!("{}:\n", item.command));
            out.push_str(&format!("  when: {}\n", item.when));
            out.push_str(&format!("  how:  {}\n\n", item.how));
        }
        out.trim_end().to_string()
    }
}

fn item(command: &str, when: &str, how: &str) -> UsageItem {
    UsageItem {
        command: command.to_string(),
        when: when.to_string(),
        how: how.to_string(),
    }
}

pub fn usage_doc() -> UsageDoc {
    UsageDoc {
        title: "workerd-fuzz usage".to_string(),
        items: vec![
            item(
                "workerd-fuzz generate",
                "Produce HTMLRewriter-targeted JavaScript snippets, to inspect what the fuzzer feeds workerd or to seed a corpus.",
                "workerd-fuzz generate --seed 1337 --count 20 --out snippets/. Each snippet lands as <blake3>.js next to a <blake3>.draws.json draw log and a manifest.json. --save writes the same files under <base_dir>/snippets from workerd-fuzz.toml instead. Without either the programs go to stdout. `--template HTMLRewriterFuzzer` pins the template.",
            ),
            item(
                "workerd-fuzz replay",
                "Regenerate a snippet exactly from its draw log, e.g. after the .js was lost or to bisect generator changes.",
                "workerd-fuzz replay snippets/<hash>.draws.json --json. A non-zero `divergences` means the generator changed since the log was recorded.",
            ),
            item(
                "workerd-fuzz model",
                "Check which groups, methods, properties and builtins the generator may use.",
                "workerd-fuzz model --json | jq '.groups | keys'.",
            ),
            item(
                "workerd-fuzz profile",
                "See what the execution side receives: process args, binaries, timeout, startup tests, weights.",
                "workerd-fuzz profile --timeout 500ms. `[profile]` in workerd-fuzz.toml overrides binaries, timeout and max_execs_before_respawn.",
            ),
            item(
                "workerd-fuzz classify",
                "Decide whether a captured crash is worth keeping.",
                "workerd-fuzz classify --stderr-file crash.stderr --signal 6 --unique. Pass --deterministic when the crash reproduces; deterministic crashes are always kept.",
            ),
            item(
                "workerd-fuzz corpus create",
                "Turn a directory of JavaScript seeds into FuzzIL programs.",
                "workerd-fuzz corpus create --input-dir seeds/ --output-dir corpus/ --tool ./FuzzILTool. The directory layout is mirrored and files compile in parallel.",
            ),
            item(
                "workerd-fuzz corpus merge",
                "Combine corpora from several fuzzing runs without duplicate programs.",
                "workerd-fuzz corpus merge --corpora run1/corpus run2/corpus --output-dir merged/. Name clashes become <stem>_<n>.<ext>.",
            ),
            item("workerd-fuzz version", "Report the build and the registered templates.", "workerd-fuzz version --json."),
            item("workerd-fuzz usage", "Print this guide.", "workerd-fuzz usage --json."),
        ],
    }
}
