use std::path::PathBuf;
use std::process::Command;

fn temp_workspace(name: &str) -> PathBuf {
    let root =
        std::env::temp_dir().join(format!("workerd-fuzz-cli-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp workspace");
    root
}

fn run_cli(args: &[String]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_workerd-fuzz"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run cli")
}

fn args(ws: &PathBuf, rest: &[&str]) -> Vec<String> {
    let mut out = vec!["--cwd".to_string(), ws.display().to_string()];
    out.extend(rest.iter().map(|s| s.to_string()));
    out
}

fn parse_json_stdout(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).unwrap_or_else(|e| panic!("invalid json ({e}): {stdout}"))
}

#[test]
fn generate_with_seed_is_deterministic() {
    let ws = temp_workspace("generate");
    let a = run_cli(&args(&ws, &["generate", "--seed", "42", "--count", "2", "--json"]));
    let b = run_cli(&args(&ws, &["--json", "generate", "--seed", "42", "--count", "2"]));
    assert!(a.status.success(), "{}", String::from_utf8_lossy(&a.stderr));
    assert!(b.status.success(), "{}", String::from_utf8_lossy(&b.stderr));

    let a = parse_json_stdout(&a);
    let b = parse_json_stdout(&b);
    assert_eq!(a["programs"], b["programs"]);
    assert_eq!(a["programs"].as_array().map(Vec::len), Some(2));
    assert_eq!(a["summary"]["snippets"][1]["seed"], 43);
}

#[test]
fn generate_to_directory_then_replay() {
    let ws = temp_workspace("replay");
    let out = run_cli(&args(&ws, &["generate", "--seed", "7", "--out", "snippets", "--json"]));
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let summary = parse_json_stdout(&out);
    let hash = summary["snippets"][0]["hash"].as_str().expect("hash").to_string();

    let js = ws.join("snippets").join(format!("{hash}.js"));
    let draws = ws.join("snippets").join(format!("{hash}.draws.json"));
    assert!(js.exists());
    assert!(draws.exists());

    let replayed = run_cli(&args(&ws, &["replay", &draws.display().to_string(), "--json"]));
    assert!(replayed.status.success(), "{}", String::from_utf8_lossy(&replayed.stderr));
    let doc = parse_json_stdout(&replayed);
    assert_eq!(doc["hash"], hash.as_str());
    assert_eq!(doc["divergences"], 0);
    let written = std::fs::read_to_string(js).expect("read js");
    assert_eq!(doc["program"].as_str(), Some(written.as_str()));
}

#[test]
fn generate_save_uses_config_base_dir() {
    let ws = temp_workspace("save");
    std::fs::write(ws.join("workerd-fuzz.toml"), "base_dir = \"artifacts\"\n")
        .expect("write config");
    let out = run_cli(&args(&ws, &["generate", "--seed", "3", "--save", "--json"]));
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let summary = parse_json_stdout(&out);
    assert!(summary.get("programs").is_none());
    let hash = summary["snippets"][0]["hash"].as_str().expect("hash");
    assert!(ws.join("artifacts/snippets").join(format!("{hash}.js")).exists());
    assert!(ws.join("artifacts/snippets/manifest.json").exists());
}

#[test]
fn unknown_template_is_a_json_error() {
    let ws = temp_workspace("bad-template");
    let out = run_cli(&args(&ws, &["generate", "--template", "Nope", "--json"]));
    assert_eq!(out.status.code(), Some(2));
    let doc = parse_json_stdout(&out);
    assert_eq!(doc["status"], "error");
    assert!(doc["message"].as_str().expect("message").contains("Nope"));
}

#[test]
fn model_lists_groups_and_builtins() {
    let ws = temp_workspace("model");
    let out = run_cli(&args(&ws, &["model"]));
    assert!(out.status.success());
    let doc = parse_json_stdout(&out);
    assert!(doc["groups"]["HTMLRewriter"].is_object());
    assert!(doc["groups"]["HTMLElement"].is_object());
    assert!(doc["builtins"]["Headers"].is_object());
}

#[test]
fn profile_respects_timeout_override() {
    let ws = temp_workspace("profile");
    let out = run_cli(&args(&ws, &["profile", "--timeout", "2s", "--json"]));
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let doc = parse_json_stdout(&out);
    assert_eq!(doc["timeout"], "2s");
    assert_eq!(doc["processArgs"][0], "reprl");
    assert_eq!(doc["maxExecsBeforeRespawn"], 5000);

    let bad = run_cli(&args(&ws, &["profile", "--timeout", "soon"]));
    assert!(!bad.status.success());
}

#[test]
fn classify_discards_only_flaky_known_noise() {
    let ws = temp_workspace("classify");
    let stderr = ws.join("crash.stderr");
    std::fs::write(&stderr, workerd_fuzz::KNOWN_NOISE_SIGNATURE).expect("write stderr");
    let path = stderr.display().to_string();

    let flaky = run_cli(&args(&ws, &["classify", "--stderr-file", &path, "--json"]));
    assert!(flaky.status.success());
    assert_eq!(parse_json_stdout(&flaky)["verdict"], "discard");

    let det = run_cli(&args(
        &ws,
        &["classify", "--stderr-file", &path, "--deterministic", "--json"],
    ));
    assert_eq!(parse_json_stdout(&det)["verdict"], "keep");
}

#[test]
fn corpus_merge_reports_duplicates() {
    let ws = temp_workspace("corpus");
    std::fs::create_dir_all(ws.join("a")).expect("mkdir");
    std::fs::create_dir_all(ws.join("b")).expect("mkdir");
    std::fs::write(ws.join("a/x.fil"), "one").expect("write");
    std::fs::write(ws.join("b/y.fil"), "one").expect("write");

    let out = run_cli(&args(
        &ws,
        &["corpus", "merge", "--corpora", "a", "b", "--output-dir", "merged", "--json"],
    ));
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let doc = parse_json_stdout(&out);
    assert_eq!(doc["action"], "merge");
    assert_eq!(doc["written"], 1);
    assert_eq!(doc["duplicatesSkipped"], 1);

    let missing = run_cli(&args(
        &ws,
        &["corpus", "create", "--input-dir", "nope", "--output-dir", "out"],
    ));
    assert_eq!(missing.status.code(), Some(2));
}

#[test]
fn usage_and_version() {
    let ws = temp_workspace("usage");
    let usage = run_cli(&args(&ws, &["usage", "--json"]));
    let doc = parse_json_stdout(&usage);
    let commands: Vec<&str> = doc["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|i| i["command"].as_str())
        .collect();
    assert!(commands.contains(&"workerd-fuzz generate"));
    assert!(commands.contains(&"workerd-fuzz corpus merge"));

    let version = run_cli(&args(&ws, &["version", "--json"]));
    let doc = parse_json_stdout(&version);
    assert_eq!(doc["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(doc["rng"], "chacha20");
}
