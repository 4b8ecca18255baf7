//! workerd-fuzz CLI entrypoint.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use workerd_fuzz::{Config, CorpusCommand, ExecTimeout, GenerateOptions, Profile, Reporter};

#[derive(Debug, Parser)]
#[command(name = "workerd-fuzz")]
#[command(about = "HTMLRewriter-aware JavaScript generation and crash triage for fuzzing workerd")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "workerd-fuzz.toml")]
    config: PathBuf,

    /// Working directory for execution.
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate JavaScript snippets
    Generate {
        /// Template name; weighted pick per snippet when omitted.
        #[arg(long)]
        template: Option<String>,

        /// Base seed; snippet i uses seed + i.
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Write <blake3>.js and <blake3>.draws.json files here.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write files under <base_dir>/snippets from the config when --out is omitted.
        #[arg(long)]
        save: bool,

        /// Only print the summary (ignored when no files are written).
        #[arg(long)]
        quiet: bool,
    },

    /// Regenerate a snippet from a recorded draw log
    Replay { draws: PathBuf },

    /// Dump the surface model (groups and builtins)
    Model,

    /// Dump the workerd fuzzing profile
    Profile {
        /// Override the per-execution timeout.
        #[arg(long)]
        timeout: Option<ExecTimeout>,
    },

    /// Classify a crash from its captured stderr
    Classify {
        #[arg(long)]
        stderr_file: PathBuf,

        #[arg(long, default_value_t = 6)]
        signal: i32,

        #[arg(long)]
        deterministic: bool,

        #[arg(long)]
        unique: bool,
    },

    /// FuzzIL corpus tooling
    Corpus {
        #[command(subcommand)]
        command: CorpusCommand,
    },

    /// Print version information
    Version,

    /// Show a compact "what to use when" guide for each command, with examples.
    Usage,
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_global_args(std::env::args()));

    if let Err(err) = init_tracing(&cli.log) {
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let cwd = cli
        .cwd
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    if let Err(err) = std::env::set_current_dir(&cwd) {
        let err = anyhow::anyhow!(err).context(format!("failed to set cwd to {}", cwd.display()));
        return print_error_and_exit(&cli, err);
    }

    let config = Config::load_optional(&cli.config);

    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn normalize_global_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let all: Vec<String> = args.into_iter().collect();
    if all.is_empty() {
        return all;
    }

    let mut globals = Vec::new();
    let mut rest = Vec::new();

    let mut i = 1usize;
    while i < all.len() {
        let arg = &all[i];
        match arg.as_str() {
            "--json" => {
                globals.push(arg.clone());
                i += 1;
            }
            "--config" | "--cwd" | "--log" => {
                globals.push(arg.clone());
                if i + 1 < all.len() {
                    globals.push(all[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ if arg.starts_with("--config=")
                || arg.starts_with("--cwd=")
                || arg.starts_with("--log=") =>
            {
                globals.push(arg.clone());
                i += 1;
            }
            _ => {
                rest.push(arg.clone());
                i += 1;
            }
        }
    }

    let mut normalized = Vec::with_capacity(all.len());
    normalized.push(all[0].clone());
    normalized.extend(globals);
    normalized.extend(rest);
    normalized
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn json_output(cli: &Cli, config: &Config) -> bool {
    cli.json || config.reporter == Reporter::Json
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    let json = json_output(cli, config);
    match &cli.command {
        Command::Generate {
            template,
            seed,
            count,
            out,
            save,
            quiet,
        } => {
            let outcome = workerd_fuzz::generate(
                config,
                &GenerateOptions {
                    template: template.clone(),
                    seed: *seed,
                    count: *count,
                    out: out.clone(),
                    save: *save,
                },
            )?;
            let wrote_files = outcome.summary.out_dir.is_some();
            if json {
                if wrote_files {
                    print_json(&outcome.summary)?;
                } else {
                    print_json(&serde_json::json!({
                        "summary": outcome.summary,
                        "programs": outcome.programs,
                    }))?;
                }
            } else {
                if !wrote_files || !*quiet {
                    for program in &outcome.programs {
                        println!("{program}");
                    }
                }
                eprintln!("{}", outcome.summary.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Replay { draws } => {
            let outcome = workerd_fuzz::replay(config, draws)?;
            if json {
                print_json(&outcome)?;
            } else {
                println!("{}", outcome.program);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Model => {
            let model = workerd_fuzz::workerd_surface()?;
            println!("{}", serde_json::to_string_pretty(&model)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Profile { timeout } => {
            let mut profile = Profile::workerd(config)?;
            if let Some(timeout) = timeout {
                profile.timeout = timeout.0;
            }
            let desc = profile.describe();
            if json {
                print_json(&desc)?;
            } else {
                println!("{}", desc.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Classify {
            stderr_file,
            signal,
            deterministic,
            unique,
        } => {
            let summary = workerd_fuzz::classify_stderr(
                config,
                stderr_file,
                *signal,
                *deterministic,
                *unique,
            )?;
            if json {
                print_json(&summary)?;
            } else {
                println!("{}", summary.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Corpus { command } => {
            let summary = workerd_fuzz::corpus_command(command)?;
            if json {
                print_json(&summary)?;
            } else {
                println!("{}", summary.pretty());
            }
            if summary.failures.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }

        Command::Version => {
            let info = workerd_fuzz::version_info();
            if json {
                print_json(&info)?;
            } else {
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Usage => {
            let doc = workerd_fuzz::usage_doc();
            if json {
                print_json(&doc)?;
            } else {
                println!("{}", doc.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "code": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}
