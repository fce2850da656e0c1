//! Tinker CLI
//!
//! Runs the lesson server and the authoring tools: answer-key inference,
//! one-off sketch compiles and lesson checks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tinker_answerkey::{json::JsonGenerator, AnswerKeyDraft, Overrides, SourceGenerator};
use tinker_blanks::infer;
use tinker_sandbox::{CompileResult, Compiler};
use tinker_server::{create_router, AppState, Config, Lesson};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Tinker - guided Arduino lessons
///
/// Serves the lesson API and provides tools for lesson authors.
#[derive(Parser, Debug)]
#[command(name = "tinker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: tinker.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Draft an answer key from a template and its solved sketch
    Infer {
        /// Template containing __BLANK[NAME]__ markers
        #[arg(long, value_name = "FILE")]
        template: PathBuf,

        /// The same sketch with every blank filled in
        #[arg(long, value_name = "FILE")]
        solved: PathBuf,

        /// Bind a blank to another blank's value (NAME=SOURCE)
        #[arg(long, value_name = "NAME=SOURCE")]
        bind: Vec<String>,

        /// Force a blank's kind (NAME=auto|id|num|str)
        #[arg(long, value_name = "NAME=KIND")]
        kind: Vec<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Source)]
        format: OutputFormat,

        /// Write the output to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Compile a sketch and print its diagnostics
    Compile {
        /// Sketch file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Check blank values against a lesson file
    Check {
        /// Lesson JSON file
        #[arg(long, value_name = "FILE")]
        lesson: PathBuf,

        /// A blank value (NAME=VALUE), repeatable
        #[arg(long = "value", value_name = "NAME=VALUE")]
        values: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Lesson-source `answers` block
    Source,
    /// Pretty-printed JSON rule set
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    match args.command {
        Command::Serve { port, host } => {
            let config = load_config(args.config.as_deref())?;
            serve(config, &host, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Infer {
            template,
            solved,
            bind,
            kind,
            format,
            output,
        } => {
            run_infer(&template, &solved, &bind, &kind, format, output.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Compile { file } => {
            let config = load_config(args.config.as_deref())?;
            run_compile(&config, &file).await
        }
        Command::Check { lesson, values } => run_check(&lesson, &values),
    }
}

/// Loads configuration from `--config` or `tinker.json` in the working directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Starts the HTTP server and runs until Ctrl+C.
async fn serve(config: Config, host: &str, port: u16) -> anyhow::Result<()> {
    let ip = host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid --host '{host}'"))?;
    let addr = SocketAddr::new(ip, port);

    print_config(&config);

    let state = AppState::new(config).map_err(|e| anyhow::anyhow!("{e}"))?;
    let router = create_router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("Tinker API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("HTTP server error")
}

/// Prints the effective configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Compiler: {}", config.compiler.program);
    println!("  Compile timeout: {}s", config.compiler.timeout_seconds);
    println!("  LLM: {:?} {} at {}", config.llm.api, config.llm.model, config.llm.base_url);
    println!("  Lessons: {}", config.lessons_dir);
}

fn run_infer(
    template_path: &Path,
    solved_path: &Path,
    binds: &[String],
    kinds: &[String],
    format: OutputFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let template = std::fs::read_to_string(template_path)
        .with_context(|| format!("Failed to read template '{}'", template_path.display()))?;
    let solved = std::fs::read_to_string(solved_path)
        .with_context(|| format!("Failed to read solved sketch '{}'", solved_path.display()))?;

    let mut overrides = Overrides::default();
    for arg in binds {
        let (blank, source) = Overrides::parse_bind(arg)?;
        overrides = overrides.with_bind(blank, source);
    }
    for arg in kinds {
        let (blank, kind) = Overrides::parse_kind(arg)?;
        overrides = overrides.with_kind(blank, kind);
    }

    let inferred = infer(&template, &solved);
    for blank in &inferred {
        if let Some(warning) = &blank.warning {
            eprintln!("warning: {}: {warning}", blank.name);
        }
    }

    let draft = AnswerKeyDraft::build(&inferred, &overrides);
    match (format, output) {
        (OutputFormat::Json, Some(path)) => {
            JsonGenerator::new(&draft).write_to_file(path, true)?;
            println!("Answer key written to {}", path.display());
        }
        (OutputFormat::Json, None) => println!("{}", JsonGenerator::new(&draft).generate_pretty()?),
        (OutputFormat::Source, Some(path)) => {
            std::fs::write(path, SourceGenerator::new(&draft).generate())
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            println!("Answer key written to {}", path.display());
        }
        (OutputFormat::Source, None) => print!("{}", SourceGenerator::new(&draft).generate()),
    }
    Ok(())
}

async fn run_compile(config: &Config, file: &Path) -> anyhow::Result<ExitCode> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read sketch '{}'", file.display()))?;

    let compiler = Compiler::new(config.compiler.to_settings());
    match compiler.compile(&code).await {
        CompileResult::Success { notices } => {
            for notice in &notices {
                println!("{notice}");
            }
            println!("Compiled successfully.");
            Ok(ExitCode::SUCCESS)
        }
        CompileResult::Failure { diagnostics } => {
            for d in &diagnostics {
                println!("{}:{}:{}: error: {}", file.display(), d.line, d.column, d.message);
            }
            Ok(ExitCode::from(1))
        }
    }
}

fn run_check(lesson_path: &Path, values: &[String]) -> anyhow::Result<ExitCode> {
    let lesson = Lesson::load(lesson_path).map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut current = HashMap::new();
    for arg in values {
        let (name, value) = arg
            .split_once('=')
            .with_context(|| format!("Invalid --value '{arg}': expected NAME=VALUE"))?;
        current.insert(name.trim().to_string(), value.to_string());
    }

    let verdicts = lesson.check(&current);
    for verdict in &verdicts {
        let mark = if verdict.correct { "ok" } else { "wrong" };
        println!("{:<24} {mark}", verdict.blank);
    }

    if verdicts.iter().all(|v| v.correct) {
        println!("All {} blanks correct.", verdicts.len());
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_infer_with_overrides() {
        let args = Args::try_parse_from([
            "tinker",
            "infer",
            "--template",
            "t.ino",
            "--solved",
            "s.ino",
            "--bind",
            "USE=NAME",
            "--kind",
            "PIN=id",
            "--kind",
            "BAUD=num",
            "--format",
            "json",
        ]);
        assert!(args.is_ok());
        let Ok(Args {
            command: Command::Infer { bind, kind, format, .. },
            ..
        }) = args
        else {
            return;
        };
        assert_eq!(bind, vec!["USE=NAME"]);
        assert_eq!(kind, vec!["PIN=id", "BAUD=num"]);
        assert_eq!(format, OutputFormat::Json);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from(["tinker", "serve", "--port", "8080", "-v"]);
        assert!(matches!(
            args,
            Ok(Args {
                verbose: true,
                command: Command::Serve { port: 8080, .. },
                ..
            })
        ));
    }

    #[test]
    fn check_requires_lesson() {
        assert!(Args::try_parse_from(["tinker", "check", "--value", "A=1"]).is_err());
    }
}
