//! Binary entry point for the respec CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Convert every *_spec.rb under spec/, checking context at runtime
//! respec convert spec
//!
//! # Preview without writing, static classification only
//! respec convert --dry-run --no-dynamic spec/models
//!
//! # Only the matcher rule, parsing from stored dumps
//! respec convert --rules be_close --ast-source dump-file spec/a_spec.rb
//! ```
//!
//! The result is one JSON document on stdout. Errors are JSON too, with the
//! exit code of their category. Logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use respec::cli::{run_convert, ConvertOptions};
use respec::config::{Config, ConfigOverrides};
use respec::error::{OutputErrorCode, RespecError};
use respec::output::{emit_response, ErrorResponse};
use respec::parse::{AstProvider, DumpFileProvider, RubyAstProvider};
use respec::rules::RuleKind;

// ============================================================================
// CLI Structure
// ============================================================================

/// Context-aware migration of RSpec spec files.
#[derive(Parser, Debug)]
#[command(name = "respec", version, about = "Context-aware migration of RSpec spec files")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Project root directory (default: current directory).
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Where syntax trees come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum AstSource {
    /// Run the bundled dump script under `[parser].command`.
    #[default]
    Ruby,
    /// Read `FILE.sexp` next to each file.
    DumpFile,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert deprecated syntax in spec files.
    Convert {
        /// Files or directories (default: the whole project).
        paths: Vec<PathBuf>,

        /// Report conversions without writing files.
        #[arg(long)]
        dry_run: bool,

        /// Skip the runtime pass and use static classification only.
        #[arg(long)]
        no_dynamic: bool,

        /// Test command for the runtime pass, split on whitespace.
        #[arg(long)]
        analysis_command: Option<String>,

        /// Timeout for the runtime pass, in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Keep the sandbox directory if the runtime pass fails.
        #[arg(long)]
        keep_sandbox: bool,

        /// Comma-separated rules to run (should, stub, be_close).
        #[arg(long)]
        rules: Option<String>,

        /// Where syntax trees come from.
        #[arg(long, value_enum, default_value = "ruby")]
        ast_source: AstSource,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_json);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::new(&err);

            // Errors go to stdout as JSON, like results.
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), RespecError> {
    let project_root = match cli.global.project {
        Some(path) => path,
        None => std::env::current_dir()
            .map_err(|e| RespecError::internal(format!("cannot read current directory: {}", e)))?,
    };

    match cli.command {
        Command::Convert {
            paths,
            dry_run,
            no_dynamic,
            analysis_command,
            timeout,
            keep_sandbox,
            rules,
            ast_source,
        } => {
            let overrides = ConfigOverrides {
                no_dynamic,
                analysis_command: analysis_command.map(|c| split_command(&c)),
                timeout_secs: timeout,
                keep_sandbox,
                rules: rules.as_deref().map(parse_rules).transpose()?,
            };
            let mut config = Config::load_from_project(&project_root)?;
            config.apply_overrides(overrides)?;

            let provider: Box<dyn AstProvider> = match ast_source {
                AstSource::Ruby => Box::new(RubyAstProvider::new(&config.parser.command)?),
                AstSource::DumpFile => Box::new(DumpFileProvider),
            };
            let options = ConvertOptions {
                project_root,
                paths,
                dry_run,
            };
            let response = run_convert(&options, &config, provider.as_ref())?;

            emit_response(&response, &mut io::stdout())
                .map_err(|e| RespecError::internal(e.to_string()))?;
            let _ = io::stdout().flush();
            Ok(())
        }
    }
}

// ============================================================================
// Argument Helpers
// ============================================================================

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Parse a comma-separated rule list.
fn parse_rules(list: &str) -> Result<Vec<RuleKind>, RespecError> {
    let rules = list
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<RuleKind>())
        .collect::<Result<Vec<_>, _>>()?;
    if rules.is_empty() {
        return Err(RespecError::invalid_args("--rules needs at least one rule"));
    }
    Ok(rules)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn convert_defaults() {
            let cli = Cli::try_parse_from(["respec", "convert"]).unwrap();
            assert!(matches!(cli.global.log_level, LogLevel::Warn));
            assert!(!cli.global.log_json);
            match cli.command {
                Command::Convert {
                    paths,
                    dry_run,
                    no_dynamic,
                    ast_source,
                    rules,
                    ..
                } => {
                    assert!(paths.is_empty());
                    assert!(!dry_run);
                    assert!(!no_dynamic);
                    assert_eq!(ast_source, AstSource::Ruby);
                    assert!(rules.is_none());
                }
            }
        }

        #[test]
        fn convert_with_flags() {
            let cli = Cli::try_parse_from([
                "respec",
                "convert",
                "spec/models",
                "spec/a_spec.rb",
                "--dry-run",
                "--no-dynamic",
                "--timeout",
                "30",
                "--keep-sandbox",
                "--rules",
                "should,stub",
                "--ast-source",
                "dump-file",
                "--analysis-command",
                "bin/rspec --fail-fast",
            ])
            .unwrap();
            match cli.command {
                Command::Convert {
                    paths,
                    dry_run,
                    no_dynamic,
                    analysis_command,
                    timeout,
                    keep_sandbox,
                    rules,
                    ast_source,
                } => {
                    assert_eq!(
                        paths,
                        vec![PathBuf::from("spec/models"), PathBuf::from("spec/a_spec.rb")]
                    );
                    assert!(dry_run && no_dynamic && keep_sandbox);
                    assert_eq!(timeout, Some(30));
                    assert_eq!(rules.as_deref(), Some("should,stub"));
                    assert_eq!(ast_source, AstSource::DumpFile);
                    assert_eq!(
                        split_command(&analysis_command.unwrap()),
                        vec!["bin/rspec", "--fail-fast"]
                    );
                }
            }
        }

        #[test]
        fn global_args_after_subcommand() {
            let cli = Cli::try_parse_from([
                "respec",
                "convert",
                "--project",
                "/tmp/app",
                "--log-level",
                "debug",
                "--log-json",
            ])
            .unwrap();
            assert_eq!(cli.global.project, Some(PathBuf::from("/tmp/app")));
            assert!(matches!(cli.global.log_level, LogLevel::Debug));
            assert!(cli.global.log_json);
        }

        #[test]
        fn unknown_ast_source_is_rejected() {
            let result = Cli::try_parse_from(["respec", "convert", "--ast-source", "ripper"]);
            assert!(result.is_err());
        }
    }

    mod rule_list {
        use super::*;

        #[test]
        fn parses_and_trims() {
            assert_eq!(
                parse_rules("be_close, should").unwrap(),
                vec![RuleKind::BeClose, RuleKind::Should]
            );
        }

        #[test]
        fn unknown_rule_is_invalid_arguments() {
            let err = parse_rules("should,its").unwrap_err();
            assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
            assert!(err.to_string().contains("its"));
        }

        #[test]
        fn empty_list_is_rejected() {
            assert!(parse_rules(" , ").is_err());
        }
    }
}
