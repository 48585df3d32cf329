use corral_core::config::{CorralConfig, parse_duration};
use corral_core::corpus;
use corral_core::{CampaignOptions, CancelToken, Project};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Exit status when at least one failing input was found.
const EXIT_FAILING_INPUT: u8 = 2;
const EXIT_ERROR: u8 = 1;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Runs Go native fuzz tests in CI", long_about = None)]
struct Cli {
    /// Module root to operate on.
    #[clap(short = 'C', long, value_parser, default_value = ".", global = true)]
    project_dir: PathBuf,
    /// Config file; defaults to corral.toml in the project directory.
    #[clap(long, value_parser, global = true)]
    config: Option<PathBuf>,
    /// Do not mirror fuzzer output.
    #[clap(short, long, global = true)]
    quiet: bool,
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fuzz every target in <PACKAGES> for --fuzz-time / N each, where N is
    /// the number of targets.
    ///
    /// Failing inputs are copied to --out using the same layout as the local
    /// corpus: <package dir>/testdata/fuzz/<FuzzTarget>/<input>.
    Fuzz(FuzzArgs),
    /// Print the fuzz targets found in <PACKAGES>.
    List {
        packages: Vec<String>,
        #[clap(long)]
        json: bool,
    },
    /// Manage the local corpora of fuzz targets.
    #[clap(subcommand)]
    Corpus(CorpusCommand),
}

#[derive(Args, Debug)]
struct FuzzArgs {
    packages: Vec<String>,
    /// Fuzzing duration for the whole suite, e.g. 10m or 1h30m.
    #[clap(long, value_parser = parse_duration)]
    fuzz_time: Option<Duration>,
    /// Stop once a failing input is discovered.
    #[clap(long)]
    fail_fast: bool,
    /// Directory to write failing inputs to.
    #[clap(short, long, value_parser)]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum CorpusCommand {
    /// Copy the local corpora into <DESTINATION>.
    Extract {
        destination: PathBuf,
        packages: Vec<String>,
    },
    /// Delete the local corpora.
    Delete { packages: Vec<String> },
    /// Add the inputs stored in <EXTERNAL> to the local corpora.
    Merge {
        external: PathBuf,
        packages: Vec<String>,
    },
    /// Replace the local corpora with the ones stored in <EXTERNAL>.
    Replace {
        external: PathBuf,
        packages: Vec<String>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Passed,
    FoundFailingInput,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_ERROR)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(cli.verbose);

    match run(cli) {
        Ok(Outcome::Passed) => ExitCode::SUCCESS,
        Ok(Outcome::FoundFailingInput) => ExitCode::from(EXIT_FAILING_INPUT),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let config = CorralConfig::discover(cli.config.as_deref(), &cli.project_dir)
        .context("failed to load configuration")?;
    debug!("Effective configuration: {config:?}");

    let quiet = cli.quiet || config.fuzz.quiet;
    let cancel = CancelToken::new();
    let mut project =
        Project::with_go_toolchain(&cli.project_dir, &config.driver, quiet, cancel.clone());

    match cli.command {
        Command::Fuzz(args) => {
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || handler_token.cancel())
                .context("failed to install Ctrl-C handler")?;
            fuzz(&mut project, &config, args)
        }
        Command::List { packages, json } => {
            let targets = project
                .discover(&packages)
                .context("failed to list fuzz targets")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&targets)?);
            } else {
                for target in &targets {
                    println!("{target}");
                }
            }
            Ok(Outcome::Passed)
        }
        Command::Corpus(command) => {
            corpus_command(&project, command)?;
            Ok(Outcome::Passed)
        }
    }
}

fn fuzz(project: &mut Project, config: &CorralConfig, args: FuzzArgs) -> anyhow::Result<Outcome> {
    let total = args.fuzz_time.unwrap_or(config.fuzz.fuzz_time);
    let fail_fast = args.fail_fast || config.fuzz.fail_fast;
    // Paths from the config file are relative to the project, flags to the cwd.
    let out = args
        .out
        .or_else(|| config.fuzz.out.as_ref().map(|p| project.dir().join(p)));

    let targets = project
        .discover(&args.packages)
        .context("failed to discover fuzz targets")?;
    if targets.is_empty() {
        println!("No fuzz tests found");
        return Ok(Outcome::Passed);
    }

    let project_dir = project.dir().to_path_buf();
    let mut save_error = None;
    let report = project
        .run_campaign_with(&targets, CampaignOptions { total, fail_fast }, |run| {
            let Some(input) = &run.failing_input else {
                return ControlFlow::Continue(());
            };
            match save(&project_dir, out.as_deref(), run, input) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => {
                    save_error = Some(e);
                    ControlFlow::Break(())
                }
            }
        })
        .context("fuzzing failed")?;

    if let Some(e) = save_error {
        return Err(e);
    }

    match report {
        Some(report) if report.any_failure() => Ok(Outcome::FoundFailingInput),
        _ => {
            info!("all fuzz targets passed");
            Ok(Outcome::Passed)
        }
    }
}

fn save(
    project_dir: &Path,
    out: Option<&Path>,
    run: &corral_core::TargetRun,
    input: &corral_core::FailingInput,
) -> anyhow::Result<()> {
    let saved = match out {
        Some(out) => corpus::save_failing_input(project_dir, out, &run.target, input)
            .context("failed to save failing input")?,
        None => None,
    };
    match saved {
        Some(dest) => println!("Found failing input, saving to {}", dest.display()),
        None => println!("Found {input}, not saving"),
    }
    Ok(())
}

fn corpus_command(project: &Project, command: CorpusCommand) -> anyhow::Result<()> {
    match command {
        CorpusCommand::Extract {
            destination,
            packages,
        } => {
            let copied = project
                .extract_corpus(&destination, &packages)
                .with_context(|| format!("failed to extract corpus to {destination:?}"))?;
            println!("Extracted {copied} corpus directories to {}", destination.display());
        }
        CorpusCommand::Delete { packages } => {
            let targets = project
                .delete_corpus(&packages)
                .context("failed to delete corpus")?;
            println!("Deleted local corpus of {targets} targets");
        }
        CorpusCommand::Merge { external, packages } => {
            let merged = project
                .merge_corpus(&external, &packages)
                .with_context(|| format!("failed to merge corpus from {external:?}"))?;
            println!("Merged {merged} corpus directories from {}", external.display());
        }
        CorpusCommand::Replace { external, packages } => {
            let replaced = project
                .replace_corpus(&external, &packages)
                .with_context(|| format!("failed to replace corpus from {external:?}"))?;
            println!("Replaced corpus with {replaced} directories from {}", external.display());
        }
    }
    Ok(())
}
