use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use lab_cockpit::brain::Brain;
use lab_cockpit::config::{self, LabConfig};
use lab_cockpit::context::LabContext;
use lab_cockpit::feeder::{Budget, CodeBuffer, CodeFeeder, LineId, LineSpan, Window};
use lab_cockpit::patch::{Autopatcher, PatchOutcome, PatchRequest};
use lab_cockpit::router::{Classifier, Reply};
use lab_cockpit::save::{self, SaveMode};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lab-cockpit")]
#[command(about = "Two-brain local coding cockpit", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.lab-cockpit/config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which brain would handle a request
    Classify {
        text: String,
    },

    /// Print a budget-sized window of a file as a model would see it
    Window {
        #[arg(short, long)]
        file: PathBuf,

        /// First line id of the range
        #[arg(long)]
        from: Option<u64>,

        /// Last line id of the range
        #[arg(long)]
        to: Option<u64>,

        /// Budget in characters (defaults to [feeder] chunk_chars)
        #[arg(short, long)]
        budget: Option<usize>,

        /// Interpret --budget as tokens
        #[arg(long)]
        tokens: bool,

        /// Print every chunk covering the range, not only the first
        #[arg(long)]
        all: bool,
    },

    /// Apply a file of patch blocks to a source file
    Patch {
        #[arg(short, long)]
        file: PathBuf,

        /// File containing one or more <<<PATCH ... PATCH>>> blocks
        #[arg(short, long)]
        patch: PathBuf,

        /// Validate and show the result without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Write a timestamped _PATCHED_ copy instead of overwriting
        #[arg(long)]
        copy: bool,
    },

    /// Send a request to a brain
    Ask {
        /// Source file loaded as the buffer
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Force a brain instead of classifying
        #[arg(short, long)]
        brain: Option<Brain>,

        /// Apply a returned patch and save the file
        #[arg(long)]
        apply: bool,

        /// Show unified diff of an applied patch
        #[arg(short, long)]
        diff: bool,

        /// With --apply, write a timestamped _PATCHED_ copy
        #[arg(long)]
        copy: bool,

        text: String,
    },

    /// Show engine configuration and readiness
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { text } => cmd_classify(&config, &text),
        Commands::Window {
            file,
            from,
            to,
            budget,
            tokens,
            all,
        } => cmd_window(&config, &file, from, to, budget, tokens, all),
        Commands::Patch {
            file,
            patch,
            dry_run,
            diff,
            copy,
        } => cmd_patch(&file, &patch, dry_run, diff, copy),
        Commands::Ask {
            file,
            brain,
            apply,
            diff,
            copy,
            text,
        } => cmd_ask(config, file, brain, apply, diff, copy, &text).await,
        Commands::Status => cmd_status(config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "lab_cockpit=debug"
    } else {
        "lab_cockpit=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

fn cmd_classify(config: &LabConfig, text: &str) -> Result<()> {
    let classifier = Classifier::new(&config.router)?;
    let scores = classifier.scores(text);
    let brain = classifier.classify(text);
    println!(
        "{} {}",
        brain.display_name().bold(),
        format!("(scriptor {}, master {})", scores.scriptor, scores.master).dimmed()
    );
    Ok(())
}

fn cmd_window(
    config: &LabConfig,
    file: &Path,
    from: Option<u64>,
    to: Option<u64>,
    budget: Option<usize>,
    tokens: bool,
    all: bool,
) -> Result<()> {
    let buffer = CodeBuffer::load(&read_source(file)?).with_source(file);

    let span = match (from, to) {
        (None, None) => None,
        (from, to) => {
            let first = from.map(LineId).or_else(|| buffer.first());
            let last = to.map(LineId).or_else(|| buffer.last());
            first.zip(last).map(|(f, l)| LineSpan::new(f, l))
        }
    };
    let limit = budget.unwrap_or(config.feeder.chunk_chars);
    let budget = if tokens {
        Budget::Tokens(limit)
    } else {
        Budget::Chars(limit)
    };

    let windows = if all {
        buffer.windows(span, budget)?
    } else {
        vec![buffer.window(span, budget)?]
    };
    for (idx, window) in windows.iter().enumerate() {
        print_window(idx, window);
    }
    Ok(())
}

fn print_window(idx: usize, window: &Window) {
    let span = window
        .span
        .map(|s| s.to_string())
        .unwrap_or_else(|| "empty".to_string());
    let mut header = format!(
        "── window {} · {} · {} lines · {:016x}",
        idx + 1,
        span,
        window.line_count(),
        window.fingerprint
    );
    if window.oversized {
        header.push_str(" · oversized line");
    }
    println!("{}", header.cyan());
    print!("{}", window.render());
    if let Some(next) = window.next {
        println!("{}", format!("   … continues at {next}").dimmed());
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn report_outcome(outcome: &PatchOutcome) {
    match outcome {
        PatchOutcome::Committed(commit) => {
            println!(
                "{} {} operation(s) committed as {}",
                "✓".green(),
                commit.operations,
                commit.version
            );
            for warning in &commit.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }
        PatchOutcome::Rejected(rejection) => {
            eprintln!("{} {}", "✗".red(), rejection);
        }
    }
}

fn save_mode(copy: bool) -> SaveMode {
    if copy {
        SaveMode::PatchedCopy
    } else {
        SaveMode::InPlace
    }
}

fn cmd_patch(file: &Path, patch: &Path, dry_run: bool, show_diff: bool, copy: bool) -> Result<()> {
    let original = read_source(file)?;
    let patch_text = read_source(patch)?;

    let feeder = Arc::new(CodeFeeder::new(CodeBuffer::load(&original).with_source(file)));
    let patcher = Autopatcher::new(Arc::clone(&feeder));
    let request = PatchRequest::new(Brain::Scriptor, feeder.snapshot_version(), patch_text);

    let outcome = patcher.apply(&request);
    report_outcome(&outcome);
    if !outcome.is_committed() {
        anyhow::bail!("patch was not applied");
    }

    let modified = feeder.serialize();
    if show_diff {
        display_diff(file, &original, &modified);
    }
    if dry_run {
        println!("{}", "[DRY RUN - nothing written]".cyan());
        return Ok(());
    }
    let written = save::save(file, &modified, save_mode(copy))?;
    println!("{} wrote {}", "✓".green(), written.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_ask(
    config: LabConfig,
    file: Option<PathBuf>,
    brain: Option<Brain>,
    apply: bool,
    show_diff: bool,
    copy: bool,
    text: &str,
) -> Result<()> {
    let original = match &file {
        Some(path) => read_source(path)?,
        None => String::new(),
    };
    let ctx = LabContext::start(config, &original, file.clone()).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let turn = ctx.ask_with(brain, text, apply, &cancel).await;
    let turn = match turn {
        Ok(turn) => turn,
        Err(err) => {
            ctx.shutdown().await;
            return Err(err.into());
        }
    };

    println!(
        "{} {}",
        format!("{}:", turn.dispatch.brain.display_name()).bold(),
        turn.dispatch.text()
    );

    if let Some(outcome) = &turn.outcome {
        report_outcome(outcome);
        if outcome.is_committed() {
            if let Some(path) = &file {
                if show_diff {
                    display_diff(path, &original, &ctx.feeder().serialize());
                }
                let written = ctx.save(save_mode(copy))?;
                println!("{} wrote {}", "✓".green(), written.display());
            }
        }
    } else if matches!(turn.dispatch.reply, Reply::Patch(_)) {
        println!("{}", "(patch not applied; pass --apply)".dimmed());
    }

    ctx.shutdown().await;
    Ok(())
}

async fn cmd_status(config: LabConfig) -> Result<()> {
    let ctx = LabContext::start(config, "", None).await?;
    for status in ctx.status() {
        let engine = ctx.config().engines.get(status.brain);
        let ready = if status.ready {
            "ready".green()
        } else {
            "unavailable".red()
        };
        println!("{} {}", status.brain.display_name().bold(), ready);
        println!("  backend:     {}", status.backend);
        println!(
            "  model:       {}",
            status.model.as_deref().unwrap_or("(server default)")
        );
        println!("  max_context: {}", engine.max_context);
        println!("  timeout:     {}s", engine.timeout_secs);
    }
    ctx.shutdown().await;
    Ok(())
}
