//! Generation-trail orchestrator CLI.
//!
//! Runs measure → stitch → commit cycles on `generation-<date>.<seq>` branches,
//! each checked out in its own worktree, plus the project tooling around them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::cycle::CycleReport;
use orchestrator::error::OrchestratorError;
use orchestrator::exit_codes;
use orchestrator::generator::ResumeOutcome;
use orchestrator::io::agent::CommandAgent;
use orchestrator::io::config::{DEFAULT_CONFIG_FILE, load_config};
use orchestrator::io::git::Git;
use orchestrator::logging;
use orchestrator::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Agent-driven generation cycles over git worktrees"
)]
struct Cli {
    /// Config file, relative to the repository root unless absolute.
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the issue tracker and the scratch directory.
    Init,
    /// Remove scratch state, non-merged generations and the tracker.
    Reset,
    /// Print source line and documentation word counts.
    Stats,
    /// Run the configured build command.
    Build,
    /// Run the configured lint command.
    Lint,
    /// Run the configured install command.
    Install,
    /// Remove build directories.
    Clean,
    /// Export agent credentials from the keychain.
    Credentials,
    /// Propose tasks from coverage gaps (agent call).
    Measure {
        #[command(subcommand)]
        command: Option<MeasureCommand>,
    },
    /// Work through ready tasks (one agent call per task).
    Stitch,
    /// Generation lifecycle.
    #[command(alias = "gen")]
    Generator {
        #[command(subcommand)]
        command: GeneratorCommand,
    },
    /// Issue tracker.
    Beads {
        #[command(subcommand)]
        command: BeadsCommand,
    },
    /// Scratch directory.
    Cobbler {
        #[command(subcommand)]
        command: CobblerCommand,
    },
}

#[derive(Subcommand)]
enum MeasureCommand {
    /// Print the measure prompt without invoking the agent.
    Prompt,
}

#[derive(Subcommand)]
enum GeneratorCommand {
    /// Create a generation from the base branch and make it current.
    Start,
    /// Run cycles in the current generation.
    Run {
        #[arg(long)]
        cycles: Option<u32>,
    },
    /// Recover a suspended or completing generation and run cycles.
    Resume {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        cycles: Option<u32>,
    },
    /// Merge a generation into the base branch and remove its worktree.
    Stop {
        #[arg(long)]
        name: Option<String>,
    },
    /// List generations with their state.
    List,
    /// Make another generation current.
    Switch { name: String },
    /// Remove one generation, or every non-merged one.
    Reset {
        #[arg(long)]
        name: Option<String>,
        /// Allow removing a merged generation.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum BeadsCommand {
    Init,
    Reset,
}

#[derive(Subcommand)]
enum CobblerCommand {
    Reset,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::NoRecoverableState(_)) => exit_codes::NO_RECOVERABLE_STATE,
        Some(OrchestratorError::CycleSuspended { .. }) => exit_codes::SUSPENDED,
        _ => exit_codes::FAILED,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let root = Git::new(&cwd).repository_root().context("locate repository root")?;
    let config_path = resolve_config_path(&root, &cli.config);
    let config = load_config(&config_path)?;
    let agent = CommandAgent::new(config.agent.command.clone());
    let orch = Orchestrator::new(root, config, agent);

    match cli.command {
        Command::Init => {
            orch.init()?;
            println!("initialized");
        }
        Command::Reset => {
            let summary = orch.reset()?;
            for name in &summary.generations_removed {
                println!("removed {name}");
            }
            println!(
                "scratch removed: {}, tracker removed: {}",
                summary.scratch_removed, summary.beads_removed
            );
        }
        Command::Stats => {
            let stats = orch.stats()?;
            println!("source files: {}", stats.source_files);
            println!("source lines: {}", stats.source_lines);
            println!("doc files:    {}", stats.doc_files);
            println!("doc words:    {}", stats.doc_words);
        }
        Command::Build => print!("{}", orch.build()?),
        Command::Lint => print!("{}", orch.lint()?),
        Command::Install => print!("{}", orch.install()?),
        Command::Clean => {
            for path in orch.clean()? {
                println!("removed {}", path.display());
            }
        }
        Command::Credentials => {
            let path = orch.credentials()?;
            println!("{}", path.display());
        }
        Command::Measure {
            command: Some(MeasureCommand::Prompt),
        } => {
            let (prompt, _) = orch.measure_prompt()?;
            print!("{prompt}");
        }
        Command::Measure { command: None } => {
            let outcome = orch.measure()?;
            println!(
                "{} gaps, {} tasks proposed",
                outcome.report.gap_count(),
                outcome.tasks.tasks.len()
            );
            for task in &outcome.tasks.tasks {
                println!("{}\t{}", task.id, task.title);
            }
        }
        Command::Stitch => {
            let outcome = orch.stitch()?;
            for id in &outcome.completed {
                println!("done {id}");
            }
            println!("{} open", outcome.remaining_open);
        }
        Command::Generator { command } => run_generator(&orch, command)?,
        Command::Beads {
            command: BeadsCommand::Init,
        } => {
            orch.beads_init()?;
            println!("tracker initialized");
        }
        Command::Beads {
            command: BeadsCommand::Reset,
        } => {
            let removed = orch.beads_reset()?;
            println!("tracker removed: {removed}");
        }
        Command::Cobbler {
            command: CobblerCommand::Reset,
        } => {
            let removed = orch.cobbler_reset()?;
            println!("scratch removed: {removed}");
        }
    }
    Ok(())
}

fn run_generator(orch: &Orchestrator<CommandAgent>, command: GeneratorCommand) -> Result<()> {
    match command {
        GeneratorCommand::Start => println!("{}", orch.generator_start()?),
        GeneratorCommand::Run { cycles } => {
            for report in orch.generator_run(cycles)? {
                print_cycle(&report);
            }
        }
        GeneratorCommand::Resume { name, cycles } => {
            match orch.generator_resume(name.as_deref(), cycles)? {
                ResumeOutcome::AlreadyActive { name, cycle } => {
                    println!("{name} already active at cycle {cycle}");
                }
                ResumeOutcome::Resumed { name, from, cycles } => {
                    println!("{name} resumed from {from}");
                    for report in &cycles {
                        print_cycle(report);
                    }
                }
            }
        }
        GeneratorCommand::Stop { name } => {
            let outcome = orch.generator_stop(name.as_deref())?;
            println!(
                "{} merged into {} at cycle {} ({})",
                outcome.name, outcome.base_branch, outcome.cycle, outcome.merge_commit
            );
        }
        GeneratorCommand::List => {
            for row in orch.generator_list()? {
                let marker = if row.is_current { "*" } else { " " };
                println!(
                    "{marker} {}\t{}\tcycle {}\t{}",
                    row.name,
                    row.state,
                    row.state.cycle(),
                    row.last_commit_at
                );
            }
        }
        GeneratorCommand::Switch { name } => {
            let state = orch.generator_switch(&name)?;
            println!("{name} ({state})");
        }
        GeneratorCommand::Reset { name, force } => {
            for removed in orch.generator_reset(name.as_deref(), force)? {
                println!("removed {removed}");
            }
        }
    }
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    println!(
        "{} cycle {}: {} of {} tasks, {} ({})",
        report.generation,
        report.cycle,
        report.tasks_completed.len(),
        report.tasks_proposed,
        report.diffstat.summary(),
        report.commit
    );
}

fn resolve_config_path(root: &Path, config: &Path) -> PathBuf {
    if config.is_absolute() {
        config.to_path_buf()
    } else {
        root.join(config)
    }
}
