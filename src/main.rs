use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use keel::config::Config;
use keel::goal::{self, GoalCustomData};
use keel::project::{self, ProjectCustomData};
use keel::rules::{Action, Suggestion};
use keel::store::workflow_type_at;
use keel::workflow::{SchemaRegistry, WorkflowSchema, WorkflowState};
use keel::{klog, Error, Instance, Result};

/// Keel - keeps long-running workflows in sync with their files and
/// suggests what to do next
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    KEEL_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.keel/keel.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (default: ~/.keel/keel.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Workflow instance directory
    #[arg(short = 'i', long, default_value = ".")]
    pub instance: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the workflow snapshot for this instance
    Init {
        /// Display name of the workflow
        name: String,

        /// Workflow type
        #[arg(long = "type", default_value = "project")]
        workflow_type: String,
    },

    /// Show phase and step progress
    Status,

    /// Add entities found on disk to the snapshot
    Sync,

    /// Suggest next actions
    Suggest {
        /// Maximum number of suggestions (default from config)
        #[arg(long)]
        max: Option<usize>,
    },

    /// Start, complete or skip a step of the current phase
    Step {
        #[command(subcommand)]
        action: StepAction,
    },

    /// Close the current phase and enter the next one
    Advance {
        /// Skip steps that are still open
        #[arg(long)]
        force: bool,
    },

    /// Copy the snapshot to a timestamped backup
    Backup,

    /// Check the snapshot against its workflow schema
    Validate,

    /// Move a goal out of the active lists (project workflows)
    ArchiveGoal {
        /// Goal id
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum StepAction {
    Start { step: String },
    Complete { step: String },
    Skip { step: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    keel::log::init_with_debug(cli.debug);
    klog!("keel {:?} instance={}", cli.command, cli.instance.display());

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let registry = SchemaRegistry::builtin();

    let workflow_type = match &cli.command {
        Command::Init { workflow_type, .. } => workflow_type.clone(),
        _ => {
            let path = cli.instance.join(&config.state_dir).join(&config.state_file);
            workflow_type_at(&path)?
        }
    };
    let schema = registry.get(&workflow_type)?.clone();

    if let Command::ArchiveGoal { id } = &cli.command {
        if workflow_type != project::WORKFLOW_TYPE {
            return Err(Error::Validation(format!(
                "archive-goal needs a project workflow, this is '{}'",
                workflow_type
            )));
        }
        return run_archive_goal(Instance::open(&cli.instance, schema, &config)?, id);
    }

    match workflow_type.as_str() {
        project::WORKFLOW_TYPE => run::<ProjectCustomData>(&cli, schema, &config),
        goal::WORKFLOW_TYPE => run::<GoalCustomData>(&cli, schema, &config),
        _ => run::<Value>(&cli, schema, &config),
    }
}

fn run<T>(cli: &Cli, schema: WorkflowSchema, config: &Config) -> Result<()>
where
    T: Serialize + DeserializeOwned + Default,
{
    let instance: Instance<T> = Instance::open(&cli.instance, schema.clone(), config)?;

    match &cli.command {
        Command::Init { name, .. } => {
            let state = instance.initialize(name)?;
            println!(
                "Initialized {} workflow '{}' at {}",
                state.workflow_type,
                state.name,
                instance.state_path().display()
            );
            print_status(&state, &schema);
        }
        Command::Status => print_status(&instance.state()?, &schema),
        Command::Sync => {
            let outcome = instance.sync()?;
            for failure in &outcome.failures {
                eprintln!("warning: {}", failure);
            }
            if outcome.changes.is_empty() {
                println!("No changes");
            }
            for change in &outcome.changes {
                println!("{}", change);
            }
        }
        Command::Suggest { max } => {
            let suggestions = instance.suggest(*max)?;
            if suggestions.is_empty() {
                println!("No suggestions");
            }
            for suggestion in &suggestions {
                print_suggestion(suggestion);
            }
        }
        Command::Step { action } => {
            let state = instance.update(|mut state| {
                match action {
                    StepAction::Start { step } => state.start_step(step)?,
                    StepAction::Complete { step } => state.complete_step(step)?,
                    StepAction::Skip { step } => state.skip_step(step)?,
                }
                Ok(state)
            })?;
            println!("Phase {} step {}", state.current_phase, state.current_step);
        }
        Command::Advance { force } => {
            let mut entered = None;
            instance.update(|mut state| {
                entered = state.advance_phase(&schema, *force)?;
                Ok(state)
            })?;
            match entered {
                Some(phase) => println!("Entered phase {}", phase),
                None => println!("Workflow complete"),
            }
        }
        Command::Backup => {
            let path = instance.store().backup(instance.dir())?;
            let count = instance.store().backups(instance.dir())?.len();
            println!("Backed up to {} ({} backup(s) kept)", path.display(), count);
        }
        Command::Validate => run_validate(&instance)?,
        Command::ArchiveGoal { .. } => {
            return Err(Error::Validation(format!(
                "archive-goal needs a project workflow, this is '{}'",
                schema.workflow_type
            )))
        }
    }
    Ok(())
}

fn run_validate<T>(instance: &Instance<T>) -> Result<()>
where
    T: Serialize + DeserializeOwned + Default,
{
    let path = instance.state_path();
    let raw: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    if !instance.store().validate(&raw) {
        klog!("Snapshot failed structural validation: {}", path.display());
    }
    // A typed read reports the specific reason.
    let state = instance.state()?;
    println!("{} is valid (revision {})", path.display(), state.revision);
    Ok(())
}

fn run_archive_goal(instance: Instance<ProjectCustomData>, id: &str) -> Result<()> {
    instance.update(|mut state| {
        if !state.custom_data.archive_goal(id) {
            return Err(Error::Validation(format!("goal '{}' is not tracked", id)));
        }
        Ok(state)
    })?;
    println!("Archived goal {}", id);
    Ok(())
}

fn print_status<T>(state: &WorkflowState<T>, schema: &WorkflowSchema) {
    let progress = state.progress();
    println!("{} ({})", state.name, state.workflow_type);
    println!("  Phase:    {}", state.current_phase);
    println!("  Step:     {}", state.current_step);
    println!(
        "  Progress: {}% ({} of {} steps done)",
        progress.percent(),
        progress.completed + progress.skipped,
        progress.total
    );
    println!("  Updated:  {} (revision {})", state.last_updated.to_rfc3339(), state.revision);
    println!();
    for def in &schema.phases {
        let Some(info) = state.phase(&def.id) else {
            continue;
        };
        println!("  {} [{}]", def.name, info.status);
        for step in &info.steps {
            println!("    - {} [{}]", step.name, step.status);
        }
    }
}

fn print_suggestion(suggestion: &Suggestion) {
    match &suggestion.action {
        Action::Message { text } => {
            println!("[{}] {}: {}", suggestion.priority, suggestion.rule_name, text);
        }
        Action::ToolCall { tool, params } => {
            println!(
                "[{}] {}: call {} {}",
                suggestion.priority, suggestion.rule_name, tool, params
            );
        }
    }
    if !suggestion.unresolved.is_empty() {
        println!("      unresolved: {}", suggestion.unresolved.join(", "));
    }
}
