use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use jobrepo_types::{EntityId, EntityKind, ObjectId};

#[derive(Parser)]
#[command(
    name = "jobrepo",
    about = "Versioned store and status engine for job data",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Storage root; overrides `data_dir` from the config file.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Config file. Defaults to `jobrepo.toml` in the data dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a job with its root folders and write the initial commit
    InitJob(InitJobArgs),
    /// Save a new folder under an existing one
    AddFolder(AddFolderArgs),
    /// Stage working copies for the next commit
    Stage(StageArgs),
    /// Move staged rows back to the working set
    Unstage(UnstageArgs),
    /// Show staged and working changes against a branch
    Status(StatusArgs),
    /// Commit staged rows
    Commit(CommitArgs),
    /// Show first-parent history
    Log(LogArgs),
    /// Show a commit and the entries it changed
    Show(ShowArgs),
    /// Settle row states after an interrupted commit
    Reconcile(ReconcileArgs),
}

#[derive(Args)]
pub struct InitJobArgs {
    pub name: String,
    #[arg(long)]
    pub owner: String,
    #[arg(long)]
    pub group: String,
    /// Folder type, in display order. Repeatable.
    #[arg(short = 't', long = "folder-type")]
    pub folder_types: Vec<String>,
}

#[derive(Args)]
pub struct AddFolderArgs {
    pub job: EntityId,
    pub name: String,
    /// Folder type; must be one of the job's declared types or `component`.
    #[arg(short = 't', long = "type")]
    pub kind: String,
    /// Parent folder id. Defaults to the root of the folder type.
    #[arg(long)]
    pub parent: Option<EntityId>,
}

#[derive(Args)]
pub struct StageArgs {
    pub job: EntityId,
    /// Entities as `<kind>:<id>`, e.g. `folder:0191...`.
    pub entities: Vec<Selector>,
    /// Stage every working copy of the job.
    #[arg(short, long, conflicts_with = "entities")]
    pub all: bool,
}

#[derive(Args)]
pub struct UnstageArgs {
    pub job: EntityId,
    #[arg(required = true)]
    pub entities: Vec<Selector>,
}

#[derive(Args)]
pub struct StatusArgs {
    pub job: EntityId,
    /// Branch to compare against. Defaults to the configured branch.
    #[arg(long = "ref")]
    pub branch: Option<String>,
    /// Only staged rows.
    #[arg(long, conflicts_with = "working")]
    pub staged: bool,
    /// Only working rows.
    #[arg(long)]
    pub working: bool,
    /// Include field-level diffs.
    #[arg(long)]
    pub diff: bool,
}

#[derive(Args)]
pub struct CommitArgs {
    pub job: EntityId,
    #[arg(short, long)]
    pub message: String,
    #[arg(long = "ref")]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct LogArgs {
    pub job: EntityId,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long = "ref")]
    pub branch: Option<String>,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub commit: ObjectId,
}

#[derive(Args)]
pub struct ReconcileArgs {
    pub job: EntityId,
    #[arg(long = "ref")]
    pub branch: Option<String>,
}

/// One `<kind>:<id>` entity selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<id>, got {s:?}"))?;
        if id.is_empty() {
            return Err(format!("missing id in {s:?}"));
        }
        let kind = kind.parse::<EntityKind>().map_err(|e| e.to_string())?;
        Ok(Self {
            kind,
            id: EntityId::from(id),
        })
    }
}
