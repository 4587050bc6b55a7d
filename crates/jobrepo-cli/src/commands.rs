use anyhow::{bail, Context};
use colored::Colorize;
use jobrepo_sdk::{
    Change, Commit, EntityKind, EntityStatus, Folder, JobStatus, RepoConfig, Repository,
    StatusOptions, TreeChange,
};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let repo = open_repo(&cli).await?;
    let format = cli.format;
    match cli.command {
        Command::InitJob(args) => cmd_init_job(&repo, args, format).await,
        Command::AddFolder(args) => cmd_add_folder(&repo, args, format).await,
        Command::Stage(args) => cmd_stage(&repo, args, format).await,
        Command::Unstage(args) => cmd_unstage(&repo, args, format).await,
        Command::Status(args) => cmd_status(&repo, args, format).await,
        Command::Commit(args) => cmd_commit(&repo, args, format).await,
        Command::Log(args) => cmd_log(&repo, args, format).await,
        Command::Show(args) => cmd_show(&repo, args, format).await,
        Command::Reconcile(args) => cmd_reconcile(&repo, args, format).await,
    }
}

async fn open_repo(cli: &Cli) -> anyhow::Result<Repository> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| RepoConfig::default().data_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(RepoConfig::FILE_NAME));
    debug!(path = %config_path.display(), "loading config");
    let mut config = RepoConfig::load(&config_path)
        .await
        .with_context(|| format!("reading {}", config_path.display()))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Repository::open(config)
        .await
        .context("opening repository")
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_init_job(repo: &Repository, args: InitJobArgs, format: OutputFormat) -> anyhow::Result<()> {
    let job = repo
        .workspace()
        .create_job(&args.name, &args.owner, &args.group, args.folder_types)
        .await?;
    let summary = repo.create_repo(&job.id).await?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "job": job.id,
            "shortname": job.shortname,
            "roots": job.folders.roots,
            "commit": summary,
        })),
        OutputFormat::Text => {
            println!("{} Created job {} ({})", "✓".green().bold(), job.name.bold(), job.shortname.cyan());
            println!("  Id:     {}", job.id);
            for (kind, id) in &job.folders.roots {
                println!("  Root:   {:<12} {}", kind.yellow(), id);
            }
            println!("  Commit: {} on {}", summary.commit.short_hex().yellow(), summary.reference.green());
            Ok(())
        }
    }
}

async fn cmd_add_folder(repo: &Repository, args: AddFolderArgs, format: OutputFormat) -> anyhow::Result<()> {
    let collection = repo.workspace().collection(&args.job).await?;
    let parent = match args.parent {
        Some(parent) => parent,
        None => match collection.folders.roots.get(&args.kind) {
            Some(root) => root.clone(),
            None => bail!("job {} has no root for folder type {:?}", args.job, args.kind),
        },
    };
    let folder = repo
        .workspace()
        .save(Folder::new(args.job.clone(), args.name, args.kind, Some(parent)))
        .await?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "id": folder.id,
            "hash": folder.hash,
            "state": folder.state,
        })),
        OutputFormat::Text => {
            println!("{} Saved folder {} ({})", "✓".green(), folder.name.bold(), folder.id);
            Ok(())
        }
    }
}

async fn cmd_stage(repo: &Repository, args: StageArgs, format: OutputFormat) -> anyhow::Result<()> {
    let staged = if args.all {
        repo.workspace().stage_all(&args.job).await?
    } else {
        if args.entities.is_empty() {
            bail!("nothing selected; pass <kind>:<id> entities or --all");
        }
        let selection: Vec<_> = args.entities.into_iter().map(|s| (s.kind, s.id)).collect();
        repo.workspace().stage(&args.job, &selection).await?
    };
    match format {
        OutputFormat::Json => print_json(&json!({ "staged": staged })),
        OutputFormat::Text => {
            println!("  {} {} entit{}", "staged:".green(), staged, if staged == 1 { "y" } else { "ies" });
            Ok(())
        }
    }
}

async fn cmd_unstage(repo: &Repository, args: UnstageArgs, format: OutputFormat) -> anyhow::Result<()> {
    let selection: Vec<_> = args.entities.into_iter().map(|s| (s.kind, s.id)).collect();
    let unstaged = repo.workspace().unstage(&args.job, &selection).await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "unstaged": unstaged })),
        OutputFormat::Text => {
            println!("  {} {}", "unstaged:".yellow(), unstaged);
            Ok(())
        }
    }
}

async fn cmd_status(repo: &Repository, args: StatusArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut options = if args.staged {
        StatusOptions::STAGED
    } else if args.working {
        StatusOptions::WORKING
    } else {
        StatusOptions::ALL
    };
    if args.diff {
        options = options.with_diff();
    }
    let report = repo.status(&args.job, args.branch.as_deref(), options).await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&report)?),
        OutputFormat::Text => {
            print_status(&report);
            Ok(())
        }
    }
}

fn print_status(report: &JobStatus) {
    match report.head {
        Some(head) => println!("Job {} at {}", report.job, head.short_hex().yellow()),
        None => println!("Job {} (no commits yet)", report.job),
    }
    if report.is_empty() {
        println!("\nNothing staged. Working set clean.");
        return;
    }
    for (title, pick) in [
        ("Staged for commit:", true),
        ("Not staged:", false),
    ] {
        let rows: Vec<(&EntityStatus, Change)> = report
            .iter()
            .filter_map(|s| {
                let version = if pick { s.staged } else { s.unstaged };
                version.map(|v| (s, v.change))
            })
            .filter(|(_, change)| change.is_pending())
            .collect();
        if rows.is_empty() {
            continue;
        }
        println!("\n{title}");
        for (status, change) in rows {
            let label = match change {
                Change::Created => "created:".green(),
                Change::Modified => "modified:".yellow(),
                Change::Unchanged => "unchanged:".dimmed(),
            };
            let detached = if status.is_detached() { " (detached)".red().to_string() } else { String::new() };
            println!("  {:<11} {:<10} {}{}", label, status.kind.to_string(), status.id, detached);
            if let Some(diff) = &status.diff {
                for field in &diff.changes {
                    println!("      {}", serde_json::to_string(field).unwrap_or_default().dimmed());
                }
            }
        }
    }
}

async fn cmd_commit(repo: &Repository, args: CommitArgs, format: OutputFormat) -> anyhow::Result<()> {
    let summary = repo
        .commit_to(&args.job, &args.message, args.branch.as_deref())
        .await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&summary)?),
        OutputFormat::Text => {
            println!("{} [{} {}] {}", "✓".green().bold(), summary.reference.green(), summary.commit.short_hex().yellow(), args.message);
            for kind in EntityKind::ALL {
                let n = summary.committed.iter().filter(|(k, _)| *k == kind).count();
                if n > 0 {
                    println!("  {n} {}", kind.table());
                }
            }
            Ok(())
        }
    }
}

fn commit_json(id: &jobrepo_sdk::ObjectId, commit: &Commit) -> serde_json::Value {
    json!({
        "id": id,
        "tree": commit.tree,
        "parents": commit.parents,
        "author": commit.author,
        "committer": commit.committer,
        "message": commit.message,
    })
}

async fn cmd_log(repo: &Repository, args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let entries = repo.log(&args.job, args.branch.as_deref(), args.limit).await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::Value::Array(
            entries.iter().map(|e| commit_json(&e.id, &e.commit)).collect(),
        )),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No commits yet.");
            }
            for entry in &entries {
                let subject = entry.commit.message.lines().next().unwrap_or_default();
                if args.oneline {
                    println!("{} {}", entry.id.short_hex().yellow(), subject);
                } else {
                    println!("{} {}", "commit".yellow(), entry.id.to_hex().yellow());
                    println!("Author: {} <{}>", entry.commit.author.name, entry.commit.author.email);
                    println!("Date:   {}", entry.commit.author.date.to_rfc2822());
                    println!("\n    {}\n", entry.commit.message.trim_end());
                }
            }
            Ok(())
        }
    }
}

async fn cmd_show(repo: &Repository, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let commit = repo.show(&args.commit).await?;
    let changes = repo.diff_commits(commit.parent(), &args.commit).await?;
    match format {
        OutputFormat::Json => {
            let mut value = commit_json(&args.commit, &commit);
            value["changes"] = serde_json::to_value(&changes)?;
            print_json(&value)
        }
        OutputFormat::Text => {
            println!("{} {}", "commit".yellow(), args.commit.to_hex().yellow());
            for parent in &commit.parents {
                println!("Parent: {}", parent.short_hex());
            }
            println!("Author: {} <{}>", commit.author.name, commit.author.email);
            println!("\n    {}\n", commit.message.trim_end());
            for change in &changes.changes {
                let label = match change {
                    TreeChange::Added { .. } => "A".green(),
                    TreeChange::Deleted { .. } => "D".red(),
                    TreeChange::Modified { .. } => "M".yellow(),
                    TreeChange::ModeChanged { .. } => "T".cyan(),
                };
                println!("{label}  {}", change.path());
            }
            Ok(())
        }
    }
}

async fn cmd_reconcile(repo: &Repository, args: ReconcileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let touched = repo.reconcile(&args.job, args.branch.as_deref()).await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "reconciled": touched })),
        OutputFormat::Text => {
            if touched == 0 {
                println!("{} Row states match the committed tree.", "✓".green());
            } else {
                println!("{} Reconciled {touched} rows.", "✓".green().bold());
            }
            Ok(())
        }
    }
}
