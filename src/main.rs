use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use wireframe_vcs::config::{load_config, AppConfig, StorageBackend};
use wireframe_vcs::diff::{self, DiffOptions};
use wireframe_vcs::model::document::{Section, Wireframe};
use wireframe_vcs::model::version::{Version, DEFAULT_BRANCH};
use wireframe_vcs::telemetry;
use wireframe_vcs::vcs::{CreateVersionOptions, VersionControl};

/// Wireframe VCS: version control and structural diff for design documents
#[derive(Parser)]
#[command(name = "wireframe-vcs")]
#[command(
    about = "Version control for wireframe documents. Branch, revert, merge and diff JSON snapshots."
)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./wireframe-vcs.toml if present)
    #[arg(short, long, global = true, env = "WIREFRAME_VCS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted walkthrough on an in-memory store
    Demo,
    /// Start an interactive REPL session
    Interactive {
        /// Document to work on
        #[arg(short, long, default_value = "landing-page")]
        document: String,
        /// Pre-load the demo history on startup
        #[arg(long)]
        demo: bool,
    },
    /// Diff two JSON documents
    Diff {
        /// Old snapshot
        old: PathBuf,
        /// New snapshot
        new: PathBuf,
        /// Match array elements by this field instead of by position
        #[arg(short, long)]
        key: Option<String>,
        /// Print the change list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration and store status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    telemetry::init(&config.logging);

    let result = match cli.command {
        Commands::Demo => run_demo().await.context("Demo failed"),
        Commands::Interactive { document, demo } => run_interactive(&config, document, demo)
            .await
            .context("Interactive session failed"),
        Commands::Diff {
            old,
            new,
            key,
            json,
        } => {
            let options = match key {
                Some(key) => DiffOptions::keyed(key),
                None => config.diff.options(),
            };
            run_diff(&old, &new, &options, json).context("Diff failed")
        }
        Commands::Status => run_status(&config).await.context("Status check failed"),
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Interactive REPL
// ---------------------------------------------------------------------------

/// Shared session state for the REPL.
struct Session {
    vcs: VersionControl,
    document: String,
    branch: String,
    user: String,
}

impl Session {
    async fn head(&self) -> anyhow::Result<Option<Version>> {
        Ok(self.vcs.get_current_version(&self.document, &self.branch).await?)
    }

    /// Resolve `#N` against the working branch, anything else as a version id.
    async fn resolve(&self, reference: &str) -> anyhow::Result<Version> {
        match reference.strip_prefix('#') {
            Some(number) => {
                let number: u32 = number
                    .parse()
                    .with_context(|| format!("'{}' is not a version number", reference))?;
                Ok(self
                    .vcs
                    .get_version_by_number(&self.document, &self.branch, number)
                    .await?)
            }
            None => Ok(self.vcs.get_version(reference).await?),
        }
    }
}

async fn run_interactive(config: &AppConfig, document: String, load_demo: bool) -> anyhow::Result<()> {
    let vcs = VersionControl::from_config(config).await?;
    let mut session = Session {
        vcs,
        document,
        branch: DEFAULT_BRANCH.to_string(),
        user: std::env::var("USER").unwrap_or_else(|_| "designer".to_string()),
    };

    println!("=== Wireframe VCS Interactive REPL ===");
    println!("Document: {}  Branch: {}\n", session.document, session.branch);

    if load_demo {
        seed_demo_history(&session.vcs, &session.document).await?;
        println!("  Demo history loaded.");
    }

    print_help();

    let stdin = io::stdin();
    loop {
        print!("\n{}@{}> ", session.document, session.branch);
        io::stdout().flush().ok();

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.splitn(2, char::is_whitespace).collect();
        let cmd = parts[0].to_lowercase();
        let args = if parts.len() > 1 { parts[1].trim() } else { "" };

        let outcome = match cmd.as_str() {
            "help" | "h" | "?" => {
                print_help();
                Ok(())
            }
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "status" => cmd_status(&session).await,
            "doc" | "open" => cmd_open(&mut session, args),
            "commit" | "create" => cmd_commit(&session, args).await,
            "title" => cmd_title(&session, args).await,
            "checkout" | "switch" => cmd_checkout(&mut session, args),
            "branch" => cmd_branch(&mut session, args).await,
            "branches" => cmd_branches(&session).await,
            "delete-branch" => cmd_delete_branch(&mut session, args).await,
            "revert" => cmd_revert(&session, args).await,
            "merge" => cmd_merge(&session, args).await,
            "history" | "log" => cmd_history(&session).await,
            "ancestry" => cmd_ancestry(&session, args).await,
            "show" => cmd_show(&session, args).await,
            "diff" | "compare" => cmd_compare(&session, args).await,
            "delete" => cmd_delete(&session, args).await,
            _ => {
                println!(
                    "  Unknown command: '{}'. Type 'help' for available commands.",
                    cmd
                );
                Ok(())
            }
        };

        if let Err(e) = outcome {
            eprintln!("  Error: {:#}", e);
        }
    }

    Ok(())
}

fn print_help() {
    println!("  Commands:");
    println!("    status                 Show the working document, branch and head");
    println!("    doc <id>               Switch to another document");
    println!("    commit <json>          Record a snapshot on the working branch");
    println!("    title <text>           Record a copy of the head with a new title");
    println!("    checkout <branch>      Switch the working branch");
    println!("    branch <name> [ref]    Fork a branch from ref (default: head) and switch to it");
    println!("    branches               List branches");
    println!("    delete-branch <name>   Unregister a branch");
    println!("    revert <ref>           Restore a version as the new head");
    println!("    merge [ref]            Merge ref (default: head) into main");
    println!("    history                Show the document history");
    println!("    ancestry [ref]         Walk parent links from ref (default: head)");
    println!("    show <ref>             Print a version's snapshot");
    println!("    diff <ref> <ref>       Compare two versions");
    println!("    delete <ref>           Delete a version");
    println!("    help                   Show this help message");
    println!("    quit                   Exit the REPL");
    println!("  A ref is a version id or #N for version N of the working branch.");
}

// ---------------------------------------------------------------------------
// REPL commands
// ---------------------------------------------------------------------------

async fn cmd_status(session: &Session) -> anyhow::Result<()> {
    println!("  Document: {}", session.document);
    println!("  Branch:   {}", session.branch);
    match session.head().await? {
        Some(head) => println!("  Head:     #{} {}", head.version_number, head.id),
        None => println!("  Head:     (empty branch)"),
    }
    let total = session.vcs.store().version_count().await?;
    println!("  Store:    {} versions", total);
    Ok(())
}

fn cmd_open(session: &mut Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: doc <document-id>");
        return Ok(());
    }
    session.document = args.to_string();
    session.branch = DEFAULT_BRANCH.to_string();
    println!("  Switched to {}@{}", session.document, session.branch);
    Ok(())
}

async fn cmd_commit(session: &Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: commit <json>");
        return Ok(());
    }
    let data: Value = serde_json::from_str(args).context("snapshot is not valid JSON")?;
    let version = session
        .vcs
        .create_version(
            &session.document,
            data,
            CreateVersionOptions::default()
                .on_branch(&session.branch)
                .by(&session.user),
        )
        .await?;
    print_version_line(&version);
    Ok(())
}

async fn cmd_title(session: &Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: title <text>");
        return Ok(());
    }
    let head = session.head().await?;
    let mut data = head
        .as_ref()
        .map(|v| v.data.clone())
        .unwrap_or_else(|| Value::Object(Default::default()));
    if let Some(object) = data.as_object_mut() {
        object.insert("title".to_string(), Value::String(args.to_string()));
    }

    let options = CreateVersionOptions::description(format!("Retitled to '{}'", args))
        .on_branch(&session.branch)
        .by(&session.user)
        .expecting_head(head.map(|v| v.id));
    let version = session
        .vcs
        .create_version(&session.document, data, options)
        .await?;
    print_version_line(&version);
    Ok(())
}

fn cmd_checkout(session: &mut Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: checkout <branch>");
        return Ok(());
    }
    session.branch = args.to_string();
    println!("  Switched to branch '{}'", session.branch);
    Ok(())
}

async fn cmd_branch(session: &mut Session, args: &str) -> anyhow::Result<()> {
    let mut words = args.split_whitespace();
    let Some(name) = words.next() else {
        println!("  Usage: branch <name> [ref]");
        return Ok(());
    };
    let source = match words.next() {
        Some(reference) => session.resolve(reference).await?,
        None => match session.head().await? {
            Some(head) => head,
            None => bail!("branch '{}' has no versions to fork from", session.branch),
        },
    };

    let version = session
        .vcs
        .create_branch(&source.id, name, &session.user, None)
        .await?;
    session.branch = version.branch_name.clone();
    print_version_line(&version);
    Ok(())
}

async fn cmd_branches(session: &Session) -> anyhow::Result<()> {
    let branches = session.vcs.get_branches(&session.document).await?;
    if branches.is_empty() {
        println!("  (no branches)");
    }
    for branch in &branches {
        let marker = if branch.name == session.branch { "*" } else { " " };
        println!(
            "  {} {} ({} versions, head {}) {}",
            marker,
            branch.name,
            branch.version_count,
            branch.head_version_id.as_deref().unwrap_or("-"),
            branch.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_delete_branch(session: &mut Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: delete-branch <name>");
        return Ok(());
    }
    let Some(branch) = session.vcs.find_branch(&session.document, args).await? else {
        println!("  Branch '{}' not found.", args);
        return Ok(());
    };
    let removed = session.vcs.delete_branch(&branch.id).await?;
    println!("  Deleted branch '{}' ({} versions kept)", removed.name, removed.version_count);
    if session.branch == removed.name {
        session.branch = DEFAULT_BRANCH.to_string();
    }
    Ok(())
}

async fn cmd_revert(session: &Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: revert <ref>");
        return Ok(());
    }
    let target = session.resolve(args).await?;
    let version = session
        .vcs
        .revert_to_version(&target.id, &session.user, None)
        .await?;
    print_version_line(&version);
    Ok(())
}

async fn cmd_merge(session: &Session, args: &str) -> anyhow::Result<()> {
    let source = if args.is_empty() {
        match session.head().await? {
            Some(head) => head,
            None => bail!("branch '{}' has no versions to merge", session.branch),
        }
    } else {
        session.resolve(args).await?
    };
    let version = session
        .vcs
        .merge_branch(&source.id, &session.user, None)
        .await?;
    print_version_line(&version);
    Ok(())
}

async fn cmd_history(session: &Session) -> anyhow::Result<()> {
    let history = session.vcs.get_version_history(&session.document).await?;
    println!(
        "  History of '{}' ({} versions, branches: {}):\n",
        session.document,
        history.versions.len(),
        history.branches.join(", ")
    );
    if history.versions.is_empty() {
        println!("  (no versions recorded)");
    }
    for version in &history.versions {
        print_version_line(version);
    }
    Ok(())
}

async fn cmd_ancestry(session: &Session, args: &str) -> anyhow::Result<()> {
    let start = if args.is_empty() {
        match session.head().await? {
            Some(head) => head,
            None => bail!("branch '{}' is empty", session.branch),
        }
    } else {
        session.resolve(args).await?
    };
    for version in session.vcs.ancestry(&start.id).await? {
        print_version_line(&version);
    }
    Ok(())
}

async fn cmd_show(session: &Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: show <ref>");
        return Ok(());
    }
    let version = session.resolve(args).await?;
    print_version_line(&version);
    println!("{}", serde_json::to_string_pretty(&version.data)?);
    Ok(())
}

async fn cmd_compare(session: &Session, args: &str) -> anyhow::Result<()> {
    let refs: Vec<&str> = args.split_whitespace().collect();
    let [from, to] = refs.as_slice() else {
        println!("  Usage: diff <ref> <ref>");
        return Ok(());
    };
    let from = session.resolve(from).await?;
    let to = session.resolve(to).await?;

    let comparison = session.vcs.compare_versions(&from.id, &to.id).await?;
    println!("  {}", comparison.summary);
    for change in &comparison.changes {
        println!("    {}", describe_change(change));
    }
    Ok(())
}

async fn cmd_delete(session: &Session, args: &str) -> anyhow::Result<()> {
    if args.is_empty() {
        println!("  Usage: delete <ref>");
        return Ok(());
    }
    let version = session.resolve(args).await?;
    session
        .vcs
        .delete_version(&version.id, Some(&session.user))
        .await?;
    println!("  Deleted {} (#{} on {})", version.id, version.version_number, version.branch_name);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_version_line(version: &Version) {
    println!(
        "  {} {:<12} #{:<3} {} | {} | {} | {}",
        if version.is_current { "*" } else { " " },
        version.branch_name,
        version.version_number,
        version.id,
        version.created_at.format("%Y-%m-%d %H:%M:%S"),
        version.kind,
        version.change_description.as_deref().unwrap_or("(no description)")
    );
}

fn describe_change(change: &diff::Change) -> String {
    let render = |value: Option<&Value>| value.map_or_else(|| "-".to_string(), Value::to_string);
    let path = if change.path.is_empty() { "(root)" } else { change.path.as_str() };
    format!(
        "{:?} {}: {} -> {}",
        change.kind,
        path,
        render(change.old_value()),
        render(change.new_value())
    )
}

// ---------------------------------------------------------------------------
// Standalone diff (non-interactive)
// ---------------------------------------------------------------------------

fn read_snapshot(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn run_diff(old: &Path, new: &Path, options: &DiffOptions, json: bool) -> anyhow::Result<()> {
    let old = read_snapshot(old)?;
    let new = read_snapshot(new)?;
    let changes = diff::diff_with(&old, &new, options);

    if json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else {
        println!("{}", diff::summarize(&changes));
        for change in &changes {
            println!("  {}", describe_change(change));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn run_status(config: &AppConfig) -> anyhow::Result<()> {
    match config.storage.backend {
        StorageBackend::Memory => {
            println!("Backend:   in-memory (history is discarded on exit)");
        }
        StorageBackend::Surreal => {
            println!("Backend:   surrealdb ({})", config.storage.url);
            println!(
                "Namespace: {} / {}",
                config.storage.namespace, config.storage.database
            );
            let db = config.storage.database_config()?.connect().await?;
            println!("Health:    {}", if db.health().await? { "ok" } else { "unreachable" });
        }
    }
    println!("Log filter: {}", config.logging.filter);
    match &config.diff.array_key {
        Some(key) => println!("Array diff: keyed by '{}'", key),
        None => println!("Array diff: positional"),
    }

    let vcs = VersionControl::from_config(config).await?;
    println!("Versions:  {}", vcs.store().version_count().await?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Demo (non-interactive walkthrough)
// ---------------------------------------------------------------------------

/// Build a short landing-page history on main.
async fn seed_demo_history(vcs: &VersionControl, document: &str) -> anyhow::Result<Vec<Version>> {
    let draft = Wireframe::new("Landing page")
        .with_section(Section::new("hero", "hero").with_title("Build faster"))
        .with_section(Section::new("features", "grid").with_title("Features"));
    let v1 = vcs
        .create_version(
            document,
            draft.to_data()?,
            CreateVersionOptions::description("Initial layout").by("ana"),
        )
        .await?;

    let mut reviewed = draft.with_section(Section::new("pricing", "table").with_title("Pricing"));
    reviewed.title = "Landing page v2".to_string();
    let v2 = vcs
        .create_version(
            document,
            reviewed.to_data()?,
            CreateVersionOptions::description("Add pricing").by("ben"),
        )
        .await?;

    Ok(vec![v1, v2])
}

/// Run an end-to-end walkthrough of branching, merging and reverting.
async fn run_demo() -> anyhow::Result<()> {
    println!("=== Wireframe VCS Demo ===\n");
    let vcs = VersionControl::in_memory();
    let document = "landing-page";

    println!("--- Step 1: Record history on main ---");
    let seeded = seed_demo_history(&vcs, document).await?;
    for version in &seeded {
        print_version_line(version);
    }
    let [v1, v2] = seeded.as_slice() else {
        bail!("demo history should contain two versions");
    };

    println!("\n--- Step 2: Compare v1 and v2 ---");
    let comparison = vcs.compare_versions(&v1.id, &v2.id).await?;
    println!("  {}", comparison.summary);
    for change in &comparison.changes {
        println!("    {}", describe_change(change));
    }

    println!("\n--- Step 3: Fork an experiment branch from v2 ---");
    let fork = vcs
        .create_branch(&v2.id, "experiment", "ana", Some("Dark theme".to_string()))
        .await?;
    print_version_line(&fork);

    let mut dark = Wireframe::from_data(&fork.data)?;
    dark.color_scheme = Some(serde_json::json!({"background": "#111", "text": "#eee"}));
    let experiment_head = vcs
        .create_version(
            document,
            dark.to_data()?,
            CreateVersionOptions::description("Dark palette")
                .on_branch("experiment")
                .by("ana"),
        )
        .await?;
    print_version_line(&experiment_head);
    println!(
        "  main is still at version {}",
        vcs.get_latest_version_number(document, DEFAULT_BRANCH).await?
    );

    println!("\n--- Step 4: Merge the experiment into main ---");
    let merged = vcs.merge_branch(&experiment_head.id, "ben", None).await?;
    print_version_line(&merged);

    println!("\n--- Step 5: Revert main to v1 ---");
    let reverted = vcs.revert_to_version(&v1.id, "ben", None).await?;
    print_version_line(&reverted);

    println!("\n--- Step 6: History ---");
    let history = vcs.get_version_history(document).await?;
    println!(
        "  {} versions, branches: {}",
        history.versions.len(),
        history.branches.join(", ")
    );
    for version in &history.versions {
        print_version_line(version);
    }
    if let Some(current) = &history.current {
        println!("  Current main head: #{} ({})", current.version_number, current.kind);
    }

    println!("\n--- Step 7: Ancestry of the merged version ---");
    for version in vcs.ancestry(&merged.id).await? {
        print_version_line(&version);
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
