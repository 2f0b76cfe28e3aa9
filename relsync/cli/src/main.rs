//! relsync CLI - syncs GitHub releases into knowledge-base version claims

use clap::Parser;
use relsync_lib::github::{GitHubClient, RequestGate};
use relsync_lib::knowledge::{KnowledgeBase, WikibaseClient};
use relsync_lib::project::{load_filter_list, load_projects};
use relsync_lib::release_set::ReleaseSource;
use relsync_lib::{BatchSummary, ProjectSelection, ProjectStatus, SyncConfig, SyncContext, run_batch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relsync")]
#[command(about = "Sync GitHub releases into knowledge-base software version claims", long_about = None)]
struct Cli {
    /// Config file (default: ./config.json, then the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON list of projects (`project`, `projectLabel`, `repo` per entry)
    #[arg(long, value_name = "PATH", default_value = "projects.json")]
    projects: PathBuf,

    /// Only sync projects whose item id or label contains this text
    #[arg(long, value_name = "TEXT")]
    filter: Option<String>,

    /// Items whose git tags are always read
    #[arg(long, value_name = "PATH")]
    allowlist: Option<PathBuf>,

    /// Items never touched
    #[arg(long, value_name = "PATH")]
    denylist: Option<PathBuf>,

    /// Sync deny-listed items too
    #[arg(long)]
    ignore_denylist: bool,

    /// Compute and log the edits without writing them
    #[arg(long)]
    dry_run: bool,

    /// GitHub token, overriding config file and environment
    #[arg(long, value_name = "TOKEN")]
    github_oauth_token: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    log_verbosity: u8,

    /// Output logs and the final summary as JSON
    #[arg(long)]
    json: bool,

    /// Only log errors
    #[arg(long, conflicts_with = "log_verbosity")]
    quiet: bool,
}

/// Initialize tracing subscriber based on verbosity and output format
fn init_tracing(verbose: u8, json: bool, quiet: bool) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) if !quiet => filter,
        _ => match (quiet, verbose) {
            (true, _) => "error".to_string(),
            (false, 0) => "warn,relsync_lib=info".to_string(),
            (false, 1) => "info,relsync_lib=debug".to_string(),
            (false, 2) => "debug,relsync_lib=trace".to_string(),
            // -vvv also traces HTTP plumbing
            _ => "trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(verbose >= 1)
                    .with_level(true)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

fn read_list(path: Option<&Path>, kind: &str) -> Vec<relsync_lib::knowledge::ItemId> {
    let Some(path) = path else {
        return Vec::new();
    };
    match load_filter_list(path) {
        Ok(ids) => {
            tracing::info!(count = ids.len(), path = %path.display(), "Loaded {}", kind);
            ids
        }
        Err(e) => {
            eprintln!("Error reading {} {}: {}", kind, path.display(), e);
            std::process::exit(1);
        }
    }
}

fn print_summary(summary: &BatchSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Error serializing summary: {}", e),
        }
        return;
    }

    for outcome in &summary.outcomes {
        let project = &outcome.project;
        match &outcome.status {
            ProjectStatus::Synced { report, planned } => {
                println!(
                    "{} ({}): {} created, {} promoted, {} demoted",
                    project.label,
                    project.item_id,
                    report.created.len(),
                    report.promoted.len(),
                    report.demoted.len()
                );
                for mutation in planned {
                    println!("    would {}", mutation);
                }
            }
            ProjectStatus::Skipped { reason } => {
                println!("{} ({}): skipped, {}", project.label, project.item_id, reason)
            }
            ProjectStatus::Failed { error } => {
                println!("{} ({}): FAILED, {}", project.label, project.item_id, error)
            }
        }
    }
    println!(
        "{} synced, {} skipped, {} failed",
        summary.synced(),
        summary.skipped(),
        summary.failed()
    );
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_verbosity, cli.json, cli.quiet);

    let mut config = match SyncConfig::load(cli.config.as_deref()) {
        Ok(config) => config.apply_env(),
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(token) = cli.github_oauth_token {
        config.github_oauth_token = Some(token);
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let projects = match load_projects(&cli.projects) {
        Ok(projects) => projects,
        Err(e) => {
            eprintln!("Error reading projects from {}: {}", cli.projects.display(), e);
            std::process::exit(1);
        }
    };
    let allowlist = read_list(cli.allowlist.as_deref(), "allowlist");
    let denylist = read_list(cli.denylist.as_deref(), "denylist");

    let projects = ProjectSelection::new()
        .with_filter(cli.filter)
        .with_denylist(denylist)
        .ignore_denylist(cli.ignore_denylist)
        .select(projects);

    let gate = Arc::new(RequestGate::new(config.max_concurrent_requests));
    let source: Arc<dyn ReleaseSource> =
        match GitHubClient::new(&config.github_api_url, &config.user_agent, gate) {
            Ok(client) => Arc::new(client.with_token(config.github_oauth_token.clone())),
            Err(e) => {
                eprintln!("Error creating GitHub client: {}", e);
                std::process::exit(1);
            }
        };
    let kb: Arc<dyn KnowledgeBase> =
        match WikibaseClient::new(&config.wikibase_api_url, &config.user_agent) {
            Ok(client) => Arc::new(client.with_token(config.wikibase_token.clone())),
            Err(e) => {
                eprintln!("Error creating knowledge base client: {}", e);
                std::process::exit(1);
            }
        };

    let ctx = match SyncContext::new(config, source, kb) {
        Ok(ctx) => ctx.with_allowlist(allowlist).with_dry_run(cli.dry_run),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(edit_group = ctx.edit.hash(), dry_run = ctx.dry_run, "Starting sync");

    let summary = run_batch(&ctx, projects).await;
    print_summary(&summary, cli.json);

    if summary.has_failures() {
        std::process::exit(1);
    }
}
