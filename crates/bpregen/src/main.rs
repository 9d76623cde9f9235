//! bpregen
//!
//! Compiles a project's blueprints into live classes and, in watch mode,
//! regenerates them as the asset files change.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bpregen::project::{ProjectLoader, ProjectWatcher};
use bpregen::session::{AssetReport, Session};

/// Blueprint recompilation host
#[derive(Parser, Debug)]
#[command(name = "bpregen")]
#[command(about = "Compile blueprints and keep live instances current", long_about = None)]
struct Args {
    /// Path to the project directory
    #[arg(short, long, env = "BPREGEN_PROJECT", default_value = "./project")]
    project: PathBuf,

    /// Keep running and recompile assets as they change on disk
    #[arg(long)]
    watch: bool,

    /// Spawn an instance of this blueprint after the initial compile (repeatable)
    #[arg(long = "spawn", value_name = "BLUEPRINT")]
    spawn: Vec<String>,

    /// Emit logs and the status report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bpregen=info,blueprint_compiler=info"));
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting bpregen v{}", env!("CARGO_PKG_VERSION"));

    let project = ProjectLoader::load(&args.project)
        .await
        .with_context(|| format!("failed to load project {}", args.project.display()))?;
    info!("Project: {} ({})", project.name(), project.id());

    let mut session = Session::new(project)?;
    let reports = session.compile_all()?;
    print_reports(&reports, args.json)?;

    for id in &args.spawn {
        if let Err(e) = session.spawn(id) {
            warn!("Failed to spawn {}: {}", id, e);
        }
    }

    if args.watch {
        let watcher = ProjectWatcher::new(session.project_path())?;
        tokio::select! {
            _ = watcher.run(&mut session) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
            }
        }
        print_reports(&session.reports(), args.json)?;
    }

    Ok(())
}

fn print_reports(reports: &[AssetReport], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }
    for report in reports {
        println!(
            "{:<24} {:<10} {:<24} {} instance(s)",
            report.id,
            format!("{:?}", report.status),
            report.class.as_deref().unwrap_or("-"),
            report.instances
        );
    }
    Ok(())
}
