//! Script server driver.
//!
//! Runs the same load path the host's asset hook uses, from the command
//! line, against a host config.

use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gsc_core::CanonicalName;
use gsc_host::{AssetKind, HostConfig, ScriptServer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gsc-host")]
#[command(author, version, about = "GSC script server", long_about = None)]
struct Cli {
    /// Host config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra script search directory (repeatable)
    #[arg(short = 'd', long = "script-dir", global = true)]
    script_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load scripts by name or token, concurrently
    Load {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Load every script found in the search directories
    Preload,

    /// List every script name the search directories provide
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HostConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => HostConfig::default(),
    };
    config.script_dirs.extend(cli.script_dirs);

    let server = ScriptServer::from_config(&config).context("Failed to start script server")?;

    match cli.command {
        Commands::Load { names } => load(&server, &names),
        Commands::Preload => preload(&server),
        Commands::List => list(&server),
    }
}

fn load(server: &ScriptServer, names: &[String]) -> Result<()> {
    let results = thread::scope(|scope| {
        let handles: Vec<_> = names
            .iter()
            .map(|name| scope.spawn(move || (name, server.load_script(AssetKind::ScriptFile, name))))
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    });

    let mut failed = 0;
    for result in results {
        let Ok((name, result)) = result else {
            bail!("load thread panicked");
        };
        match result {
            Ok(Some(artifact)) => {
                println!(
                    "{}: len={} bytecode_len={} compressed_len={} stack_offset={}",
                    artifact.name(),
                    artifact.len(),
                    artifact.bytecode_len(),
                    artifact.compressed_len(),
                    artifact.stack_offset()
                );
                for function in artifact.functions() {
                    println!("  {:#06x} {:>6}  {}", function.offset, function.size, function.name);
                }
            }
            Ok(None) => println!("{name}: not handled"),
            Err(failure) => {
                eprintln!("{failure}");
                failed += 1;
            }
        }
    }

    let stats = server.stats();
    eprintln!(
        "cache: {} hit(s), {} miss(es), {} build(s), {} failure(s)",
        stats.hits, stats.misses, stats.builds, stats.failures
    );
    if failed > 0 {
        bail!("{failed} script(s) failed to load");
    }
    Ok(())
}

fn preload(server: &ScriptServer) -> Result<()> {
    let report = server.preload(None).context("Failed to scan script directories")?;
    for script in &report.loaded {
        let handle = |offset: Option<u32>| offset.map_or("-".to_string(), |o| format!("{o:#06x}"));
        println!(
            "{}: main={} init={}",
            script.name,
            handle(script.main),
            handle(script.init)
        );
    }
    for name in &report.skipped {
        println!("{name}: skipped");
    }
    for failure in &report.failed {
        eprintln!("{failure}");
    }
    eprintln!(
        "OK: {} loaded, {} skipped, {} failed",
        report.loaded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    if !report.failed.is_empty() {
        bail!("preload failed");
    }
    Ok(())
}

fn list(server: &ScriptServer) -> Result<()> {
    let names: Vec<CanonicalName> = server.source().scan().context("Failed to scan script directories")?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}
