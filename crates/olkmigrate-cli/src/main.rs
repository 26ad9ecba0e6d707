//! olkmigrate - move an Outlook for Mac profile into a mail store
//!
//! Reads the exported message sources of a profile, recovers each message's
//! folder and conversation thread from the profile's SQLite index, and
//! imports it into a Maildir++ store.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use olkmigrate_core::{Importer, Migration, MigrationConfig, MigrationSummary};
use olkmigrate_store::{MailStore, MaildirFolder, MaildirStore, StoreFolder};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "olkmigrate", version)]
#[command(about = "Migrate an Outlook for Mac profile into a mail store", long_about = None)]
struct Cli {
    /// The path to the Outlook profile
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// The target store (a Maildir++ root)
    #[arg(short, long, env = "OLKMIGRATE_STORE")]
    store: Option<PathBuf>,

    /// The target folder id; asked for interactively when omitted
    #[arg(short, long)]
    folder: Option<String>,

    /// Recreate conversation threads
    #[arg(short, long)]
    threads: bool,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Match messages against the index without importing anything
    #[arg(long)]
    dry_run: bool,

    /// Write the run summary to this file as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<MigrationConfig> {
        let mut config = match &self.config {
            Some(path) => MigrationConfig::from_file(path)?,
            None => MigrationConfig::default(),
        };

        if self.path.is_some() {
            config.profile_path = self.path;
        }
        if self.store.is_some() {
            config.store = self.store;
        }
        if self.folder.is_some() {
            config.folder = self.folder;
        }
        if self.report.is_some() {
            config.report = self.report;
        }
        config.create_threads |= self.threads;
        config.dry_run |= self.dry_run;

        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(
            "olkmigrate=info"
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
        ))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("Migration failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.into_config()?;

    let mut migration = Migration::prepare(&config).await?;
    let summary = if config.dry_run {
        info!("Dry run, nothing will be imported");
        migration.reconcile()?
    } else {
        let mut importer = open_importer(&config)?;
        let summary = migration.run(&mut importer)?;
        importer.close()?;
        summary
    };

    println!("Done");
    print_summary(&summary);

    if let Some(path) = &config.report {
        let file = File::create(path)
            .with_context(|| format!("cannot create report {}", path.display()))?;
        serde_json::to_writer_pretty(file, &summary)?;
        info!("Wrote run summary to {}", path.display());
    }

    Ok(())
}

fn open_importer(config: &MigrationConfig) -> anyhow::Result<Importer<MaildirStore>> {
    let root = config
        .store
        .as_deref()
        .ok_or_else(|| anyhow!("no target store given (use --store or OLKMIGRATE_STORE)"))?;
    let store = MaildirStore::open(root)?;

    let folder = match config.folder.as_deref() {
        Some(id) => store
            .folder_by_id(id)
            .with_context(|| format!("Unknown target folder {}", id))?,
        None => {
            let folder = pick_folder(&store)?;
            println!(
                "Selected folder is {} in store {}",
                folder.id(),
                store.root().display()
            );
            folder
        }
    };

    Ok(Importer::new(store, folder))
}

/// Let the operator choose the target folder on the terminal
fn pick_folder(store: &MaildirStore) -> anyhow::Result<MaildirFolder> {
    let folders = store.folders()?;

    println!("Folders in {}:", store.root().display());
    for (i, folder) in folders.iter().enumerate() {
        let label = if folder.is_root() {
            folder.name().to_string()
        } else {
            folder.segments().join("/")
        };
        println!("{:>4}  {}", i + 1, label);
    }
    print!("Target folder number: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    let Some(folder) = line
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| folders.get(i))
    else {
        bail!("Target folder not selected");
    };

    Ok(folder.clone())
}

fn print_summary(summary: &MigrationSummary) {
    println!("{}", summary);
    println!(
        "Matched {} in the index, {} without index entry ({} unreadable)",
        summary.matched, summary.unresolved, summary.extract_failures
    );
    if summary.unseen > 0 {
        println!("{} indexed messages had no message source", summary.unseen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("olkmigrate.json");
        std::fs::write(
            &path,
            r#"{ "profile_path": "/from/file", "folder": ".Archive", "create_threads": true }"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "olkmigrate",
            "--config",
            path.to_str().unwrap(),
            "-p",
            "/from/flag",
            "--dry-run",
        ]);
        let config = cli.into_config().unwrap();

        assert_eq!(config.profile_path.as_deref(), Some(std::path::Path::new("/from/flag")));
        assert_eq!(config.folder.as_deref(), Some(".Archive"));
        assert!(config.create_threads);
        assert!(config.dry_run);
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(["olkmigrate", "-p", "/profile", "-s", "/store", "-f", "INBOX", "-t"]);
        assert_eq!(cli.folder.as_deref(), Some("INBOX"));
        assert!(cli.threads);
        assert!(!cli.dry_run);
    }
}
