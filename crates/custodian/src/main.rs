//! Custodian - chain-of-custody ledger for captured web evidence.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use custodian_ledger::archive;
use custodian_ledger::{Command, CommandResponse, EvidenceManager, LedgerCommands, LedgerConfig};
use custodian_schema::PackageExport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "custodian")]
#[command(
    author,
    version,
    about = "Record, seal and export forensic web evidence with a verifiable chain of custody"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script of ledger commands (one JSON object per line)
    Run {
        /// Command script (.jsonl); `-` reads standard input
        #[arg(long)]
        script: PathBuf,

        /// Ledger configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory receiving an archive for every package export
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Verify an export archive
    VerifyArchive {
        /// Archive file path
        #[arg(long)]
        archive: PathBuf,
    },

    /// Print the JSON schema of package export documents
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // stdout carries command responses; logs go to stderr.
    let json_layer = cli
        .log_json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!cli.log_json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            script,
            config,
            out,
        } => {
            let config = match config {
                Some(path) => LedgerConfig::from_yaml_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => LedgerConfig::default(),
            };
            run_script(&script, config, out.as_deref()).await?;
        }

        Commands::VerifyArchive { archive: path } => {
            info!("Verifying export archive: {}", path.display());
            let result = archive::verify_export_archive(&path)?;

            for warning in &result.warnings {
                warn!("{}", warning);
            }
            if result.valid {
                println!("Archive is valid.");
            } else {
                for error in &result.errors {
                    eprintln!("  - {}", error);
                }
                bail!("Archive failed verification with {} error(s)", result.errors.len());
            }
        }

        Commands::Schema => {
            let schema = custodian_schema::schema::package_export_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

async fn run_script(script: &Path, config: LedgerConfig, out: Option<&Path>) -> anyhow::Result<()> {
    let content = if script == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read commands from stdin")?
    } else {
        std::fs::read_to_string(script)
            .with_context(|| format!("Failed to read script {}", script.display()))?
    };
    if let Some(dir) = out {
        std::fs::create_dir_all(dir).context("Failed to create output directory")?;
    }

    let manager = Arc::new(EvidenceManager::new(config)?);
    let commands = LedgerCommands::new(Arc::clone(&manager));

    let mut events = manager.subscribe();
    let listener = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(seq = event.seq, action = %event.action, actor = %event.actor, "Ledger event");
        }
    });

    let mut executed = 0usize;
    let mut failed = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        executed += 1;
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                failed += 1;
                warn!(line = line_no + 1, "{}", e);
                println!("{}", serde_json::to_string(&CommandResponse::failure(&e))?);
                continue;
            }
        };
        let is_package_export = matches!(command, Command::ExportPackage(_));
        let response = commands.execute(command);
        if !response.success {
            failed += 1;
            warn!(
                line = line_no + 1,
                kind = response.error_kind.as_deref().unwrap_or_default(),
                "{}",
                response.error.as_deref().unwrap_or_default()
            );
        }
        println!("{}", serde_json::to_string(&response)?);

        let written = is_package_export && response.success;
        if let (true, Some(dir), Some(result)) = (written, out, response.result.as_ref()) {
            let export: PackageExport = serde_json::from_value(result["document"].clone())
                .context("Export response carried no package document")?;
            let path = dir.join(format!("{}.tgz", export.package.id));
            archive::write_export_archive(&export, &path)?;
        }
    }

    listener.abort();
    let chain = manager.verify_audit_chain();
    info!(
        executed,
        failed,
        audit_entries = chain.entries,
        audit_head = %chain.head_hash,
        "Script complete"
    );
    if !chain.valid {
        bail!("Audit chain broken at entry {:?}", chain.broken_at);
    }

    Ok(())
}
