use anyhow::Context;
use colored::Colorize;
use tokio::io::AsyncWriteExt;

use stash_core::{AssetRecord, AssetStore};
use stash_server::{open_store, StashConfig, StashServer};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = StashConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Serve(args) => {
            if let Some(bind) = args.bind {
                config.server.bind_addr = bind;
            }
            cmd_serve(config).await
        }
        Command::Put(args) => cmd_put(&config, args, cli.format).await,
        Command::Get(args) => cmd_get(&config, args).await,
        Command::Ls(args) => cmd_ls(&config, args, cli.format).await,
        Command::Rm(args) => cmd_rm(&config, args).await,
        Command::Sweep(args) => cmd_sweep(&config, args).await,
        Command::Config => {
            print!("{}", config.to_redacted_toml_string()?);
            Ok(())
        }
    }
}

async fn store(config: &StashConfig) -> anyhow::Result<AssetStore> {
    open_store(config).await.context("opening asset store")
}

async fn cmd_serve(config: StashConfig) -> anyhow::Result<()> {
    let bind = config.server.bind_addr;
    let server = StashServer::open(config).await?;
    println!(
        "Stash server on {} ({} placement)",
        bind.to_string().bold(),
        server.store().placement().mode().cyan()
    );
    server.serve().await?;
    Ok(())
}

async fn cmd_put(config: &StashConfig, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = store(config).await?;
    let file = tokio::fs::File::open(&args.path)
        .await
        .with_context(|| format!("opening {}", args.path.display()))?;
    let outcome = store.ingest(file).await?;

    if format == OutputFormat::Json {
        let body = serde_json::json!({
            "asset": outcome.record,
            "deduped": !outcome.is_new_upload,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let record = &outcome.record;
    if outcome.is_new_upload {
        println!("{} Stored {}", "✓".green().bold(), record.logical_name.yellow());
    } else {
        println!("{} Already stored as {}", "=".blue().bold(), record.logical_name.yellow());
    }
    println!("  Size: {} bytes", record.size);
    println!("  Type: {}", record.media_type.cyan());
    println!("  Hash: {}", record.content_digest.to_hex().dimmed());
    Ok(())
}

async fn cmd_get(config: &StashConfig, args: GetArgs) -> anyhow::Result<()> {
    let store = store(config).await?;
    let mut download = store.retrieve(&args.name).await?;

    match &args.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?;
            let copied = tokio::io::copy(&mut download.reader, &mut file).await?;
            file.flush().await?;
            eprintln!(
                "{} {} -> {} ({} bytes)",
                "✓".green().bold(),
                download.file_name.yellow(),
                path.display(),
                copied
            );
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut download.reader, &mut stdout).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn cmd_ls(config: &StashConfig, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = store(config).await?;
    let page = store.list(args.limit, args.offset).await?;

    if format == OutputFormat::Json {
        let body = serde_json::json!({
            "total": page.total,
            "limit": page.limit,
            "offset": page.offset,
            "assets": page.assets,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if page.assets.is_empty() {
        println!("No assets.");
        return Ok(());
    }
    for record in &page.assets {
        print_row(record);
    }
    println!(
        "\n{} of {} assets (offset {})",
        page.assets.len().to_string().bold(),
        page.total,
        page.offset
    );
    Ok(())
}

fn print_row(record: &AssetRecord) {
    println!(
        "{}  {:>10}  {:<24}  {}",
        record.logical_name.yellow(),
        record.size,
        record.media_type,
        record.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
}

async fn cmd_rm(config: &StashConfig, args: RmArgs) -> anyhow::Result<()> {
    let store = store(config).await?;
    let record = store.delete(&args.id).await?;
    println!("{} Deleted {}", "✓".green().bold(), record.logical_name.yellow());
    Ok(())
}

async fn cmd_sweep(config: &StashConfig, args: SweepArgs) -> anyhow::Result<()> {
    let store = store(config).await?;
    if !args.cache_only {
        let removed = store.sweep_orphans().await?;
        println!("{} Orphans: {} objects removed", "✓".green(), removed);
    }
    let report = store.cache().sweep().await;
    println!(
        "{} Cache: {} expired, {} evicted, {} bytes freed",
        "✓".green(),
        report.expired,
        report.evicted,
        report.bytes_freed
    );
    Ok(())
}
