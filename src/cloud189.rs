use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use cloud189::cloud::{
    BatchOutcome, CloudClient, CloudError, FileHandle, LocalFile, UploadResult, UploadableFile,
    format_size,
};
use cloud189::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "cloud189",
    version = env!("CARGO_PKG_VERSION"),
    about = "Command-line client for Cloud189 storage",
    long_about = "List, search, download and upload files on Cloud189. Uploads are chunked into 10MB parts \
                  and skip the transfer entirely when the service already holds the same content. \
                  Configure via .env file with CLOUD189_COOKIE or CLOUD189_SESSION_KEY.",
    after_help = "Examples:\n  \
                  cloud189 ls /                           # List the root folder\n  \
                  cloud189 up /backup ./photos -c 4       # Upload a directory with 4 workers\n  \
                  cloud189 dl ./out /backup/report.pdf    # Download a file\n  \
                  cloud189 mkdir /backup/2024             # Create a folder\n  \
                  cloud189 cp /a.txt /docs /backup        # Copy into /backup (last path is the target)\n  \
                  cloud189 rm /backup/old.txt             # Delete\n\n\
                  Configuration (.env):\n  \
                  CLOUD189_COOKIE=<COOKIE_LOGIN_USER value>\n  \
                  CLOUD189_SESSION_KEY=<session key>\n  \
                  LOG_LEVEL=info"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a remote folder
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show details of remote paths
    Stat {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Search a remote folder by name
    Search {
        path: String,
        name: String,
        /// Include subfolders
        #[arg(long, short = 'r')]
        recursive: bool,
    },
    /// Upload local files or directories into a remote folder
    Up {
        remote_dir: String,
        #[arg(required = true)]
        locals: Vec<PathBuf>,
        /// Maximum number of concurrent file uploads
        #[arg(long, short = 'c', default_value = "4")]
        max_concurrent: usize,
    },
    /// Download remote files into a local directory
    Dl {
        local_dir: PathBuf,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Create remote folders
    Mkdir {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Copy remote paths into a folder; the last path is the target
    Cp {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Move remote paths into a folder; the last path is the target
    Mv {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Delete remote paths
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Daily check-in
    Sign,
}

#[derive(Debug)]
struct Stats {
    uploaded: AtomicUsize,
    fast_uploaded: AtomicUsize,
    failed: AtomicUsize,
    total_bytes_uploaded: AtomicU64,
    start_time: std::time::Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            uploaded: AtomicUsize::new(0),
            fast_uploaded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            total_bytes_uploaded: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }
}

impl Stats {
    fn print_upload_summary(&self) {
        let duration = self.start_time.elapsed();
        let total_bytes = self.total_bytes_uploaded.load(Ordering::Relaxed);

        println!("\n{}", style("═".repeat(70)).dim());
        println!(
            "{}",
            style(format!(
                "Summary: {} uploaded, {} fast-uploaded, {} failed",
                self.uploaded.load(Ordering::Relaxed),
                self.fast_uploaded.load(Ordering::Relaxed),
                self.failed.load(Ordering::Relaxed)
            ))
            .bold()
        );

        if total_bytes > 0 {
            println!(
                "{}",
                style(format!(
                    "Total uploaded: {} ({} bytes)",
                    format_size(total_bytes),
                    total_bytes
                ))
                .dim()
            );
        }

        if duration.as_secs() > 0 {
            let speed = total_bytes as f64 / duration.as_secs_f64() / 1024.0 / 1024.0;
            println!(
                "{}",
                style(format!(
                    "Time: {:.2}s, Average speed: {:.2} MB/s",
                    duration.as_secs_f64(),
                    speed
                ))
                .dim()
            );
        }
    }
}

#[derive(Debug, Clone)]
enum ProcessResult {
    Uploaded { filename: String, size: String, id: String },
    FastUploaded { filename: String, size: String, id: String },
    Failed { filename: String, error: String },
}

impl ProcessResult {
    fn filename(&self) -> &str {
        match self {
            Self::Uploaded { filename, .. }
            | Self::FastUploaded { filename, .. }
            | Self::Failed { filename, .. } => filename,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file early to get LOG_LEVEL
    dotenv::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    info!("Cloud189 CLI v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let client = CloudClient::from_config(&config)?;

    if let Err(e) = run(cli.command, client).await {
        match e.downcast_ref::<CloudError>() {
            Some(cloud_error) => eprintln!("{} {}", style("✗").red(), cloud_error.user_message()),
            None => eprintln!("{} {:#}", style("✗").red(), e),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Command, client: CloudClient) -> Result<()> {
    match command {
        Command::Ls { path } => ls(&client, &path).await,
        Command::Stat { paths } => {
            stat(&client, &paths).await;
            Ok(())
        }
        Command::Search {
            path,
            name,
            recursive,
        } => search(&client, &path, &name, recursive).await,
        Command::Up {
            remote_dir,
            locals,
            max_concurrent,
        } => upload(client, &remote_dir, &locals, max_concurrent).await,
        Command::Dl { local_dir, paths } => download(&client, &local_dir, &paths).await,
        Command::Mkdir { paths } => {
            mkdir(&client, &paths).await;
            Ok(())
        }
        Command::Cp { paths } => {
            let (target, sources) = split_target(&paths)?;
            report_batch("copied", client.copy(sources, target).await?);
            Ok(())
        }
        Command::Mv { paths } => {
            let (target, sources) = split_target(&paths)?;
            report_batch("moved", client.move_to(sources, target).await?);
            Ok(())
        }
        Command::Rm { paths } => {
            report_batch("deleted", client.remove(&paths).await?);
            Ok(())
        }
        Command::Sign => sign(&client).await,
    }
}

fn print_entry(entry: &FileHandle) {
    if entry.is_folder {
        println!("- {}", style(&entry.name).cyan());
    } else {
        println!(
            "f {} {}",
            entry.name,
            style(format_size(entry.size.unwrap_or_default())).dim()
        );
    }
}

async fn ls(client: &CloudClient, path: &str) -> Result<()> {
    let target = client.stat(path).await?;
    if !target.is_folder {
        print_entry(&target);
        return Ok(());
    }

    for entry in client.list(&target.id, 1).await? {
        print_entry(&entry);
    }
    Ok(())
}

async fn stat(client: &CloudClient, paths: &[String]) {
    for (path, result) in client.stat_many(paths).await {
        match result {
            Ok(handle) => {
                println!("{} {}", style("✓").green(), style(path).bold());
                println!("  id:       {}", handle.id);
                println!(
                    "  type:     {}",
                    if handle.is_folder { "folder" } else { "file" }
                );
                if let Some(size) = handle.size {
                    println!("  size:     {} ({} bytes)", format_size(size), size);
                }
                if let Some(md5) = &handle.md5 {
                    println!("  md5:      {}", md5);
                }
                if let Some(modified) = &handle.modified_at {
                    println!("  modified: {}", modified);
                }
            }
            Err(e) => println!("{} {} - {}", style("✗").red(), style(path).red(), e),
        }
    }
}

async fn search(client: &CloudClient, path: &str, name: &str, recursive: bool) -> Result<()> {
    let folder = client.stat(path).await?;
    let found = client.search(&folder.id, name, recursive).await?;

    if found.is_empty() {
        println!("{}", style(format!("No match for '{}' in {}", name, path)).yellow());
    }
    for entry in &found {
        print_entry(entry);
    }
    Ok(())
}

async fn mkdir(client: &CloudClient, paths: &[String]) {
    for path in paths {
        match client.mkdir(path).await {
            Ok(folder) => println!(
                "{} {} {}",
                style("✓").green(),
                path,
                style(format!("({})", folder.id)).dim()
            ),
            Err(e) => println!("{} {} - {}", style("✗").red(), style(path).red(), e),
        }
    }
}

/// Split `cp`/`mv` arguments into the target folder and the sources
fn split_target(paths: &[String]) -> Result<(&str, &[String])> {
    match paths.split_last() {
        Some((target, sources)) if !sources.is_empty() => Ok((target.as_str(), sources)),
        _ => anyhow::bail!("expected at least one source and a target folder"),
    }
}

fn report_batch(verb: &str, outcome: BatchOutcome<'_>) {
    for (path, result) in outcome {
        match result {
            Ok(_) => println!("{} {} {}", style("✓").green(), path, style(verb).dim()),
            Err(e) => println!("{} {} - {}", style("✗").red(), style(path).red(), e),
        }
    }
}

async fn sign(client: &CloudClient) -> Result<()> {
    let result = client.sign().await?;
    if result.already_signed {
        println!("{}", style("Already signed in today").yellow());
    } else {
        println!("{}", style("Signed in").green());
    }
    println!("Bonus: {}MB", result.bonus_mb);
    Ok(())
}

async fn download(client: &CloudClient, local_dir: &Path, paths: &[String]) -> Result<()> {
    tokio::fs::create_dir_all(local_dir)
        .await
        .with_context(|| format!("Failed to create {}", local_dir.display()))?;

    let multi = MultiProgress::new();
    for (path, result) in client.stat_many(paths).await {
        let outcome = match result {
            Ok(file) => {
                let dest = local_dir.join(&file.name);
                let pb = multi.add(ProgressBar::new(0));
                pb.set_style(bar_style());
                let outcome = client.download(&file, &dest, Some(&pb)).await;
                pb.finish_and_clear();
                outcome.map(|n| (dest, n))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((dest, written)) => println!(
                "{} {} → {} ({})",
                style("✓").green(),
                path,
                dest.display(),
                style(format_size(written)).dim()
            ),
            Err(e) => {
                error!("Download failed for {}: {}", path, e);
                println!("{} {} - {}", style("✗").red(), style(path).red(), e);
            }
        }
    }
    Ok(())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .map(|bar| bar.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Expand local paths into the files to upload; directories are walked
fn collect_files(locals: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in locals {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path()),
            );
        } else {
            warn!("Path does not exist: {}", path.display());
            println!(
                "{} {} {}",
                style("⚠").yellow(),
                style(path.display()).yellow(),
                style("(not found)").dim()
            );
        }
    }
    files
}

async fn upload(
    client: CloudClient,
    remote_dir: &str,
    locals: &[PathBuf],
    max_concurrent: usize,
) -> Result<()> {
    let folder = client.stat(remote_dir).await?;
    if !folder.is_folder {
        anyhow::bail!("{} is not a folder", remote_dir);
    }

    let files = collect_files(locals);
    if files.is_empty() {
        println!("{}", style("No files to upload").yellow());
        return Ok(());
    }

    let max_concurrent = max_concurrent.max(1);
    println!(
        "{}",
        style(format!(
            "⚡ Uploading {} file(s) to {} with {} workers...",
            files.len(),
            remote_dir,
            max_concurrent
        ))
        .cyan()
    );

    let multi = Arc::new(MultiProgress::new());
    let stats = Arc::new(Stats::default());
    let folder_id = Arc::new(folder.id);

    let (work_tx, work_rx) = mpsc::channel::<PathBuf>(100);
    let (result_tx, mut result_rx) = mpsc::channel::<ProcessResult>(100);
    let work_rx = Arc::new(Mutex::new(work_rx));

    let mut workers = Vec::new();
    for _ in 0..max_concurrent {
        let work_rx = Arc::clone(&work_rx);
        let client = client.clone();
        let stats = Arc::clone(&stats);
        let multi = Arc::clone(&multi);
        let folder_id = Arc::clone(&folder_id);
        let result_tx = result_tx.clone();

        workers.push(tokio::spawn(async move {
            loop {
                let file_path = {
                    let mut rx_guard = work_rx.lock().await;
                    rx_guard.recv().await
                };

                let Some(path) = file_path else {
                    break; // Channel closed
                };

                let pb = multi.add(ProgressBar::new(0));
                pb.set_style(bar_style());

                let result = process_upload(&client, &folder_id, &path, &pb, &stats).await;
                pb.finish_and_clear();

                let _ = result_tx.send(result).await;
            }
        }));
    }
    drop(result_tx);

    let collector_handle = tokio::spawn(async move {
        let mut results = Vec::new();
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }
        results
    });

    for file_path in files {
        work_tx
            .send(file_path)
            .await
            .context("upload workers stopped early")?;
    }
    drop(work_tx); // Close channel to signal workers to exit

    for worker in workers {
        if let Err(e) = worker.await {
            eprintln!("{} Worker panic: {}", style("✗").red(), e);
        }
    }

    let mut results = collector_handle.await?;
    results.sort_by(|a, b| a.filename().cmp(b.filename()));

    println!();
    for result in results {
        match result {
            ProcessResult::Uploaded { filename, size, id } => {
                println!(
                    "{} {} ({}) {}",
                    style("✓").green(),
                    style(&filename).green(),
                    style(size).dim(),
                    style(id).dim()
                );
            }
            ProcessResult::FastUploaded { filename, size, id } => {
                println!(
                    "{} {} ({}) {}",
                    style("↻").yellow(),
                    style(&filename).dim(),
                    style(format!("fast upload, {}", size)).dim(),
                    style(id).dim()
                );
            }
            ProcessResult::Failed { filename, error } => {
                println!(
                    "{} {} - {}",
                    style("✗").red(),
                    style(&filename).red(),
                    style(error).red()
                );
            }
        }
    }

    stats.print_upload_summary();
    Ok(())
}

/// Upload one local file and classify the outcome
async fn process_upload(
    client: &CloudClient,
    folder_id: &str,
    file_path: &Path,
    pb: &ProgressBar,
    stats: &Stats,
) -> ProcessResult {
    let filename = file_path.display().to_string();

    let outcome = async {
        let mut file = LocalFile::open(file_path, folder_id).await?;
        let parts = file.parts().to_vec();
        let size = file.size();
        let result = client.upload(&mut file, &parts, Some(pb)).await?;
        Ok::<_, CloudError>((result, size))
    }
    .await;

    match outcome {
        Ok((result, size)) => {
            let id = result.record().id.clone().unwrap_or_default();
            match result {
                UploadResult::Uploaded(_) => {
                    stats.uploaded.fetch_add(1, Ordering::Relaxed);
                    stats.total_bytes_uploaded.fetch_add(size, Ordering::Relaxed);
                    ProcessResult::Uploaded {
                        filename,
                        size: format_size(size),
                        id,
                    }
                }
                UploadResult::FastUploaded(_) => {
                    stats.fast_uploaded.fetch_add(1, Ordering::Relaxed);
                    ProcessResult::FastUploaded {
                        filename,
                        size: format_size(size),
                        id,
                    }
                }
            }
        }
        Err(e) => {
            error!("Upload failed for {}: {}", filename, e);
            stats.failed.fetch_add(1, Ordering::Relaxed);
            ProcessResult::Failed {
                filename,
                error: e.to_string(),
            }
        }
    }
}
