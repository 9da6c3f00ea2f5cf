//! Build command handlers
//!
//! Handles submitting builds, following their progress and managing
//! finished builds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use colored::*;
use playpub_client::{BuildUpload, PollOptions, PublisherClient};
use playpub_core::domain::build::{BuildJob, BuildStatus};
use playpub_core::domain::config::BuildConfig;
use playpub_core::domain::log::LogEntry;
use playpub_core::dto::build::BuildSummary;
use uuid::Uuid;

use crate::config::Config;
use crate::id_resolver::resolve_build_id;
use crate::types::BuildRef;

/// Build subcommands
#[derive(Subcommand)]
pub enum BuildCommands {
    /// Submit an APK for AAB generation
    Submit(SubmitArgs),
    /// List all builds
    List,
    /// Show the current state of a build
    Status {
        /// Build ID or unambiguous prefix
        id: BuildRef,
    },
    /// Follow a build until it finishes
    Watch {
        /// Build ID or unambiguous prefix
        id: BuildRef,

        /// Seconds between status checks
        #[arg(long, default_value = "2")]
        interval: u64,
    },
    /// Cancel a build that has not finished
    Cancel {
        /// Build ID or unambiguous prefix
        id: BuildRef,
    },
    /// Delete a build and its files
    Delete {
        /// Build ID or unambiguous prefix
        id: BuildRef,
    },
    /// Download the bundle of a completed build
    Download {
        /// Build ID or unambiguous prefix
        id: BuildRef,

        /// Where to write the bundle (defaults to the name the server suggests)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct SubmitArgs {
    /// APK to convert
    #[arg(long)]
    apk: PathBuf,

    /// Keystore used to sign the bundle
    #[arg(long)]
    keystore: Option<PathBuf>,

    /// Additional input files as FIELD=PATH (e.g., mapping=build/mapping.txt)
    #[arg(short, long, value_parser = parse_key_val)]
    extra: Vec<(String, String)>,

    /// JSON file with the build configuration; flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    app_name: Option<String>,

    #[arg(long)]
    package_name: Option<String>,

    #[arg(long)]
    version_name: Option<String>,

    #[arg(long)]
    version_code: Option<u32>,

    #[arg(long)]
    key_alias: Option<String>,

    #[arg(long, env = "PLAYPUB_KEY_PASSWORD", hide_env_values = true)]
    key_password: Option<String>,

    #[arg(long, env = "PLAYPUB_STORE_PASSWORD", hide_env_values = true)]
    store_password: Option<String>,

    /// Follow the build until it finishes
    #[arg(short, long)]
    wait: bool,

    /// Seconds between status checks with --wait
    #[arg(long, default_value = "2")]
    interval: u64,
}

/// Handle build commands
pub async fn handle_build_command(command: BuildCommands, config: &Config) -> Result<()> {
    let client = PublisherClient::new(&config.server_url);

    match command {
        BuildCommands::Submit(args) => submit_build(&client, args).await,
        BuildCommands::List => list_builds(&client).await,
        BuildCommands::Status { id } => show_build(&client, &id).await,
        BuildCommands::Watch { id, interval } => {
            let id = resolve_build_id(&client, &id).await?;
            watch_build(&client, id, interval).await
        }
        BuildCommands::Cancel { id } => cancel_build(&client, &id).await,
        BuildCommands::Delete { id } => delete_build(&client, &id).await,
        BuildCommands::Download { id, output } => {
            download_artifact(&client, &id, output.as_deref()).await
        }
    }
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid FIELD=path: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Submit a build and optionally follow it
async fn submit_build(client: &PublisherClient, args: SubmitArgs) -> Result<()> {
    let config = build_config(&args)?;

    let apk = read_upload(&args.apk).await?;
    let keystore = match &args.keystore {
        Some(path) => Some(read_upload(path).await?),
        None => None,
    };

    let mut extra = Vec::with_capacity(args.extra.len());
    for (field, path) in &args.extra {
        extra.push((field.clone(), read_upload(Path::new(path)).await?));
    }

    println!(
        "{}",
        format!("Submitting {} (versionCode {})...", config.label(), config.version_code).dimmed()
    );

    let submitted = client.submit_build(&config, apk, keystore, extra).await?;

    println!("{}", "✓ Build submitted".green().bold());
    println!("  ID:     {}", submitted.build_id.to_string().cyan());
    println!("  Status: {}", colorize_status(submitted.status));

    if args.wait {
        println!();
        watch_build(client, submitted.build_id, args.interval).await?;
    }

    Ok(())
}

/// List all builds
async fn list_builds(client: &PublisherClient) -> Result<()> {
    let builds = client.list_builds().await?;

    if builds.is_empty() {
        println!("{}", "No builds found.".yellow());
    } else {
        println!("{}", format!("Found {} build(s):", builds.len()).bold());
        println!();
        for build in &builds {
            print_build_summary(build);
        }
    }

    Ok(())
}

/// Get and display a single build
async fn show_build(client: &PublisherClient, reference: &BuildRef) -> Result<()> {
    let id = resolve_build_id(client, reference).await?;
    let job = client.get_build(id).await?;

    print_build_details(&job);

    Ok(())
}

/// Poll a build, printing new log lines as they appear
async fn watch_build(client: &PublisherClient, id: Uuid, interval: u64) -> Result<()> {
    let options = PollOptions {
        interval: Duration::from_secs(interval.max(1)),
        ..PollOptions::default()
    };

    println!("{}", format!("Following build {}:", id).bold());
    println!("{}", "─".repeat(80).dimmed());

    let mut printed = 0;
    let job = client
        .wait_for_build(id, &options, |job| {
            for entry in job.logs.iter().skip(printed) {
                print_log_entry(entry, job.progress);
            }
            printed = printed.max(job.logs.len());
        })
        .await
        .with_context(|| format!("Failed while following build {}", id))?;

    println!("{}", "─".repeat(80).dimmed());

    match job.status {
        BuildStatus::Completed => {
            println!("{}", "✓ Build completed".green().bold());
            if let Some(output) = &job.output_ref {
                println!("  Output: {}", output.cyan());
            }
            Ok(())
        }
        _ => bail!(
            "Build {} failed: {}",
            id,
            job.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Cancel a build
async fn cancel_build(client: &PublisherClient, reference: &BuildRef) -> Result<()> {
    let id = resolve_build_id(client, reference).await?;
    let job = client.cancel_build(id).await?;

    if job.error.as_deref() == Some("cancelled") {
        println!("{}", format!("✓ Build {} cancelled", id).green());
    } else {
        println!(
            "{}",
            format!("Build {} had already finished ({})", id, job.status).yellow()
        );
    }

    Ok(())
}

/// Delete a build
async fn delete_build(client: &PublisherClient, reference: &BuildRef) -> Result<()> {
    let id = resolve_build_id(client, reference).await?;
    let message = client.delete_build(id).await?;

    println!("{}", format!("✓ {}", message).green());

    Ok(())
}

/// Save the bundle of a completed build
async fn download_artifact(
    client: &PublisherClient,
    reference: &BuildRef,
    output: Option<&Path>,
) -> Result<()> {
    let id = resolve_build_id(client, reference).await?;
    let artifact = client
        .download_artifact(id)
        .await
        .with_context(|| format!("Failed to download the bundle of build {}", id))?;

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&artifact.file_name));
    tokio::fs::write(&path, &artifact.data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "{}",
        format!("✓ Saved {} ({} bytes)", path.display(), artifact.data.len()).green()
    );

    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Assemble the configuration from the optional file and the flags
fn build_config(args: &SubmitArgs) -> Result<BuildConfig> {
    let mut config: BuildConfig = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        }
        None => BuildConfig::new(String::new(), 0),
    };

    if let Some(v) = &args.app_name {
        config.app_name = v.clone();
    }
    if let Some(v) = &args.package_name {
        config.package_name = v.clone();
    }
    if let Some(v) = &args.version_name {
        config.version_name = v.clone();
    }
    if let Some(v) = args.version_code {
        config.version_code = v;
    }
    if let Some(v) = &args.key_alias {
        config.key_alias = v.clone();
    }
    if args.key_password.is_some() {
        config.key_password = args.key_password.clone();
    }
    if args.store_password.is_some() {
        config.store_password = args.store_password.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn read_upload(path: &Path) -> Result<BuildUpload> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    Ok(BuildUpload::new(file_name, data))
}

/// Print one line of the build listing
fn print_build_summary(build: &BuildSummary) {
    println!(
        "  {} {} {} {:>3}%  {}",
        "▸".cyan(),
        build.id.to_string().dimmed(),
        colorize_status(build.status),
        build.progress,
        build.app_name
    );
    println!(
        "    Started: {}",
        build
            .start_time
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
}

/// Print detailed build information
fn print_build_details(job: &BuildJob) {
    println!("{}", "Build Details:".bold());
    println!("  ID:        {}", job.id.to_string().cyan());
    println!("  App:       {}", job.config.label());
    println!("  Status:    {}", colorize_status(job.status));
    println!("  Progress:  {}%", job.progress);
    println!("  Submitted: {}", job.start_time.format("%Y-%m-%d %H:%M:%S"));

    if let Some(started) = job.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(finished) = job.finished_at {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = job.started_at {
            let seconds = finished.signed_duration_since(started).num_seconds();
            println!("  Duration:  {}s", seconds);
        }
    }

    if let Some(output) = &job.output_ref {
        println!("  Output:    {}", output.green());
    }

    if let Some(error) = &job.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }

    if !job.logs.is_empty() {
        println!("\n{}", "Logs:".bold());
        for entry in &job.logs {
            println!(
                "  {} {}",
                entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
                entry.message
            );
        }
    }
}

/// Print a log entry with the progress at the time it was seen
fn print_log_entry(entry: &LogEntry, progress: u8) {
    let message = if entry.message.starts_with("Error: ") {
        entry.message.red()
    } else {
        entry.message.normal()
    };

    println!(
        "{} {} {}",
        entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
        format!("[{:>3}%]", progress).cyan(),
        message
    );
}

/// Colorize build status for display
fn colorize_status(status: BuildStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        BuildStatus::Pending => label.yellow(),
        BuildStatus::Processing => label.cyan(),
        BuildStatus::Completed => label.green(),
        BuildStatus::Failed => label.red(),
    }
}
