//! Release Radar CLI
//!
//! Command-line interface for authorizing the user credential, running the
//! sync pipeline and talking to the daemon.
//!
//! # Usage
//!
//! ```bash
//! # Print the URL the user visits to grant playlist access
//! release-radar authorize-url
//!
//! # Exchange the code from the redirect and persist the refresh token
//! release-radar authorize --code <CODE>
//!
//! # Run the pipeline once, in-process
//! release-radar run
//!
//! # Ask a running daemon to sync, or show its status
//! release-radar trigger
//! release-radar status
//!
//! # Build a watch list from an existing playlist
//! release-radar extract-artists --playlist <ID> --output input.json
//! ```

mod client;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::DaemonClient;
use release_radar_core::{
    RadarConfig, RadarContext, RunReport, RunWarning, SlotStatus, authorization_url,
    extract_artists, write_watch_list,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "release-radar")]
#[command(about = "Poll followed artists for new releases")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the authorization URL for the user credential
    AuthorizeUrl,

    /// Exchange an authorization code and persist the refresh token
    Authorize {
        /// Code from the redirect after approving access
        #[arg(long)]
        code: String,
    },

    /// Run the sync pipeline once in this process
    Run {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the daemon to run the sync pipeline now
    Trigger {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show daemon status and the last run
    Status,

    /// Write a watch list from the artists on a playlist
    ExtractArtists {
        /// Playlist to read (defaults to the configured playlist)
        #[arg(short, long)]
        playlist: Option<String>,

        /// Where to write the watch list
        #[arg(short, long, default_value = "output.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let config = RadarConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::AuthorizeUrl => print_authorize_url(&config),
        Commands::Authorize { code } => authorize(config, &code).await,
        Commands::Run { json } => run_once(config, json).await,
        Commands::Trigger { json } => trigger(&config, json).await,
        Commands::Status => status(&config).await,
        Commands::ExtractArtists { playlist, output } => {
            extract(config, playlist, &output).await
        }
    }
}

fn print_authorize_url(config: &RadarConfig) -> Result<()> {
    let (url, state) = authorization_url(&config.oauth_settings())
        .context("Failed to build authorization URL")?;

    println!("Open this URL and approve access:");
    println!();
    println!("  {}", url);
    println!();
    println!("State: {}", state);
    println!("Then run: release-radar authorize --code <CODE>");
    Ok(())
}

async fn authorize(config: RadarConfig, code: &str) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let context = RadarContext::from_config(config).await?;

    let token = context
        .tokens
        .authorize_user(code)
        .await
        .context("Authorization code exchange failed")?;

    info!("User credential authorized");
    match token.expires_at {
        Some(at) => println!("Authorized. Access token valid until {}", at.to_rfc3339()),
        None => println!("Authorized."),
    }
    Ok(())
}

async fn run_once(config: RadarConfig, json: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let context = RadarContext::from_config(config).await?;

    let report = context.sync.run().await.context("Sync run failed")?;
    print_report(&report, json)
}

async fn trigger(config: &RadarConfig, json: bool) -> Result<()> {
    let mut client = connect(&config.daemon.socket_path).await?;
    let report = client.sync_now().await?;
    print_report(&report, json)
}

async fn status(config: &RadarConfig) -> Result<()> {
    let mut client = connect(&config.daemon.socket_path).await?;
    let status = client.status().await?;

    println!("Daemon: {}", if status.running { "running a sync" } else { "idle" });
    print_slot("Service credential", &status.service);
    print_slot("User credential", &status.user);

    match status.last_run {
        Some(report) => {
            println!();
            println!("Last run:");
            print_summary(&report);
        }
        None => println!("No run completed since the daemon started"),
    }
    Ok(())
}

async fn extract(config: RadarConfig, playlist: Option<String>, output: &Path) -> Result<()> {
    let playlist_id = playlist
        .or_else(|| config.sync.playlist_id.clone())
        .context("No playlist given and none configured")?;

    config.validate().context("Invalid configuration")?;
    let context = RadarContext::from_config(config).await?;

    let entries = extract_artists(&context.catalog, &playlist_id)
        .await
        .with_context(|| format!("Failed to read playlist {}", playlist_id))?;
    write_watch_list(output, &entries)
        .with_context(|| format!("Failed to write watch list to {:?}", output))?;

    println!("Wrote {} artists to {}", entries.len(), output.display());
    Ok(())
}

async fn connect(socket_path: &Path) -> Result<DaemonClient> {
    let client = DaemonClient::connect(socket_path).await?;
    if !client.is_connected() {
        anyhow::bail!(
            "Daemon is not running at {}. Start release-radard first.",
            client.socket_path().display()
        );
    }
    Ok(client)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_summary(report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("Run {} at {}", report.run_id, report.started_at.to_rfc3339());
    println!(
        "  {} artists polled, {} releases fetched, {} candidates",
        report.artists_polled, report.fetched, report.candidates
    );

    if report.new_releases.is_empty() {
        println!("  No new releases");
    } else {
        println!("  {} new releases:", report.new_releases.len());
        for release in &report.new_releases {
            println!(
                "    {} by {} ({})",
                release.name,
                release.artist_names(),
                release.release_date
            );
        }
    }

    if report.playlist_appended > 0 {
        println!("  {} tracks added to playlist", report.playlist_appended);
    }
    if let Some(path) = &report.digest_path {
        println!("  Digest written to {}", path.display());
    }
    for warning in &report.warnings {
        println!("  warning: {}", describe_warning(warning));
    }
}

fn print_slot(label: &str, slot: &SlotStatus) {
    let state = if slot.usable {
        "valid"
    } else if slot.has_refresh_token {
        "refreshable"
    } else {
        "not authorized"
    };

    match slot.expires_at {
        Some(at) if slot.usable => println!("{}: {} until {}", label, state, at.to_rfc3339()),
        _ => println!("{}: {}", label, state),
    }
}

fn describe_warning(warning: &RunWarning) -> String {
    match warning {
        RunWarning::CredentialLoad { message } => format!("credential load: {}", message),
        RunWarning::ArtistFetch { artist_id, pages, message } => {
            format!("artist {} stopped after {} pages: {}", artist_id, pages, message)
        }
        RunWarning::Persist { release_id, message } => {
            format!("could not record {}: {}", release_id, message)
        }
        RunWarning::TrackLookup { release_id, message } => {
            format!("track lookup for {}: {}", release_id, message)
        }
        RunWarning::PlaylistAppend { message } => format!("playlist append: {}", message),
        RunWarning::Digest { message } => format!("digest: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn extract_artists_defaults_output() {
        let cli = Cli::try_parse_from(["release-radar", "extract-artists", "--playlist", "p1"])
            .unwrap();

        match cli.command {
            Commands::ExtractArtists { playlist, output } => {
                assert_eq!(playlist.as_deref(), Some("p1"));
                assert_eq!(output, PathBuf::from("output.json"));
            }
            _ => panic!("expected extract-artists"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "release-radar",
            "run",
            "--json",
            "--config",
            "/tmp/radar.toml",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/radar.toml")));
        assert!(matches!(cli.command, Commands::Run { json: true }));
    }

    #[test]
    fn authorize_requires_code() {
        assert!(Cli::try_parse_from(["release-radar", "authorize"]).is_err());
    }

    #[test]
    fn describe_artist_fetch_warning() {
        let warning = RunWarning::ArtistFetch {
            artist_id: "a1".to_string(),
            pages: 1,
            message: "HTTP 502".to_string(),
        };
        assert_eq!(
            describe_warning(&warning),
            "artist a1 stopped after 1 pages: HTTP 502"
        );
    }
}
