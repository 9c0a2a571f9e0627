//! Incremental release sync.
//!
//! One run moves through these stages:
//!
//! 1. load the persisted user credential
//! 2. fetch the releases of every included artist, pausing between artists
//! 3. keep releases dated in the current year ([`filter_by_year`])
//! 4. sort newest first and drop repeated ids ([`sort_and_dedup`])
//! 5. record unseen releases ([`persist_incremental`])
//! 6. if anything was recorded, append first tracks to the playlist and render
//!    the digest
//!
//! Per-item failures never abort a run. They are logged and collected as
//! [`RunWarning`]s in the [`RunReport`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::catalog::CatalogApi;
use crate::config::SyncConfig;
use crate::digest::DigestRenderer;
use crate::model::Release;
use crate::release_store::{ReleaseStore, ReleaseStoreError};
use crate::token::TokenManager;
use crate::watchlist::{WatchListError, load_watch_list};

/// Error type for a sync run that could not proceed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run holds the run guard.
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error("watch list unavailable: {0}")]
    WatchList(#[from] WatchListError),

    #[error("release store unavailable: {0}")]
    Store(#[from] ReleaseStoreError),
}

/// How [`persist_incremental`] decides which candidates to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Stop the walk at the first recorded release.
    ///
    /// Correct only while catalogs never publish a release dated earlier than
    /// one already recorded; such a backfilled release is skipped for good.
    #[default]
    StopAtFirstKnown,

    /// Check every candidate. Costs one existence check per candidate but
    /// picks up out-of-order releases.
    FullScan,
}

/// A problem a run worked around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    CredentialLoad {
        message: String,
    },
    /// Pagination for an artist stopped early; `pages` pages were kept.
    ArtistFetch {
        artist_id: String,
        pages: usize,
        message: String,
    },
    Persist {
        release_id: String,
        message: String,
    },
    TrackLookup {
        release_id: String,
        message: String,
    },
    PlaylistAppend {
        message: String,
    },
    Digest {
        message: String,
    },
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Included artists whose releases were requested.
    pub artists_polled: usize,
    /// Releases returned by the catalog across all artists.
    pub fetched: usize,
    /// Releases left after the year filter and dedup.
    pub candidates: usize,
    /// Releases recorded by this run, newest first.
    pub new_releases: Vec<Release>,
    /// Id of the recorded release the walk stopped at, if any.
    pub stopped_at: Option<String>,
    pub warnings: Vec<RunWarning>,
    pub playlist_appended: usize,
    pub digest_path: Option<PathBuf>,
}

impl RunReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            artists_polled: 0,
            fetched: 0,
            candidates: 0,
            new_releases: Vec::new(),
            stopped_at: None,
            warnings: Vec::new(),
            playlist_appended: 0,
            digest_path: None,
        }
    }
}

/// Keep releases whose date starts with `year`.
///
/// A plain string prefix match, so every date precision works.
pub fn filter_by_year(releases: Vec<Release>, year: &str) -> Vec<Release> {
    releases
        .into_iter()
        .filter(|r| r.release_date.starts_with(year))
        .collect()
}

/// Sort by release date descending, then drop repeated ids keeping the first.
///
/// The sort is stable and compares the ISO dates as strings; with equal dates
/// the earlier-fetched record wins.
pub fn sort_and_dedup(mut releases: Vec<Release>) -> Vec<Release> {
    releases.sort_by(|a, b| b.release_date.cmp(&a.release_date));

    let mut seen = std::collections::HashSet::new();
    releases.retain(|r| seen.insert(r.id.clone()));
    releases
}

/// Result of [`persist_incremental`].
#[derive(Debug, Default)]
pub struct PersistOutcome {
    /// Newly recorded releases, in walk order.
    pub inserted: Vec<Release>,
    /// The known release that ended the walk.
    pub stopped_at: Option<String>,
    /// Releases whose existence check or insert failed.
    pub failures: Vec<(String, ReleaseStoreError)>,
}

/// Record the candidates the store has not seen.
///
/// `candidates` must be sorted newest first. With
/// [`SyncStrategy::StopAtFirstKnown`] the walk ends at the first recorded id
/// and nothing after it is inspected. A store failure for one release is
/// collected and the walk moves on to the next.
pub async fn persist_incremental(
    store: &dyn ReleaseStore,
    candidates: Vec<Release>,
    strategy: SyncStrategy,
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();

    for release in candidates {
        match store.exists(&release.id).await {
            Ok(true) => match strategy {
                SyncStrategy::StopAtFirstKnown => {
                    tracing::debug!(release_id = %release.id, "Reached recorded release, stopping");
                    outcome.stopped_at = Some(release.id);
                    break;
                }
                SyncStrategy::FullScan => continue,
            },
            Ok(false) => {}
            Err(e) => {
                tracing::error!(release_id = %release.id, "Existence check failed: {}", e);
                outcome.failures.push((release.id, e));
                continue;
            }
        }

        match store.insert(&release).await {
            Ok(true) => {
                tracing::info!(
                    release_id = %release.id,
                    "Recorded new release {} ({})",
                    release.name,
                    release.release_date
                );
                outcome.inserted.push(release);
            }
            Ok(false) => {
                tracing::debug!(release_id = %release.id, "Release recorded concurrently");
            }
            Err(e) => {
                tracing::error!(release_id = %release.id, "Failed to record release: {}", e);
                outcome.failures.push((release.id, e));
            }
        }
    }

    outcome
}

/// Pipeline settings taken from the `[sync]` section.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub watch_list_path: PathBuf,
    pub playlist_id: Option<String>,
    pub artist_delay: Duration,
    pub strategy: SyncStrategy,
}

impl From<&SyncConfig> for PipelineSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            watch_list_path: config.watch_list_path.clone(),
            playlist_id: config.playlist_id.clone(),
            artist_delay: Duration::from_millis(config.artist_delay_ms),
            strategy: config.strategy,
        }
    }
}

/// The sync stages wired to their collaborators.
pub struct SyncPipeline {
    tokens: Arc<dyn TokenManager>,
    catalog: Arc<dyn CatalogApi>,
    store: Arc<dyn ReleaseStore>,
    digest: Arc<dyn DigestRenderer>,
    settings: PipelineSettings,
}

impl SyncPipeline {
    pub fn new(
        tokens: Arc<dyn TokenManager>,
        catalog: Arc<dyn CatalogApi>,
        store: Arc<dyn ReleaseStore>,
        digest: Arc<dyn DigestRenderer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            tokens,
            catalog,
            store,
            digest,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run once, filtering on the current UTC year.
    pub async fn run(&self) -> Result<RunReport, SyncError> {
        self.run_at(Utc::now()).await
    }

    /// Run once as if started at `now`; the year filter uses `now`'s year.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport, SyncError> {
        let mut report = RunReport::new(now);
        tracing::info!(run_id = %report.run_id, "Starting sync run");

        if let Err(e) = self.tokens.load_user_credential().await {
            tracing::warn!("Could not load user credential: {}", e);
            report.warnings.push(RunWarning::CredentialLoad {
                message: e.to_string(),
            });
        }

        let watch_list = load_watch_list(&self.settings.watch_list_path)?;
        let known = self.store.count().await?;
        tracing::debug!(known, artists = watch_list.len(), "Loaded sync inputs");

        let mut fetched = Vec::new();
        for (i, entry) in watch_list.iter().filter(|e| e.include).enumerate() {
            if i > 0 && !self.settings.artist_delay.is_zero() {
                tokio::time::sleep(self.settings.artist_delay).await;
            }

            let result = self.catalog.artist_releases(&entry.artist_id).await;
            report.artists_polled += 1;
            tracing::debug!(
                artist_id = %entry.artist_id,
                releases = result.items.len(),
                "Fetched releases of {}",
                entry.display_name
            );

            if let Some(e) = result.truncated_by {
                report.warnings.push(RunWarning::ArtistFetch {
                    artist_id: entry.artist_id.clone(),
                    pages: result.pages,
                    message: e.to_string(),
                });
            }
            fetched.extend(result.items);
        }
        report.fetched = fetched.len();

        let year = now.format("%Y").to_string();
        let candidates = sort_and_dedup(filter_by_year(fetched, &year));
        report.candidates = candidates.len();

        let outcome =
            persist_incremental(self.store.as_ref(), candidates, self.settings.strategy).await;
        report.stopped_at = outcome.stopped_at;
        report
            .warnings
            .extend(outcome.failures.into_iter().map(|(release_id, e)| {
                RunWarning::Persist {
                    release_id,
                    message: e.to_string(),
                }
            }));
        report.new_releases = outcome.inserted;

        if report.new_releases.is_empty() {
            tracing::info!("No new releases");
        } else {
            self.apply_side_effects(&mut report, now).await;
        }

        report.finished_at = Utc::now();
        tracing::info!(
            run_id = %report.run_id,
            artists = report.artists_polled,
            fetched = report.fetched,
            new = report.new_releases.len(),
            warnings = report.warnings.len(),
            "Sync run finished"
        );
        Ok(report)
    }

    async fn apply_side_effects(&self, report: &mut RunReport, now: DateTime<Utc>) {
        match &self.settings.playlist_id {
            Some(playlist_id) => {
                let mut uris = Vec::with_capacity(report.new_releases.len());
                for release in &report.new_releases {
                    match self.catalog.first_track_uri(&release.id).await {
                        Ok(Some(uri)) => uris.push(uri),
                        Ok(None) => {
                            tracing::warn!(release_id = %release.id, "Release has no tracks");
                        }
                        Err(e) => {
                            tracing::warn!(release_id = %release.id, "Track lookup failed: {}", e);
                            report.warnings.push(RunWarning::TrackLookup {
                                release_id: release.id.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                }

                if !uris.is_empty() {
                    match self.catalog.append_to_playlist(playlist_id, &uris).await {
                        Ok(appended) => {
                            report.playlist_appended = appended;
                            tracing::info!(%playlist_id, appended, "Appended to playlist");
                        }
                        Err(e) => {
                            tracing::error!(%playlist_id, "Playlist append failed: {}", e);
                            report.warnings.push(RunWarning::PlaylistAppend {
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
            None => tracing::debug!("No playlist configured, skipping append"),
        }

        match self.digest.render(&report.new_releases, now) {
            Ok(path) => report.digest_path = Some(path),
            Err(e) => {
                tracing::error!("Digest render failed: {}", e);
                report.warnings.push(RunWarning::Digest {
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Single-flight wrapper around [`SyncPipeline`].
///
/// Scheduled and manual triggers share one service; a trigger that arrives
/// while a run is in progress fails with [`SyncError::AlreadyRunning`].
pub struct SyncService {
    pipeline: SyncPipeline,
    running: Mutex<()>,
    last_report: RwLock<Option<RunReport>>,
}

impl SyncService {
    pub fn new(pipeline: SyncPipeline) -> Self {
        Self {
            pipeline,
            running: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    pub async fn run(&self) -> Result<RunReport, SyncError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;

        let report = self.pipeline.run().await?;
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Report of the most recent completed run.
    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }
}
