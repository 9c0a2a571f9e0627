//! Watch list file handling and playlist artist extraction.
//!
//! The watch list is a JSON array in the shape produced by
//! [`extract_artists`]:
//!
//! ```json
//! [
//!   { "name": "Artist", "value": { "id": "0abc", "count": 12, "exclude": false } }
//! ]
//! ```
//!
//! Users curate the extracted file by flipping `exclude`; the sync pipeline
//! polls every entry that is not excluded.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogClient, CatalogError};
use crate::model::ArtistWatchEntry;

/// Error type for watch list operations.
#[derive(Debug, Error)]
pub enum WatchListError {
    #[error("failed to read watch list {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse watch list {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write watch list {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The playlist could not be fetched at all.
    #[error("failed to fetch playlist: {0}")]
    Catalog(#[from] CatalogError),
}

/// One artist as written to and read from the watch list file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchListEntry {
    pub name: String,
    pub value: WatchListValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchListValue {
    pub id: String,
    /// Number of playlist tracks the artist appeared on when extracted.
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub exclude: bool,
}

impl From<WatchListEntry> for ArtistWatchEntry {
    fn from(entry: WatchListEntry) -> Self {
        Self {
            artist_id: entry.value.id,
            display_name: entry.name,
            include: !entry.value.exclude,
        }
    }
}

/// Read the watch list, preserving file order.
pub fn load_watch_list(path: &Path) -> Result<Vec<ArtistWatchEntry>, WatchListError> {
    let contents = fs::read_to_string(path).map_err(|source| WatchListError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let entries: Vec<WatchListEntry> =
        serde_json::from_str(&contents).map_err(|source| WatchListError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!("Loaded {} watch list entries from {:?}", entries.len(), path);
    Ok(entries.into_iter().map(ArtistWatchEntry::from).collect())
}

/// Write a watch list as pretty-printed JSON, creating parent directories.
pub fn write_watch_list(path: &Path, entries: &[WatchListEntry]) -> Result<(), WatchListError> {
    let contents = serde_json::to_string_pretty(entries)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WatchListError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    fs::write(path, contents).map_err(|source| WatchListError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Count artist appearances across playlist tracks.
///
/// Artists are keyed by name; the id of the last occurrence wins. Artists
/// without a catalog id (local files) are skipped. The result is ordered by
/// lowercase name, then stably by count descending, so ties keep alphabetical
/// order.
pub fn tally_artists<'a, I>(artists: I) -> Vec<WatchListEntry>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut tally: HashMap<&str, (&str, u32)> = HashMap::new();

    for (name, id) in artists {
        let Some(id) = id else {
            continue;
        };
        let slot = tally.entry(name).or_insert((id, 0));
        slot.0 = id;
        slot.1 += 1;
    }

    let mut entries: Vec<WatchListEntry> = tally
        .into_iter()
        .map(|(name, (id, count))| WatchListEntry {
            name: name.to_string(),
            value: WatchListValue {
                id: id.to_string(),
                count,
                exclude: false,
            },
        })
        .collect();

    entries.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    entries.sort_by(|a, b| b.value.count.cmp(&a.value.count));
    entries
}

/// Build a watch list from every artist on a playlist.
///
/// Fails only if no page of the playlist could be fetched; a partial fetch is
/// logged and tallied as far as it got.
pub async fn extract_artists(
    catalog: &CatalogClient,
    playlist_id: &str,
) -> Result<Vec<WatchListEntry>, WatchListError> {
    let fetched = catalog.playlist_tracks(playlist_id).await;

    if let Some(e) = fetched.truncated_by {
        if fetched.pages == 0 {
            return Err(e.into());
        }
        tracing::warn!(
            playlist_id,
            pages = fetched.pages,
            "Playlist fetch incomplete, tallying partial result: {}",
            e
        );
    }

    let entries = tally_artists(
        fetched
            .items
            .iter()
            .filter_map(|item| item.track.as_ref())
            .flat_map(|track| track.artists.iter())
            .map(|artist| (artist.name.as_str(), artist.id.as_deref())),
    );

    tracing::info!(
        playlist_id,
        tracks = fetched.items.len(),
        artists = entries.len(),
        "Extracted playlist artists"
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_watch_list_maps_exclude() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input.json");
        fs::write(
            &path,
            r#"[
                {"name": "Beta", "value": {"id": "b", "count": 3, "exclude": true}},
                {"name": "Alpha", "value": {"id": "a", "count": 1, "exclude": false}},
                {"name": "Gamma", "value": {"id": "g"}}
            ]"#,
        )
        .unwrap();

        let entries = load_watch_list(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].artist_id, "b");
        assert!(!entries[0].include);
        assert_eq!(entries[1].display_name, "Alpha");
        assert!(entries[1].include);
        assert!(entries[2].include);
    }

    #[test]
    fn test_load_watch_list_errors() {
        let temp = TempDir::new().unwrap();

        let missing = temp.path().join("missing.json");
        assert!(matches!(
            load_watch_list(&missing),
            Err(WatchListError::Read { .. })
        ));

        let garbage = temp.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        assert!(matches!(
            load_watch_list(&garbage),
            Err(WatchListError::Parse { .. })
        ));
    }

    #[test]
    fn test_tally_orders_by_count_then_name() {
        let entries = tally_artists(vec![
            ("beta", Some("b1")),
            ("Alpha", Some("a1")),
            ("Beta", Some("B1")),
            ("beta", Some("b2")),
            ("Gamma", Some("g1")),
            ("Local Band", None),
            ("Gamma", Some("g1")),
        ]);

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["beta", "Gamma", "Alpha", "Beta"]);

        assert_eq!(entries[0].value.id, "b2");
        assert_eq!(entries[0].value.count, 2);
        assert!(entries.iter().all(|e| !e.value.exclude));
    }

    #[test]
    fn test_write_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("output.json");

        let entries = tally_artists(vec![("Alpha", Some("a1"))]);
        write_watch_list(&path, &entries).unwrap();

        let loaded = load_watch_list(&path).unwrap();
        assert_eq!(loaded, vec![ArtistWatchEntry::new("a1", "Alpha")]);
    }
}
