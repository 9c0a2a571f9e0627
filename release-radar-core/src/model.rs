//! Domain model types for Release Radar.
//!
//! This module defines the core types used throughout the crate:
//! - [`TokenScope`] - Which credential slot a call needs
//! - [`Release`] - A catalog release (album, single or compilation)
//! - [`ArtistRef`], [`Image`], [`ExternalUrls`] - Typed nested records of a release
//! - [`ArtistWatchEntry`] - One artist from the watch list
//! - [`StoredRelease`] - A release row as recorded by the release store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credential scope of an outbound catalog call.
///
/// The two scopes own independent token slots; a token minted for one is never
/// used for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    /// Client-credentials grant, no end user.
    Service,
    /// Authorization-code grant, tied to the one authorized user. Required for
    /// playlist mutation.
    User,
}

impl TokenScope {
    /// Get the scope as a string for log fields and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::User => "user",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release grouping as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumType {
    #[serde(alias = "ALBUM")]
    Album,
    #[serde(alias = "SINGLE")]
    Single,
    #[serde(alias = "COMPILATION")]
    Compilation,
    #[serde(other)]
    Other,
}

impl AlbumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Single => "single",
            Self::Compilation => "compilation",
            Self::Other => "other",
        }
    }
}

/// Precision of [`Release::release_date`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Year,
    Month,
    #[default]
    Day,
}

/// Artist as embedded in a release or track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Cover art image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Public links to a catalog object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify: Option<String>,
}

/// A catalog release.
///
/// Identity is [`id`](Release::id): two records with the same id are the same
/// release regardless of drift in the other fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub name: String,
    pub album_type: AlbumType,
    #[serde(default)]
    pub total_tracks: u32,
    /// ISO date, `YYYY`, `YYYY-MM` or `YYYY-MM-DD` depending on precision.
    pub release_date: String,
    #[serde(default)]
    pub release_date_precision: DatePrecision,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub uri: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_group: Option<String>,
}

impl Release {
    /// The four-digit year prefix of the release date, if well formed.
    pub fn year(&self) -> Option<&str> {
        let year = self.release_date.get(..4)?;
        year.bytes().all(|b| b.is_ascii_digit()).then_some(year)
    }

    /// Comma-separated artist names, in catalog order.
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Check the fields the release store relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("release id is empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("release name is empty".to_string());
        }
        if self.year().is_none() {
            return Err(format!(
                "release date '{}' does not start with a year",
                self.release_date
            ));
        }
        Ok(())
    }
}

/// A release as recorded by the release store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRelease {
    pub release: Release,
    pub recorded_at: DateTime<Utc>,
}

/// One watched artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistWatchEntry {
    pub artist_id: String,
    pub display_name: String,
    /// Whether the artist is polled. Excluded entries stay in the list so that
    /// re-running artist extraction does not silently re-enable them.
    pub include: bool,
}

impl ArtistWatchEntry {
    pub fn new(artist_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            artist_id: artist_id.into(),
            display_name: display_name.into(),
            include: true,
        }
    }
}
