//! Human-readable digest of newly found releases.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::Release;

/// File name of the rendered digest inside the output directory.
pub const DIGEST_FILE_NAME: &str = "out.md";

/// Error type for digest rendering.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("failed to write digest {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to format digest: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Renders the digest of a run's new releases.
pub trait DigestRenderer: Send + Sync {
    /// Render `releases` and return where the digest was written.
    fn render(
        &self,
        releases: &[Release],
        generated_at: DateTime<Utc>,
    ) -> Result<PathBuf, DigestError>;
}

/// Plain Markdown list written to `{output_dir}/out.md`.
///
/// Each run overwrites the previous digest.
#[derive(Debug, Clone)]
pub struct MarkdownDigest {
    output_dir: PathBuf,
}

impl MarkdownDigest {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Render the Markdown text without writing it.
    pub fn to_markdown(
        releases: &[Release],
        generated_at: DateTime<Utc>,
    ) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        writeln!(out, "# New releases, {}", generated_at.format("%Y-%m-%d"))?;
        writeln!(out)?;

        for release in releases {
            write!(
                out,
                "- **{}** by {} ({}, {})",
                release.name,
                release.artist_names(),
                release.album_type.as_str(),
                release.release_date
            )?;
            if let Some(link) = &release.external_urls.spotify {
                write!(out, " [link]({})", link)?;
            }
            writeln!(out)?;
        }

        Ok(out)
    }
}

impl DigestRenderer for MarkdownDigest {
    fn render(
        &self,
        releases: &[Release],
        generated_at: DateTime<Utc>,
    ) -> Result<PathBuf, DigestError> {
        let contents = Self::to_markdown(releases, generated_at)?;
        let path = self.output_dir.join(DIGEST_FILE_NAME);

        fs::create_dir_all(&self.output_dir)
            .and_then(|_| fs::write(&path, contents))
            .map_err(|source| DigestError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::info!("Wrote digest of {} releases to {:?}", releases.len(), path);
        Ok(path)
    }
}
