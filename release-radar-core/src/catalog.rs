//! Catalog API client and cursor pagination.
//!
//! Every request obtains its bearer token from the [`TokenManager`] right
//! before it is sent, so a token that lapses halfway through a long
//! pagination is refreshed transparently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::{Release, TokenScope};
use crate::token::{TokenError, TokenManager};

/// Release groups requested for each watched artist.
pub const RELEASE_GROUPS: &str = "album,single,compilation";

/// Page size requested from collection endpoints.
pub const PAGE_LIMIT: u32 = 50;

/// Maximum number of URIs the playlist append endpoint accepts per request.
pub const PLAYLIST_APPEND_BATCH: usize = 100;

/// Error type for catalog calls.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No token could be obtained for the call.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// A configured or returned URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Absolute URL of the next page; absent or empty on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

/// Items accumulated by [`CatalogClient::fetch_all`].
///
/// A request failure ends the traversal early; the items of the pages fetched
/// before it are kept and the failure is carried in `truncated_by`.
#[derive(Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pages: usize,
    pub truncated_by: Option<CatalogError>,
}

impl<T> Paginated<T> {
    /// Whether every page up to the final cursor was fetched.
    pub fn is_complete(&self) -> bool {
        self.truncated_by.is_none()
    }
}

/// A playlist entry, reduced to what artist extraction needs.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    /// Null for tracks that were removed from the catalog.
    #[serde(default)]
    pub track: Option<PlaylistTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrack {
    #[serde(default)]
    pub artists: Vec<TrackArtist>,
}

/// Artist of a playlist track. Local files have no catalog id.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackArtist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct AlbumTrack {
    uri: String,
}

#[derive(Debug, Serialize)]
struct AppendRequest<'a> {
    uris: &'a [String],
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    snapshot_id: Option<String>,
}

/// The catalog calls the sync pipeline makes.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Every release of an artist, as far as pagination got.
    async fn artist_releases(&self, artist_id: &str) -> Paginated<Release>;

    /// URI of the first track of an album.
    async fn first_track_uri(&self, album_id: &str) -> Result<Option<String>, CatalogError>;

    /// Append URIs to a playlist, returning how many were appended.
    async fn append_to_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<usize, CatalogError>;
}

/// HTTP client for the music catalog API.
pub struct CatalogClient {
    http: reqwest::Client,
    api_base: String,
    tokens: Arc<dyn TokenManager>,
}

impl CatalogClient {
    /// Create a client for the API rooted at `api_base`
    /// (e.g. `https://api.spotify.com/v1`).
    pub fn new(
        api_base: impl Into<String>,
        tokens: Arc<dyn TokenManager>,
        request_timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let api_base = api_base.into();
        Url::parse(&api_base)?;

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| CatalogError::Transport {
                url: api_base.clone(),
                source,
            })?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        Ok(Url::parse(&format!("{}/{}", self.api_base, path))?)
    }

    /// Fetch every page of a collection.
    ///
    /// The first request goes to `initial_url` with `query`; each following
    /// request goes to the bare `next` URL of the previous page with no
    /// parameters re-applied. Stops when `next` is absent or empty, or at the
    /// first failed request.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        scope: TokenScope,
        initial_url: Url,
        query: &[(&str, String)],
    ) -> Paginated<T> {
        let mut url = initial_url;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        let mut items = Vec::new();
        let mut pages = 0;

        loop {
            let page: Page<T> = match self.get_json(scope, url.clone()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        %url,
                        pages,
                        "Pagination stopped early, keeping {} items: {}",
                        items.len(),
                        e
                    );
                    return Paginated {
                        items,
                        pages,
                        truncated_by: Some(e),
                    };
                }
            };

            pages += 1;
            items.extend(page.items);

            match page.next.filter(|next| !next.is_empty()) {
                Some(next) => match Url::parse(&next) {
                    Ok(next_url) => url = next_url,
                    Err(e) => {
                        tracing::warn!("Unparseable next cursor {:?}: {}", next, e);
                        return Paginated {
                            items,
                            pages,
                            truncated_by: Some(e.into()),
                        };
                    }
                },
                None => break,
            }
        }

        tracing::debug!(pages, items = items.len(), "Pagination complete");
        Paginated {
            items,
            pages,
            truncated_by: None,
        }
    }

    /// All albums, singles and compilations of an artist.
    pub async fn artist_releases(&self, artist_id: &str) -> Paginated<Release> {
        let url = match self.endpoint(&format!("artists/{}/albums", artist_id)) {
            Ok(url) => url,
            Err(e) => {
                return Paginated {
                    items: Vec::new(),
                    pages: 0,
                    truncated_by: Some(e),
                };
            }
        };

        self.fetch_all(
            TokenScope::Service,
            url,
            &[
                ("limit", PAGE_LIMIT.to_string()),
                ("include_groups", RELEASE_GROUPS.to_string()),
            ],
        )
        .await
    }

    /// All entries of a playlist, with only the track artists requested.
    pub async fn playlist_tracks(&self, playlist_id: &str) -> Paginated<PlaylistItem> {
        let url = match self.endpoint(&format!("playlists/{}/tracks", playlist_id)) {
            Ok(url) => url,
            Err(e) => {
                return Paginated {
                    items: Vec::new(),
                    pages: 0,
                    truncated_by: Some(e),
                };
            }
        };

        self.fetch_all(
            TokenScope::Service,
            url,
            &[(
                "fields",
                "next,items.track.artists.name,items.track.artists.id".to_string(),
            )],
        )
        .await
    }

    /// URI of the first track of an album, `None` if the album is empty.
    pub async fn first_track_uri(&self, album_id: &str) -> Result<Option<String>, CatalogError> {
        let mut url = self.endpoint(&format!("albums/{}/tracks", album_id))?;
        url.query_pairs_mut().append_pair("limit", "1");

        let page: Page<AlbumTrack> = self.get_json(TokenScope::Service, url).await?;
        Ok(page.items.into_iter().next().map(|track| track.uri))
    }

    /// Append track URIs to a playlist, in order, in batches the API accepts.
    ///
    /// Returns the number of URIs appended. A failed batch stops the append;
    /// earlier batches stay applied.
    pub async fn append_to_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<usize, CatalogError> {
        let url = self.endpoint(&format!("playlists/{}/tracks", playlist_id))?;
        let mut appended = 0;

        for batch in uris.chunks(PLAYLIST_APPEND_BATCH) {
            let token = self.tokens.ensure_access_token(TokenScope::User).await?;

            let response = self
                .http
                .post(url.clone())
                .header(AUTHORIZATION, token.bearer())
                .json(&AppendRequest { uris: batch })
                .send()
                .await
                .map_err(|source| CatalogError::Transport {
                    url: url.to_string(),
                    source,
                })?;

            let body: AppendResponse = Self::decode(&url, response).await?;
            appended += batch.len();
            tracing::debug!(
                playlist_id,
                batch = batch.len(),
                snapshot = ?body.snapshot_id,
                "Appended batch to playlist"
            );
        }

        Ok(appended)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        scope: TokenScope,
        url: Url,
    ) -> Result<T, CatalogError> {
        let token = self.tokens.ensure_access_token(scope).await?;

        let response = self
            .http
            .get(url.clone())
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await
            .map_err(|source| CatalogError::Transport {
                url: url.to_string(),
                source,
            })?;

        Self::decode(&url, response).await
    }

    async fn decode<T: DeserializeOwned>(
        url: &Url,
        response: reqwest::Response,
    ) -> Result<T, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| CatalogError::Transport {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&bytes).map_err(|e| CatalogError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn artist_releases(&self, artist_id: &str) -> Paginated<Release> {
        CatalogClient::artist_releases(self, artist_id).await
    }

    async fn first_track_uri(&self, album_id: &str) -> Result<Option<String>, CatalogError> {
        CatalogClient::first_track_uri(self, album_id).await
    }

    async fn append_to_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<usize, CatalogError> {
        CatalogClient::append_to_playlist(self, playlist_id, uris).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page: Page<serde_json::Value> = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next.is_none());

        let page: Page<serde_json::Value> =
            serde_json::from_str(r#"{"items": [1, 2], "next": null}"#).unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn test_playlist_item_with_removed_track() {
        let page: Page<PlaylistItem> = serde_json::from_str(
            r#"{"items": [{"track": null}, {"track": {"artists": [{"id": null, "name": "Local"}]}}]}"#,
        )
        .unwrap();

        assert!(page.items[0].track.is_none());
        let artist = &page.items[1].track.as_ref().unwrap().artists[0];
        assert!(artist.id.is_none());
        assert_eq!(artist.name, "Local");
    }
}
