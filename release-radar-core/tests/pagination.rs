//! Integration tests for cursor pagination and the catalog calls built on it.

use std::sync::Arc;
use std::time::Duration;

use release_radar_core::{
    catalog::{CatalogClient, CatalogError, PLAYLIST_APPEND_BATCH, RELEASE_GROUPS},
    oauth::OAuthSettings,
    store::{MemoryStore, Secret},
    token_manager::DefaultTokenManager,
    watchlist::extract_artists,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string_contains, header, method, path, query_param},
};

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "svc-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> CatalogClient {
    let settings = OAuthSettings {
        client_id: "client".to_string(),
        client_secret: Secret::new("secret"),
        auth_url: "https://accounts.example.com/authorize".to_string(),
        token_url: format!("{}/api/token", server.uri()),
        redirect_uri: None,
        scopes: Vec::new(),
    };
    let tokens = Arc::new(DefaultTokenManager::new(MemoryStore::new(), settings));
    CatalogClient::new(format!("{}/v1", server.uri()), tokens, Duration::from_secs(5)).unwrap()
}

fn album(id: &str, date: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": format!("Album {}", id),
        "album_type": "album",
        "total_tracks": 8,
        "release_date": date,
        "release_date_precision": "day",
        "artists": [{ "id": "a1", "name": "Artist" }],
        "uri": format!("spotify:album:{}", id),
        "images": [],
        "external_urls": { "spotify": format!("https://open.spotify.com/album/{}", id) }
    })
}

fn page(items: Vec<serde_json::Value>, next: Option<String>) -> serde_json::Value {
    serde_json::json!({ "items": items, "next": next })
}

#[tokio::test]
async fn test_fetch_all_follows_next_cursor() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/artists/a1/albums"))
        .and(query_param("limit", "50"))
        .and(query_param("include_groups", RELEASE_GROUPS))
        .and(header("authorization", "Bearer svc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![album("R1", "2024-03-01"), album("R2", "2024-02-01")],
            Some(format!("{}/v1/cursor/2", server.uri())),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/cursor/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![album("R3", "2023-11-01")],
            Some(format!("{}/v1/cursor/3", server.uri())),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/cursor/3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![album("R4", "2022-01-01")], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).artist_releases("a1").await;

    assert!(result.is_complete());
    assert_eq!(result.pages, 3);
    let ids: Vec<_> = result.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["R1", "R2", "R3", "R4"]);

    // Cursor URLs are followed verbatim, without the initial parameters.
    let requests = server.received_requests().await.unwrap();
    let cursor_requests: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path().starts_with("/v1/cursor/"))
        .collect();
    assert_eq!(cursor_requests.len(), 2);
    assert!(cursor_requests.iter().all(|r| r.url.query().is_none()));
}

#[tokio::test]
async fn test_empty_next_ends_pagination() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/artists/a1/albums"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [album("R1", "2024-01-01")],
            "next": ""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).artist_releases("a1").await;
    assert!(result.is_complete());
    assert_eq!(result.items.len(), 1);
}

#[tokio::test]
async fn test_failure_mid_pagination_keeps_earlier_pages() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/artists/a1/albums"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![album("R1", "2024-03-01")],
            Some(format!("{}/v1/cursor/2", server.uri())),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/cursor/2"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/cursor/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
        .expect(0)
        .mount(&server)
        .await;

    let result = client(&server).artist_releases("a1").await;

    assert_eq!(result.pages, 1);
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id, "R1");
    match result.truncated_by {
        Some(CatalogError::Status { status, body, .. }) => {
            assert_eq!(status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_token_failure_yields_empty_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_client"
        })))
        .mount(&server)
        .await;

    let result = client(&server).artist_releases("a1").await;

    assert!(result.items.is_empty());
    assert_eq!(result.pages, 0);
    assert!(matches!(result.truncated_by, Some(CatalogError::Token(_))));
}

#[tokio::test]
async fn test_first_track_uri() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/R1/tracks"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{ "uri": "spotify:track:t1", "name": "Opener" }],
            "next": null
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/EMPTY/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client.first_track_uri("R1").await.unwrap().as_deref(),
        Some("spotify:track:t1")
    );
    assert_eq!(client.first_track_uri("EMPTY").await.unwrap(), None);
}

#[tokio::test]
async fn test_append_requires_user_credential() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/playlists/pl1/tracks"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = client(&server)
        .append_to_playlist("pl1", &["spotify:track:t1".to_string()])
        .await;
    assert!(matches!(result, Err(CatalogError::Token(_))));
}

#[tokio::test]
async fn test_append_batches_uris() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "user-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "user-refresh"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uris: Vec<String> = (0..PLAYLIST_APPEND_BATCH + 5)
        .map(|i| format!("spotify:track:{}", i))
        .collect();

    Mock::given(method("POST"))
        .and(path("/v1/playlists/pl1/tracks"))
        .and(header("authorization", "Bearer user-token"))
        .and(body_json(serde_json::json!({ "uris": &uris[..PLAYLIST_APPEND_BATCH] })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({ "snapshot_id": "s1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/playlists/pl1/tracks"))
        .and(body_json(serde_json::json!({ "uris": &uris[PLAYLIST_APPEND_BATCH..] })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({ "snapshot_id": "s2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let settings = OAuthSettings {
        client_id: "client".to_string(),
        client_secret: Secret::new("secret"),
        auth_url: "https://accounts.example.com/authorize".to_string(),
        token_url: format!("{}/api/token", server.uri()),
        redirect_uri: Some("http://localhost:8888/callback".to_string()),
        scopes: Vec::new(),
    };
    let tokens = Arc::new(DefaultTokenManager::new(MemoryStore::new(), settings));
    tokens.set_authorization_code("code").await;

    let client =
        CatalogClient::new(format!("{}/v1", server.uri()), tokens, Duration::from_secs(5)).unwrap();

    let appended = client.append_to_playlist("pl1", &uris).await.unwrap();
    assert_eq!(appended, PLAYLIST_APPEND_BATCH + 5);
}

#[tokio::test]
async fn test_extract_artists_from_playlist() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/playlists/pl1/tracks"))
        .and(query_param(
            "fields",
            "next,items.track.artists.name,items.track.artists.id",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                { "track": { "artists": [{ "id": "b", "name": "Beta" }, { "id": "a", "name": "Alpha" }] } },
                { "track": null },
                { "track": { "artists": [{ "id": "b", "name": "Beta" }] } }
            ],
            "next": format!("{}/v1/cursor/2", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/cursor/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{ "track": { "artists": [{ "id": "c", "name": "charlie" }] } }],
            "next": null
        })))
        .mount(&server)
        .await;

    let entries = extract_artists(&client(&server), "pl1").await.unwrap();

    let summary: Vec<_> = entries
        .iter()
        .map(|e| (e.name.as_str(), e.value.id.as_str(), e.value.count))
        .collect();
    assert_eq!(
        summary,
        vec![("Beta", "b", 2), ("Alpha", "a", 1), ("charlie", "c", 1)]
    );
}
