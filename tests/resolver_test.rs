//! Playback source resolver tests
//!
//! Drives the full title -> episodes -> servers -> manifest cascade against
//! a mocked catalog service, covering terminal states, the per-episode
//! server cache, variant switching, and retry.

use mockito::{Matcher, Server, ServerGuard};

use aniplay::api::CatalogClient;
use aniplay::models::Variant;
use aniplay::playback::{
    FallbackPolicy, PlaybackSourceResolver, ResolveError, ResolvePhase, SelectionPolicy, Stage,
};

// =============================================================================
// Mock Response Fixtures
// =============================================================================

fn episodes_body() -> &'static str {
    r#"{
        "results": {
            "episodes": [
                {"id": "grand-line-saga-7?ep=1", "episode_no": 1, "title": "Dawn of the Adventure", "filler": false},
                {"id": "grand-line-saga-7?ep=2", "episode_no": 2, "title": "The Great Swordsman", "filler": false}
            ]
        }
    }"#
}

fn servers_body_full() -> &'static str {
    r#"{
        "results": [
            {"type": "sub", "server_id": 1, "serverName": "HD-2"},
            {"type": "sub", "server_id": 4, "serverName": "HD-1"},
            {"type": "dub", "server_id": 1, "serverName": "HD-2"}
        ]
    }"#
}

fn servers_body_sub_only() -> &'static str {
    r#"{
        "results": [
            {"type": "sub", "server_id": 4, "serverName": "HD-1"}
        ]
    }"#
}

fn stream_body(file: &str) -> String {
    format!(
        r#"{{
            "results": {{
                "streamingLink": {{
                    "link": {{"file": "{}", "type": "hls"}},
                    "tracks": [],
                    "intro": {{"start": 0, "end": 0}},
                    "outro": {{"start": 0, "end": 0}}
                }}
            }}
        }}"#,
        file
    )
}

fn resolver_against(server: &ServerGuard) -> PlaybackSourceResolver {
    PlaybackSourceResolver::new(
        CatalogClient::with_base_url(server.url()),
        SelectionPolicy::default(),
        Variant::Sub,
    )
}

/// Mock a stream manifest for one (episode, server, variant) request triple
async fn mock_stream(
    server: &mut ServerGuard,
    episode_id: &str,
    server_name: &str,
    variant: &str,
    hits: usize,
) -> mockito::Mock {
    server
        .mock("GET", "/api/stream")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("id".into(), episode_id.into()),
            Matcher::UrlEncoded("server".into(), server_name.into()),
            Matcher::UrlEncoded("type".into(), variant.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(stream_body(&format!(
            "https://cdn.example/{}/{}.m3u8",
            server_name, variant
        )))
        .expect(hits)
        .create_async()
        .await
}

// =============================================================================
// Cascade Tests
// =============================================================================

#[tokio::test]
async fn test_load_title_settles_ready() {
    let mut server = Server::new_async().await;

    let episodes = server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .expect(1)
        .create_async()
        .await;
    let servers = server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_full())
        .expect(1)
        .create_async()
        .await;
    let stream = mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-1", "sub", 1).await;

    let resolver = resolver_against(&server);
    let snapshot = resolver.load_title("grand-line-saga-7").await;

    episodes.assert_async().await;
    servers.assert_async().await;
    stream.assert_async().await;

    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert_eq!(snapshot.episodes.len(), 2);
    assert_eq!(snapshot.selected().unwrap().number, 1);

    // HD-1 is preferred over the first-listed HD-2
    let choice = snapshot.choice.as_ref().unwrap();
    assert_eq!(choice.server.name, "HD-1");
    assert_eq!(choice.index, 1);
    assert!(choice.matches_variant());

    let manifest = snapshot.manifest.as_ref().unwrap();
    assert_eq!(manifest.key.episode_id, "grand-line-saga-7?ep=1");
    assert_eq!(manifest.key.variant, Variant::Sub);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_empty_episode_list_is_terminal_ready() {
    let mut server = Server::new_async().await;

    let episodes = server
        .mock("GET", "/api/episodes/just-announced-99")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results": {"episodes": []}}"#)
        .expect(1)
        .create_async()
        .await;
    // Nothing downstream may be fetched
    let servers = server
        .mock("GET", Matcher::Regex("/api/servers/.*".into()))
        .with_status(200)
        .with_body(r#"{"results": []}"#)
        .expect(0)
        .create_async()
        .await;

    let resolver = resolver_against(&server);
    let snapshot = resolver.load_title("just-announced-99").await;

    episodes.assert_async().await;
    servers.assert_async().await;

    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert!(snapshot.is_empty());
    assert!(snapshot.manifest.is_none());
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_episode_fetch_failure_fails_with_stage() {
    let mut server = Server::new_async().await;

    let episodes = server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(500)
        .with_body("scraper exploded")
        .expect(1)
        .create_async()
        .await;

    let resolver = resolver_against(&server);
    let snapshot = resolver.load_title("grand-line-saga-7").await;

    episodes.assert_async().await;

    assert_eq!(snapshot.phase, ResolvePhase::Failed);
    let error = snapshot.error.as_ref().unwrap();
    assert_eq!(error.stage(), Stage::Episodes);
    assert!(matches!(
        **error,
        ResolveError::Network {
            stage: Stage::Episodes,
            ..
        }
    ));
}

// =============================================================================
// Server Cache Tests
// =============================================================================

#[tokio::test]
async fn test_server_lists_cached_per_episode() {
    let mut server = Server::new_async().await;

    let episodes = server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .expect(1)
        .create_async()
        .await;
    // Each episode's server list is fetched exactly once across the
    // whole episode round trip
    let servers_ep1 = server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_full())
        .expect(1)
        .create_async()
        .await;
    let servers_ep2 = server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_sub_only())
        .expect(1)
        .create_async()
        .await;
    let stream_ep1 = mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-1", "sub", 2).await;
    let stream_ep2 = mock_stream(&mut server, "grand-line-saga-7?ep=2", "HD-1", "sub", 1).await;

    let resolver = resolver_against(&server);
    resolver.load_title("grand-line-saga-7").await;

    let snapshot = resolver.select_episode("grand-line-saga-7?ep=2").await;
    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert_eq!(snapshot.selected().unwrap().number, 2);

    // Back to episode 1: the cached list skips straight to the manifest
    let snapshot = resolver.select_episode("grand-line-saga-7?ep=1").await;
    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert_eq!(
        snapshot.manifest.as_ref().unwrap().key.episode_id,
        "grand-line-saga-7?ep=1"
    );

    episodes.assert_async().await;
    servers_ep1.assert_async().await;
    servers_ep2.assert_async().await;
    stream_ep1.assert_async().await;
    stream_ep2.assert_async().await;
}

#[tokio::test]
async fn test_select_episode_unknown_id_is_ignored() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .create_async()
        .await;
    server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_full())
        .create_async()
        .await;
    mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-1", "sub", 1).await;

    let resolver = resolver_against(&server);
    resolver.load_title("grand-line-saga-7").await;

    let snapshot = resolver.select_episode("other-title-1?ep=9").await;

    // State is untouched
    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert_eq!(snapshot.selected().unwrap().number, 1);
    assert!(snapshot.manifest.is_some());
}

// =============================================================================
// Variant Switch Tests
// =============================================================================

#[tokio::test]
async fn test_set_variant_reuses_servers_and_keeps_name() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .create_async()
        .await;
    let servers = server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_full())
        .expect(1)
        .create_async()
        .await;
    let stream_hd1_sub = mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-1", "sub", 1).await;
    let stream_hd2_sub = mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-2", "sub", 1).await;
    let stream_hd2_dub = mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-2", "dub", 1).await;

    let resolver = resolver_against(&server);
    resolver.load_title("grand-line-saga-7").await;

    // Manual pick of HD-2 (index 0 in the fetched list)
    let snapshot = resolver.set_server_index(0).await;
    assert_eq!(snapshot.choice.as_ref().unwrap().server.name, "HD-2");

    // The dub switch keeps the HD-2 name and goes straight to the
    // manifest stage, no server refetch
    let snapshot = resolver.set_variant(Variant::Dub).await;
    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    let choice = snapshot.choice.as_ref().unwrap();
    assert_eq!(choice.server.name, "HD-2");
    assert_eq!(choice.server.variant, Variant::Dub);
    assert!(choice.matches_variant());
    assert_eq!(
        snapshot.manifest.as_ref().unwrap().key.variant,
        Variant::Dub
    );

    servers.assert_async().await;
    stream_hd1_sub.assert_async().await;
    stream_hd2_sub.assert_async().await;
    stream_hd2_dub.assert_async().await;
}

#[tokio::test]
async fn test_degraded_fallback_fetches_servers_own_variant() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .create_async()
        .await;
    server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_sub_only())
        .create_async()
        .await;
    // The manifest request carries type=sub, what HD-1 actually offers,
    // even though the user asked for dub
    let stream = mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-1", "sub", 1).await;

    let resolver = PlaybackSourceResolver::new(
        CatalogClient::with_base_url(server.url()),
        SelectionPolicy::default(),
        Variant::Dub,
    );
    let snapshot = resolver.load_title("grand-line-saga-7").await;

    stream.assert_async().await;

    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert_eq!(snapshot.variant, Variant::Dub);
    let choice = snapshot.choice.as_ref().unwrap();
    assert!(!choice.matches_variant());
    assert_eq!(choice.requested, Variant::Dub);
    assert_eq!(choice.server.variant, Variant::Sub);
    assert_eq!(
        snapshot.manifest.as_ref().unwrap().key.variant,
        Variant::Sub
    );
}

#[tokio::test]
async fn test_strict_policy_fails_without_variant() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .create_async()
        .await;
    server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_sub_only())
        .create_async()
        .await;
    let stream = server
        .mock("GET", "/api/stream")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(stream_body("https://cdn.example/never.m3u8"))
        .expect(0)
        .create_async()
        .await;

    let strict = SelectionPolicy {
        fallback: FallbackPolicy::Strict,
        ..SelectionPolicy::default()
    };
    let resolver = PlaybackSourceResolver::new(
        CatalogClient::with_base_url(server.url()),
        strict,
        Variant::Dub,
    );
    let snapshot = resolver.load_title("grand-line-saga-7").await;

    stream.assert_async().await;

    assert_eq!(snapshot.phase, ResolvePhase::Failed);
    assert!(matches!(
        **snapshot.error.as_ref().unwrap(),
        ResolveError::NoServers {
            variant: Variant::Dub
        }
    ));
}

// =============================================================================
// Retry Tests
// =============================================================================

#[tokio::test]
async fn test_retry_refetches_only_the_failed_stage() {
    let mut server = Server::new_async().await;

    let episodes = server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .expect(1)
        .create_async()
        .await;
    let servers = server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_full())
        .expect(1)
        .create_async()
        .await;
    let stream_down = server
        .mock("GET", "/api/stream")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("transient")
        .expect(1)
        .create_async()
        .await;

    let resolver = resolver_against(&server);
    let snapshot = resolver.load_title("grand-line-saga-7").await;

    assert_eq!(snapshot.phase, ResolvePhase::Failed);
    assert_eq!(snapshot.error.as_ref().unwrap().stage(), Stage::Manifest);

    // Service recovers; later mocks take precedence in mockito
    let stream_up = mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-1", "sub", 1).await;

    let snapshot = resolver.retry().await;

    episodes.assert_async().await;
    servers.assert_async().await;
    stream_down.assert_async().await;
    stream_up.assert_async().await;

    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert!(snapshot.error.is_none());
    assert!(snapshot.manifest.is_some());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test]
async fn test_concurrent_loads_settle_consistently() {
    let mut server = Server::new_async().await;

    // Two complete chains; whichever load begins last wins, and the
    // loser's completions must never leak into the final state
    server
        .mock("GET", "/api/episodes/grand-line-saga-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(episodes_body())
        .create_async()
        .await;
    server
        .mock("GET", "/api/servers/grand-line-saga-7%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_full())
        .create_async()
        .await;
    mock_stream(&mut server, "grand-line-saga-7?ep=1", "HD-1", "sub", 1).await;

    server
        .mock("GET", "/api/episodes/titan-fall-112")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"results": {"episodes": [
                {"id": "titan-fall-112?ep=1", "episode_no": 1, "title": "To You, in 2000 Years", "filler": false}
            ]}}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/servers/titan-fall-112%3Fep%3D1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(servers_body_sub_only())
        .create_async()
        .await;
    mock_stream(&mut server, "titan-fall-112?ep=1", "HD-1", "sub", 1).await;

    let resolver = resolver_against(&server);
    let loads = vec![
        resolver.load_title("grand-line-saga-7"),
        resolver.load_title("titan-fall-112"),
    ];
    futures::future::join_all(loads).await;

    let snapshot = resolver.snapshot();
    assert_eq!(snapshot.phase, ResolvePhase::Ready);
    assert!(!snapshot.episodes.is_empty());

    // Manifest and selection belong to the same title's episode list
    let selected = snapshot.selected().expect("an episode is selected");
    let manifest = snapshot.manifest.as_ref().expect("a manifest is published");
    assert_eq!(manifest.key.episode_id, selected.id);
}
