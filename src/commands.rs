//! CLI Command Handlers
//!
//! Implements all CLI commands by calling the catalog client and the
//! playback stack. Each handler takes CLI args and Output, returns ExitCode.

use serde::Serialize;

use crate::api::{CatalogClient, CatalogError};
use crate::cli::{
    validate_episode_id, validate_title_id, EpisodesCmd, ExitCode, InfoCmd, ManifestCmd, Output,
    PlayCmd, ResolveCmd, ServersCmd, SubtitlesCmd, TopCmd, TopWindow,
};
use crate::config::Config;
use crate::models::{Server, SubtitleTrack, TimeRange, Variant};
use crate::playback::controller::PlaybackController;
use crate::playback::pipeline::{DecoderCapabilities, PipelineError};
use crate::playback::resolver::{PlaybackSourceResolver, ResolveError, ResolverSnapshot};
use crate::playback::player::{LocalPlayer, PlayOptions};
use crate::playback::selector::{FallbackPolicy, SelectionPolicy};

// =============================================================================
// Shared helpers
// =============================================================================

/// Build the catalog client from the CLI override or the config file
fn catalog_client(base_url: Option<&str>, config: &Config) -> CatalogClient {
    match base_url {
        Some(url) => CatalogClient::with_base_url(url),
        None => CatalogClient::with_base_url(config.base_url()),
    }
}

fn catalog_exit_code(err: &CatalogError) -> ExitCode {
    match err {
        CatalogError::NotFound => ExitCode::NotFound,
        CatalogError::MissingData(_) => ExitCode::NoStreams,
        _ => ExitCode::NetworkError,
    }
}

fn resolve_exit_code(err: &ResolveError) -> ExitCode {
    match err {
        ResolveError::Network { source, .. } => catalog_exit_code(source),
        ResolveError::NoServers { .. } | ResolveError::EmptyManifest { .. } => ExitCode::NoStreams,
    }
}

fn pipeline_exit_code(err: &PipelineError) -> ExitCode {
    match err {
        PipelineError::UnsupportedMedia { .. } => ExitCode::Unsupported,
        PipelineError::Playlist(_) => ExitCode::PlaybackFailed,
    }
}

/// Selection policy assembled from config plus command-line overrides
fn selection_policy(config: &Config, server: Option<&str>, strict: bool) -> SelectionPolicy {
    let mut policy = config.selection_policy();
    if let Some(name) = server {
        policy.preferred_server = name.to_string();
    }
    if strict {
        policy.fallback = FallbackPolicy::Strict;
    }
    policy
}

fn find_episode_id(snapshot: &ResolverSnapshot, number: u32) -> Option<String> {
    snapshot
        .episodes
        .iter()
        .find(|e| e.number == number)
        .map(|e| e.id.clone())
}

// =============================================================================
// Top Command
// =============================================================================

pub async fn top_cmd(cmd: TopCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    let config = Config::load();
    let client = catalog_client(base_url, &config);

    let window_str = match cmd.window {
        TopWindow::Today => "today",
        TopWindow::Week => "week",
        TopWindow::Month => "month",
    };
    output.info(format!("Fetching top titles ({})...", window_str));

    match client.top_titles().await {
        Ok(top) => {
            let mut titles = match cmd.window {
                TopWindow::Today => top.today,
                TopWindow::Week => top.weekly,
                TopWindow::Month => top.monthly,
            };
            titles.truncate(cmd.limit);

            if let Err(e) = output.print(&titles) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Top titles fetch failed: {}", e), catalog_exit_code(&e)),
    }
}

// =============================================================================
// Info Command
// =============================================================================

pub async fn info_cmd(cmd: InfoCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    if let Err(msg) = validate_title_id(&cmd.title_id) {
        return output.error(msg, ExitCode::InvalidArgs);
    }

    let config = Config::load();
    let client = catalog_client(base_url, &config);

    output.info(format!("Getting info for: {}", cmd.title_id));

    match client.title_info(&cmd.title_id).await {
        Ok(info) => {
            if let Err(e) = output.print(&info) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Info fetch failed: {}", e), catalog_exit_code(&e)),
    }
}

// =============================================================================
// Episodes Command
// =============================================================================

pub async fn episodes_cmd(cmd: EpisodesCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    if let Err(msg) = validate_title_id(&cmd.title_id) {
        return output.error(msg, ExitCode::InvalidArgs);
    }

    let config = Config::load();
    let client = catalog_client(base_url, &config);

    output.info(format!("Listing episodes of: {}", cmd.title_id));

    match client.episodes(&cmd.title_id).await {
        Ok(mut episodes) => {
            if cmd.no_filler {
                episodes.retain(|e| !e.filler);
            }
            if episodes.is_empty() {
                output.info("No episodes available");
            }
            if let Err(e) = output.print(&episodes) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Episode fetch failed: {}", e), catalog_exit_code(&e)),
    }
}

// =============================================================================
// Servers Command
// =============================================================================

#[derive(Serialize)]
struct IndexedServer {
    index: usize,
    #[serde(flatten)]
    server: Server,
}

pub async fn servers_cmd(cmd: ServersCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    if let Err(msg) = validate_episode_id(&cmd.episode_id) {
        return output.error(msg, ExitCode::InvalidArgs);
    }

    let config = Config::load();
    let client = catalog_client(base_url, &config);

    output.info(format!("Listing servers for: {}", cmd.episode_id));

    match client.servers(&cmd.episode_id).await {
        Ok(servers) => {
            // Indexes refer to the unfiltered list, matching `resolve`
            let indexed: Vec<IndexedServer> = servers
                .into_iter()
                .enumerate()
                .map(|(index, server)| IndexedServer { index, server })
                .filter(|s| match cmd.variant {
                    Some(v) => s.server.variant == Variant::from(v),
                    None => true,
                })
                .collect();

            if indexed.is_empty() {
                return output.error("No servers available", ExitCode::NoStreams);
            }
            if let Err(e) = output.print(&indexed) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Server fetch failed: {}", e), catalog_exit_code(&e)),
    }
}

// =============================================================================
// Manifest Command
// =============================================================================

pub async fn manifest_cmd(cmd: ManifestCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    if let Err(msg) = validate_episode_id(&cmd.episode_id) {
        return output.error(msg, ExitCode::InvalidArgs);
    }

    let config = Config::load();
    let client = catalog_client(base_url, &config);
    let server = cmd
        .server
        .unwrap_or_else(|| config.selection_policy().preferred_server);
    let variant = cmd.variant.map(Variant::from).unwrap_or_else(|| config.variant());

    output.info(format!(
        "Fetching manifest: {} via {} ({})",
        cmd.episode_id, server, variant
    ));

    match client.stream_manifest(&cmd.episode_id, &server, variant).await {
        Ok(manifest) => {
            if let Err(e) = output.print(&manifest) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Manifest fetch failed: {}", e), catalog_exit_code(&e)),
    }
}

// =============================================================================
// Resolve Command
// =============================================================================

/// What the cascade settled on, in scripting-friendly form
#[derive(Serialize)]
struct ResolveReport {
    title_id: String,
    episode_id: String,
    episode_number: u32,
    server: String,
    variant: Variant,
    degraded: bool,
    url: String,
    kind: &'static str,
    intro: TimeRange,
    outro: TimeRange,
    subtitle_tracks: usize,
}

pub async fn resolve_cmd(cmd: ResolveCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    if let Err(msg) = validate_title_id(&cmd.title_id) {
        return output.error(msg, ExitCode::InvalidArgs);
    }

    let config = Config::load();
    let client = catalog_client(base_url, &config);
    let policy = selection_policy(&config, cmd.server.as_deref(), cmd.strict);
    let variant = cmd.variant.map(Variant::from).unwrap_or_else(|| config.variant());

    output.info(format!("Resolving {} ({})...", cmd.title_id, variant));

    let resolver = PlaybackSourceResolver::new(client, policy, variant);
    let mut snapshot = resolver.load_title(&cmd.title_id).await;

    if let Some(number) = cmd.episode {
        match find_episode_id(&snapshot, number) {
            Some(episode_id) => {
                snapshot = resolver.select_episode(&episode_id).await;
            }
            None => {
                if snapshot.error.is_none() {
                    return output.error(
                        format!("Episode {} not found", number),
                        ExitCode::NotFound,
                    );
                }
            }
        }
    }

    report_snapshot(&cmd.title_id, &snapshot, output)
}

/// Turn a settled snapshot into output and an exit code
fn report_snapshot(title_id: &str, snapshot: &ResolverSnapshot, output: &Output) -> ExitCode {
    if let Some(error) = &snapshot.error {
        return output.error(error.to_string(), resolve_exit_code(error));
    }
    if snapshot.is_empty() {
        return output.error("Title has no episodes", ExitCode::NoStreams);
    }
    let (Some(manifest), Some(choice), Some(episode)) =
        (&snapshot.manifest, &snapshot.choice, snapshot.selected())
    else {
        return output.error("Resolution did not settle", ExitCode::Error);
    };

    if !choice.matches_variant() {
        output.info(format!(
            "No {} server available, falling back to {} ({})",
            choice.requested, choice.server.name, choice.server.variant
        ));
    }

    let report = ResolveReport {
        title_id: title_id.to_string(),
        episode_id: episode.id.clone(),
        episode_number: episode.number,
        server: choice.server.name.clone(),
        variant: choice.server.variant,
        degraded: !choice.matches_variant(),
        url: manifest.source.url().to_string(),
        kind: if manifest.source.is_playlist() {
            "playlist"
        } else {
            "progressive"
        },
        intro: manifest.intro,
        outro: manifest.outro,
        subtitle_tracks: manifest.caption_tracks().count(),
    };

    if let Err(e) = output.print(&report) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

// =============================================================================
// Subtitles Command
// =============================================================================

#[derive(Serialize)]
struct IndexedTrack {
    index: usize,
    #[serde(flatten)]
    track: SubtitleTrack,
}

#[derive(Serialize)]
struct TrackPayload {
    label: String,
    file: String,
    payload: String,
}

pub async fn subtitles_cmd(cmd: SubtitlesCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    if let Err(msg) = validate_episode_id(&cmd.episode_id) {
        return output.error(msg, ExitCode::InvalidArgs);
    }

    let config = Config::load();
    let client = catalog_client(base_url, &config);
    let server = cmd
        .server
        .clone()
        .unwrap_or_else(|| config.selection_policy().preferred_server);
    let variant = cmd.variant.map(Variant::from).unwrap_or_else(|| config.variant());

    output.info(format!("Fetching subtitle tracks for: {}", cmd.episode_id));

    let manifest = match client.stream_manifest(&cmd.episode_id, &server, variant).await {
        Ok(m) => m,
        Err(e) => {
            return output.error(format!("Manifest fetch failed: {}", e), catalog_exit_code(&e))
        }
    };

    let tracks: Vec<&SubtitleTrack> = manifest.caption_tracks().collect();
    if tracks.is_empty() {
        return output.error("No subtitle tracks available", ExitCode::NoStreams);
    }

    match cmd.index {
        Some(index) => {
            let Some(track) = tracks.get(index) else {
                return output.error(
                    format!("Track index {} out of range (0-{})", index, tracks.len() - 1),
                    ExitCode::InvalidArgs,
                );
            };
            match client.subtitle_payload(&track.file).await {
                Ok(payload) => {
                    if output.json {
                        let response = TrackPayload {
                            label: track.display_label().to_string(),
                            file: track.file.clone(),
                            payload,
                        };
                        if let Err(e) = output.print(&response) {
                            return output
                                .error(format!("Failed to serialize: {}", e), ExitCode::Error);
                        }
                    } else {
                        println!("{}", payload);
                    }
                    ExitCode::Success
                }
                Err(e) => {
                    output.error(format!("Subtitle fetch failed: {}", e), catalog_exit_code(&e))
                }
            }
        }
        None => {
            let indexed: Vec<IndexedTrack> = tracks
                .into_iter()
                .enumerate()
                .map(|(index, track)| IndexedTrack {
                    index,
                    track: track.clone(),
                })
                .collect();
            if let Err(e) = output.print(&indexed) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
    }
}

// =============================================================================
// Play Command
// =============================================================================

pub async fn play_cmd(cmd: PlayCmd, base_url: Option<&str>, output: &Output) -> ExitCode {
    if let Err(msg) = validate_title_id(&cmd.title_id) {
        return output.error(msg, ExitCode::InvalidArgs);
    }
    let start = match cmd.start_offset() {
        Ok(start) => start,
        Err(msg) => return output.error(msg, ExitCode::InvalidArgs),
    };

    let config = Config::load();
    let client = catalog_client(base_url, &config);
    let policy = selection_policy(&config, cmd.server.as_deref(), false);
    let variant = cmd.variant.map(Variant::from).unwrap_or_else(|| config.variant());

    // Find a player first; its capabilities decide the decoding path
    let preferred = cmd.player.as_deref().or(config.player.as_deref());
    let Some(player) = LocalPlayer::detect(preferred).await else {
        return output.error(
            "No supported player found (mpv, vlc, iina). Install one first.",
            ExitCode::PlaybackFailed,
        );
    };
    let capabilities = DecoderCapabilities::with_native_hls(player.kind().supports_native_hls());

    output.info(format!("Resolving {} ({})...", cmd.title_id, variant));

    let mut controller = PlaybackController::new(client, policy, variant, capabilities);
    let mut snapshot = match controller.load_title(&cmd.title_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => return output.error(format!("Playback setup failed: {}", e), pipeline_exit_code(&e)),
    };

    if let Some(number) = cmd.episode {
        match find_episode_id(&snapshot, number) {
            Some(episode_id) => {
                snapshot = match controller.select_episode(&episode_id).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        return output
                            .error(format!("Playback setup failed: {}", e), pipeline_exit_code(&e))
                    }
                };
            }
            None => {
                if snapshot.error.is_none() {
                    return output.error(
                        format!("Episode {} not found", number),
                        ExitCode::NotFound,
                    );
                }
            }
        }
    }

    if let Some(error) = &snapshot.error {
        return output.error(error.to_string(), resolve_exit_code(error));
    }
    if snapshot.is_empty() {
        return output.error("Title has no episodes", ExitCode::NoStreams);
    }
    let Some(session) = controller.pipeline().session() else {
        return output.error("Resolution did not settle", ExitCode::Error);
    };

    let choice = snapshot.choice.as_ref();
    if let Some(choice) = choice {
        if !choice.matches_variant() {
            output.info(format!(
                "No {} server available, falling back to {} ({})",
                choice.requested, choice.server.name, choice.server.variant
            ));
        }
    }

    // Default caption track travels along unless suppressed
    let subtitle_url = if cmd.no_subtitle {
        None
    } else {
        session
            .active_track()
            .and_then(|i| session.tracks().get(i))
            .map(|t| t.file.clone())
    };
    let title = snapshot
        .selected()
        .map(|e| format!("{} - {}", cmd.title_id, e))
        .unwrap_or_else(|| cmd.title_id.clone());

    let options = PlayOptions {
        subtitle_url,
        start,
        title: Some(title),
    };
    let stream_url = session.binding().media_url().to_string();

    output.info(format!("Opening in {}...", player.kind()));

    match player.play(&stream_url, &options).await {
        Ok(_child) => {
            #[derive(Serialize)]
            struct PlayResponse {
                status: &'static str,
                player: String,
                url: String,
                episode_id: String,
                server: String,
                variant: Variant,
            }

            let response = PlayResponse {
                status: "playing",
                player: player.kind().to_string(),
                url: stream_url,
                episode_id: snapshot.selected().map(|e| e.id.clone()).unwrap_or_default(),
                server: choice.map(|c| c.server.name.clone()).unwrap_or_default(),
                variant: choice.map(|c| c.server.variant).unwrap_or(variant),
            };

            if let Err(e) = output.print(&response) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Failed to start player: {}", e), ExitCode::PlaybackFailed),
    }
}
