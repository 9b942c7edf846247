//! Content service API client
//!
//! Read-only accessor over the remote catalog: top titles, title info,
//! episode lists, server lists, stream manifests, subtitle payloads.
//! Every response arrives wrapped in a `{"results": ...}` envelope.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    Episode, ManifestKey, MediaSource, Server, StreamManifest, SubtitleTrack, TimeRange,
    TitleInfo, TitleSummary, TopTitles, Variant,
};

/// Default service endpoint (self-hosted scraper API)
pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// Content service error types
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Resource not found (404)")]
    NotFound,

    #[error("Rate limited (429){}", .retry_after.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Response contained no {0}")]
    MissingData(&'static str),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

impl CatalogError {
    /// True when the fetch succeeded but carried no usable data
    pub fn is_empty_data(&self) -> bool {
        matches!(self, CatalogError::MissingData(_))
    }
}

/// Content service API client
pub struct CatalogClient {
    base_url: String,
    client: reqwest::Client,
}

impl CatalogClient {
    /// Create a client against the default service endpoint
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (config override, tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// GET an endpoint and unwrap the `results` envelope
    async fn get_results<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
    ) -> Result<T, CatalogError> {
        let body = self.get_text(endpoint).await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| CatalogError::InvalidResponse(format!("JSON parse error: {}", e)))?;
        Ok(envelope.results)
    }

    /// GET an endpoint as raw text
    async fn get_text(&self, endpoint: &str) -> Result<String, CatalogError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.text().await?),
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => {
                // Surfaced immediately; the resolver never retries on its own
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                Err(CatalogError::RateLimited { retry_after })
            }
            status => Err(CatalogError::ServerError(status.as_u16())),
        }
    }

    /// Ranked top titles for the three listing windows
    pub async fn top_titles(&self) -> Result<TopTitles, CatalogError> {
        let response: TopTitlesRaw = self.get_results("/api/top-ten").await?;
        Ok(response.into_top_titles())
    }

    /// Full metadata for one title
    pub async fn title_info(&self, title_id: &str) -> Result<TitleInfo, CatalogError> {
        let endpoint = format!("/api/info?id={}", urlencoding::encode(title_id));
        let response: TitleInfoEnvelopeRaw = self.get_results(&endpoint).await?;
        response
            .data
            .map(|raw| raw.into_info(title_id))
            .ok_or(CatalogError::MissingData("title data"))
    }

    /// Ordered episode sequence for a title
    pub async fn episodes(&self, title_id: &str) -> Result<Vec<Episode>, CatalogError> {
        let endpoint = format!("/api/episodes/{}", urlencoding::encode(title_id));
        let response: EpisodesRaw = self.get_results(&endpoint).await?;
        Ok(response.into_episodes())
    }

    /// Servers offering an episode, in service order
    ///
    /// Entries with an unrecognized variant tag are dropped; the relative
    /// order of the remaining entries is preserved.
    pub async fn servers(&self, episode_id: &str) -> Result<Vec<Server>, CatalogError> {
        let endpoint = format!("/api/servers/{}", urlencoding::encode(episode_id));
        let response: Vec<ServerRaw> = self.get_results(&endpoint).await?;
        Ok(response
            .into_iter()
            .filter_map(|raw| raw.into_server())
            .collect())
    }

    /// Stream manifest for one (episode, server, variant) triple
    ///
    /// The returned manifest is keyed by the request triple, not by
    /// whatever the service echoes back.
    pub async fn stream_manifest(
        &self,
        episode_id: &str,
        server_name: &str,
        variant: Variant,
    ) -> Result<StreamManifest, CatalogError> {
        let endpoint = format!(
            "/api/stream?id={}&server={}&type={}",
            urlencoding::encode(episode_id),
            urlencoding::encode(server_name),
            variant
        );
        let response: StreamRaw = self.get_results(&endpoint).await?;
        let link = response
            .streaming_link
            .ok_or(CatalogError::MissingData("streamingLink"))?;

        let key = ManifestKey {
            episode_id: episode_id.to_string(),
            server_name: server_name.to_string(),
            variant,
        };
        link.into_manifest(key)
            .ok_or(CatalogError::MissingData("stream link file"))
    }

    /// Caption file content for a manifest track, through the service proxy
    pub async fn subtitle_payload(&self, track_url: &str) -> Result<String, CatalogError> {
        let endpoint = format!("/api/subtitles?id={}", urlencoding::encode(track_url));
        self.get_text(&endpoint).await
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Response Structures (internal deserialization)
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    results: T,
}

#[derive(Debug, Deserialize)]
struct TopTitlesRaw {
    #[serde(default)]
    today: Vec<TitleSummaryRaw>,
    #[serde(default)]
    weekly: Vec<TitleSummaryRaw>,
    #[serde(default)]
    monthly: Vec<TitleSummaryRaw>,
}

impl TopTitlesRaw {
    fn into_top_titles(self) -> TopTitles {
        let convert = |entries: Vec<TitleSummaryRaw>| {
            entries.into_iter().map(|raw| raw.into_summary()).collect()
        };
        TopTitles {
            today: convert(self.today),
            weekly: convert(self.weekly),
            monthly: convert(self.monthly),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TitleSummaryRaw {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    japanese_title: Option<String>,
    // Rank arrives as a string ("1") in the top-ten windows
    number: Option<Value>,
    poster: Option<String>,
    #[serde(rename = "tvInfo")]
    tv_info: Option<TvInfoRaw>,
}

impl TitleSummaryRaw {
    fn into_summary(self) -> TitleSummary {
        let (sub, dub) = self
            .tv_info
            .map(|t| (count_from_value(t.sub), count_from_value(t.dub)))
            .unwrap_or((None, None));
        TitleSummary {
            id: self.id,
            title: self.title,
            japanese_title: self.japanese_title,
            rank: self.number.and_then(|v| count_from_value(Some(v))),
            poster: self.poster,
            sub_episodes: sub,
            dub_episodes: dub,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TvInfoRaw {
    sub: Option<Value>,
    dub: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TitleInfoEnvelopeRaw {
    data: Option<TitleInfoRaw>,
}

#[derive(Debug, Deserialize)]
struct TitleInfoRaw {
    id: Option<String>,
    #[serde(default)]
    title: String,
    japanese_title: Option<String>,
    #[serde(rename = "showType")]
    show_type: Option<String>,
    #[serde(rename = "animeInfo")]
    details: Option<TitleDetailsRaw>,
    #[serde(default)]
    related_data: Vec<TitleSummaryRaw>,
    #[serde(default)]
    recommended_data: Vec<TitleSummaryRaw>,
}

#[derive(Debug, Default, Deserialize)]
struct TitleDetailsRaw {
    #[serde(rename = "Overview")]
    overview: Option<String>,
    #[serde(rename = "Genres", default)]
    genres: Vec<String>,
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "Aired")]
    aired: Option<String>,
    #[serde(rename = "Premiered")]
    premiered: Option<String>,
    #[serde(rename = "MAL Score")]
    mal_score: Option<String>,
    // Studios is a comma-joined string, Producers an array
    #[serde(rename = "Studios")]
    studios: Option<String>,
    #[serde(rename = "Producers", default)]
    producers: Vec<String>,
    #[serde(rename = "tvInfo")]
    tv_info: Option<TvInfoRaw>,
}

impl TitleInfoRaw {
    fn into_info(self, requested_id: &str) -> TitleInfo {
        let details = self.details.unwrap_or_default();
        let (sub, dub) = details
            .tv_info
            .map(|t| (count_from_value(t.sub), count_from_value(t.dub)))
            .unwrap_or((None, None));
        TitleInfo {
            id: self.id.unwrap_or_else(|| requested_id.to_string()),
            title: self.title,
            japanese_title: self.japanese_title,
            show_type: self.show_type,
            synopsis: details.overview,
            genres: details.genres,
            status: details.status,
            aired: details.aired,
            premiered: details.premiered,
            mal_score: details.mal_score,
            studios: details.studios.map(split_list).unwrap_or_default(),
            producers: details.producers,
            sub_episodes: sub,
            dub_episodes: dub,
            related: self
                .related_data
                .into_iter()
                .map(|raw| raw.into_summary())
                .collect(),
            recommended: self
                .recommended_data
                .into_iter()
                .map(|raw| raw.into_summary())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EpisodesRaw {
    #[serde(default)]
    episodes: Vec<EpisodeRaw>,
}

impl EpisodesRaw {
    fn into_episodes(self) -> Vec<Episode> {
        self.episodes
            .into_iter()
            .map(|raw| raw.into_episode())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct EpisodeRaw {
    #[serde(default)]
    id: String,
    #[serde(rename = "episode_no", default)]
    number: u32,
    #[serde(default)]
    title: String,
    japanese_title: Option<String>,
    #[serde(default)]
    filler: bool,
}

impl EpisodeRaw {
    fn into_episode(self) -> Episode {
        Episode {
            id: self.id,
            number: self.number,
            title: self.title,
            japanese_title: self.japanese_title,
            filler: self.filler,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerRaw {
    #[serde(rename = "serverName", default)]
    server_name: String,
    #[serde(rename = "type", default)]
    variant: String,
    server_id: Option<Value>,
    data_id: Option<Value>,
}

impl ServerRaw {
    fn into_server(self) -> Option<Server> {
        let variant = Variant::from_tag(&self.variant)?;
        let id = id_from_value(self.server_id).or_else(|| id_from_value(self.data_id));
        Some(Server {
            id,
            name: self.server_name,
            variant,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StreamRaw {
    #[serde(rename = "streamingLink")]
    streaming_link: Option<StreamingLinkRaw>,
}

#[derive(Debug, Deserialize)]
struct StreamingLinkRaw {
    link: Option<LinkRaw>,
    #[serde(default)]
    intro: TimeRange,
    #[serde(default)]
    outro: TimeRange,
    #[serde(default)]
    tracks: Vec<TrackRaw>,
}

impl StreamingLinkRaw {
    fn into_manifest(self, key: ManifestKey) -> Option<StreamManifest> {
        let link = self.link?;
        if link.file.is_empty() {
            return None;
        }
        let source = classify_source(&link.file, link.media_type.as_deref());
        Some(StreamManifest {
            key,
            source,
            intro: self.intro,
            outro: self.outro,
            tracks: self
                .tracks
                .into_iter()
                .map(|raw| raw.into_track())
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LinkRaw {
    #[serde(default)]
    file: String,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackRaw {
    #[serde(default)]
    file: String,
    label: Option<String>,
    kind: Option<String>,
    #[serde(default)]
    default: bool,
}

impl TrackRaw {
    fn into_track(self) -> SubtitleTrack {
        SubtitleTrack {
            file: self.file,
            label: self.label,
            kind: self.kind.unwrap_or_default(),
            default: self.default,
        }
    }
}

// =============================================================================
// Conversion helpers
// =============================================================================

/// Decide the manifest source once, from declared type / URL extension
fn classify_source(file: &str, media_type: Option<&str>) -> MediaSource {
    let declared = media_type.unwrap_or("").trim().to_lowercase();
    if declared == "hls" || declared.contains("mpegurl") || file.ends_with(".m3u8") {
        return MediaSource::Playlist {
            url: file.to_string(),
        };
    }

    let content_type = if declared.is_empty() {
        content_type_from_extension(file)
    } else {
        declared
    };
    MediaSource::Progressive {
        url: file.to_string(),
        content_type,
    }
}

/// Guess a content type from the URL's file extension
fn content_type_from_extension(file: &str) -> String {
    let ext = file
        .rsplit('.')
        .next()
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// The service mixes numbers and numeric strings for counts and ranks
fn count_from_value(v: Option<Value>) -> Option<u32> {
    match v? {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn id_from_value(v: Option<Value>) -> Option<String> {
    match v? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Split a comma-joined field ("Studio A, Studio B") into trimmed entries
fn split_list(s: String) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}
