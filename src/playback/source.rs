//! Decoding strategies for mounted manifests
//!
//! A manifest binds to one of three strategies, chosen from its declared
//! media type (never by probing content):
//! - progressive: a single file the playback backend streams directly
//! - native HLS: the playlist URL handed to a backend that decodes
//!   segmented streams itself
//! - software HLS: the playlist is fetched and resolved here, picking one
//!   rendition and deriving the stream duration from the media playlist

use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, VariantStream};
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

/// Media container formats the pipeline can hand to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp4,
    WebM,
    Matroska,
    QuickTime,
    Hls,
}

impl ContainerFormat {
    /// Map a declared content type; `None` means no playback method exists
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let ct = content_type.trim().to_lowercase();
        match ct.as_str() {
            "video/mp4" => Some(ContainerFormat::Mp4),
            "video/webm" => Some(ContainerFormat::WebM),
            "video/x-matroska" => Some(ContainerFormat::Matroska),
            "video/quicktime" => Some(ContainerFormat::QuickTime),
            _ if ct.contains("mpegurl") => Some(ContainerFormat::Hls),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::WebM => "video/webm",
            ContainerFormat::Matroska => "video/x-matroska",
            ContainerFormat::QuickTime => "video/quicktime",
            ContainerFormat::Hls => "application/vnd.apple.mpegurl",
        }
    }
}

/// Playlist loading/parsing error
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("Playlist fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Playlist fetch failed: HTTP {0}")]
    Status(u16),

    #[error("Invalid playlist: {0}")]
    Parse(String),

    #[error("Master playlist lists no renditions")]
    NoRenditions,
}

/// Rendition picked out of a master playlist
#[derive(Debug, Clone, PartialEq)]
pub struct HlsRendition {
    pub bandwidth: u64,
    pub resolution: Option<(u64, u64)>,
}

/// Software-resolved segmented stream
///
/// Holds the outcome of playlist resolution: the concrete media playlist
/// to feed the backend, the chosen rendition, and the duration summed from
/// segment lengths (absent for live streams).
#[derive(Debug, Clone)]
pub struct HlsStream {
    pub playlist_url: String,
    pub media_url: String,
    pub rendition: Option<HlsRendition>,
    pub duration: Option<Duration>,
    pub live: bool,
}

impl HlsStream {
    /// Fetch and resolve a playlist URL (master or media)
    pub async fn load(client: &reqwest::Client, url: &str) -> Result<Self, PlaylistError> {
        let body = fetch_playlist(client, url).await?;
        match parse(&body)? {
            Playlist::MasterPlaylist(master) => {
                let variant = pick_rendition(&master).ok_or(PlaylistError::NoRenditions)?;
                let media_url = join_url(url, &variant.uri)?;
                let rendition = Some(HlsRendition {
                    bandwidth: variant.bandwidth,
                    resolution: variant.resolution.map(|r| (r.width, r.height)),
                });

                let media_body = fetch_playlist(client, &media_url).await?;
                let media = match parse(&media_body)? {
                    Playlist::MediaPlaylist(media) => media,
                    Playlist::MasterPlaylist(_) => {
                        return Err(PlaylistError::Parse(
                            "rendition URI resolved to another master playlist".to_string(),
                        ))
                    }
                };

                Ok(Self::from_media(url, media_url, rendition, &media))
            }
            Playlist::MediaPlaylist(media) => {
                Ok(Self::from_media(url, url.to_string(), None, &media))
            }
        }
    }

    fn from_media(
        playlist_url: &str,
        media_url: String,
        rendition: Option<HlsRendition>,
        media: &MediaPlaylist,
    ) -> Self {
        let live = !media.end_list;
        let duration = (!live).then(|| total_duration(media));
        Self {
            playlist_url: playlist_url.to_string(),
            media_url,
            rendition,
            duration,
            live,
        }
    }
}

/// Decoding strategy bound to a mounted session
#[derive(Debug)]
pub enum DecoderBinding {
    /// Direct file, streamed by the backend as-is
    Progressive {
        url: String,
        format: ContainerFormat,
    },
    /// Backend decodes the segmented stream itself
    NativeHls { url: String },
    /// Playlist resolved in-process
    SoftwareHls(HlsStream),
}

impl DecoderBinding {
    /// URL the playback backend should be pointed at
    pub fn media_url(&self) -> &str {
        match self {
            DecoderBinding::Progressive { url, .. } => url,
            DecoderBinding::NativeHls { url } => url,
            DecoderBinding::SoftwareHls(stream) => &stream.media_url,
        }
    }

    /// Stream duration when the strategy can know it up front
    pub fn duration_hint(&self) -> Option<Duration> {
        match self {
            DecoderBinding::SoftwareHls(stream) => stream.duration,
            _ => None,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            DecoderBinding::Progressive { .. } => "progressive",
            DecoderBinding::NativeHls { .. } => "native-hls",
            DecoderBinding::SoftwareHls(_) => "software-hls",
        }
    }
}

// =============================================================================
// Playlist helpers
// =============================================================================

async fn fetch_playlist(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, PlaylistError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PlaylistError::Status(status.as_u16()));
    }
    Ok(response.bytes().await?.to_vec())
}

fn parse(body: &[u8]) -> Result<Playlist, PlaylistError> {
    m3u8_rs::parse_playlist_res(body)
        .map_err(|_| PlaylistError::Parse("not a valid M3U8 playlist".to_string()))
}

/// Highest-bandwidth regular rendition (trick-play entries excluded)
fn pick_rendition(master: &MasterPlaylist) -> Option<&VariantStream> {
    master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .max_by_key(|v| v.bandwidth)
}

fn total_duration(media: &MediaPlaylist) -> Duration {
    let secs: f64 = media.segments.iter().map(|s| f64::from(s.duration)).sum();
    Duration::from_secs_f64(secs.max(0.0))
}

/// Resolve a possibly-relative rendition URI against the playlist URL
fn join_url(base: &str, uri: &str) -> Result<String, PlaylistError> {
    let base = Url::parse(base).map_err(|e| PlaylistError::Parse(format!("bad base URL: {}", e)))?;
    let joined = base
        .join(uri)
        .map_err(|e| PlaylistError::Parse(format!("bad rendition URI: {}", e)))?;
    Ok(joined.to_string())
}
