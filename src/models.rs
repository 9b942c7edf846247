//! Data structures and types for aniplay
//!
//! Contains all shared models used across the application organized by domain:
//! - **Catalog**: title summaries, title info, episodes
//! - **Streams**: servers, variants, stream manifests, subtitle tracks
//! - **Playback**: observable transport status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// =============================================================================
// Catalog Models
// =============================================================================

/// Audio/subtitle variant of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Sub,
    Dub,
}

impl Variant {
    /// Wire value used by the content service (`type` query parameter)
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Sub => "sub",
            Variant::Dub => "dub",
        }
    }

    /// The other variant
    pub fn toggled(&self) -> Self {
        match self {
            Variant::Sub => Variant::Dub,
            Variant::Dub => Variant::Sub,
        }
    }

    /// Parse a loose wire tag ("sub", "dub", "SUB", "raw" -> None)
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sub" => Some(Variant::Sub),
            "dub" => Some(Variant::Dub),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One episode of a title, in catalog order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub number: u32,
    pub title: String,
    pub japanese_title: Option<String>,
    pub filler: bool,
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:02} - {}", self.number, self.title)?;
        if self.filler {
            write!(f, " [filler]")?;
        }
        Ok(())
    }
}

/// Ranked title entry from the top-ten listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleSummary {
    pub id: String,
    pub title: String,
    pub japanese_title: Option<String>,
    pub rank: Option<u32>,
    pub poster: Option<String>,
    pub sub_episodes: Option<u32>,
    pub dub_episodes: Option<u32>,
}

impl fmt::Display for TitleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rank) = self.rank {
            write!(f, "{:>2}. ", rank)?;
        }
        write!(f, "{}", self.title)?;
        match (self.sub_episodes, self.dub_episodes) {
            (Some(s), Some(d)) => write!(f, " [sub {} | dub {}]", s, d),
            (Some(s), None) => write!(f, " [sub {}]", s),
            (None, Some(d)) => write!(f, " [dub {}]", d),
            (None, None) => Ok(()),
        }
    }
}

/// Top-ten listing, one ranked window per period
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopTitles {
    pub today: Vec<TitleSummary>,
    pub weekly: Vec<TitleSummary>,
    pub monthly: Vec<TitleSummary>,
}

/// Full title metadata from the info endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleInfo {
    pub id: String,
    pub title: String,
    pub japanese_title: Option<String>,
    pub show_type: Option<String>,
    pub synopsis: Option<String>,
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub aired: Option<String>,
    pub premiered: Option<String>,
    pub mal_score: Option<String>,
    pub studios: Vec<String>,
    pub producers: Vec<String>,
    pub sub_episodes: Option<u32>,
    pub dub_episodes: Option<u32>,
    pub related: Vec<TitleSummary>,
    pub recommended: Vec<TitleSummary>,
}

impl fmt::Display for TitleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(ref kind) = self.show_type {
            write!(f, " ({})", kind)?;
        }
        if let Some(ref status) = self.status {
            write!(f, " - {}", status)?;
        }
        Ok(())
    }
}

// =============================================================================
// Stream Models
// =============================================================================

/// Streaming server offering one variant of an episode
///
/// List position at fetch time is meaningful: selection addresses
/// servers by index into the fetched list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: Option<String>,
    pub name: String,
    pub variant: Variant,
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.variant)
    }
}

/// Half-open second range inside a stream (intro/outro markers)
///
/// The service sends `{start: 0, end: 0}` when no marker exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether a play-head position falls inside the range
    pub fn contains(&self, position: Duration) -> bool {
        if self.is_empty() {
            return false;
        }
        let secs = position.as_secs();
        secs >= u64::from(self.start) && secs < u64::from(self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_duration(Duration::from_secs(u64::from(self.start))),
            format_duration(Duration::from_secs(u64::from(self.end)))
        )
    }
}

/// Subtitle or auxiliary track attached to a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Track payload URL
    pub file: String,
    pub label: Option<String>,
    /// Wire kind tag; only caption-kind tracks are attached to playback
    pub kind: String,
    #[serde(default)]
    pub default: bool,
}

impl SubtitleTrack {
    pub fn is_captions(&self) -> bool {
        self.kind.eq_ignore_ascii_case("captions")
    }

    /// Display label, falling back like the player UI does
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("Subtitles")
    }
}

impl fmt::Display for SubtitleTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_label())?;
        if self.default {
            write!(f, " [default]")?;
        }
        Ok(())
    }
}

/// Primary media resource of a manifest, decided once at fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaSource {
    /// Single progressive file
    Progressive { url: String, content_type: String },
    /// Segmented adaptive-streaming playlist (HLS master or media)
    Playlist { url: String },
}

impl MediaSource {
    pub fn url(&self) -> &str {
        match self {
            MediaSource::Progressive { url, .. } => url,
            MediaSource::Playlist { url } => url,
        }
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self, MediaSource::Playlist { .. })
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Progressive { content_type, .. } => {
                write!(f, "progressive ({})", content_type)
            }
            MediaSource::Playlist { .. } => write!(f, "hls playlist"),
        }
    }
}

/// Key identifying exactly one manifest fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestKey {
    pub episode_id: String,
    pub server_name: String,
    pub variant: Variant,
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.episode_id, self.server_name, self.variant)
    }
}

/// Resolved stream description for one (episode, server, variant) triple
///
/// Never mutated after fetch; a new selection produces a new manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamManifest {
    pub key: ManifestKey,
    pub source: MediaSource,
    pub intro: TimeRange,
    pub outro: TimeRange,
    pub tracks: Vec<SubtitleTrack>,
}

impl StreamManifest {
    /// Caption-kind tracks, in manifest order
    pub fn caption_tracks(&self) -> impl Iterator<Item = &SubtitleTrack> {
        self.tracks.iter().filter(|t| t.is_captions())
    }
}

impl fmt::Display for StreamManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key, self.source)
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Observable playback transport state published by the media pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub position: Duration,
    /// Unknown until the decoding strategy (or embedding player) reports it
    pub duration: Option<Duration>,
    pub playing: bool,
}

impl PlaybackStatus {
    pub fn idle() -> Self {
        Self {
            position: Duration::ZERO,
            duration: None,
            playing: false,
        }
    }

    /// Format position as HH:MM:SS / MM:SS
    pub fn format_position(&self) -> String {
        format_duration(self.position)
    }

    /// Format duration, "--:--" when unknown
    pub fn format_duration(&self) -> String {
        match self.duration {
            Some(d) => format_duration(d),
            None => "--:--".to_string(),
        }
    }

    /// Progress as 0.0-1.0, zero when duration is unknown
    pub fn progress(&self) -> f32 {
        match self.duration {
            Some(d) if d.as_secs() > 0 => self.position.as_secs_f32() / d.as_secs_f32(),
            _ => 0.0,
        }
    }
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.playing { "▶" } else { "⏸" };
        write!(
            f,
            "{} {} / {}",
            marker,
            self.format_position(),
            self.format_duration()
        )
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Format a Duration as HH:MM:SS or MM:SS
pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
