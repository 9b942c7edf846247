//! aniplay - Terminal client for browsing and playing anime streams
//!
//! Resolves playable streams through a catalog API cascade (title ->
//! episodes -> servers -> manifest) and plays them through a single live
//! pipeline session or an external player.
//!
//! # Modules
//!
//! - `models` - Catalog and playback data structures
//! - `api` - Catalog API client
//! - `playback` - Server selection, resolution cascade, media pipeline
//! - `cli` - Command-line surface and output formatting
//! - `commands` - CLI command handlers
//! - `config` - Config file handling

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod playback;

// Re-export commonly used types
pub use models::{
    Episode, ManifestKey, MediaSource, PlaybackStatus, Server, StreamManifest, SubtitleTrack,
    TimeRange, TitleInfo, TitleSummary, TopTitles, Variant,
};

pub use api::{CatalogClient, CatalogError};
pub use playback::{
    DecoderCapabilities, MediaPipeline, PlaybackController, PlaybackSourceResolver, ResolvePhase,
    ResolverSnapshot, SelectionPolicy,
};
