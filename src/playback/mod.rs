//! Playback infrastructure
//!
//! - Selector: deterministic server choice under a variant preference
//! - Resolver: title -> episodes -> servers -> manifest cascade
//! - Source: container classification and software playlist loading
//! - Pipeline: the single live decoding session and its transport clock
//! - Controller: couples resolution to the pipeline
//! - Player: handoff to an installed mpv/VLC/IINA

pub mod controller;
pub mod pipeline;
pub mod player;
pub mod resolver;
pub mod selector;
pub mod source;

pub use controller::PlaybackController;
pub use pipeline::{DecoderCapabilities, MediaPipeline, PipelineError};
pub use player::{LocalPlayer, PlayOptions, PlayerKind};
pub use resolver::{PlaybackSourceResolver, ResolvePhase, ResolveError, ResolverSnapshot, Stage};
pub use selector::{select, FallbackPolicy, SelectionPolicy, ServerChoice};
pub use source::{ContainerFormat, DecoderBinding, HlsStream};
