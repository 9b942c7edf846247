//! Media pipeline: owns the single live playback session
//!
//! `mount` tears down whatever is playing, binds the decoding strategy for
//! the new manifest, and starts a fresh session with the play head at zero.
//! Transport controls mutate the live session and are no-ops when nothing
//! is mounted. Observers receive `{position, duration, playing}` snapshots
//! on a watch channel, refreshed by a clock task while a session exists.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::{MediaSource, PlaybackStatus, StreamManifest, SubtitleTrack};
use crate::playback::source::{ContainerFormat, DecoderBinding, HlsStream, PlaylistError};

/// How often the clock task refreshes observers while a session is live
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Playback-specific errors, distinct from resolution errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No supported playback method for '{content_type}'")]
    UnsupportedMedia { content_type: String },

    #[error("Playlist resolution failed: {0}")]
    Playlist(#[from] PlaylistError),
}

/// What the execution environment can decode on its own
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderCapabilities {
    /// A detected backend decodes segmented streams natively, so the
    /// software playlist loader is skipped
    pub native_hls: bool,
}

impl DecoderCapabilities {
    pub fn with_native_hls(native_hls: bool) -> Self {
        Self { native_hls }
    }
}

// =============================================================================
// Session internals
// =============================================================================

/// Monotonic play-head clock, advanced by wall time while playing
#[derive(Debug)]
struct SessionClock {
    base: Duration,
    started_at: Option<Instant>,
}

impl SessionClock {
    fn new() -> Self {
        Self {
            base: Duration::ZERO,
            started_at: None,
        }
    }

    fn playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn position(&self) -> Duration {
        let running = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        self.base + running
    }

    fn play(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.base += started.elapsed();
        }
    }

    fn seek(&mut self, to: Duration) {
        self.base = to;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Pin the clock, used when the play head reaches the end
    fn halt_at(&mut self, at: Duration) {
        self.base = at;
        self.started_at = None;
    }
}

/// Mutable transport state, shared with the clock task
#[derive(Debug)]
struct SessionState {
    clock: SessionClock,
    duration: Option<Duration>,
    volume: f32,
    muted: bool,
}

impl SessionState {
    /// Current status; reaching a known duration ends playback
    fn status(&mut self) -> PlaybackStatus {
        let mut position = self.clock.position();
        if let Some(duration) = self.duration {
            if position >= duration {
                position = duration;
                self.clock.halt_at(duration);
            }
        }
        PlaybackStatus {
            position,
            duration: self.duration,
            playing: self.clock.playing(),
        }
    }
}

/// Decrements the pipeline's live-session count when the session drops
#[derive(Debug)]
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One mounted decoding session
///
/// Owned exclusively by the pipeline; dropping it stops the clock task and
/// releases the decoding strategy.
#[derive(Debug)]
pub struct PlaybackSession {
    id: Uuid,
    binding: DecoderBinding,
    tracks: Vec<SubtitleTrack>,
    active_track: Option<usize>,
    state: Arc<Mutex<SessionState>>,
    ticker: JoinHandle<()>,
    _live: LiveGuard,
}

impl PlaybackSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn binding(&self) -> &DecoderBinding {
        &self.binding
    }

    /// Caption tracks attached at mount, in manifest order
    pub fn tracks(&self) -> &[SubtitleTrack] {
        &self.tracks
    }

    pub fn active_track(&self) -> Option<usize> {
        self.active_track
    }

    /// Mixer volume applied to this session
    pub fn volume(&self) -> f32 {
        self.state.lock().expect("session state poisoned").volume
    }

    pub fn muted(&self) -> bool {
        self.state.lock().expect("session state poisoned").muted
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

// =============================================================================
// MediaPipeline
// =============================================================================

pub struct MediaPipeline {
    capabilities: DecoderCapabilities,
    client: reqwest::Client,
    session: Option<PlaybackSession>,
    status_tx: watch::Sender<PlaybackStatus>,
    live_sessions: Arc<AtomicUsize>,
    // Carried across sessions, like a player element that outlives its source
    volume: f32,
    muted: bool,
}

impl MediaPipeline {
    pub fn new(capabilities: DecoderCapabilities) -> Self {
        let (status_tx, _) = watch::channel(PlaybackStatus::idle());
        Self {
            capabilities,
            client: reqwest::Client::new(),
            session: None,
            status_tx,
            live_sessions: Arc::new(AtomicUsize::new(0)),
            volume: 1.0,
            muted: false,
        }
    }

    /// Mount a manifest, replacing any live session
    ///
    /// The previous session is fully released before the new strategy is
    /// bound. On error the pipeline is left unmounted.
    pub async fn mount(&mut self, manifest: &StreamManifest) -> Result<(), PipelineError> {
        self.unmount();

        let binding = self.bind(manifest).await?;
        let duration = binding.duration_hint();
        let (tracks, active_track) = caption_tracks(manifest);

        let state = Arc::new(Mutex::new(SessionState {
            clock: SessionClock::new(),
            duration,
            volume: self.volume,
            muted: self.muted,
        }));

        self.live_sessions.fetch_add(1, Ordering::SeqCst);
        let ticker = spawn_ticker(Arc::clone(&state), self.status_tx.clone());

        self.session = Some(PlaybackSession {
            id: Uuid::new_v4(),
            binding,
            tracks,
            active_track,
            state,
            ticker,
            _live: LiveGuard(Arc::clone(&self.live_sessions)),
        });

        self.publish();
        Ok(())
    }

    /// Release the live session and reset observers to the idle state
    pub fn unmount(&mut self) {
        if self.session.take().is_some() {
            self.status_tx.send_replace(PlaybackStatus::idle());
        }
    }

    async fn bind(&self, manifest: &StreamManifest) -> Result<DecoderBinding, PipelineError> {
        match &manifest.source {
            MediaSource::Progressive { url, content_type } => {
                match ContainerFormat::from_content_type(content_type) {
                    Some(ContainerFormat::Hls) => self.bind_playlist(url).await,
                    Some(format) => Ok(DecoderBinding::Progressive {
                        url: url.clone(),
                        format,
                    }),
                    None => Err(PipelineError::UnsupportedMedia {
                        content_type: content_type.clone(),
                    }),
                }
            }
            MediaSource::Playlist { url } => self.bind_playlist(url).await,
        }
    }

    async fn bind_playlist(&self, url: &str) -> Result<DecoderBinding, PipelineError> {
        if self.capabilities.native_hls {
            return Ok(DecoderBinding::NativeHls {
                url: url.to_string(),
            });
        }
        let stream = HlsStream::load(&self.client, url).await?;
        Ok(DecoderBinding::SoftwareHls(stream))
    }

    // -------------------------------------------------------------------------
    // Transport controls (no-ops against an unmounted pipeline)
    // -------------------------------------------------------------------------

    pub fn play(&mut self) -> bool {
        self.with_state(|state| state.clock.play())
    }

    pub fn pause(&mut self) -> bool {
        self.with_state(|state| state.clock.pause())
    }

    /// Seek, clamped to the known duration
    pub fn seek(&mut self, to: Duration) -> bool {
        self.with_state(|state| {
            let target = match state.duration {
                Some(d) => to.min(d),
                None => to,
            };
            state.clock.seek(target);
        })
    }

    pub fn set_volume(&mut self, volume: f32) -> bool {
        let volume = volume.clamp(0.0, 1.0);
        let applied = self.with_state(|state| state.volume = volume);
        if applied {
            self.volume = volume;
        }
        applied
    }

    pub fn set_muted(&mut self, muted: bool) -> bool {
        let applied = self.with_state(|state| state.muted = muted);
        if applied {
            self.muted = muted;
        }
        applied
    }

    /// Accept a duration reported by the embedding backend
    pub fn report_duration(&mut self, duration: Duration) -> bool {
        self.with_state(|state| state.duration = Some(duration))
    }

    /// Switch the active caption track without remounting; `None` turns
    /// captions off
    pub fn select_track(&mut self, index: Option<usize>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if let Some(i) = index {
            if i >= session.tracks.len() {
                return false;
            }
        }
        session.active_track = index;
        true
    }

    fn with_state(&mut self, apply: impl FnOnce(&mut SessionState)) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        {
            let mut state = session.state.lock().expect("session state poisoned");
            apply(&mut state);
        }
        self.publish();
        true
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Sessions currently holding decoder resources; never exceeds one
    pub fn live_session_count(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn status(&self) -> PlaybackStatus {
        match self.session.as_ref() {
            Some(session) => {
                let mut state = session.state.lock().expect("session state poisoned");
                state.status()
            }
            None => PlaybackStatus::idle(),
        }
    }

    /// Observe transport snapshots without polling
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status_tx.subscribe()
    }
}

impl Drop for MediaPipeline {
    fn drop(&mut self) {
        // Stops the clock task; the session drop handles the rest
        self.session.take();
    }
}

/// Caption-kind tracks only, with at most one default
fn caption_tracks(manifest: &StreamManifest) -> (Vec<SubtitleTrack>, Option<usize>) {
    let mut tracks: Vec<SubtitleTrack> = manifest.caption_tracks().cloned().collect();
    let default = tracks.iter().position(|t| t.default);
    for (i, track) in tracks.iter_mut().enumerate() {
        track.default = Some(i) == default;
    }
    (tracks, default)
}

fn spawn_ticker(
    state: Arc<Mutex<SessionState>>,
    status_tx: watch::Sender<PlaybackStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            let status = {
                let mut state = match state.lock() {
                    Ok(state) => state,
                    Err(_) => break,
                };
                state.status()
            };
            status_tx.send_replace(status);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManifestKey, TimeRange, Variant};

    fn manifest_with_tracks(tracks: Vec<SubtitleTrack>) -> StreamManifest {
        StreamManifest {
            key: ManifestKey {
                episode_id: "e1".to_string(),
                server_name: "HD-1".to_string(),
                variant: Variant::Sub,
            },
            source: MediaSource::Progressive {
                url: "https://cdn.example/ep.mp4".to_string(),
                content_type: "video/mp4".to_string(),
            },
            intro: TimeRange::default(),
            outro: TimeRange::default(),
            tracks,
        }
    }

    fn track(label: &str, kind: &str, default: bool) -> SubtitleTrack {
        SubtitleTrack {
            file: format!("https://cdn.example/{}.vtt", label),
            label: Some(label.to_string()),
            kind: kind.to_string(),
            default,
        }
    }

    // -------------------------------------------------------------------------
    // SessionClock Tests
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_only_while_playing() {
        let mut clock = SessionClock::new();
        assert_eq!(clock.position(), Duration::ZERO);
        assert!(!clock.playing());

        clock.play();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.position(), Duration::from_secs(5));

        clock.pause();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(clock.position(), Duration::from_secs(5));
        assert!(!clock.playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_seek_while_playing() {
        let mut clock = SessionClock::new();
        clock.play();
        tokio::time::advance(Duration::from_secs(3)).await;

        clock.seek(Duration::from_secs(60));
        assert_eq!(clock.position(), Duration::from_secs(60));
        assert!(clock.playing());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(clock.position(), Duration::from_secs(62));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_play_is_idempotent() {
        let mut clock = SessionClock::new();
        clock.play();
        tokio::time::advance(Duration::from_secs(4)).await;
        clock.play();
        assert_eq!(clock.position(), Duration::from_secs(4));
    }

    // -------------------------------------------------------------------------
    // SessionState Tests
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_reaching_duration_ends_playback() {
        let mut state = SessionState {
            clock: SessionClock::new(),
            duration: Some(Duration::from_secs(10)),
            volume: 1.0,
            muted: false,
        };
        state.clock.play();
        tokio::time::advance(Duration::from_secs(25)).await;

        let status = state.status();
        assert_eq!(status.position, Duration::from_secs(10));
        assert!(!status.playing);

        // Stays pinned afterwards
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(state.status().position, Duration::from_secs(10));
    }

    // -------------------------------------------------------------------------
    // Caption track attach Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_caption_tracks_filters_and_single_default() {
        let manifest = manifest_with_tracks(vec![
            track("thumbs", "thumbnails", false),
            track("en", "captions", true),
            track("pt", "captions", true),
        ]);
        let (tracks, default) = caption_tracks(&manifest);
        assert_eq!(tracks.len(), 2);
        assert_eq!(default, Some(0));
        assert!(tracks[0].default);
        assert!(!tracks[1].default);
    }

    #[test]
    fn test_caption_tracks_no_default() {
        let manifest = manifest_with_tracks(vec![track("en", "captions", false)]);
        let (tracks, default) = caption_tracks(&manifest);
        assert_eq!(tracks.len(), 1);
        assert_eq!(default, None);
    }

    // -------------------------------------------------------------------------
    // Pipeline control Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_controls_noop_when_unmounted() {
        let mut pipeline = MediaPipeline::new(DecoderCapabilities::default());
        assert!(!pipeline.play());
        assert!(!pipeline.pause());
        assert!(!pipeline.seek(Duration::from_secs(10)));
        assert!(!pipeline.set_volume(0.5));
        assert!(!pipeline.set_muted(true));
        assert!(!pipeline.select_track(None));
        assert!(!pipeline.is_mounted());
        assert_eq!(pipeline.status(), PlaybackStatus::idle());
        assert_eq!(pipeline.live_session_count(), 0);
    }

    #[tokio::test]
    async fn test_mount_resets_transport_state() {
        let mut pipeline = MediaPipeline::new(DecoderCapabilities::default());
        let manifest = manifest_with_tracks(vec![]);

        pipeline.mount(&manifest).await.unwrap();
        pipeline.play();
        pipeline.seek(Duration::from_secs(300));
        assert!(pipeline.status().playing);

        pipeline.mount(&manifest).await.unwrap();
        let status = pipeline.status();
        assert_eq!(status.position, Duration::ZERO);
        assert!(!status.playing);
    }

    #[tokio::test]
    async fn test_double_mount_single_live_session() {
        let mut pipeline = MediaPipeline::new(DecoderCapabilities::default());
        let manifest = manifest_with_tracks(vec![]);

        pipeline.mount(&manifest).await.unwrap();
        let first = pipeline.session_id().unwrap();
        pipeline.mount(&manifest).await.unwrap();
        let second = pipeline.session_id().unwrap();

        assert_ne!(first, second);
        assert_eq!(pipeline.live_session_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_media_is_distinct_error() {
        let mut pipeline = MediaPipeline::new(DecoderCapabilities::default());
        let mut manifest = manifest_with_tracks(vec![]);
        manifest.source = MediaSource::Progressive {
            url: "https://cdn.example/blob".to_string(),
            content_type: "application/octet-stream".to_string(),
        };

        let err = pipeline.mount(&manifest).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMedia { .. }));
        assert!(!pipeline.is_mounted());
    }

    #[tokio::test]
    async fn test_native_hls_skips_software_loader() {
        let mut pipeline = MediaPipeline::new(DecoderCapabilities::with_native_hls(true));
        let mut manifest = manifest_with_tracks(vec![]);
        manifest.source = MediaSource::Playlist {
            // Never fetched on the native path
            url: "https://cdn.example/master.m3u8".to_string(),
        };

        pipeline.mount(&manifest).await.unwrap();
        let session = pipeline.session().unwrap();
        assert_eq!(session.binding().strategy_name(), "native-hls");
    }

    #[tokio::test]
    async fn test_volume_persists_across_mounts() {
        let mut pipeline = MediaPipeline::new(DecoderCapabilities::default());
        let manifest = manifest_with_tracks(vec![]);

        pipeline.mount(&manifest).await.unwrap();
        pipeline.set_volume(0.3);
        pipeline.set_muted(true);

        pipeline.mount(&manifest).await.unwrap();
        assert!((pipeline.volume() - 0.3).abs() < f32::EPSILON);
        assert!(pipeline.muted());

        // The fresh session starts with the carried mixer values
        let session = pipeline.session().unwrap();
        assert!((session.volume() - 0.3).abs() < f32::EPSILON);
        assert!(session.muted());
    }

    #[tokio::test]
    async fn test_select_track_bounds() {
        let mut pipeline = MediaPipeline::new(DecoderCapabilities::default());
        let manifest = manifest_with_tracks(vec![
            track("en", "captions", true),
            track("pt", "captions", false),
        ]);

        pipeline.mount(&manifest).await.unwrap();
        assert_eq!(pipeline.session().unwrap().active_track(), Some(0));

        assert!(pipeline.select_track(Some(1)));
        assert_eq!(pipeline.session().unwrap().active_track(), Some(1));

        assert!(!pipeline.select_track(Some(5)));
        assert_eq!(pipeline.session().unwrap().active_track(), Some(1));

        assert!(pipeline.select_track(None));
        assert_eq!(pipeline.session().unwrap().active_track(), None);
    }
}
