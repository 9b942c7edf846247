//! Playback controller: couples the resolution cascade to the media pipeline
//!
//! Every operation that re-resolves the source stops and resets the live
//! session before the cascade re-enters, then mounts whatever manifest the
//! cascade settles on. Subtitle switches stay inside the live session and
//! never remount.

use std::time::Duration;

use crate::api::CatalogClient;
use crate::models::{PlaybackStatus, TimeRange, Variant};
use crate::playback::pipeline::{DecoderCapabilities, MediaPipeline, PipelineError};
use crate::playback::resolver::{PlaybackSourceResolver, ResolverSnapshot};
use crate::playback::selector::SelectionPolicy;

pub struct PlaybackController {
    resolver: PlaybackSourceResolver,
    pipeline: MediaPipeline,
}

impl PlaybackController {
    pub fn new(
        client: CatalogClient,
        policy: SelectionPolicy,
        variant: Variant,
        capabilities: DecoderCapabilities,
    ) -> Self {
        Self {
            resolver: PlaybackSourceResolver::new(client, policy, variant),
            pipeline: MediaPipeline::new(capabilities),
        }
    }

    // -------------------------------------------------------------------------
    // Resolution operations (each stops playback before re-entering)
    // -------------------------------------------------------------------------

    pub async fn load_title(&mut self, title_id: &str) -> Result<ResolverSnapshot, PipelineError> {
        self.pipeline.unmount();
        let snapshot = self.resolver.load_title(title_id).await;
        self.mount_if_ready(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn select_episode(
        &mut self,
        episode_id: &str,
    ) -> Result<ResolverSnapshot, PipelineError> {
        self.pipeline.unmount();
        let snapshot = self.resolver.select_episode(episode_id).await;
        self.mount_if_ready(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn set_variant(&mut self, variant: Variant) -> Result<ResolverSnapshot, PipelineError> {
        self.pipeline.unmount();
        let snapshot = self.resolver.set_variant(variant).await;
        self.mount_if_ready(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn set_server(&mut self, index: usize) -> Result<ResolverSnapshot, PipelineError> {
        self.pipeline.unmount();
        let snapshot = self.resolver.set_server_index(index).await;
        self.mount_if_ready(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn retry(&mut self) -> Result<ResolverSnapshot, PipelineError> {
        self.pipeline.unmount();
        let snapshot = self.resolver.retry().await;
        self.mount_if_ready(&snapshot).await?;
        Ok(snapshot)
    }

    async fn mount_if_ready(&mut self, snapshot: &ResolverSnapshot) -> Result<(), PipelineError> {
        if let Some(manifest) = &snapshot.manifest {
            self.pipeline.mount(manifest).await?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Transport passthrough
    // -------------------------------------------------------------------------

    pub fn play(&mut self) -> bool {
        self.pipeline.play()
    }

    pub fn pause(&mut self) -> bool {
        self.pipeline.pause()
    }

    pub fn seek(&mut self, to: Duration) -> bool {
        self.pipeline.seek(to)
    }

    pub fn set_volume(&mut self, volume: f32) -> bool {
        self.pipeline.set_volume(volume)
    }

    pub fn set_muted(&mut self, muted: bool) -> bool {
        self.pipeline.set_muted(muted)
    }

    /// Change the active caption track on the live session, without
    /// touching the mounted source
    pub fn set_subtitle_track(&mut self, index: Option<usize>) -> bool {
        self.pipeline.select_track(index)
    }

    /// Jump past the intro when the play head is inside it
    pub fn skip_intro(&mut self) -> bool {
        self.skip_range(|s| s.manifest.as_ref().map(|m| m.intro))
    }

    /// Jump past the outro when the play head is inside it
    pub fn skip_outro(&mut self) -> bool {
        self.skip_range(|s| s.manifest.as_ref().map(|m| m.outro))
    }

    fn skip_range(&mut self, range: impl Fn(&ResolverSnapshot) -> Option<TimeRange>) -> bool {
        let Some(range) = range(&self.resolver.snapshot()) else {
            return false;
        };
        let Some(target) = skip_target(&range, self.pipeline.status().position) else {
            return false;
        };
        self.pipeline.seek(target)
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn snapshot(&self) -> ResolverSnapshot {
        self.resolver.snapshot()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.pipeline.status()
    }

    pub fn resolver(&self) -> &PlaybackSourceResolver {
        &self.resolver
    }

    pub fn pipeline(&self) -> &MediaPipeline {
        &self.pipeline
    }
}

/// Where a skip lands, if the play head is inside the marked range
fn skip_target(range: &TimeRange, position: Duration) -> Option<Duration> {
    if range.is_empty() || !range.contains(position) {
        return None;
    }
    Some(Duration::from_secs(u64::from(range.end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_target_inside_range() {
        let intro = TimeRange { start: 10, end: 95 };
        assert_eq!(
            skip_target(&intro, Duration::from_secs(30)),
            Some(Duration::from_secs(95))
        );
    }

    #[test]
    fn test_skip_target_outside_range() {
        let intro = TimeRange { start: 10, end: 95 };
        assert_eq!(skip_target(&intro, Duration::from_secs(200)), None);
        assert_eq!(skip_target(&intro, Duration::from_secs(5)), None);
    }

    #[test]
    fn test_skip_target_empty_range() {
        let unmarked = TimeRange::default();
        assert_eq!(skip_target(&unmarked, Duration::from_secs(0)), None);
    }
}
