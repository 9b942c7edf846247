//! Stream resolution cascade: title -> episodes -> servers -> manifest
//!
//! The resolver is an explicit state machine. Every remote fetch is issued
//! under a per-stage sequence number, and a completion is applied only when
//! its number still matches the latest issued for that stage. Anything a
//! newer request has superseded is discarded, never applied, so rapid
//! episode, variant, or server switches can never leave the final state
//! showing one thing and playing another.
//!
//! Server lists are cached per episode. Variant and server switches over a
//! known list skip straight back to the manifest fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;

use crate::api::{CatalogClient, CatalogError};
use crate::models::{Episode, ManifestKey, Server, StreamManifest, Variant};
use crate::playback::selector::{select, SelectionPolicy, ServerChoice};

// =============================================================================
// Phases, stages, and errors
// =============================================================================

/// Where the cascade currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePhase {
    Idle,
    LoadingEpisodes,
    LoadingServers,
    LoadingManifest,
    /// Manifest ready to mount, or the title has no episodes at all
    Ready,
    Failed,
}

impl ResolvePhase {
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            ResolvePhase::LoadingEpisodes
                | ResolvePhase::LoadingServers
                | ResolvePhase::LoadingManifest
        )
    }
}

impl std::fmt::Display for ResolvePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ResolvePhase::Idle => "idle",
            ResolvePhase::LoadingEpisodes => "loading-episodes",
            ResolvePhase::LoadingServers => "loading-servers",
            ResolvePhase::LoadingManifest => "loading-manifest",
            ResolvePhase::Ready => "ready",
            ResolvePhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// The cascade stage a fetch or failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Episodes,
    Servers,
    Manifest,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Episodes => "episodes",
            Stage::Servers => "servers",
            Stage::Manifest => "manifest",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to load {stage}: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: CatalogError,
    },

    #[error("No server offers {variant} playback for this episode")]
    NoServers { variant: Variant },

    #[error("Server '{server}' returned no playable stream")]
    EmptyManifest { server: String },
}

impl ResolveError {
    /// Stage a retry should restart from
    pub fn stage(&self) -> Stage {
        match self {
            ResolveError::Network { stage, .. } => *stage,
            ResolveError::NoServers { .. } => Stage::Servers,
            ResolveError::EmptyManifest { .. } => Stage::Manifest,
        }
    }
}

// =============================================================================
// Snapshot published to observers
// =============================================================================

#[derive(Debug, Clone)]
pub struct ResolverSnapshot {
    pub phase: ResolvePhase,
    pub variant: Variant,
    pub episodes: Arc<Vec<Episode>>,
    pub selected_episode: Option<usize>,
    pub servers: Arc<Vec<Server>>,
    pub choice: Option<ServerChoice>,
    pub manifest: Option<Arc<StreamManifest>>,
    pub error: Option<Arc<ResolveError>>,
}

impl ResolverSnapshot {
    fn idle(variant: Variant) -> Self {
        Self {
            phase: ResolvePhase::Idle,
            variant,
            episodes: Arc::new(Vec::new()),
            selected_episode: None,
            servers: Arc::new(Vec::new()),
            choice: None,
            manifest: None,
            error: None,
        }
    }

    pub fn selected(&self) -> Option<&Episode> {
        self.selected_episode.and_then(|i| self.episodes.get(i))
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }

    /// Ready with nothing to play, a terminal state for titles without
    /// episodes
    pub fn is_empty(&self) -> bool {
        self.phase == ResolvePhase::Ready && self.episodes.is_empty()
    }
}

// =============================================================================
// Inner state machine
// =============================================================================

/// Next remote fetch the cascade needs
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fetch {
    Episodes { title_id: String, seq: u64 },
    Servers { episode_id: String, seq: u64 },
    Manifest { key: ManifestKey, seq: u64 },
}

struct ResolverInner {
    phase: ResolvePhase,
    policy: SelectionPolicy,
    variant: Variant,
    title_id: Option<String>,
    episodes: Arc<Vec<Episode>>,
    selected_episode: Option<usize>,
    server_cache: HashMap<String, Arc<Vec<Server>>>,
    servers: Arc<Vec<Server>>,
    choice: Option<ServerChoice>,
    last_server_name: Option<String>,
    manifest: Option<Arc<StreamManifest>>,
    error: Option<Arc<ResolveError>>,
    episodes_seq: u64,
    servers_seq: u64,
    manifest_seq: u64,
}

impl ResolverInner {
    fn new(policy: SelectionPolicy, variant: Variant) -> Self {
        Self {
            phase: ResolvePhase::Idle,
            policy,
            variant,
            title_id: None,
            episodes: Arc::new(Vec::new()),
            selected_episode: None,
            server_cache: HashMap::new(),
            servers: Arc::new(Vec::new()),
            choice: None,
            last_server_name: None,
            manifest: None,
            error: None,
            episodes_seq: 0,
            servers_seq: 0,
            manifest_seq: 0,
        }
    }

    fn snapshot(&self) -> ResolverSnapshot {
        ResolverSnapshot {
            phase: self.phase,
            variant: self.variant,
            episodes: Arc::clone(&self.episodes),
            selected_episode: self.selected_episode,
            servers: Arc::clone(&self.servers),
            choice: self.choice.clone(),
            manifest: self.manifest.clone(),
            error: self.error.clone(),
        }
    }

    fn selected_episode_id(&self) -> Option<String> {
        self.selected_episode
            .and_then(|i| self.episodes.get(i))
            .map(|e| e.id.clone())
    }

    fn fail(&mut self, error: ResolveError) {
        self.manifest = None;
        self.error = Some(Arc::new(error));
        self.phase = ResolvePhase::Failed;
    }

    /// Start a fresh cascade for a title. Bumps every stage counter so any
    /// in-flight completion from the previous cascade lands stale.
    fn begin_episodes(&mut self, title_id: &str) -> Fetch {
        self.title_id = Some(title_id.to_string());
        self.phase = ResolvePhase::LoadingEpisodes;
        self.episodes = Arc::new(Vec::new());
        self.selected_episode = None;
        self.server_cache.clear();
        self.servers = Arc::new(Vec::new());
        self.choice = None;
        self.last_server_name = None;
        self.manifest = None;
        self.error = None;
        self.episodes_seq += 1;
        self.servers_seq += 1;
        self.manifest_seq += 1;
        Fetch::Episodes {
            title_id: title_id.to_string(),
            seq: self.episodes_seq,
        }
    }

    fn complete_episodes(
        &mut self,
        seq: u64,
        result: Result<Vec<Episode>, CatalogError>,
    ) -> Option<Fetch> {
        if seq != self.episodes_seq {
            return None;
        }
        let episodes = match result {
            Ok(list) => list,
            Err(err) if err.is_empty_data() => Vec::new(),
            Err(err) => {
                self.fail(ResolveError::Network {
                    stage: Stage::Episodes,
                    source: err,
                });
                return None;
            }
        };
        if episodes.is_empty() {
            // Terminal: nothing downstream to fetch
            self.episodes = Arc::new(Vec::new());
            self.phase = ResolvePhase::Ready;
            return None;
        }
        self.episodes = Arc::new(episodes);
        self.selected_episode = Some(0);
        let episode_id = self.episodes[0].id.clone();
        self.start_servers(&episode_id)
    }

    /// Enter the server stage for an episode, consulting the cache first
    fn start_servers(&mut self, episode_id: &str) -> Option<Fetch> {
        if let Some(cached) = self.server_cache.get(episode_id) {
            self.servers = Arc::clone(cached);
            return self.select_and_start_manifest();
        }
        self.servers = Arc::new(Vec::new());
        self.choice = None;
        self.phase = ResolvePhase::LoadingServers;
        self.servers_seq += 1;
        self.manifest_seq += 1;
        Some(Fetch::Servers {
            episode_id: episode_id.to_string(),
            seq: self.servers_seq,
        })
    }

    fn complete_servers(
        &mut self,
        seq: u64,
        result: Result<Vec<Server>, CatalogError>,
    ) -> Option<Fetch> {
        if seq != self.servers_seq {
            return None;
        }
        let servers = match result {
            Ok(list) => list,
            Err(err) if err.is_empty_data() => Vec::new(),
            Err(err) => {
                self.fail(ResolveError::Network {
                    stage: Stage::Servers,
                    source: err,
                });
                return None;
            }
        };
        let servers = Arc::new(servers);
        if let Some(episode_id) = self.selected_episode_id() {
            self.server_cache.insert(episode_id, Arc::clone(&servers));
        }
        self.servers = servers;
        self.select_and_start_manifest()
    }

    /// Run the selection policy over the current server list
    fn select_and_start_manifest(&mut self) -> Option<Fetch> {
        match select(
            &self.servers,
            self.variant,
            self.last_server_name.as_deref(),
            &self.policy,
        ) {
            Some(choice) => {
                self.last_server_name = Some(choice.server.name.clone());
                self.choice = Some(choice);
                self.start_manifest()
            }
            None => {
                self.choice = None;
                self.fail(ResolveError::NoServers {
                    variant: self.variant,
                });
                None
            }
        }
    }

    /// Enter the manifest stage for the current choice
    ///
    /// The fetch is keyed by the chosen server's own variant, so a degraded
    /// cross-variant fallback pulls the stream that server actually offers.
    fn start_manifest(&mut self) -> Option<Fetch> {
        let episode_id = self.selected_episode_id()?;
        let choice = self.choice.as_ref()?;
        let key = ManifestKey {
            episode_id,
            server_name: choice.server.name.clone(),
            variant: choice.server.variant,
        };
        self.manifest = None;
        self.phase = ResolvePhase::LoadingManifest;
        self.manifest_seq += 1;
        Some(Fetch::Manifest {
            key,
            seq: self.manifest_seq,
        })
    }

    fn complete_manifest(
        &mut self,
        seq: u64,
        result: Result<StreamManifest, CatalogError>,
    ) -> Option<Fetch> {
        if seq != self.manifest_seq {
            return None;
        }
        match result {
            Ok(manifest) => {
                self.manifest = Some(Arc::new(manifest));
                self.error = None;
                self.phase = ResolvePhase::Ready;
            }
            Err(err) if err.is_empty_data() => {
                let server = self
                    .choice
                    .as_ref()
                    .map(|c| c.server.name.clone())
                    .unwrap_or_default();
                self.fail(ResolveError::EmptyManifest { server });
            }
            Err(err) => {
                self.fail(ResolveError::Network {
                    stage: Stage::Manifest,
                    source: err,
                });
            }
        }
        None
    }
}

// =============================================================================
// PlaybackSourceResolver
// =============================================================================

/// Drives the cascade against the catalog API and publishes snapshots on a
/// watch channel
///
/// All operations take `&self`; the inner state sits behind a mutex that is
/// never held across an await.
pub struct PlaybackSourceResolver {
    client: CatalogClient,
    inner: Mutex<ResolverInner>,
    snapshot_tx: watch::Sender<ResolverSnapshot>,
}

impl PlaybackSourceResolver {
    pub fn new(client: CatalogClient, policy: SelectionPolicy, variant: Variant) -> Self {
        let (snapshot_tx, _) = watch::channel(ResolverSnapshot::idle(variant));
        Self {
            client,
            inner: Mutex::new(ResolverInner::new(policy, variant)),
            snapshot_tx,
        }
    }

    pub fn snapshot(&self) -> ResolverSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Observe state transitions without polling
    pub fn subscribe(&self) -> watch::Receiver<ResolverSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot_tx.borrow().phase.is_loading()
    }

    /// Load a title from scratch and run the cascade until it settles
    pub async fn load_title(&self, title_id: &str) -> ResolverSnapshot {
        let step = {
            let mut inner = self.lock();
            Some(inner.begin_episodes(title_id))
        };
        self.publish();
        self.drive(step).await;
        self.snapshot()
    }

    /// Select an episode by id; unknown ids are ignored
    pub async fn select_episode(&self, episode_id: &str) -> ResolverSnapshot {
        let step = {
            let mut inner = self.lock();
            match inner.episodes.iter().position(|e| e.id == episode_id) {
                Some(index) => {
                    inner.selected_episode = Some(index);
                    inner.manifest = None;
                    inner.error = None;
                    inner.start_servers(episode_id)
                }
                None => None,
            }
        };
        self.publish();
        self.drive(step).await;
        self.snapshot()
    }

    /// Switch the output variant, reusing the already-loaded server list
    pub async fn set_variant(&self, variant: Variant) -> ResolverSnapshot {
        let step = {
            let mut inner = self.lock();
            if inner.variant == variant {
                None
            } else {
                inner.variant = variant;
                if inner.servers.is_empty() {
                    // Nothing resolved yet; later stages pick the change up
                    None
                } else {
                    inner.manifest = None;
                    inner.error = None;
                    inner.select_and_start_manifest()
                }
            }
        };
        self.publish();
        self.drive(step).await;
        self.snapshot()
    }

    /// Pick a server by position in the current list; out-of-range indexes
    /// are ignored
    pub async fn set_server_index(&self, index: usize) -> ResolverSnapshot {
        let step = {
            let mut inner = self.lock();
            match inner.servers.get(index).cloned() {
                Some(server) => {
                    let requested = inner.variant;
                    inner.last_server_name = Some(server.name.clone());
                    inner.choice = Some(ServerChoice {
                        index,
                        server,
                        requested,
                    });
                    inner.error = None;
                    inner.start_manifest()
                }
                None => None,
            }
        };
        self.publish();
        self.drive(step).await;
        self.snapshot()
    }

    /// Re-run the cascade from the failed stage
    pub async fn retry(&self) -> ResolverSnapshot {
        let step = {
            let mut inner = self.lock();
            let stage = match (&inner.phase, &inner.error) {
                (ResolvePhase::Failed, Some(error)) => error.stage(),
                _ => return self.snapshot(),
            };
            match stage {
                Stage::Episodes => inner.title_id.clone().map(|t| inner.begin_episodes(&t)),
                Stage::Servers => match inner.selected_episode_id() {
                    Some(episode_id) => {
                        // Bypass the cache; the cached list produced the failure
                        inner.server_cache.remove(&episode_id);
                        inner.error = None;
                        inner.start_servers(&episode_id)
                    }
                    None => None,
                },
                Stage::Manifest => {
                    inner.error = None;
                    inner.start_manifest()
                }
            }
        };
        self.publish();
        self.drive(step).await;
        self.snapshot()
    }

    /// Run fetches until the cascade settles or a newer request supersedes
    /// this chain
    async fn drive(&self, first: Option<Fetch>) {
        let mut next = first;
        while let Some(step) = next {
            next = match step {
                Fetch::Episodes { title_id, seq } => {
                    let result = self.client.episodes(&title_id).await;
                    self.apply(|inner| inner.complete_episodes(seq, result))
                }
                Fetch::Servers { episode_id, seq } => {
                    let result = self.client.servers(&episode_id).await;
                    self.apply(|inner| inner.complete_servers(seq, result))
                }
                Fetch::Manifest { key, seq } => {
                    let result = self
                        .client
                        .stream_manifest(&key.episode_id, &key.server_name, key.variant)
                        .await;
                    self.apply(|inner| inner.complete_manifest(seq, result))
                }
            };
        }
    }

    fn apply(&self, complete: impl FnOnce(&mut ResolverInner) -> Option<Fetch>) -> Option<Fetch> {
        let next = {
            let mut inner = self.lock();
            complete(&mut inner)
        };
        self.publish();
        next
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResolverInner> {
        self.inner.lock().expect("resolver state poisoned")
    }

    fn publish(&self) {
        let snapshot = self.lock().snapshot();
        self.snapshot_tx.send_replace(snapshot);
    }
}
