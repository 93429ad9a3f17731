//! The caching proxy: strategies, lifecycle and prewarming

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use super::classify::{Classifier, Strategy};
use super::clock::Clock;
use super::fetcher::{FetchError, Fetcher};
use super::message::{ControlMessage, PrewarmReport};
use crate::cache::{CacheError, CacheStorage};
use crate::config::{ConfigError, ProxyConfig};
use crate::http::{Request, Response};

/// Errors surfaced to the caller of the proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Network failed and no cached fallback exists
    #[error(transparent)]
    Network(#[from] FetchError),

    /// Storage failed where it is not best-effort
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A manifest entry could not be fetched during install
    #[error("Install failed for {url}: {reason}")]
    Install { url: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Lifecycle phase of the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installed,
    Activated,
}

/// Snapshot of lifecycle flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub state: WorkerState,
    /// Take over without waiting for existing sessions to close
    pub skip_waiting: bool,
    /// Control of open sessions has been claimed
    pub clients_claimed: bool,
}

/// Response to a control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    SkipWaiting,
    Prewarmed(PrewarmReport),
}

/// Everything a detached refresh task needs, cheap to clone
#[derive(Clone)]
struct Shared {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn lookup(&self, store: &str, key: &str) -> Option<Response> {
        match self.storage.get(store, key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(store, key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Stamps and writes a successful response; failures are logged only
    fn store(&self, store: &str, key: &str, response: &Response) {
        if !response.is_success() {
            debug!(store, key, status = response.status, "not caching unsuccessful response");
            return;
        }
        let stamped = response.stamped(self.clock.now_millis());
        if let Err(e) = self.storage.put(store, key, &stamped) {
            warn!(store, key, error = %e, "cache write failed");
        }
    }

    /// Fetches and overwrites the stored entry; never reports failure
    async fn refresh(self, store: String, request: Request) {
        let key = request.cache_key();
        match self.fetcher.fetch(&request).await {
            Ok(response) => self.store(&store, &key, &response),
            Err(e) => debug!(store = %store, key = %key, error = %e, "background refresh failed"),
        }
    }
}

/// Intercepts fetches for the application and keeps its cache stores current
pub struct CacheProxy {
    config: ProxyConfig,
    origin: Url,
    classifier: Classifier,
    shell_store: String,
    shared: Shared,
    background: Mutex<JoinSet<()>>,
    lifecycle: Mutex<Lifecycle>,
}

impl CacheProxy {
    pub fn new(
        config: ProxyConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProxyError> {
        let origin = config.origin_url()?;
        let classifier = Classifier::new(&origin, &config.api_hosts);
        Ok(Self {
            shell_store: config.shell_cache_name(),
            config,
            origin,
            classifier,
            shared: Shared {
                storage,
                fetcher,
                clock,
            },
            background: Mutex::new(JoinSet::new()),
            lifecycle: Mutex::new(Lifecycle {
                state: WorkerState::Parsed,
                skip_waiting: false,
                clients_claimed: false,
            }),
        })
    }

    pub fn shell_store(&self) -> &str {
        &self.shell_store
    }

    pub fn api_store(&self) -> &str {
        &self.config.api_cache_name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_lifecycle(&self, update: impl FnOnce(&mut Lifecycle)) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut lifecycle);
    }

    /// Pre-populates the shell store with the manifest
    ///
    /// All manifest entries are fetched first; if any fails nothing is stored.
    pub async fn install(&self) -> Result<(), ProxyError> {
        let requests = self
            .config
            .precache_manifest
            .iter()
            .map(|path| Ok(Request::get(self.origin.join(path)?)))
            .collect::<Result<Vec<_>, ProxyError>>()?;

        let results = join_all(requests.iter().map(|r| self.shared.fetcher.fetch(r))).await;

        let mut fetched = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(response) if response.is_success() => fetched.push((request, response)),
                Ok(response) => {
                    return Err(ProxyError::Install {
                        url: request.url.to_string(),
                        reason: format!("status {}", response.status),
                    })
                }
                Err(e) => {
                    return Err(ProxyError::Install {
                        url: request.url.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        self.shared.storage.open(&self.shell_store)?;
        let now = self.shared.clock.now_millis();
        for (request, response) in fetched {
            self.shared
                .storage
                .put(&self.shell_store, &request.cache_key(), &response.stamped(now))?;
        }

        self.update_lifecycle(|l| {
            l.state = WorkerState::Installed;
            l.skip_waiting = true;
        });
        info!(store = %self.shell_store, entries = requests.len(), "shell precached");
        Ok(())
    }

    /// Deletes every store other than the current shell and API stores,
    /// then claims open sessions. Returns the deleted store names.
    pub async fn activate(&self) -> Result<Vec<String>, ProxyError> {
        let keep = [self.shell_store.as_str(), self.config.api_cache_name.as_str()];

        let mut deleted = Vec::new();
        for name in self.shared.storage.store_names()? {
            if keep.contains(&name.as_str()) {
                continue;
            }
            if self.shared.storage.delete_store(&name)? {
                info!(store = %name, "deleted outdated cache store");
                deleted.push(name);
            }
        }

        self.update_lifecycle(|l| {
            l.state = WorkerState::Activated;
            l.clients_claimed = true;
        });
        Ok(deleted)
    }

    pub async fn handle_message(&self, message: ControlMessage) -> MessageOutcome {
        match message {
            ControlMessage::SkipWaiting => {
                self.update_lifecycle(|l| l.skip_waiting = true);
                debug!("skip waiting requested");
                MessageOutcome::SkipWaiting
            }
            ControlMessage::CacheQuestions { subjects } => {
                MessageOutcome::Prewarmed(self.prewarm(&subjects).await)
            }
        }
    }

    /// Request for one question batch of a subject from the provider
    pub fn question_request(&self, subject: &str) -> Result<Request, ProxyError> {
        let url = Url::parse_with_params(
            &format!("https://{}/api/v2/q/40", self.config.question_host),
            &[("subject", subject), ("type", "utme")],
        )?;
        Ok(Request::get(url)
            .with_header("AccessToken", self.config.access_token.clone())
            .with_header("Accept", "application/json"))
    }

    /// Fetches and stores question batches one subject at a time
    ///
    /// A failing subject is logged and recorded; the rest still run.
    pub async fn prewarm(&self, subjects: &[String]) -> PrewarmReport {
        let mut report = PrewarmReport::default();

        for subject in subjects {
            match self.prewarm_subject(subject).await {
                Ok(()) => {
                    info!(subject = %subject, "questions cached");
                    report.cached.push(subject.clone());
                }
                Err(reason) => {
                    warn!(subject = %subject, reason = %reason, "failed to cache questions");
                    report.failed.push((subject.clone(), reason));
                }
            }
        }
        report
    }

    async fn prewarm_subject(&self, subject: &str) -> Result<(), String> {
        let request = self.question_request(subject).map_err(|e| e.to_string())?;
        let response = self
            .shared
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("status {}", response.status));
        }

        let stamped = response.stamped(self.shared.clock.now_millis());
        self.shared
            .storage
            .put(&self.config.api_cache_name, &request.cache_key(), &stamped)
            .map_err(|e| e.to_string())
    }

    /// Answers an intercepted request according to its strategy
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, ProxyError> {
        let strategy = self.classifier.classify(&request);
        debug!(url = %request.url, ?strategy, "intercepted");

        match strategy {
            Strategy::Bypass => Ok(self.shared.fetcher.fetch(&request).await?),
            Strategy::Api => self.api_strategy(request).await,
            Strategy::CrossOrigin => self.cross_origin_strategy(request).await,
            Strategy::Navigation => self.navigation_strategy(request).await,
            Strategy::ShellAsset => self.shell_asset_strategy(request).await,
        }
    }

    async fn api_strategy(&self, request: Request) -> Result<Response, ProxyError> {
        let store = self.config.api_cache_name.clone();
        let key = request.cache_key();
        let cached = self.shared.lookup(&store, &key);

        if let Some(entry) = &cached {
            let now = self.shared.clock.now_millis();
            if !entry.is_expired(now, self.config.api_ttl_millis()) {
                debug!(key = %key, "fresh API entry, revalidating in background");
                self.spawn_refresh(store, request);
                return Ok(entry.clone());
            }
        }

        match self.shared.fetcher.fetch(&request).await {
            Ok(response) => {
                self.shared.store(&store, &key, &response);
                Ok(response)
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(key = %key, error = %e, "network failed, serving stale API entry");
                    Ok(stale)
                }
                None => Err(e.into()),
            },
        }
    }

    async fn cross_origin_strategy(&self, request: Request) -> Result<Response, ProxyError> {
        let key = request.cache_key();
        match self.shared.fetcher.fetch(&request).await {
            Ok(response) => {
                self.shared.store(&self.shell_store, &key, &response);
                Ok(response)
            }
            Err(e) => self
                .shared
                .lookup(&self.shell_store, &key)
                .ok_or(ProxyError::Network(e)),
        }
    }

    async fn navigation_strategy(&self, request: Request) -> Result<Response, ProxyError> {
        let key = request.cache_key();
        match self.shared.fetcher.fetch(&request).await {
            Ok(response) => {
                self.shared.store(&self.shell_store, &key, &response);
                Ok(response)
            }
            Err(e) => {
                let fallback = Request::get(self.origin.join(&self.config.navigation_fallback)?);
                match self.shared.lookup(&self.shell_store, &fallback.cache_key()) {
                    Some(shell) => {
                        debug!(url = %request.url, "offline navigation, serving app shell");
                        Ok(shell)
                    }
                    None => Err(e.into()),
                }
            }
        }
    }

    async fn shell_asset_strategy(&self, request: Request) -> Result<Response, ProxyError> {
        let key = request.cache_key();
        if let Some(entry) = self.shared.lookup(&self.shell_store, &key) {
            self.spawn_refresh(self.shell_store.clone(), request);
            return Ok(entry);
        }

        let response = self.shared.fetcher.fetch(&request).await?;
        self.shared.store(&self.shell_store, &key, &response);
        Ok(response)
    }

    fn spawn_refresh(&self, store: String, request: Request) {
        let shared = self.shared.clone();
        let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
        // Reap finished tasks so the set does not grow without bound
        while background.try_join_next().is_some() {}
        background.spawn(shared.refresh(store, request));
    }

    /// Waits for all background refreshes started so far
    pub async fn flush(&self) {
        loop {
            let mut pending = {
                let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *background)
            };
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "background refresh task aborted");
                }
            }
        }
    }

    /// Removes API entries older than the TTL (or unstamped); returns the count
    pub fn purge_expired(&self) -> Result<usize, ProxyError> {
        let store = &self.config.api_cache_name;
        let now = self.shared.clock.now_millis();
        let ttl = self.config.api_ttl_millis();

        let mut removed = 0;
        for key in self.shared.storage.keys(store)? {
            let expired = match self.shared.storage.get(store, &key)? {
                Some(entry) => entry.is_expired(now, ttl),
                None => false,
            };
            if expired && self.shared.storage.remove(store, &key)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(store = %store, removed, "purged expired API entries");
        }
        Ok(removed)
    }
}
