//! Core hook types for plugin lifecycle events.
//!
//! These types define the lifecycle hook system. Script-based handlers live
//! in `mpm-plugins`; this module provides the trait, payloads, and the
//! dispatching registry so any crate can raise events without depending on
//! the plugin store.

use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

// ── HookEvent ───────────────────────────────────────────────────────────────

/// Plugin lifecycle events that hooks can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    PostInstall,
    PreUninstall,
    PostEnable,
    PostDisable,
    PostUpdate,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl HookEvent {
    /// All variants, for iteration.
    pub const ALL: &'static [HookEvent] = &[
        Self::PostInstall,
        Self::PreUninstall,
        Self::PostEnable,
        Self::PostDisable,
        Self::PostUpdate,
    ];

    /// Returns true if this event is informational: handlers run in parallel
    /// and cannot block the operation that raised it.
    pub fn is_informational(&self) -> bool {
        !matches!(self, Self::PreUninstall)
    }
}

// ── HookPayload ─────────────────────────────────────────────────────────────

/// Typed payload carried with each hook event.
///
/// Every payload names the plugin package and its directory so script
/// handlers can locate per-plugin hook scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HookPayload {
    PostInstall {
        package_name: String,
        version: String,
        plugin_dir: PathBuf,
    },
    PreUninstall {
        package_name: String,
        version: Option<String>,
        plugin_dir: PathBuf,
    },
    PostEnable {
        package_name: String,
        plugin_dir: PathBuf,
    },
    PostDisable {
        package_name: String,
        plugin_dir: PathBuf,
    },
    PostUpdate {
        package_name: String,
        old_version: String,
        new_version: String,
        plugin_dir: PathBuf,
    },
}

impl HookPayload {
    /// Returns the [`HookEvent`] variant that matches this payload.
    pub fn event(&self) -> HookEvent {
        match self {
            Self::PostInstall { .. } => HookEvent::PostInstall,
            Self::PreUninstall { .. } => HookEvent::PreUninstall,
            Self::PostEnable { .. } => HookEvent::PostEnable,
            Self::PostDisable { .. } => HookEvent::PostDisable,
            Self::PostUpdate { .. } => HookEvent::PostUpdate,
        }
    }

    /// Name of the plugin package this payload concerns.
    pub fn package_name(&self) -> &str {
        match self {
            Self::PostInstall { package_name, .. }
            | Self::PreUninstall { package_name, .. }
            | Self::PostEnable { package_name, .. }
            | Self::PostDisable { package_name, .. }
            | Self::PostUpdate { package_name, .. } => package_name,
        }
    }

    /// Filesystem directory of the plugin this payload concerns.
    pub fn plugin_dir(&self) -> &PathBuf {
        match self {
            Self::PostInstall { plugin_dir, .. }
            | Self::PreUninstall { plugin_dir, .. }
            | Self::PostEnable { plugin_dir, .. }
            | Self::PostDisable { plugin_dir, .. }
            | Self::PostUpdate { plugin_dir, .. } => plugin_dir,
        }
    }
}

// ── HookAction ──────────────────────────────────────────────────────────────

/// The outcome a hook handler returns.
#[derive(Debug, Default)]
pub enum HookAction {
    /// Let the operation proceed normally.
    #[default]
    Continue,
    /// Block the operation entirely, with a reason string.
    ///
    /// Only honored for pre events; informational events log and ignore it.
    Block(String),
}

// ── HookHandler trait ───────────────────────────────────────────────────────

/// Trait implemented by native and script hook handlers.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// A human-readable name for this handler.
    fn name(&self) -> &str;

    /// Which events this handler subscribes to.
    fn events(&self) -> &[HookEvent];

    /// Priority for ordering. Higher values run first. Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Handle the event, returning an action that may block the operation.
    async fn handle(&self, event: HookEvent, payload: &HookPayload) -> Result<HookAction>;
}

// ── HookStats ───────────────────────────────────────────────────────────────

/// Per-handler call statistics.
pub struct HookStats {
    pub call_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub total_latency_us: AtomicU64,
}

impl HookStats {
    pub fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> Duration {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return Duration::ZERO;
        }
        let total = self.total_latency_us.load(Ordering::Relaxed);
        Duration::from_micros(total / calls)
    }
}

impl Default for HookStats {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handler entry (with stats) ──────────────────────────────────────────────

struct HandlerEntry {
    handler: Arc<dyn HookHandler>,
    stats: Arc<HookStats>,
}

// ── HookRegistry ────────────────────────────────────────────────────────────

/// Manages registered hook handlers and dispatches events to them.
pub struct HookRegistry {
    handlers: HashMap<HookEvent, Vec<HandlerEntry>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for all events it subscribes to.
    /// Handlers are sorted by priority (descending) within each event.
    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        let stats = Arc::new(HookStats::new());
        for &event in handler.events() {
            let entry = HandlerEntry {
                handler: Arc::clone(&handler),
                stats: Arc::clone(&stats),
            };
            let handlers = self.handlers.entry(event).or_default();
            handlers.push(entry);
            // Higher priority first.
            handlers.sort_by_key(|h| std::cmp::Reverse(h.handler.priority()));
        }
        debug!(handler = handler.name(), "hook handler registered");
    }

    /// Returns true if any handlers are registered for the given event.
    pub fn has_handlers(&self, event: HookEvent) -> bool {
        self.handlers.get(&event).is_some_and(|v| !v.is_empty())
    }

    /// Get stats for a named handler. Returns None if not found.
    pub fn handler_stats(&self, name: &str) -> Option<Arc<HookStats>> {
        for entries in self.handlers.values() {
            for entry in entries {
                if entry.handler.name() == name {
                    return Some(Arc::clone(&entry.stats));
                }
            }
        }
        None
    }

    /// List all registered handler names (deduplicated).
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .values()
            .flatten()
            .map(|e| e.handler.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Informational (post) events dispatch handlers in parallel; Block
    /// results are logged and ignored. Pre events dispatch sequentially and
    /// return the first [`HookAction::Block`] encountered (short-circuits).
    /// Handler errors are non-fatal in both modes.
    pub async fn dispatch(&self, payload: &HookPayload) -> Result<HookAction> {
        let event = payload.event();
        let handlers = match self.handlers.get(&event) {
            Some(h) if !h.is_empty() => h,
            _ => return Ok(HookAction::Continue),
        };

        debug!(event = %event, count = handlers.len(), "dispatching hook event");

        if event.is_informational() {
            self.dispatch_parallel(event, payload, handlers).await
        } else {
            self.dispatch_sequential(event, payload, handlers).await
        }
    }

    async fn dispatch_parallel(
        &self,
        event: HookEvent,
        payload: &HookPayload,
        handlers: &[HandlerEntry],
    ) -> Result<HookAction> {
        let mut futures = Vec::new();
        for entry in handlers {
            let handler = Arc::clone(&entry.handler);
            let stats = Arc::clone(&entry.stats);
            let payload = payload.clone();
            futures.push(async move {
                let start = Instant::now();
                let result = handler.handle(event, &payload).await;
                let latency = start.elapsed();
                match &result {
                    Ok(_) => stats.record_success(latency),
                    Err(_) => stats.record_failure(latency),
                }
                (handler.name().to_string(), result)
            });
        }

        let results = futures::future::join_all(futures).await;
        for (name, result) in results {
            match result {
                Ok(HookAction::Continue) => {},
                Ok(HookAction::Block(reason)) => {
                    debug!(handler = %name, event = %event, reason = %reason, "hook block on informational event (ignored)");
                },
                Err(e) => {
                    warn!(handler = %name, event = %event, error = %e, "hook handler failed");
                },
            }
        }

        Ok(HookAction::Continue)
    }

    async fn dispatch_sequential(
        &self,
        event: HookEvent,
        payload: &HookPayload,
        handlers: &[HandlerEntry],
    ) -> Result<HookAction> {
        for entry in handlers {
            let start = Instant::now();
            let result = entry.handler.handle(event, payload).await;
            let latency = start.elapsed();

            match result {
                Ok(HookAction::Continue) => {
                    entry.stats.record_success(latency);
                },
                Ok(HookAction::Block(reason)) => {
                    entry.stats.record_success(latency);
                    info!(handler = entry.handler.name(), event = %event, reason = %reason, "hook blocked operation");
                    return Ok(HookAction::Block(reason));
                },
                Err(e) => {
                    entry.stats.record_failure(latency);
                    warn!(handler = entry.handler.name(), event = %event, error = %e, "hook handler failed");
                },
            }
        }

        Ok(HookAction::Continue)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
