// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide session directory: active controllers, backgrounded and
//! minimized sessions, the id pool, exit watchers, and global shutdown.
//!
//! Id uniqueness is invariant across all maps: an id is either in exactly
//! one map (claimed in the pool) or free. Releases happen only when a
//! session fully terminates, never on takeover or detach transfer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ids::IdPool;
use crate::pty::PtySession;
use crate::session::ControllerHandle;

/// Poll cadence of the parked-session exit watcher.
const EXIT_POLL: Duration = Duration::from_secs(1);

/// How long an exited parked session lingers before disposal, giving the
/// user a window to reattach and see the exit.
const CLEANUP_DELAY: Duration = Duration::from_secs(30);

/// A session detached from its controller, owned by the registry.
#[derive(Debug, Clone)]
pub struct ParkedSession {
    pub id: String,
    pub name: Option<String>,
    pub command: String,
    pub reason: Option<String>,
    pub started_at: std::time::Instant,
    pub session: PtySession,
}

/// Listing entry for background/minimized sessions.
#[derive(Debug, Clone, Serialize)]
pub struct ParkedInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub running: bool,
    pub age_ms: u64,
    pub parked_ms: u64,
}

struct Tracked {
    parked: ParkedSession,
    parked_at: std::time::Instant,
    watcher: CancellationToken,
}

impl Tracked {
    fn info(&self) -> ParkedInfo {
        ParkedInfo {
            id: self.parked.id.clone(),
            name: self.parked.name.clone(),
            command: self.parked.command.clone(),
            reason: self.parked.reason.clone(),
            running: !self.parked.session.exited(),
            age_ms: self.parked.started_at.elapsed().as_millis() as u64,
            parked_ms: self.parked_at.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Default)]
struct Inner {
    pool: IdPool,
    active: HashMap<String, ControllerHandle>,
    background: HashMap<String, Tracked>,
    minimized: HashMap<String, Tracked>,
    overlay_open: bool,
}

/// Process-wide directory of sessions. All mutation is serialized behind
/// one mutex; nothing async runs under it.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner::default()), shutdown: CancellationToken::new() }
    }
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // -- Id pool --------------------------------------------------------------

    pub fn generate_id(&self) -> String {
        self.inner.lock().pool.generate()
    }

    pub fn release_id(&self, id: &str) {
        self.inner.lock().pool.release(id);
    }

    pub fn id_in_use(&self, id: &str) -> bool {
        self.inner.lock().pool.is_in_use(id)
    }

    // -- Active controllers ---------------------------------------------------

    pub fn register_active(&self, handle: ControllerHandle) {
        let mut inner = self.inner.lock();
        inner.pool.claim(&handle.id);
        debug!(id = %handle.id, "session registered");
        inner.active.insert(handle.id.clone(), handle);
    }

    /// Remove a controller from the active map. The id returns to the pool
    /// only with `release_id` (full termination, not takeover or transfer).
    pub fn unregister_active(&self, id: &str, release_id: bool) {
        let mut inner = self.inner.lock();
        inner.active.remove(id);
        if release_id {
            inner.pool.release(id);
            debug!(%id, "session unregistered, id released");
        } else {
            debug!(%id, "session unregistered, id retained");
        }
    }

    pub fn get_active(&self, id: &str) -> Option<ControllerHandle> {
        self.inner.lock().active.get(id).cloned()
    }

    pub fn list_active(&self) -> Vec<ControllerHandle> {
        self.inner.lock().active.values().cloned().collect()
    }

    pub async fn write_to_active(
        &self,
        id: &str,
        data: bytes::Bytes,
    ) -> Result<(), crate::error::ErrorCode> {
        let handle = self.get_active(id).ok_or(crate::error::ErrorCode::SessionNotFound)?;
        handle.write(data).await
    }

    pub async fn set_active_update_interval(&self, id: &str, ms: u64) -> bool {
        match self.get_active(id) {
            Some(handle) => {
                handle.set_update_interval(ms).await;
                true
            }
            None => false,
        }
    }

    pub async fn set_active_quiet_threshold(&self, id: &str, ms: u64) -> bool {
        match self.get_active(id) {
            Some(handle) => {
                handle.set_quiet_threshold(ms).await;
                true
            }
            None => false,
        }
    }

    // -- Background sessions --------------------------------------------------

    /// Park a session in the background map under a fresh id.
    pub fn add_background(
        self: &Arc<Self>,
        command: String,
        session: PtySession,
        name: Option<String>,
        reason: Option<String>,
    ) -> String {
        let id = self.generate_id();
        self.park_background(ParkedSession {
            id: id.clone(),
            name,
            command,
            reason,
            started_at: std::time::Instant::now(),
            session,
        });
        id
    }

    /// Park a session under a caller-chosen id.
    pub fn add_background_with_id(
        self: &Arc<Self>,
        id: &str,
        command: String,
        session: PtySession,
        name: Option<String>,
        reason: Option<String>,
    ) {
        self.park_background(ParkedSession {
            id: id.to_owned(),
            name,
            command,
            reason,
            started_at: std::time::Instant::now(),
            session,
        });
    }

    /// Park a session under its existing id (detach transfer keeps the id
    /// claimed).
    pub fn park_background(self: &Arc<Self>, parked: ParkedSession) {
        let token = CancellationToken::new();
        let id = parked.id.clone();
        self.spawn_exit_watcher(id.clone(), parked.session.clone(), token.clone());
        let mut inner = self.inner.lock();
        inner.pool.claim(&id);
        inner
            .background
            .insert(id.clone(), Tracked { parked, parked_at: std::time::Instant::now(), watcher: token });
        info!(%id, "session backgrounded");
    }

    /// Take a background session out of the registry (reattach). Cancels
    /// pending cleanup; the id stays claimed for the new controller.
    pub fn remove_background(&self, id: &str) -> Option<ParkedSession> {
        let tracked = self.inner.lock().background.remove(id)?;
        tracked.watcher.cancel();
        Some(tracked.parked)
    }

    /// Peek a background session, cancelling any pending cleanup and
    /// restarting its exit watcher.
    pub fn get_background(self: &Arc<Self>, id: &str) -> Option<ParkedSession> {
        let parked = {
            let mut inner = self.inner.lock();
            let tracked = inner.background.get_mut(id)?;
            tracked.watcher.cancel();
            let fresh = CancellationToken::new();
            tracked.watcher = fresh.clone();
            let parked = tracked.parked.clone();
            drop(inner);
            self.spawn_exit_watcher(parked.id.clone(), parked.session.clone(), fresh);
            parked
        };
        Some(parked)
    }

    pub fn list_background(&self) -> Vec<ParkedInfo> {
        let mut list: Vec<ParkedInfo> =
            self.inner.lock().background.values().map(Tracked::info).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    // -- Minimized sessions ---------------------------------------------------

    pub fn park_minimized(self: &Arc<Self>, parked: ParkedSession) {
        let token = CancellationToken::new();
        let id = parked.id.clone();
        self.spawn_exit_watcher(id.clone(), parked.session.clone(), token.clone());
        let mut inner = self.inner.lock();
        inner.pool.claim(&id);
        inner
            .minimized
            .insert(id.clone(), Tracked { parked, parked_at: std::time::Instant::now(), watcher: token });
        info!(%id, "session minimized");
    }

    /// Restore a minimized session (cancels cleanup; id stays claimed).
    pub fn restore(&self, id: &str) -> Option<ParkedSession> {
        let tracked = self.inner.lock().minimized.remove(id)?;
        tracked.watcher.cancel();
        Some(tracked.parked)
    }

    pub fn remove_minimized(&self, id: &str) -> Option<ParkedSession> {
        self.restore(id)
    }

    pub fn list_minimized(&self) -> Vec<ParkedInfo> {
        let mut list: Vec<ParkedInfo> =
            self.inner.lock().minimized.values().map(Tracked::info).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Move a session from background to minimized without disposing it.
    pub fn transfer_background_to_minimized(self: &Arc<Self>, id: &str) -> bool {
        match self.remove_background(id) {
            Some(parked) => {
                self.park_minimized(parked);
                true
            }
            None => false,
        }
    }

    // -- Overlay mutual exclusion ---------------------------------------------

    /// Claim the single overlay slot. Returns false when one is rendering.
    pub fn try_open_overlay(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.overlay_open {
            return false;
        }
        inner.overlay_open = true;
        true
    }

    pub fn close_overlay(&self) {
        self.inner.lock().overlay_open = false;
    }

    pub fn is_overlay_open(&self) -> bool {
        self.inner.lock().overlay_open
    }

    // -- Shutdown -------------------------------------------------------------

    /// Host-session shutdown: kill every active controller, dispose every
    /// parked session, release every id. Operates on snapshots so the
    /// natural unregister callbacks may mutate the maps concurrently.
    pub async fn kill_all(&self) {
        info!("killing all sessions");
        self.shutdown.cancel();

        let handles: Vec<ControllerHandle> =
            { self.inner.lock().active.values().cloned().collect() };
        for handle in handles {
            handle.kill().await;
        }

        let parked: Vec<Tracked> = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner
                .background
                .drain()
                .map(|(_, t)| t)
                .chain(inner.minimized.drain().map(|(_, t)| t))
                .collect()
        };
        for tracked in parked {
            tracked.watcher.cancel();
            tracked.parked.session.dispose();
            self.inner.lock().pool.release(&tracked.parked.id);
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // -- Exit watcher ---------------------------------------------------------

    /// Poll a parked session for exit; once observed, arm the cleanup timer
    /// and dispose unless a reattach or transfer cancels it.
    fn spawn_exit_watcher(self: &Arc<Self>, id: String, session: PtySession, token: CancellationToken) {
        let registry = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(EXIT_POLL) => {
                        if session.exited() {
                            break;
                        }
                    }
                }
            }

            debug!(%id, "parked session exited, cleanup armed");
            tokio::select! {
                _ = token.cancelled() => return,
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(CLEANUP_DELAY) => {}
            }
            registry.reap_parked(&id);
        });
    }

    fn reap_parked(&self, id: &str) {
        let tracked = {
            let mut inner = self.inner.lock();
            inner.background.remove(id).or_else(|| inner.minimized.remove(id))
        };
        if let Some(tracked) = tracked {
            tracked.parked.session.dispose();
            self.inner.lock().pool.release(id);
            info!(%id, "parked session reaped");
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
