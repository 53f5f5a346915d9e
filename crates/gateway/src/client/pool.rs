//! Session pool.
//!
//! Owns the catalogue sessions for the gateway's configured identity. A
//! counting semaphore bounds outstanding borrows at `max_size`; the free
//! list is guarded by a mutex that is never held across a network call. A
//! session whose remaining lifetime dips below the refresh threshold is
//! refreshed out-of-line on borrow, and a background maintenance task keeps
//! idle sessions fresh so active borrows never see an expired one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::{CatalogueError, CatalogueTransport, Session};
use crate::error::GatewayError;

/// Pool sizing and timing knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Sessions authenticated eagerly at startup.
    pub init_size: usize,

    /// Upper bound on concurrently borrowed sessions.
    pub max_size: usize,

    /// How long a borrow waits before failing with `PoolExhausted`.
    pub borrow_timeout: Duration,

    /// Sessions below this many remaining minutes are refreshed before
    /// being handed out.
    pub refresh_threshold_mins: f64,
}

/// Pool of authenticated catalogue sessions for a single identity.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    transport: Arc<dyn CatalogueTransport>,
    mechanism: String,
    username: String,
    password: String,
    free: Mutex<VecDeque<Session>>,
    permits: Arc<Semaphore>,
    config: PoolConfig,
}

impl PoolInner {
    fn push_free(&self, session: Session) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(session);
    }

    fn pop_free(&self) -> Option<Session> {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    async fn login(&self) -> Result<Session, GatewayError> {
        self.transport
            .login(&self.mechanism, &self.username, &self.password)
            .await
            .map_err(|err| match err {
                CatalogueError::Timeout | CatalogueError::Http(_) => {
                    GatewayError::CatalogueUnavailable
                }
                other => {
                    warn!(error = %other, "catalogue login failed");
                    GatewayError::AuthenticationFailed
                }
            })
    }
}

impl SessionPool {
    /// Create the pool and eagerly authenticate `init_size` sessions so the
    /// first requests do not pay the handshake latency.
    pub async fn new(
        transport: Arc<dyn CatalogueTransport>,
        mechanism: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        config: PoolConfig,
    ) -> Result<Self, GatewayError> {
        let inner = Arc::new(PoolInner {
            transport,
            mechanism: mechanism.into(),
            username: username.into(),
            password: password.into(),
            free: Mutex::new(VecDeque::new()),
            permits: Arc::new(Semaphore::new(config.max_size)),
            config,
        });

        for _ in 0..inner.config.init_size {
            let session = inner.login().await?;
            inner.push_free(session);
        }
        info!(
            init = inner.config.init_size,
            max = inner.config.max_size,
            "session pool ready"
        );

        Ok(SessionPool { inner })
    }

    /// Borrow a session, waiting up to the borrow timeout for capacity.
    pub async fn borrow(&self) -> Result<PooledSession, GatewayError> {
        let permit = tokio::time::timeout(
            self.inner.config.borrow_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| GatewayError::PoolExhausted)?
        .map_err(|_| GatewayError::Internal(anyhow::anyhow!("session pool closed")))?;

        let session = match self.inner.pop_free() {
            Some(session)
                if session.remaining_minutes() > self.inner.config.refresh_threshold_mins =>
            {
                session
            }
            Some(mut stale) => {
                // Refresh out-of-line; replace the session if the catalogue
                // no longer recognises it.
                match self.inner.transport.refresh(&stale.id).await {
                    Ok(minutes) => {
                        stale.refreshed(minutes);
                        stale
                    }
                    Err(err) => {
                        debug!(error = %err, "discarding unrefreshable session");
                        self.inner.login().await?
                    }
                }
            }
            None => self.inner.login().await?,
        };

        Ok(PooledSession {
            session: Some(session),
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Spawn the background task that periodically refreshes idle sessions.
    pub fn spawn_maintenance(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; freshly initialised sessions
            // are above the threshold and pass through untouched.
            loop {
                ticker.tick().await;

                let idle: Vec<Session> = {
                    let mut free = inner.free.lock().unwrap_or_else(PoisonError::into_inner);
                    free.drain(..).collect()
                };
                if idle.is_empty() {
                    continue;
                }

                let mut kept = Vec::with_capacity(idle.len());
                for mut session in idle {
                    if session.remaining_minutes() > inner.config.refresh_threshold_mins * 2.0 {
                        kept.push(session);
                        continue;
                    }
                    match inner.transport.refresh(&session.id).await {
                        Ok(minutes) => {
                            session.refreshed(minutes);
                            kept.push(session);
                        }
                        Err(err) => {
                            warn!(error = %err, "dropping idle session that failed to refresh");
                        }
                    }
                }

                let restored = kept.len();
                {
                    let mut free = inner.free.lock().unwrap_or_else(PoisonError::into_inner);
                    free.extend(kept);
                }
                debug!(sessions = restored, "session maintenance pass complete");
            }
        })
    }

    /// Idle sessions currently in the free list.
    pub fn available(&self) -> usize {
        self.inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Permits still available for borrowing.
    pub fn spare_capacity(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

/// A borrowed session. Dropping the guard returns the session to the pool;
/// [`PooledSession::invalidate`] discards it instead, for sessions the
/// catalogue has reported as gone. Either way the capacity permit is
/// released, so the release path runs on every exit, panics and
/// cancellations included.
pub struct PooledSession {
    session: Option<Session>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("session", &self.session)
            .finish()
    }
}

impl PooledSession {
    /// The catalogue session id.
    pub fn id(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.id.as_str())
            .unwrap_or_default()
    }

    /// Drop the session without returning it to the pool.
    pub fn invalidate(mut self) {
        self.session = None;
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.inner.push_free(session);
        }
    }
}
