#![allow(clippy::unwrap_used, clippy::expect_used)]
// Not every test binary uses every fixture.
#![allow(dead_code)]
//! Shared test fixtures: an in-memory catalogue transport and service
//! builders, so no test needs a live catalogue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use datagateway::catalogue::CatalogueService;
use datagateway::client::{
    AuthCache, CatalogueError, CatalogueTransport, PoolConfig, Session, SessionDetails,
    SessionPool,
};
use datagateway::search::SearchMapping;

/// The mapping file shipped with the gateway, shared by the search tests.
pub const MAPPING_JSON: &str = include_str!("../../../../search_api_mapping.json");

/// In-memory catalogue. Search responses are queued per call; everything
/// else is counted and succeeds.
pub struct MockTransport {
    pub login_count: AtomicUsize,
    pub refresh_count: AtomicUsize,
    pub search_count: AtomicUsize,
    /// Artificial latency applied to every search call.
    pub search_delay: Option<Duration>,
    /// Lifetime reported for every issued or refreshed session.
    pub session_lifetime_mins: f64,
    responses: Mutex<VecDeque<Result<Vec<Value>, CatalogueError>>>,
    session_counter: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            login_count: AtomicUsize::new(0),
            refresh_count: AtomicUsize::new(0),
            search_count: AtomicUsize::new(0),
            search_delay: None,
            session_lifetime_mins: 120.0,
            responses: Mutex::new(VecDeque::new()),
            session_counter: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        MockTransport {
            search_delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn with_lifetime(minutes: f64) -> Self {
        MockTransport {
            session_lifetime_mins: minutes,
            ..Self::new()
        }
    }

    /// Queue rows for the next search call; unqueued calls return [].
    pub fn queue_rows(&self, rows: Vec<Value>) {
        self.responses.lock().unwrap().push_back(Ok(rows));
    }

    /// Queue a failure for the next search call.
    pub fn queue_error(&self, err: CatalogueError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogueTransport for MockTransport {
    async fn login(
        &self,
        _mechanism: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Session, CatalogueError> {
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst);
        self.login_count.fetch_add(1, Ordering::SeqCst);
        Ok(Session::new(format!("sess-{n}"), self.session_lifetime_mins))
    }

    async fn refresh(&self, _session_id: &str) -> Result<f64, CatalogueError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.session_lifetime_mins)
    }

    async fn logout(&self, _session_id: &str) -> Result<(), CatalogueError> {
        Ok(())
    }

    async fn session_details(&self, session_id: &str) -> Result<SessionDetails, CatalogueError> {
        if session_id.starts_with("gone-") {
            return Err(CatalogueError::SessionExpired);
        }
        Ok(SessionDetails {
            user_name: "simple/root".to_string(),
            remaining_minutes: self.session_lifetime_mins,
        })
    }

    async fn search(&self, _session_id: &str, _query: &str) -> Result<Vec<Value>, CatalogueError> {
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        self.search_count.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    async fn create(
        &self,
        _session_id: &str,
        _entity: &str,
        records: &[Value],
    ) -> Result<Vec<i64>, CatalogueError> {
        Ok((1..=records.len() as i64).collect())
    }

    async fn update(
        &self,
        _session_id: &str,
        _entity: &str,
        _record: &Value,
    ) -> Result<(), CatalogueError> {
        Ok(())
    }

    async fn delete(
        &self,
        _session_id: &str,
        _entity: &str,
        _id: i64,
    ) -> Result<(), CatalogueError> {
        Ok(())
    }
}

/// Pool config with test-friendly timings.
pub fn pool_config(init: usize, max: usize, borrow_timeout: Duration) -> PoolConfig {
    PoolConfig {
        init_size: init,
        max_size: max,
        borrow_timeout,
        refresh_threshold_mins: 5.0,
    }
}

/// Build a pool over the given transport.
pub async fn pool(transport: Arc<MockTransport>, config: PoolConfig) -> SessionPool {
    SessionPool::new(transport, "simple", "root", "pw", config)
        .await
        .expect("pool init")
}

/// Build a full catalogue service over the given transport, using the
/// shipped Search mapping.
pub async fn service(transport: Arc<MockTransport>) -> CatalogueService {
    let pool = pool(
        transport.clone(),
        pool_config(1, 4, Duration::from_millis(200)),
    )
    .await;
    let mapping = Arc::new(SearchMapping::from_str(MAPPING_JSON).expect("mapping"));
    CatalogueService::new(transport, pool, AuthCache::new(8), mapping)
}
