//! Catalogue service.
//!
//! Per-request orchestration: build the query, lease a session (an explicit
//! token from the request, or a pooled one), execute against the catalogue,
//! and project Search API results back through the mapping. This is the only
//! component that talks to the session pool.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::client::{
    AuthCache, CatalogueError, CatalogueTransport, SessionDetails, SessionPool,
};
use crate::error::{GatewayError, GatewayResult};
use crate::filter::{Filter, FilterValue, WhereExpr};
use crate::query::{IcatQueryBuilder, QueryBuilder};
use crate::schema;
use crate::search::{reshape_record, rewrite_filter, SearchMapping};

/// Orchestrates catalogue access for both API surfaces.
pub struct CatalogueService {
    transport: Arc<dyn CatalogueTransport>,
    pool: SessionPool,
    auth_cache: AuthCache,
    builder: IcatQueryBuilder,
    mapping: Arc<SearchMapping>,
}

impl CatalogueService {
    pub fn new(
        transport: Arc<dyn CatalogueTransport>,
        pool: SessionPool,
        auth_cache: AuthCache,
        mapping: Arc<SearchMapping>,
    ) -> Self {
        CatalogueService {
            transport,
            pool,
            auth_cache,
            builder: IcatQueryBuilder,
            mapping,
        }
    }

    /// Run `op` under a session. With an explicit token the catalogue's
    /// verdict is final; with a pooled session an expired-session failure is
    /// retried once against a fresh session, invalidating the old one. The
    /// pool guard releases on every exit path.
    async fn with_session<T, F, Fut>(&self, session: Option<&str>, op: F) -> GatewayResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, CatalogueError>>,
    {
        match session {
            Some(id) => Ok(op(id.to_string()).await?),
            None => {
                let guard = self.pool.borrow().await?;
                match op(guard.id().to_string()).await {
                    Ok(value) => Ok(value),
                    Err(CatalogueError::SessionExpired) => {
                        info!("pooled session expired mid-request, retrying once");
                        guard.invalidate();
                        let retry = self.pool.borrow().await?;
                        Ok(op(retry.id().to_string()).await?)
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    async fn run_query(&self, session: Option<&str>, query: &str) -> GatewayResult<Vec<Value>> {
        debug!(query = %query, "executing catalogue query");
        self.with_session(session, |id| {
            let transport = self.transport.clone();
            let query = query.to_string();
            async move { transport.search(&id, &query).await }
        })
        .await
    }

    fn canonical_entity(entity: &str) -> GatewayResult<&'static str> {
        schema::resolve_entity(entity)
            .map(|e| e.name)
            .ok_or_else(|| GatewayError::BadRequest(format!("unknown entity '{entity}'")))
    }

    // -----------------------------------------------------------------------
    // DataGateway surface
    // -----------------------------------------------------------------------

    /// All records of `entity` matching `filter`.
    pub async fn list(
        &self,
        session: Option<&str>,
        entity: &str,
        filter: &Filter,
    ) -> GatewayResult<Vec<Value>> {
        let built = self.builder.build(entity, filter)?;
        self.run_query(session, &built.query).await
    }

    /// One record by id, or `NotFound`.
    pub async fn get_by_id(
        &self,
        session: Option<&str>,
        entity: &str,
        id: i64,
    ) -> GatewayResult<Value> {
        let mut filter = Filter::default();
        filter.and_where(WhereExpr::eq("id", FilterValue::Integer(id)));

        let built = self.builder.build(entity, &filter)?;
        let rows = self.run_query(session, &built.query).await?;
        rows.into_iter().next().ok_or(GatewayError::NotFound)
    }

    /// First record matching `filter`, or `NotFound`.
    pub async fn find_one(
        &self,
        session: Option<&str>,
        entity: &str,
        filter: &Filter,
    ) -> GatewayResult<Value> {
        let mut limited = filter.clone();
        limited.limit = Some(1);

        let rows = self.list(session, entity, &limited).await?;
        rows.into_iter().next().ok_or(GatewayError::NotFound)
    }

    /// Number of records matching `filter`.
    pub async fn count(
        &self,
        session: Option<&str>,
        entity: &str,
        filter: &Filter,
    ) -> GatewayResult<u64> {
        let built = self.builder.build_count(entity, filter)?;
        let rows = self.run_query(session, &built.query).await?;
        count_from_rows(rows)
    }

    /// Create records and return them re-read from the catalogue.
    pub async fn create(
        &self,
        session: Option<&str>,
        entity: &str,
        records: Vec<Value>,
    ) -> GatewayResult<Vec<Value>> {
        let name = Self::canonical_entity(entity)?;

        let ids = self
            .with_session(session, |id| {
                let transport = self.transport.clone();
                let records = records.clone();
                async move { transport.create(&id, name, &records).await }
            })
            .await?;

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            created.push(self.get_by_id(session, entity, id).await?);
        }
        Ok(created)
    }

    /// Update records (each must carry its id) and return them re-read.
    pub async fn update(
        &self,
        session: Option<&str>,
        entity: &str,
        records: Vec<Value>,
    ) -> GatewayResult<Vec<Value>> {
        let name = Self::canonical_entity(entity)?;

        let mut updated = Vec::with_capacity(records.len());
        for record in records {
            let id = record
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| GatewayError::BadRequest("update requires an id".to_string()))?;

            self.with_session(session, |sid| {
                let transport = self.transport.clone();
                let record = record.clone();
                async move { transport.update(&sid, name, &record).await }
            })
            .await?;

            updated.push(self.get_by_id(session, entity, id).await?);
        }
        Ok(updated)
    }

    /// Delete one record by id.
    pub async fn delete(
        &self,
        session: Option<&str>,
        entity: &str,
        id: i64,
    ) -> GatewayResult<()> {
        let name = Self::canonical_entity(entity)?;
        self.with_session(session, |sid| {
            let transport = self.transport.clone();
            async move { transport.delete(&sid, name, id).await }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Search API surface
    // -----------------------------------------------------------------------

    /// Search records of a Search-schema entity, reshaped per the mapping.
    pub async fn search_list(&self, entity: &str, filter: &Filter) -> GatewayResult<Vec<Value>> {
        let (root, rewritten) = rewrite_filter(&self.mapping, entity, filter)?;
        let built = self.builder.build(&root, &rewritten)?;
        let rows = self.run_query(None, &built.query).await?;

        Ok(rows
            .iter()
            .filter_map(|row| reshape_record(&self.mapping, entity, row, &filter.include))
            .collect())
    }

    /// Count records of a Search-schema entity.
    pub async fn search_count(&self, entity: &str, filter: &Filter) -> GatewayResult<u64> {
        let (root, rewritten) = rewrite_filter(&self.mapping, entity, filter)?;
        let built = self.builder.build_count(&root, &rewritten)?;
        let rows = self.run_query(None, &built.query).await?;
        count_from_rows(rows)
    }

    /// One Search record by persistent identifier, or `NotFound`.
    pub async fn search_one(
        &self,
        entity: &str,
        pid: &str,
        filter: &Filter,
    ) -> GatewayResult<Value> {
        let mut scoped = filter.clone();
        scoped.and_where(WhereExpr::eq("pid", FilterValue::String(pid.to_string())));
        scoped.limit = Some(1);

        let records = self.search_list(entity, &scoped).await?;
        records.into_iter().next().ok_or(GatewayError::NotFound)
    }

    /// Files of one dataset: a File query with an implicit dataset.pid
    /// conjunct on top of the caller's filter.
    pub async fn dataset_files(&self, pid: &str, filter: &Filter) -> GatewayResult<Vec<Value>> {
        let mut scoped = filter.clone();
        scoped.and_where(WhereExpr::eq(
            "dataset.pid",
            FilterValue::String(pid.to_string()),
        ));
        self.search_list("File", &scoped).await
    }

    /// Count of one dataset's files.
    pub async fn dataset_files_count(&self, pid: &str, filter: &Filter) -> GatewayResult<u64> {
        let mut scoped = filter.clone();
        scoped.and_where(WhereExpr::eq(
            "dataset.pid",
            FilterValue::String(pid.to_string()),
        ));
        self.search_count("File", &scoped).await
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Explicit login. The login cache short-circuits repeated handshakes
    /// for the same identity; stale entries are verified and evicted.
    pub async fn login(
        &self,
        mechanism: &str,
        username: &str,
        password: &str,
    ) -> GatewayResult<String> {
        if let Some(cached) = self.auth_cache.get(mechanism, username) {
            if self.transport.session_details(&cached).await.is_ok() {
                debug!(mechanism, username, "login served from cache");
                return Ok(cached);
            }
            self.auth_cache.evict(mechanism, username);
        }

        let session = self
            .transport
            .login(mechanism, username, password)
            .await
            .map_err(|err| match err {
                CatalogueError::Timeout | CatalogueError::Http(_) => {
                    GatewayError::CatalogueUnavailable
                }
                _ => GatewayError::AuthenticationFailed,
            })?;

        self.auth_cache
            .put(mechanism, username, session.id.clone());
        Ok(session.id)
    }

    /// Details of an explicit session.
    pub async fn session_details(&self, session_id: &str) -> GatewayResult<SessionDetails> {
        Ok(self.transport.session_details(session_id).await?)
    }

    /// Log an explicit session out.
    pub async fn logout(&self, session_id: &str) -> GatewayResult<()> {
        Ok(self.transport.logout(session_id).await?)
    }

    /// Refresh an explicit session.
    pub async fn refresh(&self, session_id: &str) -> GatewayResult<()> {
        self.transport.refresh(session_id).await?;
        Ok(())
    }
}

/// Aggregate queries return a single bare number.
fn count_from_rows(rows: Vec<Value>) -> GatewayResult<u64> {
    rows.first()
        .and_then(Value::as_u64)
        .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("catalogue returned no count")))
}
