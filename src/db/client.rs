use std::{
    sync::{Arc, atomic::{AtomicU32, Ordering}},
    time::{Duration, Instant},
};
use deadpool_postgres::{Pool, PoolError};
use postgres_types::ToSql;
use tokio_postgres::Row;

use crate::{prelude::*, query::QuerySpec};
use super::sql::{self, Table};


/// Error of all database operations: either no connection could be obtained
/// from the pool, or the query itself failed (`PoolError::Backend`).
pub(crate) type DbError = PoolError;

/// Database handle for one API request or one subscription connection.
///
/// A connection is checked out of the pool for each query and returned right
/// afterwards, so holding a `Db` for the lifetime of a WebSocket connection
/// does not block a connection. Cloning is cheap; clones share the query
/// counter.
#[derive(Clone)]
pub(crate) struct Db {
    pool: Pool,
    num_queries: Arc<AtomicU32>,
}

impl Db {
    pub(crate) fn new(pool: Pool) -> Self {
        Self { pool, num_queries: Arc::new(AtomicU32::new(0)) }
    }

    pub(crate) fn num_queries(&self) -> u32 {
        self.num_queries.load(Ordering::SeqCst)
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, DbError> {
        let before = Instant::now();
        let client = self.pool.get().await.inspect_err(|e| {
            error!("Failed to obtain DB connection for API request: {e}");
        })?;

        let acquire_conn_time = before.elapsed();
        if acquire_conn_time > Duration::from_millis(5) {
            warn!("Acquiring DB connection from pool took {:.2?}", acquire_conn_time);
        }

        Ok(client)
    }

    // The following methods automatically use the statement cache of the
    // checked out connection. Queries rendered from a `QuerySpec` only come in
    // a limited number of shapes, so the cache stays small.

    pub(crate) async fn query(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, DbError> {
        trace!("Executing SQL query: \"{}\" with {:?}", query, params);
        let client = self.client().await?;
        let statement = client.prepare_cached(query).await?;
        self.num_queries.fetch_add(1, Ordering::SeqCst);
        Ok(client.query(&statement, params).await?)
    }

    pub(crate) async fn query_opt(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, DbError> {
        trace!("Executing SQL query: \"{}\" with {:?}", query, params);
        let client = self.client().await?;
        let statement = client.prepare_cached(query).await?;
        self.num_queries.fetch_add(1, Ordering::SeqCst);
        Ok(client.query_opt(&statement, params).await?)
    }

    pub(crate) async fn execute(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, DbError> {
        trace!("Executing SQL query: \"{}\" with {:?}", query, params);
        let client = self.client().await?;
        let statement = client.prepare_cached(query).await?;
        self.num_queries.fetch_add(1, Ordering::SeqCst);
        Ok(client.execute(&statement, params).await?)
    }

    /// Runs the list query described by `spec` on the table of `T`.
    pub(crate) async fn load<T: Table>(&self, spec: &QuerySpec) -> Result<Vec<T>, DbError> {
        let rendered = sql::render_select::<T>(spec);
        let rows = self.query(&rendered.sql, &rendered.params()).await?;
        Ok(rows.iter().map(T::from_row).collect())
    }

    /// Like [`Self::load`], but only returns the first row.
    pub(crate) async fn load_first<T: Table>(&self, spec: &QuerySpec) -> Result<Option<T>, DbError> {
        Ok(self.load::<T>(spec).await?.into_iter().next())
    }
}
