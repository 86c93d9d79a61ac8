//! `PostgreSQL` implementation of the `Repository` trait.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use strata_core::error::EventStoreError;
use strata_core::event::EventMetadata;
use strata_core::repository::{
    AppendResult, DEFAULT_PAGE_SIZE, DuplicateCheck, EventFilter, ExpectedVersion, Repository,
    StoredEvent,
};

use crate::schema::CREATE_EVENT_STORE;
use crate::unit_of_work::PgUnitOfWork;

/// Translates a driver error at the repository boundary.
pub(crate) fn db_error(error: sqlx::Error) -> EventStoreError {
    match error {
        sqlx::Error::RowNotFound => EventStoreError::NotFound("row not found".into()),
        other => EventStoreError::Infrastructure(other.to_string()),
    }
}

fn to_db(value: u64) -> Result<i64, EventStoreError> {
    i64::try_from(value)
        .map_err(|_| EventStoreError::Infrastructure(format!("value {value} out of range")))
}

fn from_db(value: i64) -> Result<u64, EventStoreError> {
    u64::try_from(value).map_err(|_| {
        EventStoreError::Infrastructure(format!("invalid position from database: {value}"))
    })
}

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
    page_size: u64,
}

impl PgRepository {
    /// Creates a new `PgRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the page size readers use against this repository.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begins a unit of work on this repository's pool.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if no connection can be
    /// acquired.
    pub async fn begin(&self) -> Result<PgUnitOfWork, EventStoreError> {
        PgUnitOfWork::begin(&self.pool).await
    }

    /// Creates the tables if they do not exist, without the migrator.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if the DDL fails.
    pub async fn install_schema(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(CREATE_EVENT_STORE)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

/// Serializes writers of one stream until the transaction ends.
async fn lock_stream(conn: &mut PgConnection, stream_name: &str) -> Result<(), EventStoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(stream_name)
        .execute(conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

async fn current_version(conn: &mut PgConnection, stream_name: &str) -> Result<u64, EventStoreError> {
    let version: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position), 0)::BIGINT FROM stream_events WHERE stream_name = $1",
    )
    .bind(stream_name)
    .fetch_one(conn)
    .await
    .map_err(db_error)?;
    from_db(version)
}

/// Links `event_ids` after position `after`, in order.
async fn insert_members(
    conn: &mut PgConnection,
    stream_name: &str,
    event_ids: &[Uuid],
    after: u64,
) -> Result<u64, EventStoreError> {
    let first = to_db(after + 1)?;
    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO stream_events (stream_name, position, event_id) ",
    );
    qb.push_values(event_ids.iter().zip(first..), |mut b, (event_id, position)| {
        b.push_bind(stream_name.to_owned());
        b.push_bind(position);
        b.push_bind(*event_id);
    });
    qb.build().execute(conn).await.map_err(db_error)?;
    Ok(after + event_ids.len() as u64)
}

/// Starts a `SELECT <columns>` over the events `filter` selects.
fn select_matching(columns: &str, filter: &EventFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
    qb.push(columns);
    match &filter.stream_name {
        Some(stream_name) => {
            qb.push(
                " FROM stream_events s JOIN events e ON e.event_id = s.event_id \
                 WHERE s.stream_name = ",
            )
            .push_bind(stream_name.clone());
        }
        None => {
            qb.push(" FROM events e WHERE TRUE");
        }
    }
    if let Some(event_types) = &filter.event_types {
        qb.push(" AND e.event_type = ANY(")
            .push_bind(event_types.clone())
            .push(")");
    }
    if let Some(event_id) = filter.event_id {
        qb.push(" AND e.event_id = ").push_bind(event_id);
    }
    qb
}

fn decode_row(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    let data: Json<serde_json::Value> = row.try_get("data")?;
    let metadata: Json<EventMetadata> = row.try_get("metadata")?;
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        data: data.0,
        metadata: metadata.0,
    })
}

#[async_trait]
impl Repository for PgRepository {
    type Db = PgUnitOfWork;

    #[tracing::instrument(skip(self, db, events), fields(event_count = events.len()))]
    async fn append_to_stream(
        &self,
        db: &PgUnitOfWork,
        events: &[StoredEvent],
        stream_name: &str,
        expected_version: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        let mut tx = db.connection().await;
        lock_stream(&mut tx, stream_name).await?;
        let current = current_version(&mut tx, stream_name).await?;
        expected_version.check(stream_name, current)?;
        if events.is_empty() {
            return Ok(AppendResult {
                stream_version: current,
            });
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO events (event_id, event_type, data, metadata) ",
        );
        qb.push_values(events, |mut b, event| {
            b.push_bind(event.event_id);
            b.push_bind(event.event_type.clone());
            b.push_bind(Json(event.data.clone()));
            b.push_bind(Json(event.metadata.clone()));
        });
        qb.build().execute(&mut **tx).await.map_err(db_error)?;

        let event_ids: Vec<Uuid> = events.iter().map(|event| event.event_id).collect();
        let stream_version = insert_members(&mut tx, stream_name, &event_ids, current).await?;
        tracing::debug!(stream_version, "events appended");
        Ok(AppendResult { stream_version })
    }

    #[tracing::instrument(skip(self, db, event_ids), fields(event_count = event_ids.len()))]
    async fn link_to_stream(
        &self,
        db: &PgUnitOfWork,
        event_ids: &[Uuid],
        stream_name: &str,
        duplicates: DuplicateCheck,
    ) -> Result<(), EventStoreError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let mut tx = db.connection().await;
        lock_stream(&mut tx, stream_name).await?;

        let known: Vec<Uuid> =
            sqlx::query_scalar("SELECT event_id FROM events WHERE event_id = ANY($1)")
                .bind(event_ids.to_vec())
                .fetch_all(&mut **tx)
                .await
                .map_err(db_error)?;
        if let Some(missing) = event_ids.iter().find(|id| !known.contains(id)) {
            return Err(EventStoreError::NotFound(format!("event {missing}")));
        }

        let to_link: Vec<Uuid> = match duplicates {
            DuplicateCheck::Skip => event_ids.to_vec(),
            DuplicateCheck::Enforce => {
                let mut linked: Vec<Uuid> = sqlx::query_scalar(
                    "SELECT event_id FROM stream_events \
                     WHERE stream_name = $1 AND event_id = ANY($2)",
                )
                .bind(stream_name)
                .bind(event_ids.to_vec())
                .fetch_all(&mut **tx)
                .await
                .map_err(db_error)?;
                let mut fresh = Vec::with_capacity(event_ids.len());
                for id in event_ids {
                    if !linked.contains(id) {
                        linked.push(*id);
                        fresh.push(*id);
                    }
                }
                fresh
            }
        };
        if to_link.is_empty() {
            return Ok(());
        }

        let current = current_version(&mut tx, stream_name).await?;
        let stream_version = insert_members(&mut tx, stream_name, &to_link, current).await?;
        tracing::debug!(linked = to_link.len(), stream_version, "events linked");
        Ok(())
    }

    #[tracing::instrument(skip(self, db))]
    async fn delete_stream(
        &self,
        db: &PgUnitOfWork,
        stream_name: &str,
    ) -> Result<(), EventStoreError> {
        let mut tx = db.connection().await;
        lock_stream(&mut tx, stream_name).await?;
        let result = sqlx::query("DELETE FROM stream_events WHERE stream_name = $1")
            .bind(stream_name)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        tracing::debug!(removed = result.rows_affected(), "stream deleted");
        Ok(())
    }

    async fn streams_of(
        &self,
        db: &PgUnitOfWork,
        event_id: Uuid,
    ) -> Result<Vec<String>, EventStoreError> {
        let mut tx = db.connection().await;
        sqlx::query_scalar(
            "SELECT stream_name FROM stream_events WHERE event_id = $1 ORDER BY stream_name",
        )
        .bind(event_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)
    }

    async fn read_page(
        &self,
        db: &PgUnitOfWork,
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut qb = select_matching("e.event_id, e.event_type, e.data, e.metadata", filter);
        if filter.stream_name.is_some() {
            qb.push(" ORDER BY s.position");
        } else {
            qb.push(" ORDER BY e.position");
        }
        qb.push(" LIMIT ").push_bind(to_db(limit)?);
        qb.push(" OFFSET ").push_bind(to_db(offset)?);

        let mut tx = db.connection().await;
        let rows = qb.build().fetch_all(&mut **tx).await.map_err(db_error)?;
        rows.iter()
            .map(|row| decode_row(row).map_err(db_error))
            .collect()
    }

    async fn count(&self, db: &PgUnitOfWork, filter: &EventFilter) -> Result<u64, EventStoreError> {
        let mut qb = select_matching("COUNT(*)", filter);
        let mut tx = db.connection().await;
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error)?;
        from_db(count)
    }

    async fn event_in_stream(
        &self,
        db: &PgUnitOfWork,
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<bool, EventStoreError> {
        let mut tx = db.connection().await;
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM stream_events WHERE stream_name = $1 AND event_id = $2)",
        )
        .bind(stream_name)
        .bind(event_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)
    }

    async fn position_in_stream(
        &self,
        db: &PgUnitOfWork,
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<u64>, EventStoreError> {
        let mut tx = db.connection().await;
        let position: Option<i64> = sqlx::query_scalar(
            "SELECT position FROM stream_events WHERE stream_name = $1 AND event_id = $2",
        )
        .bind(stream_name)
        .bind(event_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;
        position.map(from_db).transpose()
    }

    async fn stream_version(
        &self,
        db: &PgUnitOfWork,
        stream_name: &str,
    ) -> Result<u64, EventStoreError> {
        let mut tx = db.connection().await;
        current_version(&mut tx, stream_name).await
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(db_error(sqlx::Error::RowNotFound).is_not_found());
    }

    #[test]
    fn test_other_driver_errors_map_to_infrastructure() {
        let error = db_error(sqlx::Error::PoolTimedOut);

        assert!(matches!(error, EventStoreError::Infrastructure(_)));
    }

    #[test]
    fn test_stream_filter_joins_membership_table() {
        let filter = EventFilter {
            stream_name: Some("Bucket$b1".to_owned()),
            event_types: Some(vec!["BucketCreated".to_owned()]),
            event_id: None,
        };

        let sql = select_matching("COUNT(*)", &filter).into_sql();

        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM stream_events s JOIN events e ON e.event_id = s.event_id \
             WHERE s.stream_name = $1 AND e.event_type = ANY($2)"
        );
    }

    #[test]
    fn test_global_filter_reads_event_log() {
        let filter = EventFilter {
            event_id: Some(Uuid::new_v4()),
            ..EventFilter::default()
        };

        let sql = select_matching("COUNT(*)", &filter).into_sql();

        assert_eq!(sql, "SELECT COUNT(*) FROM events e WHERE TRUE AND e.event_id = $1");
    }
}
