//! SQLite Repository
//!
//! Timestamps are stored as epoch milliseconds, enums by their stable ids and
//! data point payloads as postcard blobs.

use crate::models::{
    AutoLabel, DataPoint, DeliveryOutcome, Discrepancy, DiscrepancyKey, DiscrepancyType, LogEntry,
    LogFilter, LogSeverity, ManualLabel, Metric, MetricFilter, MetricKey, MetricType, NewLogEntry,
    Notification, NotificationSeverity, ParseEnumError, Payload,
};
use crate::repository::Repository;
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS metrics (
        metric_type INTEGER NOT NULL,
        source TEXT NOT NULL,
        title TEXT NOT NULL,
        auto_label INTEGER NOT NULL,
        manual_label INTEGER NOT NULL,
        public INTEGER NOT NULL,
        last_updated INTEGER NOT NULL,
        PRIMARY KEY (metric_type, source)
    )",
    "CREATE TABLE IF NOT EXISTS data_points (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        metric_type INTEGER NOT NULL,
        source TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        payload BLOB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_data_points_stream
        ON data_points (metric_type, source, timestamp)",
    "CREATE TABLE IF NOT EXISTS log_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        category INTEGER NOT NULL,
        severity INTEGER NOT NULL,
        message TEXT NOT NULL,
        auxiliary_data TEXT,
        timestamp INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_log_entries_timestamp ON log_entries (timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_log_entries_source ON log_entries (source, category)",
    "CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        severity INTEGER NOT NULL,
        message TEXT NOT NULL,
        is_sent INTEGER NOT NULL DEFAULT 0,
        attempts INTEGER NOT NULL DEFAULT 0,
        date_created INTEGER NOT NULL,
        date_sent INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS discrepancies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        discrepancy_type INTEGER NOT NULL,
        metric_type INTEGER NOT NULL,
        metric_source TEXT NOT NULL,
        date_first_offense INTEGER NOT NULL,
        resolved INTEGER NOT NULL DEFAULT 0,
        date_resolved INTEGER,
        UNIQUE (discrepancy_type, metric_type, metric_source, date_first_offense)
    )",
];

const METRIC_COLUMNS: &str =
    "metric_type, source, title, auto_label, manual_label, public, last_updated";
const LOG_COLUMNS: &str = "id, source, category, severity, message, auxiliary_data, timestamp";
const NOTIFICATION_COLUMNS: &str =
    "id, severity, message, is_sent, attempts, date_created, date_sent";
const DISCREPANCY_COLUMNS: &str =
    "id, discrepancy_type, metric_type, metric_source, date_first_offense, resolved, date_resolved";

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}

impl From<ParseEnumError> for StorageError {
    fn from(e: ParseEnumError) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::SerializationError(format!("invalid timestamp {}", ms)))
}

fn encode_payload(payload: &Payload) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(payload).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode_payload(bytes: &[u8]) -> Result<Payload, StorageError> {
    postcard::from_bytes(bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn metric_from_row(row: &SqliteRow) -> Result<Metric, StorageError> {
    Ok(Metric {
        metric_type: MetricType::from_id(row.try_get("metric_type")?)?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        auto_label: AutoLabel::from_id(row.try_get("auto_label")?)?,
        manual_label: ManualLabel::from_id(row.try_get("manual_label")?)?,
        public: row.try_get("public")?,
        last_updated: from_millis(row.try_get("last_updated")?)?,
    })
}

fn point_from_row(row: &SqliteRow) -> Result<DataPoint, StorageError> {
    let payload: Vec<u8> = row.try_get("payload")?;
    Ok(DataPoint {
        timestamp: from_millis(row.try_get("timestamp")?)?,
        payload: decode_payload(&payload)?,
    })
}

fn log_from_row(row: &SqliteRow) -> Result<LogEntry, StorageError> {
    Ok(LogEntry {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        category: row.try_get("category")?,
        severity: LogSeverity::from_id(row.try_get("severity")?)?,
        message: row.try_get("message")?,
        auxiliary_data: row.try_get("auxiliary_data")?,
        timestamp: from_millis(row.try_get("timestamp")?)?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, StorageError> {
    let date_sent: Option<i64> = row.try_get("date_sent")?;
    let attempts: i64 = row.try_get("attempts")?;
    Ok(Notification {
        id: row.try_get("id")?,
        severity: NotificationSeverity::from_id(row.try_get("severity")?)?,
        message: row.try_get("message")?,
        is_sent: row.try_get("is_sent")?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        date_created: from_millis(row.try_get("date_created")?)?,
        date_sent: date_sent.map(from_millis).transpose()?,
    })
}

fn discrepancy_from_row(row: &SqliteRow) -> Result<Discrepancy, StorageError> {
    let date_resolved: Option<i64> = row.try_get("date_resolved")?;
    Ok(Discrepancy {
        id: row.try_get("id")?,
        discrepancy_type: DiscrepancyType::from_id(row.try_get("discrepancy_type")?)?,
        metric_type: MetricType::from_id(row.try_get("metric_type")?)?,
        metric_source: row.try_get("metric_source")?,
        date_first_offense: from_millis(row.try_get("date_first_offense")?)?,
        resolved: row.try_get("resolved")?,
        date_resolved: date_resolved.map(from_millis).transpose()?,
    })
}

/// Repository backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connects to `url` (e.g. `sqlite://status.db` or `sqlite::memory:`) and creates the schema
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5));
        // Every connection to an in-memory database sees its own database,
        // and the data is gone once that connection closes
        if url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!("Connected to SQLite repository at {}", url);
        Ok(Self { pool })
    }

    async fn fetch_metric(&self, key: &MetricKey) -> Result<Option<Metric>, StorageError> {
        let sql = format!(
            "SELECT {} FROM metrics WHERE metric_type = ? AND source = ?",
            METRIC_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key.metric_type.id())
            .bind(&key.source)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(metric_from_row).transpose()
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get_or_create_metric(
        &self,
        key: &MetricKey,
        now: DateTime<Utc>,
    ) -> Result<Metric, StorageError> {
        let fresh = Metric::new(key, now);
        sqlx::query(
            "INSERT INTO metrics (metric_type, source, title, auto_label, manual_label, public, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (metric_type, source) DO NOTHING",
        )
        .bind(fresh.metric_type.id())
        .bind(&fresh.source)
        .bind(&fresh.title)
        .bind(fresh.auto_label.id())
        .bind(fresh.manual_label.id())
        .bind(fresh.public)
        .bind(to_millis(fresh.last_updated))
        .execute(&self.pool)
        .await?;

        self.fetch_metric(key).await?.ok_or(StorageError::NotFound)
    }

    async fn find_metric(&self, key: &MetricKey) -> Result<Option<Metric>, StorageError> {
        self.fetch_metric(key).await
    }

    async fn list_metrics(&self, filter: &MetricFilter) -> Result<Vec<Metric>, StorageError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM metrics WHERE 1 = 1", METRIC_COLUMNS));
        if let Some(metric_type) = filter.metric_type {
            qb.push(" AND metric_type = ").push_bind(metric_type.id());
        }
        if let Some(source) = &filter.source {
            qb.push(" AND source = ").push_bind(source.clone());
        }
        if filter.public_only {
            qb.push(" AND public = 1");
        }
        qb.push(" ORDER BY metric_type, source");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(metric_from_row).collect()
    }

    async fn update_metric(
        &self,
        key: &MetricKey,
        manual_label: ManualLabel,
        public: bool,
    ) -> Result<Metric, StorageError> {
        let result = sqlx::query(
            "UPDATE metrics SET manual_label = ?, public = ? WHERE metric_type = ? AND source = ?",
        )
        .bind(manual_label.id())
        .bind(public)
        .bind(key.metric_type.id())
        .bind(&key.source)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        self.fetch_metric(key).await?.ok_or(StorageError::NotFound)
    }

    async fn set_auto_label(&self, key: &MetricKey, label: AutoLabel) -> Result<(), StorageError> {
        let result =
            sqlx::query("UPDATE metrics SET auto_label = ? WHERE metric_type = ? AND source = ?")
                .bind(label.id())
                .bind(key.metric_type.id())
                .bind(&key.source)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn remove_metric(&self, key: &MetricKey) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM data_points WHERE metric_type = ? AND source = ?")
            .bind(key.metric_type.id())
            .bind(&key.source)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM metrics WHERE metric_type = ? AND source = ?")
            .bind(key.metric_type.id())
            .bind(&key.source)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_point(
        &self,
        key: &MetricKey,
        point: DataPoint,
    ) -> Result<Metric, StorageError> {
        let fresh = Metric::new(key, point.timestamp);
        let payload = encode_payload(&point.payload)?;
        let timestamp = to_millis(point.timestamp);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO metrics (metric_type, source, title, auto_label, manual_label, public, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (metric_type, source)
             DO UPDATE SET last_updated = MAX(last_updated, excluded.last_updated)",
        )
        .bind(fresh.metric_type.id())
        .bind(&fresh.source)
        .bind(&fresh.title)
        .bind(fresh.auto_label.id())
        .bind(fresh.manual_label.id())
        .bind(fresh.public)
        .bind(timestamp)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO data_points (metric_type, source, timestamp, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(key.metric_type.id())
        .bind(&key.source)
        .bind(timestamp)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "SELECT {} FROM metrics WHERE metric_type = ? AND source = ?",
            METRIC_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key.metric_type.id())
            .bind(&key.source)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        metric_from_row(&row)
    }

    async fn points_since(
        &self,
        key: &MetricKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let rows = sqlx::query(
            "SELECT timestamp, payload FROM data_points
             WHERE metric_type = ? AND source = ? AND timestamp >= ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(key.metric_type.id())
        .bind(&key.source)
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(point_from_row).collect()
    }

    async fn latest_points(
        &self,
        key: &MetricKey,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let rows = sqlx::query(
            "SELECT timestamp, payload FROM data_points
             WHERE metric_type = ? AND source = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(key.metric_type.id())
        .bind(&key.source)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(point_from_row).collect()
    }

    async fn remove_points_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM data_points WHERE timestamp < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StorageError> {
        let result = sqlx::query(
            "INSERT INTO log_entries (source, category, severity, message, auxiliary_data, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.source)
        .bind(entry.category)
        .bind(entry.severity.id())
        .bind(&entry.message)
        .bind(&entry.auxiliary_data)
        .bind(to_millis(entry.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(entry.with_id(result.last_insert_rowid()))
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, StorageError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM log_entries WHERE 1 = 1", LOG_COLUMNS));

        if !filter.sources.is_empty() {
            qb.push(" AND source IN (");
            let mut list = qb.separated(", ");
            for source in &filter.sources {
                list.push_bind(source.clone());
            }
            list.push_unseparated(")");
        }
        if !filter.categories.is_empty() {
            qb.push(" AND category IN (");
            let mut list = qb.separated(", ");
            for category in &filter.categories {
                list.push_bind(*category);
            }
            list.push_unseparated(")");
        }
        if !filter.severities.is_empty() {
            qb.push(" AND severity IN (");
            let mut list = qb.separated(", ");
            for severity in &filter.severities {
                list.push_bind(severity.id());
            }
            list.push_unseparated(")");
        }
        if let Some(start) = filter.start {
            qb.push(" AND timestamp >= ").push_bind(to_millis(start));
        }
        if let Some(end) = filter.end {
            qb.push(" AND timestamp <= ").push_bind(to_millis(end));
        }
        if !filter.keywords.is_empty() {
            // instr() is case-sensitive, matching the in-memory filter
            qb.push(" AND (");
            for (i, keyword) in filter.keywords.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("instr(message, ")
                    .push_bind(keyword.clone())
                    .push(") > 0 OR instr(COALESCE(auxiliary_data, ''), ")
                    .push_bind(keyword.clone())
                    .push(") > 0");
            }
            qb.push(")");
        }
        qb.push(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(log_from_row).collect()
    }

    async fn remove_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM log_entries WHERE timestamp < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_notification(
        &self,
        severity: NotificationSeverity,
        message: &str,
        created: DateTime<Utc>,
    ) -> Result<Notification, StorageError> {
        let result = sqlx::query(
            "INSERT INTO notifications (severity, message, is_sent, attempts, date_created)
             VALUES (?, ?, 0, 0, ?)",
        )
        .bind(severity.id())
        .bind(message)
        .bind(to_millis(created))
        .execute(&self.pool)
        .await?;

        Ok(Notification {
            id: result.last_insert_rowid(),
            severity,
            message: message.to_string(),
            is_sent: false,
            attempts: 0,
            date_created: from_millis(to_millis(created))?,
            date_sent: None,
        })
    }

    async fn pending_notifications(
        &self,
        fresh_only: bool,
    ) -> Result<Vec<Notification>, StorageError> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE is_sent = 0 {} ORDER BY id ASC",
            NOTIFICATION_COLUMNS,
            if fresh_only { "AND attempts = 0" } else { "" }
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn record_delivery(
        &self,
        id: i64,
        outcome: DeliveryOutcome,
    ) -> Result<(), StorageError> {
        let result = match outcome {
            DeliveryOutcome::Sent { at } => {
                sqlx::query(
                    "UPDATE notifications SET is_sent = 1, date_sent = ?, attempts = attempts + 1
                     WHERE id = ?",
                )
                .bind(to_millis(at))
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            DeliveryOutcome::Failed => {
                sqlx::query("UPDATE notifications SET attempts = attempts + 1 WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn notifications(&self) -> Result<Vec<Notification>, StorageError> {
        let sql = format!(
            "SELECT {} FROM notifications ORDER BY id DESC",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn insert_discrepancy_if_absent(
        &self,
        key: &DiscrepancyKey,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT INTO discrepancies (discrepancy_type, metric_type, metric_source, date_first_offense)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (discrepancy_type, metric_type, metric_source, date_first_offense) DO NOTHING",
        )
        .bind(key.discrepancy_type.id())
        .bind(key.metric_type.id())
        .bind(&key.metric_source)
        .bind(to_millis(key.date_first_offense))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn open_discrepancies(&self) -> Result<Vec<Discrepancy>, StorageError> {
        let sql = format!(
            "SELECT {} FROM discrepancies WHERE resolved = 0 ORDER BY id ASC",
            DISCREPANCY_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(discrepancy_from_row).collect()
    }

    async fn resolve_discrepancy(
        &self,
        key: &DiscrepancyKey,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE discrepancies SET resolved = 1, date_resolved = ?
             WHERE resolved = 0 AND discrepancy_type = ? AND metric_type = ?
               AND metric_source = ? AND date_first_offense = ?",
        )
        .bind(to_millis(at))
        .bind(key.discrepancy_type.id())
        .bind(key.metric_type.id())
        .bind(&key.metric_source)
        .bind(to_millis(key.date_first_offense))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn discrepancies(&self) -> Result<Vec<Discrepancy>, StorageError> {
        let sql = format!(
            "SELECT {} FROM discrepancies ORDER BY date_first_offense DESC, id DESC",
            DISCREPANCY_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(discrepancy_from_row).collect()
    }

    async fn remove_resolved_discrepancies_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM discrepancies WHERE resolved = 1 AND date_resolved < ?",
        )
        .bind(to_millis(cutoff))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
