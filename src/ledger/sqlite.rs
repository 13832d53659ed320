//! Durable SQLite ledger shared by every process on the host

use super::types::lease_deadline;
use super::{
    Admission, BeginOutcome, CommitOutcome, EvaluationRecord, Lease, LeaseOwner, Ledger,
    LedgerError, RecordState, TerminalState,
};
use crate::source::AssetEvent;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

const SELECT_RECORD: &str = r#"
    SELECT asset_id, state, detail, lease_owner, lease_expires_at, committed_by, snapshot, updated_at
    FROM evaluations
    WHERE asset_id = ?
"#;

/// Ledger backed by a SQLite database in WAL mode.
///
/// Every state change is one conditional statement, so the database's
/// write serialization is the only lock ever taken, and only for the
/// duration of that statement.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: Pool<Sqlite>,
}

impl SqliteLedger {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(target: "ledger", url = database_url, "SQLite ledger ready");
        Ok(Self { pool })
    }

    async fn fetch(&self, asset_id: &str) -> Result<Option<EvaluationRecord>, LedgerError> {
        let row = sqlx::query(SELECT_RECORD)
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_record(&r)).transpose()
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(asset_id: &str, ms: i64) -> Result<DateTime<Utc>, LedgerError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| LedgerError::Corrupt {
            asset_id: asset_id.to_string(),
            reason: format!("timestamp out of range: {ms}"),
        })
}

fn decode_record(row: &SqliteRow) -> Result<EvaluationRecord, LedgerError> {
    let asset_id: String = row.try_get("asset_id")?;
    let label: String = row.try_get("state")?;
    let detail: Option<String> = row.try_get("detail")?;
    let state = RecordState::from_parts(&label, detail).ok_or_else(|| LedgerError::Corrupt {
        asset_id: asset_id.clone(),
        reason: format!("unknown state {label:?}"),
    })?;

    let lease_expires_at = row
        .try_get::<Option<i64>, _>("lease_expires_at")?
        .map(|ms| from_millis(&asset_id, ms))
        .transpose()?;
    let updated_at = from_millis(&asset_id, row.try_get("updated_at")?)?;
    let snapshot = row
        .try_get::<Option<String>, _>("snapshot")?
        .map(|json| serde_json::from_str::<AssetEvent>(&json))
        .transpose()?;

    Ok(EvaluationRecord {
        asset_id,
        state,
        lease_owner: row.try_get("lease_owner")?,
        lease_expires_at,
        updated_at,
        committed_by: row.try_get("committed_by")?,
        snapshot,
    })
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn try_begin_evaluation(
        &self,
        event: &AssetEvent,
        owner: &LeaseOwner,
        ttl: Duration,
        admission: Admission,
    ) -> Result<BeginOutcome, LedgerError> {
        let now = Utc::now();
        let now_ms = to_millis(now);
        let expires_at = lease_deadline(now, ttl);
        let snapshot = serde_json::to_string(event)?;
        let retry_failed = admission == Admission::RetryFailed;

        // Insert-or-claim in one statement: the DO UPDATE only fires when the
        // existing row is claimable, so concurrent callers cannot both win.
        let granted = sqlx::query(
            r#"
            INSERT INTO evaluations
                (asset_id, state, lease_owner, lease_expires_at, snapshot, created_at, updated_at)
            VALUES (?, 'evaluating', ?, ?, ?, ?, ?)
            ON CONFLICT(asset_id) DO UPDATE SET
                state = 'evaluating',
                detail = NULL,
                lease_owner = excluded.lease_owner,
                lease_expires_at = excluded.lease_expires_at,
                committed_by = NULL,
                updated_at = excluded.updated_at
            WHERE evaluations.state = 'seen'
               OR (evaluations.state = 'evaluating' AND evaluations.lease_expires_at <= ?)
               OR (? AND evaluations.state = 'failed')
            "#,
        )
        .bind(&event.asset_id)
        .bind(owner.as_str())
        .bind(to_millis(expires_at))
        .bind(&snapshot)
        .bind(now_ms)
        .bind(now_ms)
        .bind(now_ms)
        .bind(retry_failed)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        if granted {
            return Ok(BeginOutcome::LeaseGranted(Lease {
                asset_id: event.asset_id.clone(),
                owner: owner.clone(),
                expires_at,
            }));
        }

        // The claim was refused atomically above; this read only reports why.
        let record = self
            .fetch(&event.asset_id)
            .await?
            .ok_or_else(|| LedgerError::Corrupt {
                asset_id: event.asset_id.clone(),
                reason: "claim refused but row missing".into(),
            })?;

        if record.state.is_terminal() {
            Ok(BeginOutcome::AlreadyTerminal(record))
        } else {
            Ok(BeginOutcome::AlreadyLeased(record))
        }
    }

    async fn commit(
        &self,
        asset_id: &str,
        owner: &LeaseOwner,
        terminal: &TerminalState,
    ) -> Result<CommitOutcome, LedgerError> {
        let now = Utc::now();
        let target = RecordState::from(terminal.clone());

        let updated = sqlx::query(
            r#"
            UPDATE evaluations
            SET state = ?, detail = ?, lease_owner = NULL, lease_expires_at = NULL,
                committed_by = ?, updated_at = ?
            WHERE asset_id = ?
              AND state = 'evaluating'
              AND lease_owner = ?
              AND lease_expires_at > ?
            "#,
        )
        .bind(target.label())
        .bind(target.detail())
        .bind(owner.as_str())
        .bind(to_millis(now))
        .bind(asset_id)
        .bind(owner.as_str())
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(CommitOutcome::Committed);
        }

        Ok(match self.fetch(asset_id).await? {
            Some(record) => record.commit_miss(owner, &target, now),
            None => CommitOutcome::LeaseNotHeld,
        })
    }

    async fn confirm_lease(&self, asset_id: &str, owner: &LeaseOwner) -> Result<bool, LedgerError> {
        let held: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM evaluations
            WHERE asset_id = ? AND state = 'evaluating' AND lease_owner = ? AND lease_expires_at > ?
            "#,
        )
        .bind(asset_id)
        .bind(owner.as_str())
        .bind(to_millis(Utc::now()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(held.is_some())
    }

    async fn release(&self, asset_id: &str, owner: &LeaseOwner) -> Result<bool, LedgerError> {
        let released = sqlx::query(
            r#"
            UPDATE evaluations
            SET state = 'seen', lease_owner = NULL, lease_expires_at = NULL, updated_at = ?
            WHERE asset_id = ? AND state = 'evaluating' AND lease_owner = ?
            "#,
        )
        .bind(to_millis(Utc::now()))
        .bind(asset_id)
        .bind(owner.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(released == 1)
    }

    async fn reap_expired_leases(&self) -> Result<u64, LedgerError> {
        let now_ms = to_millis(Utc::now());
        let reaped = sqlx::query(
            r#"
            UPDATE evaluations
            SET state = 'seen', lease_owner = NULL, lease_expires_at = NULL, updated_at = ?
            WHERE state = 'evaluating' AND lease_expires_at <= ?
            "#,
        )
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(reaped)
    }

    async fn get(&self, asset_id: &str) -> Result<Option<EvaluationRecord>, LedgerError> {
        self.fetch(asset_id).await
    }

    async fn state_counts(&self) -> Result<BTreeMap<String, u64>, LedgerError> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM evaluations GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let state: String = row.try_get("state")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(state, n.max(0) as u64);
        }
        Ok(counts)
    }
}
