use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, Row};

use crate::{
    db::{
        helpers::{format_datetime, parse_datetime, to_i64, to_u32, to_u64},
        models::HistoryEntry,
        Database,
    },
    timer::{HistorySink, WorkPhaseRecord},
};

fn row_to_entry(row: &Row) -> Result<HistoryEntry> {
    let duration_seconds: i64 = row.get("duration_seconds")?;
    let session_index: i64 = row.get("session_index")?;
    let total_sessions: i64 = row.get("total_sessions")?;
    let started_at: String = row.get("started_at")?;
    let finished_at: String = row.get("finished_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(HistoryEntry {
        id: row.get("id")?,
        habit_id: row.get("habit_id")?,
        name: row.get("name")?,
        duration_seconds: to_u64(duration_seconds, "duration_seconds")?,
        session_index: to_u32(session_index, "session_index")?,
        total_sessions: to_u32(total_sessions, "total_sessions")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        finished_at: parse_datetime(&finished_at, "finished_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn insert_entry(conn: &Connection, record: &HistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO focus_history (id, habit_id, name, duration_seconds, session_index, total_sessions, started_at, finished_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.habit_id,
            record.name,
            to_i64(record.duration_seconds)?,
            record.session_index,
            record.total_sessions,
            format_datetime(&record.started_at),
            format_datetime(&record.finished_at),
            format_datetime(&record.created_at),
        ],
    )
    .with_context(|| format!("failed to insert history entry {}", record.id))?;
    debug!(
        "Recorded work phase {}/{} ({}s) for {}",
        record.session_index, record.total_sessions, record.duration_seconds, record.name
    );
    Ok(())
}

impl Database {
    pub async fn insert_history_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| insert_entry(conn, &record)).await
    }

    /// Most recent entries first.
    pub async fn list_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, habit_id, name, duration_seconds, session_index, total_sessions, started_at, finished_at, created_at
                 FROM focus_history
                 ORDER BY finished_at DESC, session_index DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }

    /// Total focused seconds across work phases finished at or after `since`.
    pub async fn focus_seconds_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let since = format_datetime(&since);
        self.execute(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(duration_seconds), 0)
                 FROM focus_history
                 WHERE finished_at >= ?1",
                params![since],
                |row| row.get(0),
            )?;
            to_u64(total, "duration_seconds")
        })
        .await
    }
}

impl HistorySink for Database {
    /// Queues the insert on the worker thread and returns immediately.
    fn append(&self, record: WorkPhaseRecord) -> Result<()> {
        let entry = HistoryEntry::from(record);
        self.submit("insert_history_entry", move |conn| insert_entry(conn, &entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn entry(id: &str, session_index: u32, finished_at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            id: id.into(),
            habit_id: Some("habit-7".into()),
            name: "Deep Work".into(),
            duration_seconds: 1_500,
            session_index,
            total_sessions: 2,
            started_at: finished_at - Duration::seconds(1_500),
            finished_at,
            created_at: finished_at,
        }
    }

    #[tokio::test]
    async fn inserted_entries_round_trip_newest_first() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("odakla.db")).expect("db");

        let first = entry("a", 1, at("2026-03-02T09:25:00Z"));
        let second = entry("b", 2, at("2026-03-02T09:55:00.250Z"));
        db.insert_history_entry(&first).await.expect("insert a");
        db.insert_history_entry(&second).await.expect("insert b");

        let listed = db.list_history(10).await.expect("list");
        assert_eq!(listed, vec![second, first]);

        let limited = db.list_history(1).await.expect("list");
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "b");
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("odakla.db")).expect("db");

        let record = entry("same", 1, at("2026-03-02T09:25:00Z"));
        db.insert_history_entry(&record).await.expect("insert");
        assert!(db.insert_history_entry(&record).await.is_err());
    }

    #[tokio::test]
    async fn focus_totals_respect_cutoff() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("odakla.db")).expect("db");

        db.insert_history_entry(&entry("old", 1, at("2026-03-01T22:00:00Z")))
            .await
            .expect("insert");
        db.insert_history_entry(&entry("today-1", 1, at("2026-03-02T09:25:00Z")))
            .await
            .expect("insert");
        db.insert_history_entry(&entry("today-2", 2, at("2026-03-02T09:55:00Z")))
            .await
            .expect("insert");

        let total = db
            .focus_seconds_since(at("2026-03-02T00:00:00Z"))
            .await
            .expect("total");
        assert_eq!(total, 3_000);

        let none = db
            .focus_seconds_since(at("2026-03-03T00:00:00Z"))
            .await
            .expect("total");
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("odakla.db");

        {
            let db = Database::new(path.clone()).expect("db");
            db.insert_history_entry(&entry("kept", 1, at("2026-03-02T09:25:00Z")))
                .await
                .expect("insert");
        }

        let reopened = Database::new(path).expect("db");
        let listed = reopened.list_history(5).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "kept");
    }

    fn record(id: &str, finished_at: DateTime<Utc>) -> WorkPhaseRecord {
        WorkPhaseRecord {
            id: id.into(),
            habit_id: None,
            name: "Reading".into(),
            duration_seconds: 600,
            session_index: 1,
            total_sessions: 1,
            started_at: finished_at - Duration::seconds(600),
            finished_at,
        }
    }

    #[tokio::test]
    async fn sink_appends_are_ordered_before_later_reads() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("odakla.db")).expect("db");

        let finished_at = at("2026-03-02T09:25:00Z");
        HistorySink::append(&db, record("phase-1", finished_at)).expect("queued");

        let listed = db.list_history(5).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Reading");
        assert_eq!(listed[0].habit_id, None);
        assert_eq!(listed[0].created_at, finished_at);
    }

    #[test]
    fn queued_appends_are_flushed_on_drop() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("odakla.db");

        {
            let db = Database::new(path.clone()).expect("db");
            HistorySink::append(&db, record("phase-1", at("2026-03-02T09:25:00Z")))
                .expect("queued");
            HistorySink::append(&db, record("phase-1", at("2026-03-02T09:26:00Z")))
                .expect("duplicate is queued and fails on the worker");
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let listed = runtime.block_on(async {
            let reopened = Database::new(path).expect("db");
            reopened.list_history(5).await.expect("list")
        });
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "phase-1");
    }
}
