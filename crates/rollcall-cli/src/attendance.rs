//! SQLite attendance log: one row per recognized scan.

use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id TEXT NOT NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    mode TEXT NOT NULL,
    camera TEXT NOT NULL,
    confidence REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS attendance_date ON attendance(date);
";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Direction of an attendance scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    In,
    Out,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::In => "in",
            Mode::Out => "out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub employee_id: String,
    pub date: String,
    pub time: String,
    pub mode: String,
    pub camera: String,
    pub confidence: f64,
}

pub struct AttendanceLog {
    conn: Connection,
}

impl AttendanceLog {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "attendance log opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Append a scan and return its row id.
    pub fn record(
        &self,
        employee_id: &str,
        mode: Mode,
        camera: &str,
        confidence: f32,
        at: NaiveDateTime,
    ) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO attendance(employee_id, date, time, mode, camera, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                employee_id,
                at.format(DATE_FORMAT).to_string(),
                at.format(TIME_FORMAT).to_string(),
                mode.as_str(),
                camera,
                f64::from(confidence),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All scans on `date`, oldest first.
    pub fn on_date(&self, date: NaiveDate) -> rusqlite::Result<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, employee_id, date, time, mode, camera, confidence
             FROM attendance WHERE date = ?1 ORDER BY time, id",
        )?;
        let rows = stmt.query_map(params![date.format(DATE_FORMAT).to_string()], |row| {
            Ok(AttendanceRecord {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                date: row.get(2)?,
                time: row.get(3)?,
                mode: row.get(4)?,
                camera: row.get(5)?,
                confidence: row.get(6)?,
            })
        })?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_record_and_list() {
        let log = AttendanceLog::open_in_memory().unwrap();
        log.record("EMP002", Mode::Out, "gate", 0.81, at("2026-03-02", "17:30:00"))
            .unwrap();
        log.record("EMP001", Mode::In, "gate", 0.93, at("2026-03-02", "08:59:10"))
            .unwrap();
        log.record("EMP001", Mode::In, "gate", 0.90, at("2026-03-03", "09:00:00"))
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let records = log.on_date(day).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].employee_id, "EMP001");
        assert_eq!(records[0].time, "08:59:10");
        assert_eq!(records[0].mode, "in");
        assert_eq!(records[1].mode, "out");
        assert!((records[1].confidence - 0.81).abs() < 1e-6);
    }

    #[test]
    fn test_empty_day() {
        let log = AttendanceLog::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(log.on_date(day).unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/attendance.db");
        let log = AttendanceLog::open(&path).unwrap();
        log.record("EMP001", Mode::In, "gate", 0.9, at("2026-03-02", "08:00:00"))
            .unwrap();
        assert!(path.exists());
    }
}
