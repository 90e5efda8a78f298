//! SQLite-backed employee store.
//!
//! The repository holds only the database path. Each operation opens its own
//! connection, so concurrent requests never share a session.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, ErrorCode as SqliteCode};
use tracing::{debug, info};

use crate::common::error::{AttrResult, AttritionError};

use super::domain::{EmployeeRecord, EmployeeRepo};
use super::repo_fs::{ensure_parent, read_table};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS employee (
    EmployeeNumber INTEGER PRIMARY KEY,
    EnvironmentSatisfaction INTEGER,
    JobInvolvement INTEGER,
    JobLevel INTEGER,
    JobSatisfaction INTEGER,
    PerformanceRating INTEGER,
    RelationshipSatisfaction INTEGER,
    YearsSinceLastPromotion INTEGER,
    WorkLifeBalance INTEGER,
    MaritalStatus TEXT,
    Gender TEXT,
    OverTime TEXT,
    Attrition TEXT
);
";

const INSERT_SQL: &str = "INSERT INTO employee (
    EmployeeNumber, EnvironmentSatisfaction, JobInvolvement, JobLevel, JobSatisfaction,
    PerformanceRating, RelationshipSatisfaction, YearsSinceLastPromotion, WorkLifeBalance,
    MaritalStatus, Gender, OverTime, Attrition
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

pub struct SqliteEmployeeRepo {
    path: PathBuf,
}

impl SqliteEmployeeRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the employee table if it does not exist yet.
    pub fn create_schema(&self) -> AttrResult<()> {
        ensure_parent(&self.path)?;
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| self.connection_error(e))?;
        info!(db = %self.path.display(), "employee table ready");
        Ok(())
    }

    /// Number of stored employees.
    pub fn count(&self) -> AttrResult<usize> {
        let conn = self.connect()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM employee", [], |row| row.get(0))
            .map_err(|e| self.connection_error(e))?;
        Ok(n as usize)
    }

    /// Fetch one employee by key.
    pub fn get(&self, employee_number: i64) -> AttrResult<Option<EmployeeRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT EmployeeNumber, EnvironmentSatisfaction, JobInvolvement, JobLevel,
                        JobSatisfaction, PerformanceRating, RelationshipSatisfaction,
                        YearsSinceLastPromotion, WorkLifeBalance, MaritalStatus, Gender,
                        OverTime, Attrition
                 FROM employee WHERE EmployeeNumber = ?1",
            )
            .map_err(|e| self.connection_error(e))?;
        let mut rows = stmt
            .query(params![employee_number])
            .map_err(|e| self.connection_error(e))?;
        let Some(row) = rows.next().map_err(|e| self.connection_error(e))? else {
            return Ok(None);
        };

        let mut pairs: Vec<(String, crate::data::domain::AttrValue)> = Vec::new();
        for (idx, name) in EmployeeRecord::columns().into_iter().enumerate() {
            let value: rusqlite::types::Value = row.get(idx).map_err(|e| self.connection_error(e))?;
            let value = match value {
                rusqlite::types::Value::Integer(i) => Some(i.into()),
                rusqlite::types::Value::Real(f) => Some(f.into()),
                rusqlite::types::Value::Text(t) => Some(t.as_str().into()),
                _ => None,
            };
            if let Some(v) = value {
                pairs.push((name, v));
            }
        }
        EmployeeRecord::from_record(&pairs.into_iter().collect()).map(Some)
    }

    fn connect(&self) -> AttrResult<Connection> {
        let conn = Connection::open(&self.path).map_err(|e| self.connection_error(e))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| self.connection_error(e))?;
        Ok(conn)
    }

    fn connection_error(&self, err: rusqlite::Error) -> AttritionError {
        AttritionError::connection(self.describe(), err)
    }

    fn insert(&self, conn: &Connection, record: &EmployeeRecord) -> AttrResult<()> {
        let attrs = &record.attributes;
        conn.execute(
            INSERT_SQL,
            params![
                record.employee_number,
                attrs.environment_satisfaction,
                attrs.job_involvement,
                attrs.job_level,
                attrs.job_satisfaction,
                attrs.performance_rating,
                attrs.relationship_satisfaction,
                attrs.years_since_last_promotion,
                attrs.work_life_balance,
                attrs.marital_status.as_str(),
                attrs.gender.as_str(),
                attrs.over_time.as_str(),
                record.attrition.map(|a| a.as_str()),
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(SqliteCode::ConstraintViolation) => AttritionError::invalid(format!(
                "employee {} is already recorded",
                record.employee_number
            )),
            _ => self.connection_error(e),
        })?;
        Ok(())
    }
}

impl EmployeeRepo for SqliteEmployeeRepo {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn add_record(&self, record: &EmployeeRecord) -> AttrResult<()> {
        let conn = self.connect()?;
        self.insert(&conn, record)?;
        debug!(employee = record.employee_number, db = %self.path.display(), "employee added");
        Ok(())
    }

    fn bulk_ingest(&self, path: &Path) -> AttrResult<usize> {
        let records = EmployeeRecord::from_table(&read_table(path)?)?;
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(|e| self.connection_error(e))?;
        for record in &records {
            self.insert(&tx, record)?;
        }
        tx.commit().map_err(|e| self.connection_error(e))?;
        info!(count = records.len(), db = %self.path.display(), "result rows added to the employee table");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorCode;
    use crate::data::domain::tests::sample_raw;
    use crate::data::repo_fs::CsvEmployeeLog;

    fn repo() -> (tempfile::TempDir, SqliteEmployeeRepo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteEmployeeRepo::new(dir.path().join("db/employees.db"));
        repo.create_schema().unwrap();
        (dir, repo)
    }

    #[test]
    fn add_then_get() {
        let (_dir, repo) = repo();
        let record = EmployeeRecord::from_record(&sample_raw(42)).unwrap();
        repo.add_record(&record).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.get(42).unwrap(), Some(record));
        assert_eq!(repo.get(43).unwrap(), None);
    }

    #[test]
    fn duplicate_key_is_validation_error() {
        let (_dir, repo) = repo();
        let record = EmployeeRecord::from_record(&sample_raw(1)).unwrap();
        repo.add_record(&record).unwrap();
        let err = repo.add_record(&record).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataValidation);
    }

    #[test]
    fn missing_table_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteEmployeeRepo::new(dir.path().join("fresh.db"));
        let record = EmployeeRecord::from_record(&sample_raw(1)).unwrap();
        let err = repo.add_record(&record).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Connection);
    }

    #[test]
    fn unreachable_path_is_connection_error() {
        let repo = SqliteEmployeeRepo::new("/nonexistent-dir/sub/employees.db");
        let record = EmployeeRecord::from_record(&sample_raw(1)).unwrap();
        let err = repo.add_record(&record).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Connection);
    }

    #[test]
    fn bulk_ingest_is_all_or_nothing() {
        let (dir, repo) = repo();
        let source = dir.path().join("results.csv");
        let staging = CsvEmployeeLog::new(&source);
        for n in [1, 2, 2] {
            staging
                .add_record(&EmployeeRecord::from_record(&sample_raw(n)).unwrap())
                .unwrap();
        }
        assert!(repo.bulk_ingest(&source).is_err());
        assert_eq!(repo.count().unwrap(), 0);
    }
}
