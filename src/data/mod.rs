//! Data domain: raw tables, employee records and their persistence.

pub mod domain;
pub mod repo_fs;
pub mod repo_sqlite;
pub mod service;

pub use domain::{AttrValue, EmployeeAttributes, EmployeeRecord, EmployeeRepo, RawAttributeRecord, Table};
pub use repo_fs::CsvEmployeeLog;
pub use repo_sqlite::SqliteEmployeeRepo;
pub use service::{CleanParams, CleanedData, SplitData, SubmissionRecorder};
