#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use attrition::api::cli::{run_clean, run_split, run_train};
use attrition::common::config::AppCfg;

pub const RAW_HEADER: &str = "EmployeeNumber,Age,EnvironmentSatisfaction,JobInvolvement,JobLevel,JobSatisfaction,\
PerformanceRating,RelationshipSatisfaction,YearsSinceLastPromotion,WorkLifeBalance,\
MaritalStatus,Gender,OverTime,Attrition";

/// Employees who work overtime with low job satisfaction leave.
///
/// Every 7th row misses `JobInvolvement`, whose mean is fractional, and every
/// 25th misses `WorkLifeBalance` (dropped).
pub fn raw_csv(n: usize) -> String {
    let marital = ["Divorced", "Married", "Single"];
    let mut out = format!("{RAW_HEADER}\n");
    for i in 0..n {
        let over_time = if i % 2 == 0 { "Yes" } else { "No" };
        let satisfaction = 1 + (i / 2) % 4;
        let leaves = over_time == "Yes" && satisfaction <= 2;
        let involvement = if i % 7 == 3 { String::new() } else { (1 + i % 4).to_string() };
        let balance = if i % 25 == 0 { String::new() } else { (1 + i % 4).to_string() };
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            1000 + i,
            25 + i % 30,
            1 + i % 4,
            involvement,
            1 + (i / 3) % 5,
            satisfaction,
            3 + i % 2,
            1 + (i / 5) % 4,
            i % 6,
            balance,
            marital[i % 3],
            if i % 3 == 0 { "Female" } else { "Male" },
            over_time,
            if leaves { "Yes" } else { "No" },
        )
        .unwrap();
    }
    out
}

/// Rows of `raw_csv(n)` that survive cleaning.
pub fn complete_rows(n: usize) -> usize {
    (0..n).filter(|i| i % 25 != 0).count()
}

pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub cfg: AppCfg,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppCfg::default();
        cfg.app.model_path = dir.path().join("models/rf.json").display().to_string();
        cfg.app.db_path = Some(dir.path().join("employees.db").display().to_string());
        cfg.app.results_csv = Some(dir.path().join("submissions.csv").display().to_string());
        cfg.model.clean_data.results_path = Some(dir.path().join("results.csv").display().to_string());
        cfg.model.train_model.n_estimators = 25;
        Self { dir, cfg }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_raw(&self, n: usize) -> PathBuf {
        let path = self.path("raw.csv");
        fs::write(&path, raw_csv(n)).unwrap();
        path
    }

    pub fn split_paths(&self) -> [PathBuf; 4] {
        ["X_train.csv", "X_test.csv", "y_train.csv", "y_test.csv"].map(|name| self.path(name))
    }

    /// Run clean, split and train, leaving the artifact at `app.model_path`.
    pub fn train_model(&self, n: usize) -> [PathBuf; 4] {
        let raw = self.write_raw(n);
        let processed = self.path("processed.csv");
        run_clean(&self.cfg, &raw, &processed).unwrap();
        let parts = self.split_paths();
        run_split(&self.cfg, &processed, &parts).unwrap();
        run_train(&self.cfg, &parts[0], &parts[2], &self.cfg.app.model_path).unwrap();
        assert!(Path::new(&self.cfg.app.model_path).exists());
        parts
    }
}
