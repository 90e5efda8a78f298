//! Service layer for raw data ingestion, cleaning, splitting and the
//! dual-write of online submissions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{AttrResult, AttritionError};
use crate::features::domain::{CategoricalLevels, EncodingSpec};
use crate::features::service::FeatureTransformer;

use super::domain::{AttrValue, Cell, EmployeeRecord, EmployeeRepo, Table};
use super::repo_fs::{parse_table, read_table};

/// Download a CSV over HTTP(S).
pub fn fetch(url: &str, timeout: Duration) -> AttrResult<Table> {
    debug!(url, "downloading raw data");
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AttritionError::upstream(url, e))?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| AttritionError::upstream(url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AttritionError::upstream(url, format!("HTTP {status}")));
    }
    let body = response.text().map_err(|e| AttritionError::upstream(url, e))?;
    let table = parse_table(body.as_bytes(), url)?;
    info!(url, rows = table.len(), "raw data downloaded");
    Ok(table)
}

/// Acquire raw data from a URL or a local path.
pub fn get_data(source: &str, timeout: Duration) -> AttrResult<Table> {
    if source.is_empty() {
        return Err(AttritionError::config(
            "no raw data source: pass --input or set model.get_data.url",
        ));
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        fetch(source, timeout)
    } else {
        read_table(Path::new(source))
    }
}

/// Inputs of the clean stage.
#[derive(Clone, Debug)]
pub struct CleanParams {
    pub missing_col: Vec<String>,
    pub columns: Vec<String>,
    pub id_column: String,
    pub target: String,
    pub declared: Vec<CategoricalLevels>,
    /// Also produce the retained columns plus the identifier for bulk ingest.
    pub keep_results: bool,
}

impl CleanParams {
    pub fn from_cfg(cfg: &AppCfg) -> Self {
        let clean = &cfg.model.clean_data;
        Self {
            missing_col: clean.missing_col.clone(),
            columns: clean.columns.clone(),
            id_column: clean.id_column.clone(),
            target: cfg.features.target.clone(),
            declared: cfg.features.categorical.clone(),
            keep_results: clean.results_path.is_some(),
        }
    }
}

/// Output of the clean stage.
#[derive(Clone, Debug)]
pub struct CleanedData {
    /// Encoded feature columns followed by the 0/1 target.
    pub table: Table,
    /// Encoding that produced `table`'s feature columns.
    pub spec: EncodingSpec,
    /// Retained raw columns plus the identifier, when requested.
    pub results: Option<Table>,
}

/// Impute, drop incomplete rows, select, map the target and encode.
pub fn clean(data: &Table, params: &CleanParams) -> AttrResult<CleanedData> {
    let mut required: Vec<&str> = params.columns.iter().map(String::as_str).collect();
    required.extend(params.missing_col.iter().map(String::as_str));
    if params.keep_results {
        required.push(&params.id_column);
    }
    data.require_columns(&required)?;
    if !params.columns.contains(&params.target) {
        return Err(AttritionError::invalid(format!(
            "retained columns must include the target {}",
            params.target
        )));
    }

    // Means are computed before any cell is filled, so imputation order is irrelevant.
    let mut working = data.clone();
    let mut fills = Vec::with_capacity(params.missing_col.len());
    for col in &params.missing_col {
        let idx = working.column_index(col).unwrap_or_default();
        fills.push((idx, column_mean(&working, col, idx)?));
    }
    let mut imputed = 0usize;
    for row in working.rows_mut() {
        for &(idx, mean) in &fills {
            if row[idx].is_none() {
                row[idx] = Some(AttrValue::Number(mean));
                imputed += 1;
            }
        }
    }

    let before = working.len();
    working.rows_mut().retain(|row| row.iter().all(Option::is_some));
    let dropped = before - working.len();
    if working.is_empty() {
        return Err(AttritionError::invalid("no complete rows left after cleaning"));
    }

    let results = if params.keep_results {
        let mut cols: Vec<&str> = params.columns.iter().map(String::as_str).collect();
        if !cols.contains(&params.id_column.as_str()) {
            cols.push(&params.id_column);
        }
        let mut results = working.select(&cols)?;
        round_columns(&mut results, &params.missing_col);
        Some(results)
    } else {
        None
    };

    let retained: Vec<&str> = params
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| *c != params.id_column)
        .collect();
    let mut selected = working.select(&retained)?;
    map_target(&mut selected, &params.target)?;

    let spec = EncodingSpec::resolve(&retained, &[params.target.as_str()], &params.declared)?;
    let table = FeatureTransformer::new(spec.clone()).transform_table(&selected, &[&params.target])?;
    info!(rows = table.len(), imputed, dropped, features = spec.width(), "data cleaned");
    Ok(CleanedData {
        table,
        spec,
        results,
    })
}

/// Stored scores are whole numbers, so imputed means are rounded in the ingest table.
fn round_columns(table: &mut Table, names: &[String]) {
    let idxs: Vec<usize> = names.iter().filter_map(|n| table.column_index(n)).collect();
    for row in table.rows_mut() {
        for &i in &idxs {
            if let Some(AttrValue::Number(n)) = &mut row[i] {
                *n = n.round();
            }
        }
    }
}

fn column_mean(table: &Table, name: &str, idx: usize) -> AttrResult<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for row in table.rows() {
        match &row[idx] {
            Some(AttrValue::Number(n)) => {
                sum += n;
                count += 1;
            }
            Some(AttrValue::Text(t)) => {
                return Err(AttritionError::invalid(format!(
                    "column {name} is listed for mean imputation but holds text {t:?}"
                )))
            }
            None => {}
        }
    }
    if count == 0 {
        return Err(AttritionError::invalid(format!(
            "column {name} has no values to impute from"
        )));
    }
    Ok(sum / count as f64)
}

/// `Yes`→1, `No`→0; cells already 0/1 are kept so cleaning is idempotent.
fn map_target(table: &mut Table, target: &str) -> AttrResult<()> {
    let idx = table.require_columns(&[target])?[0];
    for (row_no, row) in table.rows_mut().iter_mut().enumerate() {
        let mapped = match &row[idx] {
            Some(AttrValue::Text(t)) if t == "Yes" => 1.0,
            Some(AttrValue::Text(t)) if t == "No" => 0.0,
            Some(AttrValue::Number(n)) if *n == 0.0 || *n == 1.0 => *n,
            other => {
                return Err(AttritionError::invalid(format!(
                    "row {}: target {target} must be Yes or No, got {}",
                    row_no + 1,
                    other.as_ref().map(|v| v.to_string()).unwrap_or_default()
                )))
            }
        };
        row[idx] = Some(AttrValue::Number(mapped));
    }
    Ok(())
}

/// Train/test partition of a cleaned table.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitData {
    pub x_train: Table,
    pub x_test: Table,
    pub y_train: Table,
    pub y_test: Table,
}

/// Seeded shuffle-split. The first `ceil(n * test_size)` shuffled rows form the test set.
pub fn split(data: &Table, target: &str, test_size: f64, seed: u64) -> AttrResult<SplitData> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(AttritionError::invalid(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let target_idx = data.require_columns(&[target])?[0];
    let n = data.len();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(AttritionError::invalid(format!(
            "cannot split {n} rows with test_size {test_size}: both partitions must be non-empty"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let (test_idx, train_idx) = order.split_at(n_test);

    let feature_cols: Vec<String> = data
        .columns()
        .iter()
        .filter(|c| *c != target)
        .cloned()
        .collect();
    let take = |indices: &[usize]| -> AttrResult<(Table, Table)> {
        let mut x = Table::new(feature_cols.clone());
        let mut y = Table::new(vec![target.to_string()]);
        for &i in indices {
            let row = &data.rows()[i];
            let features: Vec<Cell> = row
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != target_idx)
                .map(|(_, c)| c.clone())
                .collect();
            x.push_row(features)?;
            y.push_row(vec![row[target_idx].clone()])?;
        }
        Ok((x, y))
    };

    let (x_train, y_train) = take(train_idx)?;
    let (x_test, y_test) = take(test_idx)?;
    debug!(train = x_train.len(), test = x_test.len(), seed, "split data to training and testing sets");
    Ok(SplitData {
        x_train,
        x_test,
        y_train,
        y_test,
    })
}

/// Result of writing one submission to one store.
#[derive(Debug)]
pub struct StoreOutcome {
    pub store: String,
    pub result: AttrResult<()>,
}

/// Result of a dual write.
#[derive(Debug, Default)]
pub struct RecordOutcome {
    pub outcomes: Vec<StoreOutcome>,
}

impl RecordOutcome {
    pub fn stored(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.stored()
    }

    /// Some stores accepted the record and others did not.
    pub fn diverged(&self) -> bool {
        self.stored() > 0 && self.failed() > 0
    }
}

/// Writes each submission to every configured store independently.
///
/// A failing store never prevents the others from being written; divergence
/// is logged because nothing reconciles the stores afterwards.
#[derive(Clone, Default)]
pub struct SubmissionRecorder {
    stores: Vec<Arc<dyn EmployeeRepo>>,
}

impl SubmissionRecorder {
    pub fn new(stores: Vec<Arc<dyn EmployeeRepo>>) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> impl Iterator<Item = String> + '_ {
        self.stores.iter().map(|s| s.describe())
    }

    pub fn record(&self, record: &EmployeeRecord) -> RecordOutcome {
        let outcomes: Vec<StoreOutcome> = self
            .stores
            .iter()
            .map(|store| {
                let result = store.add_record(record);
                if let Err(err) = &result {
                    error!(
                        stage = "persist",
                        employee = record.employee_number,
                        store = %store.describe(),
                        code = err.code().as_str(),
                        error = %err,
                        "failed to persist submission"
                    );
                }
                StoreOutcome {
                    store: store.describe(),
                    result,
                }
            })
            .collect();

        let outcome = RecordOutcome { outcomes };
        if outcome.diverged() {
            let failed: Vec<&str> = outcome
                .outcomes
                .iter()
                .filter(|o| o.result.is_err())
                .map(|o| o.store.as_str())
                .collect();
            warn!(
                employee = record.employee_number,
                failed = ?failed,
                "stores diverged: submission is missing from some stores"
            );
        } else if outcome.stored() > 0 {
            info!(employee = record.employee_number, stores = outcome.stored(), "submission recorded");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorCode;
    use crate::data::domain::tests::sample_raw;
    use crate::data::repo_fs::CsvEmployeeLog;
    use crate::data::repo_sqlite::SqliteEmployeeRepo;
    use crate::features::domain::default_categoricals;
    use proptest::prelude::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(columns: &[&str], missing: &[&str]) -> CleanParams {
        CleanParams {
            missing_col: missing.iter().map(|s| s.to_string()).collect(),
            columns: columns.iter().map(|s| s.to_string()).collect(),
            id_column: "EmployeeNumber".into(),
            target: "Attrition".into(),
            declared: default_categoricals(),
            keep_results: false,
        }
    }

    fn raw_table() -> Table {
        let columns = ["EmployeeNumber", "JobSatisfaction", "JobLevel", "Gender", "MaritalStatus", "Attrition"];
        let rows = vec![
            vec![Some(1i64.into()), Some(1i64.into()), Some(1i64.into()), Some("Male".into()), Some("Single".into()), Some("Yes".into())],
            vec![Some(2i64.into()), None, Some(2i64.into()), Some("Female".into()), Some("Married".into()), Some("No".into())],
            vec![Some(3i64.into()), Some(3i64.into()), None, Some("Male".into()), Some("Divorced".into()), Some("No".into())],
            vec![Some(4i64.into()), Some(2i64.into()), Some(4i64.into()), Some("Female".into()), Some("Divorced".into()), Some("Yes".into())],
        ];
        Table::from_rows(columns.iter().map(|s| s.to_string()).collect(), rows).unwrap()
    }

    const RETAINED: [&str; 5] = ["JobSatisfaction", "JobLevel", "Gender", "MaritalStatus", "Attrition"];

    #[tokio::test]
    async fn fetch_parses_the_downloaded_csv() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("A,B\n1,Yes\n2,\n"))
            .mount(&server)
            .await;

        let url = format!("{}/raw.csv", server.uri());
        let table = tokio::task::spawn_blocking(move || get_data(&url, Duration::from_secs(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.columns(), &["A", "B"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1][1], None);
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down.csv"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        for name in ["down.csv", "absent.csv"] {
            let url = format!("{}/{name}", server.uri());
            let err = tokio::task::spawn_blocking(move || fetch(&url, Duration::from_secs(2)))
                .await
                .unwrap()
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::UpstreamFetch, "{name}");
        }
    }

    #[test]
    fn imputes_with_precomputed_mean() {
        let out = clean(&raw_table(), &params(&RETAINED, &["JobSatisfaction"])).unwrap();
        // mean of 1, 3, 2 is 2.0; row 3 is dropped for its missing JobLevel
        assert_eq!(out.table.len(), 3);
        let js = out.table.numeric_column("JobSatisfaction").unwrap();
        assert_eq!(js, vec![1.0, 2.0, 2.0]);
        assert_eq!(
            out.table.columns(),
            &["JobSatisfaction", "JobLevel", "Gender_Male", "MaritalStatus_Married", "MaritalStatus_Single", "Attrition"]
        );
        assert_eq!(out.table.numeric_column("Attrition").unwrap(), vec![1.0, 0.0, 1.0]);
        assert_eq!(out.spec.columns().len(), 5);
    }

    #[test]
    fn absent_columns_are_validation_errors() {
        let err = clean(&raw_table(), &params(&["JobSatisfaction", "Tenure", "Attrition"], &[])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataValidation);
        assert!(err.to_string().contains("Tenure"));
    }

    #[test]
    fn unknown_target_value_fails() {
        let mut table = raw_table();
        table.rows_mut()[0][5] = Some("Maybe".into());
        assert!(clean(&table, &params(&RETAINED, &["JobSatisfaction"])).is_err());
    }

    #[test]
    fn results_keep_identifier_and_raw_values() {
        let mut p = params(&RETAINED, &["JobSatisfaction"]);
        p.keep_results = true;
        let out = clean(&raw_table(), &p).unwrap();
        let results = out.results.unwrap();
        assert_eq!(results.columns().last().map(String::as_str), Some("EmployeeNumber"));
        assert_eq!(results.numeric_column("EmployeeNumber").unwrap(), vec![1.0, 2.0, 4.0]);
        assert_eq!(results.rows()[0][4], Some("Yes".into()));
    }

    #[test]
    fn fractional_means_are_rounded_for_ingest_only() {
        let mut table = raw_table();
        // JobSatisfaction 1, -, 2, 2 gives a mean of 5/3
        table.rows_mut()[2][1] = Some(2i64.into());
        table.rows_mut()[2][2] = Some(3i64.into());
        let mut p = params(&RETAINED, &["JobSatisfaction"]);
        p.keep_results = true;
        let out = clean(&table, &p).unwrap();

        let features = out.table.numeric_column("JobSatisfaction").unwrap();
        assert!((features[1] - 5.0 / 3.0).abs() < 1e-12);
        let results = out.results.unwrap();
        assert_eq!(results.numeric_column("JobSatisfaction").unwrap(), vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(results.rows()[1][0].as_ref().and_then(AttrValue::as_integer), Some(2));
    }

    #[test]
    fn cleaning_clean_data_is_identity() {
        let first = clean(&raw_table(), &params(&RETAINED, &["JobSatisfaction"])).unwrap();
        let cols: Vec<&str> = first.table.columns().iter().map(String::as_str).collect();
        let second = clean(&first.table, &params(&cols, &[])).unwrap();
        assert_eq!(second.table, first.table);
    }

    fn numbered(n: usize) -> Table {
        let rows = (0..n)
            .map(|i| vec![Some((i as f64).into()), Some(((i % 2) as f64).into())])
            .collect();
        Table::from_rows(vec!["x".into(), "Attrition".into()], rows).unwrap()
    }

    #[test]
    fn split_sizes_follow_ceil() {
        let s = split(&numbered(10), "Attrition", 0.25, 7).unwrap();
        assert_eq!(s.x_test.len(), 3);
        assert_eq!(s.x_train.len(), 7);
        assert_eq!(s.y_train.columns(), &["Attrition"]);
        assert_eq!(s.x_train.columns(), &["x"]);
    }

    #[test]
    fn split_rejects_degenerate_partitions() {
        assert!(split(&numbered(1), "Attrition", 0.5, 1).is_err());
        assert!(split(&numbered(10), "Attrition", 0.0, 1).is_err());
    }

    proptest! {
        #[test]
        fn split_is_deterministic_and_partitions(n in 2usize..60, seed in any::<u64>(), frac in 0.05f64..0.9) {
            let data = numbered(n);
            let n_test = (n as f64 * frac).ceil() as usize;
            prop_assume!(n_test < n);
            let a = split(&data, "Attrition", frac, seed).unwrap();
            let b = split(&data, "Attrition", frac, seed).unwrap();
            prop_assert_eq!(&a, &b);

            let mut seen: Vec<f64> = a.x_train.numeric_column("x").unwrap();
            seen.extend(a.x_test.numeric_column("x").unwrap());
            seen.sort_by(|p, q| p.partial_cmp(q).unwrap());
            let expected: Vec<f64> = (0..n).map(|i| i as f64).collect();
            prop_assert_eq!(seen, expected);
        }
    }

    #[test]
    fn recorder_keeps_file_when_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(CsvEmployeeLog::new(dir.path().join("subs.csv")));
        // schema never created, so every insert fails
        let db: Arc<dyn EmployeeRepo> = Arc::new(SqliteEmployeeRepo::new(dir.path().join("no-schema.db")));
        let file: Arc<dyn EmployeeRepo> = log.clone();
        let recorder = SubmissionRecorder::new(vec![db, file]);
        let labels: Vec<String> = recorder.stores().collect();
        assert!(labels[0].starts_with("sqlite:"));
        assert!(labels[1].starts_with("csv:"));

        let record = EmployeeRecord::from_record(&sample_raw(5)).unwrap();
        let outcome = recorder.record(&record);
        assert!(outcome.diverged());
        assert_eq!(outcome.stored(), 1);
        assert_eq!(read_table(log.path()).unwrap().len(), 1);
    }
}
