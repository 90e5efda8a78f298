//! Command surface: pipeline stages, database maintenance and the web server.
//!
//! Every stage reads its inputs, does one thing and persists its outputs, so
//! stages can be re-run independently.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::common::config::{AppCfg, DEFAULT_CONFIG_PATH};
use crate::common::error::{AttrResult, AttritionError};
use crate::data::domain::{EmployeeRepo, Table};
use crate::data::repo_fs::{read_table, write_table};
use crate::data::repo_sqlite::SqliteEmployeeRepo;
use crate::data::service::{self as data_service, CleanParams};
use crate::evaluation::domain::EvalReport;
use crate::evaluation::service as evaluation_service;
use crate::inference::service as inference_service;
use crate::training::forest::ForestParams;
use crate::training::service::{self as training_service, binary_column, ArtifactStores};

use super::web;

/// Employee attrition prediction: offline pipeline and web app.
#[derive(Parser, Debug)]
#[command(name = "attrition", about = "Employee attrition prediction pipeline and web app", version)]
pub struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// YAML configuration file (defaults to config/config.yaml when present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download or copy the raw employee data.
    Get {
        /// URL or local path; overrides `model.get_data.url`.
        #[arg(long)]
        input: Option<String>,
        #[arg(long)]
        output: PathBuf,
    },

    /// Impute, drop incomplete rows, select columns and one-hot encode.
    Clean {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },

    /// Split cleaned data into training and test sets.
    Split {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, num_args = 4, value_names = ["X_TRAIN", "X_TEST", "Y_TRAIN", "Y_TEST"])]
        output: Vec<PathBuf>,
    },

    /// Train the random forest and save the artifact.
    Train {
        #[arg(long, num_args = 2, value_names = ["X_TRAIN", "Y_TRAIN"])]
        input: Vec<PathBuf>,
        /// Artifact location; defaults to `app.model_path`.
        #[arg(long)]
        output: Option<String>,
    },

    /// Predict probabilities and labels for the test set.
    Score {
        #[arg(long, num_args = 2, value_names = ["MODEL", "X_TEST"])]
        input: Vec<String>,
        #[arg(long, num_args = 2, value_names = ["PROBA", "LABELS"])]
        output: Vec<PathBuf>,
    },

    /// Compute AUC, accuracy and the confusion matrix.
    Evaluate {
        #[arg(long, num_args = 3, value_names = ["Y_TEST", "PROBA", "LABELS"])]
        input: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },

    /// Create the employee table.
    CreateDb {
        /// Database file; overrides `app.db_path`.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Load employee rows from a CSV into the database.
    Ingest {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run the web app.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Clean { .. } => "clean",
            Command::Split { .. } => "split",
            Command::Train { .. } => "train",
            Command::Score { .. } => "score",
            Command::Evaluate { .. } => "evaluate",
            Command::CreateDb { .. } => "create-db",
            Command::Ingest { .. } => "ingest",
            Command::Serve { .. } => "serve",
        }
    }
}

/// Resolve the configuration: an explicit path must exist, the default one may not.
pub fn load_config(path: Option<&Path>) -> AttrResult<AppCfg> {
    match path {
        Some(path) => AppCfg::load(Some(path)),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                AppCfg::load(Some(default))
            } else {
                info!(path = DEFAULT_CONFIG_PATH, "no configuration file, using defaults");
                AppCfg::load(None)
            }
        }
    }
}

fn exactly<T, const N: usize>(values: Vec<T>, what: &str) -> AttrResult<[T; N]> {
    let got = values.len();
    values
        .try_into()
        .map_err(|_| AttritionError::config(format!("{what} takes {N} paths, got {got}")))
}

/// Run one parsed command.
pub fn run(cli: Cli) -> AttrResult<()> {
    let mut cfg = load_config(cli.config.as_deref())?;
    info!(stage = cli.command.name(), "configuration loaded");

    match cli.command {
        Command::Get { input, output } => run_get(&cfg, input.as_deref(), &output),
        Command::Clean { input, output } => run_clean(&cfg, &input, &output),
        Command::Split { input, output } => run_split(&cfg, &input, &exactly(output, "split --output")?),
        Command::Train { input, output } => {
            let [x_train, y_train] = exactly(input, "train --input")?;
            let location = output.unwrap_or_else(|| cfg.app.model_path.clone());
            run_train(&cfg, &x_train, &y_train, &location)
        }
        Command::Score { input, output } => {
            let [model, x_test] = exactly(input, "score --input")?;
            let [proba, labels] = exactly(output, "score --output")?;
            run_score(&cfg, &model, Path::new(&x_test), &proba, &labels)
        }
        Command::Evaluate { input, output } => {
            let [y_test, proba, labels] = exactly(input, "evaluate --input")?;
            let report = run_evaluate(&cfg, &y_test, &proba, &labels, &output)?;
            println!("{report}");
            Ok(())
        }
        Command::CreateDb { db } => run_create_db(&resolve_db(&cfg, db)?),
        Command::Ingest { input, db } => run_ingest(&resolve_db(&cfg, db)?, &input).map(|_| ()),
        Command::Serve { host, port } => {
            if let Some(host) = host {
                cfg.app.host = host;
            }
            if let Some(port) = port {
                cfg.app.port = port;
            }
            web::serve(&cfg)
        }
    }
}

fn resolve_db(cfg: &AppCfg, db: Option<PathBuf>) -> AttrResult<PathBuf> {
    db.or_else(|| cfg.app.db_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| AttritionError::config("no database: pass --db or set app.db_path"))
}

pub fn run_get(cfg: &AppCfg, input: Option<&str>, output: &Path) -> AttrResult<()> {
    let source = input.unwrap_or(&cfg.model.get_data.url);
    let timeout = Duration::from_secs(cfg.object_store.timeout_secs);
    let table = data_service::get_data(source, timeout)?;
    write_table(&table, output)?;
    info!(stage = "get", path = %output.display(), rows = table.len(), "raw data saved");
    Ok(())
}

pub fn run_clean(cfg: &AppCfg, input: &Path, output: &Path) -> AttrResult<()> {
    let raw = read_table(input)?;
    let cleaned = data_service::clean(&raw, &CleanParams::from_cfg(cfg))?;
    if let (Some(results), Some(path)) = (&cleaned.results, &cfg.model.clean_data.results_path) {
        write_table(results, Path::new(path))?;
        info!(stage = "clean", path = %path, rows = results.len(), "results for ingest saved");
    }
    write_table(&cleaned.table, output)?;
    info!(stage = "clean", path = %output.display(), columns = ?cleaned.table.columns(), "processed data saved");
    Ok(())
}

pub fn run_split(cfg: &AppCfg, input: &Path, outputs: &[PathBuf; 4]) -> AttrResult<()> {
    let data = read_table(input)?;
    let split = &cfg.model.split_data;
    let parts = data_service::split(&data, &cfg.features.target, split.test_size, split.random_state)?;
    for (table, path, what) in [
        (&parts.x_train, &outputs[0], "X_train"),
        (&parts.x_test, &outputs[1], "X_test"),
        (&parts.y_train, &outputs[2], "y_train"),
        (&parts.y_test, &outputs[3], "y_test"),
    ] {
        write_table(table, path)?;
        info!(stage = "split", path = %path.display(), rows = table.len(), "{what} saved");
    }
    Ok(())
}

pub fn run_train(cfg: &AppCfg, x_train: &Path, y_train: &Path, location: &str) -> AttrResult<()> {
    let x = read_table(x_train)?;
    let y = read_table(y_train)?;
    let params = ForestParams::from(&cfg.model.train_model);
    let artifact = training_service::train(&x, &y, &cfg.features.target, &cfg.features.categorical, &params)?;
    ArtifactStores::new(cfg).save_to(&artifact, location)?;
    info!(stage = "train", location, "random forest model saved");
    Ok(())
}

pub fn run_score(cfg: &AppCfg, model: &str, x_test: &Path, proba_out: &Path, labels_out: &Path) -> AttrResult<()> {
    let artifact = ArtifactStores::new(cfg).load_from(model)?;
    let x = read_table(x_test)?;
    let scores = inference_service::score(&artifact, &x)?;
    write_table(&scores.probability_table()?, proba_out)?;
    write_table(&scores.label_table()?, labels_out)?;
    info!(stage = "score", proba = %proba_out.display(), labels = %labels_out.display(), "predictions saved");
    Ok(())
}

fn first_column(table: &Table, path: &Path) -> AttrResult<String> {
    table
        .columns()
        .first()
        .cloned()
        .ok_or_else(|| AttritionError::invalid(format!("{} has no columns", path.display())))
}

pub fn run_evaluate(
    cfg: &AppCfg,
    y_test: &Path,
    proba: &Path,
    labels: &Path,
    output: &Path,
) -> AttrResult<EvalReport> {
    let truth_table = read_table(y_test)?;
    let truth = binary_column(&truth_table, &cfg.features.target)?;
    let proba_table = read_table(proba)?;
    let probabilities = proba_table.numeric_column(&first_column(&proba_table, proba)?)?;
    let label_table = read_table(labels)?;
    let predicted = binary_column(&label_table, &first_column(&label_table, labels)?)?;

    let report = evaluation_service::evaluate(&truth, Some(&probabilities), &predicted)?;
    write_table(&report.confusion.to_table()?, output)?;
    if report.auc.is_none() {
        warn!(stage = "evaluate", "AUC undefined for this test set");
    }
    info!(stage = "evaluate", path = %output.display(), "confusion matrix saved");
    Ok(report)
}

pub fn run_create_db(db: &Path) -> AttrResult<()> {
    SqliteEmployeeRepo::new(db).create_schema()
}

pub fn run_ingest(db: &Path, input: &Path) -> AttrResult<usize> {
    let repo = SqliteEmployeeRepo::new(db);
    let count = repo.bulk_ingest(input)?;
    info!(stage = "ingest", db = %db.display(), count, "rows ingested");
    Ok(count)
}
