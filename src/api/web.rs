//! Web front-end: the employee form, predictions and submission recording.
//!
//! Handlers stay thin. Each submission's blocking work (validation,
//! persistence, inference) runs on the blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{AttrResult, AttritionError, ErrorCode};
use crate::data::domain::{AttrValue, EmployeeRecord, EmployeeRepo, RawAttributeRecord, EMPLOYEE_NUMBER};
use crate::data::repo_fs::CsvEmployeeLog;
use crate::data::repo_sqlite::SqliteEmployeeRepo;
use crate::data::service::SubmissionRecorder;
use crate::features::domain::{default_categoricals, CategoricalLevels};
use crate::inference::domain::PredictionResult;
use crate::inference::service::InferenceService;
use crate::training::domain::{ArtifactLocation, ArtifactStore};
use crate::training::service::ArtifactStores;

/// Plain-text reply to `GET /result`.
pub const RESULT_HINT: &str = "Visit the homepage to add applicants and get predictions";

/// Everything a request needs, built once at startup.
pub struct WebApp {
    name: String,
    choices: Vec<CategoricalLevels>,
    inference: InferenceService,
    recorder: SubmissionRecorder,
}

/// Outcome of one accepted submission.
#[derive(Clone, Debug)]
pub struct Submission {
    pub employee_number: i64,
    pub prediction: PredictionResult,
}

impl WebApp {
    pub fn new(name: impl Into<String>, inference: InferenceService, recorder: SubmissionRecorder) -> Self {
        Self {
            name: name.into(),
            choices: default_categoricals(),
            inference,
            recorder,
        }
    }

    /// Offer these levels in the form's select fields.
    pub fn with_choices(mut self, choices: Vec<CategoricalLevels>) -> Self {
        self.choices = choices;
        self
    }

    /// Wire the configured artifact location and stores.
    pub fn from_cfg(cfg: &AppCfg) -> AttrResult<Self> {
        let location = ArtifactLocation::parse(&cfg.app.model_path)?;
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(ArtifactStores::new(cfg));

        let mut stores: Vec<Arc<dyn EmployeeRepo>> = Vec::new();
        if let Some(db) = &cfg.app.db_path {
            stores.push(Arc::new(SqliteEmployeeRepo::new(db)));
        }
        if let Some(csv) = &cfg.app.results_csv {
            stores.push(Arc::new(CsvEmployeeLog::new(csv)));
        }
        if stores.is_empty() {
            warn!("no submission store configured; submissions will not be recorded");
        }
        let recorder = SubmissionRecorder::new(stores);
        info!(stores = ?recorder.stores().collect::<Vec<_>>(), "submission stores ready");

        Ok(Self::new(
            cfg.app.name.clone(),
            InferenceService::new(location, artifacts),
            recorder,
        )
        .with_choices(cfg.features.categorical.clone()))
    }

    pub fn inference(&self) -> &InferenceService {
        &self.inference
    }

    /// Validate, record and predict one form submission.
    pub fn submit(&self, fields: &HashMap<String, String>) -> AttrResult<Submission> {
        let raw: RawAttributeRecord = fields
            .iter()
            .filter_map(|(k, v)| AttrValue::parse(v).map(|value| (k.clone(), value)))
            .collect();
        let employee = raw
            .get(EMPLOYEE_NUMBER)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let record = EmployeeRecord::from_record(&raw).map_err(|err| {
            warn!(stage = "validate", employee = %employee, error = %err, "submission rejected");
            err
        })?;

        self.recorder.record(&record);

        let prediction = self
            .inference
            .predict_record(&record.attributes.to_raw())
            .map_err(|err| {
                error!(
                    stage = "predict",
                    employee = record.employee_number,
                    code = err.code().as_str(),
                    error = %err,
                    "prediction failed"
                );
                err
            })?;
        info!(
            employee = record.employee_number,
            probability = prediction.probability,
            label = %prediction.label,
            "attrition predicted"
        );
        Ok(Submission {
            employee_number: record.employee_number,
            prediction,
        })
    }
}

#[derive(Clone)]
pub struct AppState(Arc<WebApp>);

impl AppState {
    pub fn new(app: WebApp) -> Self {
        Self(Arc::new(app))
    }

    pub fn app(&self) -> &WebApp {
        &self.0
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/result", get(result_hint).post(add_entry))
        .route("/about", get(about))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(pages::index(&state.0.name, &state.0.choices))
}

async fn result_hint() -> &'static str {
    RESULT_HINT
}

async fn about(State(state): State<AppState>) -> Html<String> {
    Html(pages::about(&state.0.name))
}

async fn add_entry(
    State(state): State<AppState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Html<String> {
    let fields = match form {
        Ok(Form(fields)) => fields,
        Err(rejection) => {
            warn!(stage = "validate", error = %rejection, "unreadable form");
            let err = AttritionError::invalid(rejection.body_text());
            return Html(pages::error(&state.0.name, &err));
        }
    };

    let app = Arc::clone(&state.0);
    match tokio::task::spawn_blocking(move || app.submit(&fields)).await {
        Ok(Ok(submission)) => Html(pages::result(&state.0.name, &submission)),
        Ok(Err(err)) => Html(pages::error(&state.0.name, &err)),
        Err(join) => {
            error!(stage = "predict", error = %join, "submission task failed");
            let err = AttritionError::invalid("the request could not be completed");
            Html(pages::error(&state.0.name, &err))
        }
    }
}

/// Bind and serve until Ctrl-C.
pub fn serve(cfg: &AppCfg) -> AttrResult<()> {
    let app = WebApp::from_cfg(cfg)?;
    // Loaded eagerly so a bad artifact shows up in the startup log; requests retry on failure.
    if let Err(err) = app.inference().artifact() {
        warn!(code = err.code().as_str(), error = %err, "classifier not available yet");
    }

    let addr = format!("{}:{}", cfg.app.host, cfg.app.port);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AttritionError::io("tokio runtime", e))?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AttritionError::connection(&addr, e))?;
        info!(addr = %addr, name = %cfg.app.name, "web app listening");
        axum::serve(listener, router(AppState::new(app)))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AttritionError::connection(&addr, e))
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

mod pages {
    use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

    use super::{AttritionError, CategoricalLevels, ErrorCode, Submission};
    use crate::data::domain::NUMERIC_ATTRIBUTES;

    const INDEX: &str = include_str!("../../templates/index.html");
    const RESULT: &str = include_str!("../../templates/result.html");
    const ERROR: &str = include_str!("../../templates/error.html");
    const ABOUT: &str = include_str!("../../templates/about.html");

    /// Replace `{{key}}` slots. Values must already be escaped.
    fn fill(template: &str, slots: &[(&str, String)]) -> String {
        slots.iter().fold(template.to_string(), |page, (key, value)| {
            page.replace(&format!("{{{{{key}}}}}"), value)
        })
    }

    fn select(name: &str, levels: &[String]) -> String {
        let options: String = levels
            .iter()
            .map(|l| format!("      <option value=\"{}\">{}</option>\n", attr(l), text(l)))
            .collect();
        format!(
            "    <label>{} <select name=\"{}\" required>\n{options}    </select></label><br>\n",
            text(name),
            attr(name)
        )
    }

    pub(super) fn index(name: &str, choices: &[CategoricalLevels]) -> String {
        let scores: String = NUMERIC_ATTRIBUTES
            .iter()
            .map(|n| {
                format!(
                    "    <label>{} <input type=\"number\" name=\"{}\" min=\"0\" required></label><br>\n",
                    text(n),
                    attr(n)
                )
            })
            .collect();
        let choices: String = choices.iter().map(|c| select(&c.name, &c.levels)).collect();
        fill(
            INDEX,
            &[
                ("app_name", text(name).into_owned()),
                ("score_fields", scores),
                ("choice_fields", choices),
            ],
        )
    }

    pub(super) fn result(name: &str, submission: &Submission) -> String {
        let p = &submission.prediction;
        fill(
            RESULT,
            &[
                ("app_name", text(name).into_owned()),
                ("employee", submission.employee_number.to_string()),
                ("percent", p.percent()),
                ("probability", format!("{:.2}", p.probability)),
                ("label", p.label.to_string()),
            ],
        )
    }

    pub(super) fn error(name: &str, err: &AttritionError) -> String {
        let detail = match err.code() {
            ErrorCode::DataValidation => format!("Please check the form: {err}"),
            _ => "The prediction service is unavailable right now. Please try again later.".to_string(),
        };
        fill(
            ERROR,
            &[
                ("app_name", text(name).into_owned()),
                ("detail", text(&detail).into_owned()),
            ],
        )
    }

    pub(super) fn about(name: &str) -> String {
        fill(ABOUT, &[("app_name", text(name).into_owned())])
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn index_lists_every_field() {
            let page = index("Attrition", &crate::features::domain::default_categoricals());
            for name in NUMERIC_ATTRIBUTES {
                assert!(page.contains(&format!("name=\"{name}\"")), "{name}");
            }
            assert!(page.contains("<option value=\"Divorced\">"));
            assert!(page.contains("<option value=\"No\">"));
            assert!(!page.contains("{{"));
        }

        #[test]
        fn error_detail_is_escaped() {
            let page = error("App", &AttritionError::invalid("<script>"));
            assert!(page.contains("&lt;script&gt;"));
            assert!(!page.contains("<script>"));
        }

        #[test]
        fn internal_errors_stay_generic() {
            let page = error("App", &AttritionError::artifact_load("/models/rf.json", "gone"));
            assert!(!page.contains("/models/rf.json"));
            assert!(page.contains("unavailable"));
        }
    }
}
