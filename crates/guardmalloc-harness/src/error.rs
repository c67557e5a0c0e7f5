use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown scenario '{0}' (see `harness list`)")]
    UnknownScenario(String),
    #[error("unknown mode '{0}' (expected guarded, off or both)")]
    UnknownMode(String),
    #[error("scenario {scenario} failed: {detail}")]
    Assertion { scenario: String, detail: String },
    #[error("{failed} of {total} scenario runs failed")]
    ScenarioFailures { failed: usize, total: usize },
}
