// crates/types/src/api.rs
//! Response bodies of the executor's start and cancel endpoints.

use serde::Deserialize;

/// Body of `POST /api/jobs/start/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /api/jobs/cancel/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CancelResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
