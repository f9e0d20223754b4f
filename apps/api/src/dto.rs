use serde::{Deserialize, Serialize};

/// Health of one external dependency.
#[derive(Debug, Clone, Serialize)]
pub struct HealthDependencyStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub execution_mode: &'static str,
    pub redis: HealthDependencyStatus,
    pub queue_depth: Option<u64>,
    pub sessions: usize,
    pub groups: usize,
}

/// Query parameters accepted on the socket upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct SocketAuthQuery {
    pub token: Option<String>,
}
