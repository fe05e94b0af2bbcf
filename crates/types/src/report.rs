//! Deployment status reporting types

use crate::package::Package;
use serde::{Deserialize, Serialize};

/// Whether a deployment succeeded (first confirmed run) or failed
/// (rolled back before confirmation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[serde(rename = "DeploymentSucceeded")]
    Succeeded,
    #[serde(rename = "DeploymentFailed")]
    Failed,
}

/// Fire-and-forget analytics record sent to the deployment server after a
/// rollback or a successful first run. Its delivery failure never affects
/// the install decision already made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatusReport {
    pub app_version: String,
    pub deployment_key: String,
    pub label: String,
    pub client_unique_id: String,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_deployment_key: Option<String>,
    /// Label of the package upgraded from, or the bare app version when
    /// there was no previous package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_label_or_app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&DeploymentStatus::Succeeded).unwrap(),
            "\"DeploymentSucceeded\""
        );
        assert_eq!(
            serde_json::to_string(&DeploymentStatus::Failed).unwrap(),
            "\"DeploymentFailed\""
        );
    }
}
