//! Deployment-server protocol: update check and status report

use crate::client::NetClient;
use serde::{Deserialize, Serialize};
use updraft_errors::{Error, ReportError, ServerError};
use updraft_types::{DeploymentStatusReport, Package, RemotePackage};

pub const UPDATE_CHECK_PATH: &str = "/updateCheck";
pub const REPORT_STATUS_PATH: &str = "/reportStatus/deploy";

/// Parameters of one update-check query.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCheckRequest {
    pub deployment_key: String,
    pub app_version: String,
    /// Hash of the running package; empty when none is installed yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_hash: Option<String>,
    /// Label of the running package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub client_unique_id: String,
}

/// What the server answered to an update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckForUpdateResult {
    /// Nothing newer than the supplied baseline hash
    NoUpdate,
    /// The server only has bundles targeting a newer host binary
    NewerHostRequired { required_app_version: String },
    /// A newer package is available
    Update(RemotePackage),
}

/// Raw update-check payload. Unknown fields are ignored; required fields
/// are validated when converting into a `RemotePackage`.
#[derive(Debug, Deserialize)]
struct UpdateCheckResponse {
    update_info: UpdateInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateInfo {
    is_available: bool,
    update_app_version: bool,
    download_url: Option<String>,
    package_hash: Option<String>,
    label: Option<String>,
    package_size: Option<u64>,
    is_mandatory: bool,
    description: Option<String>,
    app_version: Option<String>,
}

impl UpdateInfo {
    fn into_result(self, deployment_key: &str) -> Result<CheckForUpdateResult, Error> {
        if !self.is_available {
            return Ok(CheckForUpdateResult::NoUpdate);
        }
        if self.update_app_version {
            return Ok(CheckForUpdateResult::NewerHostRequired {
                required_app_version: self.app_version.unwrap_or_default(),
            });
        }

        let missing = |field: &str| ServerError::MalformedResponse {
            message: format!("update_info missing required field '{field}'"),
        };

        Ok(CheckForUpdateResult::Update(RemotePackage {
            package: Package {
                deployment_key: deployment_key.to_string(),
                label: self.label.ok_or_else(|| missing("label"))?,
                package_hash: self.package_hash.ok_or_else(|| missing("package_hash"))?,
                app_version: self.app_version.ok_or_else(|| missing("app_version"))?,
                is_mandatory: self.is_mandatory,
                description: self.description,
            },
            download_url: self.download_url.ok_or_else(|| missing("download_url"))?,
            package_size: self.package_size.unwrap_or(0),
        }))
    }
}

/// Stateless request/response layer to the deployment server.
#[derive(Clone)]
pub struct AcquisitionManager {
    client: NetClient,
    server_url: String,
}

impl AcquisitionManager {
    #[must_use]
    pub fn new(client: NetClient, server_url: impl Into<String>) -> Self {
        let mut server_url = server_url.into();
        while server_url.ends_with('/') {
            server_url.pop();
        }
        Self { client, server_url }
    }

    /// Ask the server whether anything newer than the baseline exists.
    ///
    /// Pure query: repeated calls with the same baseline and unchanged
    /// server state deterministically return `NoUpdate`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` on transport failure and `ServerError` on a
    /// non-success status or a malformed payload.
    pub async fn check_for_update(
        &self,
        request: &UpdateCheckRequest,
    ) -> Result<CheckForUpdateResult, Error> {
        let url = format!("{}{UPDATE_CHECK_PATH}", self.server_url);
        let response = self.client.get_ok_with_query(&url, request).await?;

        let body: UpdateCheckResponse =
            response
                .json()
                .await
                .map_err(|e| ServerError::MalformedResponse {
                    message: e.to_string(),
                })?;

        body.update_info.into_result(&request.deployment_key)
    }

    /// Deliver a deployment status report. Best-effort: failures map to
    /// `ReportError` and must never influence the install decision.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if the report cannot be delivered.
    pub async fn report_status(&self, report: &DeploymentStatusReport) -> Result<(), Error> {
        let url = format!("{}{REPORT_STATUS_PATH}", self.server_url);
        self.client
            .post_json(&url, report)
            .await
            .map_err(|e| match e {
                Error::Server(ServerError::UnexpectedStatus { status, .. }) => {
                    Error::Report(ReportError::Rejected { status })
                }
                other => Error::Report(ReportError::SendFailed {
                    message: other.to_string(),
                }),
            })?;
        Ok(())
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
