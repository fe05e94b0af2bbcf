//! Domain events emitted by the update engine

use serde::{Deserialize, Serialize};
use updraft_types::{DeploymentStatus, InstallMode};

/// Events emitted across the lifecycle of an update: acquisition,
/// download, install, rollback and restart sequencing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AppEvent {
    /// Update check issued against the deployment server
    CheckingForUpdate { deployment_key: String },

    /// The server advertised a newer package
    UpdateAvailable {
        label: String,
        package_hash: String,
        is_mandatory: bool,
        package_size: u64,
    },

    /// The server had nothing newer than the running package
    NoUpdateAvailable,

    /// The server only has bundles targeting a newer host binary
    UpdateRequiresNewerHost { required_app_version: String },

    /// An advertised package was skipped because its hash previously
    /// failed to boot on this install
    UpdateIgnoredAsFailed { package_hash: String },

    /// Download started
    DownloadStarted { url: String, total_bytes: u64 },

    /// Download progress update
    DownloadProgress {
        bytes_downloaded: u64,
        total_bytes: u64,
    },

    /// Download completed and the archive passed verification
    DownloadCompleted {
        package_hash: String,
        bytes_downloaded: u64,
    },

    /// Download or verification failed; staged data was discarded
    DownloadFailed { url: String, message: String },

    /// Staged package is being promoted into the current slot
    Installing { label: String, package_hash: String },

    /// Install finished; the package is current and pending confirmation
    UpdateInstalled {
        label: String,
        package_hash: String,
        install_mode: InstallMode,
    },

    /// A pending package was never confirmed and is being rolled back
    RollbackStarted { package_hash: String },

    /// Rollback finished; the previous package is current again
    RollbackCompleted { restored_label: String },

    /// Restart requested through the restart manager
    RestartRequested { only_if_update_pending: bool },

    /// Restart suppressed by the disallow gate or the debounce
    RestartSuppressed,

    /// Deployment status report delivered
    StatusReported { status: DeploymentStatus },

    /// Deployment status report failed; analytics-only, never retried here
    StatusReportFailed { message: String },
}
