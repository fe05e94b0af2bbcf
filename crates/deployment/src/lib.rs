#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Update-lifecycle orchestration for updraft
//!
//! [`DeploymentInstance`] ties acquisition, download, storage and restart
//! sequencing into the three calls a host actually makes:
//! `check_for_update`, `sync` and `notify_application_ready`. The host
//! injects its capabilities through [`PlatformHooks`] and observes
//! progress through the event channel.

mod config;
mod instance;
mod platform;
mod restart;

pub use config::{DeploymentConfig, DeploymentConfigBuilder};
pub use instance::DeploymentInstance;
pub use platform::PlatformHooks;
pub use restart::RestartManager;

pub use updraft_types::{
    CheckFrequency, InstallMode, LocalPackage, RemotePackage, SyncOptions, SyncOutcome,
    UpdateCheck,
};
