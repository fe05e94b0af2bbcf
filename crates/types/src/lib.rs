#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Shared type definitions for the updraft update engine

pub mod package;
pub mod report;
pub mod sync;

pub use package::{LocalPackage, Package, RemotePackage};
pub use report::{DeploymentStatus, DeploymentStatusReport};
pub use sync::{CheckFrequency, InstallMode, SyncOptions, SyncOutcome, UpdateCheck};
