#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network layer for updraft
//!
//! `NetClient` wraps the HTTP transport; `AcquisitionManager` speaks the
//! deployment-server protocol (update check and status report). Neither
//! performs retries: retry policy belongs to the host scheduler, the engine
//! only reacts to the resulting success or failure.

mod acquisition;
mod client;

pub use acquisition::{
    AcquisitionManager, CheckForUpdateResult, UpdateCheckRequest, UPDATE_CHECK_PATH,
    REPORT_STATUS_PATH,
};
pub use client::{NetClient, NetConfig};
