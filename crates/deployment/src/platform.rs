//! Host platform capability
//!
//! The engine never restarts a process or resolves host paths itself;
//! those belong to the embedding application and arrive through this
//! trait.

use std::path::PathBuf;
use updraft_errors::Error;

/// Capabilities the host application injects into the engine.
pub trait PlatformHooks: Send + Sync {
    /// Directory under which the engine may persist packages and flags.
    fn storage_root(&self) -> PathBuf;

    /// Version of the running host binary, as a semver string.
    fn current_app_version(&self) -> String;

    /// Restart the application so an installed update takes effect.
    ///
    /// # Errors
    /// Returns an error if the restart could not be initiated.
    fn perform_restart(&self) -> Result<(), Error>;
}
