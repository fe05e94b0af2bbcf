//! Sync configuration and outcome types

use crate::package::{LocalPackage, RemotePackage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing policy for when an installed update takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Restart as soon as the install completes
    Immediate,
    /// Apply when the app next returns to the foreground after having been
    /// backgrounded for at least the configured minimum duration
    OnNextResume,
    /// Apply on the next natural application launch
    OnNextRestart,
}

impl Default for InstallMode {
    fn default() -> Self {
        Self::OnNextRestart
    }
}

/// How often the host wants the engine to check for updates. The engine
/// never schedules checks itself; this is advisory for the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFrequency {
    #[default]
    OnAppStart,
    OnAppResume,
    ManualOnly,
}

/// Per-call sync configuration. Fully specified per call; the only
/// instance-level default that applies is the deployment key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Overrides the instance deployment key for this sync
    pub deployment_key: Option<String>,
    pub install_mode: InstallMode,
    /// Overrides `install_mode` when the server marks the update mandatory
    pub mandatory_install_mode: Option<InstallMode>,
    /// Minimum time the app must have been backgrounded before an
    /// `OnNextResume` install applies
    #[serde(default, with = "duration_secs")]
    pub minimum_background_duration: Duration,
    pub check_frequency: CheckFrequency,
}

impl SyncOptions {
    /// The install mode that actually applies to a package, honoring the
    /// mandatory override.
    #[must_use]
    pub fn effective_install_mode(&self, is_mandatory: bool) -> InstallMode {
        if is_mandatory {
            self.mandatory_install_mode.unwrap_or(self.install_mode)
        } else {
            self.install_mode
        }
    }
}

/// Terminal status of one sync attempt. `SyncInProgress` is a rejected
/// concurrent call, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    SyncInProgress,
    UpToDate,
    UpdateInstalled {
        package: LocalPackage,
        install_mode: InstallMode,
    },
}

/// Result of a pure update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    NoUpdateAvailable,
    UpdateAvailable(RemotePackage),
}

impl UpdateCheck {
    #[must_use]
    pub fn update(self) -> Option<RemotePackage> {
        match self {
            Self::NoUpdateAvailable => None,
            Self::UpdateAvailable(remote) => Some(remote),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_install_mode() {
        let options = SyncOptions {
            install_mode: InstallMode::OnNextRestart,
            mandatory_install_mode: Some(InstallMode::Immediate),
            ..SyncOptions::default()
        };
        assert_eq!(
            options.effective_install_mode(false),
            InstallMode::OnNextRestart
        );
        assert_eq!(options.effective_install_mode(true), InstallMode::Immediate);

        let no_override = SyncOptions::default();
        assert_eq!(
            no_override.effective_install_mode(true),
            InstallMode::OnNextRestart
        );
    }
}
