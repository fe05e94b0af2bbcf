//! The deployment instance: the public-facing update-lifecycle state machine

use crate::config::DeploymentConfig;
use crate::platform::PlatformHooks;
use crate::restart::RestartManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use updraft_download::{DownloadHandler, SignaturePolicy};
use updraft_errors::{ConfigError, Error, RollbackError};
use updraft_events::{AppEvent, EventEmitter, EventSender};
use updraft_net::{AcquisitionManager, CheckForUpdateResult, NetClient, UpdateCheckRequest};
use updraft_settings::SettingManager;
use updraft_signing::BundleVerifier;
use updraft_store::PackageStore;
use updraft_types::{
    DeploymentStatus, DeploymentStatusReport, InstallMode, LocalPackage, Package, SyncOptions,
    SyncOutcome, UpdateCheck,
};

/// Client-side engine of the over-the-air update mechanism.
///
/// One instance per host process. Sequences acquisition, download,
/// install and restart into `check_for_update`, `sync` and
/// `notify_application_ready`, and detects on its first cycle whether a
/// package installed by a previous run failed to boot.
///
/// A single mutex serializes every store/settings mutation; `sync` is
/// single-flight (a concurrent call is rejected with
/// [`SyncOutcome::SyncInProgress`], never queued).
pub struct DeploymentInstance {
    config: DeploymentConfig,
    acquisition: AcquisitionManager,
    downloads: DownloadHandler,
    store: PackageStore,
    restart: RestartManager,
    tx: Option<EventSender>,
    /// One settings manager per deployment key, held for the instance's
    /// lifetime so every operation mutates through the same cache.
    settings: Mutex<HashMap<String, Arc<SettingManager>>>,
    /// Mutual-exclusion domain over the slot pair and the settings document
    state_lock: Mutex<()>,
    sync_in_flight: AtomicBool,
    ready_called: AtomicBool,
    /// Hash that was installed-but-unconfirmed when this process started
    startup_pending: Mutex<Option<String>>,
    /// Resume-watcher state for `OnNextResume` installs
    background_since: Mutex<Option<Instant>>,
    resume_minimum: Mutex<Duration>,
}

impl EventEmitter for DeploymentInstance {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl DeploymentInstance {
    /// Create an instance over the given platform and configuration.
    ///
    /// Reads the durable pending-update marker so the first cycle of this
    /// process can run rollback detection.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, a public key
    /// is configured without a verifier, or persisted state cannot be
    /// read.
    pub async fn new(
        config: DeploymentConfig,
        platform: Arc<dyn PlatformHooks>,
        verifier: Option<Arc<dyn BundleVerifier>>,
        tx: Option<EventSender>,
    ) -> Result<Self, Error> {
        let client = NetClient::with_defaults()?;
        let acquisition = AcquisitionManager::new(client.clone(), config.server_url.clone());

        let signature = match (&config.public_key, verifier) {
            (Some(public_key), Some(verifier)) => Some(SignaturePolicy {
                verifier,
                public_key: public_key.clone(),
            }),
            (Some(_), None) => {
                return Err(ConfigError::Invalid {
                    message: "a public key is configured but no verifier was injected".to_string(),
                }
                .into())
            }
            (None, _) => None,
        };
        let downloads = DownloadHandler::new(client, signature, tx.clone());

        let store = PackageStore::new(config.storage_root.clone());
        let settings = Arc::new(SettingManager::open(&store.key_root(&config.deployment_key)).await?);
        let startup_pending = settings.pending_update_hash().await;
        let mut managers = HashMap::new();
        managers.insert(config.deployment_key.clone(), settings);

        Ok(Self {
            restart: RestartManager::new(platform, tx.clone()),
            acquisition,
            downloads,
            store,
            tx,
            settings: Mutex::new(managers),
            state_lock: Mutex::new(()),
            sync_in_flight: AtomicBool::new(false),
            ready_called: AtomicBool::new(false),
            startup_pending: Mutex::new(startup_pending),
            background_since: Mutex::new(None),
            resume_minimum: Mutex::new(Duration::ZERO),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// The restart gate, for hosts that need a no-restart critical section.
    #[must_use]
    pub fn restart_manager(&self) -> &RestartManager {
        &self.restart
    }

    /// The current package, decorated with its first-run state. `None`
    /// when the app runs its built-in bundle.
    ///
    /// # Errors
    /// Returns an error if persisted state cannot be read.
    pub async fn current_package(&self) -> Result<Option<LocalPackage>, Error> {
        let key = &self.config.deployment_key;
        let Some(mut current) = self.store.current_package(key).await? else {
            return Ok(None);
        };
        let settings = self.settings_for(key).await?;
        current.is_first_run = settings.is_first_run(current.package_hash()).await;
        current.failed_install = settings.is_failed_hash(current.package_hash()).await;
        Ok(Some(current))
    }

    /// Ask the deployment server whether an update is available, using the
    /// current local package hash as the baseline. Never mutates local
    /// state; packages whose hash previously failed to boot are filtered
    /// out of the answer.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError`/`ServerError` from the acquisition layer,
    /// or `RollbackError::NoBackupAvailable` if first-cycle rollback
    /// detection found an unconfirmed package and no backup to restore.
    pub async fn check_for_update(
        &self,
        deployment_key: Option<&str>,
    ) -> Result<UpdateCheck, Error> {
        self.rollback_unconfirmed_if_needed().await?;
        let key = deployment_key.unwrap_or(&self.config.deployment_key);
        self.check_with_key(key).await
    }

    /// Run one full sync: check, download, verify, install, and apply the
    /// effective install mode.
    ///
    /// Single-flight: a call that arrives while another sync is running
    /// returns [`SyncOutcome::SyncInProgress`] immediately.
    ///
    /// # Errors
    ///
    /// Surfaces acquisition, download, verification and install errors as
    /// the terminal status of this attempt; none of them are retried
    /// here.
    pub async fn sync(&self, options: &SyncOptions) -> Result<SyncOutcome, Error> {
        if self.sync_in_flight.swap(true, Ordering::SeqCst) {
            return Ok(SyncOutcome::SyncInProgress);
        }
        let _flight = FlightGuard(&self.sync_in_flight);

        self.rollback_unconfirmed_if_needed().await?;

        let key = options
            .deployment_key
            .as_deref()
            .unwrap_or(&self.config.deployment_key);

        let Some(remote) = self.check_with_key(key).await?.update() else {
            return Ok(SyncOutcome::UpToDate);
        };

        let staged = self
            .downloads
            .download(&remote, self.store.staging_path(key))
            .await?;

        let install_mode = options.effective_install_mode(remote.package.is_mandatory);
        let installed = self.install(key, staged, install_mode).await?;

        match install_mode {
            InstallMode::Immediate => {
                self.restart_internal(true).await?;
            }
            InstallMode::OnNextResume => {
                *self.resume_minimum.lock().await = options.minimum_background_duration;
            }
            InstallMode::OnNextRestart => {}
        }

        Ok(SyncOutcome::UpdateInstalled {
            package: installed,
            install_mode,
        })
    }

    /// Confirm that the application booted correctly with the current
    /// package. Must be called once per process lifetime; later calls are
    /// no-ops. Clears the pending state and reports a succeeded
    /// deployment when the package was pending.
    ///
    /// # Errors
    /// Returns an error if persisted state cannot be updated.
    pub async fn notify_application_ready(&self) -> Result<(), Error> {
        if self.ready_called.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let key = &self.config.deployment_key;
        let settings = self.settings_for(key).await?;
        let _state = self.state_lock.lock().await;

        // The startup snapshot is confirmed; rollback detection is off.
        *self.startup_pending.lock().await = None;

        let Some(current) = self.store.current_package(key).await? else {
            return Ok(());
        };
        let _ = settings.take_first_run_flag(current.package_hash()).await?;

        if !current.is_pending {
            return Ok(());
        }

        self.store.clear_pending(key).await?;
        settings.remove_pending_update().await?;
        settings.remove_pending_install_mode().await?;

        if !current.is_debug_only {
            let previous = self.store.previous_package(key).await?;
            let report = self.build_report(
                DeploymentStatus::Succeeded,
                &current.package,
                previous.as_ref(),
            );
            self.report_status_detached(report);
        }
        Ok(())
    }

    /// Trigger a restart through the restart manager. Returns whether the
    /// restart action was invoked.
    ///
    /// # Errors
    /// Returns an error if persisted state cannot be read or the platform
    /// restart hook fails.
    pub async fn restart_internal(&self, only_if_update_pending: bool) -> Result<bool, Error> {
        let pending = self
            .store
            .has_pending_update(&self.config.deployment_key)
            .await?;
        self.restart.restart_if_allowed(only_if_update_pending, pending)
    }

    /// Close the restart gate for a host critical section. Nestable.
    pub fn disallow_restart(&self) {
        self.restart.disallow();
    }

    /// Reopen the restart gate, performing a restart that was queued while
    /// it was closed. A queued pending-only request is re-checked against
    /// the pending state as it is now, not as it was when the request was
    /// suppressed. Returns whether a queued restart was invoked.
    ///
    /// # Errors
    /// Returns an error if persisted state cannot be read or the platform
    /// restart hook fails.
    pub async fn allow_restart(&self) -> Result<bool, Error> {
        let pending = self
            .store
            .has_pending_update(&self.config.deployment_key)
            .await?;
        self.restart.allow(pending)
    }

    /// App-lifecycle hook: the host moved to the background.
    pub async fn notify_app_did_enter_background(&self) {
        *self.background_since.lock().await = Some(Instant::now());
    }

    /// App-lifecycle hook: the host is returning to the foreground. When
    /// an `OnNextResume` install is pending and the app stayed backgrounded
    /// for at least the armed minimum duration, the update is applied by
    /// restarting. Returns whether a restart was invoked.
    ///
    /// # Errors
    /// Returns an error if persisted state cannot be read or the restart
    /// hook fails.
    pub async fn notify_app_will_enter_foreground(&self) -> Result<bool, Error> {
        let Some(since) = self.background_since.lock().await.take() else {
            return Ok(false);
        };

        let key = &self.config.deployment_key;
        let settings = self.settings_for(key).await?;
        if settings.pending_install_mode().await != Some(InstallMode::OnNextResume) {
            return Ok(false);
        }
        if since.elapsed() < *self.resume_minimum.lock().await {
            return Ok(false);
        }

        self.restart_internal(true).await
    }

    /// Developer-invoked rollback to the previous package. The displaced
    /// hash joins the failed set so it is not immediately re-offered by
    /// the next check.
    ///
    /// # Errors
    ///
    /// Returns `RollbackError::NoBackupAvailable` when there is no
    /// previous package; the current package is left untouched then.
    pub async fn rollback(&self) -> Result<LocalPackage, Error> {
        let key = &self.config.deployment_key;
        let settings = self.settings_for(key).await?;
        let _state = self.state_lock.lock().await;

        let displaced = self.store.current_package(key).await?;
        let restored = self.store.rollback(key).await?;

        if let Some(displaced) = displaced {
            let hash = displaced.package_hash().to_string();
            self.emit(AppEvent::RollbackStarted {
                package_hash: hash.clone(),
            });
            settings.record_failed_update(&hash).await?;
            let _ = settings.take_first_run_flag(&hash).await?;
        }
        settings.remove_pending_update().await?;
        settings.remove_pending_install_mode().await?;
        *self.startup_pending.lock().await = None;

        self.emit(AppEvent::RollbackCompleted {
            restored_label: restored.package.label.clone(),
        });
        Ok(restored)
    }

    /// Debug/test reset: drop both package slots and every durable flag
    /// for the instance deployment key.
    ///
    /// # Errors
    /// Returns an error if persisted state cannot be removed.
    pub async fn clear_updates(&self) -> Result<(), Error> {
        let key = &self.config.deployment_key;
        let settings = self.settings_for(key).await?;
        let _state = self.state_lock.lock().await;

        self.store.clear_updates(key).await?;
        settings.remove_pending_update().await?;
        settings.remove_pending_install_mode().await?;
        *self.startup_pending.lock().await = None;
        Ok(())
    }

    async fn settings_for(&self, key: &str) -> Result<Arc<SettingManager>, Error> {
        let mut managers = self.settings.lock().await;
        if let Some(manager) = managers.get(key) {
            return Ok(Arc::clone(manager));
        }
        let manager = Arc::new(SettingManager::open(&self.store.key_root(key)).await?);
        managers.insert(key.to_string(), Arc::clone(&manager));
        Ok(manager)
    }

    async fn check_with_key(&self, key: &str) -> Result<UpdateCheck, Error> {
        let current = self.store.current_package(key).await?;
        // A debug-only bundle is exempt from install semantics and does
        // not serve as a baseline.
        let baseline = current.as_ref().filter(|p| !p.is_debug_only);

        self.emit(AppEvent::CheckingForUpdate {
            deployment_key: key.to_string(),
        });

        let request = UpdateCheckRequest {
            deployment_key: key.to_string(),
            app_version: self.config.app_version.to_string(),
            package_hash: baseline.map(|p| p.package_hash().to_string()),
            label: baseline.map(|p| p.package.label.clone()),
            client_unique_id: self.config.client_unique_id.clone(),
        };

        match self.acquisition.check_for_update(&request).await? {
            CheckForUpdateResult::NoUpdate => {
                self.emit(AppEvent::NoUpdateAvailable);
                Ok(UpdateCheck::NoUpdateAvailable)
            }
            CheckForUpdateResult::NewerHostRequired {
                required_app_version,
            } => {
                self.emit(AppEvent::UpdateRequiresNewerHost {
                    required_app_version,
                });
                Ok(UpdateCheck::NoUpdateAvailable)
            }
            CheckForUpdateResult::Update(remote) => {
                let hash = &remote.package.package_hash;

                let settings = self.settings_for(key).await?;
                if settings.is_failed_hash(hash).await {
                    self.emit(AppEvent::UpdateIgnoredAsFailed {
                        package_hash: hash.clone(),
                    });
                    return Ok(UpdateCheck::NoUpdateAvailable);
                }
                if baseline.is_some_and(|p| p.package_hash() == hash) {
                    self.emit(AppEvent::NoUpdateAvailable);
                    return Ok(UpdateCheck::NoUpdateAvailable);
                }

                self.emit(AppEvent::UpdateAvailable {
                    label: remote.package.label.clone(),
                    package_hash: hash.clone(),
                    is_mandatory: remote.package.is_mandatory,
                    package_size: remote.package_size,
                });
                Ok(UpdateCheck::UpdateAvailable(remote))
            }
        }
    }

    async fn install(
        &self,
        key: &str,
        mut staged: LocalPackage,
        install_mode: InstallMode,
    ) -> Result<LocalPackage, Error> {
        let settings = self.settings_for(key).await?;
        let _state = self.state_lock.lock().await;

        staged.is_debug_only = self.config.is_debug_mode;

        self.emit(AppEvent::Installing {
            label: staged.package.label.clone(),
            package_hash: staged.package_hash().to_string(),
        });

        let installed = self.store.install_package(key, staged).await?;
        let hash = installed.package_hash().to_string();

        if !installed.is_debug_only {
            // Durable before the swap is observable to the host: rollback
            // detection on the next start depends on this marker.
            settings.mark_pending_update(&hash).await?;
        }
        settings.save_pending_install_mode(install_mode).await?;
        settings.mark_first_run_flag(&hash).await?;

        self.emit(AppEvent::UpdateInstalled {
            label: installed.package.label.clone(),
            package_hash: hash,
            install_mode,
        });

        Ok(installed)
    }

    /// First-cycle rollback detection: a package that was pending when
    /// this process started and has not been confirmed by
    /// `notify_application_ready` failed to boot. Runs at most once per
    /// process.
    async fn rollback_unconfirmed_if_needed(&self) -> Result<(), Error> {
        let Some(hash) = self.startup_pending.lock().await.take() else {
            return Ok(());
        };
        if self.ready_called.load(Ordering::SeqCst) {
            return Ok(());
        }

        let key = &self.config.deployment_key;
        let settings = self.settings_for(key).await?;
        let _state = self.state_lock.lock().await;

        // A ready call may have raced us between snapshot and here.
        if settings.pending_update_hash().await.as_deref() != Some(hash.as_str()) {
            return Ok(());
        }

        let current = self.store.current_package(key).await?;
        let Some(failed) = current.filter(|p| p.package_hash() == hash && p.is_pending) else {
            // Stale marker with no matching pending package; drop it.
            settings.remove_pending_update().await?;
            return Ok(());
        };

        self.emit(AppEvent::RollbackStarted {
            package_hash: hash.clone(),
        });

        settings.record_failed_update(&hash).await?;
        settings.remove_pending_update().await?;
        settings.remove_pending_install_mode().await?;
        let _ = settings.take_first_run_flag(&hash).await?;

        match self.store.rollback(key).await {
            Ok(restored) => {
                self.emit(AppEvent::RollbackCompleted {
                    restored_label: restored.package.label.clone(),
                });
                let report = self.build_report(
                    DeploymentStatus::Failed,
                    &failed.package,
                    Some(&restored),
                );
                self.report_status_detached(report);
                Ok(())
            }
            Err(Error::Rollback(RollbackError::NoBackupAvailable)) => {
                // Nothing safe on disk: drop the failed package so the
                // host falls back to its built-in bundle, then surface
                // the condition distinctly.
                self.store.clear_updates(key).await?;
                let report = self.build_report(DeploymentStatus::Failed, &failed.package, None);
                self.report_status_detached(report);
                Err(RollbackError::NoBackupAvailable.into())
            }
            Err(e) => Err(e),
        }
    }

    fn build_report(
        &self,
        status: DeploymentStatus,
        package: &Package,
        previous: Option<&LocalPackage>,
    ) -> DeploymentStatusReport {
        DeploymentStatusReport {
            app_version: self.config.app_version.to_string(),
            deployment_key: package.deployment_key.clone(),
            label: package.label.clone(),
            client_unique_id: self.config.client_unique_id.clone(),
            status,
            previous_deployment_key: previous.map(|p| p.package.deployment_key.clone()),
            previous_label_or_app_version: previous
                .map(|p| p.package.label.clone())
                .or_else(|| Some(self.config.app_version.to_string())),
            package: Some(package.clone()),
        }
    }

    /// Deliver a status report without blocking the lifecycle. Failure is
    /// analytics-only: it is logged and never retried.
    fn report_status_detached(&self, report: DeploymentStatusReport) {
        let acquisition = self.acquisition.clone();
        let tx = self.tx.clone();
        let status = report.status;
        tokio::spawn(async move {
            match acquisition.report_status(&report).await {
                Ok(()) => tx.emit(AppEvent::StatusReported { status }),
                Err(e) => {
                    tracing::warn!(error = %e, "deployment status report failed");
                    tx.emit(AppEvent::StatusReportFailed {
                        message: e.to_string(),
                    });
                }
            }
        });
    }
}

/// Clears the single-flight flag when a sync attempt finishes.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
