//! Renders engine events for the terminal

use tracing::{debug, info, warn};
use updraft_events::{AppEvent, EventReceiver};

/// Drain the event channel until every sender is gone. In JSON mode each
/// event becomes one line on stdout; otherwise events render as log lines.
pub fn spawn_drain(mut rx: EventReceiver, json: bool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            } else {
                render(&event);
            }
        }
    })
}

fn render(event: &AppEvent) {
    match event {
        AppEvent::CheckingForUpdate { deployment_key } => {
            info!("checking for updates on {deployment_key}");
        }
        AppEvent::UpdateAvailable {
            label,
            package_size,
            is_mandatory,
            ..
        } => {
            let mandatory = if *is_mandatory { " (mandatory)" } else { "" };
            info!("update {label} available{mandatory}, {package_size} bytes");
        }
        AppEvent::NoUpdateAvailable => info!("already up to date"),
        AppEvent::UpdateRequiresNewerHost {
            required_app_version,
        } => {
            warn!("available update needs host version {required_app_version}");
        }
        AppEvent::UpdateIgnoredAsFailed { package_hash } => {
            warn!("skipping {package_hash}: it failed to boot here before");
        }
        AppEvent::DownloadStarted { url, total_bytes } => {
            info!("downloading {url} ({total_bytes} bytes)");
        }
        AppEvent::DownloadProgress {
            bytes_downloaded,
            total_bytes,
        } => {
            debug!("downloaded {bytes_downloaded}/{total_bytes} bytes");
        }
        AppEvent::DownloadCompleted {
            bytes_downloaded, ..
        } => {
            info!("download complete, {bytes_downloaded} bytes");
        }
        AppEvent::DownloadFailed { url, message } => {
            warn!("download of {url} failed: {message}");
        }
        AppEvent::Installing { label, .. } => info!("installing {label}"),
        AppEvent::UpdateInstalled {
            label,
            install_mode,
            ..
        } => {
            info!("installed {label}, applies {install_mode:?}");
        }
        AppEvent::RollbackStarted { package_hash } => {
            warn!("rolling back unconfirmed package {package_hash}");
        }
        AppEvent::RollbackCompleted { restored_label } => {
            info!("restored {restored_label}");
        }
        AppEvent::RestartRequested { .. } => info!("restart requested"),
        AppEvent::RestartSuppressed => debug!("restart suppressed"),
        AppEvent::StatusReported { status } => debug!("status report delivered: {status:?}"),
        AppEvent::StatusReportFailed { message } => {
            warn!("status report failed: {message}");
        }
    }
}
