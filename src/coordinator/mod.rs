use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use reqwest::Client;
use tokio::task::JoinHandle;

use crate::check::{self, CheckEvent, CheckFailure};
use crate::download::{self, DownloadEvent, DownloadOutcome};
use crate::env;
use crate::error::UpdateError;
use crate::install;
use crate::manifest::UpdateManifest;
use crate::settings::{self, ConfigStore, UpdateSettings};

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback receiving the single terminal event of an update check.
pub type CheckCallback = Box<dyn FnOnce(CheckEvent) + Send>;
/// Callback receiving progress plus the single terminal event of a download.
pub type DownloadCallback = Box<dyn FnMut(DownloadEvent) + Send>;

type SharedDownloadCallback = Option<Arc<Mutex<DownloadCallback>>>;

/// Orchestrates update checks, downloads and installation for one running
/// application instance.
///
/// At most one check and one download are in flight at a time; a second
/// request of the same kind is rejected with [`UpdateError::Busy`]. Every
/// public call returns immediately except [`Self::cancel_download`], which
/// waits for the download worker to observe the flag and exit.
#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ConfigStore>,
    current_version: String,
    check_client: Client,
    download_client: Client,
    settings: Mutex<UpdateSettings>,
    check_task: Mutex<Option<JoinHandle<()>>>,
    download_task: Mutex<Option<ActiveDownload>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct ActiveDownload {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

impl Inner {
    fn lock_settings(&self) -> MutexGuard<'_, UpdateSettings> {
        self.settings.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn lock_check(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.check_task
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn lock_download(&self) -> MutexGuard<'_, Option<ActiveDownload>> {
        self.download_task
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl UpdateCoordinator {
    /// Load settings (re-persisting the forced policy), build the HTTP
    /// clients and arm the periodic check timer. Must be called inside a
    /// tokio runtime.
    pub fn new(store: Arc<dyn ConfigStore>, current_version: impl Into<String>) -> Self {
        let settings = UpdateSettings::load(store.as_ref());
        info!(
            "coordinator: loaded settings (interval {}h, server {})",
            settings.check_interval_hours, settings.server_url
        );

        let inner = Arc::new(Inner {
            store,
            current_version: current_version.into(),
            check_client: build_client(Client::builder().timeout(CHECK_TIMEOUT)),
            download_client: build_client(
                Client::builder()
                    .connect_timeout(DOWNLOAD_TIMEOUT)
                    .read_timeout(DOWNLOAD_TIMEOUT),
            ),
            settings: Mutex::new(settings),
            check_task: Mutex::new(None),
            download_task: Mutex::new(None),
            timer: Mutex::new(None),
        });

        let coordinator = Self { inner };
        coordinator.arm_timer();
        coordinator
    }

    /// Version string reported to the update server.
    pub fn current_version(&self) -> &str {
        &self.inner.current_version
    }

    /// Snapshot of the active settings.
    pub fn settings(&self) -> UpdateSettings {
        self.inner.lock_settings().clone()
    }

    /// Start a background update check. Rejects with `Busy` while one is
    /// in flight. The last-check timestamp is persisted before the worker
    /// starts; the callback (if any) receives exactly one [`CheckEvent`].
    /// The returned `Ok` only acknowledges the start.
    pub fn check_for_updates(&self, callback: Option<CheckCallback>) -> Result<(), UpdateError> {
        let mut slot = self.inner.lock_check();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("coordinator: update check already in flight");
            return Err(UpdateError::Busy("update check"));
        }

        let server_url = {
            let mut settings = self.inner.lock_settings();
            settings.last_check_time = Some(Utc::now().to_rfc3339());
            settings.apply_forced_policy();
            settings.save(self.inner.store.as_ref());
            settings.server_url.clone()
        };

        info!("coordinator: starting update check against {server_url}");
        let client = self.inner.check_client.clone();
        let current_version = self.inner.current_version.clone();
        let handle = tokio::spawn(async move {
            let worker = tokio::spawn(async move {
                check::run_check(&client, &server_url, &current_version).await
            });
            // The nested handle surfaces a panicking worker as a terminal
            // event instead of silence.
            let event = match worker.await {
                Ok(event) => event,
                Err(err) => {
                    error!("coordinator: check worker died: {err}");
                    CheckEvent::Error(
                        CheckFailure::Unknown,
                        format!("update check worker failed: {err}"),
                    )
                }
            };
            if let Some(callback) = callback {
                callback(event);
            }
        });
        *slot = Some(handle);
        Ok(())
    }

    /// Start a background download of the manifest's installer. Rejects
    /// with `Busy` while one is in flight and `InvalidManifest` when the
    /// manifest carries no download URL; no task starts in either case.
    /// The callback receives progress events followed by exactly one
    /// terminal event, unless the download is cancelled, after which
    /// nothing more is emitted.
    pub fn download_update(
        &self,
        manifest: &UpdateManifest,
        progress: Option<DownloadCallback>,
    ) -> Result<(), UpdateError> {
        let mut slot = self.inner.lock_download();
        if slot
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
        {
            debug!("coordinator: download already in flight");
            return Err(UpdateError::Busy("download"));
        }
        if manifest.download_url.is_empty() {
            return Err(UpdateError::InvalidManifest);
        }

        let url = manifest.download_url.clone();
        let expected = manifest.expected_checksum();
        let dest = env::update_temp_path(&url);
        let cancel = Arc::new(AtomicBool::new(false));
        let client = self.inner.download_client.clone();
        let worker_cancel = cancel.clone();
        let callback: SharedDownloadCallback = progress.map(|cb| Arc::new(Mutex::new(cb)));
        let worker_callback = callback.clone();

        info!("coordinator: downloading {url} to {}", dest.display());
        let handle = tokio::spawn(async move {
            let worker = tokio::spawn(async move {
                download::run_download(
                    &client,
                    &url,
                    &dest,
                    expected.as_deref(),
                    &worker_cancel,
                    |event| emit_download_event(&worker_callback, event),
                )
                .await
            });
            match worker.await {
                Ok(DownloadOutcome::Completed(path)) => {
                    emit_download_event(&callback, DownloadEvent::Completed(path));
                }
                Ok(DownloadOutcome::Failed(message)) => {
                    emit_download_event(&callback, DownloadEvent::Failed(message));
                }
                Ok(DownloadOutcome::Cancelled) => {
                    debug!("coordinator: download cancelled; no event emitted");
                }
                Err(err) => {
                    error!("coordinator: download worker died: {err}");
                    emit_download_event(
                        &callback,
                        DownloadEvent::Failed(format!("download worker failed: {err}")),
                    );
                }
            }
        });
        *slot = Some(ActiveDownload { handle, cancel });
        Ok(())
    }

    /// Validate and launch a downloaded installer; returns right after the
    /// process is spawned.
    pub fn install_update(&self, installer_path: &Path, force: bool) -> Result<(), UpdateError> {
        install::launch_installer(installer_path, force)
    }

    /// Persist a new periodic-check interval and rearm the timer. Valid
    /// range is 1–168 hours inclusive.
    pub fn set_check_interval(&self, hours: u32) -> Result<(), UpdateError> {
        if !(settings::MIN_INTERVAL_HOURS..=settings::MAX_INTERVAL_HOURS).contains(&hours) {
            return Err(UpdateError::InvalidArgument(format!(
                "check interval must be between {} and {} hours, got {hours}",
                settings::MIN_INTERVAL_HOURS,
                settings::MAX_INTERVAL_HOURS
            )));
        }

        {
            let mut settings = self.inner.lock_settings();
            settings.check_interval_hours = hours;
            settings.apply_forced_policy();
            settings.save(self.inner.store.as_ref());
        }
        info!("coordinator: check interval set to {hours}h");
        self.arm_timer();
        Ok(())
    }

    /// Auto-check is pinned on in the current release; the requested value
    /// is ignored beyond a log line.
    pub fn set_auto_check_enabled(&self, enabled: bool) {
        if !enabled {
            info!("coordinator: ignoring request to disable auto-check; policy keeps it on");
        }
        {
            let mut settings = self.inner.lock_settings();
            settings.apply_forced_policy();
            settings.save(self.inner.store.as_ref());
        }
        self.arm_timer();
    }

    /// Persist a new update endpoint for subsequent checks.
    pub fn set_server_url(&self, url: impl Into<String>) {
        let mut settings = self.inner.lock_settings();
        settings.server_url = url.into();
        settings.apply_forced_policy();
        settings.save(self.inner.store.as_ref());
    }

    /// Signal the in-flight download to stop and wait until its worker has
    /// exited. The partial file stays behind for [`Self::cleanup_temp_files`].
    pub async fn cancel_download(&self) {
        let active = self.inner.lock_download().take();
        let Some(active) = active else {
            debug!("coordinator: cancel requested with no download in flight");
            return;
        };

        active.cancel.store(true, Ordering::SeqCst);
        warn!("coordinator: cancelling download");
        if let Err(err) = active.handle.await {
            error!("coordinator: cancelled download worker died: {err}");
        }
    }

    /// Delete leftovers from previous download attempts. Every individual
    /// failure is swallowed.
    pub fn cleanup_temp_files(&self) {
        let removed = cleanup_dir(&std::env::temp_dir());
        debug!("coordinator: removed {removed} stale update files");
    }

    fn arm_timer(&self) {
        let mut timer = self.inner.lock_timer();
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        let (enabled, interval_hours) = {
            let settings = self.inner.lock_settings();
            (settings.auto_check_enabled, settings.check_interval_hours)
        };
        if !enabled || interval_hours == 0 {
            debug!("coordinator: periodic checks disabled");
            return;
        }

        let period = Duration::from_secs(u64::from(interval_hours) * 3600);
        let inner = Arc::downgrade(&self.inner);
        info!("coordinator: periodic check armed every {interval_hours}h");
        *timer = Some(tokio::spawn(async move {
            periodic_check_loop(period, inner).await;
        }));
    }
}

/// Fires a fire-and-forget check every `period` until the coordinator is
/// dropped. Outcomes are only observable through whatever the UI subscribes
/// to elsewhere.
async fn periodic_check_loop(period: Duration, inner: Weak<Inner>) {
    loop {
        tokio::time::sleep(period).await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        debug!("coordinator: periodic check firing");
        let coordinator = UpdateCoordinator { inner };
        if let Err(err) = coordinator.check_for_updates(None) {
            debug!("coordinator: periodic check skipped: {err}");
        }
    }
}

fn emit_download_event(callback: &SharedDownloadCallback, event: DownloadEvent) {
    if let Some(callback) = callback {
        let mut callback = callback.lock().unwrap_or_else(|err| err.into_inner());
        (*callback)(event);
    }
}

/// Remove `draftsmith_update_*` files from `dir`, returning how many went.
fn cleanup_dir(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(env::TEMP_PREFIX)
            && std::fs::remove_file(entry.path()).is_ok()
        {
            removed += 1;
        }
    }
    removed
}

fn build_client(builder: reqwest::ClientBuilder) -> Client {
    builder.build().unwrap_or_else(|err| {
        warn!("coordinator: falling back to default HTTP client configuration ({err})");
        Client::new()
    })
}
