use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, warn};
use serde_json::{Value, json};

use crate::env;

pub const SETTINGS_NAMESPACE: &str = "update";

/// Hours between periodic checks when nothing usable is stored.
pub const DEFAULT_CHECK_INTERVAL_HOURS: u32 = 6;
/// Ceiling applied to the stored interval at load time. Explicit
/// `set_check_interval` calls may persist larger values for the running
/// session; the cap reasserts itself on the next start.
pub const MAX_LOADED_INTERVAL_HOURS: u32 = 6;
pub const MIN_INTERVAL_HOURS: u32 = 1;
pub const MAX_INTERVAL_HOURS: u32 = 168;

/// Schema-less key/value store the updater persists its settings through.
///
/// The store lives outside this subsystem. `get` falls back per entry and
/// `set` must swallow its own failures; a broken config file never aborts
/// an update operation.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str, default: Value, namespace: &str) -> Value;
    fn set(&self, key: &str, value: Value, namespace: &str);
}

/// Updater configuration persisted under the `"update"` namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSettings {
    pub auto_check_enabled: bool,
    pub check_interval_hours: u32,
    pub server_url: String,
    pub force_update: bool,
    pub auto_download: bool,
    pub auto_install: bool,
    pub check_on_startup: bool,
    pub notify_available: bool,
    pub last_check_time: Option<String>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            auto_check_enabled: true,
            check_interval_hours: DEFAULT_CHECK_INTERVAL_HOURS,
            server_url: env::DEFAULT_SERVER_URL.to_owned(),
            force_update: true,
            auto_download: true,
            auto_install: false,
            check_on_startup: true,
            notify_available: true,
            last_check_time: None,
        }
    }
}

impl UpdateSettings {
    /// Read the persisted settings, pin the policy-controlled fields and
    /// write the result straight back so the store always reflects the
    /// active policy.
    pub fn load(store: &dyn ConfigStore) -> Self {
        let defaults = Self::default();
        let mut settings = Self {
            auto_check_enabled: get_bool(store, "auto_check_enabled", defaults.auto_check_enabled),
            check_interval_hours: get_u32(
                store,
                "check_interval_hours",
                defaults.check_interval_hours,
            ),
            server_url: get_string(store, "server_url", &defaults.server_url),
            force_update: get_bool(store, "force_update", defaults.force_update),
            auto_download: get_bool(store, "auto_download", defaults.auto_download),
            auto_install: get_bool(store, "auto_install", defaults.auto_install),
            check_on_startup: get_bool(store, "check_on_startup", defaults.check_on_startup),
            notify_available: get_bool(store, "notify_available", defaults.notify_available),
            last_check_time: match store.get("last_check_time", Value::Null, SETTINGS_NAMESPACE) {
                Value::String(value) if !value.is_empty() => Some(value),
                _ => None,
            },
        };

        // Stored intervals above the cap are pulled back at startup.
        settings.check_interval_hours = settings
            .check_interval_hours
            .min(MAX_LOADED_INTERVAL_HOURS);
        settings.apply_forced_policy();
        settings.save(store);
        debug!(
            "settings: loaded (interval {}h, auto-check {})",
            settings.check_interval_hours, settings.auto_check_enabled
        );
        settings
    }

    /// Pin the policy-controlled fields. Runs at load time and inside every
    /// mutating coordinator call; these switches are not user-settable in
    /// the current release.
    pub fn apply_forced_policy(&mut self) {
        self.auto_check_enabled = true;
        self.force_update = true;
        self.auto_download = true;
        self.check_on_startup = true;
    }

    /// Persist every field. Write failures stay inside the store.
    pub fn save(&self, store: &dyn ConfigStore) {
        store.set(
            "auto_check_enabled",
            json!(self.auto_check_enabled),
            SETTINGS_NAMESPACE,
        );
        store.set(
            "check_interval_hours",
            json!(self.check_interval_hours),
            SETTINGS_NAMESPACE,
        );
        store.set("server_url", json!(self.server_url), SETTINGS_NAMESPACE);
        store.set("force_update", json!(self.force_update), SETTINGS_NAMESPACE);
        store.set(
            "auto_download",
            json!(self.auto_download),
            SETTINGS_NAMESPACE,
        );
        store.set("auto_install", json!(self.auto_install), SETTINGS_NAMESPACE);
        store.set(
            "check_on_startup",
            json!(self.check_on_startup),
            SETTINGS_NAMESPACE,
        );
        store.set(
            "notify_available",
            json!(self.notify_available),
            SETTINGS_NAMESPACE,
        );
        store.set(
            "last_check_time",
            match &self.last_check_time {
                Some(value) => json!(value),
                None => Value::Null,
            },
            SETTINGS_NAMESPACE,
        );
    }
}

fn get_bool(store: &dyn ConfigStore, key: &str, default: bool) -> bool {
    store
        .get(key, json!(default), SETTINGS_NAMESPACE)
        .as_bool()
        .unwrap_or(default)
}

fn get_u32(store: &dyn ConfigStore, key: &str, default: u32) -> u32 {
    store
        .get(key, json!(default), SETTINGS_NAMESPACE)
        .as_u64()
        .map(|value| value.min(u64::from(u32::MAX)) as u32)
        .unwrap_or(default)
}

fn get_string(store: &dyn ConfigStore, key: &str, default: &str) -> String {
    match store.get(key, json!(default), SETTINGS_NAMESPACE) {
        Value::String(value) if !value.is_empty() => value,
        _ => default.to_owned(),
    }
}

/// `ConfigStore` backed by a single JSON file, one object per namespace.
/// Reads happen against an in-memory copy; every `set` writes through.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn default_location() -> Self {
        Self::new(env::config_file())
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str, default: Value, namespace: &str) -> Value {
        let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        entries
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
            .unwrap_or(default)
    }

    fn set(&self, key: &str, value: Value, namespace: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        entries
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);

        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_vec_pretty(&*entries) {
            Ok(bytes) => {
                if let Err(err) = fs::write(&self.path, bytes) {
                    warn!(
                        "settings: unable to persist {}: {err}",
                        self.path.display()
                    );
                }
            }
            Err(err) => warn!("settings: unable to serialize config: {err}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_store {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::ConfigStore;

    /// In-memory store for coordinator and settings tests.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        entries: Mutex<BTreeMap<String, Value>>,
    }

    impl MemoryStore {
        pub(crate) fn with(entries: &[(&str, Value)]) -> Self {
            let store = Self::default();
            for (key, value) in entries {
                store.set(key, value.clone(), super::SETTINGS_NAMESPACE);
            }
            store
        }
    }

    impl ConfigStore for MemoryStore {
        fn get(&self, key: &str, default: Value, namespace: &str) -> Value {
            let entries = self.entries.lock().unwrap();
            entries
                .get(&format!("{namespace}/{key}"))
                .cloned()
                .unwrap_or(default)
        }

        fn set(&self, key: &str, value: Value, namespace: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(format!("{namespace}/{key}"), value);
        }
    }
}
