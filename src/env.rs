use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

pub const APP_NAME: &str = "Draftsmith";
pub const DEFAULT_SERVER_URL: &str = "https://updates.draftsmith.app/api/check";

/// Prefix shared by every installer file the updater writes to the platform
/// temp directory; cleanup matches on it.
pub const TEMP_PREFIX: &str = "draftsmith_update_";

const DEFAULT_INSTALLER_NAME: &str = "update.exe";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// User-Agent sent with update checks, e.g. `Draftsmith/1.2.0`.
pub fn user_agent(version: &str) -> String {
    format!("{APP_NAME}/{version}")
}

/// OS/arch keys reported to the update server.
pub fn platform_keys() -> (&'static str, &'static str) {
    let os = if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "linux"
    };

    let arch = if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        env::consts::ARCH
    };

    (os, arch)
}

/// Root directory used by Draftsmith for its own files.
pub fn default_app_dir() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .or_else(|| env::var_os("APPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".local").join("share")),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join("draftsmith")
}

pub fn config_file() -> PathBuf {
    default_app_dir().join("config.json")
}

/// Destination for one download attempt. The name stays inside the
/// `draftsmith_update_*` pattern while the pid/sequence pair keeps it unique
/// per invocation, so cleanup and an in-flight download never collide.
pub fn update_temp_path(url: &str) -> PathBuf {
    let basename = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_INSTALLER_NAME);
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!(
        "{TEMP_PREFIX}{}_{seq}_{basename}",
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_user_agent_from_version() {
        assert_eq!(user_agent("1.2.0"), "Draftsmith/1.2.0");
    }

    #[test]
    fn temp_paths_keep_the_cleanup_prefix() {
        let path = update_temp_path("https://host/releases/Draftsmith-2.0.0.exe");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.starts_with(TEMP_PREFIX));
        assert!(name.ends_with("Draftsmith-2.0.0.exe"));
    }

    #[test]
    fn temp_paths_are_unique_per_invocation() {
        let first = update_temp_path("https://host/u.exe");
        let second = update_temp_path("https://host/u.exe");
        assert_ne!(first, second);
    }

    #[test]
    fn falls_back_to_default_installer_name() {
        let no_path = update_temp_path("https://host/");
        let name = no_path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.ends_with(DEFAULT_INSTALLER_NAME));
    }

    #[test]
    fn strips_query_strings_from_the_basename() {
        let path = update_temp_path("https://host/setup.msi?token=abc");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.ends_with("setup.msi"));
    }
}
