use std::path::Path;
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::error::UpdateError;

/// Arguments appended for a silent, unattended install.
const SILENT_INSTALL_ARGS: [&str; 2] = ["/S", "/FORCE"];

/// Installer types the updater is willing to hand to the OS.
const INSTALLER_EXTENSIONS: [&str; 2] = ["exe", "msi"];

/// Launch a downloaded installer as a detached child process and return as
/// soon as it has been spawned. Forced mode takes the silent install path
/// and keeps any console window hidden; interactive mode lets the installer
/// show its own UI.
pub fn launch_installer(installer_path: &Path, force: bool) -> Result<(), UpdateError> {
    if !installer_path.exists() {
        warn!(
            "install: installer missing at {}",
            installer_path.display()
        );
        return Err(UpdateError::FileNotFound(installer_path.to_path_buf()));
    }
    if !is_recognized_installer(installer_path) {
        warn!(
            "install: rejected non-installer file {}",
            installer_path.display()
        );
        return Err(UpdateError::InvalidFormat(
            installer_path.display().to_string(),
        ));
    }

    let mut command = Command::new(installer_path);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if force {
        command.args(SILENT_INSTALL_ARGS);

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // CREATE_NO_WINDOW | DETACHED_PROCESS
            command.creation_flags(0x08000000 | 0x00000008);
        }
    }

    command.spawn().map_err(UpdateError::Launch)?;
    info!(
        "install: launched {} (forced: {force})",
        installer_path.display()
    );
    Ok(())
}

fn is_recognized_installer(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            INSTALLER_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_installer_is_reported() {
        let result = launch_installer(&PathBuf::from("/definitely/not/here.exe"), false);
        assert!(matches!(result, Err(UpdateError::FileNotFound(_))));
    }

    #[test]
    fn unrecognized_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"not an installer").unwrap();

        let result = launch_installer(&path, false);
        assert!(matches!(result, Err(UpdateError::InvalidFormat(_))));
    }

    #[test]
    fn recognizes_installer_extensions_case_insensitively() {
        assert!(is_recognized_installer(Path::new("setup.exe")));
        assert!(is_recognized_installer(Path::new("Setup.EXE")));
        assert!(is_recognized_installer(Path::new("bundle.msi")));
        assert!(is_recognized_installer(Path::new("bundle.MSI")));
        assert!(!is_recognized_installer(Path::new("archive.zip")));
        assert!(!is_recognized_installer(Path::new("noextension")));
    }

    #[cfg(unix)]
    #[test]
    fn spawns_a_stub_installer_detached() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.exe");
        fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        launch_installer(&path, false).unwrap();
        launch_installer(&path, true).unwrap();
    }
}
