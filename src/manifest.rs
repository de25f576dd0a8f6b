use serde::Deserialize;

use crate::version;

/// Server-provided description of the latest available release.
///
/// Every field is optional on the wire: absent fields keep their default and
/// unknown fields are ignored, so a sparse manifest still parses. Only
/// `download_url` is validated, and only right before a download attempt.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateManifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build: u64,
    #[serde(default)]
    pub release_date: String,
    #[serde(default, alias = "release_notes")]
    pub description: String,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub min_version: String,
    #[serde(default)]
    pub download_mirrors: Vec<String>,
}

impl UpdateManifest {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn is_newer_than(&self, current_version: &str) -> bool {
        version::is_newer(&self.version, current_version)
    }

    /// Normalized SHA-256 digest for download verification, if the manifest
    /// carries one. The update server prefixes digests with `sha256:`.
    pub fn expected_checksum(&self) -> Option<String> {
        normalize_checksum(&self.checksum)
    }
}

/// Lowercase the digest and drop an optional `sha256:` prefix; `None` when
/// nothing usable remains.
pub fn normalize_checksum(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => &trimmed[7..],
        _ => trimmed,
    };
    (!hex.is_empty()).then(|| hex.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_server_response() {
        let body = r#"{
            "has_update": true,
            "current_version": "1.2.0",
            "version": "2.0.0",
            "build": 200,
            "download_url": "https://host/releases/Draftsmith-2.0.0.exe",
            "file_size": 127355492,
            "checksum": "sha256:71261EDF50AE29F757A34544B7B56F64D7F4EFE7EAFB1AD75392C5BCCC78834C",
            "release_notes": "Big release",
            "force_update": false,
            "min_version": "1.0.0",
            "release_date": "2025-08-17T10:00:00Z",
            "update_reason": "newer version",
            "download_mirrors": ["https://mirror/Draftsmith-2.0.0.exe"],
            "changes": ["faster exports", "bug fixes"]
        }"#;

        let manifest = UpdateManifest::from_json(body).unwrap();
        assert_eq!(manifest.version, "2.0.0");
        assert_eq!(manifest.build, 200);
        assert_eq!(manifest.description, "Big release");
        assert_eq!(manifest.changes.len(), 2);
        assert_eq!(manifest.file_size, 127355492);
        assert_eq!(manifest.download_mirrors.len(), 1);
        assert!(!manifest.force_update);
        assert_eq!(
            manifest.expected_checksum().as_deref(),
            Some("71261edf50ae29f757a34544b7b56f64d7f4efe7eafb1ad75392c5bccc78834c")
        );
    }

    #[test]
    fn missing_fields_default_instead_of_failing() {
        let manifest = UpdateManifest::from_json("{}").unwrap();
        assert_eq!(manifest, UpdateManifest::default());
        assert!(manifest.download_url.is_empty());
        assert_eq!(manifest.expected_checksum(), None);
    }

    #[test]
    fn prefers_description_over_release_notes_alias() {
        let manifest =
            UpdateManifest::from_json(r#"{"description": "plain", "version": "1.0"}"#).unwrap();
        assert_eq!(manifest.description, "plain");
    }

    #[test]
    fn classifies_against_the_running_version() {
        let manifest = UpdateManifest {
            version: "1.3.0".into(),
            ..Default::default()
        };
        assert!(manifest.is_newer_than("1.2.0"));
        assert!(!manifest.is_newer_than("1.3.0"));
        assert!(!manifest.is_newer_than("1.4.0"));
    }

    #[test]
    fn normalizes_checksums() {
        assert_eq!(normalize_checksum("ABCDEF"), Some("abcdef".into()));
        assert_eq!(normalize_checksum("sha256:ABCDEF"), Some("abcdef".into()));
        assert_eq!(normalize_checksum("SHA256:abc"), Some("abc".into()));
        assert_eq!(normalize_checksum("  abc  "), Some("abc".into()));
        assert_eq!(normalize_checksum(""), None);
        assert_eq!(normalize_checksum("sha256:"), None);
    }
}
