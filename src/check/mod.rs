use log::{debug, warn};
use reqwest::Client;

use crate::env;
use crate::manifest::UpdateManifest;

/// Failure classes reported by an update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFailure {
    Network,
    Parse,
    Unknown,
}

/// Terminal outcome of one update check. Every started check produces
/// exactly one of these.
#[derive(Debug, Clone)]
pub enum CheckEvent {
    UpdateAvailable(UpdateManifest),
    NoUpdate,
    Error(CheckFailure, String),
}

/// Query the update endpoint once and classify the response against the
/// running version.
///
/// The request carries `User-Agent: Draftsmith/<version>` and the
/// `current_version`, `platform` and `arch` query parameters; the caller's
/// client owns the timeout.
pub async fn run_check(client: &Client, server_url: &str, current_version: &str) -> CheckEvent {
    let (platform, arch) = env::platform_keys();

    let response = match client
        .get(server_url)
        .header(
            reqwest::header::USER_AGENT,
            env::user_agent(current_version),
        )
        .query(&[
            ("current_version", current_version),
            ("platform", platform),
            ("arch", arch),
        ])
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!("check: request to {server_url} failed: {err}");
            return CheckEvent::Error(
                CheckFailure::Network,
                format!("update check request failed: {err}"),
            );
        }
    };

    let response = match response.error_for_status() {
        Ok(response) => response,
        Err(err) => {
            warn!("check: update server returned an error status: {err}");
            return CheckEvent::Error(
                CheckFailure::Network,
                format!("update server status error: {err}"),
            );
        }
    };

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            warn!("check: failed to read update response: {err}");
            return CheckEvent::Error(
                CheckFailure::Network,
                format!("failed to read update response: {err}"),
            );
        }
    };

    let manifest = match UpdateManifest::from_json(&body) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!("check: malformed update manifest: {err}");
            return CheckEvent::Error(
                CheckFailure::Parse,
                format!("malformed update manifest: {err}"),
            );
        }
    };

    if manifest.is_newer_than(current_version) {
        debug!(
            "check: update {} available (current {})",
            manifest.version, current_version
        );
        CheckEvent::UpdateAvailable(manifest)
    } else {
        debug!(
            "check: no update (server has {}, current {})",
            manifest.version, current_version
        );
        CheckEvent::NoUpdate
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client() -> Client {
        Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn emits_update_available_for_newer_versions() {
        let server = MockServer::start().await;
        let (platform, arch) = env::platform_keys();
        Mock::given(method("GET"))
            .and(path("/api/check"))
            .and(header("User-Agent", "Draftsmith/1.2.0"))
            .and(query_param("current_version", "1.2.0"))
            .and(query_param("platform", platform))
            .and(query_param("arch", arch))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "2.0.0",
                "download_url": "https://host/u.exe",
            })))
            .mount(&server)
            .await;

        let url = format!("{}/api/check", server.uri());
        match run_check(&test_client(), &url, "1.2.0").await {
            CheckEvent::UpdateAvailable(manifest) => {
                assert_eq!(manifest.version, "2.0.0");
                assert_eq!(manifest.download_url, "https://host/u.exe");
            }
            other => panic!("expected UpdateAvailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emits_no_update_for_same_or_older_versions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "version": "1.2.0" })),
            )
            .mount(&server)
            .await;

        match run_check(&test_client(), &server.uri(), "1.2.0").await {
            CheckEvent::NoUpdate => {}
            other => panic!("expected NoUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn classifies_malformed_bodies_as_parse_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
            .mount(&server)
            .await;

        match run_check(&test_client(), &server.uri(), "1.2.0").await {
            CheckEvent::Error(CheckFailure::Parse, _) => {}
            other => panic!("expected a parse failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn classifies_error_statuses_as_network_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        match run_check(&test_client(), &server.uri(), "1.2.0").await {
            CheckEvent::Error(CheckFailure::Network, _) => {}
            other => panic!("expected a network failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn classifies_unreachable_servers_as_network_failures() {
        match run_check(&test_client(), "http://127.0.0.1:9/api/check", "1.2.0").await {
            CheckEvent::Error(CheckFailure::Network, _) => {}
            other => panic!("expected a network failure, got {other:?}"),
        }
    }
}
