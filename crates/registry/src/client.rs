//! HTTP client for the plugin index.
//!
//! The index serves one JSON document per package at
//! `<server>/plugins/<name>/json/`:
//!
//! ```json
//! {
//!   "name": "microdrop.dmf-device-ui-plugin",
//!   "releases": {
//!     "2.1": { "url": "https://…/dmf_device_ui_plugin-2.1.tar.gz" },
//!     "2.1.post2": { "url": "…", "sha256": "…", "size": 62973 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use {
    anyhow::bail,
    serde::Deserialize,
    thiserror::Error,
    tracing::{debug, warn},
};

use crate::version::{PluginRequest, Version};

/// Default plugin index server.
pub const DEFAULT_INDEX_URL: &str = "http://microfluidics.utoronto.ca/update";

const USER_AGENT: &str = concat!("mpm/", env!("CARGO_PKG_VERSION"));

/// Typed index failures callers may want to distinguish (e.g. `update`
/// reports connectivity problems differently from a missing package).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("package '{name}' not found on index")]
    PackageNotFound { name: String },

    #[error("index request for '{name}' failed: HTTP {status}")]
    Http { name: String, status: u16 },

    #[error("no release of '{name}' satisfies '{request}'")]
    NoMatchingRelease { name: String, request: String },
}

/// A single downloadable release of a plugin package.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PackageDoc {
    name: String,
    #[serde(default)]
    releases: BTreeMap<String, Release>,
}

/// Releases of one package, keyed by parsed version (ascending).
#[derive(Debug, Clone)]
pub struct ReleaseSet {
    pub name: String,
    pub releases: BTreeMap<Version, Release>,
}

impl ReleaseSet {
    /// The newest release in the set.
    pub fn latest(&self) -> Option<(&Version, &Release)> {
        self.releases.iter().next_back()
    }
}

/// Client for one plugin index server.
pub struct PackageIndex {
    client: reqwest::Client,
    base_url: String,
}

impl PackageIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn package_url(&self, name: &str) -> String {
        format!(
            "{}/plugins/{}/json/",
            self.base_url.trim_end_matches('/'),
            name
        )
    }

    /// Fetch the release set for a request, filtered by its specifier.
    ///
    /// Release entries whose version key does not parse are skipped with a
    /// warning; an empty result after filtering is an error.
    pub async fn releases(&self, request: &PluginRequest) -> anyhow::Result<ReleaseSet> {
        let url = self.package_url(&request.name);
        debug!(%url, "querying plugin index");

        let resp = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::PackageNotFound {
                name: request.name.clone(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(IndexError::Http {
                name: request.name.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let doc: PackageDoc = resp.json().await?;
        let mut releases = BTreeMap::new();
        for (raw, release) in doc.releases {
            match raw.parse::<Version>() {
                Ok(version) if request.matches(&version) => {
                    releases.insert(version, release);
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(package = %doc.name, version = %raw, error = %e, "skipping unparsable release version");
                },
            }
        }

        if releases.is_empty() {
            return Err(IndexError::NoMatchingRelease {
                name: doc.name,
                request: request.to_string(),
            }
            .into());
        }

        Ok(ReleaseSet {
            name: doc.name,
            releases,
        })
    }

    /// Download a release archive, verifying the advertised length.
    pub async fn download(&self, release: &Release) -> anyhow::Result<Vec<u8>> {
        debug!(url = %release.url, "downloading release archive");
        let started = std::time::Instant::now();

        let resp = self
            .client
            .get(&release.url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("failed to download {}: HTTP {}", release.url, resp.status());
        }

        let declared = resp.content_length().or(release.size);
        let bytes = resp.bytes().await?;
        if let Some(expected) = declared
            && bytes.len() as u64 != expected
        {
            bail!(
                "short download from {}: got {} bytes, expected {expected}",
                release.url,
                bytes.len()
            );
        }

        debug!(
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "download complete"
        );
        Ok(bytes.to_vec())
    }
}

impl Default for PackageIndex {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_URL)
    }
}

/// Returns true if the error looks like a connectivity problem (rather than
/// a bad request or a missing package).
pub fn is_connectivity_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .is_some_and(|e| e.is_connect() || e.is_timeout())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "name": "microdrop.droplet-planning-plugin",
        "releases": {
            "0.9": { "url": "http://example.org/droplet_planning_plugin-0.9.tar.gz" },
            "1.0": { "url": "http://example.org/droplet_planning_plugin-1.0.tar.gz" },
            "1.0.post1": { "url": "http://example.org/droplet_planning_plugin-1.0.post1.tar.gz" },
            "not-a-version": { "url": "http://example.org/bogus.tar.gz" }
        }
    }"#;

    #[tokio::test]
    async fn releases_returns_parsed_and_sorted_versions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/plugins/microdrop.droplet-planning-plugin/json/",
            )
            .with_header("content-type", "application/json")
            .with_body(DOC)
            .create_async()
            .await;

        let index = PackageIndex::new(server.url());
        let request = PluginRequest::unconstrained("microdrop.droplet-planning-plugin");
        let set = index.releases(&request).await.unwrap();

        // Unparsable "not-a-version" entry is dropped.
        assert_eq!(set.releases.len(), 3);
        let (latest, _) = set.latest().unwrap();
        assert_eq!(latest.to_string(), "1.0.post1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn releases_filters_by_specifier() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "GET",
                "/plugins/microdrop.droplet-planning-plugin/json/",
            )
            .with_body(DOC)
            .create_async()
            .await;

        let index = PackageIndex::new(server.url());
        let request: PluginRequest = "microdrop.droplet-planning-plugin<1.0".parse().unwrap();
        let set = index.releases(&request).await.unwrap();

        assert_eq!(set.releases.len(), 1);
        let (latest, _) = set.latest().unwrap();
        assert_eq!(latest.to_string(), "0.9");
    }

    #[tokio::test]
    async fn missing_package_is_typed_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/plugins/nope/json/")
            .with_status(404)
            .create_async()
            .await;

        let index = PackageIndex::new(server.url());
        let err = index
            .releases(&PluginRequest::unconstrained("nope"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::PackageNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unsatisfiable_specifier_is_typed_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "GET",
                "/plugins/microdrop.droplet-planning-plugin/json/",
            )
            .with_body(DOC)
            .create_async()
            .await;

        let index = PackageIndex::new(server.url());
        let request: PluginRequest = "microdrop.droplet-planning-plugin>=9.0".parse().unwrap();
        let err = index.releases(&request).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::NoMatchingRelease { .. })
        ));
    }

    #[tokio::test]
    async fn download_returns_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/archive.tar.gz")
            .with_body(b"archive-bytes")
            .create_async()
            .await;

        let index = PackageIndex::default();
        let release = Release {
            url: format!("{}/archive.tar.gz", server.url()),
            sha256: None,
            size: None,
        };
        let bytes = index.download(&release).await.unwrap();
        assert_eq!(bytes, b"archive-bytes");
    }

    #[tokio::test]
    async fn download_failure_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/archive.tar.gz")
            .with_status(500)
            .create_async()
            .await;

        let index = PackageIndex::default();
        let release = Release {
            url: format!("{}/archive.tar.gz", server.url()),
            sha256: None,
            size: None,
        };
        assert!(index.download(&release).await.is_err());
    }

    #[test]
    fn package_url_trims_trailing_slash() {
        let index = PackageIndex::new("http://example.org/update/");
        assert_eq!(
            index.package_url("foo"),
            "http://example.org/update/plugins/foo/json/"
        );
    }
}
