//! NuGet v3 flat-container client.
//!
//! The flat container is a plain HTTP layout keyed by lowercased id and
//! version, so resolution is a single GET with no index round-trip:
//! `{base}/{id}/{version}/{id}.{version}.nupkg`.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;

use crate::core::PackageId;
use crate::error::RegistryError;
use crate::registry::RegistryClient;
use crate::util::Config;

pub struct NuGetClient {
    http: reqwest::Client,
    base_url: String,
}

impl NuGetClient {
    pub fn new(config: &Config) -> anyhow::Result<NuGetClient> {
        url::Url::parse(&config.registry_url)
            .with_context(|| format!("invalid registry URL: {}", config.registry_url))?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .context("failed to build HTTP client")?;
        Ok(NuGetClient {
            http,
            base_url: config.registry_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Flat-container download URL for a package.
fn package_url(base_url: &str, package: &PackageId) -> String {
    let id = package.id_lower();
    let version = package.version_lower();
    format!("{base_url}/{id}/{version}/{id}.{version}.nupkg")
}

#[async_trait]
impl RegistryClient for NuGetClient {
    async fn download_package(&self, package: &PackageId) -> Result<Vec<u8>, RegistryError> {
        let url = package_url(&self.base_url, package);
        tracing::debug!("downloading {}", url);

        let network = |source: reqwest::Error| RegistryError::Network {
            id: package.id().to_string(),
            version: package.version().to_string(),
            source,
        };

        let response = self.http.get(&url).send().await.map_err(network)?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                id: package.id().to_string(),
                version: package.version().to_string(),
            }),
            status if !status.is_success() => Err(RegistryError::Http {
                id: package.id().to_string(),
                version: package.version().to_string(),
                status: status.as_u16(),
            }),
            _ => {
                let bytes = response.bytes().await.map_err(network)?;
                tracing::info!("downloaded {} ({} bytes)", package, bytes.len());
                Ok(bytes.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_url_is_lowercased() {
        let pkg = PackageId::new("Newtonsoft.Json", "13.0.3");
        assert_eq!(
            package_url("https://api.nuget.org/v3-flatcontainer", &pkg),
            "https://api.nuget.org/v3-flatcontainer/newtonsoft.json/13.0.3/newtonsoft.json.13.0.3.nupkg"
        );
    }

    #[test]
    fn test_client_construction_strips_trailing_slash() {
        let config = Config {
            registry_url: "https://example.test/packages/".to_string(),
            ..Config::default()
        };
        let client = NuGetClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://example.test/packages");
    }
}
