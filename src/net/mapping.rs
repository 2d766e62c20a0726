//! Wallet → historical upload mapping via the metadata API.
//!
//! Fail-open: any failure yields an empty mapping, which the rest of the
//! pipeline reads as "no prior history".

use crate::asset::MappingEntry;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// Resolves a wallet to its historical uploads.
#[async_trait]
pub trait MappingSource: Send + Sync {
    /// Mapping entries in the order the source returned them; empty on failure.
    async fn resolve(&self, wallet: &str) -> Vec<MappingEntry>;
}

/// `POST {base}/api/userinfo` resolver.
#[derive(Debug, Clone)]
pub struct HttpMappingResolver {
    client: Client,
    endpoint: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserInfoRequest<'a> {
    wallet_address: &'a str,
}

impl HttpMappingResolver {
    /// Resolver posting to `base_url`; `None` resolves everything to empty.
    pub fn new(client: Client, base_url: Option<&str>) -> Self {
        let endpoint = base_url
            .map(|base| base.trim().trim_end_matches('/'))
            .filter(|base| !base.is_empty())
            .map(|base| format!("{base}/api/userinfo"));
        if endpoint.is_none() {
            tracing::warn!("metadata API not configured, history cannot be discovered");
        }
        Self { client, endpoint }
    }

    async fn request(&self, endpoint: &str, wallet: &str) -> Result<Vec<MappingEntry>, String> {
        let resp = self
            .client
            .post(endpoint)
            .json(&UserInfoRequest {
                wallet_address: wallet,
            })
            .send()
            .await
            .map_err(|e| format!("metadata request failed: {e}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("metadata API status {status}"));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| format!("metadata read failed: {e}"))?;
        let values: Vec<serde_json::Value> =
            serde_json::from_slice(&bytes).map_err(|e| format!("metadata decode failed: {e}"))?;
        Ok(values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value::<MappingEntry>(value) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(wallet, index, error = %err, "skipping malformed mapping entry");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl MappingSource for HttpMappingResolver {
    async fn resolve(&self, wallet: &str) -> Vec<MappingEntry> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Vec::new();
        };
        match self.request(endpoint, wallet).await {
            Ok(entries) => {
                tracing::info!(wallet, entries = entries.len(), "resolved history mapping");
                entries
            }
            Err(err) => {
                tracing::warn!(wallet, error = %err, "history mapping unavailable, assuming no history");
                Vec::new()
            }
        }
    }
}
