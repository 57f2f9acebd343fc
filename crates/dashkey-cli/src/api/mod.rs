//! HTTP client for the server's public key directory

use crate::config::Settings;
use async_trait::async_trait;
use dashkey_core::ports::KeyDirectory;
use dashkey_core::{DashkeyError, Result, UserId};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyBody {
    public_key: Option<String>,
}

fn directory_err(context: &str, e: impl std::fmt::Display) -> DashkeyError {
    DashkeyError::Directory(format!("{}: {}", context, e))
}

pub struct HttpKeyDirectory {
    http: ReqwestClient,
    base_url: String,
}

impl HttpKeyDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: ReqwestClient::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create client from settings explicitly
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.server_url)
    }

    fn key_url(&self, user: UserId) -> String {
        format!("{}/users/{}/public-key", self.base_url, user)
    }
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    async fn fetch_public_key(&self, user: UserId) -> Result<Option<String>> {
        let response = self
            .http
            .get(self.key_url(user))
            .send()
            .await
            .map_err(|e| directory_err("Failed to send public key request", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DashkeyError::Directory(format!(
                "Public key lookup for user {} failed with {}",
                user, status
            )));
        }

        let body: PublicKeyBody = response
            .json()
            .await
            .map_err(|e| directory_err("Failed to parse public key response", e))?;

        Ok(body.public_key.filter(|k| !k.is_empty()))
    }

    async fn publish_public_key(&self, user: UserId, public_key_b64: &str) -> Result<()> {
        let response = self
            .http
            .put(self.key_url(user))
            .json(&PublicKeyBody {
                public_key: Some(public_key_b64.to_string()),
            })
            .send()
            .await
            .map_err(|e| directory_err("Failed to send public key upload", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
            return Err(DashkeyError::Directory(format!(
                "Public key upload failed ({}): {}",
                status,
                error["message"].as_str().unwrap_or("Unknown error")
            )));
        }

        tracing::debug!(user = %user, "Published public key");
        Ok(())
    }
}
