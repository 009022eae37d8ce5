use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub const IMGUR_UPLOAD_URL: &str = "https://api.imgur.com/3/upload";

// An unbounded upload would block the trigger worker for the whole process,
// so every request carries a client-side timeout.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload one image and return its public URL.
    async fn upload(&self, image_path: &Path) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ImgurUploader {
    client: Client,
    client_id: String,
    endpoint: String,
}

impl ImgurUploader {
    pub fn new(client_id: String) -> Result<Self> {
        Self::with_endpoint(client_id, IMGUR_UPLOAD_URL.to_string())
    }

    pub fn with_endpoint(client_id: String, endpoint: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            client_id,
            endpoint,
        })
    }
}

#[async_trait]
impl ImageHost for ImgurUploader {
    async fn upload(&self, image_path: &Path) -> Result<String> {
        let image_bytes = std::fs::read(image_path)
            .with_context(|| format!("failed to read screenshot {}", image_path.display()))?;
        let file_name = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("screenshot.png")
            .to_string();

        let form = Form::new().part("image", Part::bytes(image_bytes).file_name(file_name));

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Client-ID {}", self.client_id))
            .multipart(form)
            .send()
            .await
            .context("failed to call imgur upload API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("imgur API error {status}: {body}");
        }

        let json: Value = response
            .json()
            .await
            .context("failed to decode imgur response JSON")?;

        extract_link(&json).with_context(|| format!("imgur response had no link: {json}"))
    }
}

fn extract_link(root: &Value) -> Option<String> {
    root.pointer("/data/link")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Stand-in host for tests: derives a stable fake URL from the file stem.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockImageHost;

#[async_trait]
impl ImageHost for MockImageHost {
    async fn upload(&self, image_path: &Path) -> Result<String> {
        let stem = image_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("screenshot");
        Ok(format!("https://i.imgur.com/{stem}.png"))
    }
}
