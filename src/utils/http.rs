// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CrawlerConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Turn a non-success response into [`AppError::Status`].
pub fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AppError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

/// Fetch a page body as text.
///
/// Callers parse with [`scraper::Html`] after the await; `Html` is not `Send`.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = check_status(client.get(url).send().await?)?;
    Ok(response.text().await?)
}

/// Fetch a resource body as bytes.
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = check_status(client.get(url).send().await?)?;
    Ok(response.bytes().await?.to_vec())
}
