// src/dart/client.rs
use reqwest::header;
use std::time::Duration;

use crate::dart::models::{KeyAccount, KeyAccountResponse, ANNUAL_REPORT_CODE, STATUS_NO_DATA, STATUS_OK};
use crate::utils::config::EngineConfig;
use crate::utils::error::RemoteError;

const DART_USER_AGENT: &str = "fs-extract/0.1";

/// Remote source of a company's key annual totals.
#[allow(async_fn_in_trait)]
pub trait FactsApi {
    async fn key_accounts(&self, corp_code: &str, year: i32) -> Result<Vec<KeyAccount>, RemoteError>;
}

/// Client for the OpenDART key-accounts endpoint. Every call is preceded by
/// a fixed pause so consecutive calls stay under the registry's rate limit.
pub struct OpenDartClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    delay: Duration,
}

impl OpenDartClient {
    pub fn new(config: &EngineConfig) -> Result<Self, RemoteError> {
        let api_key = config.api_key.clone().ok_or(RemoteError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .user_agent(DART_USER_AGENT)
            .timeout(config.remote_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.remote_base_url.trim_end_matches('/').to_string(),
            api_key,
            delay: config.remote_delay(),
        })
    }
}

impl FactsApi for OpenDartClient {
    async fn key_accounts(&self, corp_code: &str, year: i32) -> Result<Vec<KeyAccount>, RemoteError> {
        let url = format!("{}/fnlttSinglAcnt.json", self.base_url);
        tracing::info!("Querying key accounts for {} {}", corp_code, year);

        // --- Basic Rate Limiting ---
        tokio::time::sleep(self.delay).await;

        let year = year.to_string();
        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .query(&[
                ("crtfc_key", self.api_key.as_str()),
                ("corp_code", corp_code),
                ("bsns_year", year.as_str()),
                ("reprt_code", ANNUAL_REPORT_CODE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for {}", status, url);
            return Err(RemoteError::Http(status));
        }

        let body: KeyAccountResponse = response.json().await?;
        accounts_from_response(body)
    }
}

/// Unwraps the response envelope; "no data" is an empty list, not an error.
pub fn accounts_from_response(body: KeyAccountResponse) -> Result<Vec<KeyAccount>, RemoteError> {
    match body.status.as_str() {
        STATUS_OK => {
            tracing::debug!("Received {} key accounts", body.list.len());
            Ok(body.list)
        }
        STATUS_NO_DATA => Ok(Vec::new()),
        _ => Err(RemoteError::Api {
            status: body.status,
            message: body.message,
        }),
    }
}
