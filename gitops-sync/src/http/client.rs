//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::EngineError;

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const SUDO_HEADER: &str = "Sudo";

/// Status, headers and body of a response the caller wants to inspect itself
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: String,
    pub body: String,
}

impl RawResponse {
    async fn read(response: Response) -> Self {
        let status = response.status().as_u16();
        let headers = format!("{:?}", response.headers());
        let body = response.text().await.unwrap_or_default();
        Self { status, headers, body }
    }
}

/// JSON client for one API base URL
pub struct HttpClient {
    client: Client,
    base_url: String,
    private_token: Option<SecretString>,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            private_token: None,
        })
    }

    /// Authenticate every request with a `PRIVATE-TOKEN` header
    pub fn with_private_token(mut self, token: SecretString) -> Self {
        self.private_token = Some(token);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach credentials, acting as `sudo` when given
    fn authorize(&self, request: RequestBuilder, sudo: Option<i64>) -> RequestBuilder {
        let mut request = request;
        if let Some(token) = &self.private_token {
            request = request.header(PRIVATE_TOKEN_HEADER, token.expose_secret());
        }
        if let Some(user_id) = sudo {
            request = request.header(SUDO_HEADER, user_id.to_string());
        }
        request
    }

    async fn decode<T: DeserializeOwned>(method: &str, url: &str, response: Response) -> Result<T, EngineError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} {} failed: {} - {}", method, url, status, body);
            return Err(EngineError::RemoteProvisioningError(format!("{}: {}", status, body)));
        }
        Ok(response.json().await?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, sudo: Option<i64>) -> Result<T, EngineError> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(&url), sudo).send().await?;
        Self::decode("GET", &url, response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        sudo: Option<i64>,
        body: &B,
    ) -> Result<T, EngineError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .authorize(self.client.post(&url), sudo)
            .json(body)
            .send()
            .await?;
        Self::decode("POST", &url, response).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        sudo: Option<i64>,
        body: &B,
    ) -> Result<T, EngineError> {
        let url = self.url(path);
        debug!("PUT {}", url);
        let response = self
            .authorize(self.client.put(&url), sudo)
            .json(body)
            .send()
            .await?;
        Self::decode("PUT", &url, response).await
    }

    /// POST without interpreting the status
    pub async fn post_raw<B: Serialize + ?Sized>(
        &self,
        path: &str,
        sudo: Option<i64>,
        body: &B,
    ) -> Result<RawResponse, EngineError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .authorize(self.client.post(&url), sudo)
            .json(body)
            .send()
            .await?;
        Ok(RawResponse::read(response).await)
    }
}
