use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::device::DeviceError;

/// Header carrying the bridge application key.
pub const APPLICATION_KEY_HEADER: &str = "hue-application-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
}

/// One outbound request to a light bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HueRequest {
    pub method: Method,
    pub url: String,
    pub application_key: String,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HueResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HueResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTPS calls against a light bridge
///
/// This trait allows for mocking the bridge for testing purposes. An `Err`
/// means no response was received; any HTTP status is an `Ok`.
#[async_trait]
pub trait HueClient: Send + Sync {
    async fn send(&self, request: HueRequest) -> Result<HueResponse, DeviceError>;
}

/// Real bridge client using reqwest
///
/// Bridges on the LAN present self-signed certificates, so peer verification
/// is disabled for this client and only this client.
#[derive(Debug, Clone)]
pub struct ReqwestHueClient {
    client: reqwest::Client,
}

impl ReqwestHueClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HueClient for ReqwestHueClient {
    async fn send(&self, request: HueRequest) -> Result<HueResponse, DeviceError> {
        debug!("{} {}", request.method, request.url);

        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Put => self.client.put(&request.url),
        };
        let mut builder = builder
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(APPLICATION_KEY_HEADER, &request.application_key);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DeviceError::TransientNetworkFailure(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| DeviceError::TransientNetworkFailure(e.to_string()))?;

        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(HueResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Mock bridge client for testing
///
/// Answers every request with the same response and records what was sent.
#[cfg(test)]
#[derive(Debug)]
pub struct MockHueClient {
    pub response: Result<HueResponse, DeviceError>,
    pub requests: std::sync::Mutex<Vec<HueRequest>>,
}

#[cfg(test)]
impl MockHueClient {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            response: Ok(HueResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            response: Err(DeviceError::TransientNetworkFailure(
                "connection refused".to_string(),
            )),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<HueRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl HueClient for MockHueClient {
    async fn send(&self, request: HueRequest) -> Result<HueResponse, DeviceError> {
        self.requests.lock().unwrap().push(request);
        self.response.clone()
    }
}
