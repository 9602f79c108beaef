// Vendor adapters: each wraps one remote control protocol behind the
// DeviceAdapter trait so the dispatcher and registry never see HTTP details.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use std::fmt;
use std::time::Duration;

use crate::models::device::{DeviceDescriptor, DeviceInfo, HsvColor, Vendor};

mod govee;
mod hue;
mod kasa;
pub mod registry;

pub use govee::GoveeAdapter;
pub use hue::HueAdapter;
pub use kasa::KasaAdapter;

/// Hung vendor requests must not stall a queue forever.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
});

pub fn http_client() -> Client {
    HTTP.clone()
}

/// Error type for vendor API operations that return data (state, listings).
#[derive(Debug)]
pub enum AdapterError {
    /// HTTP request failed (network, timeout)
    RequestFailed(String),
    /// Vendor API returned an error status
    ApiError { status: u16, message: String },
    /// Failed to parse response
    ParseError(String),
    /// Adapter is missing required configuration
    NotConfigured(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            AdapterError::ApiError { status, message } => {
                write!(f, "Vendor API error {}: {}", status, message)
            }
            AdapterError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AdapterError::NotConfigured(msg) => write!(f, "Not configured: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Outcome of a single device command. Rate limiting is distinguished from
/// generic failure so the dispatcher can reschedule instead of dropping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Ok,
    RateLimited { retry_after_ms: u64 },
    Failed(String),
}

#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Turn a device on or off without touching its color.
    async fn set_power(&self, descriptor: &DeviceDescriptor, on: bool) -> CommandOutcome;

    /// Apply a color. For vendors where a color command implies power-on
    /// (Govee), the adapter preserves that side effect.
    async fn set_color(&self, descriptor: &DeviceDescriptor, color: &HsvColor) -> CommandOutcome;

    async fn get_state(&self, device_id: &str) -> Result<serde_json::Value, AdapterError>;

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, AdapterError>;
}

/// Map an HTTP response into a CommandOutcome, surfacing 429 retry-after.
pub(crate) async fn outcome_from(
    result: Result<reqwest::Response, reqwest::Error>,
) -> CommandOutcome {
    let response = match result {
        Ok(r) => r,
        Err(e) => return CommandOutcome::Failed(e.to_string()),
    };

    let status = response.status();
    if status.as_u16() == 429 {
        // Vendors send retry-after in seconds; default to 1s when absent.
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|secs| secs * 1000)
            .unwrap_or(1000);
        return CommandOutcome::RateLimited { retry_after_ms };
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return CommandOutcome::Failed(format!("status {}: {}", status.as_u16(), body));
    }

    CommandOutcome::Ok
}
