use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{outcome_from, AdapterError, CommandOutcome, DeviceAdapter};
use crate::models::device::{DeviceDescriptor, DeviceInfo, HsvColor, Vendor};

const CONTROL_URL: &str = "https://developer-api.govee.com/v1/devices/control";
const DEVICES_URL: &str = "https://developer-api.govee.com/v1/devices";

/// Govee cloud adapter. Unlike Hue there is no unified state object: a
/// "color" command recolors the device and turns it on as a side effect,
/// while turning off requires the dedicated "turn" command.
pub struct GoveeAdapter {
    client: Client,
    api_key: String,
}

impl GoveeAdapter {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    fn turn_body(descriptor: &DeviceDescriptor, on: bool) -> Value {
        json!({
            "device": descriptor.device_id,
            "model": descriptor.model.as_deref().unwrap_or(""),
            "cmd": { "name": "turn", "value": if on { "on" } else { "off" } },
        })
    }

    fn color_body(descriptor: &DeviceDescriptor, color: &HsvColor) -> Value {
        let rgb = color.to_rgb();
        json!({
            "device": descriptor.device_id,
            "model": descriptor.model.as_deref().unwrap_or(""),
            "cmd": { "name": "color", "value": { "r": rgb.r, "g": rgb.g, "b": rgb.b } },
        })
    }

    async fn send_control(&self, body: &Value) -> CommandOutcome {
        let result = self
            .client
            .put(CONTROL_URL)
            .header("Govee-API-Key", &self.api_key)
            .json(body)
            .send()
            .await;
        outcome_from(result).await
    }
}

#[async_trait]
impl DeviceAdapter for GoveeAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Govee
    }

    async fn set_power(&self, descriptor: &DeviceDescriptor, on: bool) -> CommandOutcome {
        self.send_control(&Self::turn_body(descriptor, on)).await
    }

    async fn set_color(&self, descriptor: &DeviceDescriptor, color: &HsvColor) -> CommandOutcome {
        // Color implies power-on; there is no way to recolor an off device.
        self.send_control(&Self::color_body(descriptor, color))
            .await
    }

    async fn get_state(&self, device_id: &str) -> Result<Value, AdapterError> {
        let url = format!(
            "https://developer-api.govee.com/v1/devices/state?device={}",
            device_id
        );
        let response = self
            .client
            .get(&url)
            .header("Govee-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::ApiError { status, message });
        }
        response
            .json()
            .await
            .map_err(|e| AdapterError::ParseError(e.to_string()))
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, AdapterError> {
        if self.api_key.is_empty() {
            return Err(AdapterError::NotConfigured("Govee API key is empty".into()));
        }
        let response = self
            .client
            .get(DEVICES_URL)
            .header("Govee-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::ApiError { status, message });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::ParseError(e.to_string()))?;
        let devices = body
            .get("data")
            .and_then(|d| d.get("devices"))
            .and_then(|d| d.as_array())
            .ok_or_else(|| AdapterError::ParseError("Expected data.devices array".into()))?;

        Ok(devices
            .iter()
            .filter_map(|d| {
                let id = d.get("device").and_then(|v| v.as_str())?;
                Some(DeviceInfo {
                    id: id.to_string(),
                    name: d
                        .get("deviceName")
                        .and_then(|v| v.as_str())
                        .unwrap_or(id)
                        .to_string(),
                    model: d
                        .get("model")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                })
            })
            .collect())
    }
}
