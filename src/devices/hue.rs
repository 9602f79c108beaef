use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{outcome_from, AdapterError, CommandOutcome, DeviceAdapter};
use crate::models::device::{DeviceDescriptor, DeviceInfo, HsvColor, Vendor};

/// Philips Hue bridge adapter. Power and color are a single state PUT;
/// turning off sends only `{on:false}` so the bridge keeps the last
/// hue/sat/bri for the next power-on.
pub struct HueAdapter {
    client: Client,
    bridge_ip: String,
    api_key: String,
}

impl HueAdapter {
    pub fn new(client: Client, bridge_ip: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            bridge_ip: bridge_ip.into(),
            api_key: api_key.into(),
        }
    }

    fn state_url(&self, light_id: &str) -> String {
        format!(
            "http://{}/api/{}/lights/{}/state",
            self.bridge_ip, self.api_key, light_id
        )
    }

    /// Bridge wire format: hue 0-65535, sat 0-254, bri 1-254. Some firmware
    /// rejects bri 0, so brightness is clamped to a minimum of 1.
    fn color_body(color: &HsvColor) -> Value {
        let bri = color.brightness.round().clamp(1.0, 254.0) as u64;
        json!({
            "on": true,
            "hue": (color.hue.clamp(0.0, 1.0) * 65535.0).round() as u64,
            "sat": (color.saturation.clamp(0.0, 1.0) * 254.0).round() as u64,
            "bri": bri,
        })
    }

    fn power_body(on: bool) -> Value {
        json!({ "on": on })
    }
}

#[async_trait]
impl DeviceAdapter for HueAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Hue
    }

    async fn set_power(&self, descriptor: &DeviceDescriptor, on: bool) -> CommandOutcome {
        let result = self
            .client
            .put(self.state_url(&descriptor.device_id))
            .json(&Self::power_body(on))
            .send()
            .await;
        outcome_from(result).await
    }

    async fn set_color(&self, descriptor: &DeviceDescriptor, color: &HsvColor) -> CommandOutcome {
        let result = self
            .client
            .put(self.state_url(&descriptor.device_id))
            .json(&Self::color_body(color))
            .send()
            .await;
        outcome_from(result).await
    }

    async fn get_state(&self, device_id: &str) -> Result<Value, AdapterError> {
        let url = format!(
            "http://{}/api/{}/lights/{}",
            self.bridge_ip, self.api_key, device_id
        );
        let response = self
            .client
            .get(&url)
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
            return Err(AdapterError::NotConfigured("Hue API key is empty".into()));
        }
        let url = format!("http://{}/api/{}/lights", self.bridge_ip, self.api_key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::ApiError { status, message });
        }

        // The bridge returns an object keyed by light id.
        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::ParseError(e.to_string()))?;
        let map = body
            .as_object()
            .ok_or_else(|| AdapterError::ParseError("Expected object of lights".into()))?;

        let mut devices = Vec::with_capacity(map.len());
        for (id, light) in map {
            devices.push(DeviceInfo {
                id: id.clone(),
                name: light
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(id)
                    .to_string(),
                model: light
                    .get("modelid")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            });
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_body_scales_to_bridge_ranges() {
        let body = HueAdapter::color_body(&HsvColor::new(0.5, 1.0, 254.0));
        assert_eq!(body["on"], json!(true));
        assert_eq!(body["hue"], json!(32768));
        assert_eq!(body["sat"], json!(254));
        assert_eq!(body["bri"], json!(254));
    }

    #[test]
    fn color_body_clamps_brightness_to_minimum_one() {
        let body = HueAdapter::color_body(&HsvColor::new(0.0, 0.0, 0.0));
        assert_eq!(body["bri"], json!(1));
    }

    #[test]
    fn power_off_body_carries_no_color_fields() {
        // Off must not disturb the bridge's cached hue/sat/bri.
        let body = HueAdapter::power_body(false);
        assert_eq!(body, json!({ "on": false }));
    }
}
