use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{outcome_from, AdapterError, CommandOutcome, DeviceAdapter};
use crate::models::device::{DeviceDescriptor, DeviceInfo, DeviceKind, HsvColor, Vendor};

/// Kasa devices are reached through the local backend service, which owns
/// discovery and the TP-Link local protocol. This adapter only speaks the
/// backend's REST routes.
pub struct KasaAdapter {
    client: Client,
    base_url: String,
}

impl KasaAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    /// Backend wire format: hue 0-360, saturation 0-100, brightness 0-100.
    fn color_body(color: &HsvColor) -> Value {
        json!({
            "hue": (color.hue.clamp(0.0, 1.0) * 360.0).round() as u64,
            "saturation": (color.saturation.clamp(0.0, 1.0) * 100.0).round() as u64,
            "brightness": (color.brightness.clamp(0.0, 255.0) / 255.0 * 100.0).round() as u64,
        })
    }

    fn light_url(&self, device_id: &str, action: &str) -> String {
        format!("{}/lights/{}/{}", self.base_url, device_id, action)
    }

    pub fn plug_url(&self, device_id: &str, action: &str) -> String {
        format!("{}/smartplugs/{}/{}", self.base_url, device_id, action)
    }
}

#[async_trait]
impl DeviceAdapter for KasaAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Kasa
    }

    async fn set_power(&self, descriptor: &DeviceDescriptor, on: bool) -> CommandOutcome {
        let action = if on { "on" } else { "off" };
        let url = match descriptor.kind {
            DeviceKind::Light => self.light_url(&descriptor.device_id, action),
            DeviceKind::Plug => self.plug_url(&descriptor.device_id, action),
        };
        outcome_from(self.client.post(&url).send().await).await
    }

    async fn set_color(&self, descriptor: &DeviceDescriptor, color: &HsvColor) -> CommandOutcome {
        let url = self.light_url(&descriptor.device_id, "color");
        outcome_from(self.client.post(&url).json(&Self::color_body(color)).send().await).await
    }

    async fn get_state(&self, device_id: &str) -> Result<Value, AdapterError> {
        let url = format!("{}/lights/{}", self.base_url, device_id);
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
        let url = format!("{}/devices", self.base_url);
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

        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::ParseError(e.to_string()))?;
        let devices = body
            .as_array()
            .or_else(|| body.get("devices").and_then(|d| d.as_array()))
            .ok_or_else(|| AdapterError::ParseError("Expected device array".into()))?;

        Ok(devices
            .iter()
            .filter_map(|d| {
                let id = d
                    .get("deviceId")
                    .or_else(|| d.get("id"))
                    .and_then(|v| v.as_str())?;
                Some(DeviceInfo {
                    id: id.to_string(),
                    name: d
                        .get("alias")
                        .or_else(|| d.get("name"))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_body_converts_to_backend_ranges() {
        let body = KasaAdapter::color_body(&HsvColor::new(0.5, 0.5, 255.0));
        assert_eq!(body["hue"], json!(180));
        assert_eq!(body["saturation"], json!(50));
        assert_eq!(body["brightness"], json!(100));
    }

    #[test]
    fn plug_descriptor_routes_to_smartplug_endpoint() {
        let descriptor = DeviceDescriptor::new(Vendor::Kasa, "p1", None, true, None).as_plug();
        assert_eq!(descriptor.kind, DeviceKind::Plug);
        let adapter = KasaAdapter::new(Client::new(), "http://localhost:3000/api/kasa");
        assert_eq!(
            adapter.plug_url(&descriptor.device_id, "on"),
            "http://localhost:3000/api/kasa/smartplugs/p1/on"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let adapter = KasaAdapter::new(Client::new(), "http://localhost:3000/api/kasa/");
        assert_eq!(
            adapter.light_url("dev1", "on"),
            "http://localhost:3000/api/kasa/lights/dev1/on"
        );
        assert_eq!(
            adapter.plug_url("plug1", "off"),
            "http://localhost:3000/api/kasa/smartplugs/plug1/off"
        );
    }
}
