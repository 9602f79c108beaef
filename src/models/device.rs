use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(TS, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/device.ts")]
pub enum Vendor {
    Hue,
    Govee,
    Kasa,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Hue => "hue",
            Vendor::Govee => "govee",
            Vendor::Kasa => "kasa",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical color representation passed between nodes.
/// Hue and saturation are normalized 0..=1, brightness is 0..=255
/// (the widest of the vendor brightness scales).
#[derive(TS, Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[ts(export, export_to = "bindings/device.ts")]
pub struct HsvColor {
    pub hue: f64,
    pub saturation: f64,
    pub brightness: f64,
}

#[derive(TS, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[ts(export, export_to = "bindings/device.ts")]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HsvColor {
    pub fn new(hue: f64, saturation: f64, brightness: f64) -> Self {
        Self {
            hue: hue.clamp(0.0, 1.0),
            saturation: saturation.clamp(0.0, 1.0),
            brightness: brightness.clamp(0.0, 255.0),
        }
    }

    /// Standard HSV -> RGB, value taken as brightness/255.
    pub fn to_rgb(&self) -> RgbColor {
        let h = self.hue.clamp(0.0, 1.0);
        let s = self.saturation.clamp(0.0, 1.0);
        let v = (self.brightness / 255.0).clamp(0.0, 1.0);

        let i = (h * 6.0).floor();
        let f = h * 6.0 - i;
        let p = v * (1.0 - s);
        let q = v * (1.0 - f * s);
        let t = v * (1.0 - (1.0 - f) * s);

        let (r, g, b) = match (i as i64).rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };

        RgbColor {
            r: (r * 255.0).round() as u8,
            g: (g * 255.0).round() as u8,
            b: (b * 255.0).round() as u8,
        }
    }
}

#[derive(TS, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/device.ts")]
pub enum DeviceCommand {
    TurnOn,
    TurnOff,
}

/// Lights and plugs share the dispatcher pipeline but reach different
/// endpoints on vendors that expose both (Kasa).
#[derive(TS, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/device.ts")]
pub enum DeviceKind {
    Light,
    Plug,
}

/// Vendor-neutral command payload assembled by sink nodes and consumed by
/// the dispatcher. Built fresh each tick, never persisted.
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/device.ts")]
pub struct DeviceDescriptor {
    pub vendor: Vendor,
    pub device_id: String,
    pub model: Option<String>,
    pub kind: DeviceKind,
    pub desired_power: bool,
    pub color: Option<HsvColor>,
    pub command: DeviceCommand,
}

impl DeviceDescriptor {
    /// `command` is derived from `desired_power` so the two can never disagree.
    pub fn new(
        vendor: Vendor,
        device_id: impl Into<String>,
        model: Option<String>,
        desired_power: bool,
        color: Option<HsvColor>,
    ) -> Self {
        Self {
            vendor,
            device_id: device_id.into(),
            model,
            kind: DeviceKind::Light,
            desired_power,
            color,
            command: if desired_power {
                DeviceCommand::TurnOn
            } else {
                DeviceCommand::TurnOff
            },
        }
    }

    pub fn as_plug(mut self) -> Self {
        self.kind = DeviceKind::Plug;
        self.color = None;
        self
    }

    pub fn device_key(&self) -> String {
        format!("{}:{}", self.vendor, self.device_id)
    }
}

/// Entry in the DeviceRegistry directory.
#[derive(TS, Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/device.ts")]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
}
