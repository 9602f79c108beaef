use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub hue_bridge_ip: String,
    pub hue_api_key: String,
    pub govee_api_key: String,
    pub kasa_base_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub tick_interval_ms: u64,
    pub hue_cooldown_ms: u64,
    pub govee_cooldown_ms: u64,
    pub kasa_cooldown_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            hue_bridge_ip: "192.168.1.39".to_string(),
            hue_api_key: String::new(),
            govee_api_key: String::new(),
            kasa_base_url: "http://127.0.0.1:3000/api/kasa".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            tick_interval_ms: 1000,
            hue_cooldown_ms: 1000,
            govee_cooldown_ms: 1500,
            kasa_cooldown_ms: 1000,
        }
    }
}

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("homegraph")
        .join("settings.json")
}

pub fn load(path: &Path) -> Result<AppSettings, String> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse settings {}: {}", path.display(), e))
}

pub fn save(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let raw = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, raw)
        .map_err(|e| format!("Failed to write settings {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join("homegraph-settings-roundtrip");
        let path = dir.join("settings.json");

        let mut settings = AppSettings::default();
        settings.govee_api_key = "secret".into();
        settings.tick_interval_ms = 250;

        save(&path, &settings).expect("save settings");
        let loaded = load(&path).expect("load settings");
        assert_eq!(loaded.govee_api_key, "secret");
        assert_eq!(loaded.tick_interval_ms, 250);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"hueApiKey":"abc123"}"#).expect("partial settings parse");
        assert_eq!(settings.hue_api_key, "abc123");
        assert_eq!(settings.tick_interval_ms, 1000);
        assert_eq!(settings.govee_cooldown_ms, 1500);
    }
}
