use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{AdapterError, DeviceAdapter};
use crate::models::device::{DeviceInfo, Vendor};

/// Directory of known devices per vendor. Fetched once, cached, refreshable.
/// Passed into sink nodes explicitly so tests can seed it without any HTTP.
///
/// Refresh replaces a vendor's whole list atomically: concurrent readers see
/// either the old or the new list, never a partial one.
#[derive(Default)]
pub struct DeviceRegistry {
    lists: RwLock<HashMap<Vendor, Arc<Vec<DeviceInfo>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, vendor: Vendor, devices: Vec<DeviceInfo>) {
        if let Ok(mut lists) = self.lists.write() {
            lists.insert(vendor, Arc::new(devices));
        }
    }

    pub fn devices(&self, vendor: Vendor) -> Arc<Vec<DeviceInfo>> {
        self.lists
            .read()
            .ok()
            .and_then(|lists| lists.get(&vendor).cloned())
            .unwrap_or_default()
    }

    /// Resolve a human selection to a stable device. Exact id match wins,
    /// then case-insensitive name match.
    pub fn resolve(&self, vendor: Vendor, selector: &str) -> Option<DeviceInfo> {
        let devices = self.devices(vendor);
        devices
            .iter()
            .find(|d| d.id == selector)
            .or_else(|| {
                devices
                    .iter()
                    .find(|d| d.name.eq_ignore_ascii_case(selector))
            })
            .cloned()
    }

    /// Re-fetch one vendor's device list through its adapter.
    pub async fn refresh(&self, adapter: &dyn DeviceAdapter) -> Result<usize, AdapterError> {
        let vendor = adapter.vendor();
        let devices = adapter.list_devices().await?;
        let count = devices.len();
        log::info!("Registered {} {} device(s)", count, vendor);
        self.seed(vendor, devices);
        Ok(count)
    }
}
