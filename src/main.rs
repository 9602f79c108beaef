use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use homegraph::devices::registry::DeviceRegistry;
use homegraph::devices::{self, GoveeAdapter, HueAdapter, KasaAdapter};
use homegraph::dispatch::{CommandDispatcher, DispatchPolicy};
use homegraph::models::schema::{Graph, RuntimeSnapshot};
use homegraph::node_graph::{GraphRuntime, TickServices};
use homegraph::settings;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let graph_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("Usage: homegraph <graph.json>")?;

    let settings_path = settings::default_path();
    let settings = settings::load(&settings_path)?;
    if !settings_path.exists() {
        // Seed a default settings file so there is something to edit.
        settings::save(&settings_path, &settings)?;
        log::info!("Wrote default settings to {}", settings_path.display());
    }
    let graph = load_graph(&graph_path)?;

    let client = devices::http_client();
    let hue = Arc::new(HueAdapter::new(
        client.clone(),
        settings.hue_bridge_ip.clone(),
        settings.hue_api_key.clone(),
    ));
    let govee = Arc::new(GoveeAdapter::new(client.clone(), settings.govee_api_key.clone()));
    let kasa = Arc::new(KasaAdapter::new(client, settings.kasa_base_url.clone()));

    // Discovery is best effort; a vendor that is down at startup can still
    // be driven by raw device ids in the graph.
    let registry = DeviceRegistry::new();
    for result in [
        registry.refresh(hue.as_ref() as &dyn devices::DeviceAdapter).await,
        registry.refresh(govee.as_ref() as &dyn devices::DeviceAdapter).await,
        registry.refresh(kasa.as_ref() as &dyn devices::DeviceAdapter).await,
    ] {
        if let Err(e) = result {
            log::warn!("Device discovery failed: {}", e);
        }
    }

    let mut dispatcher = CommandDispatcher::new();
    dispatcher.register(hue, DispatchPolicy::with_cooldown_ms(settings.hue_cooldown_ms));
    dispatcher.register(
        govee,
        DispatchPolicy::with_cooldown_ms(settings.govee_cooldown_ms),
    );
    dispatcher.register(
        kasa,
        DispatchPolicy::with_cooldown_ms(settings.kasa_cooldown_ms),
    );

    let mut runtime = GraphRuntime::with_graph(graph)?;
    let snapshot_path = snapshot_path();
    match load_snapshot(&snapshot_path) {
        Ok(Some(snapshot)) => {
            runtime.restore(snapshot);
            log::info!("Restored runtime state from {}", snapshot_path.display());
        }
        Ok(None) => {}
        Err(e) => log::warn!("Ignoring snapshot: {}", e),
    }

    let services = TickServices {
        registry: &registry,
        dispatcher: &dispatcher,
        settings: &settings,
    };

    log::info!(
        "Running {} ({} nodes, tick every {}ms)",
        graph_path.display(),
        runtime.graph().nodes.len(),
        settings.tick_interval_ms
    );

    let mut interval = tokio::time::interval(Duration::from_millis(settings.tick_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let summary = runtime.tick(&services);
                for (node_id, error) in &summary.errors {
                    log::warn!("tick #{}: node '{}' failed: {}", summary.tick, node_id, error);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    save_snapshot(&snapshot_path, &runtime.snapshot())?;
    log::info!("Saved runtime state to {}", snapshot_path.display());
    Ok(())
}

fn load_graph(path: &PathBuf) -> Result<Graph, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read graph {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("Failed to parse graph {}: {}", path.display(), e))
}

fn snapshot_path() -> PathBuf {
    settings::default_path()
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapshot.json")
}

fn load_snapshot(path: &PathBuf) -> Result<Option<RuntimeSnapshot>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read snapshot {}: {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse snapshot {}: {}", path.display(), e))
}

fn save_snapshot(path: &PathBuf, snapshot: &RuntimeSnapshot) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let raw = serde_json::to_string_pretty(snapshot)
        .map_err(|e| format!("Failed to serialize snapshot: {}", e))?;
    std::fs::write(path, raw)
        .map_err(|e| format!("Failed to write snapshot {}: {}", path.display(), e))
}
