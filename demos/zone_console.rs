//! Drive a simulated HTD controller from the command line.
//!
//! Run with `RUST_LOG`-style verbosity by passing `-v`:
//!
//! ```text
//! cargo run --features test-support --example zone_console -- -v
//! ```

use htd_zones::sim::{SimulatedConnector, SimulatedController};
use htd_zones::{
    ConfigEntry, ConfigFlow, Controller, EntryOptions, FlowResult, ModelInfo, SourceNames,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let verbose = std::env::args().any(|a| a == "-v");
    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let sim = Arc::new(
        SimulatedController::new(ModelInfo {
            model_name: "MCA66".to_string(),
            friendly_name: "HTD MCA-66".to_string(),
        })
        .with_zones(6)
        .with_step_delay(Duration::from_millis(15)),
    );
    let connector = Arc::new(SimulatedConnector::new(sim.clone()));

    // Walk the setup wizard the way a host would
    let mut flow = ConfigFlow::new(connector.clone());
    flow.step_user(json!({ "host": "192.168.1.50", "port": 10006 }).as_object().cloned())
        .await?;
    let result = flow
        .step_options(
            json!({
                "device_name": "Living Room",
                "active_zones": 3,
                "update_volume_on_change": true,
            })
            .as_object()
            .cloned(),
        )
        .await?;

    let (title, data, mut options): (String, _, EntryOptions) = match result {
        FlowResult::CreateEntry {
            title,
            data: Some(data),
            options,
        } => (title, data, options),
        other => return Err(format!("setup did not finish: {:?}", other).into()),
    };
    options.sources = SourceNames::new(
        ["Cable", "AppleTV", "Aux", "Radio", "Source 5", "Source 6"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );

    let entry = ConfigEntry {
        entry_id: "demo".to_string(),
        title,
        data,
        options,
    };
    println!("{}", entry.to_json()?);

    let controller = Controller::setup(&entry, connector.as_ref()).await?;
    let mut updates = controller.subscribe_state();

    let zone = controller
        .zone(1)
        .ok_or("zone 1 missing")?;
    zone.turn_on().await?;
    zone.select_source("AppleTV").await?;

    // Drag the slider: the second and third moves retarget the running ramp
    let ramp = tokio::spawn({
        let zone = zone.clone();
        async move { zone.set_volume(0.2).await }
    });
    tokio::time::sleep(Duration::from_millis(60)).await;
    zone.set_volume(0.35).await?;
    tokio::time::sleep(Duration::from_millis(60)).await;
    zone.set_volume(0.3).await?;
    ramp.await??;

    zone.refresh().await?;
    println!(
        "{}: {} volume={:.2} source={}",
        zone.name(),
        zone.state(),
        zone.volume_level().unwrap_or_default(),
        zone.source()?.unwrap_or_default()
    );

    let published = updates.drain()?;
    println!("{} state updates published", published.len());
    for command in sim.calls() {
        println!("  {:?}", command);
    }

    controller.unload().await;
    Ok(())
}
