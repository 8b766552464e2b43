use htd_zones::sim::{Command, SimulatedConnector, SimulatedController};
use htd_zones::{
    ConfigEntry, Controller, EntityRegistry, EntryData, EntryOptions, HtdError, ModelInfo,
    PowerState, RegisteredEntity, SourceNames, ZoneSnapshot,
};
use std::sync::Arc;
use std::time::Duration;

fn simulated() -> Arc<SimulatedController> {
    Arc::new(
        SimulatedController::new(ModelInfo {
            model_name: "MCA66".to_string(),
            friendly_name: "HTD MCA-66".to_string(),
        })
        .with_zones(6),
    )
}

fn entry(active_zones: u8) -> ConfigEntry {
    let mut options = EntryOptions::new("Main Floor");
    options.active_zones = active_zones;
    options.sources = SourceNames::new(
        ["Cable", "AppleTV", "Aux", "Radio", "Source 5", "Source 6"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );

    ConfigEntry {
        entry_id: "entry-main".to_string(),
        title: "Main Floor".to_string(),
        data: EntryData {
            host: "192.168.1.60".to_string(),
            port: 10006,
            unique_id: Some("htd-00:90:c2-MCA66".to_string()),
        },
        options,
    }
}

#[tokio::test]
async fn setup_creates_active_zones_sharing_one_gateway() {
    let sim = simulated();
    let connector = SimulatedConnector::new(sim.clone());

    let controller = Controller::setup(&entry(4), &connector).await.unwrap();

    assert_eq!(connector.connects().len(), 1);
    assert_eq!(connector.connects()[0].host, "192.168.1.60");
    assert_eq!(controller.zones().len(), 4);
    assert_eq!(
        sim.calls(),
        (1..=4).map(Command::QueryZone).collect::<Vec<_>>()
    );

    let zone = controller.zone(3).unwrap();
    assert!(zone.enabled());
    assert_eq!(zone.unique_id(), "htd-00:90:c2-MCA66_3");
    assert_eq!(zone.entity_id(), "media_player.htd_main_floor_zone_3");
    assert_eq!(zone.source_list().len(), 6);
    assert!(controller.zone(5).is_none());

    assert_eq!(controller.model_info().await.unwrap().model_name, "MCA66");
}

#[tokio::test]
async fn select_source_scenario_across_controller() {
    let sim = simulated();
    let controller = Controller::setup(&entry(4), &SimulatedConnector::new(sim.clone()))
        .await
        .unwrap();
    sim.clear_calls();

    let zone = controller.zone(2).unwrap();
    zone.select_source("Aux").await.unwrap();
    assert_eq!(sim.calls(), vec![Command::SetSource { zone: 2, source: 3 }]);

    zone.refresh().await.unwrap();
    assert_eq!(zone.source().unwrap().as_deref(), Some("Aux"));
}

#[tokio::test]
async fn setup_fails_when_controller_unreachable() {
    let result = Controller::setup(&entry(2), &SimulatedConnector::unreachable()).await;
    match result {
        Err(err) => assert!(err.is_connectivity()),
        Ok(_) => panic!("setup should fail"),
    }
}

#[tokio::test]
async fn setup_propagates_initial_query_failure() {
    let sim = simulated();
    sim.set_offline(true);
    let result = Controller::setup(&entry(2), &SimulatedConnector::new(sim)).await;
    assert!(matches!(result, Err(HtdError::Timeout)));
}

#[tokio::test]
async fn setup_rejects_invalid_options() {
    let result = Controller::setup(&entry(0), &SimulatedConnector::new(simulated())).await;
    assert!(matches!(result, Err(HtdError::InvalidConfig(_))));
}

#[tokio::test]
async fn polling_picks_up_changes_made_elsewhere() {
    let sim = simulated();
    let mut controller = Controller::setup(&entry(1), &SimulatedConnector::new(sim.clone()))
        .await
        .unwrap();
    let mut updates = controller.subscribe_state();

    sim.set_zone_state(ZoneSnapshot {
        zone: 1,
        power: PowerState::On,
        volume: 45,
        mute: false,
        source: 4,
    });

    controller.start_polling(Duration::from_millis(10)).await.unwrap();
    assert!(controller.is_polling());

    let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("poll tick")
        .unwrap();
    assert_eq!(update.zone, 1);

    let zone = controller.zone(1).unwrap();
    assert_eq!(zone.state(), PowerState::On);
    assert_eq!(zone.source().unwrap().as_deref(), Some("Radio"));

    controller.stop_polling().await;
    assert!(!controller.is_polling());
    assert!(controller.unload().await);
}

#[tokio::test]
async fn zero_scan_interval_is_rejected() {
    let mut controller = Controller::setup(&entry(1), &SimulatedConnector::new(simulated()))
        .await
        .unwrap();
    assert!(controller.start_polling(Duration::ZERO).await.is_err());
}

#[tokio::test]
async fn reload_applies_new_zone_count_and_registry_cleanup() {
    let sim = simulated();
    let connector = SimulatedConnector::new(sim.clone());
    let controller = Controller::setup(&entry(6), &connector).await.unwrap();

    let mut registry = EntityRegistry::new();
    for zone in controller.zones() {
        registry.register(RegisteredEntity {
            entity_id: zone.entity_id(),
            unique_id: zone.unique_id(),
            config_entry_id: controller.entry_id().to_string(),
        });
    }
    assert_eq!(registry.len(), 6);

    let updated = entry(2);
    let controller = controller.reload(&updated, &connector).await.unwrap();
    let removed = registry.cleanup(&updated);

    assert_eq!(controller.zones().len(), 2);
    assert_eq!(removed.len(), 4);
    assert_eq!(registry.len(), 2);
    assert_eq!(connector.connects().len(), 2);
}
