use htd_zones::sim::{SimulatedConnector, SimulatedController};
use htd_zones::{
    ConfigEntry, ConfigFlow, FieldKind, FlowResult, ModelInfo, OptionsFlow, StepId,
    ABORT_ALREADY_CONFIGURED, BASE_ERROR_KEY, DEFAULT_PORT, ERROR_NO_CONNECTION, MAX_ZONES,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn connector() -> Arc<SimulatedConnector> {
    let sim = Arc::new(
        SimulatedController::new(ModelInfo {
            model_name: "MCA66".to_string(),
            friendly_name: "HTD MCA-66".to_string(),
        })
        .with_zones(6),
    );
    Arc::new(SimulatedConnector::new(sim))
}

fn input(value: Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}

async fn created_entry(flow: &mut ConfigFlow) -> ConfigEntry {
    let result = flow
        .step_options(input(json!({
            "device_name": "Downstairs",
            "active_zones": 4,
            "update_volume_on_change": true,
        })))
        .await
        .unwrap();

    match result {
        FlowResult::CreateEntry {
            title,
            data: Some(data),
            options,
        } => ConfigEntry {
            entry_id: "entry-1".to_string(),
            title,
            data,
            options,
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn user_step_without_input_shows_connection_form() {
    let mut flow = ConfigFlow::new(connector());
    match flow.step_user(None).await.unwrap() {
        FlowResult::ShowForm {
            step_id,
            schema,
            errors,
        } => {
            assert_eq!(step_id, StepId::User);
            assert!(errors.is_empty());
            let port = schema.field("port").unwrap();
            assert_eq!(port.kind, FieldKind::Port);
            assert_eq!(port.default, Some(json!(DEFAULT_PORT)));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_host_reports_no_connection() {
    let mut flow = ConfigFlow::new(Arc::new(SimulatedConnector::unreachable()));
    let result = flow
        .step_user(input(json!({ "host": "10.0.0.9", "port": 10006 })))
        .await
        .unwrap();

    match result {
        FlowResult::ShowForm {
            step_id, errors, ..
        } => {
            assert_eq!(step_id, StepId::User);
            assert_eq!(
                errors.get(BASE_ERROR_KEY).map(String::as_str),
                Some(ERROR_NO_CONNECTION)
            );
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn invalid_port_is_a_field_error() {
    let mut flow = ConfigFlow::new(connector());
    let result = flow
        .step_user(input(json!({ "host": "10.0.0.9", "port": 70000 })))
        .await
        .unwrap();

    match result {
        FlowResult::ShowForm { errors, .. } => {
            assert_eq!(errors.get("port").map(String::as_str), Some("invalid_port"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn reachable_host_leads_to_options_then_entry() {
    let connector = connector();
    let mut flow = ConfigFlow::new(connector.clone());

    match flow
        .step_user(input(json!({ "host": "10.0.0.9", "port": "10006" })))
        .await
        .unwrap()
    {
        FlowResult::ShowForm { step_id, schema, .. } => {
            assert_eq!(step_id, StepId::Options);
            assert_eq!(
                schema.field("device_name").unwrap().default,
                Some(json!("HTD MCA-66"))
            );
            assert_eq!(
                schema.field("active_zones").unwrap().default,
                Some(json!(MAX_ZONES))
            );
        }
        other => panic!("unexpected {:?}", other),
    }

    let entry = created_entry(&mut flow).await;
    assert_eq!(entry.title, "Downstairs");
    assert_eq!(entry.data.host, "10.0.0.9");
    assert_eq!(entry.data.port, 10006);
    assert_eq!(entry.options.active_zones, 4);
    assert!(entry.options.update_volume_on_change);
    assert_eq!(entry.options.retry_attempts, 5);
    assert_eq!(entry.options.source_names()[0], "Source 1");
    // The name default comes from the connection check; submitting connects no further
    assert_eq!(connector.connects().len(), 1);
    assert_eq!(connector.connects()[0].host, "10.0.0.9");
}

#[tokio::test]
async fn options_before_connection_shows_connection_form() {
    let connector = connector();
    let mut flow = ConfigFlow::new(connector.clone());

    match flow.step_options(None).await.unwrap() {
        FlowResult::ShowForm {
            step_id, errors, ..
        } => {
            assert_eq!(step_id, StepId::User);
            assert!(errors.is_empty());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(connector.connects().is_empty());
}

#[tokio::test]
async fn blank_device_name_shows_the_form_again() {
    let mut flow = ConfigFlow::new(connector());
    flow.step_user(input(json!({ "host": "10.0.0.9", "port": 10006 })))
        .await
        .unwrap();

    match flow
        .step_options(input(json!({
            "device_name": "  ",
            "active_zones": 2,
            "update_volume_on_change": false,
        })))
        .await
        .unwrap()
    {
        FlowResult::ShowForm {
            step_id, errors, ..
        } => {
            assert_eq!(step_id, StepId::Options);
            assert_eq!(errors.get("device_name").map(String::as_str), Some("empty_name"));
        }
        other => panic!("unexpected {:?}", other),
    }

    // The flow stays usable after the rejected submit
    let entry = created_entry(&mut flow).await;
    assert_eq!(entry.title, "Downstairs");
}

#[tokio::test]
async fn out_of_range_zone_count_is_rejected() {
    let mut flow = ConfigFlow::new(connector());
    flow.step_user(input(json!({ "host": "10.0.0.9", "port": 10006 })))
        .await
        .unwrap();

    match flow
        .step_options(input(json!({ "device_name": "X", "active_zones": 12 })))
        .await
        .unwrap()
    {
        FlowResult::ShowForm { errors, .. } => {
            assert_eq!(errors.get("active_zones").map(String::as_str), Some("not_in_list"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn dhcp_discovery_assigns_unique_id() {
    let mut flow = ConfigFlow::new(connector());
    let result = flow
        .step_dhcp("192.168.1.77", "00:90:c2:aa:bb:cc", &[])
        .await
        .unwrap();

    assert!(matches!(result, FlowResult::ShowForm { step_id: StepId::Options, .. }));
    assert_eq!(flow.unique_id(), Some("htd-00:90:c2:aa:bb:cc-MCA66"));
    assert_eq!(flow.title_placeholder(), Some("HTD MCA-66 (192.168.1.77)"));

    let entry = created_entry(&mut flow).await;
    assert_eq!(entry.data.unique_id.as_deref(), Some("htd-00:90:c2:aa:bb:cc-MCA66"));
    assert_eq!(entry.data.host, "192.168.1.77");
}

#[tokio::test]
async fn dhcp_discovery_of_configured_controller_aborts() {
    let mut flow = ConfigFlow::new(connector());
    let configured = vec!["htd-00:90:c2:aa:bb:cc-MCA66".to_string()];
    let result = flow
        .step_dhcp("192.168.1.77", "00:90:c2:aa:bb:cc", &configured)
        .await
        .unwrap();

    assert_eq!(
        result,
        FlowResult::Abort {
            reason: ABORT_ALREADY_CONFIGURED.to_string()
        }
    );
}

#[tokio::test]
async fn options_flow_edits_each_section() {
    let mut flow = ConfigFlow::new(connector());
    flow.step_user(input(json!({ "host": "10.0.0.9", "port": 10006 })))
        .await
        .unwrap();
    let entry = created_entry(&mut flow).await;
    let options_flow = OptionsFlow::new(entry.clone());

    assert_eq!(
        options_flow.step_init(),
        FlowResult::ShowMenu {
            step_id: StepId::Init,
            options: vec![StepId::Options, StepId::Sources, StepId::Advanced],
        }
    );

    match options_flow.step_sources(None).unwrap() {
        FlowResult::ShowForm { schema, .. } => {
            assert_eq!(schema.fields.len(), 6);
            assert_eq!(schema.field("source_2").unwrap().default, Some(json!("Source 2")));
        }
        other => panic!("unexpected {:?}", other),
    }

    match options_flow
        .step_sources(input(json!({ "source_1": "Cable", "source_3": "Aux" })))
        .unwrap()
    {
        FlowResult::CreateEntry { data, options, .. } => {
            assert!(data.is_none());
            assert_eq!(options.source_names()[0], "Cable");
            assert_eq!(options.source_names()[1], "Source 2");
            assert_eq!(options.source_names()[2], "Aux");
            assert_eq!(options.active_zones, 4);
        }
        other => panic!("unexpected {:?}", other),
    }

    match options_flow
        .step_advanced(input(json!({ "retry_attempts": 8, "socket_timeout": 2500 })))
        .unwrap()
    {
        FlowResult::CreateEntry { options, .. } => {
            assert_eq!(options.retry_attempts, 8);
            assert_eq!(options.socket_timeout, 2500);
            assert_eq!(options.command_delay, 100);
        }
        other => panic!("unexpected {:?}", other),
    }

    match options_flow
        .step_options(input(json!({ "device_name": "" })))
        .unwrap()
    {
        FlowResult::ShowForm {
            step_id, errors, ..
        } => {
            assert_eq!(step_id, StepId::Options);
            assert_eq!(errors.get("device_name").map(String::as_str), Some("empty_name"));
        }
        other => panic!("unexpected {:?}", other),
    }

    match options_flow
        .step_options(input(json!({ "active_zones": 2, "update_volume_on_change": "off" })))
        .unwrap()
    {
        FlowResult::CreateEntry { title, options, .. } => {
            assert_eq!(title, "Downstairs");
            assert_eq!(options.active_zones, 2);
            assert!(!options.update_volume_on_change);
        }
        other => panic!("unexpected {:?}", other),
    }
}
