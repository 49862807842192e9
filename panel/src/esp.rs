use core::convert::TryInto;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::Method,
    io::Write,
    mqtt::client::{Details, EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request},
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use serde::Serialize;

use airco_common::{
    Confirmation, Connectivity, MainScreen, Navigation, NetworkConfig, OperatingMode, Panel,
    PanelAction, PanelEvent, Reconciliation, RuntimeConfig, UnitScreen, TOPIC_STATUS_FILTER,
};

use crate::api::{
    navigation_path_action, parse_unit_event, parse_unit_index, split_unit_path, ApiError,
    CommandResponse, CurrentScreen, MasterResponse, NavigationAction, NavigationResponse,
    PanelStatus,
};
use crate::link::{LinkEvent, MqttLink};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

type SharedMqtt = Arc<Mutex<EspMqttClient<'static>>>;

enum WifiStartup {
    Connected(EspWifi<'static>),
    Unavailable(EspWifi<'static>),
}

#[derive(Clone)]
struct SharedState {
    panel: Arc<Mutex<Panel>>,
    navigation: Arc<Mutex<Navigation>>,
    mqtt: Option<SharedMqtt>,
    wifi_connected: Arc<AtomicBool>,
    link: Arc<MqttLink>,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = RuntimeConfig::default();
    ensure_network_defaults(&mut runtime.network);
    runtime.sanitize();

    info!(
        "panel config: ssid=`{}`, mqtt=`{}:{}`, units={}",
        runtime.network.wifi_ssid,
        runtime.network.mqtt_host,
        runtime.network.mqtt_port,
        runtime.units.len(),
    );

    let Peripherals { modem, .. } = Peripherals::take()?;
    let (wifi, wifi_up) = match connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?
    {
        WifiStartup::Connected(wifi) => {
            info!("wifi connected");
            (wifi, true)
        }
        WifiStartup::Unavailable(wifi) => {
            warn!("wifi unavailable; running detached");
            runtime.panel.detached = true;
            (wifi, false)
        }
    };

    let panel = Panel::new(&runtime).context("invalid unit configuration")?;
    let reconnect_ms = runtime.panel.mqtt_reconnect_delay_ms;

    let (mqtt, mqtt_conn) = if panel.mode() == OperatingMode::Connected {
        let (client, conn) = create_mqtt_client(&runtime.network)?;
        (Some(Arc::new(Mutex::new(client))), Some(conn))
    } else {
        (None, None)
    };

    let shared_state = SharedState {
        panel: Arc::new(Mutex::new(panel)),
        navigation: Arc::new(Mutex::new(Navigation::default())),
        mqtt,
        wifi_connected: Arc::new(AtomicBool::new(wifi_up)),
        link: Arc::new(MqttLink::default()),
    };

    if let (Some(client), Some(conn)) = (shared_state.mqtt.clone(), mqtt_conn) {
        spawn_mqtt_receiver(shared_state.clone(), conn, client, reconnect_ms)?;
    }
    spawn_control_loop(shared_state.clone())?;

    let server = create_http_server(shared_state)?;

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_network_defaults(network: &mut NetworkConfig) {
    if network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            network.wifi_ssid = ssid.to_string();
        }
    }
    if network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            network.wifi_pass = pass.to_string();
        }
    }
    if let Some(host) = option_env!("MQTT_HOST") {
        network.mqtt_host = host.to_string();
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<WifiStartup> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    if network.wifi_ssid.is_empty() {
        warn!("wifi credentials missing");
        return Ok(WifiStartup::Unavailable(esp_wifi));
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi netif up on attempt {attempt}");
                return Ok(WifiStartup::Connected(esp_wifi));
            }
            Err(err) => warn!("wifi connect failed on attempt {attempt}: {err:#}"),
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    let _ = wifi.disconnect();
    let _ = wifi.stop();
    Ok(WifiStartup::Unavailable(esp_wifi))
}

fn create_mqtt_client(
    network: &NetworkConfig,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

    let conf = MqttClientConfiguration {
        client_id: Some(network.mqtt_client_id.as_str()),
        username: if network.mqtt_user.is_empty() {
            None
        } else {
            Some(network.mqtt_user.as_str())
        },
        password: if network.mqtt_pass.is_empty() {
            None
        } else {
            Some(network.mqtt_pass.as_str())
        },
        ..Default::default()
    };

    Ok(EspMqttClient::new(url.as_str(), &conf)?)
}

fn subscribe_topics(mqtt: &SharedMqtt) -> anyhow::Result<()> {
    let mut mqtt = mqtt.lock().map_err(|_| anyhow!("mqtt client lock poisoned"))?;
    mqtt.subscribe(TOPIC_STATUS_FILTER, QoS::AtMostOnce)?;
    Ok(())
}

fn spawn_mqtt_receiver(
    state: SharedState,
    mut conn: EspMqttConnection,
    mqtt: SharedMqtt,
    reconnect_ms: u64,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(12 * 1024)
        .spawn(move || loop {
            // The event must be released before subscribing; the client waits on it.
            let resubscribe = match conn.next() {
                Ok(event) => {
                    let payload = event.payload();
                    match payload {
                        EventPayload::Connected(_) => {
                            info!("mqtt connected");
                            state.link.observe(LinkEvent::Connected)
                        }
                        EventPayload::Disconnected => {
                            warn!("mqtt disconnected");
                            state.link.observe(LinkEvent::Disconnected)
                        }
                        EventPayload::Received {
                            topic: Some(topic),
                            data,
                            details: Details::Complete,
                            ..
                        } => {
                            if data.len() > MAX_MQTT_PAYLOAD_BYTES {
                                warn!(
                                    "dropping oversized MQTT payload on topic {} ({} bytes)",
                                    topic,
                                    data.len()
                                );
                            } else if let Ok(message) = core::str::from_utf8(data) {
                                handle_mqtt_message(&state, topic, message);
                            }
                            state.link.observe(LinkEvent::Other)
                        }
                        _ => state.link.observe(LinkEvent::Other),
                    }
                }
                Err(err) => {
                    warn!("mqtt receive loop error: {err:?}");
                    state.link.observe(LinkEvent::Disconnected);
                    thread::sleep(Duration::from_millis(reconnect_ms));
                    false
                }
            };

            if resubscribe {
                if let Err(err) = subscribe_topics(&mqtt) {
                    warn!("mqtt subscribe failed: {err:#}");
                }
            }
        })
        .context("failed to spawn mqtt receiver thread")?;
    Ok(())
}

fn spawn_control_loop(state: SharedState) -> anyhow::Result<()> {
    let config = lock_panel(&state)?.config().clone();

    thread::Builder::new()
        .name("control-loop".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            let started = Instant::now();
            let mut last_drift_ms = 0_u64;
            let mut last_check_ms = 0_u64;
            let mut last_connected = (false, false);

            loop {
                let now_ms: u64 = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

                if now_ms.saturating_sub(last_drift_ms) >= config.test_temp_update_ms {
                    last_drift_ms = now_ms;
                    if let Ok(mut panel) = lock_panel(&state) {
                        if panel.simulate_drift() {
                            debug!("detached temperatures updated");
                        }
                    }
                }

                if now_ms.saturating_sub(last_check_ms) >= config.connection_check_interval_ms {
                    last_check_ms = now_ms;
                    let wifi = is_wifi_station_connected();
                    state.wifi_connected.store(wifi, Ordering::Relaxed);
                    let connected = (wifi, state.link.is_connected());
                    if connected != last_connected {
                        info!("connectivity: wifi={} mqtt={}", connected.0, connected.1);
                        last_connected = connected;
                    }
                }

                thread::sleep(Duration::from_millis(config.data_update_interval_ms));
            }
        })
        .context("failed to spawn control loop thread")?;
    Ok(())
}

fn handle_mqtt_message(state: &SharedState, topic: &str, message: &str) {
    let outcome = match lock_panel(state) {
        Ok(mut panel) => panel.apply_status(topic, message),
        Err(err) => {
            warn!("{err:#}");
            return;
        }
    };

    match outcome {
        Reconciliation::Applied { unit, changed } => {
            debug!("status applied to unit {} (changed: {changed})", unit.0);
        }
        Reconciliation::UnknownUnit { protocol_id } => {
            warn!("status for unknown unit `{protocol_id}` dropped");
        }
        Reconciliation::Malformed { unit, reason } => {
            warn!("malformed status for unit {} dropped: {reason}", unit.0);
        }
        Reconciliation::Ignored => debug!("ignoring message on {topic}"),
    }
}

fn execute_panel_actions(state: &SharedState, actions: Vec<PanelAction>) {
    for action in actions {
        match action {
            PanelAction::Delay(ms) => thread::sleep(Duration::from_millis(ms)),
            PanelAction::Publish(message) => {
                let Some(mqtt) = &state.mqtt else {
                    continue;
                };
                debug!("publish {} = {}", message.topic, message.payload);
                let result = match mqtt.lock() {
                    Ok(mut client) => client
                        .publish(
                            &message.topic,
                            QoS::AtMostOnce,
                            false,
                            message.payload.as_bytes(),
                        )
                        .map(|_| ()),
                    Err(_) => {
                        warn!("mqtt client lock poisoned");
                        continue;
                    }
                };
                if let Err(err) = result {
                    warn!("mqtt publish failed on {}: {err:?}", message.topic);
                }
            }
        }
    }
}

fn create_http_server(state: SharedState) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 10 * 1024,
        uri_match_wildcard: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/status", Method::Get, move |req| {
            let status = {
                let panel = lock_panel(&state)?;
                PanelStatus::new(
                    panel.mode(),
                    state.wifi_connected.load(Ordering::Relaxed),
                    state.link.is_connected(),
                    panel.registry().len(),
                )
            };
            write_json(req, &status)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/screen/main", Method::Get, move |req| {
            let uri = req.uri().to_string();
            let page = match query_param(&uri, "page") {
                None => lock_navigation(&state)?.page(),
                Some(value) => match value.parse::<usize>() {
                    Ok(page) => page,
                    Err(_) => return write_error(req, 400, "Invalid page value"),
                },
            };

            let connectivity = Connectivity {
                wifi: state.wifi_connected.load(Ordering::Relaxed),
                mqtt: state.link.is_connected(),
            };
            let screen = MainScreen::build(&*lock_panel(&state)?, page, connectivity);
            write_json(req, &screen)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/screen", Method::Get, move |req| {
            let connectivity = Connectivity {
                wifi: state.wifi_connected.load(Ordering::Relaxed),
                mqtt: state.link.is_connected(),
            };
            let screen = {
                let panel = lock_panel(&state)?;
                let navigation = lock_navigation(&state)?;
                CurrentScreen::build(&panel, &navigation, connectivity)
            };
            write_json(req, &screen)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/navigation/*", Method::Post, move |req| {
            let uri = req.uri().to_string();
            let Some(action) = navigation_path_action(&uri) else {
                return write_api_error(req, &ApiError::UnknownAction);
            };
            let value = query_param(&uri, "value");

            let response = {
                let panel = lock_panel(&state)?;
                let unit_count = panel.registry().len();
                match NavigationAction::parse(action, value.as_deref(), unit_count) {
                    Ok(action) => {
                        let mut navigation = lock_navigation(&state)?;
                        let changed =
                            action.apply(&mut navigation, unit_count, panel.config().units_per_page);
                        Ok(NavigationResponse::new(&navigation, changed))
                    }
                    Err(err) => Err(err),
                }
            };
            match response {
                Ok(response) => write_json(req, &response),
                Err(err) => write_api_error(req, &err),
            }
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/units", Method::Get, move |req| {
            let units = lock_panel(&state)?.registry().units().to_vec();
            write_json(req, &units)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/units/*", Method::Get, move |req| {
            let uri = req.uri().to_string();
            let Some((index, None)) = split_unit_path(&uri) else {
                return write_api_error(req, &ApiError::UnknownAction);
            };

            let screen = {
                let panel = lock_panel(&state)?;
                parse_unit_index(index, panel.registry().len()).and_then(|id| {
                    UnitScreen::build(panel.registry(), id).ok_or(ApiError::UnknownUnit)
                })
            };
            match screen {
                Ok(screen) => write_json(req, &screen),
                Err(err) => write_api_error(req, &err),
            }
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/units/*", Method::Post, move |req| {
            let uri = req.uri().to_string();
            let Some((index, Some(action))) = split_unit_path(&uri) else {
                return write_api_error(req, &ApiError::UnknownAction);
            };
            let value = query_param(&uri, "value");

            let parsed = {
                let panel = lock_panel(&state)?;
                parse_unit_index(index, panel.registry().len()).and_then(|id| {
                    parse_unit_event(id, action, value.as_deref()).map(|event| (id, event))
                })
            };
            let (id, event) = match parsed {
                Ok(parsed) => parsed,
                Err(err) => return write_api_error(req, &err),
            };

            let outcome = lock_panel(&state)?.handle(event);
            if outcome.accepted {
                info!("unit {} {action}: {event:?}", id.0);
            }
            let (accepted, changed) = (outcome.accepted, outcome.changed);
            execute_panel_actions(&state, outcome.actions);

            let screen = UnitScreen::build(lock_panel(&state)?.registry(), id);
            match screen {
                Some(unit) => write_json(
                    req,
                    &CommandResponse {
                        accepted,
                        changed,
                        unit,
                    },
                ),
                None => write_api_error(req, &ApiError::UnknownUnit),
            }
        })?;
    }

    for (path, on) in [("/api/all/on", true), ("/api/all/off", false)] {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>(path, Method::Post, move |req| {
            let (outcome, notification_ms) = {
                let mut panel = lock_panel(&state)?;
                let outcome = panel.handle(PanelEvent::SetAllPower(on));
                (outcome, panel.config().notification_ms)
            };
            info!("all units switched {}", if on { "on" } else { "off" });

            let response = MasterResponse::new(&outcome, on, notification_ms);
            execute_panel_actions(&state, outcome.actions);
            write_json(req, &response)
        })?;

        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            write_json(req, &Confirmation::all_power(on))
        })?;
    }

    Ok(server)
}

fn lock_panel(state: &SharedState) -> anyhow::Result<std::sync::MutexGuard<'_, Panel>> {
    state
        .panel
        .lock()
        .map_err(|_| anyhow!("panel state lock poisoned"))
}

fn lock_navigation(state: &SharedState) -> anyhow::Result<std::sync::MutexGuard<'_, Navigation>> {
    state
        .navigation
        .lock()
        .map_err(|_| anyhow!("navigation lock poisoned"))
}

fn write_json<T: Serialize>(
    req: Request<&mut EspHttpConnection<'_>>,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        200,
        Some("OK"),
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn write_api_error(req: Request<&mut EspHttpConnection<'_>>, err: &ApiError) -> anyhow::Result<()> {
    write_error(req, err.status_code(), &err.to_string())
}

fn write_error(
    req: Request<&mut EspHttpConnection<'_>>,
    status_code: u16,
    message: &str,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "error": message });
    let body = serde_json::to_vec(&payload)?;
    req.into_response(
        status_code,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn query_param(uri: &str, key: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let name = parts.next()?;
        let value = parts.next().unwrap_or_default();
        if name == key {
            return Some(value.replace('+', " "));
        }
    }

    None
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}
