use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use airco_common::{
    Confirmation, Connectivity, MainScreen, Navigation, OperatingMode, Panel, PanelAction,
    PanelEvent, Reconciliation, RuntimeConfig, UnitScreen, TOPIC_STATUS_FILTER,
};

use crate::api::{
    parse_unit_event, parse_unit_index, ApiError, CommandResponse, CurrentScreen, MasterResponse,
    NavigationAction, NavigationResponse, PanelStatus,
};
use crate::link::{LinkEvent, MqttLink};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

#[derive(Clone)]
struct AppState {
    panel: Arc<Mutex<Panel>>,
    navigation: Arc<Mutex<Navigation>>,
    mqtt: Option<AsyncClient>,
    link: Arc<MqttLink>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime);
    runtime.sanitize();

    let panel = Panel::new(&runtime).context("invalid unit configuration")?;
    info!(
        "panel starting with {} units in {} mode",
        panel.registry().len(),
        panel.mode().as_str()
    );

    let (mqtt, eventloop) = if panel.mode() == OperatingMode::Connected {
        let network = &runtime.network;
        let mut mqtt_options = MqttOptions::new(
            network.mqtt_client_id.clone(),
            network.mqtt_host.clone(),
            network.mqtt_port,
        );
        if !network.mqtt_user.is_empty() {
            mqtt_options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
        }
        let (client, eventloop) = AsyncClient::new(mqtt_options, 64);
        (Some(client), Some(eventloop))
    } else {
        (None, None)
    };

    let app_state = AppState {
        panel: Arc::new(Mutex::new(panel)),
        navigation: Arc::new(Mutex::new(Navigation::default())),
        mqtt,
        link: Arc::new(MqttLink::default()),
    };

    if let Some(eventloop) = eventloop {
        spawn_mqtt_loop(
            app_state.clone(),
            eventloop,
            runtime.panel.mqtt_reconnect_delay_ms,
        );
    }
    spawn_control_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/screen", get(handle_get_screen))
        .route("/api/screen/main", get(handle_get_main_screen))
        .route("/api/navigation/{action}", post(handle_navigation))
        .route("/api/units", get(handle_get_units))
        .route("/api/units/{index}", get(handle_get_unit))
        .route("/api/units/{index}/power", post(handle_power))
        .route("/api/units/{index}/mode", post(handle_mode))
        .route("/api/units/{index}/fan", post(handle_fan))
        .route("/api/units/{index}/swing", post(handle_swing))
        .route("/api/units/{index}/temperature", post(handle_temperature))
        .route("/api/units/{index}/temperature/up", post(handle_temperature_up))
        .route(
            "/api/units/{index}/temperature/down",
            post(handle_temperature_down),
        )
        .route("/api/all/on", get(handle_confirm_all_on).post(handle_all_on))
        .route("/api/all/off", get(handle_confirm_all_off).post(handle_all_off))
        .with_state(app_state);

    let port = std::env::var("PANEL_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind panel server at {addr}"))?;

    info!("panel listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    let network = &mut runtime.network;
    if let Ok(host) = std::env::var("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
    if let Ok(value) = std::env::var("PANEL_DETACHED") {
        runtime.panel.detached = matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let data_dir = std::env::var("AIRCO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.airco"));
    let path = data_dir.join("runtime.json");

    match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("invalid runtime config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop, reconnect_ms: u64) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if !app_state.link.observe(LinkEvent::Connected) {
                        continue;
                    }
                    if let Some(mqtt) = &app_state.mqtt {
                        if let Err(err) = mqtt.try_subscribe(TOPIC_STATUS_FILTER, QoS::AtMostOnce)
                        {
                            warn!("mqtt subscribe failed: {err}");
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    info!("mqtt disconnected by broker");
                    app_state.link.observe(LinkEvent::Disconnected);
                }
                Ok(_) => {}
                Err(err) => {
                    app_state.link.observe(LinkEvent::Disconnected);
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_millis(reconnect_ms)).await;
                }
            }
        }
    });
}

/// Runs at the data-update cadence: detached temperature drift and
/// connectivity change logging.
fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let config = app_state.panel.lock().await.config().clone();
        let mut interval =
            tokio::time::interval(Duration::from_millis(config.data_update_interval_ms));
        let started = tokio::time::Instant::now();
        let mut last_drift_ms = 0_u64;
        let mut last_check_ms = 0_u64;
        let mut last_connected = false;

        loop {
            interval.tick().await;
            let now_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

            if now_ms.saturating_sub(last_drift_ms) >= config.test_temp_update_ms {
                last_drift_ms = now_ms;
                if app_state.panel.lock().await.simulate_drift() {
                    debug!("detached temperatures updated");
                }
            }

            if app_state.mqtt.is_some()
                && now_ms.saturating_sub(last_check_ms) >= config.connection_check_interval_ms
            {
                last_check_ms = now_ms;
                let connected = app_state.link.is_connected();
                if connected != last_connected {
                    info!("mqtt link {}", if connected { "up" } else { "down" });
                    last_connected = connected;
                }
            }
        }
    });
}

async fn execute_panel_actions(mqtt: Option<&AsyncClient>, actions: Vec<PanelAction>) {
    for action in actions {
        match action {
            PanelAction::Delay(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            PanelAction::Publish(message) => {
                let Some(client) = mqtt else {
                    continue;
                };
                debug!("publish {} = {}", message.topic, message.payload);
                // The request queue is not drained while the broker is down.
                if let Err(err) =
                    client.try_publish(message.topic, QoS::AtMostOnce, false, message.payload)
                {
                    warn!("mqtt publish failed: {err}");
                }
            }
        }
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let outcome = {
        let mut panel = app_state.panel.lock().await;
        panel.apply_status(&topic, &message)
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

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let (mode, unit_count) = {
        let panel = state.panel.lock().await;
        (panel.mode(), panel.registry().len())
    };
    Json(PanelStatus::new(
        mode,
        true,
        state.link.is_connected(),
        unit_count,
    ))
}

async fn handle_get_main_screen(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let page = match params.get("page") {
        None => state.navigation.lock().await.page(),
        Some(value) => match value.parse::<usize>() {
            Ok(page) => page,
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid page value"),
        },
    };

    let connectivity = Connectivity {
        wifi: true,
        mqtt: state.link.is_connected(),
    };
    let screen = {
        let panel = state.panel.lock().await;
        MainScreen::build(&panel, page, connectivity)
    };
    Json(screen).into_response()
}

async fn handle_get_screen(State(state): State<AppState>) -> impl IntoResponse {
    let connectivity = Connectivity {
        wifi: true,
        mqtt: state.link.is_connected(),
    };
    let panel = state.panel.lock().await;
    let navigation = state.navigation.lock().await;
    Json(CurrentScreen::build(&panel, &navigation, connectivity))
}

async fn handle_navigation(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let panel = state.panel.lock().await;
    let unit_count = panel.registry().len();
    let action = match NavigationAction::parse(
        &action,
        params.get("value").map(String::as_str),
        unit_count,
    ) {
        Ok(action) => action,
        Err(err) => return api_error_response(&err),
    };

    let mut navigation = state.navigation.lock().await;
    let changed = action.apply(&mut navigation, unit_count, panel.config().units_per_page);
    Json(NavigationResponse::new(&navigation, changed)).into_response()
}

async fn handle_get_units(State(state): State<AppState>) -> impl IntoResponse {
    let units = state.panel.lock().await.registry().units().to_vec();
    Json(units)
}

async fn handle_get_unit(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> impl IntoResponse {
    let panel = state.panel.lock().await;
    let id = match parse_unit_index(&index, panel.registry().len()) {
        Ok(id) => id,
        Err(err) => return api_error_response(&err),
    };
    match UnitScreen::build(panel.registry(), id) {
        Some(screen) => Json(screen).into_response(),
        None => api_error_response(&ApiError::UnknownUnit),
    }
}

async fn handle_power(
    state: State<AppState>,
    path: Path<String>,
    query: Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_unit_command(state, path, query, "power").await
}

async fn handle_mode(
    state: State<AppState>,
    path: Path<String>,
    query: Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_unit_command(state, path, query, "mode").await
}

async fn handle_fan(
    state: State<AppState>,
    path: Path<String>,
    query: Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_unit_command(state, path, query, "fan").await
}

async fn handle_swing(
    state: State<AppState>,
    path: Path<String>,
    query: Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_unit_command(state, path, query, "swing").await
}

async fn handle_temperature(
    state: State<AppState>,
    path: Path<String>,
    query: Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_unit_command(state, path, query, "temperature").await
}

async fn handle_temperature_up(
    state: State<AppState>,
    path: Path<String>,
    query: Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_unit_command(state, path, query, "temperature/up").await
}

async fn handle_temperature_down(
    state: State<AppState>,
    path: Path<String>,
    query: Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_unit_command(state, path, query, "temperature/down").await
}

async fn handle_unit_command(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    action: &str,
) -> axum::response::Response {
    let parsed = {
        let panel = state.panel.lock().await;
        parse_unit_index(&index, panel.registry().len()).and_then(|id| {
            parse_unit_event(id, action, params.get("value").map(String::as_str))
                .map(|event| (id, event))
        })
    };
    let (id, event) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return api_error_response(&err),
    };

    let outcome = state.panel.lock().await.handle(event);
    if outcome.accepted {
        info!("unit {} {action}: {event:?}", id.0);
    }
    let (accepted, changed) = (outcome.accepted, outcome.changed);
    execute_panel_actions(state.mqtt.as_ref(), outcome.actions).await;

    let screen = {
        let panel = state.panel.lock().await;
        UnitScreen::build(panel.registry(), id)
    };
    match screen {
        Some(unit) => Json(CommandResponse {
            accepted,
            changed,
            unit,
        })
        .into_response(),
        None => api_error_response(&ApiError::UnknownUnit),
    }
}

async fn handle_all_on(State(state): State<AppState>) -> impl IntoResponse {
    set_all_power(state, true).await
}

async fn handle_all_off(State(state): State<AppState>) -> impl IntoResponse {
    set_all_power(state, false).await
}

async fn handle_confirm_all_on() -> impl IntoResponse {
    Json(Confirmation::all_power(true))
}

async fn handle_confirm_all_off() -> impl IntoResponse {
    Json(Confirmation::all_power(false))
}

async fn set_all_power(state: AppState, on: bool) -> axum::response::Response {
    let (outcome, notification_ms) = {
        let mut panel = state.panel.lock().await;
        let outcome = panel.handle(PanelEvent::SetAllPower(on));
        (outcome, panel.config().notification_ms)
    };
    info!("all units switched {}", if on { "on" } else { "off" });

    let response = MasterResponse::new(&outcome, on, notification_ms);
    execute_panel_actions(state.mqtt.as_ref(), outcome.actions).await;
    Json(response).into_response()
}

fn api_error_response(err: &ApiError) -> axum::response::Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
