use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use airco_common::{status_message, RuntimeConfig, UnitId, UnitRegistry, TOPIC_COMMAND_FILTER};

use crate::bridge::{apply_command, drift_temperatures};

const STATUS_INTERVAL_SECS: u64 = 15;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();
    let registry = UnitRegistry::from_config(&runtime.units).context("invalid unit configuration")?;

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("airco-simulator", mqtt_host, mqtt_port);
    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 64);
    let registry = Arc::new(Mutex::new(registry));

    {
        let mqtt = mqtt.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("simulator connected to broker");
                        if let Err(err) = mqtt.try_subscribe(TOPIC_COMMAND_FILTER, QoS::AtMostOnce)
                        {
                            warn!("simulator subscribe failed: {err}");
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        let Ok(payload) = std::str::from_utf8(&message.payload) else {
                            warn!("non utf8 payload on {}", message.topic);
                            continue;
                        };
                        let result = {
                            let mut registry = registry.lock().await;
                            apply_command(&mut registry, &message.topic, payload)
                        };
                        match result {
                            Ok(id) => {
                                info!("{} <- {payload}", message.topic);
                                queue_status(&mqtt, &registry, id).await;
                            }
                            Err(err) => warn!("command dropped: {err}"),
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("simulator mqtt poll error: {err}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    info!("bridge simulator started");

    let mut interval = tokio::time::interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    loop {
        interval.tick().await;

        let messages = {
            let mut registry = registry.lock().await;
            drift_temperatures(&mut registry);
            registry
                .units()
                .iter()
                .map(status_message)
                .collect::<Result<Vec<_>, _>>()
                .context("failed to encode unit status")?
        };

        for message in messages {
            mqtt.publish(message.topic, QoS::AtMostOnce, true, message.payload)
                .await
                .context("failed to publish unit status")?;
        }
        debug!("periodic status published");
    }
}

/// Publishes from inside the event loop task, so it must not wait on the request queue.
async fn queue_status(mqtt: &AsyncClient, registry: &Mutex<UnitRegistry>, id: UnitId) {
    let message = {
        let registry = registry.lock().await;
        registry.get(id).map(status_message)
    };

    match message {
        Some(Ok(message)) => {
            if let Err(err) =
                mqtt.try_publish(message.topic, QoS::AtMostOnce, true, message.payload)
            {
                warn!("status publish failed: {err}");
            }
        }
        Some(Err(err)) => warn!("status encoding failed: {err}"),
        None => {}
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
