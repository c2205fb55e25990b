use anyhow::{Context, Result};
use bmubridge_lib::battery::{BatteryModel, SocEstimator};
use bmubridge_lib::device::DeviceContext;
use bmubridge_lib::router::MessageRouter;
use bmubridge_lib::socketcan::CanBridgePorts;
use log::{error, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::{commandline, mqtt};

/// Periodic snapshot of the bridge internals, reported to the console or an
/// MQTT broker while the bridge runs.
#[derive(Debug, Serialize)]
pub struct BridgeStatus {
    pub timestamp: String,
    pub uptime_seconds: u32,
    pub initialized: bool,
    pub soc1_percent: f32,
    pub soc2_percent: f32,
    pub capacity_ah: f32,
    pub remaining_ah1: f32,
    pub remaining_ah2: f32,
    pub temperature_override_active: bool,
    pub override_frames_remaining: u32,
    pub pending_tx_frames: usize,
}

fn snapshot(ctx: &DeviceContext<BatteryModel>) -> BridgeStatus {
    let router = ctx.router();
    let model = router.estimator();
    let temperature_override = router.diagnostic().temperature_override();
    BridgeStatus {
        timestamp: chrono::Local::now().to_rfc3339(),
        uptime_seconds: router.uptime_seconds(),
        initialized: model.is_initialized(),
        soc1_percent: model.soc1(),
        soc2_percent: model.soc2(),
        capacity_ah: model.capacity(),
        remaining_ah1: model.remaining_ah1(),
        remaining_ah2: model.remaining_ah2(),
        temperature_override_active: temperature_override.is_active(),
        override_frames_remaining: temperature_override.remaining_frames(),
        pending_tx_frames: ctx.pending_tx(),
    }
}

fn publish_simple_format(
    publisher: &mut mqtt::MqttPublisher,
    topic: &str,
    value: &serde_json::Value,
) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, sub_value) in map {
                publish_simple_format(publisher, &format!("{topic}/{key}"), sub_value);
            }
        }
        serde_json::Value::Array(values) => {
            for (i, sub_value) in values.iter().enumerate() {
                publish_simple_format(publisher, &format!("{topic}/{i}"), sub_value);
            }
        }
        serde_json::Value::Null => {
            // Do not publish null values
        }
        serde_json::Value::String(s) => {
            if let Err(e) = publisher.publish(topic, s) {
                error!("Failed to publish message to topic {topic}: {e}");
            }
        }
        other => {
            if let Err(e) = publisher.publish(topic, &other.to_string()) {
                error!("Failed to publish message to topic {topic}: {e}");
            }
        }
    }
}

fn report_status(
    status: &BridgeStatus,
    output: &commandline::RunOutput,
    publisher: Option<&mut mqtt::MqttPublisher>,
) {
    match output {
        commandline::RunOutput::Console => {
            println!("--- Bridge status at {} ---", status.timestamp);
            println!("{status:?}");
        }
        commandline::RunOutput::Mqtt { format, .. } => {
            let Some(publisher) = publisher else {
                warn!("MQTT output selected, but publisher is not initialized. Skipping publish.");
                return;
            };
            let value = match serde_json::to_value(status) {
                Ok(value) => value,
                Err(e) => {
                    error!("Failed to serialize bridge status: {e}");
                    return;
                }
            };
            match format {
                commandline::MqttFormat::Json => match serde_json::to_string(&value) {
                    Ok(payload) => {
                        let topic = publisher.topic().to_string();
                        if let Err(e) = publisher.publish(&topic, &payload) {
                            error!("Failed to publish status to MQTT: {e:?}");
                        }
                    }
                    Err(e) => error!("Failed to serialize status to JSON string: {e}"),
                },
                commandline::MqttFormat::Simple => {
                    let base_topic = publisher.topic().to_string();
                    publish_simple_format(publisher, &base_topic, &value);
                }
            }
        }
    }
}

/// Run the bridge until interrupted.
///
/// One loop iteration ingests pending frames from both interfaces (the
/// receive-interrupt stage, drop-on-full), routes them, drains the transmit
/// queue as far as the sockets accept frames, and advances the heartbeat
/// clock. The status report rides on top at its own interval.
pub fn run(
    can_a: &str,
    can_b: &str,
    capacity_ah: f32,
    interval: Duration,
    output: commandline::RunOutput,
) -> Result<()> {
    info!(
        "Starting bridge: {can_a} <-> {can_b}, capacity={capacity_ah} Ah, status every {interval:?}"
    );

    let mut ports = CanBridgePorts::open(can_a, can_b)
        .with_context(|| format!("Cannot open CAN interfaces '{can_a}' and '{can_b}'"))?;
    let mut ctx = DeviceContext::new(MessageRouter::new(BatteryModel::new(capacity_ah)));

    let mut publisher = match &output {
        commandline::RunOutput::Mqtt { config_file, .. } => {
            let config = mqtt::MqttConfig::load(config_file)
                .with_context(|| format!("Failed to open MQTT config file at '{config_file}'"))?;
            info!("Successfully loaded MQTT config from {config_file}: {config:?}");
            Some(
                mqtt::MqttPublisher::new(config)
                    .with_context(|| "Failed to create MQTT publisher")?,
            )
        }
        commandline::RunOutput::Console => None,
    };

    let started = Instant::now();
    let mut last_status = Instant::now();

    loop {
        loop {
            match ports.try_receive() {
                Ok(Some(frame)) => {
                    if !ctx.frame_received(frame) {
                        warn!("receive queue full, frame {:#05x} dropped", frame.id);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("CAN receive error: {e}");
                    break;
                }
            }
        }

        ctx.process_rx();
        ctx.process_tx(&mut ports);
        ctx.process_tick(started.elapsed().as_millis() as u32);

        if last_status.elapsed() >= interval {
            last_status = Instant::now();
            report_status(&snapshot(&ctx), &output, publisher.as_mut());
        }

        std::thread::sleep(Duration::from_millis(1));
    }
}
