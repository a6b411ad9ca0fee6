use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use rumqttc::mqttbytes::matches;
use rumqttc::{Client, Event, LastWill, MqttOptions, Packet, QoS};
use serde_json::json;

use crate::config::MqttConfig;
use crate::ingest::IngestPipeline;
use crate::types::ack_for;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// 重连等待时间：每次失败乘 1.5，上限 30 秒，连上后复位
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(base: Duration) -> Self {
        let base = base.min(MAX_RECONNECT_DELAY);
        Self { base, current: base }
    }

    /// Delay before the next attempt; grows the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(1.5).min(MAX_RECONNECT_DELAY);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// 设备上报主题可以带通配符（如 `imu/+`）
pub fn is_reading_topic(filter: &str, topic: &str) -> bool {
    matches(topic, filter)
}

/// 订阅设备上报主题，把每条消息送进接收管线；确认消息尽力发布到 ack_topic，从不阻塞。
/// 连接出错时按退避时间重试，直到收到关闭信号。
pub fn run_mqtt_client(
    config: MqttConfig,
    pipeline: Arc<IngestPipeline>,
    shutdown_signal: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqtt_options = MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

    if let (Some(user), Some(pass)) = (config.username.clone(), config.password.clone()) {
        mqtt_options.set_credentials(user, pass);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    if !config.status_topic.is_empty() {
        mqtt_options.set_last_will(LastWill::new(
            config.status_topic.clone(),
            json!({ "status": "offline" }).to_string(),
            QoS::AtLeastOnce,
            true,
        ));
    }

    let (client, mut connection) = Client::new(mqtt_options, 10);
    let mut backoff = ReconnectBackoff::new(Duration::from_millis(config.reconnect_delay_ms));
    info!("MQTT client connecting to {}:{}", config.broker, config.port);

    for event in connection.iter() {
        // 检查关闭信号
        if shutdown_signal.load(Ordering::Relaxed) {
            info!("MQTT thread received shutdown signal, exiting gracefully");
            break;
        }

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                // 默认 clean session，每次重连都要重新订阅
                if let Err(e) = client.try_subscribe(config.topic.clone(), QoS::AtLeastOnce) {
                    warn!("MQTT subscribe to '{}' failed: {}", config.topic, e);
                } else {
                    info!("MQTT connected, subscribed to '{}'", config.topic);
                }
                send_status(&client, &config.status_topic, "online");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) if is_reading_topic(&config.topic, &publish.topic) => {
                let result = pipeline.accept_bytes(&publish.payload, Utc::now());
                send_ack(&client, &config.ack_topic, &ack_for(&result).to_string());
            }
            Ok(_) => {}
            Err(e) => {
                let delay = backoff.next_delay();
                error!("MQTT connection error: {}, retrying in {:.1}s", e, delay.as_secs_f64());
                if !sleep_unless_shutdown(delay, &shutdown_signal) {
                    info!("MQTT thread received shutdown signal while reconnecting");
                    break;
                }
            }
        }
    }

    if let Err(e) = client.disconnect() {
        warn!("MQTT disconnect failed: {}", e);
    }
    Ok(())
}

/// Returns false as soon as shutdown is signalled.
fn sleep_unless_shutdown(delay: Duration, shutdown_signal: &AtomicBool) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if shutdown_signal.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(SHUTDOWN_POLL);
        thread::sleep(step);
        remaining -= step;
    }
    !shutdown_signal.load(Ordering::Relaxed)
}

fn send_status(client: &Client, status_topic: &str, status: &str) {
    if status_topic.is_empty() {
        return;
    }
    let payload = json!({ "status": status }).to_string();
    if let Err(e) = client.try_publish(status_topic, QoS::AtLeastOnce, true, payload.into_bytes()) {
        warn!("Dropping MQTT status update: {}", e);
    }
}

fn send_ack(client: &Client, ack_topic: &str, ack: &str) {
    if ack_topic.is_empty() {
        return;
    }
    // 请求队列满时直接丢弃，避免阻塞事件循环
    if let Err(e) = client.try_publish(ack_topic, QoS::AtMostOnce, false, ack.as_bytes().to_vec()) {
        warn!("Dropping MQTT ack: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_caps_and_resets() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4500));

        for _ in 0..20 {
            assert!(backoff.next_delay() <= MAX_RECONNECT_DELAY);
        }
        assert_eq!(backoff.next_delay(), MAX_RECONNECT_DELAY);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn wildcard_filters_match_device_topics() {
        assert!(is_reading_topic("imu", "imu"));
        assert!(!is_reading_topic("imu", "imu/ack"));

        assert!(is_reading_topic("imu/+", "imu/device-1"));
        assert!(!is_reading_topic("imu/+", "imu/device-1/raw"));
        assert!(is_reading_topic("imu/#", "imu/device-1/raw"));
        assert!(!is_reading_topic("imu/+", "other/device-1"));
    }

    #[test]
    fn shutdown_cuts_reconnect_wait_short() {
        let shutdown = AtomicBool::new(true);
        let started = std::time::Instant::now();
        assert!(!sleep_unless_shutdown(Duration::from_secs(30), &shutdown));
        assert!(started.elapsed() < Duration::from_secs(1));

        let running = AtomicBool::new(false);
        assert!(sleep_unless_shutdown(Duration::from_millis(10), &running));
    }
}
