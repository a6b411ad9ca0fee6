use rumqttc::mqttbytes::{valid_filter, valid_topic};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置管理模块
/// 集中管理所有配置项，提供默认值和配置验证

pub const CONFIG_ENV_VAR: &str = "IMU_HUB_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "imu_hub.toml";

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub query: QueryConfig,
    pub broadcast: BroadcastConfig,
    pub mqtt: MqttConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub auto_create_dir: bool,
    pub task_channel_capacity: usize,
}

/// 接收管线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub min_interval_ms: u64,
    pub alert_threshold: f64,
    pub warm_cache_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub subscriber_buffer: usize,
}

/// MQTT配置，账号密码只从环境变量读取
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub ack_topic: String,
    pub status_topic: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    #[serde(skip)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/imu_data.db".to_string(),
            auto_create_dir: true,
            task_channel_capacity: 256,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            alert_threshold: 15.0,
            warm_cache_on_start: true,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { history_limit: 500 }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { subscriber_buffer: 64 }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "imu-hub".to_string(),
            topic: "imu".to_string(),
            ack_topic: "imu/ack".to_string(),
            status_topic: "imu/status".to_string(),
            keep_alive_secs: 5,
            reconnect_delay_ms: 2000,
            username: None,
            password: None,
        }
    }
}

impl IngestConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl AppConfig {
    /// 按顺序解析配置来源：IMU_HUB_CONFIG 指定的文件 > 当前目录的 imu_hub.toml > 默认值，最后叠加环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::load_from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load_from_file(DEFAULT_CONFIG_FILE)?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_port("PORT", &port)?;
        }
        if let Some(path) = lookup("IMU_DB_PATH") {
            self.database.path = path;
        }
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.broker = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = parse_port("MQTT_PORT", &port)?;
        }
        self.mqtt.username = lookup("MQTT_USER").or(self.mqtt.username.take());
        self.mqtt.password = lookup("MQTT_PASS").or(self.mqtt.password.take());

        Ok(())
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError("Server port must be positive".to_string()));
        }

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::ValidationError("Database path must not be empty".to_string()));
        }

        if self.database.task_channel_capacity == 0 {
            return Err(ConfigError::ValidationError("Database task channel capacity must be positive".to_string()));
        }

        let threshold = self.ingest.alert_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::ValidationError("Alert threshold must be a non-negative number".to_string()));
        }

        if self.query.history_limit == 0 {
            return Err(ConfigError::ValidationError("History limit must be positive".to_string()));
        }

        if self.broadcast.subscriber_buffer == 0 {
            return Err(ConfigError::ValidationError("Subscriber buffer must be positive".to_string()));
        }

        if self.mqtt.enabled {
            if self.mqtt.topic.trim().is_empty() {
                return Err(ConfigError::ValidationError("MQTT topic must not be empty".to_string()));
            }
            if !valid_filter(&self.mqtt.topic) {
                return Err(ConfigError::ValidationError(format!(
                    "MQTT topic '{}' is not a valid subscription filter",
                    self.mqtt.topic
                )));
            }
            // 发布用的主题不能带通配符
            for (key, topic) in [("ack_topic", &self.mqtt.ack_topic), ("status_topic", &self.mqtt.status_topic)] {
                if !topic.is_empty() && !valid_topic(topic) {
                    return Err(ConfigError::ValidationError(format!(
                        "MQTT {} '{}' must be a plain topic without wildcards",
                        key, topic
                    )));
                }
            }
            if self.mqtt.reconnect_delay_ms == 0 {
                return Err(ConfigError::ValidationError("MQTT reconnect delay must be positive".to_string()));
            }
        }

        Ok(())
    }

    /// 获取数据库文件路径
    pub fn get_database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::ValidationError(format!("{} is not a valid port ({}): {}", key, value, e)))
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
