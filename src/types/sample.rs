use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::IngestError;

/// 设备上报的三轴原始读数（已完成数值校验）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
}

impl Reading {
    pub fn new(ax: f64, ay: f64, az: f64) -> Self {
        Self { ax, ay, az }
    }

    /// Parses a raw JSON payload. Missing axes default to 0; numeric strings are accepted.
    pub fn from_value(value: &Value) -> Result<Self, IngestError> {
        let object = value
            .as_object()
            .ok_or_else(|| IngestError::Invalid("payload must be a JSON object".to_string()))?;

        let axis = |name: &str| -> Result<f64, IngestError> {
            match object.get(name) {
                None => Ok(0.0),
                Some(field) => parse_axis(name, field),
            }
        };

        let reading = Self {
            ax: axis("ax")?,
            ay: axis("ay")?,
            az: axis("az")?,
        };

        // 三轴都有限但模长仍可能溢出（如 1e308 量级）
        if !reading.magnitude().is_finite() {
            return Err(IngestError::Invalid("magnitude overflows".to_string()));
        }
        Ok(reading)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, IngestError> {
        let payload_str = std::str::from_utf8(payload)
            .map_err(|e| IngestError::Invalid(format!("Invalid UTF-8: {}", e)))?;

        let value: Value = serde_json::from_str(payload_str)
            .map_err(|e| IngestError::Invalid(format!("JSON parsing error: {}", e)))?;

        Self::from_value(&value)
    }

    pub fn magnitude(&self) -> f64 {
        self.ax.hypot(self.ay).hypot(self.az)
    }
}

fn parse_axis(name: &str, field: &Value) -> Result<f64, IngestError> {
    let parsed = match field {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(IngestError::Invalid(format!("field '{}' is not a finite number: {}", name, field))),
    }
}

/// 一条已接收的样本。magnitude 只在构造时由三轴计算，时间戳截断到微秒以便与数据库中的文本一致
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    ax: f64,
    ay: f64,
    az: f64,
    magnitude: f64,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(reading: Reading, timestamp: DateTime<Utc>) -> Self {
        Self {
            ax: reading.ax,
            ay: reading.ay,
            az: reading.az,
            magnitude: reading.magnitude(),
            timestamp: timestamp.trunc_subsecs(6),
        }
    }

    pub fn ax(&self) -> f64 {
        self.ax
    }

    pub fn ay(&self) -> f64 {
        self.ay
    }

    pub fn az(&self) -> f64 {
        self.az
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// RFC 3339, UTC, always six fractional digits. Used for the table, CSV and JSON alike.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_timestamp<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(*timestamp))
}

/// A persisted sample plus the sequence id assigned by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreRecord {
    pub id: i64,
    pub sample: Sample,
}

/// Payload pushed to live subscribers: the sample fields plus its alert flag.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleUpdate {
    #[serde(flatten)]
    pub sample: Sample,
    pub alert: bool,
}
