//! Boundary parsing of loosely-shaped backend payloads.
//!
//! The upstream API is inconsistent about field names (`doorNum` vs
//! `nodeId`) and sometimes encodes numbers as strings. Parsing here is
//! explicit and fallible: an entry produces a typed value or a
//! [`EngineError::MalformedPayload`], never a silently zero-substituted
//! record. Batch parsers drop the malformed entry and keep the rest.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use crate::classify::Severity;
use crate::config::ThresholdProfile;
use crate::error::{EngineError, EngineResult};
use crate::registry::{Gateway, Node};
use crate::sources::Baseline;
use crate::{AlertLogEntry, EnvSample, LivenessRecord, Sample};

/// First matching field among the known spellings.
fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| value.get(name))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim() {
            "true" | "1" | "Y" | "y" => Some(true),
            "false" | "0" | "N" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// RFC 3339 strings or epoch numbers (milliseconds when the magnitude says
/// so, seconds otherwise).
fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => {
            let epoch = n.as_i64()?;
            if epoch.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(epoch).single()
            } else {
                Utc.timestamp_opt(epoch, 0).single()
            }
        }
        _ => None,
    }
}

fn as_severity(value: &Value) -> Option<Severity> {
    let text = value.as_str()?;
    match text.to_ascii_lowercase().as_str() {
        "normal" => Some(Severity::Normal),
        "caution" => Some(Severity::Caution),
        "warning" => Some(Severity::Warning),
        "danger" => Some(Severity::Danger),
        _ => None,
    }
}

fn identity(raw: &Value, context: &str) -> EngineResult<u32> {
    field(raw, &["doorNum", "door_num", "nodeId", "node_id"])
        .and_then(as_u32)
        .ok_or_else(|| EngineError::MalformedPayload(format!("{context} without node identity")))
}

pub fn parse_sample(raw: &Value) -> EngineResult<Sample> {
    let door_num = identity(raw, "sample")?;

    let timestamp = field(raw, &["timestamp", "time", "measuredAt", "measured_at"])
        .and_then(as_timestamp)
        .ok_or_else(|| {
            EngineError::MalformedPayload(format!("sample for node {door_num} without timestamp"))
        })?;

    let axis_x = field(raw, &["axisX", "axis_x", "angleX", "angle_x"])
        .and_then(as_f64)
        .ok_or_else(|| {
            EngineError::MalformedPayload(format!("sample for node {door_num} without axis_x"))
        })?;

    let axis_y = field(raw, &["axisY", "axis_y", "angleY", "angle_y"])
        .and_then(as_f64)
        .ok_or_else(|| {
            EngineError::MalformedPayload(format!("sample for node {door_num} without axis_y"))
        })?;

    Ok(Sample {
        door_num,
        timestamp,
        axis_x,
        axis_y,
    })
}

pub fn parse_samples(values: &[Value]) -> Vec<Sample> {
    values
        .iter()
        .filter_map(|raw| match parse_sample(raw) {
            Ok(sample) => Some(sample),
            Err(e) => {
                debug!("dropping sample: {e}");
                None
            }
        })
        .collect()
}

pub fn parse_liveness_record(raw: &Value) -> EngineResult<LivenessRecord> {
    let door_num = identity(raw, "liveness record")?;

    let alive = field(raw, &["alive", "isAlive", "is_alive"])
        .and_then(as_bool)
        .unwrap_or(false);
    let recording = field(raw, &["recording", "isRecording", "is_recording"])
        .and_then(as_bool)
        .unwrap_or(false);
    let last_seen = field(raw, &["lastSeen", "last_seen"]).and_then(as_timestamp);

    Ok(LivenessRecord {
        door_num,
        alive,
        recording,
        last_seen,
    })
}

pub fn parse_liveness(values: &[Value]) -> Vec<LivenessRecord> {
    values
        .iter()
        .filter_map(|raw| match parse_liveness_record(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("dropping liveness record: {e}");
                None
            }
        })
        .collect()
}

pub fn parse_alert(raw: &Value) -> EngineResult<AlertLogEntry> {
    let door_num = identity(raw, "alert entry")?;

    let timestamp = field(raw, &["timestamp", "time", "occurredAt", "occurred_at"])
        .and_then(as_timestamp)
        .ok_or_else(|| {
            EngineError::MalformedPayload(format!("alert for node {door_num} without timestamp"))
        })?;

    let severity = field(raw, &["severity", "level"])
        .and_then(as_severity)
        .ok_or_else(|| {
            EngineError::MalformedPayload(format!("alert for node {door_num} without severity"))
        })?;

    let metric = field(raw, &["metric", "metricName", "metric_name"])
        .and_then(Value::as_str)
        .unwrap_or("axis_x")
        .to_string();
    let value = field(raw, &["value", "reading"]).and_then(as_f64).ok_or_else(|| {
        EngineError::MalformedPayload(format!("alert for node {door_num} without value"))
    })?;
    let threshold = field(raw, &["threshold", "limit"])
        .and_then(as_f64)
        .ok_or_else(|| {
            EngineError::MalformedPayload(format!("alert for node {door_num} without threshold"))
        })?;

    Ok(AlertLogEntry {
        timestamp,
        door_num,
        metric,
        value,
        threshold,
        severity,
    })
}

pub fn parse_alerts(values: &[Value]) -> Vec<AlertLogEntry> {
    values
        .iter()
        .filter_map(|raw| match parse_alert(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("dropping alert entry: {e}");
                None
            }
        })
        .collect()
}

/// Baseline nodes may predate any measurement, so missing axis readings
/// default to zero here (unlike stream samples, which must carry them).
pub fn parse_node(raw: &Value) -> EngineResult<Node> {
    let door_num = identity(raw, "node")?;

    let axis_x = field(raw, &["axisX", "axis_x", "angleX", "angle_x"])
        .and_then(as_f64)
        .unwrap_or(0.0);
    let axis_y = field(raw, &["axisY", "axis_y", "angleY", "angle_y"])
        .and_then(as_f64)
        .unwrap_or(0.0);
    let position = field(raw, &["position", "label"])
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let gateway_id = field(raw, &["gatewayId", "gateway_id", "serialNumber"])
        .and_then(Value::as_str)
        .map(String::from);
    let last_updated_at = field(raw, &["lastUpdatedAt", "last_updated_at"]).and_then(as_timestamp);

    Ok(Node {
        door_num,
        axis_x,
        axis_y,
        position,
        gateway_id,
        online: false,
        recording: false,
        last_updated_at,
    })
}

pub fn parse_gateway(raw: &Value) -> EngineResult<Gateway> {
    let serial_number = field(raw, &["serialNumber", "serial_number", "serial"])
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::MalformedPayload("gateway without serial number".to_string()))?
        .to_string();

    let zone_label = field(raw, &["zoneLabel", "zone_label", "zone"])
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let alive = field(raw, &["alive", "isAlive", "is_alive"])
        .and_then(as_bool)
        .unwrap_or(false);

    Ok(Gateway {
        serial_number,
        zone_label,
        alive,
        members: Default::default(),
    })
}

pub fn parse_baseline(raw: &Value) -> EngineResult<Baseline> {
    let nodes = raw
        .get("nodes")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| match parse_node(v) {
                    Ok(node) => Some(node),
                    Err(e) => {
                        debug!("dropping baseline node: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let gateways = raw
        .get("gateways")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| match parse_gateway(v) {
                    Ok(gateway) => Some(gateway),
                    Err(e) => {
                        debug!("dropping baseline gateway: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let thresholds = raw
        .get("thresholds")
        .ok_or_else(|| EngineError::MalformedPayload("baseline without thresholds".to_string()))?;
    let caution = field(thresholds, &["caution"]).and_then(as_f64);
    let warning = field(thresholds, &["warning"]).and_then(as_f64);
    let danger = field(thresholds, &["danger"]).and_then(as_f64);
    let (Some(caution), Some(warning), Some(danger)) = (caution, warning, danger) else {
        return Err(EngineError::MalformedPayload(
            "baseline thresholds missing a breakpoint".to_string(),
        ));
    };
    let thresholds = ThresholdProfile::new(caution, warning, danger)?;

    Ok(Baseline {
        nodes,
        gateways,
        thresholds,
    })
}

pub fn parse_env(raw: &Value) -> EngineResult<EnvSample> {
    let wind_speed = field(raw, &["windSpeed", "wind_speed", "wind"])
        .and_then(as_f64)
        .ok_or_else(|| {
            EngineError::MalformedPayload("environment payload without wind speed".to_string())
        })?;
    let timestamp = field(raw, &["timestamp", "time", "measuredAt"])
        .and_then(as_timestamp)
        .unwrap_or_else(Utc::now);

    Ok(EnvSample {
        timestamp,
        wind_speed,
    })
}
