//! Resource quantity parsing
//!
//! Converts the quantity strings applied on the cluster into numeric
//! values: cpu in cores, memory in bytes.

use crate::error::EngineError;
use crate::models::MetricKind;

/// Parse a cpu quantity. Accepts plain core counts ("0.5") and the
/// milli-core suffix ("150m").
pub fn parse_cpu(raw: &str) -> Result<f64, EngineError> {
    if let Ok(value) = raw.parse::<f64>() {
        return Ok(value);
    }
    if let Some(millis) = raw.strip_suffix('m') {
        if let Ok(value) = millis.parse::<f64>() {
            return Ok(value / 1000.0);
        }
    }
    Err(EngineError::UnparseableQuantity {
        kind: "cpu",
        value: raw.to_string(),
    })
}

/// Parse a memory quantity into bytes. Accepts plain byte counts and the
/// decimal (K, M, G, T, P, E) and binary (Ki, Mi, Gi, Ti, Pi, Ei)
/// capacity suffixes.
pub fn parse_memory(raw: &str) -> Result<f64, EngineError> {
    if let Ok(value) = raw.parse::<f64>() {
        return Ok(value);
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let multiplier = match suffix {
        "K" => 1000f64,
        "M" => 1000f64.powi(2),
        "G" => 1000f64.powi(3),
        "T" => 1000f64.powi(4),
        "P" => 1000f64.powi(5),
        "E" => 1000f64.powi(6),
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        _ => {
            return Err(EngineError::UnparseableQuantity {
                kind: "memory",
                value: raw.to_string(),
            })
        }
    };

    number
        .parse::<f64>()
        .map(|value| value * multiplier)
        .map_err(|_| EngineError::UnparseableQuantity {
            kind: "memory",
            value: raw.to_string(),
        })
}

/// Parse a quantity for the given metric.
pub fn parse_quantity(metric: MetricKind, raw: &str) -> Result<f64, EngineError> {
    match metric {
        MetricKind::Cpu => parse_cpu(raw),
        MetricKind::Memory => parse_memory(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_cores_and_millicores() {
        assert_eq!(parse_cpu("0.5").unwrap(), 0.5);
        assert_eq!(parse_cpu("2").unwrap(), 2.0);
        assert!((parse_cpu("150m").unwrap() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_parse_cpu_rejects_garbage() {
        assert!(parse_cpu("fast").is_err());
        assert!(parse_cpu("m").is_err());
    }

    #[test]
    fn test_parse_memory_plain_bytes() {
        assert_eq!(parse_memory("1048576").unwrap(), 1_048_576.0);
    }

    #[test]
    fn test_parse_memory_suffixes() {
        assert_eq!(parse_memory("1K").unwrap(), 1000.0);
        assert_eq!(parse_memory("1Ki").unwrap(), 1024.0);
        assert_eq!(parse_memory("128Mi").unwrap(), 128.0 * 1024.0 * 1024.0);
        assert_eq!(parse_memory("2G").unwrap(), 2e9);
        assert_eq!(parse_memory("1.5Gi").unwrap(), 1.5 * 1024f64.powi(3));
    }

    #[test]
    fn test_parse_memory_rejects_unknown_suffix() {
        assert!(parse_memory("10Xi").is_err());
        assert!(parse_memory("Gi").is_err());
        assert!(parse_memory("lots").is_err());
    }
}
