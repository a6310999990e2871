//! Kubernetes quantity conversion
//!
//! The metrics API reports container usage as quantity strings such as
//! `"250m"`, `"128Mi"` or `"500000000n"`. These helpers turn them into
//! millicores and bytes:
//! - binary suffixes `Ki`, `Mi`, `Gi` scale by powers of 1024
//! - decimal sub-unit suffixes `n`, `u`, `m` scale by 1e-9, 1e-6, 1e-3
//! - no suffix means a plain number in the base unit
//!
//! Memory quantities below one byte truncate toward zero, so `"2u"` is 0
//! bytes and `"1500m"` is 1 byte. CPU quantities round to the nearest
//! millicore with halves going up, so `"1.5m"` is 2 and `"0.4m"` is 0.

use crate::error::{LoadTestError, Result};

const KI: f64 = 1024.0;
const MI: f64 = KI * 1024.0;
const GI: f64 = MI * 1024.0;

/// Parse a memory quantity into bytes
pub fn parse_memory(quantity: &str) -> Result<u64> {
    let quantity = quantity.trim();

    // (mantissa, multiplier, divisor)
    let (mantissa, mul, div) = if let Some(v) = quantity.strip_suffix("Ki") {
        (v, KI, 1.0)
    } else if let Some(v) = quantity.strip_suffix("Mi") {
        (v, MI, 1.0)
    } else if let Some(v) = quantity.strip_suffix("Gi") {
        (v, GI, 1.0)
    } else if let Some(v) = quantity.strip_suffix('n') {
        (v, 1.0, 1e9)
    } else if let Some(v) = quantity.strip_suffix('u') {
        (v, 1.0, 1e6)
    } else if let Some(v) = quantity.strip_suffix('m') {
        (v, 1.0, 1e3)
    } else {
        (quantity, 1.0, 1.0)
    };

    let value = parse_mantissa(quantity, mantissa)?;
    Ok((value * mul / div).floor() as u64)
}

/// Parse a CPU quantity into millicores
pub fn parse_cpu(quantity: &str) -> Result<u64> {
    let quantity = quantity.trim();

    let millicores = if let Some(v) = quantity.strip_suffix('n') {
        parse_mantissa(quantity, v)? / 1e6
    } else if let Some(v) = quantity.strip_suffix('u') {
        parse_mantissa(quantity, v)? / 1e3
    } else if let Some(v) = quantity.strip_suffix('m') {
        parse_mantissa(quantity, v)?
    } else {
        parse_mantissa(quantity, quantity)? * 1000.0
    };

    Ok(millicores.round() as u64)
}

/// Convert bytes to mebibytes for trend reporting
pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / MI
}

fn parse_mantissa(quantity: &str, mantissa: &str) -> Result<f64> {
    let value: f64 = mantissa
        .parse()
        .map_err(|_| LoadTestError::InvalidQuantity(quantity.to_string()))?;

    if !value.is_finite() || value < 0.0 {
        return Err(LoadTestError::InvalidQuantity(quantity.to_string()));
    }

    Ok(value)
}
