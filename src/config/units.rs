// Human-readable duration and size values used by process config files

use crate::error::{Result, VigilError};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

const KIB: f64 = 1024.0;

/// Parse a duration such as `"30s"`, `"500ms"`, `"2m"` or `"1h"`.
///
/// A bare number is taken as milliseconds, the unit PM2-style configs use for
/// numeric delay fields.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let (value, unit) = split_number(input)?;

    let millis_per_unit = match unit.to_ascii_lowercase().as_str() {
        "" | "ms" => 1.0,
        "s" | "sec" | "secs" => 1_000.0,
        "m" | "min" | "mins" => 60_000.0,
        "h" | "hr" | "hrs" => 3_600_000.0,
        "d" => 86_400_000.0,
        other => {
            return Err(VigilError::ConfigValidationError(format!(
                "Unknown duration unit '{}' in '{}'",
                other, input
            )))
        }
    };

    Ok(Duration::from_millis((value * millis_per_unit).round() as u64))
}

/// Parse a memory size such as `"200M"`, `"512K"` or `"1G"` into bytes.
///
/// Units are binary (`1K = 1024`). A bare number is taken as bytes.
pub fn parse_size(input: &str) -> Result<u64> {
    let (value, unit) = split_number(input)?;

    let multiplier = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "K" | "KB" => KIB,
        "M" | "MB" => KIB * KIB,
        "G" | "GB" => KIB * KIB * KIB,
        other => {
            return Err(VigilError::ConfigValidationError(format!(
                "Unknown size unit '{}' in '{}'",
                other, input
            )))
        }
    };

    Ok((value * multiplier).round() as u64)
}

fn split_number(input: &str) -> Result<(f64, &str)> {
    let trimmed = input.trim();
    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);

    let value = number.parse::<f64>().map_err(|_| {
        VigilError::ConfigValidationError(format!("Expected a number in '{}'", input))
    })?;

    Ok((value, unit.trim()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

/// Deserialize a duration given either as milliseconds or as a unit string.
pub fn duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(ms) => Ok(Duration::from_millis(ms)),
        NumberOrString::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

pub fn optional_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    duration(deserializer).map(Some)
}

/// Deserialize a memory size given either as bytes or as a unit string.
pub fn optional_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(bytes) => Ok(Some(bytes)),
        NumberOrString::Text(text) => parse_size(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
