use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Accepts `500ms`, `10s`, `2m`, `1h`, or a bare number of seconds.
pub fn parse_duration_token(token: &str) -> Result<chrono::Duration> {
    let token = token.trim();
    let (raw, unit): (&str, fn(i64) -> chrono::Duration) =
        if let Some(raw) = token.strip_suffix("ms") {
            (raw, chrono::Duration::milliseconds)
        } else if let Some(raw) = token.strip_suffix('s') {
            (raw, chrono::Duration::seconds)
        } else if let Some(raw) = token.strip_suffix('m') {
            (raw, chrono::Duration::minutes)
        } else if let Some(raw) = token.strip_suffix('h') {
            (raw, chrono::Duration::hours)
        } else {
            (token, chrono::Duration::seconds)
        };

    let value: i64 = raw
        .parse()
        .map_err(|_| anyhow!("invalid duration '{token}'"))?;
    if value <= 0 {
        bail!("duration must be > 0");
    }
    Ok(unit(value))
}

pub fn parse_local_datetime(input: &str) -> Result<NaiveDateTime> {
    let input = input.trim();
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M"))
        .map_err(|_| anyhow!("invalid datetime '{input}'"))
}

/// Splits `H:M` into signed parts without range checks; the alarm model
/// wraps each field on its own.
pub fn parse_hour_minute(input: &str) -> Result<(i64, i64)> {
    let input = input.trim();
    let (hour, minute) = input
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid alarm time '{input}', expected HH:MM"))?;
    let hour = hour
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid hour in '{input}'"))?;
    let minute = minute
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid minute in '{input}'"))?;
    Ok((hour, minute))
}

pub fn resolve_local(naive: NaiveDateTime) -> Result<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("local time {naive} does not exist in this time zone"))
}
