//! CSV bar loading for `exitlab replay`.
//!
//! Columns: `timestamp,open,high,low,close`. Timestamps are either
//! `%Y-%m-%d %H:%M:%S` or a bare `%Y-%m-%d` (midnight).

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use exitlab_core::Bar;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("unrecognized timestamp {s:?}"))?;
    date.and_hms_opt(0, 0, 0)
        .with_context(|| format!("invalid midnight for {date}"))
}

pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open bar file {}", path.display()))?;
    read_bars(file).with_context(|| format!("failed to read bars from {}", path.display()))
}

/// Parse bars from CSV, rejecting unsorted timestamps and malformed candles.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars: Vec<Bar> = Vec::new();
    for (i, row) in rdr.deserialize::<BarRow>().enumerate() {
        let line = i + 2;
        let row = row.with_context(|| format!("line {line}"))?;
        let timestamp = parse_timestamp(&row.timestamp).with_context(|| format!("line {line}"))?;
        let bar = Bar::new(timestamp, row.open, row.high, row.low, row.close);
        if !bar.is_sane() {
            bail!(
                "line {line}: malformed bar o={} h={} l={} c={}",
                bar.open,
                bar.high,
                bar.low,
                bar.close
            );
        }
        if let Some(prev) = bars.last() {
            if bar.timestamp <= prev.timestamp {
                bail!("line {line}: timestamp {} is not after {}", bar.timestamp, prev.timestamp);
            }
        }
        bars.push(bar);
    }
    Ok(bars)
}
