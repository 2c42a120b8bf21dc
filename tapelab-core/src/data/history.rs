//! Historical CSV loading with gap repair.
//!
//! Columns are positional after header detection: timestamp, open, high,
//! low, close, volume. Timestamps may be epoch seconds or RFC3339 /
//! `YYYY-mm-dd HH:MM:SS` strings, interpreted as UTC. The series is
//! reindexed to the timeframe grid; missing bars are synthesized from the
//! previous close with zero volume, and the load is rejected outright when
//! the gap fraction exceeds the configured percentage.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use polars::prelude::*;
use thiserror::Error;
use tracing::warn;

use crate::domain::{Bar, Timeframe};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(String),
    #[error("csv read failed: {0}")]
    Csv(String),
    #[error("bad schema: {0}")]
    Schema(String),
    #[error("unparseable timestamp '{0}'")]
    Timestamp(String),
    #[error("gap fraction {got:.1}% exceeds limit {max:.1}%")]
    ExcessiveGaps { got: f64, max: f64 },
    #[error("no usable rows")]
    Empty,
}

/// Load a UTC OHLCV history from `path`, reindexed to `timeframe`'s grid.
pub fn load_history(
    path: &Path,
    timeframe: Timeframe,
    gap_repair_max_perc: f64,
) -> Result<Vec<Bar>, HistoryError> {
    let has_header = detect_header(path)?;
    let df = LazyCsvReader::new(path)
        .with_has_header(has_header)
        .with_infer_schema_length(Some(200))
        .finish()
        .map_err(|e| HistoryError::Csv(e.to_string()))?
        .collect()
        .map_err(|e| HistoryError::Csv(e.to_string()))?;

    if df.width() < 5 {
        return Err(HistoryError::Schema(format!(
            "expected >= 5 columns (timestamp, o, h, l, c[, v]), got {}",
            df.width()
        )));
    }

    let columns = df.get_columns();
    let n = df.height();
    let timestamps = parse_timestamps(&columns[0])?;
    let open = numeric_column(&columns[1], "open")?;
    let high = numeric_column(&columns[2], "high")?;
    let low = numeric_column(&columns[3], "low")?;
    let close = numeric_column(&columns[4], "close")?;
    let volume = if df.width() >= 6 {
        numeric_column(&columns[5], "volume")?
    } else {
        vec![0.0; n]
    };

    // Assemble, repair field-level issues, sort, dedupe.
    let mut rows: Vec<(DateTime<Utc>, Bar)> = Vec::with_capacity(n);
    for i in 0..n {
        let ts = match timestamps[i] {
            Some(ts) => timeframe.floor(ts),
            None => continue,
        };
        let (o, h, l, c) = (open[i], high[i], low[i], close[i]);
        if !c.is_finite() {
            continue;
        }
        let o = if o.is_finite() { o } else { c };
        let h = h.max(o).max(c);
        let h = if h.is_finite() { h } else { o.max(c) };
        let l = l.min(o).min(c);
        let l = if l.is_finite() { l } else { o.min(c) };
        let v = if volume[i].is_finite() { volume[i].max(0.0) } else { 0.0 };
        rows.push((ts, Bar::new(ts, o, h, l, c, v)));
    }
    if rows.is_empty() {
        return Err(HistoryError::Empty);
    }
    rows.sort_by_key(|(ts, _)| *ts);
    rows.dedup_by_key(|(ts, _)| *ts);

    // Reindex to the timeframe grid.
    let step = chrono::Duration::seconds(timeframe.step_secs());
    let first = rows[0].0;
    let last = rows[rows.len() - 1].0;
    let total_slots = ((last - first).num_seconds() / timeframe.step_secs() + 1) as usize;
    let missing = total_slots.saturating_sub(rows.len());
    let gap_perc = 100.0 * missing as f64 / total_slots as f64;
    if gap_perc > gap_repair_max_perc {
        return Err(HistoryError::ExcessiveGaps { got: gap_perc, max: gap_repair_max_perc });
    }
    if missing > 0 {
        warn!(missing, total_slots, "repairing gaps in history");
    }

    let mut bars = Vec::with_capacity(total_slots);
    let mut iter = rows.into_iter().peekable();
    let mut cursor = first;
    let mut prev_close = f64::NAN;
    while cursor <= last {
        match iter.peek() {
            Some((ts, _)) if *ts == cursor => {
                let (_, bar) = iter.next().expect("peeked row");
                prev_close = bar.close;
                bars.push(bar);
            }
            _ => {
                // synthetic bar from the previous close
                bars.push(Bar::new(cursor, prev_close, prev_close, prev_close, prev_close, 0.0));
            }
        }
        cursor += step;
    }

    Ok(bars)
}

/// A file has a header when the first field of the first line is neither a
/// number nor a parseable timestamp.
fn detect_header(path: &Path) -> Result<bool, HistoryError> {
    let contents = std::fs::read_to_string(path).map_err(|e| HistoryError::Io(e.to_string()))?;
    let first_line = contents.lines().next().ok_or(HistoryError::Empty)?;
    let first_field = first_line.split(',').next().unwrap_or("").trim();
    Ok(parse_timestamp_str(first_field).is_none() && first_field.parse::<f64>().is_err())
}

fn parse_timestamps(series: &Series) -> Result<Vec<Option<DateTime<Utc>>>, HistoryError> {
    // String timestamps parse with chrono; anything numeric is an epoch in
    // seconds. A non-strict cast would turn strings into nulls, so branch on
    // the inferred dtype instead.
    if series.dtype() == &DataType::String {
        let strings = series
            .str()
            .map_err(|e| HistoryError::Schema(format!("timestamp column: {e}")))?;
        return strings
            .into_iter()
            .map(|v| match v {
                None => Ok(None),
                Some(s) => match parse_timestamp_str(s) {
                    Some(ts) => Ok(Some(ts)),
                    None => Err(HistoryError::Timestamp(s.to_string())),
                },
            })
            .collect();
    }
    let ints = series
        .cast(&DataType::Int64)
        .map_err(|e| HistoryError::Schema(format!("timestamp column: {e}")))?;
    let chunked = ints
        .i64()
        .map_err(|e| HistoryError::Schema(format!("timestamp column: {e}")))?;
    Ok(chunked
        .into_iter()
        .map(|v| v.and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
        .collect())
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y.%m.%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

fn numeric_column(series: &Series, name: &str) -> Result<Vec<f64>, HistoryError> {
    let cast = series
        .cast(&DataType::Float64)
        .map_err(|e| HistoryError::Schema(format!("column {name}: {e}")))?;
    let chunked = cast
        .f64()
        .map_err(|e| HistoryError::Schema(format!("column {name}: {e}")))?;
    Ok(chunked.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}
