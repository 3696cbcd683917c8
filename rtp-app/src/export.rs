use anyhow::{Context, Result};
use rtp_core::Trial;
use rtp_experiment::{AdhocRecord, TaskConfig};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

pub const DATA_CSV: &str = "data.csv";
pub const CONFIG_CSV: &str = "config.csv";
pub const ADHOC_CSV: &str = "data_adHoc.csv";

/// Writes `data.csv` and `config.csv` into `dir`.
pub fn write_session(dir: &Path, trials: &[Trial], config: &TaskConfig) -> Result<()> {
    write_trials(&dir.join(DATA_CSV), trials)?;
    write_config(&dir.join(CONFIG_CSV), config)?;
    tracing::info!(dir = %dir.display(), trials = trials.len(), "exported session");
    Ok(())
}

/// One row per trial, a `trial` index column first, unobserved values as
/// empty cells.
pub fn write_trials(path: &Path, trials: &[Trial]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header_written = false;
    for (i, trial) in trials.iter().enumerate() {
        let fields = object(trial)?;
        if !header_written {
            let mut header = vec!["trial".to_string()];
            header.extend(fields.keys().cloned());
            wtr.write_record(&header)?;
            header_written = true;
        }
        let mut row = vec![i.to_string()];
        row.extend(fields.values().map(cell));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Flat `parameter,value` rows, nested keys joined with dots.
pub fn write_config(path: &Path, config: &TaskConfig) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["parameter", "value"])?;

    let mut rows = Vec::new();
    flatten("", &serde_json::to_value(config)?, &mut rows);
    for (key, value) in rows {
        wtr.write_record([key, value])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_adhoc(path: &Path, records: &[AdhocRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a record, got {other}"),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&join(k), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&join(&i.to_string()), v, out);
            }
        }
        leaf => out.push((prefix.to_string(), cell(leaf))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtp_core::Direction;

    fn read(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut rdr = csv::Reader::from_path(path).unwrap();
        let header = rdr.headers().unwrap().iter().map(String::from).collect();
        let rows = rdr
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn trial_rows_keep_column_order_and_blank_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut shown = Trial::new("fast", 1, 0.8, Direction::Increase);
        shown.record_response("return", Direction::Increase, 0.75, 0.75);
        shown.was_shown = true;
        let pending = Trial::new("slow", 2, 0.4, Direction::Decrease);

        let path = dir.path().join(DATA_CSV);
        write_trials(&path, &[shown, pending]).unwrap();
        let (header, rows) = read(&path);

        assert_eq!(&header[..5], ["trial", "block", "trialInBlock", "coherence", "direction"]);
        assert_eq!(header.last().map(String::as_str), Some("TTL3sent_s"));
        let col = |name: &str| header.iter().position(|h| h == name).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "0");
        assert_eq!(rows[0][col("buttonPress")], "return");
        assert_eq!(rows[0][col("RT")], "0.75");
        assert_eq!(rows[0][col("correct")], "true");
        assert_eq!(rows[0][col("wasShown")], "true");
        assert_eq!(rows[1][col("RT")], "");
        assert_eq!(rows[1][col("choice")], "");
        assert_eq!(rows[1][col("direction")], "decrease");
    }

    #[test]
    fn config_is_flattened_with_dotted_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_CSV);
        write_config(&path, &TaskConfig::default()).unwrap();
        let (header, rows) = read(&path);
        assert_eq!(header, ["parameter", "value"]);

        let get = |key: &str| {
            rows.iter()
                .find(|r| r[0] == key)
                .map(|r| r[1].clone())
                .unwrap_or_else(|| panic!("missing {key}"))
        };
        assert_eq!(get("repeats"), "25");
        assert_eq!(get("stimulus.base_note"), "440.0");
        assert_eq!(get("stimulus.space.kind"), "half-steps");
        assert_eq!(get("blocks.1.name"), "slow");
        assert_eq!(get("coherences.0"), "0.8");
        assert_eq!(get("buttons.decrease.1"), "up");
    }

    #[test]
    fn adhoc_rows_use_record_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ADHOC_CSV);
        let records = vec![AdhocRecord {
            side: "left".to_string(),
            button_press_s: 1.25,
            ttl_sent_s: None,
        }];
        write_adhoc(&path, &records).unwrap();
        let (header, rows) = read(&path);
        assert_eq!(header, ["buttonPress", "buttonPress_s", "TTLSent_s"]);
        assert_eq!(rows[0], ["left", "1.25", ""]);
    }
}
