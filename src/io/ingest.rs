//! CSV ingest of threshold observations.
//!
//! Expected header (case-insensitive, any column order):
//! `l, m, tf, oog, x, y` plus an optional `session`.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors, exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **No fitting logic here**

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::StringRecord;

use crate::domain::Observation;
use crate::error::FitError;

const REQUIRED_COLUMNS: [&str; 6] = ["l", "m", "tf", "oog", "x", "y"];

/// A skipped input row.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedData {
    pub observations: Vec<Observation>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl IngestedData {
    pub fn rows_used(&self) -> usize {
        self.observations.len()
    }
}

pub fn load_observations(path: &Path) -> Result<IngestedData, FitError> {
    let file =
        File::open(path).map_err(|e| FitError::Io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_observations(file)
}

/// Parse observations from any CSV reader.
pub fn read_observations<R: Read>(source: R) -> Result<IngestedData, FitError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| FitError::InvalidInput(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for name in REQUIRED_COLUMNS {
        if !header_map.contains_key(name) {
            return Err(FitError::InvalidInput(format!("Missing required column: `{name}`")));
        }
    }

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &header_map));
        match parsed {
            Ok(obs) => observations.push(obs),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if observations.is_empty() {
        return Err(FitError::InvalidInput(format!(
            "No valid rows in CSV ({rows_read} read, {} rejected).",
            row_errors.len()
        )));
    }

    Ok(IngestedData {
        observations,
        row_errors,
        rows_read,
    })
}

/// Write observations in the ingest schema.
pub fn write_observations_csv<W: Write>(sink: W, observations: &[Observation]) -> Result<(), FitError> {
    let mut writer = csv::Writer::from_writer(sink);
    let io_err = |e: csv::Error| FitError::Io(format!("Failed to write CSV: {e}"));

    writer
        .write_record(["l", "m", "tf", "oog", "x", "y", "session"])
        .map_err(io_err)?;
    for obs in observations {
        writer
            .write_record([
                obs.l.to_string(),
                obs.m.to_string(),
                obs.tf.to_string(),
                u8::from(obs.oog).to_string(),
                obs.x.to_string(),
                obs.y.to_string(),
                obs.session.map(|s| s.to_string()).unwrap_or_default(),
            ])
            .map_err(io_err)?;
    }
    writer
        .flush()
        .map_err(|e| FitError::Io(format!("Failed to write CSV: {e}")))
}

pub fn save_observations_csv(path: &Path, observations: &[Observation]) -> Result<(), FitError> {
    let file = File::create(path)
        .map_err(|e| FitError::Io(format!("Failed to create '{}': {e}", path.display())))?;
    write_observations_csv(file, observations)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Observation, String> {
    let l = parse_f64(get_required(record, header_map, "l")?, "l")?;
    let m = parse_f64(get_required(record, header_map, "m")?, "m")?;
    let tf = parse_f64(get_required(record, header_map, "tf")?, "tf")?;
    let oog = parse_bool(get_required(record, header_map, "oog")?)?;
    let x = parse_f64(get_required(record, header_map, "x")?, "x")?;
    let y = parse_f64(get_required(record, header_map, "y")?, "y")?;
    let session = match get_optional(record, header_map, "session") {
        Some(s) => Some(
            s.parse::<u32>()
                .map_err(|_| format!("Invalid `session` value: `{s}`"))?,
        ),
        None => None,
    };

    if tf < 0.0 {
        return Err(format!("Negative temporal frequency: {tf}"));
    }
    if l == 0.0 && m == 0.0 && !oog {
        return Err("Zero contrast on a row that is not out of gamut".to_string());
    }

    Ok(Observation {
        l,
        m,
        tf,
        oog,
        x,
        y,
        session,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("Invalid `{name}` value: `{s}`")),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Ok(true),
        "0" | "false" | "f" | "no" | "n" => Ok(false),
        _ => Err(format!("Invalid `oog` value: `{s}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_in_any_column_order() {
        let csv = "\u{feff}X,Y,TF,L,M,OOG,Session\n50,0,4,0.01,0.02,0,3\n-20,30,12.5,0.1,-0.1,true,\n";
        let data = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(data.rows_read, 2);
        assert!(data.row_errors.is_empty());
        assert_eq!(data.observations[0].session, Some(3));
        assert_eq!(data.observations[0].x, 50.0);
        assert!(data.observations[1].oog);
        assert_eq!(data.observations[1].tf, 12.5);
        assert_eq!(data.observations[1].session, None);
    }

    #[test]
    fn bad_rows_are_skipped_with_line_numbers() {
        let csv = "l,m,tf,oog,x,y\n\
                   0.01,0.01,2,0,10,0\n\
                   nan,0.01,2,0,10,0\n\
                   0.01,0.01,-1,0,10,0\n\
                   0.01,0.01,2,maybe,10,0\n";
        let data = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(data.rows_used(), 1);
        let lines: Vec<usize> = data.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
        assert!(data.row_errors[2].message.contains("oog"));
    }

    #[test]
    fn zero_contrast_in_gamut_rows_are_row_errors() {
        let mut csv = String::from("l,m,tf,oog,x,y\n");
        for tf in 1..=30 {
            csv.push_str(&format!("0.02,0.01,{tf},0,40,0\n"));
        }
        csv.push_str("0,0,4,0,40,0\n0,0,4,1,40,0\n");
        let data = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(data.rows_read, 32);
        assert_eq!(data.rows_used(), 31);
        assert_eq!(data.row_errors.len(), 1);
        assert_eq!(data.row_errors[0].line, 32);
        assert!(data.row_errors[0].message.contains("Zero contrast"));
        assert!(data.observations.last().unwrap().oog);
    }

    #[test]
    fn missing_column_is_an_input_error() {
        let err = read_observations("l,m,tf,x,y\n0.1,0.1,2,1,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("`oog`"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn written_csv_reads_back() {
        let rows = vec![Observation {
            l: 0.0125,
            m: -0.003,
            tf: 8.0,
            oog: true,
            x: -40.0,
            y: 15.0,
            session: Some(2),
        }];
        let mut buf = Vec::new();
        write_observations_csv(&mut buf, &rows).unwrap();
        let data = read_observations(buf.as_slice()).unwrap();
        assert_eq!(data.observations, rows);
    }
}
