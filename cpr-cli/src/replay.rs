//! Replay file input.
//!
//! One report per line, whitespace separated:
//!
//! ```text
//! <timestamp> <icao-hex> <E|O> <A|S> <raw-lat> <raw-lon> [nuc]
//! ```
//!
//! Blank lines and `#` comments are skipped.

use std::fs;
use std::io;
use std::path::Path;

use cpr_core::types::{icao_from_hex, FormatKind, Icao, Parity, RawAxis, RawReport};

/// One parsed report line.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    pub line: usize,
    pub icao: Icao,
    pub report: RawReport,
}

/// Contents of a replay file.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: Vec<ReplayRecord>,
    /// Lines that looked like data but failed to parse.
    pub malformed: usize,
}

/// Read pre-parsed CPR reports from a file.
pub struct ReplayReader {
    path: String,
}

impl ReplayReader {
    pub fn new(path: &Path) -> Self {
        ReplayReader {
            path: path.display().to_string(),
        }
    }

    /// Read all records from the file, in file order.
    pub fn read_all(&self) -> io::Result<Replay> {
        let content = fs::read_to_string(&self.path)?;
        Ok(parse_replay(&content))
    }
}

pub fn parse_replay(content: &str) -> Replay {
    let mut replay = Replay::default();
    for (i, line) in content.lines().enumerate() {
        match parse_line(line) {
            Ok(Some((icao, report))) => replay.records.push(ReplayRecord {
                line: i + 1,
                icao,
                report,
            }),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = i + 1, "skipping malformed line: {e}");
                replay.malformed += 1;
            }
        }
    }
    replay
}

/// Parse one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<(Icao, RawReport)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if !(6..=7).contains(&fields.len()) {
        return Err(format!("expected 6 or 7 fields, got {}", fields.len()));
    }

    let timestamp: f64 = fields[0]
        .parse()
        .map_err(|_| format!("bad timestamp {:?}", fields[0]))?;
    if !timestamp.is_finite() {
        return Err(format!("bad timestamp {:?}", fields[0]));
    }
    let icao = icao_from_hex(fields[1]).ok_or_else(|| format!("bad ICAO {:?}", fields[1]))?;
    let parity = match fields[2] {
        "E" | "e" | "0" => Parity::Even,
        "O" | "o" | "1" => Parity::Odd,
        other => return Err(format!("bad parity {other:?}")),
    };
    let format = match fields[3] {
        "A" | "a" => FormatKind::Airborne,
        "S" | "s" => FormatKind::Surface,
        other => return Err(format!("bad format {other:?}")),
    };
    let latitude = parse_axis(fields[4])?;
    let longitude = parse_axis(fields[5])?;
    let nuc = match fields.get(6) {
        Some(n) => n.parse().map_err(|_| format!("bad NUC {n:?}"))?,
        None => 0,
    };

    let report = RawReport::new(latitude, longitude, parity, format, timestamp).with_nuc(nuc);
    Ok(Some((icao, report)))
}

fn parse_axis(field: &str) -> Result<RawAxis, String> {
    let value: u32 = field
        .parse()
        .map_err(|_| format!("bad CPR value {field:?}"))?;
    RawAxis::new(value).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
