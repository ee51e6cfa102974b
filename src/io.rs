use std::error::Error;
use std::fs::File;
use std::path::Path;

use crate::series::PhaseSeries;

const SECONDS_PER_WEEK: f64 = 604_800.0;

/// One row of a receiver observation file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub week: u32,
    pub seconds_of_week: f64,
    pub pseudorange: f64,
    pub carrier_phase: f64,
}

impl Observation {
    /// Seconds since the GPS epoch, continuous across week rollovers
    pub fn continuous_seconds(&self) -> f64 {
        f64::from(self.week) * SECONDS_PER_WEEK + self.seconds_of_week
    }
}

/// Reads a whitespace-delimited observation file.
///
/// The first line is a header and is skipped without being decoded. Each
/// following line holds week, seconds of week, pseudorange and carrier phase;
/// extra columns are ignored and blank lines skipped. Quote characters have no
/// special meaning.
pub fn read_observations<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(file);
    let mut observations = Vec::new();

    for result in rdr.byte_records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // Runs of spaces and tabs show up as empty or tab-joined fields
        let text = record
            .iter()
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 4 {
            return Err(format!(
                "line {}: expected 4 columns (week, seconds, pseudorange, phase), found {}",
                line,
                fields.len()
            )
            .into());
        }

        observations.push(Observation {
            week: fields[0].parse()?,
            seconds_of_week: fields[1].parse()?,
            pseudorange: fields[2].parse()?,
            carrier_phase: fields[3].parse()?,
        });
    }
    Ok(observations)
}

/// Extracts the (time, carrier phase) series from observations.
///
/// With `continuous` the time axis is seconds since the GPS epoch, otherwise
/// seconds of week.
pub fn observations_to_series(
    observations: &[Observation],
    continuous: bool,
) -> crate::Result<PhaseSeries> {
    let times = observations
        .iter()
        .map(|o| {
            if continuous {
                o.continuous_seconds()
            } else {
                o.seconds_of_week
            }
        })
        .collect();
    let phases = observations.iter().map(|o| o.carrier_phase).collect();
    PhaseSeries::new(times, phases)
}

/// Reads a time and a phase column from a CSV file by header name.
///
/// Rows where either value is missing or not a number are skipped.
pub fn read_csv_series<P: AsRef<Path>>(
    path: P,
    time_column: &str,
    phase_column: &str,
) -> Result<PhaseSeries, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);

    // Read headers once and get the column indices
    let headers = rdr.headers()?.clone();
    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| format!("column '{}' not found", name))
    };
    let time_index = column_index(time_column)?;
    let phase_index = column_index(phase_column)?;

    let mut times = Vec::new();
    let mut phases = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let time = record.get(time_index).and_then(|f| f.trim().parse::<f64>().ok());
        let phase = record.get(phase_index).and_then(|f| f.trim().parse::<f64>().ok());
        if let (Some(time), Some(phase)) = (time, phase) {
            times.push(time);
            phases.push(phase);
        }
    }
    Ok(PhaseSeries::new(times, phases)?)
}
