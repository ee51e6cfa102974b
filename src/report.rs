//! Formatting and persistence of detection results.
//!
//! Nothing here feeds back into detection; the numerical core hands over
//! jump records and series and the reporter turns them into text and CSV.

use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::difference::DifferenceSeries;
use crate::jump::{JumpRecord, JumpSource};
use crate::series::PhaseSeries;

/// One human-readable line describing a jump.
pub fn describe_jump(jump: &JumpRecord) -> String {
    match jump.source {
        JumpSource::Prediction { sigma } => format!(
            "cycle slip at t = {} (index {}): observed phase {}, predicted phase {}, discrepancy {:.4} (fit sigma {:.4})",
            jump.time,
            jump.index,
            jump.observed,
            jump.expected.unwrap_or(f64::NAN),
            jump.discrepancy,
            sigma
        ),
        JumpSource::Difference { order, value } => format!(
            "cycle slip at t = {} (index {}): observed phase {}, first difference {:.4}, order {} difference {:.4}",
            jump.time, jump.index, jump.observed, jump.discrepancy, order, value
        ),
    }
}

/// Writes one [`describe_jump`] line per jump.
pub fn write_jump_lines<W: Write>(mut writer: W, jumps: &[JumpRecord]) -> io::Result<()> {
    for jump in jumps {
        writeln!(writer, "{}", describe_jump(jump))?;
    }
    writer.flush()
}

#[derive(Serialize)]
struct JumpRow {
    index: usize,
    time: f64,
    observed: f64,
    expected: Option<f64>,
    discrepancy: f64,
    detector: &'static str,
    order: Option<usize>,
    order_value: Option<f64>,
}

impl From<&JumpRecord> for JumpRow {
    fn from(jump: &JumpRecord) -> Self {
        let (detector, order_value) = match jump.source {
            JumpSource::Prediction { .. } => ("prediction", None),
            JumpSource::Difference { value, .. } => ("difference", Some(value)),
        };
        Self {
            index: jump.index,
            time: jump.time,
            observed: jump.observed,
            expected: jump.expected,
            discrepancy: jump.discrepancy,
            detector,
            order: jump.order(),
            order_value,
        }
    }
}

/// Writes jumps as CSV with a header row.
pub fn write_jump_csv<W: Write>(writer: W, jumps: &[JumpRecord]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_writer(writer);
    for jump in jumps {
        wtr.serialize(JumpRow::from(jump))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `time,phase[,repaired]` rows for a series and its optional repair.
pub fn write_series_csv<W: Write>(
    writer: W,
    original: &PhaseSeries,
    repaired: Option<&PhaseSeries>,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_writer(writer);

    match repaired {
        Some(repaired) => {
            if repaired.times() != original.times() {
                return Err("repaired series does not share the original timestamps".into());
            }
            wtr.write_record(["time", "phase", "repaired"])?;
            for ((time, phase), fixed) in original
                .times()
                .iter()
                .zip(original.phases())
                .zip(repaired.phases())
            {
                wtr.write_record([time.to_string(), phase.to_string(), fixed.to_string()])?;
            }
        }
        None => {
            wtr.write_record(["time", "phase"])?;
            for sample in original.samples() {
                wtr.write_record([sample.time.to_string(), sample.phase.to_string()])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Writes every difference order in long format: `order,index,time,value`,
/// where `index` is the position in the original series.
pub fn write_difference_csv<W: Write>(
    writer: W,
    series: &PhaseSeries,
    differences: &[DifferenceSeries],
) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["order", "index", "time", "value"])?;

    for diff in differences {
        for (j, value) in diff.values().iter().enumerate() {
            let index = diff.original_index(j);
            let time = series.times().get(index).copied().unwrap_or(f64::NAN);
            wtr.write_record([
                diff.order().to_string(),
                index.to_string(),
                time.to_string(),
                value.to_string(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Writes reports under a single output directory.
#[derive(Debug, Clone)]
pub struct Reporter {
    dir: PathBuf,
}

impl Reporter {
    /// Creates the output directory (and parents) if needed.
    pub fn create<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `jumps.txt` and `jumps.csv`
    pub fn write_jumps(&self, jumps: &[JumpRecord]) -> Result<(), Box<dyn Error>> {
        write_jump_lines(self.create_file("jumps.txt")?, jumps)?;
        write_jump_csv(self.create_file("jumps.csv")?, jumps)
    }

    /// `series.csv`
    pub fn write_series(
        &self,
        original: &PhaseSeries,
        repaired: Option<&PhaseSeries>,
    ) -> Result<(), Box<dyn Error>> {
        write_series_csv(self.create_file("series.csv")?, original, repaired)
    }

    /// `differences.csv`
    pub fn write_differences(
        &self,
        series: &PhaseSeries,
        differences: &[DifferenceSeries],
    ) -> Result<(), Box<dyn Error>> {
        write_difference_csv(self.create_file("differences.csv")?, series, differences)
    }

    fn create_file(&self, name: &str) -> io::Result<BufWriter<File>> {
        Ok(BufWriter::new(File::create(self.dir.join(name))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difference::difference_series;

    fn prediction() -> JumpRecord {
        JumpRecord {
            index: 10,
            time: 345_610.0,
            observed: 25.0,
            expected: Some(20.0),
            discrepancy: 5.0,
            source: JumpSource::Prediction { sigma: 0.01 },
        }
    }

    fn difference() -> JumpRecord {
        JumpRecord {
            index: 11,
            time: 345_611.0,
            observed: 22.0,
            expected: None,
            discrepancy: 7.0,
            source: JumpSource::Difference {
                order: 2,
                value: -10.0,
            },
        }
    }

    #[test]
    fn test_describe_jump() {
        let line = describe_jump(&prediction());
        assert!(line.contains("t = 345610"));
        assert!(line.contains("index 10"));
        assert!(line.contains("predicted phase 20"));

        let line = describe_jump(&difference());
        assert!(line.contains("order 2 difference -10.0000"));
    }

    #[test]
    fn test_jump_csv() {
        let mut out = Vec::new();
        write_jump_csv(&mut out, &[prediction(), difference()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "index,time,observed,expected,discrepancy,detector,order,order_value"
        );
        assert_eq!(lines[1], "10,345610.0,25.0,20.0,5.0,prediction,,");
        assert_eq!(lines[2], "11,345611.0,22.0,,7.0,difference,2,-10.0");
    }

    #[test]
    fn test_series_csv() {
        let original = PhaseSeries::new(vec![0.0, 1.0], vec![1.0, 9.0]).unwrap();
        let repaired = PhaseSeries::new(vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();

        let mut out = Vec::new();
        write_series_csv(&mut out, &original, Some(&repaired)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "time,phase,repaired\n0,1,1\n1,9,2\n");

        let mut out = Vec::new();
        write_series_csv(&mut out, &original, None).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "time,phase\n0,1\n1,9\n");

        let shifted = PhaseSeries::new(vec![0.0, 2.0], vec![1.0, 2.0]).unwrap();
        assert!(write_series_csv(Vec::new(), &original, Some(&shifted)).is_err());
    }

    #[test]
    fn test_reporter_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("res").join("run1");
        let reporter = Reporter::create(&out).unwrap();

        let series = PhaseSeries::new(
            (0..6).map(|i| i as f64).collect(),
            vec![0.0, 1.0, 4.0, 9.0, 16.0, 25.0],
        )
        .unwrap();
        reporter.write_jumps(&[prediction()]).unwrap();
        reporter.write_series(&series, None).unwrap();
        reporter
            .write_differences(&series, &difference_series(series.phases(), 2))
            .unwrap();

        let text = fs::read_to_string(out.join("jumps.txt")).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(out.join("jumps.csv").exists());
        assert!(out.join("series.csv").exists());

        let diffs = fs::read_to_string(out.join("differences.csv")).unwrap();
        // 5 first differences + 4 second differences + header
        assert_eq!(diffs.lines().count(), 10);
        assert!(diffs.lines().nth(6).unwrap().starts_with("2,2,2,"));
    }
}
