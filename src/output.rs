// src/output.rs
use crate::error::AutocallResult;
use crate::greeks::estimator::GreekSeries;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Receives computed price and Greek series
pub trait ResultSink {
    fn publish(&self, series: &GreekSeries) -> AutocallResult<()>;
}

/// Keeps every published series in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<GreekSeries>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<GreekSeries> {
        match self.published.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ResultSink for MemorySink {
    fn publish(&self, series: &GreekSeries) -> AutocallResult<()> {
        match self.published.lock() {
            Ok(mut guard) => guard.push(series.clone()),
            Err(poisoned) => poisoned.into_inner().push(series.clone()),
        }
        Ok(())
    }
}

/// Writes each series to `<dir>/<greek>.csv`
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, series: &GreekSeries) -> PathBuf {
        self.dir.join(format!("{}.csv", series.greek.name()))
    }
}

impl ResultSink for CsvSink {
    fn publish(&self, series: &GreekSeries) -> AutocallResult<()> {
        write_series_to_csv(self.path_for(series), series)?;
        Ok(())
    }
}

/// One row per primitive point; derivative columns are empty on the last row
pub fn write_series_to_csv(filename: impl AsRef<Path>, series: &GreekSeries) -> std::io::Result<()> {
    let mut file = File::create(filename)?;
    writeln!(file, "parameter,value,midpoint,{}", series.greek.name())?;
    for (i, (x, v)) in series.parameters.iter().zip(&series.primitive).enumerate() {
        match (series.derivative.midpoints.get(i), series.derivative.values.get(i)) {
            (Some(m), Some(d)) => writeln!(file, "{},{},{},{}", x, v, m, d)?,
            _ => writeln!(file, "{},{},,", x, v)?,
        }
    }
    Ok(())
}

/// Key/value run summary, stamped with the time it was written
pub fn write_summary_to_csv(
    filename: impl AsRef<Path>,
    summary_data: &[(&str, String)],
    generated_at: DateTime<Utc>,
) -> std::io::Result<()> {
    let mut file = File::create(filename)?;
    writeln!(file, "generated_at,{}", generated_at.to_rfc3339())?;
    for (key, value) in summary_data {
        writeln!(file, "{},{}", key, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greeks::estimator::{derivative, GreekKind};

    fn series() -> GreekSeries {
        GreekSeries {
            greek: GreekKind::Delta,
            parameters: vec![1.0, 2.0, 3.0],
            primitive: vec![0.5, 0.7, 0.8],
            derivative: derivative(&[0.5, 0.7, 0.8], &[1.0, 2.0, 3.0]).unwrap(),
        }
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.publish(&series()).unwrap();
        let mut gamma = series();
        gamma.greek = GreekKind::Gamma;
        sink.publish(&gamma).unwrap();
        let published = sink.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].greek, GreekKind::Delta);
        assert_eq!(published[1].greek, GreekKind::Gamma);
    }

    #[test]
    fn test_csv_sink_writes_rows() {
        let dir = std::env::temp_dir().join(format!("autocall-mc-sink-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sink = CsvSink::new(&dir);
        sink.publish(&series()).unwrap();

        let text = std::fs::read_to_string(dir.join("delta.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "parameter,value,midpoint,delta");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].ends_with(",,"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
