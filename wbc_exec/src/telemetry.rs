//! # Telemetry
//!
//! Controllers publish named scalar values through a [`TelemetrySink`] which
//! is handed to them by the runtime environment. A cycle's values are
//! collected by `record` and committed by `end_cycle`.
//!
//! Three sinks are provided:
//! - [`NullSink`] drops everything,
//! - [`MemorySink`] keeps every cycle in memory for inspection,
//! - [`ArchiveSink`] writes one CSV row per cycle into the session archive.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

// Internal
use crate::frames::{FramePoint, FrameVector};
use util::archive::{ArchiveError, Archiver};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Write only channel for named scalar telemetry.
pub trait TelemetrySink {
    /// Record a value for the current cycle, replacing any value recorded
    /// under the same name during this cycle.
    fn record(&mut self, name: &str, value: f64);

    /// Commit the values recorded during this cycle.
    fn end_cycle(&mut self) -> Result<(), TelemetryError>;

    /// Record the three components of a vector as `name_x`, `name_y` and
    /// `name_z`.
    fn record_vector(&mut self, name: &str, vector: &FrameVector) {
        self.record(&format!("{}_x", name), vector.x());
        self.record(&format!("{}_y", name), vector.y());
        self.record(&format!("{}_z", name), vector.z());
    }

    /// Record the three coordinates of a point, see `record_vector`.
    fn record_point(&mut self, name: &str, point: &FramePoint) {
        self.record(&format!("{}_x", name), point.x());
        self.record(&format!("{}_y", name), point.y());
        self.record(&format!("{}_z", name), point.z());
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Sink discarding all telemetry.
#[derive(Debug, Default)]
pub struct NullSink;

/// Sink keeping every committed cycle in memory.
///
/// Clones share the same storage, so a test can keep a handle on the sink
/// it gave away.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Rc<RefCell<MemorySinkData>>,
}

#[derive(Debug, Default)]
struct MemorySinkData {
    current: Cycle,
    cycles: Vec<Cycle>,
}

/// Sink writing one CSV row per cycle.
///
/// The columns of the file are the names recorded during the first cycle.
/// Columns missing from a later cycle are written as NaN and names which
/// were not recorded during the first cycle are dropped.
pub struct ArchiveSink {
    archiver: Archiver,
    columns: Option<Vec<String>>,
    current: Cycle,
    warned_dropped: bool,
}

/// Values recorded during one cycle, in recording order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Cycle {
    values: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Could not archive telemetry: {0}")]
    ArchiveError(#[from] ArchiveError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Cycle {
    fn insert(&mut self, name: &str, value: f64) {
        match self.index.get(name) {
            Some(&i) => self.values[i].1 = value,
            None => {
                self.index.insert(name.to_string(), self.values.len());
                self.values.push((name.to_string(), value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|&i| self.values[i].1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn clear(&mut self) {
        self.values.clear();
        self.index.clear();
    }
}

impl TelemetrySink for NullSink {
    fn record(&mut self, _name: &str, _value: f64) {}

    fn end_cycle(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed cycles.
    pub fn num_cycles(&self) -> usize {
        self.inner.borrow().cycles.len()
    }

    /// Value of `name` in the last committed cycle.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.inner
            .borrow()
            .cycles
            .last()
            .and_then(|c| c.get(name))
    }

    /// Values of `name` over all committed cycles, `None` where it was not
    /// recorded.
    pub fn history(&self, name: &str) -> Vec<Option<f64>> {
        self.inner
            .borrow()
            .cycles
            .iter()
            .map(|c| c.get(name))
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&mut self, name: &str, value: f64) {
        self.inner.borrow_mut().current.insert(name, value);
    }

    fn end_cycle(&mut self) -> Result<(), TelemetryError> {
        let mut data = self.inner.borrow_mut();
        let cycle = std::mem::take(&mut data.current);
        data.cycles.push(cycle);
        Ok(())
    }
}

impl ArchiveSink {
    pub fn new(archiver: Archiver) -> Self {
        Self {
            archiver,
            columns: None,
            current: Cycle::default(),
            warned_dropped: false,
        }
    }
}

impl TelemetrySink for ArchiveSink {
    fn record(&mut self, name: &str, value: f64) {
        self.current.insert(name, value);
    }

    fn end_cycle(&mut self) -> Result<(), TelemetryError> {
        if self.current.is_empty() {
            return Ok(());
        }

        if self.columns.is_none() {
            self.columns = Some(self.current.names().map(str::to_string).collect());
        }

        let current = &self.current;
        let columns = self.columns.as_deref().unwrap_or(&[]);

        if !self.warned_dropped && current.names().any(|n| columns.iter().all(|c| c != n)) {
            warn!("Telemetry names recorded after the first cycle are not archived");
            self.warned_dropped = true;
        }

        let result = self.archiver.write_named_row(
            columns
                .iter()
                .map(|n| (n.as_str(), current.get(n).unwrap_or(std::f64::NAN))),
        );
        self.current.clear();

        result.map_err(TelemetryError::from)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::frames::FrameGraph;
    use nalgebra::Vector3;

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        let mut handle: Box<dyn TelemetrySink> = Box::new(sink.clone());

        handle.record("com_z", 0.5);
        handle.record("com_z", 0.45);
        handle.record("time_s", 0.0);
        assert_eq!(sink.num_cycles(), 0);

        handle.end_cycle().unwrap();
        handle.record_vector(
            "force",
            &FrameVector::new(FrameGraph::new().world(), Vector3::new(1.0, 2.0, 3.0)),
        );
        handle.end_cycle().unwrap();

        assert_eq!(sink.num_cycles(), 2);
        assert_eq!(sink.history("com_z"), vec![Some(0.45), None]);
        assert_eq!(sink.latest("force_y"), Some(2.0));
    }

    #[test]
    fn test_archive_sink() {
        let path = std::env::temp_dir().join("wbc_telemetry_test_archive_sink.csv");

        {
            let mut sink = ArchiveSink::new(Archiver::from_full_path(&path).unwrap());
            for i in 0..3 {
                sink.record("time_s", 0.1 * i as f64);
                sink.record("com_z", 0.5);
                sink.end_cycle().unwrap();
            }

            // Columns are fixed by the first cycle
            sink.record("time_s", 0.3);
            sink.record("com_x", 0.1);
            sink.end_cycle().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "time_s,com_z");
        assert_eq!(lines[3], "0.2,0.5");
        assert_eq!(lines[4], "0.3,NaN");

        std::fs::remove_file(&path).ok();
    }
}
