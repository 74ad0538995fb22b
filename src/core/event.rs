use crate::core::accumulator::{ModuleAccumulator, ModuleRecord, Region};
use crate::error::{Error, Result};

/// Per-event lifecycle.
///
/// `Idle -> Resetting -> Accumulating -> Finalizing -> Idle`. Resetting and Finalizing are
/// transient: they are entered and left inside a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Idle,
    Resetting,
    Accumulating,
    Finalizing,
}

impl EventPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPhase::Idle => "idle",
            EventPhase::Resetting => "resetting",
            EventPhase::Accumulating => "accumulating",
            EventPhase::Finalizing => "finalizing",
        }
    }
}

/// Derived per-event quantities.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventTotals {
    pub true_energy: f64,
    pub total_detector_energy: f64,
    pub total_converter_energy: f64,
    /// `true_energy` minus all energy seen by instrumented regions.
    pub lost_energy: f64,
    /// Modules with strictly positive detector energy.
    pub total_detector_hits: u32,
    /// Modules with strictly positive converter energy.
    pub total_converter_hits: u32,
}

impl EventTotals {
    /// Sum `records` in index order. Converter energy only enters `lost_energy` when
    /// converter regions exist for the run.
    pub fn compute(true_energy: f64, records: &[ModuleRecord], converter_enabled: bool) -> Self {
        let mut t = EventTotals {
            true_energy,
            ..EventTotals::default()
        };
        for rec in records {
            t.total_detector_energy += rec.detector_energy;
            if rec.is_hit(Region::Detector) {
                t.total_detector_hits += 1;
            }
            if converter_enabled {
                t.total_converter_energy += rec.converter_energy;
                if rec.is_hit(Region::Converter) {
                    t.total_converter_hits += 1;
                }
            }
        }
        t.lost_energy = true_energy - t.total_detector_energy - t.total_converter_energy;
        t
    }
}

/// One output row.
///
/// Converter fields are `None` when the run has no converter regions; `modules` is empty
/// when the run has a single module.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event_number: u64,
    pub true_energy: f64,
    pub detector_energy: f64,
    pub converter_energy: Option<f64>,
    pub lost_energy: f64,
    pub detector_hits: i32,
    pub converter_hits: Option<i32>,
    pub modules: Vec<ModuleRecord>,
}

impl EventRecord {
    fn from_totals(
        event_number: u64,
        totals: &EventTotals,
        converter_enabled: bool,
        modules: Vec<ModuleRecord>,
    ) -> Self {
        Self {
            event_number,
            true_energy: totals.true_energy,
            detector_energy: totals.total_detector_energy,
            converter_energy: converter_enabled.then_some(totals.total_converter_energy),
            lost_energy: totals.lost_energy,
            detector_hits: totals.total_detector_hits as i32,
            converter_hits: converter_enabled.then_some(totals.total_converter_hits as i32),
            modules,
        }
    }

    /// Summary columns in schema order, as floats.
    pub fn summary_values(&self) -> Vec<f64> {
        let mut out = vec![self.detector_energy];
        if let Some(e) = self.converter_energy {
            out.push(e);
        }
        out.push(self.lost_energy);
        out.push(self.true_energy);
        out.push(self.detector_hits as f64);
        if let Some(h) = self.converter_hits {
            out.push(h as f64);
        }
        out
    }
}

/// Bridges one event's deposits into one [`EventRecord`].
#[derive(Debug, Clone)]
pub struct EventAggregator {
    phase: EventPhase,
    true_energy: f64,
    converter_enabled: bool,
    per_module_columns: bool,
}

impl EventAggregator {
    pub fn new(converter_enabled: bool, num_modules: usize) -> Self {
        Self {
            phase: EventPhase::Idle,
            true_energy: 0.0,
            converter_enabled,
            per_module_columns: num_modules > 1,
        }
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    pub fn converter_enabled(&self) -> bool {
        self.converter_enabled
    }

    fn require(&self, operation: &'static str, phase: EventPhase) -> Result<()> {
        if self.phase != phase {
            return Err(Error::PhaseViolation {
                operation,
                phase: self.phase.as_str(),
            });
        }
        Ok(())
    }

    /// Start an event: zero the table and cache the primary energy sampled for it.
    pub fn begin_event(&mut self, acc: &mut ModuleAccumulator, true_energy: f64) -> Result<()> {
        self.require("begin_event", EventPhase::Idle)?;
        self.phase = EventPhase::Resetting;
        acc.reset();
        self.true_energy = true_energy;
        self.phase = EventPhase::Accumulating;
        Ok(())
    }

    /// Route one deposit into the table. Only valid while accumulating.
    pub fn accumulate(
        &self,
        acc: &mut ModuleAccumulator,
        index: usize,
        energy: f64,
        region: Region,
    ) -> Result<()> {
        self.require("accumulate", EventPhase::Accumulating)?;
        if region == Region::Converter && !self.converter_enabled {
            return Err(Error::InvalidParam(format!(
                "converter deposit in module {index} but converter regions are disabled"
            )));
        }
        acc.accumulate(index, energy, region)
    }

    /// Close the event and build its record.
    pub fn finish_event(
        &mut self,
        acc: &ModuleAccumulator,
        event_number: u64,
    ) -> Result<EventRecord> {
        self.require("finish_event", EventPhase::Accumulating)?;
        self.phase = EventPhase::Finalizing;
        let totals = EventTotals::compute(self.true_energy, acc.records(), self.converter_enabled);
        let modules = if self.per_module_columns {
            acc.records().to_vec()
        } else {
            Vec::new()
        };
        let record =
            EventRecord::from_totals(event_number, &totals, self.converter_enabled, modules);
        self.phase = EventPhase::Idle;
        Ok(record)
    }

    /// Drop the current event without producing a record.
    pub fn abort_event(&mut self) {
        self.phase = EventPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn totals_count_positive_modules_only() {
        let records = [
            ModuleRecord {
                detector_energy: 1.0,
                detector_hits: 3,
                ..ModuleRecord::default()
            },
            ModuleRecord {
                detector_energy: 0.0,
                detector_hits: 2,
                converter_energy: 0.5,
                converter_hits: 1,
            },
            ModuleRecord::default(),
        ];
        let t = EventTotals::compute(4.0, &records, true);
        assert_eq!(t.total_detector_hits, 1);
        assert_eq!(t.total_converter_hits, 1);
        assert_eq!(t.total_detector_energy, 1.0);
        assert_eq!(t.total_converter_energy, 0.5);
        assert_abs_diff_eq!(t.lost_energy, 2.5, epsilon = 1e-12);

        let without = EventTotals::compute(4.0, &records, false);
        assert_eq!(without.total_converter_energy, 0.0);
        assert_eq!(without.total_converter_hits, 0);
        assert_abs_diff_eq!(without.lost_energy, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn accumulate_outside_event_is_a_phase_violation() -> Result<()> {
        let mut acc = ModuleAccumulator::new(2)?;
        let agg = EventAggregator::new(false, 2);
        let err = agg.accumulate(&mut acc, 0, 1.0, Region::Detector).unwrap_err();
        assert!(matches!(err, Error::PhaseViolation { phase: "idle", .. }));
        assert_eq!(acc.record_at(0)?.detector_hits, 0);
        Ok(())
    }

    #[test]
    fn double_begin_is_rejected() -> Result<()> {
        let mut acc = ModuleAccumulator::new(1)?;
        let mut agg = EventAggregator::new(false, 1);
        agg.begin_event(&mut acc, 1.0)?;
        assert!(agg.begin_event(&mut acc, 1.0).is_err());
        assert_eq!(agg.phase(), EventPhase::Accumulating);
        Ok(())
    }

    #[test]
    fn converter_deposit_rejected_when_disabled() -> Result<()> {
        let mut acc = ModuleAccumulator::new(1)?;
        let mut agg = EventAggregator::new(false, 1);
        agg.begin_event(&mut acc, 1.0)?;
        assert!(agg.accumulate(&mut acc, 0, 0.1, Region::Converter).is_err());
        Ok(())
    }

    #[test]
    fn lifecycle_resets_between_events() -> Result<()> {
        let mut acc = ModuleAccumulator::new(3)?;
        let mut agg = EventAggregator::new(true, 3);

        agg.begin_event(&mut acc, 5.0)?;
        agg.accumulate(&mut acc, 1, 2.0, Region::Detector)?;
        agg.accumulate(&mut acc, 1, 1.0, Region::Converter)?;
        let first = agg.finish_event(&acc, 0)?;
        assert_eq!(agg.phase(), EventPhase::Idle);
        assert_eq!(first.detector_energy, 2.0);
        assert_eq!(first.converter_energy, Some(1.0));
        assert_eq!(first.converter_hits, Some(1));
        assert_eq!(first.modules.len(), 3);
        assert_eq!(first.modules[1].detector_hits, 1);

        agg.begin_event(&mut acc, 3.0)?;
        let second = agg.finish_event(&acc, 1)?;
        assert_eq!(second.detector_energy, 0.0);
        assert_eq!(second.detector_hits, 0);
        assert_eq!(second.lost_energy, 3.0);
        assert!(second.modules.iter().all(|m| *m == ModuleRecord::default()));
        Ok(())
    }

    #[test]
    fn single_module_has_no_module_columns() -> Result<()> {
        let mut acc = ModuleAccumulator::new(1)?;
        let mut agg = EventAggregator::new(false, 1);
        agg.begin_event(&mut acc, 6.0)?;
        agg.accumulate(&mut acc, 0, 6.0, Region::Detector)?;
        let rec = agg.finish_event(&acc, 0)?;
        assert!(rec.modules.is_empty());
        assert_eq!(rec.lost_energy, 0.0);
        assert_eq!(rec.summary_values(), vec![6.0, 0.0, 6.0, 1.0]);
        Ok(())
    }

    #[test]
    fn aborted_event_allows_a_new_one() -> Result<()> {
        let mut acc = ModuleAccumulator::new(1)?;
        let mut agg = EventAggregator::new(false, 1);
        agg.begin_event(&mut acc, 6.0)?;
        agg.accumulate(&mut acc, 0, 1.0, Region::Detector)?;
        agg.abort_event();
        assert!(agg.finish_event(&acc, 0).is_err());
        agg.begin_event(&mut acc, 2.0)?;
        assert_eq!(acc.record_at(0)?.detector_energy, 0.0);
        Ok(())
    }
}
