use crate::error::{Error, Result};

/// Sub-volume of a module that received a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Active (scoring) volume.
    Detector,
    /// Shower-generator volume upstream of the detector.
    Converter,
}

/// Per-module energy bookkeeping for the current event.
///
/// Hit counters count accumulate calls, not particles; the event-level hit totals count
/// modules whose energy is strictly positive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModuleRecord {
    pub detector_energy: f64,
    pub converter_energy: f64,
    pub detector_hits: u32,
    pub converter_hits: u32,
}

impl ModuleRecord {
    #[inline]
    pub fn energy(&self, region: Region) -> f64 {
        match region {
            Region::Detector => self.detector_energy,
            Region::Converter => self.converter_energy,
        }
    }

    #[inline]
    pub fn hits(&self, region: Region) -> u32 {
        match region {
            Region::Detector => self.detector_hits,
            Region::Converter => self.converter_hits,
        }
    }

    /// Whether this module counts as hit in `region`.
    #[inline]
    pub fn is_hit(&self, region: Region) -> bool {
        self.energy(region) > 0.0
    }

    #[inline]
    fn add(&mut self, energy: f64, region: Region) {
        match region {
            Region::Detector => {
                self.detector_energy += energy;
                self.detector_hits = self.detector_hits.saturating_add(1);
            }
            Region::Converter => {
                self.converter_energy += energy;
                self.converter_hits = self.converter_hits.saturating_add(1);
            }
        }
    }
}

/// Fixed-size table of [`ModuleRecord`]s, one per module, owned by a single run.
///
/// Indices are the module indices `[0, len)`; there is no aggregate slot. The table is
/// sized once and never resized.
#[derive(Debug, Clone)]
pub struct ModuleAccumulator {
    records: Box<[ModuleRecord]>,
}

impl ModuleAccumulator {
    /// Create a zeroed table for `num_modules` modules (> 0).
    pub fn new(num_modules: usize) -> Result<Self> {
        if num_modules == 0 {
            return Err(Error::InvalidParam("num_modules must be > 0".into()));
        }
        Ok(Self {
            records: vec![ModuleRecord::default(); num_modules].into_boxed_slice(),
        })
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Zero every field of every record.
    pub fn reset(&mut self) {
        self.records.fill(ModuleRecord::default());
    }

    /// Add `energy` to `region` of module `index` and bump that region's hit counter.
    ///
    /// Errors: `Error::InvalidParam` for a negative or non-finite `energy`,
    /// `Error::IndexOutOfRange` if `index >= len()`. The table is untouched on error.
    pub fn accumulate(&mut self, index: usize, energy: f64, region: Region) -> Result<()> {
        if !energy.is_finite() || energy < 0.0 {
            return Err(Error::InvalidParam(format!(
                "deposit in module {index} must be finite and >= 0, got {energy}"
            )));
        }
        let len = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        record.add(energy, region);
        Ok(())
    }

    /// Read one module's record.
    pub fn record_at(&self, index: usize) -> Result<&ModuleRecord> {
        self.records.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.records.len(),
        })
    }

    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_modules_rejected() {
        let err = ModuleAccumulator::new(0).unwrap_err();
        assert!(err.to_string().contains("num_modules"));
    }

    #[test]
    fn reset_twice_matches_fresh_table() -> Result<()> {
        let fresh = ModuleAccumulator::new(4)?;
        let mut acc = ModuleAccumulator::new(4)?;
        acc.accumulate(2, 1.25, Region::Detector)?;
        acc.accumulate(3, 0.5, Region::Converter)?;
        acc.reset();
        acc.reset();
        assert_eq!(acc.records(), fresh.records());
        assert!(acc.records().iter().all(|r| *r == ModuleRecord::default()));
        Ok(())
    }

    #[test]
    fn accumulation_is_additive_in_call_order() -> Result<()> {
        let mut acc = ModuleAccumulator::new(2)?;
        let deposits = [0.1, 0.2, 0.3, 1e-9, 4.0];
        let mut expected = 0.0;
        for e in deposits {
            acc.accumulate(1, e, Region::Detector)?;
            expected += e;
        }
        let rec = acc.record_at(1)?;
        assert_eq!(rec.detector_energy, expected);
        assert_eq!(rec.detector_hits, deposits.len() as u32);
        assert_eq!(rec.converter_energy, 0.0);
        assert_eq!(rec.converter_hits, 0);
        assert_eq!(*acc.record_at(0)?, ModuleRecord::default());
        Ok(())
    }

    #[test]
    fn zero_deposit_still_counts_as_interaction() -> Result<()> {
        let mut acc = ModuleAccumulator::new(1)?;
        acc.accumulate(0, 0.0, Region::Converter)?;
        let rec = acc.record_at(0)?;
        assert_eq!(rec.converter_hits, 1);
        assert!(!rec.is_hit(Region::Converter));
        Ok(())
    }

    #[test]
    fn invalid_deposits_rejected_without_side_effects() -> Result<()> {
        let mut acc = ModuleAccumulator::new(2)?;
        acc.accumulate(0, 1.5, Region::Detector)?;
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let err = acc.accumulate(0, bad, Region::Detector).unwrap_err();
            assert!(matches!(err, Error::InvalidParam(_)), "{bad}: {err}");
            assert!(acc.accumulate(1, bad, Region::Converter).is_err());
        }
        let rec = acc.record_at(0)?;
        assert_eq!(rec.detector_energy, 1.5);
        assert_eq!(rec.detector_hits, 1);
        assert_eq!(*acc.record_at(1)?, ModuleRecord::default());
        Ok(())
    }

    #[test]
    fn out_of_range_index_is_reported() -> Result<()> {
        let mut acc = ModuleAccumulator::new(9)?;
        let err = acc.accumulate(9, 1.0, Region::Detector).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 9, len: 9 }));
        assert!(acc.record_at(100).is_err());
        assert!(acc.records().iter().all(|r| r.detector_hits == 0));
        Ok(())
    }
}
