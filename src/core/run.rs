use crate::config::RunConfig;
use crate::core::accumulator::{ModuleAccumulator, Region};
use crate::core::event::{EventAggregator, EventPhase, EventRecord};
use crate::core::geometry::{Geometry, VolumeHandle};
use crate::core::source::{PrimarySource, PrimaryVertex};
use crate::error::{Error, Result};
use crate::output::{OutputSchema, OutputSink};
use tracing::{debug, info, warn};

/// Run-scoped knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Status line every this many events.
    pub print_modulus: u64,
    /// Checkpoint the destination every this many events.
    pub checkpoint_modulus: u64,
    pub tree_name: String,
}

impl RunSettings {
    pub fn from_config(cfg: &RunConfig) -> Result<Self> {
        if cfg.print_modulus == 0 {
            return Err(Error::InvalidParam("print_modulus must be > 0".into()));
        }
        if cfg.checkpoint_modulus == 0 {
            return Err(Error::InvalidParam("checkpoint_modulus must be > 0".into()));
        }
        Ok(Self {
            print_modulus: cfg.print_modulus,
            checkpoint_modulus: cfg.checkpoint_modulus,
            tree_name: cfg.tree_name.clone(),
        })
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            print_modulus: 1,
            checkpoint_modulus: 100_000,
            tree_name: "DecayTree".into(),
        }
    }
}

/// What a finished run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub records: u64,
    /// Intermediate checkpoints, not counting the final flush.
    pub checkpoints: u64,
    pub destination: String,
    /// False when the run had no events and the destination was left alone.
    pub finalized: bool,
}

/// One run: a fixed module table, an event aggregator and an output destination.
///
/// Events are strictly sequential: `begin_event`, any number of `on_step`/`deposit`,
/// `end_event`. Each worker thread of a parallel transport owns its own `Run`.
#[derive(Debug)]
pub struct Run<G: Geometry, S: OutputSink> {
    geometry: G,
    sink: S,
    settings: RunSettings,
    schema: OutputSchema,
    accumulator: ModuleAccumulator,
    aggregator: EventAggregator,
    events: u64,
    checkpoints: u64,
    ended: bool,
}

impl<G: Geometry, S: OutputSink> Run<G, S> {
    /// Size the module table from `geometry`, register the output schema with `sink` and
    /// revalidate the source spectrum.
    pub fn begin(
        geometry: G,
        mut sink: S,
        settings: RunSettings,
        source: &mut PrimarySource,
    ) -> Result<Self> {
        if settings.print_modulus == 0 || settings.checkpoint_modulus == 0 {
            return Err(Error::InvalidParam("run moduli must be > 0".into()));
        }
        let n = geometry.module_count();
        let accumulator = ModuleAccumulator::new(n)?;
        let converter_enabled = geometry.converter_regions_enabled();

        let module_ids = (0..n)
            .map(|i| {
                geometry
                    .module_identifier(i)
                    .map(str::to_string)
                    .ok_or(Error::IndexOutOfRange { index: i, len: n })
            })
            .collect::<Result<Vec<_>>>()?;
        let schema = OutputSchema::new(&settings.tree_name, converter_enabled, &module_ids);
        sink.register_schema(&schema)?;

        let selection = source.ensure_valid();
        info!(
            modules = n,
            converter_enabled,
            spectrum = source.spectrum().name(),
            destination = sink.name(),
            "run started"
        );
        if selection.fell_back() {
            warn!("run continues with the default point spectrum");
        }

        Ok(Self {
            geometry,
            sink,
            settings,
            schema,
            accumulator,
            aggregator: EventAggregator::new(converter_enabled, n),
            events: 0,
            checkpoints: 0,
            ended: false,
        })
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn accumulator(&self) -> &ModuleAccumulator {
        &self.accumulator
    }

    pub fn phase(&self) -> EventPhase {
        self.aggregator.phase()
    }

    /// Events completed so far.
    pub fn events_processed(&self) -> u64 {
        self.events
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.ended {
            return Err(Error::PhaseViolation {
                operation,
                phase: "ended",
            });
        }
        Ok(())
    }

    /// Reset the module table and draw this event's primary vertex.
    pub fn begin_event(&mut self, source: &mut PrimarySource) -> Result<PrimaryVertex> {
        self.ensure_open("begin_event")?;
        if self.aggregator.phase() != EventPhase::Idle {
            return Err(Error::PhaseViolation {
                operation: "begin_event",
                phase: self.aggregator.phase().as_str(),
            });
        }
        let vertex = source.generate();
        self.aggregator
            .begin_event(&mut self.accumulator, source.last_energy())?;
        Ok(vertex)
    }

    /// Stepper callback: credit `energy` to whichever module owns `volume`. Deposits in
    /// non-instrumented volumes are ignored.
    pub fn on_step(&mut self, volume: VolumeHandle, energy: f64) -> Result<()> {
        match self.geometry.locate(volume) {
            Some((index, region)) => self.deposit(index, energy, region),
            None if self.aggregator.phase() == EventPhase::Accumulating => Ok(()),
            None => Err(Error::PhaseViolation {
                operation: "on_step",
                phase: self.aggregator.phase().as_str(),
            }),
        }
    }

    /// Credit `energy` directly to module `index`.
    pub fn deposit(&mut self, index: usize, energy: f64, region: Region) -> Result<()> {
        self.aggregator
            .accumulate(&mut self.accumulator, index, energy, region)
    }

    /// Close the event, append its record and checkpoint when due.
    pub fn end_event(&mut self) -> Result<EventRecord> {
        let record = self
            .aggregator
            .finish_event(&self.accumulator, self.events)?;
        self.sink.append(&record)?;
        self.events += 1;

        if self.events % self.settings.checkpoint_modulus == 0 {
            self.sink.checkpoint()?;
            self.checkpoints += 1;
            debug!(events = self.events, "output checkpointed");
        }
        if self.events % self.settings.print_modulus == 0 {
            info!(
                "events processed: {} (true energy {:.4} MeV, detector {:.4} MeV)",
                self.events, record.true_energy, record.detector_energy
            );
        }
        Ok(record)
    }

    /// Abandon the event in progress; no record is emitted for it.
    pub fn abort_event(&mut self) {
        if self.aggregator.phase() != EventPhase::Idle {
            warn!(event = self.events, "event aborted, no record emitted");
        }
        self.aggregator.abort_event();
    }

    /// Finish the run. With zero events the destination is not touched.
    pub fn end_run(&mut self) -> Result<RunSummary> {
        self.ensure_open("end_run")?;
        self.abort_event();
        self.ended = true;

        let destination = self.sink.name().to_string();
        if self.events == 0 {
            info!("run ended without events; output left untouched");
            return Ok(self.summary(destination, false));
        }
        self.sink.finalize()?;
        info!(
            "data saved in {destination} (tree {}, {} records)",
            self.schema.tree_name,
            self.sink.records_written()
        );
        Ok(self.summary(destination, true))
    }

    fn summary(&self, destination: String, finalized: bool) -> RunSummary {
        RunSummary {
            events: self.events,
            records: self.sink.records_written(),
            checkpoints: self.checkpoints,
            destination,
            finalized,
        }
    }
}

impl<G: Geometry, S: OutputSink> Drop for Run<G, S> {
    fn drop(&mut self) {
        if self.ended || self.events == 0 {
            return;
        }
        if let Err(err) = self.sink.checkpoint() {
            warn!("flushing {} on early termination failed: {err}", self.sink.name());
        }
    }
}
