use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::SimConfig;
use crate::core::{ModuleGrid, PrimarySource, Region, Run, RunSettings, VolumeHandle};
use crate::output::MemorySink;

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Python-facing driver for one calorimeter run.
///
/// The caller plays the transport toolkit:
/// - begin_event() -> primary energy (MeV)
/// - step(volume, energy) / deposit(module, energy, converter=False)
/// - end_event() -> summary row
/// - end_run() -> (events, records, checkpoints)
#[pyclass]
pub struct Calorimeter {
    run: Run<ModuleGrid, MemorySink>,
    source: PrimarySource,
}

#[pymethods]
impl Calorimeter {
    /// Build a run from a TOML configuration string (defaults when omitted).
    ///
    /// Errors: raises ValueError on unparsable or invalid configuration.
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<&str>) -> PyResult<Self> {
        let cfg = match config {
            Some(text) => SimConfig::from_toml_str(text).map_err(py_err)?,
            None => SimConfig::default(),
        };
        let mut source = PrimarySource::from_config(&cfg.source).map_err(py_err)?;
        let geometry = ModuleGrid::from_config(&cfg.detector).map_err(py_err)?;
        let settings = RunSettings::from_config(&cfg.run).map_err(py_err)?;
        let sink = MemorySink::new(cfg.run.tree_name.clone());
        let run = Run::begin(geometry, sink, settings, &mut source).map_err(py_err)?;
        Ok(Self { run, source })
    }

    /// Number of modules in the grid.
    fn module_count(&self) -> usize {
        self.run.accumulator().len()
    }

    /// Summary column names, in the order used by end_event() and get_records().
    fn column_names(&self) -> Vec<String> {
        self.run
            .schema()
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Start an event and return the sampled primary energy.
    fn begin_event(&mut self) -> PyResult<f64> {
        let vertex = self.run.begin_event(&mut self.source).map_err(py_err)?;
        Ok(vertex.energy)
    }

    /// Report a deposit in a volume handle (0 = world, 2i+1 detector, 2i+2 converter).
    fn step(&mut self, volume: u32, energy: f64) -> PyResult<()> {
        self.run
            .on_step(VolumeHandle(volume), energy)
            .map_err(py_err)
    }

    /// Report a deposit directly by module index.
    #[pyo3(signature = (module, energy, converter=false))]
    fn deposit(&mut self, module: usize, energy: f64, converter: bool) -> PyResult<()> {
        let region = if converter {
            Region::Converter
        } else {
            Region::Detector
        };
        self.run.deposit(module, energy, region).map_err(py_err)
    }

    /// Close the event and return its summary row.
    fn end_event(&mut self) -> PyResult<Vec<f64>> {
        let record = self.run.end_event().map_err(py_err)?;
        Ok(record.summary_values())
    }

    /// Finish the run. Returns (events, records, checkpoints).
    fn end_run(&mut self) -> PyResult<(u64, u64, u64)> {
        let summary = self.run.end_run().map_err(py_err)?;
        Ok((summary.events, summary.records, summary.checkpoints))
    }

    /// Return an (M, k) NumPy array of the summary columns of every recorded event.
    fn get_records<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let records = self.run.sink().records();
        let k = self.run.schema().columns.len();
        let mut arr = Array2::<f64>::zeros((records.len(), k));
        for (i, rec) in records.iter().enumerate() {
            for (j, v) in rec.summary_values().into_iter().enumerate() {
                arr[[i, j]] = v;
            }
        }
        Ok(arr.into_pyarray(py).to_owned().into())
    }
}

/// The emcal Python module entry point.
#[pymodule]
fn emcal(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Calorimeter>()?;
    Ok(())
}
