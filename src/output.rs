//! Output destinations: one row per event, periodic checkpoints, one finalisation.

use crate::config::RunConfig;
use crate::core::accumulator::ModuleRecord;
use crate::core::event::EventRecord;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    F64,
    I32,
}

impl ColumnKind {
    fn code(&self) -> char {
        match self {
            ColumnKind::F64 => 'D',
            ColumnKind::I32 => 'I',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Per-module column group, named after the module identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnGroup {
    pub name: String,
    pub leaves: Vec<Column>,
}

/// Row layout of one run's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSchema {
    pub tree_name: String,
    pub converter_enabled: bool,
    pub columns: Vec<Column>,
    pub groups: Vec<ColumnGroup>,
}

impl OutputSchema {
    /// Summary columns plus, for more than one module, one group per module identifier.
    pub fn new(tree_name: &str, converter_enabled: bool, module_ids: &[String]) -> Self {
        use ColumnKind::{F64, I32};
        let mut columns = vec![Column::new("DetectorEnergy", F64)];
        if converter_enabled {
            columns.push(Column::new("SGVolumeEnergy", F64));
        }
        columns.push(Column::new("LostEnergy", F64));
        columns.push(Column::new("TrueEnergy", F64));
        columns.push(Column::new("nDetHits", I32));
        if converter_enabled {
            columns.push(Column::new("nSgvHits", I32));
        }

        let leaves = Self::module_leaves(converter_enabled);
        let groups = if module_ids.len() > 1 {
            module_ids
                .iter()
                .map(|id| ColumnGroup {
                    name: id.clone(),
                    leaves: leaves.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            tree_name: tree_name.to_string(),
            converter_enabled,
            columns,
            groups,
        }
    }

    fn module_leaves(converter_enabled: bool) -> Vec<Column> {
        use ColumnKind::{F64, I32};
        if converter_enabled {
            vec![
                Column::new("DetectorEnergy", F64),
                Column::new("SGVolumeEnergy", F64),
                Column::new("nDetInteractions", I32),
                Column::new("nSgvInteractions", I32),
            ]
        } else {
            vec![
                Column::new("DetectorEnergy", F64),
                Column::new("nDetInteractions", I32),
            ]
        }
    }

    /// Leaf descriptor of a per-module group, e.g. `DetectorEnergy/D:nDetInteractions/I`.
    pub fn module_leaf_list(&self) -> String {
        Self::module_leaves(self.converter_enabled)
            .iter()
            .map(|c| format!("{}/{}", c.name, c.kind.code()))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn module_row(&self, rec: &ModuleRecord) -> Value {
        let mut m = Map::new();
        m.insert("DetectorEnergy".into(), rec.detector_energy.into());
        if self.converter_enabled {
            m.insert("SGVolumeEnergy".into(), rec.converter_energy.into());
        }
        m.insert("nDetInteractions".into(), rec.detector_hits.into());
        if self.converter_enabled {
            m.insert("nSgvInteractions".into(), rec.converter_hits.into());
        }
        Value::Object(m)
    }

    /// Encode one record as a JSON object following this layout.
    pub fn row(&self, record: &EventRecord) -> Result<Map<String, Value>> {
        if record.modules.len() != self.groups.len() {
            return Err(Error::Output(format!(
                "record carries {} module groups, schema expects {}",
                record.modules.len(),
                self.groups.len()
            )));
        }
        let mut row = Map::new();
        row.insert("DetectorEnergy".into(), record.detector_energy.into());
        if let Some(e) = record.converter_energy {
            row.insert("SGVolumeEnergy".into(), e.into());
        }
        row.insert("LostEnergy".into(), record.lost_energy.into());
        row.insert("TrueEnergy".into(), record.true_energy.into());
        row.insert("nDetHits".into(), record.detector_hits.into());
        if let Some(h) = record.converter_hits {
            row.insert("nSgvHits".into(), h.into());
        }
        for (group, module) in self.groups.iter().zip(&record.modules) {
            row.insert(group.name.clone(), self.module_row(module));
        }
        Ok(row)
    }
}

/// Where event records go.
pub trait OutputSink {
    /// Destination name for reporting.
    fn name(&self) -> &str;
    /// Declare the row layout. Called once per run before any append.
    fn register_schema(&mut self, schema: &OutputSchema) -> Result<()>;
    fn append(&mut self, record: &EventRecord) -> Result<()>;
    /// Make everything appended so far durable.
    fn checkpoint(&mut self) -> Result<()>;
    /// Final flush at run end.
    fn finalize(&mut self) -> Result<()>;
    fn records_written(&self) -> u64;
}

/// In-memory destination.
#[derive(Debug, Default)]
pub struct MemorySink {
    name: String,
    schema: Option<OutputSchema>,
    records: Vec<EventRecord>,
    checkpoints: Vec<u64>,
    finalized: bool,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn schema(&self) -> Option<&OutputSchema> {
        self.schema.as_ref()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Record count at each checkpoint, in order.
    pub fn checkpoints(&self) -> &[u64] {
        &self.checkpoints
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// All rows encoded through the registered schema.
    pub fn rows(&self) -> Result<Vec<Map<String, Value>>> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| Error::Output("no schema registered".into()))?;
        self.records.iter().map(|r| schema.row(r)).collect()
    }
}

impl OutputSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_schema(&mut self, schema: &OutputSchema) -> Result<()> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn append(&mut self, record: &EventRecord) -> Result<()> {
        if self.schema.is_none() {
            return Err(Error::Output("append before schema registration".into()));
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.checkpoints.push(self.records.len() as u64);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        Ok(())
    }

    fn records_written(&self) -> u64 {
        self.records.len() as u64
    }
}

/// Newline-delimited JSON file: a schema header line, then one object per event.
///
/// The header is written together with the first row, so a run without events leaves the
/// freshly created file empty.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    name: String,
    writer: BufWriter<File>,
    schema: Option<OutputSchema>,
    header_written: bool,
    records: u64,
}

impl JsonLinesSink {
    /// Create (truncate) `path`. Fails if the destination is not writable.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            Error::Output(format!("cannot open {} for writing: {e}", path.display()))
        })?;
        Ok(Self {
            name: path.display().to_string(),
            path,
            writer: BufWriter::new(file),
            schema: None,
            header_written: false,
            records: 0,
        })
    }

    /// Open the destination named by `output_file`.
    pub fn from_config(cfg: &RunConfig) -> Result<Self> {
        Self::create(&cfg.output_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_schema(&mut self, schema: &OutputSchema) -> Result<()> {
        if self.header_written {
            return Err(Error::Output(format!("{}: schema already written", self.name)));
        }
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn append(&mut self, record: &EventRecord) -> Result<()> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| Error::Output("append before schema registration".into()))?;
        let row = schema.row(record)?;
        if !self.header_written {
            serde_json::to_writer(&mut self.writer, schema)?;
            self.writer.write_all(b"\n")?;
            self.header_written = true;
        }
        serde_json::to_writer(&mut self.writer, &row)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.checkpoint()
    }

    fn records_written(&self) -> u64 {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(modules: Vec<ModuleRecord>, converter: bool) -> EventRecord {
        EventRecord {
            event_number: 0,
            true_energy: 6.0,
            detector_energy: 2.5,
            converter_energy: converter.then_some(0.5),
            lost_energy: if converter { 3.0 } else { 3.5 },
            detector_hits: 1,
            converter_hits: converter.then_some(1),
            modules,
        }
    }

    #[test]
    fn schema_columns_follow_converter_flag() {
        let ids = vec!["Mod_000".to_string()];
        let plain = OutputSchema::new("DecayTree", false, &ids);
        assert_eq!(
            plain.column_names(),
            ["DetectorEnergy", "LostEnergy", "TrueEnergy", "nDetHits"]
        );
        assert!(plain.groups.is_empty());

        let sgv = OutputSchema::new("DecayTree", true, &ids);
        assert_eq!(
            sgv.column_names(),
            [
                "DetectorEnergy",
                "SGVolumeEnergy",
                "LostEnergy",
                "TrueEnergy",
                "nDetHits",
                "nSgvHits"
            ]
        );
        assert_eq!(
            sgv.module_leaf_list(),
            "DetectorEnergy/D:SGVolumeEnergy/D:nDetInteractions/I:nSgvInteractions/I"
        );
    }

    #[test]
    fn groups_only_for_multi_module_runs() -> Result<()> {
        let ids: Vec<String> = ["Mod_000", "Mod_100"].iter().map(|s| s.to_string()).collect();
        let schema = OutputSchema::new("T", false, &ids);
        assert_eq!(schema.groups.len(), 2);
        let modules = vec![
            ModuleRecord {
                detector_energy: 2.5,
                detector_hits: 2,
                ..ModuleRecord::default()
            },
            ModuleRecord::default(),
        ];
        let row = schema.row(&record(modules, false))?;
        assert_eq!(row["Mod_000"]["DetectorEnergy"], 2.5);
        assert_eq!(row["Mod_000"]["nDetInteractions"], 2);
        assert!(row["Mod_100"].get("SGVolumeEnergy").is_none());
        Ok(())
    }

    #[test]
    fn row_rejects_mismatched_groups() {
        let ids: Vec<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        let schema = OutputSchema::new("T", false, &ids);
        assert!(schema.row(&record(Vec::new(), false)).is_err());
    }

    #[test]
    fn memory_sink_requires_schema() {
        let mut sink = MemorySink::new("mem");
        assert!(sink.append(&record(Vec::new(), false)).is_err());
    }

    #[test]
    fn json_lines_header_written_with_first_row() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out.jsonl");
        let schema = OutputSchema::new("DecayTree", true, &["Mod_000".to_string()]);

        let mut sink = JsonLinesSink::create(&path)?;
        sink.register_schema(&schema)?;
        sink.checkpoint()?;
        assert_eq!(fs::read_to_string(&path)?, "");

        sink.append(&record(Vec::new(), true))?;
        sink.append(&record(Vec::new(), true))?;
        sink.finalize()?;
        assert_eq!(sink.records_written(), 2);

        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let header: Value = serde_json::from_str(lines[0])?;
        assert_eq!(header["tree_name"], "DecayTree");
        let row: Value = serde_json::from_str(lines[1])?;
        assert_eq!(row["SGVolumeEnergy"], 0.5);
        assert_eq!(row["nSgvHits"], 1);
        Ok(())
    }

    #[test]
    fn unwritable_destination_is_an_output_error() {
        let err = JsonLinesSink::create("/nonexistent-dir/emcal/out.jsonl").unwrap_err();
        assert!(matches!(err, Error::Output(_)));
    }
}
