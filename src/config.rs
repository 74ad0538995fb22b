//! Run configuration.
//!
//! Every value the command surface can set lives here as plain data. Lengths are in mm,
//! energies in MeV, angles in radians. All sections carry serde defaults so a partial
//! TOML file loads.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub world_material: String,
    pub detector_material: String,
    pub converter_material: String,
    pub world_half_lengths: [f64; 3],
    pub module_half_lengths: [f64; 3],
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
    /// Source-to-detector distance.
    pub distance: f64,
    /// Detector thickness over full module thickness along z.
    pub module_proportion: f64,
    pub converter_enabled: bool,
    pub detector_colour: [f32; 4],
    pub converter_colour: [f32; 4],
}

impl DetectorConfig {
    /// Number of modules in the grid.
    pub fn module_count(&self) -> usize {
        self.nx as usize * self.ny as usize * self.nz as usize
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            world_material: "G4_AIR".into(),
            detector_material: "G4_SODIUM_IODIDE".into(),
            converter_material: "G4_Pb".into(),
            world_half_lengths: [10_000.0; 3],
            module_half_lengths: [4_000.0, 3_000.0, 500.0],
            nx: 3,
            ny: 3,
            nz: 3,
            distance: 7_000.0,
            module_proportion: 1_000.0 / 1_050.0,
            converter_enabled: true,
            detector_colour: [0.0, 0.6, 0.1, 0.85],
            converter_colour: [0.6, 0.6, 0.6, 1.0],
        }
    }
}

/// Shape name plus every shape-specific parameter. Parameters a shape does not use are
/// ignored; missing ones keep the shape's default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpectrumConfig {
    pub shape: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_energy: Option<f64>,
    /// Exponential slope `k` of `exp(k E)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_min_prop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda: Option<f64>,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            shape: "Point".into(),
            energy: None,
            mean: None,
            sigma: None,
            width: None,
            min_energy: None,
            max_energy: None,
            rate: None,
            max_min_prop: None,
            k: None,
            lambda: None,
        }
    }
}

/// Emission cone around +z. The default is a pencil beam.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConeConfig {
    pub min_phi: f64,
    pub max_phi: f64,
    pub min_theta: f64,
    pub max_theta: f64,
}

impl Default for ConeConfig {
    fn default() -> Self {
        Self {
            min_phi: 0.0,
            max_phi: 0.0,
            min_theta: 0.0,
            max_theta: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub particle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub spectrum: SpectrumConfig,
    pub cone: ConeConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            particle: "gamma".into(),
            seed: None,
            spectrum: SpectrumConfig::default(),
            cone: ConeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Emit a status line every this many events.
    pub print_modulus: u64,
    /// Flush the output destination every this many events.
    pub checkpoint_modulus: u64,
    pub output_file: String,
    pub tree_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            print_modulus: 1,
            checkpoint_modulus: 100_000,
            output_file: "EMCalorimeter_Results.jsonl".into(),
            tree_name: "DecayTree".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub detector: DetectorConfig,
    pub source: SourceConfig,
    pub run: RunConfig,
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Read and parse `path`, failing on any I/O or syntax problem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Like [`SimConfig::load`], but falls back to defaults with a warning.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("failed to load config {}: {err}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_reference_setup() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.detector.module_count(), 27);
        assert!(cfg.detector.converter_enabled);
        assert_eq!(cfg.source.spectrum.shape, "Point");
        assert_eq!(cfg.source.particle, "gamma");
        assert_eq!(cfg.run.print_modulus, 1);
        assert_eq!(cfg.run.checkpoint_modulus, 100_000);
        assert_eq!(cfg.run.tree_name, "DecayTree");
    }

    #[test]
    fn partial_file_keeps_defaults() -> Result<()> {
        let cfg = SimConfig::from_toml_str(
            r#"
            [detector]
            nz = 1
            converter_enabled = false

            [source.spectrum]
            shape = "Gauss"
            mean = 2.5
            "#,
        )?;
        assert_eq!(cfg.detector.nx, 3);
        assert_eq!(cfg.detector.nz, 1);
        assert!(!cfg.detector.converter_enabled);
        assert_eq!(cfg.source.spectrum.shape, "Gauss");
        assert_eq!(cfg.source.spectrum.mean, Some(2.5));
        assert_eq!(cfg.source.spectrum.sigma, None);
        assert_eq!(cfg.run, RunConfig::default());
        Ok(())
    }

    #[test]
    fn save_then_load_reproduces_config() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("emcal.toml");
        let mut cfg = SimConfig::default();
        cfg.source.seed = Some(7);
        cfg.source.spectrum.shape = "Linear".into();
        cfg.source.spectrum.max_min_prop = Some(0.2);
        cfg.run.checkpoint_modulus = 10;
        cfg.save(&path)?;
        assert_eq!(SimConfig::load(&path)?, cfg);
        Ok(())
    }

    #[test]
    fn load_or_default_survives_garbage() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("broken.toml");
        fs::write(&path, "detector = [[[")?;
        assert_eq!(SimConfig::load_or_default(&path), SimConfig::default());
        assert!(SimConfig::load(&path).is_err());
        Ok(())
    }
}
