//! Detector geometry as seen by the bookkeeping core: how many modules there are, what
//! they are called, and which module a volume belongs to. Solids, materials and placement
//! belong to the transport toolkit.

use crate::config::DetectorConfig;
use crate::core::accumulator::Region;
use crate::error::{Error, Result};

/// Opaque identifier of a placed volume, as reported by the transport stepper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeHandle(pub u32);

/// The world volume is always handle 0.
pub const WORLD_VOLUME: VolumeHandle = VolumeHandle(0);

/// One module of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleHandle {
    pub index: usize,
    /// Output branch name, e.g. `Mod_120`.
    pub id: String,
    /// Grid coordinates `(x, y, z)`.
    pub cell: [u32; 3],
    pub detector: VolumeHandle,
    pub detector_name: String,
    pub converter: Option<VolumeHandle>,
    pub converter_name: Option<String>,
}

/// Geometry collaborator consumed by the run.
pub trait Geometry {
    fn module_count(&self) -> usize;
    fn module_at(&self, index: usize) -> Option<&ModuleHandle>;
    fn converter_regions_enabled(&self) -> bool;

    fn module_identifier(&self, index: usize) -> Option<&str> {
        self.module_at(index).map(|m| m.id.as_str())
    }

    /// Module index and region owning `volume`; `None` for non-instrumented volumes.
    fn locate(&self, volume: VolumeHandle) -> Option<(usize, Region)>;
}

/// Regular `nx * ny * nz` grid of modules, ordered z-major, then y, then x.
///
/// Volume handles: world = 0, detector of module `i` = `2i + 1`, converter = `2i + 2`.
#[derive(Debug, Clone)]
pub struct ModuleGrid {
    dims: [u32; 3],
    converter_enabled: bool,
    modules: Vec<ModuleHandle>,
}

impl ModuleGrid {
    pub fn new(nx: u32, ny: u32, nz: u32, converter_enabled: bool) -> Result<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(Error::InvalidParam(format!(
                "module grid counts must be > 0, got {nx}x{ny}x{nz}"
            )));
        }
        // Concatenated digits stay unambiguous only while every axis index is one digit.
        let compact = nx <= 10 && ny <= 10 && nz <= 10;
        let tag = |x: u32, y: u32, z: u32| {
            if compact {
                format!("{x}{y}{z}")
            } else {
                format!("{x}_{y}_{z}")
            }
        };

        let mut modules = Vec::with_capacity(nx as usize * ny as usize * nz as usize);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let index = modules.len();
                    let t = tag(x, y, z);
                    let slot = 2 * index as u32;
                    modules.push(ModuleHandle {
                        index,
                        id: format!("Mod_{t}"),
                        cell: [x, y, z],
                        detector: VolumeHandle(slot + 1),
                        detector_name: format!("Detector_{t}"),
                        converter: converter_enabled.then_some(VolumeHandle(slot + 2)),
                        converter_name: converter_enabled.then(|| format!("SGVolume_{t}")),
                    });
                }
            }
        }
        Ok(Self {
            dims: [nx, ny, nz],
            converter_enabled,
            modules,
        })
    }

    pub fn from_config(cfg: &DetectorConfig) -> Result<Self> {
        Self::new(cfg.nx, cfg.ny, cfg.nz, cfg.converter_enabled)
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn modules(&self) -> &[ModuleHandle] {
        &self.modules
    }

    /// Index of the module at grid cell `(x, y, z)`.
    pub fn index_of(&self, x: u32, y: u32, z: u32) -> Option<usize> {
        let [nx, ny, nz] = self.dims;
        if x >= nx || y >= ny || z >= nz {
            return None;
        }
        Some(((z * ny + y) * nx + x) as usize)
    }
}

impl Geometry for ModuleGrid {
    fn module_count(&self) -> usize {
        self.modules.len()
    }

    fn module_at(&self, index: usize) -> Option<&ModuleHandle> {
        self.modules.get(index)
    }

    fn converter_regions_enabled(&self) -> bool {
        self.converter_enabled
    }

    fn locate(&self, volume: VolumeHandle) -> Option<(usize, Region)> {
        if volume == WORLD_VOLUME {
            return None;
        }
        let slot = volume.0 - 1;
        let index = (slot / 2) as usize;
        let module = self.modules.get(index)?;
        if module.detector == volume {
            Some((index, Region::Detector))
        } else if module.converter == Some(volume) {
            Some((index, Region::Converter))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_orders_x_fastest() -> Result<()> {
        let g = ModuleGrid::new(3, 2, 2, true)?;
        assert_eq!(g.module_count(), 12);
        assert_eq!(g.module_identifier(0), Some("Mod_000"));
        assert_eq!(g.module_identifier(1), Some("Mod_100"));
        assert_eq!(g.module_identifier(3), Some("Mod_010"));
        assert_eq!(g.module_identifier(6), Some("Mod_001"));
        assert_eq!(g.index_of(2, 1, 1), Some(11));
        assert_eq!(g.module_at(11).map(|m| m.cell), Some([2, 1, 1]));
        assert_eq!(g.index_of(3, 0, 0), None);
        Ok(())
    }

    #[test]
    fn locate_maps_volumes_back_to_modules() -> Result<()> {
        let g = ModuleGrid::new(3, 3, 1, true)?;
        for m in g.modules() {
            assert_eq!(g.locate(m.detector), Some((m.index, Region::Detector)));
            let conv = m.converter.ok_or_else(|| Error::InvalidParam("no converter".into()))?;
            assert_eq!(g.locate(conv), Some((m.index, Region::Converter)));
        }
        assert_eq!(g.locate(WORLD_VOLUME), None);
        assert_eq!(g.locate(VolumeHandle(10_000)), None);
        Ok(())
    }

    #[test]
    fn converter_volumes_absent_when_disabled() -> Result<()> {
        let g = ModuleGrid::new(2, 1, 1, false)?;
        assert!(!g.converter_regions_enabled());
        assert!(g.modules().iter().all(|m| m.converter.is_none()));
        // Handle that would be module 0's converter is not instrumented.
        assert_eq!(g.locate(VolumeHandle(2)), None);
        Ok(())
    }

    #[test]
    fn large_grids_use_separated_identifiers() -> Result<()> {
        let g = ModuleGrid::new(11, 1, 1, false)?;
        assert_eq!(g.module_identifier(10), Some("Mod_10_0_0"));
        let mut ids: Vec<_> = g.modules().iter().map(|m| m.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 11);
        Ok(())
    }

    #[test]
    fn zero_axis_rejected() {
        assert!(ModuleGrid::new(3, 0, 1, true).is_err());
    }
}
