use crate::config::{ConeConfig, SourceConfig};
use crate::core::spectrum::{Point, SpectrumModel};
use crate::error::{Error, Result};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use tracing::warn;

/// Emission cone in spherical angles around +z (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionCone {
    min_phi: f64,
    max_phi: f64,
    min_theta: f64,
    max_theta: f64,
}

impl EmissionCone {
    /// Validate `0 <= min_theta <= max_theta <= pi` and `min_phi <= max_phi`.
    pub fn new(min_phi: f64, max_phi: f64, min_theta: f64, max_theta: f64) -> Result<Self> {
        let all = [min_phi, max_phi, min_theta, max_theta];
        if !all.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("cone angles must be finite".into()));
        }
        if min_phi > max_phi {
            return Err(Error::InvalidParam("min_phi must not exceed max_phi".into()));
        }
        if min_theta < 0.0 || max_theta > std::f64::consts::PI || min_theta > max_theta {
            return Err(Error::InvalidParam(
                "theta range must satisfy 0 <= min_theta <= max_theta <= pi".into(),
            ));
        }
        Ok(Self {
            min_phi,
            max_phi,
            min_theta,
            max_theta,
        })
    }

    pub fn from_config(cfg: &ConeConfig) -> Result<Self> {
        Self::new(cfg.min_phi, cfg.max_phi, cfg.min_theta, cfg.max_theta)
    }

    /// Unit direction drawn uniformly in solid angle inside the cone.
    pub fn sample_direction<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; 3] {
        let (c_hi, c_lo) = (self.min_theta.cos(), self.max_theta.cos());
        let u: f64 = rng.random();
        let cos_theta = c_lo + (c_hi - c_lo) * u;
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let v: f64 = rng.random();
        let phi = self.min_phi + (self.max_phi - self.min_phi) * v;
        [sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta]
    }
}

impl Default for EmissionCone {
    fn default() -> Self {
        Self {
            min_phi: 0.0,
            max_phi: 0.0,
            min_theta: 0.0,
            max_theta: 0.0,
        }
    }
}

/// Initial condition of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryVertex {
    /// Kinetic energy (MeV).
    pub energy: f64,
    pub position: [f64; 3],
    pub direction: [f64; 3],
}

/// Outcome of selecting a spectrum shape by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeSelection {
    Selected(&'static str),
    /// The request could not be honoured; the source now emits the default point spectrum.
    FellBack { requested: String, reason: String },
}

impl ShapeSelection {
    pub fn fell_back(&self) -> bool {
        matches!(self, ShapeSelection::FellBack { .. })
    }
}

/// The primary particle source: one spectrum, one RNG stream, one emission cone.
///
/// Each call to [`PrimarySource::generate`] draws exactly one energy and caches it, so the
/// end-of-event bookkeeping reads the same value that seeded the event.
#[derive(Debug)]
pub struct PrimarySource {
    particle: String,
    spectrum: SpectrumModel,
    cone: EmissionCone,
    rng: StdRng,
    last_energy: f64,
}

impl PrimarySource {
    /// Gamma source with the default point spectrum. `seed = None` draws a fresh seed.
    pub fn new(seed: Option<u64>) -> Self {
        let rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        Self {
            particle: "gamma".into(),
            spectrum: SpectrumModel::default(),
            cone: EmissionCone::default(),
            rng,
            last_energy: 0.0,
        }
    }

    /// Build from configuration. An unusable spectrum falls back to the point default with a
    /// warning; an invalid cone is an error.
    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        let mut source = Self::new(cfg.seed);
        source.particle = cfg.particle.clone();
        source.cone = EmissionCone::from_config(&cfg.cone)?;
        match SpectrumModel::from_config(&cfg.spectrum) {
            Ok(model) => source.spectrum = model,
            Err(err) => {
                source.fall_back(&cfg.spectrum.shape, &err);
            }
        }
        Ok(source)
    }

    pub fn particle(&self) -> &str {
        &self.particle
    }

    pub fn set_particle(&mut self, name: impl Into<String>) {
        self.particle = name.into();
    }

    pub fn spectrum(&self) -> &SpectrumModel {
        &self.spectrum
    }

    /// Mutable access for per-parameter setters on the active variant.
    pub fn spectrum_mut(&mut self) -> &mut SpectrumModel {
        &mut self.spectrum
    }

    pub fn set_spectrum(&mut self, model: SpectrumModel) {
        self.spectrum = model;
    }

    pub fn cone(&self) -> &EmissionCone {
        &self.cone
    }

    pub fn set_cone(&mut self, cone: EmissionCone) {
        self.cone = cone;
    }

    /// Replace the active spectrum with the default-parameter variant named `name`.
    /// Parameters of the previous shape are discarded.
    pub fn set_shape(&mut self, name: &str) -> ShapeSelection {
        match SpectrumModel::by_name(name) {
            Ok(model) => {
                self.spectrum = model;
                ShapeSelection::Selected(self.spectrum.name())
            }
            Err(err) => self.fall_back(name, &err),
        }
    }

    /// Revalidate the active spectrum, falling back to the point default if the current
    /// parameter combination is unusable.
    pub fn ensure_valid(&mut self) -> ShapeSelection {
        match self.spectrum.validate() {
            Ok(()) => ShapeSelection::Selected(self.spectrum.name()),
            Err(err) => {
                let name = self.spectrum.name();
                self.fall_back(name, &err)
            }
        }
    }

    fn fall_back(&mut self, requested: &str, err: &Error) -> ShapeSelection {
        warn!(
            "energy shape <{requested}> unusable ({err}); emission set to Point({} MeV)",
            crate::core::spectrum::DEFAULT_POINT_ENERGY
        );
        self.spectrum = SpectrumModel::Point(Point::default());
        ShapeSelection::FellBack {
            requested: requested.to_string(),
            reason: err.to_string(),
        }
    }

    /// Sample the next primary vertex. Draws the energy exactly once.
    pub fn generate(&mut self) -> PrimaryVertex {
        let energy = self.spectrum.sample(&mut self.rng);
        self.last_energy = energy;
        let direction = self.cone.sample_direction(&mut self.rng);
        PrimaryVertex {
            energy,
            position: [0.0; 3],
            direction,
        }
    }

    /// Energy of the most recent vertex (0 before the first one).
    pub fn last_energy(&self) -> f64 {
        self.last_energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectrumConfig;
    use crate::core::spectrum::{Exponential, DEFAULT_POINT_ENERGY};
    use std::f64::consts::PI;

    #[test]
    fn default_source_emits_six_mev_along_z() {
        let mut src = PrimarySource::new(Some(1));
        let v = src.generate();
        assert_eq!(v.energy, DEFAULT_POINT_ENERGY);
        assert_eq!(v.direction, [0.0, 0.0, 1.0]);
        assert_eq!(v.position, [0.0; 3]);
        assert_eq!(src.last_energy(), DEFAULT_POINT_ENERGY);
    }

    #[test]
    fn last_energy_tracks_latest_sample() {
        let mut src = PrimarySource::new(Some(99));
        assert!(!src.set_shape("Flat").fell_back());
        for _ in 0..10 {
            let v = src.generate();
            assert_eq!(src.last_energy(), v.energy);
        }
    }

    #[test]
    fn unknown_shape_falls_back_to_point() {
        let mut src = PrimarySource::new(Some(2));
        src.set_shape("Gamma");
        let sel = src.set_shape("Foo");
        assert!(sel.fell_back());
        match sel {
            ShapeSelection::FellBack { requested, .. } => assert_eq!(requested, "Foo"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(src.spectrum().name(), "Point");
        assert_eq!(src.generate().energy, DEFAULT_POINT_ENERGY);
    }

    #[test]
    fn invalid_range_detected_at_revalidation() -> Result<()> {
        let mut src = PrimarySource::new(Some(3));
        src.set_spectrum(SpectrumModel::Exponential(Exponential::new(-1.0, 1.0, 2.0)?));
        if let SpectrumModel::Exponential(s) = src.spectrum_mut() {
            s.set_min_energy(5.0)?;
        }
        assert!(src.ensure_valid().fell_back());
        assert_eq!(src.spectrum().name(), "Point");
        Ok(())
    }

    #[test]
    fn from_config_falls_back_on_bad_parameters() -> Result<()> {
        let cfg = SourceConfig {
            seed: Some(5),
            spectrum: SpectrumConfig {
                shape: "Gauss".into(),
                sigma: Some(-1.0),
                ..SpectrumConfig::default()
            },
            ..SourceConfig::default()
        };
        let src = PrimarySource::from_config(&cfg)?;
        assert_eq!(src.spectrum().name(), "Point");
        Ok(())
    }

    #[test]
    fn cone_directions_stay_inside_theta_band() -> Result<()> {
        let cone = EmissionCone::new(0.0, 2.0 * PI, 0.1, 0.3)?;
        let mut r = StdRng::seed_from_u64(11);
        for _ in 0..5_000 {
            let d = cone.sample_direction(&mut r);
            let norm = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
            let theta = d[2].acos();
            assert!(theta >= 0.1 - 1e-9 && theta <= 0.3 + 1e-9, "theta {theta}");
        }
        Ok(())
    }

    #[test]
    fn cone_rejects_inverted_theta() {
        assert!(EmissionCone::new(0.0, 1.0, 0.5, 0.2).is_err());
        assert!(EmissionCone::new(0.0, 1.0, 0.0, 4.0).is_err());
    }
}
