//! Primary energy spectra.
//!
//! Every shape is a variant of [`SpectrumModel`]; each variant owns its parameters and any
//! normalisation-derived constants, which its setters recompute before returning. Energies
//! are in MeV.

use crate::config::SpectrumConfig;
use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Gamma as GammaDist, StandardNormal};
use std::f64::consts::PI;

/// Energy of the fallback point spectrum (MeV).
pub const DEFAULT_POINT_ENERGY: f64 = 6.0;

/// Tolerance below which `max_min_prop` is treated as exactly one (flat linear density).
const EPS_PROP: f64 = 1e-12;

fn check_energy(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidParam(format!(
            "{name} must be finite and >= 0, got {value}"
        )));
    }
    Ok(value)
}

fn check_finite(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(Error::InvalidParam(format!("{name} must be finite, got {value}")));
    }
    Ok(value)
}

fn check_range(shape: &str, min: f64, max: f64) -> Result<()> {
    if min >= max {
        return Err(Error::InvalidParam(format!(
            "{shape}: min_energy ({min}) must be below max_energy ({max})"
        )));
    }
    Ok(())
}

/// Fixed energy, no randomness.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    energy: f64,
}

impl Point {
    pub fn new(energy: f64) -> Result<Self> {
        Ok(Self {
            energy: check_energy("energy", energy)?,
        })
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn set_energy(&mut self, energy: f64) -> Result<()> {
        self.energy = check_energy("energy", energy)?;
        Ok(())
    }
}

impl Default for Point {
    fn default() -> Self {
        Self {
            energy: DEFAULT_POINT_ENERGY,
        }
    }
}

/// Uniform on `[min_energy, max_energy]`. A zero-width range always yields `min_energy`.
#[derive(Debug, Clone, PartialEq)]
pub struct Flat {
    min_energy: f64,
    max_energy: f64,
}

impl Flat {
    pub fn new(min_energy: f64, max_energy: f64) -> Result<Self> {
        let mut s = Self::default();
        s.set_min_energy(min_energy)?;
        s.set_max_energy(max_energy)?;
        Ok(s)
    }

    pub fn min_energy(&self) -> f64 {
        self.min_energy
    }

    pub fn max_energy(&self) -> f64 {
        self.max_energy
    }

    pub fn set_min_energy(&mut self, energy: f64) -> Result<()> {
        self.min_energy = check_energy("min_energy", energy)?;
        Ok(())
    }

    pub fn set_max_energy(&mut self, energy: f64) -> Result<()> {
        self.max_energy = check_energy("max_energy", energy)?;
        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        self.min_energy + (self.max_energy - self.min_energy) * u
    }
}

impl Default for Flat {
    fn default() -> Self {
        Self {
            min_energy: 0.0,
            max_energy: DEFAULT_POINT_ENERGY,
        }
    }
}

/// Normal distribution, clamped at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    mean: f64,
    sigma: f64,
}

impl Gaussian {
    pub fn new(mean: f64, sigma: f64) -> Result<Self> {
        let mut s = Self::default();
        s.set_mean(mean)?;
        s.set_sigma(sigma)?;
        Ok(s)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn set_mean(&mut self, mean: f64) -> Result<()> {
        self.mean = check_finite("mean", mean)?;
        Ok(())
    }

    pub fn set_sigma(&mut self, sigma: f64) -> Result<()> {
        self.sigma = check_energy("sigma", sigma)?;
        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        (self.mean + self.sigma * z).max(0.0)
    }
}

impl Default for Gaussian {
    fn default() -> Self {
        Self {
            mean: DEFAULT_POINT_ENERGY,
            sigma: 1.0,
        }
    }
}

/// Breit-Wigner (Cauchy) resonance with full width `width`, clamped at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct BreitWigner {
    mean: f64,
    width: f64,
}

impl BreitWigner {
    pub fn new(mean: f64, width: f64) -> Result<Self> {
        let mut s = Self::default();
        s.set_mean(mean)?;
        s.set_width(width)?;
        Ok(s)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn set_mean(&mut self, mean: f64) -> Result<()> {
        self.mean = check_finite("mean", mean)?;
        Ok(())
    }

    pub fn set_width(&mut self, width: f64) -> Result<()> {
        self.width = check_energy("width", width)?;
        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let displacement = 0.5 * self.width * (PI * (u - 0.5)).tan();
        (self.mean + displacement).max(0.0)
    }
}

impl Default for BreitWigner {
    fn default() -> Self {
        Self {
            mean: DEFAULT_POINT_ENERGY,
            width: 1.0,
        }
    }
}

/// Exponential density `norm * exp(rate * E)` truncated to `[min_energy, max_energy]`.
///
/// `rate` may be negative (falling spectrum) but not zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Exponential {
    rate: f64,
    min_energy: f64,
    max_energy: f64,
    /// `rate / (exp(rate*max) - exp(rate*min))`
    norm: f64,
    /// `exp(rate*(max-min)) - 1`, the same normalisation expressed relative to `min`.
    span: f64,
}

impl Exponential {
    pub fn new(rate: f64, min_energy: f64, max_energy: f64) -> Result<Self> {
        let mut s = Self::default();
        s.set_rate(rate)?;
        s.set_min_energy(min_energy)?;
        s.set_max_energy(max_energy)?;
        Ok(s)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn min_energy(&self) -> f64 {
        self.min_energy
    }

    pub fn max_energy(&self) -> f64 {
        self.max_energy
    }

    pub fn norm(&self) -> f64 {
        self.norm
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        let rate = check_finite("rate", rate)?;
        if rate == 0.0 {
            return Err(Error::InvalidParam("exponential rate must be non-zero".into()));
        }
        self.rate = rate;
        self.calculate_norm();
        Ok(())
    }

    pub fn set_min_energy(&mut self, energy: f64) -> Result<()> {
        self.min_energy = check_energy("min_energy", energy)?;
        self.calculate_norm();
        Ok(())
    }

    pub fn set_max_energy(&mut self, energy: f64) -> Result<()> {
        self.max_energy = check_energy("max_energy", energy)?;
        self.calculate_norm();
        Ok(())
    }

    fn calculate_norm(&mut self) {
        let k = self.rate;
        self.span = (k * (self.max_energy - self.min_energy)).exp_m1();
        // exp(k*max) - exp(k*min) == exp(k*min) * span, finite for small |k|
        self.norm = k / ((k * self.min_energy).exp() * self.span);
    }

    // Inverse CDF: E = ln(exp(k*min) + k*U/norm) / k, rewritten around `min` so that
    // exp(k*E) never has to be formed for large |k*E|.
    fn invert(&self, u: f64) -> f64 {
        self.min_energy + (u * self.span).ln_1p() / self.rate
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        self.invert(u).max(self.min_energy).min(self.max_energy)
    }
}

impl Default for Exponential {
    fn default() -> Self {
        let mut s = Self {
            rate: -1.0,
            min_energy: 0.1,
            max_energy: DEFAULT_POINT_ENERGY,
            norm: 0.0,
            span: 0.0,
        };
        s.calculate_norm();
        s
    }
}

/// Linear density on `[min_energy, max_energy]` with `f(max) / f(min) = max_min_prop`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    min_energy: f64,
    max_energy: f64,
    max_min_prop: f64,
    /// Root of the density line, `(prop*min - max) / (prop - 1)`. Infinite when flat.
    x0: f64,
    norm: f64,
}

impl Linear {
    pub fn new(min_energy: f64, max_energy: f64, max_min_prop: f64) -> Result<Self> {
        let mut s = Self::default();
        s.set_min_energy(min_energy)?;
        s.set_max_energy(max_energy)?;
        s.set_max_min_prop(max_min_prop)?;
        Ok(s)
    }

    pub fn min_energy(&self) -> f64 {
        self.min_energy
    }

    pub fn max_energy(&self) -> f64 {
        self.max_energy
    }

    pub fn max_min_prop(&self) -> f64 {
        self.max_min_prop
    }

    pub fn norm(&self) -> f64 {
        self.norm
    }

    pub fn set_min_energy(&mut self, energy: f64) -> Result<()> {
        self.min_energy = check_energy("min_energy", energy)?;
        self.calculate_norm();
        Ok(())
    }

    pub fn set_max_energy(&mut self, energy: f64) -> Result<()> {
        self.max_energy = check_energy("max_energy", energy)?;
        self.calculate_norm();
        Ok(())
    }

    pub fn set_max_min_prop(&mut self, prop: f64) -> Result<()> {
        let prop = check_finite("max_min_prop", prop)?;
        if prop < 0.0 {
            return Err(Error::InvalidParam(format!(
                "max_min_prop must be >= 0, got {prop}"
            )));
        }
        self.max_min_prop = prop;
        self.calculate_norm();
        Ok(())
    }

    fn is_flat(&self) -> bool {
        (self.max_min_prop - 1.0).abs() < EPS_PROP
    }

    fn calculate_norm(&mut self) {
        let (min, max) = (self.min_energy, self.max_energy);
        if self.is_flat() {
            self.x0 = f64::INFINITY;
            self.norm = 1.0 / (max - min);
            return;
        }
        let x0 = (self.max_min_prop * min - max) / (self.max_min_prop - 1.0);
        self.x0 = x0;
        self.norm = 1.0 / (x0 * (min - max) + (max * max - min * min) / 2.0);
    }

    fn invert(&self, u: f64) -> f64 {
        let (min, max) = (self.min_energy, self.max_energy);
        if self.is_flat() {
            return min + (max - min) * u;
        }
        let x0 = self.x0;
        let alpha = x0 * min - min * min / 2.0 - u / self.norm;
        let root = (x0 * x0 - 2.0 * alpha).max(0.0).sqrt();
        // The density vanishes at x0: above the range when falling, below it when rising.
        if x0 >= max {
            x0 - root
        } else {
            x0 + root
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        self.invert(u).max(self.min_energy).min(self.max_energy)
    }
}

impl Default for Linear {
    fn default() -> Self {
        let mut s = Self {
            min_energy: 1.0,
            max_energy: DEFAULT_POINT_ENERGY,
            max_min_prop: 0.5,
            x0: 0.0,
            norm: 0.0,
        };
        s.calculate_norm();
        s
    }
}

/// Gamma distribution with shape `k` and rate `lambda` (mean `k / lambda`).
#[derive(Debug, Clone)]
pub struct Gamma {
    k: f64,
    lambda: f64,
    dist: GammaDist<f64>,
}

impl Gamma {
    pub fn new(k: f64, lambda: f64) -> Result<Self> {
        let dist = build_gamma(k, lambda)?;
        Ok(Self { k, lambda, dist })
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn set_k(&mut self, k: f64) -> Result<()> {
        self.dist = build_gamma(k, self.lambda)?;
        self.k = k;
        Ok(())
    }

    pub fn set_lambda(&mut self, lambda: f64) -> Result<()> {
        self.dist = build_gamma(self.k, lambda)?;
        self.lambda = lambda;
        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.dist.sample(rng)
    }
}

fn build_gamma(k: f64, lambda: f64) -> Result<GammaDist<f64>> {
    if !k.is_finite() || k <= 0.0 {
        return Err(Error::InvalidParam(format!("gamma k must be > 0, got {k}")));
    }
    if !lambda.is_finite() || lambda <= 0.0 {
        return Err(Error::InvalidParam(format!(
            "gamma lambda must be > 0, got {lambda}"
        )));
    }
    GammaDist::new(k, 1.0 / lambda).map_err(|e| Error::InvalidParam(format!("gamma: {e}")))
}

/// The active primary energy spectrum.
#[derive(Debug, Clone)]
pub enum SpectrumModel {
    Point(Point),
    Flat(Flat),
    Gaussian(Gaussian),
    BreitWigner(BreitWigner),
    Exponential(Exponential),
    Linear(Linear),
    Gamma(Gamma),
}

type Constructor = fn() -> Result<SpectrumModel>;

/// Shape names accepted by [`SpectrumModel::by_name`], each mapped to its default variant.
const REGISTRY: &[(&str, Constructor)] = &[
    ("Point", || Ok(SpectrumModel::Point(Point::default()))),
    ("Flat", || Ok(SpectrumModel::Flat(Flat::default()))),
    ("Gauss", || Ok(SpectrumModel::Gaussian(Gaussian::default()))),
    ("Gaussian", || Ok(SpectrumModel::Gaussian(Gaussian::default()))),
    ("Breit-Wigner", || Ok(SpectrumModel::BreitWigner(BreitWigner::default()))),
    ("BreitWigner", || Ok(SpectrumModel::BreitWigner(BreitWigner::default()))),
    ("Exponential", || Ok(SpectrumModel::Exponential(Exponential::default()))),
    ("Linear", || Ok(SpectrumModel::Linear(Linear::default()))),
    ("Gamma", || Gamma::new(2.0, 0.5).map(SpectrumModel::Gamma)),
];

impl Default for SpectrumModel {
    fn default() -> Self {
        SpectrumModel::Point(Point::default())
    }
}

impl SpectrumModel {
    /// Names with a registered constructor.
    pub fn shape_names() -> impl Iterator<Item = &'static str> {
        REGISTRY.iter().map(|(name, _)| *name)
    }

    /// Build the default-parameter variant registered under `name`.
    pub fn by_name(name: &str) -> Result<Self> {
        let (_, ctor) = REGISTRY
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| Error::UnknownShape(name.to_string()))?;
        ctor()
    }

    /// Build a spectrum from configuration: registry lookup, then the configured parameters
    /// through the variant setters, then cross-parameter validation.
    pub fn from_config(cfg: &SpectrumConfig) -> Result<Self> {
        let mut model = Self::by_name(&cfg.shape)?;
        match &mut model {
            SpectrumModel::Point(s) => {
                if let Some(e) = cfg.energy {
                    s.set_energy(e)?;
                }
            }
            SpectrumModel::Flat(s) => {
                if let Some(e) = cfg.min_energy {
                    s.set_min_energy(e)?;
                }
                if let Some(e) = cfg.max_energy {
                    s.set_max_energy(e)?;
                }
            }
            SpectrumModel::Gaussian(s) => {
                if let Some(m) = cfg.mean {
                    s.set_mean(m)?;
                }
                if let Some(sig) = cfg.sigma {
                    s.set_sigma(sig)?;
                }
            }
            SpectrumModel::BreitWigner(s) => {
                if let Some(m) = cfg.mean {
                    s.set_mean(m)?;
                }
                if let Some(w) = cfg.width {
                    s.set_width(w)?;
                }
            }
            SpectrumModel::Exponential(s) => {
                if let Some(r) = cfg.rate {
                    s.set_rate(r)?;
                }
                if let Some(e) = cfg.min_energy {
                    s.set_min_energy(e)?;
                }
                if let Some(e) = cfg.max_energy {
                    s.set_max_energy(e)?;
                }
            }
            SpectrumModel::Linear(s) => {
                if let Some(e) = cfg.min_energy {
                    s.set_min_energy(e)?;
                }
                if let Some(e) = cfg.max_energy {
                    s.set_max_energy(e)?;
                }
                if let Some(p) = cfg.max_min_prop {
                    s.set_max_min_prop(p)?;
                }
            }
            SpectrumModel::Gamma(s) => {
                if let Some(k) = cfg.k {
                    s.set_k(k)?;
                }
                if let Some(l) = cfg.lambda {
                    s.set_lambda(l)?;
                }
            }
        }
        model.validate()?;
        Ok(model)
    }

    /// Canonical shape name.
    pub fn name(&self) -> &'static str {
        match self {
            SpectrumModel::Point(_) => "Point",
            SpectrumModel::Flat(_) => "Flat",
            SpectrumModel::Gaussian(_) => "Gauss",
            SpectrumModel::BreitWigner(_) => "Breit-Wigner",
            SpectrumModel::Exponential(_) => "Exponential",
            SpectrumModel::Linear(_) => "Linear",
            SpectrumModel::Gamma(_) => "Gamma",
        }
    }

    /// Check parameter combinations that the individual setters cannot see.
    pub fn validate(&self) -> Result<()> {
        match self {
            SpectrumModel::Flat(s) => {
                if s.min_energy > s.max_energy {
                    return Err(Error::InvalidParam(format!(
                        "Flat: min_energy ({}) exceeds max_energy ({})",
                        s.min_energy, s.max_energy
                    )));
                }
                Ok(())
            }
            SpectrumModel::Exponential(s) => check_range("Exponential", s.min_energy, s.max_energy),
            SpectrumModel::Linear(s) => check_range("Linear", s.min_energy, s.max_energy),
            _ => Ok(()),
        }
    }

    /// Draw one energy (MeV). Never fails; parameters are assumed to be valid.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            SpectrumModel::Point(s) => s.energy,
            SpectrumModel::Flat(s) => s.sample(rng),
            SpectrumModel::Gaussian(s) => s.sample(rng),
            SpectrumModel::BreitWigner(s) => s.sample(rng),
            SpectrumModel::Exponential(s) => s.sample(rng),
            SpectrumModel::Linear(s) => s.sample(rng),
            SpectrumModel::Gamma(s) => s.sample(rng),
        }
    }
}
