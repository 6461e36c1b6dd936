//! Sequential Monte Carlo estimation. The belief is a set of weighted particles which are moved by
//! a noisy motion model, reweighted by a Gaussian measurement likelihood and resampled after every
//! measurement.

use crate::error::{FilterError, Result};
use crate::filter::filter_traits::{Filter, VectorFunction};
use crate::filter::kalman_common::{check_finite, check_len};
use log::{debug, warn};
use ndarray::{s, Array1, ArrayBase, ArrayView1, Data, Ix1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

/// A single hypothesis of the state together with its importance weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub state: Array1<f64>,
    pub weight: f64,
}

/// Configuration of a `ParticleFilter`.
///
/// The state dimension is the length of `process_noise_std`. The first `measurement_dim` state
/// components are the ones observed by a measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleFilterConfig {
    pub particle_count: usize,
    pub process_noise_std: Vec<f64>,
    pub measurement_dim: usize,
    pub measurement_noise_std: f64,
    /// Seed of the per-filter generator, `None` seeds from system entropy.
    pub seed: Option<u64>,
}

impl Default for ParticleFilterConfig {
    /// Planar pose `[x, y, θ]` with position measurements.
    fn default() -> Self {
        ParticleFilterConfig {
            particle_count: 100,
            process_noise_std: vec![0.2, 0.2, 0.05],
            measurement_dim: 2,
            measurement_noise_std: 1.0,
            seed: None,
        }
    }
}

impl ParticleFilterConfig {
    pub fn with_particle_count(mut self, particle_count: usize) -> Self {
        self.particle_count = particle_count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.particle_count == 0 {
            return Err(FilterError::InvalidParameter(
                "particle count must be at least one".to_string(),
            ));
        }
        if self.process_noise_std.is_empty() {
            return Err(FilterError::InvalidParameter(
                "process noise must cover at least one state component".to_string(),
            ));
        }
        if self.measurement_dim == 0 || self.measurement_dim > self.process_noise_std.len() {
            return Err(FilterError::InvalidParameter(format!(
                "measurement dimension {} must be between 1 and the state dimension {}",
                self.measurement_dim,
                self.process_noise_std.len()
            )));
        }
        if !(self.measurement_noise_std > 0.0) || !self.measurement_noise_std.is_finite() {
            return Err(FilterError::InvalidParameter(format!(
                "measurement noise standard deviation must be positive, got {}",
                self.measurement_noise_std
            )));
        }
        Ok(())
    }
}

fn zero_mean_normals(std_devs: &[f64]) -> Result<Vec<Normal<f64>>> {
    std_devs
        .iter()
        .map(|&std_dev| {
            Normal::new(0.0, std_dev).map_err(|err| {
                FilterError::InvalidParameter(format!(
                    "invalid noise standard deviation {}: {}",
                    std_dev, err
                ))
            })
        })
        .collect()
}

/// Particle filter with additive Gaussian process noise and systematic resampling.
///
/// Every filter owns its generator, so filters built from the same seeded configuration evolve
/// identically.
///
/// ```
/// use ndarray::arr1;
/// use rusty_estimation::{Filter, ParticleFilter, ParticleFilterConfig};
///
/// let config = ParticleFilterConfig::default().with_particle_count(10).with_seed(42);
/// let mut pf = ParticleFilter::with_config(config).unwrap();
/// assert!(pf.particles().iter().all(|p| p.weight == 0.1));
///
/// pf.predict().unwrap();
/// pf.update(&arr1(&[0.5, -0.5])).unwrap();
/// assert_eq!(pf.particles().len(), 10);
/// ```
pub struct ParticleFilter {
    config: ParticleFilterConfig,
    particles: Vec<Particle>,
    process_noise: Vec<Normal<f64>>,
    motion_model: Option<VectorFunction<f64>>,
    rng: StdRng,
}

impl ParticleFilter {
    /// Creates a filter of `particle_count` particles with the default configuration.
    pub fn new(particle_count: usize) -> Result<Self> {
        Self::with_config(ParticleFilterConfig::default().with_particle_count(particle_count))
    }

    pub fn with_config(config: ParticleFilterConfig) -> Result<Self> {
        config.validate()?;
        let process_noise = zero_mean_normals(&config.process_noise_std)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let weight = 1.0 / config.particle_count as f64;
        let particles = vec![
            Particle {
                state: Array1::zeros(config.process_noise_std.len()),
                weight,
            };
            config.particle_count
        ];

        Ok(ParticleFilter {
            config,
            particles,
            process_noise,
            motion_model: None,
            rng,
        })
    }

    /// Places every particle at `initial_state` with uniform weight.
    pub fn initialize(
        &mut self,
        initial_state: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<()> {
        check_len("initial state", initial_state, self.state_dim())?;
        check_finite("initial state", initial_state)?;
        let weight = self.uniform_weight();
        for particle in self.particles.iter_mut() {
            particle.state = initial_state.to_owned();
            particle.weight = weight;
        }
        Ok(())
    }

    /// Scatters the particles around `initial_state` with independent Gaussian spread per
    /// component, drawn from the filter's own generator.
    pub fn initialize_gaussian(
        &mut self,
        initial_state: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        std_devs: &[f64],
    ) -> Result<()> {
        let n = self.state_dim();
        check_len("initial state", initial_state, n)?;
        check_finite("initial state", initial_state)?;
        if std_devs.len() != n {
            return Err(FilterError::shape("initial spread", &[n], &[std_devs.len()]));
        }
        let spread = zero_mean_normals(std_devs)?;

        let weight = self.uniform_weight();
        let rng = &mut self.rng;
        for particle in self.particles.iter_mut() {
            let mut state = initial_state.to_owned();
            for (value, normal) in state.iter_mut().zip(&spread) {
                *value += normal.sample(&mut *rng);
            }
            particle.state = state;
            particle.weight = weight;
        }
        Ok(())
    }

    /// Sets the deterministic part of the motion model, applied to every particle before the
    /// process noise. Without one particles perform a random walk.
    pub fn set_motion_model<F>(&mut self, motion_model: F)
    where
        F: Fn(&ArrayView1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        self.motion_model = Some(Box::new(motion_model));
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn config(&self) -> &ParticleFilterConfig {
        &self.config
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn state_dim(&self) -> usize {
        self.config.process_noise_std.len()
    }

    pub fn measurement_dim(&self) -> usize {
        self.config.measurement_dim
    }

    /// `1 / Σ wᵢ²`, ranging from 1 (all weight on one particle) to the particle count.
    pub fn effective_sample_size(&self) -> f64 {
        effective_sample_size(self.particles.iter().map(|p| p.weight))
    }

    /// Weighted mean of the particle states.
    pub fn estimate(&self) -> Array1<f64> {
        self.particles
            .iter()
            .fold(Array1::zeros(self.state_dim()), |acc, particle| {
                acc + &particle.state * particle.weight
            })
    }

    fn uniform_weight(&self) -> f64 {
        1.0 / self.particles.len() as f64
    }

    /// Gaussian likelihood of `measurement` given the observed components of `state`.
    fn likelihood<S: Data<Elem = f64>>(
        &self,
        state: &Array1<f64>,
        measurement: &ArrayBase<S, Ix1>,
    ) -> f64 {
        let m = self.config.measurement_dim;
        let variance = self.config.measurement_noise_std * self.config.measurement_noise_std;
        let normalization = (2.0 * PI * variance).powf(-(m as f64) / 2.0);
        let squared_distance: f64 = state
            .slice(s![..m])
            .iter()
            .zip(measurement.iter())
            .map(|(s, z)| (s - z) * (s - z))
            .sum();
        normalization * (-squared_distance / (2.0 * variance)).exp()
    }
}

fn effective_sample_size(weights: impl Iterator<Item = f64>) -> f64 {
    1.0 / weights.map(|w| w * w).sum::<f64>()
}

/// Systematic resampling of normalized `weights`.
///
/// The `i`-th pointer is `offset + i/N`, with `offset` in `[0, 1/N)`. Each pointer selects the
/// first index whose cumulative weight reaches it, so the returned indices are nondecreasing and
/// always `N` long. Leading zero-weight entries are skipped, so an offset of exactly `0` never
/// selects a particle without weight.
///
/// ```
/// use rusty_estimation::filter::particle::systematic_resample;
///
/// let indices = systematic_resample(&[0.0, 0.5, 0.0, 0.5], 0.125);
/// assert_eq!(indices, vec![1, 1, 3, 3]);
/// ```
pub fn systematic_resample(weights: &[f64], offset: f64) -> Vec<usize> {
    let n = weights.len();
    let mut indices = Vec::with_capacity(n);
    if n == 0 {
        return indices;
    }
    let step = 1.0 / n as f64;
    let mut cumulative = weights[0];
    let mut i = 0;
    while weights[i] <= 0.0 && i < n - 1 {
        i += 1;
        cumulative += weights[i];
    }
    for m in 0..n {
        let pointer = offset + m as f64 * step;
        while pointer > cumulative && i < n - 1 {
            i += 1;
            cumulative += weights[i];
        }
        indices.push(i);
    }
    indices
}

impl Filter<f64> for ParticleFilter {
    /// Moves every particle through the motion model and adds independently sampled process noise.
    fn predict(&mut self) -> Result<()> {
        let n = self.config.process_noise_std.len();
        let mut moved = Vec::with_capacity(self.particles.len());
        for particle in &self.particles {
            let mut state = match &self.motion_model {
                Some(model) => {
                    let state = model(&particle.state.view());
                    check_len("motion model output", &state, n)?;
                    state
                }
                None => particle.state.clone(),
            };
            for (value, noise) in state.iter_mut().zip(&self.process_noise) {
                *value += noise.sample(&mut self.rng);
            }
            check_finite("predicted particle", &state)?;
            moved.push(state);
        }

        for (particle, state) in self.particles.iter_mut().zip(moved) {
            particle.state = state;
        }
        Ok(())
    }

    /// Importance weighting followed by systematic resampling. If every weight collapses to zero
    /// the weights fall back to uniform before resampling.
    fn update<S: Data<Elem = f64>>(&mut self, measurement: &ArrayBase<S, Ix1>) -> Result<()> {
        check_len("measurement", measurement, self.config.measurement_dim)?;
        check_finite("measurement", measurement)?;

        let mut weights: Vec<f64> = self
            .particles
            .iter()
            .map(|particle| particle.weight * self.likelihood(&particle.state, measurement))
            .collect();
        let total: f64 = weights.iter().sum();
        let uniform = self.uniform_weight();
        if total > 0.0 && total.is_finite() {
            weights.iter_mut().for_each(|w| *w /= total);
        } else {
            warn!(
                "particle weights degenerated (total {}), resetting to uniform",
                total
            );
            weights.iter_mut().for_each(|w| *w = uniform);
        }
        debug!(
            "effective sample size before resampling: {:.2} of {}",
            effective_sample_size(weights.iter().copied()),
            weights.len()
        );

        let offset = self.rng.gen_range(0.0..uniform);
        let resampled: Vec<Particle> = systematic_resample(&weights, offset)
            .into_iter()
            .map(|i| Particle {
                state: self.particles[i].state.clone(),
                weight: uniform,
            })
            .collect();
        self.particles = resampled;
        Ok(())
    }
}
