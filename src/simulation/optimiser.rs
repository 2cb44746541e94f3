//! Bounded, derivative-free minimisation used to fit adoption curves.
use crate::model::OptimiserParameters;
use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

/// Smallest population for which distinct donor vectors can always be chosen
const MIN_POPULATION: usize = 4;

/// Range from which the mutation factor is drawn anew for each generation
const MUTATION_RANGE: std::ops::Range<f64> = 0.5..1.0;

/// Probability that each parameter is taken from the mutant vector
const CROSSOVER_PROBABILITY: f64 = 0.7;

/// Absolute term added to the convergence tolerance, so that perfect fits can converge
const ABSOLUTE_TOLERANCE: f64 = 1e-12;

/// The result of a minimisation
#[derive(Debug, Clone, PartialEq)]
pub struct OptimiserSolution {
    /// The best parameters found
    pub params: Vec<f64>,
    /// The value of the objective function at `params`
    pub objective: f64,
    /// The number of iterations performed
    pub iterations: u32,
    /// Whether the convergence criterion was met before the iteration limit
    pub converged: bool,
}

/// A method for minimising a function within bounds
pub trait Optimiser {
    /// Minimise `objective` over the box given by `bounds`.
    ///
    /// Each element of `bounds` gives the inclusive lower and upper bound for one parameter.
    fn minimise(&self, objective: &dyn Fn(&[f64]) -> f64, bounds: &[(f64, f64)])
    -> OptimiserSolution;
}

/// Differential evolution with the `best1bin` strategy.
///
/// Mutant vectors are formed from the best member of the population plus a scaled difference of
/// two other members, with the scale (dither) drawn at random each generation. Results are
/// reproducible for a given seed.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialEvolution {
    seed: u64,
    population_per_parameter: usize,
    max_iterations: u32,
    tolerance: f64,
}

impl DifferentialEvolution {
    /// Create a new optimiser from model parameters
    pub fn from_parameters(params: &OptimiserParameters) -> Self {
        Self {
            seed: params.seed,
            population_per_parameter: params.population_size,
            max_iterations: params.max_iterations,
            tolerance: params.tolerance,
        }
    }

    /// Whether the spread of objective values is small relative to their mean
    fn has_converged(&self, energies: &[f64]) -> bool {
        let n = energies.len() as f64;
        let mean = energies.iter().sum::<f64>() / n;
        let variance = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;

        variance.sqrt() <= ABSOLUTE_TOLERANCE + self.tolerance * mean.abs()
    }
}

/// Map a point in the unit hypercube onto the bounds
fn scale(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    unit.iter()
        .zip(bounds)
        .map(|(x, (lower, upper))| lower + x * (upper - lower))
        .collect()
}

/// Evaluate the objective, treating non-finite values as infinitely bad
fn evaluate(objective: &dyn Fn(&[f64]) -> f64, params: &[f64]) -> f64 {
    let value = objective(params);
    if value.is_nan() { f64::INFINITY } else { value }
}

/// Index of the population member with the lowest objective value
fn best_index(energies: &[f64]) -> usize {
    energies
        .iter()
        .position_min_by(|a, b| a.total_cmp(b))
        .unwrap_or_default()
}

impl Optimiser for DifferentialEvolution {
    fn minimise(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        bounds: &[(f64, f64)],
    ) -> OptimiserSolution {
        let dimensions = bounds.len();
        let population_size = (self.population_per_parameter * dimensions).max(MIN_POPULATION);
        let mut rng = SmallRng::seed_from_u64(self.seed);

        // Work in the unit hypercube so that every parameter is treated on the same scale
        let mut population = (0..population_size)
            .map(|_| (0..dimensions).map(|_| rng.random::<f64>()).collect_vec())
            .collect_vec();
        let mut energies = population
            .iter()
            .map(|member| evaluate(objective, &scale(member, bounds)))
            .collect_vec();

        let mut iterations = 0;
        let mut converged = self.has_converged(&energies);
        while !converged && iterations < self.max_iterations {
            iterations += 1;
            let mutation = rng.random_range(MUTATION_RANGE);

            for i in 0..population_size {
                let best = best_index(&energies);
                let donors = sample(&mut rng, population_size, 3)
                    .into_iter()
                    .filter(|&donor| donor != i)
                    .take(2)
                    .collect_vec();
                let forced = rng.random_range(0..dimensions);

                let mut trial = population[i].clone();
                for (j, value) in trial.iter_mut().enumerate() {
                    if j == forced || rng.random::<f64>() < CROSSOVER_PROBABILITY {
                        *value = population[best][j]
                            + mutation * (population[donors[0]][j] - population[donors[1]][j]);
                    }

                    // Out-of-bounds parameters are replaced with random values
                    if !(0.0..=1.0).contains(value) {
                        *value = rng.random::<f64>();
                    }
                }

                let energy = evaluate(objective, &scale(&trial, bounds));
                if energy <= energies[i] {
                    population[i] = trial;
                    energies[i] = energy;
                }
            }

            converged = self.has_converged(&energies);
        }

        let best = best_index(&energies);
        OptimiserSolution {
            params: scale(&population[best], bounds),
            objective: energies[best],
            iterations,
            converged,
        }
    }
}
