//! Discrete hidden Markov model
//!
//! A finite set of hidden states emitting symbols from a finite alphabet.
//! States and symbols are arbitrary values compared by equality; internally
//! everything is indexed, and lookups that miss return `None`.
//!
//! # Algorithms
//!
//! - forward / backward recursions, plain and scaled (Rabiner scaling:
//!   every forward row is renormalised and the scalers `c_t = 1 / Σ α_t`
//!   are kept, giving `log P(O) = -Σ log c_t`)
//! - Viterbi decoding in log space
//! - Baum-Welch re-estimation over one or many sequences, pooling the
//!   expected counts of all sequences before normalising
//!
//! Training stops at the first iteration that does not improve the total
//! log-likelihood; that iteration's parameters are discarded.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::TrainingOptions;
use crate::errors::HmmError;

/// Allowed deviation of a probability row sum from one
pub const STOCHASTIC_TOLERANCE: f64 = 0.01;

/// Largest admissible transition probability (rounding slack)
pub const MAX_PROBABILITY: f64 = 1.01;

/// Structure of an untrained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Every state reaches every state with equal probability
    Ergodic,
    /// State i either stays or advances to i + 1 (0.5 each); the last state stays
    LeftToRight,
}

/// Outcome of a Baum-Welch run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Accepted re-estimation iterations
    pub iterations: usize,
    /// Total log-likelihood of the training data before training
    pub initial_log_likelihood: f64,
    /// Total log-likelihood after training
    pub final_log_likelihood: f64,
    /// True when training stopped on a non-improving step rather than the cap
    pub converged: bool,
}

/// Discrete HMM over states `S` and symbols `O`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteHmm<S, O> {
    states: Vec<S>,
    symbols: Vec<O>,
    initial: DVector<f64>,
    transition: DMatrix<f64>,
    emission: DMatrix<f64>,
}

fn check_unique<T: PartialEq>(items: &[T], context: &'static str) -> Result<(), HmmError> {
    if items.is_empty() {
        return Err(HmmError::Empty { context });
    }
    for (index, item) in items.iter().enumerate() {
        if items[..index].contains(item) {
            return Err(HmmError::Duplicate { context, index });
        }
    }
    Ok(())
}

fn check_row_sum(sum: f64, context: &'static str, row: usize) -> Result<(), HmmError> {
    if !sum.is_finite() || (sum - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(HmmError::NotStochastic { context, row, sum });
    }
    Ok(())
}

fn check_stochastic_rows(
    matrix: &DMatrix<f64>,
    context: &'static str,
    max_entry: f64,
) -> Result<(), HmmError> {
    for (row, values) in matrix.row_iter().enumerate() {
        for (col, &value) in values.iter().enumerate() {
            if !(0.0..=max_entry).contains(&value) {
                return Err(HmmError::OutOfRange {
                    context,
                    row,
                    col,
                    value,
                });
            }
        }
        check_row_sum(values.sum(), context, row)?;
    }
    Ok(())
}

fn check_shape(
    matrix: &DMatrix<f64>,
    rows: usize,
    cols: usize,
    context: &'static str,
) -> Result<(), HmmError> {
    if matrix.nrows() != rows {
        return Err(HmmError::DimensionMismatch {
            context,
            expected: rows,
            actual: matrix.nrows(),
        });
    }
    if matrix.ncols() != cols {
        return Err(HmmError::DimensionMismatch {
            context,
            expected: cols,
            actual: matrix.ncols(),
        });
    }
    Ok(())
}

/// Expected counts pooled over all training sequences
struct Accumulator {
    initial: DVector<f64>,
    transition_num: DMatrix<f64>,
    transition_den: DVector<f64>,
    emission_num: DMatrix<f64>,
    emission_den: DVector<f64>,
    sequences: usize,
}

impl Accumulator {
    fn new(n: usize, m: usize) -> Self {
        Self {
            initial: DVector::zeros(n),
            transition_num: DMatrix::zeros(n, n),
            transition_den: DVector::zeros(n),
            emission_num: DMatrix::zeros(n, m),
            emission_den: DVector::zeros(n),
            sequences: 0,
        }
    }
}

impl<S: PartialEq + Clone, O: PartialEq + Clone> DiscreteHmm<S, O> {
    /// Build a model from explicit probabilities.
    ///
    /// # Arguments
    /// * `states` - distinct hidden states
    /// * `symbols` - distinct observable symbols
    /// * `initial` - initial state distribution (length = states)
    /// * `transition` - states × states, row-stochastic
    /// * `emission` - states × symbols, row-stochastic
    ///
    /// # Returns
    /// The model, or the first validation failure
    pub fn new(
        states: Vec<S>,
        symbols: Vec<O>,
        initial: DVector<f64>,
        transition: DMatrix<f64>,
        emission: DMatrix<f64>,
    ) -> Result<Self, HmmError> {
        check_unique(&states, "states")?;
        check_unique(&symbols, "symbols")?;
        let n = states.len();
        let m = symbols.len();

        if initial.len() != n {
            return Err(HmmError::DimensionMismatch {
                context: "initial distribution",
                expected: n,
                actual: initial.len(),
            });
        }
        for (col, &value) in initial.iter().enumerate() {
            if !(0.0..=MAX_PROBABILITY).contains(&value) {
                return Err(HmmError::OutOfRange {
                    context: "initial distribution",
                    row: 0,
                    col,
                    value,
                });
            }
        }
        check_row_sum(initial.sum(), "initial distribution", 0)?;

        check_shape(&transition, n, n, "transition matrix")?;
        check_stochastic_rows(&transition, "transition matrix", MAX_PROBABILITY)?;
        check_shape(&emission, n, m, "emission matrix")?;
        check_stochastic_rows(&emission, "emission matrix", MAX_PROBABILITY)?;

        Ok(Self {
            states,
            symbols,
            initial,
            transition,
            emission,
        })
    }

    /// Build an untrained model with a standard topology and uniform emissions.
    ///
    /// Both topologies start in the first state.
    pub fn with_topology(
        states: Vec<S>,
        symbols: Vec<O>,
        topology: Topology,
    ) -> Result<Self, HmmError> {
        check_unique(&states, "states")?;
        check_unique(&symbols, "symbols")?;
        let n = states.len();
        let m = symbols.len();

        let (initial, transition) = match topology {
            Topology::Ergodic => (
                DVector::from_element(n, 1.0 / n as f64),
                DMatrix::from_element(n, n, 1.0 / n as f64),
            ),
            Topology::LeftToRight => {
                let mut initial = DVector::zeros(n);
                initial[0] = 1.0;
                let mut transition = DMatrix::zeros(n, n);
                for i in 0..n {
                    if i + 1 < n {
                        transition[(i, i)] = 0.5;
                        transition[(i, i + 1)] = 0.5;
                    } else {
                        transition[(i, i)] = 1.0;
                    }
                }
                (initial, transition)
            }
        };
        let emission = DMatrix::from_element(n, m, 1.0 / m as f64);

        Self::new(states, symbols, initial, transition, emission)
    }

    /// Hidden states
    #[inline]
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Symbol alphabet
    #[inline]
    pub fn symbols(&self) -> &[O] {
        &self.symbols
    }

    /// Initial state distribution
    #[inline]
    pub fn initial(&self) -> &DVector<f64> {
        &self.initial
    }

    /// Transition matrix (states × states)
    #[inline]
    pub fn transition(&self) -> &DMatrix<f64> {
        &self.transition
    }

    /// Emission matrix (states × symbols)
    #[inline]
    pub fn emission(&self) -> &DMatrix<f64> {
        &self.emission
    }

    /// Index of a state, `None` when absent
    pub fn state_index(&self, state: &S) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    /// Index of a symbol, `None` when absent
    pub fn symbol_index(&self, symbol: &O) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    fn encode(&self, observations: &[O]) -> Result<Vec<usize>, HmmError> {
        observations
            .iter()
            .enumerate()
            .map(|(position, o)| {
                self.symbol_index(o)
                    .ok_or(HmmError::UnknownSymbol { position })
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Forward / backward
    // ------------------------------------------------------------------------

    fn forward_indexed(&self, obs: &[usize]) -> DMatrix<f64> {
        let n = self.states.len();
        let mut alpha = DMatrix::zeros(obs.len(), n);
        if obs.is_empty() {
            return alpha;
        }
        for i in 0..n {
            alpha[(0, i)] = self.initial[i] * self.emission[(i, obs[0])];
        }
        for t in 1..obs.len() {
            for j in 0..n {
                let mut sum = 0.0;
                for i in 0..n {
                    sum += alpha[(t - 1, i)] * self.transition[(i, j)];
                }
                alpha[(t, j)] = sum * self.emission[(j, obs[t])];
            }
        }
        alpha
    }

    fn backward_indexed(&self, obs: &[usize]) -> DMatrix<f64> {
        let n = self.states.len();
        let len = obs.len();
        let mut beta = DMatrix::zeros(len, n);
        if len == 0 {
            return beta;
        }
        for i in 0..n {
            beta[(len - 1, i)] = 1.0;
        }
        for t in (0..len - 1).rev() {
            for i in 0..n {
                let mut sum = 0.0;
                for j in 0..n {
                    sum += self.transition[(i, j)]
                        * self.emission[(j, obs[t + 1])]
                        * beta[(t + 1, j)];
                }
                beta[(t, i)] = sum;
            }
        }
        beta
    }

    /// Scaled forward pass: normalised rows and scalers `c_t = 1 / Σ α_t`.
    ///
    /// A step with zero total probability leaves its row at zero and its
    /// scaler at +∞.
    fn forward_scaled_indexed(&self, obs: &[usize]) -> (DMatrix<f64>, Vec<f64>) {
        let n = self.states.len();
        let mut alpha = DMatrix::zeros(obs.len(), n);
        let mut scale = Vec::with_capacity(obs.len());

        for (t, &symbol) in obs.iter().enumerate() {
            for j in 0..n {
                let prior = if t == 0 {
                    self.initial[j]
                } else {
                    (0..n)
                        .map(|i| alpha[(t - 1, i)] * self.transition[(i, j)])
                        .sum()
                };
                alpha[(t, j)] = prior * self.emission[(j, symbol)];
            }
            let total: f64 = alpha.row(t).sum();
            if total > 0.0 {
                let c = 1.0 / total;
                alpha.row_mut(t).scale_mut(c);
                scale.push(c);
            } else {
                scale.push(f64::INFINITY);
            }
        }
        (alpha, scale)
    }

    fn backward_scaled_indexed(&self, obs: &[usize], scale: &[f64]) -> DMatrix<f64> {
        let n = self.states.len();
        let len = obs.len();
        let mut beta = DMatrix::zeros(len, n);
        if len == 0 {
            return beta;
        }
        for i in 0..n {
            beta[(len - 1, i)] = scale[len - 1];
        }
        for t in (0..len - 1).rev() {
            for i in 0..n {
                let mut sum = 0.0;
                for j in 0..n {
                    sum += self.transition[(i, j)]
                        * self.emission[(j, obs[t + 1])]
                        * beta[(t + 1, j)];
                }
                beta[(t, i)] = sum * scale[t];
            }
        }
        beta
    }

    /// Forward variables α (time × states)
    pub fn forward(&self, observations: &[O]) -> Result<DMatrix<f64>, HmmError> {
        Ok(self.forward_indexed(&self.encode(observations)?))
    }

    /// Backward variables β (time × states)
    pub fn backward(&self, observations: &[O]) -> Result<DMatrix<f64>, HmmError> {
        Ok(self.backward_indexed(&self.encode(observations)?))
    }

    /// Scaled forward variables and their per-step scalers
    pub fn forward_scaled(
        &self,
        observations: &[O],
    ) -> Result<(DMatrix<f64>, Vec<f64>), HmmError> {
        Ok(self.forward_scaled_indexed(&self.encode(observations)?))
    }

    /// Scaled backward variables using the scalers of the forward pass
    pub fn backward_scaled(
        &self,
        observations: &[O],
        scale: &[f64],
    ) -> Result<DMatrix<f64>, HmmError> {
        if scale.len() != observations.len() {
            return Err(HmmError::DimensionMismatch {
                context: "scaling coefficients",
                expected: observations.len(),
                actual: scale.len(),
            });
        }
        Ok(self.backward_scaled_indexed(&self.encode(observations)?, scale))
    }

    /// P(observations) by the plain forward algorithm.
    ///
    /// Underflows to zero on long sequences; prefer
    /// [`log_observation_probability`](Self::log_observation_probability).
    /// The empty sequence has probability one.
    pub fn observation_probability(&self, observations: &[O]) -> Result<f64, HmmError> {
        let obs = self.encode(observations)?;
        if obs.is_empty() {
            return Ok(1.0);
        }
        let alpha = self.forward_indexed(&obs);
        Ok(alpha.row(obs.len() - 1).sum())
    }

    /// log P(observations) by the scaled forward algorithm.
    ///
    /// `-∞` when the sequence is impossible under the model.
    pub fn log_observation_probability(&self, observations: &[O]) -> Result<f64, HmmError> {
        let obs = self.encode(observations)?;
        Ok(self.log_likelihood_indexed(&obs))
    }

    fn log_likelihood_indexed(&self, obs: &[usize]) -> f64 {
        let (_, scale) = self.forward_scaled_indexed(obs);
        -scale.iter().map(|c| c.ln()).sum::<f64>()
    }

    // ------------------------------------------------------------------------
    // Viterbi
    // ------------------------------------------------------------------------

    /// Most probable state path and its log-probability.
    ///
    /// Ties resolve to the lowest state index.
    pub fn best_state_sequence(&self, observations: &[O]) -> Result<(Vec<S>, f64), HmmError> {
        let obs = self.encode(observations)?;
        let n = self.states.len();
        if obs.is_empty() {
            return Ok((Vec::new(), 0.0));
        }

        let log_a = self.transition.map(f64::ln);
        let log_b = self.emission.map(f64::ln);
        let mut delta = DMatrix::from_element(obs.len(), n, f64::NEG_INFINITY);
        let mut psi = DMatrix::<usize>::zeros(obs.len(), n);

        for i in 0..n {
            delta[(0, i)] = self.initial[i].ln() + log_b[(i, obs[0])];
        }
        for t in 1..obs.len() {
            for j in 0..n {
                let mut best = f64::NEG_INFINITY;
                let mut arg = 0;
                for i in 0..n {
                    let score = delta[(t - 1, i)] + log_a[(i, j)];
                    if score > best {
                        best = score;
                        arg = i;
                    }
                }
                delta[(t, j)] = best + log_b[(j, obs[t])];
                psi[(t, j)] = arg;
            }
        }

        let last = obs.len() - 1;
        let mut state = 0;
        let mut best = f64::NEG_INFINITY;
        for i in 0..n {
            if delta[(last, i)] > best {
                best = delta[(last, i)];
                state = i;
            }
        }

        let mut path = vec![0; obs.len()];
        path[last] = state;
        for t in (1..obs.len()).rev() {
            path[t - 1] = psi[(t, path[t])];
        }
        Ok((path.into_iter().map(|i| self.states[i].clone()).collect(), best))
    }

    // ------------------------------------------------------------------------
    // Baum-Welch
    // ------------------------------------------------------------------------

    /// Train with the plain (unscaled) recursions.
    ///
    /// Only suitable for short sequences; see [`train_scaled`](Self::train_scaled).
    pub fn train(
        &mut self,
        sequences: &[Vec<O>],
        options: &TrainingOptions,
    ) -> Result<TrainingSummary, HmmError> {
        self.train_impl(sequences, options, false)
    }

    /// Train with the scaled recursions
    pub fn train_scaled(
        &mut self,
        sequences: &[Vec<O>],
        options: &TrainingOptions,
    ) -> Result<TrainingSummary, HmmError> {
        self.train_impl(sequences, options, true)
    }

    fn total_log_likelihood(&self, sequences: &[Vec<usize>], scaled: bool) -> f64 {
        sequences
            .iter()
            .map(|obs| {
                if scaled {
                    self.log_likelihood_indexed(obs)
                } else {
                    self.forward_indexed(obs).row(obs.len() - 1).sum().ln()
                }
            })
            .sum()
    }

    fn train_impl(
        &mut self,
        sequences: &[Vec<O>],
        options: &TrainingOptions,
        scaled: bool,
    ) -> Result<TrainingSummary, HmmError> {
        let encoded: Vec<Vec<usize>> = sequences
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| self.encode(s))
            .collect::<Result<_, _>>()?;
        if encoded.is_empty() {
            return Err(HmmError::NoTrainingData);
        }

        let initial_ll = self.total_log_likelihood(&encoded, scaled);
        let mut current_ll = initial_ll;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < options.max_iterations {
            let Some(candidate) = self.reestimate(&encoded, options, scaled) else {
                converged = true;
                break;
            };
            let candidate_ll = candidate.total_log_likelihood(&encoded, scaled);
            log::debug!(
                "Baum-Welch iteration {}: log-likelihood {:.6} -> {:.6}",
                iterations + 1,
                current_ll,
                candidate_ll
            );

            if !(candidate_ll > current_ll) {
                converged = true;
                break;
            }
            let improvement = candidate_ll - current_ll;
            *self = candidate;
            current_ll = candidate_ll;
            iterations += 1;
            if improvement < options.tolerance {
                converged = true;
                break;
            }
        }

        Ok(TrainingSummary {
            iterations,
            initial_log_likelihood: initial_ll,
            final_log_likelihood: current_ll,
            converged,
        })
    }

    /// One Baum-Welch step; `None` when no sequence has non-zero probability
    fn reestimate(
        &self,
        sequences: &[Vec<usize>],
        options: &TrainingOptions,
        scaled: bool,
    ) -> Option<Self> {
        let n = self.states.len();
        let m = self.symbols.len();
        let mut acc = Accumulator::new(n, m);

        for obs in sequences {
            let len = obs.len();
            let (gamma, xi_sum) = if scaled {
                let (alpha, scale) = self.forward_scaled_indexed(obs);
                if scale.iter().any(|c| !c.is_finite()) {
                    log::warn!("skipping training sequence with zero probability");
                    continue;
                }
                let beta = self.backward_scaled_indexed(obs, &scale);
                let mut gamma = alpha.component_mul(&beta);
                for t in 0..len {
                    gamma.row_mut(t).scale_mut(1.0 / scale[t]);
                }
                (gamma, self.xi_sum(obs, &alpha, &beta, 1.0))
            } else {
                let alpha = self.forward_indexed(obs);
                let probability = alpha.row(len - 1).sum();
                if !(probability > 0.0) {
                    log::warn!("skipping training sequence with zero probability");
                    continue;
                }
                let beta = self.backward_indexed(obs);
                let gamma = alpha.component_mul(&beta) / probability;
                (gamma, self.xi_sum(obs, &alpha, &beta, 1.0 / probability))
            };

            acc.sequences += 1;
            for i in 0..n {
                acc.initial[i] += gamma[(0, i)];
                for t in 0..len {
                    acc.emission_num[(i, obs[t])] += gamma[(t, i)];
                    acc.emission_den[i] += gamma[(t, i)];
                    if t + 1 < len {
                        acc.transition_den[i] += gamma[(t, i)];
                    }
                }
            }
            acc.transition_num += xi_sum;
        }

        if acc.sequences == 0 {
            return None;
        }

        let mut next = self.clone();
        next.initial = acc.initial.unscale(acc.sequences as f64);
        for i in 0..n {
            if acc.transition_den[i] > 0.0 {
                for j in 0..n {
                    next.transition[(i, j)] = acc.transition_num[(i, j)] / acc.transition_den[i];
                }
            }
            if acc.emission_den[i] > 0.0 {
                for k in 0..m {
                    next.emission[(i, k)] = acc.emission_num[(i, k)] / acc.emission_den[i];
                }
            }
        }

        if options.emission_floor > 0.0 {
            for i in 0..n {
                let mut row = next.emission.row_mut(i);
                row.apply(|p| *p = p.max(options.emission_floor));
                let total = row.sum();
                row.scale_mut(1.0 / total);
            }
        }
        Some(next)
    }

    /// Σ_t ξ_t(i, j) for one sequence, multiplied by `factor`
    fn xi_sum(
        &self,
        obs: &[usize],
        alpha: &DMatrix<f64>,
        beta: &DMatrix<f64>,
        factor: f64,
    ) -> DMatrix<f64> {
        let n = self.states.len();
        let mut xi = DMatrix::zeros(n, n);
        for t in 0..obs.len().saturating_sub(1) {
            for i in 0..n {
                for j in 0..n {
                    xi[(i, j)] += alpha[(t, i)]
                        * self.transition[(i, j)]
                        * self.emission[(j, obs[t + 1])]
                        * beta[(t + 1, j)]
                        * factor;
                }
            }
        }
        xi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rng::SimpleRng;
    use rand::Rng;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Weather {
        Rainy,
        Sunny,
    }

    /// Two states, two symbols; values checked by enumerating all 8 paths
    fn toy() -> DiscreteHmm<Weather, char> {
        #[rustfmt::skip]
        let transition = DMatrix::from_row_slice(2, 2, &[
            0.7, 0.3,
            0.4, 0.6,
        ]);
        #[rustfmt::skip]
        let emission = DMatrix::from_row_slice(2, 2, &[
            0.9, 0.1,
            0.2, 0.8,
        ]);
        DiscreteHmm::new(
            vec![Weather::Rainy, Weather::Sunny],
            vec!['u', 'n'],
            DVector::from_vec(vec![0.6, 0.4]),
            transition,
            emission,
        )
        .unwrap()
    }

    fn assert_row_stochastic(m: &DMatrix<f64>, tol: f64) {
        for row in m.row_iter() {
            assert!((row.sum() - 1.0).abs() < tol, "row sums to {}", row.sum());
        }
    }

    #[test]
    fn test_forward_matches_hand_computation() {
        let hmm = toy();
        let obs = ['u', 'n', 'u'];
        let p = hmm.observation_probability(&obs).unwrap();
        assert!((p - 0.10893).abs() < 1e-12);

        let log_p = hmm.log_observation_probability(&obs).unwrap();
        assert!((log_p - 0.10893f64.ln()).abs() < 1e-6);
        assert!((log_p - (-2.217_049_804_887_783)).abs() < 1e-6);
    }

    #[test]
    fn test_viterbi_matches_hand_computation() {
        let hmm = toy();
        let (path, log_p) = hmm.best_state_sequence(&['u', 'n', 'u']).unwrap();
        assert_eq!(path, vec![Weather::Rainy, Weather::Sunny, Weather::Rainy]);
        assert!((log_p - 0.046656f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_forward_backward_agree() {
        let hmm = toy();
        let obs = ['u', 'u', 'n', 'u', 'n'];
        let alpha = hmm.forward(&obs).unwrap();
        let beta = hmm.backward(&obs).unwrap();
        let p = hmm.observation_probability(&obs).unwrap();
        for t in 0..obs.len() {
            let at_t = alpha.row(t).component_mul(&beta.row(t)).sum();
            assert!((at_t - p).abs() < 1e-12);
        }
    }

    #[test]
    fn test_scaled_forward_rows_normalised() {
        let hmm = toy();
        let obs = ['u', 'n', 'n', 'u'];
        let (alpha, scale) = hmm.forward_scaled(&obs).unwrap();
        assert_eq!(scale.len(), 4);
        for t in 0..4 {
            assert!((alpha.row(t).sum() - 1.0).abs() < 1e-12);
        }
        let beta = hmm.backward_scaled(&obs, &scale).unwrap();
        assert_eq!(beta.nrows(), 4);
        assert!(hmm.backward_scaled(&obs, &scale[..2]).is_err());
    }

    #[test]
    fn test_long_sequence_does_not_underflow() {
        let hmm = toy();
        let obs: Vec<char> = (0..5000).map(|i| if i % 3 == 0 { 'n' } else { 'u' }).collect();
        assert_eq!(hmm.observation_probability(&obs).unwrap(), 0.0);
        let log_p = hmm.log_observation_probability(&obs).unwrap();
        assert!(log_p.is_finite());
        assert!(log_p < -1000.0);
    }

    #[test]
    fn test_lookup_misses_are_none() {
        let hmm = toy();
        assert_eq!(hmm.symbol_index(&'n'), Some(1));
        assert_eq!(hmm.symbol_index(&'x'), None);
        assert_eq!(hmm.state_index(&Weather::Sunny), Some(1));
        assert_eq!(
            hmm.log_observation_probability(&['u', 'x']),
            Err(HmmError::UnknownSymbol { position: 1 })
        );
    }

    #[test]
    fn test_validation_errors() {
        let ok_a = DMatrix::from_element(2, 2, 0.5);
        let ok_b = DMatrix::from_element(2, 2, 0.5);
        let pi = DVector::from_vec(vec![0.5, 0.5]);

        let empty: Result<DiscreteHmm<u8, u8>, _> =
            DiscreteHmm::new(vec![], vec![0, 1], pi.clone(), ok_a.clone(), ok_b.clone());
        assert_eq!(empty.unwrap_err(), HmmError::Empty { context: "states" });

        let dup = DiscreteHmm::new(vec![1u8, 1], vec![0u8, 1], pi.clone(), ok_a.clone(), ok_b.clone());
        assert_eq!(
            dup.unwrap_err(),
            HmmError::Duplicate {
                context: "states",
                index: 1
            }
        );

        let bad_row = DMatrix::from_row_slice(2, 2, &[0.5, 0.6, 0.5, 0.5]);
        let err = DiscreteHmm::new(vec![0u8, 1], vec![0u8, 1], pi.clone(), bad_row, ok_b.clone())
            .unwrap_err();
        assert!(matches!(err, HmmError::NotStochastic { row: 0, .. }));

        let negative = DMatrix::from_row_slice(2, 2, &[1.5, -0.5, 0.5, 0.5]);
        let err = DiscreteHmm::new(vec![0u8, 1], vec![0u8, 1], pi.clone(), negative, ok_b.clone())
            .unwrap_err();
        assert!(matches!(err, HmmError::OutOfRange { .. }));

        let wide = DMatrix::from_element(2, 3, 1.0 / 3.0);
        let err = DiscreteHmm::new(vec![0u8, 1], vec![0u8, 1], pi.clone(), ok_a.clone(), wide)
            .unwrap_err();
        assert!(matches!(err, HmmError::DimensionMismatch { .. }));

        let bad_pi = DVector::from_vec(vec![0.9, 0.3]);
        let err = DiscreteHmm::new(vec![0u8, 1], vec![0u8, 1], bad_pi, ok_a, ok_b).unwrap_err();
        assert!(matches!(err, HmmError::NotStochastic { .. }));
    }

    #[test]
    fn test_left_to_right_topology() {
        let hmm: DiscreteHmm<usize, usize> =
            DiscreteHmm::with_topology(vec![0, 1, 2], vec![0, 1, 2, 3], Topology::LeftToRight)
                .unwrap();
        assert_eq!(hmm.initial()[0], 1.0);
        assert_eq!(hmm.transition()[(0, 0)], 0.5);
        assert_eq!(hmm.transition()[(0, 1)], 0.5);
        assert_eq!(hmm.transition()[(0, 2)], 0.0);
        assert_eq!(hmm.transition()[(2, 2)], 1.0);
        assert!((hmm.emission()[(1, 3)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_ergodic_topology() {
        let hmm: DiscreteHmm<u8, u8> =
            DiscreteHmm::with_topology(vec![0, 1, 2, 3], vec![0, 1], Topology::Ergodic).unwrap();
        assert!(hmm.transition().iter().all(|&p| (p - 0.25).abs() < 1e-12));
        assert_row_stochastic(hmm.transition(), 1e-12);
    }

    #[test]
    fn test_scaled_training_keeps_rows_stochastic() {
        let mut rng = SimpleRng::new(11);
        let sequences: Vec<Vec<u8>> = (0..6)
            .map(|_| {
                let len = rng.gen_range(20..40);
                (0..len)
                    .map(|t| if t < len / 2 { rng.gen_range(0..2) } else { rng.gen_range(2..4) })
                    .collect()
            })
            .collect();

        let mut hmm: DiscreteHmm<u8, u8> =
            DiscreteHmm::with_topology(vec![0, 1, 2], vec![0, 1, 2, 3], Topology::LeftToRight)
                .unwrap();
        let options = TrainingOptions::default();
        let summary = hmm.train_scaled(&sequences, &options).unwrap();

        assert!(summary.iterations > 0);
        assert!(summary.final_log_likelihood > summary.initial_log_likelihood);
        assert_row_stochastic(hmm.transition(), 1e-6);
        assert_row_stochastic(hmm.emission(), 1e-6);
        assert!((hmm.initial().sum() - 1.0).abs() < 1e-6);
        // Left-to-right structure survives training
        assert_eq!(hmm.transition()[(1, 0)], 0.0);
        assert_eq!(hmm.transition()[(2, 1)], 0.0);
    }

    #[test]
    fn test_unscaled_and_scaled_training_agree_on_short_data() {
        let sequences: Vec<Vec<char>> = vec![
            vec!['u', 'u', 'n', 'n', 'u'],
            vec!['n', 'n', 'u', 'u'],
            vec!['u', 'n', 'u', 'n', 'u', 'u'],
        ];
        let options = TrainingOptions {
            max_iterations: 3,
            tolerance: 0.0,
            emission_floor: 0.0,
        };
        let mut plain = toy();
        let mut scaled = toy();
        let a = plain.train(&sequences, &options).unwrap();
        let b = scaled.train_scaled(&sequences, &options).unwrap();
        assert_eq!(a.iterations, b.iterations);
        assert!((a.final_log_likelihood - b.final_log_likelihood).abs() < 1e-9);
        assert!((plain.transition() - scaled.transition()).amax() < 1e-9);
        assert!((plain.emission() - scaled.emission()).amax() < 1e-9);
    }

    #[test]
    fn test_emission_floor_applied() {
        let sequences = vec![vec![0u8, 0, 0, 0], vec![0, 0, 0]];
        let mut hmm: DiscreteHmm<u8, u8> =
            DiscreteHmm::with_topology(vec![0, 1], vec![0, 1, 2], Topology::Ergodic).unwrap();
        let options = TrainingOptions {
            emission_floor: 0.01,
            ..TrainingOptions::default()
        };
        hmm.train_scaled(&sequences, &options).unwrap();
        assert!(hmm.emission().iter().all(|&p| p >= 0.009));
        assert!(hmm.log_observation_probability(&[2u8]).unwrap().is_finite());
        assert_row_stochastic(hmm.emission(), 1e-9);
    }

    #[test]
    fn test_training_without_data_fails() {
        let mut hmm = toy();
        let empty: Vec<Vec<char>> = vec![vec![]];
        assert_eq!(
            hmm.train_scaled(&empty, &TrainingOptions::default()),
            Err(HmmError::NoTrainingData)
        );
    }
}
