//! Finite birth-death queue with state-dependent service rates.
//!
//! States `0..=K` count the requests in the system (in service plus waiting).
//! Arrivals occur at rate λ in every state below `K` and are rejected at `K`.
//! With `n` requests present, `min(n, N)` of them are in service and the chain
//! leaves state `n` at `profile[min(n, N)] * servers`.
//!
//! The steady state follows from detailed balance,
//! `π(n+1) = π(n) · λ / μ(n+1)`, accumulated in log space and rescaled by the
//! largest term so that chains with tens of thousands of states stay finite.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{QueueError, Result};

/// Largest number of states a model may hold beyond the empty state.
pub const MAX_CAPACITY: usize = 1_000_000;

/// Per-occupancy service (death) rates, indexed by batch size `1..=N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ServiceRateProfile {
    rates: Vec<f64>,
}

impl ServiceRateProfile {
    /// Build a profile; every entry must be positive and finite.
    pub fn new(rates: Vec<f64>) -> Result<Self> {
        if rates.is_empty() {
            return Err(QueueError::config("service rate profile is empty"));
        }
        if let Some((i, r)) = rates
            .iter()
            .enumerate()
            .find(|(_, r)| !(r.is_finite() && **r > 0.0))
        {
            return Err(QueueError::config(format!(
                "service rate at batch size {} must be positive and finite, got {}",
                i + 1,
                r
            )));
        }
        Ok(Self { rates })
    }

    /// Maximum concurrency `N`.
    pub fn max_concurrency(&self) -> usize {
        self.rates.len()
    }

    /// Service rate with `n` requests present. Occupancies above `N` are
    /// served at the full-batch rate; `n` must be at least 1.
    pub fn rate(&self, n: usize) -> f64 {
        let idx = n.clamp(1, self.rates.len()) - 1;
        self.rates[idx]
    }

    /// Rate with a single request in service.
    pub fn first(&self) -> f64 {
        self.rates[0]
    }

    /// Rate at full batch.
    pub fn last(&self) -> f64 {
        self.rates[self.rates.len() - 1]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.rates
    }
}

impl TryFrom<Vec<f64>> for ServiceRateProfile {
    type Error = QueueError;

    fn try_from(rates: Vec<f64>) -> Result<Self> {
        Self::new(rates)
    }
}

impl From<ServiceRateProfile> for Vec<f64> {
    fn from(profile: ServiceRateProfile) -> Self {
        profile.rates
    }
}

/// Steady-state statistics of a solved model.
///
/// Times are in the reciprocal unit of the rates the model was solved with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Offered arrival rate λ.
    pub arrival_rate: f64,
    /// Accepted (and, in steady state, completed) rate: `λ · (1 − π(K))`.
    pub throughput: f64,
    /// Probability an arrival finds the system full.
    pub blocking_probability: f64,
    /// Probability at least one request is in service.
    pub utilization: f64,
    pub avg_num_in_system: f64,
    /// Average batch size.
    pub avg_num_in_service: f64,
    pub avg_queue_length: f64,
    pub avg_wait_time: f64,
    pub avg_resp_time: f64,
    pub avg_serv_time: f64,
}

/// Birth-death model over states `0..=capacity`.
#[derive(Debug, Clone)]
pub struct BirthDeathModel {
    capacity: usize,
    profile: ServiceRateProfile,
    arrival_rate: f64,
    servers: u32,
    probabilities: Vec<f64>,
    valid: bool,
}

impl BirthDeathModel {
    /// Create an unsolved model. `capacity` is the maximum number of requests
    /// admitted and must be at least the profile's maximum concurrency.
    pub fn new(capacity: usize, profile: ServiceRateProfile) -> Result<Self> {
        if capacity < 1 {
            return Err(QueueError::config("capacity must be at least 1"));
        }
        if capacity > MAX_CAPACITY {
            return Err(QueueError::config(format!(
                "capacity {} exceeds the limit {}",
                capacity, MAX_CAPACITY
            )));
        }
        if capacity < profile.max_concurrency() {
            return Err(QueueError::config(format!(
                "capacity {} is smaller than the maximum batch size {}",
                capacity,
                profile.max_concurrency()
            )));
        }
        Ok(Self {
            capacity,
            profile,
            arrival_rate: 0.0,
            servers: 1,
            probabilities: vec![0.0; capacity + 1],
            valid: false,
        })
    }

    /// Classic M/M/1/K queue: a single server with constant rate `mu`.
    pub fn mm1k(capacity: usize, mu: f64) -> Result<Self> {
        Self::new(capacity, ServiceRateProfile::new(vec![mu])?)
    }

    /// Solve for arrival rate `lambda` with `servers` identical servers per
    /// state. Never fails; check [`Self::is_valid`] or use [`Self::stats`].
    pub fn solve(&mut self, lambda: f64, servers: u32) {
        self.arrival_rate = lambda;
        self.servers = servers;
        self.valid = false;
        self.probabilities.iter_mut().for_each(|p| *p = 0.0);

        if !(lambda.is_finite() && lambda > 0.0) || servers == 0 {
            tracing::trace!(lambda, servers, "skipping solve for non-positive rate");
            return;
        }

        let ln_lambda = lambda.ln();
        let mut log_terms = Vec::with_capacity(self.capacity + 1);
        log_terms.push(0.0_f64);
        for n in 1..=self.capacity {
            let prev = log_terms[n - 1];
            log_terms.push(prev + ln_lambda - self.death_rate(n).ln());
        }

        let peak = log_terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !peak.is_finite() {
            return;
        }

        let mut total = 0.0;
        for (p, lt) in self.probabilities.iter_mut().zip(&log_terms) {
            *p = (lt - peak).exp();
            total += *p;
        }
        if !(total.is_finite() && total > 0.0) {
            self.probabilities.iter_mut().for_each(|p| *p = 0.0);
            return;
        }
        self.probabilities.iter_mut().for_each(|p| *p /= total);
        self.valid = true;

        tracing::trace!(
            lambda,
            servers,
            capacity = self.capacity,
            blocking = self.probabilities[self.capacity],
            "solved birth-death model"
        );
    }

    fn death_rate(&self, n: usize) -> f64 {
        self.profile.rate(n) * self.servers as f64
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn profile(&self) -> &ServiceRateProfile {
        &self.profile
    }

    pub fn arrival_rate(&self) -> f64 {
        self.arrival_rate
    }

    pub fn servers(&self) -> u32 {
        self.servers
    }

    /// Steady-state occupancy distribution (all zeros until a valid solve).
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Derived statistics at the last solved rate.
    pub fn stats(&self) -> Result<QueueStats> {
        if !self.valid {
            return Err(QueueError::numerical(format!(
                "model is not solved to a valid state (lambda={}, servers={})",
                self.arrival_rate, self.servers
            )));
        }

        let n_max = self.profile.max_concurrency();
        let mut in_service = 0.0;
        let mut queue_length = 0.0;
        for (n, p) in self.probabilities.iter().enumerate() {
            in_service += n.min(n_max) as f64 * p;
            queue_length += n.saturating_sub(n_max) as f64 * p;
        }
        let in_system = in_service + queue_length;

        let blocking = self.probabilities[self.capacity];
        let throughput = self.arrival_rate * (1.0 - blocking);
        if !(throughput.is_finite() && throughput > 0.0) {
            return Err(QueueError::numerical(format!(
                "throughput {} is not positive",
                throughput
            )));
        }

        Ok(QueueStats {
            arrival_rate: self.arrival_rate,
            throughput,
            blocking_probability: blocking,
            utilization: 1.0 - self.probabilities[0],
            avg_num_in_system: in_system,
            avg_num_in_service: in_service,
            avg_queue_length: queue_length,
            avg_wait_time: queue_length / throughput,
            avg_resp_time: in_system / throughput,
            avg_serv_time: in_service / throughput,
        })
    }
}

impl fmt::Display for BirthDeathModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "K={}; N={}; lambda={}; servers={}; valid={}",
            self.capacity,
            self.profile.max_concurrency(),
            self.arrival_rate,
            self.servers,
            self.valid
        )?;
        match self.stats() {
            Ok(s) => write!(
                f,
                "throughput={:.6}; blocking={:.3e}; avgNumInSystem={:.4}; avgNumInService={:.4}; \
                 avgQueueLength={:.4}; avgWaitTime={:.4}; avgRespTime={:.4}; avgServTime={:.4}",
                s.throughput,
                s.blocking_probability,
                s.avg_num_in_system,
                s.avg_num_in_service,
                s.avg_queue_length,
                s.avg_wait_time,
                s.avg_resp_time,
                s.avg_serv_time
            ),
            Err(e) => write!(f, "{}", e),
        }
    }
}
