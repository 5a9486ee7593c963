//! Best-effort selection of distinct targets.
//!
//! Follows, likes and replies all need "K distinct things out of a population".
//! Under [`SamplingPolicy::BoundedRetry`] random draws are retried at most
//! `retry_factor * K` times and a shortfall is accepted; the per-user ratios in
//! the config are therefore upper bounds. [`SamplingPolicy::Exact`] samples
//! without replacement over a dense index space and always reaches
//! `min(K, population)`.

use plaza_types::{GeneratorConfig, SamplingPolicy};
use rand::seq::index;
use rand::Rng;
use std::collections::HashSet;

/// Call `draw` until `target` values are accepted or `budget` calls are spent.
///
/// `draw` returns `None` to reject a candidate.
pub fn fill_best_effort<T, R, F>(rng: &mut R, target: usize, budget: usize, mut draw: F) -> Vec<T>
where
    R: Rng + ?Sized,
    F: FnMut(&mut R) -> Option<T>,
{
    let mut accepted = Vec::with_capacity(target.min(budget));
    let mut attempts = 0;
    while accepted.len() < target && attempts < budget {
        attempts += 1;
        if let Some(value) = draw(rng) {
            accepted.push(value);
        }
    }
    accepted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    policy: SamplingPolicy,
    retry_factor: usize,
}

impl Sampler {
    pub fn new(policy: SamplingPolicy, retry_factor: usize) -> Self {
        Self {
            policy,
            retry_factor: retry_factor.max(1),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.sampling, config.retry_factor)
    }

    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    /// Draw budget for a target of `target` values
    pub fn budget(&self, target: usize) -> usize {
        target.saturating_mul(self.retry_factor)
    }

    /// Up to `k` distinct indices from `0..population`, never `exclude`.
    ///
    /// `k` is clamped to the number of eligible indices first.
    pub fn distinct_indices<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        population: usize,
        k: usize,
        exclude: Option<usize>,
    ) -> Vec<usize> {
        let excluded = exclude.filter(|e| *e < population);
        let available = population - usize::from(excluded.is_some());
        let wanted = k.min(available);
        if wanted == 0 {
            return Vec::new();
        }

        match self.policy {
            SamplingPolicy::BoundedRetry => {
                let mut seen = HashSet::with_capacity(wanted);
                fill_best_effort(rng, wanted, self.budget(wanted), |rng| {
                    let idx = rng.gen_range(0..population);
                    (Some(idx) != excluded && seen.insert(idx)).then_some(idx)
                })
            }
            SamplingPolicy::Exact => index::sample(rng, available, wanted)
                .into_iter()
                // Shift past the excluded slot to map the dense space back
                .map(|i| match excluded {
                    Some(e) if i >= e => i + 1,
                    _ => i,
                })
                .collect(),
        }
    }
}
