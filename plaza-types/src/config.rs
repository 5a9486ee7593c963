use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{LoadStrategy, SamplingPolicy};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("status weights must not all be zero")]
    ZeroStatusWeights,

    #[error("{name} must be a number between 0 and 1, got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("email domain must not be empty")]
    EmptyEmailDomain,
}

/// Categorical weights for the user status draw, in percent or any other unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusWeights {
    pub active: u32,
    pub deactivated: u32,
    pub erased: u32,
}

impl Default for StatusWeights {
    fn default() -> Self {
        Self {
            active: 90,
            deactivated: 8,
            erased: 2,
        }
    }
}

impl StatusWeights {
    /// Weights in the order of [`crate::enums::UserStatus::ALL`].
    pub fn as_array(&self) -> [u32; 3] {
        [self.active, self.deactivated, self.erased]
    }
}

/// Sizes of the reusable text pools drawn from while generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextPoolSizes {
    pub bios: usize,
    pub post_texts: usize,
    pub comment_texts: usize,
}

impl Default for TextPoolSizes {
    fn default() -> Self {
        Self {
            bios: 100,
            post_texts: 200,
            comment_texts: 300,
        }
    }
}

/// Fan-out ratios and knobs for one generation run.
///
/// Per-user ratios served by random sampling (follows, likes, replies) are
/// upper bounds: a user whose draws keep colliding ends up with fewer edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub user_count: usize,
    pub follows_per_user: usize,
    pub posts_per_user: usize,
    pub media_per_post: usize,
    pub comments_per_user: usize,
    /// Inclusive (min, max) likes drawn per user
    pub like_range: (usize, usize),
    /// Inclusive (min, max) reply edges drawn per user
    pub reply_range: (usize, usize),
    /// Probability that a media item is an image rather than a video
    pub image_ratio: f64,
    pub status_weights: StatusWeights,
    pub bio_probability: f64,
    pub photo_probability: f64,
    pub post_text_probability: f64,
    /// Posts are dated within this many days before the run
    pub post_window_days: u32,
    /// Comments land at most this many days after their post (and never after the run)
    pub comment_window_days: u32,
    /// Logical rows accumulated in memory before a flush
    pub batch_size: usize,
    /// Draw budget multiplier for best-effort sampling
    pub retry_factor: usize,
    pub sampling: SamplingPolicy,
    pub strategy: LoadStrategy,
    pub seed: Option<u64>,
    pub email_domain: String,
    pub text_pools: TextPoolSizes,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            user_count: 1000,
            follows_per_user: 5,
            posts_per_user: 3,
            media_per_post: 1,
            comments_per_user: 5,
            like_range: (10, 20),
            reply_range: (0, 3),
            image_ratio: 0.85,
            status_weights: StatusWeights::default(),
            bio_probability: 0.6,
            photo_probability: 0.7,
            post_text_probability: 0.9,
            post_window_days: 730,
            comment_window_days: 365,
            batch_size: 100_000,
            retry_factor: 3,
            sampling: SamplingPolicy::default(),
            strategy: LoadStrategy::default(),
            seed: None,
            email_domain: "redsocial.com".to_string(),
            text_pools: TextPoolSizes::default(),
        }
    }
}

/// Longest post or comment dating window, in days (about a century).
pub const MAX_WINDOW_DAYS: u32 = 36_500;

impl GeneratorConfig {
    /// Clamp inconsistent values instead of rejecting them.
    ///
    /// Reversed ranges are swapped, probabilities are clamped to [0, 1], the
    /// dating windows are capped at [`MAX_WINDOW_DAYS`] and the batch size and
    /// retry factor are raised to at least 1. NaN is left alone for
    /// [`GeneratorConfig::validate`] to reject.
    pub fn normalized(mut self) -> Self {
        self.like_range = ordered(self.like_range);
        self.reply_range = ordered(self.reply_range);
        self.image_ratio = clamp_probability(self.image_ratio);
        self.bio_probability = clamp_probability(self.bio_probability);
        self.photo_probability = clamp_probability(self.photo_probability);
        self.post_text_probability = clamp_probability(self.post_text_probability);
        self.post_window_days = self.post_window_days.min(MAX_WINDOW_DAYS);
        self.comment_window_days = self.comment_window_days.min(MAX_WINDOW_DAYS);
        self.batch_size = self.batch_size.max(1);
        self.retry_factor = self.retry_factor.max(1);
        self.email_domain = self.email_domain.trim().to_string();
        self
    }

    /// Reject what clamping cannot repair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_weights.as_array().iter().all(|w| *w == 0) {
            return Err(ConfigError::ZeroStatusWeights);
        }

        for (name, value) in [
            ("image_ratio", self.image_ratio),
            ("bio_probability", self.bio_probability),
            ("photo_probability", self.photo_probability),
            ("post_text_probability", self.post_text_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }

        if self.email_domain.is_empty() {
            return Err(ConfigError::EmptyEmailDomain);
        }

        Ok(())
    }

    /// Normalize then validate.
    pub fn prepare(self) -> Result<Self, ConfigError> {
        let config = self.normalized();
        config.validate()?;
        Ok(config)
    }
}

fn ordered((a, b): (usize, usize)) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn clamp_probability(value: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.clamp(0.0, 1.0)
    }
}
