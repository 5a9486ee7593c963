use serde::{Deserialize, Serialize};

/// Account status, stored as a single-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Deactivated,
    Erased,
}

impl UserStatus {
    pub const ALL: [UserStatus; 3] = [UserStatus::Active, UserStatus::Deactivated, UserStatus::Erased];

    pub fn code(&self) -> &'static str {
        match self {
            UserStatus::Active => "A",
            UserStatus::Deactivated => "D",
            UserStatus::Erased => "E",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(UserStatus::Active),
            "D" => Some(UserStatus::Deactivated),
            "E" => Some(UserStatus::Erased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    /// Storage location for the `index`-th attachment of a post.
    pub fn location(&self, post_id: i64, index: usize) -> String {
        match self {
            MediaKind::Image => format!("images/img_{}_{}.jpg", post_id, index),
            MediaKind::Video => format!("videos/vid_{}_{}.mp4", post_id, index),
        }
    }
}

/// Delivery status of a direct message. The schema carries it; the generator
/// never populates messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn code(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "S",
            MessageStatus::Delivered => "D",
            MessageStatus::Read => "R",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "S" => Some(MessageStatus::Sent),
            "D" => Some(MessageStatus::Delivered),
            "R" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

/// How post units reach the store.
///
/// `Bulk` pre-computes every post's media and flushes posts, media and links
/// together per chunk. `Transactional` writes each post unit row by row inside
/// its own transaction and rolls back units that violate the content invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadStrategy {
    #[default]
    Bulk,
    Transactional,
}

impl LoadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStrategy::Bulk => "bulk",
            LoadStrategy::Transactional => "transactional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bulk" => Some(LoadStrategy::Bulk),
            "transactional" => Some(LoadStrategy::Transactional),
            _ => None,
        }
    }
}

/// How distinct targets are drawn from a population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingPolicy {
    /// Random draws with a set, capped at `retry_factor * k` attempts.
    #[default]
    BoundedRetry,
    /// Sampling without replacement over the index space; always fills.
    Exact,
}

impl SamplingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingPolicy::BoundedRetry => "bounded-retry",
            SamplingPolicy::Exact => "exact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bounded-retry" | "bounded_retry" => Some(SamplingPolicy::BoundedRetry),
            "exact" => Some(SamplingPolicy::Exact),
            _ => None,
        }
    }
}
