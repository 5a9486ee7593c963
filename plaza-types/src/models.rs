use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{MediaKind, MessageStatus, UserStatus};

// Custom serde module for DateTime to keep the same RFC3339 form the store uses
mod datetime_format {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<DateTime<Utc>>().map_err(serde::de::Error::custom)
    }
}

/// Format a timestamp the way every table stores it: RFC3339, UTC, whole seconds.
///
/// Strings in this form order lexicographically, so the store can compare them
/// directly.
pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub username: String,
    pub bio: Option<String>,
    pub profile_photo: Option<String>,
    pub status: UserStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Follow {
    pub follower_email: String,
    pub followed_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub body: Option<String>,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    pub author_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    pub location: String,
    pub kind: MediaKind,
    #[serde(with = "datetime_format")]
    pub uploaded_at: DateTime<Utc>,
}

/// Binds one media item to the post it was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostMedia {
    pub media_id: i64,
    pub post_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Like {
    pub user_email: String,
    pub post_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    pub post_id: i64,
    pub author_email: String,
}

/// Reply edge between two comments of the same post. A child has at most one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reply {
    pub child_id: i64,
    pub parent_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub body: Option<String>,
    #[serde(with = "datetime_format")]
    pub sent_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub sender_email: String,
    pub recipient_email: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp_is_whole_seconds_utc() {
        let date = Utc.with_ymd_and_hms(2024, 1, 10, 8, 30, 5).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(format_timestamp(&date), "2024-01-10T08:30:05Z");
    }

    #[test]
    fn test_timestamps_order_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
    }

    #[test]
    fn test_post_serializes_created_at_as_string() {
        let post = Post {
            id: 1,
            body: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            author_email: "user0@redsocial.com".to_string(),
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["created_at"], "2024-01-01T00:00:00Z");

        let back: Post = serde_json::from_value(json).unwrap();
        assert_eq!(back, post);
    }
}
