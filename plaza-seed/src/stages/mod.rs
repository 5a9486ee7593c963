//! The six generation stages. Each reads the identifiers earlier stages left
//! in [`Population`] and appends its own.

use chrono::{DateTime, Utc};
use plaza_store::{LoadError, Row, Value};
use plaza_types::{
    format_timestamp, Comment, Follow, GeneratorConfig, Like, Media, Post, PostMedia, Reply, User,
};
use tracing::warn;

use crate::report::Stage;
use crate::sampling::Sampler;
use crate::text::TextPools;

pub mod comments;
pub mod follows;
pub mod likes;
pub mod posts;
pub mod replies;
pub mod users;

/// Only the first few atomic-unit failures are logged; the rest are counted
pub const MAX_LOGGED_FAILURES: usize = 5;

const SECONDS_PER_DAY: i64 = 86_400;

/// Read-only inputs shared by every stage of one run.
pub struct StageContext<'a> {
    pub config: &'a GeneratorConfig,
    pub texts: &'a TextPools,
    pub sampler: Sampler,
    /// Generation time, whole seconds
    pub now: DateTime<Utc>,
}

/// A committed post as later stages need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostStamp {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// Identifiers produced so far in the run.
#[derive(Debug, Default)]
pub struct Population {
    /// User emails in creation order
    pub users: Vec<String>,
    pub posts: Vec<PostStamp>,
    /// Comment ids received by each post, indexed like `posts`
    pub comments: Vec<Vec<i64>>,
}

/// Counts atomic-unit failures and logs the first [`MAX_LOGGED_FAILURES`].
#[derive(Debug)]
pub struct FailureLog {
    stage: Stage,
    count: usize,
}

impl FailureLog {
    pub fn new(stage: Stage) -> Self {
        Self { stage, count: 0 }
    }

    pub fn record(&mut self, err: &LoadError) {
        self.count += 1;
        if self.count <= MAX_LOGGED_FAILURES {
            warn!(stage = %self.stage, "Rolled back unit: {}", err);
        }
        if self.count == MAX_LOGGED_FAILURES {
            warn!(stage = %self.stage, "Further failures are counted but not logged");
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

pub(crate) fn days_to_seconds(days: u32) -> i64 {
    i64::from(days) * SECONDS_PER_DAY
}

fn timestamp(date: &DateTime<Utc>) -> Value {
    Value::Text(format_timestamp(date))
}

pub(crate) fn user_row(user: &User) -> Row {
    vec![
        user.email.as_str().into(),
        user.username.as_str().into(),
        user.bio.clone().into(),
        user.profile_photo.clone().into(),
        user.status.code().into(),
    ]
}

pub(crate) fn follow_row(follow: &Follow) -> Row {
    vec![
        follow.follower_email.as_str().into(),
        follow.followed_email.as_str().into(),
    ]
}

pub(crate) fn post_row(post: &Post) -> Row {
    vec![
        post.id.into(),
        post.body.clone().into(),
        timestamp(&post.created_at),
        post.author_email.as_str().into(),
    ]
}

pub(crate) fn media_row(media: &Media) -> Row {
    vec![
        media.id.into(),
        media.location.as_str().into(),
        media.kind.as_str().into(),
        timestamp(&media.uploaded_at),
    ]
}

pub(crate) fn post_media_row(link: &PostMedia) -> Row {
    vec![link.media_id.into(), link.post_id.into()]
}

pub(crate) fn like_row(like: &Like) -> Row {
    vec![like.user_email.as_str().into(), like.post_id.into()]
}

pub(crate) fn reply_row(reply: &Reply) -> Row {
    vec![reply.child_id.into(), reply.parent_id.into()]
}

pub(crate) fn comment_row(comment: &Comment) -> Row {
    vec![
        comment.id.into(),
        comment.body.as_str().into(),
        timestamp(&comment.created_at),
        comment.post_id.into(),
        comment.author_email.as_str().into(),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;
    use plaza_types::TextPoolSizes;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    pub fn small_texts() -> TextPools {
        let sizes = TextPoolSizes {
            bios: 5,
            post_texts: 5,
            comment_texts: 5,
        };
        TextPools::generate(&mut StdRng::seed_from_u64(0), &sizes)
    }

    pub fn context<'a>(config: &'a GeneratorConfig, texts: &'a TextPools) -> StageContext<'a> {
        StageContext {
            config,
            texts,
            sampler: Sampler::from_config(config),
            now: now(),
        }
    }

    pub fn users(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("user{}@redsocial.com", i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_store::Table;
    use plaza_types::UserStatus;

    #[test]
    fn test_rows_match_table_arity() {
        let user = User {
            email: "a@x".to_string(),
            username: "a".to_string(),
            bio: None,
            profile_photo: Some("profile_0.jpg".to_string()),
            status: UserStatus::Erased,
        };
        let row = user_row(&user);
        assert_eq!(row.len(), Table::Users.columns().len());
        assert_eq!(row[2], Value::Null);
        assert_eq!(row[4], Value::Text("E".to_string()));
        assert_eq!(
            post_media_row(&PostMedia { media_id: 4, post_id: 2 }).len(),
            Table::PostMedia.columns().len()
        );
    }

    #[test]
    fn test_failure_log_counts_past_limit() {
        let mut log = FailureLog::new(Stage::Posts);
        for _ in 0..8 {
            log.record(&LoadError::constraint("posts", "no media"));
        }
        assert_eq!(log.count(), 8);
    }
}
