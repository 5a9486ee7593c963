use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use plaza_store::db::schema::COMMENT_SEQUENCE;
use plaza_store::{BulkSink, Table};
use plaza_types::Comment;
use rand::Rng;
use tracing::warn;

use super::{comment_row, days_to_seconds, Population, StageContext};
use crate::batch::BatchWriter;
use crate::report::{Progress, Stage, StageReport};

/// Comment time: after the post, at most `window_secs` later and never after `now`.
///
/// Falls back to the post's own time when the post is not in the past.
pub fn comment_time<R: Rng + ?Sized>(
    rng: &mut R,
    posted_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_secs: i64,
) -> DateTime<Utc> {
    let span = (now - posted_at).num_seconds().min(window_secs);
    if span <= 0 {
        return posted_at;
    }
    posted_at + Duration::seconds(rng.gen_range(0..=span))
}

/// `comments_per_user` comments per user on uniformly chosen posts.
///
/// Fills `population.comments` with the ids each post received.
pub fn run<S, R>(
    sink: &mut S,
    rng: &mut R,
    ctx: &StageContext<'_>,
    population: &mut Population,
) -> Result<StageReport>
where
    S: BulkSink + ?Sized,
    R: Rng + ?Sized,
{
    let config = ctx.config;
    let total = population.users.len() * config.comments_per_user;

    let mut report = StageReport::new(Stage::Comments);
    report.requested = total;
    population.comments = vec![Vec::new(); population.posts.len()];

    if population.posts.is_empty() {
        if total > 0 {
            warn!(requested = total, "No posts were stored; skipping comments");
        }
        return Ok(report);
    }

    let ids = sink
        .reserve_ids(COMMENT_SEQUENCE, total as u64)
        .context("Failed to reserve comment ids")?;
    let window = days_to_seconds(config.comment_window_days);

    let progress = Progress::new(Stage::Comments, total);
    let mut writer = BatchWriter::new(sink, Table::Comments, config.batch_size, progress);
    let mut next_id = ids.start;

    for author in &population.users {
        for _ in 0..config.comments_per_user {
            let index = rng.gen_range(0..population.posts.len());
            let post = population.posts[index];
            let comment = Comment {
                id: next_id,
                body: ctx.texts.comment_texts.pick(rng).to_string(),
                created_at: comment_time(rng, post.created_at, ctx.now, window),
                post_id: post.id,
                author_email: author.clone(),
            };
            writer
                .push(comment_row(&comment))
                .context("Failed to load comments")?;
            population.comments[index].push(comment.id);
            next_id += 1;
        }
    }

    let written = writer.finish().context("Failed to load comments")?;
    report.produced = written;
    report.rows = written;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{context, now, small_texts, users};
    use crate::stages::PostStamp;
    use plaza_store::MemorySink;
    use plaza_types::GeneratorConfig;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_future_post_falls_back_to_post_time() {
        let mut rng = StdRng::seed_from_u64(1);
        let posted = now() + Duration::hours(1);
        assert_eq!(comment_time(&mut rng, posted, now(), 86_400), posted);
        assert_eq!(comment_time(&mut rng, now(), now(), 86_400), now());
    }

    #[test]
    fn test_comments_follow_their_posts() {
        let config = GeneratorConfig {
            comments_per_user: 4,
            batch_size: 7,
            ..Default::default()
        };
        let texts = small_texts();
        let ctx = context(&config, &texts);
        let mut pop = Population {
            users: users(30),
            posts: (1..=10)
                .map(|id| PostStamp {
                    id,
                    created_at: now() - Duration::days(id * 40),
                })
                .collect(),
            comments: Vec::new(),
        };
        let mut sink = MemorySink::new();

        let report = run(&mut sink, &mut StdRng::seed_from_u64(2), &ctx, &mut pop)
            .expect("Failed to generate comments");

        assert_eq!(report.produced, 120);
        assert_eq!(pop.comments.len(), 10);
        assert_eq!(pop.comments.iter().map(Vec::len).sum::<usize>(), 120);

        for row in sink.rows(Table::Comments) {
            let created_at = row[2].as_text().expect("created_at");
            let post_id = row[3].as_integer().expect("post_id");
            let post = pop.posts[(post_id - 1) as usize];
            let posted_at = plaza_types::format_timestamp(&post.created_at);
            assert!(created_at >= posted_at.as_str());
            assert!(created_at <= plaza_types::format_timestamp(&now()).as_str());
            let id = row[0].as_integer().expect("id");
            assert!(pop.comments[(post_id - 1) as usize].contains(&id));
        }
    }

    proptest! {
        #[test]
        fn prop_comment_time_is_bounded(
            seed in any::<u64>(),
            age_secs in -10_000i64..100_000_000,
            window_days in 0u32..800,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let posted = now() - Duration::seconds(age_secs);
            let at = comment_time(&mut rng, posted, now(), days_to_seconds(window_days));
            prop_assert!(at >= posted);
            if age_secs >= 0 {
                prop_assert!(at <= now());
            }
            prop_assert!(at - posted <= Duration::seconds(days_to_seconds(window_days).max(0)));
        }
    }
}
