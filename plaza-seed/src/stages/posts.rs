//! Posts with their media and link rows.
//!
//! A post, its media and its links form one atomic unit: the store rejects a
//! post that has no media at commit time. The bulk strategy pre-computes every
//! unit of a chunk and loads the three tables inside one transaction; the
//! transactional strategy writes one unit per transaction, row by row, and
//! counts units that roll back.

use anyhow::{Context, Result};
use chrono::Duration;
use plaza_store::db::schema::{MEDIA_SEQUENCE, POST_SEQUENCE};
use plaza_store::{with_transaction, BulkSink, LoadError, Row, Table};
use plaza_types::{LoadStrategy, Media, MediaKind, Post, PostMedia};
use rand::Rng;
use tracing::debug;

use super::{
    days_to_seconds, media_row, post_media_row, post_row, FailureLog, Population, PostStamp,
    StageContext,
};
use crate::report::{Progress, Stage, StageReport};

/// One post with everything that must be stored alongside it.
#[derive(Debug, Clone)]
pub struct PostUnit {
    pub post: Post,
    pub media: Vec<Media>,
    pub links: Vec<PostMedia>,
}

impl PostUnit {
    pub fn stamp(&self) -> PostStamp {
        PostStamp {
            id: self.post.id,
            created_at: self.post.created_at,
        }
    }

    /// Rows across all three tables
    pub fn row_count(&self) -> usize {
        1 + self.media.len() + self.links.len()
    }
}

/// Draft a post and `media_ids.len()` media items for it.
///
/// The post is dated within `post_window_days` before now; media share the
/// post's timestamp.
pub fn draft_unit<R: Rng + ?Sized>(
    rng: &mut R,
    ctx: &StageContext<'_>,
    post_id: i64,
    author_email: &str,
    media_ids: std::ops::Range<i64>,
) -> PostUnit {
    let config = ctx.config;
    let age = rng.gen_range(0..=days_to_seconds(config.post_window_days));
    let created_at = ctx.now - Duration::seconds(age);
    let body = rng
        .gen_bool(config.post_text_probability)
        .then(|| ctx.texts.post_texts.pick(rng).to_string());

    let mut media = Vec::with_capacity(config.media_per_post);
    let mut links = Vec::with_capacity(config.media_per_post);
    for (index, media_id) in media_ids.enumerate() {
        let kind = if rng.gen_bool(config.image_ratio) {
            MediaKind::Image
        } else {
            MediaKind::Video
        };
        media.push(Media {
            id: media_id,
            location: kind.location(post_id, index),
            kind,
            uploaded_at: created_at,
        });
        links.push(PostMedia { media_id, post_id });
    }

    PostUnit {
        post: Post {
            id: post_id,
            body,
            created_at,
            author_email: author_email.to_string(),
        },
        media,
        links,
    }
}

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
    match ctx.config.strategy {
        LoadStrategy::Bulk => run_bulk(sink, rng, ctx, population),
        LoadStrategy::Transactional => run_transactional(sink, rng, ctx, population),
    }
}

/// Posts per chunk so one chunk stays near `batch_size` rows
fn posts_per_chunk(batch_size: usize, media_per_post: usize) -> usize {
    (batch_size / (1 + 2 * media_per_post)).max(1)
}

fn run_bulk<S, R>(
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
    let per_user = config.posts_per_user;
    let media_per_post = config.media_per_post;
    let total = population.users.len() * per_user;
    let chunk = posts_per_chunk(config.batch_size, media_per_post);

    let mut report = StageReport::new(Stage::Posts);
    report.requested = total;
    let mut failures = FailureLog::new(Stage::Posts);
    let mut progress = Progress::new(Stage::Posts, total);
    population.posts.reserve(total);

    let mut start = 0;
    while start < total {
        let len = chunk.min(total - start);
        let post_ids = sink
            .reserve_ids(POST_SEQUENCE, len as u64)
            .context("Failed to reserve post ids")?;
        let media_ids = sink
            .reserve_ids(MEDIA_SEQUENCE, (len * media_per_post) as u64)
            .context("Failed to reserve media ids")?;

        let mut posts: Vec<Row> = Vec::with_capacity(len);
        let mut media: Vec<Row> = Vec::with_capacity(len * media_per_post);
        let mut links: Vec<Row> = Vec::with_capacity(len * media_per_post);
        let mut stamps = Vec::with_capacity(len);

        for (offset, post_id) in post_ids.enumerate() {
            let author = &population.users[(start + offset) / per_user];
            let first_media = media_ids.start + (offset * media_per_post) as i64;
            let unit = draft_unit(
                rng,
                ctx,
                post_id,
                author,
                first_media..first_media + media_per_post as i64,
            );
            posts.push(post_row(&unit.post));
            media.extend(unit.media.iter().map(media_row));
            links.extend(unit.links.iter().map(post_media_row));
            stamps.push(unit.stamp());
        }

        let loaded = with_transaction(sink, |sink| {
            let mut rows = sink.insert_batch(Table::Posts, Table::Posts.columns(), &posts)?;
            if !media.is_empty() {
                rows += sink.insert_batch(Table::Media, Table::Media.columns(), &media)?;
                rows += sink.insert_batch(Table::PostMedia, Table::PostMedia.columns(), &links)?;
            }
            Ok(rows)
        });

        match loaded {
            Ok(rows) => {
                population.posts.extend(stamps);
                report.produced += len;
                report.rows += rows;
            }
            Err(err) if err.is_constraint() => {
                failures.record(&err);
                report.failed += len;
            }
            Err(err) => return Err(err).context("Failed to load post chunk"),
        }

        progress.advance(len);
        start += len;
    }

    debug!(
        rejected_chunks = failures.count(),
        failed_posts = report.failed,
        "Post chunks done"
    );
    Ok(report)
}

fn run_transactional<S, R>(
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
    let per_user = config.posts_per_user;
    let media_per_post = config.media_per_post;
    let total = population.users.len() * per_user;

    let mut report = StageReport::new(Stage::Posts);
    report.requested = total;
    let mut failures = FailureLog::new(Stage::Posts);
    let mut progress = Progress::new(Stage::Posts, total);
    let log_every = config.batch_size.max(1);

    for n in 0..total {
        let author = &population.users[n / per_user];

        let loaded = with_transaction(sink, |sink| -> Result<PostUnit, LoadError> {
            let post_id = sink.next_id(POST_SEQUENCE)?;
            let media_ids = sink.reserve_ids(MEDIA_SEQUENCE, media_per_post as u64)?;
            let unit = draft_unit(rng, ctx, post_id, author, media_ids);

            sink.insert_row(Table::Posts, Table::Posts.columns(), &post_row(&unit.post))?;
            for media in &unit.media {
                sink.insert_row(Table::Media, Table::Media.columns(), &media_row(media))?;
            }
            for link in &unit.links {
                sink.insert_row(Table::PostMedia, Table::PostMedia.columns(), &post_media_row(link))?;
            }
            Ok(unit)
        });

        match loaded {
            Ok(unit) => {
                population.posts.push(unit.stamp());
                report.produced += 1;
                report.rows += unit.row_count();
            }
            Err(err) if err.is_constraint() => {
                failures.record(&err);
                report.failed += 1;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to load post {} of {}", n + 1, total))
            }
        }

        if (n + 1) % log_every == 0 {
            progress.advance(log_every);
        }
    }
    progress.complete();

    Ok(report)
}
