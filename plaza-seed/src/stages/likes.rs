use anyhow::{Context, Result};
use plaza_store::{BulkSink, Table};
use plaza_types::Like;
use rand::Rng;
use tracing::warn;

use super::{like_row, Population, StageContext};
use crate::batch::BatchWriter;
use crate::report::{Progress, Stage, StageReport};

/// Like edges: each user likes a random number of distinct posts within
/// `like_range`, capped at the number of posts that exist.
pub fn run<S, R>(
    sink: &mut S,
    rng: &mut R,
    ctx: &StageContext<'_>,
    population: &Population,
) -> Result<StageReport>
where
    S: BulkSink + ?Sized,
    R: Rng + ?Sized,
{
    let posts = &population.posts;
    let (min, max) = ctx.config.like_range;

    let mut report = StageReport::new(Stage::Likes);
    let expected = population.users.len() * max.min(posts.len());
    let progress = Progress::new(Stage::Likes, expected);
    let mut writer = BatchWriter::new(sink, Table::PostLikes, ctx.config.batch_size, progress);

    if posts.is_empty() {
        if max > 0 && !population.users.is_empty() {
            warn!("No posts were stored; skipping likes");
        }
        return Ok(report);
    }

    for user in &population.users {
        let target = rng.gen_range(min..=max).min(posts.len());
        report.requested += target;
        for index in ctx.sampler.distinct_indices(rng, posts.len(), target, None) {
            let like = Like {
                user_email: user.clone(),
                post_id: posts[index].id,
            };
            writer.push(like_row(&like)).context("Failed to load likes")?;
        }
    }

    let written = writer.finish().context("Failed to load likes")?;
    report.produced = written;
    report.rows = written;

    if report.shortfall() > 0 {
        warn!(
            requested = report.requested,
            produced = report.produced,
            "Like fan-out fell short: draws kept colliding within the retry budget"
        );
    }
    Ok(report)
}
