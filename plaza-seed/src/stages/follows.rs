use anyhow::{Context, Result};
use plaza_store::{BulkSink, Table};
use plaza_types::Follow;
use rand::Rng;
use tracing::{info, warn};

use super::{follow_row, Population, StageContext};
use crate::batch::BatchWriter;
use crate::report::{Progress, Stage, StageReport};

/// Directed follow edges: up to `follows_per_user` distinct targets per user,
/// never the user itself.
///
/// Dedup is per follower, which is enough for global `(follower, followed)`
/// uniqueness since each follower is visited once.
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
    let users = &population.users;
    let per_user = ctx.config.follows_per_user;
    let reachable = per_user.min(users.len().saturating_sub(1));
    if reachable < per_user && !users.is_empty() {
        info!(
            requested = per_user,
            clamped = reachable,
            "Follows per user clamped to the user population"
        );
    }

    let mut report = StageReport::new(Stage::Follows);
    report.requested = users.len() * reachable;

    let progress = Progress::new(Stage::Follows, report.requested);
    let mut writer = BatchWriter::new(sink, Table::Follows, ctx.config.batch_size, progress);

    for (index, follower) in users.iter().enumerate() {
        for target in ctx.sampler.distinct_indices(rng, users.len(), per_user, Some(index)) {
            let follow = Follow {
                follower_email: follower.clone(),
                followed_email: users[target].clone(),
            };
            writer
                .push(follow_row(&follow))
                .context("Failed to load follows")?;
        }
    }

    let written = writer.finish().context("Failed to load follows")?;
    report.produced = written;
    report.rows = written;

    if report.shortfall() > 0 {
        warn!(
            requested = report.requested,
            produced = report.produced,
            "Follow fan-out fell short: draws kept colliding within the retry budget"
        );
    }
    Ok(report)
}
