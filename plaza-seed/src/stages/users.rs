use anyhow::{Context, Result};
use plaza_store::{BulkSink, Table};
use plaza_types::{User, UserStatus};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::{user_row, Population, StageContext};
use crate::batch::BatchWriter;
use crate::report::{Progress, Stage, StageReport};

/// Build user `index`. Email and username derive from the index, so they are
/// unique without a dedup pass.
pub fn build_user<R: Rng + ?Sized>(
    rng: &mut R,
    ctx: &StageContext<'_>,
    statuses: &WeightedIndex<u32>,
    index: usize,
) -> User {
    let config = ctx.config;
    let bio = rng
        .gen_bool(config.bio_probability)
        .then(|| ctx.texts.bios.pick(rng).to_string());
    let profile_photo = rng
        .gen_bool(config.photo_probability)
        .then(|| format!("profile_{}.jpg", index));

    User {
        email: format!("user{}@{}", index, config.email_domain),
        username: format!("user_{}", index),
        bio,
        profile_photo,
        status: UserStatus::ALL[statuses.sample(rng)],
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
    let config = ctx.config;
    let statuses =
        WeightedIndex::new(config.status_weights.as_array()).context("Invalid user status weights")?;

    let mut report = StageReport::new(Stage::Users);
    report.requested = config.user_count;

    let progress = Progress::new(Stage::Users, config.user_count);
    let mut writer = BatchWriter::new(sink, Table::Users, config.batch_size, progress);
    population.users.reserve(config.user_count);

    for index in 0..config.user_count {
        let user = build_user(rng, ctx, &statuses, index);
        writer
            .push(user_row(&user))
            .context("Failed to load users")?;
        population.users.push(user.email);
    }

    let written = writer.finish().context("Failed to load users")?;
    report.produced = written;
    report.rows = written;
    Ok(report)
}
