use anyhow::{Context, Result};
use plaza_store::{BulkSink, Table};
use plaza_types::{Reply, SamplingPolicy};
use rand::seq::index;
use rand::Rng;
use std::collections::HashSet;
use tracing::warn;

use super::{reply_row, Population, StageContext};
use crate::batch::BatchWriter;
use crate::report::{Progress, Stage, StageReport};
use crate::sampling::fill_best_effort;

/// Reply edges between comments of the same post.
///
/// Only posts with at least two comments take part. A comment gets at most one
/// parent in the run: the set of assigned children is checked before an edge
/// is accepted, whatever the sink enforces.
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
    let (min, max) = ctx.config.reply_range;
    let threads: Vec<&[i64]> = population
        .comments
        .iter()
        .filter(|ids| ids.len() >= 2)
        .map(Vec::as_slice)
        .collect();

    let mut report = StageReport::new(Stage::Replies);
    let progress = Progress::new(Stage::Replies, population.users.len() * max);
    let mut writer = BatchWriter::new(sink, Table::CommentReplies, ctx.config.batch_size, progress);

    if threads.is_empty() {
        if max > 0 && !population.users.is_empty() {
            warn!("No post has two comments; skipping replies");
        }
        return Ok(report);
    }

    let mut picker = ChildPicker::new(ctx.sampler.policy(), &threads);
    for _ in &population.users {
        let target = rng.gen_range(min..=max);
        report.requested += target;
        let budget = ctx.sampler.budget(target);
        for reply in picker.pick(rng, target, budget) {
            writer
                .push(reply_row(&reply))
                .context("Failed to load replies")?;
        }
    }

    let written = writer.finish().context("Failed to load replies")?;
    report.produced = written;
    report.rows = written;

    if report.shortfall() > 0 {
        warn!(
            requested = report.requested,
            produced = report.produced,
            "Reply fan-out fell short: no fresh child comment within the retry budget"
        );
    }
    Ok(report)
}

/// Hands out reply edges, never the same child twice.
enum ChildPicker<'a> {
    /// Random thread, two random comments, retried while the child is taken
    BoundedRetry {
        threads: &'a [&'a [i64]],
        children: HashSet<i64>,
    },
    /// Draws children without replacement from every comment still unassigned
    Exact {
        threads: &'a [&'a [i64]],
        /// (thread, position) of each comment that has no parent yet
        free: Vec<(usize, usize)>,
    },
}

impl<'a> ChildPicker<'a> {
    fn new(policy: SamplingPolicy, threads: &'a [&'a [i64]]) -> Self {
        match policy {
            SamplingPolicy::BoundedRetry => ChildPicker::BoundedRetry {
                threads,
                children: HashSet::new(),
            },
            SamplingPolicy::Exact => ChildPicker::Exact {
                threads,
                free: threads
                    .iter()
                    .enumerate()
                    .flat_map(|(t, ids)| (0..ids.len()).map(move |p| (t, p)))
                    .collect(),
            },
        }
    }

    fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R, target: usize, budget: usize) -> Vec<Reply> {
        match self {
            ChildPicker::BoundedRetry { threads, children } => {
                fill_best_effort(rng, target, budget, |rng| {
                    let ids = threads[rng.gen_range(0..threads.len())];
                    let pair = index::sample(rng, ids.len(), 2);
                    let (child_id, parent_id) = (ids[pair.index(0)], ids[pair.index(1)]);
                    children
                        .insert(child_id)
                        .then_some(Reply { child_id, parent_id })
                })
            }
            ChildPicker::Exact { threads, free } => {
                let take = target.min(free.len());
                (0..take)
                    .map(|_| {
                        let slot = rng.gen_range(0..free.len());
                        let (thread, position) = free.swap_remove(slot);
                        let ids = threads[thread];
                        // Any other comment of the thread, skipping the child's slot
                        let mut other = rng.gen_range(0..ids.len() - 1);
                        if other >= position {
                            other += 1;
                        }
                        Reply {
                            child_id: ids[position],
                            parent_id: ids[other],
                        }
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{context, small_texts, users};
    use plaza_store::MemorySink;
    use plaza_types::GeneratorConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn population(users_n: usize, comments: Vec<Vec<i64>>) -> Population {
        Population {
            users: users(users_n),
            posts: Vec::new(),
            comments,
        }
    }

    fn check_edges(sink: &MemorySink, comments: &[Vec<i64>]) {
        let thread_of: HashMap<i64, usize> = comments
            .iter()
            .enumerate()
            .flat_map(|(t, ids)| ids.iter().map(move |id| (*id, t)))
            .collect();
        let mut children = HashSet::new();
        for row in sink.rows(Table::CommentReplies) {
            let child = row[0].as_integer().expect("child");
            let parent = row[1].as_integer().expect("parent");
            assert_ne!(child, parent);
            assert!(children.insert(child), "child {} has two parents", child);
            assert_eq!(thread_of[&child], thread_of[&parent]);
            assert!(comments[thread_of[&child]].len() >= 2);
        }
    }

    #[test]
    fn test_bounded_retry_edges_hold_invariants() {
        let comments = vec![vec![1, 2, 3], vec![4], vec![5, 6], vec![], vec![7, 8, 9, 10]];
        let config = GeneratorConfig {
            reply_range: (1, 3),
            ..Default::default()
        };
        let texts = small_texts();
        let ctx = context(&config, &texts);
        let pop = population(20, comments.clone());
        let mut sink = MemorySink::new();

        let report = run(&mut sink, &mut StdRng::seed_from_u64(10), &ctx, &pop)
            .expect("Failed to generate replies");

        // Comment 4 sits alone on its post and can never be a child; nine can
        assert!(report.produced <= 9);
        check_edges(&sink, &comments);
    }

    #[test]
    fn test_exact_assigns_every_eligible_child() {
        let comments = vec![vec![1, 2], vec![3, 4, 5]];
        let config = GeneratorConfig {
            reply_range: (3, 3),
            sampling: SamplingPolicy::Exact,
            ..Default::default()
        };
        let texts = small_texts();
        let ctx = context(&config, &texts);
        let pop = population(4, comments.clone());
        let mut sink = MemorySink::new();

        let report = run(&mut sink, &mut StdRng::seed_from_u64(11), &ctx, &pop)
            .expect("Failed to generate replies");

        assert_eq!(report.requested, 12);
        assert_eq!(report.produced, 5);
        check_edges(&sink, &comments);
    }

    #[test]
    fn test_no_threads_no_replies() {
        let config = GeneratorConfig::default();
        let texts = small_texts();
        let ctx = context(&config, &texts);
        let pop = population(3, vec![vec![1], vec![]]);
        let mut sink = MemorySink::new();

        let report = run(&mut sink, &mut StdRng::seed_from_u64(12), &ctx, &pop)
            .expect("Failed to generate replies");
        assert_eq!(report.produced, 0);
        assert_eq!(sink.count(Table::CommentReplies), 0);
    }
}
