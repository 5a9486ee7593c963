use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use plaza_seed::{Pipeline, Stage};
use plaza_store::db::{reset_generated_data, verify_store, Database};
use plaza_store::{MemorySink, SqliteLoader, Table};
use plaza_types::{GeneratorConfig, LoadStrategy, SamplingPolicy};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn sqlite_loader() -> Result<SqliteLoader> {
    let db = Database::in_memory()?;
    db.initialize()?;
    db.loader()
}

fn count(conn: &Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |row| row.get(0))?)
}

/// 1000 users with 9 follows each: at most 9000 clean edges
#[test]
fn test_follow_graph_scenario() -> Result<()> {
    let mut loader = sqlite_loader()?;
    let config = GeneratorConfig {
        user_count: 1000,
        follows_per_user: 9,
        seed: Some(9),
        ..Default::default()
    };

    let summary = Pipeline::run(&mut loader, config, now())?;
    let conn = loader.connection();

    let follows = count(conn, "SELECT COUNT(*) FROM follows")?;
    assert!(follows <= 9000);
    assert_eq!(summary.stage(Stage::Follows).map(|r| r.produced as i64), Some(follows));
    assert_eq!(count(conn, "SELECT COUNT(*) FROM follows WHERE follower_email = followed_email")?, 0);
    assert_eq!(count(conn, "SELECT COUNT(DISTINCT email) FROM users")?, 1000);
    assert_eq!(count(conn, "SELECT COUNT(DISTINCT username) FROM users")?, 1000);

    let report = verify_store(conn, now())?;
    assert!(report.is_clean(), "violations: {:?}", report.violations);
    Ok(())
}

/// 1000 users, 5 posts each with 2 media: 5000 posts and 10000 linked media
#[test]
fn test_post_media_scenario() -> Result<()> {
    let mut loader = sqlite_loader()?;
    let config = GeneratorConfig {
        user_count: 1000,
        posts_per_user: 5,
        media_per_post: 2,
        batch_size: 2_000,
        seed: Some(5),
        ..Default::default()
    };

    let summary = Pipeline::run(&mut loader, config, now())?;
    let posts = summary.stage(Stage::Posts).expect("posts stage ran");
    assert_eq!(posts.produced + posts.failed, 5000);

    let conn = loader.connection();
    assert_eq!(count(conn, "SELECT COUNT(*) FROM posts")?, posts.produced as i64);
    assert_eq!(count(conn, "SELECT COUNT(*) FROM media")?, 2 * posts.produced as i64);
    assert_eq!(
        count(
            conn,
            "SELECT COUNT(*) FROM post_media pm
             LEFT JOIN media m ON m.id = pm.media_id
             LEFT JOIN posts p ON p.id = pm.post_id
             WHERE m.id IS NULL OR p.id IS NULL"
        )?,
        0
    );

    let report = verify_store(conn, now())?;
    assert!(report.is_clean(), "violations: {:?}", report.violations);
    assert_eq!(report.violation("posts_without_media"), Some(0));
    Ok(())
}

/// Row-at-a-time units that cannot satisfy the content invariant all roll back
#[test]
fn test_transactional_without_media_fails_every_post() -> Result<()> {
    let mut loader = sqlite_loader()?;
    let config = GeneratorConfig {
        user_count: 20,
        posts_per_user: 2,
        media_per_post: 0,
        strategy: LoadStrategy::Transactional,
        seed: Some(2),
        ..Default::default()
    };

    let summary = Pipeline::run(&mut loader, config, now())?;
    assert!(!summary.tuned);

    let posts = summary.stage(Stage::Posts).expect("posts stage ran");
    assert_eq!(posts.failed, 40);
    assert_eq!(posts.produced, 0);
    assert_eq!(summary.total_failed(), 40);

    // Nothing downstream has posts to refer to
    let conn = loader.connection();
    assert_eq!(count(conn, "SELECT COUNT(*) FROM posts")?, 0);
    assert_eq!(count(conn, "SELECT COUNT(*) FROM post_likes")?, 0);
    assert_eq!(count(conn, "SELECT COUNT(*) FROM comments")?, 0);
    assert!(verify_store(conn, now())?.is_clean());
    Ok(())
}

#[test]
fn test_transactional_run_is_clean() -> Result<()> {
    let mut loader = sqlite_loader()?;
    let config = GeneratorConfig {
        user_count: 100,
        strategy: LoadStrategy::Transactional,
        sampling: SamplingPolicy::Exact,
        seed: Some(8),
        ..Default::default()
    };

    let summary = Pipeline::run(&mut loader, config, now())?;
    assert_eq!(summary.stage(Stage::Posts).map(|r| r.produced), Some(300));

    let conn = loader.connection();
    let report = verify_store(conn, now())?;
    assert!(report.is_clean(), "violations: {:?}", report.violations);
    assert_eq!(report.count_of(Table::Messages), 0);
    Ok(())
}

#[test]
fn test_comment_and_reply_invariants_hold_in_store() -> Result<()> {
    let mut loader = sqlite_loader()?;
    let config = GeneratorConfig {
        user_count: 300,
        comments_per_user: 8,
        reply_range: (1, 4),
        seed: Some(13),
        ..Default::default()
    };

    let summary = Pipeline::run(&mut loader, config, now())?;
    assert!(summary.stage(Stage::Replies).map(|r| r.produced).unwrap_or(0) > 0);

    let conn = loader.connection();
    assert_eq!(
        count(
            conn,
            "SELECT COUNT(*) FROM comments c JOIN posts p ON p.id = c.post_id
             WHERE c.created_at < p.created_at OR c.created_at > '2024-06-01T12:00:00Z'"
        )?,
        0
    );
    assert_eq!(
        count(
            conn,
            "SELECT COUNT(*) FROM comment_replies r
             JOIN comments child ON child.id = r.child_id
             JOIN comments parent ON parent.id = r.parent_id
             WHERE child.post_id <> parent.post_id OR r.child_id = r.parent_id"
        )?,
        0
    );
    Ok(())
}

/// A reset store accepts the same seeded run again without key collisions
#[test]
fn test_reset_allows_rerun() -> Result<()> {
    let mut loader = sqlite_loader()?;
    let config = GeneratorConfig {
        user_count: 50,
        seed: Some(21),
        ..Default::default()
    };

    let first = Pipeline::run(&mut loader, config.clone(), now())?;
    assert!(Pipeline::run(&mut loader, config.clone(), now()).is_err());

    let deleted = reset_generated_data(loader.connection())?;
    assert!(deleted >= first.total_rows);

    let second = Pipeline::run(&mut loader, config, now())?;
    assert_eq!(first.total_rows, second.total_rows);
    Ok(())
}

#[test]
fn test_dry_run_counts_without_store() -> Result<()> {
    let mut sink = MemorySink::counting();
    let config = GeneratorConfig {
        user_count: 200,
        seed: Some(1),
        ..Default::default()
    };

    let summary = Pipeline::new(config)?.execute(&mut sink, now())?;
    assert_eq!(sink.count(Table::Users), 200);
    assert_eq!(sink.count(Table::Posts), 600);
    assert!(sink.rows(Table::Users).is_empty());
    assert_eq!(
        summary.total_rows,
        Table::ALL.iter().map(|t| sink.count(*t)).sum::<usize>()
    );
    Ok(())
}

/// A dry run previews the same outcome the store would produce
#[test]
fn test_dry_run_agrees_with_store() -> Result<()> {
    for media_per_post in [0, 1] {
        let config = GeneratorConfig {
            user_count: 10,
            media_per_post,
            strategy: LoadStrategy::Transactional,
            seed: Some(1),
            ..Default::default()
        };

        let mut dry = MemorySink::counting();
        let previewed = Pipeline::new(config.clone())?.execute(&mut dry, now())?;
        let mut loader = sqlite_loader()?;
        let stored = Pipeline::run(&mut loader, config, now())?;

        let dry_posts = previewed.stage(Stage::Posts).expect("posts stage ran");
        let stored_posts = stored.stage(Stage::Posts).expect("posts stage ran");
        assert_eq!(
            (dry_posts.produced, dry_posts.failed),
            (stored_posts.produced, stored_posts.failed),
            "media_per_post = {}",
            media_per_post
        );
        assert_eq!(
            dry.count(Table::Posts) as i64,
            count(loader.connection(), "SELECT COUNT(*) FROM posts")?
        );
    }
    Ok(())
}
