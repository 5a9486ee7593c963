use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use plaza_types::format_timestamp;
use rusqlite::Connection;
use serde::Serialize;

use crate::sink::Table;

/// Delete every generated row, children first, and reset the id sequences.
///
/// Re-running the generator against a populated store collides on emails and
/// usernames; this is the reset a re-run needs. Returns the rows deleted.
pub fn reset_generated_data(conn: &Connection) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin reset transaction")?;

    let mut deleted = 0;
    for table in Table::ALL.iter().rev() {
        deleted += tx
            .execute(&format!("DELETE FROM {}", table.name()), [])
            .with_context(|| format!("Failed to clear {}", table))?;
    }
    tx.execute("DELETE FROM sequences", [])
        .context("Failed to reset sequences")?;

    tx.commit().context("Failed to commit reset")?;
    Ok(deleted)
}

/// One store-level invariant check and how many rows break it
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Violation {
    pub check: &'static str,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub table_counts: Vec<(String, i64)>,
    pub violations: Vec<Violation>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.iter().all(|v| v.count == 0)
    }

    pub fn count_of(&self, table: Table) -> i64 {
        self.table_counts
            .iter()
            .find(|(name, _)| name == table.name())
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn violation(&self, check: &str) -> Option<i64> {
        self.violations
            .iter()
            .find(|v| v.check == check)
            .map(|v| v.count)
    }
}

const CHECKS: &[(&str, &str)] = &[
    (
        "posts_without_media",
        "SELECT COUNT(*) FROM posts p
         WHERE NOT EXISTS (SELECT 1 FROM post_media pm WHERE pm.post_id = p.id)",
    ),
    (
        "self_follows",
        "SELECT COUNT(*) FROM follows WHERE follower_email = followed_email",
    ),
    (
        "comments_before_post",
        "SELECT COUNT(*) FROM comments c JOIN posts p ON p.id = c.post_id
         WHERE c.created_at < p.created_at",
    ),
    (
        "self_replies",
        "SELECT COUNT(*) FROM comment_replies WHERE child_id = parent_id",
    ),
    (
        "replies_across_posts",
        "SELECT COUNT(*) FROM comment_replies r
         JOIN comments child ON child.id = r.child_id
         JOIN comments parent ON parent.id = r.parent_id
         WHERE child.post_id <> parent.post_id",
    ),
    (
        "invalid_user_status",
        "SELECT COUNT(*) FROM users WHERE status NOT IN ('A', 'D', 'E')",
    ),
];

/// Check the generated dataset's invariants against what is actually stored.
///
/// `now` bounds comment timestamps from above.
pub fn verify_store(conn: &Connection, now: DateTime<Utc>) -> Result<VerificationReport> {
    let mut table_counts = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| row.get(0))
            .with_context(|| format!("Failed to count {}", table))?;
        table_counts.push((table.name().to_string(), count));
    }

    let mut violations = Vec::with_capacity(CHECKS.len() + 2);
    for &(check, sql) in CHECKS {
        let count: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("Failed to run check {}", check))?;
        violations.push(Violation { check, count });
    }

    let future_comments: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM comments WHERE created_at > ?",
            [format_timestamp(&now)],
            |row| row.get(0),
        )
        .context("Failed to run check comments_in_future")?;
    violations.push(Violation {
        check: "comments_in_future",
        count: future_comments,
    });

    // Each row of foreign_key_check is one dangling reference
    let mut stmt = conn
        .prepare("PRAGMA foreign_key_check")
        .context("Failed to prepare foreign key check")?;
    let dangling = stmt
        .query_map([], |_| Ok(()))
        .context("Failed to run foreign key check")?
        .count() as i64;
    violations.push(Violation {
        check: "dangling_foreign_keys",
        count: dangling,
    });

    Ok(VerificationReport {
        table_counts,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn seed_minimal(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO users (email, username, status) VALUES
                 ('a@x', 'a', 'A'), ('b@x', 'b', 'D');
             INSERT INTO follows (follower_email, followed_email) VALUES ('a@x', 'b@x');
             INSERT INTO posts (id, body, created_at, author_email) VALUES
                 (1, 'hi', '2024-01-01T00:00:00Z', 'a@x');
             INSERT INTO media (id, location, kind, uploaded_at) VALUES
                 (1, 'images/img_1_0.jpg', 'image', '2024-01-01T00:00:00Z');
             INSERT INTO post_media (media_id, post_id) VALUES (1, 1);
             INSERT INTO comments (id, body, created_at, post_id, author_email) VALUES
                 (1, 'first', '2024-01-02T00:00:00Z', 1, 'b@x'),
                 (2, 'second', '2024-01-03T00:00:00Z', 1, 'a@x');
             INSERT INTO comment_replies (child_id, parent_id) VALUES (2, 1);
             INSERT INTO sequences (name, value) VALUES ('post_id_seq', 1);",
        )
        .expect("Failed to seed");
    }

    #[test]
    fn test_verify_clean_store() {
        let db = Database::in_memory().expect("Failed to create database");
        db.initialize().expect("Failed to initialize schema");
        let conn = db.connection().expect("Failed to get connection");
        seed_minimal(&conn);

        let report = verify_store(&conn, Utc::now()).expect("Failed to verify");
        assert!(report.is_clean(), "unexpected violations: {:?}", report.violations);
        assert_eq!(report.count_of(Table::Users), 2);
        assert_eq!(report.count_of(Table::CommentReplies), 1);
    }

    #[test]
    fn test_verify_flags_orphan_post_and_early_comment() {
        let db = Database::in_memory().expect("Failed to create database");
        db.initialize().expect("Failed to initialize schema");
        let conn = db.connection().expect("Failed to get connection");
        seed_minimal(&conn);
        conn.execute_batch(
            "INSERT INTO posts (id, body, created_at, author_email) VALUES
                 (2, NULL, '2024-06-01T00:00:00Z', 'b@x');
             INSERT INTO comments (id, body, created_at, post_id, author_email) VALUES
                 (3, 'too early', '2024-05-01T00:00:00Z', 2, 'a@x');",
        )
        .expect("Failed to insert bad rows");

        let report = verify_store(&conn, Utc::now()).expect("Failed to verify");
        assert!(!report.is_clean());
        assert_eq!(report.violation("posts_without_media"), Some(1));
        assert_eq!(report.violation("comments_before_post"), Some(1));
        assert_eq!(report.violation("self_follows"), Some(0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let db = Database::in_memory().expect("Failed to create database");
        db.initialize().expect("Failed to initialize schema");
        let conn = db.connection().expect("Failed to get connection");
        seed_minimal(&conn);

        let deleted = reset_generated_data(&conn).expect("Failed to reset");
        assert_eq!(deleted, 9);

        let report = verify_store(&conn, Utc::now()).expect("Failed to verify");
        assert!(report.table_counts.iter().all(|(_, count)| *count == 0));
        let sequences: i64 = conn
            .query_row("SELECT COUNT(*) FROM sequences", [], |row| row.get(0))
            .expect("Failed to count sequences");
        assert_eq!(sequences, 0);
    }
}
