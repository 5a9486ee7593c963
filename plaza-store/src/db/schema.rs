/// SQL schema for the Plaza database
/// Creates all tables with proper constraints, foreign keys, and indexes
pub const SCHEMA: &str = r#"
-- Users table (email is the natural key)
CREATE TABLE IF NOT EXISTS users (
    email TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    bio TEXT,
    profile_photo TEXT,
    status TEXT NOT NULL CHECK(status IN ('A', 'D', 'E'))
);

-- Follows table (one-way relationships)
CREATE TABLE IF NOT EXISTS follows (
    follower_email TEXT NOT NULL,
    followed_email TEXT NOT NULL,
    PRIMARY KEY (follower_email, followed_email),
    CHECK (follower_email <> followed_email),
    FOREIGN KEY (follower_email) REFERENCES users(email) ON DELETE CASCADE,
    FOREIGN KEY (followed_email) REFERENCES users(email) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_follows_followed ON follows(followed_email);

-- Posts table
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY,
    body TEXT,
    created_at TEXT NOT NULL,
    author_email TEXT NOT NULL,
    FOREIGN KEY (author_email) REFERENCES users(email) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_email);
CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at DESC);

-- Media table (images and videos share one id space)
CREATE TABLE IF NOT EXISTS media (
    id INTEGER PRIMARY KEY,
    location TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('image', 'video')),
    uploaded_at TEXT NOT NULL
);

-- Post-media junction table (a media row belongs to exactly one post)
CREATE TABLE IF NOT EXISTS post_media (
    media_id INTEGER PRIMARY KEY,
    post_id INTEGER NOT NULL,
    FOREIGN KEY (media_id) REFERENCES media(id) ON DELETE CASCADE,
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_post_media_post ON post_media(post_id);

-- Likes table
CREATE TABLE IF NOT EXISTS post_likes (
    user_email TEXT NOT NULL,
    post_id INTEGER NOT NULL,
    PRIMARY KEY (user_email, post_id),
    FOREIGN KEY (user_email) REFERENCES users(email) ON DELETE CASCADE,
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_post_likes_post ON post_likes(post_id);

-- Comments table
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    post_id INTEGER NOT NULL,
    author_email TEXT NOT NULL,
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (author_email) REFERENCES users(email) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);

-- Comment replies (child_id is the key: at most one parent per comment)
CREATE TABLE IF NOT EXISTS comment_replies (
    child_id INTEGER PRIMARY KEY,
    parent_id INTEGER NOT NULL,
    CHECK (child_id <> parent_id),
    FOREIGN KEY (child_id) REFERENCES comments(id) ON DELETE CASCADE,
    FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_comment_replies_parent ON comment_replies(parent_id);

-- Direct messages table
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    body TEXT,
    sent_at TEXT NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('S', 'D', 'R')),
    sender_email TEXT NOT NULL,
    recipient_email TEXT NOT NULL,
    CHECK (sender_email <> recipient_email),
    FOREIGN KEY (sender_email) REFERENCES users(email) ON DELETE CASCADE,
    FOREIGN KEY (recipient_email) REFERENCES users(email) ON DELETE CASCADE
);

-- Named id sequences (value is the last id handed out)
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

/// Connection-scoped guard for "a post must have media at commit time".
///
/// SQLite has no deferred triggers, so new posts are recorded in a temp table
/// and the sink checks them right before every COMMIT.
pub const CONTENT_GUARD: &str = r#"
CREATE TEMP TABLE IF NOT EXISTS pending_posts (
    post_id INTEGER PRIMARY KEY
);

CREATE TEMP TRIGGER IF NOT EXISTS track_pending_post
AFTER INSERT ON main.posts
BEGIN
    INSERT OR IGNORE INTO pending_posts (post_id) VALUES (NEW.id);
END;
"#;

pub const DROP_CONTENT_GUARD: &str = r#"
DROP TRIGGER IF EXISTS temp.track_pending_post;
DELETE FROM temp.pending_posts;
"#;

/// First pending post that has no media row, if any.
pub const PENDING_POST_WITHOUT_MEDIA: &str = "SELECT p.post_id FROM temp.pending_posts p
     WHERE NOT EXISTS (SELECT 1 FROM main.post_media pm WHERE pm.post_id = p.post_id)
     LIMIT 1";

pub const CLEAR_PENDING_POSTS: &str = "DELETE FROM temp.pending_posts";

pub const USER_COLUMNS: &[&str] = &["email", "username", "bio", "profile_photo", "status"];
pub const FOLLOW_COLUMNS: &[&str] = &["follower_email", "followed_email"];
pub const POST_COLUMNS: &[&str] = &["id", "body", "created_at", "author_email"];
pub const MEDIA_COLUMNS: &[&str] = &["id", "location", "kind", "uploaded_at"];
pub const POST_MEDIA_COLUMNS: &[&str] = &["media_id", "post_id"];
pub const LIKE_COLUMNS: &[&str] = &["user_email", "post_id"];
pub const COMMENT_COLUMNS: &[&str] = &["id", "body", "created_at", "post_id", "author_email"];
pub const REPLY_COLUMNS: &[&str] = &["child_id", "parent_id"];
pub const MESSAGE_COLUMNS: &[&str] = &[
    "id",
    "body",
    "sent_at",
    "status",
    "sender_email",
    "recipient_email",
];

/// Sequence names handed to `BulkSink::reserve_ids`.
pub const POST_SEQUENCE: &str = "post_id_seq";
pub const MEDIA_SEQUENCE: &str = "media_id_seq";
pub const COMMENT_SEQUENCE: &str = "comment_id_seq";
