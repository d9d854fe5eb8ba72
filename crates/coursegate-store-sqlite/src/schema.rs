//! SQL schema for the Coursegate SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS profiles (
    user_id           TEXT PRIMARY KEY,
    email             TEXT NOT NULL,
    subscription_tier TEXT NOT NULL DEFAULT 'free',
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

-- Only the SHA-256 digest of a bearer token is kept.
CREATE TABLE IF NOT EXISTS sessions (
    token_digest TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    email        TEXT NOT NULL,
    expires_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    course_id     TEXT PRIMARY KEY,
    title         TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    required_tier TEXT NOT NULL,     -- 'free' | 'basic' | 'premium'
    price         INTEGER NOT NULL CHECK (price >= 0),
    is_active     INTEGER NOT NULL DEFAULT 1,
    access_days   INTEGER,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS course_modules (
    module_id     TEXT PRIMARY KEY,
    course_id     TEXT NOT NULL REFERENCES courses(course_id) ON DELETE CASCADE,
    position      INTEGER NOT NULL,
    title         TEXT NOT NULL,
    required_tier TEXT NOT NULL,
    is_premium    INTEGER NOT NULL DEFAULT 0,
    duration_secs INTEGER,
    media_ref     TEXT,
    UNIQUE (course_id, position)
);

CREATE TABLE IF NOT EXISTS course_downloads (
    download_id TEXT PRIMARY KEY,
    course_id   TEXT NOT NULL REFERENCES courses(course_id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    url         TEXT NOT NULL,
    is_premium  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

-- Failed attempts stay as history; a retry inserts a new row.
CREATE TABLE IF NOT EXISTS user_courses (
    entitlement_id TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    course_id      TEXT NOT NULL REFERENCES courses(course_id) ON DELETE CASCADE,
    payment_status TEXT NOT NULL
                   CHECK (payment_status IN ('pending', 'completed', 'failed')),
    purchase_price INTEGER NOT NULL,
    expires_at     TEXT,
    payment_ref    TEXT,
    created_at     TEXT NOT NULL,
    confirmed_at   TEXT
);

-- At most one live purchase attempt per (user, course).
CREATE UNIQUE INDEX IF NOT EXISTS user_courses_one_pending
    ON user_courses(user_id, course_id) WHERE payment_status = 'pending';

-- Self-service tier upgrades. Same lifecycle as user_courses.
CREATE TABLE IF NOT EXISTS tier_upgrades (
    upgrade_id     TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    from_tier      TEXT NOT NULL,
    target_tier    TEXT NOT NULL,
    price          INTEGER NOT NULL,
    payment_status TEXT NOT NULL
                   CHECK (payment_status IN ('pending', 'completed', 'failed')),
    payment_ref    TEXT,
    created_at     TEXT NOT NULL,
    confirmed_at   TEXT
);

-- At most one live upgrade attempt per user.
CREATE UNIQUE INDEX IF NOT EXISTS tier_upgrades_one_pending
    ON tier_upgrades(user_id) WHERE payment_status = 'pending';

CREATE TABLE IF NOT EXISTS user_progress (
    user_id             TEXT NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    module_id           TEXT NOT NULL REFERENCES course_modules(module_id) ON DELETE CASCADE,
    completed           INTEGER NOT NULL DEFAULT 0,
    progress_percentage INTEGER NOT NULL DEFAULT 0
                        CHECK (progress_percentage BETWEEN 0 AND 100),
    completed_at        TEXT,
    last_accessed       TEXT,
    PRIMARY KEY (user_id, module_id),
    CHECK (completed = 0 OR progress_percentage = 100)
);

-- Append-only.
CREATE TABLE IF NOT EXISTS user_activity (
    activity_id   TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    activity_type TEXT NOT NULL,
    course_id     TEXT,
    module_id     TEXT,
    metadata      TEXT NOT NULL DEFAULT '{}',
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS modules_course_idx      ON course_modules(course_id, position);
CREATE INDEX IF NOT EXISTS downloads_course_idx    ON course_downloads(course_id);
CREATE INDEX IF NOT EXISTS user_courses_user_idx   ON user_courses(user_id, course_id);
CREATE INDEX IF NOT EXISTS activity_user_idx       ON user_activity(user_id, created_at);

PRAGMA user_version = 2;
";
