use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, ads)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Timestamps are RFC 3339 UTC with fixed precision so they
            -- compare correctly as text.
            CREATE TABLE ads (
                id                  TEXT PRIMARY KEY,
                owner_id            TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title               TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                price               REAL,
                category            TEXT,
                image_urls          TEXT NOT NULL DEFAULT '[]',
                animation_url       TEXT,
                created_at          TEXT NOT NULL,
                is_topped           INTEGER NOT NULL DEFAULT 0,
                topped_expires_at   TEXT
            );

            CREATE INDEX idx_ads_owner ON ads(owner_id, created_at);
            CREATE INDEX idx_ads_category ON ads(category);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (payments, processed events)");
        conn.execute_batch(
            "
            CREATE TABLE payments (
                id          TEXT PRIMARY KEY,
                ad_id       TEXT NOT NULL REFERENCES ads(id) ON DELETE CASCADE,
                price_id    TEXT NOT NULL,
                amount      INTEGER NOT NULL,
                currency    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_payments_ad ON payments(ad_id);

            CREATE TABLE processed_events (
                id          TEXT PRIMARY KEY,
                event_type  TEXT NOT NULL,
                received_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
