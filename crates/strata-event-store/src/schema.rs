//! Event store database schema.

use sqlx::migrate::Migrator;

/// Embedded migrations from the workspace `migrations/` directory.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// SQL to create the event log and stream membership tables. Idempotent; the
/// same DDL as the first migration, for callers that do not run migrations.
pub const CREATE_EVENT_STORE: &str = r"
CREATE TABLE IF NOT EXISTS events (
    position    BIGSERIAL PRIMARY KEY,
    event_id    UUID NOT NULL UNIQUE,
    event_type  TEXT NOT NULL,
    data        JSONB NOT NULL,
    metadata    JSONB NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_events_event_type_position
    ON events (event_type, position);

CREATE TABLE IF NOT EXISTS stream_events (
    stream_name TEXT NOT NULL,
    position    BIGINT NOT NULL,
    event_id    UUID NOT NULL REFERENCES events (event_id),
    PRIMARY KEY (stream_name, position),
    UNIQUE (stream_name, event_id)
);

CREATE INDEX IF NOT EXISTS idx_stream_events_event_id
    ON stream_events (event_id);
";
