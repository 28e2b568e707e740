//! `SQLite` schema for the run history.

/// One row per pipeline run.
pub const CREATE_RUNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    start_year INTEGER NOT NULL,
    end_year INTEGER NOT NULL,
    stages TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT
)
";

/// Recent runs are listed newest first.
pub const CREATE_RUNS_STARTED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at DESC)
";

/// Files written by a run.
pub const CREATE_RUN_OUTPUTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS run_outputs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    table_name TEXT NOT NULL,
    path TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    checksum TEXT NOT NULL
)
";

/// Outputs are always fetched by run.
pub const CREATE_RUN_OUTPUTS_RUN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_run_outputs_run ON run_outputs(run_id)
";

/// Key-value metadata, including the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_RUNS_TABLE,
    CREATE_RUNS_STARTED_INDEX,
    CREATE_RUN_OUTPUTS_TABLE,
    CREATE_RUN_OUTPUTS_RUN_INDEX,
    CREATE_METADATA_TABLE,
];
