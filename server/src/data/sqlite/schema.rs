//! SQLite schema definitions
//!
//! Timestamps are stored as INTEGER microseconds since the Unix epoch.
//! Singleton record tables carry `UNIQUE(event_id)`.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);

-- =============================================================================
-- 1. Events
-- =============================================================================
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    level TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    channel TEXT NOT NULL,
    direction TEXT,
    session_id TEXT,
    relationship_id TEXT,
    data TEXT NOT NULL,
    duration_ms REAL,
    caller_file TEXT,
    caller_line INTEGER,
    caller_function TEXT,
    processed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_events_processed ON events(processed, id);
CREATE INDEX IF NOT EXISTS idx_events_agent ON events(agent_id);

-- =============================================================================
-- 2. Agents and sessions
-- =============================================================================
CREATE TABLE IF NOT EXISTS agents (
    agent_id TEXT PRIMARY KEY,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    llm_provider TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    total_events INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent_id, start_time);

-- =============================================================================
-- 3. Singleton records (one per event)
-- =============================================================================
CREATE TABLE IF NOT EXISTS model_details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL UNIQUE REFERENCES events(id) ON DELETE CASCADE,
    model_name TEXT,
    model_provider TEXT,
    model_type TEXT,
    model_version TEXT,
    temperature REAL,
    max_tokens INTEGER,
    top_p REAL
);

CREATE TABLE IF NOT EXISTS token_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL UNIQUE REFERENCES events(id) ON DELETE CASCADE,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    total_tokens INTEGER NOT NULL,
    cache_read_tokens INTEGER,
    cache_creation_tokens INTEGER,
    model TEXT
);

CREATE TABLE IF NOT EXISTS framework_details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL UNIQUE REFERENCES events(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    component_name TEXT,
    component_type TEXT,
    components TEXT
);

-- =============================================================================
-- 4. Multi-valued records
-- =============================================================================
CREATE TABLE IF NOT EXISTS security_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    alert_type TEXT NOT NULL,
    severity TEXT NOT NULL CHECK(severity IN ('low', 'medium', 'high')),
    description TEXT NOT NULL,
    field_path TEXT,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS performance_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    duration_ms REAL NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS content_analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    content_type TEXT NOT NULL,
    content_text TEXT NOT NULL,
    word_count INTEGER NOT NULL,
    sentiment_score REAL,
    toxicity_score REAL
);

CREATE INDEX IF NOT EXISTS idx_security_alerts_event ON security_alerts(event_id);
CREATE INDEX IF NOT EXISTS idx_performance_metrics_event ON performance_metrics(event_id);
CREATE INDEX IF NOT EXISTS idx_content_analyses_event ON content_analyses(event_id);
"#;
