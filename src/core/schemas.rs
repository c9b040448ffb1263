//! Centralized schema definitions for the contract index database.
//!
//! One SQLite file (`persona_metrics.db`) holds one table per contract
//! kind. Each table carries an autoincrementing surrogate key, the
//! business identity column, denormalized scalar columns for the fields
//! the dashboard filters on, the mutable status column where the kind
//! has one, and `raw_json` — the record exactly as it was serialized at
//! write time. The JSONL logs next to the database are the source of
//! truth; every table here is disposable and re-derivable.

pub const CONTRACTS_DB_NAME: &str = "persona_metrics.db";

pub const OUTCOME_LOG_NAME: &str = "outcome_records.jsonl";
pub const RECOMMENDATION_LOG_NAME: &str = "improvement_recommendations.jsonl";
pub const PATCH_LOG_NAME: &str = "persona_patches.jsonl";
pub const SIGNAL_LOG_NAME: &str = "research_signals.jsonl";

// idea_id is intentionally NOT unique: an idea can re-enter the pipeline
// and reach a terminal state more than once.
pub const OUTCOME_RECORDS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS outcome_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        idea_id INTEGER NOT NULL,
        idea_title TEXT NOT NULL,
        outcome TEXT NOT NULL,
        overall_score REAL,
        recommendation TEXT,
        capabilities_fit TEXT,
        build_outcome TEXT,
        artifact_count INTEGER DEFAULT 0,
        tech_stack TEXT DEFAULT '[]',
        total_duration_seconds REAL DEFAULT 0,
        tags TEXT DEFAULT '[]',
        github_url TEXT,
        emitted_at TEXT NOT NULL,
        raw_json TEXT NOT NULL
    )
";

pub const IMPROVEMENT_RECOMMENDATIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS improvement_recommendations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recommendation_id TEXT NOT NULL UNIQUE,
        session_id TEXT,
        recommendation_type TEXT NOT NULL,
        target_system TEXT DEFAULT 'persona',
        title TEXT NOT NULL,
        priority TEXT DEFAULT 'medium',
        scope TEXT,
        status TEXT DEFAULT 'pending',
        emitted_at TEXT NOT NULL,
        raw_json TEXT NOT NULL
    )
";

pub const PERSONA_PATCHES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS persona_patches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patch_id TEXT NOT NULL UNIQUE,
        persona_id TEXT NOT NULL,
        rationale TEXT,
        from_version TEXT,
        to_version TEXT,
        schema_valid INTEGER DEFAULT 1,
        status TEXT DEFAULT 'proposed',
        emitted_at TEXT NOT NULL,
        raw_json TEXT NOT NULL
    )
";

pub const RESEARCH_SIGNALS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS research_signals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        signal_id TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL,
        title TEXT NOT NULL,
        relevance TEXT NOT NULL,
        domain TEXT,
        consumed_by TEXT,
        emitted_at TEXT NOT NULL,
        raw_json TEXT NOT NULL
    )
";

pub const OUTCOME_RECORDS_INDEX_IDEA: &str =
    "CREATE INDEX IF NOT EXISTS idx_outcome_records_idea ON outcome_records(idea_id)";
pub const RECOMMENDATIONS_INDEX_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_recommendations_status ON improvement_recommendations(status)";
pub const PATCHES_INDEX_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_patches_status ON persona_patches(status)";
pub const SIGNALS_INDEX_SOURCE: &str =
    "CREATE INDEX IF NOT EXISTS idx_signals_source ON research_signals(source)";
