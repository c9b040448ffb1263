//! ContractStore: dual-write to JSONL (source of truth) + SQLite (query layer).
//!
//! Every write appends the record's canonical serialized form to the
//! kind's append-only log, then inserts a denormalized row into the
//! index. The ordering is the durability contract: the log never rolls
//! back a partial append, and the index is always re-derivable from the
//! logs via [`ContractStore::rebuild`]. Index rows carry the only
//! mutable state (`status` / `consumed_by`); the `raw_json` column is
//! frozen at write time and is never authoritative for status.
//!
//! The connection is opened lazily and re-opened after `close()` —
//! operations after `close()` transparently reconnect and re-ensure the
//! schema. One store instance assumes one caller at a time; processes
//! sharing a data directory must serialize writers themselves.

use crate::contracts::outcome::OutcomeRecord;
use crate::contracts::patch::PersonaUpgradePatch;
use crate::contracts::recommendation::ImprovementRecommendation;
use crate::contracts::signal::ResearchSignal;
use crate::core::db;
use crate::core::error::ContrailError;
use crate::core::schemas;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Filters for [`ContractStore::query_outcomes`]. `None` fields are not
/// applied; set fields AND together.
#[derive(Debug, Default, Clone)]
pub struct OutcomeFilter {
    pub outcome: Option<String>,
    pub idea_id: Option<i64>,
}

#[derive(Debug, Default, Clone)]
pub struct RecommendationFilter {
    pub target_system: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct PatchFilter {
    pub persona_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct SignalFilter {
    pub source: Option<String>,
    pub relevance: Option<String>,
    pub domain: Option<String>,
    /// `Some(true)` = consumed_by set, `Some(false)` = still unconsumed.
    pub consumed: Option<bool>,
}

/// Per-kind row counts reported by [`ContractStore::rebuild`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    pub outcome_records: usize,
    pub recommendations: usize,
    pub patches: usize,
    pub signals: usize,
}

pub struct ContractStore {
    data_dir: PathBuf,
    db_path: PathBuf,
    conn: Option<Connection>,
}

impl ContractStore {
    /// Open a store rooted at `data_dir`. The index database lives at
    /// `data_dir/persona_metrics.db`; nothing is touched on disk until
    /// the first operation.
    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let db_path = data_dir.join(schemas::CONTRACTS_DB_NAME);
        ContractStore {
            data_dir,
            db_path,
            conn: None,
        }
    }

    /// Open with an explicit index path (tests point this at a temp file).
    pub fn open_with_db_path(data_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        ContractStore {
            data_dir: data_dir.into(),
            db_path: db_path.into(),
            conn: None,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Create the data directory and bootstrap the index schema without
    /// writing anything else. Equivalent to the lazy first-use path.
    pub fn init(&mut self) -> Result<(), ContrailError> {
        self.ensure_conn()
    }

    /// Release the index connection. Safe to call repeatedly; the next
    /// operation reopens lazily and re-ensures the schema.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.close();
        }
    }

    fn conn(&mut self) -> Result<&Connection, ContrailError> {
        self.ensure_conn()?;
        match self.conn.as_ref() {
            Some(conn) => Ok(conn),
            None => Err(ContrailError::PathError(
                "index connection unavailable".to_string(),
            )),
        }
    }

    fn conn_mut(&mut self) -> Result<&mut Connection, ContrailError> {
        self.ensure_conn()?;
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(ContrailError::PathError(
                "index connection unavailable".to_string(),
            )),
        }
    }

    fn ensure_conn(&mut self) -> Result<(), ContrailError> {
        if self.conn.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.data_dir).map_err(ContrailError::IoError)?;
        let conn = db::db_connect(&self.db_path.to_string_lossy())?;
        ensure_tables(&conn)?;
        self.conn = Some(conn);
        Ok(())
    }

    fn log_path(&self, log_name: &str) -> PathBuf {
        self.data_dir.join(log_name)
    }

    /// Append one canonical JSON line to the kind's log. An I/O failure
    /// here aborts the whole write before the index is touched — a lost
    /// append would be permanent, undetectable data loss.
    fn append_log<T: Serialize>(&self, log_name: &str, record: &T) -> Result<(), ContrailError> {
        fs::create_dir_all(&self.data_dir).map_err(ContrailError::IoError)?;
        let path = self.log_path(log_name);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(ContrailError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(record)?).map_err(ContrailError::IoError)?;
        Ok(())
    }

    /// Replay a log file, returning the last `limit` records in append
    /// order. A missing file is an empty store, not an error. A line
    /// that fails to parse is a loud error: the log is the source of
    /// truth and a silent skip would mask data loss.
    fn read_log<T: DeserializeOwned>(
        &self,
        log_name: &str,
        limit: usize,
    ) -> Result<Vec<T>, ContrailError> {
        let path = self.log_path(log_name);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let f = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(ContrailError::IoError)?;
        let reader = BufReader::new(f);
        let mut records: Vec<T> = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(ContrailError::IoError)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(line).map_err(|e| {
                ContrailError::ValidationError(format!(
                    "Invalid JSONL record in {}: {}",
                    log_name, e
                ))
            })?;
            records.push(record);
        }
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }

    // --- OutcomeRecord ---

    /// Write an OutcomeRecord to the log and the index. Every write adds
    /// a fresh index row: `idea_id` is not unique.
    pub fn write_outcome(&mut self, record: &OutcomeRecord) -> Result<(), ContrailError> {
        record.validate()?;
        self.append_log(schemas::OUTCOME_LOG_NAME, record)?;
        let conn = self.conn()?;
        insert_outcome_row(conn, record)
    }

    /// Read OutcomeRecords from the log (source of truth), last `limit`
    /// entries in append order.
    pub fn read_outcomes(&self, limit: usize) -> Result<Vec<OutcomeRecord>, ContrailError> {
        self.read_log(schemas::OUTCOME_LOG_NAME, limit)
    }

    /// Query OutcomeRecords from the index, newest emission first.
    /// Outcomes carry no mutable field, so no overlay happens here.
    pub fn query_outcomes(
        &mut self,
        filter: &OutcomeFilter,
        limit: usize,
    ) -> Result<Vec<OutcomeRecord>, ContrailError> {
        let conn = self.conn()?;
        let mut sql = String::from("SELECT raw_json FROM outcome_records");
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(outcome) = &filter.outcome {
            conditions.push("outcome = ?");
            binds.push(Box::new(outcome.clone()));
        }
        if let Some(idea_id) = filter.idea_id {
            conditions.push("idea_id = ?");
            binds.push(Box::new(idea_id));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY emitted_at DESC LIMIT ?");
        binds.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            let record: OutcomeRecord = serde_json::from_str(&raw?)?;
            out.push(record);
        }
        Ok(out)
    }

    // --- ImprovementRecommendation ---

    /// Write an ImprovementRecommendation. Re-emitting the same
    /// `recommendation_id` appends a new log line and replaces the index
    /// row (last write wins), which makes producer retries idempotent at
    /// the query layer.
    pub fn write_recommendation(
        &mut self,
        rec: &ImprovementRecommendation,
    ) -> Result<(), ContrailError> {
        rec.validate()?;
        self.append_log(schemas::RECOMMENDATION_LOG_NAME, rec)?;
        let conn = self.conn()?;
        insert_recommendation_row(conn, rec)
    }

    pub fn read_recommendations(
        &self,
        limit: usize,
    ) -> Result<Vec<ImprovementRecommendation>, ContrailError> {
        self.read_log(schemas::RECOMMENDATION_LOG_NAME, limit)
    }

    /// Query recommendations, overlaying the index's current `status`
    /// onto each deserialized record. This is the only place current
    /// status is visible; the embedded payload keeps its write-time
    /// value.
    pub fn query_recommendations(
        &mut self,
        filter: &RecommendationFilter,
        limit: usize,
    ) -> Result<Vec<ImprovementRecommendation>, ContrailError> {
        let conn = self.conn()?;
        let mut sql =
            String::from("SELECT status, raw_json FROM improvement_recommendations");
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(target_system) = &filter.target_system {
            conditions.push("target_system = ?");
            binds.push(Box::new(target_system.clone()));
        }
        if let Some(status) = &filter.status {
            conditions.push("status = ?");
            binds.push(Box::new(status.clone()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY emitted_at DESC LIMIT ?");
        binds.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (status, raw) = row?;
            let mut rec: ImprovementRecommendation = serde_json::from_str(&raw)?;
            rec.status = status;
            out.push(rec);
        }
        Ok(out)
    }

    /// Update a recommendation's status on the index row in place. Does
    /// not touch the log, does not constrain the transition (any string
    /// is accepted), and is a silent no-op for an unknown id.
    pub fn update_recommendation_status(
        &mut self,
        recommendation_id: &str,
        status: &str,
    ) -> Result<(), ContrailError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE improvement_recommendations SET status = ?1 WHERE recommendation_id = ?2",
            params![status, recommendation_id],
        )?;
        Ok(())
    }

    // --- PersonaUpgradePatch ---

    pub fn write_patch(&mut self, patch: &PersonaUpgradePatch) -> Result<(), ContrailError> {
        patch.validate()?;
        self.append_log(schemas::PATCH_LOG_NAME, patch)?;
        let conn = self.conn()?;
        insert_patch_row(conn, patch)
    }

    pub fn read_patches(&self, limit: usize) -> Result<Vec<PersonaUpgradePatch>, ContrailError> {
        self.read_log(schemas::PATCH_LOG_NAME, limit)
    }

    /// Query patches with the index's current `status` overlaid.
    pub fn query_patches(
        &mut self,
        filter: &PatchFilter,
        limit: usize,
    ) -> Result<Vec<PersonaUpgradePatch>, ContrailError> {
        let conn = self.conn()?;
        let mut sql = String::from("SELECT status, raw_json FROM persona_patches");
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(persona_id) = &filter.persona_id {
            conditions.push("persona_id = ?");
            binds.push(Box::new(persona_id.clone()));
        }
        if let Some(status) = &filter.status {
            conditions.push("status = ?");
            binds.push(Box::new(status.clone()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY emitted_at DESC LIMIT ?");
        binds.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (status, raw) = row?;
            let mut patch: PersonaUpgradePatch = serde_json::from_str(&raw)?;
            patch.status = status;
            out.push(patch);
        }
        Ok(out)
    }

    /// Update a patch's status on the index row in place. Same contract
    /// as [`ContractStore::update_recommendation_status`].
    pub fn update_patch_status(
        &mut self,
        patch_id: &str,
        status: &str,
    ) -> Result<(), ContrailError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE persona_patches SET status = ?1 WHERE patch_id = ?2",
            params![status, patch_id],
        )?;
        Ok(())
    }

    // --- ResearchSignal ---

    pub fn write_signal(&mut self, signal: &ResearchSignal) -> Result<(), ContrailError> {
        signal.validate()?;
        self.append_log(schemas::SIGNAL_LOG_NAME, signal)?;
        let conn = self.conn()?;
        insert_signal_row(conn, signal)
    }

    pub fn read_signals(&self, limit: usize) -> Result<Vec<ResearchSignal>, ContrailError> {
        self.read_log(schemas::SIGNAL_LOG_NAME, limit)
    }

    /// Query signals with the index's current `consumed_by` overlaid.
    /// `filter.consumed` maps to a NULL / NOT NULL predicate on the
    /// index column.
    pub fn query_signals(
        &mut self,
        filter: &SignalFilter,
        limit: usize,
    ) -> Result<Vec<ResearchSignal>, ContrailError> {
        let conn = self.conn()?;
        let mut sql = String::from("SELECT consumed_by, raw_json FROM research_signals");
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(source) = &filter.source {
            conditions.push("source = ?");
            binds.push(Box::new(source.clone()));
        }
        if let Some(relevance) = &filter.relevance {
            conditions.push("relevance = ?");
            binds.push(Box::new(relevance.clone()));
        }
        if let Some(domain) = &filter.domain {
            conditions.push("domain = ?");
            binds.push(Box::new(domain.clone()));
        }
        match filter.consumed {
            Some(true) => conditions.push("consumed_by IS NOT NULL"),
            Some(false) => conditions.push("consumed_by IS NULL"),
            None => {}
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY emitted_at DESC LIMIT ?");
        binds.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (consumed_by, raw) = row?;
            let mut signal: ResearchSignal = serde_json::from_str(&raw)?;
            signal.consumed_by = consumed_by;
            out.push(signal);
        }
        Ok(out)
    }

    /// Record the latest consumer of a signal on the index row. The log
    /// is untouched; re-consuming simply overwrites the name.
    pub fn update_signal_consumed_by(
        &mut self,
        signal_id: &str,
        consumer: &str,
    ) -> Result<(), ContrailError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE research_signals SET consumed_by = ?1 WHERE signal_id = ?2",
            params![consumer, signal_id],
        )?;
        Ok(())
    }

    // --- Rebuild ---

    /// Rebuild the index from the logs. Drops every index row inside one
    /// transaction and replays each log end-to-end, inserting rows with
    /// write-time values. Never appends to any log.
    ///
    /// Mutable fields reset to each record's write-time value: status
    /// transitions applied only to the index (and never re-emitted as
    /// new log entries) are deliberately forgotten. The logs are the
    /// sole source of truth. Callers must not hold concurrent readers on
    /// this store while rebuild runs.
    pub fn rebuild(&mut self) -> Result<RebuildReport, ContrailError> {
        let outcomes: Vec<OutcomeRecord> = self.read_log(schemas::OUTCOME_LOG_NAME, usize::MAX)?;
        let recommendations: Vec<ImprovementRecommendation> =
            self.read_log(schemas::RECOMMENDATION_LOG_NAME, usize::MAX)?;
        let patches: Vec<PersonaUpgradePatch> = self.read_log(schemas::PATCH_LOG_NAME, usize::MAX)?;
        let signals: Vec<ResearchSignal> = self.read_log(schemas::SIGNAL_LOG_NAME, usize::MAX)?;

        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM outcome_records", [])?;
        tx.execute("DELETE FROM improvement_recommendations", [])?;
        tx.execute("DELETE FROM persona_patches", [])?;
        tx.execute("DELETE FROM research_signals", [])?;
        for record in &outcomes {
            insert_outcome_row(&tx, record)?;
        }
        for rec in &recommendations {
            insert_recommendation_row(&tx, rec)?;
        }
        for patch in &patches {
            insert_patch_row(&tx, patch)?;
        }
        for signal in &signals {
            insert_signal_row(&tx, signal)?;
        }
        tx.commit()?;

        Ok(RebuildReport {
            outcome_records: outcomes.len(),
            recommendations: recommendations.len(),
            patches: patches.len(),
            signals: signals.len(),
        })
    }
}

fn ensure_tables(conn: &Connection) -> Result<(), ContrailError> {
    conn.execute(schemas::OUTCOME_RECORDS_SCHEMA, [])?;
    conn.execute(schemas::IMPROVEMENT_RECOMMENDATIONS_SCHEMA, [])?;
    conn.execute(schemas::PERSONA_PATCHES_SCHEMA, [])?;
    conn.execute(schemas::RESEARCH_SIGNALS_SCHEMA, [])?;
    conn.execute(schemas::OUTCOME_RECORDS_INDEX_IDEA, [])?;
    conn.execute(schemas::RECOMMENDATIONS_INDEX_STATUS, [])?;
    conn.execute(schemas::PATCHES_INDEX_STATUS, [])?;
    conn.execute(schemas::SIGNALS_INDEX_SOURCE, [])?;
    Ok(())
}

fn insert_outcome_row(conn: &Connection, record: &OutcomeRecord) -> Result<(), ContrailError> {
    conn.execute(
        "INSERT INTO outcome_records
         (idea_id, idea_title, outcome, overall_score, recommendation,
          capabilities_fit, build_outcome, artifact_count, tech_stack,
          total_duration_seconds, tags, github_url, emitted_at, raw_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.idea_id,
            record.idea_title,
            record.outcome.as_str(),
            record.overall_score,
            record.recommendation,
            record.capabilities_fit,
            record.build_outcome,
            record.artifact_count,
            serde_json::to_string(&record.tech_stack)?,
            record.total_duration_seconds,
            serde_json::to_string(&record.tags)?,
            record.github_url,
            record.emitted_at.to_rfc3339(),
            serde_json::to_string(record)?,
        ],
    )?;
    Ok(())
}

fn insert_recommendation_row(
    conn: &Connection,
    rec: &ImprovementRecommendation,
) -> Result<(), ContrailError> {
    conn.execute(
        "INSERT OR REPLACE INTO improvement_recommendations
         (recommendation_id, session_id, recommendation_type, target_system,
          title, priority, scope, status, emitted_at, raw_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            rec.recommendation_id,
            rec.session_id,
            rec.recommendation_type.as_str(),
            rec.target_system,
            rec.title,
            rec.priority,
            rec.scope.as_str(),
            rec.status,
            rec.emitted_at.to_rfc3339(),
            serde_json::to_string(rec)?,
        ],
    )?;
    Ok(())
}

fn insert_patch_row(conn: &Connection, patch: &PersonaUpgradePatch) -> Result<(), ContrailError> {
    conn.execute(
        "INSERT OR REPLACE INTO persona_patches
         (patch_id, persona_id, rationale, from_version, to_version,
          schema_valid, status, emitted_at, raw_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            patch.patch_id,
            patch.persona_id,
            patch.rationale,
            patch.from_version,
            patch.to_version,
            patch.schema_valid as i64,
            patch.status,
            patch.emitted_at.to_rfc3339(),
            serde_json::to_string(patch)?,
        ],
    )?;
    Ok(())
}

fn insert_signal_row(conn: &Connection, signal: &ResearchSignal) -> Result<(), ContrailError> {
    conn.execute(
        "INSERT OR REPLACE INTO research_signals
         (signal_id, source, title, relevance, domain, consumed_by,
          emitted_at, raw_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            signal.signal_id,
            signal.source.as_str(),
            signal.title,
            signal.relevance.as_str(),
            signal.domain,
            signal.consumed_by,
            signal.emitted_at.to_rfc3339(),
            serde_json::to_string(signal)?,
        ],
    )?;
    Ok(())
}
