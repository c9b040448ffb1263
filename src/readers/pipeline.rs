//! Read-only reader over the idea pipeline's `caught_ideas.db`.
//!
//! That database belongs to a different subsystem and evolves
//! independently: the pipeline columns (`stage`, `evaluation_result`,
//! review fields) are added by its own schema migration the first time
//! that service runs, so they may not exist yet. The reader probes for
//! them once, caches the answer for its lifetime, and falls back to the
//! reduced column set when they are absent. It never writes.

use crate::core::db;
use crate::core::error::ContrailError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct IdeaSummary {
    pub id: i64,
    pub title: String,
    pub stage: String,
    pub status: String,
    pub overall_score: Option<f64>,
    pub recommendation: Option<String>,
    pub caught_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdeaDetail {
    pub id: i64,
    pub title: String,
    pub stage: String,
    pub status: String,
    pub overall_score: Option<f64>,
    pub recommendation: Option<String>,
    pub caught_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub raw_content: Option<String>,
    pub source_context: Option<String>,
    pub enrichment_result: Option<JsonValue>,
    pub evaluation_result: Option<JsonValue>,
    pub scaffolding_result: Option<JsonValue>,
    pub build_result: Option<JsonValue>,
    pub review_decision: Option<String>,
    pub review_notes: Option<String>,
    pub github_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct PipelineReader {
    db_path: PathBuf,
    has_pipeline_columns: Cell<Option<bool>>,
}

impl PipelineReader {
    pub fn open(db_path: impl Into<PathBuf>) -> Self {
        PipelineReader {
            db_path: db_path.into(),
            has_pipeline_columns: Cell::new(None),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Whether the database file exists and is a regular file.
    pub fn available(&self) -> bool {
        self.db_path.is_file()
    }

    fn connect(&self) -> Result<Connection, ContrailError> {
        db::db_connect(&self.db_path.to_string_lossy())
    }

    /// Probe for the pipeline columns once, then answer from cache for
    /// the lifetime of this reader.
    fn check_pipeline_columns(&self, conn: &Connection) -> Result<bool, ContrailError> {
        if let Some(cached) = self.has_pipeline_columns.get() {
            return Ok(cached);
        }
        let mut stmt = conn.prepare("PRAGMA table_info(caught_ideas)")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut has_stage = false;
        for name in names {
            if name? == "stage" {
                has_stage = true;
                break;
            }
        }
        self.has_pipeline_columns.set(Some(has_stage));
        Ok(has_stage)
    }

    pub fn list_ideas(
        &self,
        stage: Option<&str>,
        status: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IdeaSummary>, ContrailError> {
        if !self.available() {
            return Ok(Vec::new());
        }
        let conn = self.connect()?;
        let has_pipeline = self.check_pipeline_columns(&conn)?;

        let mut sql = if has_pipeline {
            String::from(
                "SELECT id, title, stage, status, caught_at, tags, evaluation_result FROM caught_ideas",
            )
        } else {
            String::from("SELECT id, title, status, caught_at, tags FROM caught_ideas")
        };

        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        // A stage filter is meaningless against the reduced schema; the
        // original reader drops it rather than erroring, and so do we.
        if let Some(stage) = stage {
            if has_pipeline {
                conditions.push("stage = ?");
                binds.push(Box::new(stage.to_string()));
            }
        }
        if let Some(status) = status {
            conditions.push("status = ?");
            binds.push(Box::new(status.to_string()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY caught_at DESC LIMIT ?");
        binds.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), |row| {
            if has_pipeline {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            } else {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    None,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    None,
                ))
            }
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, title, stage, status, caught_at, tags, eval_raw) = row?;
            let eval = parse_json_opt(eval_raw.as_deref());
            results.push(IdeaSummary {
                id,
                title,
                stage: stage.filter(|s| !s.is_empty()).unwrap_or_else(|| "captured".to_string()),
                status: status.filter(|s| !s.is_empty()).unwrap_or_else(|| "pending".to_string()),
                overall_score: extract_score(eval.as_ref()),
                recommendation: extract_recommendation(eval.as_ref()),
                caught_at: parse_datetime_opt(caught_at.as_deref()),
                tags: parse_tags(tags.as_deref()),
            });
        }
        Ok(results)
    }

    pub fn get_idea(&self, idea_id: i64) -> Result<Option<IdeaDetail>, ContrailError> {
        if !self.available() {
            return Ok(None);
        }
        let conn = self.connect()?;
        let has_pipeline = self.check_pipeline_columns(&conn)?;

        let sql = if has_pipeline {
            "SELECT id, title, stage, status, caught_at, tags, raw_content, source_context,
                    enrichment_result, evaluation_result, scaffolding_result, build_result,
                    review_decision, review_notes, github_url, completed_at
             FROM caught_ideas WHERE id = ?1"
        } else {
            "SELECT id, title, status, caught_at, tags, raw_content, source_context
             FROM caught_ideas WHERE id = ?1"
        };

        let row = conn
            .query_row(sql, params![idea_id], |row| {
                if has_pipeline {
                    Ok(RawIdeaRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        stage: row.get(2)?,
                        status: row.get(3)?,
                        caught_at: row.get(4)?,
                        tags: row.get(5)?,
                        raw_content: row.get(6)?,
                        source_context: row.get(7)?,
                        enrichment_result: row.get(8)?,
                        evaluation_result: row.get(9)?,
                        scaffolding_result: row.get(10)?,
                        build_result: row.get(11)?,
                        review_decision: row.get(12)?,
                        review_notes: row.get(13)?,
                        github_url: row.get(14)?,
                        completed_at: row.get(15)?,
                    })
                } else {
                    Ok(RawIdeaRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        stage: None,
                        status: row.get(2)?,
                        caught_at: row.get(3)?,
                        tags: row.get(4)?,
                        raw_content: row.get(5)?,
                        source_context: row.get(6)?,
                        enrichment_result: None,
                        evaluation_result: None,
                        scaffolding_result: None,
                        build_result: None,
                        review_decision: None,
                        review_notes: None,
                        github_url: None,
                        completed_at: None,
                    })
                }
            })
            .optional()?;

        let Some(raw) = row else {
            return Ok(None);
        };
        let eval = parse_json_opt(raw.evaluation_result.as_deref());
        Ok(Some(IdeaDetail {
            id: raw.id,
            title: raw.title,
            stage: raw
                .stage
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "captured".to_string()),
            status: raw
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "pending".to_string()),
            overall_score: extract_score(eval.as_ref()),
            recommendation: extract_recommendation(eval.as_ref()),
            caught_at: parse_datetime_opt(raw.caught_at.as_deref()),
            tags: parse_tags(raw.tags.as_deref()),
            raw_content: raw.raw_content,
            source_context: raw.source_context,
            enrichment_result: parse_json_opt(raw.enrichment_result.as_deref()),
            evaluation_result: eval,
            scaffolding_result: parse_json_opt(raw.scaffolding_result.as_deref()),
            build_result: parse_json_opt(raw.build_result.as_deref()),
            review_decision: raw.review_decision,
            review_notes: raw.review_notes,
            github_url: raw.github_url,
            completed_at: parse_datetime_opt(raw.completed_at.as_deref()),
        }))
    }

    /// Count ideas grouped by stage. Without the pipeline columns every
    /// idea is still in the implicit first stage.
    pub fn count_by_stage(&self) -> Result<BTreeMap<String, i64>, ContrailError> {
        if !self.available() {
            return Ok(BTreeMap::new());
        }
        let conn = self.connect()?;
        let has_pipeline = self.check_pipeline_columns(&conn)?;
        let mut counts = BTreeMap::new();
        if !has_pipeline {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM caught_ideas", [], |row| {
                row.get(0)
            })?;
            counts.insert("captured".to_string(), total);
            return Ok(counts);
        }
        let mut stmt = conn.prepare(
            "SELECT COALESCE(stage, 'captured') AS stage, COUNT(*) AS cnt
             FROM caught_ideas GROUP BY stage",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (stage, cnt) = row?;
            counts.insert(stage, cnt);
        }
        Ok(counts)
    }
}

struct RawIdeaRow {
    id: i64,
    title: String,
    stage: Option<String>,
    status: Option<String>,
    caught_at: Option<String>,
    tags: Option<String>,
    raw_content: Option<String>,
    source_context: Option<String>,
    enrichment_result: Option<String>,
    evaluation_result: Option<String>,
    scaffolding_result: Option<String>,
    build_result: Option<String>,
    review_decision: Option<String>,
    review_notes: Option<String>,
    github_url: Option<String>,
    completed_at: Option<String>,
}

// Free-form JSON columns parse best-effort: garbage degrades to absent.

fn parse_tags(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn parse_json_opt(raw: Option<&str>) -> Option<JsonValue> {
    match raw {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw).ok(),
        _ => None,
    }
}

fn parse_datetime_opt(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn extract_score(eval: Option<&JsonValue>) -> Option<f64> {
    eval?.get("scores")?.get("overall_score")?.as_f64()
}

fn extract_recommendation(eval: Option<&JsonValue>) -> Option<String> {
    Some(eval?.get("recommendation")?.as_str()?.to_string())
}
