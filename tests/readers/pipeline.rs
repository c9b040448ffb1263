use contrail::readers::PipelineReader;
use rusqlite::{params, Connection};
use std::path::Path;
use tempfile::tempdir;

// The reduced shape: what the pipeline database looks like before its
// own service has run the migration that adds the stage columns.
fn create_reduced_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "CREATE TABLE caught_ideas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            raw_content TEXT,
            tags TEXT,
            source_context TEXT,
            caught_at TEXT,
            status TEXT
        )",
        [],
    )
    .unwrap();
}

fn create_extended_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "CREATE TABLE caught_ideas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            raw_content TEXT,
            tags TEXT,
            source_context TEXT,
            caught_at TEXT,
            status TEXT,
            stage TEXT,
            enrichment_result TEXT,
            evaluation_result TEXT,
            scaffolding_result TEXT,
            build_result TEXT,
            review_decision TEXT,
            review_notes TEXT,
            github_url TEXT,
            completed_at TEXT
        )",
        [],
    )
    .unwrap();
}

fn insert_reduced(path: &Path, title: &str, status: &str, tags: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO caught_ideas (title, raw_content, tags, caught_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![title, "raw", tags, "2026-03-01 12:00:00", status],
    )
    .unwrap();
}

fn insert_extended(path: &Path, title: &str, stage: &str, eval: Option<&str>) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO caught_ideas
         (title, raw_content, tags, caught_at, status, stage, evaluation_result, github_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            title,
            "raw",
            "[\"cli\"]",
            "2026-03-01T12:00:00+00:00",
            "active",
            stage,
            eval,
            "https://github.com/user/repo"
        ],
    )
    .unwrap();
}

#[test]
fn test_missing_db_is_empty_not_an_error() {
    let tmp = tempdir().unwrap();
    let reader = PipelineReader::open(tmp.path().join("absent.db"));

    assert!(!reader.available());
    assert!(reader.list_ideas(None, None, 50).unwrap().is_empty());
    assert!(reader.get_idea(1).unwrap().is_none());
    assert!(reader.count_by_stage().unwrap().is_empty());
}

#[test]
fn test_reduced_schema_falls_back() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_reduced_db(&db);
    insert_reduced(&db, "First idea", "pending", "[\"cli\",\"tools\"]");

    let reader = PipelineReader::open(&db);
    let ideas = reader.list_ideas(None, None, 50).unwrap();
    assert_eq!(ideas.len(), 1);
    // No stage column yet: everything reads as the implicit first stage.
    assert_eq!(ideas[0].stage, "captured");
    assert_eq!(ideas[0].status, "pending");
    assert_eq!(ideas[0].overall_score, None);
    assert_eq!(ideas[0].tags, vec!["cli".to_string(), "tools".to_string()]);
}

#[test]
fn test_stage_filter_ignored_on_reduced_schema() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_reduced_db(&db);
    insert_reduced(&db, "A", "pending", "[]");
    insert_reduced(&db, "B", "pending", "[]");

    let reader = PipelineReader::open(&db);
    // The filter cannot be satisfied without the column; it degrades to
    // "no stage filter" instead of erroring.
    let ideas = reader.list_ideas(Some("building"), None, 50).unwrap();
    assert_eq!(ideas.len(), 2);
}

#[test]
fn test_extended_schema_extracts_scores() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_extended_db(&db);
    insert_extended(
        &db,
        "Scored idea",
        "evaluated",
        Some(r#"{"scores": {"overall_score": 78.0}, "recommendation": "develop"}"#),
    );
    insert_extended(&db, "Building idea", "building", None);

    let reader = PipelineReader::open(&db);
    let ideas = reader.list_ideas(Some("evaluated"), None, 50).unwrap();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].stage, "evaluated");
    assert_eq!(ideas[0].overall_score, Some(78.0));
    assert_eq!(ideas[0].recommendation.as_deref(), Some("develop"));
}

#[test]
fn test_get_idea_detail_on_extended_schema() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_extended_db(&db);
    insert_extended(&db, "Detailed idea", "published", None);

    let reader = PipelineReader::open(&db);
    let idea = reader.get_idea(1).unwrap().expect("idea present");
    assert_eq!(idea.title, "Detailed idea");
    assert_eq!(idea.stage, "published");
    assert_eq!(idea.github_url.as_deref(), Some("https://github.com/user/repo"));
    assert!(idea.caught_at.is_some());

    assert!(reader.get_idea(99).unwrap().is_none());
}

#[test]
fn test_malformed_tags_degrade_to_empty() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_reduced_db(&db);
    insert_reduced(&db, "Bad tags", "pending", "not json at all");

    let reader = PipelineReader::open(&db);
    let ideas = reader.list_ideas(None, None, 50).unwrap();
    assert_eq!(ideas.len(), 1);
    assert!(ideas[0].tags.is_empty());
}

#[test]
fn test_malformed_evaluation_result_degrades_to_absent() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_extended_db(&db);
    insert_extended(&db, "Bad eval", "evaluated", Some("{truncated"));

    let reader = PipelineReader::open(&db);
    let ideas = reader.list_ideas(None, None, 50).unwrap();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].overall_score, None);
    assert_eq!(ideas[0].recommendation, None);
}

#[test]
fn test_count_by_stage_groups_and_defaults() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_extended_db(&db);
    insert_extended(&db, "A", "building", None);
    insert_extended(&db, "B", "building", None);
    insert_extended(&db, "C", "evaluated", None);

    let reader = PipelineReader::open(&db);
    let counts = reader.count_by_stage().unwrap();
    assert_eq!(counts.get("building"), Some(&2));
    assert_eq!(counts.get("evaluated"), Some(&1));
}

#[test]
fn test_count_by_stage_reduced_schema() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("ideas.db");
    create_reduced_db(&db);
    insert_reduced(&db, "A", "pending", "[]");
    insert_reduced(&db, "B", "pending", "[]");

    let reader = PipelineReader::open(&db);
    let counts = reader.count_by_stage().unwrap();
    assert_eq!(counts.get("captured"), Some(&2));
}
