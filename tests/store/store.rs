use chrono::{Duration, Utc};
use contrail::contracts::{
    EvidenceBasis, ImprovementRecommendation, OutcomeRecord, PatchOperation, PersonaFieldPatch,
    PersonaUpgradePatch, RecommendationType, ResearchSignal, SignalRelevance, SignalSource,
    TargetScope, TerminalOutcome,
};
use contrail::core::store::{
    ContractStore, OutcomeFilter, PatchFilter, RecommendationFilter, SignalFilter,
};
use std::fs;
use tempfile::tempdir;

fn outcome(idea_id: i64, outcome: TerminalOutcome) -> OutcomeRecord {
    OutcomeRecord {
        contract_version: "1.1.0".to_string(),
        idea_id,
        idea_title: format!("Idea {}", idea_id),
        outcome,
        overall_score: None,
        recommendation: None,
        capabilities_fit: None,
        build_outcome: None,
        artifact_count: 0,
        tech_stack: vec![],
        pipeline_trace: vec![],
        total_duration_seconds: 0.0,
        tags: vec![],
        github_url: None,
        idea_type: None,
        emitted_at: Utc::now(),
    }
}

fn recommendation(id: &str, title: &str) -> ImprovementRecommendation {
    ImprovementRecommendation {
        contract_version: "1.0.0".to_string(),
        recommendation_id: id.to_string(),
        session_id: String::new(),
        recommendation_type: RecommendationType::FrameworkAddition,
        target_system: "persona".to_string(),
        title: title.to_string(),
        description: "desc".to_string(),
        suggested_change: "change".to_string(),
        scope: TargetScope::AllPersonas,
        target_persona_ids: vec![],
        target_department: None,
        priority: "medium".to_string(),
        impact: String::new(),
        reversibility: "high".to_string(),
        evidence: EvidenceBasis::default(),
        status: "pending".to_string(),
        emitted_at: Utc::now(),
    }
}

fn patch(id: &str) -> PersonaUpgradePatch {
    PersonaUpgradePatch {
        contract_version: "1.0.0".to_string(),
        patch_id: id.to_string(),
        persona_id: "writer-01".to_string(),
        patches: vec![PersonaFieldPatch {
            operation: PatchOperation::Add,
            path: "/frameworks/-".to_string(),
            value: Some(serde_json::json!({"name": "inversion"})),
        }],
        rationale: "rationale".to_string(),
        from_version: None,
        to_version: None,
        schema_valid: true,
        source_recommendation_ids: vec!["rec-001".to_string()],
        status: "proposed".to_string(),
        emitted_at: Utc::now(),
    }
}

fn signal(id: &str, source: SignalSource) -> ResearchSignal {
    ResearchSignal {
        contract_version: "1.0.0".to_string(),
        signal_id: id.to_string(),
        source,
        title: format!("Signal {}", id),
        summary: "summary".to_string(),
        url: None,
        relevance: SignalRelevance::High,
        relevance_rationale: String::new(),
        tags: vec![],
        domain: None,
        raw_data: None,
        consumed_by: None,
        emitted_at: Utc::now(),
    }
}

#[test]
fn test_write_then_read_roundtrip() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    let sig = signal("sig-001", SignalSource::ArxivHf);
    store.write_signal(&sig).unwrap();

    let read = store.read_signals(100).unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0], sig);
}

#[test]
fn test_append_only_log_line_counts() {
    let tmp = tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let mut store = ContractStore::open(&data_dir);

    for i in 0..4 {
        store
            .write_recommendation(&recommendation(&format!("rec-{}", i), "t"))
            .unwrap();
    }
    // Reads, queries, and rebuilds never touch the log.
    store.read_recommendations(100).unwrap();
    store
        .query_recommendations(&RecommendationFilter::default(), 100)
        .unwrap();
    store.rebuild().unwrap();
    store.rebuild().unwrap();

    let log = fs::read_to_string(data_dir.join("improvement_recommendations.jsonl")).unwrap();
    let lines: Vec<_> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_last_write_wins_on_unique_identity() {
    let tmp = tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let mut store = ContractStore::open(&data_dir);

    store
        .write_recommendation(&recommendation("rec-dup", "first title"))
        .unwrap();
    store
        .write_recommendation(&recommendation("rec-dup", "second title"))
        .unwrap();

    // The log keeps both emissions.
    let raw = store.read_recommendations(100).unwrap();
    assert_eq!(raw.len(), 2);

    // The index keeps exactly one row, reflecting the second write.
    let queried = store
        .query_recommendations(&RecommendationFilter::default(), 100)
        .unwrap();
    assert_eq!(queried.len(), 1);
    assert_eq!(queried[0].title, "second title");
}

#[test]
fn test_status_overlay_independence() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store
        .write_recommendation(&recommendation("rec-overlay", "t"))
        .unwrap();
    store
        .update_recommendation_status("rec-overlay", "applied")
        .unwrap();

    // The query layer sees the live status...
    let queried = store
        .query_recommendations(&RecommendationFilter::default(), 100)
        .unwrap();
    assert_eq!(queried[0].status, "applied");

    // ...while the raw log still holds the write-time value.
    let raw = store.read_recommendations(100).unwrap();
    assert_eq!(raw[0].status, "pending");
}

#[test]
fn test_query_filters_recommendations_by_status() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store
        .write_recommendation(&recommendation("rec-a", "a"))
        .unwrap();
    store
        .write_recommendation(&recommendation("rec-b", "b"))
        .unwrap();
    store.update_recommendation_status("rec-a", "applied").unwrap();

    let filter = RecommendationFilter {
        status: Some("pending".to_string()),
        ..Default::default()
    };
    let pending = store.query_recommendations(&filter, 100).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].recommendation_id, "rec-b");
}

#[test]
fn test_rebuild_is_idempotent() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store.write_outcome(&outcome(1, TerminalOutcome::Published)).unwrap();
    store
        .write_recommendation(&recommendation("rec-1", "t"))
        .unwrap();
    store.write_patch(&patch("patch-1")).unwrap();
    store.write_signal(&signal("sig-1", SignalSource::ToolMonitor)).unwrap();

    let first = store.rebuild().unwrap();
    let after_first = store
        .query_recommendations(&RecommendationFilter::default(), 100)
        .unwrap();
    let second = store.rebuild().unwrap();
    let after_second = store
        .query_recommendations(&RecommendationFilter::default(), 100)
        .unwrap();

    assert_eq!(first.recommendations, second.recommendations);
    assert_eq!(first.outcome_records, second.outcome_records);
    assert_eq!(after_first, after_second);

    let outcomes = store.query_outcomes(&OutcomeFilter::default(), 100).unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[test]
fn test_rebuild_forgets_index_only_mutations() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store.write_patch(&patch("patch-rb")).unwrap();
    store.update_patch_status("patch-rb", "applied").unwrap();

    let before = store.query_patches(&PatchFilter::default(), 100).unwrap();
    assert_eq!(before[0].status, "applied");

    store.rebuild().unwrap();

    // The mutation lived only on the index row; the log still says
    // "proposed", and the log is the sole source of truth.
    let after = store.query_patches(&PatchFilter::default(), 100).unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].status, "proposed");
}

#[test]
fn test_rebuild_recovers_lost_index() {
    let tmp = tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let mut store = ContractStore::open(&data_dir);

    for i in 0..3 {
        store
            .write_signal(&signal(&format!("sig-{}", i), SignalSource::DomainWatch))
            .unwrap();
    }
    let db_path = store.db_path().to_path_buf();
    store.close();
    fs::remove_file(&db_path).unwrap();

    let mut store = ContractStore::open(&data_dir);
    assert_eq!(
        store.query_signals(&SignalFilter::default(), 100).unwrap().len(),
        0
    );

    let report = store.rebuild().unwrap();
    assert_eq!(report.signals, 3);
    assert_eq!(
        store.query_signals(&SignalFilter::default(), 100).unwrap().len(),
        3
    );
}

#[test]
fn test_signal_filter_by_source() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store.write_signal(&signal("sig-a1", SignalSource::ArxivHf)).unwrap();
    store.write_signal(&signal("sig-t1", SignalSource::ToolMonitor)).unwrap();
    store.write_signal(&signal("sig-a2", SignalSource::ArxivHf)).unwrap();

    let filter = SignalFilter {
        source: Some("arxiv_hf".to_string()),
        ..Default::default()
    };
    let arxiv = store.query_signals(&filter, 100).unwrap();
    assert_eq!(arxiv.len(), 2);
    assert!(arxiv.iter().all(|s| s.source == SignalSource::ArxivHf));

    let filter = SignalFilter {
        source: Some("tool_monitor".to_string()),
        ..Default::default()
    };
    assert_eq!(store.query_signals(&filter, 100).unwrap().len(), 1);
}

#[test]
fn test_signal_consumed_filter_both_polarities() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store.write_signal(&signal("sig-c1", SignalSource::ArxivHf)).unwrap();
    store.write_signal(&signal("sig-c2", SignalSource::ArxivHf)).unwrap();
    store
        .update_signal_consumed_by("sig-c1", "idea-surfacer")
        .unwrap();

    let unconsumed = store
        .query_signals(
            &SignalFilter {
                consumed: Some(false),
                ..Default::default()
            },
            100,
        )
        .unwrap();
    assert_eq!(unconsumed.len(), 1);
    assert_eq!(unconsumed[0].signal_id, "sig-c2");

    let consumed = store
        .query_signals(
            &SignalFilter {
                consumed: Some(true),
                ..Default::default()
            },
            100,
        )
        .unwrap();
    assert_eq!(consumed.len(), 1);
    assert_eq!(consumed[0].consumed_by.as_deref(), Some("idea-surfacer"));
}

#[test]
fn test_outcomes_same_idea_id_accumulate_rows() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store.write_outcome(&outcome(7, TerminalOutcome::Deferred)).unwrap();
    store.write_outcome(&outcome(7, TerminalOutcome::Published)).unwrap();

    let filter = OutcomeFilter {
        idea_id: Some(7),
        ..Default::default()
    };
    assert_eq!(store.query_outcomes(&filter, 100).unwrap().len(), 2);

    let filter = OutcomeFilter {
        outcome: Some("published".to_string()),
        ..Default::default()
    };
    let published = store.query_outcomes(&filter, 100).unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].outcome, TerminalOutcome::Published);
}

#[test]
fn test_empty_store_reads_and_queries() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    assert!(store.read_outcomes(100).unwrap().is_empty());
    assert!(store.read_recommendations(100).unwrap().is_empty());
    assert!(store.read_patches(100).unwrap().is_empty());
    assert!(store.read_signals(100).unwrap().is_empty());
    assert!(store
        .query_outcomes(&OutcomeFilter::default(), 100)
        .unwrap()
        .is_empty());
    assert!(store
        .query_signals(&SignalFilter::default(), 100)
        .unwrap()
        .is_empty());
}

#[test]
fn test_read_limit_keeps_most_recent_tail() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    for i in 0..5 {
        store
            .write_signal(&signal(&format!("sig-{}", i), SignalSource::IdeaMachine))
            .unwrap();
    }
    let tail = store.read_signals(3).unwrap();
    assert_eq!(tail.len(), 3);
    // Append order is preserved; the tail is the most recent entries.
    assert_eq!(tail[0].signal_id, "sig-2");
    assert_eq!(tail[2].signal_id, "sig-4");
}

#[test]
fn test_update_unknown_id_is_a_noop() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store.write_patch(&patch("patch-known")).unwrap();
    store.update_patch_status("patch-ghost", "applied").unwrap();

    let patches = store.query_patches(&PatchFilter::default(), 100).unwrap();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].status, "proposed");
}

#[test]
fn test_close_then_reopen_transparently() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    store
        .write_recommendation(&recommendation("rec-close", "t"))
        .unwrap();
    store.close();
    store.close();

    // Operations after close reconnect lazily.
    let queried = store
        .query_recommendations(&RecommendationFilter::default(), 100)
        .unwrap();
    assert_eq!(queried.len(), 1);
}

#[test]
fn test_invalid_record_writes_nothing() {
    let tmp = tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let mut store = ContractStore::open(&data_dir);

    let mut rec = recommendation("rec-bad", "t");
    rec.scope = TargetScope::SpecificPersona;
    rec.target_persona_ids = vec![];
    assert!(store.write_recommendation(&rec).is_err());

    // Validation failed before any I/O: no log file, no index row.
    assert!(!data_dir.join("improvement_recommendations.jsonl").exists());
    assert!(store
        .query_recommendations(&RecommendationFilter::default(), 100)
        .unwrap()
        .is_empty());
}

#[test]
fn test_query_orders_by_emission_time_descending() {
    let tmp = tempdir().unwrap();
    let mut store = ContractStore::open(tmp.path().join("data"));

    let base = Utc::now();
    for (i, id) in ["rec-old", "rec-mid", "rec-new"].iter().enumerate() {
        let mut rec = recommendation(id, "t");
        rec.emitted_at = base + Duration::minutes(i as i64);
        store.write_recommendation(&rec).unwrap();
    }

    let queried = store
        .query_recommendations(&RecommendationFilter::default(), 2)
        .unwrap();
    assert_eq!(queried.len(), 2);
    assert_eq!(queried[0].recommendation_id, "rec-new");
    assert_eq!(queried[1].recommendation_id, "rec-mid");
}
