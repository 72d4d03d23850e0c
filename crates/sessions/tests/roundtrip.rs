//! Persistence round-trip tests: save → load preserves the session, and
//! save → load → save is a fixed point on the serialized bytes.

use quarry_domain::entity::Entity;
use quarry_domain::finding::{Finding, Lead, LeadStatus};
use quarry_domain::tool::args;
use quarry_sessions::{load_session, save_session, list_sessions, Session};

fn populated_session() -> Session {
    let mut session = Session::new("Acme Corp shell companies in Panama");

    let company = Entity::new("acme:holdings", "Company")
        .with_property("name", vec!["Acme Holdings Ltd".into()])
        .with_property("jurisdiction", vec!["pa".into()]);
    let officer = Entity::new("acme:officer", "Person")
        .with_property("name", vec!["J. Doe".into()]);
    let ownership = Entity::new("acme:own-1", "Ownership")
        .with_property("owner", vec!["acme:officer".into()])
        .with_property("asset", vec!["acme:holdings".into()]);

    session.add_finding(
        Finding::new("search_entities", "Found 2 entities, 1 relationship")
            .with_confidence(0.8)
            .with_entities(vec![company, officer, ownership]),
    );

    let lead = Lead::new("Trace ownership of Acme Holdings Ltd", 0.8)
        .with_suggestion("trace_ownership", "acme:holdings");
    let dead = Lead::new("Old registry lookup", 0.3);
    let dead_id = dead.id.clone();
    session.add_lead(lead);
    session.add_lead(dead);
    session.resolve_lead(&dead_id, LeadStatus::DeadEnd);

    let tool_args = args(&[("query", "Acme Corp")]);
    let result = serde_json::json!({ "result_count": 3 })
        .as_object()
        .unwrap()
        .clone();
    session.record_tool_use("search_entities", &tool_args, &result);
    session.record_reasoning("Seeded entity search from goal");
    session.turn_count = 2;
    session.safety_audit = Some(serde_json::json!({ "total_checks": 4, "blocks": 0 }));
    session
}

#[test]
fn save_load_preserves_session_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acme.json");

    let original = populated_session();
    save_session(&original, &path).unwrap();
    let loaded = load_session(&path).unwrap();

    assert_eq!(loaded.goal, original.goal);
    assert_eq!(loaded.id, original.id);
    assert_eq!(loaded.turn_count, original.turn_count);
    assert_eq!(loaded.finding_count(), original.finding_count());
    assert_eq!(loaded.entity_count(), original.entity_count());
    assert_eq!(loaded.reasoning_trace(), original.reasoning_trace());
    assert_eq!(loaded.leads().len(), original.leads().len());
    assert_eq!(loaded.safety_audit, original.safety_audit);
}

#[test]
fn save_load_save_is_a_fixed_point() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    let original = populated_session();
    save_session(&original, &first).unwrap();
    let loaded = load_session(&first).unwrap();
    save_session(&loaded, &second).unwrap();

    let bytes_first = std::fs::read(&first).unwrap();
    let bytes_second = std::fs::read(&second).unwrap();
    assert_eq!(bytes_first, bytes_second);
}

#[test]
fn standalone_entities_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.json");

    let mut session = populated_session();
    // An entity added outside any finding (e.g. merged in from a resumed
    // session) must still round-trip.
    session.upsert_entity(
        &Entity::new("acme:agent", "Person").with_property("name", vec!["Registered Agent".into()]),
    );
    save_session(&session, &path).unwrap();

    let loaded = load_session(&path).unwrap();
    assert!(loaded.has_entity("acme:agent"));
    assert_eq!(loaded.entity_count(), session.entity_count());
    // Arena order is preserved across the reload.
    let ids: Vec<&str> = loaded.entities().iter().map(|e| e.id.as_str()).collect();
    let expected: Vec<&str> = session.entities().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, expected);
}

#[test]
fn unknown_top_level_keys_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forward.json");

    let session = populated_session();
    save_session(&session, &path).unwrap();

    // Simulate a newer writer adding a key this version does not know.
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    value["added_by_future_version"] = serde_json::json!({ "nested": true });
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    let loaded = load_session(&path).unwrap();
    assert_eq!(loaded.goal, session.goal);
}

#[test]
fn missing_optional_keys_default_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minimal.json");
    std::fs::write(
        &path,
        serde_json::json!({
            "version": 1,
            "session_id": "abc123",
            "goal": "minimal",
            "started_at": "2026-08-01T00:00:00Z",
            "turn_count": 0,
        })
        .to_string(),
    )
    .unwrap();

    let loaded = load_session(&path).unwrap();
    assert_eq!(loaded.goal, "minimal");
    assert_eq!(loaded.finding_count(), 0);
    assert_eq!(loaded.entity_count(), 0);
    assert!(loaded.safety_audit.is_none());
}

#[test]
fn wrong_version_is_an_invalid_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v9.json");
    std::fs::write(
        &path,
        serde_json::json!({
            "version": 9,
            "session_id": "abc123",
            "goal": "from the future",
            "started_at": "2026-08-01T00:00:00Z",
            "turn_count": 0,
        })
        .to_string(),
    )
    .unwrap();

    let err = load_session(&path).unwrap_err();
    assert!(matches!(err, quarry_domain::Error::InvalidSession(_)));
}

#[test]
fn corrupt_json_is_an_invalid_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = load_session(&path).unwrap_err();
    assert!(matches!(err, quarry_domain::Error::InvalidSession(_)));
}

#[test]
fn list_sessions_scans_directory() {
    let dir = tempfile::tempdir().unwrap();
    let session = populated_session();
    save_session(&session, &dir.path().join("a.json")).unwrap();
    save_session(&Session::new("second goal"), &dir.path().join("b.json")).unwrap();
    std::fs::write(dir.path().join("junk.json"), "not a session").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let listed = list_sessions(dir.path());
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].goal, session.goal);
    assert_eq!(listed[0].findings, 1);
    assert_eq!(listed[1].goal, "second goal");
}

#[test]
fn list_sessions_missing_directory_is_empty() {
    let listed = list_sessions(std::path::Path::new("/nonexistent/quarry-sessions"));
    assert!(listed.is_empty());
}
