mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir, write_catalog};

#[test]
fn setup_defaults_and_validation() {
    let workspace = temp_dir("curriculumd-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["catalog"]["activityTable"], json!("activities"));
    assert_eq!(
        setup["catalog"]["assetTables"],
        json!(["activity_assets", "activity_translations"])
    );
    assert_eq!(setup["catalog"]["endpoint"], json!(""));
    assert_eq!(setup["generator"]["samePeriodPenalty"], json!(0.75));
    assert_eq!(setup["generator"]["jitter"], json!(0.1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "catalog", "patch": { "activityTable": "vespa_activities", "assetTables": [] } }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(setup["catalog"]["activityTable"], json!("vespa_activities"));
    assert_eq!(setup["catalog"]["assetTables"], json!([]));

    let bad = [
        json!({ "section": "catalog", "patch": { "endpoint": "db.example.org" } }),
        json!({ "section": "catalog", "patch": { "colour": "red" } }),
        json!({ "section": "generator", "patch": { "jitter": 2 } }),
        json!({ "section": "generator", "patch": { "jitter": "high" } }),
        json!({ "section": "printer", "patch": {} }),
        json!({ "section": "generator", "patch": 5 }),
    ];
    for (i, params) in bad.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("b{}", i), "setup.update", params);
        assert_eq!(error_code(&resp), Some("bad_params"), "{}", resp);
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn remote_catalog_requires_configuration_and_reports_outage() {
    let workspace = temp_dir("curriculumd-catalog-remote");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "catalog.load", json!({}));
    assert_eq!(error_code(&resp), Some("catalog_not_configured"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    // Nothing listens on the discard port; both attempts fail fast.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "catalog", "patch": { "endpoint": "http://127.0.0.1:9", "apiKey": "test-key" } }),
    );
    let resp = request(&mut stdin, &mut reader, "4", "catalog.load", json!({}));
    assert_eq!(error_code(&resp), Some("catalog_unavailable"), "{}", resp);

    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert!(health["catalogSize"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn imported_catalog_merges_first_responding_asset_table() {
    let workspace = temp_dir("curriculumd-catalog-assets");
    let catalog = write_catalog(
        &workspace,
        json!({
            "activities": [
                { "id": 1, "name": "[Y12] Effort: Twenty Questions", "category": "Effort", "level": "Level 3", "summary": "undefined" },
                { "id": 2, "name": "Roadmap", "category": "Vision", "document_url": "https://docs.example.org/roadmap.pdf" }
            ],
            "activity_translations": [
                { "activity_id": 1, "kind": "document", "url": "https://docs.example.org/tq-cy.pdf", "language": "CY" },
                { "activity_id": 2, "kind": "document", "url": "https://docs.example.org/roadmap.pdf" },
                { "activity_id": 9, "kind": "video", "url": "https://video.example.org/x" }
            ]
        }),
    );

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let loaded = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "catalog.import",
        json!({ "path": catalog.to_string_lossy() }),
    );
    assert_eq!(loaded["count"], json!(2));
    assert_eq!(loaded["report"]["assetTable"], json!("activity_translations"));
    assert_eq!(loaded["report"]["assetsMerged"], json!(1));
    // No row carries a pathway, so the file reads as the older schema.
    assert_eq!(loaded["report"]["usedFallback"], json!(true));

    let listed = request_ok(&mut stdin, &mut reader, "2", "catalog.list", json!({}));
    let first = &listed["activities"][0];
    assert_eq!(first["id"], json!("1"));
    assert_eq!(first["name"], json!("Twenty Questions"));
    assert_eq!(first["summary"], json!(""));
    assert_eq!(first["pathway"], json!("both"));
    assert_eq!(first["assets"][0]["language"], json!("cy"));
    assert_eq!(listed["activities"][1]["assets"].as_array().map(|a| a.len()), Some(1));

    let missing = request(
        &mut stdin,
        &mut reader,
        "3",
        "catalog.import",
        json!({ "path": workspace.join("absent.json").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    let not_json = workspace.join("broken.json");
    std::fs::write(&not_json, "{ nope").expect("write broken");
    let broken = request(
        &mut stdin,
        &mut reader,
        "4",
        "catalog.import",
        json!({ "path": not_json.to_string_lossy() }),
    );
    assert_eq!(error_code(&broken), Some("import_failed"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
