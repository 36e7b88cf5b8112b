//! End-to-end pipeline runs over in-memory collaborators.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use futures::StreamExt;
use row_guard::prelude::*;
use row_guard::sources::ContentKind;
use rust_xlsxwriter::Workbook;
use serde_json::{json, Value as Json};
use std::io::Cursor;
use std::sync::Arc;

const BUCKET: &str = "row-guard";

struct Setup {
    pipeline: ValidationPipeline,
    blobs: Arc<ObjectStoreBlobStore>,
    audits: Arc<InMemoryAuditStore>,
    feed: Arc<EventFeed>,
}

fn setup(rules: Json, config: PipelineConfig) -> Setup {
    let blobs = Arc::new(ObjectStoreBlobStore::in_memory(BUCKET));
    let audits = Arc::new(InMemoryAuditStore::new());
    let feed = Arc::new(EventFeed::new());
    let context = PipelineContext::new(
        blobs.clone(),
        audits.clone(),
        Arc::new(InMemoryRulesStore::with_rules("rules", rules)),
        feed.clone(),
        config,
    );
    Setup {
        pipeline: ValidationPipeline::new(context).unwrap(),
        blobs,
        audits,
        feed,
    }
}

fn scenario_rules() -> Json {
    json!({
        "columns": {"age": {"type": "int", "required": true}},
        "unique_constraints": ["email"],
        "unique_mode": "fail_all"
    })
}

fn scenario_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Email").unwrap();
    sheet.write_string(0, 1, "Age").unwrap();
    sheet.write_string(1, 0, "a@x.com").unwrap();
    sheet.write_number(1, 1, 30).unwrap();
    sheet.write_string(2, 0, "a@x.com").unwrap();
    sheet.write_string(2, 1, "bad").unwrap();
    workbook.save_to_buffer().unwrap()
}

fn cell(data: Option<&Data>) -> String {
    data.map(ToString::to_string).unwrap_or_default()
}

#[tokio::test]
async fn spreadsheet_upload_produces_both_artifacts() {
    let s = setup(scenario_rules(), PipelineConfig::default());
    let summary = s
        .pipeline
        .ingest(
            "people.xlsx",
            scenario_workbook(),
            Some(ContentKind::Spreadsheet.mime_type()),
            "rules",
        )
        .await
        .unwrap();

    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.failure_count, 2);
    assert!(summary.spreadsheet_url.as_deref().unwrap().contains("expires="));

    let json = s.blobs.fetch(BUCKET, summary.json_key.as_ref().unwrap()).await.unwrap();
    let rows: Vec<Json> = serde_json::from_slice(&json.bytes).unwrap();
    assert_eq!(rows[0]["Valid"], "Fail");
    assert_eq!(rows[0]["Remarks"], "Duplicate based on email");
    assert_eq!(rows[1]["Remarks"], "age invalid int, Duplicate based on email");
    assert_eq!(rows[0]["age"], 30);

    let workbook = s
        .blobs
        .fetch(BUCKET, summary.spreadsheet_key.as_ref().unwrap())
        .await
        .unwrap();
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(workbook.bytes)).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Legend", "ValidatedData"]);
    let data = workbook.worksheet_range("ValidatedData").unwrap();
    assert_eq!(data.height(), 3);
    let header: Vec<String> = (0..4).map(|col| cell(data.get((0, col)))).collect();
    assert_eq!(header, vec!["email", "age", "Valid", "Remarks"]);
    assert_eq!(cell(data.get((2, 3))), "age invalid int, Duplicate based on email");
}

#[tokio::test]
async fn events_follow_the_run() {
    let s = setup(
        json!({"columns": {"n": {"type": "int"}}}),
        PipelineConfig::new().with_chunk_size(3).with_workers(2),
    );
    let mut csv = String::from("n\n");
    for n in 0..17 {
        csv.push_str(&format!("{n}\n"));
    }
    s.blobs
        .store(BUCKET, "uploads/numbers.csv", csv.into_bytes(), Some("text/csv"))
        .await
        .unwrap();
    let run_id = s.audits.create("numbers.csv", "rules").await.unwrap();
    let events = s.feed.subscribe(&run_id).await;

    let pipeline = s.pipeline.clone();
    let id = run_id.clone();
    let run = tokio::spawn(async move { pipeline.run(&id, "uploads/numbers.csv", "rules").await });
    let events: Vec<Json> = events
        .map(|line| serde_json::from_str(&line).unwrap())
        .collect()
        .await;
    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.quality(), "PASS");
    assert!(summary.json_key.as_deref().unwrap().ends_with("_PASS.json"));

    assert_eq!(events.first().unwrap()["type"], "init");
    assert_eq!(events.first().unwrap()["message"], "Loaded 17 records");
    let last = events.last().unwrap();
    assert_eq!(last["type"], "completed");
    assert_eq!(last["status"], "COMPLETED");
    assert_eq!(last["success_count"], 17);

    // 6 chunks, 2 per batch
    let processed: Vec<u64> = events
        .iter()
        .filter(|e| e["type"] == "progress")
        .map(|e| e["processed"].as_u64().unwrap())
        .collect();
    assert_eq!(processed, vec![6, 12, 17]);
    assert!(events.iter().all(|e| e["timestamp"].as_str().is_some()));

    let record = s.audits.get(&run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.processed_records, 17);
    let steps: Vec<&str> = record
        .profile
        .as_ref()
        .unwrap()
        .steps
        .iter()
        .map(|s| s.step.as_str())
        .collect();
    assert!(steps.contains(&"validate_records"));
    assert!(steps.contains(&"upload_artifacts"));
}

#[tokio::test]
async fn results_do_not_depend_on_chunking() {
    let mut csv = String::from("Code|Group\n");
    for i in 0..53 {
        let code = if i % 9 == 0 { "x".to_string() } else { i.to_string() };
        csv.push_str(&format!("{code}|g{}\n", i % 4));
    }
    let rules = json!({
        "columns": {"code": {"type": "int", "regex": "\\d+"}},
        "unique_constraints": ["group"],
        "unique_mode": "keep_first"
    });

    let mut outputs = Vec::new();
    for (chunk_size, workers) in [(1, 1), (5, 3), (53, 4), (1000, 2)] {
        let s = setup(
            rules.clone(),
            PipelineConfig::new().with_chunk_size(chunk_size).with_workers(workers),
        );
        let summary = s
            .pipeline
            .ingest("codes.psv", csv.clone().into_bytes(), Some("text/csv"), "rules")
            .await
            .unwrap();
        assert_eq!(summary.success_count + summary.failure_count, 53);
        let json = s.blobs.fetch(BUCKET, summary.json_key.as_ref().unwrap()).await.unwrap();
        outputs.push(json.bytes);
    }
    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn invalid_rule_document_fails_the_run() {
    let s = setup(
        json!({"columns": {"code": {"regex": "(unclosed"}}}),
        PipelineConfig::default(),
    );
    let err = s
        .pipeline
        .ingest("codes.csv", b"code\n1\n".to_vec(), None, "rules")
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::InvalidRuleDefinition { .. }));

    let run_id = s.audits.run_ids().await.remove(0);
    let record = s.audits.get(&run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error_message.unwrap().starts_with("Invalid rule definition"));

    let history = s.feed.history(&run_id).await;
    let last: Json = serde_json::from_str(history.last().unwrap()).unwrap();
    assert_eq!(last["type"], "error");
    assert_eq!(last["status"], "FAILED");
}
