//! Integration tests for the interceptor chain.

use odsql_core::{InterceptPoint, ODataRequest, RequestBody, SqlProcessor, StatusCode, UriInfo};
use odsql_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

const ELECTRIC_ONLY: &str = "FROM (SELECT * FROM CARS WHERE ELECTRIC = 1) T0";
const WITH_NULL_ROW: &str = "FROM (SELECT * FROM CARS UNION ALL \
     SELECT NULL, 'Ghost', NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL) T0";

fn recording(db: &TestDatabase, names: &[&str]) -> (SqlProcessor, CallLog) {
    let log = call_log();
    let mut builder = db.processor_builder();
    for name in names {
        builder = builder.interceptor(Arc::new(RecordingInterceptor::new(*name, log.clone())));
    }
    (builder.build(), log)
}

fn logged(log: &CallLog) -> Vec<String> {
    log.lock().clone()
}

// === Order ===

#[test]
fn interceptors_run_in_registration_order() {
    let db = TestDatabase::new();
    let (processor, log) = recording(&db, &["a", "b"]);
    let uri = UriInfo::new(db.model.cars()).with_key("Id", "c1");

    let response = processor.handle_request(&ODataRequest::ReadEntity(uri));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(logged(&log), vec!["a:read:SelectEntity", "b:read:SelectEntity"]);
}

#[test]
fn both_expand_queries_are_intercepted() {
    let db = TestDatabase::new();
    let (processor, log) = recording(&db, &["a"]);
    let uri = UriInfo::new(db.model.cars()).with_expand(db.model.expand(&db.model.cars(), "Owner"));

    processor.handle_request(&ODataRequest::ReadEntitySet(uri));
    assert_eq!(logged(&log), vec!["a:read:SelectKeys", "a:read:SelectEntitySet"]);
}

#[test]
fn count_is_intercepted_as_a_read() {
    let db = TestDatabase::new();
    let (processor, log) = recording(&db, &["a"]);
    processor.handle_request(&ODataRequest::Count(UriInfo::new(db.model.cars())));
    assert_eq!(logged(&log), vec!["a:read:Count"]);
}

// === Mutations ===

#[test]
fn mutations_use_their_own_points() {
    let db = TestDatabase::new();
    let (processor, log) = recording(&db, &["a"]);

    let create = ODataRequest::Create {
        uri: UriInfo::new(db.model.cars()),
        body: RequestBody::json(&json!({ "Id": "p1", "Make": "Fiat" })),
    };
    assert_eq!(processor.handle_request(&create).status(), StatusCode::CREATED);
    assert_eq!(logged(&log), vec!["a:create:Insert", "a:read:SelectEntity"]);

    log.lock().clear();
    let update = ODataRequest::Update {
        uri: UriInfo::new(db.model.cars()).with_key("Id", "p1"),
        body: RequestBody::json(&json!({ "Model": "Panda" })),
        merge: true,
    };
    assert_eq!(processor.handle_request(&update).status(), StatusCode::NO_CONTENT);
    assert_eq!(logged(&log), vec!["a:read:SelectEntity", "a:update:Update"]);

    log.lock().clear();
    let delete = ODataRequest::Delete(UriInfo::new(db.model.cars()).with_key("Id", "p1"));
    assert_eq!(processor.handle_request(&delete).status(), StatusCode::NO_CONTENT);
    assert_eq!(logged(&log), vec!["a:delete:Delete"]);
}

// === Replacement ===

#[test]
fn replaced_builder_restricts_reads() {
    let db = TestDatabase::new();
    let processor = db
        .processor_builder()
        .interceptor(Arc::new(ReadRewriteInterceptor::new("FROM CARS T0", ELECTRIC_ONLY)))
        .build();

    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(UriInfo::new(db.model.cars())));
    let ids: Vec<&str> = body["d"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|car| car["Id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["c3", "c7"]);

    let count = processor.handle_request(&ODataRequest::Count(UriInfo::new(db.model.cars())));
    assert_eq!(count.text_body().unwrap(), "2");

    let hidden = UriInfo::new(db.model.cars()).with_key("Id", "c1");
    assert_eq!(
        processor.handle_request(&ODataRequest::ReadEntity(hidden)).status(),
        StatusCode::NO_CONTENT
    );
}

#[test]
fn later_interceptors_see_the_replacement() {
    let db = TestDatabase::new();
    let log = call_log();
    let processor = db
        .processor_builder()
        .interceptor(Arc::new(ReadRewriteInterceptor::new("FROM CARS T0", ELECTRIC_ONLY)))
        .interceptor(Arc::new(RecordingInterceptor::new("after", log.clone())))
        .build();

    let uri = UriInfo::new(db.model.cars()).with_key("Id", "c3");
    let (response, body) = json_of(&processor, &ODataRequest::ReadEntity(uri));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["d"]["Make"], "Tesla");
    assert_eq!(log.lock().clone(), vec!["after:read:SelectEntity"]);
}

#[test]
fn rows_without_a_root_key_are_skipped() {
    let db = TestDatabase::new();
    let processor = db
        .processor_builder()
        .interceptor(Arc::new(ReadRewriteInterceptor::new("FROM CARS T0", WITH_NULL_ROW)))
        .build();

    let (response, body) = json_of(&processor, &ODataRequest::ReadEntitySet(UriInfo::new(db.model.cars())));
    assert_eq!(response.status(), StatusCode::OK);
    let results = body["d"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 7);
    assert!(results.iter().all(|car| car["Make"] != "Ghost"));
}

// === Failure ===

#[test]
fn failing_interceptor_stops_the_operation() {
    let db = TestDatabase::new();
    let log = call_log();
    let processor = db
        .processor_builder()
        .interceptor(Arc::new(FailingInterceptor::at(InterceptPoint::Create)))
        .interceptor(Arc::new(RecordingInterceptor::new("never", log.clone())))
        .build();

    let create = ODataRequest::Create {
        uri: UriInfo::new(db.model.cars()),
        body: RequestBody::json(&json!({ "Id": "p1", "Make": "Fiat" })),
    };
    let (response, body) = json_of(&processor, &create);
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]["value"].as_str().unwrap().contains("create"));
    assert!(log.lock().is_empty());
    assert_eq!(db.count("CARS"), 7);

    // Reads are unaffected.
    let read = UriInfo::new(db.model.cars()).with_key("Id", "c1");
    assert_eq!(processor.handle_request(&ODataRequest::ReadEntity(read)).status(), StatusCode::OK);
    assert_eq!(logged(&log), vec!["never:read:SelectEntity"]);
}
