//! Integration tests for event hooks around mutations.

use odsql_core::{ODataError, ODataRequest, ODataResponse, PropertyValue, RequestBody, SqlProcessor, StatusCode, UriInfo};
use odsql_datasource::SqlValue;
use odsql_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

struct Harness {
    db: TestDatabase,
    events: Arc<RecordingEventHandler>,
    builder: Arc<CountingQueryBuilder>,
    processor: SqlProcessor,
}

fn harness(events: RecordingEventHandler) -> Harness {
    let db = TestDatabase::new();
    let events = Arc::new(events);
    let builder = Arc::new(CountingQueryBuilder::new(Arc::new(db.model.query_builder())));
    let processor = SqlProcessor::builder(db.datasource.clone(), builder.clone())
        .event_handler(events.clone())
        .build();
    Harness {
        db,
        events,
        builder,
        processor,
    }
}

impl Harness {
    fn create_car(&self, id: &str, make: &str) -> ODataResponse {
        self.processor.handle_request(&ODataRequest::Create {
            uri: UriInfo::new(self.db.model.cars()),
            body: RequestBody::json(&json!({ "Id": id, "Make": make })),
        })
    }

    fn merge_car(&self, id: &str, model: &str) -> ODataResponse {
        self.processor.handle_request(&ODataRequest::Update {
            uri: UriInfo::new(self.db.model.cars()).with_key("Id", id),
            body: RequestBody::json(&json!({ "Model": model })),
            merge: true,
        })
    }

    fn delete_car(&self, id: &str) -> ODataResponse {
        self.processor
            .handle_request(&ODataRequest::Delete(UriInfo::new(self.db.model.cars()).with_key("Id", id)))
    }
}

// === Forbid ===

#[test]
fn forbidden_create_touches_nothing() {
    let h = harness(RecordingEventHandler::new().forbid(Operation::Create));
    let response = h.create_car("p1", "Fiat");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response.json_body().unwrap();
    assert_eq!(
        body["error"]["message"]["value"],
        ODataError::forbidden("Create", "Fleet.Car").to_string()
    );
    assert!(h.builder.requested().is_empty());
    assert!(h.events.calls().is_empty());
    assert_eq!(h.db.count("CARS"), 7);
}

#[test]
fn forbidden_update_and_delete() {
    let h = harness(
        RecordingEventHandler::new()
            .forbid(Operation::Update)
            .forbid(Operation::Delete),
    );
    assert_eq!(h.merge_car("c1", "X6").status(), StatusCode::FORBIDDEN);
    assert_eq!(h.delete_car("c1").status(), StatusCode::FORBIDDEN);
    assert!(h.builder.requested().is_empty());
    assert_eq!(h.db.count("CARS"), 7);
}

// === Before ===

#[test]
fn before_error_response_ends_the_operation() {
    let rejection = ODataResponse::json(StatusCode::BAD_REQUEST, &json!({ "error": { "code": "400" } }));
    let h = harness(RecordingEventHandler::new().before(Operation::Create, rejection.clone()));

    assert_eq!(h.create_car("p1", "Fiat"), rejection);
    assert_eq!(h.events.calls(), vec!["before_create:Cars"]);
    assert!(h.builder.requested().is_empty());
    assert_eq!(h.db.count("CARS"), 7);
}

#[test]
fn before_response_with_a_body_replaces_the_entry() {
    let authoritative = ODataResponse::json(StatusCode::OK, &json!({ "d": { "Id": "p1", "Make": "Ferrari" } }));
    let h = harness(
        RecordingEventHandler::new()
            .before(Operation::Create, authoritative)
            .after(Operation::Create, None),
    );

    let response = h.create_car("p1", "Fiat");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.json_body().unwrap()["d"]["Make"], "Ferrari");
    assert_eq!(
        h.db.column("SELECT MAKE FROM CARS WHERE ID = 'p1'"),
        vec![SqlValue::Text("Ferrari".into())]
    );

    let entries = h.events.entries();
    assert_eq!(entries[0].0, "before_create");
    assert_eq!(entries[0].1.get("Make"), Some(&PropertyValue::from("Fiat")));
    assert_eq!(entries[1].0, "after_create");
    assert_eq!(entries[1].1.get("Make"), Some(&PropertyValue::from("Ferrari")));
}

#[test]
fn before_success_without_a_body_ends_the_operation() {
    let h = harness(RecordingEventHandler::new().before(Operation::Create, ODataResponse::no_content()));
    let response = h.create_car("p1", "Fiat");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.db.count("CARS"), 7);
}

#[test]
fn before_delete_response_is_always_terminal() {
    let accepted = ODataResponse::json(StatusCode::OK, &json!({ "d": { "Id": "c1" } }));
    let h = harness(RecordingEventHandler::new().before(Operation::Delete, accepted.clone()));
    assert_eq!(h.delete_car("c1"), accepted);
    assert_eq!(h.db.count("CARS"), 7);
}

// === On ===

#[test]
fn on_hook_replaces_the_default_path() {
    let custom = ODataResponse::text(StatusCode::CREATED, "handled elsewhere");
    let h = harness(
        RecordingEventHandler::new()
            .on(Operation::Create, custom.clone())
            .on(Operation::Update, ODataResponse::no_content())
            .on(Operation::Delete, ODataResponse::no_content()),
    );

    assert_eq!(h.create_car("p1", "Fiat"), custom);
    assert_eq!(h.merge_car("c1", "X6").status(), StatusCode::NO_CONTENT);
    assert_eq!(h.delete_car("c1").status(), StatusCode::NO_CONTENT);

    assert!(h.builder.requested().is_empty());
    assert_eq!(h.db.count("CARS"), 7);
    assert_eq!(
        h.db.column("SELECT MODEL FROM CARS WHERE ID = 'c1'"),
        vec![SqlValue::Text("X5".into())]
    );
    assert_eq!(
        h.events.calls(),
        vec![
            "before_create:Cars",
            "on_create:Cars",
            "before_update:Cars",
            "on_update:Cars",
            "before_delete:Cars",
            "on_delete:Cars",
        ]
    );
}

// === After ===

#[test]
fn after_response_wins_but_the_change_stays() {
    let accepted = ODataResponse::status_only(StatusCode::ACCEPTED);
    let h = harness(
        RecordingEventHandler::new()
            .after(Operation::Create, Some(accepted.clone()))
            .after(Operation::Delete, Some(accepted.clone())),
    );

    assert_eq!(h.create_car("p1", "Fiat"), accepted);
    assert_eq!(h.db.count("CARS"), 8);
    assert_eq!(h.delete_car("c7"), accepted);
    assert_eq!(h.db.count("CARS"), 7);
}

#[test]
fn after_hook_sees_state_set_before() {
    let h = harness(RecordingEventHandler::new().after(Operation::Update, None));
    assert_eq!(h.merge_car("c1", "X6").status(), StatusCode::NO_CONTENT);
    assert_eq!(h.merge_car("c2", "M3").status(), StatusCode::NO_CONTENT);
    assert_eq!(h.events.before_seen_in_after(), vec![true, true]);
    assert_eq!(
        h.events.calls(),
        vec![
            "before_update:Cars",
            "after_update:Cars",
            "before_update:Cars",
            "after_update:Cars",
        ]
    );
}

#[test]
fn after_hook_is_skipped_when_disabled() {
    let h = harness(RecordingEventHandler::new());
    assert_eq!(h.create_car("p1", "Fiat").status(), StatusCode::CREATED);
    assert_eq!(h.events.calls(), vec!["before_create:Cars"]);
}

#[test]
fn after_create_sees_the_generated_key() {
    let db = TestDatabase::new();
    let events = Arc::new(RecordingEventHandler::new().after(Operation::Create, None));
    let processor = db.processor_builder().event_handler(events.clone()).build();

    let response = processor.handle_request(&ODataRequest::Create {
        uri: UriInfo::new(db.model.addresses()),
        body: RequestBody::json(&json!({ "City": "Paris" })),
    });
    assert_eq!(response.status(), StatusCode::CREATED);
    let (_, entry) = events.entries().pop().expect("after entry");
    assert_eq!(entry.get("Id"), Some(&PropertyValue::from(3i64)));
}
