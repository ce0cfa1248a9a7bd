//! Integration tests for create, update and delete.

use odsql_core::{EntitySet, ODataRequest, RequestBody, SqlProcessor, StatementKind, StatusCode, UriInfo};
use odsql_datasource::SqlValue;
use odsql_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn create(set: Arc<EntitySet>, body: Value) -> ODataRequest {
    ODataRequest::Create {
        uri: UriInfo::new(set),
        body: RequestBody::json(&body),
    }
}

fn update(db: &TestDatabase, id: &str, body: Value, merge: bool) -> ODataRequest {
    ODataRequest::Update {
        uri: UriInfo::new(db.model.cars()).with_key("Id", id),
        body: RequestBody::json(&body),
        merge,
    }
}

fn delete(db: &TestDatabase, id: &str) -> ODataRequest {
    ODataRequest::Delete(UriInfo::new(db.model.cars()).with_key("Id", id))
}

#[test]
fn create_returns_the_stored_entity() {
    let db = TestDatabase::new();
    let request = create(
        db.model.cars(),
        json!({
            "d": {
                "__metadata": { "type": "Fleet.Car" },
                "Id": "p1",
                "Make": "Fiat",
                "Year": 2023,
                "Price": 12000.5,
                "Electric": true,
                "Notes": "not stored",
                "Size": { "Length": 3.6, "Width": 1.6 }
            }
        }),
    );
    let (response, body) = json_of(&db.processor(), &request);

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body["d"]["Id"], "p1");
    assert_eq!(body["d"]["Make"], "Fiat");
    assert_eq!(body["d"]["Electric"], true);
    assert_eq!(body["d"]["Notes"], Value::Null);
    assert_eq!(body["d"]["Size"]["Length"].as_f64(), Some(3.6));
    assert_eq!(db.count("CARS"), 8);
    assert_eq!(
        db.column("SELECT PRICE FROM CARS WHERE ID = 'p1'"),
        vec![SqlValue::Double(12000.5)]
    );
}

#[test]
fn create_without_key_is_rejected_after_the_insert_builder() {
    let db = TestDatabase::new();
    let counting = Arc::new(CountingQueryBuilder::new(Arc::new(db.model.query_builder())));
    let processor = SqlProcessor::builder(db.datasource.clone(), counting.clone()).build();

    let (response, body) = json_of(&processor, &create(db.model.cars(), json!({ "Make": "Fiat" })));
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]["value"].as_str().unwrap().contains("key"));
    assert_eq!(counting.requested(), vec![StatementKind::Insert]);
    assert_eq!(db.count("CARS"), 7);
}

#[test]
fn create_recovers_a_generated_key() {
    let db = TestDatabase::new();
    let request = create(db.model.addresses(), json!({ "City": "Paris", "Street": "Rue de Rivoli 1" }));
    let (response, body) = json_of(&db.processor(), &request);

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body["d"]["Id"], 3);
    assert_eq!(body["d"]["City"], "Paris");
}

#[test]
fn create_with_invalid_payload_is_a_bad_request() {
    let db = TestDatabase::new();
    let processor = db.processor();

    let wrong_type = create(db.model.cars(), json!({ "Id": "p1", "Make": "Fiat", "Price": "BOOM" }));
    assert_eq!(processor.handle_request(&wrong_type).status(), StatusCode::BAD_REQUEST);

    let unknown = create(db.model.cars(), json!({ "Id": "p1", "Make": "Fiat", "Colour": "red" }));
    assert_eq!(processor.handle_request(&unknown).status(), StatusCode::BAD_REQUEST);

    let not_json = ODataRequest::Create {
        uri: UriInfo::new(db.model.cars()),
        body: RequestBody {
            content_type: "application/json".into(),
            bytes: b"{ nope".to_vec(),
        },
    };
    assert_eq!(processor.handle_request(&not_json).status(), StatusCode::BAD_REQUEST);
    assert_eq!(db.count("CARS"), 7);
}

#[test]
fn create_violating_a_constraint_is_a_server_error() {
    let db = TestDatabase::new();
    let duplicate = create(db.model.cars(), json!({ "Id": "c1", "Make": "Fiat" }));
    let (response, body) = json_of(&db.processor(), &duplicate);
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "500");
}

#[test]
fn put_replaces_and_merge_patches() {
    let db = TestDatabase::new();
    let processor = db.processor();

    let response = processor.handle_request(&update(&db, "c2", json!({ "Make": "BMW", "Model": "M3" }), false));
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(db.column("SELECT MODEL FROM CARS WHERE ID = 'c2'"), vec![SqlValue::Text("M3".into())]);
    assert_eq!(db.column("SELECT YEAR FROM CARS WHERE ID = 'c2'"), vec![SqlValue::Null]);

    let response = processor.handle_request(&update(&db, "c1", json!({ "Model": "X6" }), true));
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(db.column("SELECT MODEL FROM CARS WHERE ID = 'c1'"), vec![SqlValue::Text("X6".into())]);
    assert_eq!(db.column("SELECT YEAR FROM CARS WHERE ID = 'c1'"), vec![SqlValue::Integer(2019)]);
    assert_eq!(db.column("SELECT SIZE_LENGTH FROM CARS WHERE ID = 'c1'"), vec![SqlValue::Double(4.9)]);
}

#[test]
fn update_of_a_missing_entity_is_not_found() {
    let db = TestDatabase::new();
    let response = db.processor().handle_request(&update(&db, "nope", json!({ "Make": "Fiat" }), true));
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn update_with_a_filter_is_a_bad_request() {
    let db = TestDatabase::new();
    let request = ODataRequest::Update {
        uri: UriInfo::new(db.model.cars()).with_key("Id", "c1").with_filter("Make eq 'BMW'"),
        body: RequestBody::json(&json!({ "Model": "X6" })),
        merge: true,
    };
    assert_eq!(db.processor().handle_request(&request).status(), StatusCode::BAD_REQUEST);
    assert_eq!(db.column("SELECT MODEL FROM CARS WHERE ID = 'c1'"), vec![SqlValue::Text("X5".into())]);
}

#[test]
fn delete_is_idempotent() {
    let db = TestDatabase::new();
    let processor = db.processor();

    assert_eq!(processor.handle_request(&delete(&db, "c1")).status(), StatusCode::NO_CONTENT);
    assert_eq!(db.count("CARS"), 6);
    // Drivers of the car go with it.
    assert_eq!(db.count("DRIVERS"), 1);

    // A key that matches nothing is still a successful delete.
    assert_eq!(processor.handle_request(&delete(&db, "c1")).status(), StatusCode::NO_CONTENT);
    assert_eq!(db.count("CARS"), 6);
}

#[test]
fn created_entity_is_readable() {
    let db = TestDatabase::new();
    let processor = db.processor();
    processor.handle_request(&create(db.model.drivers(), json!({ "Id": "d9", "CarId": "c2", "Name": "Dana" })));

    let uri = UriInfo::new(db.model.cars())
        .with_key("Id", "c2")
        .with_expand(db.model.expand(&db.model.cars(), "Drivers"));
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntity(uri));
    assert_eq!(body["d"]["Drivers"]["results"][0]["Name"], "Dana");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Whatever a client creates reads back with the same values.
    #[test]
    fn created_cars_read_back(payload in car_payload_strategy()) {
        let db = TestDatabase::new();
        let processor = db.processor();
        let (response, _) = json_of(&processor, &create(db.model.cars(), payload.clone()));
        prop_assert_eq!(response.status(), StatusCode::CREATED);

        let id = payload["Id"].as_str().unwrap();
        let uri = UriInfo::new(db.model.cars()).with_key("Id", id);
        let (_, body) = json_of(&processor, &ODataRequest::ReadEntity(uri));
        for field in ["Make", "Model", "Year", "Electric"] {
            prop_assert_eq!(&body["d"][field], &payload[field]);
        }
        prop_assert_eq!(body["d"]["Price"].as_f64(), payload["Price"].as_f64());
    }
}
