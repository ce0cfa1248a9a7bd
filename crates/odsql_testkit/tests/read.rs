//! Integration tests for reads, counts and paging.

use odsql_core::{ODataRequest, SqlProcessor, StatementKind, StatusCode, UriInfo};
use odsql_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;

fn ids(body: &Value) -> Vec<String> {
    body["d"]["results"]
        .as_array()
        .expect("results")
        .iter()
        .map(|e| e["Id"].as_str().expect("Id").to_string())
        .collect()
}

#[test]
fn read_entity_materializes_every_property_kind() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars()).with_key("Id", "c1");
    let (response, body) = json_of(&db.processor(), &ODataRequest::ReadEntity(uri));

    assert_eq!(response.status(), StatusCode::OK);
    let car = &body["d"];
    assert_eq!(car["__metadata"]["type"], "Fleet.Car");
    assert_eq!(car["Id"], "c1");
    assert_eq!(car["Make"], "BMW");
    assert_eq!(car["Year"], 2019);
    assert_eq!(car["Price"].as_f64(), Some(65000.0));
    assert_eq!(car["Electric"], false);
    assert_eq!(car["Image"], "AQID");
    // Transient properties have no column and read as null.
    assert_eq!(car["Notes"], Value::Null);
    assert_eq!(car["Size"]["Length"].as_f64(), Some(4.9));
    assert_eq!(car["Size"]["Width"].as_f64(), Some(1.9));
}

#[test]
fn read_missing_entity_is_no_content() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars()).with_key("Id", "nope");
    let response = db.processor().handle_request(&ODataRequest::ReadEntity(uri));
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!response.has_body());
}

#[test]
fn read_entity_set_in_key_order() {
    let db = TestDatabase::new();
    let (response, body) = json_of(&db.processor(), &ODataRequest::ReadEntitySet(UriInfo::new(db.model.cars())));

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(ids(&body), vec!["c1", "c2", "c3", "c4", "c5", "c6", "c7"]);
    assert!(body["d"].get("__next").is_none());
    assert!(body["d"].get("__count").is_none());
}

#[test]
fn top_skip_filter_and_order() {
    let db = TestDatabase::new();
    let processor = db.processor();

    let page = UriInfo::new(db.model.cars()).with_top(2).with_skip(1);
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(page));
    assert_eq!(ids(&body), vec!["c2", "c3"]);

    let filtered = UriInfo::new(db.model.cars())
        .with_filter("Year ge 2020 and Electric eq false")
        .with_order_by("Price desc");
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(filtered));
    assert_eq!(ids(&body), vec!["c5"]);

    let by_price = UriInfo::new(db.model.cars()).with_order_by("Price desc").with_top(3);
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(by_price));
    assert_eq!(ids(&body), vec!["c7", "c5", "c1"]);
}

#[test]
fn select_narrows_properties_but_keeps_keys() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars()).with_select(["Make"]).with_top(1);
    let (_, body) = json_of(&db.processor(), &ODataRequest::ReadEntitySet(uri));
    let car = body["d"]["results"][0].as_object().expect("entity");
    assert_eq!(car["Id"], "c1");
    assert_eq!(car["Make"], "BMW");
    assert!(!car.contains_key("Model"));
    assert!(!car.contains_key("Size"));
}

#[test]
fn inline_count_counts_the_filtered_set() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars())
        .with_filter("Make eq 'BMW'")
        .with_top(1)
        .with_inline_count();
    let (_, body) = json_of(&db.processor(), &ODataRequest::ReadEntitySet(uri));
    assert_eq!(body["d"]["__count"], "2");
    assert_eq!(ids(&body), vec!["c1"]);
}

#[test]
fn count_entity_set() {
    let db = TestDatabase::new();
    let processor = db.processor();

    let response = processor.handle_request(&ODataRequest::Count(UriInfo::new(db.model.cars())));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text_body().unwrap(), SEEDED_CARS.to_string());

    let electric = UriInfo::new(db.model.cars()).with_filter("Electric eq true");
    let response = processor.handle_request(&ODataRequest::Count(electric));
    assert_eq!(response.text_body().unwrap(), "2");
}

#[test]
fn count_with_paging_is_not_implemented() {
    let db = TestDatabase::new();
    let processor = db.processor();
    for uri in [
        UriInfo::new(db.model.cars()).with_top(1),
        UriInfo::new(db.model.cars()).with_skip(1),
        UriInfo::new(db.model.cars()).with_skip_token("1"),
    ] {
        let response = processor.handle_request(&ODataRequest::Count(uri));
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}

#[test]
fn expand_to_one_renders_object_or_null() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars()).with_expand(db.model.expand(&db.model.cars(), "Owner"));
    let (_, body) = json_of(&db.processor(), &ODataRequest::ReadEntitySet(uri));

    let results = body["d"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 7);
    assert_eq!(results[0]["Owner"]["FirstName"], "Ivan");
    assert_eq!(results[0]["Owner"]["__metadata"]["type"], "Fleet.Owner");
    assert_eq!(results[1]["Owner"]["Id"], "o1");
    assert_eq!(results[4]["Owner"], Value::Null);
    assert!(results[0].get("Fleet.Owner").is_none());
}

#[test]
fn expand_to_many_keeps_all_children_of_a_paged_root() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars())
        .with_expand(db.model.expand(&db.model.cars(), "Drivers"))
        .with_top(1);
    let (_, body) = json_of(&db.processor(), &ODataRequest::ReadEntitySet(uri));

    assert_eq!(ids(&body), vec!["c1"]);
    let drivers = body["d"]["results"][0]["Drivers"]["results"].as_array().unwrap();
    let names: Vec<_> = drivers.iter().map(|d| d["Name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
}

#[test]
fn expand_with_no_children_renders_empty_results() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars())
        .with_key("Id", "c2")
        .with_expand(db.model.expand(&db.model.cars(), "Drivers"));
    let (_, body) = json_of(&db.processor(), &ODataRequest::ReadEntity(uri));
    assert_eq!(body["d"]["Drivers"]["results"], Value::Array(Vec::new()));
}

#[test]
fn nested_expand() {
    let db = TestDatabase::new();
    let processor = db.processor();

    let uri = UriInfo::new(db.model.cars())
        .with_key("Id", "c3")
        .with_expand(db.model.expand(&db.model.cars(), "Owner/Address"));
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntity(uri));
    assert_eq!(body["d"]["Owner"]["LastName"], "Schmidt");
    assert_eq!(body["d"]["Owner"]["Address"]["City"], "Berlin");

    // Owner without an address.
    let uri = UriInfo::new(db.model.cars())
        .with_key("Id", "c6")
        .with_expand(db.model.expand(&db.model.cars(), "Owner/Address"));
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntity(uri));
    assert_eq!(body["d"]["Owner"]["Id"], "o3");
    assert_eq!(body["d"]["Owner"]["Address"], Value::Null);
}

#[test]
fn expand_from_the_many_side() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.owners()).with_expand(db.model.expand(&db.model.owners(), "Cars"));
    let (_, body) = json_of(&db.processor(), &ODataRequest::ReadEntitySet(uri));

    assert_eq!(ids(&body), vec!["o1", "o2", "o3"]);
    let cars: Vec<_> = body["d"]["results"][1]["Cars"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["Id"].as_str().unwrap())
        .collect();
    assert_eq!(cars, vec!["c3", "c4"]);
}

#[test]
fn expanded_read_selects_keys_first() {
    let db = TestDatabase::new();
    let counting = Arc::new(CountingQueryBuilder::new(Arc::new(db.model.query_builder())));
    let processor = SqlProcessor::builder(db.datasource.clone(), counting.clone()).build();

    let uri = UriInfo::new(db.model.cars()).with_expand(db.model.expand(&db.model.cars(), "Owner"));
    processor.handle_request(&ODataRequest::ReadEntitySet(uri));
    assert_eq!(
        counting.requested(),
        vec![StatementKind::SelectKeys, StatementKind::SelectEntitySet]
    );
}

#[test]
fn expanded_read_of_an_empty_page_skips_the_second_query() {
    let db = TestDatabase::new();
    let counting = Arc::new(CountingQueryBuilder::new(Arc::new(db.model.query_builder())));
    let processor = SqlProcessor::builder(db.datasource.clone(), counting.clone()).build();

    let uri = UriInfo::new(db.model.cars())
        .with_filter("Make eq 'Lada'")
        .with_expand(db.model.expand(&db.model.cars(), "Drivers"));
    let (response, body) = json_of(&processor, &ODataRequest::ReadEntitySet(uri));
    assert_eq!(response.status(), StatusCode::OK);
    assert!(ids(&body).is_empty());
    assert_eq!(counting.requested(), vec![StatementKind::SelectKeys]);
}

#[test]
fn full_server_page_gets_a_next_link() {
    let db = TestDatabase::new();
    let processor = db.paged_processor(3);

    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(UriInfo::new(db.model.cars())));
    assert_eq!(ids(&body), vec!["c1", "c2", "c3"]);
    assert_eq!(body["d"]["__next"], "Cars?$skip=3");

    let second = UriInfo::new(db.model.cars())
        .with_skip(3)
        .with_request_uri("Cars?$filter=Year gt 1900&$skip=3");
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(second));
    assert_eq!(ids(&body), vec!["c4", "c5", "c6"]);
    assert_eq!(body["d"]["__next"], "Cars?$filter=Year gt 1900&$skip=6");

    let last = UriInfo::new(db.model.cars()).with_skip(6);
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(last));
    assert_eq!(ids(&body), vec!["c7"]);
    assert!(body["d"].get("__next").is_none());
}

#[test]
fn client_top_within_the_page_gets_no_next_link() {
    let db = TestDatabase::new();
    let processor = db.paged_processor(3);
    let uri = UriInfo::new(db.model.cars()).with_top(3);
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(uri));
    assert_eq!(ids(&body).len(), 3);
    assert!(body["d"].get("__next").is_none());
}

#[test]
fn expanded_pages_get_next_links_too() {
    let db = TestDatabase::new();
    let processor = db.paged_processor(2);
    let uri = UriInfo::new(db.model.cars()).with_expand(db.model.expand(&db.model.cars(), "Drivers"));
    let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(uri));
    assert_eq!(ids(&body), vec!["c1", "c2"]);
    assert_eq!(body["d"]["results"][0]["Drivers"]["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["d"]["__next"], "Cars?$skip=2");
}

#[test]
fn keyless_view_rows_are_numbered() {
    let db = TestDatabase::new();
    let (_, body) = json_of(&db.processor(), &ODataRequest::ReadEntitySet(UriInfo::new(db.model.car_summaries())));
    let rows = body["d"]["results"].as_array().unwrap();
    assert_eq!(rows.len(), 4);
    let tesla = rows.iter().find(|r| r["Make"] == "Tesla").expect("Tesla row");
    assert_eq!(tesla["CarCount"], 2);
    assert_eq!(tesla["__metadata"]["type"], "Fleet.CarSummary");
}

#[test]
fn read_property_and_raw_value() {
    let db = TestDatabase::new();
    let processor = db.processor();
    let car = || UriInfo::new(db.model.cars()).with_key("Id", "c1");

    let (response, body) = json_of(&processor, &ODataRequest::ReadProperty(car().with_property("Make")));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["d"]["Make"], "BMW");

    let response = processor.handle_request(&ODataRequest::ReadProperty(car().with_property("Make").with_raw_value()));
    assert_eq!(response.text_body().unwrap(), "BMW");

    let response = processor.handle_request(&ODataRequest::ReadProperty(car().with_property("Image").with_raw_value()));
    assert_eq!(response.content_type(), Some("application/octet-stream"));
    assert_eq!(response.body(), &[1, 2, 3]);

    let (_, body) = json_of(&processor, &ODataRequest::ReadProperty(car().with_property("Size")));
    assert_eq!(body["d"]["Size"]["Width"].as_f64(), Some(1.9));

    let response = processor.handle_request(&ODataRequest::ReadProperty(car().with_property("Notes").with_raw_value()));
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = processor.handle_request(&ODataRequest::ReadProperty(car().with_property("Color")));
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let missing = UriInfo::new(db.model.cars()).with_key("Id", "nope").with_property("Make");
    let response = processor.handle_request(&ODataRequest::ReadProperty(missing));
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[test]
fn unreadable_column_is_a_server_error() {
    let db = TestDatabase::new();
    db.execute_script("UPDATE CARS SET YEAR = 'unknown' WHERE ID = 'c2'");
    let uri = UriInfo::new(db.model.cars()).with_key("Id", "c2");
    let (response, body) = json_of(&db.processor(), &ODataRequest::ReadEntity(uri));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "500");
    assert!(body["error"]["message"]["value"].as_str().unwrap().contains("CAR_YEAR"));
}

#[test]
fn malformed_filter_is_a_bad_request() {
    let db = TestDatabase::new();
    let uri = UriInfo::new(db.model.cars()).with_filter("Colour eq 'red'");
    let response = db.processor().handle_request(&ODataRequest::ReadEntitySet(uri));
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Following next-links from any offset visits every remaining car once.
    #[test]
    fn next_links_walk_the_whole_set(page_size in page_size_strategy(), start in skip_strategy()) {
        let db = TestDatabase::new();
        let processor = db.paged_processor(page_size);
        let mut seen = Vec::new();
        let mut skip = start;
        for _ in 0..20 {
            let uri = UriInfo::new(db.model.cars()).with_skip(skip);
            let (_, body) = json_of(&processor, &ODataRequest::ReadEntitySet(uri));
            let page = ids(&body);
            prop_assert!(page.len() <= page_size as usize);
            seen.extend(page);
            match body["d"]["__next"].as_str() {
                Some(next) => {
                    skip = next.rsplit("$skip=").next().and_then(|n| n.parse().ok()).expect("skip");
                }
                None => break,
            }
        }
        let expected: Vec<String> = (1..=7).skip(start as usize).map(|n| format!("c{n}")).collect();
        prop_assert_eq!(seen, expected);
    }
}
