//! Property-based test generators using proptest.
//!
//! Provides strategies for fleet entries and request options that stay
//! within what the fixture schema accepts.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for car keys that never collide with seeded ones.
pub fn car_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("p[a-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for car makes.
pub fn make_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Audi", "BMW", "Fiat", "Skoda", "Tesla", "Volvo"]).prop_map(String::from)
}

/// Strategy for a JSON car payload as a client would submit it.
pub fn car_payload_strategy() -> impl Strategy<Value = Value> {
    (
        car_id_strategy(),
        make_strategy(),
        prop::option::of(prop::string::string_regex("[A-Z][a-z0-9 ]{0,10}").expect("Invalid regex")),
        1990i32..2030,
        0u32..200_000,
        any::<bool>(),
    )
        .prop_map(|(id, make, model, year, price, electric)| {
            json!({
                "Id": id,
                "Make": make,
                "Model": model,
                "Year": year,
                "Price": f64::from(price),
                "Electric": electric,
            })
        })
}

/// Strategy for server page sizes.
pub fn page_size_strategy() -> impl Strategy<Value = u32> {
    1u32..10
}

/// Strategy for `$skip` values around the seeded set size.
pub fn skip_strategy() -> impl Strategy<Value = u32> {
    0u32..10
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn payloads_carry_required_fields(payload in car_payload_strategy()) {
            prop_assert!(payload["Id"].as_str().is_some_and(|id| id.starts_with('p')));
            prop_assert!(payload["Make"].is_string());
            prop_assert!(payload["Price"].as_f64().is_some_and(|p| p >= 0.0));
        }
    }
}
