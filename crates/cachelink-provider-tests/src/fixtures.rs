use cachelink_core::Record;
use rand::Rng;
use serde_json::{Value, json};

/// The record used by the basic set/get/delete scenario.
pub fn wolfram() -> Record {
    Record::new(json!({"firstname": "Wolfram"}), 10)
}

/// Records written concurrently to one key, told apart by `count`.
pub fn egon(count: i64) -> Record {
    Record::new(json!({"firstname": "Egon", "count": count}), 10)
}

/// A record exercising every JSON value kind, with random leaves.
pub fn mixed_payload() -> Record {
    let mut rng = rand::rng();
    let body: Value = json!({
        "int": rng.random_range(-1_000_000i64..1_000_000),
        "float": rng.random::<f64>(),
        "scaled": rng.random::<f64>() * 1e12 - 5e11,
        "whole_float": 2.0,
        "tenth": 0.1,
        "flag": rng.random_bool(0.5),
        "nothing": null,
        "text": "grüße, \"quoted\" \n newline",
        "list": [1, "two", 3.5, [], {}],
        "nested": {"deeper": {"deepest": [true, false, null]}},
    });
    Record::new(body, rng.random_range(1..i64::MAX))
}
