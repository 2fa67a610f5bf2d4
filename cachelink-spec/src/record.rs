use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored record: an opaque JSON body plus a version counter.
///
/// The wire names `_d` and `v` are what hosts exchange with the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_d")]
    pub data: Value,
    #[serde(rename = "v")]
    pub version: i64,
}

impl Record {
    pub fn new(data: Value, version: i64) -> Self {
        Self { data, version }
    }

    /// Encode the body as a JSON document string.
    pub fn data_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }

    /// Rebuild a record from a stored JSON body and version.
    pub fn from_parts(data_json: &str, version: i64) -> crate::Result<Self> {
        let data = serde_json::from_str(data_json)?;
        Ok(Self { data, version })
    }
}

/// A single buffered write, addressed by key within one table.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { key: String, record: Record },
    Delete { key: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_field_names() {
        let record = Record::new(json!({"firstname": "Wolfram"}), 10);
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded, json!({"_d": {"firstname": "Wolfram"}, "v": 10}));

        let decoded: Record = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn body_keeps_number_kinds() {
        let record = Record::new(
            json!({"int": 3, "float": 0.1, "neg": -7, "nested": [1.5, 2.0e-308, null]}),
            1,
        );
        let body = record.data_json().unwrap();
        let back = Record::from_parts(&body, record.version).unwrap();
        assert_eq!(back, record);
        assert!(back.data["float"].is_f64());
        assert!(back.data["int"].is_u64());
    }

    #[test]
    fn floats_survive_the_json_body() {
        let values = [
            0.9749512713538497,
            0.1 + 0.2,
            std::f64::consts::PI,
            1.0 / 3.0,
            -2.2250738585072014e-308,
            1.7976931348623157e308,
            5e-324,
        ];
        for value in values {
            let record = Record::new(json!({"f": value}), 1);
            let back = Record::from_parts(&record.data_json().unwrap(), 1).unwrap();
            assert_eq!(back.data["f"].as_f64(), Some(value), "value {value:e}");
        }

        // Walk a spread of bit patterns instead of a handful of literals.
        let mut bits: u64 = 0x3fef_3d0e_2f5b_a0c1;
        for _ in 0..10_000 {
            bits = bits.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let value = f64::from_bits(bits);
            if !value.is_finite() {
                continue;
            }
            let record = Record::new(json!([value]), 1);
            let back = Record::from_parts(&record.data_json().unwrap(), 1).unwrap();
            assert_eq!(back, record, "value {value:e}");
        }
    }

    #[test]
    fn corrupt_body_is_serialization_error() {
        let err = Record::from_parts("{not json", 1).unwrap_err();
        assert!(matches!(err, crate::Error::Serialization(_)));
    }
}
