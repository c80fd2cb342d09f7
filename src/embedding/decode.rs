//! Response-shape normalisation for the embedding providers.
//!
//! Local model servers disagree on where the vectors live:
//!
//! ```text
//! [ {"embedding": [..]}, .. ]          bare array of objects
//! [ [..], [..] ]                       bare array of vectors
//! {"embedding": [ [..], [..] ]}        envelope under `embedding`
//! {"vector": [ [..], [..] ]}           envelope under `vector`
//! {"data": [ {"embedding": [..]} ]}    OpenAI-style envelope
//! {"embeddings": [ [..], [..] ]}       Ollama-style envelope
//! ```
//!
//! The cloud endpoint always answers `{"result": {"data": [[..], ..]}}`.

use serde_json::Value;

use super::EmbeddingError;

/// Outcome of reading one input's vector out of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorLookup {
    Found(Vec<f32>),
    /// The response has no item (or no vector field) at this index.
    Missing,
    /// Something is there, but it is not a non-empty array of numbers.
    NotNumeric,
}

const LOCAL_ENVELOPE_FIELDS: &[&str] = &["embedding", "vector", "data", "embeddings"];
const LOCAL_ITEM_FIELDS: &[&str] = &["embedding", "vector", "data"];

/// Locate the item array of a local-provider response.
pub fn local_items(body: &Value) -> Result<&[Value], EmbeddingError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(map) => LOCAL_ENVELOPE_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_array))
            .map(Vec::as_slice)
            .ok_or_else(|| {
                EmbeddingError::Malformed(
                    "local response has no `embedding`, `vector`, `data` or `embeddings` array".to_string(),
                )
            }),
        _ => Err(EmbeddingError::Malformed(
            "local response is neither an array nor an object".to_string(),
        )),
    }
}

/// Locate `result.data` of a cloud response.
pub fn cloud_items(body: &Value) -> Result<&[Value], EmbeddingError> {
    body.get("result")
        .and_then(|r| r.get("data"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| EmbeddingError::Malformed("result.data is not an array".to_string()))
}

/// Read the vector of one local-provider item.
pub fn local_vector(item: Option<&Value>) -> VectorLookup {
    match item {
        None | Some(Value::Null) => VectorLookup::Missing,
        Some(Value::Array(values)) => numeric(values),
        Some(Value::Object(map)) => match LOCAL_ITEM_FIELDS.iter().find_map(|f| map.get(*f)) {
            Some(Value::Array(values)) => numeric(values),
            Some(_) => VectorLookup::NotNumeric,
            None => VectorLookup::Missing,
        },
        Some(_) => VectorLookup::NotNumeric,
    }
}

/// Read the vector of one cloud item, which is always a bare array.
pub fn cloud_vector(item: Option<&Value>) -> VectorLookup {
    match item {
        None | Some(Value::Null) => VectorLookup::Missing,
        Some(Value::Array(values)) => numeric(values),
        Some(_) => VectorLookup::NotNumeric,
    }
}

fn numeric(values: &[Value]) -> VectorLookup {
    if values.is_empty() {
        return VectorLookup::NotNumeric;
    }
    values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .map(VectorLookup::Found)
        .unwrap_or(VectorLookup::NotNumeric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_envelopes() {
        let bare = json!([{"embedding": [1.0]}]);
        assert_eq!(local_items(&bare).unwrap().len(), 1);

        let openai = json!({"data": [{"embedding": [1.0]}, {"embedding": [2.0]}]});
        assert_eq!(local_items(&openai).unwrap().len(), 2);

        let ollama = json!({"model": "m", "embeddings": [[1.0, 2.0]]});
        assert_eq!(local_items(&ollama).unwrap().len(), 1);

        let by_embedding = json!({"embedding": [[0.1, 0.2], [0.3, 0.4]]});
        let items = local_items(&by_embedding).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            local_vector(items.first()),
            VectorLookup::Found(vec![0.1, 0.2])
        );

        let by_vector = json!({"vector": [[0.5, 0.6]]});
        let items = local_items(&by_vector).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(local_vector(items.first()), VectorLookup::Found(vec![0.5, 0.6]));

        // `embedding` wins over `data` when both are arrays.
        let both = json!({"embedding": [[1.0]], "data": [[2.0], [3.0]]});
        assert_eq!(local_items(&both).unwrap().len(), 1);

        assert!(matches!(
            local_items(&json!({"vectors": []})),
            Err(EmbeddingError::Malformed(_))
        ));
        assert!(local_items(&json!("nope")).is_err());
    }

    #[test]
    fn test_local_item_field_fallback() {
        let by_embedding = json!({"embedding": [0.5, 1.0], "vector": [9.0]});
        assert_eq!(
            local_vector(Some(&by_embedding)),
            VectorLookup::Found(vec![0.5, 1.0])
        );
        let by_vector = json!({"vector": [2.0]});
        assert_eq!(local_vector(Some(&by_vector)), VectorLookup::Found(vec![2.0]));
        let by_data = json!({"index": 0, "data": [3.0]});
        assert_eq!(local_vector(Some(&by_data)), VectorLookup::Found(vec![3.0]));
        let bare = json!([4, 5]);
        assert_eq!(local_vector(Some(&bare)), VectorLookup::Found(vec![4.0, 5.0]));
    }

    #[test]
    fn test_local_item_failures() {
        assert_eq!(local_vector(None), VectorLookup::Missing);
        assert_eq!(local_vector(Some(&json!({"index": 0}))), VectorLookup::Missing);
        assert_eq!(
            local_vector(Some(&json!({"embedding": "base64=="}))),
            VectorLookup::NotNumeric
        );
        assert_eq!(
            local_vector(Some(&json!({"embedding": [1.0, "x"]}))),
            VectorLookup::NotNumeric
        );
        assert_eq!(local_vector(Some(&json!([]))), VectorLookup::NotNumeric);
    }

    #[test]
    fn test_cloud_shape() {
        let ok = json!({"success": true, "result": {"shape": [2, 2], "data": [[1, 0], [0, 1]]}});
        let items = cloud_items(&ok).unwrap();
        assert_eq!(cloud_vector(items.get(1)), VectorLookup::Found(vec![0.0, 1.0]));
        assert_eq!(cloud_vector(items.get(2)), VectorLookup::Missing);

        let bad = json!({"result": {"data": "oops"}});
        assert!(matches!(
            cloud_items(&bad),
            Err(EmbeddingError::Malformed(_))
        ));
        assert_eq!(
            cloud_vector(Some(&json!({"embedding": [1]}))),
            VectorLookup::NotNumeric
        );
    }
}
