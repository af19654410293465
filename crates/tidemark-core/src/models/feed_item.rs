use serde_json::{Map, Value};

/// One entry in a live feed.
///
/// `created_at` is the sole ordering key (epoch milliseconds); it may
/// collide across items. The payload carries collection-specific scalar
/// fields and is opaque to the sync layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: String,
    pub created_at: u64,
    pub payload: Map<String, Value>,
}

impl FeedItem {
    /// Create a FeedItem from a raw transport record.
    ///
    /// Records are loosely-typed JSON objects; all coercion happens here
    /// rather than in consumers:
    /// - `id` must be a non-empty string, otherwise the record is dropped
    /// - missing or non-numeric `createdAt` defaults to ingestion time
    /// - non-scalar payload fields are dropped
    pub fn from_record(record: &Value) -> Option<Self> {
        let obj = record.as_object()?;

        let id = obj.get("id").and_then(Value::as_str)?;
        if id.is_empty() {
            return None;
        }

        let created_at = obj
            .get("createdAt")
            .and_then(Value::as_u64)
            .unwrap_or_else(now_ms);

        let mut payload = Map::new();
        for (key, value) in obj {
            if key == "id" || key == "createdAt" {
                continue;
            }
            if is_scalar(value) {
                payload.insert(key.clone(), value.clone());
            }
        }

        Some(Self {
            id: id.to_string(),
            created_at,
            payload,
        })
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_record_basic() {
        let record = json!({
            "id": "abc",
            "createdAt": 1700000000000u64,
            "name": "deck repair",
            "status": "new",
            "priority": 3,
        });

        let item = FeedItem::from_record(&record).expect("record should parse");
        assert_eq!(item.id, "abc");
        assert_eq!(item.created_at, 1700000000000);
        assert_eq!(item.payload.get("name"), Some(&json!("deck repair")));
        assert_eq!(item.payload.get("priority"), Some(&json!(3)));
    }

    #[test]
    fn test_from_record_missing_id_is_dropped() {
        assert!(FeedItem::from_record(&json!({ "createdAt": 5 })).is_none());
        assert!(FeedItem::from_record(&json!({ "id": "", "createdAt": 5 })).is_none());
        assert!(FeedItem::from_record(&json!("not an object")).is_none());
    }

    #[test]
    fn test_from_record_missing_created_at_defaults_to_now() {
        let before = now_ms();
        let item = FeedItem::from_record(&json!({ "id": "x" })).unwrap();
        assert!(item.created_at >= before);
        assert!(item.created_at <= now_ms());
    }

    #[test]
    fn test_from_record_drops_non_scalar_fields() {
        let record = json!({
            "id": "x",
            "createdAt": 10,
            "kept": "yes",
            "nested": { "a": 1 },
            "list": [1, 2, 3],
        });

        let item = FeedItem::from_record(&record).unwrap();
        assert!(item.payload.contains_key("kept"));
        assert!(!item.payload.contains_key("nested"));
        assert!(!item.payload.contains_key("list"));
    }
}
