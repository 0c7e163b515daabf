use serde_json::Value;
use tracing::info;

/// Whether every image record already carries the current-shape fields.
///
/// A document counts as migrated only when **all** records have a
/// `categories` array and a defined `is_featured`; a single legacy record
/// sends the whole map through migration.
pub fn is_migrated(doc: &Value) -> bool {
    let Some(images) = doc.get("images").and_then(Value::as_object) else {
        return true;
    };
    images.values().all(|record| {
        let has_categories = record.get("categories").is_some_and(|v| !v.is_null());
        let has_featured = record.get("is_featured").is_some_and(|v| !v.is_null());
        has_categories && has_featured
    })
}

/// Upgrade a legacy document shape to the current one.
///
/// Per-record only: a singular `category` is copied into `categories`
/// (the legacy field stays for older readers) and a missing `is_featured`
/// becomes `false`. Category membership arrays and `order` fields are
/// never touched. Idempotent.
pub fn migrate(mut doc: Value) -> Value {
    if is_migrated(&doc) {
        return doc;
    }

    let mut migrated_records = 0usize;
    if let Some(images) = doc.get_mut("images").and_then(Value::as_object_mut) {
        for record in images.values_mut() {
            let Some(fields) = record.as_object_mut() else {
                continue;
            };
            let mut touched = false;

            let missing_categories = fields
                .get("categories")
                .map_or(true, |v| v.is_null());
            if missing_categories {
                if let Some(single) = fields
                    .get("category")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                {
                    fields.insert("categories".into(), Value::Array(vec![single.into()]));
                    touched = true;
                }
            }

            let missing_featured = fields
                .get("is_featured")
                .map_or(true, |v| v.is_null());
            if missing_featured {
                fields.insert("is_featured".into(), Value::Bool(false));
                touched = true;
            }

            if touched {
                migrated_records += 1;
            }
        }
    }

    if migrated_records > 0 {
        info!(
            target: "biffcross",
            event = "config_migrated",
            records = migrated_records
        );
    }
    doc
}
