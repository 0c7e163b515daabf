use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use ts_rs::TS;

use crate::model::{is_valid_category_id, PortfolioConfig, UNCATEGORIZED_ID};

/// Outcome of a structural validation pass. Collects every violation rather
/// than stopping at the first so callers can present a complete report.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn upload_date_parses(raw: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

/// Validate a candidate configuration document.
///
/// Pure over the candidate; never panics on malformed input. Run both before
/// accepting a freshly loaded remote document and before every save.
pub fn validate_document(doc: &Value) -> ValidationReport {
    let mut errors: Vec<String> = Vec::new();

    let Some(root) = doc.as_object() else {
        return ValidationReport::from_errors(vec![
            "configuration root must be a JSON object".to_string()
        ]);
    };

    match root.get("site") {
        Some(Value::Object(site)) => {
            if non_empty_str(site.get("title")).is_none() {
                errors.push("site.title must be a non-empty string".to_string());
            }
            if non_empty_str(site.get("description")).is_none() {
                errors.push("site.description must be a non-empty string".to_string());
            }
            if site.get("instagram").and_then(Value::as_str).is_none() {
                errors.push("site.instagram must be a string".to_string());
            }
        }
        Some(_) => errors.push("site must be an object".to_string()),
        None => errors.push("site section is missing".to_string()),
    }

    if let Some(value) = root.get("easterEggs") {
        if !value.is_object() {
            errors.push("easterEggs must be an object".to_string());
        }
    }

    let image_keys: HashSet<&str> = root
        .get("images")
        .and_then(Value::as_object)
        .map(|images| images.keys().map(String::as_str).collect())
        .unwrap_or_default();

    let mut category_ids: HashSet<&str> = HashSet::new();
    match root.get("categories") {
        Some(Value::Array(categories)) => {
            for (idx, entry) in categories.iter().enumerate() {
                let Some(category) = entry.as_object() else {
                    errors.push(format!("categories[{idx}] must be an object"));
                    continue;
                };
                let label = category
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("<missing id>");
                match category.get("id").and_then(Value::as_str) {
                    Some(id) if is_valid_category_id(id) => {
                        if !category_ids.insert(id) {
                            errors.push(format!("category id \"{id}\" is duplicated"));
                        }
                    }
                    Some(id) => errors.push(format!(
                        "category id \"{id}\" must match [a-z0-9-]+ in lowercase"
                    )),
                    None => errors.push(format!("categories[{idx}] is missing an id")),
                }
                if non_empty_str(category.get("name")).is_none() {
                    errors.push(format!("category \"{label}\" name must be a non-empty string"));
                }
                if non_empty_str(category.get("description")).is_none() {
                    errors.push(format!(
                        "category \"{label}\" description must be a non-empty string"
                    ));
                }
                match category.get("images") {
                    Some(Value::Array(members)) => {
                        for member in members {
                            match member.as_str() {
                                Some(filename) if image_keys.contains(filename) => {}
                                Some(filename) => errors.push(format!(
                                    "category \"{label}\" lists image \"{filename}\" which has no record in images"
                                )),
                                None => errors.push(format!(
                                    "category \"{label}\" images entries must be filename strings"
                                )),
                            }
                        }
                    }
                    Some(_) => {
                        errors.push(format!("category \"{label}\" images must be an array"))
                    }
                    None => {}
                }
            }
        }
        Some(_) => errors.push("categories must be an array".to_string()),
        None => errors.push("categories section is missing".to_string()),
    }

    match root.get("images") {
        Some(Value::Object(images)) => {
            for (key, entry) in images {
                let Some(record) = entry.as_object() else {
                    errors.push(format!("image \"{key}\" must be an object"));
                    continue;
                };

                match record.get("filename").and_then(Value::as_str) {
                    Some(filename) if filename == key => {}
                    Some(filename) => errors.push(format!(
                        "image \"{key}\" filename field \"{filename}\" does not match its key"
                    )),
                    None => errors.push(format!("image \"{key}\" is missing its filename field")),
                }

                let categories_ok = matches!(
                    record.get("categories"),
                    Some(Value::Array(list)) if !list.is_empty()
                );
                let legacy_ok = non_empty_str(record.get("category")).is_some();
                if !categories_ok && !legacy_ok {
                    errors.push(format!(
                        "image \"{key}\" must carry a non-empty categories array or a legacy category"
                    ));
                }

                if let Some(Value::Array(list)) = record.get("categories") {
                    for reference in list {
                        match reference.as_str() {
                            Some(UNCATEGORIZED_ID) => {}
                            Some(id) if category_ids.contains(id) => {}
                            Some(id) => errors.push(format!(
                                "image \"{key}\" references unknown category \"{id}\""
                            )),
                            None => errors.push(format!(
                                "image \"{key}\" categories entries must be strings"
                            )),
                        }
                    }
                }
                if let Some(legacy) = non_empty_str(record.get("category")) {
                    if legacy != UNCATEGORIZED_ID && !category_ids.contains(legacy) {
                        errors.push(format!(
                            "image \"{key}\" references unknown category \"{legacy}\""
                        ));
                    }
                }

                match record.get("order") {
                    Some(value) if value.as_u64().is_some() => {}
                    Some(_) => errors.push(format!(
                        "image \"{key}\" order must be a non-negative integer"
                    )),
                    None => errors.push(format!("image \"{key}\" is missing order")),
                }

                if let Some(Value::Object(orders)) = record.get("categoryOrders") {
                    for (category, position) in orders {
                        if position.as_u64().is_none() {
                            errors.push(format!(
                                "image \"{key}\" categoryOrders[\"{category}\"] must be a non-negative integer"
                            ));
                        }
                    }
                }

                match record.get("uploadDate").and_then(Value::as_str) {
                    Some(raw) if upload_date_parses(raw) => {}
                    Some(raw) => errors.push(format!(
                        "image \"{key}\" uploadDate \"{raw}\" is not a valid ISO-8601 date"
                    )),
                    None => errors.push(format!("image \"{key}\" is missing uploadDate")),
                }
            }
        }
        Some(_) => errors.push("images must be an object keyed by filename".to_string()),
        None => errors.push("images section is missing".to_string()),
    }

    ValidationReport::from_errors(errors)
}

/// Validate a typed configuration, e.g. before a save.
pub fn validate_config(config: &PortfolioConfig) -> ValidationReport {
    match serde_json::to_value(config) {
        Ok(doc) => validate_document(&doc),
        Err(err) => ValidationReport::from_errors(vec![format!(
            "configuration could not be serialized: {err}"
        )]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_config;
    use serde_json::json;

    #[test]
    fn default_document_is_valid() {
        let report = validate_config(&default_config());
        assert!(report.is_valid, "default config invalid: {:?}", report.errors);
    }

    #[test]
    fn non_object_root_is_one_clear_error() {
        let report = validate_document(&json!([1, 2, 3]));
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn uncategorized_is_valid_without_array_membership() {
        let doc = json!({
            "site": { "title": "t", "description": "d", "instagram": "https://instagram.com/x" },
            "categories": [],
            "images": {
                "a.jpg": {
                    "filename": "a.jpg",
                    "categories": ["uncategorized"],
                    "order": 0,
                    "uploadDate": "2024-05-01",
                    "is_featured": false
                }
            }
        });
        let report = validate_document(&doc);
        assert!(report.is_valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn filename_key_mismatch_is_reported() {
        let doc = json!({
            "site": { "title": "t", "description": "d", "instagram": "i" },
            "categories": [],
            "images": {
                "a.jpg": {
                    "filename": "b.jpg",
                    "categories": ["uncategorized"],
                    "order": 0,
                    "uploadDate": "2024-05-01",
                    "is_featured": false
                }
            }
        });
        let report = validate_document(&doc);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("does not match its key")));
    }

    #[test]
    fn negative_order_is_rejected() {
        let doc = json!({
            "site": { "title": "t", "description": "d", "instagram": "i" },
            "categories": [],
            "images": {
                "a.jpg": {
                    "filename": "a.jpg",
                    "categories": ["uncategorized"],
                    "order": -4,
                    "uploadDate": "2024-05-01",
                    "is_featured": false
                }
            }
        });
        let report = validate_document(&doc);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("non-negative integer")));
    }
}
