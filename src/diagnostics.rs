use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use ts_rs::TS;

use crate::loader::{ConfigFetcher, LoaderSettings};
use crate::migrate;
use crate::model::default_config;
use crate::storage::StorageBridge;
use crate::validate::validate_document;

/// What a failed load actually looks like from the outside: unreachable,
/// missing, broken bytes, or well-formed JSON that fails the schema.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ConfigDiagnostics {
    pub accessible: bool,
    pub has_valid_json: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub json_error: Option<String>,
    #[ts(type = "number")]
    pub content_length: u64,
    pub suggestions: Vec<String>,
}

fn excerpt_around(body: &str, line: usize, column: usize) -> Option<String> {
    let target = body.lines().nth(line.checked_sub(1)?)?;
    let chars: Vec<char> = target.chars().collect();
    let col = column.saturating_sub(1).min(chars.len());
    let start = col.saturating_sub(20);
    let end = (col + 20).min(chars.len());
    Some(chars[start..end].iter().collect())
}

/// Secondary path after a primary load failure: fetch the raw remote bytes
/// and classify what is wrong with them.
pub async fn diagnose(
    fetcher: &dyn ConfigFetcher,
    settings: &LoaderSettings,
) -> ConfigDiagnostics {
    let url = settings.document_url();
    let mut report = ConfigDiagnostics {
        accessible: false,
        has_valid_json: false,
        json_error: None,
        content_length: 0,
        suggestions: Vec::new(),
    };

    let response = match fetcher.fetch(&url).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                target: "biffcross",
                event = "config_diagnose_unreachable",
                url = %url,
                error = %err
            );
            report.suggestions.push(format!(
                "Storage is unreachable ({err}). Check network access and the bucket base URL."
            ));
            return report;
        }
    };

    if response.status == 404 {
        report.suggestions.push(
            "No configuration document exists yet. The loader serves defaults; \
             the first admin save will create it."
                .to_string(),
        );
        return report;
    }
    if !response.is_success() {
        report.suggestions.push(format!(
            "Storage answered HTTP {} for {}. Check bucket permissions and the configured path.",
            response.status, url
        ));
        return report;
    }

    report.accessible = true;
    report.content_length = response.body.len() as u64;

    let parsed: Result<Value, serde_json::Error> = serde_json::from_str(&response.body);
    match parsed {
        Err(err) => {
            let mut detail = format!(
                "JSON syntax error at line {}, column {}: {err}",
                err.line(),
                err.column()
            );
            if let Some(excerpt) = excerpt_around(&response.body, err.line(), err.column()) {
                detail.push_str(&format!(" (near \"{excerpt}\")"));
            }
            report.json_error = Some(detail);
            report.suggestions.push(
                "The remote document is not valid JSON. Run repair to overwrite it with a \
                 clean default document (destructive), or fix the file by hand."
                    .to_string(),
            );
        }
        Ok(raw) => {
            report.has_valid_json = true;
            let validation = validate_document(&migrate::migrate(raw));
            if validation.is_valid {
                report
                    .suggestions
                    .push("The remote document parses and validates. If loads still fail, check for caching in front of the bucket.".to_string());
            } else {
                report.suggestions.push(format!(
                    "The document is well-formed JSON but fails schema validation ({} problems).",
                    validation.errors.len()
                ));
                report.suggestions.extend(validation.errors);
            }
        }
    }

    report
}

/// Overwrite the remote document with a fresh default.
///
/// Destructive and data-losing on purpose: last-resort recovery so a corrupt
/// remote file can never lock the admin app out permanently. Returns whether
/// the write went through.
pub async fn repair(bridge: &dyn StorageBridge) -> bool {
    let fresh = default_config();
    debug_assert!(validate_document(
        &serde_json::to_value(&fresh).expect("default config serializes")
    )
    .is_valid);

    match bridge.upload_configuration(&fresh).await {
        Ok(()) => {
            info!(target: "biffcross", event = "config_repaired");
            true
        }
        Err(err) => {
            warn!(
                target: "biffcross",
                event = "config_repair_failed",
                error = %err
            );
            false
        }
    }
}
