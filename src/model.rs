use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Fixed object key of the shared configuration document at the bucket root.
pub const CONFIG_FILE_NAME: &str = "portfolio-config.json";

/// Well-known sentinel category. Always a valid reference target even when it
/// has not been materialised into the `categories` array yet.
pub const UNCATEGORIZED_ID: &str = "uncategorized";

static CATEGORY_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Lowercase slug check for category ids.
pub fn is_valid_category_id(id: &str) -> bool {
    CATEGORY_ID_RE.is_match(id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct SiteSettings {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instagram: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Display order of the member images. Derived state; the `images` map is
    /// the source of truth for membership.
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ImageRecord {
    /// Must equal the key this record is stored under in `images`.
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Legacy single-category field. Retained on write for older readers;
    /// never consulted after migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub category: Option<String>,
    /// Global ordering fallback.
    #[serde(default)]
    #[ts(type = "number")]
    pub order: u32,
    /// Per-category ordering override. Takes precedence over `order` within
    /// the named category.
    #[serde(
        rename = "categoryOrders",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    #[ts(type = "Record<string, number>")]
    pub category_orders: BTreeMap<String, u32>,
    /// ISO-8601 date string, immutable after creation.
    #[serde(rename = "uploadDate", default)]
    pub upload_date: String,
    #[serde(default)]
    pub is_featured: bool,
}

impl ImageRecord {
    /// Effective position of this image within `category_id`.
    pub fn order_in(&self, category_id: &str) -> u32 {
        self.category_orders
            .get(category_id)
            .copied()
            .unwrap_or(self.order)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct EasterEggSettings {
    #[serde(rename = "fireworksEnabled", default)]
    pub fireworks_enabled: bool,
    #[serde(rename = "christmasOverride", default)]
    pub christmas_override: bool,
}

impl Default for EasterEggSettings {
    fn default() -> Self {
        EasterEggSettings {
            fireworks_enabled: false,
            christmas_override: false,
        }
    }
}

/// The single shared document both the public site and the admin app operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct PortfolioConfig {
    pub site: SiteSettings,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub images: BTreeMap<String, ImageRecord>,
    #[serde(rename = "easterEggs", default)]
    pub easter_eggs: EasterEggSettings,
}

impl PortfolioConfig {
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn category_mut(&mut self, id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == id)
    }

    pub fn has_category(&self, id: &str) -> bool {
        self.category(id).is_some()
    }

    /// Whether `id` is acceptable as a reference target from an image record.
    /// The uncategorized sentinel never has to appear in `categories`.
    pub fn is_known_category(&self, id: &str) -> bool {
        id == UNCATEGORIZED_ID || self.has_category(id)
    }

    /// Next free global order, max existing + 1.
    pub fn next_global_order(&self) -> u32 {
        self.images
            .values()
            .map(|img| img.order)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Next free per-category order, max existing + 1 scoped to `category_id`.
    pub fn next_category_order(&self, category_id: &str) -> u32 {
        self.images
            .values()
            .filter(|img| img.categories.iter().any(|c| c == category_id))
            .filter_map(|img| img.category_orders.get(category_id).copied())
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Serialize the way the document is stored: UTF-8, 2-space indent.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn seed_category(id: &str, name: &str, description: &str) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        images: Vec::new(),
    }
}

/// The built-in default document. Used when no remote document exists yet and
/// as the repair payload. Must always pass validation.
pub fn default_config() -> PortfolioConfig {
    PortfolioConfig {
        site: SiteSettings {
            title: "Biff Cross Photography".to_string(),
            description: "Professional photography portfolio".to_string(),
            instagram: "https://www.instagram.com/biffcrossphotography".to_string(),
            domain: None,
            email: None,
        },
        categories: vec![
            seed_category("sports", "Sports", "Sports photography"),
            seed_category("music", "Music", "Live music and performance"),
            seed_category("portraiture", "Portraiture", "Portrait sessions"),
            seed_category("analogue", "Analogue", "Film photography"),
            seed_category("editorial", "Editorial", "Editorial and commissioned work"),
        ],
        images: BTreeMap::new(),
        easter_eggs: EasterEggSettings::default(),
    }
}
