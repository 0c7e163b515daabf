use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use ts_rs::TS;

use crate::error::{AppError, AppResult};
use crate::loader::{ConfigLoader, ConfigSource};
use crate::model::{
    is_valid_category_id, Category, EasterEggSettings, ImageRecord, PortfolioConfig,
    UNCATEGORIZED_ID,
};
use crate::storage::{image_object_key, StorageBridge};
use crate::validate::validate_config;

/// Lifecycle of the in-memory document within one admin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Loading,
    Loaded { dirty: bool },
    Saving,
}

/// Partial update for an image record. `uploadDate` and the global `order`
/// are deliberately absent; the first is immutable, the second only moves
/// through reordering.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ImageUpdate {
    #[ts(optional)]
    pub caption: Option<String>,
    #[ts(optional)]
    pub description: Option<String>,
    #[ts(optional)]
    pub categories: Option<Vec<String>>,
    #[ts(optional)]
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct CategoryUpdate {
    #[ts(optional)]
    pub name: Option<String>,
    #[ts(optional)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct EasterEggUpdate {
    #[ts(optional)]
    pub fireworks_enabled: Option<bool>,
    #[ts(optional)]
    pub christmas_override: Option<bool>,
}

/// Serialises saves within one session: a second save attempt while one is in
/// flight is rejected instead of queued.
struct SaveGuard {
    flag: Arc<AtomicBool>,
}

impl SaveGuard {
    fn begin(flag: Arc<AtomicBool>) -> AppResult<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::new(
                "CONFIG/SAVE_IN_FLIGHT",
                "A save is already in progress for this session.",
            ));
        }
        Ok(Self { flag })
    }
}

impl Drop for SaveGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One admin session's explicit state container around the shared document.
///
/// Owns load, mutate and save; never a process-wide singleton, so multiple
/// sessions and tests run independently. Two sessions racing over the same
/// bucket resolve by last-writer-wins; the store offers whole-object PUT only
/// and no coordination is attempted here.
pub struct ConfigSession {
    loader: ConfigLoader,
    bridge: Arc<dyn StorageBridge>,
    config: Option<PortfolioConfig>,
    state: SessionState,
    save_flag: Arc<AtomicBool>,
}

impl ConfigSession {
    pub fn new(loader: ConfigLoader, bridge: Arc<dyn StorageBridge>) -> Self {
        ConfigSession {
            loader,
            bridge,
            config: None,
            state: SessionState::Unloaded,
            save_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> Option<&PortfolioConfig> {
        self.config.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, SessionState::Loaded { dirty: true })
    }

    /// Fetch and adopt the remote document. Parse and validation failures are
    /// surfaced; the session stays unloaded.
    pub async fn load(&mut self) -> AppResult<&PortfolioConfig> {
        self.state = SessionState::Loading;
        match self.loader.load().await {
            Ok(outcome) => {
                // A defaulted document has never been persisted: first save
                // will create it, so it starts dirty.
                let dirty = outcome.source != ConfigSource::Remote;
                self.config = Some(outcome.config);
                self.state = SessionState::Loaded { dirty };
                Ok(self.config.as_ref().expect("config just set"))
            }
            Err(err) => {
                self.state = SessionState::Unloaded;
                Err(err)
            }
        }
    }

    /// Back to `Unloaded`, dropping the in-memory document.
    pub fn reset(&mut self) {
        self.config = None;
        self.state = SessionState::Unloaded;
    }

    pub async fn test_connection(&self) -> AppResult<bool> {
        Ok(self.bridge.test_connection().await?)
    }

    fn loaded_config(&self) -> AppResult<&PortfolioConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| AppError::new("CONFIG/NOT_LOADED", "No configuration is loaded."))
    }

    fn loaded_config_mut(&mut self) -> AppResult<&mut PortfolioConfig> {
        self.config
            .as_mut()
            .ok_or_else(|| AppError::new("CONFIG/NOT_LOADED", "No configuration is loaded."))
    }

    /// Validate and overwrite the remote document in full. On failure the
    /// in-memory document keeps its mutations and stays dirty; the caller
    /// surfaces the error and may retry manually.
    pub async fn save(&mut self) -> AppResult<()> {
        let _guard = SaveGuard::begin(self.save_flag.clone())?;
        let config = self.loaded_config()?.clone();

        let report = validate_config(&config);
        if !report.is_valid {
            self.state = SessionState::Loaded { dirty: true };
            return Err(AppError::new(
                "CONFIG/VALIDATION",
                "Refusing to save an invalid configuration",
            )
            .with_context("errors", report.errors.join("; ")));
        }

        self.state = SessionState::Saving;
        match self.bridge.upload_configuration(&config).await {
            Ok(()) => {
                self.state = SessionState::Loaded { dirty: false };
                info!(
                    target: "biffcross",
                    event = "config_saved",
                    categories = config.categories.len(),
                    images = config.images.len()
                );
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Loaded { dirty: true };
                warn!(target: "biffcross", event = "config_save_failed", error = %err);
                Err(err.into())
            }
        }
    }

    /// Save, then re-read the remote document and confirm it matches what was
    /// written. Returns whether the re-read matched.
    pub async fn save_and_confirm(&mut self) -> AppResult<bool> {
        self.save().await?;
        let written = self.loaded_config()?.clone();
        let outcome = self.loader.load().await?;
        let confirmed = outcome.source == ConfigSource::Remote && outcome.config == written;
        if !confirmed {
            warn!(target: "biffcross", event = "config_save_confirm_mismatch");
        }
        Ok(confirmed)
    }

    /// Materialise a category that is valid as a reference target but not yet
    /// present in the array. Only the uncategorized sentinel qualifies.
    fn ensure_uncategorized(config: &mut PortfolioConfig) {
        if !config.has_category(UNCATEGORIZED_ID) {
            config.categories.push(Category {
                id: UNCATEGORIZED_ID.to_string(),
                name: "Uncategorized".to_string(),
                description: "Images not assigned to a category".to_string(),
                images: Vec::new(),
            });
        }
    }

    pub async fn add_image(
        &mut self,
        filename: &str,
        categories: Vec<String>,
        caption: Option<String>,
        description: Option<String>,
    ) -> AppResult<PortfolioConfig> {
        {
            let config = self.loaded_config()?;
            if config.images.contains_key(filename) {
                return Err(
                    AppError::new("IMAGE/EXISTS", "An image with this filename already exists")
                        .with_context("filename", filename),
                );
            }
            if categories.is_empty() {
                return Err(AppError::new(
                    "IMAGE/NO_CATEGORY",
                    "An image must belong to at least one category",
                ));
            }
            for id in &categories {
                if !config.is_known_category(id) {
                    return Err(
                        AppError::new("CATEGORY/NOT_FOUND", "Category does not exist")
                            .with_context("id", id.clone()),
                    );
                }
            }
        }

        let config = self.loaded_config_mut()?;
        if categories.iter().any(|id| id == UNCATEGORIZED_ID) {
            Self::ensure_uncategorized(config);
        }

        let order = config.next_global_order();
        let mut record = ImageRecord {
            filename: filename.to_string(),
            caption,
            description,
            categories: categories.clone(),
            category: None,
            order,
            category_orders: Default::default(),
            upload_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
            is_featured: false,
        };
        for id in &categories {
            record
                .category_orders
                .insert(id.clone(), config.next_category_order(id));
        }
        config.images.insert(filename.to_string(), record);
        for id in &categories {
            if let Some(category) = config.category_mut(id) {
                category.images.push(filename.to_string());
            }
        }

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }

    pub async fn update_image(
        &mut self,
        filename: &str,
        updates: ImageUpdate,
    ) -> AppResult<PortfolioConfig> {
        {
            let config = self.loaded_config()?;
            if !config.images.contains_key(filename) {
                return Err(AppError::new("IMAGE/NOT_FOUND", "Image not found")
                    .with_context("filename", filename));
            }
            if let Some(new_categories) = &updates.categories {
                if new_categories.is_empty() {
                    return Err(AppError::new(
                        "IMAGE/NO_CATEGORY",
                        "An image must belong to at least one category",
                    ));
                }
                for id in new_categories {
                    if !config.is_known_category(id) {
                        return Err(
                            AppError::new("CATEGORY/NOT_FOUND", "Category does not exist")
                                .with_context("id", id.clone()),
                        );
                    }
                }
            }
        }

        let config = self.loaded_config_mut()?;
        if let Some(new_categories) = updates.categories {
            if new_categories.iter().any(|id| id == UNCATEGORIZED_ID) {
                Self::ensure_uncategorized(config);
            }

            let old: BTreeSet<String> = config.images[filename].categories.iter().cloned().collect();
            let new: BTreeSet<String> = new_categories.iter().cloned().collect();

            for removed in old.difference(&new) {
                if let Some(category) = config.category_mut(removed) {
                    category.images.retain(|member| member != filename);
                }
            }
            let mut fresh_orders = Vec::new();
            for added in new.difference(&old) {
                fresh_orders.push((added.clone(), config.next_category_order(added)));
                if let Some(category) = config.category_mut(added) {
                    if !category.images.iter().any(|member| member == filename) {
                        category.images.push(filename.to_string());
                    }
                }
            }

            let record = config.images.get_mut(filename).expect("checked above");
            record
                .category_orders
                .retain(|id, _| new.contains(id.as_str()));
            for (id, position) in fresh_orders {
                record.category_orders.insert(id, position);
            }
            record.categories = new_categories;
            // Keep the retained legacy field from dangling.
            if let Some(legacy) = &record.category {
                if !record.categories.iter().any(|id| id == legacy) {
                    record.category = None;
                }
            }
        }

        let record = config.images.get_mut(filename).expect("checked above");
        if let Some(caption) = updates.caption {
            record.caption = if caption.is_empty() { None } else { Some(caption) };
        }
        if let Some(description) = updates.description {
            record.description = if description.is_empty() {
                None
            } else {
                Some(description)
            };
        }
        if let Some(featured) = updates.is_featured {
            record.is_featured = featured;
        }

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }

    pub async fn remove_image(&mut self, filename: &str) -> AppResult<PortfolioConfig> {
        self.remove_images(&[filename.to_string()]).await
    }

    /// Remove images from storage and from the document, blobs first. A
    /// failed blob deletion aborts the whole operation: the document must
    /// never drop a reference whose blob deletion failed silently.
    pub async fn remove_images(&mut self, filenames: &[String]) -> AppResult<PortfolioConfig> {
        {
            let config = self.loaded_config()?;
            for filename in filenames {
                if !config.images.contains_key(filename) {
                    return Err(AppError::new("IMAGE/NOT_FOUND", "Image not found")
                        .with_context("filename", filename.clone()));
                }
            }
        }

        let keys: Vec<String> = filenames.iter().map(|f| image_object_key(f)).collect();
        let outcome = self.bridge.delete_files(&keys).await?;
        if !outcome.all_succeeded() {
            let detail = outcome
                .failed
                .iter()
                .map(|failure| format!("{}: {}", failure.key, failure.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AppError::new(
                "STORAGE/DELETE",
                "One or more image blobs could not be deleted; the document was left unchanged",
            )
            .with_context("failed", detail));
        }

        let config = self.loaded_config_mut()?;
        for filename in filenames {
            config.images.remove(filename);
            for category in &mut config.categories {
                category.images.retain(|member| member != filename);
            }
        }

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }

    /// Replace one category's display order with exactly the given list.
    pub async fn reorder_images_in_category(
        &mut self,
        category_id: &str,
        ordered_filenames: &[String],
    ) -> AppResult<PortfolioConfig> {
        {
            let config = self.loaded_config()?;
            if !config.has_category(category_id) {
                return Err(
                    AppError::new("CATEGORY/NOT_FOUND", "Category does not exist")
                        .with_context("id", category_id),
                );
            }
            for filename in ordered_filenames {
                let Some(record) = config.images.get(filename) else {
                    return Err(AppError::new("IMAGE/NOT_FOUND", "Image not found")
                        .with_context("filename", filename.clone()));
                };
                if !record.categories.iter().any(|id| id == category_id) {
                    return Err(AppError::new(
                        "CATEGORY/MEMBERSHIP",
                        "Image does not belong to this category",
                    )
                    .with_context("filename", filename.clone())
                    .with_context("id", category_id));
                }
            }
        }

        let config = self.loaded_config_mut()?;
        for (index, filename) in ordered_filenames.iter().enumerate() {
            if let Some(record) = config.images.get_mut(filename) {
                record
                    .category_orders
                    .insert(category_id.to_string(), index as u32);
            }
        }
        if let Some(category) = config.category_mut(category_id) {
            category.images = ordered_filenames.to_vec();
        }

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }

    pub async fn add_category(
        &mut self,
        id: &str,
        name: &str,
        description: &str,
    ) -> AppResult<PortfolioConfig> {
        {
            let config = self.loaded_config()?;
            if !is_valid_category_id(id) {
                return Err(AppError::new(
                    "CATEGORY/INVALID_ID",
                    "Category ids are lowercase letters, digits and hyphens",
                )
                .with_context("id", id));
            }
            if config.has_category(id) {
                return Err(
                    AppError::new("CATEGORY/EXISTS", "A category with this id already exists")
                        .with_context("id", id),
                );
            }
            if name.trim().is_empty() || description.trim().is_empty() {
                return Err(AppError::new(
                    "CATEGORY/EMPTY_FIELD",
                    "Category name and description must not be empty",
                ));
            }
        }

        let config = self.loaded_config_mut()?;
        config.categories.push(Category {
            id: id.to_string(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            images: Vec::new(),
        });

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }

    pub async fn update_category(
        &mut self,
        id: &str,
        updates: CategoryUpdate,
    ) -> AppResult<PortfolioConfig> {
        {
            let config = self.loaded_config()?;
            if !config.has_category(id) {
                return Err(
                    AppError::new("CATEGORY/NOT_FOUND", "Category does not exist")
                        .with_context("id", id),
                );
            }
            let empty_after_trim = |value: &Option<String>| {
                value
                    .as_ref()
                    .is_some_and(|v| v.trim().is_empty())
            };
            if empty_after_trim(&updates.name) || empty_after_trim(&updates.description) {
                return Err(AppError::new(
                    "CATEGORY/EMPTY_FIELD",
                    "Category name and description must not be empty",
                ));
            }
        }

        let config = self.loaded_config_mut()?;
        let category = config.category_mut(id).expect("checked above");
        if let Some(name) = updates.name {
            category.name = name.trim().to_string();
        }
        if let Some(description) = updates.description {
            category.description = description.trim().to_string();
        }

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }

    /// Delete a category. Owned images either migrate into the uncategorized
    /// sentinel (materialising it on first use) or simply lose the id.
    pub async fn remove_category(
        &mut self,
        id: &str,
        move_images_to_uncategorized: bool,
    ) -> AppResult<PortfolioConfig> {
        {
            let config = self.loaded_config()?;
            if !config.has_category(id) {
                return Err(
                    AppError::new("CATEGORY/NOT_FOUND", "Category does not exist")
                        .with_context("id", id),
                );
            }
        }

        let reassign = move_images_to_uncategorized && id != UNCATEGORIZED_ID;
        let config = self.loaded_config_mut()?;

        let owned: Vec<String> = config
            .images
            .values()
            .filter(|record| record.categories.iter().any(|c| c == id))
            .map(|record| record.filename.clone())
            .collect();

        if reassign && !owned.is_empty() {
            Self::ensure_uncategorized(config);
        }

        for filename in &owned {
            let next_position = if reassign {
                Some(config.next_category_order(UNCATEGORIZED_ID))
            } else {
                None
            };
            let record = config.images.get_mut(filename).expect("owned image");
            record.categories.retain(|c| c != id);
            record.category_orders.remove(id);
            if record.category.as_deref() == Some(id) {
                record.category = None;
            }
            if reassign {
                if !record.categories.iter().any(|c| c == UNCATEGORIZED_ID) {
                    record.categories.push(UNCATEGORIZED_ID.to_string());
                    if let Some(position) = next_position {
                        record
                            .category_orders
                            .insert(UNCATEGORIZED_ID.to_string(), position);
                    }
                }
                if let Some(category) = config.category_mut(UNCATEGORIZED_ID) {
                    if !category.images.iter().any(|member| member == filename) {
                        category.images.push(filename.clone());
                    }
                }
            }
        }

        config.categories.retain(|category| category.id != id);

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }

    /// Shallow-merge into the easter egg settings. Always succeeds once a
    /// document is loaded.
    pub async fn update_easter_egg_settings(
        &mut self,
        updates: EasterEggUpdate,
    ) -> AppResult<PortfolioConfig> {
        let config = self.loaded_config_mut()?;
        let current = config.easter_eggs;
        config.easter_eggs = EasterEggSettings {
            fireworks_enabled: updates.fireworks_enabled.unwrap_or(current.fireworks_enabled),
            christmas_override: updates
                .christmas_override
                .unwrap_or(current.christmas_override),
        };

        self.state = SessionState::Loaded { dirty: true };
        self.save().await?;
        Ok(self.loaded_config()?.clone())
    }
}
