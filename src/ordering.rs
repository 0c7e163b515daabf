use crate::model::{ImageRecord, PortfolioConfig};

/// Images belonging to `category_id`, in display order: the per-category
/// override wins over the global `order`, filename breaks ties.
pub fn images_in_category<'a>(
    config: &'a PortfolioConfig,
    category_id: &str,
) -> Vec<&'a ImageRecord> {
    let mut members: Vec<&ImageRecord> = config
        .images
        .values()
        .filter(|record| record.categories.iter().any(|id| id == category_id))
        .collect();
    members.sort_by(|a, b| {
        a.order_in(category_id)
            .cmp(&b.order_in(category_id))
            .then_with(|| a.filename.cmp(&b.filename))
    });
    members
}

/// The home-page view: featured images in global order.
pub fn featured_images(config: &PortfolioConfig) -> Vec<&ImageRecord> {
    let mut featured: Vec<&ImageRecord> = config
        .images
        .values()
        .filter(|record| record.is_featured)
        .collect();
    featured.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.filename.cmp(&b.filename)));
    featured
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{default_config, ImageRecord};
    use std::collections::BTreeMap;

    fn image(filename: &str, category: &str, order: u32, override_pos: Option<u32>) -> ImageRecord {
        let mut category_orders = BTreeMap::new();
        if let Some(pos) = override_pos {
            category_orders.insert(category.to_string(), pos);
        }
        ImageRecord {
            filename: filename.to_string(),
            caption: None,
            description: None,
            categories: vec![category.to_string()],
            category: None,
            order,
            category_orders,
            upload_date: "2024-01-01".to_string(),
            is_featured: false,
        }
    }

    #[test]
    fn category_override_beats_global_order() {
        let mut config = default_config();
        config
            .images
            .insert("a.jpg".into(), image("a.jpg", "sports", 0, Some(2)));
        config
            .images
            .insert("b.jpg".into(), image("b.jpg", "sports", 1, Some(0)));
        config
            .images
            .insert("c.jpg".into(), image("c.jpg", "sports", 2, Some(1)));

        let ordered: Vec<&str> = images_in_category(&config, "sports")
            .iter()
            .map(|record| record.filename.as_str())
            .collect();
        assert_eq!(ordered, vec!["b.jpg", "c.jpg", "a.jpg"]);
    }

    #[test]
    fn global_order_is_the_fallback() {
        let mut config = default_config();
        config
            .images
            .insert("a.jpg".into(), image("a.jpg", "music", 5, None));
        config
            .images
            .insert("b.jpg".into(), image("b.jpg", "music", 1, None));

        let ordered: Vec<&str> = images_in_category(&config, "music")
            .iter()
            .map(|record| record.filename.as_str())
            .collect();
        assert_eq!(ordered, vec!["b.jpg", "a.jpg"]);
    }

    #[test]
    fn featured_view_only_includes_flagged_images() {
        let mut config = default_config();
        let mut flagged = image("a.jpg", "sports", 1, None);
        flagged.is_featured = true;
        config.images.insert("a.jpg".into(), flagged);
        config
            .images
            .insert("b.jpg".into(), image("b.jpg", "sports", 0, None));

        let featured: Vec<&str> = featured_images(&config)
            .iter()
            .map(|record| record.filename.as_str())
            .collect();
        assert_eq!(featured, vec!["a.jpg"]);
    }
}
