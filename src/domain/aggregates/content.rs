//! Storefront content: curated collections and the best-seller shelf

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Slug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub banner_image: Option<String>,
    pub product_ids: Vec<Uuid>,
    pub position: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn create(name: &str, description: &str, banner_image: Option<String>, product_ids: Vec<Uuid>, position: i32, active: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.trim().to_string(), slug: Slug::from_name(name).into_string(),
            description: description.to_string(), banner_image, product_ids: dedup_keep_order(product_ids),
            position, active, created_at: now, updated_at: now,
        }
    }

    pub fn set_products(&mut self, product_ids: Vec<Uuid>) {
        self.product_ids = dedup_keep_order(product_ids);
        self.updated_at = Utc::now();
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.slug = Slug::from_name(name).into_string();
        self.updated_at = Utc::now();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestSeller { pub product_id: Uuid, pub rank: u32 }

/// Builds a ranking from an ordered list of product ids (first = rank 1).
pub fn rank(product_ids: Vec<Uuid>) -> Vec<BestSeller> {
    dedup_keep_order(product_ids).into_iter().enumerate()
        .map(|(i, product_id)| BestSeller { product_id, rank: i as u32 + 1 })
        .collect()
}

fn dedup_keep_order(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_dedups_in_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ranking = rank(vec![a, b, a]);
        assert_eq!(ranking, vec![BestSeller { product_id: a, rank: 1 }, BestSeller { product_id: b, rank: 2 }]);
    }

    #[test]
    fn test_collection_slug() {
        let c = Collection::create("Monsoon Picks", "", None, vec![], 0, true);
        assert_eq!(c.slug, "monsoon-picks");
    }
}
