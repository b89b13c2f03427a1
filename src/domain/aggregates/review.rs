//! Review Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub customer_id: Uuid,
    pub author: String,
    pub rating: u8,
    pub title: String,
    pub body: String,
    pub verified_purchase: bool,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn create(
        product_id: Uuid, customer_id: Uuid, author: &str, rating: u8, title: &str, body: &str, verified_purchase: bool,
    ) -> Result<Self, ReviewError> {
        if !(1..=5).contains(&rating) { return Err(ReviewError::RatingOutOfRange(rating)); }
        let body = body.trim();
        if body.is_empty() { return Err(ReviewError::EmptyBody); }
        Ok(Self {
            id: Uuid::now_v7(), product_id, customer_id, author: first_name(author),
            rating, title: title.trim().to_string(), body: body.to_string(), verified_purchase,
            created_at: Utc::now(),
        })
    }
}

/// Reviews show the author's first name only.
fn first_name(full: &str) -> String {
    full.split_whitespace().next().unwrap_or("Customer").to_string()
}

/// Mean of ratings rounded to one decimal place; zero when there are none.
pub fn average_rating(ratings: impl IntoIterator<Item = u8>) -> (f64, u32) {
    let (sum, count) = ratings.into_iter().fold((0u32, 0u32), |(s, c), r| (s + r as u32, c + 1));
    if count == 0 { return (0.0, 0); }
    (((sum as f64 / count as f64) * 10.0).round() / 10.0, count)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ReviewError { RatingOutOfRange(u8), EmptyBody }
impl std::error::Error for ReviewError {}
impl std::fmt::Display for ReviewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RatingOutOfRange(r) => write!(f, "Rating must be between 1 and 5, got {}", r),
            Self::EmptyBody => write!(f, "Review text is required"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_rules() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(Review::create(p, c, "A", 0, "", "ok", false), Err(ReviewError::RatingOutOfRange(0)));
        assert_eq!(Review::create(p, c, "A", 4, "", "   ", false), Err(ReviewError::EmptyBody));
        let r = Review::create(p, c, "Asha Rao", 5, " Great ", "Comfy", true).unwrap();
        assert_eq!(r.author, "Asha");
        assert_eq!(r.title, "Great");
    }

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating([]), (0.0, 0));
        assert_eq!(average_rating([5, 4, 4]), (4.3, 3));
    }
}
