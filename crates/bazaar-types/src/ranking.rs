//! Listing order shared by the database listing and re-ranked search hits.
//!
//! Actively topped ads come first. Ties are broken by the latest promotion
//! expiry (ads never topped sort after ones that were), then by newest
//! creation time.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::Ad;

pub fn cmp_ads(a: &Ad, b: &Ad, now: DateTime<Utc>) -> Ordering {
    b.is_top_active(now)
        .cmp(&a.is_top_active(now))
        // Option orders None < Some, so reversing puts missing expiry last.
        .then_with(|| b.topped_expires_at.cmp(&a.topped_expires_at))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Stable sort into listing order.
pub fn rank_ads(ads: &mut [Ad], now: DateTime<Utc>) {
    ads.sort_by(|a, b| cmp_ads(a, b, now));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn ad(
        title: &str,
        created_mins_ago: i64,
        expires_in_hours: Option<i64>,
        now: DateTime<Utc>,
    ) -> Ad {
        Ad {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            price: None,
            category: None,
            image_urls: vec![],
            animation_url: None,
            created_at: now - Duration::minutes(created_mins_ago),
            is_topped: expires_in_hours.is_some(),
            topped_expires_at: expires_in_hours.map(|h| now + Duration::hours(h)),
        }
    }

    fn titles(ads: &[Ad]) -> Vec<&str> {
        ads.iter().map(|a| a.title.as_str()).collect()
    }

    #[test]
    fn topped_before_plain() {
        let now = Utc::now();
        let mut ads = vec![
            ad("new", 1, None, now),
            ad("topped-old", 500, Some(24), now),
        ];
        rank_ads(&mut ads, now);
        assert_eq!(titles(&ads), ["topped-old", "new"]);
    }

    #[test]
    fn later_expiry_wins_among_topped() {
        let now = Utc::now();
        let mut ads = vec![
            ad("short", 1, Some(2), now),
            ad("long", 10, Some(100), now),
        ];
        rank_ads(&mut ads, now);
        assert_eq!(titles(&ads), ["long", "short"]);
    }

    #[test]
    fn expired_promotion_drops_out_of_top() {
        let now = Utc::now();
        let mut ads = vec![
            ad("expired", 100, Some(-1), now),
            ad("plain-new", 1, None, now),
            ad("active", 200, Some(5), now),
        ];
        rank_ads(&mut ads, now);
        // Expired ads keep their expiry as a tiebreaker over never-topped ones.
        assert_eq!(titles(&ads), ["active", "expired", "plain-new"]);
    }

    #[test]
    fn newest_first_without_promotions() {
        let now = Utc::now();
        let mut ads = vec![
            ad("older", 30, None, now),
            ad("newest", 1, None, now),
            ad("oldest", 60, None, now),
        ];
        rank_ads(&mut ads, now);
        assert_eq!(titles(&ads), ["newest", "older", "oldest"]);
    }
}
