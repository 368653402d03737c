use crate::models::{AdRow, PaymentRow, UserRow, format_timestamp};
use crate::Database;
use anyhow::Result;
use bazaar_types::models::{Ad, Payment};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::warn;
use uuid::Uuid;

const AD_COLUMNS: &str = "id, owner_id, title, description, price, category, image_urls, \
                          animation_url, created_at, is_topped, topped_expires_at";

/// Listing order: running promotions first, then latest expiry (never-topped
/// last), then newest. Must agree with `bazaar_types::ranking::cmp_ads`.
const RANKED_ORDER: &str = "ORDER BY COALESCE(is_topped = 1 AND topped_expires_at > ?, 0) DESC,
                                     topped_expires_at IS NULL,
                                     topped_expires_at DESC,
                                     created_at DESC";

/// Filters for ad listings. `limit` is applied as given; callers clamp it.
#[derive(Debug, Clone)]
pub struct AdFilter {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub owner_id: Option<Uuid>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for AdFilter {
    fn default() -> Self {
        Self {
            category: None,
            min_price: None,
            max_price: None,
            owner_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Result of applying a succeeded promotion payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    Applied,
    /// The processor event was seen before; nothing changed.
    AlreadyProcessed,
    /// The event was recorded but no ad with that id exists.
    AdMissing,
}

impl Database {
    // -- Users --

    /// Returns false if the email is already registered.
    pub fn create_user(&self, id: &str, email: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password) VALUES (?1, ?2, ?3)
                 ON CONFLICT(email) DO NOTHING",
                (id, email, password_hash),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Ads --

    pub fn insert_ad(&self, ad: &Ad) -> Result<()> {
        let image_urls = serde_json::to_string(&ad.image_urls)?;
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO ads ({AD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    ad.id.to_string(),
                    ad.owner_id.to_string(),
                    ad.title,
                    ad.description,
                    ad.price,
                    ad.category,
                    image_urls,
                    ad.animation_url,
                    format_timestamp(ad.created_at),
                    ad.is_topped,
                    ad.topped_expires_at.map(format_timestamp),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_ad(&self, id: Uuid) -> Result<Option<Ad>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?1"),
                [id.to_string()],
                map_ad_row,
            )
            .optional()
        })?;
        row.map(AdRow::into_ad).transpose()
    }

    /// Batch-fetch ads by id. Unknown ids are skipped; order is unspecified.
    pub fn get_ads(&self, ids: &[Uuid]) -> Result<Vec<Ad>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {AD_COLUMNS} FROM ads WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter().map(|id| id.to_string())), map_ad_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(convert_ads(rows))
    }

    /// Write the editable fields of `ad`. Only succeeds when `owner_id`
    /// matches the stored owner; promotion state is never touched here.
    pub fn save_ad(&self, ad: &Ad, owner_id: Uuid) -> Result<bool> {
        let image_urls = serde_json::to_string(&ad.image_urls)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE ads
                 SET title = ?1, description = ?2, price = ?3, category = ?4,
                     image_urls = ?5, animation_url = ?6
                 WHERE id = ?7 AND owner_id = ?8",
                params![
                    ad.title,
                    ad.description,
                    ad.price,
                    ad.category,
                    image_urls,
                    ad.animation_url,
                    ad.id.to_string(),
                    owner_id.to_string(),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Owner-scoped delete. Returns false if no such ad belongs to `owner_id`.
    pub fn delete_ad(&self, id: Uuid, owner_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM ads WHERE id = ?1 AND owner_id = ?2",
                [id.to_string(), owner_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_ads(&self, filter: &AdFilter, now: DateTime<Utc>) -> Result<Vec<Ad>> {
        self.ranked_query(None, filter, now)
    }

    /// Substring search over title, description and category. Used when no
    /// hosted search index is configured.
    pub fn search_ads(
        &self,
        query: &str,
        filter: &AdFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ad>> {
        self.ranked_query(Some(query), filter, now)
    }

    /// The caller's own ads, newest first.
    pub fn list_ads_by_owner(&self, owner_id: Uuid) -> Result<Vec<Ad>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AD_COLUMNS} FROM ads WHERE owner_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([owner_id.to_string()], map_ad_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(convert_ads(rows))
    }

    fn ranked_query(
        &self,
        query: Option<&str>,
        filter: &AdFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ad>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = &filter.category {
            clauses.push("category = ? COLLATE NOCASE".into());
            values.push(Value::Text(category.clone()));
        }
        if let Some(min) = filter.min_price {
            clauses.push("price >= ?".into());
            values.push(Value::Real(min));
        }
        if let Some(max) = filter.max_price {
            clauses.push("price <= ?".into());
            values.push(Value::Real(max));
        }
        if let Some(owner) = filter.owner_id {
            clauses.push("owner_id = ?".into());
            values.push(Value::Text(owner.to_string()));
        }
        if let Some(q) = query {
            let pattern = format!("%{}%", escape_like(q));
            clauses.push(
                "(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' \
                 OR category LIKE ? ESCAPE '\\')"
                    .into(),
            );
            for _ in 0..3 {
                values.push(Value::Text(pattern.clone()));
            }
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        values.push(Value::Text(format_timestamp(now)));
        values.push(Value::Integer(filter.limit as i64));
        values.push(Value::Integer(filter.offset as i64));

        let sql =
            format!("SELECT {AD_COLUMNS} FROM ads {where_sql} {RANKED_ORDER} LIMIT ? OFFSET ?");

        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), map_ad_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(convert_ads(rows))
    }

    // -- Payments --

    pub fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO payments (id, ad_id, price_id, amount, currency, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    payment.id,
                    payment.ad_id.to_string(),
                    payment.price_id,
                    payment.amount,
                    payment.currency,
                    payment.status.as_str(),
                    format_timestamp(payment.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_payment(&self, id: &str) -> Result<Option<Payment>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, ad_id, price_id, amount, currency, status, created_at
                 FROM payments WHERE id = ?1",
                [id],
                |row| {
                    Ok(PaymentRow {
                        id: row.get(0)?,
                        ad_id: row.get(1)?,
                        price_id: row.get(2)?,
                        amount: row.get(3)?,
                        currency: row.get(4)?,
                        status: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })?;
        row.map(PaymentRow::into_payment).transpose()
    }

    // -- Promotion --

    /// Record a processor event and top the ad until `expires_at`, in one
    /// transaction. A repeated `event_id` changes nothing.
    pub fn apply_promotion(
        &self,
        event_id: &str,
        event_type: &str,
        ad_id: Uuid,
        payment_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PromotionOutcome> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO processed_events (id, event_type) VALUES (?1, ?2)",
                (event_id, event_type),
            )?;
            if inserted == 0 {
                return Ok(PromotionOutcome::AlreadyProcessed);
            }

            let topped = tx.execute(
                "UPDATE ads SET is_topped = 1, topped_expires_at = ?1 WHERE id = ?2",
                (format_timestamp(expires_at), ad_id.to_string()),
            )?;
            tx.execute(
                "UPDATE payments SET status = 'succeeded' WHERE id = ?1",
                [payment_id],
            )?;
            tx.commit()?;

            Ok(if topped == 0 {
                PromotionOutcome::AdMissing
            } else {
                PromotionOutcome::Applied
            })
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, email, password, created_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_ad_row(row: &Row) -> rusqlite::Result<AdRow> {
    Ok(AdRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        price: row.get(4)?,
        category: row.get(5)?,
        image_urls: row.get(6)?,
        animation_url: row.get(7)?,
        created_at: row.get(8)?,
        is_topped: row.get(9)?,
        topped_expires_at: row.get(10)?,
    })
}

/// Corrupt rows are logged and skipped rather than failing a whole listing.
fn convert_ads(rows: Vec<AdRow>) -> Vec<Ad> {
    rows.into_iter()
        .filter_map(|row| match row.into_ad() {
            Ok(ad) => Some(ad),
            Err(e) => {
                warn!("Skipping ad row: {:#}", e);
                None
            }
        })
        .collect()
}

fn escape_like(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
