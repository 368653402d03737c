use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub price_id: Option<String>,
}

pub struct ImagesConfig {
    pub account_id: String,
    pub api_token: String,
}

pub struct SearchConfig {
    pub app_id: String,
    pub admin_key: String,
    pub index_name: String,
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub stripe: Option<StripeConfig>,
    pub images: Option<ImagesConfig>,
    pub search: Option<SearchConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("BAZAAR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("BAZAAR_JWT_SECRET is unset or still a placeholder");
        }

        let port = match var("BAZAAR_PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid BAZAAR_PORT '{}'", p))?,
            None => 3000,
        };

        let stripe = var("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            price_id: var("STRIPE_PRICE_ID"),
        });
        match &stripe {
            Some(s) if s.webhook_secret.is_none() => {
                warn!("STRIPE_WEBHOOK_SECRET not set; payment webhooks will be rejected");
            }
            Some(_) => {}
            None => info!("STRIPE_SECRET_KEY not set; payments disabled"),
        }

        let images = match (var("CLOUDFLARE_ACCOUNT_ID"), var("CLOUDFLARE_API_TOKEN")) {
            (Some(account_id), Some(api_token)) => Some(ImagesConfig { account_id, api_token }),
            _ => {
                info!("Cloudflare Images credentials not set; image uploads disabled");
                None
            }
        };

        let search = match (
            var("ALGOLIA_APP_ID"),
            var("ALGOLIA_ADMIN_KEY"),
            var("ALGOLIA_INDEX_NAME"),
        ) {
            (Some(app_id), Some(admin_key), Some(index_name)) => Some(SearchConfig {
                app_id,
                admin_key,
                index_name,
            }),
            _ => {
                info!("Algolia settings incomplete; using database search");
                None
            }
        };

        Ok(Self {
            host: var("BAZAAR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("BAZAAR_DB_PATH").unwrap_or_else(|| "bazaar.db".into()).into(),
            jwt_secret,
            stripe,
            images,
            search,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_secret() {
        let cfg = config(&[("BAZAAR_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("bazaar.db"));
        assert!(cfg.stripe.is_none() && cfg.images.is_none() && cfg.search.is_none());
    }

    #[test]
    fn rejects_missing_or_placeholder_secret() {
        assert!(config(&[]).is_err());
        assert!(config(&[("BAZAAR_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("BAZAAR_JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn stripe_needs_only_the_secret_key() {
        let vars = [("BAZAAR_JWT_SECRET", "s3cret"), ("STRIPE_SECRET_KEY", "sk_test_1")];
        let cfg = config(&vars).unwrap();
        let stripe = cfg.stripe.unwrap();
        assert!(stripe.webhook_secret.is_none());
        assert!(stripe.price_id.is_none());

        let cfg = config(&[
            ("BAZAAR_JWT_SECRET", "s3cret"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_1"),
            ("STRIPE_PRICE_ID", "price_top"),
        ])
        .unwrap();
        let stripe = cfg.stripe.unwrap();
        assert_eq!(stripe.webhook_secret.as_deref(), Some("whsec_1"));
        assert_eq!(stripe.price_id.as_deref(), Some("price_top"));
    }

    #[test]
    fn stripe_options_without_secret_key_are_ignored() {
        let vars = [("BAZAAR_JWT_SECRET", "s3cret"), ("STRIPE_PRICE_ID", "price_top")];
        let cfg = config(&vars).unwrap();
        assert!(cfg.stripe.is_none());
    }

    #[test]
    fn images_and_search_need_all_their_variables() {
        let cfg = config(&[
            ("BAZAAR_JWT_SECRET", "s3cret"),
            ("CLOUDFLARE_ACCOUNT_ID", "acct"),
            ("ALGOLIA_APP_ID", "APP"),
            ("ALGOLIA_ADMIN_KEY", "key"),
        ])
        .unwrap();
        assert!(cfg.images.is_none());
        assert!(cfg.search.is_none());

        let cfg = config(&[
            ("BAZAAR_JWT_SECRET", "s3cret"),
            ("CLOUDFLARE_ACCOUNT_ID", "acct"),
            ("CLOUDFLARE_API_TOKEN", "token"),
            ("ALGOLIA_APP_ID", "APP"),
            ("ALGOLIA_ADMIN_KEY", "key"),
            ("ALGOLIA_INDEX_NAME", "ads"),
        ])
        .unwrap();
        assert_eq!(cfg.images.unwrap().account_id, "acct");
        assert_eq!(cfg.search.unwrap().index_name, "ads");
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("BAZAAR_JWT_SECRET", "s"), ("BAZAAR_PORT", "http")]).is_err());
    }
}
