use std::path::Path;

use serde::Deserialize;

use super::AppCore;

const DEFAULT_API_BASE_URL: &str = "https://api.calla.local/v1";
pub(super) const DEFAULT_PAGE_SIZE: usize = 30;
pub(super) const DEFAULT_PAYMENT_LOCK_TTL_MS: i64 = 30_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) api_base_url: Option<String>,
    // Used to keep Rust tests deterministic and offline.
    pub(super) disable_network: Option<bool>,
    pub(super) page_size: Option<usize>,
    pub(super) payment_lock_ttl_ms: Option<i64>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("calla_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

pub(super) fn api_base_url(config: &AppConfig) -> String {
    config
        .api_base_url
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("CALLA_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(super) fn page_size(&self) -> usize {
        self.config.page_size.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub(super) fn payment_lock_ttl_ms(&self) -> i64 {
        self.config
            .payment_lock_ttl_ms
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_PAYMENT_LOCK_TTL_MS)
    }
}
