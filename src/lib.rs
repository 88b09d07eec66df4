pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod signals;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::auth::JwtKeys;
use crate::api::rate_limit::RateLimiter;
use crate::cache::ResponseCache;
use crate::signals::{CacheInvalidator, Signals};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub jwt: JwtKeys,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub signals: Signals,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> anyhow::Result<Self> {
        let rate_limiter = Arc::new(RateLimiter::new(&config.throttle)?);
        let cache = Arc::new(ResponseCache::new(&config.cache));

        let mut signals = Signals::new();
        signals.connect(Arc::new(CacheInvalidator::new(cache.clone())));

        Ok(Self {
            jwt: JwtKeys::new(&config.auth),
            config,
            db,
            rate_limiter,
            cache,
            signals,
        })
    }
}
