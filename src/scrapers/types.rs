use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Search parameters shared by every source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// City searched on every site, lowercase as it appears in URLs
    pub city: String,
}

impl SearchParams {
    pub fn new(city: &str) -> Self {
        Self {
            city: city.to_lowercase(),
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::new("leiden")
    }
}

/// Randomised pause between requests to one site, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Pacing {
    pub const fn between(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn fixed(secs: u64) -> Self {
        Self::between(secs, secs)
    }

    pub const fn none() -> Self {
        Self::fixed(0)
    }

    pub fn pick(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs(self.min_secs);
        }
        Duration::from_secs(rand::thread_rng().gen_range(self.min_secs..=self.max_secs))
    }

    pub async fn pause(&self) {
        let delay = self.pick();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
