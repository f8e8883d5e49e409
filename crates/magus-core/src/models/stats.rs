//! Leaderboard statistics returned by the stats endpoints

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStatsItem {
    pub sender: String,
    pub count: u64,
}

/// Response of `GET /stats/senders`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderStats {
    pub items: Vec<SenderStatsItem>,
    #[serde(default)]
    pub unique_senders: u64,
    #[serde(default)]
    pub scanned: u64,
    #[serde(default)]
    pub max_rows: u64,
    #[serde(default)]
    pub reached_max_rows: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatsItem {
    pub route: String,
    pub count: u64,
}

/// Response of `GET /stats/routes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStats {
    pub items: Vec<RouteStatsItem>,
    #[serde(default)]
    pub unique_routes: u64,
    #[serde(default)]
    pub scanned: u64,
    #[serde(default)]
    pub max_rows: u64,
    #[serde(default)]
    pub reached_max_rows: bool,
}

/// Query parameters for `GET /stats/routes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatsQuery {
    pub top: u32,
    pub max_rows: u32,
    pub batch_size: u32,
}

impl Default for RouteStatsQuery {
    fn default() -> Self {
        Self {
            top: 100,
            max_rows: 20_000,
            batch_size: 1000,
        }
    }
}

impl From<&crate::config::StatsConfig> for RouteStatsQuery {
    fn from(cfg: &crate::config::StatsConfig) -> Self {
        Self {
            top: cfg.route_top,
            max_rows: cfg.route_max_rows,
            batch_size: cfg.route_batch_size,
        }
    }
}
