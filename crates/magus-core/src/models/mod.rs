//! Data models for Magus
//!
//! Wire records from the API, the inbox view model, trace steps,
//! leaderboard statistics and decision payloads.

mod decision;
mod email;
mod record;
mod stats;
mod trace;

pub use decision::*;
pub use email::*;
pub use record::*;
pub use stats::*;
pub use trace::*;
