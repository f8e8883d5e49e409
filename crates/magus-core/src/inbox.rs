//! Inbox pagination controller
//!
//! Tracks `{filter, offset, limit, items, total, exhausted}` for the active
//! filter. `all` and `needs_review` page through dedicated endpoints; the
//! remaining filters have none, so the full dataset is fetched once and
//! filtered locally, then handed out page by page.
//!
//! Every `set_filter`/`refresh` takes a new generation. A response that
//! lands after a newer request started is dropped and reported as
//! [`Applied::Stale`]. Network calls never run under the state lock.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::{category_counts, CategoryCounts};
use crate::api::{fetch_all_email_records, MagusApi};
use crate::config::InboxConfig;
use crate::error::{Error, Result};
use crate::mapper::{map_record, map_records, MapperOptions};
use crate::models::{Email, UiStatus};

/// Inbox sidebar filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxFilter {
    All,
    Processed,
    NeedsReview,
    AutoReplied,
    Ignored,
}

impl InboxFilter {
    /// UI category the filter selects, `None` for everything
    pub fn status(self) -> Option<UiStatus> {
        match self {
            InboxFilter::All => None,
            InboxFilter::Processed => Some(UiStatus::Processed),
            InboxFilter::NeedsReview => Some(UiStatus::NeedsReview),
            InboxFilter::AutoReplied => Some(UiStatus::AutoReplied),
            InboxFilter::Ignored => Some(UiStatus::Ignored),
        }
    }

    /// Whether the backend pages this filter for us
    pub fn is_server_paged(self) -> bool {
        matches!(self, InboxFilter::All | InboxFilter::NeedsReview)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InboxFilter::All => "all",
            InboxFilter::Processed => "processed",
            InboxFilter::NeedsReview => "needs_review",
            InboxFilter::AutoReplied => "auto_replied",
            InboxFilter::Ignored => "ignored",
        }
    }
}

impl From<UiStatus> for InboxFilter {
    fn from(status: UiStatus) -> Self {
        match status {
            UiStatus::Processed => InboxFilter::Processed,
            UiStatus::NeedsReview => InboxFilter::NeedsReview,
            UiStatus::AutoReplied => InboxFilter::AutoReplied,
            UiStatus::Ignored => InboxFilter::Ignored,
        }
    }
}

impl fmt::Display for InboxFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboxFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(InboxFilter::All);
        }
        s.parse::<UiStatus>()
            .map(InboxFilter::from)
            .map_err(|_| format!("unknown filter: {}", s))
    }
}

/// How many emails the current filter covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Total {
    /// Row count reported by the backend for a server-paged listing
    Server { count: u64 },
    /// Matches found by filtering a locally fetched dataset
    ClientFiltered {
        matched: usize,
        scanned: usize,
        /// The dataset hit the row cap, so `matched` may be low
        truncated: bool,
    },
}

impl Total {
    pub fn count(&self) -> u64 {
        match self {
            Total::Server { count } => *count,
            Total::ClientFiltered { matched, .. } => *matched as u64,
        }
    }
}

/// Whether a response made it into the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Current,
    /// A newer request superseded this one; the response was dropped
    Stale,
}

/// Snapshot of the active listing
#[derive(Debug, Clone, Serialize)]
pub struct InboxState {
    pub filter: InboxFilter,
    /// Offset of the last page loaded
    pub offset: u32,
    pub limit: u32,
    pub items: Vec<Email>,
    pub total: Total,
    pub exhausted: bool,
    /// Full match list for client-filtered views
    #[serde(skip)]
    matches: Vec<Email>,
    /// Request generation that produced this state
    #[serde(skip)]
    generation: u64,
}

impl InboxState {
    fn empty(filter: InboxFilter, limit: u32, generation: u64) -> Self {
        Self {
            filter,
            offset: 0,
            limit,
            items: Vec::new(),
            total: Total::Server { count: 0 },
            exhausted: false,
            matches: Vec::new(),
            generation,
        }
    }
}

/// Result of one fetch, before it is applied
enum Fetched {
    Server { items: Vec<Email>, count: u64 },
    Client {
        matches: Vec<Email>,
        scanned: usize,
        truncated: bool,
    },
}

pub struct InboxController {
    api: Arc<dyn MagusApi>,
    options: MapperOptions,
    page_size: u32,
    full_fetch_batch: u32,
    full_fetch_max_rows: usize,
    state: Mutex<InboxState>,
    generation: AtomicU64,
}

impl InboxController {
    pub fn new(api: Arc<dyn MagusApi>, config: &InboxConfig) -> Self {
        let page_size = config.page_size.max(1);
        Self {
            api,
            options: MapperOptions::from(config),
            page_size,
            full_fetch_batch: config.full_fetch_batch,
            full_fetch_max_rows: config.full_fetch_max_rows,
            state: Mutex::new(InboxState::empty(InboxFilter::All, page_size, 0)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> InboxState {
        self.state.lock().clone()
    }

    pub fn filter(&self) -> InboxFilter {
        self.state.lock().filter
    }

    /// Look up a loaded email by id
    pub fn find(&self, id: &str) -> Option<Email> {
        self.state.lock().items.iter().find(|e| e.id == id).cloned()
    }

    /// Swap in an updated copy of a loaded email
    pub fn update_email(&self, email: Email) {
        let mut state = self.state.lock();
        if let Some(slot) = state.items.iter_mut().find(|e| e.id == email.id) {
            *slot = email.clone();
        }
        if let Some(slot) = state.matches.iter_mut().find(|e| e.id == email.id) {
            *slot = email;
        }
    }

    /// Switch filter and load its first page
    pub async fn set_filter(&self, filter: InboxFilter) -> Result<Applied> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Loading filter {} (generation {})", filter, generation);

        let fetched = self.fetch(filter, 0).await?;

        let mut state = self.state.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!("Dropping stale response for filter {}", filter);
            return Ok(Applied::Stale);
        }

        let mut next = InboxState::empty(filter, self.page_size, generation);
        self.apply(&mut next, fetched, 0);
        info!(
            "Inbox filter {}: {} of {} loaded",
            filter,
            next.items.len(),
            next.total.count()
        );
        *state = next;
        Ok(Applied::Current)
    }

    /// Re-run the current filter from the first page
    pub async fn refresh(&self) -> Result<Applied> {
        let filter = self.filter();
        self.set_filter(filter).await
    }

    /// Append the next page, skipping ids already loaded.
    ///
    /// The page belongs to the state it was requested for: if a newer
    /// `set_filter`/`refresh` is in flight or has landed, it is dropped.
    pub async fn load_more(&self) -> Result<Applied> {
        let (generation, filter, next_offset, exhausted) = {
            let state = self.state.lock();
            (
                state.generation,
                state.filter,
                state.offset + state.limit,
                state.exhausted,
            )
        };
        if exhausted {
            return Ok(Applied::Current);
        }

        if !filter.is_server_paged() {
            let mut state = self.state.lock();
            if state.generation != generation || state.offset + state.limit != next_offset {
                return Ok(Applied::Stale);
            }
            let start = (next_offset as usize).min(state.matches.len());
            let end = (start + self.page_size as usize).min(state.matches.len());
            let page = state.matches[start..end].to_vec();
            state.offset = next_offset;
            append_unique(&mut state.items, page);
            state.exhausted = end >= state.matches.len();
            return Ok(Applied::Current);
        }

        let fetched = self.fetch(filter, next_offset).await?;

        let mut state = self.state.lock();
        let superseded = self.generation.load(Ordering::SeqCst) != generation
            || state.generation != generation
            || state.filter != filter
            || state.offset + state.limit != next_offset;
        if superseded {
            warn!("Dropping stale page at offset {} for filter {}", next_offset, filter);
            return Ok(Applied::Stale);
        }
        self.apply(&mut state, fetched, next_offset);
        Ok(Applied::Current)
    }

    /// Sidebar counts per UI category
    pub async fn category_counts(&self) -> Result<CategoryCounts> {
        let counts = self.api.status_counts().await?;
        Ok(category_counts(&counts))
    }

    async fn fetch(&self, filter: InboxFilter, offset: u32) -> Result<Fetched> {
        let limit = self.page_size;
        match filter {
            InboxFilter::All => {
                let page = self.api.list_email_records(limit, offset).await?;
                Ok(Fetched::Server {
                    items: map_records(&page.items, &self.options),
                    count: page.count,
                })
            }
            InboxFilter::NeedsReview => {
                let page = self.api.list_needs_human_decision(limit, offset).await?;
                Ok(Fetched::Server {
                    items: map_records(&page.items, &self.options),
                    count: page.count,
                })
            }
            _ => {
                let dataset = fetch_all_email_records(
                    self.api.as_ref(),
                    self.full_fetch_batch,
                    self.full_fetch_max_rows,
                )
                .await?;
                let wanted = filter.status();
                let matches: Vec<Email> = map_records(&dataset.records, &self.options)
                    .into_iter()
                    .filter(|e| Some(e.status) == wanted)
                    .collect();
                Ok(Fetched::Client {
                    matches,
                    scanned: dataset.scanned(),
                    truncated: dataset.reached_max_rows,
                })
            }
        }
    }

    fn apply(&self, state: &mut InboxState, fetched: Fetched, offset: u32) {
        state.offset = offset;
        match fetched {
            Fetched::Server { items, count } => {
                let got = items.len() as u64;
                append_unique(&mut state.items, items);
                state.total = Total::Server { count };
                state.exhausted = got < state.limit as u64 || offset as u64 + got >= count;
            }
            Fetched::Client {
                matches,
                scanned,
                truncated,
            } => {
                let first: Vec<Email> =
                    matches.iter().take(self.page_size as usize).cloned().collect();
                state.total = Total::ClientFiltered {
                    matched: matches.len(),
                    scanned,
                    truncated,
                };
                state.exhausted = first.len() >= matches.len();
                append_unique(&mut state.items, first);
                state.matches = matches;
            }
        }
    }
}

/// Page through every record until `id` turns up
pub async fn find_email(
    api: &dyn MagusApi,
    config: &InboxConfig,
    options: &MapperOptions,
    id: &str,
) -> Result<Email> {
    let batch = config.full_fetch_batch.max(1);
    let mut offset: u32 = 0;
    let mut scanned: usize = 0;

    while scanned < config.full_fetch_max_rows {
        let page = api.list_email_records(batch, offset).await?;
        if let Some(record) = page.items.iter().find(|r| r.id == id) {
            return Ok(map_record(record, options));
        }
        let got = page.items.len();
        scanned += got;
        if got < batch as usize || scanned as u64 >= page.count {
            break;
        }
        offset = offset.saturating_add(batch);
    }

    debug!("Email {} not found after scanning {} records", id, scanned);
    Err(Error::EmailNotFound(id.to_string()))
}

fn append_unique(items: &mut Vec<Email>, incoming: Vec<Email>) {
    let mut seen: HashSet<String> = items.iter().map(|e| e.id.clone()).collect();
    for email in incoming {
        if seen.insert(email.id.clone()) {
            items.push(email);
        }
    }
}
