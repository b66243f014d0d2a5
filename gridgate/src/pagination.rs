//! Hybrid pagination: small result sets are shipped whole, large ones are windowed.
//!
//! The mode is decided from the first count a client session observes for a procedure and is
//! sticky afterwards. A windowed session that changes its sort or filter starts over at page one.

use crate::error::AppError;
use crate::registry::ProcedureRegistration;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use utoipa::ToSchema;

pub const DEFAULT_ALL_LOADED_THRESHOLD: u64 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PaginationMode {
    #[default]
    Unknown,
    AllLoaded,
    Windowed,
}

impl PaginationMode {
    /// Only `Unknown` reacts to a count; a decided mode never changes.
    pub fn observe(self, total: u64, threshold: u64) -> PaginationMode {
        match self {
            PaginationMode::Unknown if total < threshold => PaginationMode::AllLoaded,
            PaginationMode::Unknown => PaginationMode::Windowed,
            decided => decided,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl Window {
    pub fn all(total: u64) -> Window {
        Window { offset: 0, limit: total }
    }

    pub fn page_number(&self) -> u64 {
        if self.limit == 0 { 1 } else { self.offset / self.limit + 1 }
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        match (total, self.limit) {
            (0, _) => 0,
            (_, 0) => 1,
            (total, limit) => total.div_ceil(limit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl From<&ProcedureRegistration> for PageLimits {
    fn from(registration: &ProcedureRegistration) -> Self {
        PageLimits { default_page_size: registration.default_page_size, max_page_size: registration.max_page_size }
    }
}

/// Either page addressing or explicit 1-based row addressing; rows win when both bounds are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAddress {
    pub page_number: u32,
    pub page_size: u32,
    pub start_row: Option<u64>,
    pub end_row: Option<u64>,
}

impl PageAddress {
    pub fn page(page_number: u32, page_size: u32) -> Self {
        PageAddress { page_number, page_size, start_row: None, end_row: None }
    }

    pub fn rows(start_row: u64, end_row: u64) -> Self {
        PageAddress { page_number: 1, page_size: 0, start_row: Some(start_row), end_row: Some(end_row) }
    }

    pub fn window(&self, limits: PageLimits) -> Result<Window, AppError> {
        let cap = |n: u64| if limits.max_page_size > 0 { n.min(limits.max_page_size as u64) } else { n };
        if let (Some(start), Some(end)) = (self.start_row, self.end_row) {
            if start == 0 {
                return Err(AppError::validation("startRow is 1-based"));
            }
            if end < start {
                return Err(AppError::validation(format!("endRow {} precedes startRow {}", end, start)));
            }
            return Ok(Window { offset: start - 1, limit: cap(end - start + 1) });
        }
        let size = if self.page_size == 0 { limits.default_page_size } else { self.page_size };
        let size = cap(size.max(1) as u64);
        let page = self.page_number.max(1) as u64;
        Ok(Window { offset: (page - 1) * size, limit: size })
    }

    /// Same page size, first page.
    pub fn first_page(self) -> Self {
        match (self.start_row, self.end_row) {
            (Some(start), Some(end)) if end >= start => PageAddress::rows(1, end - start + 1),
            _ => PageAddress { page_number: 1, ..self },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryChange {
    First,
    Unchanged,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingDecision {
    pub mode: PaginationMode,
    pub change: QueryChange,
}

impl PagingDecision {
    /// A windowed session whose sort or filter moved must restart at page one.
    pub fn restart_at_first_page(&self) -> bool {
        self.mode == PaginationMode::Windowed && self.change == QueryChange::Changed
    }
}

#[derive(Debug, Clone, Default)]
struct GridSession {
    mode: PaginationMode,
    query: Option<String>,
}

/// Per (session, procedure) pagination state. Sessions are independent of each other.
pub struct SessionPaging {
    threshold: u64,
    sessions: Mutex<LruCache<(String, String), GridSession>>,
}

impl SessionPaging {
    pub fn new(threshold: u64, capacity: NonZeroUsize) -> Self {
        SessionPaging { threshold, sessions: Mutex::new(LruCache::new(capacity)) }
    }

    /// Feeds the current query signature and count of one request into the session state.
    /// Without a session id the mode is decided from this request alone.
    pub fn advance(&self, session: Option<&str>, procedure: &str, signature: &str, total: u64) -> Result<PagingDecision, AppError> {
        let session = match session {
            None => return Ok(PagingDecision { mode: PaginationMode::Unknown.observe(total, self.threshold), change: QueryChange::First }),
            Some(session) => session,
        };
        let key = (session.to_string(), procedure.to_string());
        let mut sessions = self.sessions.lock()?;
        let mut state = sessions.pop(&key).unwrap_or_default();
        let change = match &state.query {
            None => QueryChange::First,
            Some(previous) if previous == signature => QueryChange::Unchanged,
            Some(_) => QueryChange::Changed,
        };
        state.mode = state.mode.observe(total, self.threshold);
        state.query = Some(signature.to_string());
        let decision = PagingDecision { mode: state.mode, change };
        sessions.put(key, state);
        Ok(decision)
    }

    pub fn mode(&self, session: &str, procedure: &str) -> Result<PaginationMode, AppError> {
        let mut sessions = self.sessions.lock()?;
        let mode = sessions
            .get(&(session.to_string(), procedure.to_string()))
            .map(|s| s.mode)
            .unwrap_or_default();
        Ok(mode)
    }

    pub fn forget(&self, session: &str) -> Result<usize, AppError> {
        let mut sessions = self.sessions.lock()?;
        let keys: Vec<(String, String)> = sessions.iter().filter(|(k, _)| k.0 == session).map(|(k, _)| k.clone()).collect();
        for key in &keys {
            sessions.pop(key);
        }
        Ok(keys.len())
    }
}
