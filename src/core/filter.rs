use serde::{Deserialize, Serialize};

use super::session::{Session, SessionStatus};

/// Arguments of a filtered-view query. Equality on the whole struct is what
/// the cache keys on, together with the store revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuery {
    /// Case-insensitive substring matched against name, working directory,
    /// message content and tool-call input. Empty means no text filter.
    pub search: String,
    pub status: Option<SessionStatus>,
    pub sort: SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Name,
    Status,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "name" => Ok(Self::Name),
            "status" => Ok(Self::Status),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Query result, partitioned by whether the session is in a live state.
/// Sort order is preserved within each partition.
#[derive(Debug, Clone, Default)]
pub struct FilteredSessions {
    pub active: Vec<Session>,
    pub other: Vec<Session>,
}

impl FilteredSessions {
    pub fn len(&self) -> usize {
        self.active.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.other.is_empty()
    }
}

/// Memoizes the last filtered view. A hit requires both the exact same
/// query and an unchanged store revision; every mutating store operation
/// bumps the revision, which is what invalidates this cache.
#[derive(Default)]
pub struct FilterCache {
    key: Option<(SessionQuery, u64)>,
    value: FilteredSessions,
}

impl FilterCache {
    pub fn get(&self, query: &SessionQuery, revision: u64) -> Option<FilteredSessions> {
        match &self.key {
            Some((cached_query, cached_revision))
                if cached_query == query && *cached_revision == revision =>
            {
                Some(self.value.clone())
            }
            _ => None,
        }
    }

    pub fn put(&mut self, query: SessionQuery, revision: u64, value: FilteredSessions) {
        self.key = Some((query, revision));
        self.value = value;
    }
}

/// Filter, sort and partition the session list for one query.
///
/// Sorting is stable throughout, so sessions with equal keys keep their
/// relative insertion order and identical timestamps do not flicker in
/// list views.
pub fn filter_sessions(sessions: &[Session], query: &SessionQuery) -> FilteredSessions {
    let needle = query.search.trim().to_lowercase();

    let mut matched: Vec<Session> = sessions
        .iter()
        .filter(|s| needle.is_empty() || matches_search(s, &needle))
        .filter(|s| query.status.map_or(true, |status| s.status == status))
        .cloned()
        .collect();

    match query.sort {
        SortOrder::Newest => matched.sort_by(|a, b| b.started_at.cmp(&a.started_at)),
        SortOrder::Oldest => matched.sort_by(|a, b| a.started_at.cmp(&b.started_at)),
        SortOrder::Name => matched.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        SortOrder::Status => matched.sort_by(|a, b| a.status.label().cmp(b.status.label())),
    }

    let (active, other) = matched.into_iter().partition(|s| s.status.is_live());
    FilteredSessions { active, other }
}

fn matches_search(session: &Session, needle: &str) -> bool {
    if session.name.to_lowercase().contains(needle) {
        return true;
    }
    if session
        .working_directory
        .as_deref()
        .map_or(false, |dir| dir.to_lowercase().contains(needle))
    {
        return true;
    }
    if session
        .messages
        .iter()
        .any(|m| m.content.to_lowercase().contains(needle))
    {
        return true;
    }
    // Tool-call inputs are searchable too: "npm test" should find the
    // session whose Bash call ran it even if no message mentions it.
    session
        .tool_calls
        .iter()
        .any(|c| c.input.to_lowercase().contains(needle))
}
