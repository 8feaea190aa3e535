//! Filter types for querying stored issues.

use crate::enums::IssueSource;
use crate::hierarchy::TypeId;

/// Filter for issue queries. All set fields are combined with AND.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub type_id: Option<TypeId>,
    pub parent_key: Option<String>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub source: Option<IssueSource>,
    /// Issue must carry this label.
    pub label: Option<String>,
    /// Substring match on the summary.
    pub summary_contains: Option<String>,
    /// Only issues without a parent.
    pub no_parent: bool,
    pub limit: Option<u32>,
}
