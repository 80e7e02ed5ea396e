//! Derives the displayed workflow list from the raw listing and the user's search, filter and sort choices.

use std::cmp::Ordering;

use super::{Workflow, WorkflowState};

/// How the displayed list is ordered by name.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Keeps the order GitHub returned.
    #[default]
    Unsorted,
    /// A to Z, ignoring case.
    Ascending,
    /// Z to A, ignoring case.
    Descending,
}

impl SortOrder {
    /// Parses the value of a sort selector: `asc`, `desc`, or anything else for no sorting.
    pub fn parse(value: &str) -> Self {
        match value {
            "asc" => Self::Ascending,
            "desc" => Self::Descending,
            _ => Self::Unsorted,
        }
    }
}

/// The inputs the displayed list depends on, besides the listing itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    /// Matched case-insensitively against workflow names and paths. Empty matches everything.
    pub search_term: String,
    /// Keeps only workflows in this state. [`None`] keeps every state.
    pub status_filter: Option<WorkflowState>,
    /// Orders the filtered list by name.
    pub sort_order: SortOrder,
}

impl ViewState {
    /// Derives the displayed list.
    ///
    /// The status filter runs first, then the search, then the sort. The result depends on nothing but
    /// `self` and `workflows`.
    pub fn apply(&self, workflows: &[Workflow]) -> Vec<Workflow> {
        let needle = self.search_term.to_lowercase();

        let mut filtered = workflows
            .iter()
            .filter(|workflow| {
                self.status_filter
                    .is_none_or(|state| workflow.state == state)
            })
            .filter(|workflow| {
                needle.is_empty()
                    || workflow.name.to_lowercase().contains(&needle)
                    || workflow.path.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect::<Vec<_>>();

        match self.sort_order {
            SortOrder::Unsorted => {}
            SortOrder::Ascending => filtered.sort_by(compare_names),
            SortOrder::Descending => filtered.sort_by(|a, b| compare_names(b, a)),
        }

        filtered
    }
}

fn compare_names(a: &Workflow, b: &Workflow) -> Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}
