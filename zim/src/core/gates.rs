//! Pure eligibility gates shared by the selection engine.

use std::collections::BTreeSet;

use crate::config::SelectionMode;

/// Tracks whether iteration has reached the first application to process.
#[derive(Debug, Clone)]
pub struct ResumeCursor<'a> {
    first_app: Option<&'a str>,
    reached: bool,
}

impl<'a> ResumeCursor<'a> {
    pub fn new(first_app: Option<&'a str>) -> Self {
        Self {
            first_app,
            reached: first_app.is_none(),
        }
    }

    /// Advance past `key`; returns false while the cursor has not been reached.
    pub fn admit(&mut self, key: &str) -> bool {
        if !self.reached && self.first_app == Some(key) {
            self.reached = true;
        }
        self.reached
    }
}

/// An application must carry every include tag and none of the exclude tags.
pub fn tags_admit(
    tags: &BTreeSet<String>,
    include: &BTreeSet<String>,
    exclude: &BTreeSet<String>,
) -> bool {
    include.is_subset(tags) && exclude.is_disjoint(tags)
}

/// Decide a command's eligibility from the application's change state.
pub fn mode_admits(mode: SelectionMode, has_unpushed_changes: bool) -> bool {
    match mode {
        SelectionMode::All => true,
        SelectionMode::OnlyChanged => has_unpushed_changes,
        SelectionMode::OnlyUnchanged => !has_unpushed_changes,
    }
}
