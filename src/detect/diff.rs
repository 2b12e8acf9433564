//! Unified line diff between two normalized snapshots.

use similar::TextDiff;

pub const CONTEXT_LINES: usize = 3;
pub const SUMMARY_LINES: usize = 100;
pub const NO_CHANGES: &str = "No changes detected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Full unified diff; empty when the inputs are identical.
    pub text: String,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffOutcome {
    pub fn has_changes(&self) -> bool {
        !self.text.is_empty()
    }

    /// The first `max_lines` lines of the diff, or [`NO_CHANGES`].
    pub fn summary(&self, max_lines: usize) -> String {
        if !self.has_changes() {
            return NO_CHANGES.to_string();
        }
        self.text
            .lines()
            .take(max_lines)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Diff `previous` against `current`; the labels name the two sides in the
/// `---`/`+++` headers.
pub fn unified_diff(
    previous: &str,
    current: &str,
    previous_label: &str,
    current_label: &str,
) -> DiffOutcome {
    let diff = TextDiff::from_lines(previous, current);
    let text = diff
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(previous_label, current_label)
        .to_string();

    let (additions, deletions) = count_changes(&text);
    DiffOutcome {
        text,
        additions,
        deletions,
    }
}

fn count_changes(text: &str) -> (usize, usize) {
    text.lines().fold((0, 0), |(add, del), line| {
        if line.starts_with('+') && !line.starts_with("+++") {
            (add + 1, del)
        } else if line.starts_with('-') && !line.starts_with("---") {
            (add, del + 1)
        } else {
            (add, del)
        }
    })
}
