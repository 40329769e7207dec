//! Counterexamples for failed set properties.
//!
//! A counterexample collects the operation trace that preceded a failure,
//! optional notes about the set's state at given steps, and any structural
//! damage found in the tree. `render_diagram` lays the trace out with one
//! column per thread so an interleaving can be read top to bottom.

use std::collections::BTreeMap;
use std::fmt;

/// Evidence for one property violation.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Notes on the set's state, keyed by step
    pub states: Vec<StateSnapshot>,
    /// Operations in the order they ran
    pub interleaving: Vec<ThreadAction>,
    /// Structural problems found in the tree
    pub tree_issues: Vec<TreeIssue>,
    /// DST seed that reproduces the run
    pub dst_seed: Option<u64>,
    pub description: Option<String>,
}

/// What the set looked like after a step.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub step: u64,
    pub summary: String,
    /// Named counters, e.g. `("expected_len", 4)`
    pub counts: Vec<(&'static str, usize)>,
}

/// One set operation issued by a thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    pub thread: usize,
    pub step: u64,
    /// Operation as issued, e.g. `Remove(5)`
    pub op: String,
    /// Boolean the operation returned
    pub returned: bool,
}

/// Structural problem in an ordered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeIssue {
    /// A node's value lies outside the open interval its ancestors imply
    OutOfBounds {
        value: i64,
        low: Option<i64>,
        high: Option<i64>,
    },
    /// A key that should be live is not reachable
    LostKey { key: i64 },
    /// A reachable key that should not be live
    PhantomKey { key: i64 },
}

impl Counterexample {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "Snapshots must be added in step order"
        );
        self.states.push(state);
    }

    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    pub fn add_tree_issue(&mut self, issue: TreeIssue) {
        self.tree_issues.push(issue);
    }

    /// Render the trace as a table with one column per thread.
    ///
    /// ```text
    /// DST_SEED=12345
    ///
    /// step | t0           | t1           | state
    ///    7 | Insert(5)    |              | len=3
    ///    8 |              | Remove(9) -> false |
    /// ```
    ///
    /// Steps with no recorded action are skipped.
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut out = String::new();

        if let Some(seed) = self.dst_seed {
            out.push_str(&format!("DST_SEED={}\n\n", seed));
        }
        if let Some(desc) = &self.description {
            out.push_str(&format!("Failure: {}\n\n", desc));
        }

        if self.interleaving.is_empty() {
            out.push_str("(no operations recorded)\n");
        } else {
            out.push_str(&self.render_trace());
        }

        if !self.tree_issues.is_empty() {
            out.push_str("\nTree issues:\n");
            for issue in &self.tree_issues {
                out.push_str(&format!("  - {}\n", issue));
            }
        }

        out
    }

    fn render_trace(&self) -> String {
        let cell = |a: &ThreadAction| {
            if a.returned {
                a.op.clone()
            } else {
                format!("{} -> false", a.op)
            }
        };

        let threads: Vec<usize> = {
            let mut ids: Vec<usize> = self.interleaving.iter().map(|a| a.thread).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let width = self
            .interleaving
            .iter()
            .map(|a| cell(a).len())
            .max()
            .unwrap_or(0)
            .max(4);

        let mut rows: BTreeMap<u64, Vec<&ThreadAction>> = BTreeMap::new();
        for action in &self.interleaving {
            rows.entry(action.step).or_default().push(action);
        }

        let mut out = String::from("step |");
        for t in &threads {
            out.push_str(&format!(" {:<width$} |", format!("t{}", t)));
        }
        out.push_str(" state\n");

        for (step, actions) in rows {
            out.push_str(&format!("{:>4} |", step));
            for t in &threads {
                let text = actions
                    .iter()
                    .find(|a| a.thread == *t)
                    .map(|a| cell(*a))
                    .unwrap_or_default();
                out.push_str(&format!(" {:<width$} |", text));
            }
            if let Some(state) = self.states.iter().find(|s| s.step == step) {
                out.push(' ');
                out.push_str(&state.summary);
            }
            out.push('\n');
        }
        out
    }
}

fn bound(b: Option<i64>, open: &str) -> String {
    b.map_or_else(|| open.to_string(), |v| v.to_string())
}

impl fmt::Display for TreeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeIssue::OutOfBounds { value, low, high } => write!(
                f,
                "Value {} outside ancestor bounds ({}, {})",
                value,
                bound(*low, "-inf"),
                bound(*high, "+inf")
            ),
            TreeIssue::LostKey { key } => write!(f, "Key {} is live but unreachable", key),
            TreeIssue::PhantomKey { key } => {
                write!(f, "Key {} is reachable but was never live", key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(thread: usize, step: u64, op: &str, returned: bool) -> ThreadAction {
        ThreadAction {
            thread,
            step,
            op: op.to_string(),
            returned,
        }
    }

    #[test]
    fn test_empty_counterexample() {
        let ce = Counterexample::new();
        assert!(ce.dst_seed.is_none());
        assert!(ce.render_diagram().contains("(no operations recorded)"));
    }

    #[test]
    fn test_render_diagram() {
        let mut ce = Counterexample::with_seed(42).with_description("lost key 5".to_string());
        ce.add_action(action(0, 1, "Insert(5)", true));
        ce.add_action(action(1, 2, "Remove(7)", false));
        ce.add_state(StateSnapshot {
            step: 1,
            summary: "len=1".to_string(),
            counts: vec![("len", 1)],
        });
        ce.add_tree_issue(TreeIssue::OutOfBounds {
            value: 9,
            low: None,
            high: Some(5),
        });

        let diagram = ce.render_diagram();
        assert!(diagram.starts_with("DST_SEED=42"));
        assert!(diagram.contains("Failure: lost key 5"));
        assert!(diagram.contains("t1"));
        assert!(diagram.contains("Remove(7) -> false"));
        assert!(diagram.contains("len=1"));
        assert!(diagram.contains("Value 9 outside ancestor bounds (-inf, 5)"));
    }

    #[test]
    fn test_diagram_rows_follow_steps() {
        let mut ce = Counterexample::new();
        ce.add_action(action(0, 40, "Contains(1)", true));
        ce.add_action(action(0, 38, "Insert(1)", true));

        let diagram = ce.render_diagram();
        let first = diagram.find("  38 |").unwrap();
        let second = diagram.find("  40 |").unwrap();
        assert!(first < second);
    }
}
