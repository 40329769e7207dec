//! Property results and the checker trait.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking a single named property.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Property name (e.g., "SortedOrder")
    pub name: &'static str,
    /// Whether the property holds
    pub holds: bool,
    /// Failure description
    pub message: Option<String>,
    /// Failure path, when one could be reconstructed
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A property that holds.
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            message: None,
            counterexample: None,
        }
    }

    /// A violated property.
    #[must_use]
    pub fn fail(
        name: &'static str,
        message: String,
        counterexample: Option<Counterexample>,
    ) -> Self {
        debug_assert!(!message.is_empty(), "Failure must carry a message");
        Self {
            name,
            holds: false,
            message: Some(message),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.holds {
            return write!(f, "[PASS] {}", self.name);
        }

        write!(
            f,
            "[FAIL] {}: {}",
            self.name,
            self.message.as_deref().unwrap_or("violated")
        )?;
        if let Some(ref ce) = self.counterexample {
            write!(f, "\n{}", ce.render_diagram())?;
        }
        Ok(())
    }
}

/// A checker evaluates every property of one structure.
pub trait PropertyChecker {
    /// Check every property and return one result per property.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// Whether every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// The first violated property, if any.
    fn first_failure(&self) -> Option<PropertyResult> {
        self.check_all().into_iter().find(|r| !r.holds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<PropertyResult>);

    impl PropertyChecker for Fixed {
        fn check_all(&self) -> Vec<PropertyResult> {
            self.0.clone()
        }
    }

    #[test]
    fn test_all_hold() {
        let checker = Fixed(vec![PropertyResult::pass("A"), PropertyResult::pass("B")]);
        assert!(checker.all_hold());
        assert!(checker.first_failure().is_none());
    }

    #[test]
    fn test_first_failure() {
        let checker = Fixed(vec![
            PropertyResult::pass("A"),
            PropertyResult::fail("B", "broken".to_string(), None),
            PropertyResult::fail("C", "also broken".to_string(), None),
        ]);
        assert!(!checker.all_hold());

        let failure = checker.first_failure().unwrap();
        assert_eq!(failure.name, "B");
        assert_eq!(failure.to_string(), "[FAIL] B: broken");
    }
}
