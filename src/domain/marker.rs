//! Marker evaluation: classifies captured output lines against ordered
//! fail/warn/pass regex sets and derives a single verdict.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Step verdict with strict precedence. Merging two statuses always
/// keeps the more severe one; `Fail` is absorbing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    #[default]
    Unknown,
    Success,
    Warning,
    Fail,
}

impl Status {
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    #[must_use]
    pub fn is_fail(self) -> bool {
        self == Self::Fail
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Fail => "FAIL",
        };
        write!(f, "{s}")
    }
}

/// Compiled marker patterns attached to one command.
#[derive(Debug, Clone, Default)]
pub struct Marker {
    fail: Vec<Regex>,
    warn: Vec<Regex>,
    pass: Vec<Regex>,
    fail_when_no_pass: bool,
}

/// Outcome of evaluating captured output against a [`Marker`].
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub status: Status,
    /// Lines that matched a fail pattern, plus any synthetic errors
    pub errors: Vec<String>,
    pub pass_hits: usize,
    /// Whether any pattern matched any line at all
    pub matched: bool,
}

impl Marker {
    pub fn new(
        fail: &[String],
        warn: &[String],
        pass: &[String],
        fail_when_no_pass: bool,
    ) -> Result<Self> {
        Ok(Self {
            fail: compile_all(fail)?,
            warn: compile_all(warn)?,
            pass: compile_all(pass)?,
            fail_when_no_pass,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fail.is_empty() && self.warn.is_empty() && self.pass.is_empty()
    }

    /// Classifies every line and merges per-line verdicts by precedence.
    ///
    /// Per line, fail patterns are tried first and short-circuit the
    /// remaining classes; then warn, then pass. A fail match records the
    /// offending line as an error. With `fail_when_no_pass` set, pass
    /// patterns configured, and zero pass hits, the final status is
    /// forced to `Fail` with a synthetic error.
    #[must_use]
    pub fn evaluate<S: AsRef<str>>(&self, lines: &[S]) -> Evaluation {
        let mut eval = Evaluation::default();

        for line in lines {
            let line = line.as_ref();
            if self.fail.iter().any(|re| re.is_match(line)) {
                eval.status = eval.status.merge(Status::Fail);
                eval.errors.push(line.to_string());
                eval.matched = true;
                continue;
            }
            if self.warn.iter().any(|re| re.is_match(line)) {
                eval.status = eval.status.merge(Status::Warning);
                eval.matched = true;
                continue;
            }
            if self.pass.iter().any(|re| re.is_match(line)) {
                eval.status = eval.status.merge(Status::Success);
                eval.pass_hits += 1;
                eval.matched = true;
            }
        }

        if self.fail_when_no_pass
            && !self.pass.is_empty()
            && eval.pass_hits == 0
            && eval.status != Status::Fail
        {
            eval.status = Status::Fail;
            eval.errors
                .push("no line matched any pass pattern".to_string());
        }

        eval
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| FlowError::InvalidMarker {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn marker(fail: &[&str], warn: &[&str], pass: &[&str], fail_when_no_pass: bool) -> Marker {
        let to_vec = |v: &[&str]| v.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        Marker::new(
            &to_vec(fail),
            &to_vec(warn),
            &to_vec(pass),
            fail_when_no_pass,
        )
        .unwrap()
    }

    #[test]
    fn test_status_precedence_order() {
        assert!(Status::Unknown < Status::Success);
        assert!(Status::Success < Status::Warning);
        assert!(Status::Warning < Status::Fail);
    }

    #[test]
    fn test_merge_keeps_most_severe() {
        assert_eq!(Status::Success.merge(Status::Warning), Status::Warning);
        assert_eq!(Status::Fail.merge(Status::Success), Status::Fail);
        assert_eq!(Status::Unknown.merge(Status::Unknown), Status::Unknown);
    }

    #[test]
    fn test_evaluate_pass_only() {
        let m = marker(&["ERROR"], &[], &["OK"], false);
        let eval = m.evaluate(&["step one OK", "step two OK"]);
        assert_eq!(eval.status, Status::Success);
        assert_eq!(eval.pass_hits, 2);
        assert!(eval.errors.is_empty());
    }

    #[test]
    fn test_evaluate_fail_short_circuits_line() {
        // A line matching both fail and pass counts only as fail.
        let m = marker(&["ERROR"], &[], &["OK"], false);
        let eval = m.evaluate(&["ERROR but also OK"]);
        assert_eq!(eval.status, Status::Fail);
        assert_eq!(eval.pass_hits, 0);
        assert_eq!(eval.errors.len(), 1);
    }

    #[test]
    fn test_evaluate_fail_absorbing() {
        let m = marker(&["ERROR"], &["WARN"], &["OK"], false);
        let eval = m.evaluate(&["ERROR here", "all OK", "WARN there", "more OK"]);
        assert_eq!(eval.status, Status::Fail);
    }

    #[test]
    fn test_evaluate_warn_does_not_downgrade() {
        let m = marker(&[], &["WARN"], &["OK"], false);
        let eval = m.evaluate(&["WARN low disk", "service OK"]);
        assert_eq!(eval.status, Status::Warning);
    }

    #[test]
    fn test_fail_when_no_pass_forces_fail() {
        let m = marker(&["ERROR"], &[], &["STARTED"], true);
        let eval = m.evaluate(&["nothing relevant"]);
        assert_eq!(eval.status, Status::Fail);
        assert_eq!(eval.errors.len(), 1);
        assert!(eval.errors[0].contains("pass pattern"));
    }

    #[test]
    fn test_fail_when_no_pass_inactive_without_pass_patterns() {
        let m = marker(&["ERROR"], &[], &[], true);
        let eval = m.evaluate(&["nothing relevant"]);
        assert_eq!(eval.status, Status::Unknown);
        assert!(eval.errors.is_empty());
    }

    #[test]
    fn test_fail_when_no_pass_does_not_double_fail() {
        let m = marker(&["ERROR"], &[], &["STARTED"], true);
        let eval = m.evaluate(&["ERROR boom"]);
        assert_eq!(eval.status, Status::Fail);
        // Only the real failing line, no synthetic error on top.
        assert_eq!(eval.errors.len(), 1);
    }

    #[test]
    fn test_no_match_reports_unknown_unmatched() {
        let m = marker(&["ERROR"], &["WARN"], &["OK"], false);
        let eval = m.evaluate(&["plain output line"]);
        assert_eq!(eval.status, Status::Unknown);
        assert!(!eval.matched);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Marker::new(&["[unclosed".to_string()], &[], &[], false).unwrap_err();
        assert!(matches!(err, FlowError::InvalidMarker { .. }));
    }

    proptest! {
        // Any line matching a fail pattern makes the final status FAIL,
        // regardless of how many pass/warn lines surround it.
        #[test]
        fn prop_fail_line_dominates(
            before in proptest::collection::vec("(OK|WARN)[a-z ]{0,16}", 0..8),
            after in proptest::collection::vec("(OK|WARN)[a-z ]{0,16}", 0..8),
        ) {
            let m = marker(&["ERROR"], &["WARN"], &["OK"], false);
            let mut lines = before;
            lines.push("ERROR injected".to_string());
            lines.extend(after);
            prop_assert_eq!(m.evaluate(&lines).status, Status::Fail);
        }

        // merge is commutative and idempotent over the whole enum.
        #[test]
        fn prop_merge_lattice(a in 0u8..4, b in 0u8..4) {
            let of = |n| match n {
                0 => Status::Unknown,
                1 => Status::Success,
                2 => Status::Warning,
                _ => Status::Fail,
            };
            let (a, b) = (of(a), of(b));
            prop_assert_eq!(a.merge(b), b.merge(a));
            prop_assert_eq!(a.merge(a), a);
            prop_assert!(a.merge(b) >= a);
        }
    }
}
