//! Tracks here-document bodies captured during a parse.
//!
//! A here-document's body lives on the lines after the redirection
//! operator, outside the token stream the grammar is looking at. When the
//! delimiter word of a `<<` or `<<-` redirection is reduced, the body is
//! located and its byte range recorded here; whenever the grammar crosses
//! a newline it consults the recorded ranges and resumes past any body it
//! would otherwise walk into.

use std::cell::RefCell;
use std::collections::HashMap;

/// A captured here-document body, in 0-based byte offsets.
///
/// `first` is the offset of the first byte of the body; `last` is the
/// offset of the newline terminating the closing delimiter line, or the
/// end of input for an unterminated body. Ranges may abut but never
/// overlap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct HeredocRange {
    pub(crate) first: usize,
    pub(crate) last: usize,
}

/// Per-parse index of here-document body ranges, ordered latest-first.
///
/// The grammar only holds a shared reference to its parameters, so the
/// state lives behind `RefCell`s. The skip side (`in_body`,
/// `skip_through`) never mutates; `capture` records a range at most once
/// per invocation offset, so re-entry under PEG backtracking observes
/// identical state.
pub(crate) struct HeredocTracker {
    ranges: RefCell<Vec<HeredocRange>>,
    bodies: RefCell<HashMap<usize, String>>,
    trace: bool,
}

impl HeredocTracker {
    pub(crate) fn new(trace: bool) -> Self {
        Self {
            ranges: RefCell::new(vec![]),
            bodies: RefCell::new(HashMap::new()),
            trace,
        }
    }

    /// Returns whether `pos` lies inside a captured body.
    pub(crate) fn in_body(&self, pos: usize) -> bool {
        self.skip_through(pos) != pos
    }

    /// Returns the position at which parsing should resume: `last` of the
    /// covering range, chained across abutting ranges, or `pos` unchanged
    /// when no range covers it.
    pub(crate) fn skip_through(&self, pos: usize) -> usize {
        let ranges = self.ranges.borrow();
        let mut pos = pos;
        while let Some(range) = ranges.iter().find(|r| r.first <= pos && pos < r.last) {
            pos = range.last;
        }
        pos
    }

    /// Records a captured body range at the front of the index.
    pub(crate) fn record(&self, first: usize, last: usize) {
        if self.trace {
            tracing::debug!(target: "heredoc", first, last, "recorded body range");
        }
        self.ranges.borrow_mut().insert(0, HeredocRange { first, last });
    }

    #[cfg(test)]
    pub(crate) fn ranges(&self) -> Vec<HeredocRange> {
        self.ranges.borrow().clone()
    }

    pub(crate) fn has_range_containing(&self, pos: usize) -> bool {
        self.ranges
            .borrow()
            .iter()
            .any(|r| r.first <= pos && pos < r.last)
    }

    /// Captures the body for a here-document whose delimiter word ends at
    /// byte offset `at`.
    ///
    /// The body starts after the next newline at or beyond `at`, skipping
    /// any bodies already claimed by earlier redirections on the same
    /// line, and runs to the line consisting of the delimiter (allowing
    /// leading tabs when `strip_tabs` is set) or to the end of input when
    /// no such line exists. Returns the body with, for `strip_tabs`,
    /// leading tabs removed from each line. Consumes no input; re-invoking
    /// at the same offset returns the previously captured body untouched.
    pub(crate) fn capture(&self, src: &str, delimiter: &str, strip_tabs: bool, at: usize) -> String {
        if let Some(body) = self.bodies.borrow().get(&at) {
            return body.clone();
        }

        // Body candidates begin after the next newline.
        let mut first = match src[at..].find('\n') {
            Some(i) => at + i + 1,
            None => src.len(),
        };

        // Skip past bodies already claimed by redirections stacked on the
        // same command line.
        while self.has_range_containing(first) {
            let skipped = self.skip_through(first);
            first = (skipped + 1).min(src.len());
        }

        // Scan forward a line at a time for the delimiter.
        let mut line_start = first;
        let (body_end, last) = loop {
            if line_start >= src.len() {
                break (src.len(), src.len());
            }
            let line_end = src[line_start..]
                .find('\n')
                .map_or(src.len(), |i| line_start + i);
            let line = &src[line_start..line_end];
            let candidate = if strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line
            };
            if candidate == delimiter {
                break (line_start, line_end);
            }
            if line_end >= src.len() {
                break (src.len(), src.len());
            }
            line_start = line_end + 1;
        };

        let raw = &src[first..body_end];
        let body: String = if strip_tabs {
            raw.split_inclusive('\n')
                .map(|line| line.trim_start_matches('\t'))
                .collect()
        } else {
            raw.to_owned()
        };

        if self.trace {
            tracing::debug!(target: "heredoc", delimiter, at, len = body.len(), "captured body");
        }

        self.record(first, last);
        self.bodies.borrow_mut().insert(at, body.clone());
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_simple_body() {
        let src = "cat <<EOF\nhello\nEOF\n";
        let tracker = HeredocTracker::new(false);
        assert_eq!(tracker.capture(src, "EOF", false, 9), "hello\n");
        assert_eq!(tracker.ranges(), vec![HeredocRange { first: 10, last: 19 }]);
    }

    #[test]
    fn test_skip_through_covers_body() {
        let src = "cat <<EOF\nhello\nEOF\n";
        let tracker = HeredocTracker::new(false);
        tracker.capture(src, "EOF", false, 9);

        assert_eq!(tracker.skip_through(10), 19);
        assert_eq!(tracker.skip_through(18), 19);
        assert_eq!(tracker.skip_through(19), 19);
        assert!(!tracker.in_body(9));
        assert!(tracker.in_body(10));
        assert!(!tracker.in_body(19));
    }

    #[test]
    fn test_strips_leading_tabs() {
        let src = "cat <<-END\n\thi\n\tEND\n";
        let tracker = HeredocTracker::new(false);
        assert_eq!(tracker.capture(src, "END", true, 10), "hi\n");
        assert_eq!(tracker.ranges(), vec![HeredocRange { first: 11, last: 19 }]);
    }

    #[test]
    fn test_unterminated_body_runs_to_end_of_input() {
        let src = "cat <<EOF\nabc\n";
        let tracker = HeredocTracker::new(false);
        assert_eq!(tracker.capture(src, "EOF", false, 9), "abc\n");
        assert_eq!(tracker.ranges(), vec![HeredocRange { first: 10, last: 14 }]);
    }

    #[test]
    fn test_delimiter_on_final_unterminated_line() {
        let src = "cat <<EOF\nabc\nEOF";
        let tracker = HeredocTracker::new(false);
        assert_eq!(tracker.capture(src, "EOF", false, 9), "abc\n");
        assert_eq!(tracker.ranges(), vec![HeredocRange { first: 10, last: 17 }]);
    }

    #[test]
    fn test_stacked_redirections_share_one_line() {
        let src = "cat <<A <<B\n1\nA\n2\nB\n";
        let tracker = HeredocTracker::new(false);
        assert_eq!(tracker.capture(src, "A", false, 7), "1\n");
        assert_eq!(tracker.capture(src, "B", false, 11), "2\n");
        assert_eq!(
            tracker.ranges(),
            vec![
                HeredocRange { first: 16, last: 19 },
                HeredocRange { first: 12, last: 15 },
            ]
        );
    }

    #[test]
    fn test_capture_is_idempotent_per_offset() {
        let src = "cat <<EOF\nhello\nEOF\n";
        let tracker = HeredocTracker::new(false);
        let first = tracker.capture(src, "EOF", false, 9);
        let second = tracker.capture(src, "EOF", false, 9);
        assert_eq!(first, second);
        assert_eq!(tracker.ranges().len(), 1);
    }

    #[test]
    fn test_delimiter_punctuation_matches_literally() {
        let src = "cat <<E.F\nExF\nE.F\n";
        let tracker = HeredocTracker::new(false);
        assert_eq!(tracker.capture(src, "E.F", false, 9), "ExF\n");
    }
}
