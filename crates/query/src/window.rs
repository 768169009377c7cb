//! Result windows for paged reads.

use serde::{Deserialize, Serialize};

/// A window over a query's result set.
///
/// `offset` skips rows from the front of the result and `cap` bounds how
/// many rows are returned. Either bound may be absent, in which case the
/// store applies no restriction on that side. Note the difference from
/// [`NamedQuery::limit`](crate::NamedQuery::limit): a descriptor limit of
/// `0` produces an absent cap here, while an explicit cap of `Some(0)` is
/// honored and yields no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultWindow {
    offset: Option<u32>,
    cap: Option<u32>,
}

impl ResultWindow {
    /// A window with no restriction on either side.
    pub const UNBOUNDED: ResultWindow = ResultWindow {
        offset: None,
        cap: None,
    };

    /// Create a window from optional bounds.
    pub fn new(offset: Option<u32>, cap: Option<u32>) -> Self {
        Self { offset, cap }
    }

    /// Rows to skip from the front of the result, if any.
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    /// Maximum number of rows to return, if any.
    pub fn cap(&self) -> Option<u32> {
        self.cap
    }

    /// Whether the window restricts the result at all.
    pub fn is_unbounded(&self) -> bool {
        self.offset.is_none() && self.cap.is_none()
    }

    /// Apply the window to an already-materialized result.
    ///
    /// Stores that push pagination into the query itself do not need this;
    /// it exists as the reference semantics for engines that evaluate
    /// windows in memory.
    pub fn apply_to<T>(&self, rows: Vec<T>) -> Vec<T> {
        let skip = self.offset.unwrap_or(0) as usize;
        let take = self.cap.map_or(usize::MAX, |cap| cap as usize);
        rows.into_iter().skip(skip).take(take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_window_is_identity() {
        let rows = vec![1, 2, 3, 4];
        assert_eq!(ResultWindow::UNBOUNDED.apply_to(rows.clone()), rows);
        assert!(ResultWindow::UNBOUNDED.is_unbounded());
    }

    #[test]
    fn test_offset_skips_rows() {
        let window = ResultWindow::new(Some(2), None);
        assert_eq!(window.apply_to(vec![1, 2, 3, 4]), vec![3, 4]);
    }

    #[test]
    fn test_offset_past_the_end_yields_nothing() {
        let window = ResultWindow::new(Some(10), None);
        assert_eq!(window.apply_to(vec![1, 2, 3]), Vec::<i32>::new());
    }

    #[test]
    fn test_cap_bounds_rows() {
        let window = ResultWindow::new(None, Some(2));
        assert_eq!(window.apply_to(vec![1, 2, 3, 4]), vec![1, 2]);
    }

    #[test]
    fn test_explicit_zero_cap_yields_nothing() {
        let window = ResultWindow::new(None, Some(0));
        assert_eq!(window.apply_to(vec![1, 2, 3]), Vec::<i32>::new());
    }

    #[test]
    fn test_offset_and_cap_combine() {
        let window = ResultWindow::new(Some(1), Some(2));
        assert_eq!(window.apply_to(vec![1, 2, 3, 4, 5]), vec![2, 3]);
    }
}
