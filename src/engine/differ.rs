//! Field-by-field record comparison.

use super::stats::{increment, StreamStats};
use crate::protocol::{values_equal, RecordEvent};

/// Compare two records of the same stream and update the column counters.
///
/// Fields only on the left count as `right_missing`, fields only on the
/// right count as `left_missing`. Shared fields count as `diff` or `equal`
/// under structural equality. Every field touched gets an entry in all four
/// counter maps, even when it is only incremented in one of them.
pub fn diff_records(left: &RecordEvent, right: &RecordEvent, stats: &mut StreamStats) {
    for (column, left_value) in &left.fields {
        stats.touch_column(column);
        match right.fields.get(column) {
            None => increment(&mut stats.right_missing_count, column),
            Some(right_value) if !values_equal(left_value, right_value) => {
                increment(&mut stats.diff_count, column)
            }
            Some(_) => increment(&mut stats.equal_count, column),
        }
    }

    for column in right.fields.keys() {
        stats.touch_column(column);
        if !left.fields.contains_key(column) {
            increment(&mut stats.left_missing_count, column);
        }
    }
}
