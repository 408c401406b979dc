/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Frame ranges known to contain no visual change.

use animsync_types::TimeRange;

/// Linear-scan index over static frame ranges.
///
/// Only a hint for skipping continuous decode: a miss costs an extra seek, never
/// a wrong frame. Ranges may overlap and arrive in any order.
#[derive(Debug, Clone, Default)]
pub struct StaticTimeRanges {
    ranges: Vec<TimeRange>,
}

impl StaticTimeRanges {
    pub fn new(ranges: Vec<TimeRange>) -> Self {
        Self { ranges }
    }

    pub fn contains(&self, target_frame: i64) -> bool {
        if self.ranges.is_empty() {
            return false;
        }
        self.ranges.iter().any(|range| range.contains(target_frame))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
