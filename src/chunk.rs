// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Splitting of row batches into insert requests that fit the payload quota
//!
//! Rows are distributed by count, not by their individual sizes, so a chunk
//! holding unusually wide rows can still exceed the quota.

use std::ops::Range;

/// Maximum size in bytes of a single streaming insert request
pub const MAX_PAYLOAD: usize = 10_485_760;

/// Extra chunks reserved on top of `size / max_payload` as a ratio (11/10),
/// the estimate is approximate and the wire encoding adds its own overhead.
pub const SAFETY_MARGIN: (u128, u128) = (11, 10);

/// Ordered, gap-free partition of `0..rows` into contiguous ranges.
///
/// Ranges are computed on demand, a plan holds no per-chunk state. Empty
/// ranges only ever appear as a tail once `i * step` has passed `rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    rows: usize,
    step: usize,
    chunks: usize,
}

impl ChunkPlan {
    /// Plan the chunks for `rows` rows whose estimated size is `size` bytes.
    ///
    /// Below `max_payload` the whole batch goes out as one chunk. Otherwise
    /// `ceil(1.1 * size / max_payload)` chunks of `ceil(rows / chunks)` rows
    /// each are produced, the last one running to the end of the batch.
    pub fn new(rows: usize, size: usize, max_payload: usize) -> Self {
        let chunks = chunk_count(size, max_payload);
        if chunks <= 1 || rows == 0 {
            return Self::single(rows);
        }

        Self {
            rows,
            step: rows.div_ceil(chunks),
            chunks,
        }
    }

    /// A plan sending all rows in one request
    pub fn single(rows: usize) -> Self {
        Self {
            rows,
            step: rows,
            chunks: 1,
        }
    }

    /// Number of chunks, including empty trailing ones
    pub fn len(&self) -> usize {
        self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }

    /// Whether the batch was split at all
    pub fn is_split(&self) -> bool {
        self.chunks > 1
    }

    /// Rows per chunk, except for the last chunk
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row range of chunk `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`len`](Self::len).
    pub fn range(&self, index: usize) -> Range<usize> {
        assert!(index < self.chunks, "chunk {index} out of {}", self.chunks);
        let start = index.saturating_mul(self.step).min(self.rows);
        let end = if index + 1 == self.chunks {
            self.rows
        } else {
            (index + 1).saturating_mul(self.step).min(self.rows)
        };
        start..end
    }

    /// Every range in order, empty ones included
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.chunks).map(move |index| self.range(index))
    }

    /// Number of chunks holding at least one row
    pub fn occupied_len(&self) -> usize {
        if self.rows == 0 {
            return 0;
        }
        self.rows.div_ceil(self.step).min(self.chunks)
    }

    /// Non-empty chunks in order with their index, the empty tail is never visited
    pub fn occupied(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        (0..self.occupied_len()).map(move |index| (index, self.range(index)))
    }

    /// Slice `rows` along this plan.
    ///
    /// # Panics
    ///
    /// Panics if `rows` is shorter than the batch the plan was made for.
    pub fn split<'a, T>(&'a self, rows: &'a [T]) -> impl Iterator<Item = &'a [T]> + 'a {
        self.ranges().map(move |range| &rows[range])
    }
}

/// `ceil(1.1 * size / max_payload)` when `size` reaches the quota, 1 below it
pub fn chunk_count(size: usize, max_payload: usize) -> usize {
    if max_payload == 0 || size < max_payload {
        return 1;
    }
    let (num, den) = SAFETY_MARGIN;
    // Exact integer ceiling, no float rounding at chunk boundaries.
    (size as u128 * num).div_ceil(max_payload as u128 * den) as usize
}
