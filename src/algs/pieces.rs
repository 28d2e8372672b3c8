//! Balanced contiguous assignment of pieces to reading processes.

use std::ops::Range;

/// Which pieces one process owns out of `total`, given `width` workers.
///
/// The first `total % width` workers receive one extra piece, so range
/// lengths differ by at most one and the ranges tile `[0, total)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceAssignment {
    total: usize,
    width: usize,
    index: usize,
    range: Range<usize>,
}

impl PieceAssignment {
    /// `width` of zero is treated as one worker.
    pub fn new(total: usize, width: usize, index: usize) -> Self {
        let width = width.max(1);
        let range = piece_range(total, width, index);
        Self {
            total,
            width,
            index,
            range,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// This process's worker index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Half-open range of owned piece indices.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// A worker with no pieces reads nothing and yields an empty result.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Recompute after the piece count or requested width changed.
    pub fn update(&mut self, total: usize, width: usize) {
        if total != self.total || width.max(1) != self.width {
            *self = Self::new(total, width, self.index);
        }
    }
}

/// Contiguous block of pieces owned by worker `index` of `width`.
pub fn piece_range(total: usize, width: usize, index: usize) -> Range<usize> {
    let width = width.max(1);
    if index >= width {
        return total..total;
    }
    let per = total / width;
    let extra = total % width;
    let start = if index < extra {
        index * (per + 1)
    } else {
        index * per + extra
    };
    let len = if index < extra { per + 1 } else { per };
    start..start + len
}
