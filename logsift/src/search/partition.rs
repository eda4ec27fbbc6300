/// Scan direction over the row index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// One worker's share of a strided partition.
///
/// The worker visits `count` rows beginning at `start`, moving `step`
/// rows per visit in the scan direction. Stride 0 always begins at the
/// scan origin, so lower stride indices stay closer to the origin
/// throughout the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStride {
    pub start: usize,
    pub count: usize,
    pub step: usize,
    pub direction: Direction,
}

impl ThreadStride {
    /// Rows of this stride in visit order
    pub fn rows(&self) -> impl Iterator<Item = usize> {
        let ThreadStride {
            start,
            count,
            step,
            direction,
        } = *self;
        (0..count).map_while(move |i| match direction {
            Direction::Forward => start.checked_add(i * step),
            Direction::Backward => start.checked_sub(i * step),
        })
    }
}

/// Contiguous share of a block partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBlock {
    pub first_row: usize,
    pub count: usize,
}

/// Interleaves the rows of a chunk over `workers` strides.
///
/// `origin` is the first row visited: the lowest row of the chunk when
/// scanning forward, the highest when scanning backward. Worker `t`
/// starts `t` rows beyond the origin and steps by the worker count, so
/// the remainder rows fall to the lowest stride indices.
pub fn strided(origin: usize, rows: usize, workers: usize, direction: Direction) -> Vec<ThreadStride> {
    debug_assert!(workers > 0);
    (0..workers)
        .map(|t| {
            let count = rows / workers + usize::from(t < rows % workers);
            let start = match direction {
                Direction::Forward => origin + t,
                // Underflow only happens with count == 0, the stride is
                // never walked then
                Direction::Backward => origin.checked_sub(t).unwrap_or(0),
            };
            ThreadStride {
                start,
                count,
                step: workers,
                direction,
            }
        })
        .collect()
}

/// Splits rows into `workers` contiguous blocks; the remainder goes to
/// the last block
pub fn blocks(first_row: usize, rows: usize, workers: usize) -> Vec<RowBlock> {
    debug_assert!(workers > 0);
    let per_worker = rows / workers;
    (0..workers)
        .map(|t| RowBlock {
            first_row: first_row + t * per_worker,
            count: if t + 1 == workers {
                rows - (workers - 1) * per_worker
            } else {
                per_worker
            },
        })
        .collect()
}

/// Worker count actually worth using for a row range. Small ranges run
/// single threaded.
pub fn usable_workers(rows: usize, configured: usize, multi_thread_row_floor: usize) -> usize {
    if rows > multi_thread_row_floor {
        configured.max(1)
    } else {
        1
    }
}

/// Whether the strides visit every row of `[first_row, first_row + rows)`
/// exactly once
pub fn verify_coverage(strides: &[ThreadStride], first_row: usize, rows: usize) -> bool {
    let mut seen = vec![false; rows];
    for stride in strides {
        for row in stride.rows() {
            let Some(index) = row.checked_sub(first_row) else {
                return false;
            };
            if index >= rows || seen[index] {
                return false;
            }
            seen[index] = true;
        }
    }
    seen.iter().all(|&visited| visited)
}
