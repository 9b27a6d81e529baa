//! Row-chunk decomposition of a problem.

/// A contiguous range of rows, identified by its iteration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub index: usize,
    pub row_start: usize,
    pub rows: usize,
}

impl Chunk {
    /// Element offset of the chunk in a row-major matrix with `cols` columns.
    pub fn offset(&self, cols: usize) -> usize {
        self.row_start * cols
    }

    /// Element count of the chunk in a row-major matrix with `cols` columns.
    pub fn len(&self, cols: usize) -> usize {
        self.rows * cols
    }
}

/// Ascending sequence of chunks covering `rows` rows.
///
/// Every chunk has `rows_per_chunk` rows except possibly the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    rows: usize,
    rows_per_chunk: usize,
}

impl ChunkPlan {
    pub fn new(rows: usize, rows_per_chunk: usize) -> Self {
        Self { rows, rows_per_chunk: rows_per_chunk.max(1) }
    }

    pub fn rows_per_chunk(&self) -> usize {
        self.rows_per_chunk
    }

    /// Number of iterations.
    pub fn len(&self) -> usize {
        self.rows.div_ceil(self.rows_per_chunk)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        let row_start = index.checked_mul(self.rows_per_chunk)?;
        (row_start < self.rows).then(|| Chunk {
            index,
            row_start,
            rows: self.rows_per_chunk.min(self.rows - row_start),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.len()).filter_map(|index| self.chunk(index))
    }
}
