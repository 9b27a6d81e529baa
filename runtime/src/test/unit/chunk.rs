use test_case::test_case;

use crate::chunk::{Chunk, ChunkPlan};

#[test_case(4, 1, 4 ; "one row each")]
#[test_case(10, 3, 4 ; "short last chunk")]
#[test_case(9, 3, 3 ; "exact")]
#[test_case(2, 8, 1 ; "larger than problem")]
#[test_case(0, 4, 0 ; "empty")]
fn test_plan_len(rows: usize, rows_per_chunk: usize, len: usize) {
    let plan = ChunkPlan::new(rows, rows_per_chunk);
    assert_eq!(plan.len(), len);
    assert_eq!(plan.iter().count(), len);
    assert_eq!(plan.is_empty(), len == 0);
}

#[test]
fn test_last_chunk_is_short() {
    let plan = ChunkPlan::new(10, 4);
    let chunks: Vec<_> = plan.iter().collect();
    assert_eq!(
        chunks,
        vec![
            Chunk { index: 0, row_start: 0, rows: 4 },
            Chunk { index: 1, row_start: 4, rows: 4 },
            Chunk { index: 2, row_start: 8, rows: 2 },
        ]
    );
    assert_eq!(plan.chunk(3), None);
}

#[test]
fn test_offsets() {
    let chunk = Chunk { index: 2, row_start: 6, rows: 3 };
    assert_eq!(chunk.offset(5), 30);
    assert_eq!(chunk.len(5), 15);
}

#[test]
fn test_zero_rows_per_chunk_is_clamped() {
    let plan = ChunkPlan::new(3, 0);
    assert_eq!(plan.rows_per_chunk(), 1);
    assert_eq!(plan.len(), 3);
}
