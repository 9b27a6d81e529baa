use test_case::test_case;

use crate::error::Error;
use crate::reference::{Matrix, Verification, blocked_multiply, multiply, verify};

#[test]
fn test_identity_is_neutral() {
    let a = Matrix::seeded(5, 5, 11);
    assert_eq!(multiply(&a, &Matrix::identity(5)).unwrap(), a);
    assert_eq!(multiply(&Matrix::identity(5), &a).unwrap(), a);
}

#[test]
fn test_known_product() {
    let a = Matrix::new(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
    let b = Matrix::new(3, 2, vec![7, 8, 9, 10, 11, 12]).unwrap();
    assert_eq!(multiply(&a, &b).unwrap().as_slice(), &[58, 64, 139, 154]);
}

#[test_case(1 ; "unit tiles")]
#[test_case(4 ; "small tiles")]
#[test_case(16 ; "tile larger than matrix")]
fn test_blocked_matches_plain(tile: usize) {
    let a = Matrix::seeded(9, 7, 1);
    let b = Matrix::seeded(7, 10, 2);
    assert_eq!(blocked_multiply(&a, &b, tile).unwrap(), multiply(&a, &b).unwrap());
}

#[test]
fn test_dimension_mismatch() {
    let error = multiply(&Matrix::zeros(2, 3), &Matrix::zeros(2, 3)).unwrap_err();
    assert!(matches!(error, Error::InvalidProblem { .. }));
    assert!(Matrix::new(2, 2, vec![1, 2, 3]).is_err());
}

#[test]
fn test_seeded_is_reproducible() {
    let a = Matrix::seeded(8, 8, 42);
    assert_eq!(a, Matrix::seeded(8, 8, 42));
    assert_ne!(a, Matrix::seeded(8, 8, 43));
    assert!(a.as_slice().iter().all(|v| (0..=10).contains(v)));
}

#[test]
fn test_transpose() {
    let a = Matrix::new(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
    let t = a.transpose();
    assert_eq!((t.rows(), t.cols()), (3, 2));
    assert_eq!(t.as_slice(), &[1, 4, 2, 5, 3, 6]);
    assert_eq!(t.get(2, 1), Some(6));
    assert_eq!(t.get(3, 0), None);
}

#[test]
fn test_verify_reports_first_mismatch() {
    assert_eq!(verify(&[1, 2, 3], &[1, 2, 3]), Verification::Match);
    let mismatch = verify(&[1, 2, 3, 4], &[1, 9, 3, 0]);
    assert_eq!(mismatch, Verification::Mismatch { index: 1, expected: 2, actual: 9 });
    assert_eq!(mismatch.to_string(), "Mismatch 1: gold: 2 device: 9");
    assert!(!mismatch.is_match());
    assert_eq!(verify(&[1], &[1, 2]), Verification::LengthMismatch { expected: 1, actual: 2 });
}

#[test]
fn test_preview_elides_large_matrices() {
    let small = Matrix::identity(2).preview(16).to_string();
    assert_eq!(small, "   1    0 \n   0    1 \n");

    let large = Matrix::zeros(20, 20).preview(16).to_string();
    assert_eq!(large.lines().count(), 17);
    assert!(large.lines().next().unwrap().ends_with('…'));
    assert!(large.ends_with("⋱\n"));
}
