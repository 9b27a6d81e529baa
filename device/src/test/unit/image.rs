use std::io::Write;

use crate::error::Error;
use crate::image::{KernelImage, SIM_TARGET};

fn write_image(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_valid_image() {
    let file = write_image(r#"{ "name": "matmul", "target": "tandem-sim", "kernels": ["lmult"] }"#);
    let image = KernelImage::load(file.path()).unwrap();

    assert_eq!(image.name, "matmul");
    assert_eq!(image.target, SIM_TARGET);
    assert!(image.provides("lmult"));
    assert!(!image.provides("mmult"));
    assert_eq!(image.kernel("lmult").unwrap().name(), "lmult");
}

#[test]
fn test_simulated_image_roundtrips_through_disk() {
    let image = KernelImage::simulated("all");
    let file = write_image(&image.to_json().unwrap());

    assert_eq!(KernelImage::load(file.path()).unwrap(), image);
    assert_eq!(image.kernels, vec!["lmult".to_string(), "mmult".to_string()]);
}

#[test]
fn test_missing_file() {
    let err = KernelImage::load("/nonexistent/tandem/image.json").unwrap_err();
    assert!(matches!(err, Error::ImageIo { .. }));
}

#[test]
fn test_malformed_manifest() {
    let file = write_image("not json at all");
    assert!(matches!(KernelImage::load(file.path()), Err(Error::ImageParse { .. })));
}

#[test]
fn test_empty_kernel_list() {
    let file = write_image(r#"{ "name": "empty", "target": "tandem-sim", "kernels": [] }"#);
    assert!(matches!(KernelImage::load(file.path()), Err(Error::InvalidImage { .. })));
}

#[test]
fn test_unknown_kernel_in_manifest() {
    let file = write_image(r#"{ "name": "odd", "target": "tandem-sim", "kernels": ["vadd"] }"#);
    let err = KernelImage::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("unknown kernel 'vadd'"), "{err}");
}

#[test]
fn test_kernel_not_provided() {
    let image = KernelImage { name: "rows".into(), target: SIM_TARGET.into(), kernels: vec!["lmult".into()] };
    let err = image.kernel("mmult").unwrap_err();
    assert!(matches!(err, Error::KernelNotFound { ref name, .. } if name == "mmult"));
}
