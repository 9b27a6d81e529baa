//! Kernel images.
//!
//! An image is a JSON manifest naming the target it was built for and the
//! kernel entry points it provides:
//!
//! ```json
//! { "name": "matmul", "target": "tandem-sim", "kernels": ["lmult", "mmult"] }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::error::{ImageIoSnafu, ImageParseSnafu, InvalidImageSnafu, KernelNotFoundSnafu, Result};
use crate::kernel::{Kernel, RowMultiply, SystolicMultiply};

/// Target name understood by simulated devices.
pub const SIM_TARGET: &str = "tandem-sim";

type KernelFactory = fn() -> Arc<dyn Kernel>;

static BUILTIN_KERNELS: Lazy<HashMap<&'static str, KernelFactory>> = Lazy::new(|| {
    let mut kernels: HashMap<&'static str, KernelFactory> = HashMap::new();
    kernels.insert(RowMultiply::NAME, || Arc::new(RowMultiply));
    kernels.insert(SystolicMultiply::NAME, || Arc::new(SystolicMultiply));
    kernels
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelImage {
    pub name: String,
    pub target: String,
    pub kernels: Vec<String>,
}

impl KernelImage {
    /// Image for the simulated target exposing every built-in kernel.
    pub fn simulated(name: impl Into<String>) -> Self {
        let mut kernels: Vec<String> = BUILTIN_KERNELS.keys().map(|k| k.to_string()).collect();
        kernels.sort();
        Self { name: name.into(), target: SIM_TARGET.to_string(), kernels }
    }

    /// Read and validate an image from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).context(ImageIoSnafu { path })?;
        let image: Self = serde_json::from_slice(&bytes).context(ImageParseSnafu { path })?;
        image.validate()?;
        Ok(image)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| InvalidImageSnafu { image: &self.name, reason: e.to_string() }.build())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.kernels.is_empty(), InvalidImageSnafu { image: &self.name, reason: "image has no kernels" });
        for kernel in &self.kernels {
            ensure!(
                BUILTIN_KERNELS.contains_key(kernel.as_str()),
                InvalidImageSnafu { image: &self.name, reason: format!("unknown kernel '{kernel}'") }
            );
        }
        Ok(())
    }

    pub fn provides(&self, kernel: &str) -> bool {
        self.kernels.iter().any(|k| k == kernel)
    }

    /// Instantiate the entry point `name`.
    pub fn kernel(&self, name: &str) -> Result<Arc<dyn Kernel>> {
        let factory = BUILTIN_KERNELS.get(name).filter(|_| self.provides(name));
        match factory {
            Some(factory) => Ok(factory()),
            None => KernelNotFoundSnafu { name, image: &self.name }.fail(),
        }
    }
}
