pub mod benchmark;
pub mod chunk;
pub mod config;
pub mod reference;
pub mod slot_reuse;

use std::sync::Arc;

use tandem_device::{DeviceSpec, ExecutionContext, InjectionHook, KernelImage, Provisioner, RowMultiply};

use crate::config::PipelineConfig;

/// Context on the default simulated device exposing `kernel`.
pub fn context(kernel: &str) -> ExecutionContext {
    let image = KernelImage::simulated("test");
    Provisioner::new(&image, kernel).provision(&[DeviceSpec::default()]).unwrap()
}

/// Pipeline context whose queue applies `hook`.
pub fn context_with(hook: InjectionHook) -> ExecutionContext {
    let image = KernelImage::simulated("test");
    Provisioner::new(&image, RowMultiply::NAME)
        .hook(Arc::new(hook))
        .provision(&[DeviceSpec::default()])
        .unwrap()
}

pub fn config(slots: usize, rows_per_chunk: usize) -> PipelineConfig {
    PipelineConfig::builder().slots(slots).rows_per_chunk(rows_per_chunk).build()
}
