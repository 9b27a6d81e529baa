//! Device discovery and provisioning.
//!
//! Provisioning turns a list of candidate devices and a kernel image into an
//! [`ExecutionContext`]: the queue, allocator and kernel the pipeline runs
//! against. The context is an ordinary value owned by the caller.

use std::sync::Arc;

use bon::bon;
use tracing::{info, warn};

use crate::allocator::{Allocator, DeviceAllocator};
use crate::error::{NoUsableDeviceSnafu, Result};
use crate::image::{KernelImage, SIM_TARGET};
use crate::kernel::Kernel;
use crate::queue::{CommandHook, CommandQueue, OutOfOrderQueue};

/// Description of one accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub name: String,
    /// Image target this device can be programmed with.
    pub target: String,
    /// Worker threads executing commands.
    pub compute_units: usize,
    /// Global memory in bytes.
    pub memory_limit: usize,
}

#[bon]
impl DeviceSpec {
    #[builder]
    pub fn new(
        #[builder(default = String::from("tandem-sim-0"))] name: String,
        #[builder(default = SIM_TARGET.to_string())] target: String,
        #[builder(default = 4)] compute_units: usize,
        #[builder(default = 256 * 1024 * 1024)] memory_limit: usize,
    ) -> Self {
        Self { name, target, compute_units, memory_limit }
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Set of devices visible to the host.
#[derive(Debug, Clone)]
pub struct Platform {
    devices: Vec<DeviceSpec>,
}

impl Platform {
    pub fn new(devices: Vec<DeviceSpec>) -> Self {
        Self { devices }
    }

    /// A platform with a single default simulated device.
    pub fn simulated() -> Self {
        Self::new(vec![DeviceSpec::default()])
    }

    /// Simulated platform described by the environment.
    ///
    /// # Environment Variables
    ///
    /// * `TANDEM_DEVICES` - Number of simulated devices (default: 1)
    /// * `TANDEM_COMPUTE_UNITS` - Worker threads per device (default: 4)
    /// * `TANDEM_MEMORY_LIMIT` - Device memory in bytes (default: 256 MiB)
    pub fn from_env() -> Self {
        let count = std::env::var("TANDEM_DEVICES").ok().and_then(|s| s.parse().ok()).unwrap_or(1usize);
        let compute_units = std::env::var("TANDEM_COMPUTE_UNITS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);
        let memory_limit =
            std::env::var("TANDEM_MEMORY_LIMIT").ok().and_then(|s| s.parse().ok()).unwrap_or(256 * 1024 * 1024);

        let devices = (0..count)
            .map(|i| {
                DeviceSpec::builder()
                    .name(format!("tandem-sim-{i}"))
                    .compute_units(compute_units)
                    .memory_limit(memory_limit)
                    .build()
            })
            .collect();
        Self::new(devices)
    }

    pub fn devices(&self) -> &[DeviceSpec] {
        &self.devices
    }
}

/// Everything the pipeline needs to talk to one programmed device.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub device: DeviceSpec,
    pub queue: Arc<dyn CommandQueue>,
    pub allocator: Arc<dyn Allocator>,
    pub kernel: Arc<dyn Kernel>,
}

impl ExecutionContext {
    pub fn new(
        device: DeviceSpec,
        queue: Arc<dyn CommandQueue>,
        allocator: Arc<dyn Allocator>,
        kernel: Arc<dyn Kernel>,
    ) -> Self {
        Self { device, queue, allocator, kernel }
    }
}

/// Program the first device that accepts `image` and exposes `kernel`.
#[derive(Debug, Clone)]
pub struct Provisioner<'a> {
    image: &'a KernelImage,
    kernel: &'a str,
    queue_name: String,
    hook: Option<Arc<dyn CommandHook>>,
}

impl<'a> Provisioner<'a> {
    pub fn new(image: &'a KernelImage, kernel: &'a str) -> Self {
        Self { image, kernel, queue_name: String::from("ooo_queue"), hook: None }
    }

    pub fn queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Install a hook on the queue of the provisioned device.
    pub fn hook(mut self, hook: Arc<dyn CommandHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Try each device in order; the first success wins.
    pub fn provision(&self, devices: &[DeviceSpec]) -> Result<ExecutionContext> {
        for (i, device) in devices.iter().enumerate() {
            info!("Trying to program device[{i}]: {}", device.name);
            match self.program(device) {
                Ok(context) => {
                    info!("Device[{i}]: program successful!");
                    return Ok(context);
                }
                Err(error) => warn!(%error, "Failed to program device[{i}] with kernel image"),
            }
        }

        NoUsableDeviceSnafu { attempted: devices.len() }.fail()
    }

    fn program(&self, device: &DeviceSpec) -> Result<ExecutionContext> {
        snafu::ensure!(
            device.target == self.image.target,
            crate::error::InvalidImageSnafu {
                image: &self.image.name,
                reason: format!("built for '{}', device expects '{}'", self.image.target, device.target),
            }
        );

        let kernel = self.image.kernel(self.kernel)?;
        let queue = OutOfOrderQueue::builder()
            .name(self.queue_name.clone())
            .compute_units(device.compute_units)
            .maybe_hook(self.hook.clone())
            .build()?;
        let allocator = DeviceAllocator::new(device.name.clone(), device.memory_limit);

        Ok(ExecutionContext::new(device.clone(), Arc::new(queue), Arc::new(allocator), kernel))
    }
}
