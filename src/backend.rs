//! Backend selection
//!
//! Maps the `--gpu` token onto a concrete Burn backend: Wgpu when the
//! accelerated path is requested and compiled in, NdArray otherwise.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};

/// Host (CPU) inference backend
pub type HostBackend = NdArray<f32>;
/// Host training backend
pub type HostTraining = Autodiff<HostBackend>;

#[cfg(feature = "wgpu")]
pub type AcceleratedBackend = burn::backend::Wgpu;
#[cfg(feature = "wgpu")]
pub type AcceleratedTraining = Autodiff<AcceleratedBackend>;

/// Token that selects the accelerated path. Anything else runs on the host.
pub const ACCELERATED_TOKEN: &str = "gpu";

/// Compute placement requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceChoice {
    /// Run on the accelerator when one is available
    Accelerated,
    /// Run on host compute only
    HostOnly,
}

impl DeviceChoice {
    /// Parse the device token; only the exact string `"gpu"` is accelerated.
    pub fn from_token(token: &str) -> Self {
        if token == ACCELERATED_TOKEN {
            DeviceChoice::Accelerated
        } else {
            DeviceChoice::HostOnly
        }
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            DeviceChoice::Accelerated => ACCELERATED_TOKEN,
            DeviceChoice::HostOnly => "cpu",
        }
    }
}

impl Default for DeviceChoice {
    fn default() -> Self {
        DeviceChoice::Accelerated
    }
}

impl From<String> for DeviceChoice {
    fn from(token: String) -> Self {
        DeviceChoice::from_token(&token)
    }
}

impl From<DeviceChoice> for String {
    fn from(choice: DeviceChoice) -> Self {
        choice.as_token().to_string()
    }
}

impl std::fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceChoice::Accelerated => write!(f, "accelerated"),
            DeviceChoice::HostOnly => write!(f, "host"),
        }
    }
}

/// Backend actually compiled in for a [`DeviceChoice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBackend {
    #[cfg(feature = "wgpu")]
    Wgpu,
    NdArray,
}

impl ResolvedBackend {
    /// Human-readable backend name
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "wgpu")]
            ResolvedBackend::Wgpu => "Wgpu (GPU)",
            ResolvedBackend::NdArray => "NdArray (CPU)",
        }
    }
}

/// Resolve a device choice against the backends this build supports
pub fn resolve(choice: DeviceChoice) -> ResolvedBackend {
    match choice {
        DeviceChoice::HostOnly => ResolvedBackend::NdArray,
        #[cfg(feature = "wgpu")]
        DeviceChoice::Accelerated => ResolvedBackend::Wgpu,
        #[cfg(not(feature = "wgpu"))]
        DeviceChoice::Accelerated => {
            tracing::warn!("GPU requested but this build has no wgpu backend - falling back to CPU");
            ResolvedBackend::NdArray
        }
    }
}

/// Training device paired with the matching device of the inner backend.
///
/// Autodiff backends share their inner backend's device type, but the trait
/// bounds do not expose that, so both are carried explicitly.
#[derive(Debug, Clone)]
pub struct Placement<B: AutodiffBackend> {
    /// Device for training tensors
    pub device: B::Device,
    /// Same device, seen from the inference backend
    pub eval_device: <B::InnerBackend as Backend>::Device,
}

impl<B: AutodiffBackend> Placement<B> {
    pub fn new(device: B::Device, eval_device: <B::InnerBackend as Backend>::Device) -> Self {
        Self {
            device,
            eval_device,
        }
    }
}

/// Placement on the host CPU
pub fn host_placement() -> Placement<HostTraining> {
    Placement::new(NdArrayDevice::Cpu, NdArrayDevice::Cpu)
}

/// Placement on the default wgpu adapter
#[cfg(feature = "wgpu")]
pub fn accelerated_placement() -> Placement<AcceleratedTraining> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    Placement::new(device.clone(), device)
}
