//! Execution devices a skill can bind to.

mod registry;

pub use registry::{ConfiguredProbe, CpuProbe, DeviceProbe, DeviceRegistry};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HuginnError, Result};

/// Kind of compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// CPU execution (default).
    #[default]
    Cpu,
    Gpu,
    Vpu,
}

impl DeviceKind {
    /// Get the kind name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Gpu => "GPU",
            Self::Vpu => "VPU",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceKind {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            "vpu" => Ok(Self::Vpu),
            other => Err(HuginnError::Configuration(format!(
                "unknown device kind '{other}'"
            ))),
        }
    }
}

/// Platform handle for an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle {
    /// Adapter index as the runtime numbers it (e.g. CUDA device id).
    pub adapter_index: u32,
}

/// One enumerated compute device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionDevice {
    kind: DeviceKind,
    name: String,
    handle: Option<NativeHandle>,
}

impl ExecutionDevice {
    /// The host CPU.
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            name: "CPU".to_string(),
            handle: None,
        }
    }

    /// A GPU reachable through the given adapter index.
    pub fn gpu(name: impl Into<String>, adapter_index: u32) -> Self {
        Self {
            kind: DeviceKind::Gpu,
            name: name.into(),
            handle: Some(NativeHandle { adapter_index }),
        }
    }

    /// A vision accelerator reachable through the given adapter index.
    pub fn vpu(name: impl Into<String>, adapter_index: u32) -> Self {
        Self {
            kind: DeviceKind::Vpu,
            name: name.into(),
            handle: Some(NativeHandle { adapter_index }),
        }
    }

    /// A device that was listed but has no usable native handle.
    pub fn unbound(kind: DeviceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            handle: None,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.handle
    }

    /// Whether a runtime could target this device at all.
    ///
    /// Accelerators need a native handle; the CPU never does.
    pub fn is_bindable(&self) -> bool {
        match self.kind {
            DeviceKind::Cpu => true,
            DeviceKind::Gpu | DeviceKind::Vpu => self.handle.is_some(),
        }
    }
}

impl Default for ExecutionDevice {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_cpu() {
        assert_eq!(ExecutionDevice::default().kind(), DeviceKind::Cpu);
    }

    #[test]
    fn cpu_is_always_bindable() {
        assert!(ExecutionDevice::cpu().is_bindable());
    }

    #[test]
    fn accelerators_need_a_handle() {
        assert!(ExecutionDevice::gpu("RTX", 0).is_bindable());
        assert!(!ExecutionDevice::unbound(DeviceKind::Gpu, "ghost").is_bindable());
    }

    #[test]
    fn display_names_kind_and_device() {
        assert_eq!(ExecutionDevice::gpu("RTX", 1).to_string(), "GPU: RTX");
    }

    #[test]
    fn kind_parses_cuda_alias() {
        assert_eq!("cuda".parse::<DeviceKind>().unwrap(), DeviceKind::Gpu);
        assert!("tpu".parse::<DeviceKind>().is_err());
    }
}
