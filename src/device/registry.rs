//! Lazy device enumeration.
//!
//! Probes are run once, on first use, with double-checked locking so that
//! concurrent callers never enumerate twice.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::ExecutionDevice;
use crate::{HuginnError, Result};

/// Source of candidate devices.
pub trait DeviceProbe: Send + Sync {
    fn name(&self) -> &str;
    fn probe(&self) -> Result<Vec<ExecutionDevice>>;
}

/// Always reports the host CPU.
#[derive(Debug, Default)]
pub struct CpuProbe;

impl DeviceProbe for CpuProbe {
    fn name(&self) -> &str {
        "cpu"
    }

    fn probe(&self) -> Result<Vec<ExecutionDevice>> {
        Ok(vec![ExecutionDevice::cpu()])
    }
}

/// Reports a fixed device list, typically from configuration.
#[derive(Debug, Default)]
pub struct ConfiguredProbe {
    devices: Vec<ExecutionDevice>,
}

impl ConfiguredProbe {
    pub fn new(devices: Vec<ExecutionDevice>) -> Self {
        Self { devices }
    }
}

impl DeviceProbe for ConfiguredProbe {
    fn name(&self) -> &str {
        "configured"
    }

    fn probe(&self) -> Result<Vec<ExecutionDevice>> {
        Ok(self.devices.clone())
    }
}

/// Enumerates execution devices once and caches the result.
pub struct DeviceRegistry {
    probes: Vec<Box<dyn DeviceProbe>>,
    devices: RwLock<Option<Arc<[ExecutionDevice]>>>,
}

impl DeviceRegistry {
    /// Registry with no probes. Enumerates to an empty list.
    pub fn empty() -> Self {
        Self {
            probes: Vec::new(),
            devices: RwLock::new(None),
        }
    }

    /// Registry with the CPU probe.
    pub fn new() -> Self {
        Self::empty().with_probe(CpuProbe)
    }

    /// Append a probe. Probe order is enumeration order.
    pub fn with_probe(mut self, probe: impl DeviceProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// All devices, enumerating on first call.
    ///
    /// A failing probe is logged and skipped; it does not hide devices
    /// reported by the others.
    pub fn devices(&self) -> Result<Arc<[ExecutionDevice]>> {
        // Fast path: already enumerated (read lock)
        {
            let devices = self.devices.read().map_err(|e| {
                HuginnError::Configuration(format!("Failed to acquire read lock: {e}"))
            })?;
            if let Some(devices) = devices.as_ref() {
                return Ok(Arc::clone(devices));
            }
        }

        // Slow path: enumerate (write lock)
        let mut devices = self.devices.write().map_err(|e| {
            HuginnError::Configuration(format!("Failed to acquire write lock: {e}"))
        })?;

        // Double-check after acquiring write lock
        if let Some(devices) = devices.as_ref() {
            return Ok(Arc::clone(devices));
        }

        let mut found = Vec::new();
        for probe in &self.probes {
            match probe.probe() {
                Ok(list) => found.extend(list),
                Err(e) => warn!(probe = probe.name(), error = %e, "device probe failed"),
            }
        }
        info!(count = found.len(), "enumerated execution devices");

        let found: Arc<[ExecutionDevice]> = found.into();
        *devices = Some(Arc::clone(&found));
        Ok(found)
    }

    /// Device at `index` in enumeration order.
    pub fn get(&self, index: usize) -> Result<ExecutionDevice> {
        let devices = self.devices()?;
        devices.get(index).cloned().ok_or_else(|| {
            HuginnError::InvalidInput(format!(
                "device index {index} out of range (found {} devices)",
                devices.len()
            ))
        })
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
