//! Device memory accounting for resident models
//!
//! candle releases device buffers as soon as the last tensor referencing
//! them is dropped, so the allocation attributable to resident models is
//! the sum of their weight footprints. Each loaded model carries a
//! [`FootprintGuard`] that returns its bytes to the meter on drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use candle_core::Device;
use sysinfo::System;

/// Device memory measurement used by the model cache
pub trait DeviceMemory: Send + Sync {
    /// Bytes currently allocated on the device
    fn allocated(&self) -> u64;

    /// Total bytes available on the device
    fn total(&self) -> u64;

    /// Release cached allocator blocks back to the device
    fn empty_cache(&self);
}

/// Total memory of `device` in bytes.
///
/// CUDA devices report their own size; CPU and Metal models live in host
/// (or unified) memory, so the host total is used.
pub fn device_total_memory(device: &Device) -> Result<u64> {
    if device.is_cuda() {
        return cuda_total_memory();
    }
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        anyhow::bail!("host memory size could not be read");
    }
    Ok(total)
}

/// Must run on the thread that opened the device, which binds its context.
#[cfg(feature = "cuda")]
fn cuda_total_memory() -> Result<u64> {
    use candle_core::cuda_backend::cudarc::driver::result::mem_get_info;

    let (_free, total) = mem_get_info().map_err(|e| anyhow::anyhow!("cuda mem_get_info failed: {e:?}"))?;
    Ok(total as u64)
}

#[cfg(not(feature = "cuda"))]
fn cuda_total_memory() -> Result<u64> {
    anyhow::bail!("built without the `cuda` feature")
}

/// Tracks the summed footprint of live model weights
#[derive(Debug)]
pub struct FootprintMeter {
    allocated: Arc<AtomicU64>,
    total: u64,
}

impl FootprintMeter {
    pub fn new(total: u64) -> Self {
        Self {
            allocated: Arc::new(AtomicU64::new(0)),
            total,
        }
    }

    /// Account `bytes` until the returned guard is dropped
    pub fn reserve(&self, bytes: u64) -> FootprintGuard {
        self.allocated.fetch_add(bytes, Ordering::SeqCst);
        FootprintGuard {
            allocated: Arc::clone(&self.allocated),
            bytes,
        }
    }
}

impl DeviceMemory for FootprintMeter {
    fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst)
    }

    fn total(&self) -> u64 {
        self.total
    }

    fn empty_cache(&self) {
        // Buffers are freed eagerly on drop; there is no pool to flush.
        tracing::debug!(
            allocated = self.allocated(),
            "Device cache release requested"
        );
    }
}

/// Footprint of one resident model
#[derive(Debug)]
pub struct FootprintGuard {
    allocated: Arc<AtomicU64>,
    bytes: u64,
}

impl FootprintGuard {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for FootprintGuard {
    fn drop(&mut self) {
        self.allocated.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}
