pub mod cpu;

use std::sync::Arc;

pub use cpu::{cpu_contexts, CpuDeviceContext};

use shardgraph::device::DeviceContext;

/// Register the CPU device kind with the global device registry.
///
/// This function is called automatically via a static initializer, but can also
/// be called manually to ensure the kind is registered.
pub fn register_cpu_device() {
    shardgraph::device::registry::register_device_kind("cpu", |place| {
        let ctx = CpuDeviceContext::new(place)?;
        Ok(Arc::new(ctx) as Arc<dyn DeviceContext>)
    });
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_CPU_DEVICE: extern "C" fn() = {
    extern "C" fn register() {
        register_cpu_device();
    }
    register
};
