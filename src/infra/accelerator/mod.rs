//! Accelerator backends.

mod memory;
mod redis;

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::accelerator::Accelerator;
use crate::config::{AcceleratorBackend, AcceleratorSettings};

pub use self::memory::MemoryAccelerator;
pub use self::redis::RedisAccelerator;

/// Build the configured accelerator.
///
/// An unreachable Redis is not fatal: the process runs without an
/// accelerator and every cache read misses and every counter writes through.
pub async fn connect(settings: &AcceleratorSettings) -> Option<Arc<dyn Accelerator>> {
    match &settings.backend {
        AcceleratorBackend::None => {
            info!("Accelerator disabled");
            None
        }
        AcceleratorBackend::Memory => {
            info!(backend = "memory", "Accelerator ready");
            Some(Arc::new(MemoryAccelerator::new()))
        }
        AcceleratorBackend::Redis { url } => match RedisAccelerator::connect(url).await {
            Ok(accelerator) => match accelerator.ping().await {
                Ok(()) => {
                    info!(backend = "redis", "Accelerator ready");
                    Some(Arc::new(accelerator))
                }
                Err(err) => {
                    warn!(backend = "redis", error = %err, "Accelerator ping failed; running without it");
                    None
                }
            },
            Err(err) => {
                warn!(backend = "redis", error = %err, "Accelerator unreachable; running without it");
                None
            }
        },
    }
}
