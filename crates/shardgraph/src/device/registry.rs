//! Runtime registry for device-context kinds.
//!
//! Device crates register a constructor under a kind name (for example `"cpu"`), and executors
//! build contexts for concrete places without naming the implementing crate.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::{DeviceContext, Place};
use crate::error::{GatherError, GatherResult};

/// Factory that creates a context bound to one place.
pub type DeviceConstructor =
    Box<dyn Fn(Place) -> anyhow::Result<Arc<dyn DeviceContext>> + Send + Sync>;

/// Global registry mapping device kind names to constructors.
struct DeviceRegistry {
    kinds: RwLock<HashMap<String, DeviceConstructor>>,
}

impl DeviceRegistry {
    fn new() -> Self {
        Self {
            kinds: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: DeviceConstructor) {
        self.kinds
            .write()
            .expect("device registry poisoned")
            .insert(name, constructor);
    }

    fn create(&self, name: &str, place: Place) -> GatherResult<Arc<dyn DeviceContext>> {
        let registry = self.kinds.read().expect("device registry poisoned");
        let constructor = registry
            .get(name)
            .ok_or_else(|| GatherError::not_found(format!("device kind '{name}'")))?;
        constructor(place).map_err(|err| GatherError::device(place, format!("{err:#}")))
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .kinds
            .read()
            .expect("device registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn contains(&self, name: &str) -> bool {
        self.kinds
            .read()
            .expect("device registry poisoned")
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<DeviceRegistry> = OnceLock::new();

fn global_registry() -> &'static DeviceRegistry {
    GLOBAL_REGISTRY.get_or_init(DeviceRegistry::new)
}

/// Register a device kind by name. Re-registering a name replaces the constructor.
pub fn register_device_kind<F>(name: impl Into<String>, constructor: F)
where
    F: Fn(Place) -> anyhow::Result<Arc<dyn DeviceContext>> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Create a context of kind `name` bound to `place`.
pub fn create_device_context(name: &str, place: Place) -> GatherResult<Arc<dyn DeviceContext>> {
    global_registry().create(name, place)
}

/// Sorted list of registered kind names.
pub fn list_device_kinds() -> Vec<String> {
    global_registry().list()
}

pub fn has_device_kind(name: &str) -> bool {
    global_registry().contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullContext(Place);

    impl DeviceContext for NullContext {
        fn place(&self) -> Place {
            self.0
        }

        fn enqueue(&self, work: super::super::DeviceWork) {
            let _ = work();
        }

        fn wait(&self) -> GatherResult<()> {
            Ok(())
        }
    }

    #[test]
    fn registered_kind_builds_context_for_place() {
        register_device_kind("null-test", |place| {
            Ok(Arc::new(NullContext(place)) as Arc<dyn DeviceContext>)
        });
        assert!(has_device_kind("null-test"));
        assert!(list_device_kinds().contains(&"null-test".to_string()));

        let ctx = create_device_context("null-test", Place::Accelerator(3)).unwrap();
        assert_eq!(ctx.place(), Place::Accelerator(3));
    }

    #[test]
    fn unknown_kind_is_not_found() {
        assert!(!has_device_kind("missing-test"));
        let err = create_device_context("missing-test", Place::Cpu(0)).err().unwrap();
        assert!(matches!(err, GatherError::NotFound { .. }));
    }

    #[test]
    fn constructor_failure_surfaces_as_device_error() {
        register_device_kind("failing-test", |_| anyhow::bail!("no such device"));
        let err = create_device_context("failing-test", Place::Cpu(1)).err().unwrap();
        assert!(matches!(err, GatherError::Device { place: Place::Cpu(1), .. }));
    }
}
