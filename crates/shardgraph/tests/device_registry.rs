use shardgraph::device::registry::{create_device_context, has_device_kind, list_device_kinds};
use shardgraph::device::Place;
use shardgraph::error::GatherError;

#[test]
fn test_device_registry() {
    // Ensure the kind is registered (auto-registration via .init_array)
    shardgraph_device_cpu::register_cpu_device();

    let kinds = list_device_kinds();
    println!("Available device kinds: {:?}", kinds);

    assert!(has_device_kind("cpu"), "cpu device kind not registered");
    assert!(kinds.contains(&"cpu".to_string()));

    let ctx = create_device_context("cpu", Place::Cpu(5)).expect("failed to create cpu context");
    assert_eq!(ctx.place(), Place::Cpu(5));
    ctx.enqueue(Box::new(|| -> anyhow::Result<()> { Ok(()) }));
    ctx.wait().expect("cpu context wait failed");

    assert!(!has_device_kind("nonexistent"));
    assert!(matches!(
        create_device_context("nonexistent", Place::Cpu(0)),
        Err(GatherError::NotFound { .. })
    ));
}
