//! Two tasks counting to ten, interleaved by the dispatcher.

use mycoroutine::{Registry, SchedulerConfig, SchedulerError, logging};

fn count(registry: &Registry, name: &'static str) {
    println!("{name}: started");
    for i in 0..10 {
        println!("{name}: {i}");
        registry.yield_now();
    }
}

fn main() -> Result<(), SchedulerError> {
    logging::init();

    let registry = Registry::with_config(SchedulerConfig::from_env())?;

    println!("creating coroutines...");
    let first = registry.create_task(count, "func1");
    let second = registry.create_task(count, "func2");

    println!("registering coroutines...");
    registry.register(first)?;
    registry.register(second)?;

    println!("starting coroutines...");
    let stats = registry.start()?;
    println!(
        "all {} coroutines finished after {} switches",
        stats.completed, stats.resumptions
    );
    Ok(())
}
