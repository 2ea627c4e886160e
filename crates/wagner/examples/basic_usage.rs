//! Basic usage example for wagner
//!
//! Registers a small breakfast graph, runs it synchronously and
//! asynchronously, and prints the invocation events.

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use wagner::{BoxError, InvocationEvent, Locals, Module, Target};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wagner=debug")))
        .init();

    println!("=== Basic wagner usage ===\n");

    let mut module = Module::new("breakfast");
    module
        .constant("plates", 2u32)
        .register_service("pan", &[], |_| Ok("cast iron pan".to_string()))
        .register_sync("toast", &["plates"], |args| {
            Ok(format!("{} slices of toast", args.get::<u32>("plates")? * 2))
        })
        .register_async("eggs", &["pan"], |args| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, BoxError>(format!("eggs from the {}", args.get::<String>("pan")?))
        })
        .register_async("bacon", &["pan"], |args| async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok::<_, BoxError>(format!("bacon from the {}", args.get::<String>("pan")?))
        });

    println!("Registered tasks:");
    for task in module.tasks().iter() {
        println!("  - {} {:?} {:?}", task.name(), task.kind(), task.dependencies());
    }

    let toast = module.invoke(
        Target::new(&["toast"], |args| args.get::<String>("toast")),
        Locals::new().with("plates", 3u32),
    )??;
    println!("\nSynchronous invocation with a local: {toast}");

    let target = Target::new(&["eggs", "bacon", "toast"], |args| {
        Ok::<_, BoxError>(format!(
            "{}, {} and {}",
            args.get::<String>("eggs")?,
            args.get::<String>("bacon")?,
            args.get::<String>("toast")?
        ))
    });
    let (future, mut events) = module.invoke_async(target, Locals::new())?.into_parts();

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                InvocationEvent::TaskStarted { name } => println!("  started  {name}"),
                InvocationEvent::TaskFinished { name, duration } => println!("  finished {name} in {duration:?}"),
                InvocationEvent::Completed { stats } => {
                    println!("  completed: {} tasks in {:?}", stats.executed_tasks, stats.total_duration)
                }
                _ => {}
            }
        }
    });

    println!("\nAsynchronous invocation:");
    let meal = future.await??;
    printer.await?;
    println!("\nBreakfast: {meal}");

    if let Err(error) = module.invoke(Target::new(&["eggs"], |_| ()), Locals::new()) {
        println!("\nSynchronous invocation of an async task fails: {error}");
    }

    Ok(())
}
