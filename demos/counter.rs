//! Counter driven through a dispatch context, with synchronous and deferred
//! actions and a watching consumer.
//!
//! Run with `RUST_LOG=debug cargo run --example counter` to see commits too.

use std::time::Duration;

use dispatch_context::{create_dispatch_context, Action, Dispatch, Event};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default)]
struct CounterState {
    count: i32,
    step: i32,
    history: Vec<i32>,
}

type Click = Event<&'static str>;

fn increment() -> Action<CounterState, Click> {
    Action::sync(|store: &CounterState, _: &Click, _: &Dispatch<CounterState, Click>| {
        let mut next = store.clone();
        next.count += next.step;
        next.history.push(next.count);
        next
    })
    .named("increment")
}

fn load_step() -> Action<CounterState, Click> {
    Action::<CounterState, Click>::deferred(|_store, _payload, _dispatch| async {
        // Stand-in for a remote settings lookup.
        tokio::time::sleep(Duration::from_millis(50)).await;
        anyhow::Ok(|current: &CounterState| CounterState {
            step: 5,
            ..current.clone()
        })
    })
    .named("load_step")
}

fn reset() -> Action<CounterState, Click> {
    Action::sync(|store: &CounterState, _: &Click, _: &Dispatch<CounterState, Click>| {
        let mut next = store.clone();
        next.count = 0;
        next.history.push(0);
        next
    })
    .named("reset")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Dispatch Context Example: Counter ===\n");

    let (consumer, container) = create_dispatch_context::<CounterState, Click>(CounterState {
        step: 1,
        history: vec![0],
        ..Default::default()
    });

    let click = || Event::new("click").on_persist(|| println!("   [Event] persisted"));

    let (_view, dispatch) = container.provide(|| {
        println!("1. Mounting a view");
        let view = consumer.watch(|value| {
            println!(
                "   [Render] Count: {}, Step: {}",
                value.store.count, value.store.step
            );
        });
        (view, consumer.read().dispatch)
    });

    println!("\n2. Incrementing twice");
    dispatch.actions([increment(), increment()]).call(click())?;

    println!("\n3. Loading the step size while incrementing");
    let pending = dispatch.actions([load_step(), increment()]).call(click())?;
    pending.join().await?;

    println!("\n4. Incrementing with the loaded step");
    dispatch.send(increment(), click())?;

    println!("\n5. Resetting");
    dispatch.send(reset(), click())?;

    println!("\n6. History:");
    container.store().read(|state| println!("   {:?}", state.history));

    println!("\n✓ Example complete!");
    Ok(())
}
