//! Todo list managed through named actions on a dispatch context

use dispatch_context::{create_dispatch_context, Action, Dispatch};

#[derive(Clone, Debug)]
struct TodoItem {
    id: usize,
    title: String,
    completed: bool,
}

#[derive(Clone, Debug)]
struct AppState {
    todos: Vec<TodoItem>,
    filter: TodoFilter,
}

#[derive(Clone, Debug, PartialEq)]
enum TodoFilter {
    All,
    Active,
    Completed,
}

/// Payload of every todo action.
#[derive(Debug)]
enum TodoInput {
    Title(String),
    Id(usize),
    Filter(TodoFilter),
}

impl dispatch_context::Payload for TodoInput {}

impl AppState {
    fn new() -> Self {
        Self {
            todos: Vec::new(),
            filter: TodoFilter::All,
        }
    }

    fn filtered_todos(&self) -> Vec<&TodoItem> {
        match self.filter {
            TodoFilter::All => self.todos.iter().collect(),
            TodoFilter::Active => self.todos.iter().filter(|t| !t.completed).collect(),
            TodoFilter::Completed => self.todos.iter().filter(|t| t.completed).collect(),
        }
    }

    fn stats(&self) -> (usize, usize, usize) {
        let total = self.todos.len();
        let completed = self.todos.iter().filter(|t| t.completed).count();
        let active = total - completed;
        (total, active, completed)
    }
}

type TodoDispatch = Dispatch<AppState, TodoInput>;

fn add_todo() -> Action<AppState, TodoInput> {
    Action::sync(|state: &AppState, input: &TodoInput, _: &TodoDispatch| {
        let mut next = state.clone();
        if let TodoInput::Title(title) = input {
            next.todos.push(TodoItem {
                id: next.todos.len(),
                title: title.clone(),
                completed: false,
            });
        }
        next
    })
    .named("add_todo")
}

fn toggle_todo() -> Action<AppState, TodoInput> {
    Action::sync(|state: &AppState, input: &TodoInput, _: &TodoDispatch| {
        let mut next = state.clone();
        if let TodoInput::Id(id) = input {
            if let Some(todo) = next.todos.iter_mut().find(|t| t.id == *id) {
                todo.completed = !todo.completed;
            }
        }
        next
    })
    .named("toggle_todo")
}

fn set_filter() -> Action<AppState, TodoInput> {
    Action::sync(|state: &AppState, input: &TodoInput, _: &TodoDispatch| {
        let mut next = state.clone();
        if let TodoInput::Filter(filter) = input {
            next.filter = filter.clone();
        }
        next
    })
    .named("set_filter")
}

fn print_todos(state: &AppState) {
    for todo in state.filtered_todos() {
        let status = if todo.completed { "✓" } else { " " };
        println!("   [{}] {}", status, todo.title);
    }
}

fn main() -> Result<(), dispatch_context::DispatchError> {
    tracing_subscriber::fmt().with_target(false).init();

    println!("=== Dispatch Context Example: Todo App ===\n");

    let (consumer, container) = create_dispatch_context::<AppState, TodoInput>(AppState::new());

    println!("1. Setting up a stats view");
    let _stats = container.provide(|| {
        consumer.watch(|value| {
            let (total, active, completed) = value.store.stats();
            println!(
                "   [Stats] Total: {}, Active: {}, Completed: {}",
                total, active, completed
            );
        })
    });

    let dispatch = container.dispatch();

    println!("\n2. Adding todos");
    for title in ["Learn Rust", "Build dispatch context", "Write documentation"] {
        dispatch.send(add_todo(), TodoInput::Title(title.to_string()))?;
    }

    println!("\n3. Completing the first two todos");
    dispatch.send(toggle_todo(), TodoInput::Id(0))?;
    dispatch.send(toggle_todo(), TodoInput::Id(1))?;

    println!("\n4. Active todos:");
    dispatch.send(set_filter(), TodoInput::Filter(TodoFilter::Active))?;
    container.store().read(print_todos);

    println!("\n5. Completed todos:");
    dispatch.send(set_filter(), TodoInput::Filter(TodoFilter::Completed))?;
    container.store().read(print_todos);

    println!("\n✓ Example complete!");
    Ok(())
}
