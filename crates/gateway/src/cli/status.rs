//! `quarry status` — show what the runtime has to work with.

use std::path::Path;

use quarry_sessions::list_sessions;

use crate::state::AppState;

pub fn run(state: &AppState) {
    println!("quarry {}", env!("CARGO_PKG_VERSION"));

    println!("\nTools:");
    for (name, description) in state.executor.registry().descriptions() {
        println!("  {name:<20} {description}");
    }

    println!("\nProviders: {}", state.providers.ids().join(", "));
    println!("Workflows: {}", state.workflows.names().join(", "));
    println!(
        "Safety mode: {:?} | max turns: {}",
        state.config.safety.mode, state.config.agent.max_turns
    );

    let saved = list_sessions(Path::new("investigations"));
    if saved.is_empty() {
        println!("\nNo saved sessions in ./investigations");
    } else {
        println!("\nSaved sessions:");
        for info in saved {
            println!(
                "  {} — {} (turns: {}, findings: {}, entities: {})",
                info.session_id, info.goal, info.turns, info.findings, info.entities
            );
        }
    }
}
