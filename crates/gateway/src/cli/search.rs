//! `quarry search` — quick entity lookup.

use serde_json::Value;

use quarry_domain::entity::Entity;
use quarry_domain::tool::ToolArgs;

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    query: &str,
    entity_type: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let mut args = ToolArgs::new();
    args.insert("query".into(), Value::String(query.to_string()));
    args.insert("limit".into(), Value::from(limit as u64));

    let result = state.executor.execute("search_entities", &args).await?;
    let entities: Vec<Entity> = result
        .get("entities")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default();

    let filtered: Vec<&Entity> = entities
        .iter()
        .filter(|e| !e.is_relationship())
        .filter(|e| entity_type == "Any" || e.schema == entity_type)
        .collect();

    if filtered.is_empty() {
        println!("No entities found for '{query}'");
        return Ok(());
    }

    println!("Results for '{query}':");
    for entity in &filtered {
        let jurisdiction = entity
            .property("jurisdiction")
            .or_else(|| entity.property("country"))
            .unwrap_or("-");
        println!(
            "  [{:<7}] {:<32} {:<4} {}",
            entity.schema,
            entity.name(),
            jurisdiction,
            entity.id
        );
    }
    println!("{} entities", filtered.len());
    Ok(())
}
