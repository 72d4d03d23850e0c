//! Demo investigation dataset for the stub/demo pipeline.
//!
//! Models a fictional offshore network ("Meridian Holdings") with a
//! beneficial-ownership chain, a circular back-link, and one
//! sanctions-proximate officer — the kind of structure the runtime is
//! built to surface. **All entities, names, and addresses are entirely
//! fictional.**
//!
//! Structure:
//!   Zenith Capital Partners LP (Cayman)
//!     └── owns → Meridian Holdings Ltd (BVI)
//!           └── owns → Nova Offshore LLC (Panama)
//!                 └── owns 5% → Zenith Capital Partners (circular!)
//!   Viktor Renko — director of Zenith, officer of Nova (watchlist-linked)
//!   Pacific Rim Trading Ltd (HK) — nominee shareholder of Meridian
//!   Aurora Financial Services SA (LU) — administrator
//!   Elena Marchetti — compliance officer (clean)
//!   James Wu — nominee director of Meridian
//!   Konrad Brauer — registered agent

use std::collections::HashSet;

use serde_json::{json, Value};

use quarry_domain::entity::Entity;

fn company(id: &str, name: &str, jurisdiction: &str) -> Entity {
    Entity::new(format!("demo:{id}"), "Company")
        .with_property("name", vec![name.to_string()])
        .with_property("jurisdiction", vec![jurisdiction.to_string()])
}

fn person(id: &str, name: &str, country: &str) -> Entity {
    Entity::new(format!("demo:{id}"), "Person")
        .with_property("name", vec![name.to_string()])
        .with_property("country", vec![country.to_string()])
}

fn ownership(id: &str, owner: &str, asset: &str, percentage: &str) -> Entity {
    Entity::new(format!("demo:{id}"), "Ownership")
        .with_property("owner", vec![format!("demo:{owner}")])
        .with_property("asset", vec![format!("demo:{asset}")])
        .with_property("percentage", vec![percentage.to_string()])
}

fn directorship(id: &str, director: &str, organization: &str, role: &str) -> Entity {
    Entity::new(format!("demo:{id}"), "Directorship")
        .with_property("director", vec![format!("demo:{director}")])
        .with_property("organization", vec![format!("demo:{organization}")])
        .with_property("role", vec![role.to_string()])
}

/// The demo dataset, built once through the executor's instance cache.
pub struct DemoData {
    entities: Vec<Entity>,
}

impl DemoData {
    pub fn new() -> Self {
        let entities = vec![
            company("meridian-holdings", "Meridian Holdings Ltd", "vg")
                .with_property("incorporationDate", vec!["2017-03-14".into()])
                .with_property("registrationNumber", vec!["BVI-1823947".into()])
                .with_property(
                    "address",
                    vec!["Pasea Estate, Road Town, Tortola, British Virgin Islands".into()],
                ),
            company("zenith-capital", "Zenith Capital Partners LP", "ky")
                .with_property("incorporationDate", vec!["2016-11-02".into()]),
            company("nova-offshore", "Nova Offshore LLC", "pa")
                .with_property("incorporationDate", vec!["2017-03-21".into()]),
            company("pacific-rim", "Pacific Rim Trading Ltd", "hk"),
            company("aurora-financial", "Aurora Financial Services SA", "lu"),
            company("meridian-consulting", "Meridian Consulting AG", "ch"),
            person("viktor-renko", "Viktor Renko", "CY")
                .with_property("topics", vec!["sanction.linked".into()]),
            person("elena-marchetti", "Elena Marchetti", "IT"),
            person("james-wu", "James Wu", "HK"),
            person("konrad-brauer", "Konrad Brauer", "DE"),
            ownership("own-zenith-meridian", "zenith-capital", "meridian-holdings", "100"),
            ownership("own-meridian-nova", "meridian-holdings", "nova-offshore", "100"),
            // Circular back-link closing the chain.
            ownership("own-nova-zenith", "nova-offshore", "zenith-capital", "5"),
            ownership("own-pacific-meridian", "pacific-rim", "meridian-holdings", "10"),
            directorship("dir-renko-zenith", "viktor-renko", "zenith-capital", "director"),
            directorship("dir-renko-nova", "viktor-renko", "nova-offshore", "officer"),
            directorship("dir-wu-meridian", "james-wu", "meridian-holdings", "nominee director"),
            directorship("dir-marchetti-aurora", "elena-marchetti", "aurora-financial", "compliance officer"),
            directorship("dir-brauer-meridian", "konrad-brauer", "meridian-holdings", "registered agent"),
        ];
        Self { entities }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Name/property search over the node entities, plus the
    /// relationships connecting matched nodes.
    ///
    /// An unmatched non-empty query seeds the scenario's top entities so
    /// any demo goal produces a workable starting set.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Entity> {
        let needle = query.to_lowercase();
        let tokens: Vec<&str> = needle.split_whitespace().collect();

        let mut matched: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| !e.is_relationship())
            .filter(|e| {
                let haystack = e
                    .properties
                    .values()
                    .flatten()
                    .map(|v| v.to_lowercase())
                    .collect::<Vec<_>>()
                    .join(" ");
                tokens.iter().any(|t| haystack.contains(t))
            })
            .take(limit)
            .cloned()
            .collect();

        if matched.is_empty() && !query.trim().is_empty() {
            matched = self
                .entities
                .iter()
                .filter(|e| !e.is_relationship())
                .take(limit.min(5))
                .cloned()
                .collect();
        }

        let matched_ids: HashSet<&str> = matched.iter().map(|e| e.id.as_str()).collect();
        let relationships: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| e.is_relationship())
            .filter(|e| {
                e.properties.values().flatten().any(|endpoint| {
                    matched_ids.contains(endpoint.as_str())
                })
            })
            .cloned()
            .collect();

        matched.extend(relationships);
        matched
    }

    /// Watchlist screen: entities tagged with a sanction topic whose
    /// name loosely matches the target (or all of them for a broad
    /// screen).
    pub fn sanctions_matches(&self, target: &str) -> Vec<Value> {
        let needle = target.to_lowercase();
        self.entities
            .iter()
            .filter(|e| {
                e.properties
                    .get("topics")
                    .is_some_and(|topics| topics.iter().any(|t| t.starts_with("sanction")))
            })
            .filter(|e| needle.trim().is_empty() || {
                let name = e.name().to_lowercase();
                name.contains(needle.trim()) || needle.contains(&name)
                    || needle.split_whitespace().any(|t| name.contains(t))
            })
            .map(|e| {
                json!({
                    "entity_id": e.id,
                    "name": e.name(),
                    "list": "demo_watchlist",
                    "score": 0.91,
                })
            })
            .collect()
    }

    /// Fictional press coverage for the news check.
    pub fn articles(&self, query: &str) -> Vec<Value> {
        vec![
            json!({
                "title": format!("Offshore filings name {} in leaked registry data", short(query)),
                "source": "Harbor Ledger",
                "date": "2026-02-11",
            }),
            json!({
                "title": "Shell network routed consulting fees through Zurich intermediary",
                "source": "The Meridian Files",
                "date": "2026-01-29",
            }),
            json!({
                "title": "Regulators query nominee directors across three jurisdictions",
                "source": "Registry Watch",
                "date": "2025-12-03",
            }),
        ]
    }

    /// Follow ownership edges from `start_id` (owner → asset), returning
    /// the traversed entities and relationships plus whether the walk
    /// closed a cycle.
    pub fn ownership_chain(&self, start_id: &str) -> (Vec<Entity>, bool) {
        let mut chain: Vec<Entity> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut circular = false;

        if let Some(start) = self.entity(start_id) {
            chain.push(start.clone());
        }
        visited.insert(start_id.to_string());

        // Direct owners of the start entity come first.
        for rel in self.entities.iter().filter(|e| e.schema == "Ownership") {
            if rel.property("asset") == Some(start_id) {
                if let Some(owner) = rel.property("owner").and_then(|id| self.entity(id)) {
                    chain.push(rel.clone());
                    if visited.insert(owner.id.clone()) {
                        chain.push(owner.clone());
                    }
                }
            }
        }

        // Then the downward chain of held assets.
        let mut frontier = vec![start_id.to_string()];
        while let Some(current) = frontier.pop() {
            for rel in self.entities.iter().filter(|e| e.schema == "Ownership") {
                if rel.property("owner") == Some(current.as_str()) {
                    let Some(asset_id) = rel.property("asset") else {
                        continue;
                    };
                    if !chain.iter().any(|e| e.id == rel.id) {
                        chain.push(rel.clone());
                    }
                    if visited.insert(asset_id.to_string()) {
                        if let Some(asset) = self.entity(asset_id) {
                            chain.push(asset.clone());
                        }
                        frontier.push(asset_id.to_string());
                    } else {
                        circular = true;
                    }
                }
            }
        }

        (chain, circular)
    }
}

impl Default for DemoData {
    fn default() -> Self {
        Self::new()
    }
}

fn short(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        "investigation target".to_string()
    } else if trimmed.len() <= 40 {
        trimmed.to_string()
    } else {
        let mut boundary = 40;
        while boundary > 0 && !trimmed.is_char_boundary(boundary) {
            boundary -= 1;
        }
        format!("{}…", &trimmed[..boundary])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_matches_by_name() {
        let data = DemoData::new();
        let results = data.search("Meridian", 20);
        assert!(results.iter().any(|e| e.id == "demo:meridian-holdings"));
        assert!(results.iter().any(|e| e.id == "demo:meridian-consulting"));
        // Relationships touching matched nodes ride along.
        assert!(results.iter().any(|e| e.schema == "Ownership"));
    }

    #[test]
    fn unmatched_query_seeds_the_scenario() {
        let data = DemoData::new();
        let results = data.search("Acme Corp shell companies", 20);
        assert!(!results.is_empty());
        assert!(results.iter().any(|e| !e.is_relationship()));
    }

    #[test]
    fn sanctions_screen_finds_the_linked_officer() {
        let data = DemoData::new();
        let matches = data.sanctions_matches("Viktor Renko");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["entity_id"], "demo:viktor-renko");

        let broad = data.sanctions_matches("");
        assert_eq!(broad.len(), 1);

        let none = data.sanctions_matches("Elena Marchetti");
        assert!(none.is_empty());
    }

    #[test]
    fn ownership_chain_detects_the_circular_link() {
        let data = DemoData::new();
        let (chain, circular) = data.ownership_chain("demo:zenith-capital");
        assert!(circular);
        let ids: Vec<&str> = chain.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&"demo:meridian-holdings"));
        assert!(ids.contains(&"demo:nova-offshore"));
    }

    #[test]
    fn chain_from_leaf_includes_owners() {
        let data = DemoData::new();
        let (chain, _) = data.ownership_chain("demo:meridian-holdings");
        let ids: Vec<&str> = chain.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&"demo:zenith-capital"));
        assert!(ids.contains(&"demo:pacific-rim"));
    }
}
