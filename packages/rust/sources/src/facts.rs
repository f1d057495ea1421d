//! Structured-facts resolver: typed fields from an entity claims document.
//!
//! Only the properties owned by the entity type are queried. Every queried
//! field comes back as `Present` or `Absent`; a malformed or missing claim
//! nulls that one field and never the whole bundle.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use catalog_shared::{
    EntityType, FactBundle, FactField, FactKey, FactSource, RecordFacts, Result,
};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::StructuredFactsSource;
use crate::client::{fetch_json, join_segments, parse_base};

/// Signed year prefix of a claim time value, e.g. `+1952-03-11T00:00:00Z`.
static CLAIM_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-])(\d+)-").expect("valid regex"));

/// How a property's value is read.
#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Year,
    Text,
}

/// Properties consulted per fact field, in preference order.
struct PropertyRule {
    key: FactKey,
    properties: &'static [&'static str],
    kind: ValueKind,
}

const PERSON_RULES: &[PropertyRule] = &[
    PropertyRule { key: FactKey::BirthYear, properties: &["P569"], kind: ValueKind::Year },
    PropertyRule { key: FactKey::DeathYear, properties: &["P570"], kind: ValueKind::Year },
];

const FOUNDED_RULES: &[PropertyRule] = &[
    PropertyRule { key: FactKey::FoundedYear, properties: &["P571"], kind: ValueKind::Year },
];

const BOOK_RULES: &[PropertyRule] = &[
    PropertyRule { key: FactKey::PublishedYear, properties: &["P577"], kind: ValueKind::Year },
    PropertyRule { key: FactKey::Isbn, properties: &["P212", "P957"], kind: ValueKind::Text },
];

const MOVIE_RULES: &[PropertyRule] = &[
    PropertyRule { key: FactKey::ReleasedYear, properties: &["P577"], kind: ValueKind::Year },
];

fn rules_for(entity_type: EntityType) -> &'static [PropertyRule] {
    match entity_type {
        EntityType::Person => PERSON_RULES,
        EntityType::Organization | EntityType::Project => FOUNDED_RULES,
        EntityType::Book => BOOK_RULES,
        EntityType::Movie => MOVIE_RULES,
        EntityType::Topic | EntityType::Concept => &[],
    }
}

// ---------------------------------------------------------------------------
// Claims document
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EntityDocument {
    #[serde(default)]
    entities: HashMap<String, Entity>,
}

#[derive(Debug, Default, Deserialize)]
struct Entity {
    #[serde(default)]
    claims: HashMap<String, Vec<Claim>>,
}

#[derive(Debug, Deserialize)]
struct Claim {
    mainsnak: Snak,
    #[serde(default = "normal_rank")]
    rank: String,
}

fn normal_rank() -> String {
    "normal".into()
}

#[derive(Debug, Deserialize)]
struct Snak {
    snaktype: String,
    datavalue: Option<DataValue>,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    value: serde_json::Value,
}

impl Entity {
    /// Preferred-rank claim if any, else the first normal-rank one.
    fn select_claim(&self, property: &str) -> Option<&Claim> {
        let claims = self.claims.get(property)?;
        claims
            .iter()
            .find(|c| c.rank == "preferred")
            .or_else(|| claims.iter().find(|c| c.rank == "normal"))
    }

    fn claim_value(&self, property: &str) -> Option<&serde_json::Value> {
        let claim = self.select_claim(property)?;
        if claim.mainsnak.snaktype != "value" {
            return None;
        }
        claim.mainsnak.datavalue.as_ref().map(|d| &d.value)
    }

    fn extract(&self, entity_type: EntityType) -> RecordFacts {
        let mut facts = RecordFacts::default();
        for rule in rules_for(entity_type) {
            let value = rule
                .properties
                .iter()
                .find_map(|p| self.claim_value(p).and_then(|v| read_value(v, rule.kind)));
            assign(&mut facts, rule.key, value);
        }
        facts
    }
}

#[derive(Debug)]
enum ClaimValue {
    Year(i32),
    Text(String),
}

fn read_value(value: &serde_json::Value, kind: ValueKind) -> Option<ClaimValue> {
    match kind {
        ValueKind::Year => value
            .get("time")
            .and_then(|t| t.as_str())
            .and_then(parse_claim_year)
            .map(ClaimValue::Year),
        ValueKind::Text => value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| ClaimValue::Text(s.to_string())),
    }
}

/// Bare integer year from a signed claim time string; `None` if malformed.
pub fn parse_claim_year(time: &str) -> Option<i32> {
    let caps = CLAIM_YEAR_RE.captures(time)?;
    let magnitude: i32 = caps[2].parse().ok()?;
    match &caps[1] {
        "-" => Some(-magnitude),
        _ => Some(magnitude),
    }
}

fn assign(facts: &mut RecordFacts, key: FactKey, value: Option<ClaimValue>) {
    let year = |v: &Option<ClaimValue>| match v {
        Some(ClaimValue::Year(y)) => FactField::Present(*y),
        _ => FactField::Absent,
    };
    let text = |v: Option<ClaimValue>| match v {
        Some(ClaimValue::Text(t)) => FactField::Present(t),
        _ => FactField::Absent,
    };
    match key {
        FactKey::BirthYear => facts.birth_year = year(&value),
        FactKey::DeathYear => facts.death_year = year(&value),
        FactKey::FoundedYear => facts.founded_year = year(&value),
        FactKey::PublishedYear => facts.published_year = year(&value),
        FactKey::ReleasedYear => facts.released_year = year(&value),
        FactKey::Isbn => facts.isbn = text(value),
        FactKey::Publisher => facts.publisher = text(value),
        FactKey::Language => facts.language = text(value),
        FactKey::Authors => {
            facts.authors = match value {
                Some(ClaimValue::Text(t)) => FactField::Present(vec![t]),
                _ => FactField::Absent,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolver for the structured-facts entity document endpoint.
pub struct FactsResolver {
    client: Client,
    base: Url,
}

impl FactsResolver {
    pub fn new(client: Client, base: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: parse_base(base)?,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn fetch_entity(&self, id: &str) -> Result<Option<Entity>> {
        let url = join_segments(&self.base, &[&format!("{id}.json")]);
        let mut document: EntityDocument = fetch_json(self.client.get(url)).await?;
        // A redirected id is keyed under its new identifier.
        let entity = match document.entities.remove(id) {
            Some(entity) => Some(entity),
            None if document.entities.len() == 1 => document.entities.into_values().next(),
            None => None,
        };
        Ok(entity)
    }
}

#[async_trait]
impl StructuredFactsSource for FactsResolver {
    #[instrument(skip_all, fields(id = id.unwrap_or("-"), entity_type = %entity_type))]
    async fn structured_facts(&self, id: Option<&str>, entity_type: EntityType) -> FactBundle {
        let Some(id) = id else {
            return FactBundle::not_found(FactSource::StructuredFacts);
        };
        if rules_for(entity_type).is_empty() {
            return FactBundle::found(FactSource::StructuredFacts, RecordFacts::default());
        }

        match self.fetch_entity(id).await {
            Ok(Some(entity)) => {
                let facts = entity.extract(entity_type);
                debug!(fields = ?facts.defined_keys(), "structured facts resolved");
                FactBundle::found(FactSource::StructuredFacts, facts)
            }
            Ok(None) => {
                debug!("entity missing from claims document");
                FactBundle::not_found(FactSource::StructuredFacts)
            }
            Err(e) => {
                debug!(error = %e, "structured facts unavailable");
                FactBundle::not_found(FactSource::StructuredFacts)
            }
        }
    }
}
