//! Structured-output schema and instructions for the constrained generator.
//!
//! One canonical schema version ([`SCHEMA_NAME`]) is built per entity type.
//! Fields owned by the factual resolvers for that type never appear in it.

use catalog_shared::{
    EntityReference, EntityType, IMAGE_PATTERN, MAX_SUMMARY_CHARS, MAX_TAG_LEN, MAX_TAGS,
    MIN_SUMMARY_CHARS, MIN_TAGS, SCHEMA_NAME, TAG_PATTERN,
};
use serde_json::{Value, json};

/// Value the generator must put in `href`; links come from the resolvers.
pub const HREF_PLACEHOLDER: &str = "#";

/// Maximum number of highlights requested.
pub const MAX_HIGHLIGHTS: usize = 3;

/// Maximum number of genres requested.
pub const MAX_GENRES: usize = 4;

/// Everything the generator needs for one call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub schema_name: &'static str,
    pub schema: Value,
    pub instructions: String,
    /// JSON document with the reference and the caller-known fields.
    pub input: String,
}

impl GenerationRequest {
    /// Build the request for one entity reference.
    pub fn for_reference(reference: &EntityReference) -> Self {
        Self {
            schema_name: SCHEMA_NAME,
            schema: build_schema(reference.entity_type),
            instructions: build_instructions(reference),
            input: build_input(reference),
        }
    }
}

/// Whether the schema carries a `genres` extension for this type.
pub fn has_genres(entity_type: EntityType) -> bool {
    matches!(entity_type, EntityType::Book | EntityType::Movie)
}

/// Strict JSON Schema for the generator's output.
pub fn build_schema(entity_type: EntityType) -> Value {
    let mut properties = json!({
        "type": { "type": "string", "enum": [entity_type.as_str()] },
        "title": { "type": "string", "minLength": 1, "maxLength": 200 },
        "href": { "type": "string", "enum": [HREF_PLACEHOLDER] },
        "image": { "type": "string", "pattern": IMAGE_PATTERN, "maxLength": 120 },
        "summary": {
            "type": "string",
            "minLength": MIN_SUMMARY_CHARS,
            "maxLength": MAX_SUMMARY_CHARS
        },
        "tags": {
            "type": "array",
            "minItems": MIN_TAGS,
            "maxItems": MAX_TAGS,
            "items": { "type": "string", "pattern": TAG_PATTERN, "maxLength": MAX_TAG_LEN }
        },
        "highlights": {
            "type": ["array", "null"],
            "maxItems": MAX_HIGHLIGHTS,
            "items": { "type": "string", "minLength": 1, "maxLength": 120 }
        }
    });
    let mut required = vec!["type", "title", "href", "image", "summary", "tags", "highlights"];

    if has_genres(entity_type) {
        properties["genres"] = json!({
            "type": ["array", "null"],
            "maxItems": MAX_GENRES,
            "items": { "type": "string", "pattern": TAG_PATTERN, "maxLength": MAX_TAG_LEN }
        });
        required.push("genres");
    }

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": required,
        "properties": properties
    })
}

/// Instruction set: output contract, no invented facts, no resolver-owned fields.
pub fn build_instructions(reference: &EntityReference) -> String {
    let entity_type = reference.entity_type;
    let mut lines = vec![
        format!(
            "You write entries for a small reference catalog. The entry is a {entity_type} titled \"{}\".",
            reference.title
        ),
        "Return only the JSON object described by the response schema.".to_string(),
        "Never invent facts. Do not state dates, numbers, names, quotes or URLs you cannot verify; \
         when unsure, leave the detail out."
            .to_string(),
        format!(
            "`summary`: one to three neutral sentences ({MIN_SUMMARY_CHARS}-{MAX_SUMMARY_CHARS} characters) \
             saying what this {entity_type} is."
        ),
        format!(
            "`tags`: {MIN_TAGS} to {MAX_TAGS} lowercase dash-separated topical tags, no duplicates."
        ),
        format!("`href`: always \"{HREF_PLACEHOLDER}\". Reference links are resolved separately."),
        "`image`: a lowercase dash-separated filename derived from the title, ending in .jpg."
            .to_string(),
        format!("`highlights`: up to {MAX_HIGHLIGHTS} short phrases on why the entry matters, or null."),
    ];

    if has_genres(entity_type) {
        lines.push(format!("`genres`: up to {MAX_GENRES} lowercase genre slugs, or null."));
    }

    let owned: Vec<&str> = entity_type.fact_keys().iter().map(|k| k.as_str()).collect();
    if !owned.is_empty() {
        lines.push(format!(
            "Do not output {}: those fields come from factual sources, not from you.",
            owned.join(", ")
        ));
    }

    if !reference.known_fields.is_empty() {
        lines.push(
            "The input lists fields the editor already knows. Treat them as correct and stay consistent with them."
                .to_string(),
        );
    }

    lines.join("\n")
}

/// The user-side input: the reference and what is already known.
pub fn build_input(reference: &EntityReference) -> String {
    json!({
        "type": reference.entity_type,
        "title": reference.title,
        "knownFields": reference.known_fields,
    })
    .to_string()
}
