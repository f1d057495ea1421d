//! Field-ownership merge of resolver bundles, caller-known values and the
//! generated payload.
//!
//! Per field, the first source that defines it wins:
//! fact bundles (structured facts, then catalog) → caller-known fields →
//! generator → default (filled in by the normalizer). Among bundles a value
//! beats an answer of "no value"; the latter still outranks known and
//! generated values. The result depends only on this fixed order, never on
//! which task settled first.

use catalog_shared::{
    EntityReference, FactBundle, FactField, FactKey, FactSource, RecordFacts, is_http_url,
};
use serde_json::Value;

use crate::extract::JsonObject;
use crate::normalize::Draft;

/// Position of a resolver in the merge order (lower wins).
fn source_rank(source: FactSource) -> u8 {
    match source {
        FactSource::StructuredFacts => 0,
        FactSource::Catalog => 1,
        FactSource::SummaryEndpoint => 2,
    }
}

/// Merge everything gathered for one reference into a draft.
pub fn merge(
    reference: &EntityReference,
    mut bundles: Vec<FactBundle>,
    generated: &JsonObject,
) -> Draft {
    bundles.sort_by_key(|b| source_rank(b.source));

    let known = |key: &str| reference.known(key);
    let from_generator = |key: &str| generated.get(key).filter(|v| !v.is_null());

    let mut draft = Draft::new(reference.entity_type, reference.title.clone());

    // links are never taken from the generator
    draft.href = bundles
        .iter()
        .filter_map(|b| b.canonical_url.clone())
        .chain(known("href").and_then(loose_string))
        .find(|url| is_http_url(url));

    draft.image_url = known("imageUrl").and_then(loose_string);
    draft.image = known("image")
        .and_then(loose_string)
        .or_else(|| from_generator("image").and_then(loose_string));
    draft.summary = known("summary")
        .and_then(loose_string)
        .or_else(|| from_generator("summary").and_then(loose_string));
    draft.tags = known("tags")
        .and_then(loose_list)
        .or_else(|| from_generator("tags").and_then(loose_list))
        .unwrap_or_default();
    draft.highlights = known("highlights")
        .and_then(loose_list)
        .or_else(|| from_generator("highlights").and_then(loose_list));
    draft.genres = known("genres")
        .and_then(loose_list)
        .or_else(|| from_generator("genres").and_then(loose_list));

    draft.facts = merge_facts(reference, &bundles, generated);
    draft
}

/// Fact fields of the reference's type, in ownership order.
fn merge_facts(
    reference: &EntityReference,
    bundles: &[FactBundle],
    generated: &JsonObject,
) -> RecordFacts {
    let mut facts = RecordFacts::default();
    for &key in reference.entity_type.fact_keys() {
        let lookup = FieldLookup {
            key,
            bundles,
            reference,
            generated,
        };
        match key {
            FactKey::BirthYear => facts.birth_year = lookup.pick(|f| &f.birth_year),
            FactKey::DeathYear => facts.death_year = lookup.pick(|f| &f.death_year),
            FactKey::FoundedYear => facts.founded_year = lookup.pick(|f| &f.founded_year),
            FactKey::PublishedYear => facts.published_year = lookup.pick(|f| &f.published_year),
            FactKey::ReleasedYear => facts.released_year = lookup.pick(|f| &f.released_year),
            FactKey::Authors => facts.authors = lookup.pick(|f| &f.authors),
            FactKey::Publisher => facts.publisher = lookup.pick(|f| &f.publisher),
            FactKey::Isbn => facts.isbn = lookup.pick(|f| &f.isbn),
            FactKey::Language => facts.language = lookup.pick(|f| &f.language),
        }
    }
    facts
}

struct FieldLookup<'a> {
    key: FactKey,
    bundles: &'a [FactBundle],
    reference: &'a EntityReference,
    generated: &'a JsonObject,
}

impl FieldLookup<'_> {
    fn pick<T: Clone + Loose>(
        &self,
        field: impl Fn(&RecordFacts) -> &FactField<T>,
    ) -> FactField<T> {
        let name = self.key.as_str();
        self.from_bundles(field)
            .or(loose_field(self.reference.known(name)))
            .or(loose_field(self.generated.get(name)))
    }

    /// First value across the ranked bundles, else `Absent` if any bundle
    /// queried the field.
    fn from_bundles<T: Clone>(
        &self,
        field: impl Fn(&RecordFacts) -> &FactField<T>,
    ) -> FactField<T> {
        let mut answer = FactField::NotQueried;
        for bundle in self.bundles {
            match field(&bundle.facts) {
                FactField::Present(value) => return FactField::Present(value.clone()),
                FactField::Absent => answer = FactField::Absent,
                FactField::NotQueried => {}
            }
        }
        answer
    }
}

fn loose_field<T: Loose>(value: Option<&Value>) -> FactField<T> {
    match value {
        None | Some(Value::Null) => FactField::NotQueried,
        Some(v) => T::from_loose(v).map_or(FactField::NotQueried, FactField::Present),
    }
}

/// Lenient conversion for caller- and generator-supplied JSON values.
trait Loose: Sized {
    fn from_loose(value: &Value) -> Option<Self>;
}

impl Loose for i32 {
    fn from_loose(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl Loose for String {
    fn from_loose(value: &Value) -> Option<Self> {
        loose_string(value)
    }
}

impl Loose for Vec<String> {
    fn from_loose(value: &Value) -> Option<Self> {
        loose_list(value)
    }
}

fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A non-empty list of strings; a lone string counts as a one-item list.
fn loose_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(loose_string).collect(),
        other => loose_string(other).into_iter().collect(),
    };
    (!items.is_empty()).then_some(items)
}
