//! Core domain types for catalog entity enrichment.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::{CatalogError, Result};

/// Current version of the record/generation schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Name under which the generation schema is declared upstream.
pub const SCHEMA_NAME: &str = "catalog_entity_v1";

/// Minimum number of tags on a finished record.
pub const MIN_TAGS: usize = 2;

/// Maximum number of tags on a finished record.
pub const MAX_TAGS: usize = 6;

/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 32;

/// Summaries shorter than this are replaced by [`SUMMARY_SENTINEL`].
pub const MIN_SUMMARY_CHARS: usize = 40;

/// Summaries longer than this are cut at a word boundary.
pub const MAX_SUMMARY_CHARS: usize = 600;

/// Summary used when no usable summary exists.
pub const SUMMARY_SENTINEL: &str = "Summary not established.";

/// `href` used when no verified reference URL exists.
pub const NO_REFERENCE_HREF: &str = "#no-reference";

/// Regex source for a valid tag, shared with the generation schema.
pub const TAG_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)*$";

/// Regex source for a valid image filename, shared with the generation schema.
pub const IMAGE_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)*\.(jpg|png|webp)$";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(TAG_PATTERN).expect("valid regex"));

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IMAGE_PATTERN).expect("valid regex"));

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// Coarse kind of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Project,
    Organization,
    Topic,
    Book,
    Movie,
    Concept,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [EntityType; 7] = [
        Self::Person,
        Self::Project,
        Self::Organization,
        Self::Topic,
        Self::Book,
        Self::Movie,
        Self::Concept,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Project => "project",
            Self::Organization => "organization",
            Self::Topic => "topic",
            Self::Book => "book",
            Self::Movie => "movie",
            Self::Concept => "concept",
        }
    }

    /// Factual fields owned by the source resolvers for this type.
    pub fn fact_keys(&self) -> &'static [FactKey] {
        match self {
            Self::Person => &[FactKey::BirthYear, FactKey::DeathYear],
            Self::Organization | Self::Project => &[FactKey::FoundedYear],
            Self::Book => &[
                FactKey::Authors,
                FactKey::PublishedYear,
                FactKey::Publisher,
                FactKey::Isbn,
                FactKey::Language,
            ],
            Self::Movie => &[FactKey::ReleasedYear],
            Self::Topic | Self::Concept => &[],
        }
    }

    /// Whether the library catalog is consulted for this type.
    pub fn uses_catalog(&self) -> bool {
        matches!(self, Self::Book)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| {
                CatalogError::validation(format!(
                    "unknown entity type '{s}': expected one of person, project, organization, topic, book, movie, concept"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// EntityReference
// ---------------------------------------------------------------------------

/// The bare input to one enrichment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReference {
    /// Display title, never empty.
    pub title: String,
    /// Coarse entity type.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Values the caller already knows (may be empty).
    #[serde(default)]
    pub known_fields: serde_json::Map<String, serde_json::Value>,
}

impl EntityReference {
    /// Build a reference, rejecting blank titles.
    pub fn new(title: impl Into<String>, entity_type: EntityType) -> Result<Self> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(CatalogError::validation("title must not be empty"));
        }
        Ok(Self {
            title,
            entity_type,
            known_fields: serde_json::Map::new(),
        })
    }

    /// Attach caller-known field values.
    pub fn with_known(mut self, known: serde_json::Map<String, serde_json::Value>) -> Self {
        self.known_fields = known;
        self
    }

    /// A known field value, ignoring JSON nulls.
    pub fn known(&self, key: &str) -> Option<&serde_json::Value> {
        self.known_fields.get(key).filter(|v| !v.is_null())
    }
}

// ---------------------------------------------------------------------------
// FactField
// ---------------------------------------------------------------------------

/// Tri-state value of a resolver-owned field.
///
/// Serialized as an omitted key (`NotQueried`), `null` (`Absent`) or the value
/// (`Present`). For a person, `deathYear: null` therefore means the death date
/// was queried and none is recorded (alive or unknown), while a missing
/// `deathYear` means nobody asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactField<T> {
    NotQueried,
    Absent,
    Present(T),
}

impl<T> Default for FactField<T> {
    fn default() -> Self {
        Self::NotQueried
    }
}

impl<T> FactField<T> {
    pub fn is_not_queried(&self) -> bool {
        matches!(self, Self::NotQueried)
    }

    /// True when a resolver answered for this field, with or without a value.
    pub fn is_defined(&self) -> bool {
        !self.is_not_queried()
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Self::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Queried field: `Present` for `Some`, `Absent` for `None`.
    pub fn queried(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }

    /// Keep `self` if defined, otherwise take `other`.
    pub fn or(self, other: Self) -> Self {
        if self.is_defined() { self } else { other }
    }
}

impl<T: Serialize> Serialize for FactField<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FactField<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::queried)
    }
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Key of a resolver-owned factual field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactKey {
    BirthYear,
    DeathYear,
    FoundedYear,
    PublishedYear,
    ReleasedYear,
    Authors,
    Publisher,
    Isbn,
    Language,
}

impl FactKey {
    /// JSON key used on the record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BirthYear => "birthYear",
            Self::DeathYear => "deathYear",
            Self::FoundedYear => "foundedYear",
            Self::PublishedYear => "publishedYear",
            Self::ReleasedYear => "releasedYear",
            Self::Authors => "authors",
            Self::Publisher => "publisher",
            Self::Isbn => "isbn",
            Self::Language => "language",
        }
    }
}

/// Typed factual fields shared by fact bundles and finished records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFacts {
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub birth_year: FactField<i32>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub death_year: FactField<i32>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub founded_year: FactField<i32>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub published_year: FactField<i32>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub released_year: FactField<i32>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub authors: FactField<Vec<String>>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub publisher: FactField<String>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub isbn: FactField<String>,
    #[serde(default, skip_serializing_if = "FactField::is_not_queried")]
    pub language: FactField<String>,
}

impl RecordFacts {
    /// Whether the field for `key` was answered (present or absent).
    pub fn is_defined(&self, key: FactKey) -> bool {
        match key {
            FactKey::BirthYear => self.birth_year.is_defined(),
            FactKey::DeathYear => self.death_year.is_defined(),
            FactKey::FoundedYear => self.founded_year.is_defined(),
            FactKey::PublishedYear => self.published_year.is_defined(),
            FactKey::ReleasedYear => self.released_year.is_defined(),
            FactKey::Authors => self.authors.is_defined(),
            FactKey::Publisher => self.publisher.is_defined(),
            FactKey::Isbn => self.isbn.is_defined(),
            FactKey::Language => self.language.is_defined(),
        }
    }

    /// Keys that carry an answer.
    pub fn defined_keys(&self) -> Vec<FactKey> {
        const KEYS: [FactKey; 9] = [
            FactKey::BirthYear,
            FactKey::DeathYear,
            FactKey::FoundedYear,
            FactKey::PublishedYear,
            FactKey::ReleasedYear,
            FactKey::Authors,
            FactKey::Publisher,
            FactKey::Isbn,
            FactKey::Language,
        ];
        KEYS.into_iter().filter(|k| self.is_defined(*k)).collect()
    }
}

/// Which resolver produced a [`FactBundle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    SummaryEndpoint,
    StructuredFacts,
    Catalog,
}

impl FactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SummaryEndpoint => "summary_endpoint",
            Self::StructuredFacts => "structured_facts",
            Self::Catalog => "catalog",
        }
    }
}

/// Output of one source resolver. Never contains subjective text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactBundle {
    pub source: FactSource,
    /// False when the resolver could not identify the entity at all.
    pub found: bool,
    /// Verified canonical reference URL.
    pub canonical_url: Option<String>,
    pub facts: RecordFacts,
}

impl FactBundle {
    /// The definitive "not found" bundle: nothing queried, nothing known.
    pub fn not_found(source: FactSource) -> Self {
        Self {
            source,
            found: false,
            canonical_url: None,
            facts: RecordFacts::default(),
        }
    }

    /// A found bundle carrying the given facts.
    pub fn found(source: FactSource, facts: RecordFacts) -> Self {
        Self {
            source,
            found: true,
            canonical_url: None,
            facts,
        }
    }
}

// ---------------------------------------------------------------------------
// EnrichedRecord
// ---------------------------------------------------------------------------

/// The final, merged and normalized catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    /// Schema version the record was produced under.
    pub schema_version: u32,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub title: String,
    /// Verified canonical URL or [`NO_REFERENCE_HREF`].
    pub href: String,
    /// Conventional image filename (when no uploaded image exists).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Uploaded image URL supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub summary: String,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub facts: RecordFacts,
    /// Short subjective highlights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<String>>,
    /// Genres (books and movies only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
}

impl EnrichedRecord {
    /// Every invariant the record breaks. Empty for a valid record.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();

        if self.title.trim().is_empty() {
            out.push("title is empty".to_string());
        }

        if !(MIN_TAGS..=MAX_TAGS).contains(&self.tags.len()) {
            out.push(format!("tag count {} outside {MIN_TAGS}..={MAX_TAGS}", self.tags.len()));
        }
        for (i, tag) in self.tags.iter().enumerate() {
            if !is_valid_tag(tag) {
                out.push(format!("tag '{tag}' is not slug-shaped"));
            }
            if self.tags[..i].contains(tag) {
                out.push(format!("tag '{tag}' is duplicated"));
            }
        }

        if self.summary != SUMMARY_SENTINEL {
            let len = self.summary.chars().count();
            if len < MIN_SUMMARY_CHARS {
                out.push(format!("summary too short ({len} chars)"));
            }
            // +1 for the ellipsis appended when cutting
            if len > MAX_SUMMARY_CHARS + 1 {
                out.push(format!("summary too long ({len} chars)"));
            }
        }

        if self.href != NO_REFERENCE_HREF && !is_http_url(&self.href) {
            out.push(format!("href '{}' is neither a URL nor the sentinel", self.href));
        }

        match (&self.image, &self.image_url) {
            (Some(name), None) if is_valid_image_name(name) => {}
            (Some(name), None) => out.push(format!("image '{name}' breaks the naming convention")),
            (None, Some(url)) if is_http_url(url) => {}
            (None, Some(url)) => out.push(format!("imageUrl '{url}' is not a URL")),
            (Some(_), Some(_)) => out.push("both image and imageUrl are set".to_string()),
            (None, None) => out.push("neither image nor imageUrl is set".to_string()),
        }

        let allowed = self.entity_type.fact_keys();
        for key in self.facts.defined_keys() {
            if !allowed.contains(&key) {
                out.push(format!(
                    "{} is not a fact field of {}",
                    key.as_str(),
                    self.entity_type
                ));
            }
        }

        out
    }
}

/// A record as persisted by the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub record: EnrichedRecord,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase slug: ASCII alphanumerics joined by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_http_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn is_valid_tag(tag: &str) -> bool {
    tag.len() <= MAX_TAG_LEN && TAG_RE.is_match(tag)
}

pub fn is_valid_image_name(name: &str) -> bool {
    IMAGE_RE.is_match(name)
}
