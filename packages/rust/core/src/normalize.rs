//! Output repair: enforces record invariants regardless of value origin.
//!
//! Thin but schema-valid input (too few tags, a one-word summary, no link) is
//! repaired deterministically and reported as a [`Shortfall`], never raised.

use catalog_shared::{
    EnrichedRecord, EntityType, MAX_SUMMARY_CHARS, MAX_TAG_LEN, MAX_TAGS, MIN_SUMMARY_CHARS,
    MIN_TAGS, NO_REFERENCE_HREF, RecordFacts, SCHEMA_VERSION, SUMMARY_SENTINEL, is_http_url,
    is_valid_image_name, is_valid_tag, slugify,
};

use crate::schema::{MAX_GENRES, MAX_HIGHLIGHTS, has_genres};

/// Generic tags used to pad a short tag list, after the type itself.
const FALLBACK_TAGS: [&str; 3] = ["catalog", "reference", "general"];

/// Image filename used when the title has no sluggable characters.
const DEFAULT_IMAGE: &str = "entry.jpg";

/// Longest image stem derived from a title.
const MAX_IMAGE_STEM: usize = 80;

/// Longest single highlight kept.
const MAX_HIGHLIGHT_CHARS: usize = 120;

/// A merged record before repair.
#[derive(Debug, Clone)]
pub struct Draft {
    pub entity_type: EntityType,
    pub title: String,
    pub href: Option<String>,
    pub image: Option<String>,
    pub image_url: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub facts: RecordFacts,
    pub highlights: Option<Vec<String>>,
    pub genres: Option<Vec<String>>,
}

impl Draft {
    pub fn new(entity_type: EntityType, title: impl Into<String>) -> Self {
        Self {
            entity_type,
            title: title.into(),
            href: None,
            image: None,
            image_url: None,
            summary: None,
            tags: Vec::new(),
            facts: RecordFacts::default(),
            highlights: None,
            genres: None,
        }
    }
}

/// One deterministic repair applied during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortfall {
    /// Tags were re-slugged, emptied or duplicated.
    TagsRewritten,
    TagsTruncated { dropped: usize },
    TagsPadded { added: usize },
    SummaryReplaced { chars: usize },
    SummaryCut { chars: usize },
    ImageDerived,
    ImageUrlRejected,
    NoReference,
}

/// Repairs applied to one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub shortfalls: Vec<Shortfall>,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.shortfalls.is_empty()
    }
}

/// Repair a draft into a record that satisfies every invariant.
pub fn normalize(draft: Draft) -> (EnrichedRecord, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let entity_type = draft.entity_type;

    let tags = repair_tags(&draft.tags, entity_type, &mut report.shortfalls);

    let (image, image_url) = match draft.image_url {
        Some(url) if is_http_url(&url) => (None, Some(url)),
        rejected => {
            if rejected.is_some() {
                report.shortfalls.push(Shortfall::ImageUrlRejected);
            }
            let image = match draft.image {
                Some(name) if is_valid_image_name(&name) => name,
                _ => {
                    report.shortfalls.push(Shortfall::ImageDerived);
                    derive_image_name(&draft.title)
                }
            };
            (Some(image), None)
        }
    };

    let summary = repair_summary(draft.summary.as_deref(), &mut report.shortfalls);

    let href = match draft.href {
        Some(url) if is_http_url(&url) => url,
        _ => {
            report.shortfalls.push(Shortfall::NoReference);
            NO_REFERENCE_HREF.to_string()
        }
    };

    let highlights = draft.highlights.and_then(repair_highlights);
    let genres = if has_genres(entity_type) {
        draft.genres.and_then(repair_genres)
    } else {
        None
    };

    let record = EnrichedRecord {
        schema_version: SCHEMA_VERSION,
        entity_type,
        title: draft.title.trim().to_string(),
        href,
        image,
        image_url,
        summary,
        tags,
        facts: draft.facts,
        highlights,
        genres,
    };
    (record, report)
}

/// Normalize a tag list to 2-6 unique slugs. Idempotent.
pub fn normalize_tags(raw: &[String], entity_type: EntityType) -> Vec<String> {
    repair_tags(raw, entity_type, &mut Vec::new())
}

fn tag_slug(raw: &str) -> String {
    let mut slug = slugify(raw);
    slug.truncate(MAX_TAG_LEN);
    slug.trim_end_matches('-').to_string()
}

fn repair_tags(
    raw: &[String],
    entity_type: EntityType,
    shortfalls: &mut Vec<Shortfall>,
) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(MAX_TAGS);
    for tag in raw.iter().map(|t| tag_slug(t)).filter(|t| !t.is_empty()) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    let rewritten = tags.len() != raw.len() || tags.iter().zip(raw).any(|(a, b)| a != b);

    if tags.len() > MAX_TAGS {
        shortfalls.push(Shortfall::TagsTruncated {
            dropped: tags.len() - MAX_TAGS,
        });
        tags.truncate(MAX_TAGS);
    } else if rewritten {
        shortfalls.push(Shortfall::TagsRewritten);
    }

    let before = tags.len();
    let fallbacks = std::iter::once(entity_type.as_str()).chain(FALLBACK_TAGS);
    for fallback in fallbacks {
        if tags.len() >= MIN_TAGS {
            break;
        }
        if !tags.iter().any(|t| t == fallback) {
            tags.push(fallback.to_string());
        }
    }
    if tags.len() > before {
        shortfalls.push(Shortfall::TagsPadded {
            added: tags.len() - before,
        });
    }

    debug_assert!(tags.iter().all(|t| is_valid_tag(t)));
    tags
}

/// Conventional image filename for a title.
pub fn derive_image_name(title: &str) -> String {
    let mut stem = slugify(title);
    stem.truncate(MAX_IMAGE_STEM);
    let stem = stem.trim_end_matches('-');
    if stem.is_empty() {
        DEFAULT_IMAGE.to_string()
    } else {
        format!("{stem}.jpg")
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn repair_summary(raw: Option<&str>, shortfalls: &mut Vec<Shortfall>) -> String {
    let summary = raw.map(collapse_whitespace).unwrap_or_default();
    let chars = summary.chars().count();

    if chars < MIN_SUMMARY_CHARS {
        shortfalls.push(Shortfall::SummaryReplaced { chars });
        return SUMMARY_SENTINEL.to_string();
    }
    if chars > MAX_SUMMARY_CHARS {
        let cut = cut_at_word(&summary, MAX_SUMMARY_CHARS);
        let kept = cut.chars().count();
        // trailing punctuation trimming can leave a stub
        if kept < MIN_SUMMARY_CHARS {
            shortfalls.push(Shortfall::SummaryReplaced { chars: kept });
            return SUMMARY_SENTINEL.to_string();
        }
        shortfalls.push(Shortfall::SummaryCut { chars });
        return cut;
    }
    summary
}

/// Cut to at most `max` chars at a word boundary and append an ellipsis.
fn cut_at_word(text: &str, max: usize) -> String {
    let end = text
        .char_indices()
        .nth(max)
        .map_or(text.len(), |(idx, _)| idx);
    let head = &text[..end];
    // fall back to a hard cut when the only space is very early
    let cut = match head.rfind(' ') {
        Some(idx) if idx >= max / 2 => &head[..idx],
        _ => head,
    };
    let cut = cut.trim_end_matches(|c: char| c.is_whitespace() || ",;:-".contains(c));
    format!("{cut}…")
}

fn repair_highlights(raw: Vec<String>) -> Option<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for item in raw {
        let item = collapse_whitespace(&item);
        if item.is_empty() || out.contains(&item) {
            continue;
        }
        let item = if item.chars().count() > MAX_HIGHLIGHT_CHARS {
            cut_at_word(&item, MAX_HIGHLIGHT_CHARS)
        } else {
            item
        };
        out.push(item);
        if out.len() == MAX_HIGHLIGHTS {
            break;
        }
    }
    (!out.is_empty()).then_some(out)
}

fn repair_genres(raw: Vec<String>) -> Option<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for genre in raw.iter().map(|g| tag_slug(g)).filter(|g| !g.is_empty()) {
        if !out.contains(&genre) {
            out.push(genre);
        }
    }
    out.truncate(MAX_GENRES);
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn long_summary() -> String {
        "A catalog entry describing the subject in plain and neutral words.".to_string()
    }

    #[test]
    fn single_tag_is_padded() {
        let tags = normalize_tags(&strings(&["x"]), EntityType::Person);
        assert_eq!(tags, strings(&["x", "person"]));
    }

    #[test]
    fn padding_skips_duplicates() {
        let tags = normalize_tags(&strings(&["Person"]), EntityType::Person);
        assert_eq!(tags, strings(&["person", "catalog"]));

        let empty = normalize_tags(&[], EntityType::Book);
        assert_eq!(empty, strings(&["book", "catalog"]));
    }

    #[test]
    fn tags_are_slugged_deduped_and_truncated() {
        let raw = strings(&[
            "Science Fiction",
            "science-fiction",
            "  ",
            "Space_Opera!",
            "a",
            "b",
            "c",
            "d",
            "e",
        ]);
        let tags = normalize_tags(&raw, EntityType::Book);
        assert_eq!(tags, strings(&["science-fiction", "space-opera", "a", "b", "c", "d"]));
    }

    #[test]
    fn long_tags_are_clipped_without_trailing_dash() {
        let raw = strings(&["abcdefghij abcdefghij abcdefghij abcdefghij", "ok"]);
        let tags = normalize_tags(&raw, EntityType::Topic);
        assert!(tags[0].len() <= MAX_TAG_LEN);
        assert!(!tags[0].ends_with('-'));
        assert!(tags.iter().all(|t| is_valid_tag(t)));
    }

    #[test]
    fn tag_normalization_is_idempotent() {
        let inputs = [
            strings(&["x"]),
            strings(&["Rust", "RUST", "systems programming", "Ünïcode", "", "a", "b", "c", "d"]),
            strings(&["--", "__"]),
            strings(&["fantasy", "coming-of-age"]),
        ];
        for entity_type in EntityType::ALL {
            for raw in &inputs {
                let once = normalize_tags(raw, entity_type);
                let twice = normalize_tags(&once, entity_type);
                assert_eq!(once, twice);
                assert!((MIN_TAGS..=MAX_TAGS).contains(&once.len()));
            }
        }
    }

    #[test]
    fn short_summary_becomes_sentinel() {
        let mut draft = Draft::new(EntityType::Person, "Jane Doe");
        draft.summary = Some("Short".into());
        let (record, report) = normalize(draft);
        assert_eq!(record.summary, SUMMARY_SENTINEL);
        assert!(report.shortfalls.contains(&Shortfall::SummaryReplaced { chars: 5 }));
    }

    #[test]
    fn missing_summary_becomes_sentinel() {
        let (record, _) = normalize(Draft::new(EntityType::Topic, "Entropy"));
        assert_eq!(record.summary, SUMMARY_SENTINEL);
    }

    #[test]
    fn summary_whitespace_is_collapsed() {
        let mut draft = Draft::new(EntityType::Topic, "Entropy");
        draft.summary = Some(
            "  A   measure of\n\tdisorder in a  physical system, central to thermodynamics. ".into(),
        );
        let (record, _) = normalize(draft);
        assert_eq!(
            record.summary,
            "A measure of disorder in a physical system, central to thermodynamics."
        );
    }

    #[test]
    fn long_summary_is_cut_at_word_boundary() {
        let text = "word ".repeat(200);
        let mut draft = Draft::new(EntityType::Topic, "Words");
        draft.summary = Some(text);
        let (record, report) = normalize(draft);
        assert!(record.summary.ends_with("word…"));
        assert!(record.summary.chars().count() <= MAX_SUMMARY_CHARS + 1);
        assert!(
            report
                .shortfalls
                .iter()
                .any(|s| matches!(s, Shortfall::SummaryCut { chars: 999 }))
        );
        assert!(record.violations().is_empty());
    }

    #[test]
    fn unbroken_summary_is_hard_cut() {
        let cut = cut_at_word(&"x".repeat(700), MAX_SUMMARY_CHARS);
        assert_eq!(cut.chars().count(), MAX_SUMMARY_CHARS + 1);
    }

    #[test]
    fn punctuation_heavy_summary_falls_back_to_sentinel() {
        let text = format!("a{} {}", "-".repeat(400), "b".repeat(300));
        let mut draft = Draft::new(EntityType::Topic, "Dashes");
        draft.summary = Some(text);
        let (record, report) = normalize(draft);
        assert_eq!(record.summary, SUMMARY_SENTINEL);
        assert!(report.shortfalls.contains(&Shortfall::SummaryReplaced { chars: 2 }));
        assert!(record.violations().is_empty(), "{:?}", record.violations());
    }

    #[test]
    fn missing_href_becomes_sentinel() {
        let mut draft = Draft::new(EntityType::Topic, "Mercury");
        draft.href = Some("/wiki/Mercury".into());
        let (record, report) = normalize(draft);
        assert_eq!(record.href, NO_REFERENCE_HREF);
        assert!(report.shortfalls.contains(&Shortfall::NoReference));
    }

    #[test]
    fn image_derived_from_title() {
        let mut draft = Draft::new(EntityType::Book, "A Wizard of Earthsea");
        draft.image = Some("Cover Art.JPG".into());
        let (record, report) = normalize(draft);
        assert_eq!(record.image.as_deref(), Some("a-wizard-of-earthsea.jpg"));
        assert!(record.image_url.is_none());
        assert!(report.shortfalls.contains(&Shortfall::ImageDerived));

        assert_eq!(derive_image_name("!!!"), DEFAULT_IMAGE);
    }

    #[test]
    fn valid_image_is_kept() {
        let mut draft = Draft::new(EntityType::Book, "Dune");
        draft.image = Some("dune-cover.png".into());
        let (record, _) = normalize(draft);
        assert_eq!(record.image.as_deref(), Some("dune-cover.png"));
    }

    #[test]
    fn uploaded_image_url_wins_over_image() {
        let mut draft = Draft::new(EntityType::Person, "Jane Doe");
        draft.image = Some("jane-doe.jpg".into());
        draft.image_url = Some("https://cdn.example.com/jane.png".into());
        let (record, _) = normalize(draft);
        assert!(record.image.is_none());
        assert_eq!(record.image_url.as_deref(), Some("https://cdn.example.com/jane.png"));
    }

    #[test]
    fn relative_image_url_is_rejected() {
        let mut draft = Draft::new(EntityType::Person, "Jane Doe");
        draft.image_url = Some("uploads/jane.png".into());
        let (record, report) = normalize(draft);
        assert!(record.image_url.is_none());
        assert_eq!(record.image.as_deref(), Some("jane-doe.jpg"));
        assert!(report.shortfalls.contains(&Shortfall::ImageUrlRejected));
    }

    #[test]
    fn genres_only_kept_for_books_and_movies() {
        let mut draft = Draft::new(EntityType::Person, "Jane Doe");
        draft.genres = Some(strings(&["drama"]));
        assert!(normalize(draft).0.genres.is_none());

        let mut draft = Draft::new(EntityType::Movie, "Alien");
        draft.genres = Some(strings(&["Science Fiction", "Horror", "horror", "a", "b", "c"]));
        assert_eq!(
            normalize(draft).0.genres,
            Some(strings(&["science-fiction", "horror", "a", "b"]))
        );
    }

    #[test]
    fn highlights_are_trimmed_and_capped() {
        let mut draft = Draft::new(EntityType::Project, "Tokio");
        draft.highlights = Some(strings(&["  fast ", "", "fast", "safe", "async", "extra"]));
        assert_eq!(normalize(draft).0.highlights, Some(strings(&["fast", "safe", "async"])));

        let mut draft = Draft::new(EntityType::Project, "Tokio");
        draft.highlights = Some(strings(&["   "]));
        assert!(normalize(draft).0.highlights.is_none());
    }

    #[test]
    fn complete_draft_is_clean() {
        let mut draft = Draft::new(EntityType::Topic, "Entropy");
        draft.href = Some("https://en.wikipedia.org/wiki/Entropy".into());
        draft.image = Some("entropy.jpg".into());
        draft.summary = Some(long_summary());
        draft.tags = strings(&["physics", "thermodynamics"]);
        let (record, report) = normalize(draft);
        assert!(report.is_clean(), "{:?}", report.shortfalls);
        assert!(record.violations().is_empty());
        assert_eq!(record.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn any_draft_normalizes_to_valid_record() {
        let mut draft = Draft::new(EntityType::Concept, "  Ω  ");
        draft.tags = strings(&["", "!!"]);
        draft.image = Some("".into());
        draft.href = Some("javascript:alert(1)".into());
        let (record, _) = normalize(draft);
        assert!(record.violations().is_empty(), "{:?}", record.violations());
    }
}
