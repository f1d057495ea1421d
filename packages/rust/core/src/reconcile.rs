//! Enrichment orchestrator.
//!
//! Fans out the factual resolvers and the generator concurrently, waits for
//! all of them, merges by field ownership and repairs the result.
//!
//! Resolver failures and deadline misses degrade to "not found". A generator
//! failure (error status, transport error, deadline miss or unextractable
//! payload) is fatal and no record is returned. A blank title is rejected
//! before anything is dispatched.

use std::future::Future;
use std::time::Duration;

use catalog_shared::{
    AppConfig, CatalogError, EnrichedRecord, EntityReference, FactBundle, FactSource, Result,
};
use catalog_sources::{
    CatalogSource, CrossReferenceSource, HttpSources, StructuredFactsSource, SummarySource,
};
use tracing::{debug, info, instrument, warn};

use crate::extract::extract_structured;
use crate::generator::{Generator, HttpGenerator};
use crate::merge::merge;
use crate::normalize::normalize;
use crate::schema::GenerationRequest;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Pipeline stage of one enrichment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dispatched,
    AwaitingAll,
    Merged,
    Normalized,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::AwaitingAll => "awaiting sources",
            Self::Merged => "merged",
            Self::Normalized => "normalized",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback for enrichment progress.
pub trait EnrichProgress: Send + Sync {
    fn stage(&self, stage: Stage);
}

/// No-op enrichment progress.
pub struct SilentProgress;

impl EnrichProgress for SilentProgress {
    fn stage(&self, _stage: Stage) {}
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Overall wall-clock bound used when none is configured.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(45);

/// The enrichment pipeline, wired to its collaborators at construction.
pub struct Reconciler {
    summary: Box<dyn SummarySource>,
    cross_ref: Box<dyn CrossReferenceSource>,
    facts: Box<dyn StructuredFactsSource>,
    catalog: Box<dyn CatalogSource>,
    generator: Box<dyn Generator>,
    deadline: Duration,
}

impl Reconciler {
    pub fn new(
        summary: Box<dyn SummarySource>,
        cross_ref: Box<dyn CrossReferenceSource>,
        facts: Box<dyn StructuredFactsSource>,
        catalog: Box<dyn CatalogSource>,
        generator: Box<dyn Generator>,
    ) -> Self {
        Self {
            summary,
            cross_ref,
            facts,
            catalog,
            generator,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// HTTP-backed pipeline from configuration and an explicit API key.
    pub fn from_config(config: &AppConfig, api_key: impl Into<String>) -> Result<Self> {
        let sources = HttpSources::from_config(&config.sources)?;
        let generator = HttpGenerator::new(&config.generator, api_key)?;
        Ok(Self::new(
            Box::new(sources.summary),
            Box::new(sources.cross_ref),
            Box::new(sources.facts),
            Box::new(sources.catalog),
            Box::new(generator),
        )
        .with_deadline(Duration::from_secs(config.enrich.deadline_secs)))
    }

    /// Enrich one reference into a complete, invariant-satisfying record.
    pub async fn enrich(&self, reference: &EntityReference) -> Result<EnrichedRecord> {
        self.enrich_with_progress(reference, &SilentProgress).await
    }

    #[instrument(skip_all, fields(title = %reference.title, entity_type = %reference.entity_type))]
    pub async fn enrich_with_progress(
        &self,
        reference: &EntityReference,
        progress: &dyn EnrichProgress,
    ) -> Result<EnrichedRecord> {
        if reference.title.trim().is_empty() {
            return Err(CatalogError::validation("reference title must not be empty"));
        }
        let entity_type = reference.entity_type;
        let title = reference.title.as_str();
        let request = GenerationRequest::for_reference(reference);

        report(progress, Stage::Dispatched);

        // cross-reference → structured facts is one sequential branch
        let structured = async {
            if entity_type.fact_keys().is_empty() {
                return FactBundle::not_found(FactSource::StructuredFacts);
            }
            let id = self.cross_ref.cross_reference_id(title).await;
            self.facts.structured_facts(id.as_deref(), entity_type).await
        };
        let summary = async {
            match self.summary.canonical_url(title).await {
                Some(url) => FactBundle {
                    canonical_url: Some(url),
                    ..FactBundle::found(FactSource::SummaryEndpoint, Default::default())
                },
                None => FactBundle::not_found(FactSource::SummaryEndpoint),
            }
        };
        let catalog = async {
            if entity_type.uses_catalog() {
                self.catalog.catalog_facts(title).await
            } else {
                FactBundle::not_found(FactSource::Catalog)
            }
        };
        let generation = tokio::time::timeout(self.deadline, self.generator.generate(&request));

        report(progress, Stage::AwaitingAll);
        let (structured, summary, catalog, generation) = tokio::join!(
            bounded(self.deadline, FactSource::StructuredFacts, structured),
            bounded(self.deadline, FactSource::SummaryEndpoint, summary),
            bounded(self.deadline, FactSource::Catalog, catalog),
            generation,
        );

        let raw = match generation {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "generation failed");
                return Err(match e {
                    CatalogError::GenerationFailed { .. } => e,
                    other => CatalogError::generation(None, "", other.to_string()),
                });
            }
            Err(_) => {
                warn!(
                    deadline_secs = self.deadline.as_secs_f64(),
                    "generation missed the deadline"
                );
                return Err(CatalogError::generation(None, "", "deadline exceeded"));
            }
        };
        let Some(generated) = extract_structured(&raw.body) else {
            warn!(status = raw.status, "no structured payload in generation response");
            return Err(CatalogError::generation(
                Some(raw.status),
                &raw.body,
                "no structured payload in response",
            ));
        };

        debug!(
            structured = structured.found,
            summary = summary.found,
            catalog = catalog.found,
            "sources settled"
        );
        let draft = merge(reference, vec![structured, summary, catalog], &generated);
        report(progress, Stage::Merged);

        let (record, repairs) = normalize(draft);
        if !repairs.is_clean() {
            debug!(shortfalls = ?repairs.shortfalls, "record repaired");
        }
        report(progress, Stage::Normalized);

        debug_assert!(record.violations().is_empty(), "{:?}", record.violations());
        info!(href = %record.href, tags = record.tags.len(), "enrichment complete");
        report(progress, Stage::Done);
        Ok(record)
    }
}

fn report(progress: &dyn EnrichProgress, stage: Stage) {
    debug!(%stage, "enrichment stage");
    progress.stage(stage);
}

/// Run a resolver branch under the deadline; a miss counts as not found.
async fn bounded(
    deadline: Duration,
    source: FactSource,
    branch: impl Future<Output = FactBundle>,
) -> FactBundle {
    match tokio::time::timeout(deadline, branch).await {
        Ok(bundle) => bundle,
        Err(_) => {
            warn!(source = source.as_str(), "resolver missed the deadline");
            FactBundle::not_found(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use catalog_shared::{
        EntityType, FactField, NO_REFERENCE_HREF, RecordFacts, SUMMARY_SENTINEL,
    };
    use catalog_sources::CatalogSuggestion;
    use serde_json::{Value, json};

    use crate::generator::RawResponse;

    // -- fakes --------------------------------------------------------------

    struct FakeSummary(Option<&'static str>);

    #[async_trait]
    impl SummarySource for FakeSummary {
        async fn canonical_url(&self, _title: &str) -> Option<String> {
            self.0.map(String::from)
        }
    }

    struct FakeCrossRef(Option<&'static str>);

    #[async_trait]
    impl CrossReferenceSource for FakeCrossRef {
        async fn cross_reference_id(&self, _title: &str) -> Option<String> {
            self.0.map(String::from)
        }
    }

    struct FakeFacts(RecordFacts);

    #[async_trait]
    impl StructuredFactsSource for FakeFacts {
        async fn structured_facts(
            &self,
            id: Option<&str>,
            _entity_type: EntityType,
        ) -> FactBundle {
            match id {
                Some(_) => FactBundle::found(FactSource::StructuredFacts, self.0.clone()),
                None => FactBundle::not_found(FactSource::StructuredFacts),
            }
        }
    }

    struct FakeCatalog(Vec<CatalogSuggestion>);

    #[async_trait]
    impl CatalogSource for FakeCatalog {
        async fn suggest(&self, _term: &str) -> Vec<CatalogSuggestion> {
            self.0.clone()
        }
    }

    /// Never settles.
    struct Hanging;

    #[async_trait]
    impl SummarySource for Hanging {
        async fn canonical_url(&self, _title: &str) -> Option<String> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl Generator for Hanging {
        async fn generate(&self, _request: &GenerationRequest) -> Result<RawResponse> {
            std::future::pending().await
        }
    }

    enum Reply {
        Payload(Value),
        Body(&'static str),
        Status(u16, &'static str),
    }

    struct FakeGenerator {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<RawResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Payload(payload) => Ok(RawResponse {
                    status: 200,
                    body: json!({
                        "output": [{"content": [{"type": "output_json", "json": payload}]}]
                    })
                    .to_string(),
                }),
                Reply::Body(body) => Ok(RawResponse {
                    status: 200,
                    body: body.to_string(),
                }),
                Reply::Status(status, body) => Err(CatalogError::generation(
                    Some(*status),
                    body,
                    "endpoint returned an error status",
                )),
            }
        }
    }

    /// Lets a test keep a handle on the generator's call count.
    struct Shared(std::sync::Arc<FakeGenerator>);

    #[async_trait]
    impl Generator for Shared {
        async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse> {
            self.0.generate(request).await
        }
    }

    struct Recorder(Mutex<Vec<Stage>>);

    impl EnrichProgress for Recorder {
        fn stage(&self, stage: Stage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    // -- helpers ------------------------------------------------------------

    const SUMMARY: &str =
        "Jane Doe is a placeholder name used for an unidentified or anonymous woman.";

    fn generated(tags: &[&str], summary: &str) -> Value {
        json!({
            "type": "person",
            "title": "Jane Doe",
            "href": "#",
            "image": "jane-doe.jpg",
            "summary": summary,
            "tags": tags,
            "highlights": null
        })
    }

    fn person_facts() -> RecordFacts {
        RecordFacts {
            birth_year: FactField::Present(1950),
            death_year: FactField::Absent,
            ..Default::default()
        }
    }

    fn reconciler(summary: Option<&'static str>, generator: FakeGenerator) -> Reconciler {
        Reconciler::new(
            Box::new(FakeSummary(summary)),
            Box::new(FakeCrossRef(Some("Q4115189"))),
            Box::new(FakeFacts(person_facts())),
            Box::new(FakeCatalog(vec![])),
            Box::new(generator),
        )
    }

    fn jane() -> EntityReference {
        EntityReference::new("Jane Doe", EntityType::Person).unwrap()
    }

    fn payload(tags: &[&str], summary: &str) -> FakeGenerator {
        FakeGenerator::new(Reply::Payload(generated(tags, summary)))
    }

    // -- scenarios ----------------------------------------------------------

    #[tokio::test]
    async fn facts_win_over_stale_generator() {
        let mut payload = generated(&["a", "b"], SUMMARY);
        payload["birthYear"] = json!(1900);
        payload["deathYear"] = json!(2000);
        let reconciler = reconciler(
            Some("https://en.wikipedia.org/wiki/Jane_Doe"),
            FakeGenerator::new(Reply::Payload(payload)),
        );

        let record = reconciler.enrich(&jane()).await.unwrap();
        assert_eq!(record.facts.birth_year, FactField::Present(1950));
        assert_eq!(record.facts.death_year, FactField::Absent);
        assert_eq!(record.href, "https://en.wikipedia.org/wiki/Jane_Doe");
        assert!(record.violations().is_empty());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["birthYear"], 1950);
        assert!(json.as_object().unwrap().contains_key("deathYear"));
        assert!(json["deathYear"].is_null());
    }

    #[tokio::test]
    async fn disambiguation_yields_no_reference() {
        // the summary resolver maps a disambiguation page to None
        let reconciler = reconciler(None, payload(&["a", "b"], SUMMARY));
        let record = reconciler.enrich(&jane()).await.unwrap();
        assert_eq!(record.href, NO_REFERENCE_HREF);
    }

    #[tokio::test]
    async fn single_tag_is_padded() {
        let reconciler = reconciler(None, payload(&["x"], SUMMARY));
        let record = reconciler.enrich(&jane()).await.unwrap();
        assert!(record.tags.len() >= 2);
        assert_eq!(record.tags[0], "x");
        let unique: std::collections::HashSet<_> = record.tags.iter().collect();
        assert_eq!(unique.len(), record.tags.len());
    }

    #[tokio::test]
    async fn tiny_summary_becomes_sentinel() {
        let reconciler = reconciler(None, payload(&["a", "b"], "Short"));
        let record = reconciler.enrich(&jane()).await.unwrap();
        assert_eq!(record.summary, SUMMARY_SENTINEL);
    }

    #[tokio::test]
    async fn known_summary_cut_to_a_stub_becomes_sentinel() {
        let mut known = serde_json::Map::new();
        known.insert(
            "summary".into(),
            json!(format!("a{} {}", "-".repeat(400), "b".repeat(300))),
        );
        let reference = EntityReference::new("Dashes", EntityType::Topic)
            .unwrap()
            .with_known(known);
        let reconciler = reconciler(None, payload(&["a", "b"], SUMMARY));

        let record = reconciler.enrich(&reference).await.unwrap();
        assert_eq!(record.summary, SUMMARY_SENTINEL);
        assert!(record.violations().is_empty(), "{:?}", record.violations());
    }

    #[tokio::test]
    async fn blank_title_is_rejected_before_dispatch() {
        let generator = std::sync::Arc::new(payload(&["a", "b"], SUMMARY));
        let reconciler = Reconciler::new(
            Box::new(FakeSummary(None)),
            Box::new(FakeCrossRef(None)),
            Box::new(FakeFacts(RecordFacts::default())),
            Box::new(FakeCatalog(vec![])),
            Box::new(Shared(generator.clone())),
        );
        let reference = EntityReference {
            title: "   ".into(),
            ..jane()
        };
        let recorder = Recorder(Mutex::new(Vec::new()));

        let err = reconciler
            .enrich_with_progress(&reference, &recorder)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { .. }));
        assert!(recorder.0.lock().unwrap().is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generator_error_status_is_fatal() {
        let reconciler = reconciler(
            Some("https://en.wikipedia.org/wiki/Jane_Doe"),
            FakeGenerator::new(Reply::Status(500, r#"{"error":"internal"}"#)),
        );
        let err = reconciler.enrich(&jane()).await.unwrap_err();
        match err {
            CatalogError::GenerationFailed { status, body, .. } => {
                assert_eq!(status, Some(500));
                assert!(body.contains("internal"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unextractable_payload_is_fatal() {
        let reply = Reply::Body(r#"{"output_text":"Sorry, I can't."}"#);
        let reconciler = reconciler(None, FakeGenerator::new(reply));
        let err = reconciler.enrich(&jane()).await.unwrap_err();
        assert_eq!(err.upstream_status(), Some(200));
    }

    #[tokio::test]
    async fn generator_deadline_miss_is_fatal() {
        let reconciler = Reconciler::new(
            Box::new(FakeSummary(None)),
            Box::new(FakeCrossRef(None)),
            Box::new(FakeFacts(person_facts())),
            Box::new(FakeCatalog(vec![])),
            Box::new(Hanging),
        )
        .with_deadline(Duration::from_millis(50));

        let err = reconciler.enrich(&jane()).await.unwrap_err();
        assert!(matches!(err, CatalogError::GenerationFailed { status: None, .. }));
    }

    #[tokio::test]
    async fn hanging_resolver_degrades_to_not_found() {
        let reconciler = Reconciler::new(
            Box::new(Hanging),
            Box::new(FakeCrossRef(Some("Q4115189"))),
            Box::new(FakeFacts(person_facts())),
            Box::new(FakeCatalog(vec![])),
            Box::new(payload(&["a", "b"], SUMMARY)),
        )
        .with_deadline(Duration::from_millis(100));

        let record = reconciler.enrich(&jane()).await.unwrap();
        assert_eq!(record.href, NO_REFERENCE_HREF);
        assert_eq!(record.facts.birth_year, FactField::Present(1950));
    }

    #[tokio::test]
    async fn missing_cross_reference_skips_facts() {
        let reconciler = Reconciler::new(
            Box::new(FakeSummary(None)),
            Box::new(FakeCrossRef(None)),
            Box::new(FakeFacts(person_facts())),
            Box::new(FakeCatalog(vec![])),
            Box::new(payload(&["a", "b"], SUMMARY)),
        );
        let record = reconciler.enrich(&jane()).await.unwrap();
        assert_eq!(record.facts.birth_year, FactField::NotQueried);
        assert!(record.violations().is_empty());
    }

    #[tokio::test]
    async fn catalog_fills_book_facts() {
        let suggestion = CatalogSuggestion {
            key: "/works/OL59863W".into(),
            title: "A Wizard of Earthsea".into(),
            authors: vec!["Ursula K. Le Guin".into()],
            first_publish_year: Some(1968),
            publishers: vec!["Parnassus Press".into()],
            isbns: vec!["9780547773742".into()],
            languages: vec!["eng".into()],
        };
        let reconciler = Reconciler::new(
            Box::new(FakeSummary(Some("https://en.wikipedia.org/wiki/A_Wizard_of_Earthsea"))),
            Box::new(FakeCrossRef(None)),
            Box::new(FakeFacts(RecordFacts::default())),
            Box::new(FakeCatalog(vec![suggestion])),
            Box::new(FakeGenerator::new(Reply::Payload(json!({
                "type": "book",
                "title": "A Wizard of Earthsea",
                "summary":
                    "A fantasy novel about a young mage who must hunt down a shadow he released.",
                "tags": ["fantasy", "coming-of-age"],
                "image": "a-wizard-of-earthsea.jpg",
                "genres": ["Fantasy"],
                "authors": ["Someone Else"]
            })))),
        );
        let reference = EntityReference::new("A Wizard of Earthsea", EntityType::Book).unwrap();
        let record = reconciler.enrich(&reference).await.unwrap();

        let fixture: EnrichedRecord = serde_json::from_str(
            &std::fs::read_to_string("../../../fixtures/json/record.fixture.json")
                .expect("read record fixture"),
        )
        .unwrap();
        assert_eq!(record.facts.authors, fixture.facts.authors);
        assert_eq!(record.facts.isbn, FactField::Present("9780547773742".into()));
        assert_eq!(record.facts.language, FactField::Present("eng".into()));
        assert_eq!(record.genres, Some(vec!["fantasy".to_string()]));
        assert!(record.violations().is_empty());
    }

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let reconciler = reconciler(None, payload(&["a", "b"], SUMMARY));
        let recorder = Recorder(Mutex::new(Vec::new()));
        reconciler.enrich_with_progress(&jane(), &recorder).await.unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                Stage::Dispatched,
                Stage::AwaitingAll,
                Stage::Merged,
                Stage::Normalized,
                Stage::Done
            ]
        );
    }

    #[tokio::test]
    async fn failure_stops_before_merge() {
        let reconciler = reconciler(None, FakeGenerator::new(Reply::Status(503, "")));
        let recorder = Recorder(Mutex::new(Vec::new()));
        assert!(reconciler.enrich_with_progress(&jane(), &recorder).await.is_err());
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![Stage::Dispatched, Stage::AwaitingAll]
        );
    }

    #[tokio::test]
    async fn generator_called_once_per_enrichment() {
        let generator = std::sync::Arc::new(payload(&["a", "b"], SUMMARY));
        let reconciler = Reconciler::new(
            Box::new(FakeSummary(None)),
            Box::new(FakeCrossRef(None)),
            Box::new(FakeFacts(RecordFacts::default())),
            Box::new(FakeCatalog(vec![])),
            Box::new(Shared(generator.clone())),
        );
        reconciler.enrich(&jane()).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    // -- end to end over HTTP -----------------------------------------------

    #[tokio::test]
    async fn http_pipeline_end_to_end() {
        let server = wiremock::MockServer::start().await;
        let fixture = |name: &str| {
            std::fs::read_to_string(format!("../../../fixtures/json/{name}"))
                .expect("read fixture")
        };

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/rest/page/summary/Jane_Doe"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(fixture("summary.standard.json")),
            )
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/w/api.php"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_string(fixture("pageprops.json")),
            )
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/entity/Q4115189.json"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_string(fixture("entity.person.json")),
            )
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/responses"))
            .and(wiremock::matchers::header("authorization", "Bearer sk-test"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "output_text": generated(&["Placeholder Names", "law"], SUMMARY).to_string()
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = AppConfig::default();
        config.sources.summary_base = format!("{}/rest", server.uri());
        config.sources.cross_ref_base = format!("{}/w/api.php", server.uri());
        config.sources.facts_base = format!("{}/entity", server.uri());
        config.sources.catalog_base = server.uri();
        config.generator.base_url = format!("{}/v1", server.uri());

        let reconciler = Reconciler::from_config(&config, "sk-test").unwrap();
        let record = reconciler.enrich(&jane()).await.unwrap();

        assert_eq!(record.href, "https://en.wikipedia.org/wiki/Jane_Doe");
        assert_eq!(record.facts.birth_year, FactField::Present(1950));
        assert_eq!(record.facts.death_year, FactField::Absent);
        assert_eq!(record.tags, vec!["placeholder-names", "law"]);
        assert_eq!(record.image.as_deref(), Some("jane-doe.jpg"));
        assert!(record.violations().is_empty());
    }
}
