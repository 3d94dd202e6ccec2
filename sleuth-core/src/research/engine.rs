//! Research engine: runs the stages in order for one query.

use super::analyzer::QueryAnalyzer;
use super::followup::FollowUpResearcher;
use super::format::FormatSelector;
use super::gatherer::EvidenceGatherer;
use super::progress::{ProgressEvent, ProgressSink};
use super::relevance::RelevanceFilter;
use super::synthesis::Synthesizer;
use super::types::{FilteredFinding, FollowUpAnswer, ResearchQuery, ResearchReport, timestamp};
use crate::brain::ModelGateway;
use crate::config::{FollowUpConfig, ResearchConfig, SleuthConfig};
use crate::error::{ConfigError, LlmError};
use crate::evidence::{EvidenceSource, KeywordFallback, NoFallback, WebEvidenceSource};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

/// Everything a research run needs, shared across runs.
///
/// Cloning is cheap; clones share the model gateway and its pacing.
#[derive(Clone)]
pub struct ResearchEngine {
    gateway: Arc<ModelGateway>,
    primary: Arc<dyn EvidenceSource>,
    followup: Arc<dyn EvidenceSource>,
    research: ResearchConfig,
    followup_settings: FollowUpConfig,
}

impl ResearchEngine {
    pub fn new(
        gateway: Arc<ModelGateway>,
        primary: Arc<dyn EvidenceSource>,
        followup: Arc<dyn EvidenceSource>,
        research: ResearchConfig,
        followup_settings: FollowUpConfig,
    ) -> Self {
        Self {
            gateway,
            primary,
            followup,
            research,
            followup_settings,
        }
    }

    /// Build the live engine. The model credential is checked before
    /// anything else, so a missing key fails here with no network traffic.
    pub fn from_config(config: &SleuthConfig) -> Result<Self, ConfigError> {
        let gateway = Arc::new(ModelGateway::from_config(&config.llm)?);
        let primary = WebEvidenceSource::new(
            &config.search,
            config.research.profile(),
            Box::new(KeywordFallback::from_config(&config.search.fallback)),
        )?;
        let followup =
            WebEvidenceSource::new(&config.search, config.followup.profile(), Box::new(NoFallback))?;
        info!(
            model = gateway.model_name(),
            web_search = primary.has_search_provider(),
            "Research engine ready"
        );

        Ok(Self::new(
            gateway,
            Arc::new(primary),
            Arc::new(followup),
            config.research.clone(),
            config.followup.clone(),
        ))
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    pub fn settings(&self) -> &ResearchConfig {
        &self.research
    }

    /// Analyze, gather, filter, format and synthesize.
    ///
    /// Progress goes to `sink`; the caller emits the final result itself.
    pub async fn research(
        &self,
        query: &ResearchQuery,
        sink: &dyn ProgressSink,
    ) -> Result<ResearchReport, LlmError> {
        let span = info_span!("research", run_id = %Uuid::new_v4());
        self.run_research(query, sink).instrument(span).await
    }

    async fn run_research(
        &self,
        query: &ResearchQuery,
        sink: &dyn ProgressSink,
    ) -> Result<ResearchReport, LlmError> {
        info!(
            query = query.text.as_str(),
            threshold = query.relevance_threshold,
            formatting = query.enable_formatting,
            "Starting research"
        );
        let gateway = self.gateway.as_ref();

        sink.activity("🔍 Analyzing your query...");
        let analysis = QueryAnalyzer::new(gateway).analyze(&query.text).await?;
        sink.activity(&format!(
            "📋 Generated {} research questions",
            analysis.sub_questions.len()
        ));
        sink.emit(ProgressEvent::Analysis(analysis.clone()));

        let findings = EvidenceGatherer::new(gateway, self.primary.as_ref(), &self.research)
            .gather(&analysis.sub_questions, sink)
            .await?;

        sink.activity("🎯 Filtering results for relevance...");
        let filtered = RelevanceFilter::new(gateway)
            .filter(findings, &query.text, query.relevance_threshold)
            .await?;
        let relevant: Vec<&FilteredFinding> = filtered.iter().filter(|f| f.is_relevant).collect();
        sink.activity(&format!(
            "📊 Found {} relevant findings, filtered out {} less relevant ones",
            relevant.len(),
            filtered.len() - relevant.len()
        ));

        let synthesizer = Synthesizer::new(gateway);
        let synthesis = if query.enable_formatting && !relevant.is_empty() {
            sink.activity("🎨 Detecting optimal formatting style...");
            let format = FormatSelector::new(gateway)
                .detect(&relevant, &query.text)
                .await?;
            sink.activity(&format!(
                "📝 Using {} format for enhanced presentation",
                format.format
            ));
            synthesizer
                .synthesize_formatted(&query.text, &filtered, format)
                .await?
        } else {
            sink.activity("🎯 Synthesizing research findings...");
            synthesizer.synthesize_plain(&query.text, &relevant).await?
        };

        sink.activity("✅ Enhanced research completed successfully!");
        info!(
            findings = filtered.len(),
            confidence = ?synthesis.confidence,
            "Research complete"
        );

        Ok(ResearchReport {
            analysis,
            findings: filtered,
            synthesis,
            timestamp: timestamp(),
        })
    }

    /// Answer a question about earlier research.
    pub async fn follow_up(
        &self,
        question: &str,
        context: &str,
        sink: &dyn ProgressSink,
    ) -> Result<FollowUpAnswer, LlmError> {
        let span = info_span!("followup", run_id = %Uuid::new_v4());
        FollowUpResearcher::new(
            self.gateway.as_ref(),
            self.followup.as_ref(),
            &self.followup_settings,
        )
        .answer(question, context, sink)
        .instrument(span)
        .await
    }
}
