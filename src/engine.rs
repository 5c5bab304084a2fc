use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::{run_analysis, AnalysisContext, AnalysisResult};
use crate::assistant::{self, AssistantAnswer};
use crate::config::EngineConfig;
use crate::dashboard::{self, AnalyticsDashboard, ComprehensiveStatistics};
use crate::dataset::{Dataset, LoadRequest};
use crate::error::EngineError;
use crate::insights::{self, InsightsDocument};
use crate::intent::{classify, Intent};
use crate::narrative;
use crate::profile::DatasetProfile;
use crate::resolver::resolve_columns;

#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub version: u64,
    pub profile: Arc<DatasetProfile>,
    pub summary_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub query_text: String,
    pub timestamp: DateTime<Utc>,
    pub analysis_type: Option<Intent>,
    pub result: Option<Arc<AnalysisResult>>,
    pub error: Option<String>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One live entry, keyed by dataset version
pub struct VersionCache<T> {
    slot: Mutex<Option<(u64, Arc<T>)>>,
}

impl<T> Default for VersionCache<T> {
    fn default() -> Self {
        Self { slot: Mutex::new(None) }
    }
}

impl<T> VersionCache<T> {
    /// Returns the cached document and whether it was a hit
    pub fn get_or_build<F>(&self, version: u64, build: F) -> (Arc<T>, bool)
    where
        F: FnOnce() -> T,
    {
        let mut slot = lock(&self.slot);
        if let Some((v, doc)) = slot.as_ref() {
            if *v == version {
                return (Arc::clone(doc), true);
            }
        }
        let doc = Arc::new(build());
        *slot = Some((version, Arc::clone(&doc)));
        (doc, false)
    }
}

/// A loaded dataset and everything derived from it. Replaced as a whole on reload.
pub struct Session {
    pub version: u64,
    pub dataset: Dataset,
    pub profile: Arc<DatasetProfile>,
    insights: VersionCache<InsightsDocument>,
    dashboard: VersionCache<AnalyticsDashboard>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl Session {
    fn new(version: u64, dataset: Dataset) -> Self {
        let profile = Arc::new(DatasetProfile::build(Some(&dataset)));
        Self {
            version,
            dataset,
            profile,
            insights: VersionCache::default(),
            dashboard: VersionCache::default(),
            history: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, entry: HistoryEntry) {
        lock(&self.history).push(entry);
    }

    fn recent_intents(&self, window: usize) -> Vec<Intent> {
        let history = lock(&self.history);
        let skip = history.len().saturating_sub(window);
        history
            .iter()
            .skip(skip)
            .filter(|h| h.result.is_some())
            .filter_map(|h| h.analysis_type)
            .collect()
    }
}

/// The query engine. Cheap to share behind an Arc, every method takes &self.
pub struct Engine {
    config: EngineConfig,
    state: RwLock<Option<Arc<Session>>>,
    load_lock: Mutex<()>,
    next_version: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
            load_lock: Mutex::new(()),
            next_version: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn snapshot(&self) -> Option<Arc<Session>> {
        let guard = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().map(Arc::clone)
    }

    fn session(&self) -> Result<Arc<Session>, EngineError> {
        self.snapshot().ok_or(EngineError::NoDatasetLoaded)
    }

    /// Replaces the dataset. The new session (profile included) is complete before anyone can see it;
    /// a failed load leaves the previous one in place.
    pub fn load_dataset(&self, req: LoadRequest) -> Result<LoadOutcome, EngineError> {
        let _loading = lock(&self.load_lock);

        let dataset = match Dataset::from_request(&req, self.config.type_sample_rows) {
            Ok(ds) => ds,
            Err(e) => {
                crate::debug_note!("load rejected: {}", e);
                return Err(e);
            }
        };
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(Session::new(version, dataset));
        let outcome = LoadOutcome {
            version,
            profile: Arc::clone(&session.profile),
            summary_text: session.profile.summary_text(),
        };

        {
            let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            *state = Some(session);
        }
        crate::debug_note!(
            "dataset version {} live: {} rows, {} columns",
            version,
            outcome.profile.row_count,
            outcome.profile.column_count
        );
        Ok(outcome)
    }

    pub fn load_csv<R: Read>(&self, reader: R) -> Result<LoadOutcome, EngineError> {
        self.load_dataset(LoadRequest::from_csv_reader(reader, b',')?)
    }

    /// csv, tsv, txt or a spreadsheet, chosen by extension
    pub fn load_path(&self, path: &Path) -> Result<LoadOutcome, EngineError> {
        self.load_dataset(LoadRequest::from_path(path)?)
    }

    pub fn dataset_version(&self) -> Option<u64> {
        self.snapshot().map(|s| s.version)
    }

    pub fn profile(&self) -> Result<Arc<DatasetProfile>, EngineError> {
        self.session().map(|s| Arc::clone(&s.profile))
    }

    /// Answers one question against the current dataset. Successes and failures both land in history.
    pub fn run_query(&self, question: &str) -> Result<Arc<AnalysisResult>, EngineError> {
        let session = self.session()?;
        let names = session.dataset.column_names();
        let resolved = resolve_columns(question, &names);
        let classification = classify(question, &resolved, &session.profile);

        let ctx = AnalysisContext {
            dataset: &session.dataset,
            profile: &session.profile,
            resolved: &resolved,
            question,
            classification,
            config: &self.config,
        };

        match run_analysis(&ctx) {
            Ok(mut result) => {
                let recent = session.recent_intents(self.config.history_window);
                result.narrative = narrative::compose(&result);
                result.related_suggestions =
                    insights::related_suggestions(question, Some(result.analysis_type), &recent);
                let result = Arc::new(result);
                session.record(HistoryEntry {
                    query_text: question.to_string(),
                    timestamp: Utc::now(),
                    analysis_type: Some(result.analysis_type),
                    result: Some(Arc::clone(&result)),
                    error: None,
                });
                Ok(result)
            }
            Err(e) => {
                crate::debug_note!("query '{}' failed in {}: {}", question, classification.intent.as_str(), e);
                session.record(HistoryEntry {
                    query_text: question.to_string(),
                    timestamp: Utc::now(),
                    analysis_type: Some(classification.intent.dispatch_target()),
                    result: None,
                    error: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    /// Cached per dataset version; repeated calls hand back the same Arc
    pub fn get_comprehensive_insights(&self) -> Result<Arc<InsightsDocument>, EngineError> {
        let session = self.session()?;
        let (doc, hit) = session
            .insights
            .get_or_build(session.version, || insights::build_insights(session.version, &session.dataset, &session.profile));
        crate::debug_note!("insights for version {}: cache {}", session.version, if hit { "hit" } else { "miss" });
        Ok(doc)
    }

    /// Every section at once, cached per dataset version like the insights
    pub fn get_analytics_dashboard(&self) -> Result<Arc<AnalyticsDashboard>, EngineError> {
        let session = self.session()?;
        let (doc, hit) = session.dashboard.get_or_build(session.version, || {
            dashboard::build_dashboard(session.version, &session.dataset, &session.profile)
        });
        crate::debug_note!("dashboard for version {}: cache {}", session.version, if hit { "hit" } else { "miss" });
        Ok(doc)
    }

    /// The summary statistics section of the dashboard
    pub fn get_statistics(&self) -> Result<ComprehensiveStatistics, EngineError> {
        self.get_analytics_dashboard().map(|d| d.summary_statistics.clone())
    }

    pub fn get_ai_context(&self) -> Result<String, EngineError> {
        let session = self.session()?;
        Ok(assistant::dataset_context(&session.dataset, &session.profile))
    }

    /// Keyword driven answer for an assistant. Does not classify and is not recorded in history.
    pub fn query_for_ai(&self, question: &str) -> Result<AssistantAnswer, EngineError> {
        let session = self.session()?;
        Ok(assistant::answer(&session.dataset, &session.profile, question))
    }

    /// Oldest first. Empty when nothing is loaded.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        match self.snapshot() {
            Some(s) => lock(&s.history).clone(),
            None => Vec::new(),
        }
    }

    pub fn suggest_queries(&self) -> Vec<String> {
        let session = self.snapshot();
        insights::suggest_queries(session.as_ref().map(|s| s.profile.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(engine: &Engine, text: &str) -> LoadOutcome {
        engine.load_csv(text.as_bytes()).unwrap()
    }

    #[test]
    fn nothing_loaded_is_a_typed_failure() {
        let e = Engine::default();
        assert_eq!(e.run_query("average").unwrap_err(), EngineError::NoDatasetLoaded);
        assert_eq!(e.get_comprehensive_insights().unwrap_err(), EngineError::NoDatasetLoaded);
        assert!(e.get_history().is_empty());
        assert_eq!(e.suggest_queries()[0], "Upload a dataset to get started");
    }

    #[test]
    fn failed_queries_are_recorded_too() {
        let e = Engine::default();
        csv(&e, "name\nann\nbob\n");
        assert!(e.run_query("average please").is_err());
        let h = e.get_history();
        assert_eq!(h.len(), 1);
        assert!(h[0].result.is_none());
        assert!(h[0].error.as_ref().unwrap().contains("numeric"));
    }

    #[test]
    fn failed_queries_do_not_count_as_covered() {
        let e = Engine::default();
        csv(&e, "price,name\n1,a\n2,b\n3,c\n");
        assert!(e.run_query("correlation please").is_err());
        let r = e.run_query("average price").unwrap();
        assert!(r.related_suggestions.iter().any(|s| s == "View top correlations"));

        e.run_query("summary").unwrap();
        let r = e.run_query("average price").unwrap();
        assert!(!r.related_suggestions.iter().any(|s| s == "Generate dataset summary"));
    }

    #[test]
    fn dashboard_is_cached_and_statistics_come_from_it() {
        let e = Engine::default();
        assert_eq!(e.get_analytics_dashboard().unwrap_err(), EngineError::NoDatasetLoaded);
        assert_eq!(e.get_ai_context().unwrap_err(), EngineError::NoDatasetLoaded);

        let first = csv(&e, "price,qty,store\n10,1,a\n20,,b\n30,3,a\n");
        let a = e.get_analytics_dashboard().unwrap();
        let b = e.get_analytics_dashboard().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.version, first.version);
        assert_eq!(e.get_statistics().unwrap(), a.summary_statistics);
        assert_eq!(a.missing_values_analysis.columns_with_missing, vec!["qty".to_string()]);

        let second = csv(&e, "x\n1\n2\n");
        let c = e.get_analytics_dashboard().unwrap();
        assert_eq!(c.version, second.version);
        assert_eq!(c.summary_statistics.overall_summary.total_columns, 1);
    }

    #[test]
    fn assistant_questions_stay_out_of_history() {
        let e = Engine::default();
        csv(&e, "price,qty\n1,2\n2,4\n3,7\n");
        let a = e.query_for_ai("average price").unwrap();
        assert_eq!(a.statistics[0].column, "price");
        assert!(e.get_ai_context().unwrap().contains("- 3 rows and 2 columns"));
        assert!(e.get_history().is_empty());
    }

    #[test]
    fn failed_load_keeps_the_previous_dataset() {
        let e = Engine::default();
        let first = csv(&e, "x\n1\n2\n");
        let bad = LoadRequest::new(vec!["x".into()], vec![vec!["1".into(), "2".into()]]);
        assert!(e.load_dataset(bad).is_err());
        assert_eq!(e.dataset_version(), Some(first.version));
    }

    #[test]
    fn insight_cache_hits_until_reload() {
        let cache: VersionCache<InsightsDocument> = VersionCache::default();
        let mut builds = 0;
        let doc = || {
            InsightsDocument {
                version: 1,
                dataset_shape: String::new(),
                completeness_score: 100.0,
                issues_summary: Vec::new(),
                top_numeric_volatility: Vec::new(),
                strong_correlations: Vec::new(),
                recommended_next_steps: Vec::new(),
                recommendations: Vec::new(),
                dataset_type: crate::profile::DatasetType::GeneralData,
                business_context: String::new(),
                data_story: String::new(),
                narrative: String::new(),
            }
        };
        let (a, hit_a) = cache.get_or_build(1, || { builds += 1; doc() });
        let (b, hit_b) = cache.get_or_build(1, || { builds += 1; doc() });
        assert!(!hit_a && hit_b);
        assert!(Arc::ptr_eq(&a, &b));
        let (_, hit_c) = cache.get_or_build(2, || { builds += 1; doc() });
        assert!(!hit_c);
        assert_eq!(builds, 2);
    }

    #[test]
    fn results_carry_narrative_and_suggestions() {
        let e = Engine::default();
        csv(&e, "a,b\n1,2\n2,4\n3,7\n4,8\n");
        let r = e.run_query("correlation between a and b").unwrap();
        assert!(!r.narrative.is_empty() && r.narrative.len() <= 4);
        assert!(!r.related_suggestions.is_empty());
        assert!(!r.related_suggestions.contains(&"View top correlations".to_string()));
    }
}
