use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::AnalysisResult;

const EXPLAIN_PROMPT: &str = "Explain these data analysis results in simple, engaging language:";
const EXPLAIN_TAIL: &str = "Provide key insights and what they mean for the user.";

/// Something that can turn an analysis context into free text.
/// Any error is fine, callers fall back to the local narrative.
#[async_trait::async_trait]
pub trait InsightExplainer: Send + Sync {
    async fn explain(&self, context: &Value) -> anyhow::Result<String>;
}

pub struct GeminiExplainer {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Clone, Serialize, Deserialize)]
struct GeminiMessage {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

impl GeminiExplainer {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    fn prompt(context: &Value) -> String {
        let pretty = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
        format!("{}\n{}\n\n{}", EXPLAIN_PROMPT, pretty, EXPLAIN_TAIL)
    }
}

#[async_trait::async_trait]
impl InsightExplainer for GeminiExplainer {
    async fn explain(&self, context: &Value) -> anyhow::Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let messages = vec![GeminiMessage {
            role: "user".to_string(),
            parts: vec![GeminiPart { text: Self::prompt(context) }],
        }];
        let body = serde_json::json!({
            "contents": messages,
            "generationConfig": {
                "temperature": 0.7,
            }
        });

        let res = self.client.post(&url).json(&body).send().await?;

        if !res.status().is_success() {
            let status = res.status();
            let error_text = res.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("Gemini API request failed with status {}: {}", status, error_text));
        }

        let json_res = res.json::<Value>().await?;

        if let Some(content) = json_res["candidates"][0]["content"]["parts"][0]["text"].as_str() {
            return Ok(content.to_string());
        }

        Err(anyhow::anyhow!("Failed to extract response from Gemini: {:?}", json_res))
    }
}

/// The JSON handed to an explainer for one result
pub fn explain_context(result: &AnalysisResult) -> Value {
    serde_json::json!({
        "analysis_type": result.analysis_type,
        "statistics": result.statistics,
        "insight": result.insight_text,
        "narrative": result.narrative,
    })
}

/// Where an explanation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationSource {
    External,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub text: String,
    pub source: ExplanationSource,
}

/// Asks the explainer when there is one; no explainer, an error or an empty answer all
/// give the result's own narrative instead.
pub async fn explain_with_fallback(explainer: Option<&dyn InsightExplainer>, result: &AnalysisResult) -> Explanation {
    let local = || Explanation {
        text: local_explanation(result),
        source: ExplanationSource::Local,
    };

    let explainer = match explainer {
        Some(e) => e,
        None => return local(),
    };

    match explainer.explain(&explain_context(result)).await {
        Ok(text) if !text.trim().is_empty() => Explanation { text, source: ExplanationSource::External },
        Ok(_) => {
            crate::debug_note!("explainer returned nothing for {}, using local narrative", result.analysis_type.as_str());
            local()
        }
        Err(e) => {
            crate::debug_note!("explainer failed for {}: {:?}, using local narrative", result.analysis_type.as_str(), e);
            local()
        }
    }
}

pub fn local_explanation(result: &AnalysisResult) -> String {
    let mut lines = vec![result.insight_text.clone()];
    lines.extend(result.narrative.iter().map(|n| format!("- {}", n)));
    lines.retain(|l| !l.is_empty());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Statistics;
    use crate::intent::Intent;
    use std::collections::BTreeMap;

    struct Failing;

    #[async_trait::async_trait]
    impl InsightExplainer for Failing {
        async fn explain(&self, _context: &Value) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("service unavailable"))
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl InsightExplainer for Echo {
        async fn explain(&self, context: &Value) -> anyhow::Result<String> {
            Ok(format!("about {}", context["analysis_type"].as_str().unwrap_or("?")))
        }
    }

    fn result() -> AnalysisResult {
        AnalysisResult {
            analysis_type: Intent::Averages,
            parameters: BTreeMap::new(),
            statistics: Statistics::Averages { columns: Vec::new() },
            chart_spec: None,
            insight_text: "Average price is 3.00".into(),
            narrative: vec!["price has the highest mean at 3.00.".into()],
            related_suggestions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn failures_fall_back_to_the_local_narrative() {
        let r = result();
        let e = explain_with_fallback(Some(&Failing), &r).await;
        assert_eq!(e.source, ExplanationSource::Local);
        assert_eq!(e.text, "Average price is 3.00\n- price has the highest mean at 3.00.");

        let e = explain_with_fallback(None, &r).await;
        assert_eq!(e.source, ExplanationSource::Local);
    }

    #[tokio::test]
    async fn external_text_is_used_when_available() {
        let e = explain_with_fallback(Some(&Echo), &result()).await;
        assert_eq!(e, Explanation { text: "about averages".into(), source: ExplanationSource::External });
    }

    #[test]
    fn prompt_wraps_the_context() {
        let p = GeminiExplainer::prompt(&serde_json::json!({"a": 1}));
        assert!(p.starts_with(EXPLAIN_PROMPT));
        assert!(p.ends_with(EXPLAIN_TAIL));
    }
}
