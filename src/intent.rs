// Intent classification.
//
// The whole classifier is the RULES table below: rules are tried top to bottom and
// the first one whose trigger appears in the question (and whose guard holds) wins.
// Reordering the table changes behaviour, the tests pin the overlaps we care about.

use serde::{Deserialize, Serialize};

use crate::dataset::ColumnKind;
use crate::profile::DatasetProfile;
use crate::resolver::question_words;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Averages,
    Correlation,
    Trend,
    Distribution,
    Summary,
    Comparison,
    TopValues,
    BottomValues,
    CategoricalBreakdown,
    AnomalyDetection,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Averages => "averages",
            Intent::Correlation => "correlation",
            Intent::Trend => "trend",
            Intent::Distribution => "distribution",
            Intent::Summary => "summary",
            Intent::Comparison => "comparison",
            Intent::TopValues => "top_values",
            Intent::BottomValues => "bottom_values",
            Intent::CategoricalBreakdown => "categorical_breakdown",
            Intent::AnomalyDetection => "anomaly_detection",
            Intent::General => "general",
        }
    }

    /// `general` has no routine of its own
    pub fn dispatch_target(&self) -> Intent {
        match self {
            Intent::General => Intent::Summary,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Standard,
    /// only the columns named in the question
    Focused,
    /// time axis taken from a date column
    Temporal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    HasTemporal,
    TwoResolved,
    ResolvedCategorical,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub triggers: &'static [&'static str],
    pub guard: Guard,
    pub intent: Intent,
    pub strategy: Strategy,
}

pub const RULES: [Rule; 12] = [
    Rule {
        name: "temporal_trend",
        triggers: &["trend", "change", "over time", "evolution"],
        guard: Guard::HasTemporal,
        intent: Intent::Trend,
        strategy: Strategy::Temporal,
    },
    Rule {
        name: "focused_correlation",
        triggers: &["relationship", "correlation", "related", "affect", "correlate", "correlated"],
        guard: Guard::TwoResolved,
        intent: Intent::Correlation,
        strategy: Strategy::Focused,
    },
    Rule {
        name: "grouped_breakdown",
        triggers: &["by", "group", "grouped", "category", "breakdown", "per"],
        guard: Guard::ResolvedCategorical,
        intent: Intent::CategoricalBreakdown,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "anomalies",
        triggers: &["outlier", "anomaly", "anomalies", "unusual", "strange", "weird"],
        guard: Guard::Always,
        intent: Intent::AnomalyDetection,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "averages",
        triggers: &["average", "mean", "avg"],
        guard: Guard::Always,
        intent: Intent::Averages,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "correlation",
        triggers: &["correlation", "correlate", "correlated", "relationship", "related"],
        guard: Guard::Always,
        intent: Intent::Correlation,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "trend",
        triggers: &["trend", "over time", "time"],
        guard: Guard::Always,
        intent: Intent::Trend,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "distribution",
        triggers: &["distribution", "histogram", "spread"],
        guard: Guard::Always,
        intent: Intent::Distribution,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "summary",
        triggers: &["summary", "describe", "overview"],
        guard: Guard::Always,
        intent: Intent::Summary,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "comparison",
        triggers: &["compare", "comparison", "vs", "versus"],
        guard: Guard::Always,
        intent: Intent::Comparison,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "top_values",
        triggers: &["top", "highest", "largest", "maximum"],
        guard: Guard::Always,
        intent: Intent::TopValues,
        strategy: Strategy::Standard,
    },
    Rule {
        name: "bottom_values",
        triggers: &["bottom", "lowest", "smallest", "minimum"],
        guard: Guard::Always,
        intent: Intent::BottomValues,
        strategy: Strategy::Standard,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub strategy: Strategy,
    /// name of the rule that fired, "fallback" when none did
    pub rule: &'static str,
}

fn word_matches(word: &str, trigger: &str) -> bool {
    word == trigger
        || word.strip_suffix("es").map(|w| w == trigger).unwrap_or(false)
        || word.strip_suffix('s').map(|w| w == trigger).unwrap_or(false)
}

/// Case-insensitive. Single words also accept their plural, phrases must appear as whole words.
pub fn trigger_hit(words: &[String], trigger: &str) -> bool {
    if trigger.contains(' ') {
        let padded = format!(" {} ", words.join(" "));
        padded.contains(&format!(" {} ", trigger))
    } else {
        words.iter().any(|w| word_matches(w, trigger))
    }
}

fn guard_holds(guard: Guard, resolved: &[String], profile: &DatasetProfile) -> bool {
    match guard {
        Guard::Always => true,
        Guard::HasTemporal => profile.has_temporal(),
        Guard::TwoResolved => resolved.len() >= 2,
        Guard::ResolvedCategorical => resolved.iter().any(|r| {
            profile
                .column(r)
                .map(|c| c.kind == ColumnKind::Categorical)
                .unwrap_or(false)
        }),
    }
}

pub fn classify(question: &str, resolved: &[String], profile: &DatasetProfile) -> Classification {
    let words = question_words(question);
    for rule in RULES.iter() {
        let triggered = rule.triggers.iter().any(|t| trigger_hit(&words, t));
        if triggered && guard_holds(rule.guard, resolved, profile) {
            crate::debug_note!("'{}' classified by rule {} as {}", question, rule.name, rule.intent.as_str());
            return Classification { intent: rule.intent, strategy: rule.strategy, rule: rule.name };
        }
    }
    crate::debug_note!("'{}' matched no rule, general", question);
    Classification { intent: Intent::General, strategy: Strategy::Standard, rule: "fallback" }
}
