use thiserror::Error;

/// Every failure the engine hands back to its caller.
/// None of these abort a request - the boundary decides how to present them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("No dataset loaded")]
    NoDatasetLoaded,

    #[error("Unsupported format: {reason}")]
    UnsupportedFormat {
        reason: String,
    },

    #[error("{analysis} needs at least {required} {kind} column(s), found {found}")]
    InsufficientColumns {
        analysis: String,
        kind: String,
        required: usize,
        found: usize,
    },

    #[error("{analysis} needs at least {required} non-missing value(s){}, found {found}", .column.as_ref().map(|c| format!(" in '{}'", c)).unwrap_or_default())]
    InsufficientData {
        analysis: String,
        column: Option<String>,
        required: usize,
        found: usize,
    },

    #[error("Chart rendering failed: {reason}")]
    Render {
        reason: String,
    },
}

impl EngineError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat { reason: reason.into() }
    }

    pub fn insufficient_columns(analysis: &str, kind: &str, required: usize, found: usize) -> Self {
        Self::InsufficientColumns {
            analysis: analysis.to_string(),
            kind: kind.to_string(),
            required,
            found,
        }
    }

    pub fn insufficient_data(analysis: &str, column: Option<&str>, required: usize, found: usize) -> Self {
        Self::InsufficientData {
            analysis: analysis.to_string(),
            column: column.map(|c| c.to_string()),
            required,
            found,
        }
    }

    /// Short machine-friendly name, used by the HTTP boundary and the history log.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NoDatasetLoaded => "no_dataset_loaded",
            EngineError::UnsupportedFormat { .. } => "unsupported_format",
            EngineError::InsufficientColumns { .. } => "insufficient_columns",
            EngineError::InsufficientData { .. } => "insufficient_data",
            EngineError::Render { .. } => "render_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_the_column() {
        let e = EngineError::insufficient_data("trend", Some("price"), 3, 1);
        assert_eq!(e.to_string(), "trend needs at least 3 non-missing value(s) in 'price', found 1");
        let e = EngineError::insufficient_data("query", None, 1, 0);
        assert_eq!(e.to_string(), "query needs at least 1 non-missing value(s), found 0");
        assert_eq!(e.kind(), "insufficient_data");
    }
}
