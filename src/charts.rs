use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use plotly::box_plot::{BoxMean, BoxPoints};
use plotly::common::{Marker, Mode, Title};
use plotly::layout::{Axis, Layout};
use plotly::{Bar, BoxPlot, HeatMap, Histogram, Plot, Scatter};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// What to draw, never how. Routines fill it, a ChartRenderer turns it into something viewable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    Bar {
        title: String,
        x_label: String,
        y_label: String,
        categories: Vec<String>,
        values: Vec<f64>,
    },
    Line {
        title: String,
        x_label: String,
        y_label: String,
        x: Vec<f64>,
        y: Vec<f64>,
        /// fitted trend line evaluated at every x
        fitted: Option<Vec<f64>>,
    },
    Histogram {
        title: String,
        column: String,
        values: Vec<f64>,
        bins: usize,
    },
    Heatmap {
        title: String,
        labels: Vec<String>,
        /// None where r is undefined
        matrix: Vec<Vec<Option<f64>>>,
    },
    BoxPlot {
        title: String,
        column: String,
        values: Vec<f64>,
    },
}

impl ChartSpec {
    pub fn title(&self) -> &str {
        match self {
            ChartSpec::Bar { title, .. }
            | ChartSpec::Line { title, .. }
            | ChartSpec::Histogram { title, .. }
            | ChartSpec::Heatmap { title, .. }
            | ChartSpec::BoxPlot { title, .. } => title,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChartSpec::Bar { .. } => "bar",
            ChartSpec::Line { .. } => "line",
            ChartSpec::Histogram { .. } => "histogram",
            ChartSpec::Heatmap { .. } => "heatmap",
            ChartSpec::BoxPlot { .. } => "box_plot",
        }
    }
}

/// Turns a chart description into an opaque reference (a file name, an URL ...)
pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec) -> Result<String, EngineError>;
}

/// Builds the plotly figure for a spec
pub fn build_plot(spec: &ChartSpec) -> Plot {
    let mut plot = Plot::new();
    let layout = match spec {
        ChartSpec::Bar { title, x_label, y_label, categories, values } => {
            let bar = Bar::new(categories.clone(), values.clone())
                .name(y_label)
                .marker(Marker::new().color("#1f77b4".to_string()).opacity(0.8));
            plot.add_trace(bar);
            Layout::new()
                .title(Title::new(title))
                .x_axis(Axis::new().title(Title::new(x_label)))
                .y_axis(Axis::new().title(Title::new(y_label)))
        }
        ChartSpec::Line { title, x_label, y_label, x, y, fitted } => {
            let trace = Scatter::new(x.clone(), y.clone())
                .mode(Mode::LinesMarkers)
                .name(y_label);
            plot.add_trace(trace);
            if let Some(fit) = fitted {
                let fit_trace = Scatter::new(x.clone(), fit.clone())
                    .mode(Mode::Lines)
                    .name("Trend line");
                plot.add_trace(fit_trace);
            }
            Layout::new()
                .title(Title::new(title))
                .x_axis(Axis::new().title(Title::new(x_label)))
                .y_axis(Axis::new().title(Title::new(y_label)))
        }
        ChartSpec::Histogram { title, column, values, bins } => {
            let hist = Histogram::new(values.clone())
                .name(column)
                .n_bins_x(*bins)
                .marker(Marker::new().color("#e377c2".to_string()).opacity(0.7));
            plot.add_trace(hist);
            Layout::new()
                .title(Title::new(title))
                .x_axis(Axis::new().title(Title::new(column)))
                .y_axis(Axis::new().title(Title::new("Frequency")))
        }
        ChartSpec::Heatmap { title, labels, matrix } => {
            let heat = HeatMap::new(labels.clone(), labels.clone(), matrix.clone());
            plot.add_trace(heat);
            Layout::new().title(Title::new(title)).height(700)
        }
        ChartSpec::BoxPlot { title, column, values } => {
            let bp = BoxPlot::new(values.clone())
                .name(column)
                .box_mean(BoxMean::True)
                .box_points(BoxPoints::Outliers);
            plot.add_trace(bp);
            Layout::new().title(Title::new(title))
        }
    };
    plot.set_layout(layout);
    plot
}

static CHART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes every chart as a standalone plotly HTML page into `out_dir`
/// and hands back the file name.
pub struct PlotlyHtmlRenderer {
    pub out_dir: PathBuf,
}

impl PlotlyHtmlRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }
}

impl ChartRenderer for PlotlyHtmlRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<String, EngineError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|e| EngineError::Render {
            reason: format!("cannot create {}: {}", self.out_dir.display(), e),
        })?;

        let seq = CHART_SEQ.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let file_name = format!("{}_{}_{}.html", spec.kind(), stamp, seq);
        let path = self.out_dir.join(&file_name);

        let html = build_plot(spec).to_html();
        std::fs::write(&path, html).map_err(|e| EngineError::Render {
            reason: format!("cannot write {}: {}", path.display(), e),
        })?;

        crate::debug_note!("chart '{}' written to {}", spec.title(), path.display());
        Ok(file_name)
    }
}
