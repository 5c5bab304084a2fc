use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use prettytable::{Cell, Row, Table};

use tabquery::charts::{ChartRenderer, PlotlyHtmlRenderer};
use tabquery::explain::{explain_with_fallback, GeminiExplainer, InsightExplainer};
use tabquery::{make_notes, AnalysisResult, Engine, EngineConfig, ServiceConfig};

///Ask free-text questions about a CSV, TSV or spreadsheet file.
///Every question is classified into one analysis (averages, correlation, trend, distribution, ...),
///answered with statistics and a short plain-language insight, and optionally drawn as a plotly chart.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
struct Args {
    ///Load a single .csv, .txt, .tsv or spreadsheet (.xlsx, .xlsm, .xlsb, .xls, .ods) file.
    ///Spreadsheets are read from their first sheet
    #[clap(long, default_value = "NO")]
    file: String,

    ///Question to ask about the loaded file, may be repeated
    #[clap(long)]
    query: Vec<String>,

    ///Print the whole-dataset insight document
    #[clap(short, long)]
    insights: bool,

    ///Print the analytics dashboard (statistics, data quality, distributions, outliers) as JSON
    #[clap(short, long)]
    dashboard: bool,

    ///Print the dataset context prepared for a text generation assistant
    #[clap(long)]
    ai_context: bool,

    ///Question for the keyword driven assistant answer, may be repeated
    #[clap(long)]
    ask: Vec<String>,

    ///Print the query history at the end
    #[clap(long)]
    history: bool,

    ///Print query suggestions for the loaded file
    #[clap(short, long)]
    suggest: bool,

    ///Draw charts as HTML into this directory
    #[clap(short, long, default_value = "NO")]
    plot: String,

    ///Write notes to nondefault file? Default is file_name.txt
    #[clap(short, long, default_value = "NO")]
    outfile: String,

    ///Should I be quiet? This mode suppresses terminal output but still writes to log file
    #[clap(short, long)]
    quiet: bool,

    ///Ask the text generation service (GEMINI_API_KEY from .env) to explain each answer.
    ///Falls back to the local narrative when the key is missing or the call fails
    #[clap(short, long)]
    explain: bool,

    ///Launch the HTTP backend. PORT, TABQUERY_STATIC_DIR and GEMINI_API_KEY are loaded from the .env file
    #[clap(short, long)]
    backend_server: bool,
}

fn notes_file(args: &Args) -> String {
    if args.outfile != "NO" {
        return args.outfile.clone();
    }
    if args.file != "NO" {
        let stem = Path::new(&args.file).file_stem().and_then(|s| s.to_str()).unwrap_or("tabquery");
        return format!("{}.txt", stem);
    }
    "tabquery.txt".to_string()
}

fn report_result(result: &AnalysisResult, query: &str, args: &Args, logfile_name: &str) {
    let heading = format!("Q: {}", query).bright_cyan();
    make_notes!(logfile_name, args.quiet, 2, "\n{}\n", heading);
    make_notes!(logfile_name, args.quiet, 0, "{} {}\n", "Analysis:".yellow(), result.analysis_type.as_str());
    make_notes!(logfile_name, args.quiet, 0, "{}\n", result.insight_text.bold());

    let mut table = Table::new();
    table.set_titles(Row::new(vec![Cell::new("#"), Cell::new("Narrative")]));
    for (i, line) in result.narrative.iter().enumerate() {
        table.add_row(Row::new(vec![Cell::new(&format!("{}", i + 1)), Cell::new(line)]));
    }
    for table_line in table.to_string().lines() {
        make_notes!(logfile_name, args.quiet, 0, "{}\n", table_line);
    }

    if !result.related_suggestions.is_empty() {
        make_notes!(logfile_name, args.quiet, 0, "{} {}\n", "Try next:".green(), result.related_suggestions.join(" | "));
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let logfile_name = notes_file(args);
    let engine = Arc::new(Engine::new(EngineConfig::default()));

    if args.file != "NO" {
        let outcome = engine.load_path(Path::new(&args.file))?;
        make_notes!(&logfile_name, args.quiet, 1, "{}\n", format!("Dataset: {}", args.file).bright_yellow());
        make_notes!(&logfile_name, args.quiet, 0, "{}\n", outcome.summary_text);
    }

    if args.suggest {
        make_notes!(&logfile_name, args.quiet, 2, "\n{}\n", "Suggested questions".blue().underline());
        for s in engine.suggest_queries() {
            make_notes!(&logfile_name, args.quiet, 0, " - {}\n", s);
        }
    }

    let service_cfg = ServiceConfig::from_env();
    let renderer = (args.plot != "NO").then(|| PlotlyHtmlRenderer::new(&args.plot));
    let explainer: Option<Box<dyn InsightExplainer>> = match (&service_cfg.gemini_api_key, args.explain) {
        (Some(key), true) => Some(Box::new(GeminiExplainer::new(key.clone(), service_cfg.gemini_model.clone()))),
        _ => None,
    };
    let rt = tokio::runtime::Runtime::new()?;

    for query in &args.query {
        match engine.run_query(query) {
            Ok(result) => {
                report_result(&result, query, args, &logfile_name);
                if let (Some(r), Some(spec)) = (renderer.as_ref(), result.chart_spec.as_ref()) {
                    match r.render(spec) {
                        Ok(name) => make_notes!(&logfile_name, args.quiet, 0, "{} {}\n", "Chart:".green(), r.out_dir.join(&name).display()),
                        Err(e) => eprintln!("{}", e.to_string().red()),
                    }
                }
                if args.explain {
                    let explanation = rt.block_on(explain_with_fallback(explainer.as_deref(), &result));
                    make_notes!(&logfile_name, args.quiet, 3, "{}\n", "Explanation".bright_magenta());
                    make_notes!(&logfile_name, args.quiet, 0, "{}\n", explanation.text);
                }
            }
            Err(e) => {
                let msg = format!("Q: {} -> {}", query, e).red();
                make_notes!(&logfile_name, args.quiet, 0, "{}\n", msg);
            }
        }
    }

    if args.insights {
        let doc = engine.get_comprehensive_insights()?;
        make_notes!(&logfile_name, args.quiet, 2, "\n{}\n", "Comprehensive insights".blue().underline());
        let pretty = serde_json::to_string_pretty(doc.as_ref())?;
        make_notes!(&logfile_name, args.quiet, 0, "{}\n", pretty);
    }

    if args.dashboard {
        let dashboard = engine.get_analytics_dashboard()?;
        make_notes!(&logfile_name, args.quiet, 2, "\n{}\n", "Analytics dashboard".blue().underline());
        for issue in &dashboard.data_quality_report.quality_issues {
            make_notes!(&logfile_name, args.quiet, 0, "{} {}\n", "Quality:".yellow(), issue);
        }
        let pretty = serde_json::to_string_pretty(dashboard.as_ref())?;
        make_notes!(&logfile_name, args.quiet, 0, "{}\n", pretty);
    }

    if args.ai_context {
        let context = engine.get_ai_context()?;
        make_notes!(&logfile_name, args.quiet, 2, "\n{}\n", "Assistant context".blue().underline());
        make_notes!(&logfile_name, args.quiet, 0, "{}\n", context);
    }

    for question in &args.ask {
        let answer = engine.query_for_ai(question)?;
        let heading = format!("Assistant: {}", question).bright_cyan();
        make_notes!(&logfile_name, args.quiet, 2, "\n{}\n", heading);
        make_notes!(&logfile_name, args.quiet, 0, "{}\n", answer.answer);
    }

    if args.history {
        let mut table = Table::new();
        table.set_titles(Row::new(vec![Cell::new("Time"), Cell::new("Question"), Cell::new("Analysis"), Cell::new("Outcome")]));
        for h in engine.get_history() {
            let analysis = h.analysis_type.map(|a| a.as_str()).unwrap_or("-");
            let outcome = match (&h.result, &h.error) {
                (Some(r), _) => r.insight_text.clone(),
                (None, Some(e)) => e.clone(),
                _ => String::new(),
            };
            table.add_row(Row::new(vec![
                Cell::new(&h.timestamp.format("%H:%M:%S").to_string()),
                Cell::new(&h.query_text),
                Cell::new(analysis),
                Cell::new(&outcome),
            ]));
        }
        make_notes!(&logfile_name, args.quiet, 2, "\n{}\n", "Query history".blue().underline());
        for table_line in table.to_string().lines() {
            make_notes!(&logfile_name, args.quiet, 0, "{}\n", table_line);
        }
    }

    if args.backend_server {
        drop(rt);
        println!("{}", r#"==== STARTING TABQUERY BACKEND ==="#.bright_cyan());
        tabquery::server::backend_server(engine, service_cfg)?;
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    println!("{}{}", "TabQuery v".bright_yellow(), env!("CARGO_PKG_VERSION").bright_yellow());
    if let Err(e) = run(&args) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
