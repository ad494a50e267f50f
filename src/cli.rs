//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::compiler::{compile_json, parse_iso8601};
use crate::domain::config_validation::{
    positive_int, required_string, validate_config, CandleSource, DEFAULT_POLL_INTERVAL_SECS,
};
use crate::domain::error::{CompileError, VerdictError};
use crate::domain::market::{Market, MarketConfig};
use crate::domain::prediction::{Prediction, PredictionValue};
use crate::domain::runner::{RunReport, Runner, DEFAULT_MAX_PASSES};
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::storage_port::PredictionStore;

#[derive(Parser, Debug)]
#[command(name = "verdict", about = "Evaluates market price predictions against candle data")]
pub struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a prediction file and print the result without storing it
    Compile {
        #[arg(short, long)]
        input: PathBuf,
        /// Print the compiled prediction as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compile a prediction file and store it
    Add {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Run one evaluation batch over all ongoing predictions
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Evaluate as of this ISO8601 time instead of now
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
    },
    /// Run a batch every poll interval until interrupted
    Watch {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List stored predictions
    List {
        #[arg(short, long)]
        config: PathBuf,
        /// Only predictions in these states (repeatable)
        #[arg(long, value_parser = parse_state)]
        state: Vec<PredictionValue>,
    },
    /// Clear a prediction's progress so the next batch replays it
    Reset {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        id: String,
    },
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, String> {
    parse_iso8601(value)
}

fn parse_state(value: &str) -> Result<PredictionValue, String> {
    value.parse()
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Compile { input, json } => run_compile(&input, json),
        Command::Add { config, input } => run_add(&config, &input),
        Command::Run { config, now } => run_batch(&config, now.unwrap_or_else(Utc::now)),
        Command::Watch { config } => run_watch(&config),
        Command::List { config, state } => run_list(&config, &state),
        Command::Reset { config, id } => run_reset(&config, &id),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Everything a batch needs, built from a validated config file.
pub struct Context {
    pub store: Box<dyn PredictionStore>,
    pub candles: Box<dyn CandlePort>,
    pub market_config: MarketConfig,
    pub max_passes: usize,
    pub poll_interval: Duration,
}

impl Context {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, VerdictError> {
        validate_config(config)?;
        let market_config = MarketConfig::from_config(config)?;
        let candles: Box<dyn CandlePort> = match CandleSource::from_config(config)? {
            CandleSource::Csv => Box::new(CsvAdapter::new(PathBuf::from(required_string(
                config, "csv", "path",
            )?))),
            CandleSource::Sqlite => open_sqlite_candles(config)?,
        };
        Ok(Self {
            store: open_store(config)?,
            candles,
            market_config,
            max_passes: positive_int(config, "runner", "max_passes", DEFAULT_MAX_PASSES as i64)?
                as usize,
            poll_interval: Duration::from_secs(positive_int(
                config,
                "runner",
                "poll_interval_secs",
                DEFAULT_POLL_INTERVAL_SECS,
            )? as u64),
        })
    }

    pub fn load(path: &Path) -> Result<Self, VerdictError> {
        let config = FileConfigAdapter::from_file(path)?;
        Self::from_config(&config)
    }

    pub fn run_once(&self, now: DateTime<Utc>) -> Result<RunReport, VerdictError> {
        let market = Market::new(self.market_config.clone(), self.candles.as_ref());
        Runner::new(self.store.as_ref(), &market)
            .with_max_passes(self.max_passes)
            .run(now.timestamp())
    }
}

#[cfg(feature = "sqlite")]
fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn PredictionStore>, VerdictError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_config: &dyn ConfigPort) -> Result<Box<dyn PredictionStore>, VerdictError> {
    Err(sqlite_unavailable())
}

#[cfg(feature = "sqlite")]
fn open_sqlite_candles(config: &dyn ConfigPort) -> Result<Box<dyn CandlePort>, VerdictError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite_candles(_config: &dyn ConfigPort) -> Result<Box<dyn CandlePort>, VerdictError> {
    Err(sqlite_unavailable())
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_unavailable() -> VerdictError {
    VerdictError::ConfigInvalid {
        section: "sqlite".to_string(),
        key: "path".to_string(),
        reason: "verdict was built without the sqlite feature".to_string(),
    }
}

pub fn load_prediction(path: &Path) -> Result<Prediction, VerdictError> {
    let content = fs::read_to_string(path)?;
    compile_json(&content, Utc::now()).map_err(|e| {
        if let CompileError::Clause { source, .. } = &e {
            eprintln!("{}", source.display_with_context(&clause_text(&content, &e)));
        }
        VerdictError::from(e)
    })
}

/// Best-effort lookup of the clause text a compile error points into.
fn clause_text(content: &str, err: &CompileError) -> String {
    let CompileError::Clause { clause, .. } = err else {
        return String::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        return String::new();
    };
    let pointer = format!("/{}", clause.replace('.', "/"));
    value
        .pointer(&pointer)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

pub fn describe(prediction: &Prediction) -> String {
    let mut out = String::new();
    out.push_str(&format!("id:       {}\n", prediction.id));
    out.push_str(&format!("type:     {:?}\n", prediction.prediction_type));
    out.push_str(&format!("summary:  {}\n", prediction.summary()));
    out.push_str(&format!("state:    {} ({})\n", prediction.state.value, prediction.state.status));
    out.push_str("given:\n");
    for condition in &prediction.given {
        out.push_str(&format!(
            "  {:<12} {}  [{} .. {}]  {}\n",
            condition.name,
            condition,
            condition.from_ts,
            condition.to_ts,
            condition.evaluate()
        ));
    }
    let clauses = [
        ("prePredict.wrongIf", prediction.pre_predict.wrong_if.as_ref()),
        ("prePredict.annulledIf", prediction.pre_predict.annulled_if.as_ref()),
        ("prePredict.predictIf", prediction.pre_predict.predict_if.as_ref()),
        ("predict.wrongIf", prediction.predict.wrong_if.as_ref()),
        ("predict.annulledIf", prediction.predict.annulled_if.as_ref()),
        ("predict.predict", Some(&prediction.predict.predict)),
    ];
    for (name, expr) in clauses {
        if let Some(expr) = expr {
            out.push_str(&format!("{:<22} {}\n", name, expr.render(&prediction.given)));
        }
    }
    out
}

fn run_compile(input: &Path, json: bool) -> Result<(), VerdictError> {
    eprintln!("Compiling {}", input.display());
    let prediction = load_prediction(input)?;
    if json {
        let body = serde_json::to_string_pretty(&prediction).map_err(|e| {
            VerdictError::Serialization {
                reason: e.to_string(),
            }
        })?;
        println!("{body}");
    } else {
        print!("{}", describe(&prediction));
    }
    Ok(())
}

fn run_add(config_path: &Path, input: &Path) -> Result<(), VerdictError> {
    let context = Context::load(config_path)?;
    let mut prediction = load_prediction(input)?;

    let existing = context.store.get_predictions(&[])?;
    if existing.contains_key(&prediction.id) {
        return Err(CompileError::InvalidInput(format!(
            "a prediction with id '{}' already exists",
            prediction.id
        ))
        .into());
    }

    prediction.evaluate();
    let mut batch = std::collections::BTreeMap::new();
    batch.insert(prediction.id.clone(), prediction);
    context.store.upsert_predictions(&batch)?;
    for prediction in batch.values() {
        info!("Added prediction {}", prediction.id);
        print!("{}", describe(prediction));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for prediction in report.changed.values() {
        println!(
            "{:<24} {:<24} {}",
            prediction.id,
            prediction.state.value,
            prediction.summary()
        );
    }
    for err in &report.errors {
        eprintln!("failed: {err}");
    }
    eprintln!(
        "{} ongoing, {} changed, {} resolved, {} failed",
        report.loaded,
        report.changed.len(),
        report.resolved().count(),
        report.errors.len()
    );
}

fn run_batch(config_path: &Path, now: DateTime<Utc>) -> Result<(), VerdictError> {
    let context = Context::load(config_path)?;
    eprintln!("Evaluating predictions as of {}", now.to_rfc3339());
    let report = context.run_once(now)?;
    print_report(&report);
    Ok(())
}

fn run_watch(config_path: &Path) -> Result<(), VerdictError> {
    let context = Context::load(config_path)?;
    info!(
        "Watching, polling every {}s",
        context.poll_interval.as_secs()
    );
    loop {
        match context.run_once(Utc::now()) {
            Ok(report) => print_report(&report),
            Err(e) => warn!("Batch failed, retrying next interval: {}", e),
        }
        std::thread::sleep(context.poll_interval);
    }
}

fn run_list(config_path: &Path, states: &[PredictionValue]) -> Result<(), VerdictError> {
    let context = Context::load(config_path)?;
    let predictions = context.store.get_predictions(states)?;
    if predictions.is_empty() {
        eprintln!("No predictions found");
        return Ok(());
    }
    for prediction in predictions.values() {
        println!(
            "{:<24} {:<24} {}",
            prediction.id,
            prediction.state.value,
            prediction.summary()
        );
    }
    eprintln!("{} predictions", predictions.len());
    Ok(())
}

fn run_reset(config_path: &Path, id: &str) -> Result<(), VerdictError> {
    let context = Context::load(config_path)?;
    let mut predictions = context.store.get_predictions(&[])?;
    let Some(mut prediction) = predictions.remove(id) else {
        return Err(VerdictError::UnknownPrediction { id: id.to_string() });
    };
    prediction.clear_state();
    let mut batch = std::collections::BTreeMap::new();
    batch.insert(prediction.id.clone(), prediction);
    context.store.upsert_predictions(&batch)?;
    eprintln!("Reset prediction {}", id);
    Ok(())
}
