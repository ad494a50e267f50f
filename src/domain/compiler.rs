//! Compiles author-written prediction input into a [`Prediction`].
//!
//! Input is JSON: a `given` map of named condition clauses
//! (`COIN:BINANCE:BTC-USDT > 60k`, `... BETWEEN 50k AND 60k`) with their time
//! windows, plus optional pre-predict clauses and the required predict clause
//! written in the boolean grammar of [`expr_parser`].

use crate::domain::bool_expr::{BoolExpr, ConditionRef};
use crate::domain::condition::{Condition, Operator};
use crate::domain::error::CompileError;
use crate::domain::expr_parser::{self, is_valid_identifier};
use crate::domain::operand::Operand;
use crate::domain::predict::{PrePredict, Predict};
use crate::domain::prediction::{Prediction, PredictionState};
use crate::domain::prediction_type::PredictionType;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const MAX_ERROR_MARGIN_RATIO: f64 = 0.3;

const MAX_DURATION_UNITS: i64 = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionInput {
    #[serde(default)]
    pub id: Option<String>,
    pub posted_at: String,
    #[serde(default)]
    pub reporter: String,
    #[serde(default)]
    pub post_author: String,
    #[serde(default)]
    pub post_url: String,
    #[serde(default)]
    pub post_text: String,
    pub given: BTreeMap<String, ConditionInput>,
    #[serde(default)]
    pub pre_predict: Option<PrePredictInput>,
    pub predict: PredictInput,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionInput {
    pub condition: String,
    #[serde(default)]
    pub from_iso8601: Option<String>,
    #[serde(default)]
    pub to_iso8601: Option<String>,
    #[serde(default)]
    pub to_duration: Option<String>,
    #[serde(default)]
    pub error_margin_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrePredictInput {
    #[serde(default)]
    pub wrong_if: Option<String>,
    #[serde(default)]
    pub annulled_if: Option<String>,
    #[serde(default)]
    pub predict_if: Option<String>,
    #[serde(default)]
    pub ignore_undecided_if_predict_is_defined: bool,
    #[serde(default)]
    pub annulled_if_predict_is_false: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictInput {
    #[serde(default)]
    pub wrong_if: Option<String>,
    #[serde(default)]
    pub annulled_if: Option<String>,
    #[serde(default)]
    pub predict: String,
    #[serde(default)]
    pub ignore_undecided_if_predict_is_defined: bool,
    #[serde(default)]
    pub annulled_if_predict_is_false: bool,
}

pub fn compile_json(json: &str, created_at: DateTime<Utc>) -> Result<Prediction, CompileError> {
    let input: PredictionInput =
        serde_json::from_str(json).map_err(|e| CompileError::InvalidInput(e.to_string()))?;
    compile(&input, created_at)
}

pub fn compile(input: &PredictionInput, created_at: DateTime<Utc>) -> Result<Prediction, CompileError> {
    let posted_at = parse_iso8601(&input.posted_at).map_err(CompileError::InvalidPostedAt)?;

    let mut given = Vec::with_capacity(input.given.len());
    let mut declared: HashMap<String, ConditionRef> = HashMap::new();
    let mut entries: Vec<(String, &String, &ConditionInput)> = input
        .given
        .iter()
        .map(|(raw_name, clause)| (raw_name.trim().to_lowercase(), raw_name, clause))
        .collect();
    // arena order follows the lower-cased names
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, raw_name, clause) in entries {
        if !is_valid_identifier(&name) {
            return Err(CompileError::InvalidCondition {
                name: raw_name.clone(),
                reason: "names must be alphanumeric or '_' and not a keyword".to_string(),
            });
        }
        if declared.contains_key(&name) {
            return Err(CompileError::DuplicateCondition(name));
        }
        declared.insert(name.clone(), ConditionRef(given.len()));
        given.push(compile_condition(&name, clause, posted_at)?);
    }

    let pre_predict = match &input.pre_predict {
        Some(pre) => PrePredict {
            wrong_if: compile_clause("prePredict.wrongIf", pre.wrong_if.as_deref(), &declared)?,
            annulled_if: compile_clause(
                "prePredict.annulledIf",
                pre.annulled_if.as_deref(),
                &declared,
            )?,
            predict_if: compile_clause(
                "prePredict.predictIf",
                pre.predict_if.as_deref(),
                &declared,
            )?,
            ignore_undecided_if_predict_is_defined: pre.ignore_undecided_if_predict_is_defined,
            annulled_if_predict_is_false: pre.annulled_if_predict_is_false,
        },
        None => PrePredict::default(),
    };

    let predict_expr = compile_clause("predict.predict", Some(&input.predict.predict), &declared)?
        .ok_or(CompileError::MissingPredict)?;
    let predict = Predict {
        wrong_if: compile_clause(
            "predict.wrongIf",
            input.predict.wrong_if.as_deref(),
            &declared,
        )?,
        annulled_if: compile_clause(
            "predict.annulledIf",
            input.predict.annulled_if.as_deref(),
            &declared,
        )?,
        predict: predict_expr,
        ignore_undecided_if_predict_is_defined: input.predict.ignore_undecided_if_predict_is_defined,
        annulled_if_predict_is_false: input.predict.annulled_if_predict_is_false,
    };

    let id = input
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| derive_id(input, posted_at));

    let mut prediction = Prediction {
        id,
        created_at,
        posted_at,
        reporter: input.reporter.clone(),
        post_author: input.post_author.clone(),
        post_url: input.post_url.clone(),
        post_text: input.post_text.clone(),
        given,
        pre_predict,
        predict,
        state: PredictionState::default(),
        prediction_type: PredictionType::Unsupported,
    };
    prediction.prediction_type = PredictionType::infer(&prediction);
    Ok(prediction)
}

fn derive_id(input: &PredictionInput, posted_at: DateTime<Utc>) -> String {
    let who = [&input.reporter, &input.post_author]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                .collect::<String>()
        })
        .unwrap_or_else(|| "anon".to_string());
    format!("{}-{}", who, posted_at.timestamp())
}

fn compile_clause(
    clause: &str,
    text: Option<&str>,
    declared: &HashMap<String, ConditionRef>,
) -> Result<Option<BoolExpr>, CompileError> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(t) => expr_parser::parse(t, declared)
            .map(Some)
            .map_err(|source| CompileError::Clause {
                clause: clause.to_string(),
                source,
            }),
    }
}

pub fn compile_condition(
    name: &str,
    input: &ConditionInput,
    posted_at: DateTime<Utc>,
) -> Result<Condition, CompileError> {
    let (operator, operand_texts) = split_clause(name, &input.condition)?;

    let mut operands = Vec::with_capacity(operand_texts.len());
    for text in operand_texts {
        let operand = Operand::parse(text).map_err(|reason| CompileError::InvalidOperand {
            name: name.to_string(),
            operand: text.to_string(),
            reason,
        })?;
        operands.push(operand);
    }
    if operands.iter().all(Operand::is_number) {
        return Err(CompileError::InvalidCondition {
            name: name.to_string(),
            reason: "at least one operand must be a market operand".to_string(),
        });
    }

    let from = match input.from_iso8601.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => parse_iso8601(s).map_err(|reason| CompileError::InvalidTime {
            name: name.to_string(),
            reason,
        })?,
        _ => posted_at,
    };
    let to = resolve_deadline(name, input, from)?;
    if from >= to {
        return Err(CompileError::InvalidTime {
            name: name.to_string(),
            reason: format!("from {} is not before to {}", from.to_rfc3339(), to.to_rfc3339()),
        });
    }

    let ratio = input.error_margin_ratio.unwrap_or(0.0);
    if !(0.0..=MAX_ERROR_MARGIN_RATIO).contains(&ratio) {
        return Err(CompileError::ErrorMarginOutOfRange {
            name: name.to_string(),
            ratio,
            max: MAX_ERROR_MARGIN_RATIO,
        });
    }

    Ok(Condition::new(
        name,
        operator,
        operands,
        from.timestamp(),
        to.timestamp(),
        ratio,
    ))
}

fn split_clause<'a>(name: &str, text: &'a str) -> Result<(Operator, Vec<&'a str>), CompileError> {
    fn is_kw(t: &str, kw: &str) -> bool {
        t.eq_ignore_ascii_case(kw)
    }
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [a, between, b, and, c] if is_kw(between, "between") && is_kw(and, "and") => {
            Ok((Operator::Between, vec![*a, *b, *c]))
        }
        [a, op, b] => match Operator::parse(op) {
            Some(Operator::Between) => Err(CompileError::OperandCount {
                name: name.to_string(),
                expected: 3,
                found: 2,
            }),
            Some(operator) => Ok((operator, vec![*a, *b])),
            None => Err(CompileError::UnknownOperator {
                name: name.to_string(),
                operator: op.to_string(),
            }),
        },
        _ if tokens.iter().any(|t| is_kw(t, "between")) => Err(CompileError::OperandCount {
            name: name.to_string(),
            expected: 3,
            found: tokens
                .iter()
                .filter(|t| !is_kw(t, "between") && !is_kw(t, "and"))
                .count(),
        }),
        [_, op, ..] if Operator::parse(op).is_some() => Err(CompileError::OperandCount {
            name: name.to_string(),
            expected: 2,
            found: tokens.len() - 1,
        }),
        [_, op, _, ..] => Err(CompileError::UnknownOperator {
            name: name.to_string(),
            operator: op.to_string(),
        }),
        _ => Err(CompileError::InvalidCondition {
            name: name.to_string(),
            reason: format!(
                "expected '<operand> <operator> <operand>', found '{}'",
                text.trim()
            ),
        }),
    }
}

fn resolve_deadline(
    name: &str,
    input: &ConditionInput,
    from: DateTime<Utc>,
) -> Result<DateTime<Utc>, CompileError> {
    let invalid = |reason: String| CompileError::InvalidTime {
        name: name.to_string(),
        reason,
    };
    let to_iso = input.to_iso8601.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let to_duration = input.to_duration.as_deref().map(str::trim).filter(|s| !s.is_empty());
    match (to_iso, to_duration) {
        (Some(_), Some(_)) => Err(invalid(
            "specify only one of toIso8601 and toDuration".to_string(),
        )),
        (Some(iso), None) => parse_iso8601(iso).map_err(invalid),
        (None, Some(duration)) => apply_duration(from, duration).map_err(invalid),
        (None, None) => Err(invalid(
            "one of toIso8601 or toDuration is required".to_string(),
        )),
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_iso8601(input: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("invalid ISO8601 timestamp '{}'", input))
}

/// Resolves `<n>h|d|w|m|y` (m = months) or `eod|eow|eom|eoy` relative to `from`.
pub fn apply_duration(from: DateTime<Utc>, duration: &str) -> Result<DateTime<Utc>, String> {
    let lower = duration.trim().to_lowercase();
    let date = from.date_naive();
    let end_of = |d: Option<NaiveDate>| {
        d.and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(|| format!("cannot resolve duration '{}'", duration))
    };
    match lower.as_str() {
        "eod" => return end_of(Some(date)),
        "eow" => {
            let days_left = 6 - i64::from(date.weekday().num_days_from_monday());
            return end_of(date.checked_add_signed(Duration::days(days_left)));
        }
        "eom" => {
            let (y, m) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            return end_of(NaiveDate::from_ymd_opt(y, m, 1).and_then(|d| d.pred_opt()));
        }
        "eoy" => return end_of(NaiveDate::from_ymd_opt(date.year(), 12, 31)),
        _ => {}
    }

    let split = lower
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{}' has no unit", duration))?;
    let (digits, unit) = lower.split_at(split);
    let n: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", duration))?;
    if n <= 0 || n > MAX_DURATION_UNITS {
        return Err(format!("duration '{}' out of range", duration));
    }
    let out_of_range = || format!("duration '{}' out of range", duration);
    match unit {
        "h" => from.checked_add_signed(Duration::hours(n)).ok_or_else(out_of_range),
        "d" => from.checked_add_signed(Duration::days(n)).ok_or_else(out_of_range),
        "w" => from.checked_add_signed(Duration::weeks(n)).ok_or_else(out_of_range),
        "m" => from
            .checked_add_months(Months::new(n as u32))
            .ok_or_else(out_of_range),
        "y" => from
            .checked_add_months(Months::new((n * 12) as u32))
            .ok_or_else(out_of_range),
        other => Err(format!("unknown duration unit '{}'", other)),
    }
}
