//! @acp:module "Poll Value Codec"
//! @acp:summary "Answer parsing, raw encoding, labels and stats buckets per line type"
//! @acp:domain poll
//! @acp:layer service
//!
//! Three representations of an answer meet here:
//!
//! - the UI token, a JSON value submitted by the caller
//! - the raw answer, compact JSON text stored on the reply line
//! - the canonical [`AnswerValue`] used for comparison, labels and stats

use chrono::NaiveDate;
use serde_json::{json, Value};
use thiserror::Error;

use super::settings::{Labels, PollSettings};
use super::types::{ConditionOperator, LineKind};

const RAW_DATE_FORMAT: &str = "%Y-%m-%d";
const HOUR_BOUNDS: (i64, i64) = (0, 23);

/// Codec failure, mapped to a `PollError` by the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("an answer is required")]
    Required,
    #[error("{0}")]
    Invalid(String),
    #[error("unknown choice {0}")]
    UnknownChoice(u32),
}

/// Enum-or-string answer: a live choice or free text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceOrText {
    Choice(u32),
    Text(String),
}

/// Canonical, comparable answer value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Date(NaiveDate),
    Choice(u32),
    /// Sorted, deduplicated choice ids
    Choices(Vec<u32>),
    ChoiceOrText(ChoiceOrText),
    /// Comment lines carry no value
    Empty,
}

impl AnswerValue {
    fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => json!(s),
            Self::Int(n) => json!(n),
            Self::Bool(b) => json!(u8::from(*b)),
            Self::Date(d) => json!(d.format(RAW_DATE_FORMAT).to_string()),
            Self::Choice(id) => json!(id),
            Self::Choices(ids) => json!(ids),
            Self::ChoiceOrText(ChoiceOrText::Choice(id)) => json!([id]),
            Self::ChoiceOrText(ChoiceOrText::Text(text)) => json!([0, text]),
            Self::Empty => Value::Null,
        }
    }

    /// Raw encoding stored in `raw_answer`
    pub fn encode(&self) -> String {
        self.to_json().to_string()
    }
}

/// Validate a UI answer token against a line type
pub fn parse_answer(
    kind: &LineKind,
    payload: &Value,
    settings: &PollSettings,
) -> Result<AnswerValue, CodecError> {
    match kind {
        LineKind::String => {
            let text = expect_str(payload)?;
            let text = text.trim();
            if text.is_empty() {
                return Err(CodecError::Required);
            }
            Ok(AnswerValue::Text(text.to_string()))
        }
        // Empty text is a valid answer, only a missing one is not
        LineKind::Text => Ok(AnswerValue::Text(expect_str(payload)?.to_string())),
        LineKind::Int {
            lower_bound,
            upper_bound,
        } => {
            let value = parse_int(payload)?;
            check_bounds(value, *lower_bound, *upper_bound)?;
            Ok(AnswerValue::Int(value))
        }
        LineKind::Hour => {
            let value = parse_int(payload)?;
            check_bounds(value, Some(HOUR_BOUNDS.0), Some(HOUR_BOUNDS.1))?;
            Ok(AnswerValue::Int(value))
        }
        LineKind::Bool => parse_bool(payload).map(AnswerValue::Bool),
        LineKind::Date => {
            let text = expect_str(payload)?.trim();
            if text.is_empty() {
                return Err(CodecError::Required);
            }
            settings
                .date_formats
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(AnswerValue::Date)
                .ok_or_else(|| CodecError::Invalid(format!("invalid date: {}", text)))
        }
        LineKind::Enum { .. } => {
            let id = parse_choice_id(payload)?;
            ensure_live(kind, id)?;
            Ok(AnswerValue::Choice(id))
        }
        LineKind::MultiEnum { .. } => {
            let mut ids = match payload {
                Value::Null => return Err(CodecError::Required),
                Value::Array(items) => items
                    .iter()
                    .map(parse_choice_id)
                    .collect::<Result<Vec<_>, _>>()?,
                single => vec![parse_choice_id(single)?],
            };
            if ids.is_empty() {
                return Err(CodecError::Required);
            }
            for id in &ids {
                ensure_live(kind, *id)?;
            }
            ids.sort_unstable();
            ids.dedup();
            Ok(AnswerValue::Choices(ids))
        }
        LineKind::EnumOrString { .. } => {
            let value = parse_choice_or_text(payload)?;
            match value {
                ChoiceOrText::Choice(id) => ensure_live(kind, id)?,
                ChoiceOrText::Text(ref text) if text.trim().is_empty() => {
                    return Err(CodecError::Required)
                }
                ChoiceOrText::Text(_) => {}
            }
            Ok(AnswerValue::ChoiceOrText(value))
        }
        LineKind::Comment => Ok(AnswerValue::Empty),
    }
}

/// Decode a stored raw answer (no bounds or live-choice checks)
pub fn decode(kind: &LineKind, raw: &str) -> Result<AnswerValue, CodecError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CodecError::Invalid(format!("malformed raw answer {:?}: {}", raw, e)))?;

    match kind {
        LineKind::String | LineKind::Text => Ok(AnswerValue::Text(expect_str(&value)?.to_string())),
        LineKind::Int { .. } | LineKind::Hour => value
            .as_i64()
            .map(AnswerValue::Int)
            .ok_or_else(|| CodecError::Invalid(format!("expected an integer, got {}", value))),
        LineKind::Bool => parse_bool(&value).map(AnswerValue::Bool),
        LineKind::Date => {
            let text = expect_str(&value)?;
            NaiveDate::parse_from_str(text, RAW_DATE_FORMAT)
                .map(AnswerValue::Date)
                .map_err(|e| CodecError::Invalid(format!("invalid date {:?}: {}", text, e)))
        }
        LineKind::Enum { .. } => parse_choice_id(&value).map(AnswerValue::Choice),
        LineKind::MultiEnum { .. } => {
            let Value::Array(items) = &value else {
                return Err(CodecError::Invalid(format!("expected a list, got {}", value)));
            };
            let mut ids = items
                .iter()
                .map(parse_choice_id)
                .collect::<Result<Vec<_>, _>>()?;
            ids.sort_unstable();
            ids.dedup();
            Ok(AnswerValue::Choices(ids))
        }
        LineKind::EnumOrString { .. } => {
            parse_choice_or_text(&value).map(AnswerValue::ChoiceOrText)
        }
        LineKind::Comment => Ok(AnswerValue::Empty),
    }
}

/// Decode a condition reference value for a source line type.
///
/// Multi-enum sources are tested against a single choice id.
pub fn decode_condition(source_kind: &LineKind, raw: &str) -> Result<AnswerValue, CodecError> {
    match source_kind {
        LineKind::MultiEnum { .. } => {
            let value: Value = serde_json::from_str(raw).map_err(|e| {
                CodecError::Invalid(format!("malformed condition value {:?}: {}", raw, e))
            })?;
            parse_choice_id(&value).map(AnswerValue::Choice)
        }
        LineKind::Comment => Err(CodecError::Invalid(
            "comment lines cannot be condition sources".to_string(),
        )),
        _ => decode(source_kind, raw),
    }
}

/// Compare an answer with a condition reference value
pub fn matches(operator: ConditionOperator, answer: &AnswerValue, reference: &AnswerValue) -> bool {
    match operator {
        ConditionOperator::Equals => match (answer, reference) {
            (AnswerValue::Choices(ids), AnswerValue::Choice(id)) => ids.contains(id),
            _ => answer == reference,
        },
    }
}

/// Display labels of an answer (several for multi-enum)
pub fn answer_labels(kind: &LineKind, value: &AnswerValue, labels: &Labels) -> Vec<String> {
    let choice = |id: u32| {
        kind.choice_label(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", id))
    };

    match value {
        AnswerValue::Text(s) => vec![s.clone()],
        AnswerValue::Int(n) => vec![n.to_string()],
        AnswerValue::Bool(true) => vec![labels.yes.clone()],
        AnswerValue::Bool(false) => vec![labels.no.clone()],
        AnswerValue::Date(d) => vec![d.format(RAW_DATE_FORMAT).to_string()],
        AnswerValue::Choice(id) => vec![choice(*id)],
        AnswerValue::Choices(ids) => ids.iter().map(|id| choice(*id)).collect(),
        AnswerValue::ChoiceOrText(ChoiceOrText::Choice(id)) => vec![choice(*id)],
        AnswerValue::ChoiceOrText(ChoiceOrText::Text(text)) => vec![text.clone()],
        AnswerValue::Empty => Vec::new(),
    }
}

/// Single display label of an answer
pub fn answer_label(kind: &LineKind, value: &AnswerValue, labels: &Labels) -> String {
    answer_labels(kind, value, labels).join(", ")
}

/// Identifies one stats bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    Choice(u32),
    Yes,
    No,
    Value(i64),
    Other,
}

/// Fixed buckets of a line type, in display order.
///
/// `None` means the type is not aggregated. Integer types start empty
/// and grow one bucket per distinct answered value.
pub fn stats_schema(kind: &LineKind, labels: &Labels) -> Option<Vec<(BucketKey, String)>> {
    let choices = |kind: &LineKind| {
        kind.choices()
            .iter()
            .map(|c| (BucketKey::Choice(c.id), c.label.clone()))
            .collect::<Vec<_>>()
    };

    match kind {
        LineKind::String | LineKind::Text | LineKind::Date | LineKind::Comment => None,
        LineKind::Int { .. } | LineKind::Hour => Some(Vec::new()),
        LineKind::Bool => Some(vec![
            (BucketKey::Yes, labels.yes.clone()),
            (BucketKey::No, labels.no.clone()),
        ]),
        LineKind::Enum { .. } | LineKind::MultiEnum { .. } => Some(choices(kind)),
        LineKind::EnumOrString { .. } => {
            let mut buckets = choices(kind);
            buckets.push((BucketKey::Other, labels.other.clone()));
            Some(buckets)
        }
    }
}

/// Buckets incremented by one answer
pub fn bucket_keys(kind: &LineKind, value: &AnswerValue) -> Vec<BucketKey> {
    match value {
        AnswerValue::Int(n) => vec![BucketKey::Value(*n)],
        AnswerValue::Bool(true) => vec![BucketKey::Yes],
        AnswerValue::Bool(false) => vec![BucketKey::No],
        AnswerValue::Choice(id) => vec![BucketKey::Choice(*id)],
        AnswerValue::Choices(ids) => ids.iter().map(|id| BucketKey::Choice(*id)).collect(),
        AnswerValue::ChoiceOrText(ChoiceOrText::Choice(id)) if kind.has_live_choice(*id) => {
            vec![BucketKey::Choice(*id)]
        }
        AnswerValue::ChoiceOrText(_) => vec![BucketKey::Other],
        AnswerValue::Text(_) | AnswerValue::Date(_) | AnswerValue::Empty => Vec::new(),
    }
}

fn expect_str(value: &Value) -> Result<&str, CodecError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Err(CodecError::Required),
        other => Err(CodecError::Invalid(format!("expected a string, got {}", other))),
    }
}

fn parse_int(value: &Value) -> Result<i64, CodecError> {
    match value {
        Value::Null => Err(CodecError::Required),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| CodecError::Invalid(format!("expected an integer, got {}", n))),
        Value::String(s) if s.trim().is_empty() => Err(CodecError::Required),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CodecError::Invalid(format!("expected an integer, got {:?}", s))),
        other => Err(CodecError::Invalid(format!("expected an integer, got {}", other))),
    }
}

fn check_bounds(value: i64, lower: Option<i64>, upper: Option<i64>) -> Result<(), CodecError> {
    if let Some(lo) = lower {
        if value < lo {
            return Err(CodecError::Invalid(format!(
                "{} must be greater than or equal to {}",
                value, lo
            )));
        }
    }
    if let Some(hi) = upper {
        if value > hi {
            return Err(CodecError::Invalid(format!(
                "{} must be less than or equal to {}",
                value, hi
            )));
        }
    }
    Ok(())
}

fn parse_bool(value: &Value) -> Result<bool, CodecError> {
    match value {
        Value::Null => Err(CodecError::Required),
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(CodecError::Invalid(format!("expected 0 or 1, got {}", n))),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" => Err(CodecError::Required),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(CodecError::Invalid(format!("expected a boolean, got {:?}", other))),
        },
        other => Err(CodecError::Invalid(format!("expected a boolean, got {}", other))),
    }
}

fn parse_choice_id(value: &Value) -> Result<u32, CodecError> {
    let id = match value {
        Value::Null => return Err(CodecError::Required),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) if s.trim().is_empty() => return Err(CodecError::Required),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    id.ok_or_else(|| CodecError::Invalid(format!("expected a choice id, got {}", value)))
}

fn parse_choice_or_text(value: &Value) -> Result<ChoiceOrText, CodecError> {
    let from_id = |id: u32| {
        if id == 0 {
            Err(CodecError::Invalid(
                "choice 0 requires a free text".to_string(),
            ))
        } else {
            Ok(ChoiceOrText::Choice(id))
        }
    };

    match value {
        Value::Null => Err(CodecError::Required),
        Value::String(text) => Ok(ChoiceOrText::Text(text.clone())),
        Value::Number(_) => from_id(parse_choice_id(value)?),
        Value::Array(items) => match items.as_slice() {
            [id] => from_id(parse_choice_id(id)?),
            [id, Value::String(text)] if parse_choice_id(id)? == 0 => {
                Ok(ChoiceOrText::Text(text.clone()))
            }
            _ => Err(CodecError::Invalid(format!(
                "expected [id] or [0, \"text\"], got {}",
                value
            ))),
        },
        Value::Object(map) => match (map.get("id"), map.get("text")) {
            (Some(id), None) => from_id(parse_choice_id(id)?),
            (None, Some(Value::String(text))) => Ok(ChoiceOrText::Text(text.clone())),
            (Some(id), Some(Value::String(text))) if parse_choice_id(id)? == 0 => {
                Ok(ChoiceOrText::Text(text.clone()))
            }
            _ => Err(CodecError::Invalid(format!(
                "expected {{\"id\": n}} or {{\"text\": \"...\"}}, got {}",
                value
            ))),
        },
        Value::Bool(_) => Err(CodecError::Invalid(format!(
            "expected a choice or a text, got {}",
            value
        ))),
    }
}

fn ensure_live(kind: &LineKind, id: u32) -> Result<(), CodecError> {
    if kind.has_live_choice(id) {
        Ok(())
    } else {
        Err(CodecError::UnknownChoice(id))
    }
}
