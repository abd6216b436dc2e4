//! @acp:module "Poll Types"
//! @acp:summary "Form definitions, replies and line types for the poll engine"
//! @acp:domain poll
//! @acp:layer model

use serde::{Deserialize, Serialize};

use super::settings::Labels;

pub type FormId = u64;
pub type ReplyId = u64;
pub type SectionId = u64;
pub type LineId = u64;

/// A selectable choice of an enum-like line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Stable identifier (never 0, which marks free text)
    pub id: u32,
    pub label: String,
}

impl Choice {
    pub fn new(id: u32, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

/// Question type with its type-specific parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKind {
    String,
    Text,
    Int {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower_bound: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper_bound: Option<i64>,
    },
    Bool,
    Date,
    Hour,
    Enum {
        choices: Vec<Choice>,
        /// Removed choices, kept so historical answers still have a label
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deleted_choices: Vec<Choice>,
    },
    MultiEnum {
        choices: Vec<Choice>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deleted_choices: Vec<Choice>,
    },
    EnumOrString {
        choices: Vec<Choice>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deleted_choices: Vec<Choice>,
    },
    Comment,
}

impl LineKind {
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::Comment)
    }

    /// Live choices (empty for non-choice types)
    pub fn choices(&self) -> &[Choice] {
        match self {
            Self::Enum { choices, .. }
            | Self::MultiEnum { choices, .. }
            | Self::EnumOrString { choices, .. } => choices,
            _ => &[],
        }
    }

    pub fn deleted_choices(&self) -> &[Choice] {
        match self {
            Self::Enum {
                deleted_choices, ..
            }
            | Self::MultiEnum {
                deleted_choices, ..
            }
            | Self::EnumOrString {
                deleted_choices, ..
            } => deleted_choices,
            _ => &[],
        }
    }

    /// Label of a choice, falling back to deleted choices
    pub fn choice_label(&self, id: u32) -> Option<&str> {
        self.choices()
            .iter()
            .chain(self.deleted_choices())
            .find(|c| c.id == id)
            .map(|c| c.label.as_str())
    }

    pub fn has_live_choice(&self, id: u32) -> bool {
        self.choices().iter().any(|c| c.id == id)
    }

    /// Copy of this type carrying only live choices
    pub fn without_deleted_choices(&self) -> Self {
        match self {
            Self::Enum { choices, .. } => Self::Enum {
                choices: choices.clone(),
                deleted_choices: Vec::new(),
            },
            Self::MultiEnum { choices, .. } => Self::MultiEnum {
                choices: choices.clone(),
                deleted_choices: Vec::new(),
            },
            Self::EnumOrString { choices, .. } => Self::EnumOrString {
                choices: choices.clone(),
                deleted_choices: Vec::new(),
            },
            other => other.clone(),
        }
    }

    /// Human readable description of the question type
    pub fn description(&self, labels: &Labels) -> String {
        let choice_list = |choices: &[Choice]| {
            choices
                .iter()
                .map(|c| c.label.as_str())
                .collect::<Vec<_>>()
                .join(" / ")
        };

        match self {
            Self::String => "String".to_string(),
            Self::Text => "Long text".to_string(),
            Self::Int {
                lower_bound,
                upper_bound,
            } => match (lower_bound, upper_bound) {
                (Some(lo), Some(hi)) => format!("Integer between {} and {}", lo, hi),
                (Some(lo), None) => format!("Integer greater than or equal to {}", lo),
                (None, Some(hi)) => format!("Integer less than or equal to {}", hi),
                (None, None) => "Integer".to_string(),
            },
            Self::Bool => format!("Boolean ({} / {})", labels.yes, labels.no),
            Self::Date => "Date".to_string(),
            Self::Hour => "Hour".to_string(),
            Self::Enum { choices, .. } => format!("Choice list ({})", choice_list(choices)),
            Self::MultiEnum { choices, .. } => {
                format!("Multiple choice list ({})", choice_list(choices))
            }
            Self::EnumOrString { choices, .. } => format!(
                "Choice list with free choice ({} / {})",
                choice_list(choices),
                labels.other
            ),
            Self::Comment => "Comment".to_string(),
        }
    }
}

/// How the conditions of a line are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    #[default]
    Equals,
}

/// Condition attached to a form line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormLineCondition {
    /// Earlier line of the same form whose answer is tested
    pub source: LineId,
    #[serde(default)]
    pub operator: ConditionOperator,
    /// Reference value, raw-encoded for the source type
    pub raw_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSection {
    pub id: SectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<SectionId>,
    pub order: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormLine {
    pub id: LineId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionId>,
    pub order: u32,
    pub question: String,
    pub kind: LineKind,
    /// Disabled lines are never cloned nor evaluated
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub combine: CombineMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<FormLineCondition>,
}

/// A questionnaire template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<FormSection>,
    #[serde(default)]
    pub lines: Vec<FormLine>,
}

impl Form {
    /// Enabled lines sorted by order
    pub fn enabled_lines(&self) -> Vec<&FormLine> {
        let mut lines: Vec<&FormLine> = self.lines.iter().filter(|l| !l.disabled).collect();
        lines.sort_by_key(|l| l.order);
        lines
    }
}

/// Condition copied into a reply; `source` points to a reply line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyLineCondition {
    pub source: LineId,
    #[serde(default)]
    pub operator: ConditionOperator,
    pub raw_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySection {
    pub id: SectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<SectionId>,
    pub order: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyLine {
    /// Identifier local to the reply
    pub id: LineId,
    /// Originating form line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_line: Option<LineId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionId>,
    pub order: u32,
    pub question: String,
    pub kind: LineKind,
    #[serde(default)]
    pub combine: CombineMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ReplyLineCondition>,
    /// Raw-encoded answer, `None` while unanswered
    #[serde(default)]
    pub raw_answer: Option<String>,
    /// False only when the respondent marked the line "not applicable"
    #[serde(default = "default_true")]
    pub applicable: bool,
}

fn default_true() -> bool {
    true
}

impl ReplyLine {
    pub fn is_answered(&self) -> bool {
        self.raw_answer.is_some()
    }

    /// Back to the unanswered state
    pub fn clear(&mut self) {
        self.raw_answer = None;
        self.applicable = true;
    }
}

/// One respondent's instantiation of a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    pub name: String,
    pub form: FormId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<u64>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub sections: Vec<ReplySection>,
    /// Lines in ascending order
    pub lines: Vec<ReplyLine>,
}

impl Reply {
    pub fn line(&self, id: LineId) -> Option<&ReplyLine> {
        self.lines.iter().find(|l| l.id == id)
    }

    pub fn line_index(&self, id: LineId) -> Option<usize> {
        self.lines.iter().position(|l| l.id == id)
    }
}

/// Caller-supplied context for reply creation; never interpreted by the engine
#[derive(Debug, Clone, Default)]
pub struct ReplyContext {
    pub name: String,
    pub person: Option<String>,
    pub campaign: Option<u64>,
}

/// Derived state of a reply line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    Pending,
    Answered,
    NotApplicable,
    SkippedByUser,
}

/// Result of an answer or edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    /// Answered line first, then invalidated lines in ascending order
    pub updated_lines: Vec<LineId>,
    pub is_complete: bool,
}

/// Line counts per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplyProgress {
    pub answered: usize,
    pub skipped: usize,
    pub not_applicable: usize,
    pub pending: usize,
}
