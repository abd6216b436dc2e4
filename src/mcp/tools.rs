//! @acp:module "MCP Tools"
//! @acp:summary "Poll tool parameter and response types"
//! @acp:domain daemon
//! @acp:layer service
//!
//! Parameter types derive `JsonSchema` so the tool list advertises their
//! input schema; response types are serialized as the tool text content.

use rmcp::schemars;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::poll::settings::Labels;
use crate::poll::types::{
    Choice, Form, FormId, LineId, LineKind, Reply, ReplyId, ReplyLine, ReplyProgress,
};
use crate::poll::wizard::AnswerInput;

// Tool parameter types
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateRepliesParams {
    /// Form to clone
    pub form_id: FormId,
    /// Number of replies to create (default: 1)
    #[serde(default = "default_count")]
    pub count: usize,
    /// Reply name (default: the form name)
    #[serde(default)]
    pub name: Option<String>,
    /// Respondent reference, stored as is
    #[serde(default)]
    pub person: Option<String>,
    /// Campaign reference, stored as is
    #[serde(default)]
    pub campaign: Option<u64>,
}

fn default_count() -> usize {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReplyParams {
    pub reply_id: ReplyId,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnswerParams {
    pub reply_id: ReplyId,
    pub line_id: LineId,
    /// Answer value: string, number, boolean, array of choice ids, or
    /// {"id": n} / {"text": "..."} for choice lists with free text
    #[serde(default)]
    pub value: serde_json::Value,
    /// Mark the line "not applicable" instead of answering it
    #[serde(default)]
    pub not_applicable: bool,
}

impl AnswerParams {
    pub fn input(&self) -> AnswerInput {
        if self.not_applicable {
            AnswerInput::NotApplicable
        } else {
            AnswerInput::Value(self.value.clone())
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenderReplyParams {
    pub reply_id: ReplyId,
    /// Output format: "markdown", "compact", or "json" (default: "markdown")
    #[serde(default = "default_format")]
    pub format: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FormStatsParams {
    pub form_id: FormId,
    /// Output format: "markdown", "compact", or "json" (default: "markdown")
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "markdown".to_string()
}

// Tool response types
#[derive(Debug, Serialize)]
pub struct FormSummary {
    pub id: FormId,
    pub name: String,
    pub description: String,
    pub question_count: usize,
    pub reply_count: usize,
    pub complete_reply_count: usize,
}

impl FormSummary {
    pub fn new<'r>(form: &Form, replies: impl Iterator<Item = &'r Reply>) -> Self {
        let (mut reply_count, mut complete_reply_count) = (0, 0);
        for reply in replies {
            reply_count += 1;
            if reply.is_complete {
                complete_reply_count += 1;
            }
        }
        Self {
            id: form.id,
            name: form.name.clone(),
            description: form.description.clone(),
            question_count: form
                .enabled_lines()
                .iter()
                .filter(|l| !l.kind.is_comment())
                .count(),
            reply_count,
            complete_reply_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedReply {
    pub id: ReplyId,
    pub name: String,
}

/// A question as presented to the respondent
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub line_id: LineId,
    pub question: String,
    /// Human description of the expected answer
    pub expects: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    pub free_text: bool,
    pub multiple: bool,
}

impl QuestionView {
    pub fn new(line: &ReplyLine, labels: &Labels) -> Self {
        Self {
            line_id: line.id,
            question: line.question.clone(),
            expects: line.kind.description(labels),
            choices: line.kind.choices().to_vec(),
            free_text: matches!(line.kind, LineKind::EnumOrString { .. }),
            multiple: matches!(line.kind, LineKind::MultiEnum { .. }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NextQuestionResponse {
    pub reply_id: ReplyId,
    pub is_complete: bool,
    pub progress: ReplyProgress,
    /// `None` once nothing is pending
    pub question: Option<QuestionView>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub reply_id: ReplyId,
    pub updated_lines: Vec<LineId>,
    pub is_complete: bool,
    pub next_question: Option<QuestionView>,
}

#[derive(Debug, Serialize)]
pub struct RenderedResponse {
    pub content: String,
    pub format: String,
}
