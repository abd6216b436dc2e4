//! @acp:module "Poll"
//! @acp:summary "Conditional questionnaire reply engine"
//! @acp:domain poll
//! @acp:layer service
//!
//! # Poll Engine
//!
//! A form (ordered questions grouped into nested sections) is cloned into
//! independent replies, which are filled in step by step:
//!
//! - **Conditions**: a line is applicable only when its conditions on
//!   earlier answers hold (combined with AND or OR)
//! - **Wizard**: the next question is recomputed from the stored answers
//!   on every step; editing an answer cascades invalidation downstream
//! - **Trees**: sections and lines flattened depth-first for display
//! - **Stats**: per-line answer buckets across all replies of a form

pub mod cloner;
pub mod codec;
pub mod conditions;
pub mod form;
pub mod rendering;
pub mod settings;
pub mod stats;
pub mod tree;
pub mod types;
pub mod wizard;

use thiserror::Error;

use codec::CodecError;
use settings::PollSettings;
use stats::StatsNode;
use tree::TreeNode;
use types::{
    AnswerOutcome, Form, FormId, LineId, Reply, ReplyContext, ReplyId, ReplyLine, ReplyProgress,
    ReplySection,
};
use wizard::AnswerInput;

pub use rendering::{OutputFormat, PollRenderer};

/// Engine entry point, holding the settings every operation needs
#[derive(Debug, Clone, Default)]
pub struct PollEngine {
    settings: PollSettings,
}

impl PollEngine {
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Create one reply from a form
    pub fn clone_reply(
        &self,
        form: &Form,
        id: ReplyId,
        context: &ReplyContext,
    ) -> Result<Reply, PollError> {
        cloner::clone_reply(form, id, context)
    }

    /// Create `count` replies with consecutive ids starting at `first_id`
    pub fn clone_many(
        &self,
        form: &Form,
        first_id: ReplyId,
        count: usize,
        context: &ReplyContext,
    ) -> Result<Vec<Reply>, PollError> {
        cloner::clone_many(form, first_id, count, context)
    }

    pub fn next_question<'r>(&self, reply: &'r Reply) -> Option<&'r ReplyLine> {
        wizard::next_question(reply)
    }

    pub fn answer(
        &self,
        reply: &mut Reply,
        line: LineId,
        input: AnswerInput,
    ) -> Result<AnswerOutcome, PollError> {
        wizard::answer(reply, line, input, &self.settings)
    }

    pub fn edit_answer(
        &self,
        reply: &mut Reply,
        line: LineId,
        input: AnswerInput,
    ) -> Result<AnswerOutcome, PollError> {
        wizard::edit_answer(reply, line, input, &self.settings)
    }

    pub fn reset(&self, reply: &mut Reply) {
        wizard::reset(reply)
    }

    pub fn progress(&self, reply: &Reply) -> ReplyProgress {
        wizard::progress(reply)
    }

    pub fn build_reply_tree<'r>(
        &self,
        reply: &'r Reply,
    ) -> Vec<TreeNode<&'r ReplySection, &'r ReplyLine>> {
        tree::build_reply_tree(reply)
    }

    pub fn build_stats_tree<'f>(&self, form: &'f Form, replies: &[Reply]) -> Vec<StatsNode<'f>> {
        stats::build_stats_tree(form, replies, &self.settings)
    }
}

/// Poll engine errors. Every error leaves the reply unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("form {0} has no enabled line")]
    EmptyForm(FormId),
    #[error("invalid answer for \"{field}\": {reason}")]
    ValidationFailed { field: String, reason: String },
    #[error("line {0} is not applicable")]
    LineNotApplicable(LineId),
    #[error("line {0} requires an answer")]
    AnswerRequired(LineId),
    #[error("unknown choice {choice} for line {line}")]
    UnknownChoice { line: LineId, choice: u32 },
    #[error("unknown line {0}")]
    UnknownLine(LineId),
    #[error("line {0} does not accept answers")]
    NotAnswerable(LineId),
    #[error("line {0} is already answered")]
    AlreadyAnswered(LineId),
    #[error("invalid form: {0}")]
    InvalidForm(String),
}

impl PollError {
    /// Attach line context to a codec failure
    pub fn from_codec(line: &ReplyLine, error: CodecError) -> Self {
        match error {
            CodecError::Required => Self::AnswerRequired(line.id),
            CodecError::UnknownChoice(choice) => Self::UnknownChoice {
                line: line.id,
                choice,
            },
            CodecError::Invalid(reason) => Self::ValidationFailed {
                field: line.question.clone(),
                reason,
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use fixtures::swallow_form;
    use serde_json::json;

    #[test]
    fn test_engine_round_trip() {
        let engine = PollEngine::default();
        let form = swallow_form();
        let mut reply = engine
            .clone_reply(&form, 1, &ReplyContext::default())
            .unwrap();

        while let Some(line) = engine.next_question(&reply) {
            let id = line.id;
            let token = if id == 1 { json!("yes") } else { json!("Fast") };
            engine
                .answer(&mut reply, id, AnswerInput::Value(token))
                .unwrap();
        }

        assert!(reply.is_complete);
        assert_eq!(engine.progress(&reply).answered, 2);
        assert_eq!(engine.build_reply_tree(&reply).len(), 2);

        let stats = engine.build_stats_tree(&form, std::slice::from_ref(&reply));
        assert_eq!(stats.len(), 2);

        engine.reset(&mut reply);
        assert_eq!(engine.progress(&reply).pending, 1);
    }

    #[test]
    fn test_codec_error_mapping() {
        let line = fixtures::line(4, types::LineKind::Bool);
        assert_eq!(
            PollError::from_codec(&line, CodecError::Required),
            PollError::AnswerRequired(4)
        );
        assert_eq!(
            PollError::from_codec(&line, CodecError::UnknownChoice(9)),
            PollError::UnknownChoice { line: 4, choice: 9 }
        );
        assert!(matches!(
            PollError::from_codec(&line, CodecError::Invalid("bad".to_string())),
            PollError::ValidationFailed { .. }
        ));
    }
}
