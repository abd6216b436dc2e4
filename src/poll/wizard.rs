//! @acp:module "Poll Wizard"
//! @acp:summary "Step-by-step answering with cascading invalidation"
//! @acp:domain poll
//! @acp:layer service
//!
//! The wizard keeps no cursor: the next question is always recomputed
//! from the stored line state, so edits anywhere in the reply are
//! picked up by the following step.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use super::codec::parse_answer;
use super::conditions::{evaluate_line, evaluate_reply};
use super::settings::PollSettings;
use super::types::{AnswerOutcome, LineId, LineState, Reply, ReplyLine, ReplyProgress};
use super::PollError;

/// Answer submitted for a line
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerInput {
    /// UI token, validated by the codec of the line type
    Value(Value),
    /// The respondent marks the line "not applicable"
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Step,
    Edit,
}

/// Derived state of one line given its live applicability
pub fn line_state(line: &ReplyLine, live_applicable: bool) -> LineState {
    if line.kind.is_comment() {
        LineState::Answered
    } else if !live_applicable {
        LineState::NotApplicable
    } else if !line.applicable {
        LineState::SkippedByUser
    } else if line.is_answered() {
        LineState::Answered
    } else {
        LineState::Pending
    }
}

/// State of every line, in line order
pub fn line_states(reply: &Reply) -> Vec<(LineId, LineState)> {
    let applicability = evaluate_reply(reply);
    reply
        .lines
        .iter()
        .map(|line| (line.id, state_of(line, &applicability)))
        .collect()
}

fn state_of(line: &ReplyLine, applicability: &HashMap<LineId, bool>) -> LineState {
    line_state(line, applicability.get(&line.id).copied().unwrap_or(true))
}

/// First applicable, unanswered line in ascending order
pub fn next_question(reply: &Reply) -> Option<&ReplyLine> {
    let applicability = evaluate_reply(reply);
    reply
        .lines
        .iter()
        .find(|line| state_of(line, &applicability) == LineState::Pending)
}

/// Recompute and store the completion flag
pub fn refresh_completion(reply: &mut Reply) -> bool {
    let complete = next_question(reply).is_none();
    reply.is_complete = complete;
    complete
}

pub fn progress(reply: &Reply) -> ReplyProgress {
    let mut progress = ReplyProgress::default();
    for (_, state) in line_states(reply) {
        match state {
            LineState::Answered => progress.answered += 1,
            LineState::SkippedByUser => progress.skipped += 1,
            LineState::NotApplicable => progress.not_applicable += 1,
            LineState::Pending => progress.pending += 1,
        }
    }
    progress
}

/// Answer a pending line (wizard step)
pub fn answer(
    reply: &mut Reply,
    line_id: LineId,
    input: AnswerInput,
    settings: &PollSettings,
) -> Result<AnswerOutcome, PollError> {
    apply(reply, line_id, input, settings, Mode::Step)
}

/// Change the answer of any applicable line, answered or not
pub fn edit_answer(
    reply: &mut Reply,
    line_id: LineId,
    input: AnswerInput,
    settings: &PollSettings,
) -> Result<AnswerOutcome, PollError> {
    apply(reply, line_id, input, settings, Mode::Edit)
}

/// Clear every answer. Idempotent.
pub fn reset(reply: &mut Reply) {
    for line in &mut reply.lines {
        line.clear();
    }
    refresh_completion(reply);
    debug!("Reset reply {}", reply.id);
}

fn apply(
    reply: &mut Reply,
    line_id: LineId,
    input: AnswerInput,
    settings: &PollSettings,
    mode: Mode,
) -> Result<AnswerOutcome, PollError> {
    let index = reply
        .line_index(line_id)
        .ok_or(PollError::UnknownLine(line_id))?;
    let before = evaluate_reply(reply);

    // Validate everything before the first write
    let line = &reply.lines[index];
    if line.kind.is_comment() {
        return Err(PollError::NotAnswerable(line_id));
    }
    let state = state_of(line, &before);
    match (state, mode) {
        (LineState::NotApplicable, _) => return Err(PollError::LineNotApplicable(line_id)),
        (LineState::Answered | LineState::SkippedByUser, Mode::Step) => {
            return Err(PollError::AlreadyAnswered(line_id))
        }
        _ => {}
    }

    let (raw_answer, applicable) = match input {
        AnswerInput::NotApplicable => (None, false),
        AnswerInput::Value(ref payload) => {
            let value = parse_answer(&line.kind, payload, settings)
                .map_err(|e| PollError::from_codec(line, e))?;
            (Some(value.encode()), true)
        }
    };

    let line = &mut reply.lines[index];
    line.raw_answer = raw_answer;
    line.applicable = applicable;

    let mut updated_lines = vec![line_id];
    cascade(reply, index, &before, &mut updated_lines);
    let is_complete = refresh_completion(reply);

    debug!(
        "Reply {} line {} updated ({} lines touched, complete: {})",
        reply.id,
        line_id,
        updated_lines.len(),
        is_complete
    );

    Ok(AnswerOutcome {
        updated_lines,
        is_complete,
    })
}

/// Forward sweep after the line at `from` changed.
///
/// Conditions only reference earlier lines, so one ascending pass sees
/// every source in its final state. A dependent line whose applicability
/// flips is marked changed; if it became inapplicable its answer (or
/// user skip) is cleared.
fn cascade(
    reply: &mut Reply,
    from: usize,
    before: &HashMap<LineId, bool>,
    updated: &mut Vec<LineId>,
) {
    let mut changed: HashSet<LineId> = HashSet::from([reply.lines[from].id]);
    let mut after: HashMap<LineId, bool> = reply.lines[..=from]
        .iter()
        .map(|l| (l.id, before.get(&l.id).copied().unwrap_or(true)))
        .collect();

    for index in from + 1..reply.lines.len() {
        let line = &reply.lines[index];
        let id = line.id;
        let was = before.get(&id).copied().unwrap_or(true);

        if !line.conditions.iter().any(|c| changed.contains(&c.source)) {
            after.insert(id, was);
            continue;
        }

        let now = evaluate_line(reply, line, &after);
        let holds_state = line.is_answered() || !line.applicable;
        after.insert(id, now);

        if now != was {
            changed.insert(id);
            updated.push(id);
        }

        if !now && holds_state {
            reply.lines[index].clear();
            if changed.insert(id) {
                updated.push(id);
            }
            debug!("Reply {} line {} invalidated by cascade", reply.id, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::cloner::clone_reply;
    use crate::poll::fixtures::{form_line, form_with, form_with_condition, swallow_form};
    use crate::poll::types::{LineKind, ReplyContext};
    use serde_json::json;

    fn settings() -> PollSettings {
        PollSettings::default()
    }

    fn value(v: Value) -> AnswerInput {
        AnswerInput::Value(v)
    }

    fn swallow_reply() -> Reply {
        clone_reply(&swallow_form(), 1, &ReplyContext::default()).unwrap()
    }

    #[test]
    fn test_swallow_scenario() {
        let mut reply = swallow_reply();
        let a = reply.lines[0].id;
        let b = reply.lines[1].id;

        assert_eq!(next_question(&reply).map(|l| l.id), Some(a));

        let outcome = answer(&mut reply, a, value(json!(true)), &settings()).unwrap();
        assert!(!outcome.is_complete);
        assert_eq!(next_question(&reply).map(|l| l.id), Some(b));

        let outcome = answer(&mut reply, b, value(json!("Great birds")), &settings()).unwrap();
        assert!(outcome.is_complete);
        assert!(reply.is_complete);
        assert!(next_question(&reply).is_none());

        // B becomes inapplicable: its answer is dropped, nothing is pending
        let outcome = edit_answer(&mut reply, a, value(json!(false)), &settings()).unwrap();
        assert_eq!(outcome.updated_lines, vec![a, b]);
        assert_eq!(reply.lines[1].raw_answer, None);
        assert!(next_question(&reply).is_none());
        assert!(reply.is_complete);
        assert_eq!(
            line_states(&reply),
            vec![(a, LineState::Answered), (b, LineState::NotApplicable)]
        );
    }

    #[test]
    fn test_answer_inapplicable_line() {
        let mut reply = swallow_reply();
        let b = reply.lines[1].id;
        assert_eq!(
            answer(&mut reply, b, value(json!("Too early")), &settings()),
            Err(PollError::LineNotApplicable(b))
        );
    }

    #[test]
    fn test_answer_required_leaves_reply_unchanged() {
        let mut reply = swallow_reply();
        let a = reply.lines[0].id;
        answer(&mut reply, a, value(json!(true)), &settings()).unwrap();
        let b = reply.lines[1].id;

        let snapshot = reply.clone();
        assert_eq!(
            answer(&mut reply, b, value(json!("")), &settings()),
            Err(PollError::AnswerRequired(b))
        );
        assert_eq!(reply, snapshot);
    }

    #[test]
    fn test_answer_twice_needs_edit() {
        let mut reply = swallow_reply();
        let a = reply.lines[0].id;
        answer(&mut reply, a, value(json!(true)), &settings()).unwrap();
        assert_eq!(
            answer(&mut reply, a, value(json!(false)), &settings()),
            Err(PollError::AlreadyAnswered(a))
        );
        assert!(edit_answer(&mut reply, a, value(json!(false)), &settings()).is_ok());
    }

    #[test]
    fn test_not_applicable_override() {
        let mut reply = swallow_reply();
        let a = reply.lines[0].id;
        let outcome = answer(&mut reply, a, AnswerInput::NotApplicable, &settings()).unwrap();

        // B depends on an inapplicable source, so nothing remains
        assert!(outcome.is_complete);
        assert_eq!(reply.lines[0].raw_answer, None);
        assert!(!reply.lines[0].applicable);
        assert_eq!(line_states(&reply)[0].1, LineState::SkippedByUser);
    }

    #[test]
    fn test_comment_lines_are_not_answerable() {
        let form = form_with(vec![form_line(1, LineKind::Comment), form_line(2, LineKind::Bool)]);
        let mut reply = clone_reply(&form, 1, &ReplyContext::default()).unwrap();
        let comment = reply.lines[0].id;

        assert_eq!(next_question(&reply).map(|l| l.id), Some(reply.lines[1].id));
        assert_eq!(
            answer(&mut reply, comment, value(json!("x")), &settings()),
            Err(PollError::NotAnswerable(comment))
        );
    }

    #[test]
    fn test_transitive_cascade() {
        // 1 -> 2 -> 3 chain of BOOL conditions
        let form = form_with(vec![
            form_line(1, LineKind::Bool),
            form_with_condition(form_line(2, LineKind::Bool), 1, "1"),
            form_with_condition(form_line(3, LineKind::String), 2, "1"),
            form_line(4, LineKind::Text),
        ]);
        let mut reply = clone_reply(&form, 1, &ReplyContext::default()).unwrap();

        for (id, token) in [(1, json!(true)), (2, json!(true)), (3, json!("x")), (4, json!(""))] {
            answer(&mut reply, id, value(token), &settings()).unwrap();
        }
        assert!(reply.is_complete);

        let outcome = edit_answer(&mut reply, 1, value(json!(false)), &settings()).unwrap();
        assert_eq!(outcome.updated_lines, vec![1, 2, 3]);
        assert_eq!(reply.lines[1].raw_answer, None);
        assert_eq!(reply.lines[2].raw_answer, None);
        assert!(reply.lines[3].raw_answer.is_some());
        assert!(outcome.is_complete);

        // Flipping back re-opens the chain one step at a time
        let outcome = edit_answer(&mut reply, 1, value(json!(true)), &settings()).unwrap();
        assert_eq!(outcome.updated_lines, vec![1, 2]);
        assert!(!outcome.is_complete);
        assert_eq!(next_question(&reply).map(|l| l.id), Some(2));
    }

    #[test]
    fn test_cascade_clears_user_skip() {
        let mut reply = swallow_reply();
        answer(&mut reply, 1, value(json!(true)), &settings()).unwrap();
        answer(&mut reply, 2, AnswerInput::NotApplicable, &settings()).unwrap();
        assert_eq!(line_states(&reply)[1].1, LineState::SkippedByUser);

        let outcome = edit_answer(&mut reply, 1, value(json!(false)), &settings()).unwrap();
        assert_eq!(outcome.updated_lines, vec![1, 2]);
        assert_eq!(reply.lines[1].raw_answer, None);
        assert!(reply.lines[1].applicable);
        assert_eq!(line_states(&reply)[1].1, LineState::NotApplicable);

        // The skip does not survive: the line is asked again
        let outcome = edit_answer(&mut reply, 1, value(json!(true)), &settings()).unwrap();
        assert_eq!(outcome.updated_lines, vec![1, 2]);
        assert!(!outcome.is_complete);
        assert_eq!(next_question(&reply).map(|l| l.id), Some(2));
    }

    #[test]
    fn test_edit_keeping_applicability_keeps_dependents() {
        let form = form_with(vec![
            form_line(1, LineKind::Int {
                lower_bound: None,
                upper_bound: None,
            }),
            form_with_condition(form_line(2, LineKind::String), 1, "5"),
        ]);
        let mut reply = clone_reply(&form, 1, &ReplyContext::default()).unwrap();
        answer(&mut reply, 1, value(json!(5)), &settings()).unwrap();
        answer(&mut reply, 2, value(json!("five")), &settings()).unwrap();

        let outcome = edit_answer(&mut reply, 1, value(json!("5")), &settings()).unwrap();
        assert_eq!(outcome.updated_lines, vec![1]);
        assert!(reply.lines[1].raw_answer.is_some());
    }

    #[test]
    fn test_append_only_answering_completes() {
        let form = form_with(vec![
            form_line(1, LineKind::Bool),
            form_with_condition(form_line(2, LineKind::String), 1, "0"),
            form_line(3, LineKind::Hour),
            form_line(4, LineKind::Date),
        ]);
        let mut reply = clone_reply(&form, 1, &ReplyContext::default()).unwrap();

        let mut steps = 0;
        while let Some(line) = next_question(&reply) {
            let token = match line.kind {
                LineKind::Bool => json!(true),
                LineKind::Hour => json!(12),
                LineKind::Date => json!("2024-05-01"),
                _ => json!("text"),
            };
            let id = line.id;
            answer(&mut reply, id, value(token), &settings()).unwrap();
            steps += 1;
        }

        // line 2 is skipped by its condition
        assert_eq!(steps, 3);
        assert!(reply.is_complete);
        assert_eq!(progress(&reply).not_applicable, 1);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut reply = swallow_reply();
        answer(&mut reply, 1, value(json!(true)), &settings()).unwrap();
        answer(&mut reply, 2, AnswerInput::NotApplicable, &settings()).unwrap();
        assert!(reply.is_complete);

        reset(&mut reply);
        let once = reply.clone();
        reset(&mut reply);
        assert_eq!(reply, once);
        assert!(!reply.is_complete);
        assert!(reply.lines.iter().all(|l| l.raw_answer.is_none() && l.applicable));
    }

    #[test]
    fn test_unknown_line() {
        let mut reply = swallow_reply();
        assert_eq!(
            edit_answer(&mut reply, 99, value(json!(true)), &settings()),
            Err(PollError::UnknownLine(99))
        );
    }
}
