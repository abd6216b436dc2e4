//! @acp:module "Poll Conditions"
//! @acp:summary "Applicability of reply lines from their cross-line conditions"
//! @acp:domain poll
//! @acp:layer service

use std::collections::HashMap;

use tracing::warn;

use super::codec::{decode, decode_condition, matches};
use super::types::{CombineMode, LineId, Reply, ReplyLine, ReplyLineCondition};

/// Live applicability of every line of a reply, keyed by line id.
///
/// Lines are evaluated in ascending order so each condition source is
/// already resolved when its dependents are reached.
pub fn evaluate_reply(reply: &Reply) -> HashMap<LineId, bool> {
    let mut applicability = HashMap::with_capacity(reply.lines.len());
    for line in &reply.lines {
        let applicable = evaluate_line(reply, line, &applicability);
        applicability.insert(line.id, applicable);
    }
    applicability
}

/// Whether the conditions of `line` hold.
///
/// `earlier` holds the live applicability of lines preceding `line`; a
/// source missing from it counts as inapplicable.
pub fn evaluate_line(reply: &Reply, line: &ReplyLine, earlier: &HashMap<LineId, bool>) -> bool {
    if line.kind.is_comment() || line.conditions.is_empty() {
        return true;
    }

    let mut results = line
        .conditions
        .iter()
        .map(|condition| evaluate_condition(reply, line, condition, earlier));

    match line.combine {
        CombineMode::And => results.all(|met| met),
        CombineMode::Or => results.any(|met| met),
    }
}

/// Evaluate one condition. An unanswered or inapplicable source never
/// satisfies a condition.
pub fn evaluate_condition(
    reply: &Reply,
    line: &ReplyLine,
    condition: &ReplyLineCondition,
    earlier: &HashMap<LineId, bool>,
) -> bool {
    let Some(source) = reply.line(condition.source) else {
        warn!(
            "Reply {} line {} has a condition on unknown line {}",
            reply.id, line.id, condition.source
        );
        return false;
    };

    if source.order >= line.order {
        warn!(
            "Reply {} line {} has a condition on later line {}",
            reply.id, line.id, source.id
        );
        return false;
    }

    if !earlier.get(&source.id).copied().unwrap_or(false) || !source.applicable {
        return false;
    }

    let Some(ref raw) = source.raw_answer else {
        return false;
    };

    let answer = match decode(&source.kind, raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Reply {} line {}: undecodable answer: {}", reply.id, source.id, e);
            return false;
        }
    };

    match decode_condition(&source.kind, &condition.raw_answer) {
        Ok(reference) => matches(condition.operator, &answer, &reference),
        Err(e) => {
            warn!(
                "Reply {} line {}: undecodable condition value: {}",
                reply.id, line.id, e
            );
            false
        }
    }
}
