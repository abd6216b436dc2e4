//! @acp:module "Poll Reply Cloner"
//! @acp:summary "Deep copy of a form definition into independent replies"
//! @acp:domain poll
//! @acp:layer service

use std::collections::HashMap;

use tracing::debug;

use super::form::validate_form;
use super::types::{
    Form, LineId, Reply, ReplyContext, ReplyId, ReplyLine, ReplyLineCondition, ReplySection,
    SectionId,
};
use super::wizard::refresh_completion;
use super::PollError;

/// Create a reply from a form.
///
/// Sections and enabled lines are copied into fresh, reply-local ids;
/// conditions are re-pointed to the copied lines through an id map.
/// Nothing is produced unless the whole form is valid.
pub fn clone_reply(form: &Form, id: ReplyId, context: &ReplyContext) -> Result<Reply, PollError> {
    let enabled = form.enabled_lines();
    if enabled.is_empty() {
        return Err(PollError::EmptyForm(form.id));
    }
    validate_form(form)?;

    // Sections: assign ids first so parents can be resolved in any order
    let mut form_sections: Vec<_> = form.sections.iter().collect();
    form_sections.sort_by_key(|s| (s.order, s.id));

    let section_ids: HashMap<SectionId, SectionId> = form_sections
        .iter()
        .zip(1..)
        .map(|(section, new_id)| (section.id, new_id))
        .collect();

    let sections = form_sections
        .iter()
        .map(|section| ReplySection {
            id: section_ids[&section.id],
            parent: section.parent.and_then(|p| section_ids.get(&p).copied()),
            order: section.order,
            name: section.name.clone(),
            body: section.body.clone(),
        })
        .collect();

    let line_ids: HashMap<LineId, LineId> = enabled
        .iter()
        .zip(1..)
        .map(|(line, new_id)| (line.id, new_id))
        .collect();

    let mut lines = Vec::with_capacity(enabled.len());
    for line in &enabled {
        let conditions = line
            .conditions
            .iter()
            .map(|condition| {
                let source = line_ids.get(&condition.source).copied().ok_or_else(|| {
                    PollError::InvalidForm(format!(
                        "line {} has a condition on a line that is not cloned",
                        line.id
                    ))
                })?;
                Ok(ReplyLineCondition {
                    source,
                    operator: condition.operator,
                    raw_answer: condition.raw_answer.clone(),
                })
            })
            .collect::<Result<Vec<_>, PollError>>()?;

        lines.push(ReplyLine {
            id: line_ids[&line.id],
            form_line: Some(line.id),
            section: line.section.and_then(|s| section_ids.get(&s).copied()),
            order: line.order,
            question: line.question.clone(),
            kind: line.kind.without_deleted_choices(),
            combine: line.combine,
            conditions,
            raw_answer: None,
            applicable: true,
        });
    }

    let mut reply = Reply {
        id,
        name: context.name.clone(),
        form: form.id,
        person: context.person.clone(),
        campaign: context.campaign,
        is_complete: false,
        sections,
        lines,
    };

    // Only comment-only forms start complete
    refresh_completion(&mut reply);

    debug!(
        "Cloned form {} into reply {} ({} lines, {} sections)",
        form.id,
        reply.id,
        reply.lines.len(),
        reply.sections.len()
    );

    Ok(reply)
}

/// Create `count` independent replies with consecutive ids.
///
/// Names get a `#n` suffix when more than one reply is created.
pub fn clone_many(
    form: &Form,
    first_id: ReplyId,
    count: usize,
    context: &ReplyContext,
) -> Result<Vec<Reply>, PollError> {
    (0..count)
        .map(|i| {
            let name = if count > 1 {
                format!("{}#{}", context.name, i + 1)
            } else {
                context.name.clone()
            };
            let context = ReplyContext {
                name,
                ..context.clone()
            };
            clone_reply(form, first_id + i as ReplyId, &context)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::fixtures::{colors_form, form_line, form_with, section, swallow_form};
    use crate::poll::types::{Choice, LineKind};

    fn context() -> ReplyContext {
        ReplyContext {
            name: "Reply".to_string(),
            person: Some("Spike".to_string()),
            campaign: None,
        }
    }

    #[test]
    fn test_clone_remaps_conditions() {
        let mut form = swallow_form();
        // Form ids far from reply-local ids
        form.lines[0].id = 100;
        form.lines[1].id = 200;
        form.lines[1].conditions[0].source = 100;

        let reply = clone_reply(&form, 7, &context()).unwrap();
        assert_eq!(reply.id, 7);
        assert_eq!(reply.form, form.id);
        assert_eq!(reply.person.as_deref(), Some("Spike"));
        assert!(!reply.is_complete);

        let ids: Vec<_> = reply.lines.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(reply.lines[1].conditions[0].source, 1);
        assert_eq!(reply.lines[0].form_line, Some(100));
    }

    #[test]
    fn test_clone_skips_disabled_lines() {
        let mut form = form_with(vec![
            form_line(1, LineKind::Bool),
            form_line(2, LineKind::String),
            form_line(3, LineKind::Date),
        ]);
        form.lines[1].disabled = true;

        let reply = clone_reply(&form, 1, &context()).unwrap();
        let origins: Vec<_> = reply.lines.iter().map(|l| l.form_line).collect();
        assert_eq!(origins, vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_clone_empty_form() {
        let mut form = form_with(vec![form_line(1, LineKind::Bool)]);
        form.lines[0].disabled = true;
        assert_eq!(
            clone_reply(&form, 1, &context()),
            Err(PollError::EmptyForm(form.id))
        );
    }

    #[test]
    fn test_clone_drops_deleted_choices() {
        let mut form = colors_form();
        if let LineKind::EnumOrString {
            deleted_choices, ..
        } = &mut form.lines[0].kind
        {
            deleted_choices.push(Choice::new(3, "Grey"));
        }

        let reply = clone_reply(&form, 1, &context()).unwrap();
        assert_eq!(reply.lines[0].kind.choices().len(), 2);
        assert!(reply.lines[0].kind.deleted_choices().is_empty());
    }

    #[test]
    fn test_clone_sections_keep_nesting() {
        let mut form = form_with(vec![form_line(1, LineKind::Bool), form_line(2, LineKind::Bool)]);
        // child listed before its parent
        form.sections = vec![section(20, Some(10), 1), section(10, None, 2)];
        form.lines[1].section = Some(20);

        let reply = clone_reply(&form, 1, &context()).unwrap();
        let child = reply.sections.iter().find(|s| s.order == 1).unwrap();
        let parent = reply.sections.iter().find(|s| s.order == 2).unwrap();
        assert_eq!(child.parent, Some(parent.id));
        assert_eq!(reply.lines[1].section, Some(child.id));
    }

    #[test]
    fn test_comment_only_form_is_complete() {
        let form = form_with(vec![form_line(1, LineKind::Comment)]);
        let reply = clone_reply(&form, 1, &context()).unwrap();
        assert!(reply.is_complete);
    }

    #[test]
    fn test_clone_independence() {
        let mut form = swallow_form();
        let mut reply = clone_reply(&form, 1, &context()).unwrap();
        let snapshot = form.clone();

        reply.lines[0].raw_answer = Some("1".to_string());
        reply.lines[1].question = "Changed".to_string();
        assert_eq!(form, snapshot);

        let before = reply.clone();
        form.lines[1].question = "Edited later".to_string();
        form.lines[1].conditions.clear();
        assert_eq!(reply, before);
    }

    #[test]
    fn test_clone_many_names() {
        let form = swallow_form();
        let replies = clone_many(&form, 10, 3, &context()).unwrap();
        let names: Vec<_> = replies.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Reply#1", "Reply#2", "Reply#3"]);
        let ids: Vec<_> = replies.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 11, 12]);

        let single = clone_many(&form, 1, 1, &context()).unwrap();
        assert_eq!(single[0].name, "Reply");
    }
}
