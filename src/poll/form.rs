//! @acp:module "Poll Form Validation"
//! @acp:summary "Structural checks on form definitions"
//! @acp:domain poll
//! @acp:layer service

use std::collections::{HashMap, HashSet};

use super::codec::decode_condition;
use super::types::{Form, FormLine, SectionId};
use super::PollError;

/// Check the structural invariants of a form.
///
/// Conditions may only reference enabled, non-comment lines with a
/// strictly lower order, which keeps the condition graph acyclic.
pub fn validate_form(form: &Form) -> Result<(), PollError> {
    let invalid = |reason: String| Err(PollError::InvalidForm(reason));

    let mut line_ids = HashSet::new();
    for line in &form.lines {
        if !line_ids.insert(line.id) {
            return invalid(format!("duplicate line id {}", line.id));
        }
    }

    let mut orders = HashSet::new();
    for line in form.lines.iter().filter(|l| !l.disabled) {
        if !orders.insert(line.order) {
            return invalid(format!("duplicate line order {}", line.order));
        }
    }

    validate_sections(form)?;

    let lines: HashMap<_, &FormLine> = form.lines.iter().map(|l| (l.id, l)).collect();
    for line in form.lines.iter().filter(|l| !l.disabled) {
        if let Some(section) = line.section {
            if !form.sections.iter().any(|s| s.id == section) {
                return invalid(format!("line {} is in unknown section {}", line.id, section));
            }
        }

        for condition in &line.conditions {
            let Some(source) = lines.get(&condition.source) else {
                return invalid(format!(
                    "line {} has a condition on unknown line {}",
                    line.id, condition.source
                ));
            };
            if source.disabled {
                return invalid(format!(
                    "line {} has a condition on disabled line {}",
                    line.id, source.id
                ));
            }
            if source.order >= line.order {
                return invalid(format!(
                    "line {} has a condition on line {} which is not an earlier line",
                    line.id, source.id
                ));
            }
            if let Err(e) = decode_condition(&source.kind, &condition.raw_answer) {
                return invalid(format!(
                    "line {} has an invalid condition value on line {}: {}",
                    line.id, source.id, e
                ));
            }
        }
    }

    Ok(())
}

fn validate_sections(form: &Form) -> Result<(), PollError> {
    let parents: HashMap<SectionId, Option<SectionId>> =
        form.sections.iter().map(|s| (s.id, s.parent)).collect();

    if parents.len() != form.sections.len() {
        return Err(PollError::InvalidForm("duplicate section id".to_string()));
    }

    for section in &form.sections {
        let mut current = section.parent;
        let mut steps = 0;
        while let Some(parent) = current {
            let Some(grand_parent) = parents.get(&parent) else {
                return Err(PollError::InvalidForm(format!(
                    "section {} has unknown parent {}",
                    section.id, parent
                )));
            };
            steps += 1;
            if parent == section.id || steps > parents.len() {
                return Err(PollError::InvalidForm(format!(
                    "section {} is its own ancestor",
                    section.id
                )));
            }
            current = *grand_parent;
        }
    }

    Ok(())
}
