//! @acp:module "Poll Section Tree"
//! @acp:summary "Flattened depth-first section/line trees for forms and replies"
//! @acp:domain poll
//! @acp:layer service
//!
//! The tree is assembled in memory from two flat collections (sections
//! and lines) linked by parent and section ids; nothing is fetched per
//! level.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use super::types::{Form, FormLine, FormSection, Reply, ReplyLine, ReplySection, SectionId};

/// Section as seen by the tree builder
pub trait TreeSection {
    fn id(&self) -> SectionId;
    fn parent(&self) -> Option<SectionId>;
    fn order(&self) -> u32;
}

/// Line as seen by the tree builder
pub trait TreeLine {
    fn section(&self) -> Option<SectionId>;
    fn order(&self) -> u32;
    fn is_comment(&self) -> bool;
}

macro_rules! impl_tree_section {
    ($ty:ty) => {
        impl TreeSection for $ty {
            fn id(&self) -> SectionId {
                self.id
            }
            fn parent(&self) -> Option<SectionId> {
                self.parent
            }
            fn order(&self) -> u32 {
                self.order
            }
        }
    };
}

macro_rules! impl_tree_line {
    ($ty:ty) => {
        impl TreeLine for $ty {
            fn section(&self) -> Option<SectionId> {
                self.section
            }
            fn order(&self) -> u32 {
                self.order
            }
            fn is_comment(&self) -> bool {
                self.kind.is_comment()
            }
        }
    };
}

impl_tree_section!(FormSection);
impl_tree_section!(ReplySection);
impl_tree_line!(FormLine);
impl_tree_line!(ReplyLine);

/// One entry of a flattened tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode<S, L> {
    Section {
        deep: usize,
        section: S,
    },
    Line {
        deep: usize,
        /// Question number, `None` for comment lines
        number: Option<usize>,
        line: L,
    },
}

impl<S, L> TreeNode<S, L> {
    pub fn deep(&self) -> usize {
        match self {
            Self::Section { deep, .. } | Self::Line { deep, .. } => *deep,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Self::Section { .. })
    }

    pub fn line(&self) -> Option<&L> {
        match self {
            Self::Line { line, .. } => Some(line),
            Self::Section { .. } => None,
        }
    }

    /// Replace the line payload, keeping position and numbering
    pub fn map_line<M>(self, f: impl FnOnce(L) -> M) -> TreeNode<S, M> {
        match self {
            Self::Section { deep, section } => TreeNode::Section { deep, section },
            Self::Line { deep, number, line } => TreeNode::Line {
                deep,
                number,
                line: f(line),
            },
        }
    }
}

/// Tree of a reply: its sections and all its lines
pub fn build_reply_tree(reply: &Reply) -> Vec<TreeNode<&ReplySection, &ReplyLine>> {
    build_tree(&reply.sections, &reply.lines)
}

/// Tree of a form definition, enabled lines only
pub fn build_form_tree(form: &Form) -> Vec<TreeNode<&FormSection, &FormLine>> {
    build_tree(&form.sections, form.lines.iter().filter(|l| !l.disabled))
}

/// Flatten sections and lines depth-first.
///
/// Within a parent, lines come first (by order), then child sections
/// (by order), each followed by its own content. Root lines have depth
/// 0, a section's lines and children have the section depth plus one.
pub fn build_tree<'a, S, L>(
    sections: &'a [S],
    lines: impl IntoIterator<Item = &'a L>,
) -> Vec<TreeNode<&'a S, &'a L>>
where
    S: TreeSection,
    L: TreeLine + 'a,
{
    let known: HashSet<SectionId> = sections.iter().map(|s| s.id()).collect();

    let mut children: HashMap<Option<SectionId>, Vec<&'a S>> = HashMap::new();
    for section in sections {
        let parent = match section.parent() {
            Some(p) if known.contains(&p) && p != section.id() => Some(p),
            Some(p) => {
                warn!("Section {} has unknown parent {}, placed at root", section.id(), p);
                None
            }
            None => None,
        };
        children.entry(parent).or_default().push(section);
    }
    for list in children.values_mut() {
        list.sort_by_key(|s| (s.order(), s.id()));
    }

    let mut lines_by_section: HashMap<Option<SectionId>, Vec<&'a L>> = HashMap::new();
    let mut line_count = 0;
    for line in lines {
        let section = line.section().filter(|s| known.contains(s));
        lines_by_section.entry(section).or_default().push(line);
        line_count += 1;
    }
    for list in lines_by_section.values_mut() {
        list.sort_by_key(|l| l.order());
    }

    let mut builder = Builder {
        children,
        lines: lines_by_section,
        visited: HashSet::new(),
        nodes: Vec::with_capacity(sections.len() + line_count),
        number: 0,
    };
    builder.walk(None, 0);

    if builder.visited.len() < sections.len() {
        warn!(
            "{} section(s) unreachable from the root were left out",
            sections.len() - builder.visited.len()
        );
    }

    builder.nodes
}

struct Builder<'a, S, L> {
    children: HashMap<Option<SectionId>, Vec<&'a S>>,
    lines: HashMap<Option<SectionId>, Vec<&'a L>>,
    visited: HashSet<SectionId>,
    nodes: Vec<TreeNode<&'a S, &'a L>>,
    number: usize,
}

impl<'a, S: TreeSection, L: TreeLine> Builder<'a, S, L> {
    fn walk(&mut self, parent: Option<SectionId>, deep: usize) {
        if let Some(lines) = self.lines.remove(&parent) {
            for line in lines {
                let number = if line.is_comment() {
                    None
                } else {
                    self.number += 1;
                    Some(self.number)
                };
                self.nodes.push(TreeNode::Line { deep, number, line });
            }
        }

        let Some(children) = self.children.remove(&parent) else {
            return;
        };
        for section in children {
            if !self.visited.insert(section.id()) {
                continue;
            }
            self.nodes.push(TreeNode::Section { deep, section });
            self.walk(Some(section.id()), deep + 1);
        }
    }
}
