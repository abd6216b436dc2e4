//! @acp:module "Poll Rendering"
//! @acp:summary "Template rendering of reply trees and form statistics"
//! @acp:domain poll
//! @acp:layer service

use handlebars::Handlebars;
use serde_json::{json, Value};

use super::codec::{answer_label, decode};
use super::settings::PollSettings;
use super::stats::StatsNode;
use super::tree::{build_reply_tree, TreeNode};
use super::types::{LineState, Reply, ReplyLine};
use super::wizard::line_states;

const REPLY_MARKDOWN: Templates = Templates {
    title: "# {{name}}",
    section: "{{heading}} {{name}}{{#if body}}\n\n{{body}}{{/if}}",
    line: "{{indent}}{{#if number}}{{number}}. {{/if}}{{question}}{{#unless comment}}\n{{indent}}   > {{answer}}{{/unless}}",
    separator: "\n\n",
};

const REPLY_COMPACT: Templates = Templates {
    title: "{{name}}",
    section: "[{{name}}]",
    line: "{{#if number}}{{number}}. {{/if}}{{question}}{{#unless comment}}: {{answer}}{{/unless}}",
    separator: " | ",
};

const STATS_MARKDOWN: Templates = Templates {
    title: "# {{name}}",
    section: "{{heading}} {{name}}",
    line: "{{indent}}{{number}}. {{question}} ({{answer_count}} answers)\
{{#each answer_stats}}\n{{../indent}}   - {{label}}: {{count}} ({{percentage}}%){{/each}}\
{{#each answer_zeros}}\n{{../indent}}   - {{label}}: 0{{/each}}",
    separator: "\n\n",
};

const STATS_COMPACT: Templates = Templates {
    title: "{{name}}",
    section: "[{{name}}]",
    line: "{{number}}. {{question}} ({{answer_count}}): \
{{#each answer_stats}}{{label}} {{percentage}}%{{#unless @last}}, {{/unless}}{{/each}}",
    separator: " | ",
};

/// Output format for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Compact,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "compact" => Self::Compact,
            "json" => Self::Json,
            _ => Self::Markdown,
        }
    }
}

struct Templates {
    title: &'static str,
    section: &'static str,
    line: &'static str,
    separator: &'static str,
}

/// Renderer for reply trees and stats trees
pub struct PollRenderer<'a> {
    handlebars: Handlebars<'a>,
    format: OutputFormat,
}

impl<'a> PollRenderer<'a> {
    pub fn new(format: OutputFormat) -> Self {
        let mut handlebars = Handlebars::new();
        // Plain text output, no HTML escaping
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars, format }
    }

    /// Render a reply with its answers
    pub fn render_reply(&self, reply: &Reply, settings: &PollSettings) -> Result<String, RenderError> {
        let states = line_states(reply);
        let state_of = |line: &ReplyLine| {
            states
                .iter()
                .find(|(id, _)| *id == line.id)
                .map(|(_, state)| *state)
                .unwrap_or(LineState::Pending)
        };

        let items: Vec<Value> = build_reply_tree(reply)
            .into_iter()
            .map(|node| {
                let fields = match node {
                    TreeNode::Section { section, .. } => {
                        section_fields(node.deep(), &section.name, &section.body)
                    }
                    TreeNode::Line { number, line, .. } => json!({
                        "number": number,
                        "line_id": line.id,
                        "question": line.question,
                        "comment": line.kind.is_comment(),
                        "state": state_of(line),
                        "answer": display_answer(line, state_of(line), settings),
                    }),
                };
                node_data(&node, fields)
            })
            .collect();

        let templates = match self.format {
            OutputFormat::Markdown => &REPLY_MARKDOWN,
            OutputFormat::Compact => &REPLY_COMPACT,
            OutputFormat::Json => {
                return to_json(&json!({
                    "name": reply.name,
                    "is_complete": reply.is_complete,
                    "nodes": items,
                }))
            }
        };
        self.render_items(templates, &reply.name, &items)
    }

    /// Render aggregated statistics of a form
    pub fn render_stats(&self, form_name: &str, nodes: &[StatsNode<'_>]) -> Result<String, RenderError> {
        if self.format == OutputFormat::Json {
            return to_json(&json!({ "name": form_name, "nodes": nodes }));
        }

        let items: Vec<Value> = nodes
            .iter()
            .map(|node| {
                let fields = match node {
                    TreeNode::Section { section, .. } => {
                        section_fields(node.deep(), &section.name, &section.body)
                    }
                    TreeNode::Line { number, line, .. } => json!({
                        "number": number,
                        "question": line.line.question,
                        "answer_count": line.answer_count,
                        "answer_stats": line.answer_stats,
                        "answer_zeros": line.answer_zeros,
                    }),
                };
                node_data(node, fields)
            })
            .collect();

        let templates = match self.format {
            OutputFormat::Compact => &STATS_COMPACT,
            _ => &STATS_MARKDOWN,
        };
        self.render_items(templates, form_name, &items)
    }

    fn render_items(
        &self,
        templates: &Templates,
        name: &str,
        items: &[Value],
    ) -> Result<String, RenderError> {
        let mut rendered = vec![self.render_template(templates.title, &json!({ "name": name }))?];

        for item in items {
            let template = if item["kind"] == "section" {
                templates.section
            } else {
                templates.line
            };
            rendered.push(self.render_template(template, item)?);
        }

        Ok(rendered.join(templates.separator))
    }

    /// Render a handlebars template with data
    fn render_template(&self, template: &str, data: &Value) -> Result<String, RenderError> {
        self.handlebars
            .render_template(template, data)
            .map_err(|e| RenderError::Template(e.to_string()))
    }
}

/// Template data of a node: its kind and depth merged with `fields`
fn node_data<S, L>(node: &TreeNode<S, L>, fields: Value) -> Value {
    let deep = node.deep();
    let mut data = json!({
        "kind": if node.is_section() { "section" } else { "line" },
        "deep": deep,
        "indent": indent(deep),
    });
    if let (Value::Object(data), Value::Object(fields)) = (&mut data, fields) {
        data.extend(fields);
    }
    data
}

fn section_fields(deep: usize, name: &str, body: &str) -> Value {
    json!({
        "heading": "#".repeat(deep + 2),
        "name": name,
        "body": body,
    })
}

fn indent(deep: usize) -> String {
    "  ".repeat(deep)
}

fn display_answer(line: &ReplyLine, state: LineState, settings: &PollSettings) -> String {
    match state {
        LineState::Pending => "(pending)".to_string(),
        LineState::NotApplicable => "(not applicable)".to_string(),
        LineState::SkippedByUser => "N/A".to_string(),
        LineState::Answered => line
            .raw_answer
            .as_deref()
            .and_then(|raw| decode(&line.kind, raw).ok())
            .map(|value| answer_label(&line.kind, &value, &settings.labels))
            .unwrap_or_default(),
    }
}

fn to_json(value: &Value) -> Result<String, RenderError> {
    serde_json::to_string_pretty(value).map_err(|e| RenderError::Serialize(e.to_string()))
}

/// Render error types
#[derive(Debug)]
pub enum RenderError {
    Template(String),
    Serialize(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template(msg) => write!(f, "Template error: {}", msg),
            Self::Serialize(msg) => write!(f, "Failed to serialize: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}
