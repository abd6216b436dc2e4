//! @acp:module "MCP Service"
//! @acp:summary "Core MCP service implementation using rmcp SDK"
//! @acp:domain daemon
//! @acp:layer service
//!
//! Implements the ServerHandler trait for the poll engine. Each mutating
//! tool runs the engine on a draft of the store under the write lock and
//! swaps it in only once the draft is saved, so a rejected answer or a
//! failed save leaves both memory and disk untouched.

use rmcp::{model::*, schemars, ErrorData as McpError, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::tools::{
    AnswerParams, AnswerResponse, CreateRepliesParams, CreatedReply, FormStatsParams, FormSummary,
    NextQuestionResponse, QuestionView, RenderReplyParams, RenderedResponse, ReplyParams,
};
use crate::poll::types::{Reply, ReplyContext, ReplyId};
use crate::poll::{OutputFormat, PollEngine, PollError, PollRenderer};
use crate::state::{AppState, PollStore};

/// Poll MCP Service - exposes questionnaire replies to AI agents
#[derive(Clone)]
pub struct PollMcpService {
    state: AppState,
    engine: PollEngine,
}

/// Convert a schemars Schema to a JsonObject for rmcp Tool
fn schema_to_json_object<T: JsonSchema>() -> Arc<serde_json::Map<String, serde_json::Value>> {
    let schema = schemars::schema_for!(T);
    let json_value = serde_json::to_value(&schema).unwrap_or_default();
    if let serde_json::Value::Object(map) = json_value {
        Arc::new(map)
    } else {
        Arc::new(serde_json::Map::new())
    }
}

fn empty_schema() -> Arc<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::new();
    map.insert(
        "type".to_string(),
        serde_json::Value::String("object".to_string()),
    );
    Arc::new(map)
}

fn engine_error(e: PollError) -> McpError {
    McpError::invalid_params(e.to_string(), None)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("JSON error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn reply_not_found(id: ReplyId) -> McpError {
    McpError::invalid_params(format!("Reply not found: {}", id), None)
}

impl PollMcpService {
    pub fn new(state: AppState) -> Self {
        let engine = PollEngine::new(state.settings().clone());
        Self { state, engine }
    }

    fn build_tools() -> Vec<Tool> {
        vec![
            Tool::new(
                "poll_list_forms",
                "List the questionnaire forms with their question and reply counts. Use this first to find a form id.",
                empty_schema(),
            ),
            Tool::new(
                "poll_create_replies",
                "Create one or more empty replies from a form. Each reply is an independent copy of the form's questions.",
                schema_to_json_object::<CreateRepliesParams>(),
            ),
            Tool::new(
                "poll_next_question",
                "Get the next question to ask for a reply, with its expected answer type and choices. Returns no question once the reply is complete.",
                schema_to_json_object::<ReplyParams>(),
            ),
            Tool::new(
                "poll_answer",
                "Answer the pending question of a reply (or mark it not applicable). Fails if the line is already answered; use poll_edit_answer to change an answer.",
                schema_to_json_object::<AnswerParams>(),
            ),
            Tool::new(
                "poll_edit_answer",
                "Change the answer of any applicable line of a reply. Later answers whose conditions no longer hold are cleared.",
                schema_to_json_object::<AnswerParams>(),
            ),
            Tool::new(
                "poll_reset",
                "Clear every answer of a reply.",
                schema_to_json_object::<ReplyParams>(),
            ),
            Tool::new(
                "poll_reply_tree",
                "Render a reply as its section tree with every question and answer.",
                schema_to_json_object::<RenderReplyParams>(),
            ),
            Tool::new(
                "poll_form_stats",
                "Aggregate the answers of every reply of a form, question by question.",
                schema_to_json_object::<FormStatsParams>(),
            ),
        ]
    }

    /// Run `f` on a draft of the store and commit it once saved
    async fn transact<T>(
        &self,
        f: impl FnOnce(&mut PollStore) -> Result<T, McpError>,
    ) -> Result<T, McpError> {
        let mut store = self.state.store_mut().await;
        let mut draft = store.clone();
        let result = f(&mut draft)?;

        self.state
            .save(&draft)
            .await
            .map_err(|e| McpError::internal_error(format!("Failed to save store: {}", e), None))?;
        *store = draft;
        Ok(result)
    }

    fn question_view(&self, reply: &Reply) -> Option<QuestionView> {
        self.engine
            .next_question(reply)
            .map(|line| QuestionView::new(line, &self.engine.settings().labels))
    }

    /// List forms with reply counts
    async fn handle_list_forms(&self) -> Result<CallToolResult, McpError> {
        let store = self.state.store().await;

        let forms: Vec<FormSummary> = store
            .forms
            .iter()
            .map(|form| FormSummary::new(form, store.replies_of(form.id)))
            .collect();

        json_result(&forms)
    }

    /// Clone a form into new replies
    async fn handle_create_replies(
        &self,
        params: CreateRepliesParams,
    ) -> Result<CallToolResult, McpError> {
        let limit = self.engine.settings().max_replies_per_request;
        if params.count == 0 || params.count > limit {
            return Err(McpError::invalid_params(
                format!("count must be between 1 and {}", limit),
                None,
            ));
        }

        let created = self
            .transact(|store| {
                let form = store
                    .form(params.form_id)
                    .cloned()
                    .ok_or_else(|| {
                        McpError::invalid_params(format!("Form not found: {}", params.form_id), None)
                    })?;

                let context = ReplyContext {
                    name: params.name.clone().unwrap_or_else(|| form.name.clone()),
                    person: params.person.clone(),
                    campaign: params.campaign,
                };
                let first_id = store.allocate_reply_ids(params.count).ok_or_else(|| {
                    McpError::internal_error("Reply id space exhausted".to_string(), None)
                })?;
                let replies = self
                    .engine
                    .clone_many(&form, first_id, params.count, &context)
                    .map_err(engine_error)?;

                let created: Vec<CreatedReply> = replies
                    .iter()
                    .map(|r| CreatedReply {
                        id: r.id,
                        name: r.name.clone(),
                    })
                    .collect();
                store.replies.extend(replies);
                Ok(created)
            })
            .await?;

        info!(
            "Created {} replies from form {}",
            created.len(),
            params.form_id
        );
        json_result(&created)
    }

    /// Next pending question of a reply
    async fn handle_next_question(&self, params: ReplyParams) -> Result<CallToolResult, McpError> {
        let store = self.state.store().await;
        let reply = store
            .reply(params.reply_id)
            .ok_or_else(|| reply_not_found(params.reply_id))?;

        let question = self.question_view(reply);
        let response = NextQuestionResponse {
            reply_id: reply.id,
            is_complete: question.is_none(),
            progress: self.engine.progress(reply),
            question,
        };

        json_result(&response)
    }

    /// Answer (or edit) one line of a reply
    async fn handle_answer(
        &self,
        params: AnswerParams,
        edit: bool,
    ) -> Result<CallToolResult, McpError> {
        let response = self
            .transact(|store| {
                let reply = store
                    .reply_mut(params.reply_id)
                    .ok_or_else(|| reply_not_found(params.reply_id))?;

                let outcome = if edit {
                    self.engine.edit_answer(reply, params.line_id, params.input())
                } else {
                    self.engine.answer(reply, params.line_id, params.input())
                }
                .map_err(engine_error)?;

                Ok(AnswerResponse {
                    reply_id: reply.id,
                    updated_lines: outcome.updated_lines,
                    is_complete: outcome.is_complete,
                    next_question: self.question_view(reply),
                })
            })
            .await?;

        json_result(&response)
    }

    /// Clear every answer of a reply
    async fn handle_reset(&self, params: ReplyParams) -> Result<CallToolResult, McpError> {
        let response = self
            .transact(|store| {
                let reply = store
                    .reply_mut(params.reply_id)
                    .ok_or_else(|| reply_not_found(params.reply_id))?;
                self.engine.reset(reply);

                Ok(NextQuestionResponse {
                    reply_id: reply.id,
                    is_complete: reply.is_complete,
                    progress: self.engine.progress(reply),
                    question: self.question_view(reply),
                })
            })
            .await?;

        json_result(&response)
    }

    /// Render a reply tree
    async fn handle_reply_tree(
        &self,
        params: RenderReplyParams,
    ) -> Result<CallToolResult, McpError> {
        let store = self.state.store().await;
        let reply = store
            .reply(params.reply_id)
            .ok_or_else(|| reply_not_found(params.reply_id))?;

        let renderer = PollRenderer::new(OutputFormat::from_str(&params.format));
        let content = renderer
            .render_reply(reply, self.engine.settings())
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        json_result(&RenderedResponse {
            content,
            format: params.format,
        })
    }

    /// Render aggregated stats of a form
    async fn handle_form_stats(&self, params: FormStatsParams) -> Result<CallToolResult, McpError> {
        let store = self.state.store().await;
        let form = store.form(params.form_id).ok_or_else(|| {
            McpError::invalid_params(format!("Form not found: {}", params.form_id), None)
        })?;

        let nodes = self.engine.build_stats_tree(form, &store.replies);
        let renderer = PollRenderer::new(OutputFormat::from_str(&params.format));
        let content = renderer
            .render_stats(&form.name, &nodes)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        json_result(&RenderedResponse {
            content,
            format: params.format,
        })
    }

    /// Parse tool arguments from request
    fn parse_args<T: for<'de> Deserialize<'de>>(
        args: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<T, McpError> {
        let value = serde_json::Value::Object(args.unwrap_or_default());
        serde_json::from_value(value).map_err(|e| McpError::invalid_params(e.to_string(), None))
    }
}

#[allow(clippy::manual_async_fn)]
impl ServerHandler for PollMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Questionnaire server. Use poll_list_forms to find a form, poll_create_replies \
                 to start a reply, then alternate poll_next_question and poll_answer until the \
                 reply is complete. Questions whose conditions do not hold are skipped."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                tools: Self::build_tools(),
                next_cursor: None,
            })
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let tool_name: &str = &request.name;
            match tool_name {
                "poll_list_forms" => self.handle_list_forms().await,
                "poll_create_replies" => {
                    let params: CreateRepliesParams = Self::parse_args(request.arguments)?;
                    self.handle_create_replies(params).await
                }
                "poll_next_question" => {
                    let params: ReplyParams = Self::parse_args(request.arguments)?;
                    self.handle_next_question(params).await
                }
                "poll_answer" => {
                    let params: AnswerParams = Self::parse_args(request.arguments)?;
                    self.handle_answer(params, false).await
                }
                "poll_edit_answer" => {
                    let params: AnswerParams = Self::parse_args(request.arguments)?;
                    self.handle_answer(params, true).await
                }
                "poll_reset" => {
                    let params: ReplyParams = Self::parse_args(request.arguments)?;
                    self.handle_reset(params).await
                }
                "poll_reply_tree" => {
                    let params: RenderReplyParams = Self::parse_args(request.arguments)?;
                    self.handle_reply_tree(params).await
                }
                "poll_form_stats" => {
                    let params: FormStatsParams = Self::parse_args(request.arguments)?;
                    self.handle_form_stats(params).await
                }
                _ => Err(McpError::invalid_params(
                    format!("Unknown tool: {}", request.name),
                    None,
                )),
            }
        }
    }
}
