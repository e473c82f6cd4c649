//! The conversation loop.
//!
//! One run: create the environment, place uploads, attach the project,
//! then alternate completion calls and tool execution until the model stops
//! asking for tools or the turn limit is reached. Finalization always runs,
//! whatever the outcome, and ends with exactly one Done event.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use drydock_core::env::{EnvFactory, ExecutionEnv};
use drydock_core::ids::RunId;
use drydock_core::messages::{AssistantContent, AssistantMessage, Message, StopReason};
use drydock_core::project::Snapshot;
use drydock_core::provider::{CompletionProvider, CompletionRequest};

use crate::error::EngineError;
use crate::events::{event_channel, EventSender, EventStream};
use crate::gateway::{self, ToolGateway, MOUNT_POINT};
use crate::project;
use crate::prompts::AGENT_SYSTEM_PROMPT;
use crate::session::Session;
use crate::truncate;

const DEFAULT_MAX_TURNS: u32 = 10;

/// Configuration for the agent runner.
#[derive(Clone)]
pub struct RunnerConfig {
    pub model: String,
    pub max_turns: u32,
    pub system_prompt: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".into(),
            max_turns: DEFAULT_MAX_TURNS,
            system_prompt: AGENT_SYSTEM_PROMPT.into(),
        }
    }
}

/// A file handed to the run up front, placed at the mount point before the
/// first turn.
#[derive(Clone)]
pub struct UploadedFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Input for one run.
#[derive(Clone, Default)]
pub struct RunRequest {
    pub query: String,
    pub max_turns: Option<u32>,
    pub uploaded_files: Vec<UploadedFile>,
    pub project: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// How the turn loop ended. Both are normal terminations; fatal failures
/// surface as `EngineError` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model produced a turn with zero tool calls.
    Completed { turns: u32 },
    /// The caller-supplied turn budget ran out first.
    TurnsExhausted { turns: u32 },
}

/// Drives one end-to-end agent run.
#[derive(Clone)]
pub struct AgentRunner {
    provider: Arc<dyn CompletionProvider>,
    envs: Arc<dyn EnvFactory>,
    config: RunnerConfig,
}

impl AgentRunner {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        envs: Arc<dyn EnvFactory>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            provider,
            envs,
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub(crate) fn env_factory(&self) -> &Arc<dyn EnvFactory> {
        &self.envs
    }

    /// Start a run. The returned stream yields events in emission order and
    /// terminates with exactly one Done.
    pub fn run(&self, session: Arc<Session>, request: RunRequest) -> EventStream {
        let (events, stream) = event_channel();
        let runner = self.clone();
        let run_id = RunId::new();
        drop(tokio::spawn(async move {
            runner.run_to_completion(run_id, session, request, events).await;
        }));
        stream
    }

    #[instrument(skip_all, fields(run_id = %run_id, session_id = %session.id()))]
    async fn run_to_completion(
        &self,
        run_id: RunId,
        session: Arc<Session>,
        request: RunRequest,
        events: EventSender,
    ) {
        events.status("Creating execution environment...").await;
        let env = match self.envs.create().await {
            Ok(env) => env,
            Err(e) => {
                // Nothing was acquired; report and end the run.
                error!(error = %e, "environment creation failed");
                events.error(format!("Failed to create environment: {e}")).await;
                events.done("Run aborted.").await;
                return;
            }
        };
        events.status("Environment ready.").await;

        // From here the environment is held; finalization must always run.
        let mut gateway = ToolGateway::new();
        let mut snapshot: Option<Snapshot> = None;

        let outcome = self
            .prepare_and_drive(env.as_ref(), &mut gateway, &session, &request, &mut snapshot, &events)
            .await;

        let summary = match outcome {
            Ok(RunOutcome::Completed { turns }) => {
                info!(turns, "run completed");
                format!("Task complete after {turns} turn(s).")
            }
            Ok(RunOutcome::TurnsExhausted { turns }) => {
                info!(turns, "turn limit reached");
                format!("Turn limit reached after {turns} turn(s).")
            }
            Err(e) => {
                // The single fatal condition for this run.
                error!(error = %e, "run failed");
                events.error(format!("Agent error: {e}")).await;
                "Run failed.".to_string()
            }
        };

        self.finalize(env.as_ref(), &mut gateway, &session, snapshot.as_ref(), &events)
            .await;
        events.done(summary).await;
    }

    async fn prepare_and_drive(
        &self,
        env: &dyn ExecutionEnv,
        gateway: &mut ToolGateway,
        session: &Session,
        request: &RunRequest,
        snapshot: &mut Option<Snapshot>,
        events: &EventSender,
    ) -> Result<RunOutcome, EngineError> {
        if !request.uploaded_files.is_empty() {
            events
                .status(format!("Uploading {} file(s)...", request.uploaded_files.len()))
                .await;
            for file in &request.uploaded_files {
                let path = format!("{MOUNT_POINT}/{}", file.name);
                env.write_file(&path, &file.contents).await?;
                events.file(&file.name, file.contents.len() as u64).await;
            }
        }

        // Project sync failure degrades to a warning; the run continues
        // without change tracking.
        if let Some(root) = &request.project {
            events.status("Syncing project into the environment...").await;
            match project::attach(env, root).await {
                Ok(report) => match project::snapshot(env).await {
                    Ok(snap) => {
                        session.set_project(root.clone());
                        events
                            .status(format!(
                                "Project loaded: {} file(s) copied, {} skipped.",
                                report.copied, report.skipped
                            ))
                            .await;
                        *snapshot = Some(snap);
                    }
                    Err(e) => {
                        warn!(error = %e, "snapshot failed");
                        events
                            .status(format!("Warning: failed to snapshot project: {e}"))
                            .await;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "project sync failed");
                    events
                        .status(format!("Warning: failed to sync project: {e}"))
                        .await;
                }
            }
        }

        let mut history = vec![Message::user_text(&request.query)];
        let max_turns = request.max_turns.unwrap_or(self.config.max_turns);
        self.drive(env, gateway, &mut history, max_turns, &self.config.system_prompt, events)
            .await
    }

    /// The turn loop. Tool calls run synchronously and one at a time, in
    /// segment order: each result must be folded into history before the
    /// next completion call.
    pub(crate) async fn drive(
        &self,
        env: &dyn ExecutionEnv,
        gateway: &mut ToolGateway,
        history: &mut Vec<Message>,
        max_turns: u32,
        system_prompt: &str,
        events: &EventSender,
    ) -> Result<RunOutcome, EngineError> {
        let tool_defs = gateway::definitions();

        for turn in 1..=max_turns {
            events
                .status(format!("Model thinking... (turn {turn}/{max_turns})"))
                .await;

            let completion = self
                .provider
                .complete(CompletionRequest {
                    messages: history,
                    tools: &tool_defs,
                    system: Some(system_prompt),
                    model: &self.config.model,
                })
                .await?;

            let mut pending: Vec<AssistantContent> = Vec::new();
            let mut used_tools = false;

            for segment in completion.content {
                match segment {
                    AssistantContent::Text { text } => {
                        events.text(text.clone()).await;
                        pending.push(AssistantContent::Text { text });
                    }
                    AssistantContent::ToolCall(call) => {
                        used_tools = true;
                        events
                            .tool_use(call.id.clone(), call.name.clone(), call.arguments.clone())
                            .await;
                        pending.push(AssistantContent::ToolCall(call.clone()));

                        // A failing tool is local: the error becomes the
                        // result message and the model gets to recover.
                        let result_msg = match gateway.execute(&call.name, &call.arguments, env).await
                        {
                            Ok(payload) => {
                                let payload = truncate::truncate_output(
                                    &payload,
                                    truncate::max_output_for_tool(&call.name),
                                );
                                events.tool_result(call.id.clone(), payload.clone(), false).await;
                                Message::tool_result(call.id.clone(), payload)
                            }
                            Err(e) => {
                                warn!(tool = %call.name, error = %e, "tool call failed");
                                let message = format!("Error: {e}");
                                events.tool_result(call.id.clone(), message.clone(), true).await;
                                Message::tool_error(call.id.clone(), message)
                            }
                        };

                        history.push(Message::Assistant(AssistantMessage {
                            content: std::mem::take(&mut pending),
                            stop_reason: Some(StopReason::ToolUse),
                        }));
                        history.push(result_msg);
                    }
                }
            }

            if !used_tools {
                if !pending.is_empty() {
                    history.push(Message::Assistant(AssistantMessage {
                        content: pending,
                        stop_reason: Some(completion.stop_reason),
                    }));
                }
                return Ok(RunOutcome::Completed { turns: turn });
            }

            // Segments trailing the turn's last tool call still belong to
            // the conversation.
            if !pending.is_empty() {
                history.push(Message::Assistant(AssistantMessage {
                    content: pending,
                    stop_reason: Some(completion.stop_reason),
                }));
            }
        }

        Ok(RunOutcome::TurnsExhausted { turns: max_turns })
    }

    /// Finalization: detect drift if a project was attached, force-close
    /// the browser, tear the environment down exactly once.
    pub(crate) async fn finalize(
        &self,
        env: &dyn ExecutionEnv,
        gateway: &mut ToolGateway,
        session: &Session,
        snapshot: Option<&Snapshot>,
        events: &EventSender,
    ) {
        if let (Some(snapshot), Some(root)) = (snapshot, session.project_root()) {
            events.status("Detecting changes...").await;
            match project::detect(env, snapshot, &root).await {
                Ok(changes) => {
                    if !changes.is_empty() {
                        events
                            .status(format!("Found {} file change(s).", changes.len()))
                            .await;
                    }
                    session.cache_changes(changes);
                }
                Err(e) => {
                    warn!(error = %e, "change detection failed");
                    events
                        .status(format!("Warning: change detection failed: {e}"))
                        .await;
                }
            }
        }

        gateway.close_browser(env).await;

        // Teardown failures never mask the run's actual outcome.
        if let Err(e) = env.destroy().await {
            warn!(error = %e, "environment teardown failed");
        }
    }
}
