//! Role-sequenced workflow: Architect → Coder → Tester → Reviewer over one
//! shared environment. Each role drives its own bounded conversation loop;
//! the environment is created once up front and finalized once at the end,
//! so exactly one Done is still emitted.

use std::sync::Arc;

use tracing::{error, info, instrument};

use drydock_core::ids::RunId;
use drydock_core::messages::Message;

use crate::events::{event_channel, EventSender, EventStream};
use crate::gateway::ToolGateway;
use crate::prompts;
use crate::runner::AgentRunner;
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentRole {
    Architect,
    Coder,
    Tester,
    Reviewer,
}

impl AgentRole {
    /// The fixed feature-workflow order.
    pub fn sequence() -> [AgentRole; 4] {
        [Self::Architect, Self::Coder, Self::Tester, Self::Reviewer]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Coder => "coder",
            Self::Tester => "tester",
            Self::Reviewer => "reviewer",
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Self::Architect => prompts::ARCHITECT_PROMPT,
            Self::Coder => prompts::CODER_PROMPT,
            Self::Tester => prompts::TESTER_PROMPT,
            Self::Reviewer => prompts::REVIEWER_PROMPT,
        }
    }
}

/// Runs the role sequence against one shared environment.
pub struct FeatureWorkflow {
    runner: AgentRunner,
}

impl FeatureWorkflow {
    pub fn new(runner: AgentRunner) -> Self {
        Self { runner }
    }

    /// Start the workflow. A role failure stops the sequence; finalization
    /// and the single Done still happen.
    pub fn run(&self, session: Arc<Session>, task: String) -> EventStream {
        let (events, stream) = event_channel();
        let runner = self.runner.clone();
        let run_id = RunId::new();
        drop(tokio::spawn(async move {
            run_roles(runner, run_id, session, task, events).await;
        }));
        stream
    }
}

#[instrument(skip_all, fields(run_id = %run_id, session_id = %session.id()))]
async fn run_roles(
    runner: AgentRunner,
    run_id: RunId,
    session: Arc<Session>,
    task: String,
    events: EventSender,
) {
    events.status("Creating execution environment...").await;
    let env = match runner.env_factory().create().await {
        Ok(env) => env,
        Err(e) => {
            error!(error = %e, "environment creation failed");
            events.error(format!("Failed to create environment: {e}")).await;
            events.done("Workflow aborted.").await;
            return;
        }
    };

    let mut gateway = ToolGateway::new();
    let mut finished = 0usize;
    let mut failure: Option<String> = None;

    for role in AgentRole::sequence() {
        events.status(format!("{}: starting", role.name())).await;
        // Fresh history per role; prior roles' work is visible through the
        // shared workspace, not the transcript.
        let mut history = vec![Message::user_text(format!("Task: {task}"))];
        let max_turns = runner.config().max_turns;

        match runner
            .drive(
                env.as_ref(),
                &mut gateway,
                &mut history,
                max_turns,
                role.system_prompt(),
                &events,
            )
            .await
        {
            Ok(_) => {
                info!(role = role.name(), "role finished");
                events.status(format!("{}: finished", role.name())).await;
                finished += 1;
            }
            Err(e) => {
                error!(role = role.name(), error = %e, "role failed");
                events
                    .error(format!("Workflow failed at {}: {e}", role.name()))
                    .await;
                failure = Some(role.name().to_string());
                break;
            }
        }
    }

    runner
        .finalize(env.as_ref(), &mut gateway, &session, None, &events)
        .await;

    let summary = match failure {
        Some(role) => format!("Workflow stopped at {role} ({finished} role(s) finished)."),
        None => format!("Workflow complete: {finished} role(s) finished."),
    };
    events.done(summary).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_core::errors::ProviderError;
    use drydock_core::events::RunEvent;
    use drydock_core::provider::CompletionProvider;
    use drydock_env::LocalEnvFactory;
    use drydock_llm::mock::{MockProvider, MockResponse};
    use crate::runner::RunnerConfig;

    fn workflow_with(responses: Vec<MockResponse>) -> (FeatureWorkflow, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(responses));
        let runner = AgentRunner::new(
            Arc::clone(&provider) as Arc<dyn CompletionProvider>,
            Arc::new(LocalEnvFactory::new()),
            RunnerConfig::default(),
        );
        (FeatureWorkflow::new(runner), provider)
    }

    #[tokio::test]
    async fn all_roles_run_in_order() {
        let (workflow, provider) = workflow_with(vec![
            MockResponse::text("plan"),
            MockResponse::text("implemented"),
            MockResponse::text("tested"),
            MockResponse::text("APPROVED"),
        ]);
        let session = Arc::new(Session::new());

        let events = workflow
            .run(Arc::clone(&session), "build the widget".into())
            .collect()
            .await;

        let starts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Status { message } if message.ends_with(": starting") => {
                    Some(message.split(':').next().unwrap())
                }
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["architect", "coder", "tester", "reviewer"]);
        assert_eq!(provider.call_count(), 4);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn role_failure_stops_sequence_but_done_still_emitted() {
        let (workflow, provider) = workflow_with(vec![
            MockResponse::text("plan"),
            MockResponse::Error(ProviderError::AuthenticationFailed("expired".into())),
            MockResponse::text("never reached"),
        ]);
        let session = Arc::new(Session::new());

        let events = workflow
            .run(Arc::clone(&session), "build the widget".into())
            .collect()
            .await;

        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::Error { message } if message.contains("failed at coder")
        )));
        // Tester and reviewer never ran.
        assert_eq!(provider.call_count(), 2);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }
}
