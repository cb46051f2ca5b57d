use crate::{
    agent::{
        definition::LlmAgent,
        llm::{ChatMessage, LlmBackend, LlmRequest, LlmResponse, ToolCall, ToolSpec},
        session::{
            Content, Event, FunctionCall, FunctionResponse, Part, Session, SessionService,
        },
        tool::{error_response, State, ToolContext},
    },
    error::{Result, ShoppingError},
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const TRANSFER_TOOL: &str = "transfer_to_agent";
pub const DEFAULT_MAX_STEPS: usize = 24;

// Drives one app's agent tree over the sessions in a `SessionService`.
pub struct Runner {
    app_name: String,
    root: Arc<LlmAgent>,
    backend: Arc<dyn LlmBackend>,
    sessions: Arc<SessionService>,
    max_steps: usize,
}

impl Runner {
    pub fn new(
        app_name: impl Into<String>,
        root: Arc<LlmAgent>,
        backend: Arc<dyn LlmBackend>,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            root,
            backend,
            sessions,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn root_agent(&self) -> &Arc<LlmAgent> {
        &self.root
    }

    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    // Runs one user turn and returns the events it produced, starting with
    // the user's own message.
    pub async fn run(&self, user_id: &str, session_id: &str, new_message: Content) -> Result<Vec<Event>> {
        // Held until the session is saved, so runs on one session queue up.
        let _turn = self
            .sessions
            .lock_session(&self.app_name, user_id, session_id)
            .await
            .ok_or_else(|| ShoppingError::SessionNotFound(session_id.to_string()))?;
        let mut session = self
            .sessions
            .get_session(&self.app_name, user_id, session_id)
            .ok_or_else(|| ShoppingError::SessionNotFound(session_id.to_string()))?;

        let invocation_id = format!("e-{}", Uuid::new_v4());
        let mut new_events = Vec::new();
        record(
            &mut session,
            &mut new_events,
            Event::new(&invocation_id, "user", Some(new_message)),
        );

        let mut agent = session
            .active_agent
            .as_deref()
            .and_then(|name| self.root.find_agent(name))
            .unwrap_or_else(|| self.root.clone());
        tracing::info!(
            session_id,
            invocation_id = %invocation_id,
            agent = %agent.name,
            "starting invocation"
        );

        let outcome = self
            .run_agents(&mut session, &mut agent, &invocation_id, &mut new_events)
            .await;
        // saved even when the model failed, so the history stays consistent
        self.sessions.save_session(session);

        outcome.map(|_| new_events)
    }

    async fn run_agents(
        &self,
        session: &mut Session,
        agent: &mut Arc<LlmAgent>,
        invocation_id: &str,
        new_events: &mut Vec<Event>,
    ) -> Result<()> {
        for step in 0..self.max_steps {
            let targets = self.root.transfer_targets(&agent.name);
            let request = build_request(agent, &targets, session);
            let response = agent
                .retry
                .run(&agent.name, || self.backend.complete(request.clone()))
                .await?;

            tracing::debug!(
                step,
                agent = %agent.name,
                tool_calls = response.tool_calls.len(),
                "model responded"
            );

            // Plain text ends the turn
            if !response.has_tool_calls() {
                if let Some(text) = response.text {
                    record(
                        session,
                        new_events,
                        Event::new(invocation_id, &agent.name, Some(Content::model(vec![Part::text(text)]))),
                    );
                }
                return Ok(());
            }

            record(
                session,
                new_events,
                Event::new(invocation_id, &agent.name, Some(call_content(&response))),
            );

            // Execute every requested call before answering the model
            let before = session.state.clone();
            let mut responses = Vec::with_capacity(response.tool_calls.len());
            let mut transfer = None;
            for call in &response.tool_calls {
                let output = match parse_arguments(call) {
                    Err(e) => error_response(e),
                    Ok(args) if call.name == TRANSFER_TOOL => {
                        match resolve_transfer(&targets, &args) {
                            Ok(target) => {
                                let output = json!({"status": "success", "transferred_to": target.name});
                                transfer = Some(target);
                                output
                            }
                            Err(e) => error_response(e),
                        }
                    }
                    Ok(args) => self.call_tool(agent, call, args, invocation_id, &mut session.state).await,
                };
                responses.push(Part::function_response(FunctionResponse {
                    id: Some(call.id.clone()),
                    name: call.name.clone(),
                    response: output,
                }));
            }

            let mut event = Event::new(
                invocation_id,
                &agent.name,
                Some(Content {
                    role: "user".to_string(),
                    parts: responses,
                }),
            );
            event.actions.state_delta = state_delta(&before, &session.state);
            event.actions.transfer_to_agent = transfer.as_ref().map(|target: &Arc<LlmAgent>| target.name.clone());
            record(session, new_events, event);

            // The target answers next and stays active for the next turn
            if let Some(target) = transfer {
                tracing::info!(from = %agent.name, to = %target.name, "agent transfer");
                session.active_agent = Some(target.name.clone());
                *agent = target;
            }
        }

        tracing::warn!(
            agent = %agent.name,
            max_steps = self.max_steps,
            "invocation stopped at the step limit"
        );
        Ok(())
    }

    async fn call_tool(
        &self,
        agent: &LlmAgent,
        call: &ToolCall,
        args: Value,
        invocation_id: &str,
        state: &mut State,
    ) -> Value {
        let Some(tool) = agent.tools.get(&call.name) else {
            tracing::warn!(agent = %agent.name, tool = %call.name, "model called an unknown tool");
            return error_response(format!("Tool `{}` is not available to {}", call.name, agent.name));
        };

        let mut ctx = ToolContext {
            agent_name: &agent.name,
            invocation_id,
            state,
        };
        match tool.call(args, &mut ctx).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %call.name, "tool failed: {}", e);
                error_response(e)
            }
        }
    }
}

fn record(session: &mut Session, new_events: &mut Vec<Event>, event: Event) {
    session.events.push(event.clone());
    new_events.push(event);
}

fn parse_arguments(call: &ToolCall) -> Result<Value> {
    if call.arguments.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&call.arguments).map_err(|e| {
        ShoppingError::Tool(format!("Arguments for `{}` are not valid JSON: {}", call.name, e))
    })
}

fn resolve_transfer(targets: &[Arc<LlmAgent>], args: &Value) -> Result<Arc<LlmAgent>> {
    let name = args
        .get("agent_name")
        .and_then(Value::as_str)
        .ok_or_else(|| ShoppingError::Tool("Missing required argument `agent_name`".to_string()))?;
    targets
        .iter()
        .find(|target| target.name == name)
        .cloned()
        .ok_or_else(|| ShoppingError::AgentNotFound(name.to_string()))
}

fn state_delta(before: &State, after: &State) -> State {
    after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn call_content(response: &LlmResponse) -> Content {
    let mut parts = Vec::new();
    if let Some(text) = &response.text {
        parts.push(Part::text(text.clone()));
    }
    for call in &response.tool_calls {
        parts.push(Part::function_call(FunctionCall {
            id: Some(call.id.clone()),
            name: call.name.clone(),
            args: parse_arguments(call).unwrap_or_else(|_| Value::String(call.arguments.clone())),
        }));
    }
    Content::model(parts)
}

fn transfer_spec(targets: &[Arc<LlmAgent>]) -> ToolSpec {
    let names: Vec<&str> = targets.iter().map(|target| target.name.as_str()).collect();
    ToolSpec {
        name: TRANSFER_TOOL.to_string(),
        description: "Transfer the conversation to another agent that is better suited to answer."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "enum": names,
                    "description": "Name of the agent to transfer to"
                }
            },
            "required": ["agent_name"]
        }),
    }
}

fn system_prompt(agent: &LlmAgent, targets: &[Arc<LlmAgent>]) -> String {
    let mut prompt = agent.instruction.clone();
    prompt.push_str(&format!("\n\nYou are an agent. Your internal name is \"{}\".", agent.name));
    if !agent.description.is_empty() {
        prompt.push_str(&format!(" The description about you is \"{}\".", agent.description));
    }

    if !targets.is_empty() {
        prompt.push_str("\n\nYou have a list of other agents to transfer to:\n");
        for target in targets {
            prompt.push_str(&format!("\nAgent name: {}\nAgent description: {}\n", target.name, target.description));
        }
        prompt.push_str(&format!(
            "\nIf another agent is better suited to answer the question, call the `{}` \
             function with that agent's name. When transferring, do not generate any text \
             other than the function call.",
            TRANSFER_TOOL
        ));
    }
    prompt
}

fn build_request(agent: &LlmAgent, targets: &[Arc<LlmAgent>], session: &Session) -> LlmRequest {
    let mut messages = vec![ChatMessage::system(system_prompt(agent, targets))];
    messages.extend(history(&session.events, &agent.name));

    let mut tools = agent.tools.specs();
    if !targets.is_empty() {
        tools.push(transfer_spec(targets));
    }

    LlmRequest {
        model: agent.model.clone(),
        messages,
        tools,
    }
}

// Replays session events from `agent_name`'s point of view. Its own turns
// stay assistant/tool messages; everyone else's become user context.
fn history(events: &[Event], agent_name: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    for event in events {
        let Some(content) = &event.content else {
            continue;
        };

        if event.author == "user" {
            if let Some(text) = content.joined_text() {
                messages.push(ChatMessage::user(text));
            }
        } else if event.author == agent_name {
            let calls: Vec<ToolCall> = event
                .function_calls()
                .map(|call| ToolCall {
                    id: call.id.clone().unwrap_or_default(),
                    name: call.name.clone(),
                    arguments: call.args.to_string(),
                })
                .collect();
            let text = content.joined_text().unwrap_or_default();
            if !calls.is_empty() {
                messages.push(ChatMessage::assistant_with_tool_calls(text, calls));
            } else if !text.is_empty() {
                messages.push(ChatMessage::assistant(text));
            }
            for response in event.function_responses() {
                messages.push(ChatMessage::tool_result(
                    response.id.clone().unwrap_or_default(),
                    response.response.to_string(),
                ));
            }
        } else {
            for part in &content.parts {
                let line = if let Some(text) = &part.text {
                    format!("[{}] said: {}", event.author, text)
                } else if let Some(call) = &part.function_call {
                    format!("[{}] called tool `{}` with parameters: {}", event.author, call.name, call.args)
                } else if let Some(response) = &part.function_response {
                    format!("[{}] `{}` tool returned result: {}", event.author, response.name, response.response)
                } else {
                    continue;
                };
                messages.push(ChatMessage::user(format!("For context: {}", line)));
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{
        llm::{MockLlmBackend, Role},
        tool::{required_arg, string_params, Tool},
    };
    use async_trait::async_trait;
    use mockall::Sequence;

    struct Remember;

    #[async_trait]
    impl Tool for Remember {
        fn name(&self) -> &str {
            "remember"
        }

        fn description(&self) -> &str {
            "Stores a note in session state"
        }

        fn parameters(&self) -> Value {
            string_params(&[("note", "The note")], &["note"])
        }

        async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
            let note = required_arg(&args, "note")?;
            ctx.set("note", &note)?;
            Ok(json!({"status": "success"}))
        }
    }

    fn agents() -> Arc<LlmAgent> {
        let helper = LlmAgent::builder("helper")
            .description("Remembers notes")
            .instruction("Remember things.")
            .tool(Arc::new(Remember))
            .build();
        LlmAgent::builder("root")
            .model("test-model")
            .instruction("Route requests.")
            .sub_agent(helper)
            .build()
    }

    fn build_runner(backend: MockLlmBackend) -> (Runner, String) {
        let sessions = Arc::new(SessionService::new());
        let session = sessions.create_session("app", "u1", None, None).unwrap();
        let runner = Runner::new("app", agents(), Arc::new(backend), sessions);
        (runner, session.id)
    }

    #[tokio::test]
    async fn test_text_reply_ends_turn() {
        let mut backend = MockLlmBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|request| {
                assert_eq!(request.messages[0].role, Role::System);
                assert!(request.tools.iter().any(|t| t.name == TRANSFER_TOOL));
                Ok(LlmResponse::text("Hello!"))
            });

        let (runner, session_id) = build_runner(backend);
        let events = runner
            .run("u1", &session_id, Content::user_text("hi"))
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].author, "user");
        assert_eq!(events[1].author, "root");
        assert_eq!(events[1].text().as_deref(), Some("Hello!"));
        let saved = runner.sessions().get_session("app", "u1", &session_id).unwrap();
        assert_eq!(saved.events.len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_then_tool_then_reply() {
        let mut backend = MockLlmBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(LlmResponse::tool_call(TRANSFER_TOOL, json!({"agent_name": "helper"}))));
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|request| {
                assert!(request.messages[0].content.contains("\"helper\""));
                assert!(request
                    .messages
                    .iter()
                    .any(|m| m.content.starts_with("For context: [root] called tool `transfer_to_agent`")));
                Ok(LlmResponse::tool_call("remember", json!({"note": "buy milk"})))
            });
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|request| {
                let last = request.messages.last().unwrap();
                assert_eq!(last.role, Role::Tool);
                assert_eq!(last.tool_call_id.as_deref(), Some("call_remember"));
                Ok(LlmResponse::text("Noted."))
            });

        let (runner, session_id) = build_runner(backend);
        let events = runner
            .run("u1", &session_id, Content::user_text("remember to buy milk"))
            .await
            .unwrap();

        assert_eq!(events[2].actions.transfer_to_agent.as_deref(), Some("helper"));
        let last = events.last().unwrap();
        assert_eq!(last.author, "helper");
        assert_eq!(last.text().as_deref(), Some("Noted."));

        let saved = runner.sessions().get_session("app", "u1", &session_id).unwrap();
        assert_eq!(saved.state["note"], "buy milk");
        assert_eq!(saved.active_agent.as_deref(), Some("helper"));
        assert!(saved
            .events
            .iter()
            .any(|e| e.actions.state_delta.get("note") == Some(&json!("buy milk"))));
    }

    #[tokio::test]
    async fn test_tool_errors_go_back_to_model() {
        let mut backend = MockLlmBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(LlmResponse::tool_call("missing_tool", json!({}))));
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(LlmResponse::text("Sorry, I can't do that.")));

        let (runner, session_id) = build_runner(backend);
        let events = runner
            .run("u1", &session_id, Content::user_text("do something"))
            .await
            .unwrap();

        let response = events[2].function_responses().next().unwrap();
        assert_eq!(response.response["status"], "error");
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_model_failure_is_surfaced() {
        let mut backend = MockLlmBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|_| Err(ShoppingError::Llm("quota exceeded".into())));

        let (runner, session_id) = build_runner(backend);
        let result = runner.run("u1", &session_id, Content::user_text("hi")).await;
        assert!(matches!(result, Err(ShoppingError::Llm(_))));

        let saved = runner.sessions().get_session("app", "u1", &session_id).unwrap();
        assert_eq!(saved.events.len(), 1);
    }

    // Answers after a pause, long enough for another run to interleave.
    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            Ok(LlmResponse::text("done"))
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_on_one_session_keep_every_event() {
        let sessions = Arc::new(SessionService::new());
        let session = sessions.create_session("app", "u1", None, None).unwrap();
        let runner = Runner::new("app", agents(), Arc::new(SlowBackend), sessions);

        let (first, second) = tokio::join!(
            runner.run("u1", &session.id, Content::user_text("first")),
            runner.run("u1", &session.id, Content::user_text("second")),
        );
        assert_eq!(first.unwrap().len(), 2);
        assert_eq!(second.unwrap().len(), 2);

        let saved = runner.sessions().get_session("app", "u1", &session.id).unwrap();
        assert_eq!(saved.events.len(), 4);
        let users: Vec<String> = saved
            .events
            .iter()
            .filter(|event| event.author == "user")
            .filter_map(Event::text)
            .collect();
        assert_eq!(users.len(), 2);
        assert!(users.contains(&"first".to_string()));
        assert!(users.contains(&"second".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (runner, _) = build_runner(MockLlmBackend::new());
        let result = runner.run("u1", "nope", Content::user_text("hi")).await;
        assert!(matches!(result, Err(ShoppingError::SessionNotFound(_))));
    }
}
