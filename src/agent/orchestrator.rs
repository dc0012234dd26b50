//! Two-stage query orchestration over the LLM collaborator.
//!
//! Direct mode forwards the message with a fixed system prompt and no
//! retrieval. Smart mode first classifies the target entity from retrieved
//! header candidates (a stateless, tool-free call), then runs the execution
//! call with the backend query tool attached and session history threaded
//! through.

use crate::agent::memory::SessionMemory;
use crate::config::AiConfig;
use crate::error::LlmError;
use crate::tools::OdataQueryTool;
use crate::vector::MetadataSearch;

use rig::agent::AgentBuilder;
use rig::completion::Prompt;
use std::sync::Arc;

/// Completion model used by both stages.
pub type BridgeModel = rig::providers::ollama::CompletionModel;

/// Upper bound on tool-call rounds in one execution turn.
const MAX_TOOL_TURNS: usize = 10;

const CLASSIFIER_PREAMBLE: &str = "You pick the backend entity a question is about. \
    Answer with exactly one technical entity name (the value inside [ID: ...]) from \
    the candidate list, and nothing else. If the conversation already established an \
    entity and the question continues it, answer with that same entity.";

pub struct QueryOrchestrator {
    model: BridgeModel,
    search: Arc<MetadataSearch>,
    tool: OdataQueryTool,
    memory: SessionMemory,
    ai: AiConfig,
    narrow_entity_fields: bool,
}

impl QueryOrchestrator {
    pub fn new(
        model: BridgeModel,
        search: Arc<MetadataSearch>,
        tool: OdataQueryTool,
        ai: AiConfig,
        narrow_entity_fields: bool,
    ) -> Self {
        Self {
            model,
            search,
            tool,
            memory: SessionMemory::new(),
            ai,
            narrow_entity_fields,
        }
    }

    /// Direct mode: no retrieval, no tools, no memory.
    pub async fn direct_answer(&self, message: &str) -> crate::Result<String> {
        let preamble = self.render_system_prompt("", "")?;
        let agent = AgentBuilder::new(self.model.clone())
            .preamble(&preamble)
            .build();

        agent
            .prompt(message)
            .await
            .map_err(|e| LlmError::CompletionFailed(e.to_string()).into())
    }

    /// Smart mode: classify the target entity, then answer with the backend
    /// query tool available and session history attached.
    pub async fn smart_answer(&self, session_id: &str, question: &str) -> crate::Result<String> {
        let candidates = self.search.find_entity_header(question).await?;
        let previous = self.memory.last_entity(session_id).await;
        let entity = self
            .classify_entity(question, &candidates, previous.as_deref())
            .await?;
        tracing::info!(%entity, session = session_id, "classified target entity");

        // The classifier's output is used as-is. A name matching no real
        // entity yields empty field context here and a backend error if the
        // model queries it.
        let context = if self.narrow_entity_fields {
            self.search.find_fields_for_entity(&entity).await?
        } else {
            self.search.find_relevant_context(question).await?
        };

        let preamble = self.render_system_prompt(&entity, &context)?;
        let mut history = self.memory.history(session_id).await;

        let agent = AgentBuilder::new(self.model.clone())
            .preamble(&preamble)
            .default_max_turns(MAX_TOOL_TURNS)
            .tool(self.tool.clone())
            .build();

        let answer = agent
            .prompt(question)
            .with_history(&mut history)
            .await
            .map_err(|e| LlmError::CompletionFailed(e.to_string()))?;

        self.memory
            .record_exchange(session_id, &entity, question, &answer)
            .await;

        Ok(answer)
    }

    /// Classification stage: stateless, tool-free, single-shot.
    async fn classify_entity(
        &self,
        question: &str,
        candidates: &str,
        previous: Option<&str>,
    ) -> crate::Result<String> {
        let agent = AgentBuilder::new(self.model.clone())
            .preamble(CLASSIFIER_PREAMBLE)
            .build();

        let prompt = build_classification_prompt(question, candidates, previous);
        let response = agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::CompletionFailed(e.to_string()))?;

        Ok(response.trim().to_string())
    }

    fn render_system_prompt(&self, entity: &str, context: &str) -> crate::Result<String> {
        let mut env = minijinja::Environment::new();
        env.add_template("system", &self.ai.system_prompt)
            .map_err(|e| anyhow::anyhow!("invalid system prompt template: {e}"))?;
        let rendered = env
            .get_template("system")
            .and_then(|t| t.render(minijinja::context! { entity => entity, context => context }))
            .map_err(|e| anyhow::anyhow!("system prompt render failed: {e}"))?;
        Ok(rendered)
    }
}

fn build_classification_prompt(
    question: &str,
    candidates: &str,
    previous: Option<&str>,
) -> String {
    let mut prompt = format!("Candidate entities:\n{candidates}\n\nUser question: {question}\n");
    if let Some(previous) = previous {
        prompt.push_str(&format!(
            "\nPreviously chosen entity for this conversation: {previous}\n"
        ));
    }
    prompt
}
