use std::sync::Arc;

use serde_json::Value;

use crate::errors::AgentError;
use crate::llm::system_prompt::SystemPromptManager;
use crate::llm::{ChatMessage, GenerateOptions, LlmModelTrait};
use crate::model::ConversationTurn;
use crate::pipeline::composer;
use crate::pipeline::correction::Corrector;
use crate::pipeline::guard;
use crate::pipeline::hints;
use crate::runtime::toolport::{parse_tool_call, ToolError, ToolInput, ToolRegistry};

/// Planner phases, in the order a request moves through them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlannerState {
    Planning,
    Executing,
    Observing,
    Done,
    Aborted,
}

/// One step of the planning loop, recorded for the request trace.
#[derive(Clone, Debug)]
pub enum PlannerStep {
    ToolInvocation { tool: String, input: String },
    Observation { sql: String, rows: Vec<Value> },
    Blocked { sql: String, reason: String },
}

/// Outcome of one resolved request.
pub struct Resolution {
    pub response: String,
    /// The last catalog query that actually executed, verbatim.
    pub sql: Option<String>,
    pub steps: Vec<PlannerStep>,
}

impl Resolution {
    fn refusal() -> Self {
        Self {
            response: guard::REFUSAL_TEXT.to_string(),
            sql: None,
            steps: Vec::new(),
        }
    }
}

/// Executor owns execution authority: it decides when generation runs, which
/// tool calls execute, and when the loop stops. It is the only caller of the
/// tool registry.
pub struct Executor {
    llm: Arc<dyn LlmModelTrait>,
    corrector: Corrector,
    tools: Arc<ToolRegistry>,
    prompts: SystemPromptManager,
    max_iterations: usize,
    default_row_cap: usize,
}

impl Executor {
    pub fn new(
        llm: Arc<dyn LlmModelTrait>,
        tools: Arc<ToolRegistry>,
        max_iterations: usize,
        default_row_cap: usize,
    ) -> Self {
        let prompts = SystemPromptManager::new();
        let corrector = Corrector::new(llm.clone(), prompts.clone());
        Self {
            llm,
            corrector,
            tools,
            prompts,
            max_iterations,
            default_row_cap,
        }
    }

    /// Resolve one request: correct, gate, then plan-execute-observe until a
    /// final answer emerges or the iteration budget runs out.
    pub async fn resolve(
        &self,
        raw: &str,
        history: &[ConversationTurn],
    ) -> Result<Resolution, AgentError> {
        let corrected = self.corrector.correct(raw).await;

        // The gate runs BEFORE any planning, so refused requests cost zero
        // catalog queries.
        if !guard::in_domain(&corrected, history) {
            tracing::info!("refusing out-of-domain request: {}", corrected);
            return Ok(Resolution::refusal());
        }

        let extracted = hints::extract(&corrected);
        let row_cap = extracted
            .requested_limit
            .map(|n| n as usize)
            .unwrap_or(self.default_row_cap);

        let mut messages =
            self.prompts
                .build_planner_messages(&corrected, history, &extracted, row_cap);

        let mut steps: Vec<PlannerStep> = Vec::new();
        let mut last_sql: Option<String> = None;
        // Rows of the most recent execution, and the last non-empty set for
        // best-effort answers.
        let mut last_rows: Vec<Value> = Vec::new();
        let mut best_rows: Vec<Value> = Vec::new();
        let mut state = PlannerState::Planning;

        for iteration in 1..=self.max_iterations {
            tracing::debug!("planner iteration {} ({:?})", iteration, state);

            let mut options = GenerateOptions::default();
            options.messages = messages.clone();
            let reply = match self.llm.generate_with_options(options).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("generation failed after retries: {}", e);
                    if best_rows.is_empty() {
                        return Err(AgentError::Resolution(e.to_string()));
                    }
                    // Something was observed; answer from it rather than
                    // discarding the work done so far.
                    return Ok(Resolution {
                        response: composer::compose_partial(&best_rows),
                        sql: last_sql,
                        steps,
                    });
                }
            };

            let Some(call) = parse_tool_call(&reply) else {
                if looks_like_json(&reply) {
                    // JSON-shaped output that is not a valid tool call is
                    // never shown to the user and never executed.
                    tracing::warn!("discarding malformed tool-call output");
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(
                        "OBSERVATION: that was not a valid tool call. Reply with exactly one \
                         {\"type\":\"tool_call\",...} object, or answer in plain text."
                            .to_string(),
                    ));
                    continue;
                }

                state = PlannerState::Done;
                tracing::debug!("planner reached {:?} after {} iterations", state, iteration);
                tracing::debug!("planner trace: {:?}", steps);
                let response = if last_sql.is_some() && last_rows.is_empty() {
                    composer::ensure_broadening(&reply)
                } else {
                    reply
                };
                return Ok(Resolution {
                    response,
                    sql: last_sql,
                    steps,
                });
            };

            steps.push(PlannerStep::ToolInvocation {
                tool: call.name.clone(),
                input: call.arguments.to_string(),
            });

            // Tool whitelisting: only registered tools execute.
            let Some(tool) = self.tools.get(&call.name) else {
                tracing::warn!("rejected unknown tool call: {}", call.name);
                messages.push(ChatMessage::assistant(reply));
                messages.push(ChatMessage::user(format!(
                    "OBSERVATION: there is no tool named '{}'. The only tool is sql_query.",
                    call.name
                )));
                continue;
            };

            state = PlannerState::Executing;
            tracing::debug!("planner state: {:?}", state);
            let input = ToolInput {
                payload: call.arguments.clone(),
                row_cap,
            };

            match tool.execute(input).await {
                Ok(output) => {
                    state = PlannerState::Observing;
                    tracing::debug!("planner state: {:?}", state);
                    let sql = output
                        .payload
                        .get("sql")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let rows: Vec<Value> = output
                        .payload
                        .get("rows")
                        .and_then(|v| v.as_array())
                        .cloned()
                        .unwrap_or_default();

                    last_sql = Some(sql.clone());
                    last_rows = rows.clone();
                    if !rows.is_empty() {
                        best_rows = rows.clone();
                    }
                    steps.push(PlannerStep::Observation {
                        sql,
                        rows: rows.clone(),
                    });

                    let observation = serde_json::to_string(&output.payload)
                        .unwrap_or_else(|_| "{\"error\":\"unreadable observation\"}".to_string());
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(format!("OBSERVATION: {}", observation)));
                    state = PlannerState::Planning;
                }
                Err(ToolError::Rejected(reason)) => {
                    // The safety filter said no. The attempt is recorded and
                    // the planner may reformulate; the catalog was untouched.
                    let sql = call
                        .arguments
                        .get("sql")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    steps.push(PlannerStep::Blocked {
                        sql,
                        reason: reason.clone(),
                    });
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(format!(
                        "OBSERVATION: the query was rejected ({}). Write a single read-only \
                         SELECT over the properties table only.",
                        reason
                    )));
                    state = PlannerState::Planning;
                }
                Err(ToolError::InvalidParameters(detail)) => {
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(format!(
                        "OBSERVATION: invalid tool arguments ({}).",
                        detail
                    )));
                    state = PlannerState::Planning;
                }
                Err(ToolError::Catalog(e @ crate::catalog::CatalogError::Connection(_))) => {
                    // Retries already happened inside the accessor.
                    return Err(AgentError::Catalog(e));
                }
                Err(ToolError::Catalog(e)) => {
                    // Execution errors (bad column, syntax slip) are fixable
                    // by the planner.
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(format!(
                        "OBSERVATION: the query failed to execute ({}). Fix the SQL and try \
                         again.",
                        e
                    )));
                    state = PlannerState::Planning;
                }
            }
        }

        state = PlannerState::Aborted;
        tracing::warn!(
            "planner hit the iteration ceiling ({}) for: {} ({:?}, {} steps)",
            self.max_iterations,
            corrected,
            state,
            steps.len()
        );

        if best_rows.is_empty() {
            return Err(AgentError::Resolution(
                "iteration budget exhausted with nothing observed".to_string(),
            ));
        }

        Ok(Resolution {
            response: composer::compose_partial(&best_rows),
            sql: last_sql,
            steps,
        })
    }
}

/// Check if text looks like JSON (starts with { or a code fence)
fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') || trimmed.starts_with("```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemCatalog;
    use crate::llm::StubLlm;
    use crate::model::Role;
    use crate::tools::sql_query::SqlQueryTool;
    use serde_json::json;

    const MARINA_SQL: &str = "SELECT * FROM properties WHERE location ILIKE '%dubai marina%' \
                              AND type = 'Apartment' AND bedrooms = 2 AND price < 3000000 LIMIT 12";

    fn marina_row() -> Value {
        json!({
            "id": 1,
            "location": "Dubai Marina",
            "type": "Apartment",
            "bedrooms": 2,
            "price": 2_450_000,
            "available": true,
            "possession": "Ready"
        })
    }

    fn tool_call(sql: &str) -> String {
        json!({
            "type": "tool_call",
            "name": "sql_query",
            "arguments": {"sql": sql}
        })
        .to_string()
    }

    fn executor(replies: Vec<&str>, catalog: Arc<MemCatalog>) -> Executor {
        executor_with_budget(replies, catalog, 12)
    }

    fn executor_with_budget(
        replies: Vec<&str>,
        catalog: Arc<MemCatalog>,
        max_iterations: usize,
    ) -> Executor {
        let llm = Arc::new(StubLlm::scripted(replies));
        let mut registry = ToolRegistry::new();
        registry.register(SqlQueryTool::new(catalog));
        Executor::new(llm, Arc::new(registry), max_iterations, 12)
    }

    #[tokio::test]
    async fn out_of_domain_refusal_issues_zero_catalog_queries() {
        let catalog = Arc::new(MemCatalog::empty());
        // One scripted reply for the correction pass; planning never starts.
        let exec = executor(vec!["what's the weather like today"], catalog.clone());

        let resolution = exec.resolve("whats the wether like today", &[]).await.unwrap();

        assert_eq!(resolution.response, guard::REFUSAL_TEXT);
        assert_eq!(resolution.sql, None);
        assert!(catalog.executed_queries().is_empty());
        assert!(resolution.steps.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_marina_query_returns_the_row_and_the_sql() {
        let catalog = Arc::new(MemCatalog::with_rows(vec![marina_row()]));
        let call = tool_call(MARINA_SQL);
        let exec = executor(
            vec![
                "2 bedroom apartments in Dubai Marina under 3 million AED",
                call.as_str(),
                "I found 1 match: a 2 bedroom Apartment in Dubai Marina for 2,450,000 AED, ready now.",
            ],
            catalog.clone(),
        );

        let resolution = exec
            .resolve("2 bedroom apartments in Dubai Marina under 3 million AED", &[])
            .await
            .unwrap();

        assert!(resolution.response.contains("Dubai Marina"));
        assert!(resolution.response.contains("2,450,000"));
        assert_eq!(resolution.sql.as_deref(), Some(MARINA_SQL));
        assert_eq!(catalog.executed_queries(), vec![MARINA_SQL.to_string()]);
        assert!(resolution
            .steps
            .iter()
            .any(|s| matches!(s, PlannerStep::Observation { rows, .. } if rows.len() == 1)));
    }

    #[tokio::test]
    async fn blocked_query_is_reformulated_and_never_executed() {
        let catalog = Arc::new(MemCatalog::with_rows(vec![marina_row()]));
        let bad = tool_call("DROP TABLE properties");
        let good = tool_call("SELECT * FROM properties LIMIT 12");
        let exec = executor(
            vec![
                "show me all properties",
                bad.as_str(),
                good.as_str(),
                "Here are the available properties.",
            ],
            catalog.clone(),
        );

        let resolution = exec.resolve("show me all properties", &[]).await.unwrap();

        // Only the safe query reached the catalog.
        assert_eq!(
            catalog.executed_queries(),
            vec!["SELECT * FROM properties LIMIT 12".to_string()]
        );
        assert!(resolution
            .steps
            .iter()
            .any(|s| matches!(s, PlannerStep::Blocked { .. })));
        assert_eq!(
            resolution.sql.as_deref(),
            Some("SELECT * FROM properties LIMIT 12")
        );
    }

    #[tokio::test]
    async fn iteration_ceiling_yields_best_effort_answer() {
        let catalog = Arc::new(MemCatalog::with_rows(vec![marina_row()]));
        let call = tool_call("SELECT * FROM properties LIMIT 12");
        // Correction + three tool calls, never a final answer: budget of 3.
        let exec = executor_with_budget(
            vec!["apartments in dubai", call.as_str(), call.as_str(), call.as_str()],
            catalog.clone(),
            3,
        );

        let resolution = exec.resolve("apartments in dubai", &[]).await.unwrap();

        assert!(resolution.response.contains("found so far"));
        assert!(resolution.response.contains("Dubai Marina"));
        assert_eq!(catalog.executed_queries().len(), 3);
    }

    #[tokio::test]
    async fn empty_result_carries_a_broadening_suggestion() {
        let catalog = Arc::new(MemCatalog::empty());
        let call = tool_call("SELECT * FROM properties WHERE price < 100 LIMIT 12");
        let exec = executor(
            vec![
                "apartments under 100 aed",
                call.as_str(),
                "There are no apartments at that price.",
            ],
            catalog.clone(),
        );

        let resolution = exec.resolve("apartments under 100 aed", &[]).await.unwrap();

        assert!(resolution.response.contains("broaden the search"));
        assert!(resolution.sql.is_some());
    }

    #[tokio::test]
    async fn generation_failure_without_observations_is_an_error() {
        let catalog = Arc::new(MemCatalog::empty());
        // Only the correction reply is scripted; the planner call fails.
        let exec = executor(vec!["apartments in dubai"], catalog);

        let result = exec.resolve("apartments in dubai", &[]).await;
        assert!(matches!(result, Err(AgentError::Resolution(_))));
    }

    #[tokio::test]
    async fn malformed_json_output_is_never_shown_or_executed() {
        let catalog = Arc::new(MemCatalog::empty());
        let exec = executor(
            vec![
                "apartments in dubai",
                "{\"this\": \"is not a tool call\"}",
                "Plain text answer about Dubai apartments.",
            ],
            catalog.clone(),
        );

        let resolution = exec.resolve("apartments in dubai", &[]).await.unwrap();

        assert_eq!(resolution.response, "Plain text answer about Dubai apartments.");
        assert!(catalog.executed_queries().is_empty());
    }

    #[tokio::test]
    async fn follow_up_resolves_with_history_context() {
        let catalog = Arc::new(MemCatalog::with_rows(vec![marina_row()]));
        let call = tool_call(
            "SELECT * FROM properties WHERE location ILIKE '%dubai marina%' \
             AND type = 'Apartment' AND possession = 'Ready' LIMIT 12",
        );
        let exec = executor(
            vec![
                "are they all ready?",
                call.as_str(),
                "Yes, the Dubai Marina apartment I listed is ready.",
            ],
            catalog.clone(),
        );

        let history = vec![
            ConversationTurn {
                role: Role::User,
                content: "2 bedroom apartments in Dubai Marina".to_string(),
            },
            ConversationTurn {
                role: Role::Assistant,
                content: "I found 1 apartment in Dubai Marina.".to_string(),
            },
        ];

        let resolution = exec.resolve("are they all ready?", &history).await.unwrap();

        // The guard let the keyword-less follow-up through and a query ran.
        assert_eq!(catalog.executed_queries().len(), 1);
        assert!(resolution.response.contains("ready"));
    }
}
