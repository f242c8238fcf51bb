use crate::llm::ChatMessage;
use crate::model::{ConversationTurn, Role};
use crate::pipeline::hints::QueryHints;

/// Static planner prompt - immutable and schema-complete
pub fn planner_prompt() -> &'static str {
    include_str!("../prompts/planner.txt")
}

/// Static corrector prompt - returns corrected text only
pub fn corrector_prompt() -> &'static str {
    include_str!("../prompts/corrector.txt")
}

/// Assembles the message sequences sent to the generative backend.
#[derive(Clone)]
pub struct SystemPromptManager;

impl SystemPromptManager {
    pub fn new() -> Self {
        Self
    }

    /// System prompt + prior turns + the corrected request.
    ///
    /// History is carried as plain text only. There is no handle to prior
    /// result sets; referential follow-ups resolve from the transcript.
    pub fn build_planner_messages(
        &self,
        corrected: &str,
        history: &[ConversationTurn],
        hints: &QueryHints,
        row_cap: usize,
    ) -> Vec<ChatMessage> {
        let mut system = planner_prompt().to_string();

        system.push_str(&format!(
            "\nReturn at most {} rows unless the user explicitly asked for more.\n",
            row_cap
        ));

        if !hints.is_empty() {
            system.push_str(
                "\nConstraints detected in the current request. Your SQL WHERE clause must \
                 honor each one exactly as written:\n",
            );
            for line in hints.describe() {
                system.push_str("- ");
                system.push_str(&line);
                system.push('\n');
            }
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        for turn in history {
            messages.push(match turn.role {
                Role::User => ChatMessage::user(turn.content.clone()),
                Role::Assistant => ChatMessage::assistant(turn.content.clone()),
            });
        }
        messages.push(ChatMessage::user(corrected.to_string()));
        messages
    }

    pub fn build_corrector_messages(&self, raw: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(corrector_prompt()),
            ChatMessage::user(raw.to_string()),
        ]
    }
}

impl Default for SystemPromptManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::hints;

    #[test]
    fn planner_messages_interleave_history() {
        let manager = SystemPromptManager::new();
        let history = vec![
            ConversationTurn {
                role: Role::User,
                content: "villas in Emirates Hills".to_string(),
            },
            ConversationTurn {
                role: Role::Assistant,
                content: "I found 2 villas...".to_string(),
            },
        ];
        let messages = manager.build_planner_messages(
            "are they all ready?",
            &history,
            &QueryHints::default(),
            12,
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "are they all ready?");
    }

    #[test]
    fn detected_constraints_are_spelled_out() {
        let manager = SystemPromptManager::new();
        let extracted = hints::extract("2 bedroom apartments under 3 million AED");
        let messages = manager.build_planner_messages("whatever", &[], &extracted, 12);
        let system = &messages[0].content;
        assert!(system.contains("price < 3000000"));
        assert!(system.contains("bedrooms = 2"));
    }

    #[test]
    fn row_cap_is_stated() {
        let manager = SystemPromptManager::new();
        let messages =
            manager.build_planner_messages("villas", &[], &QueryHints::default(), 30);
        assert!(messages[0].content.contains("at most 30 rows"));
    }
}
