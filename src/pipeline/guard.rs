use crate::model::ConversationTurn;

/// Fixed response for out-of-domain requests. Returned as a normal success
/// payload, never as an error.
pub const REFUSAL_TEXT: &str =
    "Sorry, I can only help with Dubai real estate property searches.";

/// Vocabulary that marks a request as being about Dubai property search.
/// Matched by lowercased containment, so "bedrooms" and "properties" hit
/// their singular forms.
const DOMAIN_KEYWORDS: &[&str] = &[
    "dubai",
    "property",
    "apartment",
    "villa",
    "townhouse",
    "penthouse",
    "bedroom",
    "aed",
    "possession",
    "studio",
    "real estate",
];

/// Pronouns and determiners that make a keyword-less turn a plausible
/// follow-up to an earlier in-domain turn.
const REFERENTIAL_TOKENS: &[&str] = &["they", "them", "these", "those", "it", "any", "ones"];

/// Whether a single turn references the domain on its own.
pub fn mentions_domain(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DOMAIN_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Domain gate for an incoming turn.
///
/// A turn passes on its own keywords. A turn without keywords passes only
/// as a follow-up: some earlier turn must be in-domain AND the current turn
/// must carry a referential token ("are they all ready?"). Unrelated small
/// talk is refused even mid-conversation.
pub fn in_domain(text: &str, history: &[ConversationTurn]) -> bool {
    if mentions_domain(text) {
        return true;
    }

    let conversation_is_on_topic = history.iter().any(|turn| mentions_domain(&turn.content));
    conversation_is_on_topic && has_referential_token(text)
}

fn has_referential_token(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| REFERENTIAL_TOKENS.contains(&word))
}
