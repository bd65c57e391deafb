//! Upstream request composition
//!
//! Builds the exact payload sent to the upstream provider: the fixed legal
//! system directive first, then the caller's turns in their given order,
//! untouched. Composition is deterministic - no timestamps, no request ids.

use serde::Serialize;

use super::types::{ChatTurn, GenerationConfig, Role};

/// Fixed system directive prepended to every upstream request. Never mutated
/// per request and never persisted as part of the caller's history.
pub const LEGAL_SYSTEM_DIRECTIVE: &str = "\
You are a lawyer licensed to practice in the People's Republic of China, \
covering general practice areas including labor law, contract law, marriage \
law, and civil and commercial disputes. Answer questions in plain, accessible \
language and always state the statutory basis for your answer (for example, \
Article X of the Civil Code of the People's Republic of China).

Disclaimer: your answers do not constitute formal legal advice; for concrete \
cases, advise the user to consult a practicing lawyer. Your information is \
based on the law of mainland China - say so if another jurisdiction is \
involved.

Answer structure:
1. Briefly analyze the user's legal issue
2. Provide the relevant provisions and legal basis
3. Give concrete, actionable legal advice
4. Where necessary, point out potential risks and caveats

Stay professional and objective while keeping the language approachable and \
free of unnecessary jargon.";

/// The wire shape of one upstream chat-completions request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Compose the upstream payload for the given history and parameters.
///
/// The system directive is always message zero; caller turns follow in their
/// original order, unmodified and uncollapsed. An empty history degrades to a
/// directive-only request.
pub fn compose_request(history: &[ChatTurn], config: &GenerationConfig) -> UpstreamRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatTurn::new(Role::System, LEGAL_SYSTEM_DIRECTIVE));
    messages.extend_from_slice(history);

    UpstreamRequest {
        model: config.model.clone(),
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        stream: config.stream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> Vec<ChatTurn> {
        vec![
            ChatTurn::new(Role::User, "My employer has not paid overtime."),
            ChatTurn::new(Role::Assistant, "Under the Labor Law..."),
            ChatTurn::new(Role::User, "What evidence should I collect?"),
        ]
    }

    #[test]
    fn test_directive_is_always_first() {
        let request = compose_request(&sample_history(), &GenerationConfig::default());

        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, LEGAL_SYSTEM_DIRECTIVE);
    }

    #[test]
    fn test_caller_turns_follow_in_order_unmodified() {
        let history = sample_history();
        let request = compose_request(&history, &GenerationConfig::default());

        assert_eq!(request.messages.len(), history.len() + 1);
        for (composed, original) in request.messages[1..].iter().zip(&history) {
            assert_eq!(composed, original);
        }
    }

    #[test]
    fn test_empty_history_degrades_to_directive_only() {
        let request = compose_request(&[], &GenerationConfig::default());

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::System);
    }

    #[test]
    fn test_generation_parameters_carried_through() {
        let config = GenerationConfig {
            model: "deepseek-reasoner".to_string(),
            temperature: 1.3,
            max_tokens: 512,
            stream: true,
        };
        let request = compose_request(&sample_history(), &config);

        assert_eq!(request.model, "deepseek-reasoner");
        assert!((request.temperature - 1.3).abs() < f64::EPSILON);
        assert_eq!(request.max_tokens, 512);
        assert!(request.stream);
    }

    #[test]
    fn test_composition_is_deterministic() {
        let history = sample_history();
        let config = GenerationConfig::default();

        let a = serde_json::to_vec(&compose_request(&history, &config)).unwrap();
        let b = serde_json::to_vec(&compose_request(&history, &config)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_caller_system_turn_is_not_collapsed() {
        // A caller-supplied system turn stays where the caller put it; the
        // fixed directive still comes first.
        let history = vec![
            ChatTurn::new(Role::System, "Prefer short answers."),
            ChatTurn::new(Role::User, "Hello"),
        ];
        let request = compose_request(&history, &GenerationConfig::default());

        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].content, LEGAL_SYSTEM_DIRECTIVE);
        assert_eq!(request.messages[1].content, "Prefer short answers.");
    }
}
