//! Dual-model wrapper over the LLM client: one model phrases
//! conversational replies, a smaller one only ever emits an option number.
//! Failures never stop the conversation — phrasing degrades to the
//! caller's templated text and classification degrades to no hint.

use super::client::LlmClient;

/// Assistant persona for every generated reply.
pub const SYSTEM_PROMPT: &str = "Eres MediAgent, un asistente virtual médico amable y profesional.
Tu objetivo es ayudar a los pacientes a agendar citas médicas.
Responde siempre en español. Sé conciso, claro y usa un tono cálido.
Usa emojis médicos con moderación (🏥 👨‍⚕️ 📅 🕐 ✅) para hacer la conversación amigable.
NO inventes información. Solo usa los datos que se te proporcionan.";

pub struct Assistant {
    client: Box<dyn LlmClient>,
    chat_model: String,
    parse_model: String,
}

impl Assistant {
    pub fn new(client: Box<dyn LlmClient>, chat_model: &str, parse_model: &str) -> Self {
        Self {
            client,
            chat_model: chat_model.to_string(),
            parse_model: parse_model.to_string(),
        }
    }

    /// Ask the chat model to phrase a reply from structured facts.
    /// Returns `None` on any failure or empty output; the caller then uses
    /// its templated message. The returned prose is rendered as-is and
    /// never drives control flow.
    pub fn phrase(&self, facts_prompt: &str) -> Option<String> {
        match self.client.generate(&self.chat_model, facts_prompt, SYSTEM_PROMPT) {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Text generation failed, using templated message");
                None
            }
        }
    }

    /// Last-tier fallback: ask the parse model which enumerated option the
    /// utterance refers to. The answer is a hint, not ground truth — it is
    /// parsed and range-checked before use. Returns a zero-based index.
    pub fn classify_option(
        &self,
        utterance: &str,
        options_text: &str,
        max: usize,
    ) -> Option<usize> {
        let prompt = format!(
            "El paciente respondió: \"{utterance}\"\n\
             Las opciones eran:\n{options_text}\n\
             ¿Cuál opción eligió? Responde SOLO el número (1, 2, etc). \
             Si no es claro responde 0."
        );

        let reply = match self.client.generate(&self.parse_model, &prompt, "") {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Classification failed, keeping default choice");
                return None;
            }
        };

        let n: usize = reply.trim().parse().ok()?;
        if (1..=max).contains(&n) {
            Some(n - 1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::MockLlmClient;

    fn assistant(client: MockLlmClient) -> Assistant {
        Assistant::new(Box::new(client), "llama3.1:8b", "llama3.2:1b")
    }

    #[test]
    fn phrase_returns_trimmed_text() {
        let a = assistant(MockLlmClient::new("  Hola Lucía 🏥  "));
        assert_eq!(a.phrase("facts").unwrap(), "Hola Lucía 🏥");
    }

    #[test]
    fn phrase_degrades_on_failure() {
        let a = assistant(MockLlmClient::failing());
        assert!(a.phrase("facts").is_none());
    }

    #[test]
    fn phrase_rejects_empty_output() {
        let a = assistant(MockLlmClient::new("   "));
        assert!(a.phrase("facts").is_none());
    }

    #[test]
    fn classify_valid_index_is_zero_based() {
        let a = assistant(MockLlmClient::new("2"));
        assert_eq!(a.classify_option("la segunda", "1. A\n2. B", 2), Some(1));
    }

    #[test]
    fn classify_out_of_range_rejected() {
        let a = assistant(MockLlmClient::new("7"));
        assert_eq!(a.classify_option("texto", "1. A\n2. B", 2), None);
        let a = assistant(MockLlmClient::new("0"));
        assert_eq!(a.classify_option("texto", "1. A\n2. B", 2), None);
    }

    #[test]
    fn classify_non_numeric_rejected() {
        let a = assistant(MockLlmClient::new("la opción dos"));
        assert_eq!(a.classify_option("texto", "1. A\n2. B", 2), None);
    }

    #[test]
    fn classify_degrades_on_failure() {
        let a = assistant(MockLlmClient::failing());
        assert_eq!(a.classify_option("texto", "1. A", 1), None);
    }
}
