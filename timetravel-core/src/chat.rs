//! Scripted chatbot used when the backend assistant is unreachable.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub from_user: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            from_user: true,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn bot(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            from_user: false,
            timestamp: Utc::now(),
        }
    }
}

/// One keyword-triggered canned reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRule {
    pub keywords: Vec<String>,
    pub reply: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Reply produced by the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply<'a> {
    pub text: &'a str,
    pub suggestions: &'a [String],
}

/// An ordered rule list with a greeting and a fallback reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChatScript {
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub fallback: String,
    #[serde(default)]
    pub rules: Vec<ChatRule>,
}

impl ChatScript {
    /// Load a script from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a valid script.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The built-in script shipped with the crate.
    ///
    /// # Panics
    ///
    /// Panics if the embedded asset is invalid, which is a build defect.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_json(include_str!("../data/chat_script.json")).expect("valid builtin chat script")
    }

    /// First rule whose keyword occurs in the question (case-insensitive
    /// substring match) wins; otherwise the fallback reply is returned.
    #[must_use]
    pub fn reply_to(&self, question: &str) -> ScriptedReply<'_> {
        let normalized = question.to_lowercase();
        for rule in &self.rules {
            if rule
                .keywords
                .iter()
                .any(|kw| !kw.is_empty() && normalized.contains(&kw.to_lowercase()))
            {
                return ScriptedReply {
                    text: &rule.reply,
                    suggestions: &rule.suggestions,
                };
            }
        }
        ScriptedReply {
            text: &self.fallback,
            suggestions: &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_script_parses_and_has_rules() {
        let script = ChatScript::builtin();
        assert!(!script.greeting.is_empty());
        assert!(!script.fallback.is_empty());
        assert!(script.rules.len() >= 4);
    }

    #[test]
    fn first_matching_rule_wins() {
        let script = ChatScript {
            greeting: String::new(),
            fallback: "fallback".to_string(),
            rules: vec![
                ChatRule {
                    keywords: vec!["route".to_string()],
                    reply: "about routes".to_string(),
                    suggestions: vec![],
                },
                ChatRule {
                    keywords: vec!["route map".to_string()],
                    reply: "never reached".to_string(),
                    suggestions: vec![],
                },
            ],
        };
        assert_eq!(script.reply_to("show my ROUTE map").text, "about routes");
    }

    #[test]
    fn unmatched_question_gets_fallback() {
        let script = ChatScript::builtin();
        let reply = script.reply_to("what's the weather on mars");
        assert_eq!(reply.text, script.fallback);
        assert!(reply.suggestions.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let script = ChatScript::builtin();
        let lower = script.reply_to("how do missions work?").text.to_string();
        let upper = script.reply_to("HOW DO MISSIONS WORK?").text.to_string();
        assert_eq!(lower, upper);
    }

    #[test]
    fn script_roundtrips_through_json() {
        let script = ChatScript::builtin();
        let json = serde_json::to_string(&script).unwrap();
        assert_eq!(ChatScript::from_json(&json).unwrap(), script);
    }
}
