//! Model-facing reply protocol
//!
//! How the loop tells a tool request from a final answer in raw model output:
//!
//! - A reply whose first non-whitespace text is a ```` ```tool ```` fence,
//!   with the tag ending at a newline or other whitespace, is a tool request. The fence holds `{"tool": "<name>", "arguments": {...}}`
//!   and is closed by ```` ``` ````. Text after the closing fence is kept as
//!   trailing commentary.
//! - A reply whose first non-whitespace character is `{` is a tool request if
//!   it parses as a JSON object with a string `"tool"` key, and an answer
//!   otherwise.
//! - Any other non-empty reply is the final answer, verbatim.
//! - Empty replies, unterminated fences and unparseable tool JSON are
//!   malformed.
//!
//! The decision depends only on a prefix of the reply, which is what lets the
//! streaming adapter forward an answer while it is still being generated.

use serde_json::Value;

use crate::tool::ToolCall;

/// Opening fence of a tool request
pub const TOOL_FENCE: &str = "```tool";

const CLOSING_FENCE: &str = "```";

/// Interpretation of one completed model reply
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    /// Final answer for the user
    Answer(String),

    /// Request to run exactly one tool
    ToolRequest {
        call: ToolCall,
        /// Text after the closing fence, trimmed
        commentary: String,
    },

    /// Output that is neither; the reason is fed back to the model
    Malformed(String),
}

/// What is known about a reply from the text received so far
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyPrefix {
    /// Not enough text to decide
    Undecided,
    /// Definitely a final answer; safe to forward to the user
    Answer,
    /// May be a tool request; hold until the reply is complete
    Structured,
}

/// Classify a partial reply
pub fn classify_prefix(received: &str) -> ReplyPrefix {
    let text = received.trim_start();

    if text.is_empty() {
        return ReplyPrefix::Undecided;
    }
    if text.starts_with('{') {
        return ReplyPrefix::Structured;
    }

    match text.strip_prefix(TOOL_FENCE) {
        // "```tools" and the like are ordinary code blocks
        Some(rest) => match rest.chars().next() {
            None => ReplyPrefix::Undecided,
            Some(c) if c.is_whitespace() => ReplyPrefix::Structured,
            Some(_) => ReplyPrefix::Answer,
        },
        None if TOOL_FENCE.starts_with(text) => ReplyPrefix::Undecided,
        None => ReplyPrefix::Answer,
    }
}

/// Text after an opening tool fence whose tag ends at whitespace
fn after_tool_fence(text: &str) -> Option<&str> {
    text.strip_prefix(TOOL_FENCE)
        .filter(|rest| rest.chars().next().is_none_or(char::is_whitespace))
}

/// Interpret a complete reply
pub fn interpret(content: &str) -> ModelReply {
    let text = content.trim_start();

    if text.trim_end().is_empty() {
        return ModelReply::Malformed("the reply was empty".into());
    }

    if let Some(rest) = after_tool_fence(text) {
        let Some(end) = rest.find(CLOSING_FENCE) else {
            return ModelReply::Malformed("the ```tool block was not closed with ```".into());
        };
        let commentary = rest[end + CLOSING_FENCE.len()..].trim().to_string();

        return match parse_call(rest[..end].trim()) {
            Ok(call) => ModelReply::ToolRequest { call, commentary },
            Err(reason) => ModelReply::Malformed(reason),
        };
    }

    if text.starts_with('{') {
        let candidate = text.trim_end();
        let is_tool_object = serde_json::from_str::<Value>(candidate)
            .ok()
            .is_some_and(|v| v.get("tool").is_some_and(Value::is_string));

        if is_tool_object {
            return match parse_call(candidate) {
                Ok(call) => ModelReply::ToolRequest {
                    call,
                    commentary: String::new(),
                },
                Err(reason) => ModelReply::Malformed(reason),
            };
        }
    }

    ModelReply::Answer(content.to_string())
}

fn parse_call(json: &str) -> Result<ToolCall, String> {
    let mut call: ToolCall = serde_json::from_str(json)
        .map_err(|e| format!("the tool request is not valid JSON of the form {{\"tool\": ..., \"arguments\": {{...}}}}: {e}"))?;

    if call.name.trim().is_empty() {
        return Err("the tool request did not name a tool".into());
    }
    if call.id.is_none() {
        call.id = Some(uuid::Uuid::new_v4().to_string());
    }

    Ok(call)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fenced_tool_request() {
        let content = "```tool\n{\"tool\": \"order-status\", \"arguments\": {\"order_number\": \"123\"}}\n```\nChecking now.";

        match interpret(content) {
            ModelReply::ToolRequest { call, commentary } => {
                assert_eq!(call.name, "order-status");
                assert_eq!(call.arguments, json!({"order_number": "123"}));
                assert!(call.id.is_some());
                assert_eq!(commentary, "Checking now.");
            }
            other => panic!("expected tool request, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_json_tool_request() {
        let reply = interpret("  {\"tool\": \"store-policy\", \"arguments\": {\"topic\": \"returns\"}}");
        assert!(matches!(reply, ModelReply::ToolRequest { call, .. } if call.name == "store-policy"));
    }

    #[test]
    fn test_plain_answer_is_verbatim() {
        let content = "Returns are accepted within 30 days.\n";
        assert_eq!(interpret(content), ModelReply::Answer(content.to_string()));
    }

    #[test]
    fn test_fence_after_prose_is_an_answer() {
        let content = "Sure!\n```tool\n{\"tool\": \"x\"}\n```";
        assert!(matches!(interpret(content), ModelReply::Answer(_)));
    }

    #[test]
    fn test_json_without_tool_key_is_an_answer() {
        assert!(matches!(interpret("{\"note\": 1}"), ModelReply::Answer(_)));
        assert!(matches!(interpret("{ not json"), ModelReply::Answer(_)));
    }

    #[test]
    fn test_malformed_replies() {
        assert!(matches!(interpret("   \n"), ModelReply::Malformed(_)));
        assert!(matches!(
            interpret("```tool\n{\"tool\": \"x\"}"),
            ModelReply::Malformed(reason) if reason.contains("not closed")
        ));
        assert!(matches!(
            interpret("```tool\n{tool: x}\n```"),
            ModelReply::Malformed(_)
        ));
        assert!(matches!(
            interpret("```tool\n{\"tool\": \"  \"}\n```"),
            ModelReply::Malformed(_)
        ));
    }

    #[test]
    fn test_prefix_classification() {
        assert_eq!(classify_prefix(""), ReplyPrefix::Undecided);
        assert_eq!(classify_prefix("  \n"), ReplyPrefix::Undecided);
        assert_eq!(classify_prefix("``"), ReplyPrefix::Undecided);
        assert_eq!(classify_prefix(" ```to"), ReplyPrefix::Undecided);
        assert_eq!(classify_prefix("```tool\n{"), ReplyPrefix::Structured);
        assert_eq!(classify_prefix("{\"to"), ReplyPrefix::Structured);
        assert_eq!(classify_prefix("```rust"), ReplyPrefix::Answer);
        assert_eq!(classify_prefix("Our store"), ReplyPrefix::Answer);
        assert_eq!(classify_prefix("```tool"), ReplyPrefix::Undecided);
        assert_eq!(classify_prefix("```tool {"), ReplyPrefix::Structured);
        assert_eq!(classify_prefix("```tools"), ReplyPrefix::Answer);
    }

    #[test]
    fn test_longer_fence_tags_are_answers() {
        for content in [
            "```tools\nhammer, saw, drill\n```",
            "```toolbox\n{\"tool\": \"order-status\", \"arguments\": {}}\n```",
        ] {
            assert_eq!(classify_prefix(content), ReplyPrefix::Answer);
            assert_eq!(interpret(content), ModelReply::Answer(content.to_string()));
        }
    }

    #[test]
    fn test_prefix_answer_agrees_with_interpret() {
        for content in ["Hello there", "```text\nblock\n```", "  Yes."] {
            assert_eq!(classify_prefix(content), ReplyPrefix::Answer);
            assert_eq!(interpret(content), ModelReply::Answer(content.to_string()));
        }
    }
}
