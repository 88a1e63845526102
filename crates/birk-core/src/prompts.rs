// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use birk_model::{Message, Role};
use birk_tools::ToolSchema;

// ─── Prompt sections ─────────────────────────────────────────────────────────
// Composed in a fixed order; each section is small enough to audit at a
// glance.

mod sections {
    pub fn identity() -> &'static str {
        "You are an autonomous software engineering agent. You work in \
         iterations: each of your responses performs exactly one action by \
         ending with a tool call, and the result comes back as the next \
         message."
    }

    pub fn principles() -> &'static str {
        "- Be concise and precise. Use tools instead of guessing.\n\
         - Gather the context you need before changing anything.\n\
         - When a tool fails, read the error and correct your call; do not repeat it verbatim.\n\
         - State assumptions explicitly when you cannot verify them."
    }

    pub fn code_quality() -> &'static str {
        "- Make changes production quality: clean separation of concerns, no dead code.\n\
         - Preserve existing structure and style of whatever you touch.\n\
         - Write or update tests alongside new functionality."
    }

    pub fn workflow() -> &'static str {
        "- Work in small verifiable steps; one tool call per response.\n\
         - Finish with task_completion once the task is done; its result text \
           is the only thing the user is guaranteed to read.\n\
         - Use ask_question only when you genuinely cannot proceed without input."
    }

    pub fn security() -> &'static str {
        "- Never exfiltrate secrets, tokens, or key material into notes, \
           memories, or results.\n\
         - Stay inside the project workspace unless a tool explicitly targets \
           elsewhere."
    }

    pub fn scratchpad() -> &'static str {
        "- Use add_note for decisions, findings, and open questions you will \
           need later in this session; tag consistently.\n\
         - search_notes before re-deriving something you may have noted already.\n\
         - scratch_note when an item is addressed; scratched notes stay searchable."
    }

    pub fn tool_use_rules() -> &'static str {
        "Every response MUST end with exactly one tool call in this form:\n\
         \n\
         <tool>\n\
         <tool_name>NAME</tool_name>\n\
         <arguments>\n\
         <param>value</param>\n\
         </arguments>\n\
         </tool>\n\
         \n\
         Rules:\n\
         - One call per response; text before the block is your visible reasoning.\n\
         - Argument values are taken exactly as written; wrap code in CDATA when in doubt.\n\
         - <server_name> is optional and defaults to \"local\"."
    }
}

/// Render the visible tool schemas as invocation documentation.
pub fn format_tool_schemas(schemas: &[ToolSchema]) -> String {
    if schemas.is_empty() {
        return "(no tools available)".to_string();
    }
    schemas
        .iter()
        .map(|s| {
            let mut out = format!("### {}", s.name);
            if s.loop_breaking {
                out.push_str(" (ends the turn)");
            }
            out.push('\n');
            out.push_str(&s.description);
            let params = format_parameters(&s.parameters);
            if !params.is_empty() {
                out.push_str("\nArguments:\n");
                out.push_str(&params);
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Flatten the top level of a JSON Schema into argument documentation.
fn format_parameters(schema: &serde_json::Value) -> String {
    let Some(props) = schema.get("properties").and_then(|p| p.as_object()) else {
        return String::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut names: Vec<&String> = props.keys().collect();
    names.sort();
    names
        .iter()
        .map(|name| {
            let p = &props[name.as_str()];
            let ty = p.get("type").and_then(|t| t.as_str()).unwrap_or("string");
            let desc = p.get("description").and_then(|d| d.as_str()).unwrap_or("");
            let req = if required.contains(&name.as_str()) { ", required" } else { "" };
            let shape = if ty == "array" {
                format!("repeated <{}> elements", singular(name))
            } else {
                ty.to_string()
            };
            format!("- {name} ({shape}{req}): {desc}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `tags` → `tag`, `suggestions` → `suggestion`; used to document repeated
/// element names for array parameters.
fn singular(name: &str) -> &str {
    name.strip_suffix('s').unwrap_or(name)
}

/// Compose the full system prompt in its fixed section order: identity,
/// principles, code quality, workflow, security, scratchpad, tool-use
/// rules, tool schemas, then the optional custom instructions and error
/// context.
pub fn system_prompt(
    schemas: &[ToolSchema],
    custom_instructions: Option<&str>,
    error_context: Option<&str>,
) -> String {
    let mut parts = vec![
        sections::identity().to_string(),
        format!("## Principles\n{}", sections::principles()),
        format!("## Code quality\n{}", sections::code_quality()),
        format!("## Workflow\n{}", sections::workflow()),
        format!("## Security\n{}", sections::security()),
        format!("## Scratchpad\n{}", sections::scratchpad()),
        format!("## Tool use\n{}", sections::tool_use_rules()),
        format!("## Available tools\n\n{}", format_tool_schemas(schemas)),
    ];
    if let Some(custom) = custom_instructions {
        if !custom.trim().is_empty() {
            parts.push(format!("## Additional instructions\n{custom}"));
        }
    }
    if let Some(err) = error_context {
        if !err.trim().is_empty() {
            parts.push(format!("## Error context\n{err}"));
        }
    }
    parts.join("\n\n")
}

/// Produce the message sequence for one provider call: one system message,
/// the transcript (prior system messages skipped, tool role remapped to
/// user so XML-mode providers receive a valid alternation), and an optional
/// fresh user message.
pub fn build_turn(system: &str, history: &[Message], fresh_user: Option<&str>) -> Vec<Message> {
    let mut out = Vec::with_capacity(history.len() + 2);
    out.push(Message::system(system));
    for m in history {
        match m.role {
            Role::System => continue,
            Role::Tool => {
                let mut remapped = m.clone();
                remapped.role = Role::User;
                out.push(remapped);
            }
            _ => out.push(m.clone()),
        }
    }
    if let Some(user) = fresh_user {
        out.push(Message::user(user));
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(name: &str, breaking: bool) -> ToolSchema {
        ToolSchema {
            name: name.into(),
            description: format!("{name} description"),
            parameters: json!({
                "type": "object",
                "properties": {
                    "result": { "type": "string", "description": "the result" },
                    "tags": { "type": "array", "description": "some tags" }
                },
                "required": ["result"]
            }),
            loop_breaking: breaking,
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let prompt = system_prompt(&[], None, None);
        let order = [
            "## Principles",
            "## Code quality",
            "## Workflow",
            "## Security",
            "## Scratchpad",
            "## Tool use",
            "## Available tools",
        ];
        let mut last = 0;
        for header in order {
            let pos = prompt.find(header).unwrap_or_else(|| panic!("missing {header}"));
            assert!(pos > last, "{header} out of order");
            last = pos;
        }
    }

    #[test]
    fn custom_instructions_and_error_context_come_last() {
        let prompt = system_prompt(&[], Some("house rules"), Some("you forgot the tool call"));
        let custom = prompt.find("house rules").unwrap();
        let err = prompt.find("you forgot the tool call").unwrap();
        assert!(custom < err);
        assert!(prompt.rfind("## Available tools").unwrap() < custom);
    }

    #[test]
    fn blank_optional_sections_are_omitted() {
        let prompt = system_prompt(&[], Some("  "), None);
        assert!(!prompt.contains("## Additional instructions"));
        assert!(!prompt.contains("## Error context"));
    }

    #[test]
    fn tool_schema_rendering_marks_loop_breakers_and_required() {
        let text = format_tool_schemas(&[schema("task_completion", true), schema("probe", false)]);
        assert!(text.contains("### task_completion (ends the turn)"));
        assert!(text.contains("### probe\n"));
        assert!(text.contains("- result (string, required): the result"));
        assert!(text.contains("- tags (repeated <tag> elements): some tags"));
    }

    #[test]
    fn build_turn_starts_with_single_system_message() {
        let history = vec![Message::system("stale"), Message::user("hi")];
        let turn = build_turn("fresh system", &history, None);
        assert_eq!(turn[0].role, Role::System);
        assert_eq!(turn[0].content, "fresh system");
        assert_eq!(
            turn.iter().filter(|m| m.role == Role::System).count(),
            1,
            "prior system messages must be skipped"
        );
    }

    #[test]
    fn build_turn_remaps_tool_role_to_user() {
        let history = vec![
            Message::user("do it"),
            Message::assistant("<tool>…</tool>"),
            Message::tool("tool says hi"),
        ];
        let turn = build_turn("sys", &history, None);
        assert!(turn.iter().all(|m| m.role != Role::Tool));
        let remapped = turn.iter().find(|m| m.content == "tool says hi").unwrap();
        assert_eq!(remapped.role, Role::User);
    }

    #[test]
    fn build_turn_appends_fresh_user_message() {
        let turn = build_turn("sys", &[], Some("new input"));
        assert_eq!(turn.len(), 2);
        assert_eq!(turn[1].role, Role::User);
        assert_eq!(turn[1].content, "new input");
    }
}
