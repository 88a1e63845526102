// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use birk_notes::{ListOptions, Note, SearchOptions};

use crate::tool::{Preview, Tool, ToolCall, ToolContext, ToolOutput};
use crate::ToolArgs;

/// Save a tagged note to the session scratchpad.
pub struct AddNoteTool;

/// Rewrite a note's content and/or tags.
pub struct UpdateNoteTool;

/// List scratchpad notes, optionally filtered by tag.
pub struct ListNotesTool;

/// Search scratchpad notes by substring and tags.
pub struct SearchNotesTool;

/// Mark a note as addressed.
pub struct ScratchNoteTool;

fn format_note(n: &Note) -> String {
    let flag = if n.scratched { " (scratched)" } else { "" };
    format!("{} [{}]{}: {}", n.id, n.tags.join(", "), flag, n.content)
}

fn format_notes(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "(no notes)".to_string();
    }
    notes.iter().map(format_note).collect::<Vec<_>>().join("\n")
}

/// Collect `<tag>` elements, accepting a comma-separated single `<tags>`
/// value as a fallback; models mix both shapes.
fn collect_tags(call: &ToolCall) -> Vec<String> {
    let tags = call.args.get_all("tag");
    if !tags.is_empty() {
        return tags;
    }
    call.args
        .get("tags")
        .map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_limit(call: &ToolCall) -> usize {
    call.args
        .get("limit")
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(10)
}

#[async_trait]
impl Tool for AddNoteTool {
    fn name(&self) -> &str {
        "add_note"
    }

    fn description(&self) -> &str {
        "Save a short note (max 800 chars) to the session scratchpad with 1-5 \
         tags.  Use for decisions, open questions, and findings you will need \
         later in the session.  Tags are lower-cased; pass each one as its own \
         <tag> element inside <tags>."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Note text, 1-800 characters"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "1-5 tags (repeated <tag> elements)",
                    "minItems": 1,
                    "maxItems": 5
                }
            },
            "required": ["content", "tags"]
        })
    }

    fn generate_preview(&self, args: &ToolArgs) -> Option<Preview> {
        let content = args.get("content")?;
        Some(Preview {
            title: "Add scratchpad note".to_string(),
            body: content,
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let content = match call.args.require("content") {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(e.to_string()),
        };
        let tags = collect_tags(call);
        match ctx.notes.add(&content, &tags) {
            Ok(note) => {
                debug!(id = %note.id, "add_note tool");
                ToolOutput::ok(format!("Saved {}", format_note(&note)))
                    .with_meta("note_id", note.id)
            }
            Err(e) => ToolOutput::err(e.to_string()),
        }
    }
}

#[async_trait]
impl Tool for UpdateNoteTool {
    fn name(&self) -> &str {
        "update_note"
    }

    fn description(&self) -> &str {
        "Update an existing scratchpad note.  Only the fields you pass \
         change; omitted fields keep their value."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Note id from add_note/list_notes" },
                "content": { "type": "string", "description": "New note text" },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Replacement tags (repeated <tag> elements)"
                }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let id = match call.args.require("id") {
            Ok(i) => i,
            Err(e) => return ToolOutput::err(e.to_string()),
        };
        let content = call.args.get("content");
        let tags = collect_tags(call);
        let tags_opt: Option<&[String]> = if tags.is_empty() { None } else { Some(&tags) };
        match ctx.notes.update(id.trim(), content.as_deref(), tags_opt) {
            Ok(note) => ToolOutput::ok(format!("Updated {}", format_note(&note))),
            Err(e) => ToolOutput::err(e.to_string()),
        }
    }
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }

    fn description(&self) -> &str {
        "List scratchpad notes, newest-updated first.  Optionally filter by a \
         single tag.  Scratched notes are hidden unless include_scratched is \
         true."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tag": { "type": "string", "description": "Only notes carrying this tag" },
                "include_scratched": {
                    "type": "boolean",
                    "description": "Also list scratched notes (default false)"
                },
                "limit": { "type": "integer", "description": "Max notes returned (default 10)" }
            },
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let opts = ListOptions {
            tag: call.args.get("tag").map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            include_scratched: call
                .args
                .get("include_scratched")
                .map(|v| v.trim() == "true")
                .unwrap_or(false),
            limit: parse_limit(call),
        };
        let notes = ctx.notes.list(&opts);
        let tags = ctx.notes.list_tags();
        let mut out = format_notes(&notes);
        if !tags.is_empty() {
            out.push_str(&format!("\nTags in use: {}", tags.join(", ")));
        }
        ToolOutput::ok(out)
    }
}

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "search_notes"
    }

    fn description(&self) -> &str {
        "Search scratchpad notes by case-insensitive substring and/or tags \
         (all given tags must match).  Searches scratched notes too, so past \
         decisions stay findable."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Substring to find in note content" },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tags that must all be present (repeated <tag> elements)"
                },
                "limit": { "type": "integer", "description": "Max notes returned (default 10)" }
            },
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        // The manager defaults to hiding scratched notes; the tool layer
        // deliberately searches them so the model can find addressed items.
        let opts = SearchOptions {
            query: call.args.get("query").unwrap_or_default(),
            tags: collect_tags(call),
            include_scratched: true,
            limit: parse_limit(call),
        };
        let notes = ctx.notes.search(&opts);
        debug!(hits = notes.len(), "search_notes tool");
        ToolOutput::ok(format_notes(&notes))
    }
}

#[async_trait]
impl Tool for ScratchNoteTool {
    fn name(&self) -> &str {
        "scratch_note"
    }

    fn description(&self) -> &str {
        "Mark a scratchpad note as addressed.  Scratched notes disappear from \
         default listings but stay searchable for audit."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Note id to scratch" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let id = match call.args.require("id") {
            Ok(i) => i,
            Err(e) => return ToolOutput::err(e.to_string()),
        };
        match ctx.notes.scratch(id.trim()) {
            Ok(note) => ToolOutput::ok(format!("Scratched {}", note.id)),
            Err(e) => ToolOutput::err(e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
