// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use birk_memory::{latest_version, version_chain, MemoryFile};

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Read access to the long-term memory store.
///
/// The store is written by an external capture pass; this tool only reads.
/// It hides itself from the prompt while the store is empty: there is
/// nothing to recall, so the schema would be dead weight.
pub struct RecallMemoryTool;

fn format_entry(m: &MemoryFile) -> String {
    format!(
        "{} v{} [{:?}/{:?}] updated {}",
        m.meta.id,
        m.meta.version,
        m.meta.scope,
        m.meta.category,
        m.meta.updated_at.format("%Y-%m-%d")
    )
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }

    fn description(&self) -> &str {
        "Read long-term memories captured in earlier sessions.\n\
         Operations:\n\
         - list: every stored memory (id, version, scope, category)\n\
         - read: full text of one memory by id\n\
         - latest: resolve the newest version of a memory and read it\n\
         Consult this at the start of non-trivial tasks; project conventions \
         and earlier decisions live here."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["list", "read", "latest"],
                    "description": "What to do"
                },
                "id": {
                    "type": "string",
                    "description": "Memory id (required for read/latest)"
                }
            },
            "required": ["operation"]
        })
    }

    fn should_show(&self, ctx: &ToolContext) -> bool {
        ctx.memory.list(None).map(|m| !m.is_empty()).unwrap_or(false)
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let op = match call.args.require("operation") {
            Ok(o) => o.trim().to_string(),
            Err(e) => return ToolOutput::err(e.to_string()),
        };

        debug!(op = %op, "recall_memory tool");

        match op.as_str() {
            "list" => match ctx.memory.list(None) {
                Ok(mut mems) => {
                    if mems.is_empty() {
                        return ToolOutput::ok("(no memories stored)");
                    }
                    mems.sort_by(|a, b| b.meta.updated_at.cmp(&a.meta.updated_at));
                    let lines: Vec<String> = mems.iter().map(format_entry).collect();
                    ToolOutput::ok(lines.join("\n"))
                }
                Err(e) => ToolOutput::err(format!("memory list failed: {e}")),
            },
            "read" => {
                let id = match call.args.require("id") {
                    Ok(i) => i.trim().to_string(),
                    Err(e) => return ToolOutput::err(e.to_string()),
                };
                match ctx.memory.read(&id) {
                    Ok(mem) => ToolOutput::ok(format!("{}\n\n{}", format_entry(&mem), mem.body)),
                    Err(e) => ToolOutput::err(e.to_string()),
                }
            }
            "latest" => {
                let id = match call.args.require("id") {
                    Ok(i) => i.trim().to_string(),
                    Err(e) => return ToolOutput::err(e.to_string()),
                };
                match latest_version(&ctx.memory, &id) {
                    Ok(tip) => {
                        let depth = version_chain(&ctx.memory, &tip.meta.id, 32)
                            .map(|c| c.len())
                            .unwrap_or(1);
                        ToolOutput::ok(format!(
                            "{} ({} version(s) in chain)\n\n{}",
                            format_entry(&tip),
                            depth,
                            tip.body
                        ))
                    }
                    Err(e) => ToolOutput::err(e.to_string()),
                }
            }
            other => ToolOutput::err(format!("unknown operation: {other}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use crate::ToolArgs;
    use birk_memory::{new_version, CaptureTrigger, MemoryCategory, MemoryScope};

    fn call(raw: &str) -> ToolCall {
        ToolCall {
            server: "local".into(),
            name: "recall_memory".into(),
            args: ToolArgs::new(raw),
        }
    }

    fn seed(ctx: &ToolContext, body: &str) -> MemoryFile {
        let m = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::ProjectConventions,
            "sess",
            CaptureTrigger::Cadence,
            body,
        );
        ctx.memory.write(&m).unwrap();
        m
    }

    #[tokio::test]
    async fn hidden_while_store_is_empty() {
        let (_d, ctx) = test_context();
        assert!(!RecallMemoryTool.should_show(&ctx));
        seed(&ctx, "something");
        assert!(RecallMemoryTool.should_show(&ctx));
    }

    #[tokio::test]
    async fn list_reports_entries() {
        let (_d, ctx) = test_context();
        let m = seed(&ctx, "convention body");
        let out = RecallMemoryTool
            .execute(&ctx, &call("<operation>list</operation>"))
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains(&m.meta.id));
    }

    #[tokio::test]
    async fn read_returns_body() {
        let (_d, ctx) = test_context();
        let m = seed(&ctx, "remember the workspace layout");
        let out = RecallMemoryTool
            .execute(
                &ctx,
                &call(&format!("<operation>read</operation><id>{}</id>", m.meta.id)),
            )
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("remember the workspace layout"));
    }

    #[tokio::test]
    async fn read_unknown_id_surfaces_not_found() {
        let (_d, ctx) = test_context();
        seed(&ctx, "x");
        let out = RecallMemoryTool
            .execute(&ctx, &call("<operation>read</operation><id>mem_ghost</id>"))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not found"));
    }

    #[tokio::test]
    async fn latest_resolves_newest_version() {
        let (_d, ctx) = test_context();
        let v1 = seed(&ctx, "v1 body");
        let mut v2 = new_version(&v1, "sess-2", CaptureTrigger::Compaction);
        v2.body = "v2 body".into();
        ctx.memory.write(&v2).unwrap();

        let out = RecallMemoryTool
            .execute(
                &ctx,
                &call(&format!("<operation>latest</operation><id>{}</id>", v1.meta.id)),
            )
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("v2 body"));
        assert!(out.content.contains("2 version(s)"));
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error() {
        let (_d, ctx) = test_context();
        seed(&ctx, "x");
        let out = RecallMemoryTool
            .execute(&ctx, &call("<operation>wipe</operation>"))
            .await;
        assert!(out.is_error);
    }
}
