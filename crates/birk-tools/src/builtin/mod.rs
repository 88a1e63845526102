// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod ask_question;
pub mod converse;
pub mod notes;
pub mod recall_memory;
pub mod task_completion;

pub use ask_question::AskQuestionTool;
pub use converse::ConverseTool;
pub use notes::{AddNoteTool, ListNotesTool, ScratchNoteTool, SearchNotesTool, UpdateNoteTool};
pub use recall_memory::RecallMemoryTool;
pub use task_completion::TaskCompletionTool;

use crate::{RegistryError, ToolRegistry};

/// Register the built-in tool set.
///
/// `task_completion` is always present; `ask_question` and `converse` are
/// skipped in headless runs, where there is nobody to answer.
pub fn register_builtins(reg: &mut ToolRegistry, headless: bool) -> Result<(), RegistryError> {
    reg.register(TaskCompletionTool)?;
    if !headless {
        reg.register(AskQuestionTool)?;
        reg.register(ConverseTool)?;
    }
    reg.register(AddNoteTool)?;
    reg.register(UpdateNoteTool)?;
    reg.register(ListNotesTool)?;
    reg.register(SearchNotesTool)?;
    reg.register(ScratchNoteTool)?;
    reg.register(RecallMemoryTool)?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
