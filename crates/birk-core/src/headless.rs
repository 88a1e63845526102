// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

/// Analyse a tool failure and produce retry guidance for the model.
///
/// Interactive runs surface failures and let the user react; an unattended
/// run has nobody to react, so the error reflected to the model carries a
/// concrete next step instead.
pub fn retry_hint(tool: &str, error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("unknown tool") {
        "Retry guidance: that tool does not exist. Use one of the tools listed \
         in the system prompt, spelled exactly as shown."
            .to_string()
    } else if lower.contains("missing or empty required argument") {
        format!(
            "Retry guidance: re-read the argument schema of '{tool}' in the \
             system prompt and retry with every required element present and \
             non-empty."
        )
    } else if lower.contains("timed out") {
        format!(
            "Retry guidance: '{tool}' exceeded its time budget. Retry with a \
             smaller scope, or break the operation into several calls."
        )
    } else if lower.contains("denied") || lower.contains("allow list") {
        "Retry guidance: that path is outside this run's constraints. Work \
         only within the allowed files."
            .to_string()
    } else {
        format!(
            "Retry guidance: adjust the arguments or take a different \
             approach; do not repeat the same '{tool}' call unchanged."
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_points_at_the_tool_list() {
        let hint = retry_hint("ghost", "unknown tool: ghost");
        assert!(hint.contains("listed in the system prompt"));
    }

    #[test]
    fn missing_argument_points_at_the_schema() {
        let hint = retry_hint("task_completion", "missing or empty required argument 'result'");
        assert!(hint.contains("task_completion"));
        assert!(hint.contains("required element"));
    }

    #[test]
    fn timeout_suggests_smaller_scope() {
        let hint = retry_hint("search", "timed out after 180s");
        assert!(hint.contains("smaller scope"));
    }

    #[test]
    fn constraint_violation_names_the_allow_list() {
        let hint = retry_hint("write", "path '/etc/passwd' is denied by headless constraints");
        assert!(hint.contains("constraints"));
    }

    #[test]
    fn fallback_discourages_identical_retry() {
        let hint = retry_hint("probe", "some opaque failure");
        assert!(hint.contains("do not repeat"));
    }
}
