// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::{ToolArgs, ToolCall};

/// Upper bound on the text handed to the parser.  Anything larger fails
/// fast instead of being scanned.
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Server a call is routed to when the model omits `<server_name>`.
pub const DEFAULT_SERVER: &str = "local";

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("tool-call input exceeds {MAX_INPUT_BYTES} bytes (got {0})")]
    OversizeInput(usize),
    #[error("tool call has a missing or empty <tool_name>")]
    MissingToolName,
    #[error("malformed tool call: {0}")]
    Malformed(String),
}

/// An assistant message split around its tool block.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    /// Text before the tool block (the model's visible reasoning)
    pub thinking: String,
    /// The parsed call, when a block was present
    pub call: Option<ToolCall>,
    /// Text after the tool block
    pub remaining: String,
}

/// Split an assistant message into thinking / tool call / remaining.
///
/// At most one `<tool>...</tool>` block is extracted (the first).  A
/// message without a block is not an error; the caller reads `call: None`
/// as "no tool call".  An opening `<tool>` without its closing tag is
/// malformed: silently ignoring it would swallow a call the model meant to
/// make.
pub fn parse_response(text: &str) -> Result<ParsedResponse, ToolCallError> {
    if text.len() > MAX_INPUT_BYTES {
        return Err(ToolCallError::OversizeInput(text.len()));
    }
    let Some(start) = text.find("<tool>") else {
        return Ok(ParsedResponse {
            thinking: text.to_string(),
            call: None,
            remaining: String::new(),
        });
    };
    let Some(end_rel) = text[start..].find("</tool>") else {
        return Err(ToolCallError::Malformed("unclosed <tool> block".into()));
    };
    let end = start + end_rel + "</tool>".len();
    let call = parse_tool_block(&text[start..end])?;
    Ok(ParsedResponse {
        thinking: text[..start].to_string(),
        call: Some(call),
        remaining: text[end..].to_string(),
    })
}

/// Parse one `<tool>...</tool>` block.
///
/// The block is XML-decoded once for validation and name extraction; if that
/// fails, it is retried once with bare ampersands escaped (models routinely
/// emit `&&` in code arguments).  The `<arguments>` payload is sliced out of
/// the *original* text so the tool sees the bytes exactly as the model wrote
/// them, whitespace included.
pub fn parse_tool_block(block: &str) -> Result<ToolCall, ToolCallError> {
    if block.len() > MAX_INPUT_BYTES {
        return Err(ToolCallError::OversizeInput(block.len()));
    }
    if let Err(first_err) = validate_block(block) {
        match escape_bare_ampersands(block) {
            // Nothing was rewritten, so a retry would fail identically.
            Cow::Borrowed(_) => return Err(first_err),
            Cow::Owned(escaped) => validate_block(&escaped).map_err(|_| first_err)?,
        }
    }

    // Name extraction ignores the arguments span so a payload that happens
    // to contain a <tool_name> element cannot shadow the real one.
    let outline = strip_arguments_span(block);
    let name = leaf_value(&outline, "tool_name")
        .filter(|n| !n.is_empty())
        .ok_or(ToolCallError::MissingToolName)?;
    let server = leaf_value(&outline, "server_name")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());

    Ok(ToolCall {
        server,
        name,
        args: ToolArgs::new(extract_arguments_verbatim(block)),
    })
}

/// The block with everything from `<arguments>` through `</arguments>`
/// removed.
fn strip_arguments_span(block: &str) -> String {
    let Some(open) = block.find("<arguments") else {
        return block.to_string();
    };
    let tail = match block.rfind("</arguments>") {
        Some(close) if close >= open => &block[close + "</arguments>".len()..],
        _ => "",
    };
    format!("{}{}", &block[..open], tail)
}

/// Rewrite every `&` that does not start a valid entity reference into
/// `&amp;`.  Purely textual and positional; no other repair is attempted.
pub fn escape_bare_ampersands(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    let mut changed = false;
    for (i, ch) in text.char_indices() {
        if ch == '&' && !is_entity_start(&text[i..]) {
            out.push_str("&amp;");
            changed = true;
        } else {
            out.push(ch);
        }
    }
    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

/// True when `s` (which starts with `&`) begins one of the references the
/// escape pass must leave alone: the five named entities, `&#<dec>;`, or
/// `&#x<hex>;`.
fn is_entity_start(s: &str) -> bool {
    for named in ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"] {
        if s.starts_with(named) {
            return true;
        }
    }
    let Some(num) = s.strip_prefix("&#") else {
        return false;
    };
    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
        matches!(hex.find(';'), Some(n) if n > 0 && hex[..n].bytes().all(|b| b.is_ascii_hexdigit()))
    } else {
        matches!(num.find(';'), Some(n) if n > 0 && num[..n].bytes().all(|b| b.is_ascii_digit()))
    }
}

/// Slice the raw `<arguments>` payload out of the original block text.
/// Absent or self-closing `<arguments>` yields an empty payload.
fn extract_arguments_verbatim(block: &str) -> String {
    let Some(open) = block.find("<arguments>") else {
        return String::new();
    };
    let start = open + "<arguments>".len();
    match block.rfind("</arguments>") {
        Some(close) if close >= start => block[start..close].to_string(),
        _ => String::new(),
    }
}

/// First value of a direct-child leaf, decoded and trimmed.  `Some("")`
/// distinguishes a present-but-empty element from an absent one.
fn leaf_value(block: &str, name: &str) -> Option<String> {
    crate::args::find_elements(block, name)
        .into_iter()
        .next()
        .map(|raw| crate::args::decode_leaf(&raw).trim().to_string())
}

/// Run the block through quick-xml once to check well-formedness and entity
/// validity.  Text nodes are unescaped purely for the error: an invalid
/// entity anywhere in the block triggers the ampersand-escape retry.
fn validate_block(block: &str) -> Result<(), ToolCallError> {
    let mut reader = Reader::from_str(block);
    loop {
        match reader.read_event() {
            Err(e) => return Err(ToolCallError::Malformed(e.to_string())),
            Ok(Event::Eof) => return Ok(()),
            Ok(Event::Text(t)) => {
                t.unescape()
                    .map_err(|e| ToolCallError::Malformed(e.to_string()))?;
            }
            Ok(_) => {}
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
