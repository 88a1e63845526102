// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("missing or empty required argument '{0}'")]
    Missing(String),
}

/// The raw `<arguments>` payload of a tool call.
///
/// The inner XML is kept verbatim; typed access decodes on demand.  Leaf
/// decoding is purely textual and deliberately tolerant of model output:
/// CDATA sections pass through verbatim, entity references (named and
/// numeric) are decoded, a bare `&` is taken literally, and nested markup
/// flattens to its text.  Values come back exactly as written (whitespace
/// included); only [`ToolArgs::require`] applies a non-empty-after-trim
/// check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs {
    raw: String,
}

impl ToolArgs {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The untouched argument bytes.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// Decoded text of the first element named `name`, at any depth.
    pub fn get(&self, name: &str) -> Option<String> {
        find_elements(&self.raw, name)
            .into_iter()
            .next()
            .map(|raw| decode_leaf(&raw))
    }

    /// Decoded text of every element named `name`, in document order.
    pub fn get_all(&self, name: &str) -> Vec<String> {
        find_elements(&self.raw, name)
            .into_iter()
            .map(|raw| decode_leaf(&raw))
            .collect()
    }

    /// Like [`get`](Self::get), but an absent or blank value is an error the
    /// tool reflects back to the model.
    pub fn require(&self, name: &str) -> Result<String, ArgError> {
        match self.get(name) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ArgError::Missing(name.to_string())),
        }
    }
}

/// Find the raw inner text of every non-overlapping `<name>...</name>`
/// occurrence (any depth, document order).  Self-closing `<name/>` counts
/// as an empty value.  An opening tag without its closing tag ends the
/// scan.
pub(crate) fn find_elements(xml: &str, name: &str) -> Vec<String> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(pos) = rest.find(&open) {
        let after = &rest[pos + open.len()..];
        if let Some(stripped) = after.strip_prefix("/>") {
            out.push(String::new());
            rest = stripped;
            continue;
        }
        let Some(gt) = after.find('>') else { break };
        let head = &after[..gt];
        // A longer element name sharing this prefix (e.g. <tags> while
        // searching <tag>): not ours, keep scanning behind the tag.
        if !head.is_empty() && !head.starts_with(char::is_whitespace) {
            rest = &after[gt + 1..];
            continue;
        }
        // <name attr="…"/> with attributes is still an empty value.
        if head.trim_end().ends_with('/') {
            out.push(String::new());
            rest = &after[gt + 1..];
            continue;
        }
        let body = &after[gt + 1..];
        match body.find(&close) {
            Some(end) => {
                out.push(body[..end].to_string());
                rest = &body[end + close.len()..];
            }
            None => break,
        }
    }
    out
}

/// Decode the raw inner text of an argument leaf: CDATA passes through
/// verbatim, nested tags flatten to their text, entities are decoded, and
/// a bare `&` stays literal.
pub(crate) fn decode_leaf(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        let Some(lt) = rest.find('<') else {
            decode_entities_into(rest, &mut out);
            return out;
        };
        decode_entities_into(&rest[..lt], &mut out);
        let tail = &rest[lt..];
        if let Some(cdata) = tail.strip_prefix("<![CDATA[") {
            match cdata.find("]]>") {
                Some(end) => {
                    out.push_str(&cdata[..end]);
                    rest = &cdata[end + 3..];
                }
                None => {
                    // Unterminated CDATA: take the remainder verbatim.
                    out.push_str(cdata);
                    return out;
                }
            }
        } else {
            match tail.find('>') {
                Some(gt) => rest = &tail[gt + 1..],
                None => return out,
            }
        }
    }
}

fn decode_entities_into(s: &str, out: &mut String) {
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let named = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ]
        .into_iter()
        .find_map(|(entity, ch)| tail.starts_with(entity).then(|| (ch.to_string(), entity.len())));

        match named.or_else(|| decode_numeric_reference(tail)) {
            Some((text, len)) => {
                out.push_str(&text);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
}

/// Decode a `&#<dec>;` / `&#x<hex>;` reference at the start of `s`,
/// returning the decoded text and consumed byte length.
fn decode_numeric_reference(s: &str) -> Option<(String, usize)> {
    let num = s.strip_prefix("&#")?;
    let (digits, radix, prefix_len) = match num.strip_prefix('x').or_else(|| num.strip_prefix('X'))
    {
        Some(hex) => (hex, 16, 3),
        None => (num, 10, 2),
    };
    let semi = digits.find(';')?;
    if semi == 0 {
        return None;
    }
    let code = u32::from_str_radix(&digits[..semi], radix).ok()?;
    let ch = char::from_u32(code)?;
    Some((ch.to_string(), prefix_len + semi + 1))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
