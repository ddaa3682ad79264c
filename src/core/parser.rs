//! Extraction of the `<analysis>` verdict from a model response.
//!
//! Two tiers: a strict element-tree read of the `<analysis>` block, then, if
//! that block is not well-formed markup, a per-field regex scan of the whole
//! response. A `sequence` such as `<arrange,act>` written as bare text breaks
//! the first tier and is recovered by the second.

use regex::Regex;
use thiserror::Error;

use crate::core::models::outcome::{AnalysisOutcome, UNKNOWN};

const OPEN_TAG: &str = "<analysis>";
const CLOSE_TAG: &str = "</analysis>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Structured(AnalysisOutcome),
    Fallback(AnalysisOutcome),
    Failed,
}

impl ParseOutcome {
    pub fn into_outcome(self) -> Option<AnalysisOutcome> {
        match self {
            Self::Structured(o) | Self::Fallback(o) => Some(o),
            Self::Failed => None,
        }
    }
}

pub fn parse_response(raw: &str) -> ParseOutcome {
    let Some(start) = raw.find(OPEN_TAG) else {
        return ParseOutcome::Failed;
    };
    let Some(rel_end) = raw[start..].find(CLOSE_TAG) else {
        return ParseOutcome::Failed;
    };
    let block = &raw[start..start + rel_end + CLOSE_TAG.len()];

    match parse_element_tree(block) {
        Ok(root) => ParseOutcome::Structured(AnalysisOutcome {
            focal_method: root.child_text("focal_method"),
            issue_type: root.child_text("issueType"),
            sequence: root.child_text("sequence"),
            reasoning: root.child_text("reasoning"),
        }),
        Err(e) => {
            tracing::info!(error = %e, "analysis block is not well-formed, using regex extraction");
            parse_with_regex(raw)
        }
    }
}

fn extract_tag(raw: &str, tag: &str) -> String {
    let pattern = format!(r"(?s)<{tag}>(.*?)</{tag}>");
    let captured = Regex::new(&pattern)
        .ok()
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    match captured {
        Some(value) => value,
        None => {
            tracing::info!(tag = %tag, "field not found in response");
            UNKNOWN.to_string()
        }
    }
}

fn parse_with_regex(raw: &str) -> ParseOutcome {
    let outcome = AnalysisOutcome {
        focal_method: extract_tag(raw, "focal_method"),
        issue_type: extract_tag(raw, "issueType"),
        sequence: extract_tag(raw, "sequence"),
        reasoning: extract_tag(raw, "reasoning"),
    };
    if outcome.is_all_unknown() {
        ParseOutcome::Failed
    } else {
        ParseOutcome::Fallback(outcome)
    }
}

// ── Minimal element tree ──────────────────────────────────────────────

#[derive(Error, Debug, PartialEq, Eq)]
#[error("markup syntax error at byte {pos}: {message}")]
pub struct SyntaxError {
    pub pos: usize,
    pub message: &'static str,
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    /// Character data before the first child element only.
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Trimmed leading text of the first direct child named `name`.
    ///
    /// "Unknown" when the child is missing or has no leading text at all; a
    /// whitespace-only child yields an empty string.
    fn child_text(&self, name: &str) -> String {
        self.children
            .iter()
            .find(|c| c.name == name)
            .filter(|c| !c.text.is_empty())
            .map(|c| c.text.trim())
            .unwrap_or(UNKNOWN)
            .to_string()
    }

    fn push_text(&mut self, data: &str) {
        if self.children.is_empty() {
            self.text.push_str(data);
        }
    }
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.')
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn err(&self, message: &'static str) -> SyntaxError {
        SyntaxError {
            pos: self.pos,
            message,
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn expect(&mut self, token: &str, message: &'static str) -> Result<(), SyntaxError> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.err(message))
        }
    }

    /// Advance past the next `terminator`, returning the text before it.
    fn take_until(&mut self, terminator: &str, message: &'static str) -> Result<&'a str, SyntaxError> {
        match self.rest().find(terminator) {
            Some(idx) => {
                let taken = &self.rest()[..idx];
                self.pos += idx + terminator.len();
                Ok(taken)
            }
            None => Err(self.err(message)),
        }
    }

    fn name(&mut self) -> Result<&'a str, SyntaxError> {
        let rest = self.rest();
        match rest.chars().next() {
            Some(c) if is_name_start(c) => {}
            _ => return Err(self.err("invalid tag name")),
        }
        let len = rest
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += len;
        Ok(&rest[..len])
    }

    fn entity(&mut self) -> Result<char, SyntaxError> {
        self.pos += 1; // '&'
        let body = self.take_until(";", "unterminated entity")?;
        let decoded = match body {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                if let Some(hex) = body.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = body.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        decoded.ok_or_else(|| self.err("undefined entity"))
    }

    fn attributes(&mut self) -> Result<bool, SyntaxError> {
        loop {
            self.skip_ws();
            if self.rest().starts_with("/>") {
                self.pos += 2;
                return Ok(true);
            }
            if self.rest().starts_with('>') {
                self.pos += 1;
                return Ok(false);
            }
            self.name()?;
            self.skip_ws();
            self.expect("=", "expected '=' after attribute name")?;
            self.skip_ws();
            let quote = match self.peek() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.err("attribute value must be quoted")),
            };
            self.pos += 1;
            let value = self.take_until(&quote.to_string(), "unterminated attribute value")?;
            if value.contains('<') {
                return Err(self.err("'<' in attribute value"));
            }
        }
    }

    fn element(&mut self) -> Result<Element, SyntaxError> {
        self.expect("<", "expected element")?;
        let mut element = Element {
            name: self.name()?.to_string(),
            ..Default::default()
        };
        if self.attributes()? {
            return Ok(element);
        }

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.err("unclosed element"));
            } else if rest.starts_with("</") {
                self.pos += 2;
                let close = self.name()?;
                if close != element.name {
                    return Err(self.err("mismatched closing tag"));
                }
                self.skip_ws();
                self.expect(">", "malformed closing tag")?;
                return Ok(element);
            } else if rest.starts_with("<!--") {
                self.pos += 4;
                self.take_until("-->", "unterminated comment")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += 9;
                let data = self.take_until("]]>", "unterminated CDATA section")?;
                element.push_text(data);
            } else if rest.starts_with("<?") {
                self.take_until("?>", "unterminated processing instruction")?;
            } else if rest.starts_with('<') {
                let child = self.element()?;
                element.children.push(child);
            } else if rest.starts_with('&') {
                let c = self.entity()?;
                element.push_text(c.encode_utf8(&mut [0; 4]));
            } else {
                let len = rest.find(['<', '&']).unwrap_or(rest.len());
                element.push_text(&rest[..len]);
                self.pos += len;
            }
        }
    }
}

fn parse_element_tree(src: &str) -> Result<Element, SyntaxError> {
    let mut reader = Reader { src, pos: 0 };
    reader.skip_ws();
    let root = reader.element()?;
    reader.skip_ws();
    if !reader.rest().is_empty() {
        return Err(reader.err("content after document element"));
    }
    Ok(root)
}
