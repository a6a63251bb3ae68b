// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Letter output parsing and rendering. Two paths share the same
//! HTML template: an incremental preview scanned out of the raw streaming
//! buffer, and a final whole-document parse once the provider reports
//! `response.completed`.

use oj_adapters::RecipientProfile;
use oj_core::{normalize_postcode, normalize_typography, OrchestratorError};
use serde::{Deserialize, Serialize};

/// The parsed provider JSON document (schema). Only `letter_content`,
/// `subject_line_html`, and `references` survive into the persisted/merged
/// output — every other field is discarded in favor of [`RecipientProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterOutput {
    pub mp_name: String,
    pub mp_address_1: String,
    pub mp_address_2: String,
    pub mp_city: String,
    pub mp_county: String,
    pub mp_postcode: String,
    pub date: String,
    pub subject_line_html: String,
    pub letter_content: String,
    pub sender_name: String,
    pub sender_address_1: String,
    pub sender_address_2: String,
    pub sender_address_3: String,
    pub sender_city: String,
    pub sender_county: String,
    pub sender_postcode: String,
    pub sender_phone: String,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Parse the fully-accumulated raw buffer once the stream reports
/// `response.completed`. Any parse failure is terminal — a provider that
/// appends trailing chatter after the JSON object is treated the same as
/// one that emitted a structurally broken document.
pub fn parse_letter_json(buffer: &str) -> Result<LetterOutput, OrchestratorError> {
    serde_json::from_str(buffer).map_err(|err| OrchestratorError::OutputParseFailed(err.to_string()))
}

/// Overwrite MP/sender context with the authoritative [`RecipientProfile`]
/// and normalize the model-authored fields that survive. Authoritative
/// user data always wins over whatever the model filled in for those
/// fields.
pub fn merge_with_profile(mut parsed: LetterOutput, profile: &RecipientProfile) -> LetterOutput {
    parsed.letter_content = normalize_typography(&parsed.letter_content);
    parsed.subject_line_html = normalize_typography(&parsed.subject_line_html);
    parsed.references = parsed.references.iter().map(|r| normalize_typography(r)).collect();

    parsed.mp_name = profile.mp_name.clone();
    parsed.mp_address_1 = profile.mp_address_1.clone();
    parsed.mp_address_2 = profile.mp_address_2.clone();
    parsed.mp_city = profile.mp_city.clone();
    parsed.mp_county = profile.mp_county.clone();
    parsed.mp_postcode = normalize_postcode(&profile.mp_postcode);
    parsed.date = profile.today.clone();
    parsed.sender_name = profile.sender_name.clone();
    parsed.sender_address_1 = profile.sender_address_1.clone();
    parsed.sender_address_2 = profile.sender_address_2.clone();
    parsed.sender_address_3 = profile.sender_address_3.clone();
    parsed.sender_city = profile.sender_city.clone();
    parsed.sender_county = profile.sender_county.clone();
    parsed.sender_postcode = normalize_postcode(&profile.sender_postcode);
    parsed.sender_phone = profile.sender_phone.clone();
    parsed
}

/// Render the full addressed-letter HTML template. Used both for the final
/// persisted document and, with a partial [`LetterPreview`] stood in for the
/// body, for each live preview.
pub fn render_letter_html(output: &LetterOutput) -> String {
    render_template(
        &output.mp_name,
        &output.mp_address_1,
        &output.mp_address_2,
        &output.mp_city,
        &output.mp_county,
        &output.mp_postcode,
        &output.date,
        &output.sender_name,
        &output.sender_address_1,
        &output.sender_address_2,
        &output.sender_address_3,
        &output.sender_city,
        &output.sender_county,
        &output.sender_postcode,
        &output.sender_phone,
        &output.subject_line_html,
        &output.letter_content,
    )
}

/// Render a preview using `profile` for the static addressing fields and the
/// partially-decoded body/subject extracted so far.
pub fn render_preview_html(profile: &RecipientProfile, preview: &LetterPreview) -> String {
    render_template(
        &profile.mp_name,
        &profile.mp_address_1,
        &profile.mp_address_2,
        &profile.mp_city,
        &profile.mp_county,
        &profile.mp_postcode,
        &profile.today,
        &profile.sender_name,
        &profile.sender_address_1,
        &profile.sender_address_2,
        &profile.sender_address_3,
        &profile.sender_city,
        &profile.sender_county,
        &profile.sender_postcode,
        &profile.sender_phone,
        &preview.subject_line_html,
        &preview.letter_content,
    )
}

#[allow(clippy::too_many_arguments)]
fn render_template(
    mp_name: &str,
    mp_address_1: &str,
    mp_address_2: &str,
    mp_city: &str,
    mp_county: &str,
    mp_postcode: &str,
    date: &str,
    sender_name: &str,
    sender_address_1: &str,
    sender_address_2: &str,
    sender_address_3: &str,
    sender_city: &str,
    sender_county: &str,
    sender_postcode: &str,
    sender_phone: &str,
    subject_line_html: &str,
    letter_content: &str,
) -> String {
    format!(
        "<div class=\"letter\">\n\
        <div class=\"letter-sender\">\n{sender_name}<br>\n{sender_address_1}<br>\n{sender_address_2}<br>\n{sender_address_3}<br>\n{sender_city}<br>\n{sender_county}<br>\n{sender_postcode}<br>\n{sender_phone}\n</div>\n\
        <div class=\"letter-date\">{date}</div>\n\
        <div class=\"letter-recipient\">\n{mp_name}<br>\n{mp_address_1}<br>\n{mp_address_2}<br>\n{mp_city}<br>\n{mp_county}<br>\n{mp_postcode}\n</div>\n\
        <div class=\"letter-subject\">{subject_line_html}</div>\n\
        <div class=\"letter-body\">{letter_content}</div>\n\
        </div>",
    )
}

/// What the incremental scanner has extracted from the raw streaming buffer
/// so far ("Live preview").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LetterPreview {
    pub letter_content: String,
    pub subject_line_html: String,
}

/// Scan `buffer` for the *last* occurrence of `"letter_content":"` and
/// `"subject_line_html":"`, decoding JSON string escapes up to the matching
/// unescaped `"` (or end of buffer, if the field is still being streamed).
/// Each field defaults to empty if not yet present.
pub fn extract_preview(buffer: &str) -> LetterPreview {
    LetterPreview {
        letter_content: extract_last_string_field(buffer, "letter_content")
        .map(|s| normalize_typography(&s))
        .unwrap_or_default(),
        subject_line_html: extract_last_string_field(buffer, "subject_line_html")
        .map(|s| normalize_typography(&s))
        .unwrap_or_default(),
    }
}

fn extract_last_string_field(buffer: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\":\"");
    let start = buffer.rfind(&needle)? + needle.len();
    Some(decode_json_string_escapes(&buffer[start..]))
}

/// Decode JSON string escapes (`\n\r\t\b\f\\\"\/\uXXXX`) from `rest` until an
/// unescaped `"` or the end of input, whichever comes first.
fn decode_json_string_escapes(rest: &str) -> String {
    let mut out = String::with_capacity(rest.len());
    let mut chars = rest.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            break;
        }
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('/') => out.push('/'),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                if let Ok(code) = u32::from_str_radix(&hex, 16) {
                    if let Some(decoded) = char::from_u32(code) {
                        out.push(decoded);
                    }
                }
            }
            // Dangling backslash at the end of a still-streaming buffer: drop it
            // rather than emit a malformed fragment.
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

#[cfg(test)]
#[path = "letter_tests.rs"]
mod tests;
