//! # Suggested Filename Resolution
//!
//! Estrae il nome suggerito dall'header `content-disposition` della risposta.
//! Supporta `filename="x"`, `filename=x` e la forma RFC 5987 `filename*=UTF-8''x`.
//! In assenza di un nome utilizzabile genera `processed_<unix_ms>.mp4`.

use crate::utils::unix_timestamp_ms;
use std::borrow::Cow;

/// Generated name used when the response suggests none
pub fn default_filename() -> String {
    format!("processed_{}.mp4", unix_timestamp_ms())
}

/// Resolve the download name from an optional `content-disposition` value
pub fn resolve_filename(content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(filename_from_content_disposition)
        .unwrap_or_else(default_filename)
}

/// Parse the suggested filename out of a `content-disposition` header value.
///
/// `filename*` wins over `filename` when both are present.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(value) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename" => plain = sanitize(&unquote(raw.trim())),
            "filename*" => extended = decode_extended(raw.trim()).and_then(|v| sanitize(&v)),
            _ => {}
        }
    }

    extended.or(plain)
}

/// Split on `;` outside of quoted strings. `\"` inside quotes does not close them.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('"')
        .map(|s| s.strip_suffix('"').unwrap_or(s))
        .unwrap_or(trimmed);
    inner.replace("\\\"", "\"")
}

/// `charset'lang'percent-encoded`
fn decode_extended(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, '\'');
    let charset = parts.next()?;
    let _lang = parts.next()?;
    let encoded = parts.next()?;

    if !charset.eq_ignore_ascii_case("utf-8") && !charset.is_empty() {
        return None;
    }
    urlencoding::decode(encoded).ok().map(Cow::into_owned)
}

/// Drop directory components and reject names that cannot be saved
fn sanitize(name: &str) -> Option<String> {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}
