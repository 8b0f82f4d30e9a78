//! Isolation of a JSON object from free-form model output.
//!
//! Models are asked for bare JSON but routinely wrap it in markdown fences or
//! surround it with prose. [`isolate_json_object`] runs an ordered pipeline of
//! small steps, each returning `Option` so the pipeline short-circuits:
//!
//! 1. strip a leading code fence (optionally tagged `json`) and a trailing fence
//! 2. drop prose before the first `{` and after the last `}`
//! 3. if that did not yield a braced span, greedily scan the raw text for
//!    the outermost `{...}`

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid leading fence regex"));

static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*```$").expect("valid trailing fence regex"));

static GREEDY_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid object regex"));

/// Remove a leading and a trailing markdown code fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = match LEADING_FENCE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    };
    match TRAILING_FENCE.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

/// Slice from the first `{` through the last `}`.
pub fn trim_to_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn is_braced(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}')
}

/// Outermost `{...}` span of the raw text.
pub fn greedy_object_scan(raw: &str) -> Option<&str> {
    GREEDY_OBJECT.find(raw).map(|m| m.as_str())
}

/// Isolate the JSON object span in a model response.
///
/// Returns `None` when no object can be found by either path.
pub fn isolate_json_object(raw: &str) -> Option<&str> {
    let unfenced = strip_code_fences(raw).trim();
    trace!(unfenced_len = unfenced.len(), "Stripped code fences");

    trim_to_braces(unfenced)
        .map(str::trim)
        .filter(|span| is_braced(span))
        .or_else(|| {
            trace!("Falling back to greedy object scan");
            greedy_object_scan(raw)
        })
}
