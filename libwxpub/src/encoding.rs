//! Encoding repair for article text
//!
//! Article bodies read back from the platform (and sometimes produced by
//! upstream editors) arrive with a fixed set of corruptions:
//!
//! | Detector            | Example       | Repaired to |
//! |---------------------|---------------|-------------|
//! | escaped hex byte    | `\x3c`        | `<`         |
//! | double-escaped code | `\\u4e2d`     | `中`        |
//! | escaped code point  | `\u4e2d`      | `中`        |
//! | HTML entity         | `&lt;`        | `<`         |
//!
//! [`repair`] only touches text for which [`needs_repair`] reports a
//! detector hit, so a body that legitimately contains `<` or `\` is left
//! alone. Repair runs the stages in order and repeats until the text stops
//! changing, which makes `repair(repair(x)) == repair(x)` hold for every
//! input. Each changing pass shortens the text, so the loop terminates.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

static ESCAPED_HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\x[0-9a-fA-F]{2}").expect("valid regex"));

static KNOWN_HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\\x(3c|3e|22|27|5c|0a|0d|09)").expect("valid regex"));

static DOUBLE_UNICODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\\u([0-9a-fA-F]{4})").expect("valid regex"));

static UNICODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").expect("valid regex"));

static ENTITY_DETECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:amp|lt|gt|quot);").expect("valid regex"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").expect("valid regex")
});

#[derive(Debug, Error)]
enum StageError {
    #[error("invalid code unit '{0}'")]
    CodeUnit(String),

    #[error("unpaired surrogate \\u{0:04x}")]
    Surrogate(u32),
}

/// Whether `text` carries one of the known corruption markers.
pub fn needs_repair(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    ESCAPED_HEX.is_match(text)
        || DOUBLE_UNICODE.is_match(text)
        || UNICODE.is_match(text)
        || ENTITY_DETECT.is_match(text)
}

/// Reverse known corruptions; returns `text` unchanged when nothing is detected
/// or when a stage fails.
///
/// ```
/// use libwxpub::encoding::repair;
///
/// assert_eq!(repair("&lt;div&gt;"), "<div>");
/// assert_eq!(repair(r"\x3cdiv\x3e"), "<div>");
/// assert_eq!(repair(r"\u4e2d\u6587"), "中文");
/// assert_eq!(repair("plain text"), "plain text");
/// ```
pub fn repair(text: &str) -> String {
    if !needs_repair(text) {
        return text.to_string();
    }

    let mut current = text.to_string();
    loop {
        let next = match run_stages(&current) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(error = %e, "Encoding repair aborted, keeping original text");
                return text.to_string();
            }
        };
        if next == current {
            break;
        }
        current = next;
        if !needs_repair(&current) {
            break;
        }
    }

    tracing::debug!(
        before = text.len(),
        after = current.len(),
        "Repaired text encoding"
    );
    current
}

/// Repair a field in place; returns whether it changed.
pub fn repair_in_place(text: &mut String) -> bool {
    if !needs_repair(text) {
        return false;
    }
    let repaired = repair(text);
    let changed = repaired != *text;
    *text = repaired;
    changed
}

fn run_stages(text: &str) -> Result<String, StageError> {
    let text = replace_escaped_hex(text);
    let text = collapse_double_unicode(&text);
    let text = decode_unicode(&text)?;
    Ok(decode_entities(&text))
}

fn replace_escaped_hex(text: &str) -> String {
    KNOWN_HEX
        .replace_all(text, |caps: &Captures| {
            match caps[1].to_ascii_lowercase().as_str() {
                "3c" => "<",
                "3e" => ">",
                "22" => "\"",
                "27" => "'",
                "5c" => "\\",
                "0a" => "\n",
                "0d" => "\r",
                _ => "\t",
            }
        })
        .into_owned()
}

fn collapse_double_unicode(text: &str) -> String {
    DOUBLE_UNICODE.replace_all(text, r"\u${1}").into_owned()
}

/// Decode every `\uXXXX`, falling back to per-escape decoding when a lone
/// surrogate makes the bulk pass fail.
fn decode_unicode(text: &str) -> Result<String, StageError> {
    if !text.contains("\\u") {
        return Ok(text.to_string());
    }
    match decode_unicode_strict(text) {
        Ok(decoded) => Ok(decoded),
        Err(StageError::Surrogate(unit)) => {
            tracing::debug!(unit, "Bulk unicode decode failed, decoding escapes individually");
            decode_unicode_lenient(text)
        }
        Err(e) => Err(e),
    }
}

fn code_unit(hex: &str) -> Result<u32, StageError> {
    u32::from_str_radix(hex, 16).map_err(|_| StageError::CodeUnit(hex.to_string()))
}

fn is_high_surrogate(unit: u32) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

fn is_low_surrogate(unit: u32) -> bool {
    (0xDC00..0xE000).contains(&unit)
}

fn combine(high: u32, low: u32) -> Option<char> {
    char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
}

/// Walk the escapes in order, pairing surrogates; `strict` decides whether
/// an undecodable escape is an error or left verbatim.
fn decode_escapes(text: &str, strict: bool) -> Result<String, StageError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut matches = UNICODE.captures_iter(text).peekable();

    while let Some(caps) = matches.next() {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        out.push_str(&text[last..whole.start]);
        last = whole.end;

        let unit = code_unit(&caps[1])?;

        if is_high_surrogate(unit) {
            let pair = matches.peek().and_then(|next| {
                let range = next.get(0)?.range();
                if range.start != whole.end {
                    return None;
                }
                let low = code_unit(&next[1]).ok()?;
                if is_low_surrogate(low) {
                    combine(unit, low).map(|c| (c, range.end))
                } else {
                    None
                }
            });
            if let Some((c, end)) = pair {
                out.push(c);
                last = end;
                matches.next();
                continue;
            }
        }

        match char::from_u32(unit) {
            Some(c) => out.push(c),
            None if strict => return Err(StageError::Surrogate(unit)),
            None => out.push_str(&text[whole]),
        }
    }

    out.push_str(&text[last..]);
    Ok(out)
}

fn decode_unicode_strict(text: &str) -> Result<String, StageError> {
    decode_escapes(text, true)
}

fn decode_unicode_lenient(text: &str) -> Result<String, StageError> {
    decode_escapes(text, false)
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            decode_entity(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        if code == 0 {
            return None;
        }
        return char::from_u32(code).map(String::from);
    }

    let decoded = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        _ => return None,
    };
    Some(decoded.to_string())
}
