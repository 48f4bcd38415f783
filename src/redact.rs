use std::borrow::Cow;

const JSON_SECRET_KEYS: [&str; 5] = [
    "\"accessToken\"",
    "\"refreshToken\"",
    "\"access_token\"",
    "\"refresh_token\"",
    "\"apiKey\"",
];

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let nee = needle.as_bytes();
    if nee.is_empty() {
        return Some(0);
    }
    if nee.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - nee.len()).find(|&i| {
        hay[i..i + nee.len()]
            .iter()
            .zip(nee)
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
    })
}

fn redact_header_value(text: String, header: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    loop {
        let Some(idx) = find_ascii_case_insensitive(rest, header) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];

        out.push_str(&rest[..header.len()]);
        rest = &rest[header.len()..];

        if let Some(first) = rest.chars().next() {
            if first == ' ' {
                out.push(' ');
                rest = &rest[first.len_utf8()..];
            }
        }

        let mut consumed = 0;
        for ch in rest.chars() {
            if ch == '\n' || ch == '\r' {
                break;
            }
            consumed += ch.len_utf8();
        }
        out.push_str(replacement);
        rest = &rest[consumed..];
    }
    out
}

// `"accessToken":"abc"` -> `"accessToken":"REDACTED"`; non-string values are left alone.
fn redact_json_string_value(text: String, key: &str) -> String {
    if !text.contains(key) {
        return text;
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(idx) = rest.find(key) {
        let end_of_key = idx + key.len();
        out.push_str(&rest[..end_of_key]);
        rest = &rest[end_of_key..];

        let after_colon = rest.trim_start();
        let Some(after_colon) = after_colon.strip_prefix(':') else {
            continue;
        };
        let value = after_colon.trim_start();
        let Some(body) = value.strip_prefix('"') else {
            continue;
        };
        let Some(close) = body.find('"') else {
            continue;
        };

        let prefix_len = rest.len() - value.len();
        out.push_str(&rest[..prefix_len]);
        out.push_str("\"REDACTED\"");
        rest = &body[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Strips bearer tokens, cookies and credential JSON values from text that
/// is about to be logged or shown.
pub fn redact_secrets(input: &str) -> Cow<'_, str> {
    let mut value = input.to_string();

    value = redact_header_value(value, "Cookie:", "REDACTED");
    value = redact_header_value(value, "Set-Cookie:", "REDACTED");
    value = redact_header_value(value, "Authorization: Bearer", "REDACTED");
    for key in JSON_SECRET_KEYS {
        value = redact_json_string_value(value, key);
    }

    if value == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(value)
    }
}
