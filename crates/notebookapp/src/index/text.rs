//! Plain-text extraction from page documents.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::plist::xml::unescape;

static REGEX_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static REGEX_BODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body[^>]*>").unwrap());
static REGEX_BODY_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body\s*>").unwrap());
static REGEX_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

/// Removes markup tags and decodes entities.
pub fn strip_tags(line: &str) -> String {
    let text = REGEX_TAG.replace_all(line, "");
    unescape(&text).unwrap_or_else(|_| text.into_owned())
}

/// The text between `<body>` and `</body>` with tags stripped.
///
/// A document without a body tag yields nothing. Line breaks are kept so
/// that words on adjacent lines stay apart.
pub fn read_data_as_plain_text(data: &str) -> String {
    let Some(open) = REGEX_BODY_OPEN.find(data) else {
        return String::new();
    };
    let rest = &data[open.end()..];
    let body = match REGEX_BODY_CLOSE.find(rest) {
        Some(close) => &rest[..close.start()],
        None => rest,
    };
    let body = REGEX_BREAK.replace_all(body, "\n");
    strip_tags(&body)
}

/// True if every word occurs in `text`, ignoring case.
pub fn match_words(text: &str, words: &[String]) -> bool {
    let text = text.to_lowercase();
    words.iter().all(|word| text.contains(word.as_str()))
}

/// Splits a search string into lowercase words.
pub fn search_words(text: &str) -> Vec<String> {
    text.replace('"', "")
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLANK_NOTE;

    #[test]
    fn test_blank_note_is_empty() {
        assert_eq!(read_data_as_plain_text(BLANK_NOTE), "");
    }

    #[test]
    fn test_body_text() {
        let page = "<html><head><title>skip</title></head>\n<body><b>hello</b> &amp; world<br/>next\n</body></html>";
        assert_eq!(read_data_as_plain_text(page), "hello & world\nnext\n");
    }

    #[test]
    fn test_no_body() {
        assert_eq!(read_data_as_plain_text("just text"), "");
    }

    #[test]
    fn test_match_words() {
        let words = search_words("Hello \"World\"");
        assert_eq!(words, vec!["hello", "world"]);
        assert!(match_words("why HELLO, brave world", &words));
        assert!(!match_words("hello there", &words));
    }
}
