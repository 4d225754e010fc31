//! Header-block splitting.
//!
//! A headed document starts with `key: value` lines, ends its header at the
//! first blank line, and carries everything after that as `contents`:
//!
//! ```text
//! title: About us
//! author: Ada
//!
//! The body starts here.
//! ```

use std::collections::BTreeMap;

/// Key under which the body is stored.
pub const CONTENTS_KEY: &str = "contents";

fn header_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, value.trim()))
}

/// Split `text` into header fields plus a `contents` entry.
///
/// Text whose first line is not a header line has no header block. A
/// document with no body gets no `contents` entry.
pub fn split_headed(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut rest = text;

    while !rest.is_empty() {
        let (line, tail) = match rest.split_once('\n') {
            Some((line, tail)) => (line, tail),
            None => (rest, ""),
        };
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() {
            if !fields.is_empty() {
                rest = tail;
            }
            break;
        }
        match header_line(line) {
            Some((key, value)) => {
                fields.insert(key.to_string(), value.to_string());
                rest = tail;
            }
            // a non-header line ends the block even without a separator
            None => break,
        }
    }

    if !rest.is_empty() {
        fields.insert(CONTENTS_KEY.to_string(), rest.to_string());
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_body() {
        let doc = split_headed("title: Hello\nauthor: Ada\n\nBody line\nsecond: not a header\n");
        assert_eq!(doc["title"], "Hello");
        assert_eq!(doc["author"], "Ada");
        assert_eq!(doc[CONTENTS_KEY], "Body line\nsecond: not a header\n");
    }

    #[test]
    fn test_no_header() {
        let doc = split_headed("Just some text\nmore");
        assert_eq!(doc.len(), 1);
        assert_eq!(doc[CONTENTS_KEY], "Just some text\nmore");
    }

    #[test]
    fn test_header_only() {
        let doc = split_headed("title: x");
        assert_eq!(doc["title"], "x");
        assert!(!doc.contains_key(CONTENTS_KEY));

        let doc = split_headed("title: x\n\n");
        assert!(!doc.contains_key(CONTENTS_KEY));
        assert!(split_headed("").is_empty());
    }

    #[test]
    fn test_crlf_lines() {
        let doc = split_headed("title: x\r\n\r\nbody");
        assert_eq!(doc["title"], "x");
        assert_eq!(doc[CONTENTS_KEY], "body");
    }
}
