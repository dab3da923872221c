//! Header index built from raw header lines.
//!
//! Each line is split on its first colon only; the remainder is the value,
//! verbatim. Lines without a colon (stray command echoes some brokers emit)
//! stay in the raw list but never reach the index. Later duplicates win.
//!
//! # Example
//!
//! ```
//! use c2sim_client::protocol::HeaderIndex;
//!
//! let lines = vec!["destination:A".to_string(), "destination:B".to_string()];
//! let index = HeaderIndex::build(&lines);
//! assert_eq!(index.get("destination"), "B");
//! assert_eq!(index.get("absent"), "");
//! ```

use std::collections::HashMap;

use super::wire_format::headers;

/// Split a raw header line on the first colon.
///
/// Returns `None` for lines that carry no colon.
#[inline]
pub fn split_header_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
}

/// Lookup table derived from a frame's header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderIndex {
    map: HashMap<String, String>,
    selector: String,
}

impl HeaderIndex {
    /// Build the index from raw header lines.
    ///
    /// Pure: the same lines always produce the same index and selector.
    pub fn build<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut map = HashMap::with_capacity(lines.len());
        let mut selector = String::new();

        for line in lines {
            let Some((name, value)) = split_header_line(line.as_ref()) else {
                continue;
            };
            if name.eq_ignore_ascii_case(headers::MESSAGE_SELECTOR) {
                selector = value.to_string();
            }
            map.insert(name.to_string(), value.to_string());
        }

        Self { map, selector }
    }

    /// Value of a header, or `""` when absent. Names are case-sensitive.
    pub fn get(&self, name: &str) -> &str {
        self.map.get(name).map(String::as_str).unwrap_or("")
    }

    /// Value of a header if present.
    pub fn get_opt(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    /// Whether a header was present (possibly with an empty value).
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Value of the last `message-selector` header, or `""`.
    #[inline]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over indexed `(name, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
