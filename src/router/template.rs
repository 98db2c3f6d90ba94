//! Route path templates.
//!
//! A template such as `/books/:id` matches concrete locations and produces
//! them back from parameters. Parameters a template does not use go into a
//! sorted query string, and incoming query strings are parsed back into
//! parameters.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::RouteError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Static(String),
    Param(String),
}

/// Parsed `:param` path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    parts: Vec<Part>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Self {
        let parts = segments(raw)
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => Part::Param(name.to_string()),
                _ => Part::Static(segment.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            parts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parameter names in template order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Param(name) => Some(name.as_str()),
            Part::Static(_) => None,
        })
    }

    /// Match a location path (no query) and extract decoded parameters.
    pub fn matches(&self, path: &str) -> Option<Map<String, Value>> {
        let mut params = Map::new();
        let mut candidate = segments(path);

        for part in &self.parts {
            let segment = candidate.next()?;
            match part {
                Part::Static(expected) if expected == segment => {}
                Part::Static(_) => return None,
                Part::Param(_) if segment.is_empty() => return None,
                Part::Param(name) => {
                    params.insert(name.clone(), Value::String(decode(segment)));
                }
            }
        }

        candidate.next().is_none().then_some(params)
    }

    /// Substitute `params` into the template.
    ///
    /// Every placeholder needs a non-null scalar; the rest of `params` ends up
    /// in the query string.
    pub fn stringify(&self, route: &str, params: &Map<String, Value>) -> Result<String, RouteError> {
        let mut segments = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            match part {
                Part::Static(segment) => segments.push(segment.clone()),
                Part::Param(name) => {
                    let value = params
                        .get(name)
                        .and_then(scalar)
                        .ok_or_else(|| RouteError::MissingParam {
                            route: route.to_string(),
                            param: name.clone(),
                        })?;
                    segments.push(encode(&value));
                }
            }
        }

        let mut location = format!("/{}", segments.join("/"));

        let mut query: Vec<(&String, String)> = params
            .iter()
            .filter(|(key, value)| !value.is_null() && !self.params().any(|p| p == key.as_str()))
            .map(|(key, value)| (key, scalar(value).unwrap_or_else(|| value.to_string())))
            .collect();
        query.sort_by(|a, b| a.0.cmp(b.0));

        if !query.is_empty() {
            let pairs: Vec<String> = query
                .into_iter()
                .map(|(key, value)| format!("{}={}", encode(key), encode(&value)))
                .collect();
            location.push('?');
            location.push_str(&pairs.join("&"));
        }

        Ok(location)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    // "/" is the empty template, not one empty segment.
    let parts = if trimmed.is_empty() { None } else { Some(trimmed.split('/')) };
    parts.into_iter().flatten()
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Split `location` into its path and its parsed query parameters.
pub fn split_location(location: &str) -> (&str, Map<String, Value>) {
    match location.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (location, Map::new()),
    }
}

pub fn parse_query(query: &str) -> Map<String, Value> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), Value::String(decode(value)))
        })
        .collect()
}

fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn root_template_matches_only_root() {
        let template = PathTemplate::parse("/");
        assert_eq!(template.matches("/"), Some(Map::new()));
        assert_eq!(template.matches("/about"), None);
    }

    #[test]
    fn params_are_extracted_and_decoded() {
        let template = PathTemplate::parse("/books/:id");
        let matched = template.matches("/books/war%20and%20peace").unwrap();
        assert_eq!(matched["id"], json!("war and peace"));
        assert_eq!(template.matches("/books"), None);
        assert_eq!(template.matches("/books/"), None);
        assert_eq!(template.matches("/books/1/extra"), None);
    }

    #[test]
    fn stringify_substitutes_and_appends_query() {
        let template = PathTemplate::parse("/books/:id");
        let location = template
            .stringify("Book", &params(json!({"id": 7, "tab": "notes", "page": 2})))
            .unwrap();
        assert_eq!(location, "/books/7?page=2&tab=notes");
    }

    #[test]
    fn stringify_requires_placeholders() {
        let template = PathTemplate::parse("/books/:id");
        let err = template.stringify("Book", &Map::new()).unwrap_err();
        assert_eq!(
            err,
            RouteError::MissingParam {
                route: "Book".to_string(),
                param: "id".to_string(),
            }
        );
    }

    #[test]
    fn split_location_parses_query() {
        let (path, query) = split_location("/search?q=rust%20lang&page=3");
        assert_eq!(path, "/search");
        assert_eq!(query["q"], json!("rust lang"));
        assert_eq!(query["page"], json!("3"));
    }

    #[test]
    fn malformed_escapes_are_kept() {
        assert_eq!(decode("100%"), "100%");
        assert_eq!(decode("%zz"), "%zz");
        assert_eq!(decode("a%2Fb"), "a/b");
    }
}
