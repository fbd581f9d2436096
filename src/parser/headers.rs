//! Ordered header map.

use crate::parser::error::Error;

/// Header fields in insertion order.
///
/// Names are unique under case-insensitive comparison. Inserting an existing
/// name replaces the value in place, so serialization order is stable across
/// a parse/serialize round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header after checking it can be written back out verbatim.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        let value = value.into();
        validate(&name, &value)?;
        self.put(name, value);
        Ok(())
    }

    /// Insert without validation. Callers guarantee `name` and `value` came
    /// from a parsed header line or are constants.
    pub(crate) fn put(&mut self, name: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Get a header value by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `key: value` lines up to the first empty line, splitting each
    /// once on `": "`.
    pub(crate) fn parse_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Self, Error> {
        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(": ")
                .ok_or_else(|| Error::InvalidHeaderFormat(line.to_string()))?;
            if name.is_empty() {
                return Err(Error::InvalidHeaderFormat(line.to_string()));
            }
            headers.put(name.to_string(), value.to_string());
        }
        Ok(headers)
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

fn validate(name: &str, value: &str) -> Result<(), Error> {
    let breaks_line = |s: &str| s.bytes().any(|b| b == b'\r' || b == b'\n');
    if name.is_empty() || name.contains(": ") || breaks_line(name) {
        return Err(Error::InvalidArgument("header name"));
    }
    if breaks_line(value) {
        return Err(Error::InvalidArgument("header value"));
    }
    Ok(())
}
