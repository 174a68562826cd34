//! Tree-structured record format for persisted cache state.
//!
//! Every cached state serializes itself into a [`StateElement`]: a short tag,
//! string attributes for scalar fields, ordered child elements and optional text.
//! A whole client state is one root element written to disk as JSON.
//!
//! # Scalar encodings
//! - **Longs** (timestamps) use a compact lowercase radix-36 form, `-` prefixed when negative
//! - **Small integers** (revisions, changelist ids) use plain decimal
//! - **Booleans** are `"y"` / `"n"`

use crate::core::error::{CacheError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const RADIX: u64 = 36;
const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encodes a long in lowercase radix-36.
pub fn encode_long(value: i64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut remaining = value.unsigned_abs();
    let mut digits = Vec::with_capacity(13);
    while remaining > 0 {
        digits.push(DIGITS[(remaining % RADIX) as usize]);
        remaining /= RADIX;
    }
    if value < 0 {
        digits.push(b'-');
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Decodes a radix-36 long; `None` when the text is not a valid number.
pub fn decode_long(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    i64::from_str_radix(text, 36).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateElement {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StateElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StateElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Fails unless this element carries the expected tag.
    pub fn expect_tag(&self, tag: &str) -> Result<()> {
        if self.tag == tag {
            Ok(())
        } else {
            Err(CacheError::unexpected_element(tag, &self.tag))
        }
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    /// Sets the attribute only when a value is present.
    pub fn set_opt_attr(&mut self, key: &str, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.set_attr(key, value);
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn require_attr(&self, key: &str) -> Result<&str> {
        self.attr(key)
            .ok_or_else(|| CacheError::missing_attribute(&self.tag, key))
    }

    pub fn set_long(&mut self, key: &str, value: i64) {
        self.set_attr(key, encode_long(value));
    }

    pub fn get_long(&self, key: &str) -> Result<Option<i64>> {
        match self.attr(key) {
            None => Ok(None),
            Some(raw) => decode_long(raw)
                .map(Some)
                .ok_or_else(|| CacheError::invalid_number(&self.tag, raw)),
        }
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        let mut buffer = itoa::Buffer::new();
        self.set_attr(key, buffer.format(value));
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.attr(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| CacheError::invalid_number(&self.tag, raw)),
        }
    }

    pub fn require_int(&self, key: &str) -> Result<i64> {
        self.get_int(key)?
            .ok_or_else(|| CacheError::missing_attribute(&self.tag, key))
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set_attr(key, if value { "y" } else { "n" });
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.attr(key) == Some("y")
    }

    /// Stores a timestamp as radix-36 milliseconds since the epoch.
    pub fn set_date(&mut self, key: &str, value: DateTime<Utc>) {
        self.set_long(key, value.timestamp_millis());
    }

    /// Reads a timestamp; absent or out-of-range values read as the epoch.
    pub fn get_date(&self, key: &str) -> Result<DateTime<Utc>> {
        let millis = self.get_long(key)?.unwrap_or(0);
        Ok(Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default())
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn add_child(&mut self, child: StateElement) {
        self.children.push(child);
    }

    pub fn child(&self, tag: &str) -> Option<&StateElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn require_child(&self, tag: &str) -> Result<&StateElement> {
        self.child(tag)
            .ok_or_else(|| CacheError::unexpected_element(tag, format!("no child of {}", self.tag)))
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a StateElement> {
        self.children.iter().filter(move |c| c.tag == tag)
    }
}
