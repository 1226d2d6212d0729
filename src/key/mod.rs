//! Key templates and key normalization
//!
//! A key template is a string with `{name}` placeholders, resolved against
//! caller fields plus the auto fields from [`auto_fields`]. `{{` and `}}`
//! stand for literal braces. A template without placeholders resolves to
//! itself, so resolving a concrete key again is a no-op.

mod auto;
mod root;

pub use auto::{auto_fields, generate_uid, Clock, FixedClock, SystemClock, AUTO_FIELD_NAMES};
pub use root::{is_s3_uri, parse_root, parse_uri, s3_to_url, url_to_s3, Root, SCHEMES};

use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Named values available to a key template
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, String>);

impl Fields {
    pub fn new() -> Self {
        Fields(BTreeMap::new())
    }

    /// Builder form of [`Fields::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` onto these fields; `other` wins on collisions
    pub fn merge(&mut self, other: Fields) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Take the top-level scalar members of a value that serializes to a
    /// JSON object
    ///
    /// Strings, numbers and booleans become fields; nulls, arrays and nested
    /// objects are skipped. Values that are not objects, or that JSON cannot
    /// represent (maps with non-string keys), yield no fields.
    pub fn from_value<T: Serialize + ?Sized>(value: &T) -> Self {
        let mut fields = Fields::new();
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(value) {
            for (name, member) in map {
                match member {
                    serde_json::Value::String(s) => fields.insert(name, s),
                    serde_json::Value::Number(n) => fields.insert(name, n),
                    serde_json::Value::Bool(b) => fields.insert(name, b),
                    _ => {}
                }
            }
        }
        fields
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Resolve `template` against `fields` and fresh auto fields from `clock`
///
/// Auto fields overwrite caller fields with the same name.
pub fn format_key(template: &str, fields: &Fields, clock: &dyn Clock) -> Result<String> {
    if !template.contains(['{', '}']) {
        return Ok(template.to_string());
    }
    let mut merged = fields.clone();
    merged.merge(auto_fields(clock));
    render(template, &merged)
}

/// Substitute placeholders using exactly the given fields
///
/// Substituted values may not contain braces: a rendered key must resolve
/// to itself when it is used as a template again.
pub fn render(template: &str, fields: &Fields) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(invalid("nested '{' in placeholder")),
                        Some(ch) => name.push(ch),
                        None => return Err(invalid("unclosed '{'")),
                    }
                }
                if name.is_empty() {
                    return Err(invalid("empty placeholder"));
                }
                let value = fields
                    .get(&name)
                    .ok_or_else(|| Error::MissingField(name.clone()))?;
                if value.contains(['{', '}']) {
                    return Err(Error::InvalidTemplate {
                        template: template.to_string(),
                        reason: format!("value of `{}` contains a brace: {:?}", name, value),
                    });
                }
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(invalid("single '}' outside a placeholder")),
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn test_date_path_template() {
        let fields = Fields::new().with("name", "x");
        let key = format_key("{@date_path}/{name}.json", &fields, &clock()).unwrap();
        assert_eq!(key, "2024/01/02/x.json");
    }

    #[test]
    fn test_plain_key_is_unchanged() {
        let key = format_key("fixed/key.json", &Fields::new(), &clock()).unwrap();
        assert_eq!(key, "fixed/key.json");
        let again = format_key(&key, &Fields::new(), &clock()).unwrap();
        assert_eq!(again, key);
    }

    #[test]
    fn test_missing_field() {
        let err = format_key("t/{nope}.json", &Fields::new(), &clock()).unwrap_err();
        assert!(matches!(err, Error::MissingField(name) if name == "nope"));
    }

    #[test]
    fn test_auto_fields_win_on_collision() {
        let fields = Fields::new().with("@year", "1999");
        let key = format_key("{@year}", &fields, &clock()).unwrap();
        assert_eq!(key, "2024");
    }

    #[test]
    fn test_plain_names_do_not_collide_with_auto_fields() {
        let fields = Fields::new().with("year", "1999");
        let key = format_key("{year}/{@year}", &fields, &clock()).unwrap();
        assert_eq!(key, "1999/2024");
    }

    #[test]
    fn test_escaped_braces() {
        let key = render("{{literal}}/{a}", &Fields::new().with("a", 1)).unwrap();
        assert_eq!(key, "{literal}/1");
    }

    #[test]
    fn test_malformed_templates() {
        for template in ["t/{open", "t/close}", "t/{}", "t/{a{b}}"] {
            assert!(
                matches!(
                    render(template, &Fields::new()),
                    Err(Error::InvalidTemplate { .. })
                ),
                "{} should be rejected",
                template
            );
        }
    }

    #[test]
    fn test_uid_differs_between_resolutions() {
        let a = format_key("{@uid}", &Fields::new(), &clock()).unwrap();
        let b = format_key("{@uid}", &Fields::new(), &clock()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fields_from_value() {
        let fields =
            Fields::from_value(&json!({"a": 1, "b": "two", "c": true, "d": [1], "e": null}));
        assert_eq!(fields.get("a"), Some("1"));
        assert_eq!(fields.get("b"), Some("two"));
        assert_eq!(fields.get("c"), Some("true"));
        assert_eq!(fields.get("d"), None);
        assert_eq!(fields.get("e"), None);
    }

    #[test]
    fn test_fields_from_non_object() {
        assert!(Fields::from_value("just a string").is_empty());
    }

    #[test]
    fn test_fields_from_value_json_cannot_represent() {
        let mut tuple_keys = BTreeMap::new();
        tuple_keys.insert((1u8, 2u8), 3u8);
        assert!(Fields::from_value(&tuple_keys).is_empty());
    }

    #[test]
    fn test_braces_in_values_are_rejected() {
        let fields = Fields::new().with("a", "x{y}");
        let err = format_key("t/{a}", &fields, &clock()).unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate { .. }));

        let fields = Fields::new().with("a", "x}");
        assert!(render("t/{a}", &fields).is_err());
    }

    #[test]
    fn test_rendered_key_resolves_to_itself() {
        let fields = Fields::new().with("a", "x-y");
        let key = format_key("t/{a}/{@uid}", &fields, &clock()).unwrap();
        assert_eq!(format_key(&key, &Fields::new(), &clock()).unwrap(), key);
    }

    #[test]
    fn test_fields_from_iter() {
        let fields: Fields = vec![("key", "value")].into_iter().collect();
        let key = format_key("s3plztest/{key}.json.gz", &fields, &clock()).unwrap();
        assert_eq!(key, "s3plztest/value.json.gz");
    }
}
