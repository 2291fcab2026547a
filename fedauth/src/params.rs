//! Request parameters and their wire encoding
//!
//! Parameters are a closed set of value shapes. Each shape has one encoding
//! rule, applied by [`Params::process`].

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use fedauth_clock::UnixTime;

/// A value that can be converted into a request parameter
pub trait ToParam {
    /// Converts this value into a parameter value
    fn to_param(&self) -> ParamValue;
}

/// A file or blob uploaded as part of a multipart request
#[derive(Clone, PartialEq, Eq)]
pub struct FileParam {
    /// The file name to report, if any
    pub name: Option<String>,
    /// The MIME type of the content, if known
    pub content_type: Option<String>,
    /// The content
    pub content: Bytes,
}

impl fmt::Debug for FileParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileParam")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.content.len())
            .finish()
    }
}

/// A request parameter value
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// A string, sent as is (empty strings are kept)
    String(String),
    /// A number
    Number(f64),
    /// A boolean, sent as `true` or `false`
    Bool(bool),
    /// A point in time, sent as milliseconds since the epoch
    Date(UnixTime),
    /// A list of values
    List(Vec<ParamValue>),
    /// A structured value, sent as JSON
    Object(serde_json::Value),
    /// A file, which forces a multipart body
    File(FileParam),
    /// An absent value, never sent
    Null,
}

/// A parameter after encoding
#[derive(Clone, Debug, PartialEq)]
pub enum EncodedParam {
    /// A single text value
    Text(String),
    /// A value repeated once per element under the same key
    Repeated(Vec<String>),
    /// A file part
    File(FileParam),
}

impl ParamValue {
    fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    fn to_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(format_number(*n)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Date(t) => Some(t.as_millis().to_string()),
            Self::Object(v) => Some(v.to_string()),
            Self::List(items) => Some(join_list(items)),
            Self::File(_) | Self::Null => None,
        }
    }

    fn encode(&self) -> Option<EncodedParam> {
        match self {
            Self::Null => None,
            Self::File(f) => Some(EncodedParam::File(f.clone())),
            Self::List(items) => match items.first() {
                Some(Self::List(_)) => Some(EncodedParam::Repeated(
                    items.iter().filter_map(Self::to_text).collect(),
                )),
                Some(Self::Object(_)) => {
                    let values: Vec<serde_json::Value> = items.iter().map(to_json).collect();
                    Some(EncodedParam::Text(serde_json::Value::from(values).to_string()))
                }
                _ => Some(EncodedParam::Text(join_list(items))),
            },
            other => other.to_text().map(EncodedParam::Text),
        }
    }
}

fn join_list(items: &[ParamValue]) -> String {
    items
        .iter()
        .filter_map(ParamValue::to_text)
        .collect::<Vec<_>>()
        .join(",")
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn to_json(value: &ParamValue) -> serde_json::Value {
    match value {
        ParamValue::String(s) => s.clone().into(),
        ParamValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ParamValue::Bool(b) => (*b).into(),
        ParamValue::Date(t) => t.as_millis().into(),
        ParamValue::List(items) => items.iter().map(to_json).collect::<Vec<_>>().into(),
        ParamValue::Object(v) => v.clone(),
        ParamValue::File(_) | ParamValue::Null => serde_json::Value::Null,
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for ParamValue {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u64> for ParamValue {
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<UnixTime> for ParamValue {
    fn from(t: UnixTime) -> Self {
        Self::Date(t)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Object(v)
    }
}

impl From<FileParam> for ParamValue {
    fn from(f: FileParam) -> Self {
        Self::File(f)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// An ordered set of request parameters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    /// An empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any existing value for `key`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a custom parameter
    pub fn with_param(self, key: impl Into<String>, value: &dyn ToParam) -> Self {
        self.with(key, value.to_param())
    }

    /// Inserts a parameter, replacing any existing value for `key`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Removes a parameter
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    /// Gets a parameter
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Gets a parameter's text value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ParamValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Whether a parameter is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overlays `other` on top of these parameters
    pub fn merge(mut self, other: &Params) -> Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    /// Whether encoding these parameters requires a multipart body
    pub fn requires_form_data(&self) -> bool {
        self.0.values().any(ParamValue::is_file)
    }

    /// Encodes each parameter, dropping absent values
    pub fn process(&self) -> Vec<(String, EncodedParam)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.encode().map(|e| (k.clone(), e)))
            .collect()
    }

    /// Flattens the text parameters into key/value pairs
    ///
    /// Repeated values produce one pair per element. Files are skipped.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (key, value) in self.process() {
            match value {
                EncodedParam::Text(t) => pairs.push((key, t)),
                EncodedParam::Repeated(values) => {
                    pairs.extend(values.into_iter().map(|v| (key.clone(), v)))
                }
                EncodedParam::File(_) => {}
            }
        }
        pairs
    }

    /// Encodes the parameters as a URL query string
    pub fn encode_query_string(&self) -> String {
        serde_urlencoded::to_string(self.to_pairs()).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Decodes a query string or URL fragment into its parameters
///
/// A leading `?` or `#` is ignored.
pub fn decode_query_string(query: &str) -> BTreeMap<String, String> {
    let query = query.trim_start_matches('#').trim_start_matches('?');
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_are_dropped_and_empty_strings_kept() {
        let params = Params::new()
            .with("a", ParamValue::Null)
            .with("b", "")
            .with("c", false);

        assert_eq!(
            params.to_pairs(),
            vec![
                ("b".to_owned(), String::new()),
                ("c".to_owned(), "false".to_owned())
            ]
        );
    }

    #[test]
    fn lists_follow_their_first_element() {
        let params = Params::new()
            .with("plain", vec![1i64, 2, 3])
            .with(
                "objects",
                ParamValue::List(vec![serde_json::json!({"a": 1}).into()]),
            )
            .with(
                "nested",
                ParamValue::List(vec![vec!["x", "y"].into(), vec!["z"].into()]),
            );

        let processed: BTreeMap<_, _> = params.process().into_iter().collect();
        assert_eq!(processed["plain"], EncodedParam::Text("1,2,3".to_owned()));
        assert_eq!(
            processed["objects"],
            EncodedParam::Text(r#"[{"a":1}]"#.to_owned())
        );
        assert_eq!(
            processed["nested"],
            EncodedParam::Repeated(vec!["x,y".to_owned(), "z".to_owned()])
        );
    }

    #[test]
    fn dates_are_sent_as_epoch_millis() {
        let params = Params::new().with("since", UnixTime(1_500_000_000_000));
        assert_eq!(params.encode_query_string(), "since=1500000000000");
    }

    #[test]
    fn files_require_form_data() {
        let params = Params::new().with(
            "file",
            FileParam {
                name: Some("a.txt".to_owned()),
                content_type: None,
                content: Bytes::from_static(b"hello"),
            },
        );
        assert!(params.requires_form_data());
        assert!(params.to_pairs().is_empty());
    }

    #[test]
    fn query_strings_are_percent_encoded() {
        let params = Params::new().with("q", "a b&c").with("f", "json");
        assert_eq!(params.encode_query_string(), "f=json&q=a+b%26c");
    }

    #[test]
    fn query_strings_decode() {
        let decoded = decode_query_string("#access_token=abc&expires_in=1209600&state=x%20y");
        assert_eq!(decoded["access_token"], "abc");
        assert_eq!(decoded["state"], "x y");
    }

    struct Extent(f64, f64);

    impl ToParam for Extent {
        fn to_param(&self) -> ParamValue {
            ParamValue::List(vec![self.0.into(), self.1.into()])
        }
    }

    #[test]
    fn custom_values_convert_through_to_param() {
        let params = Params::new().with_param("extent", &Extent(1.5, 2.0));
        assert_eq!(params.to_pairs(), vec![("extent".to_owned(), "1.5,2".to_owned())]);
    }
}
