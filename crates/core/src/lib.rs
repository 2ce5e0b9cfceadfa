//! meshgen core types: views, parameter specs and request descriptors.
//!
//! Everything here is pure data plus the URL codec in [`codec`]; no I/O.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod codec;

pub use codec::{absolute, decode, encode, location_for, secondary, with_param, Route};

pub const DEFAULT_K8S_NAMESPACE: &str = "microservice-mesh";
pub const DEFAULT_K8S_APP: &str = "api-play";
pub const DEFINE_CONTENT_KEY: &str = "defineContent";
pub const YAML_KEY: &str = "yaml";
pub const SEED_KEY: &str = "seed";
pub const MIN_REPLICAS_KEY: &str = "minReplicas";
pub const MAX_REPLICAS_KEY: &str = "maxReplicas";

/// Top-level page mode, selected by the URL fragment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Random,
    Define,
}

impl View {
    pub const ALL: [View; 2] = [View::Random, View::Define];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Random => "random",
            View::Define => "define",
        }
    }

    /// Parse a fragment name (without `#`). Empty selects Random.
    pub fn from_fragment(name: &str) -> Option<View> {
        match name {
            "" | "random" => Some(View::Random),
            "define" => Some(View::Define),
            _ => None,
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two chained backend calls an outcome belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Primary,
    Secondary,
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallKind::Primary => f.write_str("primary"),
            CallKind::Secondary => f.write_str("secondary"),
        }
    }
}

/// Declared type of a parameter. Drives how the form field is written and
/// how the value reaches the request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Number,
    /// Presence flag: set iff the key appears in the URL query.
    Flag,
}

/// Declared default for a parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParamDefault {
    Text(String),
    Number(i64),
    /// Omitted unless present in the URL.
    Absent,
}

impl ParamDefault {
    pub fn render(&self) -> String {
        match self {
            ParamDefault::Text(s) => s.clone(),
            ParamDefault::Number(n) => n.to_string(),
            ParamDefault::Absent => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
    pub default: ParamDefault,
}

/// Ordered set of declared parameters for a form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParameterSpec {
    decls: Vec<ParamDecl>,
}

impl ParameterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, kind: ParamKind, default: ParamDefault) -> Self {
        self.decls.retain(|d| d.name != name);
        self.decls.push(ParamDecl { name: name.to_string(), kind, default });
        self
    }

    /// Canonical superset: every parameter the backend understands.
    pub fn superset(seed: i64) -> Self {
        Self::new()
            .with(SEED_KEY, ParamKind::Number, ParamDefault::Number(seed))
            .with("numServices", ParamKind::Number, ParamDefault::Number(3))
            .with(MIN_REPLICAS_KEY, ParamKind::Number, ParamDefault::Number(2))
            .with(MAX_REPLICAS_KEY, ParamKind::Number, ParamDefault::Number(2))
            .with("percentEdge", ParamKind::Number, ParamDefault::Number(50))
            .with(YAML_KEY, ParamKind::Flag, ParamDefault::Absent)
            .with("k8sNamespace", ParamKind::Text, ParamDefault::Text(DEFAULT_K8S_NAMESPACE.into()))
            .with("k8sApp", ParamKind::Text, ParamDefault::Text(DEFAULT_K8S_APP.into()))
            .with(DEFINE_CONTENT_KEY, ParamKind::Text, ParamDefault::Absent)
    }

    /// Older random-only parameter set, kept for pages that predate the superset.
    pub fn legacy_random(seed: i64) -> Self {
        Self::new()
            .with(SEED_KEY, ParamKind::Number, ParamDefault::Number(seed))
            .with("numServices", ParamKind::Number, ParamDefault::Number(3))
            .with(MIN_REPLICAS_KEY, ParamKind::Number, ParamDefault::Number(2))
            .with(MAX_REPLICAS_KEY, ParamKind::Number, ParamDefault::Number(2))
            .with(YAML_KEY, ParamKind::Flag, ParamDefault::Absent)
    }

    /// The slice of the superset a view's form carries.
    pub fn for_view(view: View, seed: i64) -> Self {
        let all = Self::superset(seed);
        let keep: &[&str] = match view {
            View::Random => &[SEED_KEY, "numServices", MIN_REPLICAS_KEY, MAX_REPLICAS_KEY, "percentEdge", YAML_KEY, "k8sNamespace", "k8sApp"],
            View::Define => &[YAML_KEY, "k8sNamespace", "k8sApp", DEFINE_CONTENT_KEY],
        };
        Self { decls: all.decls.into_iter().filter(|d| keep.contains(&d.name.as_str())).collect() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamDecl> {
        self.decls.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ParamDecl> {
        self.decls.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

/// A fresh non-negative seed in the int64 range.
pub fn random_seed() -> i64 {
    use rand::Rng;
    rand::rng().random_range(0..=i64::MAX)
}

/// Materialized value of one parameter after syncing with the form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Number(String),
    Flag(bool),
}

impl ParamValue {
    /// Query-string rendering, or None when the value must not be sent.
    pub fn to_query(&self) -> Option<String> {
        match self {
            ParamValue::Text(s) | ParamValue::Number(s) if !s.is_empty() => Some(s.clone()),
            ParamValue::Flag(true) => Some("true".to_string()),
            _ => None,
        }
    }
}

/// Fully defaulted parameters for the active view, in request order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EffectiveParameters {
    entries: Vec<(String, ParamValue)>,
}

impl EffectiveParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn set(&mut self, name: &str, value: ParamValue) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(ParamValue::Flag(true)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A backend call, relative to the API base URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn has_query(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }

    /// Path plus encoded query string, e.g. `/api/random.mmd?seed=1`.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let qs = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.path, qs)
    }
}

impl std::fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path_and_query())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("invalid base url: {0}")]
    InvalidBase(String),
}

pub mod prelude {
    pub use super::{
        CallKind, CodecError, EffectiveParameters, Method, ParamDecl, ParamDefault, ParamKind,
        ParamValue, ParameterSpec, RequestDescriptor, View,
    };
}
