//! URL state codec: location <-> (view, overrides), and the canonical backend request.
//!
//! Locations may carry parameters in the real query (`/?seed=1#random`) or
//! embedded in the fragment (`#random?seed=1`, `#random&yaml`). Both are read;
//! fragment parameters come later and win on conflict.

#![forbid(unsafe_code)]

use url::{form_urlencoded, Url};

use crate::{CodecError, EffectiveParameters, Method, ParamDecl, ParameterSpec, RequestDescriptor, View, DEFINE_CONTENT_KEY};

const RELATIVE_BASE: &str = "http://localhost/";

/// Decoded location: the selected view and raw query overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// None when the fragment names something other than a view (e.g. `#about`).
    pub view: Option<View>,
    pub overrides: Vec<(String, String)>,
}

impl Route {
    /// Last occurrence wins, like repeated query keys overwriting each other.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.overrides.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.overrides.iter().any(|(k, _)| k == key)
    }

    /// Spec declarations in request order: keys seen in the location first
    /// (first-occurrence order), then the remaining keys in declaration order.
    /// Undeclared location keys are dropped rather than forwarded to the backend.
    pub fn ordered<'a>(&self, spec: &'a ParameterSpec) -> Vec<&'a ParamDecl> {
        let mut out: Vec<&'a ParamDecl> = Vec::with_capacity(spec.len());
        for (k, _) in &self.overrides {
            if let Some(d) = spec.get(k) {
                if !out.iter().any(|o| o.name == d.name) {
                    out.push(d);
                }
            }
        }
        for d in spec.iter() {
            if !out.iter().any(|o| o.name == d.name) {
                out.push(d);
            }
        }
        out
    }
}

fn parse_location(location: &str) -> Result<(Url, bool), CodecError> {
    match Url::parse(location) {
        Ok(u) => Ok((u, false)),
        Err(_) => {
            let base = Url::parse(RELATIVE_BASE).map_err(|e| CodecError::InvalidLocation(e.to_string()))?;
            let u = base
                .join(location)
                .map_err(|e| CodecError::InvalidLocation(format!("{}: {}", location, e)))?;
            Ok((u, true))
        }
    }
}

/// Split `random?a=1` / `random&yaml` into the view name and its embedded query.
fn split_fragment(fragment: &str) -> (&str, Option<&str>) {
    match fragment.find(['?', '&']) {
        Some(i) => (&fragment[..i], Some(&fragment[i + 1..])),
        None => (fragment, None),
    }
}

pub fn decode(location: &str) -> Result<Route, CodecError> {
    let (url, _) = parse_location(location)?;
    let mut overrides: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let (name, embedded) = split_fragment(url.fragment().unwrap_or(""));
    if let Some(q) = embedded {
        overrides.extend(form_urlencoded::parse(q.as_bytes()).into_owned());
    }
    Ok(Route { view: View::from_fragment(name), overrides })
}

pub fn encode(view: View, effective: &EffectiveParameters, as_yaml: bool) -> RequestDescriptor {
    let ext = if as_yaml { "yaml" } else { "mmd" };
    let mut query = Vec::with_capacity(effective.len());
    let mut body = None;
    for (k, v) in effective.iter() {
        let Some(rendered) = v.to_query() else { continue };
        if view == View::Define && k == DEFINE_CONTENT_KEY {
            body = Some(rendered);
        } else {
            query.push((k.to_string(), rendered));
        }
    }
    RequestDescriptor {
        method: if body.is_some() { Method::Post } else { Method::Get },
        path: format!("/api/{}.{}", view, ext),
        query,
        body,
    }
}

/// The dependent manifest call: always YAML, `k8s=true`, body forwarded as-is.
pub fn secondary(primary: &RequestDescriptor, view: View) -> RequestDescriptor {
    let mut d = primary.clone();
    d.path = format!("/api/{}.yaml", view);
    d.query.retain(|(k, _)| k != "k8s");
    d.query.push(("k8s".to_string(), "true".to_string()));
    d
}

fn serialize_pairs<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
}

/// Rewrite `location` so `key` resolves to `value`, dropping other occurrences.
/// The parameter lands in the fragment query when the location already uses one.
pub fn with_param(location: &str, key: &str, value: &str) -> Result<String, CodecError> {
    let (mut url, relative) = parse_location(location)?;
    let fragment = url.fragment().unwrap_or("").to_string();
    let (name, embedded) = split_fragment(&fragment);

    let mut query: Vec<(String, String)> = url.query_pairs().into_owned().filter(|(k, _)| k != key).collect();
    let new_fragment = match embedded {
        Some(q) => {
            let mut pairs: Vec<(String, String)> = form_urlencoded::parse(q.as_bytes()).into_owned().filter(|(k, _)| k != key).collect();
            pairs.push((key.to_string(), value.to_string()));
            Some(format!("{}?{}", name, serialize_pairs(pairs.iter().map(|(k, v)| (k, v)))))
        }
        None => {
            query.push((key.to_string(), value.to_string()));
            None
        }
    };
    if query.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&serialize_pairs(query.iter().map(|(k, v)| (k, v)))));
    }
    if let Some(f) = new_fragment {
        url.set_fragment(Some(&f));
    }
    if relative {
        Ok(url[url::Position::BeforePath..].to_string())
    } else {
        Ok(url.to_string())
    }
}

/// Location that selects `view` with exactly `pairs` as its query, keeping
/// the scheme/host/path of `current`.
pub fn location_for(current: &str, view: View, pairs: &[(String, String)]) -> Result<String, CodecError> {
    let (mut url, relative) = parse_location(current)?;
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&serialize_pairs(pairs.iter().map(|(k, v)| (k, v)))));
    }
    url.set_fragment(Some(view.as_str()));
    if relative {
        Ok(url[url::Position::BeforePath..].to_string())
    } else {
        Ok(url.to_string())
    }
}

/// Resolve a descriptor against the backend base URL (which may carry a path prefix).
pub fn absolute(base: &str, descriptor: &RequestDescriptor) -> Result<Url, CodecError> {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(CodecError::InvalidBase("empty".into()));
    }
    let mut url = Url::parse(&format!("{}{}", trimmed, descriptor.path))
        .map_err(|e| CodecError::InvalidBase(format!("{}: {}", base, e)))?;
    if !descriptor.query.is_empty() {
        url.query_pairs_mut().extend_pairs(descriptor.query.iter());
    }
    Ok(url)
}
