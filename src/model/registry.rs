//! Type registry: maps a `type` discriminator to the decoder for that variant.
//!
//! Every element read from storage passes through [`TypeRegistry::decode`].
//! Documents without a discriminator decode as [`ElementKind::Generic`].

use std::collections::HashMap;
use std::net::IpAddr;

use super::document::keys;
use super::{Document, Element, ElementId, ElementKind, Value};
use crate::{Error, Result};

/// Decoder for one element variant.
pub type DecodeFn = fn(ElementId, Document) -> Result<Element>;

/// Closed registry of element decoders.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TypeRegistry {
    /// The built-in variants: hostname, url, ip, as, evil.
    pub fn builtin() -> Self {
        let mut decoders: HashMap<&'static str, DecodeFn> = HashMap::new();
        for kind in ElementKind::TYPED {
            if let Some(t) = kind.discriminator() {
                decoders.insert(t, decoder_for(kind));
            }
        }
        Self { decoders }
    }

    /// Resolve a discriminator. Unknown discriminators are an error.
    pub fn resolve(&self, discriminator: &str) -> Result<DecodeFn> {
        self.decoders
            .get(discriminator)
            .copied()
            .ok_or_else(|| Error::UnknownType(discriminator.to_string()))
    }

    /// Check that a candidate's `type` (if any) is one this registry knows.
    pub fn validate(&self, doc: &Document) -> Result<()> {
        match doc.get(keys::TYPE) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::String(t)) => self.resolve(t).map(|_| ()),
            Some(other) => Err(Error::UnknownType(other.to_string())),
        }
    }

    pub fn decode(&self, id: ElementId, doc: Document) -> Result<Element> {
        let decode: DecodeFn = match doc.get(keys::TYPE) {
            None | Some(Value::Null) => decode_generic,
            Some(Value::String(t)) => self.resolve(t)?,
            Some(other) => {
                return Err(Error::Decode(format!(
                    "element {id}: type must be a string, got {}",
                    other.type_name()
                )));
            }
        };
        decode(id, doc)
    }

    pub fn discriminators(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }
}

fn decoder_for(kind: ElementKind) -> DecodeFn {
    match kind {
        ElementKind::Hostname => decode_hostname,
        ElementKind::Url => decode_url,
        ElementKind::Ip => decode_ip,
        ElementKind::As => decode_as,
        ElementKind::Evil => decode_evil,
        ElementKind::Generic => decode_generic,
    }
}

fn decode_hostname(id: ElementId, doc: Document) -> Result<Element> {
    let el = Element::from_document(ElementKind::Hostname, id, doc)?;
    if el.get("domain").is_some() {
        return Ok(el);
    }
    let domain = registered_domain(&el.value);
    Ok(el.with_attribute("domain", domain))
}

fn decode_url(id: ElementId, doc: Document) -> Result<Element> {
    let mut el = Element::from_document(ElementKind::Url, id, doc)?;
    let (scheme, host, path) = split_url(&el.value);
    for (key, derived) in [("scheme", scheme), ("hostname", host), ("path", path)] {
        if el.get(key).is_none() {
            el.attributes.insert(key, derived);
        }
    }
    Ok(el)
}

fn decode_ip(id: ElementId, doc: Document) -> Result<Element> {
    let el = Element::from_document(ElementKind::Ip, id, doc)?;
    let version = match el.value.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Value::Int(4),
        Ok(IpAddr::V6(_)) => Value::Int(6),
        Err(_) => Value::Null,
    };
    Ok(el.with_attribute("version", version))
}

fn decode_as(id: ElementId, doc: Document) -> Result<Element> {
    Element::from_document(ElementKind::As, id, doc)
}

fn decode_evil(id: ElementId, doc: Document) -> Result<Element> {
    Element::from_document(ElementKind::Evil, id, doc)
}

fn decode_generic(id: ElementId, doc: Document) -> Result<Element> {
    Element::from_document(ElementKind::Generic, id, doc)
}

/// Last two labels of a hostname.
fn registered_domain(host: &str) -> String {
    let labels: Vec<&str> = host.trim_end_matches('.').rsplit('.').take(2).collect();
    labels.into_iter().rev().collect::<Vec<_>>().join(".")
}

/// Split `scheme://host/path` into its parts. Missing scheme yields "".
fn split_url(url: &str) -> (String, String, String) {
    let (scheme, rest) = match url.split_once("://") {
        Some((s, r)) => (s.to_ascii_lowercase(), r),
        None => (String::new(), url),
    };
    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or(host);
    (scheme, host.to_ascii_lowercase(), path.to_string())
}
