//! Metadata export payload
//!
//! The shape the core must produce for downstream consumers:
//! `{data: <one-or-many entity>, included: [...], links: {...}}`. The
//! exact wire encoding beyond this shape belongs to the external
//! serialization layer.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// One entity or many.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PayloadData {
    One(Value),
    Many(Vec<Value>),
}

/// Exported metadata payload.
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub data: PayloadData,
    pub included: Vec<Value>,
    pub links: BTreeMap<String, String>,
}

impl Payload {
    /// Payload carrying one entity.
    pub fn one<T: Serialize>(entity: &T) -> Result<Self> {
        Ok(Self {
            data: PayloadData::One(serde_json::to_value(entity)?),
            included: Vec::new(),
            links: BTreeMap::new(),
        })
    }

    /// Payload carrying many entities of one type.
    pub fn many<T: Serialize>(entities: &[T]) -> Result<Self> {
        let data = entities
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            data: PayloadData::Many(data),
            included: Vec::new(),
            links: BTreeMap::new(),
        })
    }

    /// Append related entities to `included`.
    pub fn include<T: Serialize>(&mut self, entities: &[T]) -> Result<()> {
        for entity in entities {
            self.included.push(serde_json::to_value(entity)?);
        }
        Ok(())
    }

    /// Add a named link.
    pub fn link(&mut self, name: impl Into<String>, href: impl Into<String>) {
        self.links.insert(name.into(), href.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Thing {
        name: &'static str,
    }

    #[test]
    fn one_many_and_included_shape() {
        let mut payload = Payload::one(&Thing { name: "a" }).unwrap();
        payload.include(&[Thing { name: "b" }]).unwrap();
        payload.link("self", "/things/a");

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["data"], json!({"name": "a"}));
        assert_eq!(value["included"], json!([{"name": "b"}]));
        assert_eq!(value["links"]["self"], json!("/things/a"));

        let many = Payload::many(&[Thing { name: "x" }, Thing { name: "y" }]).unwrap();
        let value = serde_json::to_value(&many).unwrap();
        assert_eq!(value["data"].as_array().unwrap().len(), 2);
    }
}
