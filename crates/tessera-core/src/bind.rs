//! Binding of flat dotted properties into typed values via serde
//!
//! Flat keys are folded into a tree (`server.port` → `{server: {port}}`) and
//! leaves stay strings until the target type asks for something else, so a
//! `String` field holding `"8080"` and a `u16` field holding `"8080"` both
//! bind. Sequences come from comma-separated leaves or from indexed
//! sub-keys (`servers.0.host`).

use crate::convert::parse_bool;

use serde::de::value::{MapAccessDeserializer, MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;
use std::collections::BTreeMap;
use tracing::debug;

/// Error raised while binding properties into a type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BindError(String);

impl de::Error for BindError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// A node of the property tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(String),
    Branch(BTreeMap<String, Node>),
}

impl Node {
    /// Fold flat dotted keys into a tree.
    ///
    /// When a key is both a value and a prefix (`a = 1`, `a.b = 2`) the
    /// nested entries win.
    pub fn from_flat(properties: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut root = BTreeMap::new();
        for (key, value) in properties {
            let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
            if parts.is_empty() {
                continue;
            }
            insert_path(&mut root, &parts, value, &key);
        }
        Node::Branch(root)
    }

    /// Deserialize this tree into `T`
    pub fn deserialize_into<T: DeserializeOwned>(self) -> Result<T, BindError> {
        T::deserialize(self)
    }
}

fn insert_path(map: &mut BTreeMap<String, Node>, parts: &[&str], value: String, full_key: &str) {
    let (head, rest) = match parts {
        [head, rest @ ..] => (*head, rest),
        [] => return,
    };

    if rest.is_empty() {
        if matches!(map.get(head), Some(Node::Branch(_))) {
            debug!("Property {full_key} shadowed by nested keys");
        } else {
            map.insert(head.to_string(), Node::Leaf(value));
        }
        return;
    }

    let entry = map
        .entry(head.to_string())
        .or_insert_with(|| Node::Branch(BTreeMap::new()));
    if matches!(entry, Node::Leaf(_)) {
        debug!("Property {head} shadowed by nested key {full_key}");
        *entry = Node::Branch(BTreeMap::new());
    }
    if let Node::Branch(children) = entry {
        insert_path(children, rest, value, full_key);
    }
}

impl<'de> IntoDeserializer<'de, BindError> for Node {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
                match self {
                    Node::Leaf(raw) => {
                        let parsed = raw.trim().parse::<$ty>().map_err(|_| {
                            BindError(format!("invalid {} value '{}'", stringify!($ty), raw))
                        })?;
                        visitor.$visit(parsed)
                    }
                    branch => branch.deserialize_any(visitor),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Node {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Leaf(raw) => visitor.visit_string(raw),
            Node::Branch(map) => visitor.visit_map(MapDeserializer::new(map.into_iter())),
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Leaf(raw) => match parse_bool(&raw) {
                Some(value) => visitor.visit_bool(value),
                None => Err(BindError(format!("invalid bool value '{raw}'"))),
            },
            branch => branch.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Leaf(raw) if raw.trim().is_empty() => visitor.visit_none(),
            node => visitor.visit_some(node),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Leaf(raw) => {
                let items: Vec<Node> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Node::Leaf(item.to_string()))
                    .collect();
                visitor.visit_seq(SeqDeserializer::new(items.into_iter()))
            }
            Node::Branch(map) => {
                let mut indexed = map
                    .into_iter()
                    .map(|(key, node)| key.parse::<usize>().map(|index| (index, node)))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| BindError("expected a list or indexed keys".to_string()))?;
                indexed.sort_by_key(|(index, _)| *index);
                visitor.visit_seq(SeqDeserializer::new(indexed.into_iter().map(|(_, node)| node)))
            }
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        match self {
            Node::Leaf(raw) => visitor.visit_enum(raw.trim().to_string().into_deserializer()),
            Node::Branch(map) => visitor.visit_enum(MapAccessDeserializer::new(MapDeserializer::new(
                map.into_iter(),
            ))),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        char str string bytes byte_buf unit_struct tuple tuple_struct map struct identifier
        ignored_any
    }
}
