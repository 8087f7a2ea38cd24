//! Contract schemas fetched at runtime.
//!
//! A contract publishes its interface as a `FileDescriptorSet`. [`SchemaTree`] indexes it by
//! package namespace so a method name can be resolved to input/output message types without
//! knowing the contract ahead of time.

pub mod transform;

use crate::errors::CaError;
use eyre::Context as _;
use prost::Message as _;
use prost_reflect::{
    DescriptorPool, DeserializeOptions, DynamicMessage, MessageDescriptor, SerializeOptions,
};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct MethodNode {
    pub service: String,
    pub name: String,
    pub input: MessageDescriptor,
    pub output: MessageDescriptor,
}

#[derive(Debug, Clone)]
pub struct ServiceNode {
    pub full_name: String,
    pub methods: Vec<MethodNode>,
}

/// One package segment. Services appear in declaration order; children in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub name: String,
    pub services: Vec<ServiceNode>,
    pub children: Vec<Namespace>,
}

impl Namespace {
    fn insert(&mut self, path: &[&str], service: ServiceNode) {
        let Some((head, rest)) = path.split_first() else {
            self.services.push(service);
            return;
        };
        if let Some(child) = self.children.iter_mut().find(|c| c.name == *head) {
            child.insert(rest, service);
            return;
        }
        let mut child = Self {
            name: (*head).to_owned(),
            ..Self::default()
        };
        child.insert(rest, service);
        self.children.push(child);
    }
}

#[derive(Debug, Clone)]
pub struct SchemaTree {
    root: Namespace,
}

fn strip_dots(s: &str) -> String {
    s.chars().filter(|c| *c != '.').collect()
}

/// Resolve `method` against the tree: breadth-first over namespaces, services in declaration
/// order, methods in order. Names compare with `.` removed. The first hit wins, even when a
/// later service declares the same name.
pub fn first_structural_match<'a>(tree: &'a SchemaTree, method: &str) -> Option<&'a MethodNode> {
    let wanted = strip_dots(method);
    let mut queue = VecDeque::from([&tree.root]);
    while let Some(ns) = queue.pop_front() {
        for svc in &ns.services {
            if let Some(m) = svc.methods.iter().find(|m| strip_dots(&m.name) == wanted) {
                return Some(m);
            }
        }
        queue.extend(ns.children.iter());
    }
    None
}

impl SchemaTree {
    pub fn from_descriptor_set(bytes: &[u8]) -> eyre::Result<Self> {
        let pool = DescriptorPool::decode(bytes).context("decode contract FileDescriptorSet")?;
        Ok(Self::from_pool(&pool))
    }

    pub fn from_pool(pool: &DescriptorPool) -> Self {
        let mut root = Namespace::default();
        for file in pool.files() {
            let package = file.package_name().to_owned();
            let path: Vec<&str> = package.split('.').filter(|s| !s.is_empty()).collect();
            for svc in file.services() {
                let methods = svc
                    .methods()
                    .map(|m| MethodNode {
                        service: svc.full_name().to_owned(),
                        name: m.name().to_owned(),
                        input: m.input(),
                        output: m.output(),
                    })
                    .collect();
                root.insert(
                    &path,
                    ServiceNode {
                        full_name: svc.full_name().to_owned(),
                        methods,
                    },
                );
            }
        }
        Self { root }
    }

    pub fn method(&self, name: &str) -> Option<&MethodNode> {
        first_structural_match(self, name)
    }

    /// Every method name, breadth-first.
    pub fn method_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([&self.root]);
        while let Some(ns) = queue.pop_front() {
            for svc in &ns.services {
                out.extend(svc.methods.iter().map(|m| m.name.clone()));
            }
            queue.extend(ns.children.iter());
        }
        out
    }

    /// Encode a plain JSON argument object as `method`'s input message.
    pub fn encode_input(&self, method: &str, args: &Value) -> eyre::Result<Vec<u8>> {
        let m = self
            .method(method)
            .ok_or_else(|| CaError::MethodInputTypeNotFound(method.to_owned()))?;
        encode_message(&m.input, args)
    }

    /// Decode `method`'s output bytes back into friendly JSON.
    pub fn decode_output(&self, method: &str, bytes: &[u8]) -> eyre::Result<Value> {
        let m = self
            .method(method)
            .ok_or_else(|| CaError::MethodInputTypeNotFound(method.to_owned()))?;
        decode_message(&m.output, bytes)
    }
}

pub fn encode_message(desc: &MessageDescriptor, args: &Value) -> eyre::Result<Vec<u8>> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args.clone()
    };
    let shaped = transform::shape_input(desc, args);
    let opts = DeserializeOptions::new().deny_unknown_fields(false);
    let msg = DynamicMessage::deserialize_with_options(desc.clone(), shaped, &opts).map_err(|e| {
        CaError::InvalidArgument(format!("args do not match {}: {e}", desc.full_name()))
    })?;
    Ok(msg.encode_to_vec())
}

pub fn decode_message(desc: &MessageDescriptor, bytes: &[u8]) -> eyre::Result<Value> {
    let msg = DynamicMessage::decode(desc.clone(), bytes)
        .with_context(|| format!("decode {}", desc.full_name()))?;
    let opts = SerializeOptions::new().skip_default_fields(false);
    let v = msg
        .serialize_with_options(serde_json::value::Serializer, &opts)
        .with_context(|| format!("serialize {}", desc.full_name()))?;
    Ok(transform::shape_output(desc, v))
}
