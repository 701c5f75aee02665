//! Object signatures: which methods an object exposes and the typed
//! arguments each method takes.
//!
//! A signature is plain data. It is built once (from a builder or from a
//! peer's advertised `list` payload) and never mutated afterwards.
//!
//! # Wire form
//!
//! ```json
//! { "method": { "arg": "string", "other": "number" } }
//! ```
//!
//! When reading a peer's signature only the first character of each type
//! name is significant, so both `"s"` and `"string"` decode to
//! [`ArgKind::String`].

use serde_json::{Map, Value};

use crate::errors::SignatureError;

/// Kind of a method argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Ordered list.
    Array,
    /// Nested table.
    Object,
    /// UTF-8 string.
    String,
    /// 32-bit integer.
    Int32,
    /// 16-bit integer.
    Int16,
    /// 8-bit integer, also used for booleans.
    Int8,
    /// Unrecognized or untyped.
    Unspec,
}

impl ArgKind {
    /// Decode a single-letter type tag.
    pub fn from_tag(tag: char) -> Self {
        match tag {
            'a' => Self::Array,
            'o' => Self::Object,
            's' => Self::String,
            'n' => Self::Int32,
            'b' => Self::Int8,
            _ => Self::Unspec,
        }
    }

    /// Decode an advertised type name by its first character.
    pub fn from_type_name(name: &str) -> Self {
        name.chars().next().map_or(Self::Unspec, Self::from_tag)
    }

    /// Type name used in `list` responses.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Object => "object",
            Self::String => "string",
            Self::Int32 | Self::Int16 => "number",
            Self::Int8 => "boolean",
            Self::Unspec => "unknown",
        }
    }

    /// Whether a JSON value is acceptable for this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::String => value.is_string(),
            Self::Int32 | Self::Int16 => value.is_i64() || value.is_u64(),
            Self::Int8 => value.is_boolean() || value.is_i64() || value.is_u64(),
            Self::Unspec => true,
        }
    }
}

/// One method and its ordered, typed arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    name: String,
    args: Vec<(String, ArgKind)>,
}

impl MethodSignature {
    /// Create a method signature.
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (S, ArgKind)>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(|(n, k)| (n.into(), k)).collect(),
        }
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered `(argument name, kind)` pairs.
    pub fn args(&self) -> &[(String, ArgKind)] {
        &self.args
    }

    /// Kind of the named argument, if declared.
    pub fn arg_kind(&self, arg: &str) -> Option<ArgKind> {
        self.args.iter().find(|(n, _)| n == arg).map(|(_, k)| *k)
    }
}

/// Immutable method table of one bus object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectSignature {
    methods: Vec<MethodSignature>,
}

impl ObjectSignature {
    /// Start building a signature.
    pub fn builder() -> ObjectSignatureBuilder {
        ObjectSignatureBuilder::default()
    }

    /// Parse a peer's advertised signature for `object`.
    pub fn from_wire(object: &str, value: &Value) -> Result<Self, SignatureError> {
        let Value::Object(methods) = value else {
            return Err(SignatureError::NotAnObject {
                object: object.to_owned(),
            });
        };

        let mut builder = Self::builder();
        for (method, args) in methods {
            let Value::Object(args) = args else {
                return Err(SignatureError::MalformedMethod {
                    object: object.to_owned(),
                    method: method.clone(),
                });
            };
            let args = args.iter().map(|(name, ty)| {
                let kind = ty.as_str().map_or(ArgKind::Unspec, ArgKind::from_type_name);
                (name.as_str(), kind)
            });
            builder = builder.method(method.as_str(), args);
        }
        Ok(builder.build())
    }

    /// Encode for a `list` response.
    pub fn to_wire(&self) -> Value {
        let methods: Map<String, Value> = self
            .methods
            .iter()
            .map(|m| {
                let args: Map<String, Value> = m
                    .args
                    .iter()
                    .map(|(n, k)| (n.clone(), Value::String(k.wire_name().to_owned())))
                    .collect();
                (m.name.clone(), Value::Object(args))
            })
            .collect();
        Value::Object(methods)
    }

    /// All methods in declaration order.
    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    /// Look up one method.
    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Number of methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the object exposes no methods.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Builder for [`ObjectSignature`].
#[derive(Debug, Default)]
pub struct ObjectSignatureBuilder {
    methods: Vec<MethodSignature>,
}

impl ObjectSignatureBuilder {
    /// Add a method. A later method with the same name replaces the earlier one.
    #[must_use]
    pub fn method<I, S>(mut self, name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (S, ArgKind)>,
        S: Into<String>,
    {
        let method = MethodSignature::new(name, args);
        self.methods.retain(|m| m.name != method.name);
        self.methods.push(method);
        self
    }

    /// Finish building.
    pub fn build(self) -> ObjectSignature {
        ObjectSignature {
            methods: self.methods,
        }
    }
}
