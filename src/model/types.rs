//! Type descriptors for the modeled API surface.
//!
//! A descriptor is flat data: primitives, unions, callables and references to
//! named object groups. There is no subtyping beyond union membership, so a
//! check against a union succeeds when at least one member succeeds.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    String,
    Integer,
    Boolean,
    Undefined,
    Null,
    Iterable,
    /// Any object value, regardless of group.
    PlainObject,
    Anything,
}

impl Primitive {
    /// Host group whose methods apply to a boxed primitive (`"abc".slice(..)`).
    pub fn boxed_group(self) -> Option<&'static str> {
        match self {
            Self::String => Some("String"),
            _ => None,
        }
    }
}

/// Reference to an object group together with the property and method names
/// the type exposes. The names must be declared by the group itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectShape {
    pub group: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub ty: TypeDesc,
    #[serde(default)]
    pub optional: bool,
}

impl Param {
    pub fn plain(ty: TypeDesc) -> Self {
        Self { ty, optional: false }
    }

    pub fn opt(ty: TypeDesc) -> Self {
        Self { ty, optional: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: TypeDesc,
}

impl Signature {
    pub fn new(params: Vec<Param>, returns: TypeDesc) -> Self {
        Self { params, returns }
    }

    pub fn required_arity(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    /// Whether a call with `args` satisfies arity and parameter types.
    /// Optional parameters may only be omitted from the tail.
    pub fn accepts_args(&self, args: &[TypeDesc]) -> bool {
        if args.len() > self.max_arity() {
            return false;
        }
        if self.params[args.len()..].iter().any(|p| !p.optional) {
            return false;
        }
        self.params.iter().zip(args).all(|(param, arg)| param.ty.accepts(arg))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDesc {
    Primitive { of: Primitive },
    Union { members: Vec<TypeDesc> },
    Function { signature: Box<Signature> },
    Constructor {
        signature: Box<Signature>,
        /// Group holding static members (`Response.redirect`, `Headers.prototype`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        statics: Option<String>,
    },
    Object { shape: ObjectShape },
}

impl TypeDesc {
    pub const fn primitive(of: Primitive) -> Self {
        Self::Primitive { of }
    }

    pub const fn string() -> Self {
        Self::primitive(Primitive::String)
    }

    pub const fn integer() -> Self {
        Self::primitive(Primitive::Integer)
    }

    pub const fn boolean() -> Self {
        Self::primitive(Primitive::Boolean)
    }

    pub const fn undefined() -> Self {
        Self::primitive(Primitive::Undefined)
    }

    pub const fn null() -> Self {
        Self::primitive(Primitive::Null)
    }

    pub const fn iterable() -> Self {
        Self::primitive(Primitive::Iterable)
    }

    pub const fn plain_object() -> Self {
        Self::primitive(Primitive::PlainObject)
    }

    pub const fn anything() -> Self {
        Self::primitive(Primitive::Anything)
    }

    pub fn function(params: Vec<Param>, returns: TypeDesc) -> Self {
        Self::Function {
            signature: Box::new(Signature::new(params, returns)),
        }
    }

    pub fn constructor(params: Vec<Param>, returns: TypeDesc) -> Self {
        Self::Constructor {
            signature: Box::new(Signature::new(params, returns)),
            statics: None,
        }
    }

    /// Attach a static-member group to a constructor type.
    pub fn with_statics(self, group: &str) -> Self {
        match self {
            Self::Constructor { signature, .. } => Self::Constructor {
                signature,
                statics: Some(group.to_string()),
            },
            other => other,
        }
    }

    pub fn object(group: &str, properties: &[&str], methods: &[&str]) -> Self {
        Self::Object {
            shape: ObjectShape {
                group: group.to_string(),
                properties: properties.iter().map(|s| s.to_string()).collect(),
                methods: methods.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    /// Flattened union members; a non-union type is its own single member.
    pub fn members(&self) -> Vec<&TypeDesc> {
        match self {
            Self::Union { members } => members.iter().flat_map(|m| m.members()).collect(),
            other => vec![other],
        }
    }

    /// Group consulted for method and property lookups on this (non-union) type.
    pub fn group_name(&self) -> Option<&str> {
        match self {
            Self::Object { shape } => Some(&shape.group),
            Self::Constructor { statics, .. } => statics.as_deref(),
            Self::Primitive { of } => of.boxed_group(),
            _ => None,
        }
    }

    pub fn construct_signature(&self) -> Option<&Signature> {
        self.members().into_iter().find_map(|m| match m {
            Self::Constructor { signature, .. } => Some(signature.as_ref()),
            _ => None,
        })
    }

    /// Whether a value of type `arg` may be passed where `self` is expected.
    pub fn accepts(&self, arg: &TypeDesc) -> bool {
        let params = self.members();
        arg.members()
            .into_iter()
            .any(|a| params.iter().any(|p| accepts_member(p, a)))
    }
}

fn accepts_member(param: &TypeDesc, arg: &TypeDesc) -> bool {
    match (param, arg) {
        (TypeDesc::Primitive { of: Primitive::Anything }, _) => true,
        (_, TypeDesc::Primitive { of: Primitive::Anything }) => true,
        (TypeDesc::Primitive { of: Primitive::PlainObject }, TypeDesc::Object { .. }) => true,
        (TypeDesc::Primitive { of: a }, TypeDesc::Primitive { of: b }) => a == b,
        (TypeDesc::Function { .. }, TypeDesc::Function { .. }) => true,
        (TypeDesc::Constructor { .. }, TypeDesc::Constructor { .. }) => true,
        (TypeDesc::Object { shape: a }, TypeDesc::Object { shape: b }) => a.group == b.group,
        _ => false,
    }
}

impl BitOr for TypeDesc {
    type Output = TypeDesc;

    fn bitor(self, rhs: TypeDesc) -> TypeDesc {
        let mut members: Vec<TypeDesc> = Vec::new();
        for m in self.members().into_iter().chain(rhs.members()) {
            if !members.contains(m) {
                members.push(m.clone());
            }
        }
        if members.len() == 1 {
            return members.remove(0);
        }
        TypeDesc::Union { members }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive { of } => write!(f, ".{}", format!("{of:?}").to_lowercase()),
            Self::Union { members } => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "({})", parts.join(" | "))
            }
            Self::Function { signature } => write!(f, "function{signature}"),
            Self::Constructor { signature, statics } => match statics {
                Some(group) => write!(f, "constructor{signature} + {group}"),
                None => write!(f, "constructor{signature}"),
            },
            Self::Object { shape } => write!(f, "{}", shape.group),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .params
            .iter()
            .map(|p| if p.optional { format!("{}?", p.ty) } else { p.ty.to_string() })
            .collect();
        write!(f, "[{}] => {}", parts.join(", "), self.returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_accepts_if_any_member_does() {
        let param = TypeDesc::string() | TypeDesc::undefined();
        assert!(param.accepts(&TypeDesc::string()));
        assert!(param.accepts(&TypeDesc::undefined()));
        assert!(!param.accepts(&TypeDesc::integer()));
        assert!(TypeDesc::string().accepts(&(TypeDesc::string() | TypeDesc::null())));
    }

    #[test]
    fn plain_object_accepts_grouped_objects_but_not_primitives() {
        let obj = TypeDesc::object("Headers", &[], &["get"]);
        assert!(TypeDesc::plain_object().accepts(&obj));
        assert!(!TypeDesc::plain_object().accepts(&TypeDesc::string()));
        assert!(!obj.accepts(&TypeDesc::object("Response", &[], &[])));
    }

    #[test]
    fn optional_params_may_only_be_dropped_from_the_tail() {
        let sig = Signature::new(
            vec![Param::plain(TypeDesc::string()), Param::opt(TypeDesc::plain_object())],
            TypeDesc::undefined(),
        );
        assert!(sig.accepts_args(&[TypeDesc::string()]));
        let options = TypeDesc::object("ContentOptions", &["html"], &[]);
        assert!(sig.accepts_args(&[TypeDesc::string(), options]));
        assert!(!sig.accepts_args(&[]));
        let too_many = [TypeDesc::string(), TypeDesc::plain_object(), TypeDesc::string()];
        assert!(!sig.accepts_args(&too_many));
        assert_eq!(sig.required_arity(), 1);
        assert_eq!(sig.max_arity(), 2);
    }

    #[test]
    fn bitor_flattens_and_dedups() {
        let t = (TypeDesc::string() | TypeDesc::null()) | TypeDesc::string();
        assert_eq!(t.members().len(), 2);
        assert_eq!(TypeDesc::string() | TypeDesc::string(), TypeDesc::string());
        assert_eq!(t.to_string(), "(.string | .null)");
    }
}
