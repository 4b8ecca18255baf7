//! Object groups and the surface model registry.
//!
//! Groups are declared once, validated eagerly, and read-only afterwards. A
//! `SurfaceModel` can be shared across any number of generation contexts.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};

use crate::{FuzzError, FuzzResult, Signature, TypeDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrigin {
    /// Part of the modeled extension; absent on builds without it.
    Surface,
    /// Provided by every JavaScript host (`String`, `Promise`, ...).
    Host,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectGroup {
    pub name: String,
    pub origin: GroupOrigin,
    #[serde(rename = "instanceType")]
    pub instance_type: TypeDesc,
    #[serde(default)]
    pub properties: BTreeMap<String, TypeDesc>,
    #[serde(default)]
    pub methods: BTreeMap<String, Signature>,
    #[serde(rename = "constructorPath", default, skip_serializing_if = "Option::is_none")]
    pub constructor_path: Option<String>,
}

impl ObjectGroup {
    pub fn surface(name: &str, instance_type: TypeDesc) -> Self {
        Self::new(name, GroupOrigin::Surface, instance_type)
    }

    pub fn host(name: &str, instance_type: TypeDesc) -> Self {
        Self::new(name, GroupOrigin::Host, instance_type)
    }

    fn new(name: &str, origin: GroupOrigin, instance_type: TypeDesc) -> Self {
        Self {
            name: name.to_string(),
            origin,
            instance_type,
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            constructor_path: None,
        }
    }

    pub fn property(mut self, name: &str, ty: TypeDesc) -> Self {
        self.properties.insert(name.to_string(), ty);
        self
    }

    pub fn method(mut self, name: &str, signature: Signature) -> Self {
        self.methods.insert(name.to_string(), signature);
        self
    }

    pub fn constructor_path(mut self, path: &str) -> Self {
        self.constructor_path = Some(path.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceModel {
    groups: BTreeMap<String, ObjectGroup>,
    builtins: BTreeMap<String, TypeDesc>,
}

impl SurfaceModel {
    /// Build and validate a model. Any reference to an undeclared group,
    /// property or method is reported here, never at generation time.
    pub fn new(
        groups: impl IntoIterator<Item = ObjectGroup>,
        builtins: impl IntoIterator<Item = (String, TypeDesc)>,
    ) -> FuzzResult<Self> {
        let mut by_name = BTreeMap::new();
        for group in groups {
            let name = group.name.clone();
            if by_name.insert(name.clone(), group).is_some() {
                return Err(FuzzError::Config(format!("object group {name:?} declared twice")));
            }
        }

        let model = Self {
            groups: by_name,
            builtins: builtins.into_iter().collect(),
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> FuzzResult<()> {
        for group in self.groups.values() {
            let owner = format!("group {}", group.name);
            if group.instance_type.group_name() != Some(group.name.as_str()) {
                return Err(FuzzError::Config(format!(
                    "{owner}: instance type {} does not refer back to the group",
                    group.instance_type
                )));
            }
            self.check_type(&group.instance_type, &format!("{owner} instance type"))?;
            for (prop, ty) in &group.properties {
                self.check_type(ty, &format!("{owner} property {prop}"))?;
            }
            for (method, sig) in &group.methods {
                self.check_signature(sig, &format!("{owner} method {method}"))?;
            }
        }
        for (name, ty) in &self.builtins {
            self.check_type(ty, &format!("builtin {name}"))?;
        }
        Ok(())
    }

    fn check_signature(&self, sig: &Signature, context: &str) -> FuzzResult<()> {
        let mut seen_optional = false;
        for (idx, param) in sig.params.iter().enumerate() {
            if seen_optional && !param.optional {
                return Err(FuzzError::Config(format!(
                    "{context}: required parameter {idx} follows an optional one in {sig}"
                )));
            }
            seen_optional |= param.optional;
            self.check_type(&param.ty, &format!("{context} parameter {idx}"))?;
        }
        self.check_type(&sig.returns, &format!("{context} return type"))
    }

    fn check_type(&self, ty: &TypeDesc, context: &str) -> FuzzResult<()> {
        match ty {
            TypeDesc::Primitive { .. } => Ok(()),
            TypeDesc::Union { members } => {
                if members.is_empty() {
                    return Err(FuzzError::Config(format!("{context}: empty union")));
                }
                members.iter().try_for_each(|m| self.check_type(m, context))
            }
            TypeDesc::Function { signature } => self.check_signature(signature, context),
            TypeDesc::Constructor { signature, statics } => {
                if let Some(group) = statics {
                    self.require_group_for(group, context)?;
                }
                self.check_signature(signature, context)
            }
            TypeDesc::Object { shape } => {
                let group = self.require_group_for(&shape.group, context)?;
                for prop in &shape.properties {
                    if !group.properties.contains_key(prop) {
                        return Err(FuzzError::Config(format!(
                            "{context}: property {prop:?} is not declared by group {}",
                            group.name
                        )));
                    }
                }
                for method in &shape.methods {
                    if !group.methods.contains_key(method) {
                        return Err(FuzzError::Config(format!(
                            "{context}: method {method:?} is not declared by group {}",
                            group.name
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    fn require_group_for(&self, name: &str, context: &str) -> FuzzResult<&ObjectGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| {
                FuzzError::Config(format!("{context}: undeclared object group {name:?}"))
            })
    }

    pub fn group(&self, name: &str) -> Option<&ObjectGroup> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &ObjectGroup> {
        self.groups.values()
    }

    pub fn builtin(&self, name: &str) -> Option<&TypeDesc> {
        self.builtins.get(name)
    }

    pub fn builtins(&self) -> impl Iterator<Item = (&str, &TypeDesc)> {
        self.builtins.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Signature of `method` on a value of type `ty`; the first union member
    /// whose group declares the method wins.
    pub fn method_signature(&self, ty: &TypeDesc, method: &str) -> Option<&Signature> {
        ty.members()
            .into_iter()
            .filter_map(|m| m.group_name())
            .filter_map(|g| self.groups.get(g))
            .find_map(|g| g.methods.get(method))
    }

    pub fn property_type(&self, ty: &TypeDesc, property: &str) -> Option<&TypeDesc> {
        ty.members()
            .into_iter()
            .filter_map(|m| m.group_name())
            .filter_map(|g| self.groups.get(g))
            .find_map(|g| g.properties.get(property))
    }

    /// First signature of `method` on `ty` that accepts `args`.
    pub fn resolve_call(
        &self,
        ty: &TypeDesc,
        method: &str,
        args: &[TypeDesc],
    ) -> Option<&Signature> {
        ty.members()
            .into_iter()
            .filter_map(|m| m.group_name())
            .filter_map(|g| self.groups.get(g))
            .filter_map(|g| g.methods.get(method))
            .find(|sig| sig.accepts_args(args))
    }

    /// Is `method` callable on `ty` with arguments of the given types?
    pub fn can_call(&self, ty: &TypeDesc, method: &str, args: &[TypeDesc]) -> bool {
        self.resolve_call(ty, method, args).is_some()
    }

    /// Every method name callable on a value of type `ty`.
    pub fn methods_of(&self, ty: &TypeDesc) -> BTreeSet<&str> {
        ty.members()
            .into_iter()
            .filter_map(|m| m.group_name())
            .filter_map(|g| self.groups.get(g))
            .flat_map(|g| g.methods.keys().map(String::as_str))
            .collect()
    }

    /// Method names declared by groups of the given origin.
    pub fn method_names(&self, origin: GroupOrigin) -> BTreeSet<&str> {
        self.groups
            .values()
            .filter(|g| g.origin == origin)
            .flat_map(|g| g.methods.keys().map(String::as_str))
            .collect()
    }
}
