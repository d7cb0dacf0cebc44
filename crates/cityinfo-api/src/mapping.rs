//! # Representation Mapping
//!
//! Declarative field correspondences between internal entities and the
//! representations exchanged with clients. Mappings are registered once,
//! validated when the [`Mapper`] is built, and then applied through typed
//! [`Projection`] handles resolved at start-up.
//!
//! Values pass through their serde form: the source is serialized to a JSON
//! object, each [`FieldRule`] writes one target field, and the target type
//! is deserialized from the result. A target field with no rule does not
//! exist in the output, so a restricted representation can never leak a
//! field its mapping does not name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Whether a shape is internal or crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Persistence entity.
    Entity,
    /// Client-facing representation.
    Representation,
}

/// A field of a shape's serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Serialized field name.
    pub name: &'static str,
    /// Whether a mapping into this shape must write the field.
    pub required: bool,
}

impl FieldSpec {
    /// A field every mapping into the shape must write.
    pub const fn required(name: &'static str) -> Self {
        Self { name, required: true }
    }

    /// A field that may be left to its default.
    pub const fn optional(name: &'static str) -> Self {
        Self { name, required: false }
    }
}

/// Static description of a mappable type.
pub trait Shape {
    /// Shape name, unique within the mapper.
    const NAME: &'static str;
    /// Entity or representation.
    const KIND: ShapeKind;
    /// Fields of the serialized form.
    fn fields() -> &'static [FieldSpec];
}

/// Identifies a mapping by source and target shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappingKey {
    /// Source shape name.
    pub source: &'static str,
    /// Target shape name.
    pub target: &'static str,
}

impl MappingKey {
    /// Key for `S → T`.
    pub fn of<S: Shape, T: Shape>() -> Self {
        Self {
            source: S::NAME,
            target: T::NAME,
        }
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// How one target field is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// Copy `from` to `to` unchanged. A missing or null source leaves the
    /// target at its default.
    Copy {
        /// Source field.
        from: &'static str,
        /// Target field.
        to: &'static str,
    },
    /// Map a nested object, or every element of an array, through another
    /// registered mapping.
    Nested {
        /// Source field.
        from: &'static str,
        /// Target field.
        to: &'static str,
        /// Mapping applied to the nested values.
        via: MappingKey,
    },
    /// Write the element count of an array field.
    Count {
        /// Source array field.
        from: &'static str,
        /// Target field.
        to: &'static str,
    },
}

impl FieldRule {
    /// Same-named copy.
    pub const fn copy(name: &'static str) -> Self {
        Self::Copy { from: name, to: name }
    }

    /// Copy under a different name.
    pub const fn rename(from: &'static str, to: &'static str) -> Self {
        Self::Copy { from, to }
    }

    /// Nested mapping through `S → T`.
    pub fn nested<S: Shape, T: Shape>(from: &'static str, to: &'static str) -> Self {
        Self::Nested {
            from,
            to,
            via: MappingKey::of::<S, T>(),
        }
    }

    /// Array length.
    pub const fn count(from: &'static str, to: &'static str) -> Self {
        Self::Count { from, to }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Copy { from, .. } | Self::Nested { from, .. } | Self::Count { from, .. } => from,
        }
    }

    fn target(&self) -> &'static str {
        match self {
            Self::Copy { to, .. } | Self::Nested { to, .. } | Self::Count { to, .. } => to,
        }
    }
}

/// Mapping registration, validation and application errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The same source/target pair was registered twice.
    #[error("mapping {0} registered twice")]
    Duplicate(MappingKey),

    /// A representation has mappings from more than one entity.
    #[error("representation {target} is mapped from both {first} and {second}")]
    AmbiguousRepresentation {
        /// Representation shape.
        target: &'static str,
        /// One source.
        first: &'static str,
        /// Another source.
        second: &'static str,
    },

    /// A rule reads a field the source shape lacks.
    #[error("mapping {key}: source has no field '{field}'")]
    UnknownSourceField {
        /// Mapping.
        key: MappingKey,
        /// Field name.
        field: &'static str,
    },

    /// A rule writes a field the target shape lacks.
    #[error("mapping {key}: target has no field '{field}'")]
    UnknownTargetField {
        /// Mapping.
        key: MappingKey,
        /// Field name.
        field: &'static str,
    },

    /// Two rules write the same target field.
    #[error("mapping {key}: target field '{field}' written twice")]
    ConflictingRules {
        /// Mapping.
        key: MappingKey,
        /// Field name.
        field: &'static str,
    },

    /// A required target field has no rule.
    #[error("mapping {key}: no correspondence for required field '{field}'")]
    MissingCorrespondence {
        /// Mapping.
        key: MappingKey,
        /// Field name.
        field: &'static str,
    },

    /// A nested rule refers to an unregistered mapping.
    #[error("mapping {key}: nested mapping {via} is not registered")]
    UnregisteredNested {
        /// Mapping.
        key: MappingKey,
        /// Referenced mapping.
        via: MappingKey,
    },

    /// A projection was requested for an unregistered pair.
    #[error("no mapping registered for {0}")]
    Unregistered(MappingKey),

    /// Source could not be serialized, or target could not be built.
    #[error("mapping {key} failed: {reason}")]
    Conversion {
        /// Mapping.
        key: MappingKey,
        /// Serde message.
        reason: String,
    },
}

#[derive(Debug, Clone)]
struct MappingDef {
    source_kind: ShapeKind,
    target_kind: ShapeKind,
    source_fields: &'static [FieldSpec],
    target_fields: &'static [FieldSpec],
    rules: Vec<FieldRule>,
}

/// Collects mappings; [`build`](Self::build) validates them.
#[derive(Debug, Default)]
pub struct MapperBuilder {
    mappings: BTreeMap<MappingKey, MappingDef>,
    duplicates: Vec<MappingKey>,
}

impl MapperBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `S → T` with the given rules.
    pub fn map<S: Shape, T: Shape>(mut self, rules: Vec<FieldRule>) -> Self {
        let key = MappingKey::of::<S, T>();
        let def = MappingDef {
            source_kind: S::KIND,
            target_kind: T::KIND,
            source_fields: S::fields(),
            target_fields: T::fields(),
            rules,
        };
        if self.mappings.insert(key, def).is_some() {
            self.duplicates.push(key);
        }
        self
    }

    /// Validate every mapping and freeze the set.
    pub fn build(self) -> Result<Mapper, MappingError> {
        if let Some(key) = self.duplicates.first() {
            return Err(MappingError::Duplicate(*key));
        }

        let mut representation_sources: BTreeMap<&'static str, &'static str> = BTreeMap::new();
        for (key, def) in &self.mappings {
            if def.target_kind == ShapeKind::Representation && def.source_kind == ShapeKind::Entity {
                if let Some(first) = representation_sources.insert(key.target, key.source) {
                    return Err(MappingError::AmbiguousRepresentation {
                        target: key.target,
                        first,
                        second: key.source,
                    });
                }
            }

            let has = |fields: &[FieldSpec], name: &str| fields.iter().any(|f| f.name == name);
            let mut written = BTreeSet::new();
            for rule in &def.rules {
                if !has(def.source_fields, rule.source()) {
                    return Err(MappingError::UnknownSourceField {
                        key: *key,
                        field: rule.source(),
                    });
                }
                if !has(def.target_fields, rule.target()) {
                    return Err(MappingError::UnknownTargetField {
                        key: *key,
                        field: rule.target(),
                    });
                }
                if !written.insert(rule.target()) {
                    return Err(MappingError::ConflictingRules {
                        key: *key,
                        field: rule.target(),
                    });
                }
                if let FieldRule::Nested { via, .. } = rule {
                    if !self.mappings.contains_key(via) {
                        return Err(MappingError::UnregisteredNested { key: *key, via: *via });
                    }
                }
            }
            if let Some(missing) = def
                .target_fields
                .iter()
                .find(|f| f.required && !written.contains(f.name))
            {
                return Err(MappingError::MissingCorrespondence {
                    key: *key,
                    field: missing.name,
                });
            }
        }

        Ok(Mapper {
            mappings: Arc::new(self.mappings),
        })
    }
}

/// A validated, immutable set of mappings.
#[derive(Debug, Clone)]
pub struct Mapper {
    mappings: Arc<BTreeMap<MappingKey, MappingDef>>,
}

impl Mapper {
    /// Registered pairs.
    pub fn keys(&self) -> impl Iterator<Item = &MappingKey> {
        self.mappings.keys()
    }

    /// Typed handle for `S → T`. Resolve these at start-up.
    pub fn projection<S: Shape, T: Shape>(&self) -> Result<Projection<S, T>, MappingError> {
        let key = MappingKey::of::<S, T>();
        if !self.mappings.contains_key(&key) {
            return Err(MappingError::Unregistered(key));
        }
        Ok(Projection {
            mapper: self.clone(),
            key,
            _types: PhantomData,
        })
    }

    fn apply(&self, key: MappingKey, source: &Value) -> Result<Value, MappingError> {
        let def = self
            .mappings
            .get(&key)
            .ok_or(MappingError::Unregistered(key))?;
        let Value::Object(source) = source else {
            return Err(MappingError::Conversion {
                key,
                reason: "source is not an object".to_string(),
            });
        };
        let mut target = Map::new();
        for rule in &def.rules {
            match rule {
                FieldRule::Copy { from, to } => {
                    if let Some(value) = source.get(*from).filter(|v| !v.is_null()) {
                        target.insert((*to).to_string(), value.clone());
                    }
                }
                FieldRule::Nested { from, to, via } => match source.get(*from) {
                    Some(Value::Array(items)) => {
                        let mapped = items
                            .iter()
                            .map(|item| self.apply(*via, item))
                            .collect::<Result<Vec<_>, _>>()?;
                        target.insert((*to).to_string(), Value::Array(mapped));
                    }
                    Some(object @ Value::Object(_)) => {
                        target.insert((*to).to_string(), self.apply(*via, object)?);
                    }
                    _ => {}
                },
                FieldRule::Count { from, to } => {
                    let count = source.get(*from).and_then(Value::as_array).map_or(0, Vec::len);
                    target.insert((*to).to_string(), Value::from(count));
                }
            }
        }
        Ok(Value::Object(target))
    }
}

/// Typed application of one registered mapping.
pub struct Projection<S, T> {
    mapper: Mapper,
    key: MappingKey,
    _types: PhantomData<fn(&S) -> T>,
}

impl<S, T> Clone for Projection<S, T> {
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper.clone(),
            key: self.key,
            _types: PhantomData,
        }
    }
}

impl<S, T> fmt::Debug for Projection<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection").field("key", &self.key).finish()
    }
}

impl<S, T> Projection<S, T>
where
    S: Shape + Serialize,
    T: Shape + DeserializeOwned,
{
    /// Map one value.
    pub fn map(&self, source: &S) -> Result<T, MappingError> {
        let conversion = |e: serde_json::Error| MappingError::Conversion {
            key: self.key,
            reason: e.to_string(),
        };
        let value = serde_json::to_value(source).map_err(conversion)?;
        let mapped = self.mapper.apply(self.key, &value)?;
        serde_json::from_value(mapped).map_err(conversion)
    }

    /// Map every value, preserving order.
    pub fn map_all(&self, sources: &[S]) -> Result<Vec<T>, MappingError> {
        sources.iter().map(|s| self.map(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Owner {
        id: i32,
        label: String,
        secret: String,
        pets: Vec<Pet>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Pet {
        name: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct OwnerDto {
        id: i32,
        display_name: String,
        #[serde(default)]
        pet_count: usize,
        #[serde(default)]
        pets: Vec<PetDto>,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct PetDto {
        name: String,
    }

    impl Shape for Owner {
        const NAME: &'static str = "Owner";
        const KIND: ShapeKind = ShapeKind::Entity;
        fn fields() -> &'static [FieldSpec] {
            const FIELDS: &[FieldSpec] = &[
                FieldSpec::required("id"),
                FieldSpec::required("label"),
                FieldSpec::required("secret"),
                FieldSpec::optional("pets"),
            ];
            FIELDS
        }
    }

    impl Shape for Pet {
        const NAME: &'static str = "Pet";
        const KIND: ShapeKind = ShapeKind::Entity;
        fn fields() -> &'static [FieldSpec] {
            const FIELDS: &[FieldSpec] = &[FieldSpec::required("name")];
            FIELDS
        }
    }

    impl Shape for OwnerDto {
        const NAME: &'static str = "OwnerDto";
        const KIND: ShapeKind = ShapeKind::Representation;
        fn fields() -> &'static [FieldSpec] {
            const FIELDS: &[FieldSpec] = &[
                FieldSpec::required("id"),
                FieldSpec::required("displayName"),
                FieldSpec::optional("petCount"),
                FieldSpec::optional("pets"),
            ];
            FIELDS
        }
    }

    impl Shape for PetDto {
        const NAME: &'static str = "PetDto";
        const KIND: ShapeKind = ShapeKind::Representation;
        fn fields() -> &'static [FieldSpec] {
            const FIELDS: &[FieldSpec] = &[FieldSpec::required("name")];
            FIELDS
        }
    }

    fn builder() -> MapperBuilder {
        MapperBuilder::new()
            .map::<Pet, PetDto>(vec![FieldRule::copy("name")])
            .map::<Owner, OwnerDto>(vec![
                FieldRule::copy("id"),
                FieldRule::rename("label", "displayName"),
                FieldRule::count("pets", "petCount"),
                FieldRule::nested::<Pet, PetDto>("pets", "pets"),
            ])
    }

    fn owner() -> Owner {
        Owner {
            id: 7,
            label: "Ada".into(),
            secret: "hunter2".into(),
            pets: vec![Pet { name: "Rex".into() }, Pet { name: "Tom".into() }],
        }
    }

    #[test]
    fn applies_copy_rename_count_and_nested_rules() {
        let mapper = builder().build().unwrap();
        let dto = mapper.projection::<Owner, OwnerDto>().unwrap().map(&owner()).unwrap();
        assert_eq!(
            dto,
            OwnerDto {
                id: 7,
                display_name: "Ada".into(),
                pet_count: 2,
                pets: vec![PetDto { name: "Rex".into() }, PetDto { name: "Tom".into() }],
            }
        );
    }

    #[test]
    fn unmapped_source_fields_do_not_leak() {
        let mapper = builder().build().unwrap();
        let dto = mapper.projection::<Owner, OwnerDto>().unwrap().map(&owner()).unwrap();
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let err = builder()
            .map::<Pet, PetDto>(vec![FieldRule::copy("name")])
            .build()
            .unwrap_err();
        assert_eq!(err, MappingError::Duplicate(MappingKey::of::<Pet, PetDto>()));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = MapperBuilder::new()
            .map::<Owner, OwnerDto>(vec![FieldRule::copy("id")])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingCorrespondence { field: "displayName", .. }
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = MapperBuilder::new()
            .map::<Pet, PetDto>(vec![FieldRule::rename("nickname", "name")])
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownSourceField { field: "nickname", .. }));

        let err = MapperBuilder::new()
            .map::<Pet, PetDto>(vec![FieldRule::copy("name"), FieldRule::rename("name", "age")])
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownTargetField { field: "age", .. }));
    }

    #[test]
    fn conflicting_rules_are_rejected() {
        let err = MapperBuilder::new()
            .map::<Pet, PetDto>(vec![FieldRule::copy("name"), FieldRule::copy("name")])
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::ConflictingRules { field: "name", .. }));
    }

    #[test]
    fn nested_mapping_must_exist() {
        let err = MapperBuilder::new()
            .map::<Owner, OwnerDto>(vec![
                FieldRule::copy("id"),
                FieldRule::rename("label", "displayName"),
                FieldRule::nested::<Pet, PetDto>("pets", "pets"),
            ])
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::UnregisteredNested { .. }));
    }

    #[test]
    fn unregistered_projection_is_an_error() {
        let mapper = MapperBuilder::new().build().unwrap();
        assert!(matches!(
            mapper.projection::<Pet, PetDto>().unwrap_err(),
            MappingError::Unregistered(_)
        ));
    }
}
