//! Per-kind descriptors for the six entity store collections
//!
//! The reconciliation algorithm is shared; kinds differ only in the data
//! captured by [`KindDescriptor`].

use std::fmt;

/// Entity kinds of the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Thing,
    Location,
    Sensor,
    ObservedProperty,
    Datastream,
    Observation,
}

/// How a natural key value is written into a filter expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralType {
    /// Quoted string literal (numbers and booleans stay bare)
    Text,
    /// Bare ISO-8601 instant
    DateTime,
}

/// One natural key field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyField {
    pub name: &'static str,
    pub literal: LiteralType,
}

const fn text(name: &'static str) -> KeyField {
    KeyField {
        name,
        literal: LiteralType::Text,
    }
}

const fn datetime(name: &'static str) -> KeyField {
    KeyField {
        name,
        literal: LiteralType::DateTime,
    }
}

/// Where a kind's collection lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentScope {
    /// Collection at the store root, e.g. `/Sensors`
    TopLevel,
    /// Collection below a parent entity, e.g. `/Things(1)/Locations`
    Nested(EntityKind),
}

/// Everything the reconciler needs to know about a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    /// Collection segment name
    pub collection: &'static str,

    /// Fields whose equality identifies an existing remote record
    pub natural_key: &'static [KeyField],

    /// Fields compared to decide between reuse and update
    pub canonical_fields: &'static [&'static str],

    pub parent: ParentScope,

    /// Whether a mismatching record is patched in place; if not, a new
    /// record is created instead
    pub update_allowed: bool,
}

const NAME_AND_DESCRIPTION: &[KeyField] = &[text("name"), text("description")];
const PHENOMENON_TIME: &[KeyField] = &[datetime("phenomenonTime")];

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Thing,
        EntityKind::Location,
        EntityKind::Sensor,
        EntityKind::ObservedProperty,
        EntityKind::Datastream,
        EntityKind::Observation,
    ];

    pub const fn descriptor(self) -> KindDescriptor {
        match self {
            EntityKind::Thing => KindDescriptor {
                collection: "Things",
                natural_key: NAME_AND_DESCRIPTION,
                canonical_fields: &["name", "description", "properties"],
                parent: ParentScope::TopLevel,
                update_allowed: true,
            },
            // Some servers cannot merge GeoJSON geometry in a PATCH
            EntityKind::Location => KindDescriptor {
                collection: "Locations",
                natural_key: NAME_AND_DESCRIPTION,
                canonical_fields: &["name", "description", "encodingType", "location"],
                parent: ParentScope::Nested(EntityKind::Thing),
                update_allowed: false,
            },
            EntityKind::Sensor => KindDescriptor {
                collection: "Sensors",
                natural_key: NAME_AND_DESCRIPTION,
                canonical_fields: &["name", "description", "encodingType", "metadata"],
                parent: ParentScope::TopLevel,
                update_allowed: true,
            },
            EntityKind::ObservedProperty => KindDescriptor {
                collection: "ObservedProperties",
                natural_key: NAME_AND_DESCRIPTION,
                canonical_fields: &["name", "definition", "description"],
                parent: ParentScope::TopLevel,
                update_allowed: true,
            },
            EntityKind::Datastream => KindDescriptor {
                collection: "Datastreams",
                natural_key: NAME_AND_DESCRIPTION,
                canonical_fields: &[
                    "name",
                    "description",
                    "observationType",
                    "unitOfMeasurement",
                ],
                parent: ParentScope::Nested(EntityKind::Thing),
                update_allowed: true,
            },
            EntityKind::Observation => KindDescriptor {
                collection: "Observations",
                natural_key: PHENOMENON_TIME,
                canonical_fields: &["phenomenonTime", "result"],
                parent: ParentScope::Nested(EntityKind::Datastream),
                update_allowed: true,
            },
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Thing => "Thing",
            EntityKind::Location => "Location",
            EntityKind::Sensor => "Sensor",
            EntityKind::ObservedProperty => "ObservedProperty",
            EntityKind::Datastream => "Datastream",
            EntityKind::Observation => "Observation",
        };
        f.write_str(name)
    }
}
