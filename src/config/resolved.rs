//! Resolved entity descriptors: config validated and flattened for runtime
//! use, so field lookup is a map hit rather than reflection.

use std::collections::HashMap;

/// Storage kind of a column, driving bind casts and output shaping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    SmallInt,
    Int,
    BigInt,
    Float,
    /// Arbitrary precision; selected as text so the canonical string form
    /// survives the wire.
    Numeric,
    Text,
    Bool,
    Uuid,
    Date,
    DateTime,
    Json,
}

impl ColumnKind {
    /// SQL cast applied to bound parameters so string-transported values
    /// compare against the column's native type.
    pub fn bind_cast(self) -> Option<&'static str> {
        match self {
            ColumnKind::SmallInt | ColumnKind::Int | ColumnKind::BigInt => Some("bigint"),
            ColumnKind::Float => Some("float8"),
            ColumnKind::Numeric => Some("numeric"),
            ColumnKind::Bool => Some("boolean"),
            ColumnKind::Uuid => Some("uuid"),
            ColumnKind::Date => Some("date"),
            ColumnKind::DateTime => Some("timestamptz"),
            ColumnKind::Json => Some("jsonb"),
            ColumnKind::Text => None,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnKind::SmallInt | ColumnKind::Int | ColumnKind::BigInt
        )
    }
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub has_default: bool,
    pub is_pk: bool,
}

/// Per-table metadata built once at startup.
#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    pub id: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub pk_field: String,
    pub key_field: Option<String>,
    pub search_fields: Vec<String>,
    pub fields: Vec<FieldInfo>,
    field_index: HashMap<String, usize>,
}

impl EntityDescriptor {
    pub fn new(
        id: String,
        schema_name: String,
        table_name: String,
        path_segment: String,
        pk_field: String,
        key_field: Option<String>,
        search_fields: Vec<String>,
        fields: Vec<FieldInfo>,
    ) -> Self {
        let field_index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        EntityDescriptor {
            id,
            schema_name,
            table_name,
            path_segment,
            pk_field,
            key_field,
            search_fields,
            fields,
            field_index,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.field_index.get(name).map(|i| &self.fields[*i])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index.contains_key(name)
    }

    pub fn pk(&self) -> &FieldInfo {
        self.field(&self.pk_field)
            .expect("validated: primary key is a declared column")
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<EntityDescriptor>,
    by_path: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn new(entities: Vec<EntityDescriptor>) -> Self {
        let by_path = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path_segment.clone(), i))
            .collect();
        ResolvedModel { entities, by_path }
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&EntityDescriptor> {
        self.by_path.get(path).map(|i| &self.entities[*i])
    }
}
