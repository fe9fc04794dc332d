//! Declared and reflected schema metadata.
//!
//! The declared side ([SchemaModel], [TableDef], [ColumnDef], [IndexDef]) is
//! an explicit, statically-built registry describing the desired end state of
//! the database. The reflected side ([ReflectedSchema] and friends) is what
//! inspection of a live database reports. Both sides can be viewed as
//! [SchemaObject]s, the closed union the inclusion filter dispatches on.

use crate::dialect::Dialect;

/// The kind of a schema object, as seen by the inclusion filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Column,
    Index,
    UniqueConstraint,
    ForeignKeyConstraint,
}

/// Storage-level classification of a column type. This is the "visit kind"
/// the inclusion filter compares: SQLite reflection reports an enum column
/// as text, and the filter uses that distinction to suppress spurious diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "testing", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Timestamp,
    Enum,
}

/// A declared column type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Timestamp,
    /// A named enumeration with a fixed set of string variants. Engines
    /// without a native enum type store this as constrained text.
    Enum {
        name: String,
        variants: Vec<String>,
    },
}

impl ColumnType {
    pub fn kind(&self) -> TypeKind {
        match self {
            ColumnType::Integer => TypeKind::Integer,
            ColumnType::Real => TypeKind::Real,
            ColumnType::Text => TypeKind::Text,
            ColumnType::Blob => TypeKind::Blob,
            ColumnType::Boolean => TypeKind::Boolean,
            ColumnType::Timestamp => TypeKind::Timestamp,
            ColumnType::Enum { .. } => TypeKind::Enum,
        }
    }
}

/// Classify a reflected SQL type declaration into a [TypeKind].
///
/// Follows SQLite's affinity rules closely enough for diffing: the reflected
/// side of an enum column always classifies as text, never as enum.
pub fn type_kind_from_sql(declared: &str) -> TypeKind {
    let upper = declared.to_uppercase();
    if upper.contains("INT") {
        TypeKind::Integer
    } else if upper.contains("BOOL") {
        TypeKind::Boolean
    } else if upper.contains("DATE") || upper.contains("TIME") {
        TypeKind::Timestamp
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        TypeKind::Text
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        TypeKind::Real
    } else if upper.is_empty() || upper.contains("BLOB") {
        TypeKind::Blob
    } else {
        TypeKind::Text
    }
}

/// A dialect constraint on a declared object: the object should only exist
/// under the named dialect(s). Absent means "all dialects".
#[derive(Debug, Clone, PartialEq)]
pub struct DdlIf {
    pub dialects: Vec<Dialect>,
}

impl DdlIf {
    /// Constrain to a single dialect.
    pub fn dialect(dialect: Dialect) -> Self {
        Self {
            dialects: vec![dialect],
        }
    }

    /// Constrain to a set of dialects.
    pub fn dialects(dialects: impl IntoIterator<Item = Dialect>) -> Self {
        Self {
            dialects: dialects.into_iter().collect(),
        }
    }

    pub fn matches(&self, dialect: Dialect) -> bool {
        self.dialects.contains(&dialect)
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Default value as a SQL literal, e.g. `'active'` or `0`.
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default value, given as a SQL literal.
    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    pub fn as_object(&self) -> SchemaObject {
        SchemaObject::Column {
            name: self.name.clone(),
            type_kind: self.ty.kind(),
        }
    }
}

/// A declared index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub ddl_if: Option<DdlIf>,
}

impl IndexDef {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            ddl_if: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Restrict this index to one or more dialects.
    pub fn ddl_if(mut self, ddl_if: DdlIf) -> Self {
        self.ddl_if = Some(ddl_if);
        self
    }

    pub fn as_object(&self) -> SchemaObject {
        SchemaObject::Index {
            name: self.name.clone(),
            ddl_if: self.ddl_if.clone(),
        }
    }
}

/// A declared foreign key constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

impl ForeignKeyDef {
    pub fn new(
        columns: impl IntoIterator<Item = impl Into<String>>,
        ref_table: impl Into<String>,
        ref_columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            ref_table: ref_table.into(),
            ref_columns: ref_columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A declared unique constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueDef {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

impl UniqueDef {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A declared table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub uniques: Vec<UniqueDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn with_unique(mut self, unique: UniqueDef) -> Self {
        self.uniques.push(unique);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn as_object(&self) -> SchemaObject {
        SchemaObject::Table {
            name: self.name.clone(),
        }
    }
}

/// The declarative target schema: an explicit registry of table definitions
/// built at startup, enumerable as the desired end state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaModel {
    pub tables: Vec<TableDef>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// A schema object as seen by the inclusion filter: a closed tagged union
/// over the object kinds that participate in diffing. Both declared and
/// reflected objects are viewed through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaObject {
    Table {
        name: String,
    },
    Column {
        name: String,
        type_kind: TypeKind,
    },
    Index {
        name: String,
        ddl_if: Option<DdlIf>,
    },
    UniqueConstraint {
        name: String,
    },
    ForeignKeyConstraint {
        name: String,
    },
}

impl SchemaObject {
    pub fn name(&self) -> &str {
        match self {
            SchemaObject::Table { name }
            | SchemaObject::Column { name, .. }
            | SchemaObject::Index { name, .. }
            | SchemaObject::UniqueConstraint { name }
            | SchemaObject::ForeignKeyConstraint { name } => name,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            SchemaObject::Table { .. } => ObjectKind::Table,
            SchemaObject::Column { .. } => ObjectKind::Column,
            SchemaObject::Index { .. } => ObjectKind::Index,
            SchemaObject::UniqueConstraint { .. } => ObjectKind::UniqueConstraint,
            SchemaObject::ForeignKeyConstraint { .. } => ObjectKind::ForeignKeyConstraint,
        }
    }

    pub(crate) fn type_kind(&self) -> Option<TypeKind> {
        match self {
            SchemaObject::Column { type_kind, .. } => Some(*type_kind),
            _ => None,
        }
    }

    pub(crate) fn ddl_if(&self) -> Option<&DdlIf> {
        match self {
            SchemaObject::Index { ddl_if, .. } => ddl_if.as_ref(),
            _ => None,
        }
    }
}

/// A column discovered by inspecting the live database.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "testing", derive(serde::Serialize, serde::Deserialize))]
pub struct ReflectedColumn {
    pub name: String,
    /// The type string as declared in the live schema, e.g. `VARCHAR(8)`.
    pub declared_type: String,
    pub type_kind: TypeKind,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ReflectedColumn {
    pub fn as_object(&self) -> SchemaObject {
        SchemaObject::Column {
            name: self.name.clone(),
            type_kind: self.type_kind,
        }
    }
}

/// An index discovered by inspecting the live database.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "testing", derive(serde::Serialize, serde::Deserialize))]
pub struct ReflectedIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl ReflectedIndex {
    pub fn as_object(&self) -> SchemaObject {
        SchemaObject::Index {
            name: self.name.clone(),
            ddl_if: None,
        }
    }
}

/// A table discovered by inspecting the live database.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "testing", derive(serde::Serialize, serde::Deserialize))]
pub struct ReflectedTable {
    pub name: String,
    pub columns: Vec<ReflectedColumn>,
    pub indexes: Vec<ReflectedIndex>,
}

impl ReflectedTable {
    pub fn column(&self, name: &str) -> Option<&ReflectedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&ReflectedIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn as_object(&self) -> SchemaObject {
        SchemaObject::Table {
            name: self.name.clone(),
        }
    }
}

/// The live database's schema as discovered by reflection.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "testing", derive(serde::Serialize, serde::Deserialize))]
pub struct ReflectedSchema {
    pub tables: Vec<ReflectedTable>,
}

impl ReflectedSchema {
    pub fn table(&self, name: &str) -> Option<&ReflectedTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}
