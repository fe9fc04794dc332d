//! Planning of schema edits into dialect-specific DDL.
//!
//! Capable dialects get one native `ALTER`/`CREATE`/`DROP` statement per
//! edit. SQLite has almost no `ALTER TABLE` support, so structural changes
//! are planned as a copy-transform-swap instead: create a replacement table
//! with the target structure, copy the rows across (transforming columns as
//! the edits require), drop the original, and rename the replacement into
//! place. Multiple edits against the same table are coalesced into a single
//! rebuild.

use std::collections::BTreeSet;

use crate::dialect::Dialect;
use crate::error::Error;
use crate::schema::{ColumnDef, ColumnType, IndexDef, SchemaModel, TableDef};

/// Prefix for the temporary replacement table used during a batch rewrite.
pub const BATCH_TMP_PREFIX: &str = "_schemashift_tmp_";

/// A single declarative schema change, as produced by a migration script's
/// `upgrade()`/`downgrade()` or by the schema diff.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaEdit {
    CreateTable(TableDef),
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        column: String,
    },
    /// Replace a column's definition (same name, new type/constraints).
    AlterColumn {
        table: String,
        column: ColumnDef,
    },
    CreateIndex(IndexDef),
    DropIndex {
        table: String,
        name: String,
    },
}

impl SchemaEdit {
    /// The table this edit touches.
    pub fn target_table(&self) -> &str {
        match self {
            SchemaEdit::CreateTable(def) => &def.name,
            SchemaEdit::DropTable { table }
            | SchemaEdit::AddColumn { table, .. }
            | SchemaEdit::DropColumn { table, .. }
            | SchemaEdit::AlterColumn { table, .. }
            | SchemaEdit::DropIndex { table, .. } => table,
            SchemaEdit::CreateIndex(def) => &def.table,
        }
    }

    /// Whether this edit exceeds SQLite's native `ALTER TABLE` support.
    fn forces_rebuild(&self) -> bool {
        matches!(
            self,
            SchemaEdit::DropColumn { .. } | SchemaEdit::AlterColumn { .. }
        )
    }
}

/// The statements a migration will run, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    pub statements: Vec<String>,
    /// True when the plan contains a copy-transform-swap rebuild and must
    /// therefore run inside the foreign-key-disabled scope.
    pub uses_batch: bool,
}

/// Translates [SchemaEdit]s into DDL for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    dialect: Dialect,
}

impl Planner {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Plan a migration's edits. `model` supplies the target structure of
    /// any table that needs a rebuild.
    pub fn plan(&self, model: &SchemaModel, edits: &[SchemaEdit]) -> Result<MigrationPlan, Error> {
        if self.dialect.supports_native_alter() {
            let mut statements = Vec::new();
            for edit in edits {
                statements.extend(self.direct_sql(edit)?);
            }
            return Ok(MigrationPlan {
                statements,
                uses_batch: false,
            });
        }

        // Tables whose edits exceed SQLite's ALTER support get rebuilt.
        // Every edit touching such a table folds into one rebuild.
        let rebuild: BTreeSet<&str> = edits
            .iter()
            .filter(|e| e.forces_rebuild())
            .map(|e| e.target_table())
            .collect();

        for edit in edits {
            if let SchemaEdit::CreateTable(def) = edit {
                if rebuild.contains(def.name.as_str()) {
                    return Err(Error::SchemaConflict(format!(
                        "table '{}' is both created and structurally altered in one migration",
                        def.name
                    )));
                }
            }
        }

        let mut statements = Vec::new();
        let mut rebuilt: BTreeSet<&str> = BTreeSet::new();
        for edit in edits {
            let table = edit.target_table();
            if rebuild.contains(table) {
                if rebuilt.insert(table) {
                    statements.extend(self.batch_rewrite(model, table, edits)?);
                }
                // Subsequent edits for this table are already part of the
                // rebuild.
            } else {
                statements.extend(self.direct_sql(edit)?);
            }
        }

        Ok(MigrationPlan {
            statements,
            uses_batch: !rebuild.is_empty(),
        })
    }

    /// Plan the create-copy-drop-rename sequence for one table, folding in
    /// every edit that touches it.
    ///
    /// The rebuilt structure starts from the model's definition and then
    /// applies this migration's own edits on top, so the rebuild stays
    /// correct when the model has moved past this migration, e.g. a downgrade
    /// dropping a column the model still declares.
    fn batch_rewrite(
        &self,
        model: &SchemaModel,
        table: &str,
        edits: &[SchemaEdit],
    ) -> Result<Vec<String>, Error> {
        let mut target = model.table(table).cloned().ok_or_else(|| {
            Error::SchemaConflict(format!(
                "table '{}' requires a rebuild but is not present in the target schema model",
                table
            ))
        })?;

        let mut added: BTreeSet<String> = BTreeSet::new();
        let mut altered: BTreeSet<String> = BTreeSet::new();
        for edit in edits {
            match edit {
                SchemaEdit::AddColumn { table: t, column } if t == table => {
                    upsert_column(&mut target, column);
                    added.insert(column.name.clone());
                }
                SchemaEdit::AlterColumn { table: t, column } if t == table => {
                    upsert_column(&mut target, column);
                    altered.insert(column.name.clone());
                }
                SchemaEdit::DropColumn { table: t, column } if t == table => {
                    target.columns.retain(|c| c.name != *column);
                    target.indexes.retain(|i| !i.columns.contains(column));
                    target.uniques.retain(|u| !u.columns.contains(column));
                    target.foreign_keys.retain(|f| !f.columns.contains(column));
                }
                SchemaEdit::CreateIndex(def) if def.table == table => {
                    target.indexes.retain(|i| i.name != def.name);
                    target.indexes.push(def.clone());
                }
                SchemaEdit::DropIndex { table: t, name } if t == table => {
                    target.indexes.retain(|i| i.name != *name);
                }
                _ => {}
            }
        }

        let tmp_name = format!("{}{}", BATCH_TMP_PREFIX, table);
        let mut tmp_def = target.clone();
        tmp_def.name = tmp_name.clone();

        let mut statements = vec![self.create_table_sql(&tmp_def)];

        let mut insert_columns = Vec::with_capacity(target.columns.len());
        let mut select_exprs = Vec::with_capacity(target.columns.len());
        for column in &target.columns {
            insert_columns.push(self.quote(&column.name));
            if added.contains(column.name.as_str()) {
                // New column: backfill from the default, or NULL.
                select_exprs.push(column.default.clone().unwrap_or_else(|| "NULL".to_string()));
            } else if altered.contains(column.name.as_str()) {
                select_exprs.push(format!(
                    "CAST({} AS {})",
                    self.quote(&column.name),
                    self.type_sql(&column.ty)
                ));
            } else {
                select_exprs.push(self.quote(&column.name));
            }
        }
        statements.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            self.quote(&tmp_name),
            insert_columns.join(", "),
            select_exprs.join(", "),
            self.quote(table)
        ));

        statements.push(format!("DROP TABLE {}", self.quote(table)));
        statements.push(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote(&tmp_name),
            self.quote(table)
        ));

        // The drop took the table's indexes with it; recreate the target's.
        for index in &target.indexes {
            if let Some(ddl_if) = &index.ddl_if {
                if !ddl_if.matches(self.dialect) {
                    continue;
                }
            }
            statements.push(self.create_index_sql(index));
        }

        Ok(statements)
    }

    fn direct_sql(&self, edit: &SchemaEdit) -> Result<Vec<String>, Error> {
        Ok(match edit {
            SchemaEdit::CreateTable(def) => vec![self.create_table_sql(def)],
            SchemaEdit::DropTable { table } => {
                vec![format!("DROP TABLE {}", self.quote(table))]
            }
            SchemaEdit::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote(table),
                self.column_sql(column)
            )],
            SchemaEdit::DropColumn { table, column } => match self.dialect {
                Dialect::Sqlite => {
                    return Err(Error::SchemaConflict(format!(
                        "dropping column '{}.{}' requires a batch rewrite on sqlite",
                        table, column
                    )))
                }
                _ => vec![format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    self.quote(table),
                    self.quote(column)
                )],
            },
            SchemaEdit::AlterColumn { table, column } => match self.dialect {
                Dialect::Sqlite => {
                    return Err(Error::SchemaConflict(format!(
                        "altering column '{}.{}' requires a batch rewrite on sqlite",
                        table, column.name
                    )))
                }
                Dialect::Postgresql => vec![format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                    self.quote(table),
                    self.quote(&column.name),
                    self.type_sql(&column.ty)
                )],
                Dialect::Mysql => vec![format!(
                    "ALTER TABLE {} MODIFY COLUMN {}",
                    self.quote(table),
                    self.column_sql(column)
                )],
            },
            SchemaEdit::CreateIndex(index) => {
                if let Some(ddl_if) = &index.ddl_if {
                    if !ddl_if.matches(self.dialect) {
                        return Ok(vec![]);
                    }
                }
                vec![self.create_index_sql(index)]
            }
            SchemaEdit::DropIndex { table, name } => match self.dialect {
                Dialect::Mysql => vec![format!(
                    "DROP INDEX {} ON {}",
                    self.quote(name),
                    self.quote(table)
                )],
                _ => vec![format!("DROP INDEX {}", self.quote(name))],
            },
        })
    }

    pub fn create_table_sql(&self, def: &TableDef) -> String {
        let mut items: Vec<String> = def.columns.iter().map(|c| self.column_sql(c)).collect();

        let pk_columns: Vec<String> = def
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| self.quote(&c.name))
            .collect();
        if !pk_columns.is_empty() {
            items.push(format!("PRIMARY KEY ({})", pk_columns.join(", ")));
        }

        for unique in &def.uniques {
            let columns: Vec<String> = unique.columns.iter().map(|c| self.quote(c)).collect();
            let clause = format!("UNIQUE ({})", columns.join(", "));
            items.push(match &unique.name {
                Some(name) => format!("CONSTRAINT {} {}", self.quote(name), clause),
                None => clause,
            });
        }

        for fk in &def.foreign_keys {
            let columns: Vec<String> = fk.columns.iter().map(|c| self.quote(c)).collect();
            let ref_columns: Vec<String> = fk.ref_columns.iter().map(|c| self.quote(c)).collect();
            let clause = format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                columns.join(", "),
                self.quote(&fk.ref_table),
                ref_columns.join(", ")
            );
            items.push(match &fk.name {
                Some(name) => format!("CONSTRAINT {} {}", self.quote(name), clause),
                None => clause,
            });
        }

        format!("CREATE TABLE {} ({})", self.quote(&def.name), items.join(", "))
    }

    pub fn create_index_sql(&self, index: &IndexDef) -> String {
        let columns: Vec<String> = index.columns.iter().map(|c| self.quote(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote(&index.name),
            self.quote(&index.table),
            columns.join(", ")
        )
    }

    fn column_sql(&self, column: &ColumnDef) -> String {
        let mut sql = format!("{} {}", self.quote(&column.name), self.type_sql(&column.ty));
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        // Engines without a native enum type get a CHECK constraint over
        // the variant set instead.
        if let ColumnType::Enum { variants, .. } = &column.ty {
            if self.dialect != Dialect::Mysql {
                let literals: Vec<String> = variants.iter().map(|v| sql_string(v)).collect();
                sql.push_str(&format!(
                    " CHECK ({} IN ({}))",
                    self.quote(&column.name),
                    literals.join(", ")
                ));
            }
        }
        sql
    }

    fn type_sql(&self, ty: &ColumnType) -> String {
        match (ty, self.dialect) {
            (ColumnType::Integer, _) => "INTEGER".to_string(),
            (ColumnType::Real, Dialect::Sqlite) => "REAL".to_string(),
            (ColumnType::Real, Dialect::Postgresql) => "DOUBLE PRECISION".to_string(),
            (ColumnType::Real, Dialect::Mysql) => "DOUBLE".to_string(),
            (ColumnType::Text, _) => "TEXT".to_string(),
            (ColumnType::Blob, Dialect::Postgresql) => "BYTEA".to_string(),
            (ColumnType::Blob, _) => "BLOB".to_string(),
            (ColumnType::Boolean, _) => "BOOLEAN".to_string(),
            (ColumnType::Timestamp, _) => "TIMESTAMP".to_string(),
            (ColumnType::Enum { variants, .. }, Dialect::Mysql) => {
                let literals: Vec<String> = variants.iter().map(|v| sql_string(v)).collect();
                format!("ENUM({})", literals.join(", "))
            }
            (ColumnType::Enum { .. }, _) => "TEXT".to_string(),
        }
    }

    fn quote(&self, name: &str) -> String {
        match self.dialect {
            Dialect::Mysql => format!("`{}`", name),
            _ => format!("\"{}\"", name),
        }
    }
}

fn upsert_column(table: &mut TableDef, column: &ColumnDef) {
    match table.columns.iter_mut().find(|c| c.name == column.name) {
        Some(existing) => *existing = column.clone(),
        None => table.columns.push(column.clone()),
    }
}

/// Render a string as a single-quoted SQL literal.
pub(crate) fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
