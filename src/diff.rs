//! Reconciling the declared model against a reflected schema.
//!
//! Every object considered here passes through the inclusion filter first,
//! so dialect-specific reflection artifacts (enum-as-text columns,
//! functional/case-insensitive index flavors) never show up as edits.

use crate::dialect::Dialect;
use crate::filter::should_include;
use crate::planner::SchemaEdit;
use crate::schema::{ReflectedSchema, SchemaModel};

/// Compute the edits that would bring `reflected` in line with `model`.
///
/// Edits are ordered additions-first: table creates, column changes, index
/// changes, then drops (indexes, columns, tables). Bookkeeping tables
/// should be excluded from `reflected` by the caller; reflection helpers
/// accept a skip list for that purpose.
pub fn diff(model: &SchemaModel, reflected: &ReflectedSchema, dialect: Dialect) -> Vec<SchemaEdit> {
    let mut edits = Vec::new();

    // Declared tables with no live counterpart.
    for table in &model.tables {
        if reflected.table(&table.name).is_none() {
            if !should_include(&table.as_object(), false, None, dialect) {
                continue;
            }
            edits.push(SchemaEdit::CreateTable(table.clone()));
            for index in &table.indexes {
                if should_include(&index.as_object(), false, None, dialect) {
                    edits.push(SchemaEdit::CreateIndex(index.clone()));
                }
            }
        }
    }

    // Column changes on tables present on both sides.
    for table in &model.tables {
        let Some(live) = reflected.table(&table.name) else {
            continue;
        };
        for column in &table.columns {
            match live.column(&column.name) {
                None => {
                    if should_include(&column.as_object(), false, None, dialect) {
                        edits.push(SchemaEdit::AddColumn {
                            table: table.name.clone(),
                            column: column.clone(),
                        });
                    }
                }
                Some(live_column) => {
                    if column.ty.kind() != live_column.type_kind
                        && should_include(
                            &column.as_object(),
                            false,
                            Some(&live_column.as_object()),
                            dialect,
                        )
                    {
                        edits.push(SchemaEdit::AlterColumn {
                            table: table.name.clone(),
                            column: column.clone(),
                        });
                    }
                }
            }
        }
    }

    // Index changes on tables present on both sides.
    for table in &model.tables {
        let Some(live) = reflected.table(&table.name) else {
            continue;
        };
        for index in &table.indexes {
            match live.index(&index.name) {
                None => {
                    if should_include(&index.as_object(), false, None, dialect) {
                        edits.push(SchemaEdit::CreateIndex(index.clone()));
                    }
                }
                Some(live_index) => {
                    let definition_matches =
                        index.columns == live_index.columns && index.unique == live_index.unique;
                    if !definition_matches
                        && should_include(
                            &index.as_object(),
                            false,
                            Some(&live_index.as_object()),
                            dialect,
                        )
                    {
                        edits.push(SchemaEdit::DropIndex {
                            table: table.name.clone(),
                            name: index.name.clone(),
                        });
                        edits.push(SchemaEdit::CreateIndex(index.clone()));
                    }
                }
            }
        }
        // Live indexes with no declared counterpart.
        for live_index in &live.indexes {
            if table.indexes.iter().all(|i| i.name != live_index.name)
                && should_include(&live_index.as_object(), true, None, dialect)
            {
                edits.push(SchemaEdit::DropIndex {
                    table: table.name.clone(),
                    name: live_index.name.clone(),
                });
            }
        }
    }

    // Live columns with no declared counterpart.
    for table in &model.tables {
        let Some(live) = reflected.table(&table.name) else {
            continue;
        };
        for live_column in &live.columns {
            if table.column(&live_column.name).is_none()
                && should_include(&live_column.as_object(), true, None, dialect)
            {
                edits.push(SchemaEdit::DropColumn {
                    table: table.name.clone(),
                    column: live_column.name.clone(),
                });
            }
        }
    }

    // Live tables with no declared counterpart.
    for live in &reflected.tables {
        if model.table(&live.name).is_none()
            && should_include(&live.as_object(), true, None, dialect)
        {
            edits.push(SchemaEdit::DropTable {
                table: live.name.clone(),
            });
        }
    }

    edits
}
