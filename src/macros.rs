//! Convenience macros for defining migration scripts.

/// Define a migration script from a list of schema edits.
///
/// This macro reduces boilerplate for scripts whose upgrade (and optionally
/// downgrade) is a plain edit list with no computed logic.
///
/// # Basic Usage
///
/// ```
/// use schemashift::{schema_migration, ColumnDef, ColumnType, SchemaEdit, TableDef};
///
/// schema_migration!(CreateAccounts, "a1f0c3", parent: None, "create accounts",
///     up: [SchemaEdit::CreateTable(
///         TableDef::new("accounts")
///             .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
///     )],
///     down: [SchemaEdit::DropTable { table: "accounts".to_string() }]
/// );
///
/// schema_migration!(AddEmail, "b7d210", parent: Some("a1f0c3"), "add account email",
///     up: [SchemaEdit::AddColumn {
///         table: "accounts".to_string(),
///         column: ColumnDef::new("email", ColumnType::Text),
///     }]
/// );
///
/// use schemashift::MigrationScript;
/// assert_eq!(CreateAccounts.revision(), "a1f0c3");
/// assert_eq!(AddEmail.parent(), Some("a1f0c3"));
/// ```
///
/// Omitting the `down` clause leaves the default `downgrade()`, which
/// panics with a helpful message; implement the
/// [`MigrationScript`](crate::MigrationScript) trait directly when a
/// script needs computed edits.
#[macro_export]
macro_rules! schema_migration {
    ($name:ident, $revision:expr, parent: $parent:expr, $migration_name:expr,
        up: [$($up:expr),* $(,)?],
        down: [$($down:expr),* $(,)?] $(,)?
    ) => {
        pub struct $name;

        impl $crate::MigrationScript for $name {
            fn revision(&self) -> &str {
                $revision
            }
            fn parent(&self) -> Option<&str> {
                $parent
            }
            fn name(&self) -> String {
                $migration_name.to_string()
            }
            fn upgrade(&self) -> Vec<$crate::SchemaEdit> {
                vec![$($up),*]
            }
            fn downgrade(&self) -> Vec<$crate::SchemaEdit> {
                vec![$($down),*]
            }
        }
    };

    ($name:ident, $revision:expr, parent: $parent:expr, $migration_name:expr,
        up: [$($up:expr),* $(,)?] $(,)?
    ) => {
        pub struct $name;

        impl $crate::MigrationScript for $name {
            fn revision(&self) -> &str {
                $revision
            }
            fn parent(&self) -> Option<&str> {
                $parent
            }
            fn name(&self) -> String {
                $migration_name.to_string()
            }
            fn upgrade(&self) -> Vec<$crate::SchemaEdit> {
                vec![$($up),*]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::runner::MigrationScript;
    use crate::schema::{ColumnDef, ColumnType, TableDef};
    use crate::SchemaEdit;

    schema_migration!(CreateAccounts, "a1f0c3", parent: None, "create accounts",
        up: [SchemaEdit::CreateTable(
            TableDef::new("accounts")
                .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
        )],
        down: [SchemaEdit::DropTable { table: "accounts".to_string() }]
    );

    schema_migration!(AddEmail, "b7d210", parent: Some("a1f0c3"), "add account email",
        up: [SchemaEdit::AddColumn {
            table: "accounts".to_string(),
            column: ColumnDef::new("email", ColumnType::Text),
        }]
    );

    #[test]
    fn generates_chain_metadata() {
        assert_eq!(CreateAccounts.revision(), "a1f0c3");
        assert_eq!(CreateAccounts.parent(), None);
        assert_eq!(CreateAccounts.name(), "create accounts");
        assert_eq!(AddEmail.parent(), Some("a1f0c3"));
    }

    #[test]
    fn generates_edit_lists() {
        assert_eq!(CreateAccounts.upgrade().len(), 1);
        assert!(matches!(
            &CreateAccounts.downgrade()[0],
            SchemaEdit::DropTable { table } if table == "accounts"
        ));
        assert_eq!(AddEmail.upgrade().len(), 1);
    }

    #[test]
    #[should_panic(expected = "does not support downgrade")]
    fn missing_downgrade_panics() {
        AddEmail.downgrade();
    }
}
