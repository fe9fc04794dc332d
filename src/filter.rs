//! The object inclusion filter.
//!
//! Decides, for each schema object encountered while diffing the declared
//! model against a reflected schema, whether the object participates in
//! migration generation. The filter exists to absorb dialect-specific
//! reflection artifacts that would otherwise show up as diff noise on every
//! run: functional indexes named by sort order, trigram/case-insensitive
//! index flavors that never reflect back cleanly, and enum columns on
//! engines that store enums as text.

use crate::dialect::Dialect;
use crate::schema::{ObjectKind, SchemaObject, TypeKind};

/// Whether `object` should be included in migration generation.
///
/// `reflected` is true when the object was produced by inspecting the live
/// database rather than by the declared model. `compare_to` is the
/// counterpart object on the other side of the diff, when one exists.
///
/// Rules are evaluated in order; the first matching rule wins:
///
/// 1. Unreflected indexes named `*asc`/`*desc` (sort-order naming for
///    functional indexes) are included only when no identically-named index
///    already exists on the live side.
/// 2. Unreflected indexes carrying a dialect constraint are included only
///    under a matching dialect.
/// 3. Reflected indexes named `gin*` or `*case_insensitive` are always
///    excluded; their reflected form never maps back to the declared model.
/// 4. On SQLite, a declared enum column with a reflected counterpart is
///    included only when the counterpart also reports as an enum. SQLite
///    has no enum type, so reflection reports text, which would otherwise
///    register as a type mismatch on every run.
/// 5. Everything else is included.
///
/// Deterministic and side-effect-free; invoked many times per diff pass.
pub fn should_include(
    object: &SchemaObject,
    reflected: bool,
    compare_to: Option<&SchemaObject>,
    dialect: Dialect,
) -> bool {
    if object.kind() == ObjectKind::Index {
        let name = object.name();
        if !reflected {
            if name.ends_with("asc") || name.ends_with("desc") {
                return match compare_to {
                    None => true,
                    Some(other) => object.name() != other.name(),
                };
            }
            if let Some(ddl_if) = object.ddl_if() {
                return ddl_if.matches(dialect);
            }
        } else if name.starts_with("gin") || name.ends_with("case_insensitive") {
            return false;
        }
    }

    if dialect == Dialect::Sqlite
        && object.kind() == ObjectKind::Column
        && object.type_kind() == Some(TypeKind::Enum)
    {
        if let Some(compare_to) = compare_to {
            return compare_to.type_kind() == Some(TypeKind::Enum);
        }
    }

    true
}
