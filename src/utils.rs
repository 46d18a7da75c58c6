//! # Naming Utilities
//!
//! Helper functions for deriving GraphQL names from table identities and for
//! validating that declared names are usable as GraphQL identifiers.
//!
//! Every generated name is derived from the *table* identity, never from the
//! field a caller mounts an operation under, so renamed fields keep pointing
//! at the same object types and stay fragment-compatible.

use stringcase::{camel_case, pascal_case};

/// Checks whether a string is a valid GraphQL identifier.
///
/// GraphQL names must start with a letter or underscore and contain only
/// letters, digits, and underscores.
pub fn is_valid_graphql_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// camelCase base used for operation field names (`Users` -> `users`).
pub fn field_base(table: &str) -> String {
    camel_case(table)
}

/// PascalCase base used for type names (`users` -> `Users`).
pub fn type_base(name: &str) -> String {
    pascal_case(name)
}

pub fn select_item_type_name(table: &str) -> String {
    format!("{}SelectItem", type_base(table))
}

pub fn item_type_name(table: &str) -> String {
    format!("{}Item", type_base(table))
}

/// Name of the wrapper object a relation field is typed with. Tied to the
/// owning relation, not the target table, so `__typename` stays stable no
/// matter how many relations point at the same table.
pub fn relation_type_name(owner: &str, relation: &str) -> String {
    format!("{}{}Relation", type_base(owner), type_base(relation))
}

pub fn filters_type_name(table: &str) -> String {
    format!("{}Filters", type_base(table))
}

pub fn order_by_type_name(table: &str) -> String {
    format!("{}OrderBy", type_base(table))
}

pub fn insert_input_type_name(table: &str) -> String {
    format!("{}InsertInput", type_base(table))
}

pub fn update_input_type_name(table: &str) -> String {
    format!("{}UpdateInput", type_base(table))
}

pub fn enum_type_name(table: &str, column: &str) -> String {
    format!("{}{}Enum", type_base(table), type_base(column))
}

// Default operation field names.

pub fn collection_field_name(table: &str) -> String {
    field_base(table)
}

pub fn single_field_name(table: &str) -> String {
    format!("{}Single", field_base(table))
}

pub fn insert_field_name(table: &str) -> String {
    format!("insertInto{}", type_base(table))
}

pub fn insert_single_field_name(table: &str) -> String {
    format!("insertInto{}Single", type_base(table))
}

pub fn update_field_name(table: &str) -> String {
    format!("update{}", type_base(table))
}

pub fn delete_field_name(table: &str) -> String {
    format!("deleteFrom{}", type_base(table))
}
