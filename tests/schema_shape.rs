//! Structural properties of the generated schema, checked through
//! introspection: one `Item`/`SelectItem` pair per table, relation wrapper
//! types, scalar mapping with matching nullability, input flavors, and the
//! per-dialect capability surface.

mod common;

use std::sync::Arc;

use common::{MemoryExecutor, blog_schema};
use graph_tables::{
    ColumnDef, CompileOptions, Dialect, LogicalType, RelationalSchema, SchemaCompiler, TableDef,
};
use serde_json::Value as Json;

async fn introspect(schema: &async_graphql::dynamic::Schema, query: &str) -> Json {
    let response = schema.execute(query).await;
    assert!(
        response.errors.is_empty(),
        "unexpected errors: {:?}",
        response.errors
    );
    response.data.into_json().unwrap()
}

fn compile(dialect: Dialect) -> async_graphql::dynamic::Schema {
    let schema = blog_schema();
    let executor = Arc::new(MemoryExecutor::new(schema.clone()));
    SchemaCompiler::new(CompileOptions::new(dialect))
        .compile(schema, executor)
        .unwrap()
        .schema
}

fn field<'a>(data: &'a Json, name: &str) -> &'a Json {
    data.as_array()
        .unwrap()
        .iter()
        .find(|f| f["name"] == name)
        .unwrap_or_else(|| panic!("missing field `{name}`"))
}

const TYPE_FIELDS: &str = r#"
    fields {
        name
        type { kind name ofType { kind name ofType { kind name ofType { kind name } } } }
    }
"#;

#[tokio::test]
async fn select_item_mirrors_columns_with_nullability() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        &format!(r#"{{ __type(name: "UsersSelectItem") {{ {TYPE_FIELDS} }} }}"#),
    )
    .await;
    let fields = &data["__type"]["fields"];

    let id = field(fields, "id");
    assert_eq!(id["type"]["kind"], "NON_NULL");
    assert_eq!(id["type"]["ofType"]["name"], "Int");

    let name = field(fields, "name");
    assert_eq!(name["type"]["kind"], "NON_NULL");
    assert_eq!(name["type"]["ofType"]["name"], "String");

    // Nullable column stays nullable; enum columns use the minted enum.
    let role = field(fields, "role");
    assert_eq!(role["type"]["kind"], "ENUM");
    assert_eq!(role["type"]["name"], "UsersRoleEnum");
}

#[tokio::test]
async fn many_relations_are_non_null_lists_of_wrappers() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        &format!(r#"{{ __type(name: "UsersSelectItem") {{ {TYPE_FIELDS} }} }}"#),
    )
    .await;
    let posts = field(&data["__type"]["fields"], "posts");

    assert_eq!(posts["type"]["kind"], "NON_NULL");
    assert_eq!(posts["type"]["ofType"]["kind"], "LIST");
    assert_eq!(posts["type"]["ofType"]["ofType"]["kind"], "NON_NULL");
    assert_eq!(
        posts["type"]["ofType"]["ofType"]["ofType"]["name"],
        "UsersPostsRelation"
    );
}

#[tokio::test]
async fn item_shape_has_no_relation_fields() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        r#"{ __type(name: "UsersItem") { fields { name } } }"#,
    )
    .await;
    let names: Vec<&str> = data["__type"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["id", "name", "role"]);
}

#[tokio::test]
async fn relation_wrapper_mirrors_target_columns_only() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        r#"{ __type(name: "UsersPostsRelation") { fields { name } } }"#,
    )
    .await;
    let names: Vec<&str> = data["__type"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    // Posts columns, but no `author` relation hop.
    assert_eq!(names, vec!["id", "authorId", "content"]);
}

#[tokio::test]
async fn exactly_one_object_type_pair_per_table() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(&schema, "{ __schema { types { name } } }").await;
    let names: Vec<&str> = data["__schema"]["types"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();

    for expected in [
        "UsersItem",
        "UsersSelectItem",
        "PostsItem",
        "PostsSelectItem",
        "CustomersItem",
        "CustomersSelectItem",
        "UsersFilters",
        "UsersOrderBy",
        "UsersInsertInput",
        "UsersUpdateInput",
    ] {
        assert_eq!(
            names.iter().filter(|n| **n == expected).count(),
            1,
            "expected exactly one `{expected}`"
        );
    }
}

#[tokio::test]
async fn query_fields_have_the_documented_shapes() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        &format!(r#"{{ __type(name: "Query") {{ {TYPE_FIELDS} }} }}"#),
    )
    .await;
    let fields = &data["__type"]["fields"];

    let users = field(fields, "users");
    assert_eq!(users["type"]["kind"], "NON_NULL");
    assert_eq!(users["type"]["ofType"]["kind"], "LIST");
    assert_eq!(users["type"]["ofType"]["ofType"]["kind"], "NON_NULL");

    // Single-row fetch is nullable: absence is null, not an error.
    let single = field(fields, "usersSingle");
    assert_eq!(single["type"]["kind"], "OBJECT");
    assert_eq!(single["type"]["name"], "UsersSelectItem");
}

#[tokio::test]
async fn mutation_fields_exist_per_table() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        r#"{ __type(name: "Mutation") { fields { name } } }"#,
    )
    .await;
    let names: Vec<&str> = data["__type"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();

    for expected in [
        "insertIntoUsersSingle",
        "insertIntoUsers",
        "updateUsers",
        "deleteFromUsers",
        "insertIntoPostsSingle",
        "insertIntoPosts",
        "updatePosts",
        "deleteFromPosts",
    ] {
        assert!(names.contains(&expected), "missing `{expected}`");
    }
}

#[tokio::test]
async fn insert_input_requires_exactly_the_required_columns() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        r#"{ __type(name: "UsersInsertInput") {
            inputFields { name type { kind name ofType { name } } }
        } }"#,
    )
    .await;
    let fields = &data["__type"]["inputFields"];

    assert_eq!(field(fields, "name")["type"]["kind"], "NON_NULL");
    assert_eq!(field(fields, "role")["type"]["kind"], "ENUM");

    let data = introspect(
        &schema,
        r#"{ __type(name: "UsersUpdateInput") {
            inputFields { name type { kind } }
        } }"#,
    )
    .await;
    for entry in data["__type"]["inputFields"].as_array().unwrap() {
        assert_ne!(entry["type"]["kind"], "NON_NULL", "update inputs are all optional");
    }
}

#[tokio::test]
async fn order_direction_enum_is_part_of_the_wire_contract() {
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        r#"{ __type(name: "OrderDirection") { enumValues { name } } }"#,
    )
    .await;
    let values: Vec<&str> = data["__type"]["enumValues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["asc", "desc"]);
}

#[tokio::test]
async fn ilike_appears_only_in_the_postgres_dialect() {
    let postgres = compile(Dialect::Postgres);
    let data = introspect(
        &postgres,
        r#"{ __type(name: "StringFilters") { inputFields { name } } }"#,
    )
    .await;
    let names: Vec<&str> = data["__type"]["inputFields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"ilike"));
    assert!(names.contains(&"notIlike"));

    let sqlite = compile(Dialect::Sqlite);
    let data = introspect(
        &sqlite,
        r#"{ __type(name: "StringFilters") { inputFields { name } } }"#,
    )
    .await;
    let names: Vec<&str> = data["__type"]["inputFields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert!(!names.contains(&"ilike"));
}

#[tokio::test]
async fn unsupported_column_types_are_omitted_not_stubbed() {
    let docs = RelationalSchema::new().table(
        TableDef::new("Docs")
            .column(ColumnDef::new("id", LogicalType::Int32).primary_key())
            .column(ColumnDef::new("embedding", LogicalType::Vector(3)))
            .column(ColumnDef::new("payload", LogicalType::Json)),
    );

    for (dialect, expect_embedding) in [(Dialect::Postgres, true), (Dialect::Mysql, false)] {
        let executor = Arc::new(MemoryExecutor::new(docs.clone()));
        let schema = SchemaCompiler::new(CompileOptions::new(dialect))
            .compile(docs.clone(), executor)
            .unwrap()
            .schema;

        let data = introspect(
            &schema,
            r#"{ __type(name: "DocsSelectItem") { fields { name } } }"#,
        )
        .await;
        let names: Vec<&str> = data["__type"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();

        assert_eq!(
            names.contains(&"embedding"),
            expect_embedding,
            "dialect {dialect:?}"
        );
        assert!(names.contains(&"payload"));
    }
}

#[tokio::test]
async fn non_returning_dialect_mutations_return_the_success_object() {
    let schema = compile(Dialect::Mysql);
    let data = introspect(
        &schema,
        &format!(r#"{{ __type(name: "Mutation") {{ {TYPE_FIELDS} }} }}"#),
    )
    .await;
    let insert = field(&data["__type"]["fields"], "insertIntoUsers");
    assert_eq!(insert["type"]["kind"], "NON_NULL");
    assert_eq!(insert["type"]["ofType"]["name"], "MutationSuccess");

    // Returning dialects keep row images instead.
    let schema = compile(Dialect::Sqlite);
    let data = introspect(
        &schema,
        &format!(r#"{{ __type(name: "Mutation") {{ {TYPE_FIELDS} }} }}"#),
    )
    .await;
    let insert = field(&data["__type"]["fields"], "insertIntoUsers");
    assert_eq!(insert["type"]["ofType"]["ofType"]["ofType"]["name"], "UsersItem");
}
