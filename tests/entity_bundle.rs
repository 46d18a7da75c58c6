//! The entity bundle: assembling custom roots from cherry-picked,
//! renamed fields while keeping table-derived types (and therefore
//! fragment compatibility) intact.

mod common;

use std::sync::Arc;

use async_graphql::dynamic::Object;
use common::{MemoryExecutor, blog_schema, seed};
use graph_tables::{CompileOptions, Dialect, SchemaCompiler};
use serde_json::json;

#[tokio::test]
async fn custom_named_fields_share_resolvers_and_types() {
    let schema = blog_schema();
    let executor = Arc::new(MemoryExecutor::new(schema.clone()));
    seed(&executor);

    let compiler = SchemaCompiler::new(CompileOptions::new(Dialect::Sqlite));
    let set = compiler.compile_entities(schema, executor).unwrap();

    let users = set.entities.get("Users").unwrap().clone();
    let posts = set.entities.get("Posts").unwrap().clone();

    let query = Object::new("Query")
        .field(users.collection_field("customUsers"))
        .field(posts.single_field("firstPost"));
    let mutation = Object::new("Mutation").field(posts.delete_field("purgePosts"));

    let schema = set
        .schema_builder(query, Some(mutation))
        .finish()
        .unwrap();

    // A fragment written against the table-derived type matches the
    // renamed field, because the return type follows the table identity.
    let response = schema
        .execute(
            r#"
            { customUsers(where: { id: { eq: 1 } }) { ...UserParts } }
            fragment UserParts on UsersSelectItem { id name }
            "#,
        )
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "customUsers": [{ "id": 1, "name": "FirstUser" }] })
    );

    let response = schema.execute("{ firstPost { id content } }").await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "firstPost": { "id": 1, "content": "1MESSAGE" } })
    );

    let response = schema
        .execute(r#"mutation { purgePosts(where: { authorId: { eq: 5 } }) { id } }"#)
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "purgePosts": [{ "id": 4 }, { "id": 5 }] })
    );
}

#[tokio::test]
async fn depth_limit_passes_through_to_the_schema() {
    let schema = blog_schema();
    let executor = Arc::new(MemoryExecutor::new(schema.clone()));
    seed(&executor);

    let compiler = SchemaCompiler::new(CompileOptions::new(Dialect::Sqlite).limit_depth(2));
    let compiled = compiler.compile(schema, executor).unwrap();

    let shallow = compiled.schema.execute("{ users { id } }").await;
    assert!(shallow.errors.is_empty(), "{:?}", shallow.errors);

    let deep = compiled.schema.execute("{ users { posts { id } } }").await;
    assert!(!deep.errors.is_empty(), "depth limit should reject this");
}
