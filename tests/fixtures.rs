//! Schemas and data loaded from JSON files.

use anyhow::{Context, Result};
use decoy::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

const SCHEMA: &str = r#"{
    "models": [
        { "name": "author", "associations": [{ "kind": "hasMany", "name": "blogPosts" }] },
        { "name": "blogPost", "associations": [
            { "kind": "belongsTo", "name": "author" },
            { "kind": "hasMany", "name": "tags" }
        ] },
        { "name": "tag", "associations": [{ "kind": "hasMany", "name": "blogPosts" }] }
    ]
}"#;

const FIXTURES: &str = r#"{
    "authors": [{ "id": "1", "name": "Zelda", "blogPostIds": ["1", "2"] }],
    "blogPosts": [
        { "id": "1", "title": "Lorem", "authorId": "1", "tagIds": ["1"] },
        { "id": "2", "title": "Ipsum", "authorId": "1", "tagIds": [] }
    ],
    "tags": [{ "id": "1", "name": "news", "blogPostIds": ["1"] }]
}"#;

#[test]
fn test_schema_and_fixtures_from_files() -> Result<()> {
    let dir = tempdir()?;
    let schema_path = dir.path().join("schema.json");
    let fixtures_path = dir.path().join("fixtures.json");
    std::fs::write(&schema_path, SCHEMA)?;
    std::fs::write(&fixtures_path, FIXTURES)?;

    let schema = decoy::schema_from_file(&schema_path)?;
    schema.load_fixtures(&fixtures_path)?;

    assert_eq!(schema.collection_name_for("blogPost")?, "blogPosts");
    let author = schema.find("author", "1")?.context("author missing")?;
    assert_eq!(author.many("blogPosts")?.model_ids(), vec!["1", "2"]);

    let tag = schema.find_by("tag", json!({ "name": "news" }))?.context("tag missing")?;
    let post = tag.many("blogPosts")?.first().cloned().context("no posts")?;
    assert_eq!(post.attr("title"), json!("Lorem"));
    assert_eq!(post.one("author")?, Some(author));
    Ok(())
}

#[test]
fn test_snapshot_after_changes() -> Result<()> {
    let dir = tempdir()?;
    let schema_path = dir.path().join("schema.json");
    std::fs::write(&schema_path, SCHEMA)?;
    let schema = decoy::schema_from_file(&schema_path)?;

    let author = schema.create("author", json!({ "name": "Link" }))?;
    author.create_related("blogPosts", json!({ "title": "Hello" }))?;

    let snapshot = dir.path().join("snapshot.json");
    schema.save_snapshot(&snapshot)?;
    let data: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&snapshot)?)?;
    assert_eq!(
        data["blogPosts"],
        json!([{ "id": "1", "title": "Hello", "authorId": "1", "tagIds": [] }])
    );
    assert_eq!(data["authors"][0]["blogPostIds"], json!(["1"]));
    Ok(())
}

#[test]
fn test_invalid_schema_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("schema.json");
    std::fs::write(
        &path,
        r#"{ "models": [{ "name": "post", "associations": [{ "kind": "belongsTo", "name": "author" }] }] }"#,
    )?;

    let err = decoy::schema_from_file(&path).unwrap_err();
    assert!(err.is_configuration());
    Ok(())
}
