//! Integration tests for the parse, diff, patch and deparse pipeline

use pretty_assertions::assert_eq;
use schemaloom_core::{
    Cardinality, Column, Constraint, DialectConfig, Enum, ErrorCode, FormatTag, Index, Schema,
    Table,
};
use schemaloom_engine::{
    apply_patch, deparse, deparse_operation, derive_relationships, diff, DiffItem, Operation,
};
use schemaloom_parser::parse;
use serde_json::json;

const DDL: &str = r#"
CREATE EXTENSION IF NOT EXISTS pgcrypto;

CREATE TYPE status AS ENUM ('draft', 'published');

CREATE TABLE users (
  id bigint NOT NULL,
  email varchar(255) NOT NULL,
  created_at timestamp DEFAULT now(),
  CONSTRAINT users_pkey PRIMARY KEY (id),
  CONSTRAINT users_email_key UNIQUE (email)
);

CREATE TABLE posts (
  id bigint NOT NULL,
  author_id bigint NOT NULL,
  state status DEFAULT 'draft',
  score integer DEFAULT 0,
  CONSTRAINT posts_pkey PRIMARY KEY (id),
  CONSTRAINT posts_score_check CHECK (score >= 0),
  CONSTRAINT posts_author_fk FOREIGN KEY (author_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE INDEX posts_author_idx ON posts (author_id);

COMMENT ON TABLE users IS 'people';
"#;

fn parsed() -> Schema {
    let result = parse(DDL, FormatTag::Postgres);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    result.value
}

#[test]
fn deparsed_ddl_parses_back_to_the_same_schema() {
    let schema = parsed();

    let ddl = deparse(&schema, DialectConfig::Postgres);
    assert!(ddl.errors.is_empty(), "{:?}", ddl.errors);

    let reparsed = parse(&ddl.value, FormatTag::Postgres);
    assert!(reparsed.errors.is_empty(), "{:?}\n{}", reparsed.errors, ddl.value);
    assert_eq!(reparsed.value, schema);
}

#[test]
fn constraints_come_after_tables_and_foreign_keys_last() {
    let ddl = deparse(&parsed(), DialectConfig::Postgres).value;
    let position = |needle: &str| {
        ddl.find(needle)
            .unwrap_or_else(|| panic!("'{}' missing from\n{}", needle, ddl))
    };

    let last_table = position("CREATE TABLE \"posts\"");
    let index = position("CREATE INDEX");
    let primary = position("PRIMARY KEY");
    let unique = position("UNIQUE (");
    let check = position("CHECK (");
    let foreign = position("FOREIGN KEY");

    assert!(position("CREATE EXTENSION") < position("CREATE TYPE"));
    assert!(position("CREATE TYPE") < position("CREATE TABLE \"users\""));
    assert!(last_table < index);
    assert!(index < primary);
    assert!(primary < unique);
    assert!(unique < check);
    assert!(check < foreign);
}

#[test]
fn diff_of_identical_schemas_is_empty() {
    let schema = parsed();
    assert!(diff(&schema, &schema.clone()).is_empty());
}

fn modified() -> Schema {
    let mut schema = parsed();
    schema.tables.shift_remove("posts");

    let users = schema.table_mut("users").unwrap();
    users.comment = None;
    users.columns.insert(
        "email".into(),
        Column::new("email", "text").not_null().unique().with_comment("login"),
    );
    users.columns.shift_remove("created_at");
    users.indexes.insert(
        "users_created_idx".into(),
        Index::new("users_created_idx", vec!["id".into()]).with_type("btree"),
    );
    users.add_constraint(Constraint::check("users_email_check", "email <> ''"));

    schema
        .with_table(Table::new("tags").with_column(Column::new("label", "text").primary_key()))
        .with_enum(Enum::new("status", vec!["draft".into(), "published".into(), "archived".into()]))
}

#[test]
fn reverting_every_item_restores_the_earlier_schema() {
    let before = parsed();
    let after = modified();

    let items = diff(&before, &after);
    assert!(!items.is_empty());

    let reverts: Vec<Operation> = items.iter().map(DiffItem::revert_operation).collect();
    let mut restored = after.clone();
    apply_patch(&mut restored, &reverts).unwrap();
    assert_eq!(restored, before);

    let forwards: Vec<Operation> = items.iter().map(DiffItem::forward_operation).collect();
    let mut advanced = before.clone();
    apply_patch(&mut advanced, &forwards).unwrap();
    assert_eq!(advanced, after);
}

#[test]
fn diff_items_are_ordered_by_table_name() {
    let items = diff(&parsed(), &modified());
    let tables: Vec<&str> = items.iter().filter_map(DiffItem::table).collect();

    let mut sorted = tables.clone();
    sorted.sort();
    assert_eq!(tables, sorted);
    assert!(matches!(items.last(), Some(DiffItem::Enum { .. })));
}

#[test]
fn removing_a_missing_table_twice_changes_nothing() {
    let mut schema = parsed();
    let before = serde_json::to_string(&schema).unwrap();

    let remove = [Operation::Remove {
        path: "/tables/ghost".into(),
    }];
    apply_patch(&mut schema, &remove).unwrap();
    apply_patch(&mut schema, &remove).unwrap();

    assert_eq!(serde_json::to_string(&schema).unwrap(), before);
}

#[test]
fn patch_stream_from_json_builds_a_table() {
    let operations: Vec<Operation> = serde_json::from_str(
        r#"[
          { "op": "add", "path": "/tables/users/columns/id",
            "value": { "name": "id", "type": "bigint", "primary": true, "notNull": true } },
          { "op": "add", "path": "/tables/users/constraints/users_pkey",
            "value": { "type": "PRIMARY KEY", "columnNames": ["id"] } }
        ]"#,
    )
    .unwrap();

    let mut schema = Schema::new();
    apply_patch(&mut schema, &operations).unwrap();

    let users = schema.table("users").unwrap();
    assert_eq!(users.columns.len(), 1);
    assert_eq!(users.columns["id"], Column::new("id", "bigint").primary_key());
    assert_eq!(users.constraints["users_pkey"].name(), "users_pkey");

    let ddl = deparse(&schema, DialectConfig::Postgres).value;
    assert!(ddl.contains("ALTER TABLE \"users\" ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\");"));
}

#[test]
fn drizzle_relationships_point_at_column_names() {
    let source = r#"
import { pgTable, serial, integer, text } from 'drizzle-orm/pg-core';

export const posts = pgTable('posts', {
  id: serial('id').primaryKey(),
  authorId: integer('author_id').notNull().references(() => users.userId),
});

export const profiles = pgTable('profiles', {
  id: serial('id').primaryKey(),
  ownerId: integer('owner_id').unique().references(() => users.userId),
});

export const users = pgTable('users', {
  userId: serial('user_id').primaryKey(),
  name: text('name'),
});
"#;

    let result = parse(source, FormatTag::DrizzlePostgres);
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let relationships = derive_relationships(&result.value.tables);
    assert_eq!(relationships.len(), 2);

    for relationship in relationships.values() {
        assert_eq!(relationship.primary_table_name, "users");
        assert_eq!(relationship.primary_column_name, "user_id");
    }

    let by_table = |table: &str| {
        relationships
            .values()
            .find(|r| r.foreign_table_name == table)
            .unwrap()
    };
    assert_eq!(by_table("posts").foreign_column_name, "author_id");
    assert_eq!(by_table("posts").cardinality, Cardinality::OneToMany);
    assert_eq!(by_table("profiles").cardinality, Cardinality::OneToOne);
}

#[test]
fn empty_check_detail_is_rejected() {
    let result = parse(
        r#"{ "tables": { "t": { "constraints": {
             "t_check": { "type": "CHECK", "detail": "  " } } } } }"#,
        FormatTag::Canonical,
    );
    assert_eq!(result.errors[0].code, ErrorCode::EmptyCheckDetail);
    assert!(result.value.is_empty());

    let schema = Schema::new().with_table(Table::new("t").with_constraint(Constraint::check("t_check", "")));
    let ddl = deparse(&schema, DialectConfig::Postgres);
    assert_eq!(ddl.value, "");
    assert_eq!(ddl.errors.len(), 1);
    assert_eq!(ddl.errors[0].code, ErrorCode::DeparseError);
}

#[test]
fn patched_schema_diffs_against_its_source() {
    let before = parsed();
    let mut after = before.clone();
    apply_patch(
        &mut after,
        &[Operation::Replace {
            path: "/tables/posts/columns/score/default".into(),
            value: json!(10),
        }],
    )
    .unwrap();

    let items = diff(&before, &after);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path(), "/tables/posts/columns/score/default");
}

#[test]
fn forward_operations_render_as_migration_ddl() {
    let before = parsed();
    let mut after = before.clone();
    after.tables.shift_remove("posts");
    after
        .table_mut("users")
        .unwrap()
        .columns
        .insert("nickname".into(), Column::new("nickname", "text").with_comment("display name"));

    let statements: Vec<String> = diff(&before, &after)
        .iter()
        .map(|item| {
            let result = deparse_operation(&item.forward_operation());
            assert!(result.errors.is_empty(), "{:?}", result.errors);
            result.value
        })
        .collect();

    assert_eq!(
        statements,
        vec![
            "DROP TABLE \"posts\";".to_string(),
            "ALTER TABLE \"users\" ADD COLUMN \"nickname\" text;\n\n\
             COMMENT ON COLUMN \"users\".\"nickname\" IS 'display name';"
                .to_string(),
        ]
    );
}
