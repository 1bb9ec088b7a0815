//! Integration tests for format parsing

use pretty_assertions::assert_eq;
use schemaloom_core::{Config, Constraint, ErrorCode, FormatTag, Schema};
use schemaloom_parser::parse;

const DDL: &str = r#"
CREATE TABLE users (
  id bigint NOT NULL,
  email varchar(255) NOT NULL,
  CONSTRAINT users_pkey PRIMARY KEY (id)
);

CREATE TABLE posts (
  id bigint NOT NULL,
  author_id bigint NOT NULL,
  CONSTRAINT posts_pkey PRIMARY KEY (id),
  CONSTRAINT posts_author_fk FOREIGN KEY (author_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX users_email_key ON users (email);
"#;

const DRIZZLE: &str = r#"
import { pgTable, bigint, varchar, uniqueIndex, primaryKey } from 'drizzle-orm/pg-core';

export const posts = pgTable('posts', {
  id: bigint('id').notNull(),
  authorId: bigint('author_id').notNull().references(() => users.id, { onDelete: 'cascade' }),
}, (t) => [primaryKey({ columns: [t.id] })]);

export const users = pgTable('users', {
  id: bigint('id').notNull(),
  email: varchar('email', { length: 255 }).notNull(),
}, (t) => [
  primaryKey({ columns: [t.id] }),
  uniqueIndex('users_email_key').on(t.email),
]);
"#;

const SCHEMA_RB: &str = r#"
ActiveRecord::Schema[7.1].define(version: 2024_01_01_000000) do
  create_table "posts", id: :bigint, force: :cascade do |t|
    t.bigint "author_id", null: false
  end

  create_table "users", id: :bigint, force: :cascade do |t|
    t.string "email", limit: 255, null: false
    t.index ["email"], name: "users_email_key", unique: true
  end

  add_foreign_key "posts", "users", column: "author_id", on_delete: :cascade
end
"#;

fn table_names(schema: &Schema) -> Vec<&str> {
    let mut names: Vec<&str> = schema.tables.keys().map(String::as_str).collect();
    names.sort();
    names
}

#[test]
fn ddl_drizzle_and_schema_rb_describe_the_same_tables() {
    let from_ddl = parse(DDL, FormatTag::Postgres);
    let from_drizzle = parse(DRIZZLE, FormatTag::DrizzlePostgres);
    let from_schema_rb = parse(SCHEMA_RB, FormatTag::SchemaRb);
    assert!(from_ddl.errors.is_empty(), "{:?}", from_ddl.errors);
    assert!(from_drizzle.errors.is_empty(), "{:?}", from_drizzle.errors);
    assert!(from_schema_rb.errors.is_empty(), "{:?}", from_schema_rb.errors);

    assert_eq!(table_names(&from_ddl.value), table_names(&from_drizzle.value));
    assert_eq!(table_names(&from_ddl.value), table_names(&from_schema_rb.value));

    for schema in [&from_ddl.value, &from_drizzle.value, &from_schema_rb.value] {
        let users = schema.table("users").unwrap();
        assert_eq!(users.columns["email"].column_type, "varchar(255)");
        assert!(users.indexes["users_email_key"].unique);
        assert!(users.columns["id"].primary);

        let posts = schema.table("posts").unwrap();
        let fk = posts
            .constraints
            .values()
            .find_map(|c| match c {
                Constraint::ForeignKey(fk) => Some(fk),
                _ => None,
            })
            .unwrap();
        assert_eq!(fk.column_names, vec!["author_id".to_string()]);
        assert_eq!(fk.target_table_name, "users");
        assert_eq!(fk.target_column_names, vec!["id".to_string()]);
    }
}

#[test]
fn canonical_json_roundtrips_parsed_schema() {
    let schema = parse(DDL, FormatTag::Postgres).value;
    let json = serde_json::to_string_pretty(&schema).unwrap();

    let reparsed = parse(&json, FormatTag::Canonical);
    assert!(reparsed.errors.is_empty(), "{:?}", reparsed.errors);
    assert_eq!(reparsed.value, schema);
}

#[test]
fn format_from_config() {
    let config = Config::from_toml(r#"format = "tbls""#).unwrap();
    let result = parse(r#"{ "tables": [ { "name": "t", "columns": [] } ] }"#, config.format);
    assert!(result.value.tables.contains_key("t"));
}

#[test]
fn garbage_input_never_panics() {
    let inputs = ["", "}}}{{{", "CREATE", "export const = ;", "\u{0}\u{1}", "`", "end end do |", "t.x(:"];
    let formats = [
        FormatTag::Postgres,
        FormatTag::Mysql,
        FormatTag::DrizzlePostgres,
        FormatTag::DrizzleMysql,
        FormatTag::Tbls,
        FormatTag::SchemaRb,
        FormatTag::Canonical,
    ];

    for format in formats {
        for input in inputs {
            let result = parse(input, format);
            if result.has_critical() {
                assert!(result.value.is_empty(), "{} on {:?}", format, input);
            }
        }
    }
}

#[test]
fn json_formats_reject_non_json() {
    for format in [FormatTag::Tbls, FormatTag::Canonical] {
        let result = parse("not json", format);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ErrorCode::InvalidJson);
    }
}
