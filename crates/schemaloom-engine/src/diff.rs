//! Structural schema diff
//!
//! Compares two [`Schema`] snapshots and lists what changed. Tables are
//! visited in name order, and inside a table its columns, indexes and
//! constraints are visited in name order too, so the same pair of schemas
//! always yields the same list. Unchanged entities produce no item.
//!
//! A table, column or index that exists on one side only is reported as one
//! whole item; its contents are implied. Entities present on both sides are
//! compared attribute by attribute, except constraints, which are compared
//! as whole definitions.
//!
//! Every item knows the patch [`Operation`] that applies it to the `before`
//! schema and the one that undoes it on the `after` schema.

use crate::patch::Operation;
use schemaloom_core::{Column, Constraint, DefaultValue, Enum, Extension, Index, Schema, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How an entity or attribute differs between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// Before and after values of one changed thing.
///
/// `before` is `None` for additions and `after` is `None` for removals. A
/// modified change always carries both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    pub status: ChangeStatus,
    pub before: Option<T>,
    pub after: Option<T>,
}

impl<T: PartialEq> Change<T> {
    pub fn between(before: Option<T>, after: Option<T>) -> Self {
        let status = match (&before, &after) {
            (None, None) => ChangeStatus::Unchanged,
            (None, Some(_)) => ChangeStatus::Added,
            (Some(_), None) => ChangeStatus::Removed,
            (Some(b), Some(a)) if b == a => ChangeStatus::Unchanged,
            (Some(_), Some(_)) => ChangeStatus::Modified,
        };
        Self {
            status,
            before,
            after,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.status == ChangeStatus::Unchanged
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Revert,
}

impl<T: Serialize> Change<T> {
    /// Operation at `path` that makes the document hold the `after` value
    /// (forward) or the `before` value (revert)
    fn operation(&self, path: String, direction: Direction) -> Operation {
        let (target, other) = match direction {
            Direction::Forward => (&self.after, &self.before),
            Direction::Revert => (&self.before, &self.after),
        };
        let json = |value: &T| serde_json::to_value(value).unwrap_or_default();

        match (target, other) {
            (None, _) => Operation::Remove { path },
            (Some(value), None) => Operation::Add {
                path,
                value: json(value),
            },
            (Some(value), Some(_)) => Operation::Replace {
                path,
                value: json(value),
            },
        }
    }
}

/// A changed column attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "change", rename_all = "camelCase")]
pub enum ColumnAttribute {
    Name(Change<String>),
    Type(Change<String>),
    Default(Change<DefaultValue>),
    NotNull(Change<bool>),
    Primary(Change<bool>),
    Unique(Change<bool>),
    Check(Change<String>),
    Comment(Change<String>),
}

impl ColumnAttribute {
    /// Field name in the canonical JSON form
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Type(_) => "type",
            Self::Default(_) => "default",
            Self::NotNull(_) => "notNull",
            Self::Primary(_) => "primary",
            Self::Unique(_) => "unique",
            Self::Check(_) => "check",
            Self::Comment(_) => "comment",
        }
    }

    pub fn status(&self) -> ChangeStatus {
        match self {
            Self::Name(c) | Self::Type(c) | Self::Check(c) | Self::Comment(c) => c.status,
            Self::Default(c) => c.status,
            Self::NotNull(c) | Self::Primary(c) | Self::Unique(c) => c.status,
        }
    }

    fn operation(&self, path: String, direction: Direction) -> Operation {
        match self {
            Self::Name(c) | Self::Type(c) | Self::Check(c) | Self::Comment(c) => {
                c.operation(path, direction)
            }
            Self::Default(c) => c.operation(path, direction),
            Self::NotNull(c) | Self::Primary(c) | Self::Unique(c) => c.operation(path, direction),
        }
    }
}

/// A changed index attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "change", rename_all = "camelCase")]
pub enum IndexAttribute {
    Name(Change<String>),
    Columns(Change<Vec<String>>),
    Unique(Change<bool>),
    Type(Change<String>),
}

impl IndexAttribute {
    /// Field name in the canonical JSON form
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Columns(_) => "columns",
            Self::Unique(_) => "unique",
            Self::Type(_) => "type",
        }
    }

    pub fn status(&self) -> ChangeStatus {
        match self {
            Self::Name(c) | Self::Type(c) => c.status,
            Self::Columns(c) => c.status,
            Self::Unique(c) => c.status,
        }
    }

    fn operation(&self, path: String, direction: Direction) -> Operation {
        match self {
            Self::Name(c) | Self::Type(c) => c.operation(path, direction),
            Self::Columns(c) => c.operation(path, direction),
            Self::Unique(c) => c.operation(path, direction),
        }
    }
}

/// One difference between two schemas, identified by what it targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum DiffItem {
    /// Table added or removed as a whole
    Table { table: String, change: Change<Table> },

    TableName { table: String, change: Change<String> },

    TableComment { table: String, change: Change<String> },

    /// Column added or removed as a whole
    Column {
        table: String,
        column: String,
        change: Change<Column>,
    },

    ColumnAttribute {
        table: String,
        column: String,
        attribute: ColumnAttribute,
    },

    /// Index added or removed as a whole
    Index {
        table: String,
        index: String,
        change: Change<Index>,
    },

    IndexAttribute {
        table: String,
        index: String,
        attribute: IndexAttribute,
    },

    /// Constraint added, removed or redefined
    Constraint {
        table: String,
        constraint: String,
        change: Change<Constraint>,
    },

    Enum { name: String, change: Change<Enum> },

    Extension { name: String, change: Change<Extension> },
}

impl DiffItem {
    pub fn status(&self) -> ChangeStatus {
        match self {
            Self::Table { change, .. } => change.status,
            Self::TableName { change, .. } | Self::TableComment { change, .. } => change.status,
            Self::Column { change, .. } => change.status,
            Self::ColumnAttribute { attribute, .. } => attribute.status(),
            Self::Index { change, .. } => change.status,
            Self::IndexAttribute { attribute, .. } => attribute.status(),
            Self::Constraint { change, .. } => change.status,
            Self::Enum { change, .. } => change.status,
            Self::Extension { change, .. } => change.status,
        }
    }

    /// Table the item belongs to, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Table { table, .. }
            | Self::TableName { table, .. }
            | Self::TableComment { table, .. }
            | Self::Column { table, .. }
            | Self::ColumnAttribute { table, .. }
            | Self::Index { table, .. }
            | Self::IndexAttribute { table, .. }
            | Self::Constraint { table, .. } => Some(table),
            Self::Enum { .. } | Self::Extension { .. } => None,
        }
    }

    /// Location of the changed value in the canonical JSON form
    pub fn path(&self) -> String {
        match self {
            Self::Table { table, .. } => format!("/tables/{}", table),
            Self::TableName { table, .. } => format!("/tables/{}/name", table),
            Self::TableComment { table, .. } => format!("/tables/{}/comment", table),
            Self::Column { table, column, .. } => format!("/tables/{}/columns/{}", table, column),
            Self::ColumnAttribute {
                table,
                column,
                attribute,
            } => format!("/tables/{}/columns/{}/{}", table, column, attribute.key()),
            Self::Index { table, index, .. } => format!("/tables/{}/indexes/{}", table, index),
            Self::IndexAttribute {
                table,
                index,
                attribute,
            } => format!("/tables/{}/indexes/{}/{}", table, index, attribute.key()),
            Self::Constraint {
                table, constraint, ..
            } => format!("/tables/{}/constraints/{}", table, constraint),
            Self::Enum { name, .. } => format!("/enums/{}", name),
            Self::Extension { name, .. } => format!("/extensions/{}", name),
        }
    }

    /// Patch operation that applies this item to the `before` schema
    pub fn forward_operation(&self) -> Operation {
        self.operation(Direction::Forward)
    }

    /// Patch operation that undoes this item on the `after` schema
    pub fn revert_operation(&self) -> Operation {
        self.operation(Direction::Revert)
    }

    fn operation(&self, direction: Direction) -> Operation {
        let path = self.path();
        match self {
            Self::Table { change, .. } => change.operation(path, direction),
            Self::TableName { change, .. } | Self::TableComment { change, .. } => {
                change.operation(path, direction)
            }
            Self::Column { change, .. } => change.operation(path, direction),
            Self::ColumnAttribute { attribute, .. } => attribute.operation(path, direction),
            Self::Index { change, .. } => change.operation(path, direction),
            Self::IndexAttribute { attribute, .. } => attribute.operation(path, direction),
            Self::Constraint { change, .. } => change.operation(path, direction),
            Self::Enum { change, .. } => change.operation(path, direction),
            Self::Extension { change, .. } => change.operation(path, direction),
        }
    }
}

/// Compare two schemas.
///
/// `diff(a, a)` is always empty.
pub fn diff(before: &Schema, after: &Schema) -> Vec<DiffItem> {
    let mut items = Vec::new();

    for name in sorted_union(before.tables.keys(), after.tables.keys()) {
        match (before.tables.get(name), after.tables.get(name)) {
            (Some(b), Some(a)) => diff_table(name, b, a, &mut items),
            (b, a) => items.push(DiffItem::Table {
                table: name.clone(),
                change: Change::between(b.cloned(), a.cloned()),
            }),
        }
    }

    for name in sorted_union(before.enums.keys(), after.enums.keys()) {
        let change = Change::between(before.enums.get(name).cloned(), after.enums.get(name).cloned());
        if !change.is_unchanged() {
            items.push(DiffItem::Enum {
                name: name.clone(),
                change,
            });
        }
    }

    for name in sorted_union(before.extensions.keys(), after.extensions.keys()) {
        let change = Change::between(
            before.extensions.get(name).cloned(),
            after.extensions.get(name).cloned(),
        );
        if !change.is_unchanged() {
            items.push(DiffItem::Extension {
                name: name.clone(),
                change,
            });
        }
    }

    tracing::debug!(items = items.len(), "diffed schemas");
    items
}

fn diff_table(name: &str, before: &Table, after: &Table, items: &mut Vec<DiffItem>) {
    let table = || name.to_string();

    let change = Change::between(Some(before.name.clone()), Some(after.name.clone()));
    if !change.is_unchanged() {
        items.push(DiffItem::TableName {
            table: table(),
            change,
        });
    }

    let change = Change::between(before.comment.clone(), after.comment.clone());
    if !change.is_unchanged() {
        items.push(DiffItem::TableComment {
            table: table(),
            change,
        });
    }

    for column in sorted_union(before.columns.keys(), after.columns.keys()) {
        match (before.columns.get(column), after.columns.get(column)) {
            (Some(b), Some(a)) => {
                for attribute in column_attributes(b, a) {
                    items.push(DiffItem::ColumnAttribute {
                        table: table(),
                        column: column.clone(),
                        attribute,
                    });
                }
            }
            (b, a) => items.push(DiffItem::Column {
                table: table(),
                column: column.clone(),
                change: Change::between(b.cloned(), a.cloned()),
            }),
        }
    }

    for index in sorted_union(before.indexes.keys(), after.indexes.keys()) {
        match (before.indexes.get(index), after.indexes.get(index)) {
            (Some(b), Some(a)) => {
                for attribute in index_attributes(b, a) {
                    items.push(DiffItem::IndexAttribute {
                        table: table(),
                        index: index.clone(),
                        attribute,
                    });
                }
            }
            (b, a) => items.push(DiffItem::Index {
                table: table(),
                index: index.clone(),
                change: Change::between(b.cloned(), a.cloned()),
            }),
        }
    }

    for constraint in sorted_union(before.constraints.keys(), after.constraints.keys()) {
        let change = Change::between(
            before.constraints.get(constraint).cloned(),
            after.constraints.get(constraint).cloned(),
        );
        if !change.is_unchanged() {
            items.push(DiffItem::Constraint {
                table: table(),
                constraint: constraint.clone(),
                change,
            });
        }
    }
}

fn column_attributes(before: &Column, after: &Column) -> Vec<ColumnAttribute> {
    let mut attributes = Vec::new();
    push_changed(&mut attributes, ColumnAttribute::Name, Some(&before.name), Some(&after.name));
    push_changed(
        &mut attributes,
        ColumnAttribute::Type,
        Some(&before.column_type),
        Some(&after.column_type),
    );
    push_changed(
        &mut attributes,
        ColumnAttribute::Default,
        before.default.as_ref(),
        after.default.as_ref(),
    );
    push_changed(&mut attributes, ColumnAttribute::NotNull, Some(&before.not_null), Some(&after.not_null));
    push_changed(&mut attributes, ColumnAttribute::Primary, Some(&before.primary), Some(&after.primary));
    push_changed(&mut attributes, ColumnAttribute::Unique, Some(&before.unique), Some(&after.unique));
    push_changed(&mut attributes, ColumnAttribute::Check, before.check.as_ref(), after.check.as_ref());
    push_changed(
        &mut attributes,
        ColumnAttribute::Comment,
        before.comment.as_ref(),
        after.comment.as_ref(),
    );
    attributes
}

fn index_attributes(before: &Index, after: &Index) -> Vec<IndexAttribute> {
    let mut attributes = Vec::new();
    push_changed(&mut attributes, IndexAttribute::Name, Some(&before.name), Some(&after.name));
    push_changed(&mut attributes, IndexAttribute::Columns, Some(&before.columns), Some(&after.columns));
    push_changed(&mut attributes, IndexAttribute::Unique, Some(&before.unique), Some(&after.unique));
    push_changed(
        &mut attributes,
        IndexAttribute::Type,
        Some(&before.index_type),
        Some(&after.index_type),
    );
    attributes
}

fn push_changed<T, A>(
    out: &mut Vec<A>,
    wrap: impl FnOnce(Change<T>) -> A,
    before: Option<&T>,
    after: Option<&T>,
) where
    T: Clone + PartialEq,
{
    let change = Change::between(before.cloned(), after.cloned());
    if !change.is_unchanged() {
        out.push(wrap(change));
    }
}

fn sorted_union<'a>(
    left: impl Iterator<Item = &'a String>,
    right: impl Iterator<Item = &'a String>,
) -> BTreeSet<&'a String> {
    left.chain(right).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn users() -> Table {
        Table::new("users")
            .with_column(Column::new("id", "bigint").primary_key())
            .with_column(Column::new("email", "varchar(255)").not_null())
            .with_index(Index::new("users_email_key", vec!["email".into()]).unique())
            .with_constraint(Constraint::primary_key("users_pkey", vec!["id".into()]))
    }

    #[test]
    fn test_identical_schemas_have_no_items() {
        let schema = Schema::new().with_table(users());
        assert!(diff(&schema, &schema).is_empty());
    }

    #[test]
    fn test_added_and_removed_tables_are_whole_items() {
        let before = Schema::new().with_table(Table::new("old"));
        let after = Schema::new().with_table(users());

        let items = diff(&before, &after);
        assert_eq!(items.len(), 2);

        match &items[0] {
            DiffItem::Table { table, change } => {
                assert_eq!(table, "old");
                assert_eq!(change.status, ChangeStatus::Removed);
                assert!(change.after.is_none());
            }
            other => panic!("unexpected item {:?}", other),
        }
        match &items[1] {
            DiffItem::Table { table, change } => {
                assert_eq!(table, "users");
                assert_eq!(change.status, ChangeStatus::Added);
                assert_eq!(change.after.as_ref(), Some(&users()));
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn test_column_attributes_in_fixed_order() {
        let before = Schema::new().with_table(users());
        let mut changed = users();
        changed.columns.insert(
            "email".into(),
            Column::new("email", "text")
                .not_null()
                .with_default("")
                .with_comment("login"),
        );
        let after = Schema::new().with_table(changed);

        let items = diff(&before, &after);
        let keys: Vec<&str> = items
            .iter()
            .map(|item| match item {
                DiffItem::ColumnAttribute { attribute, .. } => attribute.key(),
                other => panic!("unexpected item {:?}", other),
            })
            .collect();
        assert_eq!(keys, vec!["type", "default", "comment"]);

        assert_eq!(
            items[0],
            DiffItem::ColumnAttribute {
                table: "users".into(),
                column: "email".into(),
                attribute: ColumnAttribute::Type(Change {
                    status: ChangeStatus::Modified,
                    before: Some("varchar(255)".into()),
                    after: Some("text".into()),
                }),
            }
        );
        assert_eq!(items[1].status(), ChangeStatus::Added);
    }

    #[test]
    fn test_tables_visited_in_name_order() {
        let before = Schema::new()
            .with_table(Table::new("zebra"))
            .with_table(Table::new("apple"));
        let after = Schema::new()
            .with_table(Table::new("zebra").with_comment("z"))
            .with_table(Table::new("apple").with_comment("a"))
            .with_table(Table::new("mango"));

        let items = diff(&before, &after);
        let tables: Vec<&str> = items.iter().filter_map(DiffItem::table).collect();
        assert_eq!(tables, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn test_index_and_constraint_changes() {
        let before = Schema::new().with_table(users());
        let after = Schema::new().with_table(
            users()
                .with_index(Index::new("users_email_key", vec!["email".into(), "id".into()]).unique())
                .with_constraint(Constraint::primary_key("users_pkey", vec!["id".into(), "email".into()]))
                .with_constraint(Constraint::check("users_email_check", "email <> ''")),
        );

        let items = diff(&before, &after);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].path(), "/tables/users/indexes/users_email_key/columns");
        assert_eq!(items[1].path(), "/tables/users/constraints/users_email_check");
        assert_eq!(items[1].status(), ChangeStatus::Added);
        assert_eq!(items[2].path(), "/tables/users/constraints/users_pkey");
        assert_eq!(items[2].status(), ChangeStatus::Modified);
    }

    #[test]
    fn test_enum_changes_follow_tables() {
        let before = Schema::new().with_enum(Enum::new("status", vec!["a".into()]));
        let after = Schema::new()
            .with_table(Table::new("t"))
            .with_enum(Enum::new("status", vec!["a".into(), "b".into()]));

        let items = diff(&before, &after);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], DiffItem::Table { .. }));
        assert!(matches!(&items[1], DiffItem::Enum { name, change } if name == "status" && change.status == ChangeStatus::Modified));
    }

    #[test]
    fn test_operations_for_items() {
        let before = Schema::new().with_table(users());
        let mut changed = users().with_comment("people");
        changed.columns.shift_remove("email");
        let after = Schema::new().with_table(changed);

        let items = diff(&before, &after);
        assert_eq!(items.len(), 2);

        assert_eq!(
            items[0].forward_operation(),
            Operation::Add {
                path: "/tables/users/comment".into(),
                value: json!("people"),
            }
        );
        assert_eq!(
            items[0].revert_operation(),
            Operation::Remove {
                path: "/tables/users/comment".into(),
            }
        );
        assert_eq!(
            items[1].forward_operation(),
            Operation::Remove {
                path: "/tables/users/columns/email".into(),
            }
        );
        assert_eq!(
            items[1].revert_operation(),
            Operation::Add {
                path: "/tables/users/columns/email".into(),
                value: serde_json::to_value(Column::new("email", "varchar(255)").not_null()).unwrap(),
            }
        );
    }

    #[test]
    fn test_item_json_shape() {
        let item = DiffItem::ColumnAttribute {
            table: "users".into(),
            column: "id".into(),
            attribute: ColumnAttribute::NotNull(Change::between(Some(false), Some(true))),
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "target": "columnAttribute",
                "table": "users",
                "column": "id",
                "attribute": {
                    "attribute": "notNull",
                    "change": { "status": "modified", "before": false, "after": true }
                }
            })
        );
    }
}
