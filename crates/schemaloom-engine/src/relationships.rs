//! Relationship derivation
//!
//! Relationships are never stored in a [`schemaloom_core::Schema`]; they are
//! recomputed from FOREIGN KEY and INTERLEAVE constraints whenever needed.

use indexmap::IndexMap;
use schemaloom_core::{
    Cardinality, CollisionPolicy, Constraint, ErrorCode, ProcessError, Relationship, Table, Tables,
};

pub type Relationships = IndexMap<String, Relationship>;

/// One relationship per foreign-key-like constraint, keyed by constraint name.
///
/// When two constraints share a name the later one wins.
pub fn derive_relationships(tables: &Tables) -> Relationships {
    derive_relationships_with(tables, CollisionPolicy::LastWins).0
}

/// Like [`derive_relationships`], reporting name collisions under
/// [`CollisionPolicy::Warn`]
pub fn derive_relationships_with(
    tables: &Tables,
    policy: CollisionPolicy,
) -> (Relationships, Vec<ProcessError>) {
    let mut relationships = Relationships::new();
    let mut errors = Vec::new();

    for table in tables.values() {
        for constraint in table.constraints.values() {
            let Some(relationship) = relationship_for(table, constraint) else {
                continue;
            };

            if let Some(previous) = relationships.get(&relationship.name) {
                let message = format!(
                    "Relationship '{}' from table '{}' replaces the one from table '{}'",
                    relationship.name, relationship.foreign_table_name, previous.foreign_table_name
                );
                tracing::warn!(relationship = %relationship.name, "{}", message);
                if policy == CollisionPolicy::Warn {
                    errors.push(ProcessError::warning(
                        ErrorCode::RelationshipNameCollision,
                        message,
                    ));
                }
            }

            relationships.insert(relationship.name.clone(), relationship);
        }
    }

    (relationships, errors)
}

fn relationship_for(table: &Table, constraint: &Constraint) -> Option<Relationship> {
    let (name, column, target_table, target_column, update, delete) = match constraint {
        Constraint::ForeignKey(fk) => (
            &fk.name,
            fk.column_names.first()?,
            &fk.target_table_name,
            fk.target_column_names.first()?,
            fk.update_constraint,
            fk.delete_constraint,
        ),
        Constraint::Interleave(il) => (
            &il.name,
            &il.column_name,
            &il.target_table_name,
            &il.target_column_name,
            il.update_constraint,
            il.delete_constraint,
        ),
        _ => return None,
    };

    let cardinality = if table.has_unique_constraint_on(column) {
        Cardinality::OneToOne
    } else {
        Cardinality::OneToMany
    };

    Some(Relationship {
        name: name.clone(),
        primary_table_name: target_table.clone(),
        primary_column_name: target_column.clone(),
        foreign_table_name: table.name.clone(),
        foreign_column_name: column.clone(),
        cardinality,
        update_constraint: update,
        delete_constraint: delete,
    })
}
