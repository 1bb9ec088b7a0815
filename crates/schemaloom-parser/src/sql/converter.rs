//! sqlparser AST to canonical schema
//!
//! Statements are applied one by one to a growing [`Schema`]. Constructs the
//! model cannot hold are skipped; constructs that refer to missing tables are
//! reported as warnings.

use schemaloom_core::{
    Column, Constraint, DefaultValue, ErrorCode, Extension, ForeignKeyAction,
    ForeignKeyConstraint, Index, Location, ProcessError, ProcessResult, Schema, Table,
};
use sqlparser::ast::{
    AlterTableOperation, ColumnDef, ColumnOption, ColumnOptionDef, CommentDef, CommentObject,
    CreateIndex, CreateTable, DataType, Expr, Ident, ObjectName, ReferentialAction, Statement,
    TableConstraint, UnaryOperator, Value,
};

/// Accumulates a schema from parsed statements
#[derive(Debug, Default)]
pub(crate) struct DdlConverter {
    schema: Schema,
    errors: Vec<ProcessError>,
    line: usize,
}

impl DdlConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source line that subsequent errors are reported at
    pub fn at_line(&mut self, line: usize) {
        self.line = line;
    }

    pub fn warn(&mut self, code: ErrorCode, message: impl Into<String>) {
        let error = ProcessError::warning(code, message).with_location(Location::line(self.line));
        tracing::warn!(line = self.line, "{}", error.message);
        self.errors.push(error);
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn convert(&mut self, statement: &Statement) {
        match statement {
            Statement::CreateTable(create) => self.create_table(create),
            Statement::CreateIndex(create) => self.create_index(create),
            Statement::AlterTable {
                name, operations, ..
            } => self.alter_table(name, operations),
            Statement::Comment {
                object_type,
                object_name,
                comment,
                ..
            } => self.comment(object_type, object_name, comment.clone()),
            Statement::CreateExtension { name, .. } => {
                self.schema
                    .extensions
                    .insert(name.value.clone(), Extension::new(name.value.clone()));
            }
            _ => {
                tracing::debug!(line = self.line, "skipping statement without schema effect");
            }
        }
    }

    /// Finish conversion, resolving foreign keys declared without target columns
    pub fn finish(mut self) -> ProcessResult<Schema> {
        resolve_implicit_references(&mut self.schema);
        ProcessResult::new(self.schema, self.errors)
    }

    fn create_table(&mut self, create: &CreateTable) {
        let table_name = object_name(&create.name);
        let mut table = Table::new(&table_name);

        for column in &create.columns {
            apply_column(&mut table, column);
        }
        for constraint in &create.constraints {
            if let Err(message) = apply_table_constraint(&mut table, constraint) {
                self.warn(ErrorCode::UnsupportedConstruct, message);
            }
        }
        if let Some(comment) = &create.comment {
            table.comment = Some(comment_text(comment));
        }

        tracing::debug!(table = %table_name, columns = table.columns.len(), "parsed table");
        self.schema.tables.insert(table_name, table);
    }

    fn create_index(&mut self, create: &CreateIndex) {
        let table_name = object_name(&create.table_name);
        let columns: Vec<String> = create.columns.iter().map(|c| expr_name(&c.expr)).collect();
        let name = create
            .name
            .as_ref()
            .map(object_name)
            .unwrap_or_else(|| format!("{}_{}_idx", table_name, columns.join("_")));

        let mut index = Index::new(&name, columns);
        index.unique = create.unique;
        if let Some(using) = &create.using {
            index.index_type = using.value.to_lowercase();
        }

        match self.schema.tables.get_mut(&table_name) {
            Some(table) => {
                table.indexes.insert(name, index);
            }
            None => self.warn(
                ErrorCode::UnknownTable,
                format!("Index '{}' refers to unknown table '{}'", name, table_name),
            ),
        }
    }

    fn alter_table(&mut self, name: &ObjectName, operations: &[AlterTableOperation]) {
        let table_name = object_name(name);
        let Some(table) = self.schema.tables.get_mut(&table_name) else {
            self.warn(
                ErrorCode::UnknownTable,
                format!("ALTER TABLE refers to unknown table '{}'", table_name),
            );
            return;
        };

        let mut unsupported = Vec::new();
        for operation in operations {
            match operation {
                AlterTableOperation::AddConstraint(constraint) => {
                    if let Err(message) = apply_table_constraint(table, constraint) {
                        unsupported.push(message);
                    }
                }
                AlterTableOperation::AddColumn { column_def, .. } => {
                    apply_column(table, column_def);
                }
                _ => {
                    tracing::debug!(table = %table_name, "skipping ALTER TABLE operation");
                }
            }
        }

        for message in unsupported {
            self.warn(ErrorCode::UnsupportedConstruct, message);
        }
    }

    fn comment(&mut self, object_type: &CommentObject, object_name: &ObjectName, comment: Option<String>) {
        let parts: Vec<&str> = object_name.0.iter().map(|i| i.value.as_str()).collect();

        match object_type {
            CommentObject::Table => {
                let Some(table_name) = parts.last() else { return };
                match self.schema.tables.get_mut(*table_name) {
                    Some(table) => table.comment = comment,
                    None => self.warn(
                        ErrorCode::UnknownTable,
                        format!("COMMENT ON TABLE refers to unknown table '{}'", table_name),
                    ),
                }
            }
            CommentObject::Column => {
                let [.., table_name, column_name] = parts.as_slice() else {
                    self.warn(
                        ErrorCode::UnexpectedToken,
                        format!("COMMENT ON COLUMN needs a table-qualified column: '{}'", object_name),
                    );
                    return;
                };
                let column = self
                    .schema
                    .tables
                    .get_mut(*table_name)
                    .and_then(|t| t.columns.get_mut(*column_name));
                match column {
                    Some(column) => column.comment = comment,
                    None => self.warn(
                        ErrorCode::UnknownTable,
                        format!("COMMENT ON COLUMN refers to unknown column '{}.{}'", table_name, column_name),
                    ),
                }
            }
            _ => {}
        }
    }
}

/// Add a column definition, with its inline constraints, to a table
pub(crate) fn apply_column(table: &mut Table, def: &ColumnDef) {
    let name = def.name.value.clone();
    let mut column = Column::new(&name, column_type(&def.data_type));

    for ColumnOptionDef { name: constraint_name, option } in &def.options {
        let constraint_name = constraint_name.as_ref().map(|i| i.value.clone());

        match option {
            ColumnOption::NotNull => column.not_null = true,
            ColumnOption::Null => column.not_null = false,
            ColumnOption::Default(expr) => column.default = Some(default_value(expr)),
            ColumnOption::Unique { is_primary: true, .. } => {
                column.primary = true;
                column.not_null = true;
                table.add_constraint(Constraint::primary_key(
                    constraint_name.unwrap_or_else(|| format!("PRIMARY_{}", name)),
                    vec![name.clone()],
                ));
            }
            ColumnOption::Unique { is_primary: false, .. } => {
                column.unique = true;
                table.add_constraint(Constraint::unique(
                    constraint_name.unwrap_or_else(|| format!("UNIQUE_{}", name)),
                    vec![name.clone()],
                ));
            }
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => {
                let fk = ForeignKeyConstraint::new(
                    constraint_name.unwrap_or_else(|| format!("{}_{}_fkey", table.name, name)),
                    vec![name.clone()],
                    object_name(foreign_table),
                    idents(referred_columns),
                )
                .on_update(referential_action(on_update))
                .on_delete(referential_action(on_delete));
                table.add_constraint(fk.into());
            }
            ColumnOption::Check(expr) => {
                let detail = expr.to_string();
                column.check = Some(detail.clone());
                table.add_constraint(Constraint::check(
                    constraint_name.unwrap_or_else(|| format!("CHECK_{}", name)),
                    detail,
                ));
            }
            ColumnOption::Comment(text) => column.comment = Some(text.clone()),
            ColumnOption::DialectSpecific(tokens)
                if tokens
                    .iter()
                    .any(|t| t.to_string().eq_ignore_ascii_case("AUTO_INCREMENT")) =>
            {
                column.default = Some(DefaultValue::from("autoincrement()"));
            }
            _ => {}
        }
    }

    table.columns.insert(name, column);
}

/// Add a table-level constraint; returns a message for constructs the model cannot hold
pub(crate) fn apply_table_constraint(
    table: &mut Table,
    constraint: &TableConstraint,
) -> Result<(), String> {
    match constraint {
        TableConstraint::PrimaryKey { name, columns, .. } => {
            let columns = idents(columns);
            for column_name in &columns {
                if let Some(column) = table.columns.get_mut(column_name) {
                    column.not_null = true;
                    if columns.len() == 1 {
                        column.primary = true;
                    }
                }
            }
            let name = ident_or(name, || format!("{}_pkey", table.name));
            table.add_constraint(Constraint::primary_key(name, columns));
        }
        TableConstraint::Unique { name, columns, .. } => {
            let columns = idents(columns);
            if let [only] = columns.as_slice() {
                if let Some(column) = table.columns.get_mut(only) {
                    column.unique = true;
                }
            }
            let name = ident_or(name, || format!("{}_{}_key", table.name, columns.join("_")));
            table.add_constraint(Constraint::unique(name, columns));
        }
        TableConstraint::ForeignKey {
            name,
            columns,
            foreign_table,
            referred_columns,
            on_delete,
            on_update,
            ..
        } => {
            let columns = idents(columns);
            let name = ident_or(name, || format!("{}_{}_fkey", table.name, columns.join("_")));
            let fk = ForeignKeyConstraint::new(
                name,
                columns,
                object_name(foreign_table),
                idents(referred_columns),
            )
            .on_update(referential_action(on_update))
            .on_delete(referential_action(on_delete));
            table.add_constraint(fk.into());
        }
        TableConstraint::Check { name, expr } => {
            let name = ident_or(name, || next_check_name(table));
            table.add_constraint(Constraint::check(name, expr.to_string()));
        }
        TableConstraint::Index {
            name,
            index_type,
            columns,
            ..
        } => {
            let columns = idents(columns);
            let name = ident_or(name, || format!("{}_{}_idx", table.name, columns.join("_")));
            let mut index = Index::new(&name, columns);
            if let Some(index_type) = index_type {
                index.index_type = index_type.to_string().to_lowercase();
            }
            table.indexes.insert(name, index);
        }
        other => {
            return Err(format!(
                "Unsupported constraint on table '{}': {}",
                table.name, other
            ))
        }
    }

    Ok(())
}

/// Fill `REFERENCES t` (no column list) with the target table's primary key
fn resolve_implicit_references(schema: &mut Schema) {
    let primary_keys: Vec<(String, Vec<String>)> = schema
        .tables
        .values()
        .filter_map(|table| {
            table.constraints.values().find_map(|c| match c {
                Constraint::PrimaryKey(pk) => Some((table.name.clone(), pk.column_names.clone())),
                _ => None,
            })
        })
        .collect();

    for table in schema.tables.values_mut() {
        for constraint in table.constraints.values_mut() {
            if let Constraint::ForeignKey(fk) = constraint {
                if fk.target_column_names.is_empty() {
                    if let Some((_, columns)) =
                        primary_keys.iter().find(|(name, _)| *name == fk.target_table_name)
                    {
                        fk.target_column_names = columns.clone();
                    }
                }
            }
        }
    }
}

fn next_check_name(table: &Table) -> String {
    let base = format!("{}_check", table.name);
    if !table.constraints.contains_key(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !table.constraints.contains_key(candidate))
        .unwrap_or(base)
}

/// Unqualified, unquoted object name (`public."users"` -> `users`)
pub(crate) fn object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

fn idents(idents: &[Ident]) -> Vec<String> {
    idents.iter().map(|i| i.value.clone()).collect()
}

fn ident_or(name: &Option<Ident>, fallback: impl FnOnce() -> String) -> String {
    name.as_ref().map(|i| i.value.clone()).unwrap_or_else(fallback)
}

fn expr_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|i| i.value.clone())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

fn referential_action(action: &Option<ReferentialAction>) -> ForeignKeyAction {
    action
        .as_ref()
        .map(|a| ForeignKeyAction::parse(&a.to_string()))
        .unwrap_or_default()
}

fn comment_text(comment: &CommentDef) -> String {
    match comment {
        CommentDef::WithEq(text)
        | CommentDef::WithoutEq(text)
        | CommentDef::AfterColumnDefsWithoutEq(text) => text.clone(),
    }
}

/// Type text as written: builtin types lowercased, user types verbatim
fn column_type(data_type: &DataType) -> String {
    match data_type {
        DataType::Custom(name, modifiers) if modifiers.is_empty() => object_name(name),
        DataType::Custom(..) | DataType::Enum(..) => data_type.to_string(),
        other => other.to_string().to_lowercase(),
    }
}

/// Literal defaults keep their kind; any other expression is kept as SQL text
fn default_value(expr: &Expr) -> DefaultValue {
    match expr {
        Expr::Value(Value::SingleQuotedString(s)) => DefaultValue::String(s.clone()),
        Expr::Value(Value::Boolean(b)) => DefaultValue::Boolean(*b),
        Expr::Value(Value::Number(n, _)) => number_or_text(n),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: inner,
        } => match inner.as_ref() {
            Expr::Value(Value::Number(n, _)) => number_or_text(&format!("-{}", n)),
            _ => DefaultValue::String(expr.to_string()),
        },
        Expr::Nested(inner) => default_value(inner),
        Expr::Cast { expr: inner, .. } => match inner.as_ref() {
            Expr::Value(_) => default_value(inner),
            _ => DefaultValue::String(expr.to_string()),
        },
        other => DefaultValue::String(other.to_string()),
    }
}

fn number_or_text(text: &str) -> DefaultValue {
    text.parse::<serde_json::Number>()
        .map(DefaultValue::Number)
        .unwrap_or_else(|_| DefaultValue::String(text.to_string()))
}
