//! Parsed `schema.rb` calls to schema model

use super::parser::{Call, Value};
use schemaloom_core::{
    Column, Constraint, DefaultValue, Enum, ErrorCode, Extension, ForeignKeyAction,
    ForeignKeyConstraint, Index, Location, ProcessError, ProcessResult, Schema, Table,
};

/// Primary key type of `create_table` without an `id:` option
const DEFAULT_ID_TYPE: &str = "bigserial";

pub struct SchemaRbConverter {
    schema: Schema,
    errors: Vec<ProcessError>,
}

impl SchemaRbConverter {
    pub fn new() -> Self {
        Self {
            schema: Schema::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn_at(&mut self, line: usize, column: usize, code: ErrorCode, message: impl Into<String>) {
        let error = ProcessError::warning(code, message).with_location(Location::with_position(line, column));
        tracing::warn!(line, column, "{}", error.message);
        self.errors.push(error);
    }

    fn warn(&mut self, call: &Call, code: ErrorCode, message: impl Into<String>) {
        self.warn_at(call.line, call.column, code, message);
    }

    /// Convert top-level statements; a critical problem aborts the conversion
    pub fn convert(&mut self, calls: &[Call]) -> Result<(), ProcessError> {
        for call in calls {
            match call.name.as_str() {
                "create_table" => self.create_table(call)?,
                "add_foreign_key" => self.add_foreign_key(call),
                "add_check_constraint" => self.add_check_constraint(call)?,
                "add_index" => self.add_index(call),
                "create_enum" => self.create_enum(call),
                "enable_extension" => {
                    if let Some(name) = call.texts().first() {
                        self.schema.extensions.insert(name.to_string(), Extension::new(*name));
                    }
                }
                // `ActiveRecord::Schema.define do ... end` and other wrappers
                _ => {
                    if let Some(block) = &call.block {
                        self.convert(&block.body)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> ProcessResult<Schema> {
        ProcessResult::new(self.schema, self.errors)
    }

    fn create_table(&mut self, call: &Call) -> Result<(), ProcessError> {
        let Some(Value::Str(name)) = call.args.iter().find(|arg| matches!(arg, Value::Str(_))) else {
            self.warn(call, ErrorCode::UnexpectedToken, "Expected a string for the table name");
            return Ok(());
        };

        let mut table = Table::new(name.clone());
        if let Some(comment) = call.option("comment").and_then(Value::as_text) {
            table.comment = Some(comment.to_string());
        }

        // `primary_key: ["a", "b"]` names body columns instead of adding one
        let mut composite_key = Vec::new();
        let id_type = match call.option("id") {
            Some(Value::Bool(false)) => None,
            Some(value) => Some(value.as_text().unwrap_or(DEFAULT_ID_TYPE).to_string()),
            None => Some(DEFAULT_ID_TYPE.to_string()),
        };
        match call.option("primary_key") {
            Some(Value::Array(columns)) => {
                composite_key = columns.iter().filter_map(Value::as_text).map(str::to_string).collect();
            }
            primary_key => {
                if let Some(id_type) = id_type {
                    let id_name = primary_key.and_then(Value::as_text).unwrap_or("id");
                    table.columns.insert(id_name.to_string(), Column::new(id_name, id_type).primary_key());
                    table.add_constraint(Constraint::primary_key(
                        format!("PRIMARY_{}", id_name),
                        vec![id_name.to_string()],
                    ));
                }
            }
        }

        if let Some(block) = &call.block {
            let param = block.params.first().map(String::as_str).unwrap_or("t");
            for body_call in &block.body {
                if body_call.receiver.as_deref() != Some(param) {
                    continue;
                }
                match body_call.name.as_str() {
                    "index" => self.table_index(&mut table, body_call),
                    "check_constraint" => self.table_check(&mut table, body_call)?,
                    "timestamps" => {
                        for name in ["created_at", "updated_at"] {
                            table.columns.insert(name.to_string(), Column::new(name, "timestamp").not_null());
                        }
                    }
                    "references" | "belongs_to" => self.reference_column(&mut table, body_call),
                    _ => self.column(&mut table, body_call),
                }
            }
        }

        if !composite_key.is_empty() {
            for name in &composite_key {
                if let Some(column) = table.columns.get_mut(name) {
                    column.primary = true;
                    column.not_null = true;
                }
            }
            table.add_constraint(Constraint::primary_key(format!("{}_pkey", table.name), composite_key));
        }

        tracing::debug!(table = %table.name, columns = table.columns.len(), "converted create_table");
        self.schema.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// `t.<type> "name", null: false, default: ...`
    fn column(&mut self, table: &mut Table, call: &Call) {
        let Some(name) = call.texts().first().map(|name| name.to_string()) else {
            self.warn(
                call,
                ErrorCode::UnexpectedToken,
                format!("Column '{}' on table '{}' has no name", call.name, table.name),
            );
            return;
        };

        let column_type = match call.option("enum_type").and_then(Value::as_text) {
            Some(enum_type) => enum_type.to_string(),
            None => column_type(call),
        };
        let mut column = Column::new(name.clone(), column_type);

        if let Some(Value::Bool(false)) = call.option("null") {
            column.not_null = true;
        }
        if let Some(value) = call.option("default") {
            column.default = default_value(value);
        }
        if let Some(comment) = call.option("comment").and_then(Value::as_text) {
            column.comment = Some(comment.to_string());
        }
        if let Some(Value::Bool(true)) = call.option("unique") {
            column.unique = true;
            table.add_constraint(Constraint::unique(format!("UNIQUE_{}", name), vec![name.clone()]));
        }

        table.columns.insert(name, column);
    }

    /// `t.references "user"` adds `user_id`
    fn reference_column(&mut self, table: &mut Table, call: &Call) {
        let Some(reference) = call.texts().first().map(|name| name.to_string()) else {
            self.warn(call, ErrorCode::UnexpectedToken, "Reference has no name");
            return;
        };
        let column_type = call.option("type").and_then(Value::as_text).unwrap_or("bigint");
        let name = format!("{}_id", reference);
        let mut column = Column::new(name.clone(), convert_column_type(column_type));
        if let Some(Value::Bool(false)) = call.option("null") {
            column.not_null = true;
        }
        table.columns.insert(name, column);
    }

    /// `t.index ["a", "b"], name: "...", unique: true, using: :gin`
    fn table_index(&mut self, table: &mut Table, call: &Call) {
        let columns = index_columns(call.args.first());
        if columns.is_empty() {
            self.warn(
                call,
                ErrorCode::InvalidColumns,
                format!("Index on table '{}' has no columns", table.name),
            );
            return;
        }
        let index = build_index(&table.name, columns, call);

        if index.unique {
            if let [column] = index.columns.as_slice() {
                table.add_constraint(Constraint::unique(format!("UNIQUE_{}", column), vec![column.clone()]));
            }
        }
        table.indexes.insert(index.name.clone(), index);
    }

    /// `t.check_constraint "price > 0", name: "price_positive"`
    fn table_check(&mut self, table: &mut Table, call: &Call) -> Result<(), ProcessError> {
        let texts = call.texts();
        let [detail] = texts.as_slice() else {
            self.warn(
                call,
                ErrorCode::UnexpectedToken,
                format!("Check constraint on table '{}' must have exactly one detail string", table.name),
            );
            return Ok(());
        };
        let constraint = check_constraint(table, detail, call)?;
        table.add_constraint(constraint);
        Ok(())
    }

    /// `add_foreign_key "posts", "users", column: "author_id", on_delete: :cascade`
    fn add_foreign_key(&mut self, call: &Call) {
        let texts = call.texts();
        let [from, to] = texts.as_slice() else {
            self.warn(
                call,
                ErrorCode::UnexpectedToken,
                "Foreign key relationship must have two table names",
            );
            return;
        };

        let column = call
            .option("column")
            .and_then(Value::as_text)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_id", singularize(to)));
        let primary_key = call.option("primary_key").and_then(Value::as_text).unwrap_or("id");
        let name = call
            .option("name")
            .and_then(Value::as_text)
            .map(str::to_string)
            .unwrap_or_else(|| format!("fk_{}_{}", from, column));

        let foreign_key = ForeignKeyConstraint::new(name, vec![column], *to, vec![primary_key.to_string()])
            .on_update(referential_action(call.option("on_update")))
            .on_delete(referential_action(call.option("on_delete")));

        match self.schema.table_mut(from) {
            Some(table) => table.add_constraint(foreign_key.into()),
            None => self.warn(
                call,
                ErrorCode::UnknownTable,
                format!("Foreign key '{}' refers to unknown table '{}'", foreign_key.name, from),
            ),
        }
    }

    /// `add_check_constraint "products", "price > 0", name: "price_positive"`
    fn add_check_constraint(&mut self, call: &Call) -> Result<(), ProcessError> {
        let texts = call.texts();
        let [table_name, detail] = texts.as_slice() else {
            self.warn(
                call,
                ErrorCode::UnexpectedToken,
                "Check constraint must have one table name and its detail",
            );
            return Ok(());
        };

        let Some(table) = self.schema.tables.get_mut(*table_name) else {
            self.warn(
                call,
                ErrorCode::UnknownTable,
                format!("Check constraint refers to unknown table '{}'", table_name),
            );
            return Ok(());
        };
        let constraint = check_constraint(table, detail, call)?;
        table.add_constraint(constraint);
        Ok(())
    }

    /// `add_index "users", ["email"], unique: true`
    fn add_index(&mut self, call: &Call) {
        let Some(table_name) = call.args.first().and_then(Value::as_text).map(str::to_string) else {
            self.warn(call, ErrorCode::UnexpectedToken, "Expected a table name for add_index");
            return;
        };
        let columns = index_columns(call.args.get(1));
        if columns.is_empty() {
            self.warn(
                call,
                ErrorCode::InvalidColumns,
                format!("Index on table '{}' has no columns", table_name),
            );
            return;
        }

        let index = build_index(&table_name, columns, call);
        match self.schema.table_mut(&table_name) {
            Some(table) => {
                table.indexes.insert(index.name.clone(), index);
            }
            None => self.warn(
                call,
                ErrorCode::UnknownTable,
                format!("Index '{}' refers to unknown table '{}'", index.name, table_name),
            ),
        }
    }

    /// `create_enum "status", ["draft", "published"]`
    fn create_enum(&mut self, call: &Call) {
        let (Some(name), Some(Value::Array(values))) = (call.args.first().and_then(Value::as_text), call.args.get(1))
        else {
            self.warn(call, ErrorCode::UnexpectedToken, "Enum must have a name and a list of values");
            return;
        };
        let values = values.iter().filter_map(Value::as_text).map(str::to_string).collect();
        self.schema.enums.insert(name.to_string(), Enum::new(name, values));
    }
}

impl Default for SchemaRbConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rails type names that differ from their PostgreSQL spelling
pub fn convert_column_type(rails_type: &str) -> String {
    match rails_type {
        "string" => "varchar",
        "datetime" => "timestamp",
        "binary" => "bytea",
        "bit_varying" => "bit varying",
        other => other,
    }
    .to_string()
}

/// Column type with `limit:`, `precision:`/`scale:` and `array:` applied
fn column_type(call: &Call) -> String {
    let base = convert_column_type(&call.name);
    let number = |key: &str| match call.option(key) {
        Some(Value::Num(n)) => Some(n.clone()),
        _ => None,
    };

    let mut column_type = match base.as_str() {
        "varchar" | "char" | "bit" | "bit varying" => match number("limit") {
            Some(limit) => format!("{}({})", base, limit),
            None => base,
        },
        "decimal" | "numeric" => match (number("precision"), number("scale")) {
            (Some(precision), Some(scale)) => format!("{}({},{})", base, precision, scale),
            (Some(precision), None) => format!("{}({})", base, precision),
            _ => base,
        },
        _ => base,
    };
    if let Some(Value::Bool(true)) = call.option("array") {
        column_type.push_str("[]");
    }
    column_type
}

fn default_value(value: &Value) -> Option<DefaultValue> {
    match value {
        Value::Str(s) | Value::Symbol(s) => Some(DefaultValue::String(s.clone())),
        Value::Num(n) => Some(
            n.parse::<serde_json::Number>()
                .map(DefaultValue::Number)
                .unwrap_or_else(|_| DefaultValue::String(n.clone())),
        ),
        Value::Bool(b) => Some(DefaultValue::Boolean(*b)),
        // `-> { "now()" }` is an SQL expression
        Value::Lambda(body) => body.as_text().map(|sql| DefaultValue::String(sql.to_string())),
        _ => None,
    }
}

fn index_columns(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_text).map(str::to_string).collect(),
        Some(value) => value.as_text().map(|name| vec![name.to_string()]).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn build_index(table: &str, columns: Vec<String>, call: &Call) -> Index {
    let name = call
        .option("name")
        .and_then(Value::as_text)
        .map(str::to_string)
        .unwrap_or_else(|| format!("index_{}_on_{}", table, columns.join("_and_")));
    let mut index = Index::new(name, columns);
    if let Some(Value::Bool(true)) = call.option("unique") {
        index = index.unique();
    }
    if let Some(using) = call.option("using").and_then(Value::as_text) {
        index = index.with_type(using);
    }
    index
}

fn check_constraint(table: &Table, detail: &str, call: &Call) -> Result<Constraint, ProcessError> {
    if detail.trim().is_empty() {
        return Err(ProcessError::critical(
            ErrorCode::EmptyCheckDetail,
            format!("Check constraint on table '{}' has an empty definition", table.name),
        )
        .with_location(Location::with_position(call.line, call.column)));
    }

    let name = match call.option("name").and_then(Value::as_text) {
        Some(name) => name.to_string(),
        None => unnamed_check(table),
    };
    Ok(Constraint::check(name, detail))
}

/// `{table}_check`, then `{table}_check1`, `{table}_check2`, ...
fn unnamed_check(table: &Table) -> String {
    let base = format!("{}_check", table.name);
    let mut name = base.clone();
    let mut suffix = 1;
    while table.constraints.contains_key(&name) {
        name = format!("{}{}", base, suffix);
        suffix += 1;
    }
    name
}

/// `:cascade`, `:restrict` and `:nullify`; anything else is no action
fn referential_action(value: Option<&Value>) -> ForeignKeyAction {
    match value.and_then(Value::as_text) {
        Some("cascade") => ForeignKeyAction::Cascade,
        Some("restrict") => ForeignKeyAction::Restrict,
        Some("nullify") => ForeignKeyAction::SetNull,
        _ => ForeignKeyAction::NoAction,
    }
}

/// English singular of a table name, for default foreign key columns
pub fn singularize(word: &str) -> String {
    const IRREGULAR: &[(&str, &str)] = &[
        ("people", "person"),
        ("children", "child"),
        ("women", "woman"),
        ("men", "man"),
        ("mice", "mouse"),
        ("data", "datum"),
    ];
    for (plural, singular) in IRREGULAR {
        if let Some(stem) = word.strip_suffix(plural) {
            return format!("{}{}", stem, singular);
        }
    }

    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["sses", "uses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') && !stem.ends_with('u') => stem.to_string(),
        _ => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_convert_column_type() {
        assert_eq!(convert_column_type("string"), "varchar");
        assert_eq!(convert_column_type("datetime"), "timestamp");
        assert_eq!(convert_column_type("binary"), "bytea");
        assert_eq!(convert_column_type("bit_varying"), "bit varying");
        assert_eq!(convert_column_type("jsonb"), "jsonb");
        assert_eq!(convert_column_type("timestamptz"), "timestamptz");
        assert_eq!(convert_column_type("String"), "String");
        assert_eq!(convert_column_type("my_enum"), "my_enum");
        assert_eq!(convert_column_type(""), "");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("branches"), "branch");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("sales_people"), "sales_person");
        assert_eq!(singularize("statuses"), "status");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("glass"), "glass");
        assert_eq!(singularize("sheep"), "sheep");
    }

    #[test]
    fn test_unnamed_checks_get_distinct_names() {
        let table = Table::new("items").with_constraint(Constraint::check("items_check", "a > 0"));
        assert_eq!(unnamed_check(&table), "items_check1");
        assert_eq!(unnamed_check(&Table::new("items")), "items_check");
    }
}
