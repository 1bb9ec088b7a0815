//! Drizzle declarations to canonical schema

use super::ast::{CallChain, Declaration, Expr};
use super::dialect::DialectStrategy;
use schemaloom_core::{
    Column, Constraint, DefaultValue, Enum, ErrorCode, ForeignKeyAction, ForeignKeyConstraint,
    Index, Location, ProcessError, ProcessResult, Schema, Table,
};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Property name to column name, per table
pub type PropertyColumns = HashMap<String, HashMap<String, String>>;

/// The table-declaring call inside a declaration
struct TableCall<'a> {
    name: &'a str,
    columns: &'a Expr,
    extra: Option<&'a Expr>,
    comment: Option<&'a str>,
}

pub(crate) struct DrizzleConverter<'s> {
    strategy: &'s DialectStrategy,
    schema: Schema,
    errors: Vec<ProcessError>,
    /// Enum variable to enum name
    enum_vars: HashMap<String, String>,
    /// Table variable to table name
    table_vars: HashMap<String, String>,
    property_columns: PropertyColumns,
    line: usize,
}

impl<'s> DrizzleConverter<'s> {
    pub fn new(strategy: &'s DialectStrategy) -> Self {
        Self {
            strategy,
            schema: Schema::new(),
            errors: Vec::new(),
            enum_vars: HashMap::new(),
            table_vars: HashMap::new(),
            property_columns: HashMap::new(),
            line: 1,
        }
    }

    pub fn warn_at(&mut self, line: usize, code: ErrorCode, message: impl Into<String>) {
        let error = ProcessError::warning(code, message).with_location(Location::line(line));
        tracing::warn!(line, "{}", error.message);
        self.errors.push(error);
    }

    fn warn(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.warn_at(self.line, code, message);
    }

    pub fn convert(&mut self, declarations: &[Declaration]) {
        // Tables may reference enums and tables declared after them
        for declaration in declarations {
            self.collect_enum(declaration);
            if let Some(call) = self.table_call(&declaration.init) {
                self.table_vars
                    .insert(declaration.name.clone(), call.name.to_string());
            }
        }

        for declaration in declarations {
            self.line = declaration.line;
            if let Some(call) = self.table_call(&declaration.init) {
                self.convert_table(&call);
            }
        }
    }

    pub fn finish(mut self) -> ProcessResult<Schema> {
        resolve_foreign_key_targets(&mut self.schema, &self.property_columns);
        ProcessResult::new(self.schema, self.errors)
    }

    fn collect_enum(&mut self, declaration: &Declaration) {
        let Some(chain) = declaration.init.call_chain() else {
            return;
        };
        if chain.base != self.strategy.enum_function || chain.base_object.is_some() {
            return;
        }
        if let Some(enum_type) = enum_definition(chain.base_args) {
            self.enum_vars
                .insert(declaration.name.clone(), enum_type.name.clone());
            self.schema.enums.insert(enum_type.name.clone(), enum_type);
        }
    }

    fn table_call<'a>(&self, expr: &'a Expr) -> Option<TableCall<'a>> {
        let chain = expr.call_chain()?;

        let (args, methods) = if chain.base_object.is_none() && self.strategy.is_table_function(chain.base) {
            (chain.base_args, &chain.methods[..])
        } else if chain.base_object.is_some() && chain.base == "table" {
            // schema.table('name', {...})
            (chain.base_args, &chain.methods[..])
        } else if matches!(chain.base, "pgSchema" | "mysqlSchema")
            && chain.methods.first().map(|(name, _)| *name) == Some("table")
        {
            (chain.methods[0].1, &chain.methods[1..])
        } else {
            return None;
        };

        let name = args.first()?.as_str()?;
        let columns = args.get(1)?;
        let comment = methods
            .iter()
            .find(|(method, _)| *method == "$comment")
            .and_then(|&(_, args)| args.first())
            .and_then(Expr::as_str);

        Some(TableCall {
            name,
            columns,
            extra: args.get(2),
            comment,
        })
    }

    fn convert_table(&mut self, call: &TableCall<'_>) {
        let mut table = Table::new(call.name);
        table.comment = call.comment.map(str::to_string);
        let mut properties = HashMap::new();

        let Expr::Object(props) = call.columns else {
            self.warn(
                ErrorCode::UnsupportedConstruct,
                format!("Columns of table '{}' are not an object literal", call.name),
            );
            return;
        };

        for (property, value) in props {
            match value.call_chain() {
                Some(chain) => {
                    let column_name = self.convert_column(&mut table, property, &chain);
                    properties.insert(property.clone(), column_name);
                }
                None => self.warn(
                    ErrorCode::UnsupportedConstruct,
                    format!("Column '{}.{}' is not a column builder call", call.name, property),
                ),
            }
        }

        if let Some(extra) = call.extra {
            let param = match extra {
                Expr::Arrow { params, .. } => params.first().map(String::as_str),
                _ => None,
            };
            let entries: Vec<(Option<&str>, &Expr)> = match extra.arrow_body() {
                Expr::Object(props) => props.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
                Expr::Array(items) => items.iter().map(|v| (None, v)).collect(),
                _ => Vec::new(),
            };
            for (key, expr) in entries {
                self.convert_table_entry(&mut table, &properties, param, key, expr);
            }
        }

        tracing::debug!(table = %table.name, columns = table.columns.len(), "parsed drizzle table");
        self.property_columns.insert(table.name.clone(), properties);
        self.schema.tables.insert(table.name.clone(), table);
    }

    /// Add one column to `table`; returns the column's name
    fn convert_column(&mut self, table: &mut Table, property: &str, chain: &CallChain<'_>) -> String {
        let name = chain
            .base_args
            .first()
            .and_then(Expr::as_str)
            .unwrap_or(property)
            .to_string();
        let options = chain.base_args.iter().find(|a| matches!(a, Expr::Object(_)));

        let column_type = if let Some(enum_name) = self.enum_vars.get(chain.base) {
            enum_name.clone()
        } else if self.strategy.supports_inline_enums && chain.base == self.strategy.enum_function {
            match enum_definition(chain.base_args) {
                Some(enum_type) => {
                    let enum_name = enum_type.name.clone();
                    self.schema.enums.insert(enum_name.clone(), enum_type);
                    enum_name
                }
                None => chain.base.to_string(),
            }
        } else {
            self.strategy.convert_type(chain.base, options)
        };

        let mut column = Column::new(&name, column_type);
        let mut unique_name = None;
        let mut has_autoincrement = false;

        for (method, args) in &chain.methods {
            match *method {
                "primaryKey" => {
                    column.primary = true;
                    column.not_null = true;
                }
                "notNull" => column.not_null = true,
                "unique" => {
                    column.unique = true;
                    unique_name = args.first().and_then(Expr::as_str).map(str::to_string);
                }
                "default" => column.default = args.first().and_then(default_value),
                "defaultNow" => column.default = Some(DefaultValue::from("now()")),
                "defaultRandom" => column.default = Some(DefaultValue::from("gen_random_uuid()")),
                "$comment" => {
                    if let Some(comment) = args.first().and_then(Expr::as_str) {
                        column.comment = Some(comment.to_string());
                    }
                }
                "references" => {
                    if let Some(fk) = self.reference(&table.name, &name, args) {
                        table.add_constraint(fk.into());
                    }
                }
                "autoincrement" if self.strategy.dialect_methods => has_autoincrement = true,
                "$defaultFn" | "$default" if self.strategy.dialect_methods => {
                    column.default = Some(DefaultValue::String(runtime_default(args)));
                }
                "$onUpdate" | "$onUpdateFn" | "onUpdateNow" | "$type" => {}
                other => {
                    tracing::debug!(column = %name, method = other, "ignoring column method");
                }
            }
        }

        if column.default.is_none()
            && self
                .strategy
                .is_auto_increment(chain.base, column.primary, has_autoincrement)
        {
            column.default = Some(DefaultValue::from("autoincrement()"));
        }

        if column.primary {
            table.add_constraint(Constraint::primary_key(
                format!("PRIMARY_{}", name),
                vec![name.clone()],
            ));
            let index_name = format!("{}_pkey", table.name);
            table.indexes.insert(
                index_name.clone(),
                Index::new(index_name, vec![name.clone()]).unique(),
            );
        } else if column.unique {
            table.add_constraint(Constraint::unique(
                unique_name.unwrap_or_else(|| format!("UNIQUE_{}", name)),
                vec![name.clone()],
            ));
        }

        table.columns.insert(name.clone(), column);
        name
    }

    /// `.references(() => users.id, { onDelete: 'cascade' })`
    fn reference(&mut self, table_name: &str, column_name: &str, args: &[Expr]) -> Option<ForeignKeyConstraint> {
        let target = args.first()?.arrow_body();
        let Some((target_var, target_property)) = target.column_ref() else {
            self.warn(
                ErrorCode::InvalidRelation,
                format!("Reference on '{}.{}' is not a column reference", table_name, column_name),
            );
            return None;
        };

        let target_table = self
            .table_vars
            .get(target_var)
            .cloned()
            .unwrap_or_else(|| target_var.to_string());
        let options = args.get(1);

        let fk = ForeignKeyConstraint::new(
            format!("{}_{}_{}_{}_fk", table_name, column_name, target_var, target_property),
            vec![column_name.to_string()],
            target_table,
            vec![target_property.to_string()],
        )
        .on_update(action_option(options, "onUpdate"))
        .on_delete(action_option(options, "onDelete"));

        Some(fk)
    }

    fn convert_table_entry(
        &mut self,
        table: &mut Table,
        properties: &HashMap<String, String>,
        param: Option<&str>,
        key: Option<&str>,
        expr: &Expr,
    ) {
        let Some(chain) = expr.call_chain() else {
            self.warn(
                ErrorCode::UnsupportedConstruct,
                format!("Unsupported entry in the definition of table '{}'", table.name),
            );
            return;
        };
        let column_names = |refs: &[Expr]| -> Vec<String> {
            refs.iter()
                .filter_map(Expr::column_ref)
                .map(|(_, property)| {
                    properties
                        .get(property)
                        .cloned()
                        .unwrap_or_else(|| property.to_string())
                })
                .collect()
        };
        let method_args = |name: &str| {
            chain
                .methods
                .iter()
                .find(|(method, _)| *method == name)
                .map(|(_, args)| *args)
        };
        let explicit_name = chain.base_args.first().and_then(Expr::as_str);

        match chain.base {
            "primaryKey" => {
                let (columns, name) = match chain.base_args.first() {
                    Some(config @ Expr::Object(_)) => (
                        match config.get("columns") {
                            Some(Expr::Array(refs)) => column_names(refs),
                            _ => Vec::new(),
                        },
                        config.get("name").and_then(Expr::as_str),
                    ),
                    _ => (column_names(chain.base_args), None),
                };
                if columns.is_empty() {
                    self.warn(
                        ErrorCode::InvalidColumns,
                        format!("Primary key of table '{}' names no columns", table.name),
                    );
                    return;
                }

                for column_name in &columns {
                    if let Some(column) = table.columns.get_mut(column_name) {
                        column.not_null = true;
                        column.primary = columns.len() == 1;
                    }
                }
                let name = name
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_pkey", table.name));
                table.add_constraint(Constraint::primary_key(&name, columns.clone()));
                table
                    .indexes
                    .insert(name.clone(), Index::new(name, columns).unique());
            }
            "index" | "uniqueIndex" => {
                let mut columns = method_args("on").map(column_names).unwrap_or_default();
                let mut index_type = String::new();
                if let Some(args) = method_args("using") {
                    if let Some(method) = args.first().and_then(Expr::as_str) {
                        index_type = method.to_string();
                    }
                    columns.extend(column_names(args.get(1..).unwrap_or_default()));
                }

                let name = explicit_name
                    .or(key)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_{}_index", table.name, columns.join("_")));
                let mut index = Index::new(&name, columns).with_type(index_type);
                index.unique = chain.base == "uniqueIndex";
                table.indexes.insert(name, index);
            }
            "unique" | "check" if !self.strategy.supports_check_constraints => {
                self.warn(
                    ErrorCode::UnsupportedConstruct,
                    format!(
                        "{}() constraints on table '{}' are not supported for this dialect",
                        chain.base, table.name
                    ),
                );
            }
            "unique" => {
                let columns = method_args("on").map(column_names).unwrap_or_default();
                if columns.is_empty() {
                    self.warn(
                        ErrorCode::InvalidColumns,
                        format!("Unique constraint on table '{}' names no columns", table.name),
                    );
                    return;
                }
                if let [only] = columns.as_slice() {
                    if let Some(column) = table.columns.get_mut(only) {
                        column.unique = true;
                    }
                }
                let name = explicit_name
                    .or(key)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_{}_unique", table.name, columns.join("_")));
                table.add_constraint(Constraint::unique(name, columns));
            }
            "check" => {
                let name = explicit_name
                    .or(key)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_check", table.name));
                let detail = chain
                    .base_args
                    .get(1)
                    .and_then(sql_text)
                    .map(|text| interpolate_columns(&text, param, properties))
                    .unwrap_or_else(|| "true".to_string());
                table.add_constraint(Constraint::check(name, detail));
            }
            "foreignKey" => self.convert_foreign_key(table, &chain, param, key, &column_names),
            other => self.warn(
                ErrorCode::UnsupportedConstruct,
                format!("Unsupported '{}' in the definition of table '{}'", other, table.name),
            ),
        }
    }

    /// `foreignKey({ columns: [t.a], foreignColumns: [other.id], name })`
    fn convert_foreign_key(
        &mut self,
        table: &mut Table,
        chain: &CallChain<'_>,
        param: Option<&str>,
        key: Option<&str>,
        column_names: &dyn Fn(&[Expr]) -> Vec<String>,
    ) {
        let Some(config) = chain.base_args.first() else {
            return;
        };
        let columns = match config.get("columns") {
            Some(Expr::Array(refs)) => column_names(refs),
            _ => Vec::new(),
        };
        let targets: Vec<(&str, &str)> = match config.get("foreignColumns") {
            Some(Expr::Array(refs)) => refs.iter().filter_map(Expr::column_ref).collect(),
            _ => Vec::new(),
        };
        let Some((target_var, _)) = targets.first().copied() else {
            self.warn(
                ErrorCode::InvalidRelation,
                format!("Foreign key on table '{}' has no foreign columns", table.name),
            );
            return;
        };
        if columns.len() != targets.len() {
            self.warn(
                ErrorCode::InvalidColumns,
                format!(
                    "Foreign key on table '{}' has {} columns but {} foreign columns",
                    table.name,
                    columns.len(),
                    targets.len()
                ),
            );
            return;
        }

        let target_table = match self.table_vars.get(target_var) {
            Some(name) => name.clone(),
            None if Some(target_var) == param => table.name.clone(),
            None => target_var.to_string(),
        };
        let target_properties: Vec<String> = targets.iter().map(|(_, p)| p.to_string()).collect();

        let name = config
            .get("name")
            .and_then(Expr::as_str)
            .or(key)
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}_{}_{}_{}_fk",
                    table.name,
                    columns.join("_"),
                    target_table,
                    target_properties.join("_")
                )
            });

        let action = |method: &str| {
            chain
                .methods
                .iter()
                .find(|(m, _)| *m == method)
                .and_then(|(_, args)| args.first())
                .and_then(Expr::as_str)
                .map(ForeignKeyAction::parse)
                .unwrap_or_default()
        };

        let fk = ForeignKeyConstraint::new(name, columns, target_table, target_properties)
            .on_update(action("onUpdate"))
            .on_delete(action("onDelete"));
        table.add_constraint(fk.into());
    }
}

/// Rewrite foreign key target columns from property names to column names.
///
/// Targets are recorded by property name while tables are converted, since
/// the target table may not have been seen yet. Names without a mapping are
/// kept as written.
pub fn resolve_foreign_key_targets(schema: &mut Schema, property_columns: &PropertyColumns) {
    for table in schema.tables.values_mut() {
        for constraint in table.constraints.values_mut() {
            let Constraint::ForeignKey(fk) = constraint else {
                continue;
            };
            let Some(properties) = property_columns.get(&fk.target_table_name) else {
                continue;
            };
            for target in fk.target_column_names.iter_mut() {
                if let Some(column_name) = properties.get(target.as_str()) {
                    *target = column_name.clone();
                }
            }
        }
    }
}

/// `('name', ['a', 'b'])`
fn enum_definition(args: &[Expr]) -> Option<Enum> {
    let name = args.first()?.as_str()?;
    let Expr::Array(items) = args.get(1)? else {
        return None;
    };
    let values = items
        .iter()
        .filter_map(Expr::as_str)
        .map(str::to_string)
        .collect();
    Some(Enum::new(name, values))
}

fn action_option(options: Option<&Expr>, key: &str) -> ForeignKeyAction {
    options
        .and_then(|o| o.get(key))
        .and_then(Expr::as_str)
        .map(ForeignKeyAction::parse)
        .unwrap_or_default()
}

/// SQL text of `` sql`...` `` or `sql('...')`
fn sql_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::TaggedTemplate { tag, raw } if tag == "sql" => Some(raw.trim().to_string()),
        Expr::Call { callee, args } if callee.as_ident() == Some("sql") => {
            args.first().and_then(Expr::as_str).map(str::to_string)
        }
        _ => None,
    }
}

/// Replace `${t.prop}` in SQL text with the column name of `prop`.
///
/// Only references through the table callback's parameter are rewritten;
/// any other interpolation is left as written.
fn interpolate_columns(text: &str, param: Option<&str>, properties: &HashMap<String, String>) -> String {
    let Some(pattern) = interpolation_pattern() else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let owner = &caps[1];
            let property = &caps[2];
            if param.is_some_and(|p| p != owner) {
                return caps[0].to_string();
            }
            properties
                .get(property)
                .cloned()
                .unwrap_or_else(|| property.to_string())
        })
        .into_owned()
}

fn interpolation_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{\s*([A-Za-z_$][\w$]*)\.([A-Za-z_$][\w$]*)\s*\}").ok())
        .as_ref()
}

fn default_value(expr: &Expr) -> Option<DefaultValue> {
    match expr {
        Expr::Str(s) | Expr::Template(s) => Some(DefaultValue::String(s.clone())),
        Expr::Num(n) => Some(
            n.parse::<serde_json::Number>()
                .map(DefaultValue::Number)
                .unwrap_or_else(|_| DefaultValue::String(n.clone())),
        ),
        Expr::Bool(b) => Some(DefaultValue::Boolean(*b)),
        Expr::Null => None,
        Expr::Array(_) | Expr::Object(_) => json_literal(expr).map(|v| DefaultValue::String(v.to_string())),
        Expr::Ident(_) | Expr::Member { .. } => dotted_path(expr).map(DefaultValue::String),
        other => sql_text(other).map(DefaultValue::String),
    }
}

/// `() => createId()` and friends, as SQL-looking text
fn runtime_default(args: &[Expr]) -> String {
    match args.first().map(Expr::arrow_body) {
        Some(Expr::Call { callee, .. }) => match dotted_path(callee) {
            Some(path) => format!("{}()", path),
            None => "custom_function()".to_string(),
        },
        Some(Expr::New { callee }) => format!("new {}()", callee),
        _ => "custom_function()".to_string(),
    }
}

fn dotted_path(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Member { object, property } => Some(format!("{}.{}", dotted_path(object)?, property)),
        _ => None,
    }
}

fn json_literal(expr: &Expr) -> Option<serde_json::Value> {
    use serde_json::Value;

    Some(match expr {
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Num(n) => Value::Number(n.parse().ok()?),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Null => Value::Null,
        Expr::Array(items) => Value::Array(items.iter().map(json_literal).collect::<Option<_>>()?),
        Expr::Object(props) => Value::Object(
            props
                .iter()
                .map(|(k, v)| Some((k.clone(), json_literal(v)?)))
                .collect::<Option<_>>()?,
        ),
        _ => return None,
    })
}
