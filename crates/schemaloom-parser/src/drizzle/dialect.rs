//! Per-database behaviour of the Drizzle converter

use super::ast::Expr;
use schemaloom_core::DialectConfig;

/// Everything that differs between `drizzle-orm/pg-core` and
/// `drizzle-orm/mysql-core` schema files
#[derive(Debug, Clone, PartialEq)]
pub struct DialectStrategy {
    pub dialect: DialectConfig,

    /// `mysqlEnum('status', [...])` used directly as a column
    pub supports_inline_enums: bool,

    /// `check(...)` and `unique(...)` in the table callback
    pub supports_check_constraints: bool,

    /// `autoincrement`, `onUpdateNow`, `$defaultFn`, `$onUpdate`
    pub dialect_methods: bool,

    /// Functions that declare a table
    pub table_functions: &'static [&'static str],

    /// Function that declares an enum
    pub enum_function: &'static str,
}

impl DialectStrategy {
    pub fn postgres() -> Self {
        Self {
            dialect: DialectConfig::Postgres,
            supports_inline_enums: false,
            supports_check_constraints: false,
            dialect_methods: false,
            table_functions: &["pgTable"],
            enum_function: "pgEnum",
        }
    }

    pub fn mysql() -> Self {
        Self {
            dialect: DialectConfig::Mysql,
            supports_inline_enums: true,
            supports_check_constraints: true,
            dialect_methods: true,
            table_functions: &["mysqlTable"],
            enum_function: "mysqlEnum",
        }
    }

    pub fn is_table_function(&self, name: &str) -> bool {
        self.table_functions.contains(&name)
    }

    /// SQL type for a column builder and its option object
    pub fn convert_type(&self, builder: &str, options: Option<&Expr>) -> String {
        let base = match builder {
            "doublePrecision" => "double precision".to_string(),
            other => other.to_lowercase(),
        };

        let Some(options) = options else {
            return base;
        };
        let number = |key: &str| match options.get(key) {
            Some(Expr::Num(n)) => Some(n.clone()),
            _ => None,
        };

        let mut sql_type = if let Some(length) = number("length") {
            format!("{}({})", base, length)
        } else if let Some(precision) = number("precision") {
            match number("scale") {
                Some(scale) => format!("{}({}, {})", base, precision, scale),
                None => format!("{}({})", base, precision),
            }
        } else if let Some(fsp) = number("fsp") {
            format!("{}({})", base, fsp)
        } else if let Some(dimensions) = number("dimensions") {
            format!("{}({})", base, dimensions)
        } else {
            base
        };

        if self.dialect == DialectConfig::Postgres
            && options.get("withTimezone") == Some(&Expr::Bool(true))
        {
            sql_type.push_str(" with time zone");
        }
        if self.dialect == DialectConfig::Mysql && options.get("unsigned") == Some(&Expr::Bool(true)) {
            sql_type.push_str(" unsigned");
        }

        sql_type
    }

    /// Whether a column's implicit default is `autoincrement()`
    pub fn is_auto_increment(&self, builder: &str, primary: bool, has_autoincrement: bool) -> bool {
        match self.dialect {
            DialectConfig::Postgres => matches!(builder, "serial" | "smallserial" | "bigserial"),
            DialectConfig::Mysql => {
                primary && ((builder == "int" && has_autoincrement) || builder == "serial")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(props: Vec<(&str, Expr)>) -> Expr {
        Expr::Object(props.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_type_options() {
        let pg = DialectStrategy::postgres();
        assert_eq!(pg.convert_type("varchar", Some(&options(vec![("length", Expr::Num("255".into()))]))), "varchar(255)");
        assert_eq!(
            pg.convert_type(
                "numeric",
                Some(&options(vec![
                    ("precision", Expr::Num("10".into())),
                    ("scale", Expr::Num("2".into()))
                ]))
            ),
            "numeric(10, 2)"
        );
        assert_eq!(
            pg.convert_type("timestamp", Some(&options(vec![("withTimezone", Expr::Bool(true))]))),
            "timestamp with time zone"
        );
        assert_eq!(pg.convert_type("doublePrecision", None), "double precision");
    }

    #[test]
    fn test_mysql_unsigned() {
        let mysql = DialectStrategy::mysql();
        assert_eq!(
            mysql.convert_type("int", Some(&options(vec![("unsigned", Expr::Bool(true))]))),
            "int unsigned"
        );
    }

    #[test]
    fn test_auto_increment_rules() {
        let pg = DialectStrategy::postgres();
        assert!(pg.is_auto_increment("serial", false, false));
        assert!(!pg.is_auto_increment("integer", true, true));

        let mysql = DialectStrategy::mysql();
        assert!(mysql.is_auto_increment("int", true, true));
        assert!(!mysql.is_auto_increment("int", true, false));
        assert!(!mysql.is_auto_increment("serial", false, false));
    }
}
