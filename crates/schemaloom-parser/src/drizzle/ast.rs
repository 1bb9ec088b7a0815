//! Expression tree for Drizzle schema files

/// Expression subset used by table, column and enum declarations
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Str(String),
    Num(String),
    Bool(bool),
    Null,
    Template(String),
    /// `` tag`raw` ``, e.g. `` sql`now()` ``
    TaggedTemplate { tag: String, raw: String },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member { object: Box<Expr>, property: String },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    New { callee: String },
    Arrow { params: Vec<String>, body: Box<Expr> },
    /// Anything the converter has no use for (blocks, operators, spreads)
    Opaque,
}

/// `[export] const name = init`
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub init: Expr,
    pub line: usize,
}

/// A call and the methods chained onto it, innermost first.
///
/// `index('i').on(t.a).using('gin', t.b)` has base `index('i')` and
/// methods `on`, `using`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallChain<'a> {
    pub base: &'a str,
    pub base_object: Option<&'a Expr>,
    pub base_args: &'a [Expr],
    pub methods: Vec<(&'a str, &'a [Expr])>,
}

impl Expr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Template(s) if !s.contains("${") => Some(s),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Self::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Value of `key` in an object literal
    pub fn get(&self, key: &str) -> Option<&Expr> {
        match self {
            Self::Object(props) => props.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Decompose `base(args).m1(..).m2(..)` into a [`CallChain`].
    ///
    /// The base is either a plain function (`varchar(...)`) or a method on
    /// an identifier (`schema.table(...)`), whose object is kept in
    /// `base_object`.
    pub fn call_chain(&self) -> Option<CallChain<'_>> {
        let mut methods = Vec::new();
        let mut current = self;

        loop {
            let Self::Call { callee, args } = current else {
                return None;
            };
            match callee.as_ref() {
                Self::Ident(name) => {
                    methods.reverse();
                    return Some(CallChain {
                        base: name,
                        base_object: None,
                        base_args: args,
                        methods,
                    });
                }
                Self::Member { object, property } => {
                    if let Self::Ident(_) = object.as_ref() {
                        methods.reverse();
                        return Some(CallChain {
                            base: property,
                            base_object: Some(object),
                            base_args: args,
                            methods,
                        });
                    }
                    methods.push((property.as_str(), args.as_slice()));
                    current = object;
                }
                _ => return None,
            }
        }
    }

    /// Property named by a column reference: `t.email`, `t.email.asc()`,
    /// `users.id` all yield `email`/`id`.
    pub fn column_ref(&self) -> Option<(&str, &str)> {
        match self {
            Self::Member { object, property } => match object.as_ref() {
                Self::Ident(owner) => Some((owner, property)),
                inner => inner.column_ref(),
            },
            Self::Call { callee, .. } => match callee.as_ref() {
                Self::Member { object, .. } => object.column_ref(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Body of `() => body`, or the expression itself
    pub fn arrow_body(&self) -> &Expr {
        match self {
            Self::Arrow { body, .. } => body,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    fn member(object: Box<Expr>, property: &str) -> Expr {
        Expr::Member {
            object,
            property: property.to_string(),
        }
    }

    fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    #[test]
    fn test_call_chain_order() {
        // varchar('email').notNull().unique()
        let base = call(Expr::Ident("varchar".into()), vec![Expr::Str("email".into())]);
        let not_null = call(member(Box::new(base), "notNull"), vec![]);
        let unique = call(member(Box::new(not_null), "unique"), vec![]);

        let chain = unique.call_chain().unwrap();
        assert_eq!(chain.base, "varchar");
        assert!(chain.base_object.is_none());
        assert_eq!(chain.base_args, &[Expr::Str("email".into())]);
        let names: Vec<&str> = chain.methods.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["notNull", "unique"]);
    }

    #[test]
    fn test_call_chain_on_namespace() {
        // auth.table('users', {})
        let expr = call(member(ident("auth"), "table"), vec![Expr::Str("users".into())]);
        let chain = expr.call_chain().unwrap();
        assert_eq!(chain.base, "table");
        assert_eq!(chain.base_object, Some(&Expr::Ident("auth".into())));
    }

    #[test]
    fn test_column_ref() {
        let plain = member(ident("t"), "email");
        assert_eq!(plain.column_ref(), Some(("t", "email")));

        let ordered = call(member(Box::new(member(ident("t"), "createdAt")), "desc"), vec![]);
        assert_eq!(ordered.column_ref(), Some(("t", "createdAt")));

        assert_eq!(Expr::Str("x".into()).column_ref(), None);
    }
}
