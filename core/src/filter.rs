//! Record filters
//!
//! A `Filter` is a conjunction of field comparisons. The same filter value
//! drives both the affected-set read and the bulk mutation, so both see the
//! same rows inside one transaction.

use crate::errors::Result;
use crate::schema::{EntitySchema, quote_ident};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    NotNull,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, Op::Eq, value)
    }

    pub fn and(mut self, field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op,
            values: vec![value.into()],
        });
        self
    }

    pub fn and_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Op::Eq, value)
    }

    pub fn and_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op: Op::In,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn and_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op: Op::IsNull,
            values: Vec::new(),
        });
        self
    }

    pub fn and_not_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op: Op::NotNull,
            values: Vec::new(),
        });
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Render a `WHERE` clause (empty for an unrestricted filter).
    ///
    /// Placeholders are numbered from `first_param`, so the clause can follow
    /// the `SET` parameters of an `UPDATE`.
    pub(crate) fn to_sql(
        &self,
        schema: &EntitySchema,
        first_param: usize,
    ) -> Result<(String, Vec<Value>)> {
        if self.conditions.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let mut params = Vec::new();
        let mut clauses = Vec::with_capacity(self.conditions.len());

        for cond in &self.conditions {
            schema.require_field(&cond.field)?;
            let column = quote_ident(&cond.field);

            let clause = match cond.op {
                Op::IsNull => format!("{column} IS NULL"),
                Op::NotNull => format!("{column} IS NOT NULL"),
                Op::In if cond.values.is_empty() => "0".to_string(),
                Op::In => {
                    let placeholders: Vec<String> = cond
                        .values
                        .iter()
                        .map(|value| {
                            params.push(value.clone());
                            format!("?{}", first_param + params.len() - 1)
                        })
                        .collect();
                    format!("{column} IN ({})", placeholders.join(", "))
                }
                op => {
                    let value = cond.values.first().cloned().unwrap_or(Value::Null);
                    params.push(value);
                    let symbol = match op {
                        Op::Eq => "=",
                        Op::Ne => "<>",
                        Op::Lt => "<",
                        Op::Le => "<=",
                        Op::Gt => ">",
                        _ => ">=",
                    };
                    format!("{column} {symbol} ?{}", first_param + params.len() - 1)
                }
            };
            clauses.push(clause);
        }

        Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};
    use pretty_assertions::assert_eq;

    fn schema() -> EntitySchema {
        EntitySchema::new("users", "id")
            .field(FieldDef::new("id", FieldType::Integer))
            .field(FieldDef::new("name", FieldType::Text))
            .field(FieldDef::new("age", FieldType::Integer))
    }

    #[test]
    fn unrestricted_filter_renders_nothing() {
        let (sql, params) = Filter::all().to_sql(&schema(), 1).expect("render");
        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn placeholders_continue_from_offset() {
        let filter = Filter::eq("name", "foo")
            .and("age", Op::Ge, 18)
            .and_in("id", [1, 2])
            .and_null("name");
        let (sql, params) = filter.to_sql(&schema(), 3).expect("render");
        assert_eq!(
            sql,
            " WHERE \"name\" = ?3 AND \"age\" >= ?4 AND \"id\" IN (?5, ?6) AND \"name\" IS NULL"
        );
        assert_eq!(
            params,
            vec![
                Value::from("foo"),
                Value::from(18),
                Value::from(1),
                Value::from(2)
            ]
        );
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, _) = Filter::all()
            .and_in("id", Vec::<i64>::new())
            .to_sql(&schema(), 1)
            .expect("render");
        assert_eq!(sql, " WHERE 0");
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(Filter::eq("missing", 1).to_sql(&schema(), 1).is_err());
    }
}
