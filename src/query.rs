//! Typed filters and the SQL they render to.

use sqlx::any::AnyArguments;
use sqlx::query::Query;
use sqlx::Any;

use crate::dialect::Dialect;
use crate::entity::{Column, Entity, FieldKind, FieldValue};
use crate::error::StoreError;
use crate::guid::{GuidCodec, GuidValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition<F> {
    Compare(F, Op, FieldValue),
    In(F, Vec<FieldValue>),
}

/// Conditions on one entity type, all ANDed together.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<E: Entity> {
    conditions: Vec<Condition<E::Field>>,
}

impl<E: Entity> Default for Filter<E> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }
}

impl<E: Entity> Filter<E> {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Shorthand for a single equality condition.
    pub fn by(field: E::Field, value: impl Into<FieldValue>) -> Self {
        Self::all().eq(field, value)
    }

    pub fn eq(self, field: E::Field, value: impl Into<FieldValue>) -> Self {
        self.compare(field, Op::Eq, value)
    }

    pub fn ne(self, field: E::Field, value: impl Into<FieldValue>) -> Self {
        self.compare(field, Op::Ne, value)
    }

    pub fn lt(self, field: E::Field, value: impl Into<FieldValue>) -> Self {
        self.compare(field, Op::Lt, value)
    }

    pub fn le(self, field: E::Field, value: impl Into<FieldValue>) -> Self {
        self.compare(field, Op::Le, value)
    }

    pub fn gt(self, field: E::Field, value: impl Into<FieldValue>) -> Self {
        self.compare(field, Op::Gt, value)
    }

    pub fn ge(self, field: E::Field, value: impl Into<FieldValue>) -> Self {
        self.compare(field, Op::Ge, value)
    }

    pub fn compare(mut self, field: E::Field, op: Op, value: impl Into<FieldValue>) -> Self {
        self.conditions
            .push(Condition::Compare(field, op, value.into()));
        self
    }

    pub fn is_in<V: Into<FieldValue>>(
        mut self,
        field: E::Field,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In(
            field,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn conditions(&self) -> &[Condition<E::Field>] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A value ready to be bound, already in its storage representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Integer(Option<i64>),
    Text(Option<String>),
    Binary(Option<Vec<u8>>),
}

impl Bound {
    /// Converts `value` for a column of `kind`.
    pub fn encode(
        field: &'static str,
        kind: FieldKind,
        value: FieldValue,
        codec: &dyn GuidCodec,
    ) -> Result<Self, StoreError> {
        let mismatch = |value: &FieldValue| StoreError::FieldType {
            field,
            kind,
            found: value.type_name(),
        };

        if value.is_null() {
            return Ok(match kind {
                FieldKind::Integer | FieldKind::SmallInteger | FieldKind::Enum => {
                    Bound::Integer(None)
                }
                FieldKind::Binary => Bound::Binary(None),
                _ => Bound::Text(None),
            });
        }

        let bound = match kind {
            FieldKind::Guid => {
                let guid = match value {
                    FieldValue::Guid(uuid) => GuidValue::Uuid(uuid),
                    FieldValue::Text(text) => GuidValue::Text(text),
                    other => return Err(mismatch(&other)),
                };
                Bound::Text(codec.encode(Some(&guid))?)
            }
            FieldKind::Integer | FieldKind::SmallInteger => match value {
                FieldValue::Integer(number) => Bound::Integer(Some(number)),
                other => return Err(mismatch(&other)),
            },
            FieldKind::Enum => match value {
                FieldValue::Enum(member) => Bound::Integer(Some(member.ordinal)),
                FieldValue::Integer(ordinal) => Bound::Integer(Some(ordinal)),
                other => return Err(mismatch(&other)),
            },
            FieldKind::Text => match value {
                FieldValue::Text(text) => Bound::Text(Some(text)),
                other => return Err(mismatch(&other)),
            },
            FieldKind::Binary => match value {
                FieldValue::Binary(bytes) => Bound::Binary(Some(bytes)),
                other => return Err(mismatch(&other)),
            },
            FieldKind::Timestamp => match value {
                FieldValue::Timestamp(at) => Bound::Text(Some(at.to_rfc3339())),
                other => return Err(mismatch(&other)),
            },
            FieldKind::IntegerList => match value {
                FieldValue::IntegerList(list) => Bound::Text(Some(serde_json::to_string(&list)?)),
                other => return Err(mismatch(&other)),
            },
        };
        Ok(bound)
    }
}

/// SQL text plus its bound values, built for one dialect.
#[derive(Debug)]
pub struct Statement<'c> {
    sql: String,
    binds: Vec<Bound>,
    dialect: Dialect,
    codec: &'c dyn GuidCodec,
}

impl<'c> Statement<'c> {
    pub fn new(codec: &'c dyn GuidCodec) -> Self {
        Self {
            sql: String::new(),
            binds: Vec::new(),
            dialect: codec.dialect(),
            codec,
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Appends a placeholder for `value` and records the bind.
    pub fn push_bind<F: Column>(&mut self, field: F, value: FieldValue) -> Result<&mut Self, StoreError> {
        let bound = Bound::encode(field.name(), field.kind(), value, self.codec)?;
        self.binds.push(bound);
        let placeholder = self.dialect.placeholder(self.binds.len());
        let sql = if field.kind() == FieldKind::Guid {
            self.codec.bind_sql(&placeholder)
        } else {
            placeholder
        };
        self.sql.push_str(&sql);
        Ok(self)
    }

    /// `SELECT <columns> FROM <table>`.
    pub fn push_select<E: Entity>(&mut self) -> &mut Self {
        let columns = select_list::<E>(self.codec);
        self.sql
            .push_str(&format!("SELECT {columns} FROM {}", E::TABLE));
        self
    }

    /// `RETURNING <columns>`.
    pub fn push_returning<E: Entity>(&mut self) -> &mut Self {
        let columns = select_list::<E>(self.codec);
        self.sql.push_str(&format!(" RETURNING {columns}"));
        self
    }

    /// ` WHERE ...` for `filter`; nothing when the filter is empty.
    pub fn push_filter<E: Entity>(&mut self, filter: &Filter<E>) -> Result<&mut Self, StoreError> {
        for (index, condition) in filter.conditions().iter().enumerate() {
            self.push(if index == 0 { " WHERE " } else { " AND " });
            match condition {
                Condition::Compare(field, op, value) => {
                    self.push(field.name());
                    match (op, value.is_null()) {
                        (Op::Eq, true) => {
                            self.push(" IS NULL");
                        }
                        (Op::Ne, true) => {
                            self.push(" IS NOT NULL");
                        }
                        _ => {
                            self.push(" ").push(op.sql()).push(" ");
                            self.push_bind(*field, value.clone())?;
                        }
                    }
                }
                Condition::In(_, values) if values.is_empty() => {
                    self.push("1 = 0");
                }
                Condition::In(field, values) => {
                    self.push(field.name()).push(" IN (");
                    for (position, value) in values.iter().enumerate() {
                        if position > 0 {
                            self.push(", ");
                        }
                        self.push_bind(*field, value.clone())?;
                    }
                    self.push(")");
                }
            }
        }
        Ok(self)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[Bound] {
        &self.binds
    }

    /// The sqlx query, borrowing the SQL text.
    pub fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for bound in &self.binds {
            query = match bound.clone() {
                Bound::Integer(value) => query.bind(value),
                Bound::Text(value) => query.bind(value),
                Bound::Binary(value) => query.bind(value),
            };
        }
        query
    }
}

fn select_list<E: Entity>(codec: &dyn GuidCodec) -> String {
    E::FIELDS
        .iter()
        .map(|field| match field.kind() {
            FieldKind::Guid => codec.select_sql(field.name()),
            _ => field.name().to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::{HexGuidCodec, NativeGuidCodec};
    use crate::models::{City, CityField, GameLevel, User, UserField};
    use uuid::Uuid;

    #[test]
    fn filter_renders_sqlite_placeholders() {
        let filter = Filter::<City>::by(CityField::Name, "Rosario").gt(CityField::Id, 3_i64);
        let mut statement = Statement::new(&HexGuidCodec);
        statement.push_select::<City>();
        statement.push_filter(&filter).unwrap();

        assert_eq!(
            statement.sql(),
            "SELECT id, name FROM cities WHERE name = ? AND id > ?"
        );
        assert_eq!(
            statement.binds(),
            &[
                Bound::Text(Some("Rosario".to_string())),
                Bound::Integer(Some(3))
            ]
        );
    }

    #[test]
    fn postgres_casts_guid_columns() {
        let id = Uuid::new_v4();
        let filter = Filter::<User>::by(UserField::Id, id);
        let mut statement = Statement::new(&NativeGuidCodec);
        statement.push_select::<User>();
        statement.push_filter(&filter).unwrap();

        assert!(statement
            .sql()
            .starts_with("SELECT CAST(id AS TEXT) AS id, game_level"));
        assert!(statement.sql().ends_with("WHERE id = CAST($1 AS UUID)"));
        assert_eq!(statement.binds(), &[Bound::Text(Some(id.to_string()))]);
    }

    #[test]
    fn guid_text_is_encoded_through_the_codec() {
        let id = Uuid::new_v4();
        let filter = Filter::<User>::by(UserField::Id, id.to_string());
        let mut statement = Statement::new(&HexGuidCodec);
        statement.push_filter(&filter).unwrap();
        assert_eq!(
            statement.binds(),
            &[Bound::Text(Some(id.simple().to_string()))]
        );

        let bad = Filter::<User>::by(UserField::Id, "nope");
        assert!(Statement::new(&HexGuidCodec).push_filter(&bad).is_err());
    }

    #[test]
    fn null_equality_and_membership() {
        let filter = Filter::<User>::by(UserField::Description, None::<String>)
            .is_in(UserField::GameLevel, [GameLevel::Beginner, GameLevel::Advanced]);
        let mut statement = Statement::new(&NativeGuidCodec);
        statement.push_filter(&filter).unwrap();

        assert_eq!(
            statement.sql(),
            " WHERE description IS NULL AND game_level IN ($1, $2)"
        );
        assert_eq!(
            statement.binds(),
            &[Bound::Integer(Some(1)), Bound::Integer(Some(3))]
        );
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let filter = Filter::<User>::by(UserField::Age, "thirty");
        let err = Statement::new(&HexGuidCodec)
            .push_filter(&filter)
            .unwrap_err();
        assert!(matches!(err, StoreError::FieldType { field: "age", .. }));
    }
}
