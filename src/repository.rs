//! Generic data access for every entity type.
//!
//! Each operation takes the caller's session explicitly and reports failure
//! as an [`ErrorCode`]. Storage faults are logged here and never escape.
//! Writes run in their own transaction, rolled back before an error is
//! returned so the session stays usable.

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{Any, AnyConnection, Connection, Row, Transaction};
use tracing::{debug, error, warn};

use crate::dialect::Dialect;
use crate::entity::{Column, Entity, FieldKind, FieldValue};
use crate::error::{DbResult, ErrorCode, StoreError};
use crate::guid::GuidCodec;
use crate::models::{Location, LocationField, User, UserField, UserLocationAssociation, UserLocationField};
use crate::query::{Filter, Statement};
use crate::serialize::{self, Record};

/// A fetched record along with its identifier rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<E> {
    pub id: String,
    pub record: E,
}

impl<E> Fetched<E> {
    pub fn into_inner(self) -> E {
        self.record
    }
}

impl<E> Deref for Fetched<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.record
    }
}

#[derive(Debug, Clone)]
pub struct Repository {
    codec: Arc<dyn GuidCodec>,
}

impl Repository {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            codec: dialect.guid_codec(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.codec.dialect()
    }

    pub fn codec(&self) -> &dyn GuidCodec {
        self.codec.as_ref()
    }

    /// Exactly one record matching `filter`.
    pub async fn fetch_one<E: Entity>(
        &self,
        session: &mut AnyConnection,
        filter: &Filter<E>,
    ) -> DbResult<Fetched<E>> {
        let rows = conclude(
            self.select(session, filter, Some(2)).await,
            ErrorCode::FetchFailed,
            E::TABLE,
        )?;

        let mut rows = rows.into_iter();
        match (rows.next(), rows.next()) {
            (Some(record), None) => {
                debug!("Fetched one {} row", E::TABLE);
                Ok(Fetched {
                    id: record.id_string(),
                    record,
                })
            }
            (None, _) => {
                error!(code = %ErrorCode::NotFound, table = E::TABLE, "No row matched {:?}", filter.conditions());
                Err(ErrorCode::NotFound)
            }
            (Some(_), Some(_)) => {
                error!(code = %ErrorCode::MultipleFound, table = E::TABLE, "Expected one row for {:?}", filter.conditions());
                Err(ErrorCode::MultipleFound)
            }
        }
    }

    /// Every record matching `filter`; none is not an error.
    pub async fn fetch_many<E: Entity>(
        &self,
        session: &mut AnyConnection,
        filter: &Filter<E>,
    ) -> DbResult<Vec<E>> {
        let records = conclude(
            self.select(session, filter, None).await,
            ErrorCode::FetchManyFailed,
            E::TABLE,
        )?;
        debug!("Fetched {} {} rows", records.len(), E::TABLE);
        Ok(records)
    }

    /// Every record whose `field` is one of `values`.
    pub async fn fetch_many_in_list<E, V>(
        &self,
        session: &mut AnyConnection,
        field: E::Field,
        values: impl IntoIterator<Item = V>,
    ) -> DbResult<Vec<E>>
    where
        E: Entity,
        V: Into<FieldValue>,
    {
        let values: Vec<FieldValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            debug!("Empty candidate list for {}.{}", E::TABLE, field.name());
            return Ok(Vec::new());
        }

        let filter = Filter::<E>::all().is_in(field, values);
        let records = conclude(
            self.select(session, &filter, None).await,
            ErrorCode::FetchManyInListFailed,
            E::TABLE,
        )?;
        debug!("Fetched {} {} rows by list", records.len(), E::TABLE);
        Ok(records)
    }

    /// Inserts `entity`, or rewrites every column of an already persisted
    /// one when `is_update` is set. Returns the stored record, including any
    /// key assigned by the store.
    pub async fn save<E: Entity>(
        &self,
        session: &mut AnyConnection,
        entity: &E,
        is_update: bool,
    ) -> DbResult<E> {
        let outcome: Result<E, StoreError> = async {
            let mut tx = session.begin().await?;
            let written = if is_update {
                let columns: Vec<E::Field> = E::FIELDS
                    .iter()
                    .copied()
                    .filter(|field| !E::KEY.contains(field))
                    .collect();
                self.write_columns(&mut tx, entity, entity, &columns).await
            } else {
                self.insert(&mut tx, entity).await
            };
            finish(tx, written).await
        }
        .await;

        let saved = conclude(outcome, ErrorCode::SaveFailed, E::TABLE)?;
        debug!("Saved {} row {}", E::TABLE, saved.id_string());
        Ok(saved)
    }

    /// Inserts all of `entities` in one transaction, or none of them.
    pub async fn save_many<E: Entity>(
        &self,
        session: &mut AnyConnection,
        entities: &[E],
    ) -> DbResult<Vec<E>> {
        let outcome: Result<Vec<E>, StoreError> = async {
            let mut tx = session.begin().await?;
            let written = self.insert_all(&mut tx, entities).await;
            finish(tx, written).await
        }
        .await;

        let saved = conclude(outcome, ErrorCode::SaveManyFailed, E::TABLE)?;
        debug!("Saved {} {} rows", saved.len(), E::TABLE);
        Ok(saved)
    }

    /// Applies `changes` to `entity` and writes them. The row is addressed
    /// by the key `entity` had before the changes. `entity` is only replaced
    /// once the write has committed.
    pub async fn update<E: Entity>(
        &self,
        session: &mut AnyConnection,
        entity: &mut E,
        changes: Vec<(E::Field, FieldValue)>,
    ) -> DbResult<E> {
        let current: &E = entity;
        let outcome: Result<E, StoreError> = async {
            let mut changed = current.clone();
            let mut columns: Vec<E::Field> = Vec::with_capacity(changes.len());
            for (field, value) in changes {
                changed.set(field, value)?;
                if !columns.contains(&field) {
                    columns.push(field);
                }
            }

            let mut tx = session.begin().await?;
            let written = self.write_columns(&mut tx, current, &changed, &columns).await;
            finish(tx, written).await
        }
        .await;

        let updated = conclude(outcome, ErrorCode::UpdateFailed, E::TABLE)?;
        debug!("Updated {} row {}", E::TABLE, updated.id_string());
        *entity = updated.clone();
        Ok(updated)
    }

    pub async fn delete<E: Entity>(&self, session: &mut AnyConnection, entity: &E) -> DbResult<()> {
        let outcome: Result<(), StoreError> = async {
            let mut tx = session.begin().await?;
            let deleted = self.delete_row(&mut tx, entity).await;
            finish(tx, deleted).await
        }
        .await;

        conclude(outcome, ErrorCode::DeleteFailed, E::TABLE)?;
        debug!("Deleted {} row {}", E::TABLE, entity.id_string());
        Ok(())
    }

    /// Flat JSON view of `entity`.
    pub fn serialize<E: Entity>(&self, entity: &E) -> Record {
        serialize::to_record(entity)
    }

    /// Sum of `field` over the rows matching `filter`; 0 when nothing
    /// matches.
    pub async fn aggregate_sum<E: Entity>(
        &self,
        session: &mut AnyConnection,
        field: E::Field,
        filter: &Filter<E>,
    ) -> DbResult<i64> {
        let outcome: Result<i64, StoreError> = async {
            if !matches!(field.kind(), FieldKind::Integer | FieldKind::SmallInteger) {
                return Err(StoreError::FieldType {
                    field: field.name(),
                    kind: field.kind(),
                    found: "sum",
                });
            }

            let mut statement = Statement::new(self.codec());
            statement.push(&format!(
                "SELECT CAST(SUM({}) AS BIGINT) AS total FROM {}",
                field.name(),
                E::TABLE
            ));
            statement.push_filter(filter)?;

            let mut tx = session.begin().await?;
            let total = match statement.query().fetch_one(&mut *tx).await {
                Ok(row) => row.try_get::<Option<i64>, _>(0).map_err(StoreError::from),
                Err(err) => Err(err.into()),
            };
            finish(tx, total).await.map(|total| total.unwrap_or(0))
        }
        .await;

        let total = conclude(outcome, ErrorCode::AggregateFailed, E::TABLE)?;
        debug!("Sum of {}.{} is {}", E::TABLE, field.name(), total);
        Ok(total)
    }

    /// Locations linked to `user`.
    pub async fn linked_locations(
        &self,
        session: &mut AnyConnection,
        user: &User,
    ) -> DbResult<Vec<Location>> {
        let links = self
            .fetch_many(
                session,
                &Filter::<UserLocationAssociation>::by(UserLocationField::UserId, user.id),
            )
            .await?;
        self.fetch_many_in_list::<Location, _>(
            session,
            LocationField::Id,
            links.iter().map(|link| link.location_id),
        )
        .await
    }

    /// Users linked to `location`.
    pub async fn linked_users(
        &self,
        session: &mut AnyConnection,
        location: &Location,
    ) -> DbResult<Vec<User>> {
        let links = self
            .fetch_many(
                session,
                &Filter::<UserLocationAssociation>::by(UserLocationField::LocationId, location.id),
            )
            .await?;
        self.fetch_many_in_list::<User, _>(session, UserField::Id, links.iter().map(|link| link.user_id))
            .await
    }

    async fn select<E: Entity>(
        &self,
        conn: &mut AnyConnection,
        filter: &Filter<E>,
        limit: Option<usize>,
    ) -> Result<Vec<E>, StoreError> {
        let mut statement = Statement::new(self.codec());
        statement.push_select::<E>();
        statement.push_filter(filter)?;
        if let Some(limit) = limit {
            statement.push(&format!(" LIMIT {limit}"));
        }

        let rows = statement.query().fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| decode_row(row, self.codec()))
            .collect()
    }

    async fn insert<E: Entity>(&self, conn: &mut AnyConnection, entity: &E) -> Result<E, StoreError> {
        entity.validate()?;

        // A generated key left empty is filled in by the store.
        let columns: Vec<E::Field> = E::FIELDS
            .iter()
            .copied()
            .filter(|&field| !(E::GENERATED_KEY == Some(field) && entity.get(field).is_null()))
            .collect();
        let names: Vec<&str> = columns.iter().map(|field| field.name()).collect();

        let mut statement = Statement::new(self.codec());
        statement.push(&format!("INSERT INTO {} ({}) VALUES (", E::TABLE, names.join(", ")));
        for (index, &field) in columns.iter().enumerate() {
            if index > 0 {
                statement.push(", ");
            }
            statement.push_bind(field, entity.get(field))?;
        }
        statement.push(")");
        statement.push_returning::<E>();

        let row = statement.query().fetch_one(&mut *conn).await?;
        decode_row(&row, self.codec())
    }

    async fn insert_all<E: Entity>(
        &self,
        conn: &mut AnyConnection,
        entities: &[E],
    ) -> Result<Vec<E>, StoreError> {
        let mut saved = Vec::with_capacity(entities.len());
        for entity in entities {
            saved.push(self.insert(conn, entity).await?);
        }
        Ok(saved)
    }

    /// Writes `columns` of `changed` into the row keyed by `current`.
    async fn write_columns<E: Entity>(
        &self,
        conn: &mut AnyConnection,
        current: &E,
        changed: &E,
        columns: &[E::Field],
    ) -> Result<E, StoreError> {
        changed.validate()?;
        let key = key_filter(current)?;
        let mut statement = Statement::new(self.codec());

        if columns.is_empty() {
            // nothing to write, but the row still has to exist
            statement.push_select::<E>();
        } else {
            statement.push(&format!("UPDATE {} SET ", E::TABLE));
            for (index, &field) in columns.iter().enumerate() {
                if index > 0 {
                    statement.push(", ");
                }
                statement.push(field.name()).push(" = ");
                statement.push_bind(field, changed.get(field))?;
            }
        }
        statement.push_filter(&key)?;
        if !columns.is_empty() {
            statement.push_returning::<E>();
        }

        let row = statement
            .query()
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::RowMissing { table: E::TABLE })?;
        decode_row(&row, self.codec())
    }

    async fn delete_row<E: Entity>(&self, conn: &mut AnyConnection, entity: &E) -> Result<(), StoreError> {
        let key = key_filter(entity)?;
        let mut statement = Statement::new(self.codec());
        statement.push(&format!("DELETE FROM {}", E::TABLE));
        statement.push_filter(&key)?;

        let result = statement.query().execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowMissing { table: E::TABLE });
        }
        Ok(())
    }
}

/// Equality on every key column of `entity`.
fn key_filter<E: Entity>(entity: &E) -> Result<Filter<E>, StoreError> {
    let mut filter = Filter::all();
    for &field in E::KEY {
        let value = entity.get(field);
        if value.is_null() {
            return Err(StoreError::MissingKey { table: E::TABLE });
        }
        filter = filter.eq(field, value);
    }
    if filter.is_empty() {
        return Err(StoreError::MissingKey { table: E::TABLE });
    }
    Ok(filter)
}

/// Rebuilds an entity from a row selected with its full column list.
fn decode_row<E: Entity>(row: &AnyRow, codec: &dyn GuidCodec) -> Result<E, StoreError> {
    let mut entity = E::default();
    for &field in E::FIELDS {
        let name = field.name();
        let value = match field.kind() {
            FieldKind::Guid => {
                let raw: Option<String> = row.try_get(name)?;
                codec.decode(raw.as_deref())?.into()
            }
            FieldKind::Integer | FieldKind::SmallInteger | FieldKind::Enum => {
                row.try_get::<Option<i64>, _>(name)?.into()
            }
            FieldKind::Text => row.try_get::<Option<String>, _>(name)?.into(),
            FieldKind::Binary => row.try_get::<Option<Vec<u8>>, _>(name)?.into(),
            FieldKind::Timestamp => match row.try_get::<Option<String>, _>(name)? {
                None => FieldValue::Null,
                Some(text) => {
                    let at = DateTime::parse_from_rfc3339(&text)
                        .map_err(|source| StoreError::Timestamp {
                            value: text.clone(),
                            source,
                        })?;
                    FieldValue::Timestamp(at.with_timezone(&Utc))
                }
            },
            FieldKind::IntegerList => match row.try_get::<Option<String>, _>(name)? {
                None => FieldValue::Null,
                Some(text) => FieldValue::IntegerList(serde_json::from_str(&text)?),
            },
        };
        entity.set(field, value)?;
    }
    Ok(entity)
}

/// Commits on success, rolls back on failure.
async fn finish<T>(
    tx: Transaction<'_, Any>,
    outcome: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

/// Logs a fault and turns it into its symbolic code.
fn conclude<T>(outcome: Result<T, StoreError>, code: ErrorCode, table: &'static str) -> DbResult<T> {
    outcome.map_err(|err| {
        error!(code = %code, table, "{}", err);
        code
    })
}
