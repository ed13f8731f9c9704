//! Row codec and single-statement writes over the generic `entities` table.
//!
//! # Responsibility
//! - Encode entities into JSON payload plus bookkeeping columns and back.
//! - Reserve store-generated keys.
//! - Write one entity and its owned graph with optimistic concurrency checks.
//!
//! # Invariants
//! - Bookkeeping columns are authoritative over payload fields on read.
//! - Every successful write issues a fresh row version.
//! - Default reads never return tombstoned rows.

use crate::db::tracker::{Audit, EntryState};
use crate::db::{StoreError, StoreResult};
use crate::model::entity::{ConcurrencyToken, Entity, KeyGeneration, Snapshot};
use crate::model::key::EntityKey;
use log::debug;
use rusqlite::{params, Connection, Row};

const ENTITY_SELECT_SQL: &str = "SELECT
    id,
    payload,
    is_deleted,
    row_version,
    created_by,
    created_at,
    edited_by,
    edited_at
FROM entities";

/// Whether tombstoned rows take part in a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Active,
    IncludeDeleted,
}

/// An update that matched no row at the expected version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Conflict {
    pub(crate) kind: &'static str,
    pub(crate) id: String,
}

/// Result of writing one entity graph.
#[derive(Debug, Default)]
pub(crate) struct WriteOutcome {
    pub(crate) affected: usize,
    pub(crate) conflict: Option<Conflict>,
}

impl WriteOutcome {
    fn written(affected: usize) -> Self {
        Self {
            affected,
            conflict: None,
        }
    }

    pub(crate) fn merge(&mut self, other: WriteOutcome) {
        self.affected += other.affected;
        if self.conflict.is_none() {
            self.conflict = other.conflict;
        }
    }
}

/// Whether a read fills navigation fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Graph {
    Loaded,
    /// Stored fields only; navigations stay empty.
    Scalars,
}

pub(crate) fn select_entities<E: Entity>(
    conn: &Connection,
    visibility: Visibility,
) -> StoreResult<Vec<E>> {
    let mut sql = format!("{ENTITY_SELECT_SQL} WHERE kind = ?1");
    if visibility == Visibility::Active {
        sql.push_str(" AND is_deleted = 0");
    }
    sql.push_str(" ORDER BY rowid ASC;");

    query_entities(conn, &sql, [E::KIND])
}

/// Active rows of `C` whose payload field `foreign_key` holds `parent`.
///
/// Both sides are compared as JSON values, so integer and UUID keys match
/// the way they were serialized.
pub(crate) fn select_owned<C: Entity, K: EntityKey>(
    conn: &Connection,
    foreign_key: &str,
    parent: &K,
) -> StoreResult<Vec<C>> {
    let parent = serde_json::to_string(parent).map_err(|source| StoreError::Codec {
        kind: C::KIND,
        source,
    })?;
    let sql = format!(
        "{ENTITY_SELECT_SQL}
         WHERE kind = ?1
           AND is_deleted = 0
           AND json_extract(payload, ?2) = json_extract(?3, '$')
         ORDER BY rowid ASC;"
    );

    query_entities(conn, &sql, params![C::KIND, format!("$.{foreign_key}"), parent])
}

fn query_entities<E: Entity, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<Vec<E>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(parse_entity_row::<E>(row)?);
    }

    Ok(entities)
}

pub(crate) fn find_entity<E: Entity>(
    conn: &Connection,
    id: &E::Key,
    visibility: Visibility,
) -> StoreResult<Option<E>> {
    let mut stmt = conn.prepare(&format!(
        "{ENTITY_SELECT_SQL}
         WHERE kind = ?1
           AND id = ?2
           AND (?3 = 1 OR is_deleted = 0);"
    ))?;

    let include_deleted = i64::from(visibility == Visibility::IncludeDeleted);
    let mut rows = stmt.query(params![E::KIND, id.to_column(), include_deleted])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_entity_row::<E>(row)?));
    }

    Ok(None)
}

pub(crate) fn key_exists(conn: &Connection, kind: &str, id: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM entities
            WHERE kind = ?1 AND id = ?2 AND is_deleted = 0
        );",
        params![kind, id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Loads every declared relationship of `entity`.
pub(crate) fn load_relations<E: Entity>(conn: &Connection, entity: &mut E) -> StoreResult<()> {
    for relation in E::relations() {
        relation.load(conn, entity)?;
    }
    Ok(())
}

/// Draws a new key for `E` from the store.
pub(crate) fn reserve_key<E: Entity>(conn: &Connection) -> StoreResult<E::Key> {
    if E::KEY_GENERATION == KeyGeneration::Caller {
        return Err(StoreError::MissingKey { kind: E::KIND });
    }

    let sequence = if E::Key::SEQUENCED {
        conn.query_row(
            "INSERT INTO key_sequences (kind, last_value)
             VALUES (?1, 1)
             ON CONFLICT(kind) DO UPDATE SET last_value = key_sequences.last_value + 1
             RETURNING last_value;",
            [E::KIND],
            |row| row.get::<_, i64>(0),
        )?
    } else {
        0
    };

    E::Key::generate(sequence).ok_or(StoreError::KeyExhausted { kind: E::KIND })
}

/// Writes a staged root entity and its owned graph.
pub(crate) fn write_root<E: Entity>(
    conn: &Connection,
    audit: &Audit,
    entity: &mut E,
    state: EntryState,
) -> StoreResult<WriteOutcome> {
    let outcome = match state {
        EntryState::Added => {
            if entity.is_new() {
                let key = reserve_key::<E>(conn)?;
                entity.record_mut().id = key;
            }
            insert_row(conn, audit, entity)?
        }
        EntryState::Modified => update_row(conn, audit, entity)?,
    };

    write_relations(conn, audit, entity, outcome)
}

/// Writes an entity reached through a principal relationship.
///
/// New entities are inserted, loaded ones only when changed since they were
/// read. New entities already marked deleted are dropped.
pub(crate) fn write_owned<E: Entity>(
    conn: &Connection,
    audit: &Audit,
    entity: &mut E,
) -> StoreResult<WriteOutcome> {
    let outcome = if entity.is_new() {
        if entity.is_deleted() {
            return Ok(WriteOutcome::default());
        }
        let key = reserve_key::<E>(conn)?;
        entity.record_mut().id = key;
        insert_row(conn, audit, entity)?
    } else if is_dirty(entity)? {
        update_row(conn, audit, entity)?
    } else {
        WriteOutcome::default()
    };

    write_relations(conn, audit, entity, outcome)
}

fn write_relations<E: Entity>(
    conn: &Connection,
    audit: &Audit,
    entity: &mut E,
    mut outcome: WriteOutcome,
) -> StoreResult<WriteOutcome> {
    if outcome.conflict.is_some() {
        return Ok(outcome);
    }

    for relation in E::relations().iter().filter(|relation| relation.is_principal()) {
        outcome.merge(relation.persist(conn, audit, entity)?);
        if outcome.conflict.is_some() {
            break;
        }
    }

    Ok(outcome)
}

fn insert_row<E: Entity>(
    conn: &Connection,
    audit: &Audit,
    entity: &mut E,
) -> StoreResult<WriteOutcome> {
    let token = ConcurrencyToken::fresh();
    {
        let record = entity.record_mut();
        record.created_by = Some(audit.user_id.clone());
        record.created_at = Some(audit.at_ms);
        record.edited_by = Some(audit.user_id.clone());
        record.edited_at = Some(audit.at_ms);
    }
    let payload = encode(entity)?;
    let id = entity.id().to_column();
    let is_deleted = entity.is_deleted();

    let affected = conn.execute(
        "INSERT INTO entities (
            kind,
            id,
            payload,
            is_deleted,
            row_version,
            created_by,
            created_at,
            edited_by,
            edited_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?6, ?7);",
        params![
            E::KIND,
            id,
            payload.as_str(),
            bool_to_int(is_deleted),
            token.as_bytes(),
            audit.user_id.as_str(),
            audit.at_ms,
        ],
    )?;
    debug!(
        "event=row_insert module=db status=ok kind={} id={}",
        E::KIND,
        id
    );

    let record = entity.record_mut();
    record.concurrency_token = Some(token);
    record.snapshot = Some(Snapshot {
        payload: payload.into(),
        is_deleted,
    });
    Ok(WriteOutcome::written(affected))
}

fn update_row<E: Entity>(
    conn: &Connection,
    audit: &Audit,
    entity: &mut E,
) -> StoreResult<WriteOutcome> {
    let expected = entity.record().concurrency_token.clone();
    let token = ConcurrencyToken::fresh();
    let previous_edit = {
        let record = entity.record_mut();
        let previous = (record.edited_by.take(), record.edited_at.take());
        record.edited_by = Some(audit.user_id.clone());
        record.edited_at = Some(audit.at_ms);
        previous
    };
    let payload = encode(entity)?;
    let id = entity.id().to_column();
    let is_deleted = entity.is_deleted();

    let affected = conn.execute(
        "UPDATE entities
         SET
            payload = ?1,
            is_deleted = ?2,
            row_version = ?3,
            edited_by = ?4,
            edited_at = ?5
         WHERE kind = ?6
           AND id = ?7
           AND row_version = ?8;",
        params![
            payload.as_str(),
            bool_to_int(is_deleted),
            token.as_bytes(),
            audit.user_id.as_str(),
            audit.at_ms,
            E::KIND,
            id.as_str(),
            expected.as_ref().map(ConcurrencyToken::as_bytes),
        ],
    )?;

    if affected == 0 {
        let record = entity.record_mut();
        record.edited_by = previous_edit.0;
        record.edited_at = previous_edit.1;
        debug!(
            "event=row_update module=db status=conflict kind={} id={}",
            E::KIND,
            id
        );
        return Ok(WriteOutcome {
            affected: 0,
            conflict: Some(Conflict { kind: E::KIND, id }),
        });
    }
    debug!(
        "event=row_update module=db status=ok kind={} id={} is_deleted={}",
        E::KIND,
        id,
        is_deleted
    );

    let record = entity.record_mut();
    record.concurrency_token = Some(token);
    record.snapshot = Some(Snapshot {
        payload: payload.into(),
        is_deleted,
    });
    Ok(WriteOutcome::written(affected))
}

fn is_dirty<E: Entity>(entity: &E) -> StoreResult<bool> {
    let Some(snapshot) = entity.record().snapshot.as_ref() else {
        return Ok(true);
    };
    if snapshot.is_deleted != entity.is_deleted() {
        return Ok(true);
    }
    Ok(snapshot.payload.as_ref() != encode(entity)?.as_str())
}

fn encode<E: Entity>(entity: &E) -> StoreResult<String> {
    serde_json::to_string(entity).map_err(|source| StoreError::Codec {
        kind: E::KIND,
        source,
    })
}

fn parse_entity_row<E: Entity>(row: &Row<'_>) -> StoreResult<E> {
    let id_text: String = row.get("id")?;
    let id = E::Key::parse_column(&id_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid key `{id_text}` in entities.id for kind `{}`",
            E::KIND
        ))
    })?;

    let payload: String = row.get("payload")?;
    let mut entity: E = serde_json::from_str(&payload).map_err(|source| StoreError::Codec {
        kind: E::KIND,
        source,
    })?;

    let is_deleted = match row.get::<_, i64>("is_deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_deleted value `{other}` in entities.is_deleted"
            )));
        }
    };

    {
        let record = entity.record_mut();
        record.id = id;
        record.is_deleted = is_deleted;
        record.concurrency_token = Some(ConcurrencyToken::from_bytes(row.get("row_version")?));
        record.created_by = row.get("created_by")?;
        record.created_at = row.get("created_at")?;
        record.edited_by = row.get("edited_by")?;
        record.edited_at = row.get("edited_at")?;
    }

    let snapshot = encode(&entity)?;
    entity.record_mut().snapshot = Some(Snapshot {
        payload: snapshot.into(),
        is_deleted,
    });
    Ok(entity)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::{Conflict, WriteOutcome};

    #[test]
    fn merge_keeps_first_conflict_and_sums_rows() {
        let mut outcome = WriteOutcome::written(2);
        outcome.merge(WriteOutcome {
            affected: 0,
            conflict: Some(Conflict {
                kind: "lesson",
                id: "a".to_string(),
            }),
        });
        outcome.merge(WriteOutcome {
            affected: 1,
            conflict: Some(Conflict {
                kind: "course",
                id: "b".to_string(),
            }),
        });

        assert_eq!(outcome.affected, 3);
        assert_eq!(outcome.conflict.map(|conflict| conflict.kind), Some("lesson"));
    }
}
