use std::sync::Arc;

use rusqlite::Connection;

use graft_core::schema::RelationKind;
use graft_core::{Catalog, FieldValue, RecordId};

use crate::error::StorageError;
use crate::traits::{RecordRow, Storage};

/// Convert a blob column to a `RecordId` with proper error handling.
fn read_id(v: Vec<u8>, label: &str) -> Result<RecordId, StorageError> {
    let bytes: [u8; 16] = v
        .try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))?;
    Ok(RecordId::from_bytes(bytes))
}

fn map_constraint(e: rusqlite::Error, context: &str) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(context.to_string())
        }
        other => StorageError::Sqlite(other),
    }
}

pub struct SqliteStorage {
    conn: Connection,
    catalog: Arc<Catalog>,
}

impl SqliteStorage {
    pub fn open(path: &str, catalog: Arc<Catalog>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn, catalog })
    }

    pub fn open_in_memory(catalog: Arc<Catalog>) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn, catalog })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Non-nullable direct relationships must carry a target. On insert every
    /// declared non-nullable ref must be present; on update only the columns
    /// being written are checked.
    fn check_required_refs(
        &self,
        model: &str,
        refs: &[(String, Option<RecordId>)],
        insert: bool,
    ) -> Result<(), StorageError> {
        let def = self.catalog.model(model)?;
        for rel in &def.relations {
            if rel.kind == RelationKind::ManyToMany || rel.nullable {
                continue;
            }
            let provided = refs.iter().find(|(key, _)| *key == rel.name);
            match provided {
                Some((_, Some(_))) => {}
                Some((_, None)) => {
                    return Err(StorageError::ConstraintViolation(format!(
                        "{model}.{} may not be null",
                        rel.name
                    )));
                }
                None if insert => {
                    return Err(StorageError::ConstraintViolation(format!(
                        "{model}.{} may not be null",
                        rel.name
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn write_fields(
        &self,
        record_id: RecordId,
        fields: &[(String, FieldValue)],
    ) -> Result<(), StorageError> {
        for (key, value) in fields {
            let bytes = value
                .to_msgpack()
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            self.conn.execute(
                "INSERT INTO fields (record_id, field_key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(record_id, field_key) DO UPDATE SET value = excluded.value",
                rusqlite::params![record_id.as_bytes().as_slice(), key, bytes],
            )?;
        }
        Ok(())
    }

    fn write_refs(
        &self,
        record_id: RecordId,
        refs: &[(String, Option<RecordId>)],
    ) -> Result<(), StorageError> {
        for (key, target) in refs {
            match target {
                Some(target) => {
                    self.conn
                        .execute(
                            "INSERT INTO refs (record_id, field_key, target_id) VALUES (?1, ?2, ?3)
                             ON CONFLICT(record_id, field_key) DO UPDATE SET target_id = excluded.target_id",
                            rusqlite::params![
                                record_id.as_bytes().as_slice(),
                                key,
                                target.as_bytes().as_slice(),
                            ],
                        )
                        .map_err(|e| map_constraint(e, "ref target does not exist"))?;
                }
                None => {
                    self.conn.execute(
                        "DELETE FROM refs WHERE record_id = ?1 AND field_key = ?2",
                        rusqlite::params![record_id.as_bytes().as_slice(), key],
                    )?;
                }
            }
        }
        Ok(())
    }

    fn id_list(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<RecordId>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, Vec<u8>>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(read_id(row?, "record_id")?);
        }
        Ok(result)
    }
}

impl Storage for SqliteStorage {
    fn insert_record(
        &mut self,
        model: &str,
        fields: &[(String, FieldValue)],
        refs: &[(String, Option<RecordId>)],
    ) -> Result<RecordId, StorageError> {
        self.check_required_refs(model, refs, true)?;

        let record_id = RecordId::new();
        self.conn
            .execute(
                "INSERT INTO records (record_id, model) VALUES (?1, ?2)",
                rusqlite::params![record_id.as_bytes().as_slice(), model],
            )
            .map_err(|e| map_constraint(e, "record collision"))?;

        self.write_fields(record_id, fields)?;
        self.write_refs(record_id, refs)?;
        Ok(record_id)
    }

    fn update_record(
        &mut self,
        record_id: RecordId,
        fields: &[(String, FieldValue)],
        refs: &[(String, Option<RecordId>)],
    ) -> Result<(), StorageError> {
        let row = self
            .get_record(record_id)?
            .ok_or_else(|| StorageError::NotFound(record_id.to_string()))?;
        self.check_required_refs(&row.model, refs, false)?;

        self.write_fields(record_id, fields)?;
        self.write_refs(record_id, refs)?;
        Ok(())
    }

    fn get_record(&self, record_id: RecordId) -> Result<Option<RecordRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT record_id, model FROM records WHERE record_id = ?1")?;
        let mut rows = stmt.query_map(
            rusqlite::params![record_id.as_bytes().as_slice()],
            |row| {
                let id_bytes: Vec<u8> = row.get(0)?;
                let model: String = row.get(1)?;
                Ok((id_bytes, model))
            },
        )?;

        match rows.next() {
            Some(Ok((id_bytes, model))) => Ok(Some(RecordRow {
                record_id: read_id(id_bytes, "record_id")?,
                model,
            })),
            Some(Err(e)) => Err(StorageError::Sqlite(e)),
            None => Ok(None),
        }
    }

    fn get_fields(&self, record_id: RecordId) -> Result<Vec<(String, FieldValue)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field_key, value FROM fields WHERE record_id = ?1")?;
        let rows = stmt.query_map(
            rusqlite::params![record_id.as_bytes().as_slice()],
            |row| {
                let key: String = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                Ok((key, bytes))
            },
        )?;

        let mut result = Vec::new();
        for row in rows {
            let (key, bytes) = row?;
            let value = FieldValue::from_msgpack(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            result.push((key, value));
        }
        Ok(result)
    }

    fn get_field(
        &self,
        record_id: RecordId,
        field_key: &str,
    ) -> Result<Option<FieldValue>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM fields WHERE record_id = ?1 AND field_key = ?2")?;
        let mut rows = stmt.query_map(
            rusqlite::params![record_id.as_bytes().as_slice(), field_key],
            |row| row.get::<_, Vec<u8>>(0),
        )?;

        match rows.next() {
            Some(Ok(bytes)) => {
                let value = FieldValue::from_msgpack(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Some(Err(e)) => Err(StorageError::Sqlite(e)),
            None => Ok(None),
        }
    }

    fn get_ref(
        &self,
        record_id: RecordId,
        field_key: &str,
    ) -> Result<Option<RecordId>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT target_id FROM refs WHERE record_id = ?1 AND field_key = ?2")?;
        let mut rows = stmt.query_map(
            rusqlite::params![record_id.as_bytes().as_slice(), field_key],
            |row| row.get::<_, Vec<u8>>(0),
        )?;

        match rows.next() {
            Some(Ok(bytes)) => Ok(Some(read_id(bytes, "target_id")?)),
            Some(Err(e)) => Err(StorageError::Sqlite(e)),
            None => Ok(None),
        }
    }

    fn set_ref(
        &mut self,
        record_id: RecordId,
        field_key: &str,
        target: Option<RecordId>,
    ) -> Result<(), StorageError> {
        self.write_refs(record_id, &[(field_key.to_string(), target)])
    }

    fn referencing(
        &self,
        model: &str,
        field_key: &str,
        target: RecordId,
    ) -> Result<Vec<RecordId>, StorageError> {
        self.id_list(
            "SELECT r.record_id FROM refs r
             JOIN records rec ON rec.record_id = r.record_id
             WHERE rec.model = ?1 AND r.field_key = ?2 AND r.target_id = ?3
             ORDER BY r.record_id",
            rusqlite::params![model, field_key, target.as_bytes().as_slice()],
        )
    }

    fn links_from(
        &self,
        model: &str,
        field_key: &str,
        source: RecordId,
    ) -> Result<Vec<RecordId>, StorageError> {
        self.id_list(
            "SELECT target_id FROM links
             WHERE model = ?1 AND field_key = ?2 AND source_id = ?3
             ORDER BY target_id",
            rusqlite::params![model, field_key, source.as_bytes().as_slice()],
        )
    }

    fn links_to(
        &self,
        model: &str,
        field_key: &str,
        target: RecordId,
    ) -> Result<Vec<RecordId>, StorageError> {
        self.id_list(
            "SELECT source_id FROM links
             WHERE model = ?1 AND field_key = ?2 AND target_id = ?3
             ORDER BY source_id",
            rusqlite::params![model, field_key, target.as_bytes().as_slice()],
        )
    }

    fn set_links_direct(
        &mut self,
        model: &str,
        field_key: &str,
        source: RecordId,
        targets: &[RecordId],
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM links WHERE model = ?1 AND field_key = ?2 AND source_id = ?3",
            rusqlite::params![model, field_key, source.as_bytes().as_slice()],
        )?;
        for target in targets {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO links (model, field_key, source_id, target_id) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        model,
                        field_key,
                        source.as_bytes().as_slice(),
                        target.as_bytes().as_slice(),
                    ],
                )
                .map_err(|e| map_constraint(e, "link member does not exist"))?;
        }
        Ok(())
    }

    fn set_links_reverse(
        &mut self,
        model: &str,
        field_key: &str,
        target: RecordId,
        sources: &[RecordId],
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM links WHERE model = ?1 AND field_key = ?2 AND target_id = ?3",
            rusqlite::params![model, field_key, target.as_bytes().as_slice()],
        )?;
        for source in sources {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO links (model, field_key, source_id, target_id) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        model,
                        field_key,
                        source.as_bytes().as_slice(),
                        target.as_bytes().as_slice(),
                    ],
                )
                .map_err(|e| map_constraint(e, "link member does not exist"))?;
        }
        Ok(())
    }

    fn count_records(&self, model: &str) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE model = ?1",
            rusqlite::params![model],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_links(&self, model: &str, field_key: &str) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM links WHERE model = ?1 AND field_key = ?2",
            rusqlite::params![model, field_key],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Arc<Catalog> {
        let mut b = Catalog::builder();
        b.model("owner").scalar("name");
        b.model("item")
            .scalar("label")
            .many_to_one("owner", "owner", false, None)
            .many_to_many("peers", "item", Some("peer_of"));
        Arc::new(b.build().unwrap())
    }

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory(catalog()).unwrap()
    }

    #[test]
    fn insert_assigns_pk_and_persists_fields() {
        let mut s = storage();
        let owner = s
            .insert_record("owner", &[("name".into(), FieldValue::Text("ada".into()))], &[])
            .unwrap();

        let row = s.get_record(owner).unwrap().unwrap();
        assert_eq!(row.model, "owner");
        assert_eq!(
            s.get_field(owner, "name").unwrap(),
            Some(FieldValue::Text("ada".into()))
        );
        assert_eq!(s.count_records("owner").unwrap(), 1);
    }

    #[test]
    fn missing_required_ref_is_a_constraint_violation() {
        let mut s = storage();
        let err = s
            .insert_record("item", &[("label".into(), FieldValue::Text("x".into()))], &[])
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[test]
    fn explicit_null_required_ref_rejected_on_update() {
        let mut s = storage();
        let owner = s.insert_record("owner", &[], &[]).unwrap();
        let item = s
            .insert_record("item", &[], &[("owner".into(), Some(owner))])
            .unwrap();

        let err = s
            .update_record(item, &[], &[("owner".into(), None)])
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[test]
    fn referencing_finds_reverse_members() {
        let mut s = storage();
        let owner = s.insert_record("owner", &[], &[]).unwrap();
        let a = s
            .insert_record("item", &[], &[("owner".into(), Some(owner))])
            .unwrap();
        let b = s
            .insert_record("item", &[], &[("owner".into(), Some(owner))])
            .unwrap();

        let mut members = s.referencing("item", "owner", owner).unwrap();
        members.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(members, expected);
    }

    #[test]
    fn link_replacement_is_exact() {
        let mut s = storage();
        let owner = s.insert_record("owner", &[], &[]).unwrap();
        let a = s
            .insert_record("item", &[], &[("owner".into(), Some(owner))])
            .unwrap();
        let b = s
            .insert_record("item", &[], &[("owner".into(), Some(owner))])
            .unwrap();
        let c = s
            .insert_record("item", &[], &[("owner".into(), Some(owner))])
            .unwrap();

        s.set_links_direct("item", "peers", a, &[b, c]).unwrap();
        assert_eq!(s.links_from("item", "peers", a).unwrap().len(), 2);

        s.set_links_direct("item", "peers", a, &[b]).unwrap();
        assert_eq!(s.links_from("item", "peers", a).unwrap(), vec![b]);
        assert_eq!(s.links_to("item", "peers", b).unwrap(), vec![a]);
        assert_eq!(s.count_links("item", "peers").unwrap(), 1);
    }

    #[test]
    fn rollback_discards_partial_writes() {
        let mut s = storage();
        s.begin().unwrap();
        s.insert_record("owner", &[], &[]).unwrap();
        s.rollback().unwrap();
        assert_eq!(s.count_records("owner").unwrap(), 0);
    }

    #[test]
    fn reopens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.db");
        let path = path.to_str().unwrap();

        let id = {
            let mut s = SqliteStorage::open(path, catalog()).unwrap();
            s.insert_record("owner", &[("name".into(), FieldValue::Text("ada".into()))], &[])
                .unwrap()
        };

        let s = SqliteStorage::open(path, catalog()).unwrap();
        assert_eq!(
            s.get_field(id, "name").unwrap(),
            Some(FieldValue::Text("ada".into()))
        );
    }
}
