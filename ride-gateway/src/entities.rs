//! CRUD over the `Driver` and `Passenger` thin entities. No behavior beyond persistence, so this
//! is one generic implementation parameterized by table name rather than one module per entity.

use std::sync::Arc;

use ride_store::{Repository, Row, StoreError};

pub struct EntityTable {
    repo: Arc<dyn Repository>,
    table: &'static str,
}

pub struct EntityRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

fn row_to_record(row: Row) -> Result<EntityRecord, StoreError> {
    Ok(EntityRecord {
        id: row.get_i64("id").ok_or_else(|| StoreError::Query("missing id".into()))?,
        name: row.get_text("name").ok_or_else(|| StoreError::Query("missing name".into()))?.to_owned(),
        email: row.get_text("email").ok_or_else(|| StoreError::Query("missing email".into()))?.to_owned(),
        phone: row.get_text("phone").ok_or_else(|| StoreError::Query("missing phone".into()))?.to_owned(),
    })
}

impl EntityTable {
    pub fn new(repo: Arc<dyn Repository>, table: &'static str) -> Self {
        Self { repo, table }
    }

    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (id SERIAL PRIMARY KEY, name TEXT NOT NULL, email TEXT NOT NULL UNIQUE, phone TEXT NOT NULL)",
            self.table
        );
        self.repo.create_table(&ddl).await
    }

    pub async fn create(&self, name: &str, email: &str, phone: &str) -> Result<EntityRecord, StoreError> {
        let mut tx = self.repo.begin_transaction().await?;
        let insert = format!(
            "INSERT INTO {} (name, email, phone) VALUES ($1, $2, $3) RETURNING id",
            self.table
        );
        let row = tx
            .query_row(&insert, &[name.into(), email.into(), phone.into()])
            .await?
            .ok_or_else(|| StoreError::Query("insert returned no row".into()))?;
        let id = row.get_i64("id").ok_or_else(|| StoreError::Query("missing id".into()))?;
        tx.commit().await?;

        Ok(EntityRecord { id, name: name.to_owned(), email: email.to_owned(), phone: phone.to_owned() })
    }

    pub async fn get(&self, id: i64) -> Result<Option<EntityRecord>, StoreError> {
        let rows = self.repo.query(&format!("SELECT * FROM {} WHERE id = $1", self.table), &[id.into()]).await?;
        rows.into_iter().next().map(row_to_record).transpose()
    }

    pub async fn list(&self) -> Result<Vec<EntityRecord>, StoreError> {
        let rows = self.repo.query(&format!("SELECT * FROM {} ORDER BY id", self.table), &[]).await?;
        rows.into_iter().map(row_to_record).collect()
    }

    pub async fn update(&self, id: i64, name: &str, email: &str, phone: &str) -> Result<Option<EntityRecord>, StoreError> {
        let mut tx = self.repo.begin_transaction().await?;
        let update = format!("UPDATE {} SET name = $1, email = $2, phone = $3 WHERE id = $4", self.table);
        let affected = tx.exec(&update, &[name.into(), email.into(), phone.into(), id.into()]).await?;
        tx.commit().await?;

        if affected == 0 {
            return Ok(None);
        }
        Ok(Some(EntityRecord { id, name: name.to_owned(), email: email.to_owned(), phone: phone.to_owned() }))
    }

    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.repo.begin_transaction().await?;
        let affected = tx.exec(&format!("DELETE FROM {} WHERE id = $1", self.table), &[id.into()]).await?;
        tx.commit().await?;
        Ok(affected > 0)
    }
}
