use crate::{db::Db, errors::ApiError, models::UploadRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence for upload records. Records are only ever created.
#[async_trait]
pub trait UploadRepository: Send + Sync {
    async fn create(&self, file: &str, uploaded_at: DateTime<Utc>) -> Result<UploadRecord, ApiError>;
}

pub struct SqliteUploadRepository {
    db: Db,
}

impl SqliteUploadRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UploadRepository for SqliteUploadRepository {
    async fn create(&self, file: &str, uploaded_at: DateTime<Utc>) -> Result<UploadRecord, ApiError> {
        let result = sqlx::query("INSERT INTO uploads(file, uploaded_at) VALUES (?, ?)")
            .bind(file)
            .bind(uploaded_at)
            .execute(&self.db.0)
            .await?;

        Ok(UploadRecord {
            id: result.last_insert_rowid(),
            file: file.to_string(),
            uploaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;
    use sqlx::Row;

    #[actix_web::test]
    async fn create_inserts_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");
        let db = Db::connect_and_migrate(path.to_str().unwrap()).await.unwrap();
        let repo = SqliteUploadRepository::new(db.clone());

        let now = Utc::now().trunc_subsecs(6);
        let first = repo.create("uploads/a.txt", now).await.unwrap();
        let second = repo.create("uploads/b.txt", now).await.unwrap();
        assert_ne!(first.id, second.id);

        let row = sqlx::query("SELECT file, uploaded_at FROM uploads WHERE id = ?")
            .bind(first.id)
            .fetch_one(&db.0)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("file"), "uploads/a.txt");
        assert_eq!(row.get::<DateTime<Utc>, _>("uploaded_at"), now);
    }

    #[actix_web::test]
    async fn records_can_be_read_back_as_models() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");
        let db = Db::connect_and_migrate(path.to_str().unwrap()).await.unwrap();
        let created = SqliteUploadRepository::new(db.clone())
            .create("uploads/c.txt", Utc::now().trunc_subsecs(6))
            .await
            .unwrap();

        let fetched: UploadRecord = sqlx::query_as("SELECT id, file, uploaded_at FROM uploads WHERE id = ?")
            .bind(created.id)
            .fetch_one(&db.0)
            .await
            .unwrap();
        assert_eq!(fetched, created);
    }
}
