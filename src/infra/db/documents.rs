use std::str::FromStr;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{DocumentsRepo, RepoError},
    domain::documents::{DocumentKind, DocumentRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    kind: String,
    owner_account_id: String,
    title: String,
    body: String,
    updated_at: OffsetDateTime,
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = RepoError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let kind = DocumentKind::from_str(&row.kind)
            .map_err(|_| RepoError::from_persistence(format!("unknown kind `{}`", row.kind)))?;
        Ok(Self {
            id: row.id,
            kind,
            owner_account_id: row.owner_account_id,
            title: row.title,
            body: row.body,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl DocumentsRepo for PostgresRepositories {
    async fn fetch_document(
        &self,
        kind: DocumentKind,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, RepoError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id,
                   kind,
                   owner_account_id,
                   title,
                   body,
                   updated_at
            FROM documents
            WHERE id = $1 AND kind = $2
            "#,
        )
        .bind(document_id)
        .bind(kind.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(DocumentRecord::try_from).transpose()
    }
}
