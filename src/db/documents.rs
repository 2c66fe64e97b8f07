//! SQLite-backed document store.
//!
//! Documents live in a single `documents` table keyed by tenant, doctype and
//! ID, with the JSON body stored as text. Views are computed with SQLite's
//! JSON functions.

use crate::store::doctypes::PERMISSIONS;
use crate::store::{DocumentStore, FindRequest, RawDoc, StoreError, View, ViewRequest, ViewRow};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// [`DocumentStore`] over a SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Couch-style revision: `<generation>-<random>`.
fn next_rev(rev: Option<&str>) -> String {
    let generation = rev
        .and_then(|r| r.split('-').next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

fn parse_body(id: &str, body: &str) -> Result<Value, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Backend(format!("corrupt document {id}: {e}")))
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn missing_or_conflict(&self, tenant: &str, doctype: &str, id: &str) -> StoreError {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM documents WHERE tenant = ? AND doctype = ? AND id = ?",
        )
        .bind(tenant)
        .bind(doctype)
        .bind(id)
        .fetch_one(&self.pool)
        .await;

        match exists {
            Ok(0) => StoreError::not_found(doctype, id),
            Ok(_) => StoreError::conflict(doctype, id),
            Err(e) => backend(e),
        }
    }

    /// `permissions-by-code` and `permissions-by-shortcode`.
    async fn view_codes(&self, tenant: &str, path: &str, req: &ViewRequest) -> Result<Vec<ViewRow>, StoreError> {
        let mut rows = Vec::new();
        for key in &req.keys {
            let Some(code) = key.as_str() else {
                continue;
            };
            let found = sqlx::query_as::<_, (String, String, String, String)>(
                r#"
                SELECT d.id, d.rev, d.body, c.key
                FROM documents d, json_each(d.body, ?) c
                WHERE d.tenant = ? AND d.doctype = ? AND c.value = ?
                ORDER BY d.id
                "#,
            )
            .bind(path)
            .bind(tenant)
            .bind(PERMISSIONS)
            .bind(code)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

            for (id, rev, body, email) in found {
                let doc = if req.include_docs {
                    Some(RawDoc {
                        body: parse_body(&id, &body)?,
                        id: id.clone(),
                        rev,
                    })
                } else {
                    None
                };
                rows.push(ViewRow {
                    id,
                    key: key.clone(),
                    value: Value::String(email),
                    doc,
                });
            }
        }
        Ok(rows)
    }

    /// `permissions-by-doc`: one row per (share document, rule, value).
    async fn view_by_doc(&self, tenant: &str, req: &ViewRequest) -> Result<Vec<ViewRow>, StoreError> {
        let mut rows = Vec::new();
        for key in &req.keys {
            let Some([doctype, selector, value]) = key.as_array().and_then(|k| {
                let parts: Vec<&str> = k.iter().filter_map(Value::as_str).collect();
                <[&str; 3]>::try_from(parts).ok()
            }) else {
                continue;
            };
            let found = sqlx::query_as::<_, (String, Option<String>)>(
                r#"
                SELECT d.id, json_extract(r.value, '$.verbs')
                FROM documents d,
                     json_each(d.body, '$.permissions') r,
                     json_each(r.value, '$.values') v
                WHERE d.tenant = ? AND d.doctype = ?
                  AND json_extract(d.body, '$.type') LIKE 'share%'
                  AND json_extract(r.value, '$.type') = ?
                  AND coalesce(json_extract(r.value, '$.selector'), '_id') = ?
                  AND v.value = ?
                ORDER BY d.id
                "#,
            )
            .bind(tenant)
            .bind(PERMISSIONS)
            .bind(doctype)
            .bind(selector)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

            for (id, verbs) in found {
                let verbs = match verbs {
                    Some(raw) => parse_body(&id, &raw)?,
                    None => Value::Null,
                };
                rows.push(ViewRow {
                    id,
                    key: key.clone(),
                    value: verbs,
                    doc: None,
                });
            }
        }
        Ok(rows)
    }

    /// `permissions-by-doctype`: documents of a permission type with a rule on a doctype.
    async fn view_by_doctype(&self, tenant: &str, req: &ViewRequest) -> Result<Vec<ViewRow>, StoreError> {
        let mut rows = Vec::new();
        for key in &req.keys {
            let Some([doctype, perm_type]) = key.as_array().and_then(|k| {
                let parts: Vec<&str> = k.iter().filter_map(Value::as_str).collect();
                <[&str; 2]>::try_from(parts).ok()
            }) else {
                continue;
            };
            let found = sqlx::query_as::<_, (String, String, String)>(
                r#"
                SELECT DISTINCT d.id, d.rev, d.body
                FROM documents d, json_each(d.body, '$.permissions') r
                WHERE d.tenant = ? AND d.doctype = ?
                  AND json_extract(r.value, '$.type') = ?
                  AND json_extract(d.body, '$.type') = ?
                ORDER BY d.id
                "#,
            )
            .bind(tenant)
            .bind(PERMISSIONS)
            .bind(doctype)
            .bind(perm_type)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

            for (id, rev, body) in found {
                let doc = if req.include_docs {
                    Some(RawDoc {
                        body: parse_body(&id, &body)?,
                        id: id.clone(),
                        rev,
                    })
                } else {
                    None
                };
                rows.push(ViewRow {
                    id,
                    key: key.clone(),
                    value: Value::Null,
                    doc,
                });
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create(&self, tenant: &str, doctype: &str, id: Option<&str>, body: Value) -> Result<RawDoc, StoreError> {
        let id = id.map_or_else(|| Uuid::new_v4().simple().to_string(), str::to_string);
        let rev = next_rev(None);
        sqlx::query("INSERT INTO documents (tenant, doctype, id, rev, body) VALUES (?, ?, ?, ?, ?)")
            .bind(tenant)
            .bind(doctype)
            .bind(&id)
            .bind(&rev)
            .bind(body.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return StoreError::conflict(doctype, &id);
                }
                backend(e)
            })?;

        Ok(RawDoc { id, rev, body })
    }

    async fn get(&self, tenant: &str, doctype: &str, id: &str) -> Result<RawDoc, StoreError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT rev, body FROM documents WHERE tenant = ? AND doctype = ? AND id = ?",
        )
        .bind(tenant)
        .bind(doctype)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let (rev, body) = row.ok_or_else(|| StoreError::not_found(doctype, id))?;
        Ok(RawDoc {
            id: id.to_string(),
            rev,
            body: parse_body(id, &body)?,
        })
    }

    async fn update(
        &self,
        tenant: &str,
        doctype: &str,
        id: &str,
        rev: &str,
        body: Value,
    ) -> Result<String, StoreError> {
        let new_rev = next_rev(Some(rev));
        let result = sqlx::query(
            r#"
            UPDATE documents SET rev = ?, body = ?
            WHERE tenant = ? AND doctype = ? AND id = ? AND rev = ?
            "#,
        )
        .bind(&new_rev)
        .bind(body.to_string())
        .bind(tenant)
        .bind(doctype)
        .bind(id)
        .bind(rev)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(self.missing_or_conflict(tenant, doctype, id).await);
        }
        Ok(new_rev)
    }

    async fn delete(&self, tenant: &str, doctype: &str, id: &str, rev: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE tenant = ? AND doctype = ? AND id = ? AND rev = ?")
            .bind(tenant)
            .bind(doctype)
            .bind(id)
            .bind(rev)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(self.missing_or_conflict(tenant, doctype, id).await);
        }
        Ok(())
    }

    async fn find(&self, tenant: &str, doctype: &str, req: &FindRequest) -> Result<Vec<RawDoc>, StoreError> {
        let mut sql = String::from("SELECT id, rev, body FROM documents WHERE tenant = ? AND doctype = ?");
        for _ in &req.selector {
            sql.push_str(" AND json_extract(body, ?) = ?");
        }
        sql.push_str(" ORDER BY id LIMIT ?");

        let mut query = sqlx::query_as::<_, (String, String, String)>(&sql)
            .bind(tenant)
            .bind(doctype);
        for (field, value) in &req.selector {
            query = query.bind(format!("$.{field}")).bind(value.as_str());
        }
        let rows = query
            .bind(i64::try_from(req.limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        debug!(index = req.index, doctype = %doctype, count = rows.len(), "find");

        rows.into_iter()
            .map(|(id, rev, body)| {
                Ok(RawDoc {
                    body: parse_body(&id, &body)?,
                    id,
                    rev,
                })
            })
            .collect()
    }

    async fn exec_view(&self, tenant: &str, view: View, req: &ViewRequest) -> Result<Vec<ViewRow>, StoreError> {
        let rows = match view {
            View::PermissionsByCode => self.view_codes(tenant, "$.codes", req).await?,
            View::PermissionsByShortcode => self.view_codes(tenant, "$.shortcodes", req).await?,
            View::PermissionsByDoc => self.view_by_doc(tenant, req).await?,
            View::PermissionsByDoctype => self.view_by_doctype(tenant, req).await?,
        };
        Ok(rows
            .into_iter()
            .skip(req.skip)
            .take(req.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn all_docs(
        &self,
        tenant: &str,
        doctype: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<RawDoc>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT id, rev, body FROM documents
            WHERE tenant = ? AND doctype = ?
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(tenant)
        .bind(doctype)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|(id, rev, body)| {
                Ok(RawDoc {
                    body: parse_body(&id, &body)?,
                    id,
                    rev,
                })
            })
            .collect()
    }

    async fn bulk_delete(&self, tenant: &str, doctype: &str, docs: &[(String, String)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut failed = 0usize;
        for (id, rev) in docs {
            let result =
                sqlx::query("DELETE FROM documents WHERE tenant = ? AND doctype = ? AND id = ? AND rev = ?")
                    .bind(tenant)
                    .bind(doctype)
                    .bind(id)
                    .bind(rev)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
            if result.rows_affected() == 0 {
                failed += 1;
            }
        }
        tx.commit().await.map_err(backend)?;

        if failed > 0 {
            return Err(StoreError::Backend(format!(
                "{failed} of {} documents could not be deleted",
                docs.len()
            )));
        }
        Ok(())
    }
}
