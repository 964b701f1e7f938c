//! Postgres-backed persistence gateway for batch transitions.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::batch::gateway::{
    EntityKind, EntityState, FieldSet, FieldUpdate, PersistenceGateway, PublishState,
    StatePredicate,
};

/// Column layout of one entity table.
struct Table {
    name: &'static str,
    pinned: Option<&'static str>,
    featured: Option<&'static str>,
    deleted: &'static str,
}

const ARTICLES: Table = Table {
    name: "articles",
    pinned: Some("is_top"),
    featured: Some("is_recommend"),
    deleted: "deleted",
};

const INTERVIEW_QUESTIONS: Table = Table {
    name: "interview_questions",
    pinned: None,
    featured: None,
    deleted: "is_deleted",
};

fn table(kind: EntityKind) -> &'static Table {
    match kind {
        EntityKind::Article => &ARTICLES,
        EntityKind::InterviewQuestion => &INTERVIEW_QUESTIONS,
    }
}

impl Table {
    fn select(&self) -> String {
        let pinned = self.pinned.unwrap_or("NULL::boolean");
        let featured = self.featured.unwrap_or("NULL::boolean");
        format!(
            "SELECT id, status, {pinned} AS pinned, {featured} AS featured, category_id, \
             {deleted} AS deleted, publish_time AS published_at, update_time AS updated_at \
             FROM {name}",
            deleted = self.deleted,
            name = self.name,
        )
    }

    fn flag_column(&self, column: Option<&'static str>, flag: &str) -> Result<&'static str> {
        column.ok_or_else(|| anyhow!("{} has no {flag} column", self.name))
    }
}

#[derive(sqlx::FromRow)]
struct EntityRow {
    id: i64,
    status: i16,
    pinned: Option<bool>,
    featured: Option<bool>,
    category_id: Option<i64>,
    deleted: bool,
    published_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntityRow> for EntityState {
    type Error = anyhow::Error;

    fn try_from(row: EntityRow) -> Result<Self> {
        let status = PublishState::from_code(row.status)
            .ok_or_else(|| anyhow!("entity {} has unknown status code {}", row.id, row.status))?;
        Ok(Self {
            id: row.id,
            status,
            pinned: row.pinned,
            featured: row.featured,
            category_id: row.category_id,
            deleted: row.deleted,
            published_at: row.published_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_states(rows: Vec<EntityRow>) -> Result<Vec<EntityState>> {
    rows.into_iter().map(EntityState::try_from).collect()
}

pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn find_matching(
        &self,
        kind: EntityKind,
        ids: &[i64],
        predicate: &StatePredicate,
    ) -> Result<Vec<EntityState>> {
        let table = table(kind);
        let condition = match *predicate {
            StatePredicate::NotDeleted => "TRUE".to_owned(),
            StatePredicate::StatusIn(_) => "status = ANY($2)".to_owned(),
            StatePredicate::Pinned(_) => format!("{} = $2", table.flag_column(table.pinned, "pinned")?),
            StatePredicate::Featured(_) => {
                format!("{} = $2", table.flag_column(table.featured, "featured")?)
            }
            StatePredicate::CategoryNot(_) => "category_id IS DISTINCT FROM $2".to_owned(),
        };
        let sql = format!(
            "{} WHERE id = ANY($1) AND NOT {} AND {condition} ORDER BY id",
            table.select(),
            table.deleted
        );

        let query = sqlx::query_as::<_, EntityRow>(&sql).bind(ids);
        let query = match *predicate {
            StatePredicate::NotDeleted => query,
            StatePredicate::StatusIn(statuses) => {
                query.bind(statuses.iter().map(|s| s.code()).collect::<Vec<i16>>())
            }
            StatePredicate::Pinned(flag) | StatePredicate::Featured(flag) => query.bind(flag),
            StatePredicate::CategoryNot(category) => query.bind(category),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to find eligible {}", table.name))?;
        into_states(rows)
    }

    async fn bulk_update(&self, kind: EntityKind, ids: &[i64], fields: &FieldSet) -> Result<u64> {
        let table = table(kind);
        if fields.updates.is_empty() {
            bail!("bulk update on {} without any field changes", table.name);
        }

        // $1 is the id list; field values follow in order, update_time last.
        let mut sets = Vec::with_capacity(fields.updates.len() + 1);
        let mut bind_idx = 1u32;
        for update in &fields.updates {
            bind_idx += 1;
            let column = match update {
                FieldUpdate::Status(_) => "status",
                FieldUpdate::PublishedAt(_) => "publish_time",
                FieldUpdate::Deleted(_) => table.deleted,
                FieldUpdate::Pinned(_) => table.flag_column(table.pinned, "pinned")?,
                FieldUpdate::Featured(_) => table.flag_column(table.featured, "featured")?,
                FieldUpdate::Category(_) => "category_id",
            };
            sets.push(format!("{column} = ${bind_idx}"));
        }
        bind_idx += 1;
        sets.push(format!("update_time = ${bind_idx}"));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ANY($1)",
            table.name,
            sets.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(ids);
        for update in &fields.updates {
            query = match *update {
                FieldUpdate::Status(status) => query.bind(status.code()),
                FieldUpdate::PublishedAt(at) => query.bind(at),
                FieldUpdate::Deleted(flag)
                | FieldUpdate::Pinned(flag)
                | FieldUpdate::Featured(flag) => query.bind(flag),
                FieldUpdate::Category(category) => query.bind(category),
            };
        }

        let result = query
            .bind(fields.updated_at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to bulk update {}", table.name))?;
        Ok(result.rows_affected())
    }

    async fn snapshot(&self, kind: EntityKind, ids: &[i64]) -> Result<Vec<EntityState>> {
        let table = table(kind);
        let sql = format!("{} WHERE id = ANY($1) ORDER BY id", table.select());
        let rows = sqlx::query_as::<_, EntityRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to snapshot {}", table.name))?;
        into_states(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_select_fills_missing_flags_with_null() {
        let sql = INTERVIEW_QUESTIONS.select();
        assert!(sql.contains("NULL::boolean AS pinned"));
        assert!(sql.contains("is_deleted AS deleted"));
        assert!(sql.ends_with("FROM interview_questions"));
    }

    #[test]
    fn missing_flag_column_is_an_error() {
        assert!(INTERVIEW_QUESTIONS.flag_column(INTERVIEW_QUESTIONS.pinned, "pinned").is_err());
        assert_eq!(ARTICLES.flag_column(ARTICLES.featured, "featured").unwrap(), "is_recommend");
    }
}
