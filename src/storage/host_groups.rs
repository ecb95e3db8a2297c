//! HostGroupRepository (spec.md §4.3).
//!
//! The parent graph is a forest: deleting a group does not cascade — child
//! groups and member hosts have their `parent_id`/`group_id` foreign keys
//! set to `NULL` by the schema's `ON DELETE SET NULL` (migrations.rs v2).

use tracing::instrument;

use crate::error::{NetPulseError, NetPulseResult};

use super::engine::{Storage, time};
use super::models::HostGroup;

#[derive(Clone)]
pub struct HostGroupRepository {
    storage: Storage,
}

impl HostGroupRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, group), fields(name = %group.name))]
    pub async fn insert(&self, group: &HostGroup) -> NetPulseResult<i64> {
        if group.name.trim().is_empty() {
            return Err(NetPulseError::validation("name must not be empty"));
        }
        let result = sqlx::query(
            "INSERT INTO host_groups (name, description, parent_id, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.parent_id)
        .bind(time::to_sql(&group.created_at))
        .execute(self.storage.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, group: &HostGroup) -> NetPulseResult<()> {
        if group.name.trim().is_empty() {
            return Err(NetPulseError::validation("name must not be empty"));
        }
        let result = sqlx::query(
            "UPDATE host_groups SET name = ?, description = ?, parent_id = ? WHERE id = ?",
        )
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.parent_id)
        .bind(group.id)
        .execute(self.storage.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(NetPulseError::not_found(format!(
                "host group {} not found",
                group.id
            )));
        }
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> NetPulseResult<()> {
        let result = sqlx::query("DELETE FROM host_groups WHERE id = ?")
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(NetPulseError::not_found(format!(
                "host group {id} not found"
            )));
        }
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> NetPulseResult<Option<HostGroup>> {
        let row = sqlx::query_as::<_, GroupRow>("SELECT * FROM host_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(self.storage.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn find_all(&self) -> NetPulseResult<Vec<HostGroup>> {
        let rows = sqlx::query_as::<_, GroupRow>("SELECT * FROM host_groups ORDER BY name ASC")
            .fetch_all(self.storage.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_root_groups(&self) -> NetPulseResult<Vec<HostGroup>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT * FROM host_groups WHERE parent_id IS NULL ORDER BY name ASC",
        )
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_by_parent_id(&self, parent_id: i64) -> NetPulseResult<Vec<HostGroup>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT * FROM host_groups WHERE parent_id = ? ORDER BY name ASC",
        )
        .bind(parent_id)
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    description: String,
    parent_id: Option<i64>,
    created_at: String,
}

impl From<GroupRow> for HostGroup {
    fn from(row: GroupRow) -> Self {
        HostGroup {
            id: row.id,
            name: row.name,
            description: row.description,
            parent_id: row.parent_id,
            created_at: time::from_sql(&row.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_group(name: &str, parent_id: Option<i64>) -> HostGroup {
        HostGroup {
            id: 0,
            name: name.to_string(),
            description: String::new(),
            parent_id,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delete_sets_children_parent_to_null() {
        let storage = Storage::open_in_memory().await.unwrap();
        let repo = HostGroupRepository::new(storage);

        let parent_id = repo.insert(&new_group("datacenter", None)).await.unwrap();
        let child_id = repo
            .insert(&new_group("rack-1", Some(parent_id)))
            .await
            .unwrap();

        repo.remove(parent_id).await.unwrap();

        let child = repo.find_by_id(child_id).await.unwrap().unwrap();
        assert_eq!(child.parent_id, None);
    }

    #[tokio::test]
    async fn root_groups_excludes_children() {
        let storage = Storage::open_in_memory().await.unwrap();
        let repo = HostGroupRepository::new(storage);

        let parent_id = repo.insert(&new_group("datacenter", None)).await.unwrap();
        repo.insert(&new_group("rack-1", Some(parent_id)))
            .await
            .unwrap();

        let roots = repo.find_root_groups().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, "datacenter");
    }
}
