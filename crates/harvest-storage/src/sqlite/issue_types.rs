//! Mirror of the configured issue type hierarchy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use harvest_core::hierarchy::{IssueType, TypeId};

use crate::error::Result;
use crate::sqlite::issues::format_datetime;
use crate::sqlite::store::SqliteStore;
use crate::traits::TypeSyncSummary;

impl SqliteStore {
    /// Replaces the stored type table with `types` in one transaction.
    pub fn sync_issue_types_impl(
        &self,
        types: &[IssueType],
        at: DateTime<Utc>,
    ) -> Result<TypeSyncSummary> {
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut existing: HashMap<TypeId, (String, String)> = HashMap::new();
        {
            let mut stmt = tx.prepare("SELECT id, name, children FROM issue_types")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, TypeId>(0)?, row.get(1)?, row.get(2)?))
            })?;
            for row in rows {
                let (id, name, children) = row?;
                existing.insert(id, (name, children));
            }
        }

        let mut summary = TypeSyncSummary::default();
        let synced_at = format_datetime(&at);
        for ty in types {
            let children = serde_json::to_string(&ty.children)?;
            match existing.remove(&ty.id) {
                None => summary.added += 1,
                Some((name, stored)) if name != ty.name || stored != children => {
                    summary.updated += 1
                }
                Some(_) => {}
            }
            tx.execute(
                "INSERT INTO issue_types (id, name, children, synced_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name, children = excluded.children,
                     synced_at = excluded.synced_at",
                params![ty.id, ty.name, children, synced_at],
            )?;
        }

        for id in existing.keys() {
            tx.execute("DELETE FROM issue_types WHERE id = ?1", params![id])?;
            summary.removed += 1;
        }

        tx.commit()?;
        debug!(?summary, "issue types synced");
        Ok(summary)
    }

    pub fn list_issue_types_impl(&self) -> Result<Vec<IssueType>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT id, name, children FROM issue_types ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, TypeId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut types = Vec::new();
        for row in rows {
            let (id, name, children) = row?;
            let children: Vec<TypeId> = serde_json::from_str(&children)?;
            types.push(IssueType::new(id, name, children));
        }
        Ok(types)
    }
}
