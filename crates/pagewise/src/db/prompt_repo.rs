//! Prompt library repository: saved, reusable prompt templates.

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

/// A saved prompt row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub role_prompt: String,
    pub task_prompt: String,
    pub context_prompt: String,
    pub format_prompt: String,
    pub constraints_prompt: String,
    pub created_at: String,
    pub created_by: Option<String>,
    pub tags: Option<String>,
    pub use_count: u64,
    pub last_used_at: Option<String>,
}

impl PromptRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            role_prompt: row.get("role_prompt")?,
            task_prompt: row.get("task_prompt")?,
            context_prompt: row.get("context_prompt")?,
            format_prompt: row.get("format_prompt")?,
            constraints_prompt: row.get("constraints_prompt")?,
            created_at: row.get("created_at")?,
            created_by: row.get("created_by")?,
            tags: row.get("tags")?,
            use_count: row.get("use_count")?,
            last_used_at: row.get("last_used_at")?,
        })
    }
}

/// Fields accepted when saving a prompt. `id`, `use_count` and
/// `last_used_at` are assigned by the database.
#[derive(Debug, Clone, Default)]
pub struct NewPromptRow {
    pub name: String,
    pub description: Option<String>,
    pub role_prompt: String,
    pub task_prompt: String,
    pub context_prompt: String,
    pub format_prompt: String,
    pub constraints_prompt: String,
    pub created_at: String,
    pub created_by: Option<String>,
    pub tags: Option<String>,
}

/// A searchable prompt column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptField {
    Name,
    Description,
    Role,
    Task,
    Context,
    Format,
    Constraints,
    Tags,
}

impl PromptField {
    /// Name plus the five prompt bodies; used when no field is chosen.
    pub const DEFAULT: &'static [PromptField] = &[
        PromptField::Name,
        PromptField::Role,
        PromptField::Task,
        PromptField::Context,
        PromptField::Format,
        PromptField::Constraints,
    ];

    fn column(self) -> &'static str {
        match self {
            PromptField::Name => "name",
            PromptField::Description => "description",
            PromptField::Role => "role_prompt",
            PromptField::Task => "task_prompt",
            PromptField::Context => "context_prompt",
            PromptField::Format => "format_prompt",
            PromptField::Constraints => "constraints_prompt",
            PromptField::Tags => "tags",
        }
    }
}

/// Query filter for prompt search.
#[derive(Debug, Clone, Default)]
pub struct PromptFilter {
    /// Substring matched with `LIKE` against `fields`.
    pub text: Option<String>,
    /// Columns searched for `text`. Empty means [`PromptField::DEFAULT`].
    pub fields: Vec<PromptField>,
    /// Substring matched against the comma-separated tag list.
    pub tags: Option<String>,
    pub created_by: Option<String>,
    pub limit: Option<u64>,
}

/// Inserts a prompt and returns its new id.
pub fn insert(db: &Database, prompt: &NewPromptRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO prompts (name, description, role_prompt, task_prompt, context_prompt,
             format_prompt, constraints_prompt, created_at, created_by, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                prompt.name,
                prompt.description,
                prompt.role_prompt,
                prompt.task_prompt,
                prompt.context_prompt,
                prompt.format_prompt,
                prompt.constraints_prompt,
                prompt.created_at,
                prompt.created_by,
                prompt.tags,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Searches prompts, newest first.
pub fn search(db: &Database, filter: &PromptFilter) -> Result<Vec<PromptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(text) = filter.text.as_deref().filter(|t| !t.is_empty()) {
            let fields = if filter.fields.is_empty() {
                PromptField::DEFAULT
            } else {
                filter.fields.as_slice()
            };
            let pattern = format!("%{}%", text);
            let mut ors = Vec::with_capacity(fields.len());
            for field in fields {
                ors.push(format!("{} LIKE ?{}", field.column(), param_values.len() + 1));
                param_values.push(Box::new(pattern.clone()));
            }
            conditions.push(format!("({})", ors.join(" OR ")));
        }
        if let Some(ref tags) = filter.tags {
            conditions.push(format!("tags LIKE ?{}", param_values.len() + 1));
            param_values.push(Box::new(format!("%{}%", tags)));
        }
        if let Some(ref created_by) = filter.created_by {
            conditions.push(format!("created_by = ?{}", param_values.len() + 1));
            param_values.push(Box::new(created_by.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.unwrap_or(100) as i64;
        param_values.push(Box::new(limit));
        let sql = format!(
            "SELECT * FROM prompts {} ORDER BY created_at DESC, id DESC LIMIT ?{}",
            where_clause,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), PromptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Fetches a prompt and records the use: `use_count` is incremented and
/// `last_used_at` set to `now` before the row is read back.
pub fn get_and_mark_used(
    db: &Database,
    id: i64,
    now: &str,
) -> Result<Option<PromptRow>, DatabaseError> {
    db.with_transaction(|tx| {
        let changed = tx.execute(
            "UPDATE prompts SET use_count = use_count + 1, last_used_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let row = tx.query_row(
            "SELECT * FROM prompts WHERE id = ?1",
            params![id],
            PromptRow::from_row,
        )?;
        Ok(Some(row))
    })
}

/// Deletes a prompt. Returns `false` if no such prompt existed.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM prompts WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}
