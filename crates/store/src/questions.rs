use {
    soulxbot_common::{Error, Result},
    tracing::info,
};

use crate::{Store, models::Question};

/// A question skipped more often than this is disabled.
pub const SKIP_LIMIT: i64 = 2;

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    text: String,
    disabled: i32,
    skip_count: i64,
}

impl From<QuestionRow> for Question {
    fn from(r: QuestionRow) -> Self {
        Self {
            id: r.id,
            text: r.text,
            disabled: r.disabled != 0,
            skip_count: r.skip_count,
        }
    }
}

impl Store {
    /// Add a question. Duplicate text is a [`Error::Conflict`].
    pub async fn create_question(&self, text: &str) -> Result<Question> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::BadRequest("question text must not be empty".into()));
        }
        let row = sqlx::query_as::<_, QuestionRow>(
            "INSERT INTO question (text) VALUES (?) RETURNING id, text, disabled, skip_count",
        )
        .bind(text)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn find_question(&self, id: i64) -> Result<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, text, disabled, skip_count FROM question WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// A random enabled question that was never pinned to one of
    /// `owner_id`'s sessions.
    pub async fn random_question(&self, owner_id: i64) -> Result<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>(
            r#"SELECT q.id, q.text, q.disabled, q.skip_count FROM question q
               WHERE q.disabled = 0
                 AND NOT EXISTS (
                   SELECT 1 FROM session s WHERE s.user_id = ? AND s.qotd_id = q.id
                 )
               ORDER BY RANDOM()
               LIMIT 1"#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Count a skip. The question is disabled once its count passes
    /// [`SKIP_LIMIT`].
    pub async fn skip_question(&self, id: i64) -> Result<Question> {
        let question: Question = sqlx::query_as::<_, QuestionRow>(
            r#"UPDATE question SET
                 skip_count = skip_count + 1,
                 disabled = CASE WHEN skip_count + 1 > ? THEN 1 ELSE disabled END
               WHERE id = ?
               RETURNING id, text, disabled, skip_count"#,
        )
        .bind(SKIP_LIMIT)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("question {id}")))?
        .into();

        if question.disabled && question.skip_count == SKIP_LIMIT + 1 {
            info!(question_id = id, "question disabled after repeated skips");
        }
        Ok(question)
    }
}
