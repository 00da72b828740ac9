use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, FromRow};

use crate::duty::Duty;
use crate::users::{NewUser, User};

pub type DbPool = SqlitePool;

pub async fn init_db(database_url: &str) -> Result<DbPool> {
    let pool = SqlitePool::connect(database_url).await?;
    create_tables(&pool).await?;
    Ok(pool)
}

pub async fn create_tables(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            matric TEXT NOT NULL UNIQUE,
            is_staff INTEGER NOT NULL DEFAULT 0,
            is_superuser INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login TEXT,
            date_joined TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            debtee_id INTEGER,
            duty_start TEXT NOT NULL,
            task1_start TEXT NOT NULL,
            task2_start TEXT NOT NULL,
            task3_start TEXT NOT NULL,
            duty_end TEXT NOT NULL,
            task1_end TEXT NOT NULL,
            task2_end TEXT NOT NULL,
            task3_end TEXT NOT NULL,
            last_active TEXT,
            -- membership in the active-duty registry
            registered INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (user_id) REFERENCES users(id),
            FOREIGN KEY (debtee_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, FromRow)]
struct DbUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub matric: String,
    pub is_staff: i64,
    pub is_superuser: i64,
    pub is_active: i64,
    pub last_login: Option<String>,
    pub date_joined: String,
}

impl DbUser {
    fn into_user(self) -> Option<User> {
        Some(User {
            id: self.id,
            email: self.email,
            name: self.name,
            matric: self.matric,
            is_staff: self.is_staff != 0,
            is_superuser: self.is_superuser != 0,
            is_active: self.is_active != 0,
            last_login: self.last_login.as_deref().and_then(parse_datetime),
            date_joined: parse_datetime(&self.date_joined)?,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, name, matric, is_staff, is_superuser, is_active, last_login, date_joined";

pub async fn insert_user(pool: &DbPool, user: &NewUser) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO users (email, name, matric, is_staff, is_superuser, is_active, last_login, date_joined) \
         VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.matric)
    .bind(user.is_staff as i64)
    .bind(user.is_superuser as i64)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_user(pool: &DbPool, id: i64) -> Result<Option<User>> {
    let row: Option<DbUser> =
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(DbUser::into_user))
}

pub async fn get_user_by_matric(pool: &DbPool, matric: &str) -> Result<Option<User>> {
    let row: Option<DbUser> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE matric = ?",
        USER_COLUMNS
    ))
    .bind(matric)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(DbUser::into_user))
}

pub async fn list_users(pool: &DbPool) -> Result<Vec<User>> {
    let rows: Vec<DbUser> =
        sqlx::query_as(&format!("SELECT {} FROM users ORDER BY name", USER_COLUMNS))
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().filter_map(DbUser::into_user).collect())
}

// ============================================================================
// Duties
// ============================================================================

#[derive(Debug, FromRow)]
struct DbDuty {
    pub id: i64,
    pub user_id: Option<i64>,
    pub debtee_id: Option<i64>,
    pub duty_start: String,
    pub task1_start: String,
    pub task2_start: String,
    pub task3_start: String,
    pub duty_end: String,
    pub task1_end: String,
    pub task2_end: String,
    pub task3_end: String,
    pub last_active: Option<String>,
}

impl DbDuty {
    fn into_duty(self) -> Option<Duty> {
        Some(Duty {
            id: self.id,
            user_id: self.user_id,
            debtee_id: self.debtee_id,
            duty_start: parse_datetime(&self.duty_start)?,
            task1_start: parse_datetime(&self.task1_start)?,
            task2_start: parse_datetime(&self.task2_start)?,
            task3_start: parse_datetime(&self.task3_start)?,
            duty_end: parse_datetime(&self.duty_end)?,
            task1_end: parse_datetime(&self.task1_end)?,
            task2_end: parse_datetime(&self.task2_end)?,
            task3_end: parse_datetime(&self.task3_end)?,
            last_active: self.last_active.as_deref().and_then(parse_datetime),
        })
    }
}

const DUTY_COLUMNS: &str = "id, user_id, debtee_id, duty_start, task1_start, task2_start, \
     task3_start, duty_end, task1_end, task2_end, task3_end, last_active";

pub async fn insert_duty(pool: &DbPool, duty: &Duty) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO duties (user_id, debtee_id, duty_start, task1_start, task2_start, \
         task3_start, duty_end, task1_end, task2_end, task3_end, last_active, registered) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
    )
    .bind(duty.user_id)
    .bind(duty.debtee_id)
    .bind(duty.duty_start.to_rfc3339())
    .bind(duty.task1_start.to_rfc3339())
    .bind(duty.task2_start.to_rfc3339())
    .bind(duty.task3_start.to_rfc3339())
    .bind(duty.duty_end.to_rfc3339())
    .bind(duty.task1_end.to_rfc3339())
    .bind(duty.task2_end.to_rfc3339())
    .bind(duty.task3_end.to_rfc3339())
    .bind(duty.last_active.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_duty(pool: &DbPool, id: i64) -> Result<Option<Duty>> {
    let row: Option<DbDuty> =
        sqlx::query_as(&format!("SELECT {} FROM duties WHERE id = ?", DUTY_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(DbDuty::into_duty))
}

/// Duties currently held by the active-duty registry.
pub async fn registered_duties(pool: &DbPool) -> Result<Vec<Duty>> {
    let rows: Vec<DbDuty> = sqlx::query_as(&format!(
        "SELECT {} FROM duties WHERE registered = 1 ORDER BY duty_start",
        DUTY_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(DbDuty::into_duty).collect())
}

pub async fn registered_duties_of(pool: &DbPool, user_id: i64) -> Result<Vec<Duty>> {
    let rows: Vec<DbDuty> = sqlx::query_as(&format!(
        "SELECT {} FROM duties WHERE registered = 1 AND user_id = ? ORDER BY duty_start",
        DUTY_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(DbDuty::into_duty).collect())
}

/// Drop a duty from the registry. The row itself stays as history.
pub async fn deregister_duty(pool: &DbPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE duties SET registered = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist changed end marks after a force finish or duty-end update.
pub async fn update_duty_times(pool: &DbPool, duty: &Duty) -> Result<()> {
    sqlx::query(
        "UPDATE duties SET duty_end = ?, task1_end = ?, task2_end = ?, task3_end = ? \
         WHERE id = ?",
    )
    .bind(duty.duty_end.to_rfc3339())
    .bind(duty.task1_end.to_rfc3339())
    .bind(duty.task2_end.to_rfc3339())
    .bind(duty.task3_end.to_rfc3339())
    .bind(duty.id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn touch_duty_last_active(pool: &DbPool, id: i64, when: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE duties SET last_active = ? WHERE id = ?")
        .bind(when.to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// Helper to parse an RFC 3339 timestamp column
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// In-memory pool for tests. A single connection keeps every query on the
/// same in-memory database.
#[cfg(test)]
pub async fn test_pool() -> DbPool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    create_tables(&pool).await.expect("create tables");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::NewUser;

    #[tokio::test]
    async fn test_user_roundtrip() {
        let pool = test_pool().await;

        let id = insert_user(&pool, &NewUser::member("aina@example.com", "Aina", "A17CS0123"))
            .await
            .unwrap();

        let user = get_user(&pool, id).await.unwrap().unwrap();
        assert_eq!(user.email, "aina@example.com");
        assert_eq!(user.matric, "A17CS0123");
        assert!(user.is_active);
        assert!(!user.is_staff);

        let by_matric = get_user_by_matric(&pool, "A17CS0123").await.unwrap().unwrap();
        assert_eq!(by_matric.id, id);

        assert!(get_user_by_matric(&pool, "B00XX0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duty_roundtrip_and_registry() {
        let pool = test_pool().await;

        let mut duty = Duty::starting_at(Utc::now());
        duty.user_id = Some(7);
        let id = insert_duty(&pool, &duty).await.unwrap();

        let stored = get_duty(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.user_id, Some(7));
        // RFC 3339 text keeps sub-second precision, so the marks survive
        assert_eq!(stored.duty_start, duty.duty_start);
        assert_eq!(stored.task3_end, duty.task3_end);

        assert_eq!(registered_duties(&pool).await.unwrap().len(), 1);
        assert_eq!(registered_duties_of(&pool, 7).await.unwrap().len(), 1);
        assert!(registered_duties_of(&pool, 8).await.unwrap().is_empty());

        deregister_duty(&pool, id).await.unwrap();
        assert!(registered_duties(&pool).await.unwrap().is_empty());
        // History row is kept
        assert!(get_duty(&pool, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_duty_times_persists_clamped_ends() {
        let pool = test_pool().await;

        let mut duty = Duty::starting_at(Utc::now());
        duty.id = insert_duty(&pool, &duty).await.unwrap();

        duty.force_finish();
        update_duty_times(&pool, &duty).await.unwrap();

        let stored = get_duty(&pool, duty.id).await.unwrap().unwrap();
        assert!(stored.is_finished());
        assert_eq!(stored.duty_end, duty.duty_end);
        assert_eq!(stored.task2_end, duty.duty_end);
    }
}
