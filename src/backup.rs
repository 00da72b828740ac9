//! Backup binary for copying the dutyhub database to a backup file.
//!
//! Usage: cargo run --bin backup
//!        cargo run --bin backup -- --target my_backup.db
//!        cargo run --bin backup -- --db sqlite:other.db --target backup.db
//!
//! Creates a backup of all database entries to a new file.

mod db;
mod duty;
mod users;

use anyhow::Result;
use chrono::Datelike;
use clap::Parser;
use dotenvy::EnvLoader;

#[derive(Parser, Debug)]
#[command(name = "backup")]
#[command(about = "Backup the dutyhub database to a new file")]
struct Args {
    /// Source database URL (overrides DATABASE_URL from .env)
    #[arg(long)]
    db: Option<String>,

    /// Target backup file path (default: backup_{year}_{month}_{day}.db)
    #[arg(long)]
    target: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env file
    let dotenv = EnvLoader::new()
        .load()
        .unwrap_or_default();

    // Get source database URL
    let source_url = args.db
        .or_else(|| dotenv.get("DATABASE_URL").cloned())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite:dutyhub.db?mode=rwc".to_string());

    // Generate target filename
    let now = chrono::Utc::now();
    let default_target = format!("backup_{}_{:02}_{:02}.db", now.year(), now.month(), now.day());
    let target_file = args.target.unwrap_or(default_target);
    let target_url = format!("sqlite:{}?mode=rwc", target_file);

    println!("Source database: {}", source_url);
    println!("Target backup: {}", target_file);

    // Connect to source database
    println!("Connecting to source database...");
    let source_pool = db::init_db(&source_url).await?;

    // Create and connect to target database (init_db creates tables)
    println!("Creating target database...");
    let target_pool = db::init_db(&target_url).await?;

    // Copy users
    println!("Copying users...");
    let users: Vec<(i64, String, String, String, i64, i64, i64, Option<String>, String)> =
        sqlx::query_as(
            "SELECT id, email, name, matric, is_staff, is_superuser, is_active, last_login, date_joined FROM users"
        )
        .fetch_all(&source_pool)
        .await?;

    for user in &users {
        sqlx::query(
            "INSERT INTO users (id, email, name, matric, is_staff, is_superuser, is_active, last_login, date_joined) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(user.0)
        .bind(&user.1)
        .bind(&user.2)
        .bind(&user.3)
        .bind(user.4)
        .bind(user.5)
        .bind(user.6)
        .bind(&user.7)
        .bind(&user.8)
        .execute(&target_pool)
        .await?;
    }
    println!("  Copied {} users", users.len());

    // Copy duties
    println!("Copying duties...");
    #[allow(clippy::type_complexity)]
    let duties: Vec<(i64, Option<i64>, Option<i64>, String, String, String, String, String, String, String, String, Option<String>, i64)> =
        sqlx::query_as(
            "SELECT id, user_id, debtee_id, duty_start, task1_start, task2_start, task3_start, duty_end, task1_end, task2_end, task3_end, last_active, registered FROM duties"
        )
        .fetch_all(&source_pool)
        .await?;

    for duty in &duties {
        sqlx::query(
            "INSERT INTO duties (id, user_id, debtee_id, duty_start, task1_start, task2_start, task3_start, duty_end, task1_end, task2_end, task3_end, last_active, registered) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(duty.0)
        .bind(duty.1)
        .bind(duty.2)
        .bind(&duty.3)
        .bind(&duty.4)
        .bind(&duty.5)
        .bind(&duty.6)
        .bind(&duty.7)
        .bind(&duty.8)
        .bind(&duty.9)
        .bind(&duty.10)
        .bind(&duty.11)
        .bind(duty.12)
        .execute(&target_pool)
        .await?;
    }
    println!("  Copied {} duties", duties.len());

    println!("\nBackup completed successfully!");
    println!("Backup saved to: {}", target_file);

    Ok(())
}
