//! Seed binary for populating the dutyhub database with members.
//!
//! Usage: cargo run --bin seed
//!
//! Reads from seed.toml in the project root and inserts members (and any
//! starting duties) into the database.

mod db;
mod duty;
mod errors;
mod manager;
mod users;

use anyhow::Result;
use serde::Deserialize;
use std::fs;

use crate::manager::DutyManager;
use crate::users::NewUser;

#[derive(Debug, Deserialize)]
struct SeedData {
    #[serde(default)]
    users: Vec<SeedUser>,

    #[serde(default)]
    onduty: Vec<SeedDuty>,
}

#[derive(Debug, Deserialize)]
struct SeedUser {
    name: String,
    email: String,
    matric: String,
    #[serde(default)]
    staff: bool,
}

#[derive(Debug, Deserialize)]
struct SeedDuty {
    matric: String,
    #[serde(default)]
    debtee: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("🌱 Seeding database...");

    // Load environment
    let _ = dotenvy::EnvLoader::new().load();

    // Connect to database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:dutyhub.db?mode=rwc".to_string());
    let pool = db::init_db(&database_url).await?;
    println!("📦 Connected to database: {}", database_url);

    // Read seed file
    let seed_content = fs::read_to_string("seed.toml")?;
    let seed_data: SeedData = toml::from_str(&seed_content)?;

    println!("📋 Found {} members to seed", seed_data.users.len());

    // Insert each member
    for seed_user in &seed_data.users {
        let mut user = NewUser::member(
            seed_user.email.clone(),
            seed_user.name.clone(),
            seed_user.matric.clone(),
        );
        user.is_staff = seed_user.staff;

        if let Err(e) = user.validate() {
            println!("  ✗ Skipping {}: {}", seed_user.matric, e);
            continue;
        }

        match db::insert_user(&pool, &user).await {
            Ok(id) => println!("  ✓ Created member: {} (id: {})", user.name, id),
            Err(e) => println!("  ✗ Failed to create member {}: {}", user.name, e),
        }
    }

    // Start any seeded duties
    let duty_manager = DutyManager::load(pool.clone());
    for entry in &seed_data.onduty {
        let Some(user) = db::get_user_by_matric(&pool, &entry.matric).await? else {
            println!("  ✗ No member with matric no. {}", entry.matric);
            continue;
        };

        let debtee = match &entry.debtee {
            Some(matric) => db::get_user_by_matric(&pool, matric).await?,
            None => None,
        };

        match duty_manager.start_duty(&user, debtee.as_ref()).await {
            Ok(duty) => println!("  ✓ Started duty {} for {}", duty.id, user.matric),
            Err(e) => println!("  ✗ Failed to start duty for {}: {}", user.matric, e),
        }
    }

    println!("✅ Seeding complete!");

    Ok(())
}
