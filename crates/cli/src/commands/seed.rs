use deskflow_db::{migrations, DbPool, DemoSeedDataset, SeedResult};

use crate::commands::{self, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    match execute() {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: {} categories, {} users, {} tickets",
                seeded.categories, seeded.users, seeded.tickets
            ),
        ),
        Err(failure) => CommandResult::failure("seed", failure),
    }
}

fn execute() -> Result<SeedResult, CommandFailure> {
    let config = commands::load_config()?;
    let runtime = commands::build_runtime()?;

    runtime.block_on(async {
        let pool = commands::open_pool(&config).await?;
        let outcome = seed_database(&pool).await;
        pool.close().await;
        outcome
    })
}

async fn seed_database(pool: &DbPool) -> Result<SeedResult, CommandFailure> {
    migrations::run_pending(pool)
        .await
        .map_err(|error| CommandFailure::new("migration", error.to_string(), 5))?;

    let seeded = DemoSeedDataset::load(pool)
        .await
        .map_err(|error| CommandFailure::new("seed_execution", error.to_string(), 5))?;

    let verification = DemoSeedDataset::verify(pool)
        .await
        .map_err(|error| CommandFailure::new("seed_verification", error.to_string(), 6))?;
    if verification.passed() {
        return Ok(seeded);
    }

    let failed_checks: Vec<&str> = verification
        .checks
        .iter()
        .filter_map(|check| (!check.passed).then_some(check.name))
        .collect();
    let message = if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    };
    Err(CommandFailure::new("seed_verification", message, 6))
}
