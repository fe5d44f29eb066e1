use deskflow_db::migrations;

use crate::commands::{self, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    match execute() {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => CommandResult::failure("migrate", failure),
    }
}

fn execute() -> Result<(), CommandFailure> {
    let config = commands::load_config()?;
    let runtime = commands::build_runtime()?;

    runtime.block_on(async {
        let pool = commands::open_pool(&config).await?;
        let applied = migrations::run_pending(&pool).await;
        pool.close().await;
        applied.map_err(|error| CommandFailure::new("migration", error.to_string(), 5))
    })
}
