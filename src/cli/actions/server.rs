use crate::api::new;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, dsn, config } => {
            // Fail early on an unparseable DSN instead of inside the pool.
            Url::parse(&dsn).context("Invalid database connection string")?;

            new(port, dsn, *config).await?;
        }
    }

    Ok(())
}
