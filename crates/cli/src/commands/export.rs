//! `careclaw export`: Print a saved session.

use careclaw_agent::SessionContext;
use careclaw_config::AppConfig;

pub async fn run(
    config: &AppConfig,
    visit_id: &str,
    text: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let repository = super::open_repository(config);
    let export = repository
        .get(visit_id)
        .await?
        .ok_or_else(|| format!("No saved session for visit {visit_id} in {}", repository.name()))?;

    if text {
        let session = SessionContext::import(export);
        println!("{}", session.render_history(true));
        println!();
        println!("{}", session.render_memory());
    } else {
        println!("{}", serde_json::to_string_pretty(&export)?);
    }
    Ok(())
}
