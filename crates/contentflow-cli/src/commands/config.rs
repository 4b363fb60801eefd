//! `contentflow config` - Show or validate the orchestrator configuration.

use super::load_config;

pub fn show(config_path: Option<&str>) -> Result<(), String> {
    let config = load_config(config_path)?;
    print!("{}", config.to_yaml().map_err(|e| e.to_string())?);
    Ok(())
}

pub fn validate(config_path: &str) -> Result<(), String> {
    let config = load_config(Some(config_path))?;
    println!(
        "✅ {} is valid ({} step(s))",
        config_path,
        config.pipeline.len()
    );
    for (i, step) in config.pipeline.iter().enumerate() {
        match &step.agent_type {
            Some(agent) => println!(
                "   {}. {} → {} (max {} retries)",
                i + 1,
                step.step_type,
                config.queue_for(agent),
                step.max_retries
            ),
            None => println!("   {}. {} → human review", i + 1, step.step_type),
        }
    }
    Ok(())
}
