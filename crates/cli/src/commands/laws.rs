use statute_core::RuleSpecRegistry;

use crate::config::Config;
use crate::error::Result;
use crate::OutputFormat;

/// List the laws each service executes.
pub(crate) fn cmd_laws(config: &Config, output: OutputFormat, quiet: bool) -> Result<()> {
    let registry = RuleSpecRegistry::load_dir(&config.rules_dir)?;
    let index = registry.service_laws();
    if quiet {
        return Ok(());
    }
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&index)?),
        OutputFormat::Text => {
            if index.is_empty() {
                println!("no rule specifications in {}", config.rules_dir.display());
            }
            for (service, laws) in &index {
                for law in laws {
                    println!("{}\t{}", service, law);
                }
            }
        }
    }
    Ok(())
}
