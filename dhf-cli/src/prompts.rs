use anyhow::Result;
use inquire::{Confirm, Text};

use dhf_core::ConfigType;

/// A new configuration option as entered by the user
pub struct OptionInput {
    pub name: String,
    pub description: String,
}

/// Prompts for the name and description of a new rating option
pub fn prompt_new_option(config_type: ConfigType, name: Option<&str>) -> Result<OptionInput> {
    let name = match name {
        Some(name) => name.to_string(),
        None => Text::new("Name:")
            .with_help_message(&format!("Display name of the new {} option", config_type))
            .prompt()?,
    };

    let default_description = format!("{} option for {}", name, config_type);
    let description = Text::new("Description:")
        .with_default(&default_description)
        .prompt()?;

    Ok(OptionInput { name, description })
}

/// Asks before removing an option that risks still reference
pub fn confirm_option_removal(option_id: &str, risk_ids: &[String]) -> Result<bool> {
    let message = format!(
        "{} is used by {} risk(s) ({}). Remove it anyway?",
        option_id,
        risk_ids.len(),
        risk_ids.join(", ")
    );
    Ok(Confirm::new(&message).with_default(false).prompt()?)
}
