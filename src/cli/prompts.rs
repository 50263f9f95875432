use anyhow::{Result, bail};
use dialoguer::Select;
use is_terminal::IsTerminal;

/// Arrow-key Yes/No selection
pub fn prompt_confirmation(prompt: &str, default_yes: bool) -> Result<bool> {
    let items = vec!["Yes", "No"];
    let default_index = if default_yes { 0 } else { 1 };

    let selection = Select::new()
        .with_prompt(prompt)
        .items(&items)
        .default(default_index)
        .interact()?;

    Ok(selection == 0)
}

/// Deletes fan out to child records, so they need `--force` or an
/// interactive confirmation. Without a terminal there is nobody to ask.
pub fn confirm_delete(what: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        bail!("Refusing to delete {} without --force in a non-interactive session", what);
    }
    prompt_confirmation(&format!("Delete {} and everything under it?", what), false)
}
