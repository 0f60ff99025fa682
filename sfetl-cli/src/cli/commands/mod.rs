pub mod check;
pub mod cleanup;
pub mod compare;
pub mod export_schema;
pub mod mappings;
pub mod storage;
pub mod sync_schema;
pub mod upload;

use anyhow::Result;
use dialoguer::Confirm;
use is_terminal::IsTerminal;

/// Ask before a destructive action; `assume_yes` skips the prompt
pub(crate) fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("Refusing to continue without a terminal; pass --yes to confirm");
    }

    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
