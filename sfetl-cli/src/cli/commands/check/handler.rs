//! Connection check: identity and API limits

use anyhow::{Context, Result};
use colored::*;

use crate::cli::app::AppContext;

/// Limits shown after a successful login
const SHOWN_LIMITS: &[(&str, &str)] = &[
    ("DailyApiRequests", "API requests (24h)"),
    ("DataStorageMB", "Data storage (MB)"),
    ("FileStorageMB", "File storage (MB)"),
];

pub async fn handle_check_command(ctx: &AppContext) -> Result<()> {
    println!("Checking connection to the {} org...", ctx.org_type.to_string().cyan());

    let client = ctx.connect().await?;
    println!("  {} Connected to {}", "✓".green(), client.instance_url().bright_white());

    let identity = client.user_info().await.context("Failed to read user identity")?;
    let field = |name: &str| identity.get(name).and_then(|v| v.as_str()).unwrap_or("-").to_string();
    println!("  User:         {}", field("preferred_username"));
    println!("  Organization: {}", field("organization_id"));
    println!("  API version:  {}", client.api_version());

    let limits = client.limits().await.context("Failed to read org limits")?;
    println!();
    println!("{}", "Limits".bold());
    for (key, label) in SHOWN_LIMITS {
        match limits.get(*key) {
            Some(limit) => println!(
                "  {:<22} {:>10} used of {:>10} ({} remaining)",
                label,
                limit.used(),
                limit.max,
                limit.remaining
            ),
            None => println!("  {:<22} {}", label, "not reported".dimmed()),
        }
    }

    Ok(())
}
