//! Key management commands

use super::Device;
use anyhow::{Context, Result};
use colored::Colorize;
use crate::config::SettingsManager;
use dashkey_core::{KeyContext, UserId};

pub async fn init(user: UserId, publish: bool, server: Option<String>) -> Result<()> {
    if let Some(url) = server {
        let mut settings = SettingsManager::load()?;
        settings.set_server_url(&url)?;
        SettingsManager::save(&settings)?;
        println!("   Server:      {}", settings.server_url.cyan());
    }

    let device = Device::load()?;

    if publish {
        let mut session = device.session().await?;
        let report = session
            .sign_in(user)
            .await
            .context("Failed to provision keys")?;

        println!("{}", "🔑 Keys ready".green().bold());
        println!("   User:        {}", report.user_id.to_string().cyan());
        println!("   Fingerprint: {}", report.fingerprint.cyan());
        if report.replaced_remote {
            println!(
                "   {}",
                "Directory held a different key; it was replaced. Older messages to this user cannot be read here."
                    .yellow()
            );
        } else if report.published {
            println!("   {}", "Public key published".green());
        } else {
            println!("   {}", "Directory already up to date".dimmed());
        }
        return Ok(());
    }

    let keys = device.key_store();
    let public_key = keys.ensure_keys_for_user(user)?;
    println!("{}", "🔑 Keys ready".green().bold());
    println!("   User:        {}", user.to_string().cyan());
    println!(
        "   Fingerprint: {}",
        dashkey_core::public_key_fingerprint(&public_key).cyan()
    );
    Ok(())
}

/// Print the raw base64 public key, suitable for piping
pub async fn show(user: UserId) -> Result<()> {
    let device = Device::load()?;
    let public_key = device
        .key_store()
        .current_user_public_key(&KeyContext::for_user(user))
        .with_context(|| format!("No keys for user {}; run `dashkey keys init --user {}`", user, user))?;
    println!("{}", public_key);
    Ok(())
}

pub async fn status(user: UserId) -> Result<()> {
    let device = Device::load()?;
    let keys = device.key_store();
    let ctx = KeyContext::for_user(user);

    println!("{}", "🔹 Key status".blue().bold());
    println!();
    println!("   Alias:       {}", keys.alias_for(user).dimmed());

    match keys.key_summary(&ctx)? {
        Some(summary) => {
            let usable = keys.has_private_key(&ctx)?;
            println!("   Fingerprint: {}", summary.fingerprint.cyan());
            println!(
                "   Created:     {}",
                summary.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "   Private key: {}",
                if usable { "✓ usable".green() } else { "✗ unreadable".red() }
            );
        }
        None => {
            println!("   {}", "No key pair on this device".yellow());
        }
    }
    Ok(())
}

pub async fn delete(user: UserId, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "Deleting keys is irreversible; messages addressed to this key become unreadable. Re-run with --yes"
        );
    }

    let device = Device::load()?;
    let removed = device.key_store().delete_keys(&KeyContext::for_user(user))?;
    if removed {
        println!("{}", format!("✓ Deleted key pair for user {}", user).green());
    } else {
        println!("{}", format!("No key pair for user {}", user).dimmed());
    }
    Ok(())
}
