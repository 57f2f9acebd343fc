//! Conversation history commands

use super::Device;
use anyhow::Result;
use colored::Colorize;
use dashkey_core::{conversation_id, UserId};

pub async fn show(user: UserId, with: UserId) -> Result<()> {
    let device = Device::load()?;
    let mut session = device.session().await?;
    session.resume(user);

    let messages = session.history(with).await?;
    println!(
        "{}",
        format!("🔹 {} ({} messages)", conversation_id(user, with), messages.len())
            .blue()
            .bold()
    );
    println!();

    for message in messages {
        let who = if message.sent_by_me {
            "me".green()
        } else {
            message.sender_id.to_string().cyan()
        };
        println!(
            "   {} {:>6}  {}",
            message.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            who,
            message.text
        );
    }
    Ok(())
}

pub fn conv_id(a: UserId, b: UserId) -> Result<()> {
    println!("{}", conversation_id(a, b));
    Ok(())
}
