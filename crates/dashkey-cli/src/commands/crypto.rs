//! Encrypt, decrypt and resolve commands

use super::Device;
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use dashkey_core::ports::KeyDirectory;
use dashkey_core::{
    DecryptOutcome, IncomingMessage, KeyContext, ResolutionSource, ServerMessageId, UserId,
};

/// Where the recipient's public key comes from
pub enum Recipient {
    Key(String),
    User(UserId),
}

pub async fn encrypt(recipient: Recipient, text: &str) -> Result<()> {
    let device = Device::load()?;

    let public_key = match recipient {
        Recipient::Key(key) => key,
        Recipient::User(user) => device
            .directory()
            .fetch_public_key(user)
            .await?
            .with_context(|| {
                format!("User {} has no registered public key; refusing to print plaintext", user)
            })?,
    };

    let envelope = device
        .engine()
        .encrypt_for_recipient(text, &public_key)
        .context("Encryption failed")?;
    println!("{}", envelope);
    Ok(())
}

pub async fn decrypt(user: UserId, payload: &str) -> Result<()> {
    let device = Device::load()?;
    let outcome = device
        .engine()
        .decrypt_from_sender(&device.key_store(), &KeyContext::for_user(user), payload)?;

    match outcome {
        DecryptOutcome::Decrypted(text) => println!("{}", text),
        DecryptOutcome::AlreadyPlaintext(text) => {
            eprintln!("{}", "Payload is not encrypted".yellow());
            println!("{}", text);
        }
        DecryptOutcome::AuthenticationFailed => {
            anyhow::bail!("Authentication failed: the payload was tampered with or is not addressed to this key")
        }
        DecryptOutcome::MalformedEnvelope(reason) => {
            anyhow::bail!("Malformed envelope: {}", reason)
        }
    }
    Ok(())
}

/// Resolve one incoming message through the local history, as the app would
pub async fn resolve(user: UserId, from: UserId, id: i64, payload: &str) -> Result<()> {
    let device = Device::load()?;
    let mut session = device.session().await?;
    session.resume(user);

    let incoming = IncomingMessage {
        id: ServerMessageId(id),
        sender_id: from,
        receiver_id: user,
        payload: payload.to_string(),
        timestamp: Utc::now(),
        from_server: false,
    };

    let resolved = session.receive(&incoming).await?;
    let source = match &resolved.source {
        ResolutionSource::DurableStore => "local history".dimmed(),
        ResolutionSource::AuthoredCache => "sent from this device".dimmed(),
        ResolutionSource::Decrypted => "decrypted".green(),
        ResolutionSource::AlreadyPlaintext => "not encrypted".yellow(),
        ResolutionSource::Undecryptable(_) => "undecryptable".red(),
    };
    println!("[{}] {}", source, resolved.text());

    if !resolved.is_readable() {
        anyhow::bail!("Message {} could not be decrypted", id);
    }
    Ok(())
}
