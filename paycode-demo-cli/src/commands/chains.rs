//! Payment chain commands - derive, extend, list, notify

use anyhow::Result;
use colored::Colorize;
use paycode_lib::PaymentChain;
use std::path::Path;

use crate::ui;

fn print_chain(chain: &PaymentChain, verbose: bool) {
    println!("\n{} → {}", chain.id.bold(), chain.recipient_label);
    ui::key_value("  Chain", &chain.id);
    ui::key_value("  Recipient", &ui::truncate(&chain.recipient_code, 12));
    match &chain.notification_reference {
        Some(reference) => {
            ui::key_value("  Notification", &reference.reference);
            ui::key_value("  Nonce", &reference.nonce.to_string());
        }
        None => ui::key_value("  Notification", "not sent"),
    }
    for address in &chain.addresses {
        let marker = if address.used {
            "used".yellow().to_string()
        } else {
            String::new()
        };
        println!("    {:>4}  {} {}", address.index, address.address, marker);
        if verbose {
            println!("          {}", address.public_key.dimmed());
        }
    }
}

pub async fn derive(
    storage_dir: &Path,
    sender_id: &str,
    recipient_code: &str,
    label: &str,
    count: Option<u32>,
    verbose: bool,
) -> Result<()> {
    ui::header("Derive Payment Chain");
    let coordinator = super::open(storage_dir)?;

    let chain = coordinator
        .derive_chain(sender_id, recipient_code, label, count)
        .await?;
    ui::success(&format!(
        "Derived {} address(es) for '{}'",
        chain.addresses.len(),
        label
    ));
    print_chain(&chain, verbose);
    ui::info(&format!(
        "Run 'paycode-demo notify {}' before the first payment",
        chain.id
    ));
    Ok(())
}

pub async fn extend(storage_dir: &Path, chain_id: &str, count: u32, verbose: bool) -> Result<()> {
    let coordinator = super::open(storage_dir)?;
    let chain = coordinator.extend_chain(chain_id, count).await?;
    ui::success(&format!(
        "Chain now holds {} address(es)",
        chain.addresses.len()
    ));
    print_chain(&chain, verbose);
    Ok(())
}

pub async fn list(storage_dir: &Path, verbose: bool) -> Result<()> {
    ui::header("Payment Chains");
    let coordinator = super::open(storage_dir)?;
    let chains = coordinator.chains().list().await?;

    if chains.is_empty() {
        ui::info("No payment chains found");
        ui::info("Use 'paycode-demo derive' to create one");
        return Ok(());
    }
    for chain in &chains {
        print_chain(chain, verbose);
    }
    Ok(())
}

pub async fn notify(storage_dir: &Path, chain_id: &str, verbose: bool) -> Result<()> {
    ui::header("Notification");
    let coordinator = super::open(storage_dir)?;

    let (chain, reference) = coordinator.send_notification(chain_id).await?;
    ui::success(&format!("Notification recorded for '{}'", chain.recipient_label));
    ui::key_value("Reference", &reference.reference);
    ui::key_value("Nonce", &reference.nonce.to_string());
    if verbose {
        ui::key_value("Created", &reference.created_at.to_rfc3339());
    }
    ui::separator();
    ui::info("Hand the reference to the recipient over the notification channel");
    Ok(())
}
