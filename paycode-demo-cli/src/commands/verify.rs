//! Verify command - check a signature bundle against a challenge

use anyhow::{anyhow, Context, Result};
use paycode_lib::{classify_scanned_payload, signer, ScannedPayload, SignatureBundle};
use std::path::Path;

use crate::ui;

pub async fn run(
    bundle_file: &Path,
    challenge_payload: &str,
    pinned_pq_key: Option<&str>,
    verbose: bool,
) -> Result<()> {
    ui::header("Verify Signature");

    let text = std::fs::read_to_string(bundle_file)
        .with_context(|| format!("Failed to read {}", bundle_file.display()))?;
    let challenge = match classify_scanned_payload(challenge_payload) {
        Some(ScannedPayload::AuthChallenge(challenge)) => challenge,
        _ => return Err(anyhow!("Expected a BIP47-SSO: challenge payload")),
    };

    let verification = match pinned_pq_key {
        Some(hex_key) => {
            let key = hex::decode(hex_key).context("Pinned key must be hex")?;
            match SignatureBundle::from_armored(&text) {
                Ok(bundle) => signer::verify_pinned(&bundle, &challenge, &key),
                Err(_) => signer::verify_armored(&text, &challenge),
            }
        }
        None => signer::verify_armored(&text, &challenge),
    };

    ui::key_value("Outcome", &ui::outcome(verification.outcome));
    ui::key_value("Reason", verification.reason.as_str());
    if verbose {
        if let Ok(bundle) = SignatureBundle::from_armored(&text) {
            ui::key_value("Algorithm", bundle.algorithm.as_str());
            ui::key_value("Payment code", &bundle.payment_code);
        }
    }

    if !verification.is_valid() {
        return Err(anyhow!("Signature rejected: {}", verification.reason));
    }
    ui::success("Signature verified");
    Ok(())
}
