//! Attend Presenter Binary
//!
//! Prints the rotating check-in code for a session, one line per epoch, or
//! checks a scanned code against the same session parameters.
//!
//! ## Usage
//!
//! ```bash
//! export ATTEND_SECRET=<base64-secret>
//! export ATTEND_SESSION_ID=12
//! export ATTEND_T0_MS=1645671600000
//!
//! # Print codes until Ctrl-C
//! attend-presenter
//!
//! # Verify a code as if it was submitted now
//! attend-presenter verify MIl1tAwE
//! ```

use anyhow::{bail, Context, Result};
use std::time::SystemTime;
use tracing::{info, warn};

use attend::{CodeRotation, CodeVerifier, RotationConfig, VerifierConfig};

/// Codes buffered between the rotation and stdout
const CODE_BUFFER: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("attend=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = RotationConfig::from_env()?;

    match args.first().map(String::as_str) {
        None => present(&config).await,
        Some("verify") => {
            let code = args
                .get(1)
                .context("Usage: attend-presenter verify <code>")?;
            verify(&config, code)
        }
        Some(other) => bail!("Unknown command {:?}", other),
    }
}

/// Print a fresh code on every epoch boundary until interrupted.
async fn present(config: &RotationConfig) -> Result<()> {
    info!("Attend presenter starting");
    info!("  Session: {}", config.session_id);
    info!("  Epoch: {:?}", config.tx);
    info!("  Truncate length: {}", config.truncate_len);

    let (mut rotation, mut codes) = CodeRotation::channel(config, CODE_BUFFER)?;
    rotation.run()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            issued = codes.recv() => match issued {
                Some(issued) => println!("{}\t{}", issued.counter, issued.code),
                None => {
                    warn!("Code rotation ended");
                    break;
                }
            },
        }
    }

    rotation.stop();
    rotation.wait().await
}

fn verify(config: &RotationConfig, code: &str) -> Result<()> {
    let verifier_config = VerifierConfig::from_env()?;
    let verifier = CodeVerifier::new(
        config.secret()?,
        config.truncate_len,
        config.t0,
        config.tx,
        verifier_config.jitter_window,
    )?;

    let parsed = verifier
        .verify(code, SystemTime::now())
        .with_context(|| format!("Code {:?} rejected", code))?;
    println!(
        "valid: session {} counter {}",
        parsed.session_id, parsed.counter
    );
    Ok(())
}
