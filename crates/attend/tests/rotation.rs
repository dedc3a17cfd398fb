//! Presenter rotation → verifier round trip
//!
//! Runs a code rotation on a paused tokio clock and checks what a scanner
//! would submit against the verifier.
//!
//! Run: `cargo test -p attend --test rotation`

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use attend::rotation::{Clock, CodeRotation, IssuedCode, TokioClock};
use attend::{encode, CodeVerifier, RotationConfig, Secret, VerifyError};

const SECRET: &str = "YNxExINfvxmC0q6g";
const SESSION_ID: u32 = 12;
const T0_MS: u64 = 1_645_671_600_000;
const TX: Duration = Duration::from_secs(1);
const JITTER: Duration = Duration::from_millis(300);

fn at(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// Instant the rotation replaces code `counter`
fn display_end(counter: u32) -> SystemTime {
    at(T0_MS) + TX * counter
}

fn verifier(secret: &str) -> CodeVerifier {
    CodeVerifier::new(
        Secret::from_base64(secret).unwrap(),
        4,
        at(T0_MS),
        TX,
        JITTER,
    )
    .unwrap()
}

async fn collect(rx: &mut tokio::sync::mpsc::Receiver<IssuedCode>, n: usize) -> Vec<IssuedCode> {
    let mut codes = Vec::with_capacity(n);
    for _ in 0..n {
        codes.push(rx.recv().await.expect("rotation stopped early"));
    }
    codes
}

#[tokio::test(start_paused = true)]
async fn test_issued_codes_verify_when_scanned() {
    // Presenter joins mid-epoch
    let clock = Arc::new(TokioClock::new(at(T0_MS + 3_500)));
    let config = RotationConfig::new(SECRET, SESSION_ID, at(T0_MS), TX);
    let (mut rotation, mut rx) =
        CodeRotation::channel_with_clock(&config, 16, clock.clone()).unwrap();
    rotation.run().unwrap();

    let verifier = verifier(SECRET);
    let scan_delay = Duration::from_millis(100);
    let mut counters = Vec::new();
    for _ in 0..4 {
        let issued = rx.recv().await.unwrap();
        let issued_at = clock.now();

        let parsed = verifier.verify(&issued.code, issued_at + scan_delay).unwrap();
        assert_eq!(parsed.session_id, SESSION_ID);
        assert_eq!(parsed.counter, issued.counter);

        // Still accepted while a scan of the outgoing code is in flight
        let end = display_end(issued.counter);
        assert!(verifier.verify(&issued.code, end + JITTER).is_ok());
        assert!(matches!(
            verifier.verify(&issued.code, end + JITTER + Duration::from_millis(1)),
            Err(VerifyError::OutOfWindow { .. })
        ));
        counters.push(issued.counter);
    }
    rotation.stop();
    rotation.wait().await.unwrap();

    assert_eq!(counters, vec![4, 5, 6, 7]);
}

#[tokio::test(start_paused = true)]
async fn test_other_secret_rejects_codes() {
    let clock = Arc::new(TokioClock::new(at(T0_MS)));
    let config = RotationConfig::new(SECRET, SESSION_ID, at(T0_MS), TX);
    let (mut rotation, mut rx) =
        CodeRotation::channel_with_clock(&config, 16, clock.clone()).unwrap();
    rotation.run().unwrap();

    let issued = rx.recv().await.unwrap();
    rotation.stop();

    let err = verifier("c29tZSBvdGhlciBzZWNyZXQ")
        .verify(&issued.code, clock.now())
        .unwrap_err();
    assert!(matches!(err, VerifyError::DigestMismatch { counter: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_counter_steps_by_one_across_clock_jumps() {
    let clock = Arc::new(TokioClock::new(at(T0_MS)));
    let config = RotationConfig::new(SECRET, SESSION_ID, at(T0_MS), TX);
    let (mut rotation, mut rx) =
        CodeRotation::channel_with_clock(&config, 16, clock.clone()).unwrap();
    rotation.run().unwrap();

    let mut codes = collect(&mut rx, 2).await;
    // Wall clock steps forward past two boundaries
    clock.skew(Duration::from_millis(2_500));
    codes.extend(collect(&mut rx, 4).await);
    rotation.stop();
    rotation.wait().await.unwrap();

    let counters: Vec<u32> = codes.iter().map(|c| c.counter).collect();
    assert_eq!(counters, vec![1, 2, 3, 4, 5, 6]);

    let secret = Secret::from_base64(SECRET).unwrap();
    for issued in &codes {
        assert_eq!(issued.session_id, SESSION_ID);
        assert_eq!(
            issued.code,
            encode(SESSION_ID, issued.counter, &secret, 4).unwrap()
        );
    }
    assert_eq!(rotation.counter(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_channel() {
    let clock = Arc::new(TokioClock::new(at(T0_MS)));
    let config = RotationConfig::new(SECRET, SESSION_ID, at(T0_MS), TX);
    let (mut rotation, mut rx) = CodeRotation::channel_with_clock(&config, 16, clock).unwrap();
    rotation.run().unwrap();

    collect(&mut rx, 2).await;
    rotation.stop();
    rotation.wait().await.unwrap();
    assert!(!rotation.is_running());

    // Buffered codes drain, then the channel reports closed
    while rx.recv().await.is_some() {}
}
