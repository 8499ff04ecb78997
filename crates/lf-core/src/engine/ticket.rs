//! Ticket code generator.
//!
//! Codes are drawn from a process-monotonic counter seeded from the clock
//! and a random salt. Each draw is mapped through a bijection on
//! `[0, 36^6)` before base-36 rendering, so consecutive tickets do not look
//! sequential while staying distinct for `36^6` draws. The store's unique
//! constraint on `ticket_id` catches the rare cross-process clash.

use lf_common::id::TICKET_CODE_LEN;
use lf_common::TicketId;
use std::sync::atomic::{AtomicU64, Ordering};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Size of the code space, 36^6.
pub const CODE_SPACE: u64 = 2_176_782_336;

/// Odd and not a multiple of 3, hence coprime with 36^6.
const SCRAMBLE: u128 = 0x5_DEEC_E66D;

#[derive(Debug)]
pub struct TicketGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl TicketGenerator {
    /// Seed from clock seconds mixed with a random salt.
    pub fn new(prefix: impl Into<String>, clock_secs: i64) -> Self {
        let salt: u64 = rand::random();
        Self::with_seed(prefix, (clock_secs as u64) ^ salt)
    }

    /// Deterministic generator; identical seeds yield identical sequences.
    pub fn with_seed(prefix: impl Into<String>, seed: u64) -> Self {
        TicketGenerator {
            prefix: prefix.into(),
            counter: AtomicU64::new(seed),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next_ticket(&self) -> TicketId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) % CODE_SPACE;
        let mixed = ((n as u128 * SCRAMBLE) % CODE_SPACE as u128) as u64;
        TicketId::from_parts(&self.prefix, &encode_base36(mixed))
    }
}

fn encode_base36(mut value: u64) -> String {
    let mut buf = [b'0'; TICKET_CODE_LEN];
    for slot in buf.iter_mut().rev() {
        *slot = ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    buf.iter().map(|&b| b as char).collect()
}
