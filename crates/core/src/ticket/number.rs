//! Human-facing ticket numbers.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prefix of every ticket number.
pub const TICKET_NUMBER_PREFIX: &str = "TKT";

/// A validated ticket number in the form `TKT-<4-digit year>-<4 digits>`.
///
/// Numbers are unique; generation is random, and the store regenerates on
/// collision rather than failing the creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TicketNumber(String);

impl TicketNumber {
    /// Generate a fresh candidate number for the given year.
    ///
    /// Uniqueness is enforced by the store's unique index, not here; the
    /// caller retries with a new candidate when the insert collides.
    pub fn generate(year: i32) -> Self {
        let seq: u32 = rand::thread_rng().gen_range(1..=9999);
        Self(format!("{}-{}-{:04}", TICKET_NUMBER_PREFIX, year, seq))
    }

    /// Parse and validate a ticket number string.
    pub fn parse(s: &str) -> Option<Self> {
        let re = regex_lite::Regex::new(r"^TKT-[0-9]{4}-[0-9]{4}$").ok()?;
        if re.is_match(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
