//! Per-model pricing shape, shared between the pricing section of
//! `AppConfig` and the Cost Calculator's lookup table.

use serde::{Deserialize, Serialize};

/// Per-million-token input/output rate, in cents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelRate {
    pub input_cents_per_million: f64,
    pub output_cents_per_million: f64,
}
