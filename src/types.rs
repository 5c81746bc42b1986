//! Core data types for price observations.
//!
//! A [`Record`] is the single unit of work flowing through the pipeline:
//! readers produce them from CSV lines, queues own them in transit, and the
//! median calculator consumes them. Fixed-size fields keep the layout
//! predictable and cheap to copy between queues.

/// A single timestamped price observation.
///
/// Produced by [`parse_line`] only; fields are never mutated after
/// construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Receive timestamp (milliseconds since epoch, source-defined)
    pub receive_ts: i64,

    /// Observed price; always finite
    pub price: f64,
}

impl Record {
    /// Create a new record.
    pub fn new(receive_ts: i64, price: f64) -> Self {
        Self { receive_ts, price }
    }
}

/// Parse one CSV data line into a [`Record`].
///
/// The wire format is `;`-separated with at least three fields:
/// `receive_ts;exchange_ts;price[;quantity;…]`. Field 0 is a signed 64-bit
/// integer timestamp, field 2 is the price; every other field is ignored.
///
/// Returns `None` for malformed lines (missing fields, non-numeric values,
/// non-finite prices). Callers are expected to log and skip those.
pub fn parse_line(line: &str) -> Option<Record> {
    let mut fields = line.split(';');

    let receive_ts = fields.next()?.trim().parse::<i64>().ok()?;
    fields.next()?; // exchange_ts, unused
    let price = fields.next()?.trim().parse::<f64>().ok()?;

    if !price.is_finite() {
        return None;
    }

    Some(Record::new(receive_ts, price))
}
