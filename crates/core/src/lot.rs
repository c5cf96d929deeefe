//! Traceability lot codes.

use crate::types::Timestamp;

/// Build the human-readable code of the lot released when an order is
/// finalized: `L<yyMMdd><HHmmss>-<order code>`, upper-cased, with
/// whitespace replaced by dashes so it prints cleanly on a label.
pub fn lot_code(order_code: &str, released_at: Timestamp) -> String {
    let order_part: String = order_code
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c.to_ascii_uppercase() })
        .collect();
    format!("L{}-{order_part}", released_at.format("%y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn lot_code_embeds_release_time_and_order() {
        let at = Utc.with_ymd_and_hms(2026, 4, 9, 14, 5, 7).unwrap();
        assert_eq!(lot_code("op 1234", at), "L260409140507-OP-1234");
    }
}
