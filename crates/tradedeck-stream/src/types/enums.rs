/*
[INPUT]:  Exchange flags embedded in stream payloads
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - shared enums for decoded market events
[UPDATE]: When payload schema changes or new enums are added
*/

use serde::{Deserialize, Serialize};

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Taker side from the exchange's "buyer is maker" flag.
    ///
    /// A maker buyer means the taker sold into the bid.
    pub fn from_buyer_is_maker(buyer_is_maker: bool) -> Self {
        if buyer_is_maker { Side::Sell } else { Side::Buy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_from_maker_flag() {
        assert_eq!(Side::from_buyer_is_maker(false), Side::Buy);
        assert_eq!(Side::from_buyer_is_maker(true), Side::Sell);
    }
}
