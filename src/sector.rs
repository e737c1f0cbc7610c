//! Static symbol→sector classification used to partition the universe
//! before pair generation. Unknown symbols never pair with anything.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sector {
    L1,
    L2,
    DeFi,
    Meme,
    Infrastructure,
    Payment,
    Metaverse,
    Unknown,
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sector::L1 => "l1",
            Sector::L2 => "l2",
            Sector::DeFi => "defi",
            Sector::Meme => "meme",
            Sector::Infrastructure => "infrastructure",
            Sector::Payment => "payment",
            Sector::Metaverse => "metaverse",
            Sector::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

lazy_static! {
    static ref SYMBOL_SECTORS: HashMap<&'static str, Sector> = {
        let mut m = HashMap::new();

        // L1s
        m.insert("BTC", Sector::L1);
        m.insert("ETH", Sector::L1);
        m.insert("SOL", Sector::L1);
        m.insert("ADA", Sector::L1);
        m.insert("DOT", Sector::L1);
        m.insert("AVAX", Sector::L1);
        m.insert("ATOM", Sector::L1);
        m.insert("NEAR", Sector::L1);
        m.insert("SUI", Sector::L1);
        m.insert("APT", Sector::L1);
        m.insert("SEI", Sector::L1);

        // L2s
        m.insert("OP", Sector::L2);
        m.insert("ARB", Sector::L2);
        m.insert("MATIC", Sector::L2);
        m.insert("STX", Sector::L2);
        m.insert("IMX", Sector::L2);

        // DeFi
        m.insert("UNI", Sector::DeFi);
        m.insert("AAVE", Sector::DeFi);
        m.insert("MKR", Sector::DeFi);
        m.insert("COMP", Sector::DeFi);
        m.insert("CRV", Sector::DeFi);
        m.insert("SNX", Sector::DeFi);
        m.insert("LDO", Sector::DeFi);

        // Memes
        m.insert("DOGE", Sector::Meme);
        m.insert("SHIB", Sector::Meme);
        m.insert("PEPE", Sector::Meme);
        m.insert("BONK", Sector::Meme);
        m.insert("WIF", Sector::Meme);

        // Infrastructure / oracles
        m.insert("LINK", Sector::Infrastructure);
        m.insert("GRT", Sector::Infrastructure);
        m.insert("FIL", Sector::Infrastructure);
        m.insert("RNDR", Sector::Infrastructure);
        m.insert("TIA", Sector::Infrastructure);
        m.insert("FET", Sector::Infrastructure);

        // Payments
        m.insert("XRP", Sector::Payment);
        m.insert("XLM", Sector::Payment);
        m.insert("LTC", Sector::Payment);
        m.insert("BCH", Sector::Payment);

        // Gaming / metaverse
        m.insert("AXS", Sector::Metaverse);
        m.insert("SAND", Sector::Metaverse);
        m.insert("MANA", Sector::Metaverse);
        m.insert("GALA", Sector::Metaverse);

        m
    };
}

/// Classify a symbol, stripping a quote suffix ("BTC-USD", "BTC/USDT").
pub fn sector_of(symbol: &str) -> Sector {
    let ticker = symbol
        .split(['-', '/'])
        .next()
        .unwrap_or(symbol)
        .to_ascii_uppercase();
    SYMBOL_SECTORS
        .get(ticker.as_str())
        .copied()
        .unwrap_or(Sector::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_with_and_without_suffix() {
        assert_eq!(sector_of("BTC"), Sector::L1);
        assert_eq!(sector_of("BTC-USD"), Sector::L1);
        assert_eq!(sector_of("AAVE/USDT"), Sector::DeFi);
        assert_eq!(sector_of("doge"), Sector::Meme);
    }

    #[test]
    fn unknown_symbols_fall_through() {
        assert_eq!(sector_of("NOPE"), Sector::Unknown);
    }
}
