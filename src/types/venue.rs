//! Supported venues and their reconciliation capabilities.
//!
//! Venues differ in how their depth streams must be reconciled: some stamp
//! every update with a sequence number, some open the stream with a full
//! level list, and some only ever send deltas and expect the client to fetch a
//! REST snapshot first. Those differences are captured as data in
//! [`VenueCapabilities`] so a single engine serves every venue.
//!
//! The registry is a compile-time table: [`Venue::profile`] dispatches over the
//! closed enum to one constructor function per venue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A trading venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Venue {
    /// Binance spot
    Binance,
    /// Bitmax
    Bitmax,
    /// BitMEX
    Bitmex,
    /// Bitstamp
    Bitstamp,
    /// Bithumb
    Bithumb,
    /// Bit-Z
    Bitz,
    /// Coineal
    Coineal,
    /// Hubi
    Hubi,
    /// Huobi Global
    HuobiGlobal,
    /// Huobi Japan
    HuobiJapan,
    /// Huobi Korea
    HuobiKorea,
    /// IDAX
    Idax,
    /// Korbotex
    Korbotex,
    /// Kraken
    Kraken,
    /// KuCoin
    Kucoin,
    /// OKEx
    Okex,
    /// OKEx Korea
    OkexKorea,
    /// Poloniex
    Poloniex,
    /// Upbit
    Upbit,
}

impl Venue {
    /// Every supported venue
    pub const ALL: [Venue; 19] = [
        Venue::Binance,
        Venue::Bitmax,
        Venue::Bitmex,
        Venue::Bitstamp,
        Venue::Bithumb,
        Venue::Bitz,
        Venue::Coineal,
        Venue::Hubi,
        Venue::HuobiGlobal,
        Venue::HuobiJapan,
        Venue::HuobiKorea,
        Venue::Idax,
        Venue::Korbotex,
        Venue::Kraken,
        Venue::Kucoin,
        Venue::Okex,
        Venue::OkexKorea,
        Venue::Poloniex,
        Venue::Upbit,
    ];

    /// Canonical upper-case name (e.g. `HUOBI_GLOBAL`)
    pub fn name(self) -> &'static str {
        match self {
            Venue::Binance => "BINANCE",
            Venue::Bitmax => "BITMAX",
            Venue::Bitmex => "BITMEX",
            Venue::Bitstamp => "BITSTAMP",
            Venue::Bithumb => "BITHUMB",
            Venue::Bitz => "BITZ",
            Venue::Coineal => "COINEAL",
            Venue::Hubi => "HUBI",
            Venue::HuobiGlobal => "HUOBI_GLOBAL",
            Venue::HuobiJapan => "HUOBI_JAPAN",
            Venue::HuobiKorea => "HUOBI_KOREA",
            Venue::Idax => "IDAX",
            Venue::Korbotex => "KORBOTEX",
            Venue::Kraken => "KRAKEN",
            Venue::Kucoin => "KUCOIN",
            Venue::Okex => "OKEX",
            Venue::OkexKorea => "OKEX_KOREA",
            Venue::Poloniex => "POLONIEX",
            Venue::Upbit => "UPBIT",
        }
    }

    /// Reconciliation profile for this venue
    pub fn profile(self) -> VenueProfile {
        let constructor: fn() -> VenueProfile = match self {
            Venue::Binance => profiles::binance,
            Venue::Kucoin => profiles::kucoin,
            Venue::Poloniex => profiles::poloniex,
            Venue::Bitmex => profiles::bitmex,
            Venue::Kraken => profiles::kraken,
            Venue::Okex => profiles::okex,
            Venue::OkexKorea => profiles::okex_korea,
            Venue::Idax => profiles::idax,
            Venue::Hubi => profiles::hubi,
            Venue::Bitz => profiles::bitz,
            Venue::Bitmax => profiles::bitmax,
            Venue::Bitstamp => profiles::bitstamp,
            Venue::Bithumb => profiles::bithumb,
            Venue::Coineal => profiles::coineal,
            Venue::HuobiGlobal => profiles::huobi_global,
            Venue::HuobiJapan => profiles::huobi_japan,
            Venue::HuobiKorea => profiles::huobi_korea,
            Venue::Korbotex => profiles::korbotex,
            Venue::Upbit => profiles::upbit,
        };
        constructor()
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Venue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Venue::ALL
            .into_iter()
            .find(|venue| venue.name() == wanted || venue.name().replace('_', "") == wanted)
            .ok_or_else(|| Error::UnknownVenue(s.to_string()))
    }
}

/// How a venue's depth stream has to be reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VenueCapabilities {
    /// Updates carry venue-assigned sequence numbers
    pub has_sequence_numbers: bool,
    /// The first update after subscribing is a complete level list
    pub self_contained_first_delta: bool,
    /// The stream only carries deltas; a REST snapshot must seed the book
    pub needs_rest_snapshot_bootstrap: bool,
}

impl VenueCapabilities {
    /// Sequenced delta stream seeded from a REST snapshot
    pub const fn sequenced_with_rest_bootstrap() -> Self {
        Self {
            has_sequence_numbers: true,
            self_contained_first_delta: false,
            needs_rest_snapshot_bootstrap: true,
        }
    }

    /// Sequenced stream that opens with a snapshot message
    pub const fn sequenced() -> Self {
        Self {
            has_sequence_numbers: true,
            self_contained_first_delta: false,
            needs_rest_snapshot_bootstrap: false,
        }
    }

    /// Unsequenced stream whose first message is a full book
    pub const fn self_contained() -> Self {
        Self {
            has_sequence_numbers: false,
            self_contained_first_delta: true,
            needs_rest_snapshot_bootstrap: false,
        }
    }

    /// Unsequenced stream of full snapshots only
    pub const fn snapshots_only() -> Self {
        Self {
            has_sequence_numbers: false,
            self_contained_first_delta: false,
            needs_rest_snapshot_bootstrap: false,
        }
    }
}

/// Capabilities plus the sequence gap tolerance used for a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueProfile {
    /// Venue this profile describes
    pub venue: Venue,
    /// Stream capabilities
    pub capabilities: VenueCapabilities,
    /// Number of missing sequence numbers tolerated before a resync.
    ///
    /// `0` means every update must directly follow the previous one.
    pub gap_tolerance: u64,
}

impl VenueProfile {
    /// Create a profile
    pub const fn new(venue: Venue, capabilities: VenueCapabilities, gap_tolerance: u64) -> Self {
        Self {
            venue,
            capabilities,
            gap_tolerance,
        }
    }

    /// Override the gap tolerance
    #[must_use]
    pub const fn with_gap_tolerance(mut self, gap_tolerance: u64) -> Self {
        self.gap_tolerance = gap_tolerance;
        self
    }
}

/// One constructor per venue.
mod profiles {
    use super::{Venue, VenueCapabilities, VenueProfile};

    pub(super) fn binance() -> VenueProfile {
        VenueProfile::new(Venue::Binance, VenueCapabilities::sequenced_with_rest_bootstrap(), 0)
    }

    pub(super) fn kucoin() -> VenueProfile {
        VenueProfile::new(Venue::Kucoin, VenueCapabilities::sequenced_with_rest_bootstrap(), 0)
    }

    pub(super) fn poloniex() -> VenueProfile {
        VenueProfile::new(Venue::Poloniex, VenueCapabilities::sequenced(), 0)
    }

    // BitMEX opens with a "partial" table before its "update" rows.
    pub(super) fn bitmex() -> VenueProfile {
        VenueProfile::new(Venue::Bitmex, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn kraken() -> VenueProfile {
        VenueProfile::new(Venue::Kraken, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn okex() -> VenueProfile {
        VenueProfile::new(Venue::Okex, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn okex_korea() -> VenueProfile {
        VenueProfile::new(Venue::OkexKorea, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn idax() -> VenueProfile {
        VenueProfile::new(Venue::Idax, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn hubi() -> VenueProfile {
        VenueProfile::new(Venue::Hubi, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn bitz() -> VenueProfile {
        VenueProfile::new(Venue::Bitz, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn bitmax() -> VenueProfile {
        VenueProfile::new(Venue::Bitmax, VenueCapabilities::self_contained(), 0)
    }

    pub(super) fn bitstamp() -> VenueProfile {
        VenueProfile::new(Venue::Bitstamp, VenueCapabilities::snapshots_only(), 0)
    }

    pub(super) fn bithumb() -> VenueProfile {
        VenueProfile::new(Venue::Bithumb, VenueCapabilities::snapshots_only(), 0)
    }

    pub(super) fn coineal() -> VenueProfile {
        VenueProfile::new(Venue::Coineal, VenueCapabilities::snapshots_only(), 0)
    }

    pub(super) fn huobi_global() -> VenueProfile {
        VenueProfile::new(Venue::HuobiGlobal, VenueCapabilities::snapshots_only(), 0)
    }

    pub(super) fn huobi_japan() -> VenueProfile {
        VenueProfile::new(Venue::HuobiJapan, VenueCapabilities::snapshots_only(), 0)
    }

    pub(super) fn huobi_korea() -> VenueProfile {
        VenueProfile::new(Venue::HuobiKorea, VenueCapabilities::snapshots_only(), 0)
    }

    pub(super) fn korbotex() -> VenueProfile {
        VenueProfile::new(Venue::Korbotex, VenueCapabilities::snapshots_only(), 0)
    }

    pub(super) fn upbit() -> VenueProfile {
        VenueProfile::new(Venue::Upbit, VenueCapabilities::snapshots_only(), 0)
    }
}
