//! Fixed asset universe and small per-asset array helpers.
//!
//! The source keeps per-asset parameters in dynamic, name-keyed dictionaries.
//! Here the asset set is closed and small, so it is a sum type indexing
//! fixed-size arrays instead.

use serde::{Deserialize, Serialize};

pub const N_ASSETS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Stocks,
    Bonds,
    Crypto,
    Cds,
    Cash,
}

impl Asset {
    pub const ALL: [Asset; N_ASSETS] = [
        Asset::Stocks,
        Asset::Bonds,
        Asset::Crypto,
        Asset::Cds,
        Asset::Cash,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Asset::Stocks => 0,
            Asset::Bonds => 1,
            Asset::Crypto => 2,
            Asset::Cds => 3,
            Asset::Cash => 4,
        }
    }

    pub const fn from_index(i: usize) -> Option<Asset> {
        match i {
            0 => Some(Asset::Stocks),
            1 => Some(Asset::Bonds),
            2 => Some(Asset::Crypto),
            3 => Some(Asset::Cds),
            4 => Some(Asset::Cash),
            _ => None,
        }
    }
}

/// Per-asset value, indexed by `Asset`. A thin wrapper over `[f64; N_ASSETS]`
/// so callers don't have to remember the `stocks,bonds,crypto,cds,cash` order.
pub type AssetArray = [f64; N_ASSETS];

pub fn asset_array_from_map<F: Fn(Asset) -> f64>(f: F) -> AssetArray {
    let mut out = [0.0; N_ASSETS];
    for a in Asset::ALL {
        out[a.index()] = f(a);
    }
    out
}
