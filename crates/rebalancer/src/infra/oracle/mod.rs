pub mod base_apy;
pub mod price;

pub use {
    base_apy::BaseApyOracle,
    price::{LivePriceOracle, PriceOracle, StaticPriceOracle},
};
