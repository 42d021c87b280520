// Price series domain
pub mod bar;

pub use bar::{EnrichedBar, IndicatorValues, PriceBar};
