pub mod apify;
pub mod fixture;

pub use apify::ApifyPlaceSource;
pub use fixture::FixturePlaceSource;
