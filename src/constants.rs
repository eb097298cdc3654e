/// Column order of the clean artifact. Field order is part of the artifact contract.
pub const CLEAN_COLUMNS: [&str; 8] = [
    "place_id",
    "name",
    "rating",
    "user_ratings_total",
    "latitude",
    "longitude",
    "types",
    "address",
];

/// Column order of the ranked and top-N artifacts.
pub const RANKED_COLUMNS: [&str; 6] = [
    "place_id",
    "name",
    "rating",
    "user_ratings_total",
    "category",
    "rating_rank",
];

/// Substituted for an absent or empty name/address.
pub const UNKNOWN: &str = "Unknown";

// Crawler
pub const APIFY_SOURCE: &str = "apify";
pub const FIXTURE_SOURCE: &str = "fixture";
pub const APIFY_TOKEN_ENV: &str = "APIFY_TOKEN";
