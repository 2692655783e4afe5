/// Sentinel selector meaning the whole national extent
pub const ALL_REGIONS: &str = "All Regions";

/// Attribute names that may hold the state of a habitat feature, in lookup order
pub const REGION_FIELD_CANDIDATES: [&str; 7] = [
    "ste_name21",
    "STE_NAME21",
    "STATE",
    "STATE_NAME",
    "State_Name",
    "state",
    "STATE_NAME21",
];

/// Region name attribute of the FAO GAUL level-1 boundaries
pub const BOUNDARY_NAME_FIELD: &str = "ADM1_NAME";

/// Abbreviation or full name to the canonical GAUL level-1 name
pub const REGION_ALIASES: [(&str, &str); 16] = [
    ("NSW", "New South Wales"),
    ("New South Wales", "New South Wales"),
    ("QLD", "Queensland"),
    ("Queensland", "Queensland"),
    ("VIC", "Victoria"),
    ("Victoria", "Victoria"),
    ("TAS", "Tasmania"),
    ("Tasmania", "Tasmania"),
    ("SA", "South Australia"),
    ("South Australia", "South Australia"),
    ("WA", "Western Australia"),
    ("Western Australia", "Western Australia"),
    ("NT", "Northern Territory"),
    ("Northern Territory", "Northern Territory"),
    ("ACT", "Australian Capital Territory"),
    ("Australian Capital Territory", "Australian Capital Territory"),
];

/// MODIS Terra 16-day vegetation indices, 250 m
pub const NDVI_COLLECTION: &str = "MODIS/061/MOD13Q1";
pub const NDVI_BAND: &str = "NDVI";
/// MOD13Q1 stores NDVI as fixed-point integers
pub const NDVI_SCALE_FACTOR: f64 = 0.0001;

pub const FIRST_YEAR: i32 = 2001;
pub const LAST_YEAR: i32 = 2024;
pub const DEFAULT_BASELINE_YEAR: i32 = 2005;
pub const DEFAULT_COMPARISON_YEAR: i32 = 2024;
/// Absolute NDVI change below which a pixel counts as stable
pub const DEFAULT_DELTA_THRESHOLD: f64 = 0.05;

pub const DEFAULT_MAX_PIXELS: u64 = 10_000_000_000_000;

/// Selectable display years: every fifth year from the first, closed by the last
pub fn selectable_years() -> Vec<i32> {
    let mut years: Vec<i32> = (FIRST_YEAR..=LAST_YEAR).step_by(5).collect();
    if years.last() != Some(&LAST_YEAR) {
        years.push(LAST_YEAR);
    }
    years
}
