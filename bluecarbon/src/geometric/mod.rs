pub mod change;
pub mod composite;
pub mod equal_area;
pub mod habitat_mask;
pub mod region;
pub mod time_series;
pub mod zonal_stats;
