//! HTTP API handlers for survey-intake

pub mod buildinfo;
pub mod ping;
pub mod survey;

pub use buildinfo::{buildinfo_routes, get_build_info, BuildInfo};
pub use ping::{ping, ping_routes};
pub use survey::{submit_survey, survey_routes};
