//! Gateway-independent pieces: errors, cookies and multi-valued params.

pub mod cookie;
pub mod errors;
pub mod params;
