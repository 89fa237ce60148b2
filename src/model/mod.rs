pub mod party;
pub mod results;
pub mod session;
pub mod voter;
