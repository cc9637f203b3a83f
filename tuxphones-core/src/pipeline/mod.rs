pub mod delivery;
pub mod encoding;
