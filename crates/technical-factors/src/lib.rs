pub mod computer;
pub mod indicators;

pub use computer::TechnicalFactorComputer;
pub use indicators::*;
