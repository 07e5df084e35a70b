pub mod estimate;
pub mod expiry;
pub mod finder;
pub mod matching;
pub mod presence;
