pub mod driver;
pub mod presence;
pub mod request;
