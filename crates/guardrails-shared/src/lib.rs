pub mod errors;
pub mod models;
pub mod risk;

pub use errors::*;
pub use models::*;
pub use risk::*;
