pub mod confidence;
pub mod price;

pub use confidence::Confidence;
pub use price::Price;
