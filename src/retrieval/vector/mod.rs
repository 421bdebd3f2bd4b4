pub mod flat;
pub mod types;

pub use flat::FlatL2Index;
pub use types::VectorError;
