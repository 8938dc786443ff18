pub mod medicine;
pub mod schedule;

pub use medicine::*;
pub use schedule::*;
