pub mod ask;
pub mod system;

pub use ask::*;
pub use system::*;
