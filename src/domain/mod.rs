pub mod booking;
pub mod payment;
pub mod projections;

pub use booking::*;
pub use payment::*;
pub use projections::*;
