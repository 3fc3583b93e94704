// Middleware for CORS and panic recovery

pub mod cors;
pub mod panic;

pub use cors::*;
pub use panic::*;
