pub mod logging;

pub use logging::StructuredLogger;
