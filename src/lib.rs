pub mod error;
pub mod types;
pub mod value;
pub mod cursor;
pub mod lexer;
pub mod expr;
pub mod deser;
pub mod coerce;
pub mod infer;
pub mod template;
pub mod cache;
pub mod batch;
pub mod reader;

pub use batch::{Batch, MissingMask};
pub use cache::{CachePolicy, TemplateCache};
pub use cursor::{skip_to_next_row, Cursor};
pub use error::{ValuesError, ValuesResult};
pub use reader::{BatchReader, ReadSettings, SchemaReader};
pub use types::{ColumnSpec, DataKind};
pub use value::Scalar;

// Test-only printing helper: expands to eprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
