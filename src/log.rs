//! Logging shim so the core can run either on `log` (desktop / CLI builds)
//! or `defmt` (firmware builds without `std`), matching whichever macro the
//! call site already reaches for (`crate::log::{trace, debug, info, warn,
//! error}`).

#[cfg(not(feature = "defmt"))]
pub use log::{debug, error, info, trace, warn};

#[cfg(feature = "defmt")]
pub use defmt::{debug, error, info, trace, warn};
