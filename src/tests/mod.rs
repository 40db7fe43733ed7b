//! Cross-module test suites. Behavior local to one module is tested next to
//! that module; the suites here drive the navigator, store and index
//! together through multi-step editing sessions.

mod helpers;
