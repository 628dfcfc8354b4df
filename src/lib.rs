#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating most pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts in pagination/timestamp arithmetic
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
// Module structure — query::QueryPage etc. by design
#![allow(clippy::module_name_repetitions)]

pub mod admin;
pub mod bus;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod query;
pub mod router;
pub mod sched;
pub mod store;
pub mod template;
pub mod transport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
