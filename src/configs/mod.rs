pub mod base;
pub mod cache;
pub mod logging;
pub mod mpd;
pub mod origin;
pub mod prefetch;
pub mod server;
pub mod telemetry;

pub use base::*;
pub use cache::*;
pub use logging::*;
pub use mpd::*;
pub use origin::*;
pub use prefetch::*;
pub use server::*;
pub use telemetry::*;
