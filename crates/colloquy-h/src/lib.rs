//! Headless probe backend over Chromium (CDP).

pub mod cdp;
pub mod probe;

pub use cdp::LaunchOptions;
pub use probe::CdpProbe;
