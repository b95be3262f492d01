//! Browser engine capability layer.
//!
//! The execution plane never talks to a browser library directly; it consumes
//! the `BrowserEngine`/`PageHandle` traits defined here. Two engines are
//! provided: a Chrome implementation over CDP (`cdp`, feature-gated) and a
//! deterministic in-memory engine (`sim`) used by tests and dry runs.
//!
//! Engine errors are classified into the shared error taxonomy at this
//! boundary; nothing above it sees library-specific error types.

mod error;
mod factory;
mod params;
mod traits;

#[cfg(feature = "cdp")]
mod cdp;
pub mod sim;

pub use error::{DriverError, DriverResult};
pub use factory::{EngineKind, LaunchOptions, Launcher};
pub use params::{
    ClickParams, ClipRect, CookieParam, MouseButton, NavigateParams, NavigationOutcome, PdfParams,
    ScreenshotFormat, ScreenshotParams, WaitUntil,
};
pub use traits::{BrowserEngine, HistoryInfo, PageHandle};
