pub mod browser;
pub mod core;
pub mod fetch;

// --- Primary exports ---
pub use browser::driver::{PageDriver, PageProvider};
pub use browser::BrowserPool;
pub use core::config::FetchBudgets;
pub use fetch::headers::{HeaderProfile, HEADER_PROFILE};
pub use fetch::{FetchError, FetchReport, FetchStage, StealthFetcher};
