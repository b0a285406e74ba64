pub mod browser;
pub mod classify;
pub mod context;
pub mod crawler;
pub mod error;
pub mod fake_data;
pub mod normalize;
pub mod result;
pub mod tester;

pub use browser::{BrowserDriver, ChromeConfig, ChromeDriver, HttpDriver, PageHandle, Viewport};
pub use classify::{InteractionSnapshot, classify};
pub use context::RunContext;
pub use crawler::{Crawler, ProgressCallback};
pub use error::ScanError;
pub use result::{
    BrokenLink, FakeDataFinding, InteractionResult, InteractiveElement, OutcomeKind, PageRecord,
    PageRun,
};
pub use tester::InteractionTester;
