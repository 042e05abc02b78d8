pub mod browser;
pub mod candidates;
pub mod fetch;
pub mod html;
pub mod router;

pub use browser::{HeadlessRenderer, RendererConfig};
pub use fetch::PageFetcher;
pub use html::StaticScraper;
pub use router::{ExtractionRouter, Scraper};
