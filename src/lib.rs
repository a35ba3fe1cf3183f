pub mod classifier;
pub mod config;
pub mod errors;
pub mod extractor;
pub mod html;
pub mod http_pool;
pub mod preload;
pub mod resolver;
pub mod song;
pub mod spotify;
pub mod worker;

pub use classifier::{classify, find_urls, Classification, SpotifyKind, SpotifyLink};
pub use config::AppConfig;
pub use errors::{AppError, ExtractError, SongError};
pub use extractor::{ExtractOptions, Extractor, ExtractorRegistry, InfoDict, Query};
pub use preload::PreloadCache;
pub use resolver::{Resolved, Resolver, SongSource};
pub use song::{Host, Origin, Song};
pub use worker::ExtractionWorker;
