pub mod config;
pub mod error;
pub mod normalize;
mod row;
pub mod types;

pub use config::Config;
pub use error::NewsloomError;
pub use normalize::{is_non_prose_path, normalize_url, rate_limit_domain, source_label};
pub use types::*;
