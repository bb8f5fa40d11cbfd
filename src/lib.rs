pub mod audio;
pub mod compose;
pub mod config;
pub mod error;
pub mod interactive;
pub mod language;
pub mod pipeline;
pub mod segment;
pub mod synthesize;
pub mod transcribe;
pub mod translate;

pub use config::Config;
pub use error::{DubError, Result};
pub use language::Language;
pub use pipeline::{
    dub_video, dub_video_with_cancel, print_summary, DubConfig, DubOutputs, DubResult, DubStats,
};
pub use synthesize::Voice;
