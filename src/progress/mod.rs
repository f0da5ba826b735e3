//! Progress reporting for batch conversions.
//!
//! ```rust,ignore
//! use medimg_transcode::progress::CallbackProgress;
//!
//! let progress = CallbackProgress::new(|event| {
//!     println!("{}", event);
//! });
//! let batch = BatchConverter::new(converter).progress(progress);
//! ```

mod bar;
mod callback;
mod handler;

pub use bar::BarProgress;
pub use callback::CallbackProgress;
pub use handler::{NullProgress, ProgressEvent, ProgressHandler};
