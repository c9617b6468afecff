//! Service layer: progress reporting and image I/O

pub mod io;
pub mod progress;

pub use io::ImageIoService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
