use std::io;

/// Errors surfaced across the library's public boundary.
///
/// Structural failures (an unbalanced scope, an allocation failure while
/// the call tree is mutated) are not represented here: per the design they
/// are fatal and abort the process rather than unwind through a
/// measurement boundary. This type only covers failures a caller can
/// reasonably recover from.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A report or archive file could not be written during finalize.
    ///
    /// Finalize continues attempting the remaining outputs after logging
    /// this; the caller still gets the error back so it can decide whether
    /// the run should be considered complete.
    #[error("i/o failure during finalize: {0}")]
    Io(#[from] io::Error),

    /// A component kind could not probe its underlying measurement source
    /// (e.g. a missing hardware counter). The component degrades to a
    /// zero-state no-op; this variant exists only for logging, it is never
    /// returned from the measurement hot path.
    #[error("component `{kind}` is unavailable on this platform")]
    ComponentUnavailable { kind: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
