/// Arguments for the server binary.
pub mod args;

/// Simple helper functions for reading and writing files.
pub mod file_io;

/// Batch spectrogram generation for a session's uploaded files.
pub mod generate;

/// Plotting functionality.
pub mod plotting;

/// Request routing and handlers.
pub mod routes;

/// Session cookie handling.
pub mod session;

/// The hyper accept loop.
pub mod server;

/// Shared per-process state handed to every handler.
pub mod state;

/// Session-scoped media storage on disk.
pub mod store;
