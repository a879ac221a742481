use std::fmt;
use std::future::Future;

/// Blocking entry point onto the runtime that owns taostd's connections.
///
/// A `TaosDatabase` builds exactly one `Runtime` and hands the same
/// `Arc<Runtime>` to its pool and to every session the pool opens. A
/// connection's background I/O tasks live on the runtime that opened it, so
/// later queries on that session must be driven by the same runtime, and the
/// worker thread count stays fixed no matter how large the pool is.
///
/// Inside an existing Tokio runtime the ambient handle is reused; otherwise a
/// dedicated multi-threaded runtime is built.
pub enum Runtime {
    Handle(tokio::runtime::Handle),
    TokioRuntime(tokio::runtime::Runtime),
}

impl Runtime {
    /// Creates a new runtime instance.
    pub fn new() -> std::io::Result<Self> {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            Ok(Self::Handle(handle))
        } else {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("taostd-rt")
                .build()?;

            Ok(Self::TokioRuntime(rt))
        }
    }

    /// Blocks the calling thread on a future.
    ///
    /// Safe to call from many threads at once. Must not be called from inside
    /// another `block_on` of the same runtime.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        match self {
            Runtime::Handle(handle) => tokio::task::block_in_place(|| handle.block_on(fut)),
            Runtime::TokioRuntime(runtime) => runtime.block_on(fut),
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Handle(_) => f.write_str("Runtime::Handle(...)"),
            Runtime::TokioRuntime(_) => f.write_str("Runtime::TokioRuntime(...)"),
        }
    }
}
