use std::sync::OnceLock;

use log::debug;
use tokio::runtime::Runtime;

static GLOBAL_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The runtime synchronous entry points block on. Built on first use.
pub fn global_runtime() -> std::io::Result<&'static Runtime> {
    if let Some(rt) = GLOBAL_RUNTIME.get() {
        return Ok(rt);
    }
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    let threads = std::cmp::max(threads, 2);
    debug!("Initializing global runtime with {} threads", threads);
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()?;
    Ok(GLOBAL_RUNTIME.get_or_init(|| rt))
}
