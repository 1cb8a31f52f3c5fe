use anyhow::Result;

/// Runs `f` on a rayon pool with `threads` workers (0 = rayon default).
/// Without the `mt` feature `f` runs on the calling thread.
#[cfg(feature = "mt")]
pub fn install<T, F>(threads: usize, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build thread pool: {}", e))?;
    Ok(pool.install(f))
}

#[cfg(not(feature = "mt"))]
pub fn install<T, F>(_threads: usize, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    Ok(f())
}
