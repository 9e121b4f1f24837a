//! Runtime configuration read once from the process environment.
//!
//! | variable              | effect                                                   |
//! |-----------------------|----------------------------------------------------------|
//! | `LOOPTEN_NUM_THREADS` | worker threads used for shared dimensions (default: all) |
//! | `LOOPTEN_BACKEND`     | backend picked by convenience constructors               |
//!
//! Values are cached on first access; later changes to the environment are
//! not observed.

use std::env;
use std::sync::OnceLock;

static LOOPTEN_NUM_THREADS: OnceLock<Option<usize>> = OnceLock::new();
static LOOPTEN_BACKEND: OnceLock<Option<String>> = OnceLock::new();

fn parse_positive(value: &str) -> Option<usize> {
    match value.trim().parse::<usize>() {
        Ok(0) | Err(_) => {
            log::warn!("ignoring LOOPTEN_NUM_THREADS={value:?}: expected a positive integer");
            None
        }
        Ok(n) => Some(n),
    }
}

/// Thread count requested through `LOOPTEN_NUM_THREADS`, if any.
///
/// `None` means "let the thread pool decide".
pub fn num_threads() -> Option<usize> {
    *LOOPTEN_NUM_THREADS.get_or_init(|| match env::var("LOOPTEN_NUM_THREADS") {
        Ok(value) if !value.trim().is_empty() => parse_positive(&value),
        _ => None,
    })
}

/// Backend name requested through `LOOPTEN_BACKEND`, lower-cased.
pub fn backend_name() -> Option<&'static str> {
    LOOPTEN_BACKEND
        .get_or_init(|| match env::var("LOOPTEN_BACKEND") {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_ascii_lowercase()),
            _ => None,
        })
        .as_deref()
}
