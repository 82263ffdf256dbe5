use std::sync::{Mutex, MutexGuard, PoisonError};

/// Every variable `apply_env_overrides` reads.
const GATEWAY_VARS: [&str; 4] = [
    "AGENTGATE_TOKENS_PATH",
    "AGENTGATE_APPROVAL_TIMEOUT_SECS",
    "AUTH_TOKEN",
    "AUTH_TOKEN_FILE",
];

static ENV: Mutex<()> = Mutex::new(());

/// Exclusive access to the gateway's environment variables for one test.
///
/// Starts with all of them unset and puts the previous values back on drop.
pub(crate) struct ScopedEnv {
    saved: Vec<(&'static str, Option<String>)>,
    _exclusive: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    pub(crate) fn clean() -> Self {
        let exclusive = ENV.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = GATEWAY_VARS
            .into_iter()
            .map(|key| (key, std::env::var(key).ok()))
            .collect();
        for key in GATEWAY_VARS {
            // SAFETY: `ENV` is held, so no other config test touches the
            // environment concurrently.
            unsafe { std::env::remove_var(key) };
        }
        Self {
            saved,
            _exclusive: exclusive,
        }
    }

    pub(crate) fn set(self, key: &'static str, value: &str) -> Self {
        debug_assert!(GATEWAY_VARS.contains(&key), "{key} is not restored on drop");
        // SAFETY: `ENV` is held by `self`.
        unsafe { std::env::set_var(key, value) };
        self
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, previous) in &self.saved {
            // SAFETY: `_exclusive` is released only after this body returns.
            unsafe {
                match previous {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
