//! Numeric Locale
//!
//! Process-wide numeric formatting state consulted by the engine when it
//! parses or prints numbers. A build forces the `"C"` locale for its whole
//! duration so coordinates never depend on the host's regional settings.
//!
//! The state is shared by the whole process. Scopes are serialized through a
//! re-entrant lock: concurrent builds take turns, nested scopes on one
//! thread are fine.

use parking_lot::{const_mutex, const_reentrant_mutex, Mutex, ReentrantMutex, ReentrantMutexGuard};

/// Locale-independent numeric locale
pub const C_LOCALE: &str = "C";

/// Languages writing a decimal comma
const COMMA_LANGUAGES: &[&str] = &[
    "bg", "cs", "da", "de", "el", "es", "fi", "fr", "hr", "hu", "id", "it", "nb", "nl", "nn",
    "no", "pl", "pt", "ro", "ru", "sk", "sl", "sr", "sv", "tr", "uk", "vi",
];

static NUMERIC_LOCALE: Mutex<Option<String>> = const_mutex(None);
static SCOPE: ReentrantMutex<()> = const_reentrant_mutex(());

/// Host numeric locale from `LC_ALL`, `LC_NUMERIC` or `LANG`
fn host_numeric_locale() -> String {
    ["LC_ALL", "LC_NUMERIC", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .map(|value| normalize(&value))
        .unwrap_or_else(|| C_LOCALE.to_string())
}

/// Strip encoding and modifier: `de_DE.UTF-8@euro` -> `de_DE`
fn normalize(name: &str) -> String {
    let name = name.split(['.', '@']).next().unwrap_or_default();
    if name.is_empty() {
        C_LOCALE.to_string()
    } else {
        name.to_string()
    }
}

fn replace_locale(name: String) -> String {
    let mut state = NUMERIC_LOCALE.lock();
    let current = state.get_or_insert_with(host_numeric_locale);
    std::mem::replace(current, name)
}

/// Name of the active numeric locale
pub fn current_numeric_locale() -> String {
    NUMERIC_LOCALE
        .lock()
        .get_or_insert_with(host_numeric_locale)
        .clone()
}

/// Set the numeric locale outside any build scope, as a host application
/// changing its regional settings would.
pub fn set_host_numeric_locale(name: &str) {
    let _scope = SCOPE.lock();
    replace_locale(normalize(name));
}

/// Decimal separator of the active numeric locale
pub fn decimal_separator() -> char {
    let locale = current_numeric_locale();
    let language = locale.split(['_', '-']).next().unwrap_or_default().to_lowercase();
    if COMMA_LANGUAGES.contains(&language.as_str()) {
        ','
    } else {
        '.'
    }
}

/// Forces the `"C"` numeric locale until dropped, then restores the
/// previous one, including during unwinding.
pub struct NumericLocaleGuard {
    previous: String,
    _scope: ReentrantMutexGuard<'static, ()>,
}

impl NumericLocaleGuard {
    /// Enter a locale-independent scope, waiting for other threads' scopes
    pub fn acquire() -> Self {
        let scope = SCOPE.lock();
        let previous = replace_locale(C_LOCALE.to_string());
        log::trace!("Numeric locale {} -> {}", previous, C_LOCALE);
        Self {
            previous,
            _scope: scope,
        }
    }

    /// Locale that will be restored
    pub fn previous(&self) -> &str {
        &self.previous
    }
}

impl Drop for NumericLocaleGuard {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        log::trace!("Numeric locale restored to {}", previous);
        replace_locale(previous);
    }
}

/// Run `body` with the `"C"` numeric locale
pub fn with_numeric_locale<T>(body: impl FnOnce() -> T) -> T {
    let _guard = NumericLocaleGuard::acquire();
    body()
}
