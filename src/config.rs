//! Configuration options and the error channel
//!
//! Options behave like GDAL configuration options: values set through this module
//! override environment variables of the same name, and thread-local values
//! override global ones.
//!
//! ```
//! use gdalvec::config::*;
//!
//! set_config_option("CPL_TMPDIR", "/tmp").unwrap();
//! assert_eq!(get_config_option("CPL_TMPDIR", "").unwrap(), "/tmp");
//!
//! clear_config_option("CPL_TMPDIR").unwrap();
//! ```
//!
//! Errors reported by the library are also routed through here: every reported
//! error is stored as the thread's last error and forwarded to the installed
//! error handler, or to the `log` facade when no handler is set.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use log::{debug, error, warn};
use once_cell::sync::Lazy;

use crate::errors::{CplErrType, CplErrorNum, GdalVecError, Result};

static GLOBAL_OPTIONS: Lazy<Mutex<HashMap<String, String>>> = Lazy::new(Default::default);

thread_local! {
    static THREAD_OPTIONS: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
    static WARNED: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['=', '\0', '\n', '\r']) {
        return Err(GdalVecError::BadArgument(format!(
            "Invalid configuration option name: '{key}'"
        )));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(GdalVecError::BadArgument(format!(
            "Invalid configuration option value: '{value}'"
        )));
    }
    Ok(())
}

fn global_options() -> std::sync::MutexGuard<'static, HashMap<String, String>> {
    match GLOBAL_OPTIONS.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

/// Set a library configuration option
pub fn set_config_option(key: &str, value: &str) -> Result<()> {
    validate_key(key)?;
    validate_value(value)?;
    global_options().insert(key.to_string(), value.to_string());
    Ok(())
}

/// Get the value of a configuration option
///
/// Lookup order is thread-local value, global value, environment variable.
/// If the option is not found, `default` is returned.
pub fn get_config_option(key: &str, default: &str) -> Result<String> {
    validate_key(key)?;
    if let Some(v) = THREAD_OPTIONS.with(|o| o.borrow().get(key).cloned()) {
        return Ok(v);
    }
    if let Some(v) = global_options().get(key).cloned() {
        return Ok(v);
    }
    Ok(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

/// Clear the value of a configuration option
pub fn clear_config_option(key: &str) -> Result<()> {
    validate_key(key)?;
    global_options().remove(key);
    Ok(())
}

/// Set a configuration option with **thread local** scope
pub fn set_thread_local_config_option(key: &str, value: &str) -> Result<()> {
    validate_key(key)?;
    validate_value(value)?;
    THREAD_OPTIONS.with(|o| o.borrow_mut().insert(key.to_string(), value.to_string()));
    Ok(())
}

/// Get the value of a configuration option with **thread local** scope
pub fn get_thread_local_config_option(key: &str, default: &str) -> Result<String> {
    validate_key(key)?;
    Ok(THREAD_OPTIONS
        .with(|o| o.borrow().get(key).cloned())
        .unwrap_or_else(|| default.to_string()))
}

/// Clear the value of a configuration option with **thread local** scope
pub fn clear_thread_local_config_option(key: &str) -> Result<()> {
    validate_key(key)?;
    THREAD_OPTIONS.with(|o| o.borrow_mut().remove(key));
    Ok(())
}

/// Interpret a configuration option as a boolean (`YES`/`ON`/`TRUE`/`1`).
pub fn get_config_option_bool(key: &str, default: bool) -> Result<bool> {
    let v = get_config_option(key, if default { "YES" } else { "NO" })?;
    Ok(test_bool(&v))
}

pub(crate) fn test_bool(v: &str) -> bool {
    matches!(
        v.to_ascii_uppercase().as_str(),
        "YES" | "ON" | "TRUE" | "1"
    )
}

/// The last error reported on the current thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub class: CplErrType,
    pub number: CplErrorNum,
    pub msg: String,
}

type ErrorCallbackType = dyn FnMut(CplErrType, CplErrorNum, &str) + 'static + Send;

/// Static variable that holds the current error callback function
static ERROR_CALLBACK: Lazy<Mutex<Option<Box<ErrorCallbackType>>>> = Lazy::new(Default::default);

/// Set a custom error handler.
///
/// The handler replaces the default forwarding to the `log` facade. The last
/// error slot is updated regardless of the handler.
pub fn set_error_handler<F>(callback: F)
where
    F: FnMut(CplErrType, CplErrorNum, &str) + 'static + Send + Sync,
{
    let mut callback_lock = match ERROR_CALLBACK.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    callback_lock.replace(Box::new(callback));
}

/// Remove a custom error handler.
pub fn remove_error_handler() {
    let mut callback_lock = match ERROR_CALLBACK.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    callback_lock.take();
}

/// Report an error on the error channel.
pub fn emit_error(class: CplErrType, number: CplErrorNum, msg: &str) {
    if class >= CplErrType::Warning {
        LAST_ERROR.with(|e| {
            e.borrow_mut().replace(LastError {
                class,
                number,
                msg: msg.to_string(),
            })
        });
    }
    if QUIET.with(|q| *q.borrow() > 0) {
        return;
    }

    let mut callback_lock = match ERROR_CALLBACK.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    match callback_lock.as_mut() {
        Some(callback) => callback(class, number, msg),
        None => match class {
            CplErrType::None | CplErrType::Debug => debug!("{msg}"),
            CplErrType::Warning => warn!("{msg}"),
            CplErrType::Failure | CplErrType::Fatal => error!("{msg}"),
        },
    }
}

/// Report `err` as a failure on the error channel.
pub fn report_error(err: &GdalVecError) {
    emit_error(CplErrType::Failure, err.error_num(), &err.to_string());
}

/// Report a warning, but only the first time `msg` is seen on this thread.
///
/// Returns `true` if the warning was emitted.
pub fn warn_once(msg: &str) -> bool {
    let first = WARNED.with(|w| w.borrow_mut().insert(msg.to_string()));
    if first {
        emit_error(CplErrType::Warning, CplErrorNum::AppDefined, msg);
    }
    first
}

/// The last warning or failure reported on this thread, if any.
pub fn last_error() -> Option<LastError> {
    LAST_ERROR.with(|e| e.borrow().clone())
}

/// Clear the last error slot of this thread.
pub fn error_reset() {
    LAST_ERROR.with(|e| e.borrow_mut().take());
}

thread_local! {
    static QUIET: RefCell<usize> = const { RefCell::new(0) };
}

pub(crate) fn push_quiet() {
    QUIET.with(|q| *q.borrow_mut() += 1);
}

pub(crate) fn pop_quiet() {
    QUIET.with(|q| {
        let mut q = q.borrow_mut();
        *q = q.saturating_sub(1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_options() {
        // Global options are shared by every test thread, so these run sequentially.

        test_set_get_option();

        test_invalid_names();

        test_clear_option();

        test_set_get_option_thread_local();

        test_clear_option_thread_local();

        test_bool_option();
    }

    fn test_set_get_option() {
        assert!(set_config_option("GDALVEC_TEST_CACHEMAX", "128").is_ok());
        assert_eq!(
            get_config_option("GDALVEC_TEST_CACHEMAX", "").unwrap_or_else(|_| "".to_string()),
            "128"
        );
        assert_eq!(
            get_config_option("NON_EXISTANT_OPTION", "DEFAULT_VALUE")
                .unwrap_or_else(|_| "".to_string()),
            "DEFAULT_VALUE"
        );
    }

    fn test_invalid_names() {
        assert!(set_config_option("f\0oo", "valid").is_err());
        assert!(set_config_option("foo", "in\0valid").is_err());
        assert!(set_config_option("a=b", "valid").is_err());
        assert!(set_config_option("", "valid").is_err());
    }

    fn test_clear_option() {
        assert!(set_config_option("GDALVEC_TEST_OPTION", "256").is_ok());
        assert_eq!(
            get_config_option("GDALVEC_TEST_OPTION", "DEFAULT").unwrap(),
            "256"
        );
        assert!(clear_config_option("GDALVEC_TEST_OPTION").is_ok());
        assert_eq!(
            get_config_option("GDALVEC_TEST_OPTION", "DEFAULT").unwrap(),
            "DEFAULT"
        );
    }

    fn test_set_get_option_thread_local() {
        assert!(set_thread_local_config_option("GDALVEC_TEST_CACHEMAX", "64").is_ok());
        assert_eq!(
            get_thread_local_config_option("GDALVEC_TEST_CACHEMAX", "").unwrap(),
            "64"
        );
        // thread local value overrides the global one
        assert_eq!(
            get_config_option("GDALVEC_TEST_CACHEMAX", "").unwrap(),
            "64"
        );
        assert_eq!(
            get_thread_local_config_option("NON_EXISTANT_OPTION", "DEFAULT_VALUE").unwrap(),
            "DEFAULT_VALUE"
        );
    }

    fn test_clear_option_thread_local() {
        assert!(clear_thread_local_config_option("GDALVEC_TEST_CACHEMAX").is_ok());
        assert_eq!(
            get_config_option("GDALVEC_TEST_CACHEMAX", "").unwrap(),
            "128"
        );
        assert!(clear_config_option("GDALVEC_TEST_CACHEMAX").is_ok());
    }

    fn test_bool_option() {
        set_thread_local_config_option("GDALVEC_TEST_BOOL", "on").unwrap();
        assert!(get_config_option_bool("GDALVEC_TEST_BOOL", false).unwrap());
        clear_thread_local_config_option("GDALVEC_TEST_BOOL").unwrap();
        assert!(!get_config_option_bool("GDALVEC_TEST_BOOL", false).unwrap());
    }

    #[test]
    fn test_last_error_and_warn_once() {
        error_reset();
        assert!(last_error().is_none());

        emit_error(CplErrType::Debug, CplErrorNum::None, "only debug");
        assert!(last_error().is_none());

        assert!(warn_once("edge 12 missing"));
        assert!(!warn_once("edge 12 missing"));
        let err = last_error().unwrap();
        assert_eq!(err.class, CplErrType::Warning);
        assert_eq!(err.msg, "edge 12 missing");

        report_error(&GdalVecError::UserInterrupt);
        assert_eq!(last_error().unwrap().number, CplErrorNum::UserInterrupt);

        error_reset();
        assert!(last_error().is_none());
    }
}
