use std::sync::{Arc, Mutex};

use gdalvec::config;
use gdalvec::errors::{CplErrType, CplErrorNum, GdalVecError};

#[test]
fn test_error_handler() {
    // The handler is process wide, so the scenarios run sequentially.

    use_error_handler();

    error_handler_interleaved();
}

fn use_error_handler() {
    let errors: Arc<Mutex<Vec<(CplErrType, CplErrorNum, String)>>> =
        Arc::new(Mutex::new(Vec::new()));

    let errors_clone = errors.clone();

    config::set_error_handler(move |a, b, c| {
        errors_clone.lock().unwrap().push((a, b, c.to_string()));
    });

    config::emit_error(CplErrType::Failure, CplErrorNum::AppDefined, "foo");
    config::emit_error(CplErrType::Warning, CplErrorNum::IllegalArg, "bar");
    config::report_error(&GdalVecError::UserInterrupt);

    config::remove_error_handler();

    // not captured any more
    config::emit_error(CplErrType::Failure, CplErrorNum::AppDefined, "baz");

    let result: Vec<(CplErrType, CplErrorNum, String)> = errors.lock().unwrap().clone();
    assert_eq!(
        result,
        vec![
            (CplErrType::Failure, CplErrorNum::AppDefined, "foo".to_string()),
            (CplErrType::Warning, CplErrorNum::IllegalArg, "bar".to_string()),
            (
                CplErrType::Failure,
                CplErrorNum::UserInterrupt,
                GdalVecError::UserInterrupt.to_string()
            ),
        ]
    );

    let last = config::last_error().unwrap();
    assert_eq!(last.msg, "baz");
    config::error_reset();
    assert!(config::last_error().is_none());
}

fn error_handler_interleaved() {
    use std::thread;
    // Two racing threads trying to set error handlers
    for _ in 0..2 {
        thread::spawn(move || loop {
            config::set_error_handler(move |_a, _b, _c| {});
        });
    }

    // A thread that provokes potential race conditions
    let join_handle = thread::spawn(move || {
        for _ in 0..100 {
            config::emit_error(CplErrType::Failure, CplErrorNum::AppDefined, "foo");
            config::emit_error(CplErrType::Warning, CplErrorNum::AppDefined, "bar");
        }
        config::last_error()
    });

    let last = join_handle.join().unwrap();
    assert_eq!(last.map(|e| e.msg), Some("bar".to_string()));
}
