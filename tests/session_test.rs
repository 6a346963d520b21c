mod common;

use common::payload;
use serde_json::json;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use xlbridge::session::BookSession;
use xlbridge::settings::{SettingsError, book_settings};

fn open_counted(closed: &Arc<AtomicUsize>) -> BookSession {
    let closed = Arc::clone(closed);
    BookSession::open(&payload(0, None, &[("Sheet1", json!([["Hello"]]))]))
        .unwrap()
        .on_close(move |_| {
            closed.fetch_add(1, Ordering::SeqCst);
        })
}

#[test]
fn released_after_success() {
    let closed = Arc::new(AtomicUsize::new(0));
    let mut book = open_counted(&closed);
    let a1 = book.range(book.first_sheet(), "A1").unwrap();
    book.set_value(&a1, "changed");

    let json = book.into_json();
    assert_eq!(json["actions"][0]["values"], json!([["changed"]]));
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn released_when_handler_fails() {
    fn handler(book: BookSession) -> Result<(), SettingsError> {
        book_settings(&book)?;
        Ok(())
    }

    let closed = Arc::new(AtomicUsize::new(0));
    let result = handler(open_counted(&closed));
    assert!(result.is_err());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn released_when_handler_panics() {
    let closed = Arc::new(AtomicUsize::new(0));
    let book = open_counted(&closed);
    let outcome = catch_unwind(AssertUnwindSafe(move || {
        let _book = book;
        panic!("handler blew up");
    }));
    assert!(outcome.is_err());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn hook_sees_pending_actions() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let mut book = BookSession::open(&payload(0, None, &[("Sheet1", json!([]))]))
        .unwrap()
        .on_close(move |book| {
            counter.store(book.actions().len(), Ordering::SeqCst);
        });
    let a1 = book.range(book.first_sheet(), "A1:B2").unwrap();
    book.clear_contents(&a1);
    drop(book);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn invalid_payload_never_opens() {
    assert!(BookSession::open(b"{\"book\": {}}").is_err());
}
