//! Scoped workbook handle for a single request.
//!
//! A [`BookSession`] owns the [`Book`] opened from the request body and
//! releases it when dropped, so every exit path of a handler (normal return,
//! `?` on an error, or a panic unwinding through it) closes the book.

use crate::app::AppState;
use crate::error::AppError;
use crate::workbook::{Book, WorkbookError};
use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header;
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

type CloseHook = Box<dyn FnOnce(&Book) + Send>;

pub struct BookSession {
    book: Book,
    on_close: Option<CloseHook>,
}

impl BookSession {
    pub fn open(body: &[u8]) -> Result<Self, WorkbookError> {
        let book = Book::from_slice(body)?;
        log::debug!("opened book {:?}", book.name);
        Ok(BookSession {
            book,
            on_close: None,
        })
    }

    /// Registers a callback that runs once when the session is released.
    pub fn on_close(mut self, hook: impl FnOnce(&Book) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Serializes the book's pending actions; the session is released after.
    pub fn into_json(self) -> Value {
        self.book.to_json()
    }
}

impl Deref for BookSession {
    type Target = Book;

    fn deref(&self) -> &Book {
        &self.book
    }
}

impl DerefMut for BookSession {
    fn deref_mut(&mut self) -> &mut Book {
        &mut self.book
    }
}

impl Drop for BookSession {
    fn drop(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook(&self.book);
        }
        log::debug!(
            "closed book {:?} ({} pending actions)",
            self.book.name,
            self.book.actions().len()
        );
    }
}

#[async_trait]
impl FromRequest<Arc<AppState>> for BookSession {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        if let Some(secret) = state.config.secret_key.as_deref() {
            let presented = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            if presented != Some(secret) {
                return Err(AppError::Unauthorized);
            }
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Body(e.body_text()))?;
        Ok(BookSession::open(&body)?)
    }
}
