/*!
# xlbridge

An HTTP backend for spreadsheet automation: the spreadsheet client posts the
whole workbook as JSON, a handler reads or writes cell ranges, optionally
round-trips rows through a SQL database or a connector sync API, and the
response tells the client which cells to change.

## Architecture

### Request flow
1. The body is opened as a [`workbook::Book`] inside a [`session::BookSession`],
   which releases the book on every exit path.
2. The handler reads its parameters from the settings table
   ([`settings::book_settings`] / [`settings::sheet_settings`]).
3. Database work runs on a fresh connection from the
   [`db::ConnectionFactory`]; connector calls go through
   [`connector::ConnectorClient`].
4. Results are written back into the book, and the recorded actions are
   returned as `{"actions": [...]}`.

### Data operations
- **journals**: rows from a journal view into a sheet, headered, prior
  contents cleared
- **upsert**: mapping rows from a sheet into a keyed table, update-else-insert
  in one transaction
- **upload**: a sheet table replaces a database table

## Modules

- **cell**: dynamically typed cell values and their coercions
- **address**: A1 cell and range references
- **workbook**: the book model and the action log sent back to the client
- **session**: scoped book handle and request extractor
- **settings**: two-column key/value settings reader
- **config**: environment-driven configuration
- **db**: connection factory, record sets, SQLite backend
- **journals**, **upsert**, **upload**: database round-trips
- **connector**: connector sync API client
- **error**: error taxonomy and HTTP mapping
- **app**: routing and middleware

## REST API Endpoints

All routes take the workbook payload as a `POST` body.

- `/hello` - Toggles a greeting in the first sheet
- `/settings`, `/settings/sheet` - Return the book-level or sheet-level settings
- `/journals`, `/journals/sheet`, `/journals/offset` - Pull journal rows into the book
- `/mapping/upsert` - Push mapping rows to the database
- `/yellow` - Highlights the current selection
- `/upload_data` - Replaces the upload table with the first sheet's table
- `/connector/sync`, `/connector/status` - Trigger or inspect the connector sync
- `/clear` - Clears the data block of the active sheet
*/

pub mod address;
pub mod app;
pub mod cell;
pub mod config;
pub mod connector;
pub mod db;
pub mod error;
pub mod journals;
pub mod session;
pub mod settings;
pub mod upload;
pub mod upsert;
pub mod workbook;

pub use cell::CellValue;
pub use error::AppError;
pub use workbook::Book;
