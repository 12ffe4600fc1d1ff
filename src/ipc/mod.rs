mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};

use std::path::Path;

/// Opens (creating if needed) the workspace database and makes it current.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = crate::db::open_db(path)?;
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    Ok(())
}
