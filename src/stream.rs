//! Streaming statement API: emit statements as documents are parsed.
//!
//! Unlike the eager [`crate::assemble::parse_folder`], which returns only
//! after the whole folder is merged, [`parse_folder_stream`] yields one
//! [`StatementEntry`] per document in file-name order. Nothing is merged:
//! two documents with the same period both come through, and the caller
//! decides what to keep. A scan-fatal error is yielded as the last item.

use crate::assemble::parse_document;
use crate::config::ReconConfig;
use crate::error::{DocumentError, ReconError};
use crate::output::StatementEntry;
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::{error, info, warn};

/// A boxed stream of per-document results.
pub type StatementStream =
    Pin<Box<dyn Stream<Item = Result<StatementEntry, DocumentError>> + Send>>;

/// List `folder` and parse its statements lazily, one at a time.
///
/// # Returns
/// - `Ok(StatementStream)` — a stream of `Result<StatementEntry, DocumentError>`
/// - `Err(ReconError)` — the folder could not be listed
///
/// # Example
/// ```rust,no_run
/// use statement_recon::{parse_folder_stream, ReconConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut statements = parse_folder_stream("statements/", &ReconConfig::default())?;
/// while let Some(item) = statements.next().await {
///     match item {
///         Ok(s) => println!("{}: {} metrics", s.period, s.metrics.len()),
///         Err(e) => eprintln!("skipped {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn parse_folder_stream(
    folder: impl AsRef<Path>,
    config: &ReconConfig,
) -> Result<StatementStream, ReconError> {
    let folder = folder.as_ref();
    let files = input::list_statement_files(folder, config)?;
    info!(
        "Streaming {} statements from {}",
        files.len(),
        folder.display()
    );

    // A scan-fatal error is yielded once, then the stream ends.
    let state = (files.into_iter(), config.clone(), false);
    let s = stream::unfold(state, |(mut files, cfg, halted)| async move {
        if halted {
            return None;
        }
        let path = files.next()?;
        match parse_document(&path, &cfg).await {
            Ok(entry) => Some((Ok(entry), (files, cfg, false))),
            Err(e) => {
                let fatal = e.is_fatal_for_scan();
                if fatal {
                    error!("Stopping stream at {}: {}", path.display(), e);
                } else {
                    warn!("Skipping {}: {}", path.display(), e);
                }
                let item = Err(DocumentError::from_recon(path, &e));
                Some((item, (files, cfg, fatal)))
            }
        }
    });

    Ok(Box::pin(s))
}
