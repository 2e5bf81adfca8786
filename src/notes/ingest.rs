use tracing::{info, warn};

use super::{Note, NoteReceipt, NotesService};
use crate::{NotesError, Result};

impl NotesService {
    /// Embed `text` and store it in the ingestion namespace.
    ///
    /// A single attempt: any embedding or write failure is returned as
    /// `NotesError::Ingestion`. Text is stored as given, empty included.
    #[inline]
    pub async fn add_note(&self, text: &str) -> Result<NoteReceipt> {
        let embedding = self
            .embedder
            .embed_one(text)
            .await
            .map_err(|e| NotesError::Ingestion(format!("failed to embed note: {e:#}")))?;

        let note = Note::new(text, &self.namespace, embedding);
        let receipt = note.receipt();

        let upserted = self
            .store
            .upsert(&self.namespace, vec![note.into_record()])
            .await
            .map_err(|e| {
                NotesError::Ingestion(format!(
                    "failed to write note to namespace '{}': {e:#}",
                    self.namespace
                ))
            })?;

        if upserted != 1 {
            warn!(
                "Store reported {} upserted vectors for note {}",
                upserted, receipt.id
            );
        }

        info!(
            "Added note {} to namespace '{}'",
            receipt.id, receipt.namespace
        );
        Ok(receipt)
    }
}
