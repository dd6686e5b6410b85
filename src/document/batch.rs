//! Grouping edits so the tree is synced once.

use std::ops::{Deref, DerefMut};

use tracing::error;

use crate::error::DocumentError;

use super::Document;

/// An open batch. Edits made through it are only written to the tree when the outermost batch
/// ends, by [`Batch::finish`] or by dropping it. Batches nest.
///
/// ```
/// # use kicad_schematic::{Document, DocumentError};
/// let mut doc = Document::new();
/// let mut batch = doc.begin_batch();
/// batch.junctions_mut().add((10.0, 10.0))?;
/// batch.wires_mut().add((10.0, 10.0), (20.0, 10.0))?;
/// assert!(batch.is_dirty());
/// batch.finish()?;
/// assert!(!doc.is_dirty());
/// # Ok::<(), DocumentError>(())
/// ```
pub struct Batch<'a> {
    doc: &'a mut Document,
    closed: bool,
}

impl Document {
    pub fn begin_batch(&mut self) -> Batch<'_> {
        self.batch_depth += 1;
        Batch {
            doc: self,
            closed: false,
        }
    }

    /// Run `edit` inside a batch. The batch is closed, and the tree synced, even when `edit`
    /// fails.
    pub fn batch<T, E>(&mut self, edit: impl FnOnce(&mut Document) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DocumentError>,
    {
        let mut batch = self.begin_batch();
        let value = edit(&mut batch)?;
        batch.finish()?;
        Ok(value)
    }
}

impl Batch<'_> {
    /// Close the batch, syncing when it is the outermost one.
    pub fn finish(mut self) -> Result<(), DocumentError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), DocumentError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.doc.batch_depth -= 1;
        if self.doc.batch_depth == 0 {
            self.doc.sync()
        } else {
            Ok(())
        }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(%err, "sync failed when closing batch");
        }
    }
}

impl Deref for Batch<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        self.doc
    }
}

impl DerefMut for Batch<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    #[test]
    fn nested_batches_sync_once_at_the_outermost() {
        let mut doc = Document::new();
        let mut outer = doc.begin_batch();
        outer.junctions_mut().add((10.0, 10.0)).unwrap();
        {
            let mut inner = outer.begin_batch();
            inner.junctions_mut().add((20.0, 10.0)).unwrap();
            inner.finish().unwrap();
        }
        assert!(outer.is_dirty());
        assert_eq!(outer.tree().root().children("junction").count(), 0);
        drop(outer);
        assert!(!doc.is_dirty());
        assert_eq!(doc.tree().root().children("junction").count(), 2);
    }

    #[test]
    fn failing_closure_still_closes_the_batch() {
        let mut doc = Document::new();
        let result: Result<(), DocumentError> = doc.batch(|doc| {
            doc.junctions_mut().add(Point::new(10.0, 10.0))?;
            Err(DocumentError::MissingField("text"))
        });
        assert!(result.is_err());
        assert_eq!(doc.batch_depth, 0);
        assert_eq!(doc.tree().root().children("junction").count(), 1);
    }

    #[test]
    fn edits_outside_a_batch_sync_immediately() {
        let mut doc = Document::new();
        doc.junctions_mut().add((10.0, 10.0)).unwrap();
        assert!(!doc.is_dirty());
        assert_eq!(doc.tree().root().children("junction").count(), 1);
    }
}
