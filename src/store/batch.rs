//! Staged multi-document writes
//!
//! A `WriteBatch` is built in memory (staging never touches the store) and
//! handed to [`DocumentStore::commit`](super::DocumentStore::commit), which
//! applies every write or none of them.

use super::{Collection, Fields};
use serde_json::{Map, Value};

/// A single write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchWrite {
    /// Partial merge into an existing document; the whole batch fails if
    /// the document is absent at commit time
    Update {
        collection: Collection,
        id: String,
        fields: Fields,
    },
    /// Remove a document; absent documents are skipped
    Delete { collection: Collection, id: String },
}

impl BatchWrite {
    pub fn collection(&self) -> &Collection {
        match self {
            Self::Update { collection, .. } => collection,
            Self::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Update { id, .. } => id,
            Self::Delete { id, .. } => id,
        }
    }

    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// Wire form used by the REST batch endpoint
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("op".to_string(), Value::String(self.operation_type().to_string()));
        map.insert("collection".to_string(), Value::String(self.collection().path()));
        map.insert("id".to_string(), Value::String(self.id().to_string()));
        if let Self::Update { fields, .. } = self {
            map.insert("fields".to_string(), Value::Object(fields.clone()));
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<BatchWrite>,
    /// Write counts at which a unit closes; chunking keeps units together
    unit_ends: Vec<usize>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_writes(writes: Vec<BatchWrite>) -> Self {
        Self {
            writes,
            unit_ends: Vec::new(),
        }
    }

    /// Stage a partial update
    pub fn update(&mut self, collection: Collection, id: impl Into<String>, fields: Fields) -> &mut Self {
        self.writes.push(BatchWrite::Update {
            collection,
            id: id.into(),
            fields,
        });
        self
    }

    /// Stage a delete
    pub fn delete(&mut self, collection: Collection, id: impl Into<String>) -> &mut Self {
        self.writes.push(BatchWrite::Delete {
            collection,
            id: id.into(),
        });
        self
    }

    /// Close the writes staged since the previous unit into one unit that
    /// `into_chunks` will not split unless it alone exceeds the limit
    pub fn end_unit(&mut self) -> &mut Self {
        let end = self.writes.len();
        if self.unit_ends.last().is_none_or(|last| *last < end) {
            self.unit_ends.push(end);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[BatchWrite] {
        &self.writes
    }

    /// Split into batches of at most `max` writes, preserving order. Whole
    /// units are packed together; a unit larger than `max` is cut into
    /// `max`-sized pieces.
    pub fn into_chunks(self, max: usize) -> Vec<WriteBatch> {
        let max = max.max(1);
        if self.writes.len() <= max {
            return vec![Self::from_writes(self.writes)];
        }

        let mut bounds = self.unit_ends.clone();
        if bounds.last() != Some(&self.writes.len()) {
            bounds.push(self.writes.len());
        }

        let mut chunks = Vec::new();
        let mut current: Vec<BatchWrite> = Vec::new();
        let mut start = 0;
        for end in bounds {
            let unit = &self.writes[start..end];
            start = end;
            if current.len() + unit.len() > max && !current.is_empty() {
                chunks.push(Self::from_writes(std::mem::take(&mut current)));
            }
            if unit.len() > max {
                chunks.extend(unit.chunks(max).map(|piece| Self::from_writes(piece.to_vec())));
            } else {
                current.extend_from_slice(unit);
            }
        }
        if !current.is_empty() {
            chunks.push(Self::from_writes(current));
        }
        chunks
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.writes.iter().map(BatchWrite::to_json).collect())
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchWrite;
    type IntoIter = std::vec::IntoIter<BatchWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

impl<'a> IntoIterator for &'a WriteBatch {
    type Item = &'a BatchWrite;
    type IntoIter = std::slice::Iter<'a, BatchWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_staging_preserves_order() {
        let mut batch = WriteBatch::new();
        batch
            .delete(Collection::responses("s1"), "r1")
            .delete(Collection::Surveys, "s1")
            .update(
                Collection::Surveys,
                "s2",
                json!({"rewardProgramId": null}).as_object().unwrap().clone(),
            );

        assert_eq!(batch.len(), 3);
        let kinds: Vec<&str> = batch.writes().iter().map(|w| w.operation_type()).collect();
        assert_eq!(kinds, vec!["delete", "delete", "update"]);
        assert_eq!(batch.writes()[0].collection().path(), "surveys/s1/responses");
    }

    #[test]
    fn test_into_chunks() {
        let mut batch = WriteBatch::new();
        for i in 0..7 {
            batch.delete(Collection::Surveys, format!("s{}", i));
        }

        let chunks = batch.clone().into_chunks(3);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert_eq!(chunks[2].writes()[0].id(), "s6");

        assert_eq!(batch.into_chunks(500).len(), 1);
    }

    #[test]
    fn test_chunks_keep_units_together() {
        let mut batch = WriteBatch::new();
        for survey in ["s1", "s2"] {
            let responses = Collection::responses(survey);
            batch.delete(responses.clone(), "r1").delete(responses, "r2");
            batch.delete(Collection::Surveys, survey).end_unit();
        }
        batch.delete(Collection::Campaigns, "k1");

        let chunks = batch.into_chunks(4);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 4]);
        assert_eq!(chunks[0].writes()[2].id(), "s1");
        assert_eq!(chunks[1].writes()[0].collection().path(), "surveys/s2/responses");
    }

    #[test]
    fn test_oversized_unit_is_split() {
        let mut batch = WriteBatch::new();
        batch.delete(Collection::Clients, "c0").end_unit();
        for i in 0..5 {
            batch.delete(Collection::responses("s1"), format!("r{}", i));
        }
        batch.delete(Collection::Surveys, "s1").end_unit();

        let sizes: Vec<usize> = batch.into_chunks(2).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1, 2, 2, 2]);
    }

    #[test]
    fn test_wire_form() {
        let mut batch = WriteBatch::new();
        batch.delete(Collection::Campaigns, "k1");
        assert_eq!(
            batch.to_json(),
            json!([{"op": "delete", "collection": "campaigns", "id": "k1"}])
        );
    }
}
