//! Loro-backed replica of the shared shape map.
//!
//! The document holds a single map:
//! ```text
//! LoroDoc
//! └── "shapeMap": LoroMap<ShapeId, String>   (JSON shape record)
//! ```
//! Each value is a whole serialized record, so concurrent writes to the same
//! shape resolve to one complete record and never interleave fields.

use crate::shapes::{Shape, ShapeId};
use crate::transport::{KeyChange, MapOp};
use loro::{ExportMode, LoroDoc, LoroMap, LoroValue, ValueOrContainer, VersionVector};
use std::collections::HashMap;
use thiserror::Error;

/// Key for the shape map in the document.
pub const SHAPE_MAP_KEY: &str = "shapeMap";

#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("Loro error: {0}")]
    Loro(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Shape {0} has non-finite geometry")]
    NonFinite(ShapeId),
}

pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// One copy of the shared map.
pub struct Replica {
    doc: LoroDoc,
    /// Version already handed out by `export_pending`.
    exported: VersionVector,
}

impl Replica {
    pub fn new() -> Self {
        let doc = LoroDoc::new();
        let exported = doc.oplog_vv();
        Self { doc, exported }
    }

    fn shape_map(&self) -> LoroMap {
        self.doc.get_map(SHAPE_MAP_KEY)
    }

    /// Raw JSON record stored under `id`.
    fn raw(&self, id: &ShapeId) -> Option<String> {
        match self.shape_map().get(&id.to_string()) {
            Some(ValueOrContainer::Value(LoroValue::String(s))) => Some(s.to_string()),
            _ => None,
        }
    }

    fn raw_entries(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        if let LoroValue::Map(map) = self.shape_map().get_value() {
            for (key, value) in map.iter() {
                if let LoroValue::String(s) = value {
                    out.insert(key.to_string(), s.to_string());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.raw_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &ShapeId) -> Option<Shape> {
        let raw = self.raw(id)?;
        parse_record(&id.to_string(), &raw)
    }

    /// Every record, skipping any that fail to parse.
    pub fn entries(&self) -> Vec<Shape> {
        self.raw_entries()
            .iter()
            .filter_map(|(key, raw)| parse_record(key, raw))
            .collect()
    }

    /// Apply a batch of writes as one commit. Writes that leave the value
    /// unchanged are skipped; the returned changes are the effective ones.
    pub fn apply(&mut self, ops: &[MapOp]) -> ReplicaResult<Vec<KeyChange>> {
        // Checked up front so a rejected batch leaves nothing half-written.
        for op in ops {
            if let MapOp::Set(shape) = op {
                if !shape.is_finite() {
                    return Err(ReplicaError::NonFinite(shape.id()));
                }
            }
        }
        let map = self.shape_map();
        let mut changes: Vec<KeyChange> = Vec::new();

        for op in ops {
            let id = op.id();
            let key = id.to_string();
            let before_raw = self.raw(&id);
            match op {
                MapOp::Set(shape) => {
                    let record = shape.to_record()?;
                    if before_raw.as_deref() == Some(record.as_str()) {
                        continue;
                    }
                    map.insert(&key, LoroValue::String(record.into()))
                        .map_err(|e| ReplicaError::Loro(e.to_string()))?;
                    record_change(&mut changes, id, before_raw.as_deref(), Some(shape.clone()));
                }
                MapOp::Delete(_) => {
                    if before_raw.is_none() {
                        continue;
                    }
                    map.delete(&key).map_err(|e| ReplicaError::Loro(e.to_string()))?;
                    record_change(&mut changes, id, before_raw.as_deref(), None);
                }
            }
        }

        changes.retain(|c| c.before != c.after);
        if !changes.is_empty() {
            self.doc.commit();
        }
        Ok(changes)
    }

    /// Encode everything committed since the last call.
    pub fn export_pending(&mut self) -> ReplicaResult<Vec<u8>> {
        let bytes = self
            .doc
            .export(ExportMode::updates(&self.exported))
            .map_err(|e| ReplicaError::Loro(e.to_string()))?;
        self.exported = self.doc.oplog_vv();
        Ok(bytes)
    }

    pub fn export_snapshot(&self) -> ReplicaResult<Vec<u8>> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| ReplicaError::Loro(e.to_string()))
    }

    /// Merge remote bytes (update or snapshot) and report which keys changed.
    ///
    /// Local commits are always exported right after they're made, so nothing
    /// pending is lost by moving the export mark past the imported ops.
    pub fn import(&mut self, bytes: &[u8]) -> ReplicaResult<Vec<KeyChange>> {
        let before = self.raw_entries();
        self.doc
            .import(bytes)
            .map_err(|e| ReplicaError::Loro(e.to_string()))?;
        self.exported = self.doc.oplog_vv();
        let after = self.raw_entries();
        Ok(diff_entries(&before, &after))
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_record(key: &str, raw: &str) -> Option<Shape> {
    match Shape::from_record(raw) {
        Ok(shape) => Some(shape),
        Err(e) => {
            log::warn!("Skipping unreadable shape record {key}: {e}");
            None
        }
    }
}

/// Fold a write into the batch, keeping the first `before` for a key
/// touched more than once.
fn record_change(changes: &mut Vec<KeyChange>, id: ShapeId, before_raw: Option<&str>, after: Option<Shape>) {
    if let Some(existing) = changes.iter_mut().find(|c| c.id == id) {
        existing.after = after;
        return;
    }
    let before = before_raw.and_then(|raw| parse_record(&id.to_string(), raw));
    changes.push(KeyChange { id, before, after });
}

fn diff_entries(before: &HashMap<String, String>, after: &HashMap<String, String>) -> Vec<KeyChange> {
    let mut changes = Vec::new();
    let keys = before.keys().chain(after.keys().filter(|k| !before.contains_key(*k)));
    for key in keys {
        let old = before.get(key);
        let new = after.get(key);
        if old == new {
            continue;
        }
        let Ok(id) = key.parse::<ShapeId>() else {
            log::warn!("Ignoring non-uuid key {key} in shape map");
            continue;
        };
        changes.push(KeyChange {
            id,
            before: old.and_then(|raw| parse_record(key, raw)),
            after: new.and_then(|raw| parse_record(key, raw)),
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Rectangle;
    use kurbo::Point;

    fn rect(x: f64) -> Shape {
        Shape::from(Rectangle::new(Point::new(x, 0.0), 10.0, 10.0))
    }

    #[test]
    fn test_apply_set_and_get() {
        let mut replica = Replica::new();
        let shape = rect(1.0);
        let changes = replica.apply(&[MapOp::Set(shape.clone())]).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].before.is_none());
        assert_eq!(replica.get(&shape.id()), Some(shape));
        assert_eq!(replica.len(), 1);
    }

    #[test]
    fn test_identical_set_is_elided() {
        let mut replica = Replica::new();
        let shape = rect(1.0);
        replica.apply(&[MapOp::Set(shape.clone())]).unwrap();
        let changes = replica.apply(&[MapOp::Set(shape)]).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_set_then_delete_in_one_batch_is_noop() {
        let mut replica = Replica::new();
        let shape = rect(1.0);
        let changes = replica
            .apply(&[MapOp::Set(shape.clone()), MapOp::Delete(shape.id())])
            .unwrap();
        assert!(changes.is_empty());
        assert!(replica.is_empty());
    }

    #[test]
    fn test_non_finite_batch_is_rejected_whole() {
        let mut replica = Replica::new();
        let good = rect(1.0);
        let bad = Shape::from(Rectangle::new(Point::new(f64::NAN, 0.0), 5.0, 5.0));
        let result = replica.apply(&[MapOp::Set(good.clone()), MapOp::Set(bad.clone())]);
        assert!(matches!(result, Err(ReplicaError::NonFinite(id)) if id == bad.id()));
        assert!(replica.is_empty());
        assert!(replica.get(&good.id()).is_none());
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut replica = Replica::new();
        let changes = replica.apply(&[MapOp::Delete(ShapeId::new_v4())]).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_import_reports_changes() {
        let mut a = Replica::new();
        let mut b = Replica::new();
        let shape = rect(5.0);
        a.apply(&[MapOp::Set(shape.clone())]).unwrap();
        let update = a.export_pending().unwrap();

        let changes = b.import(&update).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].after, Some(shape.clone()));
        assert_eq!(b.get(&shape.id()), Some(shape));

        // Re-importing the same bytes changes nothing.
        assert!(b.import(&update).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_writes_converge() {
        let mut a = Replica::new();
        let mut b = Replica::new();
        let base = rect(0.0);
        a.apply(&[MapOp::Set(base.clone())]).unwrap();
        b.import(&a.export_pending().unwrap()).unwrap();

        let mut from_a = base.clone();
        from_a.translate(kurbo::Vec2::new(100.0, 0.0));
        let mut from_b = base.clone();
        from_b.translate(kurbo::Vec2::new(0.0, 100.0));
        a.apply(&[MapOp::Set(from_a)]).unwrap();
        b.apply(&[MapOp::Set(from_b)]).unwrap();

        let ua = a.export_pending().unwrap();
        let ub = b.export_pending().unwrap();
        a.import(&ub).unwrap();
        b.import(&ua).unwrap();

        assert_eq!(a.get(&base.id()), b.get(&base.id()));
    }

    #[test]
    fn test_snapshot_restores_state() {
        let mut a = Replica::new();
        a.apply(&[MapOp::Set(rect(1.0)), MapOp::Set(rect(2.0))]).unwrap();
        let snapshot = a.export_snapshot().unwrap();

        let mut b = Replica::new();
        let changes = b.import(&snapshot).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(b.len(), 2);
    }
}
