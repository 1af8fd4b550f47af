use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use crate::errors::Result;
use crate::s57::feature_defns;
use crate::s57::S57Reader;
use crate::vector::{Defn, Feature, Layer, LayerCaps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum S57LayerKind {
    Dsid,
    Features,
    Primitives(i32),
}

/// A layer of an S-57 cell.
///
/// All layers of a cell share one reader. Each keeps its own cursor, which
/// is handed to the reader for the duration of a read.
#[derive(Debug)]
pub struct S57Layer {
    reader: Rc<RefCell<S57Reader>>,
    defn: Arc<Defn>,
    kind: S57LayerKind,
    cursor: usize,
    pending: VecDeque<Feature>,
}

impl S57Layer {
    /// The dataset identification layer.
    pub fn dsid(reader: Rc<RefCell<S57Reader>>) -> Self {
        Self::with_kind(reader, Arc::new(feature_defns::dsid_defn()), S57LayerKind::Dsid)
    }

    /// A layer of feature records, registered with the reader.
    pub fn features(reader: Rc<RefCell<S57Reader>>, defn: Arc<Defn>) -> Self {
        if !reader
            .borrow()
            .feature_defns()
            .iter()
            .any(|d| Arc::ptr_eq(d, &defn))
        {
            reader.borrow_mut().add_feature_defn(defn.clone());
        }
        Self::with_kind(reader, defn, S57LayerKind::Features)
    }

    /// A layer of spatial primitives of record type `rcnm`.
    pub fn primitives(reader: Rc<RefCell<S57Reader>>, rcnm: i32) -> Self {
        let defn = Arc::new(feature_defns::primitive_defn(rcnm));
        Self::with_kind(reader, defn, S57LayerKind::Primitives(rcnm))
    }

    fn with_kind(reader: Rc<RefCell<S57Reader>>, defn: Arc<Defn>, kind: S57LayerKind) -> Self {
        S57Layer {
            reader,
            defn,
            kind,
            cursor: 0,
            pending: VecDeque::new(),
        }
    }
}

impl Layer for S57Layer {
    fn name(&self) -> &str {
        self.defn.name()
    }

    fn defn(&self) -> &Arc<Defn> {
        &self.defn
    }

    fn reset_reading(&mut self) {
        self.cursor = 0;
        self.pending.clear();
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        if let Some(f) = self.pending.pop_front() {
            return Ok(Some(f));
        }
        let mut reader = self.reader.borrow_mut();
        match self.kind {
            S57LayerKind::Dsid => {
                if self.cursor > 0 {
                    return Ok(None);
                }
                self.cursor = 1;
                reader.read_dsid_feature(&self.defn)
            }
            S57LayerKind::Features => {
                reader.set_next_fe_index(self.cursor);
                let parts = reader.read_next_features(Some(&self.defn));
                self.cursor = reader.next_fe_index();
                let mut parts = parts?.into_iter();
                let first = parts.next();
                self.pending.extend(parts);
                Ok(first)
            }
            S57LayerKind::Primitives(rcnm) => {
                let feature = reader.read_vector(rcnm, self.cursor, &self.defn)?;
                if feature.is_some() {
                    self.cursor += 1;
                }
                Ok(feature)
            }
        }
    }

    fn has_capability(&self, capability: LayerCaps) -> bool {
        if capability.is_empty() {
            return false;
        }
        match self.kind {
            S57LayerKind::Features => LayerCaps::RANDOM_READ.contains(capability),
            S57LayerKind::Primitives(_) => LayerCaps::FAST_FEATURE_COUNT.contains(capability),
            S57LayerKind::Dsid => false,
        }
    }

    fn feature(&mut self, fid: i64) -> Result<Option<Feature>> {
        match self.kind {
            S57LayerKind::Features => self.reader.borrow_mut().read_feature(fid, &self.defn),
            _ => {
                self.reset_reading();
                let mut found = None;
                while let Some(f) = self.next_feature()? {
                    if f.fid() == Some(fid) {
                        found = Some(f);
                        break;
                    }
                }
                self.reset_reading();
                Ok(found)
            }
        }
    }

    fn feature_count(&mut self, force: bool) -> Result<Option<u64>> {
        if let S57LayerKind::Primitives(rcnm) = self.kind {
            return Ok(Some(self.reader.borrow().primitive_count(rcnm) as u64));
        }
        if !force {
            return Ok(None);
        }
        self.reset_reading();
        let mut count = 0;
        while self.next_feature()?.is_some() {
            count += 1;
        }
        self.reset_reading();
        Ok(Some(count))
    }
}
