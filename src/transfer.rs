use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::components::Id;
use crate::table::TableId;

/// Cached table transitions for single id additions and removals
#[derive(Debug, Clone, Default)]
pub struct TransferGraph {
    links: Arc<RwLock<HashMap<Id, TransferEdge>>>,
}

impl TransferGraph {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, id: &Id) -> Option<TransferEdge> {
        match self.links.read() {
            Ok(graph) => graph.get(id).copied(),
            Err(e) => {
                panic!("unable to read transfer graph - rwlock - {:?}", e)
            }
        }
    }

    pub fn set(&self, id: &Id, edge: TransferEdge) -> Option<TransferEdge> {
        match self.links.write() {
            Ok(mut graph) => graph.insert(*id, edge),
            Err(e) => {
                panic!("unable to set transfer graph - rwlock - {:?}", e)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.links.read() {
            Ok(graph) => graph.len(),
            Err(e) => {
                panic!("unable to read transfer graph - rwlock - {:?}", e)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEdge {
    Add(TableId),
    Remove(TableId),
}
