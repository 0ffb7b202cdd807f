//! Association loading.
//!
//! Requested paths are validated and merged into a forest up front, then
//! [`Preloader`] walks it issuing one batched query per edge. Targets are
//! loaded depth-first, so nested associations are populated before the
//! targets are copied onto their owners.

mod engine;

pub use engine::Preloader;

use crate::error::{KilnError, Result};
use crate::model::ModelDef;

/// How associations requested on a query are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EagerMode {
    /// Association queries are issued for each fetched record.
    #[default]
    Eager,
    /// One batched query per association edge, after the main fetch.
    Preload,
}

/// One association edge and the edges hanging off its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNode {
    pub field: &'static str,
    pub children: Vec<PathNode>,
}

/// Validates `paths` against `def` and merges shared prefixes.
///
/// Blank paths are ignored; if nothing remains, every association of `def`
/// is loaded one level deep. Empty segments and `*` are rejected, as are
/// names the model does not declare. Nothing is queried here.
pub fn plan<S: AsRef<str>>(def: &'static ModelDef, paths: &[S]) -> Result<Vec<PathNode>> {
    let mut forest: Vec<PathNode> = Vec::new();
    let mut any = false;

    for path in paths {
        let path = path.as_ref().trim();
        if path.is_empty() {
            continue;
        }
        any = true;

        let mut level = &mut forest;
        let mut owner = def;
        for segment in path.split('.') {
            let segment = segment.trim();
            if segment.is_empty() || segment == "*" {
                return Err(KilnError::MalformedPath {
                    path: path.to_owned(),
                });
            }
            let assoc = owner.association(segment)?;
            let index = match level.iter().position(|n| n.field == assoc.field) {
                Some(i) => i,
                None => {
                    level.push(PathNode {
                        field: assoc.field,
                        children: Vec::new(),
                    });
                    level.len() - 1
                }
            };
            level = &mut level[index].children;
            owner = assoc.target_def();
        }
    }

    if !any {
        forest = def
            .associations
            .iter()
            .map(|a| PathNode {
                field: a.field,
                children: Vec::new(),
            })
            .collect();
    }
    Ok(forest)
}

/// Number of distinct edges, which bounds the batched query count.
pub fn edge_count(forest: &[PathNode]) -> usize {
    forest.iter().map(|n| 1 + edge_count(&n.children)).sum()
}
