//! Type Descriptor Registry.
//!
//! Flattens a record's member table into dotted member paths
//! (`ContactInfo.City.Name`), once per type.

use crate::record::{MemberInfo, RecordInfo};
use crate::types::FieldKind;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Nesting depth at which descent stops.
pub const MAX_NESTING_DEPTH: usize = 8;

/// One flattened member of a record.
#[derive(Debug, Clone)]
pub struct MemberPath {
    /// Dotted name, e.g. `ContactInfo1.City.Name`.
    pub name: String,
    /// Member indexes from the root record down to this member.
    pub path: Vec<usize>,
    pub kind: FieldKind,
    pub member: &'static MemberInfo,
}

impl MemberPath {
    /// Index of the member inside its direct parent.
    pub fn leaf(&self) -> usize {
        self.path[self.path.len() - 1]
    }

    /// Indexes of the nested parents, outermost first.
    pub fn parents(&self) -> &[usize] {
        &self.path[..self.path.len() - 1]
    }
}

/// Flattened description of a record type.
#[derive(Debug)]
pub struct TypeDescriptor {
    info: &'static RecordInfo,
    members: Vec<MemberPath>,
}

impl TypeDescriptor {
    pub fn info(&self) -> &'static RecordInfo {
        self.info
    }

    /// All leaf members, depth-first in declaration order.
    pub fn members(&self) -> &[MemberPath] {
        &self.members
    }

    /// Direct members that map to a single column.
    pub fn scalar_members(&self) -> impl Iterator<Item = (usize, &'static MemberInfo)> {
        self.info
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind.is_column())
    }
}

/// Cache of [`TypeDescriptor`]s keyed by type.
#[derive(Debug)]
pub struct TypeRegistry {
    descriptors: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
    max_depth: usize,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_NESTING_DEPTH)
    }

    /// Registry that stops descending into nested records at `max_depth`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            max_depth: max_depth.max(1),
        }
    }

    /// Describe a record type, building the descriptor on first use.
    pub fn describe(&self, info: &'static RecordInfo) -> Arc<TypeDescriptor> {
        let type_id = (info.type_id)();
        if let Some(found) = self
            .descriptors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&type_id)
        {
            return Arc::clone(found);
        }

        let mut members = Vec::new();
        let mut ancestors = vec![type_id];
        self.flatten(info, "", &mut Vec::new(), &mut ancestors, &mut members);
        tracing::debug!(ty = info.name, members = members.len(), "Described record type");
        let descriptor = Arc::new(TypeDescriptor { info, members });

        let mut map = self
            .descriptors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(map.entry(type_id).or_insert(descriptor))
    }

    /// Number of described types.
    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flatten(
        &self,
        info: &'static RecordInfo,
        prefix: &str,
        path: &mut Vec<usize>,
        ancestors: &mut Vec<TypeId>,
        out: &mut Vec<MemberPath>,
    ) {
        for (index, member) in info.members.iter().enumerate() {
            path.push(index);
            let name = format!("{prefix}{}", member.name);
            match (member.kind, member.nested) {
                (FieldKind::Nested, Some(nested)) => {
                    let child = nested();
                    let child_id = (child.type_id)();
                    if ancestors.contains(&child_id) || ancestors.len() >= self.max_depth {
                        tracing::warn!(
                            ty = info.name,
                            member = %name,
                            "Nested member is cyclic or too deep; treating it as a leaf"
                        );
                        out.push(MemberPath {
                            name,
                            path: path.clone(),
                            kind: member.kind,
                            member,
                        });
                    } else {
                        ancestors.push(child_id);
                        self.flatten(child, &format!("{name}."), path, ancestors, out);
                        ancestors.pop();
                    }
                }
                _ => out.push(MemberPath {
                    name,
                    path: path.clone(),
                    kind: member.kind,
                    member,
                }),
            }
            path.pop();
        }
    }
}
