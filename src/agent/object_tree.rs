//! OID router: registered managed objects and their view families.

use std::collections::HashMap;

use crate::error::RegistrationError;
use crate::handler::OidTable;
use crate::object::ManagedObject;
use crate::oid::Oid;

/// Change to the set of view families caused by one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyChange {
    /// The object joined an existing family.
    Unchanged,
    /// First object under this prefix.
    Added(Oid),
    /// Last object under this prefix went away.
    Removed(Oid),
}

/// Registered objects keyed by OID, scoped to one context prefix.
///
/// No two objects may own the same OID or nest inside each other. Objects
/// sharing a parent prefix share one view family, reference counted here so
/// the agent adds and removes each family's view subtree exactly once.
#[derive(Debug)]
pub struct ObjectTree {
    context: Oid,
    objects: OidTable<ManagedObject>,
    families: HashMap<Oid, usize>,
}

impl ObjectTree {
    pub fn new(context: Oid) -> Self {
        Self {
            context,
            objects: OidTable::new(),
            families: HashMap::new(),
        }
    }

    pub fn context(&self) -> &Oid {
        &self.context
    }

    pub fn register(&mut self, object: ManagedObject) -> Result<FamilyChange, RegistrationError> {
        let oid = object.oid().clone();
        if !oid.starts_with(&self.context) || oid == self.context {
            return Err(RegistrationError::OutsideContext {
                oid,
                context: self.context.clone(),
            });
        }
        if self.objects.get(&oid).is_some() {
            return Err(RegistrationError::AlreadyRegistered(oid));
        }
        if let Some(existing) = self.overlapping(&oid) {
            return Err(RegistrationError::Overlaps { oid, existing });
        }

        let family = family_of(&oid);
        self.objects.insert(oid, object);
        let members = self.families.entry(family.clone()).or_insert(0);
        *members += 1;
        Ok(if *members == 1 {
            FamilyChange::Added(family)
        } else {
            FamilyChange::Unchanged
        })
    }

    pub fn unregister(&mut self, oid: &Oid) -> Option<(ManagedObject, FamilyChange)> {
        let object = self.objects.remove(oid)?;
        let family = family_of(oid);
        let change = match self.families.get_mut(&family) {
            Some(members) if *members > 1 => {
                *members -= 1;
                FamilyChange::Unchanged
            }
            Some(_) => {
                self.families.remove(&family);
                FamilyChange::Removed(family)
            }
            None => FamilyChange::Unchanged,
        };
        Some((object, change))
    }

    /// Remove everything, returning the families that disappeared.
    pub fn clear(&mut self) -> Vec<Oid> {
        self.objects.clear();
        self.families.drain().map(|(family, _)| family).collect()
    }

    /// Object whose OID equals or contains `oid`.
    pub fn find(&self, oid: &Oid) -> Option<&ManagedObject> {
        self.objects.find_containing(oid).map(|(_, object)| object)
    }

    /// Objects that may hold the successor of `oid`, in OID order.
    pub fn candidates(&self, oid: &Oid) -> impl Iterator<Item = &ManagedObject> {
        self.objects.iter_from(oid).map(|(_, object)| object)
    }

    pub fn families(&self) -> impl Iterator<Item = &Oid> {
        self.families.keys()
    }

    pub fn objects(&self) -> impl Iterator<Item = &ManagedObject> {
        self.objects.iter().map(|(_, object)| object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn overlapping(&self, oid: &Oid) -> Option<Oid> {
        if let Some((root, _)) = self.objects.find_containing(oid) {
            return Some(root.clone());
        }
        self.objects
            .iter_from(oid)
            .map(|(existing, _)| existing)
            .find(|existing| *existing > oid)
            .filter(|existing| existing.starts_with(oid))
            .cloned()
    }
}

fn family_of(oid: &Oid) -> Oid {
    oid.parent().unwrap_or_else(|| oid.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeDescriptor, AttributeType, AttributeValue, MemoryAttribute};
    use crate::oid;

    fn object(oid: Oid) -> ManagedObject {
        let attr = MemoryAttribute::new(
            AttributeDescriptor::new(oid.to_string(), AttributeType::Int),
            AttributeValue::Int(1),
        );
        ManagedObject::new(oid, attr)
    }

    fn tree() -> ObjectTree {
        ObjectTree::new(oid!(1, 3, 6, 1, 4, 1, 99))
    }

    #[test]
    fn test_families_are_shared() {
        let mut tree = tree();
        assert_eq!(
            tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 1, 1))).unwrap(),
            FamilyChange::Added(oid!(1, 3, 6, 1, 4, 1, 99, 1))
        );
        assert_eq!(
            tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 1, 2))).unwrap(),
            FamilyChange::Unchanged
        );
        assert_eq!(tree.families().count(), 1);

        let (_, change) = tree.unregister(&oid!(1, 3, 6, 1, 4, 1, 99, 1, 1)).unwrap();
        assert_eq!(change, FamilyChange::Unchanged);
        let (_, change) = tree.unregister(&oid!(1, 3, 6, 1, 4, 1, 99, 1, 2)).unwrap();
        assert_eq!(change, FamilyChange::Removed(oid!(1, 3, 6, 1, 4, 1, 99, 1)));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_rejects_outside_context() {
        let mut tree = tree();
        let err = tree.register(object(oid!(1, 3, 6, 1, 4, 1, 98, 1))).unwrap_err();
        assert!(matches!(err, RegistrationError::OutsideContext { .. }));
        assert!(tree.find(&oid!(1, 3, 6, 1, 4, 1, 98, 1)).is_none());
    }

    #[test]
    fn test_rejects_duplicates_and_overlaps() {
        let mut tree = tree();
        tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 5))).unwrap();
        assert_eq!(
            tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 5))).unwrap_err(),
            RegistrationError::AlreadyRegistered(oid!(1, 3, 6, 1, 4, 1, 99, 5))
        );
        assert!(matches!(
            tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 5, 1))),
            Err(RegistrationError::Overlaps { .. })
        ));
        tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 6, 1))).unwrap();
        assert!(matches!(
            tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 6))),
            Err(RegistrationError::Overlaps { .. })
        ));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_find_and_candidates() {
        let mut tree = tree();
        tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 2))).unwrap();
        tree.register(object(oid!(1, 3, 6, 1, 4, 1, 99, 4))).unwrap();

        assert!(tree.find(&oid!(1, 3, 6, 1, 4, 1, 99, 2, 1, 1)).is_some());
        assert!(tree.find(&oid!(1, 3, 6, 1, 4, 1, 99, 3)).is_none());

        let next: Vec<_> = tree
            .candidates(&oid!(1, 3, 6, 1, 4, 1, 99, 3))
            .map(|o| o.oid().clone())
            .collect();
        assert_eq!(
            next,
            vec![oid!(1, 3, 6, 1, 4, 1, 99, 2), oid!(1, 3, 6, 1, 4, 1, 99, 4)]
        );
    }
}
