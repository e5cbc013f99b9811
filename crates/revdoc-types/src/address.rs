use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::Id;

/// The level an [`Address`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressKind {
    /// The document root.
    Model,
    /// A container directly below the model.
    Object,
    /// A leaf inside an object, carrying an optional value.
    Field,
}

/// Hierarchical path of a document entity: `model[/object[/field]]`.
///
/// Addresses order model-first, so a container sorts before everything it
/// contains.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    model: Id,
    object: Option<Id>,
    field: Option<Id>,
}

impl Address {
    /// Address of a model (document root).
    pub fn model(model: Id) -> Self {
        Self {
            model,
            object: None,
            field: None,
        }
    }

    /// Address of an object inside a model.
    pub fn object(model: Id, object: Id) -> Self {
        Self {
            model,
            object: Some(object),
            field: None,
        }
    }

    /// Address of a field inside an object.
    pub fn field(model: Id, object: Id, field: Id) -> Self {
        Self {
            model,
            object: Some(object),
            field: Some(field),
        }
    }

    /// Parse `/model`, `/model/object` or `/model/object/field` (leading
    /// slash optional).
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        let parts: Vec<&str> = trimmed.split('/').collect();
        let invalid = || TypeError::InvalidAddress(s.to_string());
        match parts.as_slice() {
            [m] => Ok(Self::model(Id::new(*m).map_err(|_| invalid())?)),
            [m, o] => Ok(Self::object(
                Id::new(*m).map_err(|_| invalid())?,
                Id::new(*o).map_err(|_| invalid())?,
            )),
            [m, o, f] => Ok(Self::field(
                Id::new(*m).map_err(|_| invalid())?,
                Id::new(*o).map_err(|_| invalid())?,
                Id::new(*f).map_err(|_| invalid())?,
            )),
            _ => Err(invalid()),
        }
    }

    pub fn kind(&self) -> AddressKind {
        match (&self.object, &self.field) {
            (None, _) => AddressKind::Model,
            (Some(_), None) => AddressKind::Object,
            (Some(_), Some(_)) => AddressKind::Field,
        }
    }

    pub fn model_id(&self) -> &Id {
        &self.model
    }

    pub fn object_id(&self) -> Option<&Id> {
        self.object.as_ref()
    }

    pub fn field_id(&self) -> Option<&Id> {
        self.field.as_ref()
    }

    /// The id of the entity this address points at.
    pub fn id(&self) -> &Id {
        self.field
            .as_ref()
            .or(self.object.as_ref())
            .unwrap_or(&self.model)
    }

    /// Nesting depth: model = 0, object = 1, field = 2.
    pub fn depth(&self) -> usize {
        match self.kind() {
            AddressKind::Model => 0,
            AddressKind::Object => 1,
            AddressKind::Field => 2,
        }
    }

    /// The address of the enclosing container, `None` for a model.
    pub fn parent(&self) -> Option<Address> {
        match self.kind() {
            AddressKind::Model => None,
            AddressKind::Object => Some(Self::model(self.model.clone())),
            AddressKind::Field => Some(Self {
                model: self.model.clone(),
                object: self.object.clone(),
                field: None,
            }),
        }
    }

    /// The address of a direct child, `None` below field level.
    pub fn child(&self, id: Id) -> Option<Address> {
        match self.kind() {
            AddressKind::Model => Some(Self::object(self.model.clone(), id)),
            AddressKind::Object => Some(Self {
                model: self.model.clone(),
                object: self.object.clone(),
                field: Some(id),
            }),
            AddressKind::Field => None,
        }
    }

    /// The model address this address belongs to.
    pub fn model_address(&self) -> Address {
        Self::model(self.model.clone())
    }

    /// The object address this address belongs to, if any.
    pub fn object_address(&self) -> Option<Address> {
        self.object
            .as_ref()
            .map(|object| Self::object(self.model.clone(), object.clone()))
    }

    /// All addresses from the model down to (and including) this one.
    pub fn lineage(&self) -> Vec<Address> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(address) = current {
            current = address.parent();
            chain.push(address);
        }
        chain.reverse();
        chain
    }

    /// `true` if `other` lies strictly below this address.
    pub fn contains(&self, other: &Address) -> bool {
        other.depth() > self.depth() && self.equals_or_contains(other)
    }

    /// `true` if `other` is this address or lies below it.
    pub fn equals_or_contains(&self, other: &Address) -> bool {
        if self.model != other.model {
            return false;
        }
        match (&self.object, &other.object) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) if a != b => false,
            _ => match (&self.field, &other.field) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(a), Some(b)) => a == b,
            },
        }
    }

    /// `true` if this address is the direct parent of `other`.
    pub fn is_parent_of(&self, other: &Address) -> bool {
        other.parent().as_ref() == Some(self)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.model)?;
        if let Some(object) = &self.object {
            write!(f, "/{object}")?;
        }
        if let Some(field) = &self.field {
            write!(f, "/{field}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Id {
        Id::new(s).unwrap()
    }

    #[test]
    fn kinds_and_depths() {
        let m = Address::model(id("m"));
        let o = Address::object(id("m"), id("o"));
        let f = Address::field(id("m"), id("o"), id("f"));
        assert_eq!(m.kind(), AddressKind::Model);
        assert_eq!(o.kind(), AddressKind::Object);
        assert_eq!(f.kind(), AddressKind::Field);
        assert_eq!((m.depth(), o.depth(), f.depth()), (0, 1, 2));
        assert_eq!(f.id(), &id("f"));
        assert_eq!(o.id(), &id("o"));
    }

    #[test]
    fn containment() {
        let m = Address::model(id("m"));
        let o = Address::object(id("m"), id("o"));
        let other = Address::object(id("m"), id("p"));
        let f = Address::field(id("m"), id("o"), id("f"));

        assert!(m.contains(&o));
        assert!(m.contains(&f));
        assert!(o.contains(&f));
        assert!(!o.contains(&o));
        assert!(o.equals_or_contains(&o));
        assert!(!other.equals_or_contains(&f));
        assert!(!f.contains(&o));
        assert!(!Address::model(id("n")).equals_or_contains(&o));
    }

    #[test]
    fn parent_and_child_are_inverse() {
        let o = Address::object(id("m"), id("o"));
        let f = o.child(id("f")).unwrap();
        assert_eq!(f.parent().unwrap(), o);
        assert!(o.is_parent_of(&f));
        assert!(f.child(id("x")).is_none());
        assert!(Address::model(id("m")).parent().is_none());
    }

    #[test]
    fn lineage_runs_root_first() {
        let f = Address::field(id("m"), id("o"), id("f"));
        let lineage = f.lineage();
        assert_eq!(lineage.len(), 3);
        assert_eq!(lineage[0].kind(), AddressKind::Model);
        assert_eq!(lineage[2], f);
    }

    #[test]
    fn parse_and_display_roundtrip() {
        for raw in ["/m", "/m/o", "/m/o/f"] {
            let address = Address::parse(raw).unwrap();
            assert_eq!(address.to_string(), raw);
        }
        assert_eq!(Address::parse("m/o").unwrap().kind(), AddressKind::Object);
        assert!(Address::parse("/m/o/f/x").is_err());
        assert!(Address::parse("/m//f").is_err());
    }

    #[test]
    fn containers_sort_before_contents() {
        let o = Address::object(id("m"), id("o"));
        let f = Address::field(id("m"), id("o"), id("a"));
        assert!(Address::model(id("m")) < o);
        assert!(o < f);
    }

    proptest::proptest! {
        #[test]
        fn display_parses_back(
            m in "[a-z_][a-z0-9_.-]{0,12}",
            o in "[a-z_][a-z0-9_.-]{0,12}",
            f in "[a-z_][a-z0-9_.-]{0,12}",
        ) {
            let address = Address::field(id(&m), id(&o), id(&f));
            let parsed = Address::parse(&address.to_string()).unwrap();
            proptest::prop_assert_eq!(&parsed, &address);
            proptest::prop_assert!(parsed.parent().unwrap().contains(&address));
        }
    }
}
