//! Opcode registry for one protocol state and direction.

use std::{
    any::{Any, TypeId},
    collections::{HashMap, hash_map::Entry},
    fmt,
};

use thiserror::Error;

use crate::packet::Packet;

/// Constructor for blank packets of one registered type.
pub type PacketFactory = Box<dyn Fn() -> Box<dyn Packet> + Send + Sync>;

/// Errors raised while registering packet types.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The opcode already belongs to another type.
    #[error("opcode {opcode:#04x} already registered to {existing}")]
    DuplicateOpcode {
        /// Opcode being registered.
        opcode: u32,
        /// Type that already owns it.
        existing: &'static str,
    },
    /// The type already has an opcode in this registry.
    #[error("{type_name} already registered as opcode {opcode:#04x}")]
    DuplicateType {
        /// Type being registered.
        type_name: &'static str,
        /// Opcode it already owns.
        opcode: u32,
    },
}

struct Binding {
    type_name: &'static str,
    factory: PacketFactory,
}

/// Bidirectional opcode ↔ packet type mapping.
#[derive(Default)]
pub struct Registry {
    by_opcode: HashMap<u32, Binding>,
    by_type: HashMap<TypeId, u32>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (opcode, binding) in &self.by_opcode {
            map.entry(opcode, &binding.type_name);
        }
        map.finish()
    }
}

impl Registry {
    pub(super) fn register<T, F>(&mut self, opcode: u32, factory: F) -> Result<(), RegistryError>
    where
        T: Packet,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        if let Some(existing) = self.by_opcode.get(&opcode) {
            return Err(RegistryError::DuplicateOpcode {
                opcode,
                existing: existing.type_name,
            });
        }
        match self.by_type.entry(TypeId::of::<T>()) {
            Entry::Occupied(e) => Err(RegistryError::DuplicateType {
                type_name,
                opcode: *e.get(),
            }),
            Entry::Vacant(e) => {
                e.insert(opcode);
                self.by_opcode.insert(
                    opcode,
                    Binding {
                        type_name,
                        factory: Box::new(move || Box::new(factory())),
                    },
                );
                Ok(())
            }
        }
    }

    /// Build a fresh, blank packet for `opcode`.
    ///
    /// `None` means the opcode is unknown in this registry.
    #[must_use]
    pub fn new_packet(&self, opcode: u32) -> Option<Box<dyn Packet>> {
        self.by_opcode.get(&opcode).map(|binding| (binding.factory)())
    }

    /// Opcode bound to the concrete type of `packet`.
    #[must_use]
    pub fn opcode_for(&self, packet: &dyn Packet) -> Option<u32> {
        self.by_type.get(&Any::type_id(packet as &dyn Any)).copied()
    }

    /// Opcode bound to `T`.
    #[must_use]
    pub fn opcode_of<T: Packet>(&self) -> Option<u32> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Number of registered packet types.
    #[must_use]
    pub fn len(&self) -> usize { self.by_opcode.len() }

    /// Whether no packet types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.by_opcode.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::{Hello, Ping};

    fn registry() -> Registry {
        let mut registry = Registry::default();
        registry
            .register(0x00, Hello::default)
            .expect("register hello");
        registry.register(0x01, Ping::default).expect("register ping");
        registry
    }

    #[test]
    fn maps_type_to_opcode() {
        let registry = registry();
        assert_eq!(registry.opcode_of::<Hello>(), Some(0x00));
        assert_eq!(registry.opcode_for(&Ping { value: 3 }), Some(0x01));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn new_packet_returns_distinct_instances() {
        let registry = registry();
        let first = registry.new_packet(0x00).expect("hello factory");
        let second = registry.new_packet(0x00).expect("hello factory");
        assert!(first.is::<Hello>());
        assert!(second.is::<Hello>());
        assert!(!std::ptr::addr_eq(&raw const *first, &raw const *second));
    }

    #[test]
    fn unknown_opcode_yields_none() {
        assert!(registry().new_packet(0x42).is_none());
    }

    #[test]
    fn rejects_duplicate_opcode() {
        let mut registry = registry();
        let err = registry
            .register(0x00, Ping::default)
            .expect_err("opcode 0 is taken");
        assert!(matches!(err, RegistryError::DuplicateOpcode { opcode: 0, .. }));
    }

    #[test]
    fn rejects_duplicate_type() {
        let mut registry = registry();
        let err = registry
            .register(0x09, Hello::default)
            .expect_err("hello is registered");
        assert!(matches!(err, RegistryError::DuplicateType { opcode: 0, .. }));
    }
}
