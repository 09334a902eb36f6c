//! Deferred structural changes.
//!
//! Systems describe what should happen to the world as [`Command`]s collected
//! into a [`CommandBatch`]. After the whole pipeline tree has run, the driver
//! applies the batch in order through its [`CommandTarget`] implementation.
//! Components travel as MessagePack [`ComponentRecord`]s so a batch is plain
//! data and can be logged or serialised as-is.

use std::collections::TryReserveError;

use serde::{Deserialize, Serialize};

use engine_component::{Component, ComponentError, ComponentRecord, ComponentTypeId, Entity};

/// Errors raised while applying a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The target entity does not exist.
    #[error("{0} does not exist")]
    EntityNotFound(Entity),

    /// The entity already owns a component of this type.
    #[error("{entity} already has component {type_id}")]
    ComponentExists {
        entity: Entity,
        type_id: ComponentTypeId,
    },

    /// A spawn listed the same component type twice.
    #[error("spawn lists component {0} more than once")]
    DuplicateComponent(ComponentTypeId),

    /// The entity owns no component of this type.
    #[error("{entity} has no component {type_id}")]
    ComponentMissing {
        entity: Entity,
        type_id: ComponentTypeId,
    },

    /// A component record could not be decoded or stored.
    #[error(transparent)]
    Component(#[from] ComponentError),
}

/// The driver-side operations a command can perform.
pub trait CommandTarget {
    /// Create an entity carrying `components`.
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be decoded.
    fn spawn(&mut self, components: &[ComponentRecord]) -> Result<Entity, CommandError>;

    /// Destroy `entity` and all its components.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn despawn(&mut self, entity: Entity) -> Result<(), CommandError>;

    /// Attach a new component to `entity`.
    ///
    /// # Errors
    ///
    /// Fails if the entity is unknown, already owns the type, or the record
    /// cannot be decoded.
    fn insert_component(
        &mut self,
        entity: Entity,
        component: &ComponentRecord,
    ) -> Result<(), CommandError>;

    /// Detach a component from `entity`.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn remove_component(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<(), CommandError>;

    /// Overwrite an existing component of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if the entity does not own the type, or the record cannot be
    /// decoded.
    fn update_component(
        &mut self,
        entity: Entity,
        component: &ComponentRecord,
    ) -> Result<(), CommandError>;

    /// Ask the run loop to stop after the current tick.
    fn request_exit(&mut self);
}

/// One deferred change to the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Create a new entity with the given components.
    Spawn { components: Vec<ComponentRecord> },
    /// Destroy an entity.
    Despawn { entity: Entity },
    /// Attach a component to an entity.
    Insert {
        entity: Entity,
        component: ComponentRecord,
    },
    /// Detach a component from an entity.
    Remove {
        entity: Entity,
        type_id: ComponentTypeId,
    },
    /// Overwrite a component an entity already owns.
    Update {
        entity: Entity,
        component: ComponentRecord,
    },
    /// Stop the run loop.
    Exit,
}

impl Command {
    /// Start building a [`Command::Spawn`].
    #[must_use]
    pub fn spawn() -> SpawnBuilder {
        SpawnBuilder::default()
    }

    /// Destroy `entity`.
    #[must_use]
    pub fn despawn(entity: Entity) -> Self {
        Self::Despawn { entity }
    }

    /// Attach `component` to `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Encode`] if the component cannot be encoded.
    pub fn insert<T: Component>(entity: Entity, component: &T) -> Result<Self, ComponentError> {
        Ok(Self::Insert {
            entity,
            component: ComponentRecord::encode(component)?,
        })
    }

    /// Detach the `T` component from `entity`.
    #[must_use]
    pub fn remove<T: Component>(entity: Entity) -> Self {
        Self::Remove {
            entity,
            type_id: T::component_type_id(),
        }
    }

    /// Overwrite `entity`'s `T` component.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Encode`] if the component cannot be encoded.
    pub fn update<T: Component>(entity: Entity, component: &T) -> Result<Self, ComponentError> {
        Ok(Self::Update {
            entity,
            component: ComponentRecord::encode(component)?,
        })
    }

    /// Short name of the command kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Spawn { .. } => "spawn",
            Command::Despawn { .. } => "despawn",
            Command::Insert { .. } => "insert",
            Command::Remove { .. } => "remove",
            Command::Update { .. } => "update",
            Command::Exit => "exit",
        }
    }

    /// Perform this command against the driver.
    ///
    /// # Errors
    ///
    /// Propagates the error of the corresponding [`CommandTarget`] operation.
    pub fn apply(&self, target: &mut dyn CommandTarget) -> Result<(), CommandError> {
        match self {
            Command::Spawn { components } => target.spawn(components).map(drop),
            Command::Despawn { entity } => target.despawn(*entity),
            Command::Insert { entity, component } => target.insert_component(*entity, component),
            Command::Remove { entity, type_id } => target.remove_component(*entity, *type_id),
            Command::Update { entity, component } => target.update_component(*entity, component),
            Command::Exit => {
                target.request_exit();
                Ok(())
            }
        }
    }
}

/// Builder for [`Command::Spawn`].
#[derive(Debug, Default)]
#[must_use]
pub struct SpawnBuilder {
    components: Vec<ComponentRecord>,
}

impl SpawnBuilder {
    /// Add a component to the new entity.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Encode`] if the component cannot be encoded.
    pub fn with<T: Component>(mut self, component: &T) -> Result<Self, ComponentError> {
        self.components.push(ComponentRecord::encode(component)?);
        Ok(self)
    }

    /// Finish the command.
    pub fn build(self) -> Command {
        Command::Spawn {
            components: self.components,
        }
    }
}

/// An ordered list of commands produced by one or more systems.
///
/// Growth goes through `try_reserve`, so running out of memory surfaces as
/// an error instead of an abort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBatch {
    commands: Vec<Command>,
}

impl CommandBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Append one command.
    ///
    /// # Errors
    ///
    /// Returns the allocation error if the batch cannot grow.
    pub fn push(&mut self, command: Command) -> Result<(), TryReserveError> {
        self.commands.try_reserve(1)?;
        self.commands.push(command);
        Ok(())
    }

    /// Move every command of `other` to the end of this batch.
    ///
    /// # Errors
    ///
    /// Returns the allocation error if the batch cannot grow.
    pub fn append(&mut self, other: CommandBatch) -> Result<(), TryReserveError> {
        if self.commands.is_empty() {
            self.commands = other.commands;
            return Ok(());
        }
        self.commands.try_reserve(other.commands.len())?;
        self.commands.extend(other.commands);
        Ok(())
    }

    /// Returns the number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if the batch holds no command.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns an iterator over the commands in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }
}

impl From<Vec<Command>> for CommandBatch {
    fn from(commands: Vec<Command>) -> Self {
        Self { commands }
    }
}

impl IntoIterator for CommandBatch {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommandBatch {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Health(u32);

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    /// Records every call instead of touching a world.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        exit: bool,
    }

    impl CommandTarget for Recorder {
        fn spawn(&mut self, components: &[ComponentRecord]) -> Result<Entity, CommandError> {
            self.calls.push(format!("spawn:{}", components.len()));
            Ok(Entity::from_raw(1))
        }

        fn despawn(&mut self, entity: Entity) -> Result<(), CommandError> {
            self.calls.push(format!("despawn:{}", entity.id()));
            Ok(())
        }

        fn insert_component(
            &mut self,
            entity: Entity,
            component: &ComponentRecord,
        ) -> Result<(), CommandError> {
            let health: Health = component.decode()?;
            self.calls.push(format!("insert:{}:{}", entity.id(), health.0));
            Ok(())
        }

        fn remove_component(
            &mut self,
            entity: Entity,
            type_id: ComponentTypeId,
        ) -> Result<(), CommandError> {
            Err(CommandError::ComponentMissing { entity, type_id })
        }

        fn update_component(
            &mut self,
            entity: Entity,
            _component: &ComponentRecord,
        ) -> Result<(), CommandError> {
            Err(CommandError::EntityNotFound(entity))
        }

        fn request_exit(&mut self) {
            self.exit = true;
        }
    }

    #[test]
    fn test_apply_dispatches_to_target() {
        let mut target = Recorder::default();
        let e = Entity::from_raw(4);

        Command::spawn()
            .with(&Health(1))
            .unwrap()
            .build()
            .apply(&mut target)
            .unwrap();
        Command::insert(e, &Health(7))
            .unwrap()
            .apply(&mut target)
            .unwrap();
        Command::despawn(e).apply(&mut target).unwrap();
        Command::Exit.apply(&mut target).unwrap();

        assert_eq!(target.calls, vec!["spawn:1", "insert:4:7", "despawn:4"]);
        assert!(target.exit);
    }

    #[test]
    fn test_apply_propagates_target_errors() {
        let mut target = Recorder::default();
        let err = Command::remove::<Health>(Entity::from_raw(2))
            .apply(&mut target)
            .unwrap_err();
        assert!(matches!(err, CommandError::ComponentMissing { .. }));
    }

    #[test]
    fn test_batch_preserves_order() {
        let mut first = CommandBatch::new();
        first.push(Command::despawn(Entity::from_raw(1))).unwrap();
        let mut second = CommandBatch::new();
        second.push(Command::despawn(Entity::from_raw(2))).unwrap();
        second.push(Command::Exit).unwrap();

        first.append(second).unwrap();
        let kinds: Vec<_> = first.iter().map(Command::kind).collect();
        assert_eq!(kinds, vec!["despawn", "despawn", "exit"]);
        assert_eq!(
            first.into_iter().next(),
            Some(Command::despawn(Entity::from_raw(1)))
        );
    }

    #[test]
    fn test_batch_is_plain_data() {
        let batch = CommandBatch::from(vec![
            Command::insert(Entity::from_raw(3), &Health(9)).unwrap(),
            Command::Exit,
        ]);
        let bytes = rmp_serde::to_vec(&batch).unwrap();
        let decoded: CommandBatch = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, batch);
    }
}
