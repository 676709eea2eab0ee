//! Running update units frame by frame.

use crate::command_buffer::CommandBuffer;
use crate::error::{Error, Result};
use crate::registry::{EntityRegistry, RegistryConfig};
use crate::system::{BoxUnit, Context, Resources, UpdateUnit};

type ErrorHandler = Box<dyn FnMut(&Error)>;

/// A builder for `Simulation`s.
///
/// Units run in the order they are added.
pub struct SimulationBuilder<S: ?Sized> {
    config: RegistryConfig,
    resources: Resources,
    units: Vec<BoxUnit<S>>,
    on_error: Option<ErrorHandler>,
}

impl<S: ?Sized> SimulationBuilder<S> {
    /// Create a builder with no units and the default registry settings.
    pub fn new() -> SimulationBuilder<S> {
        SimulationBuilder {
            config: RegistryConfig::default(),
            resources: Resources::new(),
            units: Vec::new(),
            on_error: None,
        }
    }

    /// Set the configuration of the registry.
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a resource available to every unit.
    pub fn resource<R: 'static>(mut self, value: R) -> Self {
        self.resources.insert(value);
        self
    }

    /// Append a unit to the frame.
    pub fn unit(mut self, unit: impl UpdateUnit<S> + 'static) -> Self {
        self.units.push(Box::new(unit));
        self
    }

    /// Install a handler called with every unit failure.
    pub fn on_error(mut self, handler: impl FnMut(&Error) + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Create the simulation, with an empty registry.
    pub fn build(self) -> Simulation<S> {
        for unit in self.units.iter() {
            log::info!("registered update unit {}", unit.name());
        }

        Simulation {
            registry: EntityRegistry::with_config(self.config),
            commands: CommandBuffer::new(),
            resources: self.resources,
            units: self.units,
            on_error: self.on_error,
            frame: 0,
        }
    }
}

impl<S: ?Sized> Default for SimulationBuilder<S> {
    fn default() -> Self {
        SimulationBuilder::new()
    }
}

/// A registry together with the units which update it.
pub struct Simulation<S: ?Sized> {
    registry: EntityRegistry,
    commands: CommandBuffer,
    resources: Resources,
    units: Vec<BoxUnit<S>>,
    on_error: Option<ErrorHandler>,
    frame: u64,
}

impl<S: ?Sized> Simulation<S> {
    /// Start building a simulation.
    pub fn builder() -> SimulationBuilder<S> {
        SimulationBuilder::new()
    }

    /// Borrow the registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Mutably borrow the registry, between frames.
    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    /// Commands queued here are applied before the first unit of the next
    /// frame.
    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    /// The number of frames completed.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Iterate over the unit names in execution order.
    pub fn unit_names(&self) -> impl Iterator<Item=&str> + '_ {
        self.units.iter().map(|u| u.name())
    }

    /// Borrow a shared resource.
    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.resources.get()
    }

    /// Mutably borrow a shared resource.
    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.resources.get_mut()
    }

    /// Insert or replace a shared resource, returning the previous value.
    pub fn insert_resource<R: 'static>(&mut self, value: R) -> Option<R> {
        self.resources.insert(value)
    }

    /// Run every unit once, in order.
    ///
    /// Commands recorded by a unit are applied before the next unit runs. If a
    /// unit fails, the rest of the frame is skipped, the frame counter is left
    /// alone and the error is returned after being passed to the error handler.
    pub fn execute_all(&mut self, surface: &mut S, elapsed: f32) -> Result<()> {
        let result = self.run_frame(surface, elapsed);

        match result {
            Ok(()) => {
                self.frame += 1;
                Ok(())
            }
            Err(err) => {
                log::error!("frame {} aborted: {}", self.frame, err);
                if let Some(handler) = self.on_error.as_mut() {
                    handler(&err);
                }
                Err(err)
            }
        }
    }

    fn run_frame(&mut self, surface: &mut S, elapsed: f32) -> Result<()> {
        self.commands.apply(&mut self.registry)?;

        for unit in self.units.iter_mut() {
            let mut ctx = Context::new(
                &mut self.registry,
                &mut self.commands,
                &mut self.resources,
                self.frame,
                elapsed,
            );

            if let Err(err) = unit.execute(&mut ctx, surface, elapsed) {
                self.commands.clear();
                return Err(match err {
                    err @ Error::Unit { .. } => err,
                    other => Error::unit(unit.name(), other),
                });
            }

            self.commands.apply(&mut self.registry)?;
        }

        Ok(())
    }
}
