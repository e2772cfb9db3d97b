//! Runtime engine that orchestrates one run from reference to exit status.

use corral_common::config::CorralConfig;
use corral_common::error::Result;
use corral_common::interrupt::Interrupt;
use corral_common::types::{RunId, RunState};
use corral_image::registry::{HttpRegistry, Registry};
use corral_image::rootfs::RootfsBuilder;

use crate::container::EphemeralRoot;
use crate::process::{ExecutionRequest, Launch, prepare_root};
use crate::signal::{InterruptHandle, attach_child};
use crate::state::{StateTracker, Transition, TransitionObserver};

/// The runtime engine.
///
/// Each call to [`Engine::run_image`] or [`Engine::run_bare`] is one
/// self-contained run with its own ephemeral root, which is gone by the
/// time the call returns, including when the run is interrupted through
/// [`Engine::interrupt_handle`].
pub struct Engine<R = HttpRegistry> {
    config: CorralConfig,
    builder: RootfsBuilder<R>,
    interrupt: Interrupt,
    observers: Vec<TransitionObserver>,
}

impl Engine<HttpRegistry> {
    /// Creates an engine pulling from the registry named in `config`.
    ///
    /// The HTTP client is only built when an image is pulled.
    pub fn new(config: CorralConfig) -> Self {
        let interrupt = Interrupt::new();
        let registry = HttpRegistry::new(config.registry.clone()).with_interrupt(interrupt.clone());
        Self::assemble(config, registry, interrupt)
    }
}

impl<R: Registry> Engine<R> {
    /// Creates an engine that pulls images through `registry`.
    pub fn with_registry(config: CorralConfig, registry: R) -> Self {
        Self::assemble(config, registry, Interrupt::new())
    }

    fn assemble(config: CorralConfig, registry: R, interrupt: Interrupt) -> Self {
        let builder = RootfsBuilder::new(registry, config.scratch_dir.clone())
            .with_interrupt(interrupt.clone());
        Self {
            config,
            builder,
            interrupt,
            observers: Vec::new(),
        }
    }

    /// Returns a handle that interrupts this engine's runs.
    ///
    /// A run interrupted before its command starts fails with
    /// `CorralError::Interrupted`; once the command runs, the request is
    /// forwarded to it and the run returns the command's exit status.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(self.interrupt.clone())
    }

    /// Returns the registry images are pulled through.
    pub const fn registry(&self) -> &R {
        self.builder.registry()
    }

    /// Registers a callback for every run state transition.
    pub fn on_transition(&mut self, observer: impl Fn(&Transition<'_>) + 'static) -> &mut Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Builds `image` into a fresh root and runs `request` inside it.
    ///
    /// Returns the command's exit status; a non-zero status is not an error.
    ///
    /// # Errors
    ///
    /// Returns the first error of the build or the launch.
    pub fn run_image(&self, image: &str, request: &ExecutionRequest) -> Result<i32> {
        self.run(Some(image), request)
    }

    /// Runs `request` in an empty root holding only the staged executable.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Launch` if the command cannot be staged or
    /// launched.
    pub fn run_bare(&self, request: &ExecutionRequest) -> Result<i32> {
        self.run(None, request)
    }

    fn run(&self, image: Option<&str>, request: &ExecutionRequest) -> Result<i32> {
        let run_id = RunId::generate();
        let span = tracing::info_span!("run", run_id = %run_id);
        let _enter = span.enter();

        let mut root = EphemeralRoot::create(&self.config.scratch_dir, &run_id)?;
        let mut tracker = StateTracker::new(&run_id, root.path(), &self.observers);

        let outcome = self.drive(image, request, &mut root, &mut tracker);
        self.interrupt.detach_child();
        if outcome.is_err() {
            tracker.fail();
        }
        if let Err(e) = root.close() {
            tracing::warn!(error = %e, "ephemeral root was not fully removed");
        }

        match &outcome {
            Ok(code) => tracing::info!(code, state = %tracker.state(), "run finished"),
            Err(e) => tracing::info!(error = %e, state = %tracker.state(), "run failed"),
        }
        outcome
    }

    fn drive(
        &self,
        image: Option<&str>,
        request: &ExecutionRequest,
        root: &mut EphemeralRoot,
        tracker: &mut StateTracker<'_>,
    ) -> Result<i32> {
        if let Some(image) = image {
            let built = self.builder.build(image, root.path())?;
            root.mark_populated();
            tracing::info!(image = %built.reference, layers = built.layers.len(), "image ready");
            tracker.advance(RunState::RootBuilt)?;
        }

        prepare_root(request, root)?;
        self.interrupt.check()?;
        let launch = Launch::spawn(request, root.path())?;
        attach_child(&self.interrupt, launch.pid());
        tracker.advance(RunState::Jailed)?;

        let child = launch.await_exec()?;
        tracker.advance(RunState::Running)?;

        let code = child.wait()?;
        tracker.advance(RunState::Exited(code))?;
        Ok(code)
    }
}

impl<R> std::fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("interrupt", &self.interrupt)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
