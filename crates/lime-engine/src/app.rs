//! Application lifecycle management.
//!
//! `App` picks the game to run, drives the script through its frame loop,
//! and owns the error screen that failures end up on.

use std::path::PathBuf;
use std::sync::Arc;

use lime_archive::Vfs;
use lime_script::{LuaHost, ScriptError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::screen::{ErrorScreen, Frontend};
use crate::startup;
use crate::timing::FrameTiming;

/// Failures that escape [`App::run`] after a game has started.
#[derive(Debug, Error)]
pub enum AppError {
    /// Game script failed to load or raised an error
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// What the application is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Screen {
    /// Not started yet
    #[default]
    Idle,
    /// A game is running
    Running {
        /// Entry script of the running game
        entry: String,
    },
    /// The game finished normally
    Finished,
    /// An error is on screen
    Error(ErrorScreen),
}

/// The engine application.
pub struct App<F: Frontend> {
    /// Engine configuration
    config: EngineConfig,
    /// Game content
    vfs: Arc<Vfs>,
    /// Lua runtime
    lua: LuaHost,
    /// Presentation surface
    frontend: F,
    /// Files given on the command line
    startup_files: Vec<PathBuf>,
    /// Current screen
    screen: Screen,
    /// Frame timing
    timing: FrameTiming,
}

impl<F: Frontend> App<F> {
    /// Create an application over already-mounted content.
    pub fn new(config: EngineConfig, vfs: Arc<Vfs>, lua: LuaHost, frontend: F) -> Self {
        let timing = FrameTiming::new(config.target_fps);
        Self {
            config,
            vfs,
            lua,
            frontend,
            startup_files: Vec::new(),
            screen: Screen::Idle,
            timing,
        }
    }

    /// Set the files the engine was launched with.
    pub fn set_startup_files(&mut self, files: Vec<PathBuf>) {
        self.startup_files = files;
    }

    /// Files the engine was launched with.
    #[must_use]
    pub fn startup_files(&self) -> &[PathBuf] {
        &self.startup_files
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Game content.
    #[must_use]
    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    /// Lua runtime.
    #[must_use]
    pub fn lua(&self) -> &LuaHost {
        &self.lua
    }

    /// Presentation surface.
    #[must_use]
    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    /// Current screen.
    #[must_use]
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Frames run by the frame loop.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.timing.frames()
    }

    /// Select a game and run it to completion.
    ///
    /// Startup selection failures are shown on the error screen and are not
    /// returned. Errors raised by the game itself are returned to the caller.
    pub fn run(&mut self) -> Result<(), AppError> {
        let selected = startup::classify(&self.startup_files, &self.config)
            .and_then(|target| startup::prepare(&target, &self.vfs, &self.config));

        let entry = match selected {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Startup failed: {e}");
                self.show_error(e.to_screen());
                return Ok(());
            },
        };

        self.screen = Screen::Running {
            entry: entry.clone(),
        };

        self.lua.set_args(&self.startup_files)?;
        self.lua.run_file(&entry)?;
        self.lua.call_load()?;

        if self.lua.has_hook("update")? {
            self.frame_loop()?;
        } else {
            info!("{entry} defines no lime.update, finishing after load");
        }

        self.screen = Screen::Finished;
        Ok(())
    }

    fn frame_loop(&mut self) -> Result<(), AppError> {
        self.timing.set_target_fps(self.config.target_fps);
        self.timing.reset();

        loop {
            if self.lua.quit_requested() {
                info!("Game requested quit");
                break;
            }
            if self.config.max_frames > 0 && self.timing.frames() >= self.config.max_frames {
                info!("Reached frame limit ({})", self.config.max_frames);
                break;
            }

            let dt = self.timing.delta_time();
            self.lua.call_update(dt)?;
            self.lua.call_draw()?;
            self.timing.sleep_remainder();
        }

        info!(
            "Frame loop ended after {} frames ({:.1} FPS avg, {:.2} ms/frame)",
            self.timing.frames(),
            self.timing.current_fps(),
            self.timing.average_frame_time_ms()
        );
        Ok(())
    }

    /// Show a fatal error for a failure that happened while running.
    pub fn fatal(&mut self, message: &str) {
        error!("Fatal: {message}");
        self.show_error(ErrorScreen::fatal(message));
    }

    fn show_error(&mut self, screen: ErrorScreen) {
        self.frontend.present_error(&screen);
        self.screen = Screen::Error(screen);
    }
}
