//! Lua host.
//!
//! Owns the Lua state and the small `lime` table scripts talk to:
//!
//! | field              | meaning                                   |
//! |--------------------|-------------------------------------------|
//! | `lime.version`     | engine version string                     |
//! | `lime.exeDir`      | directory of the running executable       |
//! | `lime.log(msg)`    | write to the engine log                   |
//! | `lime.quit()`      | stop the frame loop after this frame      |
//! | `lime.fs.read(p)`  | read a file from game content             |
//! | `lime.fs.exists(p)`| test for a file or directory              |
//! | `lime.fs.list(p)`  | sorted directory listing                  |
//!
//! Games define `lime.load()`, `lime.update(dt)` and `lime.draw()`; the
//! engine calls whichever exist.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lime_archive::Vfs;
use lime_common::version::ENGINE_VERSION;
use mlua::{Function, Lua, Table, Value, Variadic};
use tracing::{debug, info};

use crate::error::ScriptResult;

/// Log target for messages emitted by scripts.
const SCRIPT_LOG_TARGET: &str = "lime_script::lua";

/// Embedded Lua runtime bound to the engine's virtual filesystem.
pub struct LuaHost {
    lua: Lua,
    vfs: Arc<Vfs>,
    exe_dir: Option<PathBuf>,
    quit: Arc<AtomicBool>,
}

impl LuaHost {
    /// Create a Lua state with the engine API installed.
    pub fn new(vfs: Arc<Vfs>) -> ScriptResult<Self> {
        let host = Self {
            lua: Lua::new(),
            vfs,
            exe_dir: None,
            quit: Arc::new(AtomicBool::new(false)),
        };

        host.install_api()?;
        host.install_print()?;
        host.install_searcher()?;

        debug!("Lua host ready ({})", ENGINE_VERSION);
        Ok(host)
    }

    fn install_api(&self) -> ScriptResult<()> {
        let lua = &self.lua;
        let lime = lua.create_table()?;
        lime.set("version", ENGINE_VERSION)?;

        lime.set(
            "log",
            lua.create_function(|_, message: String| {
                info!(target: SCRIPT_LOG_TARGET, "{message}");
                Ok(())
            })?,
        )?;

        let quit = Arc::clone(&self.quit);
        lime.set(
            "quit",
            lua.create_function(move |_, ()| {
                quit.store(true, Ordering::SeqCst);
                Ok(())
            })?,
        )?;

        let fs = lua.create_table()?;

        let vfs = Arc::clone(&self.vfs);
        fs.set(
            "read",
            lua.create_function(move |lua, path: String| {
                let bytes = vfs.read(&path).map_err(mlua::Error::external)?;
                lua.create_string(&bytes)
            })?,
        )?;

        let vfs = Arc::clone(&self.vfs);
        fs.set(
            "exists",
            lua.create_function(move |_, path: String| Ok(vfs.exists(&path)))?,
        )?;

        let vfs = Arc::clone(&self.vfs);
        fs.set(
            "list",
            lua.create_function(move |lua, path: String| {
                let names = vfs.list_dir(&path).map_err(mlua::Error::external)?;
                lua.create_sequence_from(names)
            })?,
        )?;

        lime.set("fs", fs)?;
        lua.globals().set("lime", lime)?;
        Ok(())
    }

    /// Route `print` into the engine log.
    fn install_print(&self) -> ScriptResult<()> {
        let print = self.lua.create_function(|lua, args: Variadic<Value>| {
            let tostring: Function<'_> = lua.globals().get("tostring")?;
            let mut parts = Vec::with_capacity(args.len());
            for value in args {
                parts.push(tostring.call::<_, String>(value)?);
            }
            info!(target: SCRIPT_LOG_TARGET, "{}", parts.join("\t"));
            Ok(())
        })?;
        self.lua.globals().set("print", print)?;
        Ok(())
    }

    /// Insert a `package.searchers` entry that resolves modules through the VFS.
    ///
    /// `require("a.b")` tries `a/b.lua` then `a/b/init.lua`. The searcher sits
    /// right after the preload searcher, ahead of the host filesystem ones.
    fn install_searcher(&self) -> ScriptResult<()> {
        let vfs = Arc::clone(&self.vfs);
        let searcher = self.lua.create_function(move |lua, module: String| {
            let base = module.replace('.', "/");
            let candidates = [format!("{base}.lua"), format!("{base}/init.lua")];

            for candidate in &candidates {
                if vfs.is_file(candidate) {
                    let source = vfs.read(candidate).map_err(mlua::Error::external)?;
                    let loader = lua
                        .load(source)
                        .set_name(format!("@{candidate}"))
                        .into_function()?;
                    return Ok((
                        Value::Function(loader),
                        Value::String(lua.create_string(candidate)?),
                    ));
                }
            }

            let message = candidates
                .iter()
                .map(|c| format!("no file '{c}' in game content"))
                .collect::<Vec<_>>()
                .join("\n\t");
            Ok((Value::String(lua.create_string(&message)?), Value::Nil))
        })?;

        let package: Table<'_> = self.lua.globals().get("package")?;
        let searchers: Table<'_> = package.get("searchers")?;
        let len = searchers.raw_len();
        for i in (2..=len).rev() {
            let existing: Value<'_> = searchers.raw_get(i)?;
            searchers.raw_set(i + 1, existing)?;
        }
        searchers.raw_set(2, searcher)?;
        Ok(())
    }

    /// Record the executable directory and expose it as `lime.exeDir`.
    pub fn set_exe_dir(&mut self, dir: impl AsRef<Path>) -> ScriptResult<()> {
        let dir = dir.as_ref().to_path_buf();
        let lime: Table<'_> = self.lua.globals().get("lime")?;
        lime.set("exeDir", dir.to_string_lossy().into_owned())?;
        debug!("Lua exe dir set to {}", dir.display());
        self.exe_dir = Some(dir);
        Ok(())
    }

    /// Executable directory, if known.
    #[must_use]
    pub fn exe_dir(&self) -> Option<&Path> {
        self.exe_dir.as_deref()
    }

    /// Expose startup files to scripts as the global `arg` sequence.
    pub fn set_args(&self, args: &[PathBuf]) -> ScriptResult<()> {
        let arg = self
            .lua
            .create_sequence_from(args.iter().map(|p| p.to_string_lossy().into_owned()))?;
        self.lua.globals().set("arg", arg)?;
        Ok(())
    }

    /// Load and execute a script from game content.
    pub fn run_file(&self, path: &str) -> ScriptResult<()> {
        let source = self.vfs.read(path)?;
        info!("Running {path}");
        self.lua
            .load(source)
            .set_name(format!("@{path}"))
            .exec()?;
        Ok(())
    }

    fn hook(&self, name: &str) -> ScriptResult<Option<Function<'_>>> {
        let lime: Table<'_> = self.lua.globals().get("lime")?;
        Ok(lime.get::<_, Option<Function<'_>>>(name)?)
    }

    /// Returns true if the script defined `lime.<name>` as a function.
    pub fn has_hook(&self, name: &str) -> ScriptResult<bool> {
        Ok(self.hook(name)?.is_some())
    }

    /// Call `lime.load()`. Returns whether it was defined.
    pub fn call_load(&self) -> ScriptResult<bool> {
        match self.hook("load")? {
            Some(load) => {
                load.call::<_, ()>(())?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Call `lime.update(dt)`. Returns whether it was defined.
    pub fn call_update(&self, dt: f64) -> ScriptResult<bool> {
        match self.hook("update")? {
            Some(update) => {
                update.call::<_, ()>(dt)?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Call `lime.draw()`. Returns whether it was defined.
    pub fn call_draw(&self) -> ScriptResult<bool> {
        match self.hook("draw")? {
            Some(draw) => {
                draw.call::<_, ()>(())?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Returns true once a script has called `lime.quit()`.
    #[must_use]
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Read a global as a Lua-convertible value.
    pub fn global<T: for<'lua> mlua::FromLua<'lua>>(&self, name: &str) -> ScriptResult<T> {
        Ok(self.lua.globals().get(name)?)
    }
}
