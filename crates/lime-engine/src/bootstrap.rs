//! Process bootstrap.
//!
//! Turns the raw command line into a ready [`App`]: locates the executable,
//! makes its directory the working directory, mounts the loose files beside
//! it and any archive fused onto it, loads configuration, then runs the game
//! inside a failure boundary.

use std::any::Any;
use std::env;
use std::ffi::OsString;
use std::fmt::Display;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use lime_archive::{FusedArchive, Vfs};
use lime_common::version::ENGINE_VERSION;
use lime_script::LuaHost;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::config::EngineConfig;
use crate::crash_report::CrashReporter;
use crate::screen::Frontend;

/// Command line split into the executable and the startup files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchArgs {
    /// `argv[0]`, if the platform supplied one
    pub exe_path: Option<PathBuf>,
    /// Remaining arguments (files dropped onto the executable)
    pub startup_files: Vec<PathBuf>,
}

impl LaunchArgs {
    /// Split an argument list whose first element is the program path.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter();
        let exe_path = args.next().filter(|a| !a.is_empty()).map(PathBuf::from);
        Self {
            exe_path,
            startup_files: args.map(PathBuf::from).collect(),
        }
    }
}

/// Absolute path of the running executable.
///
/// `raw` is usually `argv[0]`. When it does not name an existing file (for
/// example a bare command name found through `PATH`) the OS is asked instead.
pub fn resolve_exe_path(raw: &Path) -> io::Result<PathBuf> {
    let candidate = absolutize(raw)?;
    if candidate.is_file() {
        Ok(candidate)
    } else {
        debug!("{} is not a file, asking the OS for the executable", raw.display());
        env::current_exe()
    }
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

/// Build the application for `args` and run it.
///
/// Failures that happen after the game started, including panics, end on the
/// frontend's error screen and still return `Ok`. Only failures before the
/// application exists are returned as errors.
pub fn run_with_exe_and_args<F: Frontend>(
    args: LaunchArgs,
    frontend: F,
    crash_dir: Option<&Path>,
) -> Result<App<F>> {
    let mut app = prepare_app(args, frontend)?;

    if let Some(dir) = crash_dir.filter(|_| app.config().crash_reports) {
        let mut reporter = CrashReporter::new(dir, ENGINE_VERSION);
        reporter.set_startup_files(app.startup_files());
        reporter.install_panic_hook();
        debug!("Crash reports go to {}", dir.display());
    }

    run_guarded(&mut app);
    Ok(app)
}

/// Mount content and build the application without running it.
pub fn prepare_app<F: Frontend>(args: LaunchArgs, frontend: F) -> Result<App<F>> {
    let vfs = Arc::new(Vfs::new());
    let mut lua = LuaHost::new(Arc::clone(&vfs)).context("Failed to create Lua state")?;

    // Resolved before the working directory changes below.
    let startup_files = args
        .startup_files
        .iter()
        .map(|file| absolutize(file))
        .collect::<io::Result<Vec<_>>>()
        .context("Failed to resolve startup files")?;

    match &args.exe_path {
        Some(raw) => {
            let exe = resolve_exe_path(raw).context("Failed to locate the executable")?;
            let exe_dir = enter_exe_dir(&exe)?;
            lua.set_exe_dir(&exe_dir)?;
            mount_exe_content(&vfs, &exe, &exe_dir);
        },
        None => warn!("No executable path given, skipping bundled content"),
    }

    let config = EngineConfig::load(&vfs);
    let mut app = App::new(config, vfs, lua, frontend);
    app.set_startup_files(startup_files);
    Ok(app)
}

/// Make the executable's directory the working directory and return it.
pub fn enter_exe_dir(exe: &Path) -> Result<PathBuf> {
    let exe_dir = exe
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .context("Executable path has no parent directory")?;

    env::set_current_dir(&exe_dir)
        .with_context(|| format!("Failed to change directory to {}", exe_dir.display()))?;
    info!("Working directory: {}", exe_dir.display());
    Ok(exe_dir)
}

fn mount_exe_content(vfs: &Vfs, exe: &Path, exe_dir: &Path) {
    if let Err(e) = vfs.mount_dir(exe_dir) {
        warn!("Failed to mount {}: {e}", exe_dir.display());
    }

    match FusedArchive::open(exe) {
        Ok(Some(archive)) => {
            info!(
                "Found fused archive in {} ({} files)",
                exe.display(),
                archive.len()
            );
            vfs.mount_archive(archive);
        },
        Ok(None) => debug!("No fused archive in {}", exe.display()),
        Err(e) => warn!("Ignoring unreadable fused archive in {}: {e}", exe.display()),
    }
}

/// Run the application, sending any error or panic to [`App::fatal`].
pub fn run_guarded<F: Frontend>(app: &mut App<F>) {
    if let Err(message) = catch_failure(|| app.run()) {
        app.fatal(&message);
    }
}

/// Run `f`, turning both its error and any panic into a message.
pub fn catch_failure<T, E: Display>(f: impl FnOnce() -> Result<T, E>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

/// Text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::RecordingFrontend;
    use crate::app::Screen;
    use lime_archive::fuse_directory;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serializes tests that change the process working directory.
    static CWD_LOCK: Mutex<()> = Mutex::new(());

    struct CwdGuard(PathBuf);

    impl CwdGuard {
        fn save() -> Self {
            Self(env::current_dir().expect("current dir"))
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = env::set_current_dir(&self.0);
        }
    }

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_launch_args_split() {
        let args = LaunchArgs::from_args(os_args(&["/opt/lime2d", "game.zip", "extra"]));
        assert_eq!(args.exe_path, Some(PathBuf::from("/opt/lime2d")));
        assert_eq!(
            args.startup_files,
            vec![PathBuf::from("game.zip"), PathBuf::from("extra")]
        );
    }

    #[test]
    fn test_launch_args_without_program() {
        assert_eq!(LaunchArgs::from_args(Vec::new()), LaunchArgs::default());

        let args = LaunchArgs::from_args(os_args(&["", "main.lua"]));
        assert_eq!(args.exe_path, None);
        assert_eq!(args.startup_files, vec![PathBuf::from("main.lua")]);
    }

    #[test]
    fn test_resolve_existing_exe() {
        let dir = TempDir::new().expect("create temp dir");
        let exe = dir.path().join("lime2d");
        fs::write(&exe, b"binary").expect("write");
        assert_eq!(resolve_exe_path(&exe).expect("resolve"), exe);
    }

    #[test]
    fn test_resolve_bogus_exe_falls_back_to_os() {
        let resolved = resolve_exe_path(Path::new("/definitely/not/here/lime2d")).expect("resolve");
        assert_eq!(resolved, env::current_exe().expect("current exe"));
    }

    #[test]
    fn test_panic_message() {
        let text: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(text.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "Unknown panic");
    }

    #[test]
    fn test_catch_failure() {
        assert_eq!(catch_failure(|| Ok::<_, String>(7)), Ok(7));
        assert_eq!(
            catch_failure(|| Err::<(), _>("bad input")),
            Err("bad input".to_string())
        );
        assert_eq!(
            catch_failure(|| -> Result<(), String> { panic!("kaboom") }),
            Err("kaboom".to_string())
        );
    }

    /// Fuse `files` onto a fake engine binary and return its path.
    fn fused_exe(root: &Path, files: &[(&str, &str)]) -> PathBuf {
        let game = root.join("game");
        fs::create_dir_all(&game).expect("mkdir");
        for (name, body) in files {
            fs::write(game.join(name), body).expect("write");
        }
        let engine = root.join("engine.bin");
        fs::write(&engine, vec![0x7f; 2048]).expect("write engine");

        let dist = root.join("dist");
        fs::create_dir_all(&dist).expect("mkdir");
        let exe = dist.join("mygame");
        fuse_directory(&engine, &game, &exe).expect("fuse");
        exe
    }

    #[test]
    fn test_fused_game_runs() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _cwd = CwdGuard::save();
        let root = TempDir::new().expect("create temp dir");
        let exe = fused_exe(
            root.path(),
            &[
                ("lime.toml", "target_fps = 0\nmax_frames = 100\n"),
                (
                    "main.lua",
                    "local util = require('util')\nframes = 0\nfunction lime.update()\n  frames = frames + 1\n  if frames == util.stop then lime.quit() end\nend",
                ),
                ("util.lua", "return { stop = 4 }"),
            ],
        );

        let args = LaunchArgs::from_args(vec![exe.clone().into_os_string()]);
        let app = run_with_exe_and_args(args, RecordingFrontend::default(), None).expect("boot");

        assert_eq!(app.screen(), &Screen::Finished);
        assert_eq!(app.frames(), 4);
        assert_eq!(app.config().max_frames, 100);
        assert_eq!(
            env::current_dir().expect("cwd").canonicalize().expect("canonical"),
            exe.parent().expect("parent").canonicalize().expect("canonical")
        );
        assert!(app.lua().exe_dir().is_some());
    }

    #[test]
    fn test_game_error_ends_on_fatal_screen() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _cwd = CwdGuard::save();
        let root = TempDir::new().expect("create temp dir");
        let exe = fused_exe(
            root.path(),
            &[
                ("lime.toml", "target_fps = 0\n"),
                ("main.lua", "function lime.load() error('no assets') end"),
            ],
        );

        let args = LaunchArgs::from_args(vec![exe.into_os_string()]);
        let app = run_with_exe_and_args(args, RecordingFrontend::default(), None).expect("boot");

        let Screen::Error(screen) = app.screen() else {
            panic!("expected error screen, got {:?}", app.screen());
        };
        assert_eq!(screen.title, "Fatal Error");
        assert!(screen.message().contains("no assets"));
        assert_eq!(app.frontend().errors.len(), 1);
    }

    #[test]
    fn test_startup_file_overrides_fused_game() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _cwd = CwdGuard::save();
        let root = TempDir::new().expect("create temp dir");
        let exe = fused_exe(
            root.path(),
            &[
                ("lime.toml", "target_fps = 0\n"),
                ("main.lua", "which = 'fused'"),
            ],
        );
        let other = root.path().join("other");
        fs::create_dir_all(&other).expect("mkdir");
        fs::write(other.join("main.lua"), "which = 'dropped'").expect("write");

        let args = LaunchArgs::from_args(vec![exe.into_os_string(), other.into_os_string()]);
        let app = run_with_exe_and_args(args, RecordingFrontend::default(), None).expect("boot");

        assert_eq!(app.screen(), &Screen::Finished);
        assert_eq!(app.lua().global::<String>("which").expect("global"), "dropped");
    }

    #[test]
    fn test_corrupt_fused_archive_falls_back_to_loose_files() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _cwd = CwdGuard::save();
        let root = TempDir::new().expect("create temp dir");
        let exe = fused_exe(root.path(), &[("main.lua", "which = 'fused'")]);

        // Point the central directory past the start of the file.
        let mut bytes = fs::read(&exe).expect("read exe");
        let eocd = bytes.len() - 22;
        bytes[eocd + 16..eocd + 20].copy_from_slice(&0x7FFF_FFFE_u32.to_le_bytes());
        fs::write(&exe, bytes).expect("write exe");

        let dist = exe.parent().expect("parent").to_path_buf();
        fs::write(dist.join("main.lua"), "which = 'loose'").expect("write");
        fs::write(dist.join("lime.toml"), "target_fps = 0\n").expect("write");

        let args = LaunchArgs::from_args(vec![exe.into_os_string()]);
        let app = run_with_exe_and_args(args, RecordingFrontend::default(), None).expect("boot");

        assert_eq!(app.screen(), &Screen::Finished);
        assert_eq!(app.vfs().mounts().len(), 1);
        assert_eq!(app.lua().global::<String>("which").expect("global"), "loose");
    }

    #[test]
    fn test_missing_program_path_skips_exe_setup() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _cwd = CwdGuard::save();
        let before = env::current_dir().expect("cwd");
        let root = TempDir::new().expect("create temp dir");
        fs::write(root.path().join("main.lua"), "ran = true").expect("write");

        let args = LaunchArgs::from_args(vec![OsString::new(), root.path().as_os_str().to_owned()]);
        let mut app = prepare_app(args, RecordingFrontend::default()).expect("prepare");

        assert!(app.vfs().mounts().is_empty());
        assert!(app.lua().exe_dir().is_none());
        assert_eq!(env::current_dir().expect("cwd"), before);

        run_guarded(&mut app);
        assert_eq!(app.screen(), &Screen::Finished);
        assert!(app.lua().global::<bool>("ran").expect("global"));
    }

    #[test]
    fn test_unreachable_exe_dir_is_an_error() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _cwd = CwdGuard::save();
        let before = env::current_dir().expect("cwd");

        let err = enter_exe_dir(Path::new("/definitely/not/here/lime2d")).expect_err("must fail");
        assert!(err.to_string().contains("Failed to change directory"), "{err}");
        assert!(enter_exe_dir(Path::new("lime2d")).is_err());
        assert_eq!(env::current_dir().expect("cwd"), before);
    }

    #[test]
    fn test_plain_exe_without_game_shows_no_game() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _cwd = CwdGuard::save();
        let root = TempDir::new().expect("create temp dir");
        let exe = root.path().join("lime2d");
        fs::write(&exe, b"not fused").expect("write");
        fs::write(root.path().join("lime.toml"), "target_fps = 0\n").expect("write");

        let args = LaunchArgs::from_args(vec![exe.into_os_string()]);
        let app = run_with_exe_and_args(args, RecordingFrontend::default(), None).expect("boot");

        let Screen::Error(screen) = app.screen() else {
            panic!("expected error screen, got {:?}", app.screen());
        };
        assert_eq!(screen.title, "No Game");
    }
}
