//! Loading either resolves a complete configuration or fails loudly.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use ortho_config::{OrthoConfig, OrthoError};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use btvsc_config::{Config, DEFAULT_AUTOPAIR_SUBCODE, DEFAULT_LISTEN_BACKLOG};

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const SERVICE_VARIABLES: [&str; 4] = [
    "BTVSC_CONFIG_PATH",
    "BTVSC_SERVICE_SOCKET",
    "BTVSC_LISTEN_BACKLOG",
    "BTVSC_REPLY_TIMEOUT_MS",
];

/// Holds the environment lock with every service variable cleared, and puts
/// the previous values back when dropped.
struct CleanEnvironment {
    saved: Vec<(&'static str, Option<OsString>)>,
    dir: TempDir,
    _lock: MutexGuard<'static, ()>,
}

impl CleanEnvironment {
    fn set(&mut self, key: &'static str, value: impl AsRef<std::ffi::OsStr>) {
        if !self.saved.iter().any(|(saved, _)| *saved == key) {
            self.saved.push((key, std::env::var_os(key)));
        }
        // Serialised by the lock held for the guard's lifetime.
        unsafe { std::env::set_var(key, value) };
    }

    fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write configuration file");
        path
    }
}

impl Drop for CleanEnvironment {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..) {
            match value {
                Some(previous) => unsafe { std::env::set_var(key, previous) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}

#[fixture]
fn env() -> CleanEnvironment {
    let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let mut env = CleanEnvironment {
        saved: Vec::new(),
        dir: TempDir::new().expect("temp dir"),
        _lock: lock,
    };
    for key in SERVICE_VARIABLES {
        env.saved.push((key, std::env::var_os(key)));
        unsafe { std::env::remove_var(key) };
    }
    env
}

fn load(args: &[&str]) -> Result<Config, std::sync::Arc<OrthoError>> {
    let argv = std::iter::once("btvscd").chain(args.iter().copied());
    Config::load_from_iter(argv.map(OsString::from))
}

fn load_with_file(path: &Path) -> Result<Config, std::sync::Arc<OrthoError>> {
    let argv = [
        OsString::from("btvscd"),
        OsString::from("--config-path"),
        path.as_os_str().to_owned(),
    ];
    Config::load_from_iter(argv)
}

#[rstest]
fn loads_built_in_defaults_without_any_layer(env: CleanEnvironment) {
    let config = load(&[]).expect("defaults alone must resolve");
    assert_eq!(config, Config::default());
    assert_eq!(config.listen_backlog(), DEFAULT_LISTEN_BACKLOG);
    assert_eq!(config.autopair_subcode(), DEFAULT_AUTOPAIR_SUBCODE);
    drop(env);
}

#[rstest]
fn partial_file_keeps_defaults_for_other_fields(env: CleanEnvironment) {
    let path = env.write_file("partial.toml", "autopair_subcode = 0x31\n");
    let config = load_with_file(&path).expect("partial file loads");
    assert_eq!(config.autopair_subcode(), 0x31);
    assert_eq!(config.service_socket(), Config::default().service_socket());
    assert_eq!(config.reply_timeout(), Config::default().reply_timeout());
}

#[rstest]
fn broken_files_in_both_layers_are_reported_together(mut env: CleanEnvironment) {
    let from_cli = env.write_file("cli.toml", "listen_backlog = [\n");
    let from_env = env.write_file("env.toml", "reply_timeout_ms = soon\n");
    env.set("BTVSC_CONFIG_PATH", &from_env);

    let error = load_with_file(&from_cli).expect_err("both files are malformed");
    let OrthoError::Aggregate(aggregate) = error.as_ref() else {
        panic!("expected an aggregate error, got {error:?}");
    };
    let mut reported: Vec<PathBuf> = aggregate
        .iter()
        .filter_map(|inner| match inner {
            OrthoError::File { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect();
    reported.sort();
    let mut expected = vec![from_cli, from_env];
    expected.sort();
    assert_eq!(reported, expected);
}

#[rstest]
#[case::unknown_log_format(&["--log-format", "pretty"])]
#[case::tcp_socket(&["--service-socket", "tcp://127.0.0.1:9"])]
#[case::relative_socket(&["--service-socket", "run/btvsc.sock"])]
#[case::subcode_out_of_range(&["--autopair-subcode", "256"])]
fn invalid_flags_are_rejected(env: CleanEnvironment, #[case] args: &[&str]) {
    assert!(load(args).is_err(), "{args:?} should not load");
    drop(env);
}

#[rstest]
fn non_numeric_environment_values_are_rejected(mut env: CleanEnvironment) {
    env.set("BTVSC_LISTEN_BACKLOG", "many");
    assert!(load(&[]).is_err());
}
