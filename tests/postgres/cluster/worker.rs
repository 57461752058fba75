//! Locating and staging the `pg_worker` binary for root test runs.

use super::BoxError;
use super::fs::open_parent_dir;
use camino::{Utf8Path, Utf8PathBuf};
#[cfg(unix)]
use cap_std::fs::{Permissions, PermissionsExt};
use std::sync::{Mutex, OnceLock};

const WORKER_NAME: &str = "pg_worker";

static PREPARED_WORKER: OnceLock<Mutex<Option<Utf8PathBuf>>> = OnceLock::new();

/// Finds the worker built alongside the tests, then falls back to the
/// environment and `PATH`.
pub(super) fn locate_pg_worker_path() -> Option<Utf8PathBuf> {
    option_env!("CARGO_BIN_EXE_pg_worker")
        .map(Utf8PathBuf::from)
        .filter(|path| path.is_file())
        .or_else(locate_from_env)
        .or_else(locate_near_target)
        .or_else(locate_in_path)
}

fn locate_from_env() -> Option<Utf8PathBuf> {
    let worker = Utf8PathBuf::try_from(std::path::PathBuf::from(std::env::var_os(
        "PG_EMBEDDED_WORKER",
    )?))
    .ok()?;
    (worker.file_name() == Some(WORKER_NAME) && worker.is_file()).then_some(worker)
}

fn locate_near_target() -> Option<Utf8PathBuf> {
    let exe = Utf8PathBuf::try_from(std::env::current_exe().ok()?).ok()?;
    let candidate = exe.parent()?.parent()?.join(WORKER_NAME);
    candidate.is_file().then_some(candidate)
}

fn locate_in_path() -> Option<Utf8PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .filter_map(|dir| Utf8PathBuf::try_from(dir.join(WORKER_NAME)).ok())
        .find(|candidate| candidate.is_file())
}

/// Copies the worker somewhere the unprivileged user can execute it.
///
/// The copy is made once per test process.
pub(super) fn prepare_pg_worker(worker: &Utf8Path) -> Result<Utf8PathBuf, BoxError> {
    let cache = PREPARED_WORKER.get_or_init(|| Mutex::new(None));
    let mut prepared = cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(path) = prepared.as_ref() {
        return Ok(path.clone());
    }

    let temp_dir = Utf8PathBuf::try_from(std::env::temp_dir()).map_err(|err| {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("temp directory path is not valid UTF-8: {err}"),
        )) as BoxError
    })?;
    let destination = temp_dir.join(format!("{WORKER_NAME}_{}", std::process::id()));
    let (source_dir, source_name) = open_parent_dir(worker)?;
    let (destination_dir, destination_name) = open_parent_dir(&destination)?;

    match destination_dir.remove_file(destination_name) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(Box::new(err) as BoxError),
    }
    source_dir
        .copy(source_name, &destination_dir, destination_name)
        .map_err(|err| Box::new(err) as BoxError)?;

    #[cfg(unix)]
    {
        destination_dir
            .set_permissions(destination_name, Permissions::from_mode(0o755))
            .map_err(|err| Box::new(err) as BoxError)?;
    }

    *prepared = Some(destination.clone());
    Ok(destination)
}
