use std::{
    env,
    ffi::OsString,
    fs,
    path::PathBuf,
};

/// Errors for resolving the home directory
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("user home directory is unknown (HOME/USERPROFILE not set)")]
    HomeMissing,
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn user_home() -> Option<OsString> {
    #[cfg(target_os = "windows")]
    {
        env::var_os("USERPROFILE").or_else(|| env::var_os("HOME"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        env::var_os("HOME")
    }
}

/// Resolve the server home directory.
///
/// * `Some("~")` / `Some("~/x")` expand against the user home;
/// * any other provided value must already be absolute;
/// * `None` means `<user home>/<default_subdir>`.
///
/// If `create` is true, the directory is created if missing.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = resolve_against(config_home, default_subdir, user_home())?;
    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

fn resolve_against(
    config_home: Option<String>,
    default_subdir: &str,
    user_home: Option<OsString>,
) -> Result<PathBuf, HomeDirError> {
    let home = || {
        user_home
            .clone()
            .map(PathBuf::from)
            .ok_or(HomeDirError::HomeMissing)
    };

    let path = match config_home {
        None => home()?.join(default_subdir),
        Some(raw) if raw == "~" => home()?,
        Some(raw) => match raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
            Some(rest) => home()?.join(rest),
            None => PathBuf::from(raw),
        },
    };

    if !path.is_absolute() {
        return Err(HomeDirError::AbsoluteRequired(
            path.to_string_lossy().into_owned(),
        ));
    }
    Ok(path)
}
