use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Returns the user's home directory
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the directory for data files for the application
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the content-addressed store root.
///
/// `FANOUT_STORE` overrides the default of `<data_dir>/store`.
pub fn store_dir() -> PathBuf {
  if let Ok(path) = std::env::var("FANOUT_STORE") {
    return PathBuf::from(path);
  }
  data_dir().join("store")
}

/// Returns the rustup home directory (`RUSTUP_HOME` or `~/.rustup`).
pub fn rustup_home() -> PathBuf {
  std::env::var("RUSTUP_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".rustup"))
}

/// Returns the cargo home (`CARGO_HOME` or `~/.cargo`), shared by builds so
/// registry downloads are reused.
pub fn cargo_home() -> PathBuf {
  std::env::var("CARGO_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cargo"))
}

/// Returns the unpacked toolchain distribution root from `FANOUT_DIST`, if set.
pub fn dist_dir() -> Option<PathBuf> {
  std::env::var_os("FANOUT_DIST").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn data_dir_falls_back_to_home() {
    temp_env::with_vars(
      [
        ("XDG_DATA_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/home/user/.local/share").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn store_env_var_overrides_default() {
    temp_env::with_vars(
      [("FANOUT_STORE", Some("/custom/store")), ("HOME", Some("/home/user"))],
      || {
        assert_eq!(store_dir(), PathBuf::from("/custom/store"));
      },
    );
    temp_env::with_vars(
      [
        ("FANOUT_STORE", None::<&str>),
        ("XDG_DATA_HOME", Some("/data")),
      ],
      || {
        assert_eq!(store_dir(), PathBuf::from("/data/fanout/store"));
      },
    );
  }

  #[test]
  #[serial]
  fn rustup_home_defaults_under_home() {
    temp_env::with_vars([("RUSTUP_HOME", None::<&str>), ("HOME", Some("/home/user"))], || {
      assert_eq!(rustup_home(), PathBuf::from("/home/user/.rustup"));
    });
  }
}
