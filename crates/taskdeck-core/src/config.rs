use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::category::DEFAULT_CATEGORY_COLOR;
use crate::store::DEFAULT_TIMEOUT;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  /// Built-in values only; no rc file.
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    cfg.map.insert(
      "data.location".to_string(),
      "~/.taskdeck/store.json"
        .to_string()
    );
    cfg.map.insert(
      "store.timeout".to_string(),
      DEFAULT_TIMEOUT
        .as_millis()
        .to_string()
    );
    cfg.map.insert(
      "category.color".to_string(),
      DEFAULT_CATEGORY_COLOR.to_string()
    );
    cfg.map.insert(
      "color".to_string(),
      "on".to_string()
    );
    cfg.map.insert(
      "confirm".to_string(),
      "on".to_string()
    );
    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading taskdeckrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no taskdeckrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u64>().with_context(
          || {
            format!(
              "{key} must be a whole \
               number, got {v:?}"
            )
          }
        )
      })
      .transpose()
  }

  /// `store.timeout` in milliseconds.
  /// Zero is rejected: every request
  /// would time out.
  pub fn store_timeout(
    &self
  ) -> anyhow::Result<Duration> {
    match self.get_u64("store.timeout")? {
      | None => Ok(DEFAULT_TIMEOUT),
      | Some(0) => Err(anyhow!(
        "store.timeout must be greater \
         than zero"
      )),
      | Some(ms) => {
        Ok(Duration::from_millis(ms))
      }
    }
  }

  pub fn category_color(&self) -> String {
    self
      .get("category.color")
      .filter(|c| !c.trim().is_empty())
      .unwrap_or_else(|| {
        DEFAULT_CATEGORY_COLOR.to_string()
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    if self.loaded_files.contains(&path)
    {
      warn!(file = %path.display(), "include cycle; skipping");
      return Ok(());
    }
    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      // Colors are written `#RRGGBB`, so
      // only ` #` starts a trailing
      // comment.
      if let Some((before, _)) =
        line.split_once(" #")
      {
        line = before.trim();
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Path of the store snapshot; its
/// parent directory is created when
/// missing.
#[tracing::instrument(skip(
  cfg,
  override_path
))]
pub fn resolve_store_path(
  cfg: &Config,
  override_path: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let path = if let Some(path) =
    override_path
  {
    expand_tilde(path)
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_store_path()?
  };

  if let Some(dir) = path.parent()
    && !dir.as_os_str().is_empty()
    && !dir.exists()
  {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(path)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("TASKDECKRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".taskdeckrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_store_path()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(
    home
      .join(".taskdeck")
      .join("store.json")
  )
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  fn write(
    dir: &Path,
    name: &str,
    body: &str
  ) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path)
      .expect("create rc");
    file
      .write_all(body.as_bytes())
      .expect("write rc");
    path
  }

  #[test]
  fn rc_file_with_include_and_comments()
  {
    let dir =
      tempfile::tempdir().expect("tempdir");
    write(
      dir.path(),
      "colors.rc",
      "category.color = #12B76A\n"
    );
    let rc = write(
      dir.path(),
      "main.rc",
      "# taskdeck\nstore.timeout = 2500 \
       # ms\ninclude colors.rc\nconfirm=off\n"
    );

    let cfg =
      Config::load(Some(rc.as_path())).expect("load");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.store_timeout().expect("timeout"),
      Duration::from_millis(2500)
    );
    assert_eq!(
      cfg.category_color(),
      "#12B76A"
    );
    assert_eq!(
      cfg.get_bool("confirm"),
      Some(false)
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![
      (
        "rc.store.timeout".to_string(),
        "50".to_string()
      ),
      (
        "color".to_string(),
        "off".to_string()
      ),
    ]);
    assert_eq!(
      cfg.store_timeout().expect("timeout"),
      Duration::from_millis(50)
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
  }

  #[test]
  fn bad_timeout_is_an_error() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![(
      "store.timeout".to_string(),
      "soon".to_string()
    )]);
    assert!(cfg.store_timeout().is_err());

    cfg.apply_overrides(vec![(
      "store.timeout".to_string(),
      "0".to_string()
    )]);
    assert!(cfg.store_timeout().is_err());
  }

  #[test]
  fn malformed_line_names_file_and_line()
  {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let rc = write(
      dir.path(),
      "bad.rc",
      "color = on\nnot a setting\n"
    );
    let err = Config::load(Some(rc.as_path()))
      .expect_err("malformed");
    assert!(
      err.to_string().contains("bad.rc:2")
    );
  }

  #[test]
  fn store_path_parent_is_created() {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let target =
      dir.path().join("nested/store.json");
    let path = resolve_store_path(
      &Config::defaults(),
      Some(target.as_path())
    )
    .expect("resolve");
    assert_eq!(path, target);
    assert!(
      dir.path().join("nested").is_dir()
    );
  }
}
