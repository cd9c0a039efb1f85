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

use crate::autosave::AutosaveOptions;
use crate::calendar_sync::CalendarSyncOptions;

const RC_ENV_VAR: &str = "TASKBOARDRC";
const RC_FILE_NAME: &str = ".taskboardrc";

const DEFAULTS: [(&str, &str); 9] = [
  ("data.location", "~/.taskboard"),
  ("owner", "local"),
  ("history.limit", "50"),
  ("autosave.debounce", "400"),
  ("autosave.cooldown", "2000"),
  ("calendar.debounce", "500"),
  ("calendar.id", "primary"),
  ("timezone", "local"),
  ("color", "on")
];

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    boardrc_override
  ))]
  pub fn load(
    boardrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      boardrc_override
    )?;
    if let Some(path) = rc {
      info!(boardrc = %path.display(), "loading boardrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no boardrc found; using \
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
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<u64>()
      .map(Some)
      .with_context(|| {
        format!(
          "invalid value for {key}: \
           expected a whole number, got \
           '{raw}'"
        )
      })
  }

  /// Reads a millisecond count.
  pub fn get_millis(
    &self,
    key: &str
  ) -> anyhow::Result<Option<Duration>> {
    Ok(
      self
        .get_u64(key)?
        .map(Duration::from_millis)
    )
  }

  pub fn owner(&self) -> String {
    self
      .get("owner")
      .filter(|v| !v.trim().is_empty())
      .unwrap_or_else(|| {
        "local".to_string()
      })
  }

  pub fn history_limit(
    &self
  ) -> anyhow::Result<usize> {
    let limit = self
      .get_u64("history.limit")?
      .unwrap_or(50);
    if limit == 0 {
      return Err(anyhow!(
        "invalid value for \
         history.limit: must be at \
         least 1"
      ));
    }
    usize::try_from(limit).context(
      "history.limit is out of range"
    )
  }

  pub fn autosave_options(
    &self
  ) -> anyhow::Result<AutosaveOptions> {
    let defaults =
      AutosaveOptions::default();
    Ok(AutosaveOptions {
      debounce: self
        .get_millis("autosave.debounce")?
        .unwrap_or(defaults.debounce),
      cooldown: self
        .get_millis("autosave.cooldown")?
        .unwrap_or(defaults.cooldown)
    })
  }

  pub fn calendar_options(
    &self
  ) -> anyhow::Result<CalendarSyncOptions>
  {
    let defaults =
      CalendarSyncOptions::default();
    Ok(CalendarSyncOptions {
      debounce:    self
        .get_millis("calendar.debounce")?
        .unwrap_or(defaults.debounce),
      calendar_id: self
        .get("calendar.id")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.calendar_id)
    })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
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
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
          continue;
        }
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

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
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
    std::env::var(RC_ENV_VAR)
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
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".taskboard"))
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

  fn write_rc(
    dir: &Path,
    name: &str,
    body: &str
  ) -> PathBuf {
    let path = dir.join(name);
    let mut file =
      fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
  }

  #[test]
  fn defaults_cover_every_known_key() {
    let cfg = Config::default();
    assert_eq!(cfg.owner(), "local");
    assert_eq!(cfg.history_limit().unwrap(), 50);
    let autosave =
      cfg.autosave_options().unwrap();
    assert_eq!(
      autosave.debounce,
      Duration::from_millis(400)
    );
    assert_eq!(
      autosave.cooldown,
      Duration::from_millis(2000)
    );
    let calendar =
      cfg.calendar_options().unwrap();
    assert_eq!(
      calendar.debounce,
      Duration::from_millis(500)
    );
    assert_eq!(calendar.calendar_id, "primary");
    assert_eq!(cfg.get_bool("color"), Some(true));
  }

  #[test]
  fn rc_file_with_include_and_comments() {
    let dir = tempfile::tempdir().unwrap();
    write_rc(
      dir.path(),
      "extra.rc",
      "calendar.id = work # team calendar\n"
    );
    let main = write_rc(
      dir.path(),
      "main.rc",
      "# board settings\nowner = alice\nhistory.limit=5\ninclude extra.rc\n\n"
    );

    let cfg =
      Config::load(Some(&main)).unwrap();
    assert_eq!(cfg.owner(), "alice");
    assert_eq!(cfg.history_limit().unwrap(), 5);
    assert_eq!(
      cfg.calendar_options().unwrap().calendar_id,
      "work"
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn overrides_win_and_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.autosave.debounce".to_string(),
        "50".to_string()
      ),
      ("color".to_string(), "off".to_string())
    ]);
    assert_eq!(
      cfg.autosave_options().unwrap().debounce,
      Duration::from_millis(50)
    );
    assert_eq!(cfg.get_bool("color"), Some(false));
  }

  #[test]
  fn bad_numbers_name_the_key() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "calendar.debounce".to_string(),
      "soon".to_string()
    )]);
    let err =
      cfg.calendar_options().unwrap_err();
    assert!(
      format!("{err:#}")
        .contains("calendar.debounce")
    );

    cfg.apply_overrides([(
      "history.limit".to_string(),
      "0".to_string()
    )]);
    assert!(cfg.history_limit().is_err());
  }

  #[test]
  fn lines_without_equals_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let rc =
      write_rc(dir.path(), "bad.rc", "owner\n");
    let err = Config::load(Some(&rc)).unwrap_err();
    assert!(
      err.to_string().contains("invalid config line")
    );
  }
}
