//! Process-wide user preferences, saved to the local store as one JSON blob.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, warn};

use crate::db::{LocalStore, PREFERENCES_KEY};
use crate::state::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

impl FromStr for Theme {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "light" => Ok(Theme::Light),
      "dark" => Ok(Theme::Dark),
      other => Err(eyre!("Unknown theme '{}', expected light or dark", other)),
    }
  }
}

impl fmt::Display for Theme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Theme::Light => "light",
      Theme::Dark => "dark",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
  pub theme: Theme,
  pub language: String,
  pub items_per_page: u32,
  pub default_currency: String,
  pub sidebar_collapsed: bool,
}

impl Default for Preferences {
  fn default() -> Self {
    Self {
      theme: Theme::Light,
      language: "en".to_string(),
      items_per_page: DEFAULT_PAGE_SIZE,
      default_currency: "USD".to_string(),
      sidebar_collapsed: false,
    }
  }
}

impl Preferences {
  /// Set one preference from its name and textual value.
  pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
    match name {
      "theme" => self.theme = value.parse()?,
      "language" => self.language = value.to_string(),
      "items_per_page" | "itemsPerPage" => {
        let n: u32 = value
          .parse()
          .map_err(|_| eyre!("items_per_page must be a positive number, got '{}'", value))?;
        if n == 0 {
          return Err(eyre!("items_per_page must be at least 1"));
        }
        self.items_per_page = n;
      }
      "default_currency" | "defaultCurrency" => self.default_currency = value.to_uppercase(),
      "sidebar_collapsed" | "sidebarCollapsed" => {
        self.sidebar_collapsed = value
          .parse()
          .map_err(|_| eyre!("sidebar_collapsed must be true or false, got '{}'", value))?
      }
      other => return Err(eyre!("Unknown preference '{}'", other)),
    }
    Ok(())
  }
}

static GLOBAL: OnceLock<PreferenceStore> = OnceLock::new();

pub struct PreferenceStore {
  prefs: RwLock<Preferences>,
  store: Option<Arc<LocalStore>>,
}

impl PreferenceStore {
  /// Load from the local store. A missing or unreadable blob gives defaults.
  pub fn load(store: Arc<LocalStore>) -> Result<Self> {
    let prefs = match store.get(PREFERENCES_KEY)? {
      Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
        warn!("Ignoring unreadable preferences: {}", e);
        Preferences::default()
      }),
      None => Preferences::default(),
    };
    debug!("Loaded preferences: {:?}", prefs);
    Ok(Self {
      prefs: RwLock::new(prefs),
      store: Some(store),
    })
  }

  pub fn in_memory(prefs: Preferences) -> Self {
    Self {
      prefs: RwLock::new(prefs),
      store: None,
    }
  }

  /// Make `self` the process-wide store. Only the first call wins.
  pub fn install(self) -> &'static PreferenceStore {
    GLOBAL.get_or_init(|| self)
  }

  pub fn get(&self) -> Preferences {
    self.prefs.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Apply `f` and persist the result. Nothing changes if `f` or the write
  /// fails.
  pub fn update(&self, f: impl FnOnce(&mut Preferences) -> Result<()>) -> Result<Preferences> {
    let mut prefs = self.prefs.write().unwrap_or_else(|e| e.into_inner());
    let mut next = prefs.clone();
    f(&mut next)?;
    self.persist(&next)?;
    *prefs = next.clone();
    Ok(next)
  }

  pub fn reset(&self) -> Result<Preferences> {
    self.update(|p| {
      *p = Preferences::default();
      Ok(())
    })
  }

  fn persist(&self, prefs: &Preferences) -> Result<()> {
    if let Some(store) = &self.store {
      let json = serde_json::to_string(prefs)?;
      store.set(PREFERENCES_KEY, &json)?;
    }
    Ok(())
  }
}
