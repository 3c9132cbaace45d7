use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Deserializer,
  Serialize
};

/// Local storage key holding the
/// theme preference string.
pub const THEME_STORAGE_KEY: &str =
  "join.theme";

/// Local storage key holding the
/// signed-in session written by the
/// login page.
pub const SESSION_STORAGE_KEY: &str =
  "join.session";

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
  #[default]
  Device,
  Light,
  Dark
}

impl ThemePreference {
  pub const ALL: [Self; 3] = [
    Self::Device,
    Self::Light,
    Self::Dark
  ];

  /// Cyclic rotation used by the
  /// header toggle.
  pub fn next(self) -> Self {
    match self {
      | Self::Device => Self::Light,
      | Self::Light => Self::Dark,
      | Self::Dark => Self::Device
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Device => "device",
      | Self::Light => "light",
      | Self::Dark => "dark"
    }
  }

  pub fn toggle_label(
    self
  ) -> &'static str {
    match self {
      | Self::Device => "Device",
      | Self::Light => "Light",
      | Self::Dark => "Dark"
    }
  }
}

impl fmt::Display for ThemePreference {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  thiserror::Error,
)]
#[error("unknown theme preference: {0}")]
pub struct UnknownThemePreference(
  pub String
);

impl FromStr for ThemePreference {
  type Err = UnknownThemePreference;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "device" | "system" => {
        Ok(Self::Device)
      }
      | "light" => Ok(Self::Light),
      | "dark" => Ok(Self::Dark),
      | _ => {
        Err(UnknownThemePreference(
          s.to_string()
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedTheme {
  Light,
  Dark
}

impl ResolvedTheme {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Light => "light",
      | Self::Dark => "dark"
    }
  }

  pub fn as_class(
    self
  ) -> &'static str {
    match self {
      | Self::Light => "theme-light",
      | Self::Dark => "theme-dark"
    }
  }
}

impl From<ResolvedTheme>
  for ThemePreference
{
  fn from(value: ResolvedTheme) -> Self {
    match value {
      | ResolvedTheme::Light => {
        Self::Light
      }
      | ResolvedTheme::Dark => {
        Self::Dark
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
pub struct TaskRecord {
  #[serde(
    default,
    deserialize_with = "null_as_default"
  )]
  pub id:       String,
  #[serde(
    default,
    deserialize_with = "null_as_default"
  )]
  pub title:    String,
  #[serde(
    default,
    deserialize_with = "null_as_default"
  )]
  pub status:   String,
  #[serde(default)]
  pub priority: Option<String>,
  #[serde(default)]
  pub prio:     Option<String>,
  #[serde(
    default,
    rename = "dueDate"
  )]
  pub due_date: Option<String>,
  #[serde(
    default,
    rename = "ownerId"
  )]
  pub owner_id: Option<String>,
  #[serde(flatten)]
  pub extra:
    BTreeMap<String, serde_json::Value>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct Profile {
  #[serde(
    default,
    deserialize_with = "null_as_default"
  )]
  pub id:       String,
  #[serde(
    default,
    deserialize_with = "null_as_default"
  )]
  pub name:     String,
  #[serde(default)]
  pub email:    Option<String>,
  #[serde(default)]
  pub initials: Option<String>
}

/// Database nodes write `null` for
/// cleared fields.
fn null_as_default<'de, D, T>(
  deserializer: D
) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>
{
  Ok(
    Option::<T>::deserialize(
      deserializer
    )?
    .unwrap_or_default()
  )
}

/// Session blob the login page keeps
/// in local storage.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct SessionUser {
  pub uid:   String,
  #[serde(default)]
  pub name:  Option<String>,
  #[serde(default)]
  pub guest: bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct SettingsPayload {
  #[serde(
    default,
    rename = "themePreference",
    skip_serializing_if = "Option::is_none"
  )]
  pub theme_preference:
    Option<ThemePreference>,
  #[serde(flatten)]
  pub other:
    BTreeMap<String, serde_json::Value>
}

impl SettingsPayload {
  pub fn theme(
    preference: ThemePreference
  ) -> Self {
    Self {
      theme_preference: Some(
        preference
      ),
      other:            BTreeMap::new()
    }
  }

  /// Flattens the payload into
  /// `(key, json)` pairs, one per
  /// preference key.
  pub fn entries(
    &self
  ) -> Vec<(String, serde_json::Value)>
  {
    let mut out = Vec::with_capacity(
      self.other.len() + 1
    );
    if let Some(theme) =
      self.theme_preference
    {
      out.push((
        "themePreference".to_string(),
        serde_json::Value::String(
          theme.as_str().to_string()
        )
      ));
    }
    for (key, value) in &self.other {
      out.push((
        key.clone(),
        value.clone()
      ));
    }
    out
  }
}

/// Control messages exchanged between
/// page contexts and the service
/// worker.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(tag = "type")]
pub enum WorkerMessage {
  #[serde(rename = "SYNC_SETTINGS")]
  SyncSettings {
    payload: SettingsPayload
  },
  #[serde(rename = "CHECK_UPDATE")]
  CheckUpdate,
  #[serde(
    rename = "SW_UPDATE_AVAILABLE"
  )]
  UpdateAvailable {
    version: String
  },
  #[serde(rename = "SW_ACTIVATED")]
  Activated {
    version: String
  }
}

impl WorkerMessage {
  pub fn kind(&self) -> &'static str {
    match self {
      | Self::SyncSettings {
        ..
      } => "SYNC_SETTINGS",
      | Self::CheckUpdate => {
        "CHECK_UPDATE"
      }
      | Self::UpdateAvailable {
        ..
      } => "SW_UPDATE_AVAILABLE",
      | Self::Activated {
        ..
      } => "SW_ACTIVATED"
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn theme_preference_cycles_back() {
    for start in ThemePreference::ALL {
      assert_eq!(
        start.next().next().next(),
        start
      );
    }
  }

  #[test]
  fn sync_settings_uses_wire_names() {
    let msg =
      WorkerMessage::SyncSettings {
        payload: SettingsPayload::theme(
          ThemePreference::Dark
        )
      };
    let json =
      serde_json::to_value(&msg)
        .expect("serialize");
    assert_eq!(
      json,
      serde_json::json!({
        "type": "SYNC_SETTINGS",
        "payload": {
          "themePreference": "dark"
        }
      })
    );
  }

  #[test]
  fn update_messages_parse() {
    let parsed: WorkerMessage =
      serde_json::from_str(
        r#"{"type":"SW_UPDATE_AVAILABLE","version":"1.2.0"}"#
      )
      .expect("parse");
    assert_eq!(
      parsed,
      WorkerMessage::UpdateAvailable {
        version: "1.2.0".to_string()
      }
    );

    let check: WorkerMessage =
      serde_json::from_str(
        r#"{"type":"CHECK_UPDATE"}"#
      )
      .expect("parse");
    assert_eq!(
      check.kind(),
      "CHECK_UPDATE"
    );
  }

  #[test]
  fn task_record_keeps_legacy_fields() {
    let task: TaskRecord =
      serde_json::from_str(
        r#"{
          "id": "t1",
          "status": "to-do",
          "prio": "Urgent",
          "dueDate": "2024-01-02",
          "ownerId": "u1",
          "category": "User Story"
        }"#
      )
      .expect("parse task");
    assert_eq!(task.status, "to-do");
    assert_eq!(
      task.prio.as_deref(),
      Some("Urgent")
    );
    assert_eq!(
      task.owner_id.as_deref(),
      Some("u1")
    );
    assert!(
      task
        .extra
        .contains_key("category")
    );
  }

  #[test]
  fn null_fields_read_as_empty() {
    let task: TaskRecord =
      serde_json::from_str(
        r#"{"title":null,"status":null,"ownerId":"u1"}"#
      )
      .expect("parse task");
    assert_eq!(task.status, "");
    assert_eq!(task.title, "");
    assert!(task.extra.is_empty());
  }

  #[test]
  fn unknown_preference_names_the_value()
  {
    let err = "sepia"
      .parse::<ThemePreference>()
      .expect_err("rejected");
    assert_eq!(
      err.to_string(),
      "unknown theme preference: sepia"
    );
  }

  #[test]
  fn settings_entries_include_extra_keys()
  {
    let payload: SettingsPayload =
      serde_json::from_str(
        r#"{"themePreference":"light","reducedMotion":true}"#
      )
      .expect("parse payload");
    let keys = payload
      .entries()
      .into_iter()
      .map(|(key, _)| key)
      .collect::<Vec<_>>();
    assert_eq!(
      keys,
      vec![
        "themePreference".to_string(),
        "reducedMotion".to_string()
      ]
    );
  }
}
