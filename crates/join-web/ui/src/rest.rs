use gloo::net::http::Request;
use join_core::dashboard::TaskSource;
use join_core::datastore::parse_tasks;
use join_core::error::DataError;
use join_shared::{
  Profile,
  TaskRecord
};

/// Tasks and profiles over the hosted
/// database's REST endpoints.
pub struct RestTaskSource {
  base: Option<String>
}

impl RestTaskSource {
  pub fn new(
    database_url: Option<String>
  ) -> Self {
    if database_url.is_none() {
      tracing::warn!(
        "data.database_url not set; \
         dashboard will stay empty"
      );
    }
    Self {
      base: database_url
    }
  }

  fn url(
    &self,
    path: &str
  ) -> Result<String, DataError> {
    let base =
      self.base.as_deref().ok_or_else(
        || {
          DataError::Request(
            "no database configured"
              .to_string()
          )
        }
      )?;
    Ok(format!("{base}/{path}"))
  }
}

impl TaskSource for RestTaskSource {
  async fn tasks_for_user(
    &self,
    uid: &str
  ) -> Result<Vec<TaskRecord>, DataError>
  {
    let raw =
      get_text(&self.url("tasks.json")?)
        .await?;
    let tasks: Vec<TaskRecord> =
      parse_tasks(&raw)?
        .into_iter()
        .filter(|task| {
          task.owner_id.as_deref()
            == Some(uid)
        })
        .collect();
    tracing::debug!(
      uid,
      count = tasks.len(),
      "fetched tasks"
    );
    Ok(tasks)
  }

  async fn user_profile(
    &self,
    uid: &str
  ) -> Result<Option<Profile>, DataError>
  {
    let raw = get_text(
      &self.url(&format!(
        "users/{uid}.json"
      ))?
    )
    .await?;
    let profile: Option<Profile> =
      serde_json::from_str(&raw)
        .map_err(|e| {
          DataError::Decode(e.to_string())
        })?;
    Ok(profile.map(|mut profile| {
      if profile.id.is_empty() {
        profile.id = uid.to_string();
      }
      profile
    }))
  }
}

async fn get_text(
  url: &str
) -> Result<String, DataError> {
  let response = Request::get(url)
    .send()
    .await
    .map_err(|e| {
      DataError::Request(e.to_string())
    })?;
  if !response.ok() {
    return Err(DataError::Status(
      response.status()
    ));
  }
  response.text().await.map_err(|e| {
    DataError::Decode(e.to_string())
  })
}
