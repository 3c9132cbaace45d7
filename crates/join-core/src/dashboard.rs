//! Summary page orchestration: auth state in, rendered statistics out.

use futures::StreamExt;
use join_shared::{Profile, SessionUser, TaskRecord};
use tracing::{info, warn};

use crate::auth::{AuthState, AuthStream};
use crate::error::DataError;
use crate::layout::Layout;
use crate::stats::{TaskSummary, summarize};

/// The hosted document database, seen from the dashboard.
#[allow(async_fn_in_trait)]
pub trait TaskSource {
    async fn tasks_for_user(&self, uid: &str) -> Result<Vec<TaskRecord>, DataError>;

    async fn user_profile(&self, uid: &str) -> Result<Option<Profile>, DataError>;
}

/// Everything the controller touches on the page.
pub trait DashboardView {
    fn show_loading(&self);

    fn hide_loading(&self);

    fn render_summary(&self, summary: &TaskSummary);

    fn render_greeting(&self, greeting: &Greeting);

    fn set_layout(&self, layout: Layout);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub salutation: &'static str,
    pub name: Option<String>,
}

impl Greeting {
    pub fn for_hour(hour: u32, name: Option<String>) -> Self {
        Self {
            salutation: salutation_for_hour(hour),
            name: name.filter(|name| !name.trim().is_empty()),
        }
    }

    pub fn headline(&self) -> String {
        match &self.name {
            Some(_) => format!("{},", self.salutation),
            None => format!("{}!", self.salutation),
        }
    }
}

pub fn salutation_for_hour(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    }
}

pub struct DashboardController<V, S> {
    view: V,
    source: S,
    hour_of_day: Box<dyn Fn() -> u32>,
}

impl<V, S> DashboardController<V, S>
where
    V: DashboardView,
    S: TaskSource,
{
    pub fn new(view: V, source: S, hour_of_day: impl Fn() -> u32 + 'static) -> Self {
        Self {
            view,
            source,
            hour_of_day: Box::new(hour_of_day),
        }
    }

    pub fn set_layout(&self, layout: Layout) {
        self.view.set_layout(layout);
    }

    /// Drives [`Self::handle`] for every auth transition until the stream ends.
    pub async fn run(&self, mut auth: AuthStream) {
        while let Some(state) = auth.next().await {
            self.handle(state).await;
        }
        info!("auth stream closed");
    }

    /// Returns the rendered summary, or `None` after a sign-out.
    #[tracing::instrument(skip(self, state), fields(signed_in = state.user().is_some()))]
    pub async fn handle(&self, state: AuthState) -> Option<TaskSummary> {
        self.view.show_loading();

        let AuthState::SignedIn(user) = state else {
            info!("signed out; showing placeholder");
            return None;
        };

        let (summary, greeting) = self.load(&user).await;
        self.view.render_greeting(&greeting);
        self.view.render_summary(&summary);
        self.view.hide_loading();
        Some(summary)
    }

    async fn load(&self, user: &SessionUser) -> (TaskSummary, Greeting) {
        let hour = (self.hour_of_day)();

        if user.guest {
            let tasks = self.source.tasks_for_user(&user.uid).await;
            let summary = self.summarize_or_zero(tasks);
            return (summary, Greeting::for_hour(hour, None));
        }

        let (profile, tasks) = futures::join!(
            self.source.user_profile(&user.uid),
            self.source.tasks_for_user(&user.uid)
        );

        let name = match profile {
            Ok(Some(profile)) => Some(profile.name),
            Ok(None) => user.name.clone(),
            Err(error) => {
                warn!(%error, uid = %user.uid, "failed loading profile");
                None
            }
        };

        (self.summarize_or_zero(tasks), Greeting::for_hour(hour, name))
    }

    fn summarize_or_zero(&self, tasks: Result<Vec<TaskRecord>, DataError>) -> TaskSummary {
        match tasks {
            Ok(tasks) => {
                let summary = summarize(Some(tasks.as_slice()));
                info!(total = summary.total, urgent = summary.urgent, "summarized tasks");
                summary
            }
            Err(error) => {
                warn!(%error, "failed loading tasks; showing empty summary");
                summarize(None)
            }
        }
    }
}
