use join_core::dashboard::{
  DashboardView,
  Greeting
};
use join_core::layout::Layout;
use join_core::stats::TaskSummary;
use yew::Callback;

/// Bridges controller calls into
/// component state.
#[derive(Clone)]
pub struct YewDashboardView {
  pub loading:  Callback<bool>,
  pub summary:  Callback<TaskSummary>,
  pub greeting: Callback<Greeting>,
  pub layout:   Callback<Layout>
}

impl DashboardView
  for YewDashboardView
{
  fn show_loading(&self) {
    self.loading.emit(true);
  }

  fn hide_loading(&self) {
    self.loading.emit(false);
  }

  fn render_summary(
    &self,
    summary: &TaskSummary
  ) {
    self.summary.emit(summary.clone());
  }

  fn render_greeting(
    &self,
    greeting: &Greeting
  ) {
    self
      .greeting
      .emit(greeting.clone());
  }

  fn set_layout(&self, layout: Layout) {
    self.layout.emit(layout);
  }
}
