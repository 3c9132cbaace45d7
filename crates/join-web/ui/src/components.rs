use join_core::dashboard::Greeting;
use join_core::stats::{
  BoardStatus,
  TaskSummary
};
use join_shared::ThemePreference;
use yew::{
  Callback,
  Html,
  Properties,
  classes,
  function_component,
  html
};

#[derive(Properties, PartialEq)]
pub struct HeaderProps {
  pub theme:           ThemePreference,
  pub on_toggle_theme: Callback<()>
}

#[function_component(Header)]
pub fn header(
  props: &HeaderProps
) -> Html {
  let on_toggle = {
    let on_toggle_theme =
      props.on_toggle_theme.clone();
    Callback::from(move |_| {
      on_toggle_theme.emit(())
    })
  };

  html! {
      <header class="app-header">
          <span class="app-title">{ "Kanban Project Management Tool" }</span>
          <button
              class="btn theme-toggle"
              title={ format!("Theme: {}", props.theme) }
              onclick={on_toggle}
          >
              { props.theme.toggle_label() }
          </button>
      </header>
  }
}

#[derive(Properties, PartialEq)]
pub struct GreetingPanelProps {
  pub greeting: Option<Greeting>
}

#[function_component(GreetingPanel)]
pub fn greeting_panel(
  props: &GreetingPanelProps
) -> Html {
  let Some(greeting) = &props.greeting
  else {
    return html! {};
  };

  html! {
      <div class="greeting">
          <span class="greeting-text">{ greeting.headline() }</span>
          if let Some(name) = &greeting.name {
              <span class="greeting-name">{ name.clone() }</span>
          }
      </div>
  }
}

#[derive(Properties, PartialEq)]
pub struct SummaryCardsProps {
  pub summary: TaskSummary
}

#[function_component(SummaryCards)]
pub fn summary_cards(
  props: &SummaryCardsProps
) -> Html {
  let summary = &props.summary;
  let deadline = summary
    .next_deadline
    .map(|date| {
      date
        .format("%B %-d, %Y")
        .to_string()
    })
    .unwrap_or_else(|| {
      "No upcoming deadline".to_string()
    });

  let card =
    |status: BoardStatus| -> Html {
      html! {
          <div class="summary-card">
              <span class="summary-count">{ summary.count(status) }</span>
              <span class="summary-label">{ status.label() }</span>
          </div>
      }
    };

  html! {
      <section class="summary">
          <div class="summary-row">
              { card(BoardStatus::Todo) }
              { card(BoardStatus::Done) }
          </div>
          <div class={classes!("summary-card", "summary-urgent")}>
              <div>
                  <span class="summary-count">{ summary.urgent }</span>
                  <span class="summary-label">{ "Urgent" }</span>
              </div>
              <div>
                  <span class="summary-date">{ deadline }</span>
                  <span class="summary-label">{ "Upcoming Deadline" }</span>
              </div>
          </div>
          <div class="summary-row">
              <div class="summary-card">
                  <span class="summary-count">{ summary.total }</span>
                  <span class="summary-label">{ "Tasks in Board" }</span>
              </div>
              { card(BoardStatus::InProgress) }
              { card(BoardStatus::AwaitingFeedback) }
          </div>
      </section>
  }
}

#[derive(Properties, PartialEq)]
pub struct UpdateBannerProps {
  pub version:   Option<String>,
  pub on_reload: Callback<()>
}

#[function_component(UpdateBanner)]
pub fn update_banner(
  props: &UpdateBannerProps
) -> Html {
  let Some(version) = &props.version
  else {
    return html! {};
  };
  let on_reload = {
    let on_reload =
      props.on_reload.clone();
    Callback::from(move |_| {
      on_reload.emit(())
    })
  };

  html! {
      <div class="update-banner" role="status">
          <span>{ format!("Version {version} is available.") }</span>
          <button class="btn" onclick={on_reload}>{ "Reload" }</button>
      </div>
  }
}
