use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use chrono::NaiveDate;
use futures::executor::block_on;
use join_core::auth::{AuthFeed, AuthState, Authenticator};
use join_core::cache::{Destination, PolicyTable, RequestInfo, Strategy};
use join_core::config::Config;
use join_core::dashboard::{DashboardController, DashboardView, Greeting};
use join_core::datastore::DataStore;
use join_core::layout::Layout;
use join_core::stats::TaskSummary;
use join_shared::SessionUser;
use tempfile::tempdir;

#[derive(Clone, Default)]
struct CapturingView {
    summaries: Rc<RefCell<Vec<TaskSummary>>>,
    greetings: Rc<RefCell<Vec<Greeting>>>,
}

impl DashboardView for CapturingView {
    fn show_loading(&self) {}

    fn hide_loading(&self) {}

    fn render_summary(&self, summary: &TaskSummary) {
        self.summaries.borrow_mut().push(summary.clone());
    }

    fn render_greeting(&self, greeting: &Greeting) {
        self.greetings.borrow_mut().push(greeting.clone());
    }

    fn set_layout(&self, _layout: Layout) {}
}

#[test]
fn exported_board_summarizes_for_signed_in_user() {
    let temp = tempdir().expect("tempdir");
    fs::write(
        temp.path().join("tasks.json"),
        r#"{
            "-t1": {"title": "Wireframes", "status": "todo", "ownerId": "u1", "priority": "urgent", "dueDate": "2024-01-05"},
            "-t2": {"title": "Copy", "status": "to-do", "ownerId": "u1", "prio": "Urgent", "dueDate": "2024-01-02"},
            "-t3": {"title": "Launch", "status": "completed", "ownerId": "u1"},
            "-t4": {"title": "Other board", "status": "todo", "ownerId": "u2"}
        }"#,
    )
    .expect("write tasks");
    fs::write(
        temp.path().join("users.json"),
        r#"{"u1": {"name": "Marcel Bauer", "email": "marcel@example.com"}}"#,
    )
    .expect("write users");

    let store = DataStore::open(temp.path()).expect("open datastore");
    let view = CapturingView::default();
    let controller = DashboardController::new(view.clone(), store, || 8);

    let feed = AuthFeed::new(Some(SessionUser {
        uid: "u1".to_string(),
        name: None,
        guest: false,
    }));
    let stream = feed.subscribe();
    feed.publish(None);
    drop(feed);

    block_on(controller.run(stream));

    let summaries = view.summaries.borrow();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.total, 3);
    assert_eq!(summary.todo, 2);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.urgent, 2);
    assert_eq!(summary.next_deadline, NaiveDate::from_ymd_opt(2024, 1, 2));

    let greetings = view.greetings.borrow();
    assert_eq!(greetings[0].headline(), "Good morning,");
    assert_eq!(greetings[0].name.as_deref(), Some("Marcel Bauer"));
}

#[test]
fn configured_timeout_reaches_network_first_routes() {
    let cfg = Config::from_text("cache.network_timeout = 1500\n").expect("parse rc");
    let settings = cfg.settings().expect("settings");
    let table = PolicyTable::standard(&settings);

    let request = RequestInfo::new("https://join.app/board.html", Destination::Document, true)
        .expect("valid url");
    let policy = table.classify(&request);
    assert_eq!(policy.strategy, Strategy::NetworkFirst);
    assert_eq!(policy.network_timeout.map(|t| t.as_millis()), Some(1500));

    let signed_out = AuthState::from_user(None);
    assert!(signed_out.user().is_none());
}
