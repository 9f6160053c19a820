//! Transaction names derived from the page being served or the cron task being run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::observability::SpanSink;

/// Page type for a script path, e.g. `mod/forum/view.php` -> `mod-forum-view`.
///
/// `script` is the explicit page path when the host has one; otherwise
/// `requested` (the request path) is used, with a leading `admin_dir`
/// normalised to `admin`.
pub fn page_type_for_script(script: Option<&str>, requested: &str, admin_dir: &str) -> String {
    let script = match script {
        Some(script) => script.to_string(),
        None => {
            let requested = requested.trim_start_matches('/');
            match requested.strip_prefix(admin_dir) {
                Some(rest) if !admin_dir.is_empty() => format!("admin{rest}"),
                _ => requested.to_string(),
            }
        }
    };

    let mut path = script.replace(".php", "");
    if path.ends_with('/') {
        path.push_str("index");
    }

    if path.is_empty() || path == "index" {
        "site-index".to_string()
    } else {
        path.replace('/', "-")
    }
}

/// Names the current transaction after its page type.
///
/// An explicitly set page type wins over any default computed afterwards.
pub struct TransactionNamer<S: SpanSink> {
    sink: Arc<S>,
    explicit: AtomicBool,
}

impl<S: SpanSink> TransactionNamer<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink, explicit: AtomicBool::new(false) }
    }

    /// Returns the name applied, if any.
    pub fn initialise_default_pagetype(
        &self,
        script: Option<&str>,
        requested: &str,
        admin_dir: &str,
    ) -> Option<String> {
        if self.explicit.load(Ordering::Acquire) {
            return None;
        }
        let name = page_type_for_script(script, requested, admin_dir);
        self.sink.set_transaction_name(&name);
        Some(name)
    }

    pub fn set_pagetype(&self, page_type: &str) {
        self.explicit.store(true, Ordering::Release);
        self.sink.set_transaction_name(page_type);
    }
}

/// A scheduled cron task about to run.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledTask<'a> {
    /// Fully qualified task class, e.g. `\core\task\session_cleanup_task`.
    pub class_name: &'a str,
    pub component: &'a str,
}

/// A queued (adhoc) cron task about to run.
#[derive(Debug, Clone, Copy)]
pub struct AdhocTask<'a> {
    pub class_name: &'a str,
    pub component: &'a str,
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    /// Custom data as the JSON string the task was queued with.
    pub custom_data: Option<&'a str>,
}

/// Names each cron task's transaction after the task class and tags it with
/// the task's details. Call before the task runs.
pub struct CronTaskNamer<S: SpanSink> {
    sink: Arc<S>,
}

impl<S: SpanSink> CronTaskNamer<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    pub fn before_scheduled_task(&self, task: &ScheduledTask<'_>) {
        self.sink.set_transaction_name(task.class_name);
        self.sink.set_custom_variable("component", task.component);
    }

    /// Unset ids and custom data are left off the transaction.
    pub fn before_adhoc_task(&self, task: &AdhocTask<'_>) {
        self.sink.set_transaction_name(task.class_name);
        self.sink.set_custom_variable("component", task.component);
        if let Some(id) = task.id {
            self.sink.set_custom_variable("id", &id.to_string());
        }
        if let Some(user_id) = task.user_id {
            self.sink.set_custom_variable("userid", &user_id.to_string());
        }
        if let Some(data) = task.custom_data {
            self.sink.set_custom_variable("customdata", data);
        }
    }
}
