use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{Mutex, OnceLock},
};

pub(crate) const NOTIFICATION_DROP_REASON_QUEUE_FULL: &str = "queue_full";
pub(crate) const NOTIFICATION_DROP_REASON_CLOSED: &str = "closed";
pub(crate) const NOTIFICATION_DROP_REASON_ENCODE_ERROR: &str = "encode_error";

static METRICS_STATE: OnceLock<MetricsState> = OnceLock::new();

#[derive(Default)]
struct MetricsState {
    lifecycle_outcomes: Mutex<HashMap<(&'static str, &'static str), u64>>,
    duplicates_superseded: Mutex<u64>,
    notifications_emitted: Mutex<HashMap<&'static str, u64>>,
    notifications_dropped: Mutex<HashMap<(&'static str, &'static str), u64>>,
}

fn metrics_state() -> &'static MetricsState {
    METRICS_STATE.get_or_init(MetricsState::default)
}

/// Render every counter in Prometheus text exposition format.
#[must_use]
pub fn render_metrics() -> String {
    let lifecycle_outcomes = metrics_state()
        .lifecycle_outcomes
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let duplicates_superseded = metrics_state()
        .duplicates_superseded
        .lock()
        .map_or(0, |guard| *guard);
    let notifications_emitted = metrics_state()
        .notifications_emitted
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let notifications_dropped = metrics_state()
        .notifications_dropped
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());

    let mut output = String::new();
    output.push_str(
        "# HELP access_request_operations_total Count of lifecycle operations by outcome\n",
    );
    output.push_str("# TYPE access_request_operations_total counter\n");
    let mut outcome_entries: Vec<_> = lifecycle_outcomes.into_iter().collect();
    outcome_entries.sort_by_key(|((operation, outcome), _)| (*operation, *outcome));
    for ((operation, outcome), value) in outcome_entries {
        let _ = writeln!(
            output,
            "access_request_operations_total{{operation=\"{operation}\",outcome=\"{outcome}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP access_request_duplicates_superseded_total Pending requests rejected as duplicates\n",
    );
    output.push_str("# TYPE access_request_duplicates_superseded_total counter\n");
    let _ = writeln!(
        output,
        "access_request_duplicates_superseded_total {duplicates_superseded}"
    );

    output.push_str(
        "# HELP access_notifications_emitted_total Count of notifications handed to a sink\n",
    );
    output.push_str("# TYPE access_notifications_emitted_total counter\n");
    let mut emitted_entries: Vec<_> = notifications_emitted.into_iter().collect();
    emitted_entries.sort_by_key(|(event_type, _)| *event_type);
    for (event_type, value) in emitted_entries {
        let _ = writeln!(
            output,
            "access_notifications_emitted_total{{event_type=\"{event_type}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP access_notifications_dropped_total Count of notifications dropped by reason\n",
    );
    output.push_str("# TYPE access_notifications_dropped_total counter\n");
    let mut dropped_entries: Vec<_> = notifications_dropped.into_iter().collect();
    dropped_entries.sort_by_key(|((event_type, reason), _)| (*event_type, *reason));
    for ((event_type, reason), value) in dropped_entries {
        let _ = writeln!(
            output,
            "access_notifications_dropped_total{{event_type=\"{event_type}\",reason=\"{reason}\"}} {value}"
        );
    }

    output
}

pub(crate) fn record_lifecycle_outcome(operation: &'static str, outcome: &'static str) {
    if let Ok(mut counters) = metrics_state().lifecycle_outcomes.lock() {
        let entry = counters.entry((operation, outcome)).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_duplicates_superseded(count: usize) {
    if let Ok(mut counter) = metrics_state().duplicates_superseded.lock() {
        *counter += u64::try_from(count).unwrap_or(u64::MAX);
    }
}

pub(crate) fn record_notification_emitted(event_type: &'static str) {
    if let Ok(mut counters) = metrics_state().notifications_emitted.lock() {
        let entry = counters.entry(event_type).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_notification_dropped(event_type: &'static str, reason: &'static str) {
    if let Ok(mut counters) = metrics_state().notifications_dropped.lock() {
        let entry = counters.entry((event_type, reason)).or_insert(0);
        *entry += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        record_lifecycle_outcome, record_notification_dropped, render_metrics,
        NOTIFICATION_DROP_REASON_QUEUE_FULL,
    };

    #[test]
    fn rendered_metrics_include_recorded_counters() {
        record_lifecycle_outcome("approve", "metrics_sample");
        record_notification_dropped("access_request.created", NOTIFICATION_DROP_REASON_QUEUE_FULL);

        let rendered = render_metrics();
        assert!(rendered.contains("# TYPE access_request_operations_total counter"));
        assert!(rendered.contains(
            "access_request_operations_total{operation=\"approve\",outcome=\"metrics_sample\"}"
        ));
        assert!(rendered.contains(
            "access_notifications_dropped_total{event_type=\"access_request.created\",reason=\"queue_full\"}"
        ));
        assert!(rendered.contains("access_request_duplicates_superseded_total "));
    }
}
