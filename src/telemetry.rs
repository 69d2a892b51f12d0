/// Register descriptions for the metrics emitted by submission and
/// reconciliation. Call after installing the recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "classification_jobs_submitted_total",
        "Total classification jobs submitted"
    );
    metrics::describe_counter!(
        "classification_jobs_completed_total",
        "Total classification jobs completed"
    );
    metrics::describe_counter!(
        "classification_jobs_failed_total",
        "Total classification jobs that failed"
    );
    metrics::describe_counter!(
        "classification_jobs_retried_total",
        "Total job retries triggered by worker failure notifications"
    );
    metrics::describe_counter!(
        "status_messages_processed_total",
        "Status queue messages handled and acknowledged"
    );
    metrics::describe_counter!(
        "status_messages_duplicate_items_total",
        "Item results skipped because they were already merged"
    );
    metrics::describe_counter!(
        "status_messages_unknown_items_total",
        "Item results dropped because the job never listed their reference"
    );
    metrics::describe_counter!(
        "output_materialization_failures_total",
        "Classified items that could not be copied to the output bucket"
    );
    metrics::describe_histogram!(
        "status_reconcile_seconds",
        "Time to apply one status message"
    );
}
