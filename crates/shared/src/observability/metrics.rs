//! 指标模块
//!
//! 基于 metrics crate 的门面记录指标；未安装 recorder 时所有记录均为空操作，
//! 由宿主进程决定是否安装导出器。

/// 注册指标描述
pub fn describe_metrics(service_name: &str) {
    metrics::describe_counter!(
        "tag_events_processed_total",
        "Total number of events processed by the rule engine"
    );
    metrics::describe_histogram!(
        "tag_evaluation_duration_seconds",
        "Rule evaluation duration per event in seconds"
    );
    metrics::describe_counter!("tag_rule_matches_total", "Total number of rule matches");
    metrics::describe_counter!(
        "tag_evaluation_errors_total",
        "Total number of events aborted by an evaluation error"
    );

    metrics::describe_counter!("service_starts_total", "Total number of service starts");

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 记录一次事件处理
#[inline]
pub fn record_event_processed(matched_rules: usize, duration_secs: f64) {
    metrics::counter!(
        "tag_events_processed_total",
        "matched" => (matched_rules > 0).to_string()
    )
    .increment(1);

    metrics::histogram!("tag_evaluation_duration_seconds").record(duration_secs);
}

/// 记录规则命中
#[inline]
pub fn record_rule_match(rule_id: &str) {
    metrics::counter!("tag_rule_matches_total", "rule_id" => rule_id.to_string()).increment(1);
}

/// 记录评估失败
#[inline]
pub fn record_evaluation_error(rule_id: &str) {
    metrics::counter!("tag_evaluation_errors_total", "rule_id" => rule_id.to_string())
        .increment(1);
}
